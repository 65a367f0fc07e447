//! 电脑对手：有限记忆与四级决策规则。

pub mod memory;
pub mod opponent;

pub use memory::{AiMemory, MemoryStats, OpenedPair};
pub use opponent::{AiAgent, AiConfig, AiDecision, AiDifficulty, DecisionRule};
