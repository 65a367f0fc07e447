//! 游戏核心逻辑模块（题目生成、牌面、状态机、规则引擎等）。

pub mod board;
pub mod config;
pub mod generator;
pub mod rules;
pub mod scheduler;
pub mod state;

pub use board::{
    Board, BoardError, CardKind, CardRef, CardRefParseError, ResultLayout, ResultSlot,
    RevealedFact,
};
pub use config::{GameConfig, GameMode, Timings};
pub use generator::{Cell, GeneratorError, Grid, Operation, PuzzleGenerator};
pub use rules::{MatchEngine, PickOutcome, RuleError, RuleResolution, Scoring};
pub use scheduler::{ScheduledAction, ScheduledTask, Scheduler, TaskId};
pub use state::{
    CardStatus,
    GameEvent,
    GameOutcome,
    GamePhase,
    GameState,
    IntegrityError,
    MemoryEvent,
    Player,
    PlayerId,
    PlayerKind,
};
