use std::str::FromStr;

use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::memory::{AiMemory, MemoryStats};
use crate::game::{CardKind, CardRef, GameState, MemoryEvent, RevealedFact};

const EASY_MEMORY_PAIRS: usize = 0;
const MEDIUM_MEMORY_PAIRS: usize = 6;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum AiDifficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl AiDifficulty {
    pub fn display_name(self) -> &'static str {
        match self {
            AiDifficulty::Easy => "Easy",
            AiDifficulty::Medium => "Medium",
            AiDifficulty::Hard => "Hard",
        }
    }

    /// 该难度能记住的翻开对数，`None` 表示不限。
    pub fn memory_capacity(self) -> Option<usize> {
        match self {
            AiDifficulty::Easy => Some(EASY_MEMORY_PAIRS),
            AiDifficulty::Medium => Some(MEDIUM_MEMORY_PAIRS),
            AiDifficulty::Hard => None,
        }
    }
}

impl FromStr for AiDifficulty {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "easy" => Ok(AiDifficulty::Easy),
            "medium" | "normal" => Ok(AiDifficulty::Medium),
            "hard" | "difficult" => Ok(AiDifficulty::Hard),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AiConfig {
    pub difficulty: AiDifficulty,
    pub memory_capacity: Option<usize>,
}

impl AiConfig {
    pub fn from_difficulty(difficulty: AiDifficulty) -> Self {
        Self {
            difficulty,
            memory_capacity: difficulty.memory_capacity(),
        }
    }

    pub fn with_memory_capacity(mut self, capacity: Option<usize>) -> Self {
        self.memory_capacity = capacity;
        self
    }
}

impl Default for AiConfig {
    fn default() -> Self {
        AiConfig::from_difficulty(AiDifficulty::Medium)
    }
}

/// 决策由哪一条规则产生。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DecisionRule {
    KnownMatch,
    Unseen,
    KindPriority,
    Random,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AiDecision {
    pub card: CardRef,
    pub rule: DecisionRule,
}

#[derive(Debug, Clone)]
pub struct AiAgent {
    config: AiConfig,
    memory: AiMemory,
    rng: SmallRng,
}

impl AiAgent {
    pub fn new(config: AiConfig) -> Self {
        Self {
            memory: AiMemory::new(config.memory_capacity),
            config,
            rng: SmallRng::from_entropy(),
        }
    }

    pub fn with_seed(config: AiConfig, seed: u64) -> Self {
        Self {
            memory: AiMemory::new(config.memory_capacity),
            config,
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    pub fn config(&self) -> &AiConfig {
        &self.config
    }

    pub fn memory(&self) -> &AiMemory {
        &self.memory
    }

    pub fn memory_stats(&self) -> MemoryStats {
        self.memory.stats()
    }

    pub fn observe(&mut self, event: &MemoryEvent) {
        self.memory.observe(event);
    }

    pub fn clear_memory(&mut self) {
        self.memory.clear();
    }

    /// 在 `selectable` 中为当前阶段选出一张牌。
    ///
    /// 规则按顺序匹配，先满足者生效：
    /// 1. 记忆中另一类、结果相同的牌也已知（第二步时只认已翻开的第一张）；
    /// 2. 随机选一张未见过的牌；
    /// 3. 已见过的算式牌优先，其次是结果牌；
    /// 4. 任意可选的牌。
    pub fn choose_move(&mut self, selectable: &[CardRef], state: &GameState) -> Option<AiDecision> {
        if selectable.is_empty() {
            return None;
        }

        let decision = if let Some(card) = self.find_known_match(selectable, state.first_pick) {
            AiDecision {
                card,
                rule: DecisionRule::KnownMatch,
            }
        } else if let Some(decision) = self.choose_strategic(selectable) {
            decision
        } else {
            let card = *selectable.choose(&mut self.rng)?;
            AiDecision {
                card,
                rule: DecisionRule::Random,
            }
        };

        debug!(
            difficulty = ?self.config.difficulty,
            card = %decision.card,
            rule = ?decision.rule,
            "ai move chosen"
        );
        Some(decision)
    }

    fn find_known_match(
        &self,
        selectable: &[CardRef],
        pending: Option<CardRef>,
    ) -> Option<CardRef> {
        let pending_fact = pending.and_then(|card| self.memory.get(&card));
        selectable.iter().copied().find(|card| {
            let Some(fact) = self.memory.get(card) else {
                return false;
            };
            match (pending, pending_fact) {
                (Some(_), Some(first)) => completes_pair(fact, first),
                (Some(_), None) => false,
                (None, _) => self
                    .memory
                    .facts()
                    .any(|other| other.card != *card && completes_pair(fact, other)),
            }
        })
    }

    fn choose_strategic(&mut self, selectable: &[CardRef]) -> Option<AiDecision> {
        let mut unseen = Vec::new();
        let mut seen_operations = Vec::new();
        let mut seen_results = Vec::new();

        for card in selectable {
            if !self.memory.contains(card) {
                unseen.push(*card);
            } else if card.kind == CardKind::Operation {
                seen_operations.push(*card);
            } else {
                seen_results.push(*card);
            }
        }

        if let Some(card) = unseen.choose(&mut self.rng) {
            return Some(AiDecision {
                card: *card,
                rule: DecisionRule::Unseen,
            });
        }
        seen_operations
            .choose(&mut self.rng)
            .or_else(|| seen_results.choose(&mut self.rng))
            .map(|card| AiDecision {
                card: *card,
                rule: DecisionRule::KindPriority,
            })
    }
}

fn completes_pair(lhs: &RevealedFact, rhs: &RevealedFact) -> bool {
    lhs.result == rhs.result && lhs.is_operation != rhs.is_operation
}
