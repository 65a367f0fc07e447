use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::generator::Operation;
use super::rules::Scoring;
use super::state::{Player, PlayerId};
use crate::ai::AiDifficulty;

pub const DEFAULT_ROWS: usize = 4;
pub const DEFAULT_COLS: usize = 3;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum GameMode {
    Pvp,
    #[default]
    Pve,
    AiVsAi,
}

impl GameMode {
    pub fn is_ai_seat(self, seat: PlayerId) -> bool {
        match self {
            GameMode::Pvp => false,
            GameMode::Pve => seat == 1,
            GameMode::AiVsAi => true,
        }
    }
}

impl FromStr for GameMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pvp" => Ok(GameMode::Pvp),
            "pve" => Ok(GameMode::Pve),
            "aivsai" | "eve" | "ai-vs-ai" => Ok(GameMode::AiVsAi),
            _ => Err(()),
        }
    }
}

/// 回合中延迟步骤的等待时间（毫秒）。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Timings {
    /// 电脑翻第一张牌之前。
    pub ai_think_ms: u64,
    /// 电脑两次翻牌之间。
    pub ai_second_pick_ms: u64,
    /// 配对失败的牌保持翻开的时长。
    pub mismatch_settle_ms: u64,
    pub ai_resume_after_match_ms: u64,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            ai_think_ms: 1000,
            ai_second_pick_ms: 1000,
            mismatch_settle_ms: 1500,
            ai_resume_after_match_ms: 500,
        }
    }
}

impl Timings {
    /// 所有延迟为零，排队的步骤立即到期。
    pub fn instant() -> Self {
        Self {
            ai_think_ms: 0,
            ai_second_pick_ms: 0,
            mismatch_settle_ms: 0,
            ai_resume_after_match_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GameConfig {
    pub rows: usize,
    pub cols: usize,
    pub operations: Vec<Operation>,
    pub mode: GameMode,
    pub difficulty: AiDifficulty,
    pub player_names: [String; 2],
    pub scoring: Scoring,
    pub timings: Timings,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            rows: DEFAULT_ROWS,
            cols: DEFAULT_COLS,
            operations: Operation::ALL.to_vec(),
            mode: GameMode::default(),
            difficulty: AiDifficulty::default(),
            player_names: ["Player 1".to_string(), "Player 2".to_string()],
            scoring: Scoring::default(),
            timings: Timings::default(),
            seed: None,
        }
    }
}

impl GameConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// 按回合顺序排列的座位，0 号先手。
    pub fn players(&self) -> Vec<Player> {
        self.player_names
            .iter()
            .zip(0..)
            .map(|(name, seat)| {
                if self.mode.is_ai_seat(seat) {
                    Player::ai(seat, self.difficulty)
                } else {
                    Player::human(seat, name.as_str())
                }
            })
            .collect()
    }
}
