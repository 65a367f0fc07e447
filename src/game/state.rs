use serde::{Deserialize, Serialize};

use super::board::{Board, CardKind, CardRef, RevealedFact};
use crate::ai::AiDifficulty;

/// 玩家座位号，0 或 1。
pub type PlayerId = u8;

const DEFAULT_PLAYER_NAME: &str = "Player";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum PlayerKind {
    Human,
    Ai { difficulty: AiDifficulty },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub kind: PlayerKind,
    #[serde(default)]
    pub score: i32,
}

impl Player {
    pub fn human(id: PlayerId, name: impl Into<String>) -> Self {
        let name = name.into();
        let name = if name.trim().is_empty() {
            DEFAULT_PLAYER_NAME.to_string()
        } else {
            name
        };
        Self {
            id,
            name,
            kind: PlayerKind::Human,
            score: 0,
        }
    }

    pub fn ai(id: PlayerId, difficulty: AiDifficulty) -> Self {
        Self {
            id,
            name: format!("AI - {}", difficulty.display_name()),
            kind: PlayerKind::Ai { difficulty },
            score: 0,
        }
    }

    pub fn is_ai(&self) -> bool {
        matches!(self.kind, PlayerKind::Ai { .. })
    }

    /// 加减分数，分数不会低于零。
    pub fn add_points(&mut self, points: i32) {
        self.score = self.score.saturating_add(points).max(0);
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum GamePhase {
    Idle,
    AwaitingFirst,
    AwaitingSecond,
    Evaluating,
    Matched,
    Mismatched,
    GameOver,
}

impl Default for GamePhase {
    fn default() -> Self {
        Self::Idle
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CardStatus {
    Hidden,
    Revealed,
    /// 配对失败后保持翻开，直到盖回。
    Error,
    Matched,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameOutcome {
    /// 平局时为 `None`。
    pub winner: Option<PlayerId>,
    pub scores: Vec<i32>,
}

/// 电脑对手记忆所消费的通知。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum MemoryEvent {
    Revealed { fact: RevealedFact },
    Matched { first: CardRef, second: CardRef },
    PairOpened { first: CardRef, second: CardRef },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum GameEvent {
    GameStarted {
        rows: usize,
        cols: usize,
        total_pairs: usize,
        first_player: PlayerId,
    },
    CardRevealed {
        player_id: PlayerId,
        fact: RevealedFact,
    },
    PairMatched {
        player_id: PlayerId,
        first: CardRef,
        second: CardRef,
        points: i32,
        score: i32,
    },
    PairMismatched {
        player_id: PlayerId,
        first: CardRef,
        second: CardRef,
        points: i32,
        score: i32,
    },
    CardsHidden {
        first: CardRef,
        second: CardRef,
    },
    TurnChanged {
        player_id: PlayerId,
    },
    GameOver {
        outcome: GameOutcome,
    },
}

impl GameEvent {
    pub fn memory_event(&self) -> Option<MemoryEvent> {
        match self {
            GameEvent::CardRevealed { fact, .. } => {
                Some(MemoryEvent::Revealed { fact: fact.clone() })
            }
            GameEvent::PairMatched { first, second, .. } => Some(MemoryEvent::Matched {
                first: *first,
                second: *second,
            }),
            GameEvent::PairMismatched { first, second, .. } => Some(MemoryEvent::PairOpened {
                first: *first,
                second: *second,
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum IntegrityError {
    InvalidPlayerIndex { player_id: PlayerId },
    NegativeScore { player_id: PlayerId, value: i32 },
    MatchedCountOutOfRange { matched: usize, total_cards: usize },
    StatusGridMismatch { expected: usize, actual: usize },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameState {
    pub players: Vec<Player>,
    pub current_player: PlayerId,
    pub phase: GamePhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_pick: Option<CardRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub second_pick: Option<CardRef>,
    pub cols: usize,
    pub operation_status: Vec<CardStatus>,
    pub result_status: Vec<CardStatus>,
    /// 已配对的牌数，每对计两张。
    pub matched_count: usize,
    pub total_pairs: usize,
    pub turn: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub event_log: Vec<GameEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<GameOutcome>,
}

impl GameState {
    pub fn new(players: Vec<Player>, board: &Board) -> Self {
        let total_pairs = board.total_pairs();
        let current_player = players.first().map(|player| player.id).unwrap_or(0);
        Self {
            players,
            current_player,
            phase: GamePhase::Idle,
            first_pick: None,
            second_pick: None,
            cols: board.cols(),
            operation_status: vec![CardStatus::Hidden; total_pairs],
            result_status: vec![CardStatus::Hidden; total_pairs],
            matched_count: 0,
            total_pairs,
            turn: 1,
            event_log: Vec::new(),
            outcome: None,
        }
    }

    pub fn awaiting_second(&self) -> bool {
        self.phase == GamePhase::AwaitingSecond
    }

    pub fn total_cards(&self) -> usize {
        self.total_pairs * 2
    }

    pub fn all_matched(&self) -> bool {
        self.matched_count == self.total_cards()
    }

    pub fn is_finished(&self) -> bool {
        self.outcome.is_some()
    }

    pub fn record_event(&mut self, event: GameEvent) {
        self.event_log.push(event);
    }

    fn status_slot(&self, card: &CardRef) -> Option<usize> {
        if card.col >= self.cols {
            return None;
        }
        let index = card.row.checked_mul(self.cols)?.checked_add(card.col)?;
        (index < self.total_pairs).then_some(index)
    }

    pub fn status(&self, card: &CardRef) -> Option<CardStatus> {
        let index = self.status_slot(card)?;
        match card.kind {
            CardKind::Operation => self.operation_status.get(index).copied(),
            CardKind::Result => self.result_status.get(index).copied(),
        }
    }

    pub fn set_status(&mut self, card: &CardRef, status: CardStatus) {
        let Some(index) = self.status_slot(card) else {
            return;
        };
        let slots = match card.kind {
            CardKind::Operation => &mut self.operation_status,
            CardKind::Result => &mut self.result_status,
        };
        if let Some(slot) = slots.get_mut(index) {
            *slot = status;
        }
    }

    /// 当前阶段接受的牌类型；不接受翻牌时为 `None`。
    pub fn expected_kind(&self) -> Option<CardKind> {
        match self.phase {
            GamePhase::AwaitingFirst => Some(CardKind::Operation),
            GamePhase::AwaitingSecond => Some(CardKind::Result),
            _ => None,
        }
    }

    /// 当前阶段可翻的牌：背面朝上、未配对且类型正确。
    pub fn selectable_cards(&self, board: &Board) -> Vec<CardRef> {
        let Some(kind) = self.expected_kind() else {
            return Vec::new();
        };
        board
            .cards(kind)
            .filter(|card| self.status(card) == Some(CardStatus::Hidden))
            .filter(|card| Some(*card) != self.first_pick)
            .collect()
    }

    pub fn get_player(&self, id: PlayerId) -> Option<&Player> {
        self.players.iter().find(|player| player.id == id)
    }

    pub fn get_player_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.players.iter_mut().find(|player| player.id == id)
    }

    pub fn current(&self) -> Option<&Player> {
        self.get_player(self.current_player)
    }

    pub fn opponent_of(&self, player_id: PlayerId) -> Option<PlayerId> {
        self.players
            .iter()
            .find(|player| player.id != player_id)
            .map(|player| player.id)
    }

    pub fn scores(&self) -> Vec<i32> {
        self.players.iter().map(|player| player.score).collect()
    }

    pub fn pass_turn(&mut self) {
        if let Some(next_player) = self.opponent_of(self.current_player) {
            self.current_player = next_player;
            self.turn += 1;
        }
    }

    /// 分数严格更高者获胜，同分为平局。
    pub fn evaluate_outcome(&self) -> GameOutcome {
        let scores = self.scores();
        let best = self.players.iter().map(|player| player.score).max();
        let leaders: Vec<PlayerId> = self
            .players
            .iter()
            .filter(|player| Some(player.score) == best)
            .map(|player| player.id)
            .collect();
        let winner = match leaders.as_slice() {
            [single] => Some(*single),
            _ => None,
        };
        GameOutcome { winner, scores }
    }

    /// 只记录一次结局，之后的调用返回已记录的结局。
    pub fn declare_outcome(&mut self) -> (GameOutcome, bool) {
        if let Some(outcome) = &self.outcome {
            return (outcome.clone(), false);
        }
        let outcome = self.evaluate_outcome();
        self.outcome = Some(outcome.clone());
        self.phase = GamePhase::GameOver;
        (outcome, true)
    }

    pub fn integrity_check(&self) -> Result<(), IntegrityError> {
        if !self.players.iter().any(|p| p.id == self.current_player) {
            return Err(IntegrityError::InvalidPlayerIndex {
                player_id: self.current_player,
            });
        }
        for player in &self.players {
            if player.score < 0 {
                return Err(IntegrityError::NegativeScore {
                    player_id: player.id,
                    value: player.score,
                });
            }
        }
        if self.matched_count > self.total_cards() {
            return Err(IntegrityError::MatchedCountOutOfRange {
                matched: self.matched_count,
                total_cards: self.total_cards(),
            });
        }
        for statuses in [&self.operation_status, &self.result_status] {
            if statuses.len() != self.total_pairs {
                return Err(IntegrityError::StatusGridMismatch {
                    expected: self.total_pairs,
                    actual: statuses.len(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::generator::{Cell, Grid, Operation};

    fn board() -> Board {
        let grid = Grid::from_cells(
            1,
            2,
            vec![
                Cell::new(0, 0, 1, 1, Operation::Add).expect("cell"),
                Cell::new(0, 1, 2, 2, Operation::Multiply).expect("cell"),
            ],
        )
        .expect("grid");
        Board::with_layout(grid, &[1, 0]).expect("board")
    }

    fn state() -> GameState {
        GameState::new(
            vec![Player::human(0, "Ana"), Player::ai(1, AiDifficulty::Hard)],
            &board(),
        )
    }

    #[test]
    fn score_never_goes_negative() {
        let mut player = Player::human(0, "  ");
        assert_eq!(player.name, "Player");
        player.add_points(-1);
        assert_eq!(player.score, 0);
        player.add_points(5);
        player.add_points(-1);
        assert_eq!(player.score, 4);
    }

    #[test]
    fn ai_seats_are_named_after_difficulty() {
        let player = Player::ai(1, AiDifficulty::Medium);
        assert_eq!(player.name, "AI - Medium");
        assert!(player.is_ai());
    }

    #[test]
    fn selectable_cards_follow_phase_and_status() {
        let board = board();
        let mut state = state();
        assert!(state.selectable_cards(&board).is_empty());

        state.phase = GamePhase::AwaitingFirst;
        state.set_status(&CardRef::operation(0, 1), CardStatus::Matched);
        assert_eq!(state.selectable_cards(&board), vec![CardRef::operation(0, 0)]);

        state.phase = GamePhase::AwaitingSecond;
        assert_eq!(
            state.selectable_cards(&board),
            vec![CardRef::result(0, 0), CardRef::result(0, 1)]
        );
    }

    #[test]
    fn out_of_range_cards_have_no_status() {
        let state = state();
        assert_eq!(state.status(&CardRef::operation(0, 2)), None);
        assert_eq!(state.status(&CardRef::result(1, 0)), None);
        assert_eq!(state.status(&CardRef::result(0, 1)), Some(CardStatus::Hidden));
    }

    #[test]
    fn tie_is_a_draw() {
        let mut state = state();
        state.players[0].score = 10;
        state.players[1].score = 10;
        assert_eq!(state.evaluate_outcome().winner, None);
        state.players[1].score = 11;
        assert_eq!(state.evaluate_outcome().winner, Some(1));
    }

    #[test]
    fn outcome_is_declared_once() {
        let mut state = state();
        let (_, first) = state.declare_outcome();
        state.players[0].score = 50;
        let (outcome, second) = state.declare_outcome();
        assert!(first);
        assert!(!second);
        assert_eq!(outcome.winner, None);
        assert_eq!(state.phase, GamePhase::GameOver);
    }

    #[test]
    fn integrity_flags_bad_current_player() {
        let mut state = state();
        assert!(state.integrity_check().is_ok());
        state.current_player = 9;
        assert_eq!(
            state.integrity_check(),
            Err(IntegrityError::InvalidPlayerIndex { player_id: 9 })
        );
    }
}
