use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use super::{
    board::{Board, CardKind, CardRef},
    state::{
        CardStatus, GameEvent, GameOutcome, GamePhase, GameState, IntegrityError, Player, PlayerId,
    },
};

const DEFAULT_MATCH_BONUS: i32 = 5;
const DEFAULT_MISMATCH_PENALTY: i32 = -1;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Scoring {
    #[serde(default = "default_match_bonus")]
    pub match_bonus: i32,
    #[serde(default = "default_mismatch_penalty")]
    pub mismatch_penalty: i32,
}

fn default_match_bonus() -> i32 {
    DEFAULT_MATCH_BONUS
}

fn default_mismatch_penalty() -> i32 {
    DEFAULT_MISMATCH_PENALTY
}

impl Default for Scoring {
    fn default() -> Self {
        Self {
            match_bonus: DEFAULT_MATCH_BONUS,
            mismatch_penalty: DEFAULT_MISMATCH_PENALTY,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
#[serde(tag = "type")]
pub enum RuleError {
    #[error("the game is already over")]
    GameFinished,
    #[error("it is not player {player_id}'s turn")]
    NotPlayerTurn { player_id: PlayerId },
    #[error("pick not allowed in phase {actual:?}, expected {expected:?}")]
    InvalidPhase {
        expected: GamePhase,
        actual: GamePhase,
    },
    #[error("expected a {expected:?} card, got a {actual:?} card")]
    InvalidCardKind { expected: CardKind, actual: CardKind },
    #[error("card {card} is not on the board")]
    CardOutOfBounds { card: CardRef },
    #[error("card {card} is already face up or matched")]
    AlreadyResolved { card: CardRef },
    #[error("card {card} is already the first pick")]
    SameCard { card: CardRef },
    #[error("no mismatched pair is waiting to be hidden")]
    NothingToSettle,
    #[error("game state failed integrity check: {error:?}")]
    IntegrityViolation { error: IntegrityError },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum PickOutcome {
    Revealed,
    Matched,
    Mismatched,
    GameOver { outcome: GameOutcome },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuleResolution {
    pub outcome: PickOutcome,
    pub events: Vec<GameEvent>,
}

impl RuleResolution {
    fn new(outcome: PickOutcome, events: Vec<GameEvent>) -> Self {
        Self { outcome, events }
    }
}

/// 回合制翻牌与判定状态机，持有游戏状态，牌面只读。
#[derive(Debug, Clone)]
pub struct MatchEngine {
    board: Board,
    state: GameState,
    scoring: Scoring,
}

impl MatchEngine {
    pub fn new(board: Board, players: Vec<Player>, scoring: Scoring) -> Self {
        let state = GameState::new(players, &board);
        Self {
            board,
            state,
            scoring,
        }
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn scoring(&self) -> Scoring {
        self.scoring
    }

    pub fn selectable_cards(&self) -> Vec<CardRef> {
        self.state.selectable_cards(&self.board)
    }

    fn ensure_running(&self) -> Result<(), RuleError> {
        if self.state.is_finished() {
            return Err(RuleError::GameFinished);
        }
        self.state
            .integrity_check()
            .map_err(|error| RuleError::IntegrityViolation { error })
    }

    fn ensure_phase(&self, expected: GamePhase) -> Result<(), RuleError> {
        if self.state.phase != expected {
            return Err(RuleError::InvalidPhase {
                expected,
                actual: self.state.phase,
            });
        }
        Ok(())
    }

    fn ensure_turn_owner(&self, player_id: PlayerId) -> Result<(), RuleError> {
        if self.state.current_player != player_id {
            return Err(RuleError::NotPlayerTurn { player_id });
        }
        Ok(())
    }

    fn ensure_pickable(&self, card: &CardRef, expected: CardKind) -> Result<(), RuleError> {
        if card.kind != expected {
            return Err(RuleError::InvalidCardKind {
                expected,
                actual: card.kind,
            });
        }
        match self.state.status(card) {
            None => Err(RuleError::CardOutOfBounds { card: *card }),
            Some(CardStatus::Hidden) => Ok(()),
            Some(_) => Err(RuleError::AlreadyResolved { card: *card }),
        }
    }

    fn emit(&mut self, events: &mut Vec<GameEvent>, event: GameEvent) {
        self.state.record_event(event.clone());
        events.push(event);
    }

    fn reveal(&mut self, events: &mut Vec<GameEvent>, player_id: PlayerId, card: CardRef) {
        self.state.set_status(&card, CardStatus::Revealed);
        if let Some(fact) = self.board.reveal(&card) {
            self.emit(events, GameEvent::CardRevealed { player_id, fact });
        }
    }

    /// Idle → AwaitingFirst，重复调用无效果。
    pub fn start(&mut self) -> Vec<GameEvent> {
        let mut events = Vec::new();
        if self.state.phase != GamePhase::Idle {
            return events;
        }
        self.state.phase = GamePhase::AwaitingFirst;
        let first_player = self.state.current_player;
        self.emit(
            &mut events,
            GameEvent::GameStarted {
                rows: self.board.rows(),
                cols: self.board.cols(),
                total_pairs: self.board.total_pairs(),
                first_player,
            },
        );
        self.emit(&mut events, GameEvent::TurnChanged { player_id: first_player });
        info!(
            rows = self.board.rows(),
            cols = self.board.cols(),
            first_player,
            "match started"
        );
        events
    }

    /// 按阶段分派到第一张或第二张翻牌处理。
    pub fn submit_pick(
        &mut self,
        player_id: PlayerId,
        card: CardRef,
    ) -> Result<RuleResolution, RuleError> {
        match self.state.phase {
            GamePhase::AwaitingSecond => self.pick_result_card(player_id, card),
            _ => self.pick_operation_card(player_id, card),
        }
    }

    pub fn pick_operation_card(
        &mut self,
        player_id: PlayerId,
        card: CardRef,
    ) -> Result<RuleResolution, RuleError> {
        self.ensure_running()?;
        self.ensure_turn_owner(player_id)?;
        self.ensure_phase(GamePhase::AwaitingFirst)?;
        self.ensure_pickable(&card, CardKind::Operation)?;

        let mut events = Vec::new();
        self.reveal(&mut events, player_id, card);
        self.state.first_pick = Some(card);
        self.state.phase = GamePhase::AwaitingSecond;
        debug!(player_id, card = %card, "first pick accepted");

        Ok(RuleResolution::new(PickOutcome::Revealed, events))
    }

    pub fn pick_result_card(
        &mut self,
        player_id: PlayerId,
        card: CardRef,
    ) -> Result<RuleResolution, RuleError> {
        self.ensure_running()?;
        self.ensure_turn_owner(player_id)?;
        self.ensure_phase(GamePhase::AwaitingSecond)?;
        let first = self.state.first_pick.ok_or(RuleError::InvalidPhase {
            expected: GamePhase::AwaitingFirst,
            actual: self.state.phase,
        })?;
        if card == first {
            return Err(RuleError::SameCard { card });
        }
        self.ensure_pickable(&card, CardKind::Result)?;

        let mut events = Vec::new();
        self.reveal(&mut events, player_id, card);
        self.state.second_pick = Some(card);
        self.state.phase = GamePhase::Evaluating;
        debug!(player_id, card = %card, "second pick accepted");

        let is_match = match (self.board.result_value(&first), self.board.result_value(&card)) {
            (Some(lhs), Some(rhs)) => lhs == rhs,
            _ => false,
        };

        if is_match {
            Ok(self.resolve_match(events, player_id, first, card))
        } else {
            Ok(self.resolve_mismatch(events, player_id, first, card))
        }
    }

    fn resolve_match(
        &mut self,
        mut events: Vec<GameEvent>,
        player_id: PlayerId,
        first: CardRef,
        second: CardRef,
    ) -> RuleResolution {
        self.state.phase = GamePhase::Matched;
        self.state.set_status(&first, CardStatus::Matched);
        self.state.set_status(&second, CardStatus::Matched);
        self.state.matched_count += 2;

        let points = self.scoring.match_bonus;
        let score = self.award(player_id, points);
        self.emit(
            &mut events,
            GameEvent::PairMatched {
                player_id,
                first,
                second,
                points,
                score,
            },
        );
        info!(player_id, first = %first, second = %second, score, "pair matched");

        self.state.first_pick = None;
        self.state.second_pick = None;

        if self.state.all_matched() {
            let (outcome, newly_declared) = self.state.declare_outcome();
            if newly_declared {
                self.emit(
                    &mut events,
                    GameEvent::GameOver {
                        outcome: outcome.clone(),
                    },
                );
                info!(winner = ?outcome.winner, scores = ?outcome.scores, "game over");
            }
            return RuleResolution::new(PickOutcome::GameOver { outcome }, events);
        }

        // 奖励回合：同一玩家继续翻牌。
        self.state.phase = GamePhase::AwaitingFirst;
        RuleResolution::new(PickOutcome::Matched, events)
    }

    fn resolve_mismatch(
        &mut self,
        mut events: Vec<GameEvent>,
        player_id: PlayerId,
        first: CardRef,
        second: CardRef,
    ) -> RuleResolution {
        self.state.phase = GamePhase::Mismatched;
        self.state.set_status(&first, CardStatus::Error);
        self.state.set_status(&second, CardStatus::Error);

        let points = self.scoring.mismatch_penalty;
        let score = self.award(player_id, points);
        self.emit(
            &mut events,
            GameEvent::PairMismatched {
                player_id,
                first,
                second,
                points,
                score,
            },
        );
        debug!(player_id, first = %first, second = %second, score, "pair mismatched");

        RuleResolution::new(PickOutcome::Mismatched, events)
    }

    fn award(&mut self, player_id: PlayerId, points: i32) -> i32 {
        match self.state.get_player_mut(player_id) {
            Some(player) => {
                player.add_points(points);
                player.score
            }
            None => 0,
        }
    }

    /// 盖回配对失败的两张牌并交换回合，由调用方在等待时间结束后触发。
    pub fn settle_mismatch(&mut self) -> Result<Vec<GameEvent>, RuleError> {
        self.ensure_running()?;
        if self.state.phase != GamePhase::Mismatched {
            return Err(RuleError::NothingToSettle);
        }
        let (Some(first), Some(second)) = (self.state.first_pick, self.state.second_pick) else {
            return Err(RuleError::NothingToSettle);
        };

        let mut events = Vec::new();
        self.state.set_status(&first, CardStatus::Hidden);
        self.state.set_status(&second, CardStatus::Hidden);
        self.emit(&mut events, GameEvent::CardsHidden { first, second });

        self.state.first_pick = None;
        self.state.second_pick = None;
        self.state.pass_turn();
        self.state.phase = GamePhase::AwaitingFirst;
        let player_id = self.state.current_player;
        self.emit(&mut events, GameEvent::TurnChanged { player_id });
        debug!(player_id, "turn passed");

        Ok(events)
    }
}
