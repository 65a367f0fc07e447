//! 对局驱动：持有规则引擎、电脑对手与定时任务队列。

use std::collections::BTreeMap;

use rand::rngs::SmallRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::ai::{AiAgent, AiConfig, AiDecision};
use crate::game::{
    Board, CardRef, GameConfig, GameEvent, GameOutcome, GamePhase, GameState, GeneratorError,
    MatchEngine, PickOutcome, PlayerId, PuzzleGenerator, RuleError, RuleResolution,
    ScheduledAction, ScheduledTask, Scheduler, TaskId,
};

/// 发往界面、音效等外部协作方的通知。
pub trait GameObserver {
    fn on_card_revealed(&mut self, _card: CardRef, _display_text: &str) {}
    fn on_match(&mut self, _first: CardRef, _second: CardRef) {}
    fn on_mismatch(&mut self, _first: CardRef, _second: CardRef) {}
    fn on_cards_hidden(&mut self, _first: CardRef, _second: CardRef) {}
    fn on_turn_changed(&mut self, _player_id: PlayerId) {}
    fn on_game_over(&mut self, _outcome: &GameOutcome) {}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
#[serde(tag = "type")]
pub enum SessionError {
    #[error("no game in progress")]
    NoActiveGame,
    #[error("seat {seat} is played by the computer")]
    SeatIsAi { seat: PlayerId },
    #[error("{error}")]
    Rule {
        #[from]
        error: RuleError,
    },
    #[error("{error}")]
    Generator {
        #[from]
        error: GeneratorError,
    },
}

/// 每次运行一局游戏。只有宿主调用 [`pump`] 时时间才会推进。
///
/// [`pump`]: GameSession::pump
pub struct GameSession {
    config: GameConfig,
    engine: Option<MatchEngine>,
    agents: BTreeMap<PlayerId, AiAgent>,
    scheduler: Scheduler,
    observers: Vec<Box<dyn GameObserver>>,
    clock_ms: u64,
    pending_events: Vec<GameEvent>,
    pending_ai: Option<TaskId>,
}

impl GameSession {
    pub fn new(config: GameConfig) -> Self {
        Self {
            config,
            engine: None,
            agents: BTreeMap::new(),
            scheduler: Scheduler::new(),
            observers: Vec::new(),
            clock_ms: 0,
            pending_events: Vec::new(),
            pending_ai: None,
        }
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn add_observer(&mut self, observer: Box<dyn GameObserver>) {
        self.observers.push(observer);
    }

    /// 按 `config` 生成新牌面并开始对局。
    pub fn start_game(&mut self, config: GameConfig) -> Result<Vec<GameEvent>, SessionError> {
        let mut generator = match config.seed {
            Some(seed) => PuzzleGenerator::with_seed(seed),
            None => PuzzleGenerator::new(),
        };
        let grid = generator.generate(config.rows, config.cols, &config.operations)?;
        let board = match config.seed {
            Some(seed) => {
                let mut rng = SmallRng::seed_from_u64(seed.wrapping_add(1));
                Board::from_grid_with_rng(grid, &mut rng)
            }
            None => Board::from_grid(grid),
        };
        Ok(self.start_with_board(config, board))
    }

    /// 在给定牌面上开始对局，替换进行中的对局。
    pub fn start_with_board(&mut self, config: GameConfig, board: Board) -> Vec<GameEvent> {
        self.reset();

        let players = config.players();
        for player in players.iter().filter(|player| player.is_ai()) {
            let ai_config = AiConfig::from_difficulty(config.difficulty);
            let agent = match config.seed {
                Some(seed) => {
                    AiAgent::with_seed(ai_config, seed.wrapping_add(2 + u64::from(player.id)))
                }
                None => AiAgent::new(ai_config),
            };
            self.agents.insert(player.id, agent);
        }

        info!(
            rows = board.rows(),
            cols = board.cols(),
            mode = ?config.mode,
            difficulty = ?config.difficulty,
            "starting game"
        );
        let mut engine = MatchEngine::new(board, players, config.scoring);
        let events = engine.start();
        self.engine = Some(engine);
        self.config = config;

        self.dispatch(&events);
        self.schedule_turn(self.config.timings.ai_think_ms);
        events
    }

    /// 玩家翻牌；电脑座位只由定时队列驱动。
    pub fn submit_pick(
        &mut self,
        seat: PlayerId,
        card: CardRef,
    ) -> Result<RuleResolution, SessionError> {
        if self.engine.is_none() {
            return Err(SessionError::NoActiveGame);
        }
        if self.agents.contains_key(&seat) {
            return Err(SessionError::SeatIsAi { seat });
        }
        self.apply_pick(seat, card)
    }

    fn apply_pick(
        &mut self,
        seat: PlayerId,
        card: CardRef,
    ) -> Result<RuleResolution, SessionError> {
        let engine = self.engine.as_mut().ok_or(SessionError::NoActiveGame)?;
        let resolution = engine.submit_pick(seat, card)?;
        self.dispatch(&resolution.events);

        let timings = self.config.timings;
        match &resolution.outcome {
            PickOutcome::Revealed => {
                if self.agents.contains_key(&seat) {
                    self.schedule_ai(seat, timings.ai_second_pick_ms);
                }
            }
            PickOutcome::Matched => self.schedule_turn(timings.ai_resume_after_match_ms),
            PickOutcome::Mismatched => {
                self.scheduler.schedule(
                    self.clock_ms,
                    timings.mismatch_settle_ms,
                    ScheduledAction::SettleMismatch,
                );
            }
            PickOutcome::GameOver { .. } => {
                self.scheduler.clear();
                self.pending_ai = None;
            }
        }
        Ok(resolution)
    }

    fn schedule_ai(&mut self, player_id: PlayerId, delay_ms: u64) {
        let id = self
            .scheduler
            .schedule(self.clock_ms, delay_ms, ScheduledAction::AiPick { player_id });
        self.pending_ai = Some(id);
    }

    /// 当前座位是电脑时，排队它的第一张翻牌。
    fn schedule_turn(&mut self, delay_ms: u64) {
        let Some(engine) = &self.engine else {
            return;
        };
        let state = engine.state();
        if state.phase != GamePhase::AwaitingFirst {
            return;
        }
        let player_id = state.current_player;
        if self.agents.contains_key(&player_id) {
            self.schedule_ai(player_id, delay_ms);
        }
    }

    fn dispatch(&mut self, events: &[GameEvent]) {
        for event in events {
            // 先更新记忆，再通知观察者。
            if let Some(memory_event) = event.memory_event() {
                for agent in self.agents.values_mut() {
                    agent.observe(&memory_event);
                }
            }
            for observer in self.observers.iter_mut() {
                notify(observer.as_mut(), event);
            }
            self.pending_events.push(event.clone());
        }
    }

    /// 只推进时钟，不执行任务。
    pub fn sync_clock(&mut self, now_ms: u64) {
        self.clock_ms = self.clock_ms.max(now_ms);
    }

    pub fn now_ms(&self) -> u64 {
        self.clock_ms
    }

    /// 执行所有在 `now_ms` 前到期的任务（包括本次调用中新排入的），返回执行数量。
    pub fn pump(&mut self, now_ms: u64) -> Result<usize, SessionError> {
        let mut ran = 0;
        while let Some(task) = self.scheduler.pop_due(now_ms) {
            self.clock_ms = self.clock_ms.max(task.due_ms);
            self.run_task(task)?;
            ran += 1;
        }
        self.sync_clock(now_ms);
        Ok(ran)
    }

    /// 逐个跳到下一个截止时间执行，直到队列为空或执行满 `max_tasks` 个。
    pub fn run_until_idle(&mut self, max_tasks: usize) -> Result<usize, SessionError> {
        let mut ran = 0;
        while ran < max_tasks {
            let Some(deadline) = self.scheduler.next_deadline() else {
                break;
            };
            ran += self.pump(deadline)?;
        }
        Ok(ran)
    }

    fn run_task(&mut self, task: ScheduledTask) -> Result<(), SessionError> {
        match task.action {
            ScheduledAction::AiPick { player_id } => {
                if self.pending_ai == Some(task.id) {
                    self.pending_ai = None;
                }
                self.play_ai_pick(player_id)
            }
            ScheduledAction::SettleMismatch => {
                let engine = self.engine.as_mut().ok_or(SessionError::NoActiveGame)?;
                let events = engine.settle_mismatch()?;
                self.dispatch(&events);
                self.schedule_turn(self.config.timings.ai_think_ms);
                Ok(())
            }
        }
    }

    fn play_ai_pick(&mut self, player_id: PlayerId) -> Result<(), SessionError> {
        let engine = self.engine.as_ref().ok_or(SessionError::NoActiveGame)?;
        let state = engine.state();
        if state.current_player != player_id || state.expected_kind().is_none() {
            debug!(player_id, phase = ?state.phase, "stale ai task skipped");
            return Ok(());
        }
        let selectable = engine.selectable_cards();
        let Some(agent) = self.agents.get_mut(&player_id) else {
            return Ok(());
        };
        let Some(decision) = agent.choose_move(&selectable, state) else {
            warn!(player_id, "ai found no selectable card");
            return Ok(());
        };
        self.apply_pick(player_id, decision.card).map(|_| ())
    }

    pub fn next_deadline(&self) -> Option<u64> {
        self.scheduler.next_deadline()
    }

    /// 取消排队中的电脑翻牌，对局状态不变。
    pub fn cancel_pending_move(&mut self) -> bool {
        match self.pending_ai.take() {
            Some(id) => self.scheduler.cancel(id),
            None => false,
        }
    }

    /// 为当前电脑座位重新排队被取消的翻牌。
    /// 已有排队任务、对局未开始或当前座位不是电脑时返回 `false`。
    pub fn resume_pending_move(&mut self) -> bool {
        if self.pending_ai.is_some() {
            return false;
        }
        let Some(engine) = &self.engine else {
            return false;
        };
        let state = engine.state();
        let player_id = state.current_player;
        if !self.agents.contains_key(&player_id) {
            return false;
        }
        let delay_ms = match state.phase {
            GamePhase::AwaitingFirst => self.config.timings.ai_think_ms,
            GamePhase::AwaitingSecond => self.config.timings.ai_second_pick_ms,
            _ => return false,
        };
        debug!(player_id, phase = ?state.phase, "ai move resumed");
        self.schedule_ai(player_id, delay_ms);
        true
    }

    /// 结束当前对局并清除相关的一切。
    pub fn reset(&mut self) {
        if self.engine.is_some() {
            info!("game reset");
        }
        self.scheduler.clear();
        self.pending_ai = None;
        for agent in self.agents.values_mut() {
            agent.clear_memory();
        }
        self.agents.clear();
        self.engine = None;
        self.pending_events.clear();
    }

    pub fn engine(&self) -> Option<&MatchEngine> {
        self.engine.as_ref()
    }

    pub fn state(&self) -> Option<&GameState> {
        self.engine.as_ref().map(MatchEngine::state)
    }

    pub fn board(&self) -> Option<&Board> {
        self.engine.as_ref().map(MatchEngine::board)
    }

    pub fn agent(&self, seat: PlayerId) -> Option<&AiAgent> {
        self.agents.get(&seat)
    }

    pub fn has_pending_move(&self) -> bool {
        self.pending_ai.is_some()
    }

    /// 尚未交给宿主的事件，按发生顺序排列。
    pub fn drain_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.pending_events)
    }

    /// 当前座位的电脑会选哪张牌。玩家座位使用按配置难度、回放过本局事件的顾问。
    pub fn suggest_move(&self) -> Result<Option<AiDecision>, SessionError> {
        let engine = self.engine.as_ref().ok_or(SessionError::NoActiveGame)?;
        let state = engine.state();
        let mut advisor = match self.agents.get(&state.current_player) {
            Some(agent) => agent.clone(),
            None => {
                let mut agent = AiAgent::new(AiConfig::from_difficulty(self.config.difficulty));
                for memory_event in state.event_log.iter().filter_map(GameEvent::memory_event) {
                    agent.observe(&memory_event);
                }
                agent
            }
        };
        Ok(advisor.choose_move(&engine.selectable_cards(), state))
    }
}

fn notify(observer: &mut dyn GameObserver, event: &GameEvent) {
    match event {
        GameEvent::GameStarted { .. } => {}
        GameEvent::CardRevealed { fact, .. } => {
            observer.on_card_revealed(fact.card, &fact.display_text)
        }
        GameEvent::PairMatched { first, second, .. } => observer.on_match(*first, *second),
        GameEvent::PairMismatched { first, second, .. } => observer.on_mismatch(*first, *second),
        GameEvent::CardsHidden { first, second } => observer.on_cards_hidden(*first, *second),
        GameEvent::TurnChanged { player_id } => observer.on_turn_changed(*player_id),
        GameEvent::GameOver { outcome } => observer.on_game_over(outcome),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::AiDifficulty;
    use crate::game::{CardStatus, Cell, GameMode, Grid, Operation, Timings};
    use pretty_assertions::assert_eq;

    // Operation cards: 1+1=2, 2+2=4. Result slots: [4, 2].
    fn small_board() -> Board {
        let grid = Grid::from_cells(
            1,
            2,
            vec![
                Cell::new(0, 0, 1, 1, Operation::Add).expect("cell"),
                Cell::new(0, 1, 2, 2, Operation::Add).expect("cell"),
            ],
        )
        .expect("grid");
        Board::with_layout(grid, &[1, 0]).expect("board")
    }

    fn config(mode: GameMode) -> GameConfig {
        GameConfig {
            rows: 1,
            cols: 2,
            mode,
            difficulty: AiDifficulty::Hard,
            seed: Some(11),
            ..GameConfig::default()
        }
    }

    #[test]
    fn picks_need_a_running_game() {
        let mut session = GameSession::new(GameConfig::default());
        assert_eq!(
            session.submit_pick(0, CardRef::operation(0, 0)).map(|_| ()),
            Err(SessionError::NoActiveGame)
        );
    }

    #[test]
    fn ai_seat_rejects_human_picks() {
        let mut session = GameSession::new(GameConfig::default());
        session.start_with_board(config(GameMode::Pve), small_board());
        assert_eq!(
            session.submit_pick(1, CardRef::operation(0, 0)).map(|_| ()),
            Err(SessionError::SeatIsAi { seat: 1 })
        );
    }

    #[test]
    fn mismatch_settles_only_after_delay() {
        let mut session = GameSession::new(GameConfig::default());
        session.start_with_board(config(GameMode::Pvp), small_board());
        session.submit_pick(0, CardRef::operation(0, 0)).expect("first");
        session.submit_pick(0, CardRef::result(0, 0)).expect("second");

        assert_eq!(session.next_deadline(), Some(1500));
        assert_eq!(session.pump(1499), Ok(0));
        assert_eq!(session.state().map(|s| s.phase), Some(GamePhase::Mismatched));

        assert_eq!(session.pump(1500), Ok(1));
        let state = session.state().expect("state");
        assert_eq!(state.current_player, 1);
        assert_eq!(state.status(&CardRef::result(0, 0)), Some(CardStatus::Hidden));
    }

    #[test]
    fn ai_turn_runs_both_picks_through_the_scheduler() {
        let mut session = GameSession::new(GameConfig::default());
        let config = GameConfig {
            timings: Timings::instant(),
            ..config(GameMode::AiVsAi)
        };
        session.start_with_board(config, small_board());
        assert!(session.has_pending_move());

        session.run_until_idle(100).expect("ai game");
        let state = session.state().expect("state");
        assert_eq!(state.phase, GamePhase::GameOver);
        assert!(state.all_matched());
        assert!(!session.has_pending_move());
        assert_eq!(session.next_deadline(), None);
    }

    #[test]
    fn cancelled_ai_move_never_fires() {
        let mut session = GameSession::new(GameConfig::default());
        session.start_with_board(config(GameMode::AiVsAi), small_board());
        assert_eq!(session.next_deadline(), Some(1000));

        assert!(session.cancel_pending_move());
        assert!(!session.cancel_pending_move());
        assert_eq!(session.pump(10_000), Ok(0));
        assert_eq!(session.state().map(|s| s.phase), Some(GamePhase::AwaitingFirst));
    }

    #[test]
    fn cancelled_first_pick_can_be_resumed() {
        let mut session = GameSession::new(GameConfig::default());
        session.start_with_board(config(GameMode::AiVsAi), small_board());
        assert!(session.cancel_pending_move());
        session.pump(500).expect("idle pump");

        assert!(session.resume_pending_move());
        assert!(!session.resume_pending_move());
        assert_eq!(session.next_deadline(), Some(1500));
        assert_eq!(session.pump(1499), Ok(0));
        assert_eq!(session.pump(1500), Ok(1));
        assert_eq!(session.state().map(|s| s.phase), Some(GamePhase::AwaitingSecond));
    }

    #[test]
    fn cancelled_second_pick_can_be_resumed() {
        let mut session = GameSession::new(GameConfig::default());
        session.start_with_board(config(GameMode::AiVsAi), small_board());
        assert_eq!(session.pump(1000), Ok(1));
        assert!(session.cancel_pending_move());
        assert_eq!(session.pump(5000), Ok(0));
        assert_eq!(session.state().map(|s| s.phase), Some(GamePhase::AwaitingSecond));

        assert!(session.resume_pending_move());
        assert_eq!(session.next_deadline(), Some(6000));
        assert_eq!(session.pump(6000), Ok(1));
        let state = session.state().expect("state");
        assert!(matches!(
            state.phase,
            GamePhase::AwaitingFirst | GamePhase::Mismatched
        ));
    }

    #[test]
    fn resume_is_a_no_op_for_human_turns() {
        let mut session = GameSession::new(GameConfig::default());
        assert!(!session.resume_pending_move());
        session.start_with_board(config(GameMode::Pvp), small_board());
        assert!(!session.resume_pending_move());
        assert_eq!(session.next_deadline(), None);
    }

    #[test]
    fn reset_drops_game_and_timers() {
        let mut session = GameSession::new(GameConfig::default());
        session.start_with_board(config(GameMode::Pve), small_board());
        session.reset();
        assert!(session.state().is_none());
        assert!(session.agent(1).is_none());
        assert_eq!(session.next_deadline(), None);
        assert!(session.drain_events().is_empty());
    }

    #[test]
    fn suggestion_for_human_seat_uses_watched_reveals() {
        let mut session = GameSession::new(GameConfig::default());
        session.start_with_board(config(GameMode::Pvp), small_board());
        session.submit_pick(0, CardRef::operation(0, 0)).expect("first");
        session.submit_pick(0, CardRef::result(0, 0)).expect("second");
        session.pump(1500).expect("settle");
        // 2+2 is pending; the 4 seen during the mismatch completes it.
        session.submit_pick(1, CardRef::operation(0, 1)).expect("first");

        let decision = session.suggest_move().expect("game running").expect("move");
        assert_eq!(decision.card, CardRef::result(0, 0));
    }
}
