pub mod ai;
pub mod game;
pub mod session;

use std::fmt::Display;
use std::str::FromStr;

use gloo_timers::future::TimeoutFuture;
use serde::Serialize;
use serde_wasm_bindgen::{from_value, to_value};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::future_to_promise;
use web_sys::js_sys::{Date, Promise};

pub use ai::{AiAgent, AiConfig, AiDecision, AiDifficulty, AiMemory, DecisionRule, MemoryStats};
pub use game::{
    Board, CardKind, CardRef, CardStatus, Cell, GameConfig, GameEvent, GameMode, GameOutcome,
    GamePhase, GameState, GeneratorError, Grid, IntegrityError, MatchEngine, MemoryEvent,
    Operation, PickOutcome, Player, PlayerId, PuzzleGenerator, RevealedFact, RuleError,
    RuleResolution, Scoring, Timings,
};
pub use session::{GameObserver, GameSession, SessionError};

#[cfg(feature = "wee_alloc")]
#[global_allocator]
static ALLOC: wee_alloc::WeeAlloc = wee_alloc::WeeAlloc::INIT;

#[wasm_bindgen(start)]
pub fn start() {
    set_panic_hook();
}

fn to_js_error<E: Serialize + Display>(error: E) -> JsValue {
    to_value(&error).unwrap_or_else(|_| JsValue::from_str(&error.to_string()))
}

fn serde_to_js_error<E: Display>(error: E) -> JsValue {
    JsValue::from_str(&error.to_string())
}

fn to_json<T: Serialize>(value: &T) -> Result<String, JsValue> {
    serde_json::to_string(value).map_err(serde_to_js_error)
}

fn now_ms() -> u64 {
    Date::now() as u64
}

fn parse_config(config_json: Option<String>) -> Result<GameConfig, JsValue> {
    match config_json {
        Some(json) => GameConfig::from_json(&json).map_err(serde_to_js_error),
        None => Ok(GameConfig::default()),
    }
}

#[derive(Serialize)]
struct PickResponse<'a> {
    resolution: RuleResolution,
    state: &'a GameState,
}

#[wasm_bindgen]
pub struct MemoryMathEngine {
    session: GameSession,
}

#[wasm_bindgen]
impl MemoryMathEngine {
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: Option<String>) -> Result<MemoryMathEngine, JsValue> {
        let config = parse_config(config_json)?;
        Ok(MemoryMathEngine {
            session: GameSession::new(config),
        })
    }

    /// 开始新对局，未传配置时沿用当前配置。
    pub fn start_game(&mut self, config_json: Option<String>) -> Result<String, JsValue> {
        let config = match config_json {
            Some(json) => GameConfig::from_json(&json).map_err(serde_to_js_error)?,
            None => self.session.config().clone(),
        };
        self.session.sync_clock(now_ms());
        let events = self.session.start_game(config).map_err(to_js_error)?;
        to_json(&events)
    }

    /// `card_id` 为界面卡牌标识，如 `card-op-0-2`。
    pub fn submit_pick(&mut self, seat: u8, card_id: &str) -> Result<String, JsValue> {
        let card = CardRef::from_str(card_id).map_err(serde_to_js_error)?;
        self.session.sync_clock(now_ms());
        let resolution = self.session.submit_pick(seat, card).map_err(to_js_error)?;
        let state = self
            .session
            .state()
            .ok_or_else(|| to_js_error(SessionError::NoActiveGame))?;
        to_json(&PickResponse { resolution, state })
    }

    /// 执行到期的电脑翻牌与盖牌任务，返回执行数量。
    pub fn pump(&mut self, now_ms_override: Option<f64>) -> Result<u32, JsValue> {
        let now = now_ms_override.map(|value| value as u64).unwrap_or_else(now_ms);
        let ran = self.session.pump(now).map_err(to_js_error)?;
        Ok(u32::try_from(ran).unwrap_or(u32::MAX))
    }

    pub fn next_deadline(&self) -> Option<f64> {
        self.session.next_deadline().map(|deadline| deadline as f64)
    }

    pub fn cancel_pending_move(&mut self) -> bool {
        self.session.cancel_pending_move()
    }

    pub fn resume_pending_move(&mut self) -> bool {
        self.session.sync_clock(now_ms());
        self.session.resume_pending_move()
    }

    pub fn reset(&mut self) {
        self.session.reset();
    }

    pub fn state_json(&self) -> Result<String, JsValue> {
        to_json(&self.session.state())
    }

    pub fn board_json(&self) -> Result<String, JsValue> {
        to_json(&self.session.board())
    }

    pub fn drain_events_json(&mut self) -> Result<String, JsValue> {
        to_json(&self.session.drain_events())
    }

    /// 等待 `delay_ms` 后返回当前玩家的建议翻牌。
    pub fn think_ai(&self, delay_ms: Option<u32>) -> Promise {
        let suggestion = self.session.suggest_move();
        let delay = delay_ms.unwrap_or(0);

        future_to_promise(async move {
            if delay > 0 {
                TimeoutFuture::new(delay).await;
            }
            let decision = suggestion.map_err(to_js_error)?;
            let json = to_json(&decision)?;
            Ok(JsValue::from_str(&json))
        })
    }
}

/// 生成一张题目网格，`operations` 缺省时启用全部四种运算。
#[wasm_bindgen(js_name = "generatePuzzle")]
pub fn generate_puzzle(rows: usize, cols: usize, operations: JsValue) -> Result<JsValue, JsValue> {
    let operations: Vec<Operation> = if operations.is_undefined() || operations.is_null() {
        Operation::ALL.to_vec()
    } else {
        from_value(operations).map_err(JsValue::from)?
    };
    let grid = PuzzleGenerator::new()
        .generate(rows, cols, &operations)
        .map_err(to_js_error)?;
    to_value(&grid).map_err(JsValue::from)
}

/// 返回运算对应的显示符号，无法识别时返回 `undefined`。
#[wasm_bindgen(js_name = "operationSymbol")]
pub fn operation_symbol(operation: &str) -> Option<String> {
    Operation::from_str(operation)
        .ok()
        .map(|operation| operation.symbol().to_string())
}

#[wasm_bindgen(js_name = "validateState")]
pub fn validate_state(state: JsValue) -> Result<(), JsValue> {
    let state: GameState = from_value(state).map_err(JsValue::from)?;
    state
        .integrity_check()
        .map_err(|error| to_js_error(RuleError::IntegrityViolation { error }))
}

#[cfg(feature = "console_error_panic_hook")]
fn set_panic_hook() {
    console_error_panic_hook::set_once();
}

#[cfg(not(feature = "console_error_panic_hook"))]
fn set_panic_hook() {}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn operation_symbol_accepts_names_and_glyphs() {
        assert_eq!(operation_symbol("add"), Some("+".to_string()));
        assert_eq!(operation_symbol(" Subtract "), Some("-".to_string()));
        assert_eq!(operation_symbol("x"), Some("×".to_string()));
        assert_eq!(operation_symbol("÷"), Some("÷".to_string()));
        assert_eq!(operation_symbol("modulo"), None);
        assert_eq!(operation_symbol(""), None);
    }

    #[test]
    fn missing_config_falls_back_to_defaults() {
        let config = parse_config(None).ok();
        assert_eq!(config, Some(GameConfig::default()));
    }

    #[test]
    fn partial_config_json_keeps_other_defaults() {
        let config = parse_config(Some(r#"{"rows":2,"mode":"pvp"}"#.to_string()))
            .ok()
            .expect("config");
        assert_eq!(config.rows, 2);
        assert_eq!(config.cols, GameConfig::default().cols);
        assert_eq!(config.mode, GameMode::Pvp);
        assert_eq!(config.timings, Timings::default());
    }
}
