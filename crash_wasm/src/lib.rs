use chrono::{DateTime, Utc};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen::JsValue;
use web_sys::{CanvasRenderingContext2d, HtmlCanvasElement};

use crash_core::multiplier::{self, ClockState, StopReason};
use crash_core::{
    fairness, ChartAccumulator, ChartPhase, GameError, GameType, MultiplierClock, Outcome,
    ProvablyFairSeeds, RoundId, Tick,
};

fn js_err(e: GameError) -> JsValue {
    JsValue::from_str(&e.to_string())
}

fn seeds(server_seed: &str, client_seed: &str, nonce: &str) -> Result<ProvablyFairSeeds, JsValue> {
    ProvablyFairSeeds::parse(server_seed, client_seed, nonce).map_err(js_err)
}

fn from_epoch_ms(ms: f64) -> Result<DateTime<Utc>, JsValue> {
    if !ms.is_finite() {
        return Err(JsValue::from_str("timestamp must be a finite number of milliseconds"));
    }
    DateTime::from_timestamp_millis(ms.round() as i64)
        .ok_or_else(|| JsValue::from_str("timestamp out of range"))
}

#[wasm_bindgen]
pub fn crash_multiplier(server_seed: &str, client_seed: &str, nonce: &str) -> Result<f64, JsValue> {
    match seeds(server_seed, client_seed, nonce)?.outcome(GameType::Crash) {
        Outcome::Crash { multiplier } => Ok(multiplier),
        Outcome::Coinflip { .. } => Err(JsValue::from_str("not a crash outcome")),
    }
}

/// "heads" or "tails".
#[wasm_bindgen]
pub fn coin_face(server_seed: &str, client_seed: &str, nonce: &str) -> Result<String, JsValue> {
    Ok(seeds(server_seed, client_seed, nonce)?
        .outcome(GameType::Coinflip)
        .to_string())
}

#[wasm_bindgen]
pub fn verify_crash(
    server_seed: &str,
    client_seed: &str,
    nonce: &str,
    reported: f64,
) -> Result<bool, JsValue> {
    let nonce = fairness::parse_nonce(nonce).map_err(js_err)?;
    fairness::verify(
        &Outcome::Crash {
            multiplier: reported,
        },
        server_seed,
        client_seed,
        nonce,
        GameType::Crash,
    )
    .map_err(js_err)
}

#[wasm_bindgen]
pub fn server_seed_hash(server_seed: &str) -> String {
    fairness::derive_hash_hex(server_seed.as_bytes())
}

#[wasm_bindgen]
pub fn multiplier_at(elapsed_seconds: f64) -> f64 {
    multiplier::multiplier_at(elapsed_seconds)
}

/// Curve state of one round on the page. The page owns the timer and calls
/// `tick` with `Date.now()`.
#[wasm_bindgen]
#[derive(Default)]
pub struct RoundView {
    clock: MultiplierClock,
    chart: ChartAccumulator,
    rounds: i64,
}

#[wasm_bindgen]
impl RoundView {
    #[wasm_bindgen(constructor)]
    pub fn new() -> RoundView {
        RoundView::default()
    }

    pub fn start(&mut self, start_ms: f64, crash_multiplier: Option<f64>) -> Result<(), JsValue> {
        let start = from_epoch_ms(start_ms)?;
        let mut clock = MultiplierClock::new();
        clock.start(start, crash_multiplier).map_err(js_err)?;
        self.clock = clock;
        self.rounds += 1;
        self.chart.reset(RoundId(self.rounds));
        Ok(())
    }

    /// Returns the multiplier shown after this tick.
    pub fn tick(&mut self, now_ms: f64) -> Result<f64, JsValue> {
        if !self.clock.is_running() {
            return Ok(self.shown());
        }
        match self.clock.tick(from_epoch_ms(now_ms)?).map_err(js_err)? {
            Tick::Sample(s) | Tick::Crashed(s) => {
                self.chart.push(s);
            }
            Tick::Stale => {}
        }
        Ok(self.shown())
    }

    pub fn stop_cashed(&mut self, multiplier: f64) -> Result<(), JsValue> {
        self.clock.stop_as_cashed(multiplier).map_err(js_err)
    }

    pub fn is_running(&self) -> bool {
        self.clock.is_running()
    }

    pub fn crashed(&self) -> bool {
        self.clock.state() == ClockState::Stopped(StopReason::Crashed)
    }

    pub fn points_json(&self) -> Result<String, JsValue> {
        serde_json::to_string(self.chart.samples()).map_err(|e| JsValue::from_str(&e.to_string()))
    }

    pub fn viewport_json(&self) -> Result<String, JsValue> {
        serde_json::to_string(&self.chart.viewport(self.phase()))
            .map_err(|e| JsValue::from_str(&e.to_string()))
    }

    pub fn draw(&self, canvas: &HtmlCanvasElement) -> Result<(), JsValue> {
        let ctx: CanvasRenderingContext2d = canvas
            .get_context("2d")?
            .ok_or_else(|| JsValue::from_str("canvas has no 2d context"))?
            .dyn_into()?;
        let (w, h) = (canvas.width() as f64, canvas.height() as f64);
        ctx.set_fill_style(&JsValue::from_str("#111"));
        ctx.fill_rect(0.0, 0.0, w, h);

        let view = self.chart.viewport(self.phase());
        let x = |t: f64| t / view.max_seconds * w;
        let y = |m: f64| h - (m - 1.0) / (view.max_multiplier - 1.0) * h;
        let colour = if self.crashed() { "#e74c3c" } else { "#2ecc71" };

        ctx.begin_path();
        ctx.move_to(0.0, h);
        for s in &self.chart {
            ctx.line_to(x(s.elapsed_seconds), y(s.multiplier));
        }
        ctx.set_stroke_style(&JsValue::from_str(colour));
        ctx.set_line_width(3.0);
        ctx.stroke();

        ctx.set_fill_style(&JsValue::from_str(colour));
        ctx.set_font("bold 32px sans-serif");
        ctx.fill_text(
            &format!("{:.2}x", self.shown()),
            w / 2.0 - 48.0,
            h / 2.0,
        )
    }

    fn shown(&self) -> f64 {
        self.clock
            .final_multiplier()
            .unwrap_or_else(|| self.clock.current_multiplier())
    }

    fn phase(&self) -> ChartPhase {
        match (self.clock.state(), self.clock.final_multiplier()) {
            (ClockState::Running, _) => ChartPhase::Active,
            (ClockState::Stopped(StopReason::Crashed), Some(m)) => ChartPhase::Crashed {
                crash_multiplier: m,
            },
            _ => ChartPhase::Idle,
        }
    }
}
