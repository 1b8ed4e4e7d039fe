use crate::error::{GameError, GameResult};
use crate::round::{MultiplierSample, RoundId};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AutoCashout {
    pub enabled: bool,
    pub threshold: f64,
}

impl Default for AutoCashout {
    fn default() -> Self {
        Self::disabled()
    }
}

impl AutoCashout {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            threshold: 2.0,
        }
    }

    pub fn at(threshold: f64) -> Self {
        Self {
            enabled: true,
            threshold,
        }
    }

    /// Thresholds at or below 1.00x never fire.
    pub fn is_armed(&self) -> bool {
        self.enabled && self.threshold.is_finite() && self.threshold > 1.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CashoutTrigger {
    Auto,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CashoutRequest {
    pub round_id: RoundId,
    pub multiplier: f64,
    pub trigger: CashoutTrigger,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CashoutPhase {
    Idle,
    InFlight(CashoutRequest),
    Cashed { multiplier: f64 },
    Crashed,
}

/// Single-shot cashout guard for one round at a time.
#[derive(Debug, Clone)]
pub struct CashoutController {
    round_id: Option<RoundId>,
    phase: CashoutPhase,
}

impl Default for CashoutController {
    fn default() -> Self {
        Self::new()
    }
}

impl CashoutController {
    pub fn new() -> Self {
        Self {
            round_id: None,
            phase: CashoutPhase::Idle,
        }
    }

    pub fn reset(&mut self, round_id: RoundId) {
        self.round_id = Some(round_id);
        self.phase = CashoutPhase::Idle;
    }

    pub fn evaluate(
        &mut self,
        sample: &MultiplierSample,
        settings: &AutoCashout,
    ) -> Option<CashoutRequest> {
        if !settings.is_armed() || sample.multiplier < settings.threshold {
            return None;
        }
        self.begin(sample.multiplier, CashoutTrigger::Auto).ok()
    }

    pub fn request_manual(&mut self, multiplier: f64) -> GameResult<CashoutRequest> {
        self.begin(multiplier, CashoutTrigger::Manual)
    }

    fn begin(&mut self, multiplier: f64, trigger: CashoutTrigger) -> GameResult<CashoutRequest> {
        let round_id = self
            .round_id
            .ok_or_else(|| GameError::invalid("no round to cash out"))?;
        match self.phase {
            CashoutPhase::Idle => {}
            CashoutPhase::InFlight(_) => {
                return Err(GameError::invalid(format!(
                    "cashout already requested for round {round_id}"
                )))
            }
            CashoutPhase::Cashed { .. } | CashoutPhase::Crashed => {
                return Err(GameError::AlreadyResolved(format!(
                    "round {round_id} is already resolved"
                )))
            }
        }
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(GameError::invalid(format!(
                "invalid cash out multiplier {multiplier}"
            )));
        }
        let request = CashoutRequest {
            round_id,
            multiplier,
            trigger,
        };
        self.phase = CashoutPhase::InFlight(request);
        Ok(request)
    }

    pub fn resolve_cashed(&mut self, multiplier: f64) {
        self.phase = CashoutPhase::Cashed { multiplier };
    }

    /// The round ended without a successful cashout: the crash tick arrived
    /// first or the server refused the request. No retry follows.
    pub fn mark_crashed(&mut self) {
        if !matches!(self.phase, CashoutPhase::Cashed { .. }) {
            self.phase = CashoutPhase::Crashed;
        }
    }

    pub fn phase(&self) -> CashoutPhase {
        self.phase
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(self.phase, CashoutPhase::InFlight(_))
    }

    pub fn round_id(&self) -> Option<RoundId> {
        self.round_id
    }
}
