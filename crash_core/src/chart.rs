use serde::Serialize;

use crate::round::{MultiplierSample, RoundId};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChartPhase {
    Active,
    Crashed { crash_multiplier: f64 },
    Idle,
}

/// Axis bounds for a renderer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Viewport {
    pub max_seconds: f64,
    pub max_multiplier: f64,
}

/// Multiplier samples of the current round, in tick order.
#[derive(Debug, Clone, Default)]
pub struct ChartAccumulator {
    round_id: Option<RoundId>,
    samples: Vec<MultiplierSample>,
}

impl ChartAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self, round_id: RoundId) {
        self.round_id = Some(round_id);
        self.samples.clear();
    }

    /// Appends `sample` unless it does not move time forward.
    pub fn push(&mut self, sample: MultiplierSample) -> bool {
        if let Some(last) = self.samples.last() {
            if sample.elapsed_seconds <= last.elapsed_seconds {
                return false;
            }
        }
        self.samples.push(sample);
        true
    }

    pub fn round_id(&self) -> Option<RoundId> {
        self.round_id
    }

    pub fn samples(&self) -> &[MultiplierSample] {
        &self.samples
    }

    pub fn iter(&self) -> impl Iterator<Item = &MultiplierSample> + '_ {
        self.samples.iter()
    }

    pub fn latest(&self) -> Option<&MultiplierSample> {
        self.samples.last()
    }

    pub fn peak(&self) -> f64 {
        self.samples
            .iter()
            .map(|s| s.multiplier)
            .fold(1.0, f64::max)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn viewport(&self, phase: ChartPhase) -> Viewport {
        let t = self
            .samples
            .iter()
            .map(|s| s.elapsed_seconds)
            .fold(0.0, f64::max);
        let m = self.peak();
        let (x, y) = match phase {
            ChartPhase::Active => ((t * 1.2).max(5.0), (m * 1.3).max(2.0)),
            ChartPhase::Crashed { crash_multiplier } => (
                (t * 1.1).max(3.0),
                (crash_multiplier * 1.2).max(m * 1.1).max(2.0),
            ),
            ChartPhase::Idle => (t.max(10.0), m.max(2.0)),
        };
        Viewport {
            max_seconds: x.clamp(3.0, 60.0),
            max_multiplier: y.clamp(1.5, 100.0),
        }
    }
}

impl<'a> IntoIterator for &'a ChartAccumulator {
    type Item = &'a MultiplierSample;
    type IntoIter = std::slice::Iter<'a, MultiplierSample>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.iter()
    }
}
