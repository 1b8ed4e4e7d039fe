use crash_shared::RoundSummary;

/// Totals over a player's round history. Rounds with neither a cashout nor a
/// crash point are still in play and only counted as pending.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HistorySummary {
    pub total: usize,
    pub wins: usize,
    pub losses: usize,
    pub pending: usize,
    /// Percentage of settled rounds that were cashed out.
    pub win_rate: f64,
    pub net: f64,
}

impl HistorySummary {
    pub fn from_rounds(rounds: &[RoundSummary]) -> Self {
        let mut s = Self {
            total: rounds.len(),
            ..Self::default()
        };
        for r in rounds {
            match (r.cashed_out_at, r.crashed_at) {
                (Some(m), _) => {
                    s.wins += 1;
                    s.net += r.bet_amount * (m - 1.0);
                }
                (None, Some(_)) => {
                    s.losses += 1;
                    s.net -= r.bet_amount;
                }
                (None, None) => s.pending += 1,
            }
        }
        let settled = s.wins + s.losses;
        if settled > 0 {
            s.win_rate = s.wins as f64 / settled as f64 * 100.0;
        }
        s
    }
}
