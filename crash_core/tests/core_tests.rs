use chrono::{TimeZone, Utc};
use proptest::prelude::*;

use crash_core::fairness::{MAX_CRASH_MULTIPLIER, MIN_CRASH_MULTIPLIER};
use crash_core::{
    derive_outcome, AutoCashout, CashoutController, ChartAccumulator, Clock, GameType, ManualClock,
    MultiplierClock, Outcome, ProvablyFairSeeds, RoundId, Tick,
};

#[test]
fn outcome_repeatable() {
    let a = derive_outcome("s", "c", 42, GameType::Crash).unwrap();
    let b = derive_outcome("s", "c", 42, GameType::Crash).unwrap();
    assert_eq!(a, b);
}

#[test]
fn golden_fixture() {
    assert_eq!(
        derive_outcome("abc", "xyz", 1, GameType::Crash).unwrap(),
        Outcome::Crash { multiplier: 2.04 }
    );
}

#[test]
fn instant_crash_rate_smoke() {
    let mut instant = 0;
    for n in 0..2000u64 {
        if let Outcome::Crash { multiplier } = derive_outcome("server", "client", n, GameType::Crash).unwrap() {
            if multiplier == 1.0 {
                instant += 1;
            }
        }
    }
    // 1 in 20 by construction, plus a few natural 1.00x results
    assert!((70..=200).contains(&instant), "instant crashes: {instant}");
}

// One round driven tick by tick in virtual time: the clock feeds the chart
// and the cashout controller, and the crash tick ends it.
#[test]
fn virtual_round_pipeline() {
    let start = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    let clock = ManualClock::new(start);
    let mut multiplier = MultiplierClock::new();
    let mut chart = ChartAccumulator::new();
    let mut cashout = CashoutController::new();
    let round = RoundId(11);
    chart.reset(round);
    cashout.reset(round);
    multiplier.start(start, Some(2.04)).unwrap();

    let auto = AutoCashout::at(3.0);
    let mut crashed_at = None;
    for _ in 0..1_000 {
        match multiplier.tick(clock.now()).unwrap() {
            Tick::Sample(s) => {
                chart.push(s);
                assert!(cashout.evaluate(&s, &auto).is_none());
            }
            Tick::Crashed(s) => {
                chart.push(s);
                cashout.mark_crashed();
                crashed_at = Some(s.multiplier);
                break;
            }
            Tick::Stale => {}
        }
        clock.advance(crash_core::multiplier::TICK_INTERVAL);
    }
    assert_eq!(crashed_at, Some(2.04));
    assert!(chart.iter().all(|s| s.multiplier <= 2.04));
    // 10.4s of round time at 50ms per tick, first tick at t=0
    assert_eq!(chart.len(), 209);
    assert_eq!(chart.latest().unwrap().multiplier, 2.04);
}

proptest! {
    #[test]
    fn crash_outcome_in_range(server in "[a-z0-9]{1,24}", client in "[a-z0-9]{1,24}", nonce in any::<u64>()) {
        let out = derive_outcome(&server, &client, nonce, GameType::Crash).unwrap();
        let Outcome::Crash { multiplier } = out else { panic!("wrong game") };
        prop_assert!(multiplier >= MIN_CRASH_MULTIPLIER);
        prop_assert!(multiplier <= MAX_CRASH_MULTIPLIER);
        prop_assert_eq!((multiplier * 100.0).round() / 100.0, multiplier);
    }

    #[test]
    fn derive_is_deterministic(server in ".{1,32}", client in ".{1,32}", nonce in any::<u64>()) {
        for game in [GameType::Crash, GameType::Coinflip] {
            prop_assert_eq!(
                derive_outcome(&server, &client, nonce, game).unwrap(),
                derive_outcome(&server, &client, nonce, game).unwrap()
            );
        }
    }

    #[test]
    fn mod_twenty_digest_is_instant_crash(nonce in 0u64..5_000) {
        let seeds = ProvablyFairSeeds::new("prop-server", "prop-client", nonce).unwrap();
        let digest = seeds.digest();
        let h_mod_20 = digest.iter().fold(0u32, |acc, b| (acc * 256 + *b as u32) % 20);
        if h_mod_20 == 0 {
            prop_assert_eq!(seeds.outcome(GameType::Crash), Outcome::Crash { multiplier: 1.0 });
        }
    }

    #[test]
    fn clamped_value_never_exceeds_target(target in 1.0f64..5.0, step_ms in 10u64..500) {
        let start = Utc::now();
        let clock = ManualClock::new(start);
        let mut m = MultiplierClock::new();
        m.start(start, Some(target)).unwrap();
        loop {
            match m.tick(clock.now()).unwrap() {
                Tick::Sample(s) => prop_assert!(s.multiplier < target),
                Tick::Crashed(s) => { prop_assert_eq!(s.multiplier, target); break; }
                Tick::Stale => {}
            }
            clock.advance(std::time::Duration::from_millis(step_ms));
        }
    }
}
