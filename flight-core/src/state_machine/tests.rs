// state_machine/tests.rs
use super::*;
use crate::config::FlightConfig;

fn config() -> FlightConfig {
    FlightConfig {
        time_to_apogee: Duration::from_secs(20),
        ..FlightConfig::DEFAULT
    }
}

fn est(agl: f32, velocity: f32, accel: f32, t_ms: u64) -> KinematicEstimate {
    KinematicEstimate {
        altitude_msl: agl + FlightConfig::DEFAULT.base_altitude_m,
        altitude_agl: agl,
        vertical_velocity: velocity,
        vertical_acceleration: accel,
        pressure: 0.0,
        temperature: 15.0,
        sample_time: Instant::from_millis(t_ms),
        valid: true,
    }
}

fn step(sm: &mut FlightStateMachine, e: KinematicEstimate) -> Option<PhaseTransition> {
    sm.update(&e, e.sample_time)
}

/// Drives a fresh machine into `Coasting` at t=1.2s.
fn coasting() -> FlightStateMachine {
    let mut sm = FlightStateMachine::new(config());
    step(&mut sm, est(0.0, 20.0, 60.0, 1_000));
    step(&mut sm, est(2.0, 30.0, 60.0, 1_040));
    assert_eq!(sm.phase(), FlightPhase::PoweredFlight);
    step(&mut sm, est(400.0, 200.0, 0.5, 1_100));
    step(&mut sm, est(408.0, 199.0, 0.4, 1_140));
    step(&mut sm, est(416.0, 198.0, 0.3, 1_200));
    assert_eq!(sm.phase(), FlightPhase::Coasting);
    sm
}

#[test]
fn test_initial_state() {
    let sm = FlightStateMachine::new(config());
    assert_eq!(sm.phase(), FlightPhase::PreFlight);
    assert_eq!(sm.launched_at(), None);
}

#[test]
fn test_launch_needs_sustained_velocity() {
    let mut sm = FlightStateMachine::new(config());

    // A single gust over the threshold is not a launch.
    assert!(step(&mut sm, est(0.0, 15.0, 9.8, 0)).is_none());
    assert!(step(&mut sm, est(0.0, 0.0, 9.8, 40)).is_none());
    assert_eq!(sm.phase(), FlightPhase::PreFlight);

    step(&mut sm, est(1.0, 15.0, 60.0, 80));
    let t = step(&mut sm, est(2.0, 25.0, 60.0, 120)).unwrap();
    assert_eq!(t.from, FlightPhase::PreFlight);
    assert_eq!(t.to, FlightPhase::PoweredFlight);
    assert!(!t.forced);
    assert_eq!(sm.launched_at(), Some(Instant::from_millis(120)));
}

#[test]
fn test_invalid_estimate_does_not_advance() {
    let mut sm = FlightStateMachine::new(config());
    let mut e = est(50.0, 100.0, 60.0, 0);
    e.valid = false;
    for t in 0..10 {
        e.sample_time = Instant::from_millis(t * 40);
        assert!(step(&mut sm, e).is_none());
    }
    assert_eq!(sm.phase(), FlightPhase::PreFlight);
}

#[test]
fn test_burnout_requires_positive_velocity() {
    let mut sm = FlightStateMachine::new(config());
    step(&mut sm, est(0.0, 20.0, 60.0, 0));
    step(&mut sm, est(1.0, 20.0, 60.0, 40));
    assert_eq!(sm.phase(), FlightPhase::PoweredFlight);

    // Low acceleration but not climbing: not a burnout.
    for i in 0..5 {
        step(&mut sm, est(1.0, -1.0, 0.0, 80 + i * 40));
    }
    assert_eq!(sm.phase(), FlightPhase::PoweredFlight);

    step(&mut sm, est(10.0, 50.0, 1.0, 400));
    step(&mut sm, est(12.0, 50.0, 1.0, 440));
    assert_eq!(sm.phase(), FlightPhase::PoweredFlight);
    step(&mut sm, est(14.0, 50.0, 1.0, 480));
    assert_eq!(sm.phase(), FlightPhase::Coasting);
}

#[test]
fn test_apogee_on_velocity_sign_change() {
    let mut sm = coasting();
    assert!(step(&mut sm, est(1500.0, 3.0, -9.0, 5_000)).is_none());
    let t = step(&mut sm, est(1500.5, 0.0, -9.0, 5_040)).unwrap();
    assert_eq!(t.to, FlightPhase::Apogee);
}

#[test]
fn test_apogee_lasts_one_cycle() {
    let mut sm = coasting();
    step(&mut sm, est(1500.0, 1.0, -9.0, 5_000));
    step(&mut sm, est(1499.0, -1.0, -9.0, 5_040));
    assert_eq!(sm.phase(), FlightPhase::Apogee);

    // Even a rising estimate cannot hold the machine at Apogee.
    step(&mut sm, est(1499.5, 2.0, -9.0, 5_080));
    assert_eq!(sm.phase(), FlightPhase::BallisticDescent);
    assert_eq!(sm.transition_time(FlightPhase::Apogee), Some(Instant::from_millis(5_040)));
}

#[test]
fn test_ejection_height_starts_parachute_descent() {
    let mut sm = coasting();
    step(&mut sm, est(1500.0, 1.0, -9.0, 5_000));
    step(&mut sm, est(1499.0, -1.0, -9.0, 5_040));
    step(&mut sm, est(1498.0, -3.0, -9.0, 5_080));
    assert_eq!(sm.phase(), FlightPhase::BallisticDescent);

    assert!(step(&mut sm, est(1000.5, -60.0, -2.0, 12_000)).is_none());
    let t = step(&mut sm, est(998.0, -60.0, -2.0, 12_040)).unwrap();
    assert_eq!(t.to, FlightPhase::ParachuteDescent);
}

#[test]
fn test_landing_needs_sustained_stillness() {
    let mut sm = coasting();
    step(&mut sm, est(1500.0, 1.0, -9.0, 5_000));
    step(&mut sm, est(1499.0, -1.0, -9.0, 5_040));
    step(&mut sm, est(1498.0, -3.0, -9.0, 5_080));
    step(&mut sm, est(990.0, -60.0, -2.0, 12_000));
    assert_eq!(sm.phase(), FlightPhase::ParachuteDescent);

    step(&mut sm, est(0.0, 0.2, 9.8, 100_000));
    step(&mut sm, est(0.0, 0.1, 9.8, 103_000));
    // A bounce resets the window.
    step(&mut sm, est(0.5, 2.0, 9.8, 104_000));
    step(&mut sm, est(0.0, 0.0, 9.8, 106_000));
    assert_eq!(sm.phase(), FlightPhase::ParachuteDescent);
    step(&mut sm, est(0.0, 0.0, 9.8, 110_000));
    assert_eq!(sm.phase(), FlightPhase::ParachuteDescent);
    let t = step(&mut sm, est(0.0, 0.0, 9.8, 111_000)).unwrap();
    assert_eq!(t.to, FlightPhase::PostFlight);

    // Terminal.
    for i in 0..10 {
        assert!(step(&mut sm, est(0.0, 30.0, 9.8, 120_000 + i * 40)).is_none());
    }
    assert_eq!(sm.phase(), FlightPhase::PostFlight);
}

#[test]
fn test_backup_timer_forces_parachute_descent() {
    let mut sm = coasting();
    // Launched at 1.04s, TTA 20s. Velocity never crosses zero.
    assert!(step(&mut sm, est(1500.0, 5.0, -9.0, 21_000)).is_none());
    let t = step(&mut sm, est(1500.0, 5.0, -9.0, 21_080)).unwrap();
    assert_eq!(t.from, FlightPhase::Coasting);
    assert_eq!(t.to, FlightPhase::ParachuteDescent);
    assert!(t.forced);
}

#[test]
fn test_backup_timer_runs_without_valid_estimates() {
    let mut sm = coasting();
    assert!(sm.check_backup(Instant::from_millis(20_000)).is_none());
    let t = sm.check_backup(Instant::from_millis(21_100)).unwrap();
    assert_eq!(t.to, FlightPhase::ParachuteDescent);
    assert!(sm.check_backup(Instant::from_millis(30_000)).is_none());
}

#[test]
fn test_backup_timer_ignored_after_apogee() {
    let mut sm = coasting();
    step(&mut sm, est(1500.0, 1.0, -9.0, 5_000));
    step(&mut sm, est(1499.0, -1.0, -9.0, 5_040));
    step(&mut sm, est(1498.0, -3.0, -9.0, 5_080));
    assert_eq!(sm.phase(), FlightPhase::BallisticDescent);
    assert!(sm.check_backup(Instant::from_millis(60_000)).is_none());
    assert_eq!(sm.phase(), FlightPhase::BallisticDescent);
}

#[test]
fn test_backup_timer_not_armed_on_pad() {
    let mut sm = FlightStateMachine::new(config());
    assert!(sm.check_backup(Instant::from_millis(3_600_000)).is_none());
    assert_eq!(sm.phase(), FlightPhase::PreFlight);
}

#[test]
fn test_stale_estimate_faults_in_flight() {
    let mut sm = coasting();
    let now = Instant::from_millis(4_000);
    assert!(sm.check_staleness(Some(Duration::from_millis(500)), now).is_none());
    let t = sm.check_staleness(Some(Duration::from_millis(2_500)), now).unwrap();
    assert_eq!(t.to, FlightPhase::Undefined);

    // Sticky: no nominal rule or backup shortcut leaves Undefined.
    assert!(step(&mut sm, est(1500.0, -5.0, -9.0, 4_100)).is_none());
    assert!(sm.check_backup(Instant::from_millis(60_000)).is_none());
    assert!(sm.fault(Instant::from_millis(60_000)).is_none());
    assert_eq!(sm.phase(), FlightPhase::Undefined);
}

#[test]
fn test_stale_estimate_ignored_on_pad() {
    let mut sm = FlightStateMachine::new(config());
    assert!(sm
        .check_staleness(Some(Duration::from_secs(60)), Instant::from_secs(60))
        .is_none());
    assert_eq!(sm.phase(), FlightPhase::PreFlight);
}

#[test]
fn test_phase_never_moves_backward() {
    // Deterministic pseudo-random walk over noisy estimates.
    let mut sm = FlightStateMachine::new(FlightConfig {
        time_to_apogee: Duration::from_secs(3_600),
        ..FlightConfig::DEFAULT
    });
    let mut seed: u32 = 0x2545_f491;
    let mut next = || {
        seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        (seed >> 8) as f32 / (1u32 << 24) as f32
    };

    let mut last = sm.phase();
    for i in 0..20_000u64 {
        let agl = next() * 3_000.0;
        let velocity = next() * 400.0 - 200.0;
        let accel = next() * 100.0 - 20.0;
        if let Some(t) = step(&mut sm, est(agl, velocity, accel, i * 40)) {
            assert!(t.to > t.from, "{:?} -> {:?}", t.from, t.to);
            assert!(t.to.is_nominal());
        }
        assert!(sm.phase() >= last);
        last = sm.phase();
    }
}
