use fusion_core::{
    track_manager::TransitionReason, FusionConfig, TrackStatus,
};
use sim::{evaluate, load_replay, save_replay, RunSummary, Scenario, ScenarioKind};

fn run(kind: ScenarioKind, seed: u64) -> RunSummary {
    let config = FusionConfig::default();
    let log = Scenario::build(kind, seed).record(&config.camera.camera());
    evaluate(&log, &config).unwrap()
}

fn reasons(summary: &RunSummary) -> Vec<TransitionReason> {
    summary.transitions.iter().map(|t| t.reason).collect()
}

fn final_status(summary: &RunSummary) -> TrackStatus {
    summary.estimates.last().map(|e| e.status).unwrap()
}

#[test]
fn steady_apple_is_tracked() {
    let s = run(ScenarioKind::Steady, 42);
    assert!(s.metrics.tracking_fraction() > 0.9, "{:?}", s.metrics);
    assert!(s.metrics.rmse_position() < 0.02, "{:?}", s.metrics);
    assert!(s.metrics.time_to_first_track.unwrap() < 0.2);
    assert!(!reasons(&s).contains(&TransitionReason::LostTimeout));
    assert_eq!(s.stats.numeric_resets, 0);
}

#[test]
fn approach_velocity_is_estimated() {
    let s = run(ScenarioKind::Approach, 42);
    assert!(s.metrics.tracking_fraction() > 0.9, "{:?}", s.metrics);
    assert!(s.metrics.rmse_position() < 0.03, "{:?}", s.metrics);
    let last = s.estimates.last().unwrap();
    assert!((last.velocity.z + 0.05).abs() < 0.03, "vz = {}", last.velocity.z);
}

#[test]
fn swaying_apple_stays_in_gate() {
    let s = run(ScenarioKind::Sway, 42);
    assert!(s.metrics.tracking_fraction() > 0.9, "{:?}", s.metrics);
    assert!(s.metrics.rmse_position() < 0.02, "{:?}", s.metrics);
}

#[test]
fn short_occlusion_coasts_and_recovers() {
    let s = run(ScenarioKind::Occlusion, 42);
    let r = reasons(&s);
    assert!(r.contains(&TransitionReason::NoDetectionTimeout), "{r:?}");
    assert!(r.contains(&TransitionReason::Reacquired), "{r:?}");
    assert!(!r.contains(&TransitionReason::LostTimeout), "{r:?}");
    assert!(s.metrics.n_coasting > 0);
    assert_eq!(s.metrics.n_lost, 0);
    assert_eq!(final_status(&s), TrackStatus::Tracking);
}

#[test]
fn long_loss_reinitializes() {
    let s = run(ScenarioKind::LongLoss, 42);
    assert!(reasons(&s).contains(&TransitionReason::LostTimeout));
    assert!(s
        .transitions
        .iter()
        .any(|t| t.from == TrackStatus::Lost && t.to == TrackStatus::Tracking));
    assert!(s.metrics.n_lost > 0);
    assert_eq!(final_status(&s), TrackStatus::Tracking);

    // The apple moved 4 cm while hidden; the new track sits on it.
    let last = s.estimates.last().unwrap();
    assert!((last.position.x - 0.06).abs() < 0.01, "x = {}", last.position.x);
}

#[test]
fn clutter_is_gated() {
    let s = run(ScenarioKind::Clutter, 42);
    assert!(s.stats.gated_outliers > 5, "{:?}", s.stats);
    assert!(s.metrics.tracking_fraction() > 0.85, "{:?}", s.metrics);
    assert!(s.metrics.rmse_position() < 0.02, "{:?}", s.metrics);
}

#[test]
fn range_dropout_degrades_gracefully() {
    let s = run(ScenarioKind::RangeDropout, 42);
    assert!(s.stats.range_stale_projections > 30, "{:?}", s.stats);
    assert!(s.metrics.tracking_fraction() > 0.9, "{:?}", s.metrics);
    assert!(s.metrics.rmse_position() < 0.05, "{:?}", s.metrics);
}

#[test]
fn every_tick_is_published() {
    let s = run(ScenarioKind::Steady, 7);
    // 10 s at 30 Hz, ticks at 0 and at the end inclusive.
    assert!((300..=302).contains(&s.stats.published), "{}", s.stats.published);
    assert_eq!(s.estimates.len() as u64, s.stats.published);
}

#[test]
fn replay_file_reproduces_run() {
    let config = FusionConfig::default();
    let log = Scenario::build(ScenarioKind::Occlusion, 3).record(&config.camera.camera());
    let path = std::env::temp_dir().join(format!("applevision-it-{}.json", std::process::id()));
    save_replay(&log, &path).unwrap();
    let loaded = load_replay(&path).unwrap();
    let _ = std::fs::remove_file(&path);

    let direct = evaluate(&log, &config).unwrap();
    let replayed = evaluate(&loaded, &config).unwrap();
    assert_eq!(direct.metrics, replayed.metrics);
    assert_eq!(direct.stats, replayed.stats);
}
