mod common;

use artrack::core::Undistortion;
use artrack::pose::HullMode;
use artrack::{PoseEstimator, Rig, RigEntry, Tracker, TrackerConfig, TrackerError};
use common::{camera, HEIGHT, WIDTH};

#[test]
fn blank_frame_yields_nothing_within_the_retry_budget() {
    let mut config = TrackerConfig::default();
    config.threshold.auto = true;
    config.threshold.retries = 5;
    let mut tracker = Tracker::new(config, camera()).unwrap();
    let start = tracker.threshold();

    for level in [0u8, 128, 255] {
        let pixels = vec![level; WIDTH * HEIGHT];
        let result = tracker.track_buffer(&pixels, None).unwrap();
        assert!(result.markers.is_empty());
        assert!(result.rigs.is_empty());
        assert_eq!(result.candidates, 0);
        assert_eq!(result.attempts, 6);
    }
    assert_eq!(tracker.threshold(), start);
    assert!(tracker.history().is_empty());
}

#[test]
fn config_round_trips_through_json() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tracker.json");

    let mut config = TrackerConfig::default();
    config.pose.estimator = PoseEstimator::Rpp;
    config.fusion.hull = HullMode::Full;
    config.undistortion = Undistortion::Lut;
    config.square.half_resolution = true;
    config.vignetting.enabled = true;
    config.vignetting.corners = 30;
    config.memory_budget = Some(64 << 20);
    config.write_json(&path).unwrap();

    let loaded = TrackerConfig::load_json(&path).unwrap();
    assert_eq!(loaded, config);
    Tracker::new(loaded, camera()).unwrap();
}

#[test]
fn rig_files_load_against_the_registry() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rig.json");
    let rig = Rig {
        markers: vec![RigEntry::planar(0, 40.0, 0.0, 0.0), RigEntry::planar(1, 40.0, 60.0, 0.0)],
    };
    rig.write_json(&path).unwrap();

    let mut tracker = Tracker::new(TrackerConfig::default(), camera()).unwrap();
    assert!(matches!(tracker.load_rig(&path), Err(TrackerError::Rig(_))));

    tracker.register_template(&common::hiro_like()).unwrap();
    tracker.register_template(&common::kanji_like()).unwrap();
    let handle = tracker.load_rig(&path).unwrap();
    assert_eq!(tracker.remove_rig(handle).unwrap(), rig);
}

#[test]
fn registry_capacity_is_fixed() {
    let config = TrackerConfig {
        max_patterns: 2,
        ..TrackerConfig::default()
    };
    let mut tracker = Tracker::new(config, camera()).unwrap();
    assert_eq!(tracker.register_template(&common::hiro_like()).unwrap(), 0);
    assert_eq!(tracker.register_template(&common::kanji_like()).unwrap(), 1);
    assert!(matches!(
        tracker.register_template(&common::hiro_like()),
        Err(TrackerError::RegistryFull(2))
    ));
    tracker.unregister(0).unwrap();
    assert_eq!(tracker.register_template(&common::kanji_like()).unwrap(), 0);

    assert!(tracker.set_marker_width(1, 55.0).is_ok());
    assert_eq!(tracker.marker_width(1), 55.0);
    assert!(matches!(tracker.set_marker_width(7, 55.0), Err(TrackerError::UnknownPattern(7))));
    assert!(tracker.set_marker_width(1, -1.0).is_err());
}
