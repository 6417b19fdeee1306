//! Settings Tests - Options, Dependencies and JSON Files
//!
//! Tests for `RenderSettings` option handling, the deferred-only rule and
//! tunable clamping as seen through the public API.

use lumen_engine::config::{RenderOption, RenderSettings};

// ============================================================================
// Option Dependencies
// ============================================================================

#[test]
fn test_disabling_deferred_drops_deferred_only_options() {
    let mut settings = RenderSettings::default();
    settings.enable(RenderOption::Ssr);
    settings.disable(RenderOption::Deferred);

    let frame = settings.apply();
    for option in RenderOption::DEFERRED_ONLY {
        assert!(!frame.is_enabled(option), "{option} survived without Deferred");
        assert!(!settings.is_enabled(option));
    }
    // unrelated options keep their state
    assert!(frame.is_enabled(RenderOption::Bloom));
}

#[test]
fn test_shadows_require_lighting() {
    let mut settings = RenderSettings::default();
    settings.disable(RenderOption::Lighting);
    let frame = settings.apply();
    assert!(settings.is_enabled(RenderOption::Shadows));
    assert!(!frame.shadows());
}

#[test]
fn test_frame_snapshot_is_independent_of_later_edits() {
    let mut settings = RenderSettings::default();
    let frame = settings.apply();
    settings.toggle(RenderOption::Bloom);
    settings.tunables.bloom.intensity = 9.0;

    assert!(frame.is_enabled(RenderOption::Bloom));
    assert_ne!(frame.tunables.bloom.intensity, 9.0);
}

#[test]
fn test_with_reapplies_dependencies() {
    let frame = RenderSettings::default().apply();
    let forward = frame.with(RenderOption::Deferred, false);
    assert!(!forward.deferred());
    assert!(!forward.is_enabled(RenderOption::Pbr));
    // the source snapshot is untouched
    assert!(frame.is_enabled(RenderOption::Pbr));
}

// ============================================================================
// Tunables
// ============================================================================

#[test]
fn test_out_of_range_tunables_are_clamped() {
    let mut settings = RenderSettings::default();
    settings.tunables.ssao.samples_used = 500;
    settings.tunables.motion_blur.samples = 0;
    settings.tunables.shadow.map_size = 1;
    settings.tunables.bloom.blur_iterations = 1000;

    let frame = settings.apply();
    assert_eq!(frame.tunables.ssao.samples_used, 64);
    assert_eq!(frame.tunables.motion_blur.samples, 1);
    assert_eq!(frame.tunables.shadow.map_size, 64);
    assert!(frame.tunables.bloom.blur_iterations <= 16);
}

// ============================================================================
// JSON Files
// ============================================================================

#[test]
fn test_settings_file_roundtrip() {
    let mut settings = RenderSettings::default();
    settings.enable(RenderOption::MotionBlur);
    settings.tunables.tone_map.exposure = 2.5;

    let path = std::env::temp_dir().join(format!("lumen_settings_{}.json", std::process::id()));
    std::fs::write(&path, settings.to_json_string().unwrap()).unwrap();
    let loaded = RenderSettings::from_json_file(&path).unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(loaded, settings);
}

#[test]
fn test_partial_settings_file_uses_defaults() {
    let json = r#"{ "tunables": { "bloom": { "threshold": 2.0 } } }"#;
    let settings = RenderSettings::from_json_str(json).unwrap();
    let defaults = RenderSettings::default();

    assert_eq!(settings.options, defaults.options);
    assert_eq!(settings.tunables.bloom.threshold, 2.0);
    assert_eq!(settings.tunables.bloom.intensity, defaults.tunables.bloom.intensity);
}

#[test]
fn test_missing_settings_file_is_an_error() {
    let result = RenderSettings::from_json_file("/nonexistent/lumen/settings.json");
    assert!(result.is_err());
}
