//! The engine driving whole levels.

use rstest::rstest;

use deferred_engine::backend::{GraphicsBackend, SoftwareBackend};
use deferred_engine::scene::CameraInput;
use deferred_engine::{Engine, EngineConfig, EngineError};

fn config(level: &str) -> EngineConfig {
    EngineConfig {
        width: 48,
        height: 32,
        level: level.to_string(),
        view_distance: 1,
        shadow_map_size: 64,
        ..Default::default()
    }
}

#[rstest]
#[case::sandbox("sandbox")]
#[case::lights("lights")]
#[case::empty("empty")]
fn test_level_renders(#[case] level: &str) {
    let mut engine = Engine::new(SoftwareBackend::new(48, 32), config(level)).unwrap();
    assert_eq!(engine.level_name(), level);

    engine.update(1.0 / 60.0, &CameraInput::default());
    let stats = engine.render_frame().unwrap();
    assert!(stats.ran("Lighting"));
    if level == "empty" {
        assert_eq!(stats.models_drawn, 0);
        assert_eq!(engine.scene().chunk_count(), 9);
    } else {
        assert!(stats.models_drawn > 0);
        assert!(stats.terrain_chunks_drawn > 0);
        assert!(stats.lights_drawn > 0);
    }
}

#[test]
fn test_unknown_level_fails() {
    let result = Engine::new(SoftwareBackend::new(48, 32), config("missing"));
    assert!(matches!(result, Err(EngineError::UnknownLevel(_))));
}

#[test]
fn test_resize_and_screenshot() {
    let mut engine = Engine::new(SoftwareBackend::new(48, 32), config("sandbox")).unwrap();
    engine.render_frame().unwrap();

    engine.resize(24, 16).unwrap();
    assert_eq!(engine.backend().screen_size(), (24, 16));
    assert!(!engine.context().previous_frame_valid);

    engine.render_frame().unwrap();
    let image = engine.screenshot().unwrap();
    assert_eq!(image.dimensions(), (24, 16));
    assert!(engine.context().previous_frame_valid);

    assert!(matches!(engine.resize(0, 16), Err(EngineError::InvalidScreenSize(_))));
}

#[test]
fn test_settings_toggle_between_frames() {
    let mut engine = Engine::new(SoftwareBackend::new(48, 32), config("lights")).unwrap();
    let stats = engine.render_frame().unwrap();
    assert!(stats.ran("Bloom"));

    engine.settings_mut().bloom_enabled = false;
    engine.settings_mut().ssr_enabled = true;
    let stats = engine.render_frame().unwrap();
    assert!(!stats.ran("Bloom"));
    assert!(stats.ran("SSR"));
}
