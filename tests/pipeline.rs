//! End-to-end frames through the deferred pipeline on the software backend.

mod common;

use std::sync::Arc;

use glam::{Vec3, Vec4};
use rstest::rstest;

use common::{cube, wall_scene, wall_scene_lit_by, Harness, HEIGHT, WIDTH};
use deferred_engine::backend::{GraphicsBackend, RenderState, ShaderProgram};
use deferred_engine::pipeline::RenderSettings;
use deferred_engine::resources::Material;
use deferred_engine::scene::{LineModel, PointLight};

fn defaults() -> RenderSettings {
    RenderSettings::default()
}

fn everything_off() -> RenderSettings {
    RenderSettings {
        lighting_enabled: false,
        dirlight_enabled: false,
        shadow_enabled: false,
        ssao_enabled: false,
        ssr_enabled: false,
        bloom_enabled: false,
        forward_enabled: false,
        ..Default::default()
    }
}

fn variance_shadows() -> RenderSettings {
    RenderSettings {
        shadow_variance: true,
        ..Default::default()
    }
}

fn reflections() -> RenderSettings {
    RenderSettings {
        ssr_enabled: true,
        ..Default::default()
    }
}

fn unblurred() -> RenderSettings {
    RenderSettings {
        ssao_blur: false,
        ssr_enabled: true,
        ssr_blur: false,
        ..Default::default()
    }
}

#[test]
fn test_light_volume_marks_stencil() {
    let scene = wall_scene();
    let light = PointLight::new(Vec3::new(0.0, 0.0, -6.0), Vec3::ONE, 1.0, 3.0);
    assert!(scene.is_in_frustum(&light));

    let mut harness = Harness::new(scene, RenderSettings::default());
    let stats = harness.render();

    assert_eq!(stats.models_drawn, 1);
    assert_eq!(stats.lights_drawn, 1);
    let lbuffer = harness.lbuffer();
    assert!(harness.backend.stencil_nonzero_count(Some(lbuffer)).unwrap() > 0);

    let log = harness.backend.draw_log();
    let mark = log
        .iter()
        .position(|r| r.program == ShaderProgram::StencilMark)
        .expect("stencil mark draw");
    assert_eq!(log[mark + 1].program, ShaderProgram::PointLight);
    assert_eq!(log[mark].target, Some(lbuffer));
    assert!(log[mark + 1].fragments > 0);
}

fn directional_fragments(harness: &Harness) -> Option<u64> {
    harness
        .backend
        .draw_log()
        .iter()
        .find(|r| r.program == ShaderProgram::DirectionalLight)
        .map(|r| r.fragments)
}

#[test]
fn test_camera_inside_light_volume() {
    // 5 units ahead with radius 7: the near plane clips the front faces
    let light = PointLight::new(Vec3::new(0.0, 0.0, -5.0), Vec3::ONE, 1.0, 7.0);
    let scene = wall_scene_lit_by(light.clone());
    assert!(scene.is_in_frustum(&light));

    let mut harness = Harness::new(scene, RenderSettings::default());
    let stats = harness.render();
    assert_eq!(stats.lights_drawn, 1);
    let lbuffer = harness.lbuffer();
    assert!(harness.backend.stencil_nonzero_count(Some(lbuffer)).unwrap() > 0);
    let shaded = harness
        .backend
        .draw_log()
        .iter()
        .find(|r| r.program == ShaderProgram::PointLight)
        .map(|r| r.fragments);
    assert!(shaded.unwrap_or(0) > 0);
    let lit_directional = directional_fragments(&harness);
    assert_eq!(lit_directional, Some((WIDTH * HEIGHT) as u64));

    let settings = RenderSettings {
        lighting_enabled: false,
        ..Default::default()
    };
    let mut harness = Harness::new(wall_scene_lit_by(light), settings);
    let stats = harness.render();
    assert_eq!(stats.lights_drawn, 0);
    let lbuffer = harness.lbuffer();
    assert_eq!(harness.backend.stencil_nonzero_count(Some(lbuffer)).unwrap(), 0);
    assert_eq!(directional_fragments(&harness), lit_directional);
}

#[test]
fn test_lighting_disabled_leaves_stencil_clear() {
    let settings = RenderSettings {
        lighting_enabled: false,
        ..Default::default()
    };
    let mut harness = Harness::new(wall_scene(), settings);
    let stats = harness.render();

    assert_eq!(stats.lights_drawn, 0);
    let lbuffer = harness.lbuffer();
    assert_eq!(harness.backend.stencil_nonzero_count(Some(lbuffer)).unwrap(), 0);

    let log = harness.backend.draw_log();
    assert!(log.iter().all(|r| r.program != ShaderProgram::PointLight));
    let directional = log
        .iter()
        .find(|r| r.program == ShaderProgram::DirectionalLight)
        .expect("directional light draw");
    assert_eq!(directional.fragments, (WIDTH * HEIGHT) as u64);
}

#[rstest]
#[case::defaults(defaults())]
#[case::everything_off(everything_off())]
#[case::variance_shadows(variance_shadows())]
#[case::reflections(reflections())]
#[case::unblurred(unblurred())]
fn test_frame_restores_state(#[case] settings: RenderSettings) {
    let mut harness = Harness::new(wall_scene(), settings.clone());

    for frame in 0..2 {
        let stats = harness.render();
        assert_eq!(stats.frame, frame);
        assert_eq!(harness.backend.render_state(), RenderState::default());

        assert!(stats.ran("Geometry"));
        assert!(stats.ran("Lighting"));
        assert!(stats.ran("Post Processing"));
        assert_eq!(stats.ran("Shadow Map"), settings.shadow_enabled);
        assert_eq!(stats.ran("SSAO"), settings.ssao_enabled);
        assert_eq!(stats.ran("SSR"), settings.ssr_enabled);
        assert_eq!(stats.ran("Bloom"), settings.bloom_enabled);
        assert_eq!(stats.ran("Forward"), settings.forward_enabled);
    }
    assert!(harness.context.previous_frame_valid);
    assert_eq!(harness.pipeline.frame_index(), 2);
}

#[test]
fn test_stages_run_in_pipeline_order() {
    let mut harness = Harness::new(wall_scene(), reflections());
    let stats = harness.render();
    assert_eq!(
        stats.stages,
        vec![
            "Geometry",
            "Shadow Map",
            "SSAO",
            "SSR",
            "Lighting",
            "Bloom",
            "Forward",
            "Post Processing",
        ]
    );
}

#[test]
fn test_blended_models_and_lines_drawn_forward() {
    let mut scene = wall_scene();
    let glass = Arc::new(Material::new("glass").with_transparency(0.5));
    scene
        .add_model(cube("glass", Vec3::new(0.0, 0.0, -5.0), 1.0, glass))
        .unwrap();
    scene
        .add_line_model(LineModel::new(
            "axis",
            vec![(Vec3::new(-1.0, 0.0, -4.0), Vec3::new(1.0, 0.0, -4.0))],
            Vec4::new(1.0, 0.0, 0.0, 1.0),
        ))
        .unwrap();

    let mut harness = Harness::new(scene, RenderSettings::default());
    let stats = harness.render();

    // The glass cube stays out of the G-buffer.
    assert_eq!(stats.models_drawn, 1);
    assert_eq!(stats.transparent_drawn, 1);
    assert_eq!(stats.line_models_drawn, 1);

    let log = harness.backend.draw_log();
    let forward = log
        .iter()
        .find(|r| r.program == ShaderProgram::Forward)
        .expect("forward draw");
    assert!(forward.state.blend.is_some());
    assert!(!forward.state.depth.write);
    assert!(log.iter().any(|r| r.program == ShaderProgram::Lines));
}

#[test]
fn test_final_image_is_lit() {
    let mut harness = Harness::new(wall_scene(), RenderSettings::default());
    harness.render();

    let pixels = harness.backend.read_color(None, 0).unwrap();
    assert_eq!(pixels.len(), (WIDTH * HEIGHT * 4) as usize);
    let center = ((HEIGHT / 2 * WIDTH + WIDTH / 2) * 4) as usize;
    assert!(pixels[center..center + 3].iter().any(|c| *c > 0));
}
