//! Headless sandbox: load a level, render frames, optionally dump the last one

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use deferred_engine::backend::SoftwareBackend;
use deferred_engine::engine::{Engine, EngineConfig};
use deferred_engine::error::EngineResult;
use deferred_engine::level::level_names;
use deferred_engine::scene::CameraInput;

/// Deferred engine sandbox.
#[derive(Parser, Debug)]
#[command(name = "sandbox", about = "Render a procedural level with the deferred pipeline")]
struct Args {
    /// Screen size as WIDTHxHEIGHT.
    #[arg(short = 's', long = "size", default_value = "1280x720")]
    size: String,

    /// Level to load.
    #[arg(short = 'l', long = "level", default_value = "sandbox")]
    level: String,

    /// Run fullscreen.
    #[arg(short = 'f', long)]
    fullscreen: bool,

    /// Number of frames to render.
    #[arg(long, default_value = "1")]
    frames: u64,

    /// Write the last frame to this PNG file.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Fly the camera forward while rendering.
    #[arg(long)]
    fly: bool,

    /// Enable screen-space reflections.
    #[arg(long)]
    ssr: bool,

    /// Disable screen-space ambient occlusion.
    #[arg(long)]
    no_ssao: bool,

    /// Disable the shadow map.
    #[arg(long)]
    no_shadows: bool,

    /// Disable bloom.
    #[arg(long)]
    no_bloom: bool,

    /// List the available levels and exit.
    #[arg(long)]
    list_levels: bool,
}

fn run(args: Args) -> EngineResult<()> {
    if args.list_levels {
        for name in level_names() {
            println!("{}", name);
        }
        return Ok(());
    }

    let (width, height) = EngineConfig::parse_screen_size(&args.size)?;
    let mut config = EngineConfig {
        width,
        height,
        fullscreen: args.fullscreen,
        level: args.level,
        ..Default::default()
    };
    config.settings.ssr_enabled = args.ssr;
    config.settings.ssao_enabled = !args.no_ssao;
    config.settings.shadow_enabled = !args.no_shadows;
    config.settings.bloom_enabled = !args.no_bloom;

    let mut engine = Engine::new(SoftwareBackend::new(width, height), config)?;
    let input = CameraInput {
        forward: args.fly,
        ..Default::default()
    };
    let dt = 1.0 / 60.0;

    for _ in 0..args.frames.max(1) {
        engine.update(dt, &input);
        let stats = engine.render_frame()?;
        log::info!(
            "Frame {}: {} models, {} terrain chunks, {} lights, {} transparent",
            stats.frame,
            stats.models_drawn,
            stats.terrain_chunks_drawn,
            stats.lights_drawn,
            stats.transparent_drawn
        );
    }

    if let Some(path) = &args.output {
        engine.save_screenshot(path)?;
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{}", err);
            ExitCode::FAILURE
        }
    }
}
