//! facecloak - run the face overlay pipeline against a camera source
//!
//! Pulls frames from the configured source, runs throttled detection, composites
//! the preview with the face overlay on a software canvas, and prints a JSON run
//! report.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use serde::Serialize;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use facecloak::ui::{Ui, UiMode};
use facecloak::{
    BackendRegistry, CameraSource, Canvas, EffectKind, FacecloakConfig, FrameDisposition,
    Intensity, Pipeline, TransformedBox, UiState,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Run duration in seconds.
    #[arg(long, default_value_t = 5)]
    seconds: u64,
    /// Stop after this many frames instead.
    #[arg(long)]
    frames: Option<u64>,
    /// Switch cameras every N frames.
    #[arg(long)]
    switch_every: Option<u64>,
    /// Detector backend (overrides config).
    #[arg(long)]
    backend: Option<String>,
    /// Effect kind, or "off".
    #[arg(long)]
    effect: Option<String>,
    /// Effect intensity, 1-100.
    #[arg(long)]
    intensity: Option<u32>,
    /// Write the JSON run report here instead of stdout.
    #[arg(long)]
    report: Option<PathBuf>,
    /// Write the last composited frame as JPEG.
    #[cfg(feature = "snapshot")]
    #[arg(long)]
    snapshot: Option<PathBuf>,
    /// Retry camera acquisition this many times after a denial or failure.
    #[arg(long, default_value_t = 0)]
    retry: u32,
    /// Pause between acquisition attempts, in milliseconds.
    #[arg(long, default_value_t = 1000)]
    retry_pause_ms: u64,
    /// List registered detector backends and exit.
    #[arg(long)]
    list_backends: bool,
    /// UI mode: auto, plain, or pretty.
    #[arg(long, default_value = "auto")]
    ui: String,
}

#[derive(Serialize)]
struct RunReport {
    session: Option<String>,
    platform: String,
    facing: String,
    camera: String,
    frames_rendered: u64,
    frames_forwarded: u64,
    frames_skipped_busy: u64,
    frames_skipped_throttled: u64,
    results_published: u64,
    results_rejected: u64,
    camera_switches: u64,
    effect_enabled: bool,
    effect: String,
    intensity: u32,
    last_faces: Vec<TransformedBox>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = Ui::new(UiMode::parse(Some(&args.ui)), is_tty, !stdout_is_tty);

    let registry = Arc::new(BackendRegistry::with_builtin());
    if args.list_backends {
        for name in registry.list() {
            println!("{}", name);
        }
        return Ok(());
    }

    let mut cfg = {
        let _stage = ui.stage("Load configuration");
        FacecloakConfig::load()?
    };
    if let Some(backend) = &args.backend {
        cfg.detector.backend = Some(backend.clone());
    }
    if let Some(effect) = &args.effect {
        if effect.eq_ignore_ascii_case("off") {
            cfg.effect.enabled = false;
        } else {
            cfg.effect.kind = effect.parse::<EffectKind>()?;
        }
    }
    if let Some(intensity) = args.intensity {
        cfg.effect.intensity = Intensity::new(intensity)?;
    }

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        ctrlc::set_handler(move || running.store(false, Ordering::SeqCst))
            .context("failed to install Ctrl-C handler")?;
    }

    let mut pipeline = Pipeline::new(
        Arc::clone(&registry),
        cfg.pipeline_config(),
        UiState::new(cfg.effect, cfg.source.facing),
    );

    let mut source = {
        let _stage = ui.stage("Acquire camera");
        open_source(&cfg, &pipeline, &args)?
    };
    {
        let _stage = ui.stage("Start detection session");
        pipeline.start()?;
    }

    let screen = cfg.screen_size();
    let mut canvas = Canvas::new(cfg.display.width, cfg.display.height);
    let frame_interval = Duration::from_secs_f64(1.0 / cfg.source.fps as f64);
    let deadline = Instant::now() + Duration::from_secs(args.seconds);
    let live = ui.live();

    let mut frames_rendered = 0u64;
    let mut camera_switches = 0u64;
    let mut last_faces = Vec::new();

    while running.load(Ordering::SeqCst) {
        let started = Instant::now();
        match args.frames {
            Some(limit) if frames_rendered >= limit => break,
            None if started >= deadline => break,
            _ => {}
        }

        if let Some(every) = args.switch_every.filter(|n| *n > 0) {
            if frames_rendered > 0 && frames_rendered % every == 0 {
                source.disconnect();
                let facing = pipeline.state().facing.toggled();
                cfg.source.facing = facing;
                pipeline.switch_camera(facing)?;
                source = open_source(&cfg, &pipeline, &args)?;
                camera_switches += 1;
            }
        }

        let frame = Arc::new(source.next_frame()?);
        let preview = pipeline.preview_geometry(frame.size(), frame.rotation(), screen);
        let mirror = pipeline.mirrors_preview(&frame);
        if pipeline.offer_frame(Arc::clone(&frame), started) == FrameDisposition::WrongCamera {
            log::debug!("frame {} from the previous camera ignored", frame.sequence());
        }

        canvas.clear();
        canvas.draw_preview(&frame.view(), &preview, mirror)?;
        drop(frame);
        let plan = pipeline.overlay_plan(&preview);
        canvas.apply(&plan);
        last_faces = plan.commands.iter().map(|c| c.rect).collect();
        frames_rendered += 1;

        live.update(&pipeline.stats(Instant::now()), last_faces.len());

        let spent = started.elapsed();
        if spent < frame_interval {
            std::thread::sleep(frame_interval - spent);
        }
    }

    let stats = pipeline.stats(Instant::now());
    live.finish(&stats);
    source.disconnect();
    pipeline.shutdown();

    #[cfg(feature = "snapshot")]
    {
        if let Some(path) = &args.snapshot {
            let _stage = ui.stage("Write snapshot");
            image::save_buffer_with_format(
                path,
                canvas.pixels(),
                canvas.width(),
                canvas.height(),
                image::ExtendedColorType::Rgb8,
                image::ImageFormat::Jpeg,
            )
            .with_context(|| format!("failed to write snapshot {}", path.display()))?;
        }
    }

    let state = pipeline.state();
    let report = RunReport {
        session: stats.session.map(|id| id.to_string()),
        platform: format!("{:?}", cfg.platform).to_lowercase(),
        facing: state.facing.to_string(),
        camera: format!("{:?}", state.camera),
        frames_rendered,
        frames_forwarded: stats.gate.forwarded,
        frames_skipped_busy: stats.gate.dropped_busy,
        frames_skipped_throttled: stats.gate.dropped_throttled,
        results_published: stats.results_published,
        results_rejected: stats.results_rejected,
        camera_switches,
        effect_enabled: state.effect.enabled,
        effect: state.effect.kind.to_string(),
        intensity: state.effect.intensity.get(),
        last_faces,
    };
    let json = serde_json::to_string_pretty(&report)?;
    match &args.report {
        Some(path) => std::fs::write(path, json)
            .map_err(|e| anyhow!("failed to write report {}: {}", path.display(), e))?,
        None => println!("{}", json),
    }
    Ok(())
}

/// Open and connect the configured source, recording each outcome in the UI state.
fn open_source(cfg: &FacecloakConfig, pipeline: &Pipeline, args: &Args) -> Result<CameraSource> {
    let pause = Duration::from_millis(args.retry_pause_ms);
    pipeline.acquire_camera(args.retry, pause, || {
        let mut source = CameraSource::new(cfg.camera_config())?;
        source.connect()?;
        Ok(source)
    })
}
