use std::{
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "stagecast", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print where the canvas lands on a preview surface.
    Viewport(ViewportArgs),
    /// Render one preview frame as a PNG.
    Preview(PreviewArgs),
    /// Run a push session (requires `ffmpeg` on PATH unless `--dry-run`).
    Push(PushArgs),
}

#[derive(Parser, Debug)]
struct ViewportArgs {
    /// Canvas size, `WIDTHxHEIGHT`.
    #[arg(long)]
    canvas: stagecast::Canvas,

    /// Preview surface size, `WIDTHxHEIGHT`.
    #[arg(long)]
    surface: stagecast::SurfaceSize,

    /// Margin around the canvas in surface pixels.
    #[arg(long, default_value_t = stagecast::PREVIEW_EDGE_SIZE)]
    margin: u32,

    /// Use a fixed zoom instead of fitting.
    #[arg(long)]
    fixed_scale: Option<f64>,

    /// Horizontal scroll (fixed zoom only).
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    scroll_x: f64,

    /// Vertical scroll (fixed zoom only).
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    scroll_y: f64,
}

#[derive(Parser, Debug)]
struct PreviewArgs {
    /// Application config JSON.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Source to add: monitor, video:PATH, image:PATH, camera[:ID], text:TEXT, audio-in:ID,
    /// audio-out:ID. Repeatable.
    #[arg(long = "source")]
    sources: Vec<String>,

    /// Preview surface size, `WIDTHxHEIGHT`.
    #[arg(long)]
    surface: stagecast::SurfaceSize,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,
}

#[derive(Parser, Debug)]
struct PushArgs {
    /// Application config JSON.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Source to add (see `preview --help`). Repeatable.
    #[arg(long = "source")]
    sources: Vec<String>,

    /// Service JSON document; overrides the config's `service` section.
    #[arg(long)]
    service: Option<PathBuf>,

    /// Seconds to stay live before stopping.
    #[arg(long)]
    duration: f64,

    /// Preview surface driven by the render loop.
    #[arg(long, default_value = "640x360")]
    surface: stagecast::SurfaceSize,

    /// Use the simulated backend instead of `ffmpeg`.
    #[arg(long)]
    dry_run: bool,

    /// Stop immediately instead of honoring the stop delay.
    #[arg(long)]
    force_stop: bool,
}

fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Viewport(args) => cmd_viewport(args),
        Command::Preview(args) => cmd_preview(args),
        Command::Push(args) => cmd_push(args),
    }
}

fn read_config(path: Option<&Path>) -> anyhow::Result<stagecast::AppConfig> {
    let cfg = match path {
        Some(p) => stagecast::AppConfig::from_path(p)
            .with_context(|| format!("load config '{}'", p.display()))?,
        None => stagecast::AppConfig::default(),
    };
    cfg.validate().context("validate config")?;
    Ok(cfg)
}

fn add_source(o: &stagecast::Orchestrator, spec: &str) -> anyhow::Result<stagecast::ItemId> {
    let (kind, arg) = match spec.split_once(':') {
        Some((k, a)) => (k, Some(a)),
        None => (spec, None),
    };
    let need = |what: &str| {
        arg.filter(|a| !a.is_empty())
            .with_context(|| format!("source '{spec}' needs {what}"))
    };
    let id = match kind {
        "monitor" => o.add_monitor_source()?,
        "video" => o.add_video_file_source(need("a path")?)?,
        "image" => o.add_image_source(need("a path")?)?,
        "camera" => o.add_camera_source(arg.filter(|a| !a.is_empty()))?,
        "text" => o.add_text_source(need("text")?)?,
        "audio-in" => o.add_audio_input_source(need("a device id")?)?,
        "audio-out" => o.add_audio_output_source(need("a device id")?)?,
        other => anyhow::bail!("unknown source kind '{other}' in '{spec}'"),
    };
    Ok(id)
}

fn add_sources(o: &stagecast::Orchestrator, specs: &[String]) -> anyhow::Result<()> {
    for spec in specs {
        add_source(o, spec).with_context(|| format!("add source '{spec}'"))?;
    }
    Ok(())
}

fn cmd_viewport(args: ViewportArgs) -> anyhow::Result<()> {
    let layout = stagecast::PreviewLayout {
        fixed_scaling: args.fixed_scale.is_some(),
        scaling_amount: args.fixed_scale.unwrap_or(1.0),
        scroll: stagecast::Vec2::new(args.scroll_x, args.scroll_y),
        edge: args.margin,
    };
    if layout.fixed_scaling && !(layout.scaling_amount.is_finite() && layout.scaling_amount > 0.0) {
        anyhow::bail!("--fixed-scale must be a positive number");
    }
    let vp = stagecast::resize_preview(args.canvas, args.surface, &layout);
    println!(
        "x={:.3} y={:.3} scale={:.6} preview={}x{}",
        vp.placement.x, vp.placement.y, vp.placement.scale, vp.preview_cx, vp.preview_cy
    );
    Ok(())
}

fn cmd_preview(args: PreviewArgs) -> anyhow::Result<()> {
    let config = read_config(args.config.as_deref())?;
    let orchestrator = stagecast::Orchestrator::headless(
        config,
        Box::new(stagecast::SimulatedBackend::default()),
    )
    .context("bring up")?;
    add_sources(&orchestrator, &args.sources)?;

    orchestrator.resize_preview(args.surface);
    let mut renderer = orchestrator
        .renderer()
        .with_overlay(Box::new(stagecast::SelectionOverlay::default()));
    let mut surface = stagecast::RasterSurface::new(args.surface.width, args.surface.height)?;
    if !renderer.render_frame(&mut surface) {
        tracing::warn!("preview surface too small, wrote background only");
    }
    surface
        .into_frame()
        .write_png(&args.out)
        .with_context(|| format!("write png '{}'", args.out.display()))?;

    eprintln!("wrote {}", args.out.display());
    Ok(())
}

fn cmd_push(args: PushArgs) -> anyhow::Result<()> {
    if !(args.duration.is_finite() && args.duration >= 0.0) {
        anyhow::bail!("--duration must be a non-negative number of seconds");
    }
    let mut config = read_config(args.config.as_deref())?;
    if let Some(p) = &args.service {
        config.service = stagecast::ServiceConfig::from_path(p)
            .with_context(|| format!("load service '{}'", p.display()))?;
    }
    let settle = Duration::from_secs_f64(
        config.output.start_delay_sec + config.output.stop_delay_sec,
    ) + Duration::from_secs(30);

    let orchestrator = (if args.dry_run {
        stagecast::Orchestrator::headless(
            config,
            Box::new(stagecast::SimulatedBackend::default()),
        )
    } else {
        let canvas = config.video.canvas()?;
        stagecast::Orchestrator::new(
            config,
            Box::new(stagecast::HeadlessEngine::new()),
            Box::new(stagecast::BuiltinSourceFactory::new(canvas)),
            |scene, canvas| {
                Ok(Box::new(stagecast::FfmpegPushBackend::new(
                    stagecast::FfmpegPushOpts::default(),
                    scene.clone(),
                    canvas,
                )) as Box<dyn stagecast::OutputBackend>)
            },
        )
    })
    .context("bring up")?;
    let mut orchestrator = orchestrator.with_status_sink(Box::new(
        |e: &stagecast::OutputEvent| eprintln!("{}", e.status_text()),
    ));
    add_sources(&orchestrator, &args.sources)?;

    orchestrator.resize_preview(args.surface);
    let gfx = stagecast::RasterSurface::new(args.surface.width, args.surface.height)?;
    let render = stagecast::RenderLoop::spawn(
        orchestrator.renderer(),
        gfx,
        Duration::from_millis(33),
    )?;

    orchestrator.start_push().context("start push")?;
    let started = orchestrator.wait_for_event(settle, |e| {
        matches!(
            e,
            stagecast::OutputEvent::StreamingStarted
                | stagecast::OutputEvent::StreamingStopped { .. }
        )
    });
    let outcome = match started {
        Some(stagecast::OutputEvent::StreamingStarted) => {
            let deadline = Instant::now() + Duration::from_secs_f64(args.duration);
            let mut ended = None;
            while ended.is_none() && Instant::now() < deadline {
                let left = deadline.saturating_duration_since(Instant::now());
                ended = orchestrator.wait_for_event(left, |e| {
                    matches!(e, stagecast::OutputEvent::StreamingStopped { .. })
                });
            }
            match ended {
                Some(e) => Some(e),
                None => {
                    if args.force_stop {
                        orchestrator.force_stop_push();
                    } else {
                        orchestrator.stop_push();
                    }
                    orchestrator.wait_for_event(settle, |e| {
                        matches!(e, stagecast::OutputEvent::StreamingStopped { .. })
                    })
                }
            }
        }
        other => other,
    };

    let stats = render.stats();
    let _ = render.stop()?;
    eprintln!(
        "rendered {} frames ({} drawn, {} overruns)",
        stats.frames, stats.drawn, stats.overruns
    );
    orchestrator.shutdown();

    match outcome {
        Some(stagecast::OutputEvent::StreamingStopped { code: 0, .. }) => Ok(()),
        Some(stagecast::OutputEvent::StreamingStopped { code, message }) => {
            anyhow::bail!("stream ended with code {code}: {message}")
        }
        _ => anyhow::bail!("stream did not settle within {:?}", settle),
    }
}
