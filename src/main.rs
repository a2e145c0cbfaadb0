//! Vehicle Perception CLI
//!
//! Runs the perception node against a camera (synthetic by default) and
//! logs every published detection.

use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use vehicle_perception::{
    blink::NullBlinkDetector,
    capture::{Camera, FileConfig, MockCamera},
    metrics::{MetricsRegistry, MetricsSnapshot},
    pipeline::{LogSink, PerceptionNode, Submission},
};

#[derive(Debug, Parser)]
#[command(name = "vehicle-perception", version, about)]
struct Args {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Reference template image (overrides the config file).
    #[arg(short, long)]
    template: Option<PathBuf>,

    /// Number of frames to process.
    #[arg(long)]
    frames: Option<u32>,

    /// Run until interrupted.
    #[arg(long)]
    continuous: bool,

    /// Re-trigger LED capture every N frames.
    #[arg(long)]
    trigger_every: Option<u32>,

    /// Run template matching on every processed frame.
    #[arg(long)]
    match_template: bool,

    /// Metrics server port (0 disables; needs the `metrics` feature).
    #[arg(long)]
    metrics_port: Option<u16>,

    /// Use the native camera instead of the synthetic one.
    #[cfg(feature = "camera")]
    #[arg(long)]
    native_camera: bool,
}

fn load_config(args: &Args) -> FileConfig {
    let mut config = match &args.config {
        Some(path) => match FileConfig::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load config {}: {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => FileConfig::default(),
    };

    if let Some(template) = &args.template {
        config.template.path = template.clone();
    }
    if let Some(frames) = args.frames {
        config.output.frame_count = frames;
    }
    if let Some(every) = args.trigger_every {
        config.output.trigger_every = every;
    }
    if let Some(port) = args.metrics_port {
        config.output.metrics_port = port;
    }
    config.output.continuous |= args.continuous;
    config.template.enabled |= args.match_template;
    config
}

fn open_camera(args: &Args, config: &FileConfig) -> Box<dyn Camera> {
    #[cfg(feature = "camera")]
    let mut camera: Box<dyn Camera> = if args.native_camera {
        Box::new(vehicle_perception::capture::NokhwaCamera::new())
    } else {
        Box::new(MockCamera::new())
    };
    #[cfg(not(feature = "camera"))]
    let mut camera: Box<dyn Camera> = {
        let _ = args;
        Box::new(MockCamera::new())
    };

    if let Err(e) = camera.open(&config.camera) {
        error!("Failed to open camera: {}", e);
        std::process::exit(1);
    }
    camera
}

#[cfg(feature = "metrics")]
fn start_metrics_server(port: u16, registry: &Arc<MetricsRegistry>) {
    use vehicle_perception::metrics::{MetricsServer, MetricsServerConfig};

    if port == 0 {
        return;
    }
    let server = MetricsServer::new(MetricsServerConfig::with_port(port), Arc::clone(registry));
    if let Err(e) = server.spawn() {
        warn!("Metrics server not started: {}", e);
    }
}

#[cfg(not(feature = "metrics"))]
fn start_metrics_server(port: u16, _registry: &Arc<MetricsRegistry>) {
    if port != 0 {
        info!("Built without the `metrics` feature; exporter disabled");
    }
}

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Vehicle Perception v{}", vehicle_perception::VERSION);

    let args = Args::parse();
    let config = load_config(&args);

    let mut node =
        match PerceptionNode::from_config(&config, Box::new(NullBlinkDetector), Arc::new(LogSink)) {
            Ok(node) => node,
            Err(e) => {
                error!("Startup failed: {}", e);
                std::process::exit(1);
            }
        };

    let mut camera = open_camera(&args, &config);

    let registry = match MetricsRegistry::new() {
        Ok(registry) => Arc::new(registry),
        Err(e) => {
            error!("Failed to create metrics registry: {}", e);
            std::process::exit(1);
        }
    };
    start_metrics_server(config.output.metrics_port, &registry);

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        if let Err(e) = ctrlc::set_handler(move || running.store(false, Ordering::SeqCst)) {
            warn!("Failed to install Ctrl-C handler: {}", e);
        }
    }

    let frame_interval = Duration::from_secs_f64(1.0 / f64::from(config.camera.fps));
    let trigger_every = u64::from(config.output.trigger_every);
    let limit = u64::from(config.output.frame_count);

    info!("Processing frames...");
    node.on_trigger();

    let mut processed = 0u64;
    let mut in_flight: Vec<Submission> = Vec::new();
    while running.load(Ordering::SeqCst) && (config.output.continuous || processed < limit) {
        if trigger_every > 0 && processed > 0 && processed % trigger_every == 0 {
            info!(frame = processed, "Trigger");
            node.on_trigger();
        }

        match camera.capture() {
            Ok(frame) => {
                let submission = node.on_frame(frame).obstacles;
                if submission.contour.is_spawned() || submission.template.is_spawned() {
                    in_flight.push(submission);
                }
            }
            Err(e) => warn!("Frame capture failed: {}", e),
        }
        processed += 1;
        in_flight.retain(|s| !s.is_finished());

        registry.update(&MetricsSnapshot::from_components(
            node.window_stats(),
            node.capture_buffered(),
            &node.worker_stats(),
        ));
        std::thread::sleep(frame_interval);
    }

    camera.close();
    for submission in in_flight {
        if !submission.join() {
            warn!("Obstacle worker panicked");
        }
    }

    let window = node.window_stats();
    let worker = node.worker_stats();
    info!(
        "Processed {} frames: {} capture cycles, {} LED reports, {} obstacle frames ({} dropped while busy), {} template searches",
        processed,
        window.cycles_completed,
        window.reports_published,
        worker.processed,
        worker.dropped_busy,
        worker.template_processed
    );
}
