//! Pi doorbell appliance process.
//!
//! Opens the camera, starts streaming, listens to the two buttons and
//! feeds the latest frames to the viewer until interrupted.

use clap::Parser;
use pi_doorbell::{
    capture::{naming, Camera, CaptureEngine, MockCamera, SnapshotNamer},
    config::{AppConfig, CameraBackend},
    input::{Debouncer, EdgeSource, MockEdgeHandle, MockEdgeSource},
    metrics::{MetricsRegistry, MetricsSnapshot},
};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// How often lifecycle statistics are logged and exported.
const STATS_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Parser)]
#[command(name = "pi-doorbell", version, about = "Raspberry Pi doorbell camera and buttons")]
struct Cli {
    /// TOML configuration file; environment variables override it.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Use the synthetic camera, and buttons driven from stdin (`l` / `r`).
    #[arg(long)]
    mock: bool,

    /// Exit after this many seconds instead of waiting for Ctrl-C.
    #[arg(long)]
    duration: Option<u64>,
}

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    info!("Pi doorbell v{}", pi_doorbell::VERSION);

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let buttons = match select_buttons(cli.mock) {
        Ok(buttons) => buttons,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    let camera = match select_camera(&cli, &config) {
        Ok(camera) => camera,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    let engine = match CaptureEngine::open_boxed(config.camera.capture.clone(), camera) {
        Ok(engine) => Arc::new(engine.with_jpeg_quality(config.snapshot.jpeg_quality)),
        Err(e) => {
            eprintln!("Failed to open camera: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = engine.start() {
        eprintln!("Failed to start streaming: {}", e);
        std::process::exit(1);
    }

    let result = match buttons {
        ButtonSource::Simulated => run_simulated(&cli, &config, &engine),
        ButtonSource::Gpio => run_with_gpio(&cli, &config, &engine),
    };

    engine.stop();
    if let Err(e) = result {
        eprintln!("{}", e);
        std::process::exit(1);
    }
    info!("Done. {:?}", engine.stats());
}

fn load_config(cli: &Cli) -> Result<AppConfig, pi_doorbell::ConfigError> {
    let mut config = match &cli.config {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::default(),
    };
    config.apply_env()?;
    Ok(config)
}

fn select_camera(cli: &Cli, config: &AppConfig) -> Result<Box<dyn Camera>, String> {
    if cli.mock || config.camera.backend == CameraBackend::Mock {
        info!("Using synthetic camera input");
        return Ok(Box::new(MockCamera::new()));
    }

    #[cfg(feature = "camera")]
    {
        Ok(Box::new(pi_doorbell::capture::NokhwaCamera::new()))
    }
    #[cfg(not(feature = "camera"))]
    {
        Err("native camera backend requires building with the `camera` feature".to_string())
    }
}

/// Where button edges come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ButtonSource {
    Gpio,
    Simulated,
}

fn select_buttons(mock: bool) -> Result<ButtonSource, String> {
    if mock {
        Ok(ButtonSource::Simulated)
    } else if cfg!(feature = "gpio") {
        Ok(ButtonSource::Gpio)
    } else {
        Err("GPIO buttons require building with the `gpio` feature (or run with --mock)".to_string())
    }
}

#[cfg(feature = "gpio")]
fn run_with_gpio(cli: &Cli, config: &AppConfig, engine: &Arc<CaptureEngine>) -> Result<(), String> {
    let source = pi_doorbell::input::GpioEdgeSource::new().map_err(|e| e.to_string())?;
    run(cli, config, engine, source)
}

#[cfg(not(feature = "gpio"))]
fn run_with_gpio(_: &Cli, _: &AppConfig, _: &Arc<CaptureEngine>) -> Result<(), String> {
    Err("built without the `gpio` feature".to_string())
}

/// Runs with buttons pressed by typing `l` or `r` on stdin.
fn run_simulated(cli: &Cli, config: &AppConfig, engine: &Arc<CaptureEngine>) -> Result<(), String> {
    let source = MockEdgeSource::new();
    let handle = source.handle();
    let (left, right) = (config.buttons.left_pin, config.buttons.right_pin);
    std::thread::Builder::new()
        .name("simulated-buttons".into())
        .spawn(move || {
            let stdin = std::io::stdin();
            simulate_presses(stdin.lock(), &handle, left, right)
        })
        .map_err(|e| format!("Failed to start simulated buttons: {}", e))?;

    info!("Simulated buttons: type 'l' (snapshot) or 'r' (toggle stream), then Enter");
    run(cli, config, engine, source)
}

/// Feeds one falling edge per `l` / `r` line to the matching pin.
///
/// Returns the number of edges a listening channel received.
fn simulate_presses<R: BufRead>(input: R, handle: &MockEdgeHandle, left: u8, right: u8) -> usize {
    let mut delivered = 0;
    for line in input.lines() {
        let Ok(line) = line else { break };
        let pin = match line.trim() {
            "l" | "left" => left,
            "r" | "right" => right,
            "" => continue,
            other => {
                warn!(input = %other, "Unknown button; type 'l' or 'r'");
                continue;
            }
        };
        if handle.fall(pin) {
            delivered += 1;
        } else {
            debug!(pin, "Button not listening");
        }
    }
    delivered
}

/// Wires the buttons, then runs the viewer feed until shutdown.
fn run<S: EdgeSource>(
    cli: &Cli,
    config: &AppConfig,
    engine: &Arc<CaptureEngine>,
    source: S,
) -> Result<(), String> {
    let window = config.buttons.debounce_window();
    let mut buttons = Debouncer::new(source);
    for (name, pin) in [("left", config.buttons.left_pin), ("right", config.buttons.right_pin)] {
        buttons
            .register(name, pin, window)
            .map_err(|e| format!("Failed to register {} button: {}", name, e))?;
    }

    let namer = SnapshotNamer::new(
        config.snapshot.directory.clone(),
        config.snapshot.datetime_format.clone(),
    )
    .map_err(|e| e.to_string())?;
    let snapshot_engine = Arc::clone(engine);
    buttons
        .on_press("left", move |_| {
            let name = namer.next(std::iter::empty::<&str>());
            match snapshot_engine.capture_snapshot(&name.path) {
                Ok(snapshot) => {
                    let uri = naming::file_uri(&snapshot.path)
                        .unwrap_or_else(|_| snapshot.path.display().to_string());
                    info!(uri = %uri, image_timestamp = %name.timestamp, "Snapshot captured");
                }
                Err(e) if e.is_transient() => warn!("Snapshot unavailable, try again: {}", e),
                Err(e) => error!("Snapshot failed: {}", e),
            }
        })
        .map_err(|e| e.to_string())?;

    let toggle_engine = Arc::clone(engine);
    buttons
        .on_press("right", move |_| {
            if toggle_engine.is_streaming() {
                toggle_engine.stop();
            } else if let Err(e) = toggle_engine.start() {
                error!("Failed to restart streaming: {}", e);
            }
        })
        .map_err(|e| e.to_string())?;

    buttons
        .start()
        .map_err(|e| format!("Failed to start buttons: {}", e))?;

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        ctrlc::set_handler(move || running.store(false, Ordering::SeqCst))
            .map_err(|e| format!("Failed to install signal handler: {}", e))?;
    }

    let exporter = spawn_metrics(config.metrics.port);
    let deadline = cli.duration.map(|secs| Instant::now() + Duration::from_secs(secs));
    let interval = engine.config().frame_interval();
    let mut last_sent = None;
    let mut frames_sent = 0u64;
    let mut last_report = Instant::now();

    info!("Running; press Ctrl-C to exit");
    while running.load(Ordering::SeqCst) && deadline.map_or(true, |d| Instant::now() < d) {
        // Live feed: forward whatever frame is current, once.
        if let Some(frame) = engine.latest_frame() {
            if last_sent != Some(frame.sequence()) {
                match engine.encode_as_data_url(&frame) {
                    Ok(url) => {
                        frames_sent += 1;
                        debug!(sequence = frame.sequence(), bytes = url.len(), "Frame sent to viewer");
                    }
                    Err(e) => warn!("Failed to encode frame: {}", e),
                }
                last_sent = Some(frame.sequence());
            }
        }

        if last_report.elapsed() >= STATS_INTERVAL {
            let snapshot = MetricsSnapshot::from_components(&engine.stats(), &buttons.stats());
            info!(
                streaming = snapshot.streaming,
                frames = snapshot.frames_acquired,
                sent = frames_sent,
                snapshots = snapshot.snapshots_written,
                presses = snapshot.button_presses,
                "Status"
            );
            if let Some(exporter) = &exporter {
                exporter.update(snapshot);
            }
            last_report = Instant::now();
        }

        std::thread::sleep(interval);
    }

    info!("Shutting down");
    buttons.stop();
    Ok(())
}

/// Receives metric snapshots for export.
struct Exporter {
    registry: Option<MetricsRegistry>,
    #[cfg(feature = "metrics")]
    state: Option<Arc<tokio::sync::RwLock<pi_doorbell::metrics::MetricsState>>>,
}

impl Exporter {
    fn update(&self, snapshot: MetricsSnapshot) {
        #[cfg(feature = "metrics")]
        {
            if let Some(state) = &self.state {
                state.blocking_write().update(snapshot);
                return;
            }
        }
        if let Some(registry) = &self.registry {
            registry.update(&snapshot);
        }
    }
}

/// Starts the metrics exporter on its own runtime thread when enabled.
fn spawn_metrics(port: u16) -> Option<Exporter> {
    if port == 0 {
        return None;
    }
    let registry = match MetricsRegistry::new() {
        Ok(registry) => registry,
        Err(e) => {
            warn!("Metrics disabled: {}", e);
            return None;
        }
    };

    #[cfg(feature = "metrics")]
    {
        use pi_doorbell::metrics::{MetricsServer, MetricsServerConfig};

        let server = MetricsServer::new(MetricsServerConfig::with_port(port), registry);
        let state = server.state();
        let spawned = std::thread::Builder::new()
            .name("metrics".into())
            .spawn(move || {
                let runtime = match tokio::runtime::Runtime::new() {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        error!("Failed to start metrics runtime: {}", e);
                        return;
                    }
                };
                if let Err(e) = runtime.block_on(server.run()) {
                    error!("Metrics server stopped: {}", e);
                }
            });
        if let Err(e) = spawned {
            warn!("Metrics disabled: {}", e);
            return None;
        }
        Some(Exporter {
            registry: None,
            state: Some(state),
        })
    }

    #[cfg(not(feature = "metrics"))]
    {
        debug!(port, "Built without the metrics feature; collecting without exporting");
        Some(Exporter {
            registry: Some(registry),
        })
    }
}
