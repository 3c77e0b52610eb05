//! # Drone Dashboard
//!
//! Live drone fleet telemetry over WebSocket.
//!
//! This application connects to the telemetry backend, keeps the fleet state
//! up to date and logs a status line for the selected drone.

use anyhow::{Context, Result};
use std::path::Path;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use drone_dashboard::config::{Config, LoggingConfig};
use drone_dashboard::fleet::{Reconciler, SharedReconciler, Snapshot};
use drone_dashboard::link::WsSource;
use drone_dashboard::recorder::TelemetryRecorder;
use drone_dashboard::session::Session;

/// Configuration file used when no path is given
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Base name of the diagnostic log file
const LOG_FILE_NAME: &str = "drone-dashboard.log";

/// Main entry point for Drone Dashboard application
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Load configuration (built-in defaults if the file does not exist)
///    - Set up logging with tracing subscriber
///    - Create the fleet reconciler, the WebSocket source and, if enabled,
///      the telemetry recorder
///
/// 2. **Main Loop**
///    - Feed link events into the fleet state as they arrive
///    - Log fleet status every `status_interval_ms` from a separate task, so
///      a slow connection attempt is never interrupted by the status timer
///    - Handle Ctrl+C for graceful shutdown
///
/// 3. **Graceful Shutdown**
///    - Log message totals
///    - Flush the log file writer
///
/// # Examples
///
/// ```bash
/// cargo run --release -- config/default.toml
/// ```
///
/// Expected output:
/// ```text
/// INFO drone_dashboard: Drone Dashboard v0.1.0 starting...
/// INFO drone_dashboard::link::websocket: Connected to telemetry link at ws://localhost:8000/api/telemetry/ws
/// INFO drone_dashboard: Fleet: 2 drone(s) live, selected Alpha (battery 97.52%, altitude 3.10 m, speed 4.88 m/s, position 34.070012, -118.439811)
/// ```
#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config_found = Path::new(&config_path).exists();
    let config = if config_found {
        Config::load(&config_path)
            .with_context(|| format!("Failed to load configuration from {}", config_path))?
    } else {
        Config::default()
    };

    let _log_guard = init_logging(&config.logging)?;

    info!("Drone Dashboard v{} starting...", env!("CARGO_PKG_VERSION"));
    if config_found {
        info!("Loaded configuration from {}", config_path);
    } else {
        info!("No configuration at {}, using defaults", config_path);
    }

    let reconciler = SharedReconciler::new(Reconciler::from_config(&config.fleet));
    let source = WsSource::new(&config.link);
    let mut session = Session::new(source, reconciler.clone(), config.fleet.legacy_entity_id.clone());

    if config.recorder.enabled {
        let recorder = TelemetryRecorder::create(&config.recorder)
            .context("Failed to create telemetry recorder")?;
        info!("Telemetry recorder enabled in {}", recorder.dir().display());
        session = session.with_recorder(recorder);
    }

    let status_task = spawn_status_reporter(
        reconciler.clone(),
        Duration::from_millis(config.link.status_interval_ms),
    );

    info!("Listening for telemetry on {}", config.link.url);
    info!("Press Ctrl+C to exit");

    loop {
        tokio::select! {
            running = session.step() => {
                if !running {
                    info!("Telemetry source finished");
                    break;
                }
            }

            // Handle Ctrl+C for graceful shutdown
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    status_task.abort();
    info!(
        "Messages accepted: {}, rejected: {}",
        session.accepted(),
        session.rejected()
    );

    Ok(())
}

/// Install the console subscriber and, when configured, a daily log file.
///
/// The returned guard must be held until exit so buffered file lines are written.
fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let level: tracing::Level = config
        .level
        .parse()
        .with_context(|| format!("Invalid log level '{}'", config.level))?;

    let (file_layer, guard) = match &config.file_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_NAME);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(level.into()))
        .with(fmt::layer())
        .with(file_layer)
        .init();

    Ok(guard)
}

/// Log fleet status on a fixed period until the task is aborted.
fn spawn_status_reporter(reconciler: SharedReconciler, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        loop {
            ticker.tick().await;
            log_fleet_status(&reconciler);
        }
    })
}

fn log_fleet_status(reconciler: &SharedReconciler) {
    let (live, selected) = reconciler.read(|r| (r.len(), r.selected_snapshot()));

    match selected {
        Some(snapshot) => info!(
            "Fleet: {} drone(s) live, selected {}",
            live,
            describe(&snapshot)
        ),
        None => info!("Fleet: {} drone(s) live, none selected", live),
    }
}

/// One-line summary of a drone's latest reading
fn describe(snapshot: &Snapshot) -> String {
    format!(
        "{} (battery {}%, altitude {} m, speed {} m/s, position {}, {})",
        snapshot.display_name(),
        metric(snapshot.battery, 2),
        metric(snapshot.altitude, 2),
        metric(snapshot.speed, 2),
        metric(snapshot.lat, 6),
        metric(snapshot.lng, 6),
    )
}

/// Fixed-precision value, or "N/A" when unknown
fn metric(value: Option<f64>, precision: usize) -> String {
    match value {
        Some(v) => format!("{:.*}", precision, v),
        None => "N/A".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_path() {
        assert_eq!(DEFAULT_CONFIG_PATH, "config/default.toml");
    }

    #[test]
    fn test_metric_formatting() {
        assert_eq!(metric(Some(55.5), 2), "55.50");
        assert_eq!(metric(Some(34.07), 6), "34.070000");
        assert_eq!(metric(None, 2), "N/A");
    }

    #[test]
    fn test_describe_selected_drone() {
        let mut snapshot = Snapshot::new("a", "Alpha");
        snapshot.battery = Some(97.523);
        snapshot.lat = Some(34.07);

        assert_eq!(
            describe(&snapshot),
            "Alpha (battery 97.52%, altitude N/A m, speed N/A m/s, position 34.070000, N/A)"
        );
    }

    #[test]
    fn test_describe_unnamed_drone() {
        let snapshot = Snapshot::new("d-7", "");
        assert!(describe(&snapshot).starts_with("d-7 ("));
    }

    #[test]
    fn test_status_reads_shared_state() {
        let reconciler = SharedReconciler::new(Reconciler::new());
        // Must not panic on an empty fleet
        log_fleet_status(&reconciler);
        assert!(reconciler.selected().is_none());
    }

    #[tokio::test]
    async fn test_status_reporter_runs_beside_session() {
        use drone_dashboard::link::{LinkEvent, TelemetrySource};

        // Source that connects only after several status periods have passed
        struct SlowSource {
            delay: Duration,
            done: bool,
        }

        #[async_trait::async_trait]
        impl TelemetrySource for SlowSource {
            async fn next_event(&mut self) -> Option<LinkEvent> {
                if self.done {
                    return None;
                }
                tokio::time::sleep(self.delay).await;
                self.done = true;
                Some(LinkEvent::Text(r#"{"drones": [{"id": "a"}]}"#.to_string()))
            }
        }

        let reconciler = SharedReconciler::new(Reconciler::new());
        let status_task = spawn_status_reporter(reconciler.clone(), Duration::from_millis(5));
        let mut session = Session::new(
            SlowSource { delay: Duration::from_millis(40), done: false },
            reconciler.clone(),
            "default".to_string(),
        );

        assert!(session.step().await);
        assert_eq!(session.accepted(), 1);
        assert!(!status_task.is_finished());
        assert_eq!(reconciler.selected().as_deref(), Some("a"));

        status_task.abort();
        assert!(status_task.await.unwrap_err().is_cancelled());
    }
}
