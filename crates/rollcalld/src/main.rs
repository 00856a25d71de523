//! rollcalld - The rollcall kiosk service
//!
//! This is the main entry point for the rollcalld service.
//! It wires together all the components:
//! - Configuration loading
//! - Store initialization
//! - Location source (sample replay)
//! - Attendance portal
//! - Operator console on stdin

mod console;
mod replay;

use anyhow::{Context, Result};
use clap::Parser;
use console::{ConsoleCommand, HELP};
use replay::ReplaySource;
use rollcall_api::LocationStatus;
use rollcall_config::load_config;
use rollcall_core::{AttendancePortal, LogNotifier};
use rollcall_location_api::{LocationSource, PermissionState};
use rollcall_store::{AuditEvent, AuditEventType, SqliteStore, Store};
use rollcall_util::{DATABASE_FILENAME, default_config_path, format_duration, is_mock_time_active};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal::unix::{SignalKind, signal};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// rollcalld - Geofenced attendance check-in service
#[derive(Parser, Debug)]
#[command(name = "rollcalld")]
#[command(about = "Geofenced attendance check-in service", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/rollcall/config.toml)
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Data directory override (or set ROLLCALL_DATA_DIR env var)
    #[arg(short, long, env = "ROLLCALL_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Newline-delimited JSON file of location samples to replay
    #[arg(short, long)]
    fixes: Option<PathBuf>,

    /// Answer the location permission prompt with "deny"
    #[arg(long)]
    deny_location: bool,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

/// Main service state
struct Service {
    portal: AttendancePortal,
    store: Arc<dyn Store>,
}

impl Service {
    fn new(args: &Args) -> Result<Self> {
        // Load configuration
        let settings = load_config(&args.config)
            .with_context(|| format!("Failed to load config from {:?}", args.config))?;

        info!(
            config_path = %args.config.display(),
            geofence_configured = settings.geofence.is_configured(),
            attendance_types = settings.attendance_types.len(),
            cache_validity = %format_duration(settings.cache_validity),
            log_dir = %settings.service.log_dir.display(),
            "Configuration loaded"
        );

        if is_mock_time_active() {
            warn!("Mock time is active; record timestamps come from the mocked clock");
        }

        let data_dir = args
            .data_dir
            .clone()
            .unwrap_or_else(|| settings.service.data_dir.clone());

        // Create data directory
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory {:?}", data_dir))?;

        // Initialize store
        let db_path = data_dir.join(DATABASE_FILENAME);
        let store: Arc<dyn Store> = Arc::new(
            SqliteStore::open(&db_path)
                .with_context(|| format!("Failed to open database {:?}", db_path))?,
        );

        info!(db_path = %db_path.display(), "Store initialized");

        // Log service start
        store.append_audit(AuditEvent::new(AuditEventType::ServiceStarted))?;

        // Initialize location source
        let grant = if args.deny_location {
            PermissionState::Denied
        } else {
            PermissionState::Granted
        };
        let source: Arc<dyn LocationSource> = match &args.fixes {
            Some(path) => Arc::new(ReplaySource::from_path(path, grant)?),
            None => {
                warn!("No replay file given; location will be unavailable");
                Arc::new(ReplaySource::new(Vec::new(), grant))
            }
        };

        let portal = AttendancePortal::new(settings, source, store.clone(), Arc::new(LogNotifier));

        Ok(Self { portal, store })
    }

    async fn run(self) -> Result<()> {
        // Set up signal handlers
        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to create SIGTERM handler")?;
        let mut sigint =
            signal(SignalKind::interrupt()).context("Failed to create SIGINT handler")?;
        let mut sighup =
            signal(SignalKind::hangup()).context("Failed to create SIGHUP handler")?;

        let mut status = self.portal.subscribe();
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut stdin_open = true;

        self.portal.start().await;
        info!("Service running");

        loop {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down gracefully");
                    break;
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, shutting down gracefully");
                    break;
                }
                _ = sighup.recv() => {
                    info!("Received SIGHUP, shutting down gracefully");
                    break;
                }

                changed = status.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let current = status.borrow_and_update().clone();
                    log_status(&current);
                }

                line = lines.next_line(), if stdin_open => {
                    match line {
                        Ok(Some(line)) if line.trim().is_empty() => {}
                        Ok(Some(line)) => {
                            if !self.handle_line(&line).await {
                                break;
                            }
                        }
                        Ok(None) => {
                            info!("Console input closed; waiting for a signal to stop");
                            stdin_open = false;
                        }
                        Err(e) => {
                            warn!(error = %e, "Failed to read console input");
                            stdin_open = false;
                        }
                    }
                }
            }
        }

        // Graceful shutdown
        info!("Shutting down rollcalld");
        self.portal.cancel().await;

        let _ = self
            .store
            .append_audit(AuditEvent::new(AuditEventType::ServiceStopped));

        info!("Shutdown complete");
        Ok(())
    }

    /// Handle one console line. Returns false when the service should stop.
    async fn handle_line(&self, line: &str) -> bool {
        let command = match line.parse::<ConsoleCommand>() {
            Ok(command) => command,
            Err(e) => {
                println!("error: {}", e);
                return true;
            }
        };

        match command {
            ConsoleCommand::Status => {
                println!("{}", describe_status(&self.portal.current_verdict()));
            }
            ConsoleCommand::Refresh => {
                self.portal.refresh_location().await;
                println!("refreshing location");
            }
            ConsoleCommand::Submit {
                person_id,
                attendance_type,
                reason,
            } => {
                let decision = self
                    .portal
                    .submit(&person_id, &attendance_type, reason.as_deref())
                    .await;
                let verdict = if !decision.allowed {
                    "rejected"
                } else if decision.requires_warning_ack {
                    "accepted with warning"
                } else {
                    "accepted"
                };
                println!("{}: {}", verdict, decision.message());
            }
            ConsoleCommand::Records { person_id } => {
                let today = rollcall_util::now().date_naive();
                match self.store.records_for_day(&person_id, today) {
                    Ok(records) if records.is_empty() => {
                        println!("no records for {} on {}", person_id, today);
                    }
                    Ok(records) => {
                        for record in records {
                            let zone = record
                                .location
                                .as_ref()
                                .map(|l| l.zone.to_string())
                                .unwrap_or_else(|| "-".into());
                            println!(
                                "{} {} zone={} reason={}",
                                record.timestamp.format("%H:%M:%S"),
                                record.attendance_type,
                                zone,
                                record.reason.as_deref().unwrap_or("-")
                            );
                        }
                    }
                    Err(e) => println!("error: {}", e),
                }
            }
            ConsoleCommand::Types => {
                for kind in self.portal.attendance_types() {
                    let mode = if kind.presence { "presence" } else { "declaration" };
                    println!("{} [{}]: {}", kind.id, mode, kind.label);
                }
            }
            ConsoleCommand::Help => println!("{}", HELP),
            ConsoleCommand::Quit => {
                info!("Quit requested from console");
                return false;
            }
        }

        true
    }
}

fn describe_status(status: &LocationStatus) -> String {
    match status {
        LocationStatus::NoFix => "waiting for a location fix".to_string(),
        LocationStatus::Unavailable { failure } => {
            format!("location unavailable ({}); use 'refresh' to retry", failure)
        }
        LocationStatus::Located { verdict } => verdict.message.clone(),
    }
}

fn log_status(status: &LocationStatus) {
    match status {
        LocationStatus::Located { verdict } => info!(
            zone = %verdict.zone,
            distance_m = verdict.distance_m,
            accuracy_m = verdict.accuracy_m,
            "Location status changed"
        ),
        LocationStatus::Unavailable { failure } => {
            warn!(%failure, "Location unavailable")
        }
        LocationStatus::NoFix => info!("Waiting for a location fix"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "rollcalld starting");

    // Create and run the service
    let service = Service::new(&args)?;
    service.run().await
}
