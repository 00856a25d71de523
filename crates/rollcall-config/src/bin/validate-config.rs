//! Config validation CLI tool
//!
//! Validates a rollcall settings file and reports any errors.

use rollcall_util::default_config_path;
use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let config_path = match args.get(1) {
        Some(path) => PathBuf::from(path),
        None => {
            let default_path = default_config_path();
            eprintln!("Usage: validate-config [config-file]");
            eprintln!();
            eprintln!("Validates a rollcall settings file.");
            eprintln!();
            eprintln!("If no path is provided, uses: {}", default_path.display());
            return ExitCode::from(2);
        }
    };

    if !config_path.exists() {
        eprintln!("Error: Configuration file not found: {}", config_path.display());
        return ExitCode::from(1);
    }

    match rollcall_config::load_config(&config_path) {
        Ok(settings) => {
            println!("✓ Configuration is valid");
            println!();
            println!("Summary:");
            println!("  Config version: {}", rollcall_config::CURRENT_CONFIG_VERSION);

            match settings.geofence.configured_center() {
                Some(center) => println!(
                    "  Geofence: {} radius {:.0} m",
                    center, settings.geofence.radius_m
                ),
                None => {
                    println!("  Geofence: not configured (presence submissions will be rejected)")
                }
            }

            println!(
                "  Acquisition: {} accurate attempt(s), {:?} backoff, {:.1} m hysteresis",
                settings.acquisition.accurate_attempts,
                settings.acquisition.retry_backoff,
                settings.acquisition.hysteresis_m
            );
            println!("  Cache validity: {:?}", settings.cache_validity);

            println!();
            println!("Attendance types:");
            for kind in &settings.attendance_types {
                let mode = if kind.presence { "presence" } else { "declaration" };
                println!("  - {} [{}]: {}", kind.id, mode, kind.label);
            }

            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed");
            eprintln!();
            match &e {
                rollcall_config::ConfigError::ReadError(io_err) => {
                    eprintln!("Failed to read file: {}", io_err);
                }
                rollcall_config::ConfigError::ParseError(parse_err) => {
                    eprintln!("TOML parse error:");
                    eprintln!("  {}", parse_err);
                }
                rollcall_config::ConfigError::ValidationFailed { errors } => {
                    eprintln!("Validation errors ({}):", errors.len());
                    for err in errors {
                        eprintln!("  - {}", err);
                    }
                }
                rollcall_config::ConfigError::UnsupportedVersion(ver) => {
                    eprintln!(
                        "Unsupported config version: {} (expected {})",
                        ver,
                        rollcall_config::CURRENT_CONFIG_VERSION
                    );
                }
            }
            ExitCode::from(1)
        }
    }
}
