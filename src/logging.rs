//! Logging Module
//!
//! Initializes application logging with tracing: console output always,
//! plus optional daily-rolling file output when a log directory is
//! configured. `RUST_LOG` overrides the configured level.

use crate::{Result, VaultError};
use std::path::Path;
use tracing::{debug, info};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Setup application logging with tracing
pub fn init(log_level: &str, app_log_dir: Option<&Path>) -> Result<()> {
    let file_layer = match app_log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).map_err(|e| {
                VaultError::IoError(format!("Failed to create app log directory: {}", e))
            })?;
            let file_appender =
                RollingFileAppender::new(Rotation::DAILY, dir, "vault-proxy.log");
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(file_appender)
                    .with_ansi(false)
                    .with_target(true)
                    .with_level(true)
                    .with_timer(tracing_subscriber::fmt::time::ChronoUtc::rfc_3339())
                    .compact(),
            )
        }
        None => None,
    };

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout)
        .with_ansi(true)
        .with_target(false)
        .with_level(true)
        .with_timer(tracing_subscriber::fmt::time::ChronoUtc::rfc_3339())
        .compact();

    // Config log level applies unless RUST_LOG overrides it
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let result = tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init();

    match result {
        Ok(_) => {
            info!("Logging initialized at level {}", log_level);
            if let Some(dir) = app_log_dir {
                info!("Application logs will be written to: {:?}", dir);
            }
        }
        Err(_) => {
            // Already initialized, likely in tests - this is fine
            debug!("Tracing subscriber already initialized, skipping");
        }
    }

    Ok(())
}
