//! Logging Module
//!
//! Structured logging setup using the `tracing` crate.

use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum log level to display
    pub level: Level,
    /// Whether to include target (module path)
    pub include_target: bool,
    /// Whether to use ANSI colors
    pub ansi_colors: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            include_target: false,
            ansi_colors: true,
        }
    }
}

impl LogConfig {
    /// Verbose logging config for debugging
    pub fn verbose() -> Self {
        Self {
            level: Level::DEBUG,
            include_target: true,
            ansi_colors: true,
        }
    }
}

/// Initialize logging with the given configuration
pub fn init_logging(config: &LogConfig) -> Result<(), String> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.level)
        .with_ansi(config.ansi_colors)
        .with_target(config.include_target)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| format!("Failed to initialize logging: {}", e))?;

    Ok(())
}
