//! Output configuration and mode management

use console::Term;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Output mode for the application
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-readable results on stdout, logs on stderr
    Cli,
    /// JSON results on stdout; display text and logs on stderr
    Json,
}

/// Configuration for the output system
#[derive(Debug)]
pub struct OutputConfig {
    mode: OutputMode,
    color_enabled: bool,
    log_level: Level,
}

impl OutputConfig {
    pub fn new(mode: OutputMode) -> Self {
        let color_enabled = match mode {
            OutputMode::Cli => Term::stdout().features().colors_supported(),
            OutputMode::Json => false,
        };

        let log_level = std::env::var("RUST_LOG")
            .ok()
            .and_then(|level| parse_level(&level))
            .unwrap_or(Level::WARN);

        Self {
            mode,
            color_enabled,
            log_level,
        }
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    pub fn colors_enabled(&self) -> bool {
        self.color_enabled
    }

    pub fn log_level(&self) -> Level {
        self.log_level
    }

    /// Set verbose mode (DEBUG level)
    pub fn set_verbose(&mut self) {
        self.log_level = Level::DEBUG;
    }

    /// Initialize the tracing subscriber; logs always go to stderr
    pub fn init_tracing(&self) {
        let builder = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env().add_directive(self.log_level.into()))
            .with_target(false)
            .with_level(true)
            .with_writer(std::io::stderr);

        let result = match self.mode {
            OutputMode::Cli => builder.with_ansi(self.color_enabled).try_init(),
            OutputMode::Json => builder.with_ansi(false).without_time().compact().try_init(),
        };
        if let Err(e) = result {
            eprintln!("Tracing already initialized: {e}");
        }
    }
}

fn parse_level(level: &str) -> Option<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("DEBUG"), Some(Level::DEBUG));
        assert_eq!(parse_level("stagehand=trace"), None);
    }

    #[test]
    fn test_verbose_overrides_level() {
        let mut config = OutputConfig::new(OutputMode::Json);
        config.set_verbose();
        assert_eq!(config.log_level(), Level::DEBUG);
        assert!(!config.colors_enabled());
    }
}
