//! Unified output interface for human-readable and JSON modes
//!
//! In CLI mode user-facing output goes to stdout. In JSON mode stdout carries
//! only the serialized command result and everything else goes to stderr.

mod config;
mod display;
pub mod writer;

pub use config::{OutputConfig, OutputMode};

use once_cell::sync::OnceCell;
use std::sync::RwLock;

static OUTPUT_CONFIG: OnceCell<RwLock<OutputConfig>> = OnceCell::new();

/// Initialize the output system with the specified mode and verbosity.
///
/// Only the first call takes effect.
pub fn init_with_verbosity(mode: OutputMode, verbose: bool) {
    let mut config = OutputConfig::new(mode);
    if verbose {
        config.set_verbose();
    }

    if OUTPUT_CONFIG.set(RwLock::new(config)).is_ok() {
        if let Some(config) = OUTPUT_CONFIG.get() {
            if let Ok(config) = config.read() {
                config.init_tracing();
            }
        }
    }
}

/// Get current output mode, CLI when uninitialized
pub fn current_mode() -> OutputMode {
    OUTPUT_CONFIG
        .get()
        .and_then(|config| config.read().ok().map(|c| c.mode()))
        .unwrap_or(OutputMode::Cli)
}

/// Whether display output may use ANSI colors
pub fn colors_enabled() -> bool {
    OUTPUT_CONFIG
        .get()
        .and_then(|config| config.read().ok().map(|c| c.colors_enabled()))
        .unwrap_or(false)
}
