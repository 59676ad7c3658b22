//! Error types for the orchestration engine.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::host::HostState;

/// Errors surfaced by engine operations.
///
/// Every variant carries the project name, template name or path involved so
/// the caller can correct its input and retry.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Project '{name}' already exists")]
    NameConflict { name: String },

    #[error("Project '{name}' not found")]
    NotFound { name: String },

    #[error("Invalid project name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("{what} is unavailable: {}", path.display())]
    PathUnavailable { what: &'static str, path: PathBuf },

    #[error("Template '{name}' not found in {}", root.display())]
    TemplateNotFound { name: String, root: PathBuf },

    #[error("Failed to copy template '{template}' to {}: {source}", destination.display())]
    CopyFailed {
        template: String,
        destination: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to delete project '{name}': {source}")]
    DeleteFailed {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Project '{name}' contains no .{extension} file")]
    NoProjectFile { name: String, extension: String },

    #[error("{} did not show its main window after {attempts} attempts", executable.display())]
    LaunchTimeout { executable: PathBuf, attempts: u32 },

    #[error("Host process {pid} is running but its main window could not be found")]
    HostUnresponsive { pid: u32 },

    #[error("Host application unavailable ({state}): {source}")]
    HostUnavailable {
        state: HostState,
        #[source]
        source: anyhow::Error,
    },

    #[error("{kind} directive failed: {reason}")]
    DirectiveFailed { kind: &'static str, reason: String },

    #[error("{kind} directive timed out after {}s", timeout.as_secs())]
    DirectiveTimeout {
        kind: &'static str,
        timeout: Duration,
    },

    #[error("Import of {} failed: {reason}", path.display())]
    ImportFailed { path: PathBuf, reason: String },

    #[error("Import of {} was cancelled", path.display())]
    Cancelled { path: PathBuf },

    #[error("Failed to update state file {}: {source}", path.display())]
    State {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to load settings from {}: {source}", path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
