//! Host application control.
//!
//! The host application is driven only through externally observable
//! signals: process existence, presence of its main window, and scripts
//! handed to the running instance. [`HostPlatform`] wraps the per-OS lookups;
//! [`HostApplication`] is the narrow capability the rest of the engine uses.

pub mod automation;
mod controller;
pub mod directive;

pub use automation::get_host_platform;
pub use controller::ProcessController;
pub use directive::{Ack, Directive};

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use crate::error::Result;

/// Lifecycle of the tracked host process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HostState {
    NotRunning,
    Launching,
    Ready,
    Unresponsive,
    Exited,
}

impl fmt::Display for HostState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            HostState::NotRunning => "not running",
            HostState::Launching => "launching",
            HostState::Ready => "ready",
            HostState::Unresponsive => "unresponsive",
            HostState::Exited => "exited",
        };
        f.write_str(label)
    }
}

/// Lookup key for a top-level window. Not an owned resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WindowRef {
    pub id: String,
    pub title: String,
}

/// A host process the controller confirmed or launched.
///
/// Handles go stale when the process exits; the controller re-validates the
/// pid before every use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostProcessHandle {
    pub pid: u32,
    pub window: Option<WindowRef>,
    pub ready: bool,
}

impl HostProcessHandle {
    pub fn ready(pid: u32, window: WindowRef) -> Self {
        Self {
            pid,
            window: Some(window),
            ready: true,
        }
    }

    pub fn unresponsive(pid: u32) -> Self {
        Self {
            pid,
            window: None,
            ready: false,
        }
    }
}

/// Snapshot reported by `host status`
#[derive(Debug, Clone, Serialize)]
pub struct HostStatus {
    pub state: HostState,
    pub handle: Option<HostProcessHandle>,
    pub platform: &'static str,
}

/// Per-OS process and window lookups.
///
/// Implementations shell out to the platform's own tools and report failures
/// with `anyhow` context; the controller turns them into engine errors.
#[async_trait]
pub trait HostPlatform: Send + Sync {
    /// Short description of the automation mechanism
    fn description(&self) -> &'static str;

    /// Find a running process started from `executable`
    async fn find_process(&self, executable: &Path) -> anyhow::Result<Option<u32>>;

    /// Check whether `pid` still names a live process
    async fn is_alive(&self, pid: u32) -> anyhow::Result<bool>;

    /// Start `executable`, optionally opening `document`, and return its pid
    async fn spawn(&self, executable: &Path, document: Option<&Path>) -> anyhow::Result<u32>;

    /// Find the main window of `pid` whose title contains `title_hint`
    async fn find_main_window(
        &self,
        pid: u32,
        title_hint: &str,
    ) -> anyhow::Result<Option<WindowRef>>;

    /// Hand a script file to the running instance and wait for it to return
    async fn run_script(&self, executable: &Path, pid: u32, script: &Path)
        -> anyhow::Result<String>;
}

/// The capability the engine depends on to drive the host application.
#[async_trait]
pub trait HostApplication: Send + Sync {
    /// Attach to or launch the host and wait for its main window
    async fn ensure_running(&self) -> Result<HostProcessHandle>;

    /// Ask the host to open a project document
    async fn open_project(&self, project_file: &Path) -> Result<()>;

    /// Deliver a directive over the automation channel
    async fn send_directive(&self, directive: &Directive, timeout: Duration) -> Result<Ack>;

    /// Current controller state without side effects
    async fn state(&self) -> HostState;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display() {
        assert_eq!(HostState::NotRunning.to_string(), "not running");
        assert_eq!(HostState::Ready.to_string(), "ready");
    }

    #[test]
    fn test_handle_constructors() {
        let window = WindowRef {
            id: "0x1".to_string(),
            title: "Adobe After Effects 2024".to_string(),
        };
        assert!(HostProcessHandle::ready(4, window).ready);
        let stale = HostProcessHandle::unresponsive(4);
        assert!(!stale.ready);
        assert!(stale.window.is_none());
    }
}
