use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{
    Ack, Directive, HostApplication, HostPlatform, HostProcessHandle, HostState, HostStatus,
    WindowRef,
};
use crate::error::{EngineError, Result};
use crate::settings::{HostSettings, ReopenPolicy};

/// Owns the lifecycle of the single host application process.
///
/// All state lives behind one async mutex, so concurrent callers never
/// launch a second instance or interleave directives.
pub struct ProcessController {
    platform: Arc<dyn HostPlatform>,
    executable: PathBuf,
    settings: HostSettings,
    inner: Mutex<ControllerInner>,
}

struct ControllerInner {
    state: HostState,
    handle: Option<HostProcessHandle>,
    /// Pid and document of the last successful open request
    last_opened: Option<(u32, PathBuf)>,
}

/// How `ensure_running` reached a ready host
enum Arrival {
    Existing,
    Launched,
}

impl ProcessController {
    pub fn new(
        platform: Arc<dyn HostPlatform>,
        executable: PathBuf,
        settings: HostSettings,
    ) -> Self {
        Self {
            platform,
            executable,
            settings,
            inner: Mutex::new(ControllerInner {
                state: HostState::NotRunning,
                handle: None,
                last_opened: None,
            }),
        }
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    fn unavailable(state: HostState) -> impl FnOnce(anyhow::Error) -> EngineError {
        move |source| EngineError::HostUnavailable { state, source }
    }

    /// Report the host's state without launching it.
    ///
    /// Re-validates a tracked pid and, when nothing is tracked, looks for a
    /// host started outside this process.
    pub async fn status(&self) -> Result<HostStatus> {
        let mut inner = self.inner.lock().await;

        if let Some(handle) = inner.handle.clone() {
            let alive = self
                .platform
                .is_alive(handle.pid)
                .await
                .map_err(Self::unavailable(inner.state))?;
            if !alive {
                Self::mark_exited(&mut inner, handle.pid);
            }
        }

        if inner.handle.is_none() {
            if let Some(pid) = self
                .platform
                .find_process(&self.executable)
                .await
                .map_err(Self::unavailable(inner.state))?
            {
                debug!(pid, "found untracked host process");
                return Ok(HostStatus {
                    state: HostState::Unresponsive,
                    handle: Some(HostProcessHandle::unresponsive(pid)),
                    platform: self.platform.description(),
                });
            }
        }

        Ok(HostStatus {
            state: inner.state,
            handle: inner.handle.clone(),
            platform: self.platform.description(),
        })
    }

    fn mark_exited(inner: &mut ControllerInner, pid: u32) {
        warn!(pid, "host process exited");
        inner.state = HostState::Exited;
        inner.handle = None;
        inner.last_opened = None;
    }

    async fn ensure_running_locked(
        &self,
        inner: &mut ControllerInner,
        document: Option<&Path>,
    ) -> Result<(HostProcessHandle, Arrival)> {
        if let Some(handle) = inner.handle.clone() {
            let alive = self
                .platform
                .is_alive(handle.pid)
                .await
                .map_err(Self::unavailable(inner.state))?;

            if alive {
                return self.attach(inner, handle.pid).await;
            }
            Self::mark_exited(inner, handle.pid);
        }

        let existing = self
            .platform
            .find_process(&self.executable)
            .await
            .map_err(Self::unavailable(inner.state))?;
        if let Some(pid) = existing {
            info!(pid, "attaching to running host");
            return self.attach(inner, pid).await;
        }

        self.launch(inner, document).await
    }

    /// Confirm the main window of an already running process; never spawns
    async fn attach(
        &self,
        inner: &mut ControllerInner,
        pid: u32,
    ) -> Result<(HostProcessHandle, Arrival)> {
        match self.await_window(pid).await? {
            Some((pid, window)) => {
                let handle = HostProcessHandle::ready(pid, window);
                inner.state = HostState::Ready;
                inner.handle = Some(handle.clone());
                Ok((handle, Arrival::Existing))
            }
            None => {
                warn!(pid, "host process has no main window");
                inner.state = HostState::Unresponsive;
                inner.handle = Some(HostProcessHandle::unresponsive(pid));
                Err(EngineError::HostUnresponsive { pid })
            }
        }
    }

    async fn launch(
        &self,
        inner: &mut ControllerInner,
        document: Option<&Path>,
    ) -> Result<(HostProcessHandle, Arrival)> {
        info!(
            executable = %self.executable.display(),
            document = ?document,
            "launching host"
        );
        inner.state = HostState::Launching;
        inner.handle = None;

        let pid = match self.platform.spawn(&self.executable, document).await {
            Ok(pid) => pid,
            Err(source) => {
                inner.state = HostState::NotRunning;
                return Err(EngineError::HostUnavailable {
                    state: HostState::Launching,
                    source,
                });
            }
        };

        let found = match self.await_window(pid).await {
            Ok(found) => found,
            Err(e) => {
                warn!(pid, error = %e, "lost track of launching host");
                inner.state = HostState::Unresponsive;
                return Err(e);
            }
        };

        if let Some((pid, window)) = found {
            info!(pid, window = %window.title, "host ready");
            let handle = HostProcessHandle::ready(pid, window);
            inner.state = HostState::Ready;
            inner.handle = Some(handle.clone());
            return Ok((handle, Arrival::Launched));
        }

        let still_alive = match self.platform.is_alive(pid).await {
            Ok(alive) => alive,
            Err(e) => {
                warn!(pid, error = %e, "could not check host process after launch timeout");
                false
            }
        };
        inner.state = if still_alive {
            HostState::Unresponsive
        } else {
            HostState::Exited
        };
        warn!(pid, state = %inner.state, "host did not become ready");

        Err(EngineError::LaunchTimeout {
            executable: self.executable.clone(),
            attempts: self.settings.launch_poll_attempts,
        })
    }

    /// Poll for the main window within the configured budget.
    ///
    /// A launcher may exit after handing off to the real process; when the
    /// watched pid disappears, the detected host pid is adopted instead.
    async fn await_window(&self, pid: u32) -> Result<Option<(u32, WindowRef)>> {
        let attempts = self.settings.launch_poll_attempts.max(1);
        let mut pid = pid;

        for attempt in 1..=attempts {
            let alive = self
                .platform
                .is_alive(pid)
                .await
                .map_err(Self::unavailable(HostState::Launching))?;

            if alive {
                let window = self
                    .platform
                    .find_main_window(pid, &self.settings.window_title)
                    .await
                    .map_err(Self::unavailable(HostState::Launching))?;
                if let Some(window) = window {
                    return Ok(Some((pid, window)));
                }
                debug!(pid, attempt, "main window not found yet");
            } else if let Some(found) = self
                .platform
                .find_process(&self.executable)
                .await
                .map_err(Self::unavailable(HostState::Launching))?
            {
                debug!(from = pid, to = found, attempt, "adopting detected host pid");
                pid = found;
                continue;
            } else {
                debug!(pid, attempt, "host process not found yet");
            }

            if attempt < attempts {
                tokio::time::sleep(self.settings.poll_interval()).await;
            }
        }

        Ok(None)
    }

    async fn deliver(
        &self,
        handle: &HostProcessHandle,
        directive: &Directive,
        timeout: Duration,
    ) -> Result<Ack> {
        let kind = directive.kind();
        let failed = |reason: String| EngineError::DirectiveFailed { kind, reason };

        let mut script = tempfile::Builder::new()
            .prefix("stagehand-")
            .suffix(".jsx")
            .tempfile()
            .map_err(|e| failed(format!("could not create script file: {e}")))?;
        script
            .write_all(directive.to_script().as_bytes())
            .and_then(|_| script.flush())
            .map_err(|e| failed(format!("could not write script file: {e}")))?;

        debug!(
            pid = handle.pid,
            kind,
            path = %directive.path().display(),
            "sending directive"
        );

        let run = self
            .platform
            .run_script(&self.executable, handle.pid, script.path());
        match tokio::time::timeout(timeout, run).await {
            Err(_) => {
                warn!(pid = handle.pid, kind, "directive timed out");
                Err(EngineError::DirectiveTimeout { kind, timeout })
            }
            Ok(Err(e)) => Err(failed(format!("{e:#}"))),
            Ok(Ok(output)) => {
                info!(
                    pid = handle.pid,
                    kind,
                    path = %directive.path().display(),
                    "directive acknowledged"
                );
                Ok(Ack {
                    kind,
                    pid: handle.pid,
                    output,
                })
            }
        }
    }
}

#[async_trait]
impl HostApplication for ProcessController {
    async fn ensure_running(&self) -> Result<HostProcessHandle> {
        let mut inner = self.inner.lock().await;
        let (handle, _) = self.ensure_running_locked(&mut inner, None).await?;
        Ok(handle)
    }

    async fn open_project(&self, project_file: &Path) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let (handle, arrival) = self
            .ensure_running_locked(&mut inner, Some(project_file))
            .await?;

        if let Arrival::Launched = arrival {
            // The document was passed on the command line
            inner.last_opened = Some((handle.pid, project_file.to_path_buf()));
            return Ok(());
        }

        let already_open = inner
            .last_opened
            .as_ref()
            .map(|(pid, path)| *pid == handle.pid && path == project_file)
            .unwrap_or(false);
        if already_open && self.settings.reopen_policy == ReopenPolicy::Skip {
            info!(pid = handle.pid, path = %project_file.display(), "project already open");
            return Ok(());
        }

        let directive = Directive::OpenProject {
            path: project_file.to_path_buf(),
        };
        self.deliver(&handle, &directive, self.settings.directive_timeout())
            .await?;
        inner.last_opened = Some((handle.pid, project_file.to_path_buf()));
        Ok(())
    }

    async fn send_directive(&self, directive: &Directive, timeout: Duration) -> Result<Ack> {
        let mut inner = self.inner.lock().await;
        let (handle, _) = self.ensure_running_locked(&mut inner, None).await?;
        self.deliver(&handle, directive, timeout).await
    }

    async fn state(&self) -> HostState {
        self.inner.lock().await.state
    }
}
