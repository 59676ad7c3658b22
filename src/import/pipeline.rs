use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::AssetLibrary;
use crate::error::{EngineError, Result};
use crate::host::{Directive, HostApplication};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportStatus {
    Pending,
    InFlight,
    Succeeded,
    Failed,
    Cancelled,
}

/// A queued or in-flight import
struct ImportRequest {
    seq: u64,
    path: PathBuf,
    status: ImportStatus,
    submitted_at: DateTime<Utc>,
}

/// Terminal outcome of one import request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportRecord {
    pub seq: u64,
    pub path: PathBuf,
    /// Path the host imported, after staging
    pub imported_path: Option<PathBuf>,
    pub status: ImportStatus,
    pub reason: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Handle to a submitted import
#[derive(Debug)]
pub struct ImportTicket {
    pub seq: u64,
    pub path: PathBuf,
    receiver: oneshot::Receiver<Result<ImportRecord>>,
}

impl ImportTicket {
    /// Wait for the request to reach a terminal state
    pub async fn wait(self) -> Result<ImportRecord> {
        self.receiver.await.unwrap_or_else(|_| {
            Err(EngineError::ImportFailed {
                path: self.path,
                reason: "import pipeline stopped".to_string(),
            })
        })
    }
}

type Responder = oneshot::Sender<Result<ImportRecord>>;

/// Imported path, or the terminal status and error of a request that did not import
type Outcome = std::result::Result<PathBuf, (ImportStatus, EngineError)>;

struct Entry {
    request: ImportRequest,
    responder: Option<Responder>,
}

#[derive(Default)]
struct Ledger {
    queue: VecDeque<Entry>,
    records: Vec<ImportRecord>,
}

impl Ledger {
    /// Mark `seq` in flight; `None` when it was cancelled while queued
    fn start(&mut self, seq: u64) -> Option<PathBuf> {
        let entry = self.queue.iter_mut().find(|e| e.request.seq == seq)?;
        entry.request.status = ImportStatus::InFlight;
        Some(entry.request.path.clone())
    }

    fn finish(&mut self, seq: u64, outcome: Outcome) {
        let Some(index) = self.queue.iter().position(|e| e.request.seq == seq) else {
            return;
        };
        let Some(entry) = self.queue.remove(index) else {
            return;
        };

        let (imported_path, status, reason, error) = match outcome {
            Ok(path) => (Some(path), ImportStatus::Succeeded, None, None),
            Err((status, error)) => (None, status, Some(error.to_string()), Some(error)),
        };
        let record = ImportRecord {
            seq,
            path: entry.request.path,
            imported_path,
            status,
            reason,
            submitted_at: entry.request.submitted_at,
            finished_at: Utc::now(),
        };
        self.records.push(record.clone());

        if let Some(responder) = entry.responder {
            // The submitter may have dropped its ticket
            let _ = responder.send(match error {
                None => Ok(record),
                Some(error) => Err(error),
            });
        }
    }
}

/// Strictly sequential import queue in front of the host application.
///
/// One worker task drains the queue, so the host never sees two imports at
/// once and requests finish in submission order.
pub struct ImportPipeline {
    sender: mpsc::UnboundedSender<u64>,
    ledger: Arc<Mutex<Ledger>>,
    next_seq: AtomicU64,
    worker: JoinHandle<()>,
}

struct Worker {
    host: Arc<dyn HostApplication>,
    library: Option<AssetLibrary>,
    timeout: Duration,
    ledger: Arc<Mutex<Ledger>>,
}

impl ImportPipeline {
    /// Start the worker. Must be called inside a Tokio runtime.
    pub fn new(
        host: Arc<dyn HostApplication>,
        library: Option<AssetLibrary>,
        timeout: Duration,
    ) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let ledger = Arc::new(Mutex::new(Ledger::default()));
        let worker = Worker {
            host,
            library,
            timeout,
            ledger: ledger.clone(),
        };

        Self {
            sender,
            ledger,
            next_seq: AtomicU64::new(1),
            worker: tokio::spawn(worker.run(receiver)),
        }
    }

    fn ledger(&self) -> std::sync::MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue an import and return immediately
    pub fn submit(&self, path: impl Into<PathBuf>) -> ImportTicket {
        let path = path.into();
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let (responder, receiver) = oneshot::channel();

        self.ledger().queue.push_back(Entry {
            request: ImportRequest {
                seq,
                path: path.clone(),
                status: ImportStatus::Pending,
                submitted_at: Utc::now(),
            },
            responder: Some(responder),
        });

        if self.sender.send(seq).is_err() {
            warn!(seq, "import worker has stopped");
            let error = EngineError::ImportFailed {
                path: path.clone(),
                reason: "import pipeline stopped".to_string(),
            };
            self.ledger().finish(seq, Err((ImportStatus::Failed, error)));
        } else {
            debug!(seq, path = %path.display(), "import queued");
        }

        ImportTicket {
            seq,
            path,
            receiver,
        }
    }

    /// Queue an import and wait for its outcome
    pub async fn import_asset(&self, path: impl Into<PathBuf>) -> Result<ImportRecord> {
        self.submit(path).wait().await
    }

    /// Cancel a request that has not started. Returns false once it is in flight or done.
    pub fn cancel(&self, seq: u64) -> bool {
        let mut ledger = self.ledger();
        let Some(entry) = ledger.queue.iter().find(|e| e.request.seq == seq) else {
            return false;
        };
        if entry.request.status != ImportStatus::Pending {
            return false;
        }

        let error = EngineError::Cancelled {
            path: entry.request.path.clone(),
        };
        ledger.finish(seq, Err((ImportStatus::Cancelled, error)));
        info!(seq, "import cancelled");
        true
    }

    /// Finished requests in completion order
    pub fn records(&self) -> Vec<ImportRecord> {
        self.ledger().records.clone()
    }

    /// Stop accepting work and wait for the queue to drain
    pub async fn shutdown(self) {
        drop(self.sender);
        if let Err(e) = self.worker.await {
            warn!(error = %e, "import worker ended abnormally");
        }
    }
}

impl Worker {
    fn ledger(&self) -> std::sync::MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn run(self, mut receiver: mpsc::UnboundedReceiver<u64>) {
        while let Some(seq) = receiver.recv().await {
            let Some(path) = self.ledger().start(seq) else {
                debug!(seq, "skipping cancelled import");
                continue;
            };

            info!(seq, path = %path.display(), "importing asset");
            let outcome = self.import(&path).await;
            match &outcome {
                Ok(imported) => info!(seq, path = %imported.display(), "asset imported"),
                Err(e) => warn!(seq, error = %e, "asset import failed"),
            }
            self.ledger()
                .finish(seq, outcome.map_err(|e| (ImportStatus::Failed, e)));
        }
        debug!("import worker stopped");
    }

    async fn import(&self, path: &Path) -> Result<PathBuf> {
        let failed = |reason: String| EngineError::ImportFailed {
            path: path.to_path_buf(),
            reason,
        };

        let is_file = tokio::fs::metadata(path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);
        if !is_file {
            return Err(failed("file does not exist".to_string()));
        }

        self.host
            .ensure_running()
            .await
            .map_err(|e| failed(e.to_string()))?;

        // Stage only once the host is ready
        let Some(library) = &self.library else {
            self.deliver(path).await.map_err(failed)?;
            return Ok(path.to_path_buf());
        };

        let staged = library.stage(path).await?;
        if let Err(reason) = self.deliver(&staged.path).await {
            library.discard(&staged).await;
            return Err(failed(reason));
        }

        if let Err(e) = library.record(&staged.path).await {
            warn!(path = %staged.path.display(), error = %e, "failed to record import history");
        }
        Ok(staged.path)
    }

    /// Send the import directive and wait for the acknowledgement
    async fn deliver(&self, target: &Path) -> std::result::Result<(), String> {
        let directive = Directive::ImportAsset {
            path: target.to_path_buf(),
        };
        let send = self.host.send_directive(&directive, self.timeout);
        match tokio::time::timeout(self.timeout, send).await {
            Err(_) => Err(format!(
                "no acknowledgement within {}s",
                self.timeout.as_secs_f32()
            )),
            Ok(Err(e)) => Err(e.to_string()),
            Ok(Ok(_ack)) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{Ack, HostProcessHandle, HostState};
    use crate::settings::Settings;
    use crate::state::StateStore;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;
    use tokio::sync::Notify;

    /// Host double that records imports and can be held mid-import
    #[derive(Default)]
    struct RecordingHost {
        imported: Mutex<Vec<PathBuf>>,
        fail_on: Option<String>,
        unavailable: bool,
        delay: Option<Duration>,
        gate: Option<Arc<Notify>>,
        started: Arc<Notify>,
        active: AtomicUsize,
        max_active: AtomicUsize,
    }

    impl RecordingHost {
        fn imported_names(&self) -> Vec<String> {
            self.imported
                .lock()
                .unwrap()
                .iter()
                .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
                .collect()
        }
    }

    #[async_trait]
    impl HostApplication for RecordingHost {
        async fn ensure_running(&self) -> Result<HostProcessHandle> {
            if self.unavailable {
                return Err(EngineError::HostUnavailable {
                    state: HostState::NotRunning,
                    source: anyhow::anyhow!("xdotool not found"),
                });
            }
            Ok(HostProcessHandle::unresponsive(1))
        }

        async fn open_project(&self, _project_file: &Path) -> Result<()> {
            Ok(())
        }

        async fn send_directive(&self, directive: &Directive, _timeout: Duration) -> Result<Ack> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            self.started.notify_one();

            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            self.active.fetch_sub(1, Ordering::SeqCst);
            self.imported
                .lock()
                .unwrap()
                .push(directive.path().to_path_buf());

            let name = directive.path().to_string_lossy().to_string();
            if self.fail_on.as_deref().map(|f| name.ends_with(f)).unwrap_or(false) {
                return Err(EngineError::DirectiveFailed {
                    kind: directive.kind(),
                    reason: "Unsupported file type".to_string(),
                });
            }
            Ok(Ack {
                kind: directive.kind(),
                pid: 1,
                output: String::new(),
            })
        }

        async fn state(&self) -> HostState {
            HostState::Ready
        }
    }

    fn files(temp: &TempDir, names: &[&str]) -> Vec<PathBuf> {
        names
            .iter()
            .map(|name| {
                let path = temp.path().join(name);
                std::fs::write(&path, name.as_bytes()).unwrap();
                path
            })
            .collect()
    }

    fn pipeline(host: Arc<RecordingHost>) -> ImportPipeline {
        ImportPipeline::new(host, None, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_imports_run_in_submission_order() {
        let temp = TempDir::new().unwrap();
        let host = Arc::new(RecordingHost {
            delay: Some(Duration::from_millis(5)),
            ..RecordingHost::default()
        });
        let pipeline = pipeline(host.clone());
        let paths = files(&temp, &["A.png", "B.png", "C.png"]);

        let tickets: Vec<ImportTicket> = paths.iter().map(|p| pipeline.submit(p)).collect();
        for ticket in tickets {
            assert_eq!(ticket.wait().await.unwrap().status, ImportStatus::Succeeded);
        }

        assert_eq!(host.imported_names(), vec!["A.png", "B.png", "C.png"]);
        let recorded: Vec<PathBuf> = pipeline.records().into_iter().map(|r| r.path).collect();
        assert_eq!(recorded, paths);
        assert_eq!(host.max_active.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_the_queue() {
        let temp = TempDir::new().unwrap();
        let host = Arc::new(RecordingHost {
            fail_on: Some("B.psd".to_string()),
            ..RecordingHost::default()
        });
        let pipeline = pipeline(host.clone());
        let paths = files(&temp, &["A.png", "B.psd", "C.png"]);

        let tickets: Vec<ImportTicket> = paths.iter().map(|p| pipeline.submit(p)).collect();
        let results: Vec<Result<ImportRecord>> = futures_wait(tickets).await;

        assert!(results[0].is_ok());
        match &results[1] {
            Err(EngineError::ImportFailed { path, reason }) => {
                assert_eq!(path, &paths[1]);
                assert!(reason.contains("Unsupported file type"));
            }
            other => panic!("expected ImportFailed, got {other:?}"),
        }
        assert!(results[2].is_ok());

        let statuses: Vec<ImportStatus> = pipeline.records().iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![ImportStatus::Succeeded, ImportStatus::Failed, ImportStatus::Succeeded]
        );
    }

    async fn futures_wait(tickets: Vec<ImportTicket>) -> Vec<Result<ImportRecord>> {
        let mut results = Vec::new();
        for ticket in tickets {
            results.push(ticket.wait().await);
        }
        results
    }

    #[tokio::test]
    async fn test_missing_file_never_reaches_host() {
        let temp = TempDir::new().unwrap();
        let host = Arc::new(RecordingHost::default());
        let pipeline = pipeline(host.clone());

        let result = pipeline.import_asset(temp.path().join("gone.mov")).await;

        assert!(matches!(
            result,
            Err(EngineError::ImportFailed { ref reason, .. }) if reason == "file does not exist"
        ));
        assert!(host.imported_names().is_empty());
    }

    #[tokio::test]
    async fn test_unacknowledged_import_times_out() {
        let temp = TempDir::new().unwrap();
        let host = Arc::new(RecordingHost {
            delay: Some(Duration::from_millis(500)),
            ..RecordingHost::default()
        });
        let pipeline = ImportPipeline::new(host, None, Duration::from_millis(20));
        let paths = files(&temp, &["slow.mov"]);

        let result = pipeline.import_asset(&paths[0]).await;
        assert!(matches!(
            result,
            Err(EngineError::ImportFailed { ref reason, .. }) if reason.contains("no acknowledgement")
        ));
    }

    #[tokio::test]
    async fn test_cancel_only_while_pending() {
        let temp = TempDir::new().unwrap();
        let gate = Arc::new(Notify::new());
        let host = Arc::new(RecordingHost {
            gate: Some(gate.clone()),
            ..RecordingHost::default()
        });
        let pipeline = pipeline(host.clone());
        let paths = files(&temp, &["A.png", "B.png"]);

        let first = pipeline.submit(&paths[0]);
        host.started.notified().await;
        let second = pipeline.submit(&paths[1]);

        assert!(!pipeline.cancel(first.seq), "in-flight import cannot be cancelled");
        assert!(pipeline.cancel(second.seq));
        assert!(!pipeline.cancel(second.seq));

        gate.notify_one();
        assert!(first.wait().await.is_ok());
        assert!(matches!(second.wait().await, Err(EngineError::Cancelled { .. })));
        assert_eq!(host.imported_names(), vec!["A.png"]);

        let statuses: Vec<ImportStatus> = pipeline.records().iter().map(|r| r.status).collect();
        assert_eq!(statuses, vec![ImportStatus::Cancelled, ImportStatus::Succeeded]);
    }

    fn library(temp: &TempDir) -> AssetLibrary {
        let assets = temp.path().join("assets");
        std::fs::create_dir_all(&assets).unwrap();
        let settings = Settings::new(temp.path().join("host.exe"), assets, temp.path());
        let state = Arc::new(StateStore::new(temp.path().join("state.json")));
        AssetLibrary::new(&settings, state)
    }

    #[tokio::test]
    async fn test_failed_import_leaves_no_staged_copy() {
        let temp = TempDir::new().unwrap();
        let library = library(&temp);
        let assets = library.assets_root().to_path_buf();
        let outside = files(&temp, &["plate.mov", "bad.psd"]);
        let inside = assets.join("logo.psd");
        std::fs::write(&inside, b"psd").unwrap();

        // Host never becomes available: nothing is copied
        let down = Arc::new(RecordingHost {
            unavailable: true,
            ..RecordingHost::default()
        });
        let timeout = Duration::from_secs(5);
        let pipeline = ImportPipeline::new(down, Some(library.clone()), timeout);
        assert!(pipeline.import_asset(&outside[0]).await.is_err());
        assert!(!assets.join("plate.mov").exists());
        pipeline.shutdown().await;

        // Host rejects the file: the copy is removed, files already in the root stay
        let picky = Arc::new(RecordingHost {
            fail_on: Some(".psd".to_string()),
            ..RecordingHost::default()
        });
        let pipeline = ImportPipeline::new(picky.clone(), Some(library.clone()), timeout);
        assert!(pipeline.import_asset(&outside[1]).await.is_err());
        assert!(pipeline.import_asset(&inside).await.is_err());
        assert_eq!(picky.imported_names(), vec!["bad.psd", "logo.psd"]);
        assert!(!assets.join("bad.psd").exists());
        assert!(inside.is_file());
        assert!(library.history().await.is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_drains_queue() {
        let temp = TempDir::new().unwrap();
        let host = Arc::new(RecordingHost::default());
        let pipeline = pipeline(host.clone());
        let paths = files(&temp, &["A.png", "B.png"]);

        let _a = pipeline.submit(&paths[0]);
        let _b = pipeline.submit(&paths[1]);
        pipeline.shutdown().await;

        assert_eq!(host.imported_names(), vec!["A.png", "B.png"]);
    }
}
