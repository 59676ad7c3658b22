use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::warn;

use crate::settings::constants::get_state_file_path;

/// A project opened through the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentProject {
    /// Project name (directory name under the projects root)
    pub name: String,
    /// Host document that was opened
    pub path: PathBuf,
    pub last_opened: DateTime<Utc>,
    pub open_count: u32,
}

/// An asset the host confirmed importing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportedAsset {
    /// Path handed to the host, after staging into the assets root
    pub path: PathBuf,
    pub imported_at: DateTime<Utc>,
    pub imported_by: String,
}

/// Persistent record of recent projects and import history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkbenchState {
    #[serde(default)]
    pub recent_projects: Vec<RecentProject>,
    #[serde(default)]
    pub imported_assets: Vec<ImportedAsset>,
    #[serde(default = "default_max_recent")]
    pub max_recent_projects: usize,
    /// Version of the state file format
    pub version: u32,
}

fn default_max_recent() -> usize {
    10
}

impl Default for WorkbenchState {
    fn default() -> Self {
        Self {
            recent_projects: Vec::new(),
            imported_assets: Vec::new(),
            max_recent_projects: default_max_recent(),
            version: 1,
        }
    }
}

impl WorkbenchState {
    /// Load state from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read state file: {}", path.display()))?;
        let state: WorkbenchState = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse state file: {}", path.display()))?;
        Ok(state)
    }

    /// Save state to a specific path, replacing the file atomically
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        let parent = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;

        let json = serde_json::to_string_pretty(self)?;
        let mut file = tempfile::NamedTempFile::new_in(parent)?;
        file.write_all(json.as_bytes())?;
        file.persist(path)
            .with_context(|| format!("Failed to write state file: {}", path.display()))?;
        Ok(())
    }

    /// Add or update a recent project
    pub fn add_recent_project(&mut self, name: &str, path: PathBuf) {
        let now = Utc::now();

        if let Some(existing) = self.recent_projects.iter_mut().find(|p| p.name == name) {
            existing.last_opened = now;
            existing.open_count += 1;
            existing.path = path;
        } else {
            self.recent_projects.push(RecentProject {
                name: name.to_string(),
                path,
                last_opened: now,
                open_count: 1,
            });
        }

        // Most recent first
        self.recent_projects
            .sort_by(|a, b| b.last_opened.cmp(&a.last_opened));
        self.recent_projects.truncate(self.max_recent_projects);
    }

    /// Drop a project from the recent list, e.g. after it was deleted
    pub fn forget_project(&mut self, name: &str) {
        self.recent_projects.retain(|p| p.name != name);
    }

    pub fn get_recent_projects(&self, limit: usize) -> &[RecentProject] {
        let end = limit.min(self.recent_projects.len());
        &self.recent_projects[..end]
    }

    pub fn add_imported_asset(&mut self, path: PathBuf, imported_by: String) {
        self.imported_assets.push(ImportedAsset {
            path,
            imported_at: Utc::now(),
            imported_by,
        });
    }

    /// Remove every history entry for `path`, returning how many were removed
    pub fn remove_imported_asset(&mut self, path: &Path) -> usize {
        let before = self.imported_assets.len();
        self.imported_assets.retain(|a| a.path != path);
        before - self.imported_assets.len()
    }
}

/// Serializes read-modify-write cycles on the state file.
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl StateStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    /// Store at `~/.stagehand/state.json`
    pub fn at_default_location() -> Self {
        Self::new(get_state_file_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_or_default(&self) -> WorkbenchState {
        if !self.path.exists() {
            return WorkbenchState::default();
        }
        WorkbenchState::load_from_path(&self.path).unwrap_or_else(|e| {
            warn!(path = %self.path.display(), error = %e, "state file unreadable, starting fresh");
            WorkbenchState::default()
        })
    }

    /// Current state snapshot
    pub async fn read(&self) -> WorkbenchState {
        let _guard = self.lock.lock().await;
        self.load_or_default()
    }

    /// Apply `change` to the stored state and persist the result.
    ///
    /// An existing file that cannot be parsed is left untouched and the parse
    /// error is returned.
    pub async fn update<T>(&self, change: impl FnOnce(&mut WorkbenchState) -> T) -> Result<T> {
        let _guard = self.lock.lock().await;
        let mut state = if self.path.exists() {
            WorkbenchState::load_from_path(&self.path)?
        } else {
            WorkbenchState::default()
        };
        let result = change(&mut state);
        state.save_to_path(&self.path)?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_state_persistence() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("state.json");

        let mut state = WorkbenchState::default();
        state.add_recent_project("ShotA", PathBuf::from("/p/ShotA/ShotA_comp.aep"));
        state.add_imported_asset(PathBuf::from("/a/plate.mov"), "marty".to_string());
        state.save_to_path(&path).unwrap();

        let loaded = WorkbenchState::load_from_path(&path).unwrap();
        assert_eq!(loaded, state);
    }

    #[test]
    fn test_recent_projects_ordering() {
        let mut state = WorkbenchState {
            max_recent_projects: 2,
            ..WorkbenchState::default()
        };

        state.add_recent_project("ShotA", PathBuf::from("/p/ShotA/a.aep"));
        std::thread::sleep(std::time::Duration::from_millis(5));
        state.add_recent_project("ShotB", PathBuf::from("/p/ShotB/b.aep"));
        std::thread::sleep(std::time::Duration::from_millis(5));
        state.add_recent_project("ShotA", PathBuf::from("/p/ShotA/a.aep"));
        std::thread::sleep(std::time::Duration::from_millis(5));
        state.add_recent_project("ShotC", PathBuf::from("/p/ShotC/c.aep"));

        let names: Vec<&str> = state
            .get_recent_projects(10)
            .iter()
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(names, vec!["ShotC", "ShotA"]);
        assert_eq!(state.recent_projects[1].open_count, 2);

        state.forget_project("ShotA");
        assert_eq!(state.get_recent_projects(10).len(), 1);
    }

    #[test]
    fn test_remove_imported_asset() {
        let mut state = WorkbenchState::default();
        state.add_imported_asset(PathBuf::from("/a/plate.mov"), "u".to_string());
        state.add_imported_asset(PathBuf::from("/a/plate.mov"), "u".to_string());
        state.add_imported_asset(PathBuf::from("/a/logo.png"), "u".to_string());

        assert_eq!(state.remove_imported_asset(Path::new("/a/plate.mov")), 2);
        assert_eq!(state.imported_assets.len(), 1);
        assert_eq!(state.remove_imported_asset(Path::new("/a/plate.mov")), 0);
    }

    #[tokio::test]
    async fn test_store_update_and_corrupt_file() {
        let temp = TempDir::new().unwrap();
        let store = StateStore::new(temp.path().join("state.json"));
        assert!(store.read().await.imported_assets.is_empty());

        store
            .update(|s| s.add_imported_asset(PathBuf::from("/a/x.png"), "u".to_string()))
            .await
            .unwrap();
        assert_eq!(store.read().await.imported_assets.len(), 1);

        std::fs::write(store.path(), "{broken").unwrap();
        assert_eq!(store.read().await, WorkbenchState::default());
    }

    #[tokio::test]
    async fn test_update_keeps_truncated_state_file() {
        let temp = TempDir::new().unwrap();
        let store = StateStore::new(temp.path().join("state.json"));
        for i in 0..50 {
            let asset = PathBuf::from(format!("/a/{i}.png"));
            store
                .update(move |s| s.add_imported_asset(asset, "u".to_string()))
                .await
                .unwrap();
        }

        let mut content = std::fs::read(store.path()).unwrap();
        content.pop();
        std::fs::write(store.path(), &content).unwrap();

        let result = store
            .update(|s| s.add_recent_project("ShotA", PathBuf::from("/p/ShotA/a.aep")))
            .await;

        assert!(result.is_err());
        assert_eq!(std::fs::read(store.path()).unwrap(), content);

        // Restoring the missing byte brings the history back intact
        content.push(b'}');
        std::fs::write(store.path(), &content).unwrap();
        assert_eq!(store.read().await.imported_assets.len(), 50);
    }
}
