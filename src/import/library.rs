use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use serde::Serialize;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::task;
use tracing::{debug, info, warn};

use crate::error::{EngineError, Result};
use crate::settings::Settings;
use crate::state::{ImportedAsset, StateStore};
use crate::utils::fs::{current_user, is_subdirectory};

/// The assets root and the history of what was imported from it.
#[derive(Debug, Clone)]
pub struct AssetLibrary {
    assets_root: PathBuf,
    copy_into_assets: bool,
    state: Arc<StateStore>,
}

/// A file ready for the host to import
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedAsset {
    /// Path the host should import
    pub path: PathBuf,
    /// Whether staging created `path`; only such copies are discarded
    pub created: bool,
}

/// What `remove_asset` deleted
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssetRemoval {
    pub path: PathBuf,
    pub file_removed: bool,
    pub history_entries: usize,
}

impl AssetLibrary {
    pub fn new(settings: &Settings, state: Arc<StateStore>) -> Self {
        Self {
            assets_root: settings.assets_root.clone(),
            copy_into_assets: settings.import.copy_into_assets,
            state,
        }
    }

    pub fn assets_root(&self) -> &Path {
        &self.assets_root
    }

    /// Path the host should import for `source`.
    ///
    /// Files outside the assets root are copied into it first, overwriting a
    /// previous copy with the same file name. Files already under the root
    /// are used in place.
    pub async fn stage(&self, source: &Path) -> Result<StagedAsset> {
        let failed = |reason: String| EngineError::ImportFailed {
            path: source.to_path_buf(),
            reason,
        };

        let is_file = tokio::fs::metadata(source)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);
        if !is_file {
            return Err(failed("file does not exist".to_string()));
        }
        if !self.copy_into_assets {
            return Ok(StagedAsset {
                path: source.to_path_buf(),
                created: false,
            });
        }

        let source_real = tokio::fs::canonicalize(source)
            .await
            .map_err(|e| failed(e.to_string()))?;
        let root_real = tokio::fs::canonicalize(&self.assets_root)
            .await
            .map_err(|_| EngineError::PathUnavailable {
                what: "Assets root",
                path: self.assets_root.clone(),
            })?;

        if is_subdirectory(&root_real, &source_real) {
            let relative = source_real
                .strip_prefix(&root_real)
                .map_err(|e| failed(e.to_string()))?;
            debug!(path = %source.display(), "asset already in assets root");
            return Ok(StagedAsset {
                path: self.assets_root.join(relative),
                created: false,
            });
        }

        let file_name = source_real
            .file_name()
            .ok_or_else(|| failed("path has no file name".to_string()))?;
        let destination = self.assets_root.join(file_name);
        let replaces_existing = tokio::fs::symlink_metadata(&destination).await.is_ok();

        let from = source_real.clone();
        let to = destination.clone();
        task::spawn_blocking(move || std::fs::copy(&from, &to))
            .await
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))
            .and_then(|r| r)
            .map_err(|e| failed(format!("could not copy into assets root: {e}")))?;

        info!(from = %source.display(), to = %destination.display(), "asset staged");
        Ok(StagedAsset {
            path: destination,
            created: !replaces_existing,
        })
    }

    /// Remove a copy made by [`AssetLibrary::stage`] after its import failed
    pub async fn discard(&self, staged: &StagedAsset) {
        if !staged.created {
            return;
        }
        match tokio::fs::remove_file(&staged.path).await {
            Ok(()) => debug!(path = %staged.path.display(), "discarded staged copy"),
            Err(e) => warn!(
                path = %staged.path.display(),
                error = %e,
                "failed to remove staged copy"
            ),
        }
    }

    /// Append a confirmed import to the history
    pub async fn record(&self, path: &Path) -> Result<()> {
        let path = path.to_path_buf();
        self.state
            .update(move |state| state.add_imported_asset(path, current_user()))
            .await
            .map_err(|source| EngineError::State {
                path: self.state.path().to_path_buf(),
                source,
            })
    }

    /// Imported assets, oldest first
    pub async fn history(&self) -> Vec<ImportedAsset> {
        self.state.read().await.imported_assets
    }

    /// Fuzzy-match imported asset file names against `query`, best match first.
    ///
    /// An empty query returns the whole history, oldest first.
    pub async fn search_history(&self, query: &str) -> Vec<ImportedAsset> {
        let query = query.trim();
        let history = self.history().await;
        if query.is_empty() {
            return history;
        }

        let matcher = SkimMatcherV2::default().ignore_case();
        let mut scored: Vec<(i64, ImportedAsset)> = history
            .into_iter()
            .filter_map(|asset| {
                let name = asset
                    .path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())?;
                matcher.fuzzy_match(&name, query).map(|score| (score, asset))
            })
            .collect();

        // Stable: equal scores keep import order
        scored.sort_by(|(a, _), (b, _)| b.cmp(a));
        scored.into_iter().map(|(_, asset)| asset).collect()
    }

    /// Delete an asset from the assets root and drop it from the history.
    ///
    /// `name` is relative to the assets root.
    pub async fn remove_asset(&self, name: &str) -> Result<AssetRemoval> {
        let relative = Path::new(name);
        let plain = !name.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !plain {
            return Err(EngineError::InvalidName {
                name: name.to_string(),
                reason: "asset names must be relative to the assets root".to_string(),
            });
        }

        let path = self.assets_root.join(relative);
        let file_removed = match tokio::fs::remove_file(&path).await {
            Ok(()) => true,
            Err(e) if e.kind() == io::ErrorKind::NotFound => false,
            Err(source) => {
                return Err(EngineError::DeleteFailed {
                    name: name.to_string(),
                    source,
                })
            }
        };

        let target = path.clone();
        let history_entries = self
            .state
            .update(move |state| state.remove_imported_asset(&target))
            .await
            .map_err(|source| EngineError::State {
                path: self.state.path().to_path_buf(),
                source,
            })?;

        if !file_removed && history_entries == 0 {
            return Err(EngineError::NotFound {
                name: name.to_string(),
            });
        }

        info!(path = %path.display(), file_removed, history_entries, "asset removed");
        Ok(AssetRemoval {
            path,
            file_removed,
            history_entries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn library(temp: &TempDir, copy_into_assets: bool) -> AssetLibrary {
        let assets = temp.path().join("assets");
        std::fs::create_dir_all(&assets).unwrap();
        let mut settings = Settings::new(temp.path().join("host.exe"), assets, temp.path());
        settings.import.copy_into_assets = copy_into_assets;
        let state = Arc::new(StateStore::new(temp.path().join("state.json")));
        AssetLibrary::new(&settings, state)
    }

    #[tokio::test]
    async fn test_stage_copies_outside_files() {
        let temp = TempDir::new().unwrap();
        let library = library(&temp, true);
        let source = temp.path().join("plate.mov");
        std::fs::write(&source, b"frames").unwrap();

        let staged = library.stage(&source).await.unwrap();

        assert_eq!(staged.path, library.assets_root().join("plate.mov"));
        assert!(staged.created);
        assert_eq!(std::fs::read(&staged.path).unwrap(), b"frames");
        assert!(source.exists());

        library.discard(&staged).await;
        assert!(!staged.path.exists());
        assert!(source.exists());
    }

    #[tokio::test]
    async fn test_discard_keeps_files_staging_did_not_create() {
        let temp = TempDir::new().unwrap();
        let library = library(&temp, true);
        let inside = library.assets_root().join("bg.png");
        std::fs::write(&inside, b"png").unwrap();
        let source = temp.path().join("bg.png");
        std::fs::write(&source, b"newer").unwrap();

        let in_place = library.stage(&inside).await.unwrap();
        assert!(!in_place.created);
        library.discard(&in_place).await;
        assert!(inside.is_file());

        // Overwriting an earlier copy with the same name is not undone
        let overwritten = library.stage(&source).await.unwrap();
        assert_eq!(overwritten.path, inside);
        assert!(!overwritten.created);
        library.discard(&overwritten).await;
        assert!(inside.is_file());
    }

    #[tokio::test]
    async fn test_stage_uses_files_inside_root_in_place() {
        let temp = TempDir::new().unwrap();
        let library = library(&temp, true);
        let inside = library.assets_root().join("plates").join("bg.png");
        std::fs::create_dir_all(inside.parent().unwrap()).unwrap();
        std::fs::write(&inside, b"png").unwrap();

        let staged = library.stage(&inside).await.unwrap();
        assert_eq!(staged.path, inside);
    }

    #[tokio::test]
    async fn test_stage_without_copy_keeps_source() {
        let temp = TempDir::new().unwrap();
        let library = library(&temp, false);
        let source = temp.path().join("logo.png");
        std::fs::write(&source, b"png").unwrap();

        assert_eq!(library.stage(&source).await.unwrap().path, source);
        assert!(!library.assets_root().join("logo.png").exists());
    }

    #[tokio::test]
    async fn test_stage_missing_file() {
        let temp = TempDir::new().unwrap();
        let library = library(&temp, true);

        let result = library.stage(&temp.path().join("nope.mov")).await;
        assert!(matches!(
            result,
            Err(EngineError::ImportFailed { ref reason, .. }) if reason == "file does not exist"
        ));
    }

    #[tokio::test]
    async fn test_record_and_remove_asset() {
        let temp = TempDir::new().unwrap();
        let library = library(&temp, true);
        let source = temp.path().join("plate.mov");
        std::fs::write(&source, b"frames").unwrap();

        let staged = library.stage(&source).await.unwrap().path;
        library.record(&staged).await.unwrap();
        assert_eq!(library.history().await.len(), 1);
        assert_eq!(library.history().await[0].path, staged);

        let removal = library.remove_asset("plate.mov").await.unwrap();
        assert!(removal.file_removed);
        assert_eq!(removal.history_entries, 1);
        assert!(!staged.exists());
        assert!(library.history().await.is_empty());

        assert!(matches!(
            library.remove_asset("plate.mov").await,
            Err(EngineError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_search_history_by_file_name() {
        let temp = TempDir::new().unwrap();
        let library = library(&temp, true);
        for name in ["plate_010.mov", "logo.png", "plate_020.mov"] {
            library.record(&library.assets_root().join(name)).await.unwrap();
        }

        let names = |assets: Vec<ImportedAsset>| -> Vec<String> {
            assets
                .iter()
                .map(|a| a.path.file_name().unwrap().to_string_lossy().to_string())
                .collect()
        };

        assert_eq!(
            names(library.search_history("PLATE").await),
            vec!["plate_010.mov", "plate_020.mov"]
        );
        assert_eq!(names(library.search_history("logo").await), vec!["logo.png"]);
        assert!(library.search_history("xyz").await.is_empty());
        assert_eq!(library.search_history("  ").await.len(), 3);
    }

    #[tokio::test]
    async fn test_remove_asset_rejects_escaping_names() {
        let temp = TempDir::new().unwrap();
        let library = library(&temp, true);

        for name in ["../state.json", "", "/etc/hosts"] {
            assert!(matches!(
                library.remove_asset(name).await,
                Err(EngineError::InvalidName { .. })
            ));
        }
    }
}
