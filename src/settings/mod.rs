pub mod constants;
mod config;

pub use config::{Defaults, HostSettings, ImportSettings, ReopenPolicy, Settings};

use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{EngineError, Result};

/// Holds the validated settings and the file they came from.
///
/// Settings are loaded once at process start and replaced wholesale on save;
/// components receive a copy through their constructors.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
    settings: Settings,
}

impl ConfigStore {
    /// Load and validate settings from `path`
    pub async fn load(path: PathBuf) -> Result<Self> {
        let settings = Settings::load_from_file(&path).await?;
        info!(path = %path.display(), "settings loaded");
        Ok(Self { path, settings })
    }

    /// Wrap already-validated settings without touching disk
    pub fn from_settings(path: PathBuf, settings: Settings) -> Result<Self> {
        settings.validate()?;
        Ok(Self { path, settings })
    }

    /// Write a new settings file at `path` after validating it
    pub async fn init(path: PathBuf, settings: Settings) -> Result<Self> {
        let settings = settings.expanded();
        settings.validate()?;
        let mut store = Self {
            path,
            settings: settings.clone(),
        };
        store.save(settings).await?;
        Ok(store)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Validate and persist new settings, replacing the held copy
    pub async fn save(&mut self, settings: Settings) -> Result<()> {
        let settings = settings.expanded();
        settings.validate()?;
        settings
            .save_to_file(&self.path)
            .await
            .map_err(|source| EngineError::Config {
                path: self.path.clone(),
                source,
            })?;
        info!(path = %self.path.display(), "settings saved");
        self.settings = settings;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn valid_settings(temp: &TempDir) -> Settings {
        let exe = temp.path().join("AfterFX.exe");
        std::fs::write(&exe, b"").unwrap();
        for dir in ["assets", "projects"] {
            std::fs::create_dir_all(temp.path().join(dir)).unwrap();
        }
        Settings::new(exe, temp.path().join("assets"), temp.path().join("projects"))
    }

    #[tokio::test]
    async fn test_init_then_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("conf").join("settings.yaml");
        let settings = valid_settings(&temp);

        ConfigStore::init(path.clone(), settings.clone()).await.unwrap();
        let store = ConfigStore::load(path).await.unwrap();

        assert_eq!(store.settings(), &settings);
    }

    #[tokio::test]
    async fn test_save_rejects_invalid_and_keeps_previous() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("settings.yaml");
        let settings = valid_settings(&temp);
        let mut store = ConfigStore::init(path, settings.clone()).await.unwrap();

        let mut broken = settings.clone();
        broken.assets_root = temp.path().join("missing");
        let result = store.save(broken).await;

        assert!(matches!(
            result,
            Err(EngineError::PathUnavailable { what: "Assets root", .. })
        ));
        assert_eq!(store.settings(), &settings);
    }
}
