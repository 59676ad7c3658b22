use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::debug;

use super::constants;
use crate::error::{EngineError, Result};
use crate::utils::fs::expand_tilde;

/// Persisted engine settings.
///
/// The three required paths must exist before any registry, template or
/// host operation runs; [`Settings::validate`] enforces that.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    pub host_executable: PathBuf,
    pub assets_root: PathBuf,
    pub projects_root: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub templates_root: Option<PathBuf>,
    #[serde(default)]
    pub defaults: Defaults,
    #[serde(default)]
    pub host: HostSettings,
    #[serde(default)]
    pub import: ImportSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Defaults {
    #[serde(default = "default_template_name")]
    pub template: String,
    #[serde(default = "default_placeholder")]
    pub placeholder: String,
    #[serde(default = "default_project_extension")]
    pub project_extension: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HostSettings {
    #[serde(default = "default_window_title")]
    pub window_title: String,
    #[serde(default = "default_poll_attempts")]
    pub launch_poll_attempts: u32,
    #[serde(default = "default_poll_interval_ms")]
    pub launch_poll_interval_ms: u64,
    #[serde(default = "default_directive_timeout_secs")]
    pub directive_timeout_secs: u64,
    #[serde(default)]
    pub reopen_policy: ReopenPolicy,
}

/// What to do when asked to open the project the current host instance
/// already received.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReopenPolicy {
    /// Send the open directive again and let the host decide.
    #[default]
    Reissue,
    /// Treat the request as already satisfied.
    Skip,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImportSettings {
    #[serde(default = "default_import_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_copy_into_assets")]
    pub copy_into_assets: bool,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            template: default_template_name(),
            placeholder: default_placeholder(),
            project_extension: default_project_extension(),
        }
    }
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            window_title: default_window_title(),
            launch_poll_attempts: default_poll_attempts(),
            launch_poll_interval_ms: default_poll_interval_ms(),
            directive_timeout_secs: default_directive_timeout_secs(),
            reopen_policy: ReopenPolicy::default(),
        }
    }
}

impl HostSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.launch_poll_interval_ms)
    }

    pub fn directive_timeout(&self) -> Duration {
        Duration::from_secs(self.directive_timeout_secs)
    }
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_import_timeout_secs(),
            copy_into_assets: default_copy_into_assets(),
        }
    }
}

impl ImportSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Settings {
    pub fn new(
        host_executable: impl Into<PathBuf>,
        assets_root: impl Into<PathBuf>,
        projects_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            host_executable: host_executable.into(),
            assets_root: assets_root.into(),
            projects_root: projects_root.into(),
            templates_root: None,
            defaults: Defaults::default(),
            host: HostSettings::default(),
            import: ImportSettings::default(),
        }
    }

    pub fn with_templates_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.templates_root = Some(root.into());
        self
    }

    /// Effective templates root, falling back to the config directory
    pub fn templates_root(&self) -> PathBuf {
        self.templates_root
            .clone()
            .unwrap_or_else(constants::get_templates_dir)
    }

    /// Expand `~` in every configured path
    pub fn expanded(mut self) -> Self {
        self.host_executable = expand_tilde(&self.host_executable);
        self.assets_root = expand_tilde(&self.assets_root);
        self.projects_root = expand_tilde(&self.projects_root);
        self.templates_root = self.templates_root.map(expand_tilde);
        self
    }

    /// Check that every configured location exists.
    pub fn validate(&self) -> Result<()> {
        if !self.host_executable.is_file() {
            return Err(EngineError::PathUnavailable {
                what: "Host executable",
                path: self.host_executable.clone(),
            });
        }
        if !self.assets_root.is_dir() {
            return Err(EngineError::PathUnavailable {
                what: "Assets root",
                path: self.assets_root.clone(),
            });
        }
        if !self.projects_root.is_dir() {
            return Err(EngineError::PathUnavailable {
                what: "Projects root",
                path: self.projects_root.clone(),
            });
        }
        if let Some(templates_root) = &self.templates_root {
            if !templates_root.is_dir() {
                return Err(EngineError::PathUnavailable {
                    what: "Templates root",
                    path: templates_root.clone(),
                });
            }
        }
        Ok(())
    }

    /// Read and parse a settings file without validating paths
    pub async fn read_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();

        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read settings file: {}", path.display()))?;

        let settings: Self = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse settings file: {}", path.display()))?;

        Ok(settings.expanded())
    }

    /// Load settings from disk and validate them.
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "loading settings");

        let settings = Self::read_from_file(path)
            .await
            .map_err(|source| EngineError::Config {
                path: path.to_path_buf(),
                source,
            })?;
        settings.validate()?;
        Ok(settings)
    }

    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let yaml = serde_yaml::to_string(self).context("Failed to serialize settings to YAML")?;

        fs::write(path, yaml)
            .await
            .with_context(|| format!("Failed to write settings file: {}", path.display()))?;

        Ok(())
    }
}

fn default_template_name() -> String {
    "Basic".to_string()
}

fn default_placeholder() -> String {
    constants::DEFAULT_PLACEHOLDER.to_string()
}

fn default_project_extension() -> String {
    constants::DEFAULT_PROJECT_EXTENSION.to_string()
}

fn default_window_title() -> String {
    constants::DEFAULT_WINDOW_TITLE.to_string()
}

fn default_poll_attempts() -> u32 {
    30
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_directive_timeout_secs() -> u64 {
    60
}

fn default_import_timeout_secs() -> u64 {
    120
}

fn default_copy_into_assets() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn valid_settings(temp: &TempDir) -> Settings {
        let exe = temp.path().join("AfterFX.exe");
        std::fs::write(&exe, b"").unwrap();
        let assets = temp.path().join("assets");
        let projects = temp.path().join("projects");
        std::fs::create_dir_all(&assets).unwrap();
        std::fs::create_dir_all(&projects).unwrap();
        Settings::new(exe, assets, projects)
    }

    #[test]
    fn test_defaults_applied_for_minimal_yaml() {
        let yaml = "host_executable: /opt/host\nassets_root: /srv/assets\nprojects_root: /srv/projects\n";
        let settings: Settings = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(settings.defaults.placeholder, "{{name}}");
        assert_eq!(settings.defaults.project_extension, "aep");
        assert_eq!(settings.host.launch_poll_attempts, 30);
        assert_eq!(settings.host.reopen_policy, ReopenPolicy::Reissue);
        assert!(settings.import.copy_into_assets);
        assert!(settings.templates_root.is_none());
    }

    #[test]
    fn test_missing_required_field_rejected() {
        let yaml = "host_executable: /opt/host\nassets_root: /srv/assets\n";
        assert!(serde_yaml::from_str::<Settings>(yaml).is_err());
    }

    #[test]
    fn test_validate_reports_first_missing_path() {
        let temp = TempDir::new().unwrap();
        let mut settings = valid_settings(&temp);
        assert!(settings.validate().is_ok());

        settings.projects_root = temp.path().join("missing");
        match settings.validate() {
            Err(EngineError::PathUnavailable { what, path }) => {
                assert_eq!(what, "Projects root");
                assert_eq!(path, temp.path().join("missing"));
            }
            other => panic!("expected PathUnavailable, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_rejects_directory_as_executable() {
        let temp = TempDir::new().unwrap();
        let mut settings = valid_settings(&temp);
        settings.host_executable = temp.path().to_path_buf();

        assert!(matches!(
            settings.validate(),
            Err(EngineError::PathUnavailable {
                what: "Host executable",
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_save_and_load_round_trip() {
        let temp = TempDir::new().unwrap();
        let settings = valid_settings(&temp).with_templates_root(temp.path());
        let path = temp.path().join("config").join("settings.yaml");

        settings.save_to_file(&path).await.unwrap();
        let loaded = Settings::load_from_file(&path).await.unwrap();

        assert_eq!(loaded, settings);
    }

    #[tokio::test]
    async fn test_load_missing_file_is_config_error() {
        let temp = TempDir::new().unwrap();
        let result = Settings::load_from_file(temp.path().join("nope.yaml")).await;
        assert!(matches!(result, Err(EngineError::Config { .. })));
    }
}
