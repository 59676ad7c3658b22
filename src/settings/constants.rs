//! Constants for stagehand configuration paths and defaults

use std::path::PathBuf;

/// Configuration directory path relative to home directory
pub const CONFIG_DIR_PATH: &str = ".stagehand";

/// Display name for user messages
pub const CONFIG_DIR_DISPLAY: &str = "~/.stagehand";

/// Environment variable overriding the settings file location
pub const CONFIG_ENV_VAR: &str = "STAGEHAND_CONFIG";

/// Sidecar metadata file written into every project created by the engine
pub const PROJECT_METADATA_FILE: &str = ".stagehand.json";

/// Default placeholder token substituted in template file and folder names
pub const DEFAULT_PLACEHOLDER: &str = "{{name}}";

/// Default host document extension
pub const DEFAULT_PROJECT_EXTENSION: &str = "aep";

/// Default substring of the host's main window title
pub const DEFAULT_WINDOW_TITLE: &str = "Adobe After Effects";

/// Get the configuration directory path
pub fn get_config_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_default().join(CONFIG_DIR_PATH)
}

/// Get the default settings file path
pub fn get_default_config_path() -> PathBuf {
    get_config_dir().join("settings.yaml")
}

/// Get the state file path
pub fn get_state_file_path() -> PathBuf {
    get_config_dir().join("state.json")
}

/// Get the default templates directory path
pub fn get_templates_dir() -> PathBuf {
    get_config_dir().join("templates")
}
