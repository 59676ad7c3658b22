mod metadata;
mod registry;
pub mod templates;

pub use metadata::ProjectMetadata;
pub use registry::{ProjectRegistry, Projects};
pub use templates::TemplateEngine;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{EngineError, Result};

/// A project directory directly under the projects root
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
    pub path: PathBuf,
    /// Template the project was created from, if it was created by the engine
    pub template: Option<String>,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<String>,
    pub modified_at: Option<DateTime<Utc>>,
}

impl Project {
    /// Build a project from its directory, reading the sidecar metadata when present
    pub fn from_dir(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?.to_string();
        let fs_meta = std::fs::metadata(path).ok()?;
        if !fs_meta.is_dir() {
            return None;
        }

        let modified_at = fs_meta.modified().ok().map(DateTime::<Utc>::from);
        let metadata = ProjectMetadata::read(path);

        let created_at = metadata
            .as_ref()
            .map(|m| m.created_at)
            .or_else(|| fs_meta.created().ok().map(DateTime::<Utc>::from))
            .or(modified_at)
            .unwrap_or_else(Utc::now);

        Some(Self {
            name,
            path: path.to_path_buf(),
            template: metadata.as_ref().map(|m| m.template.clone()),
            created_at,
            created_by: metadata.map(|m| m.created_by),
            modified_at,
        })
    }
}

static RESERVED_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[<>:"/\\|?*\x00-\x1F]"#).expect("valid reserved-character pattern"));

/// Check that a project name is usable as a single directory name on every platform.
pub fn validate_project_name(name: &str) -> Result<()> {
    let reason = if name.trim().is_empty() {
        Some("name cannot be empty")
    } else if name.len() > 255 {
        Some("name is longer than 255 bytes")
    } else if name.starts_with('.') {
        Some("name cannot start with '.'")
    } else if name.ends_with(' ') || name.ends_with('.') {
        Some("name cannot end with a space or '.'")
    } else if RESERVED_CHARS.is_match(name) {
        Some("name contains a path separator or reserved character")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(EngineError::InvalidName {
            name: name.to_string(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}
