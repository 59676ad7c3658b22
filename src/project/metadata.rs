use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::settings::constants::PROJECT_METADATA_FILE;

/// Sidecar record written next to the host documents of a created project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectMetadata {
    pub template: String,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
}

impl ProjectMetadata {
    pub fn new(template: impl Into<String>, created_by: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            created_at: Utc::now(),
            created_by: created_by.into(),
        }
    }

    /// Read the sidecar from a project directory; missing or unreadable sidecars yield `None`
    pub fn read(project_dir: &Path) -> Option<Self> {
        let path = project_dir.join(PROJECT_METADATA_FILE);
        let content = std::fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&content) {
            Ok(metadata) => Some(metadata),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "ignoring malformed project metadata");
                None
            }
        }
    }

    pub fn write(&self, project_dir: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(project_dir.join(PROJECT_METADATA_FILE), json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_then_read() {
        let temp = TempDir::new().unwrap();
        let metadata = ProjectMetadata::new("Basic", "marty");

        metadata.write(temp.path()).unwrap();
        assert_eq!(ProjectMetadata::read(temp.path()), Some(metadata));
    }

    #[test]
    fn test_malformed_sidecar_is_ignored() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(PROJECT_METADATA_FILE), "{not json").unwrap();

        assert!(ProjectMetadata::read(temp.path()).is_none());
    }
}
