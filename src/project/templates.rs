use std::io;
use std::path::{Path, PathBuf};
use tokio::task;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{EngineError, Result};

/// Instantiates project directories from template directories.
///
/// Templates are read-only directory trees under the templates root. Every
/// file or folder name containing the placeholder token is rewritten with
/// the new project's name while copying.
#[derive(Debug, Clone)]
pub struct TemplateEngine {
    templates_root: PathBuf,
    placeholder: String,
}

impl TemplateEngine {
    pub fn new(templates_root: PathBuf, placeholder: impl Into<String>) -> Self {
        Self {
            templates_root,
            placeholder: placeholder.into(),
        }
    }

    pub fn templates_root(&self) -> &Path {
        &self.templates_root
    }

    /// Get the directory of a named template
    pub fn template_dir(&self, template_name: &str) -> PathBuf {
        self.templates_root.join(template_name)
    }

    /// List available template names, sorted
    pub async fn list_templates(&self) -> Result<Vec<String>> {
        let unavailable = || EngineError::PathUnavailable {
            what: "Templates root",
            path: self.templates_root.clone(),
        };
        if !self.templates_root.is_dir() {
            return Err(unavailable());
        }

        let mut templates = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.templates_root)
            .await
            .map_err(|_| unavailable())?;

        // A failed read mid-scan fails the listing rather than truncating it
        while let Some(entry) = entries.next_entry().await.map_err(|e| {
            warn!(root = %self.templates_root.display(), error = %e, "template scan failed");
            unavailable()
        })? {
            let path = entry.path();
            if path.is_dir() {
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    if !name.starts_with('.') {
                        templates.push(name.to_string());
                    }
                }
            }
        }

        templates.sort();
        Ok(templates)
    }

    /// Replace the placeholder token in a single file or folder name
    pub fn substitute_name(&self, component: &str, project_name: &str) -> String {
        if self.placeholder.is_empty() {
            return component.to_string();
        }
        component.replace(&self.placeholder, project_name)
    }

    /// Copy the named template to `destination`, renaming placeholder entries.
    ///
    /// The destination is created by this call and must not exist. On any
    /// copy error the partially written destination is removed before the
    /// error is returned.
    pub async fn instantiate(&self, template_name: &str, destination: &Path) -> Result<PathBuf> {
        let template_dir = self.template_dir(template_name);
        let is_plain_name = Path::new(template_name).file_name()
            == Some(std::ffi::OsStr::new(template_name));

        if !is_plain_name || !template_dir.is_dir() {
            return Err(EngineError::TemplateNotFound {
                name: template_name.to_string(),
                root: self.templates_root.clone(),
            });
        }

        let project_name = destination
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| EngineError::InvalidName {
                name: destination.display().to_string(),
                reason: "destination has no final path component".to_string(),
            })?;

        info!(
            template = template_name,
            destination = %destination.display(),
            "instantiating template"
        );

        let engine = self.clone();
        let template = template_name.to_string();
        let dest = destination.to_path_buf();

        task::spawn_blocking(move || {
            engine.instantiate_blocking(&template, &template_dir, &dest, &project_name)
        })
        .await
        .map_err(|e| EngineError::CopyFailed {
            template: template_name.to_string(),
            destination: destination.to_path_buf(),
            source: io::Error::new(io::ErrorKind::Other, e.to_string()),
        })?
    }

    fn instantiate_blocking(
        &self,
        template_name: &str,
        template_dir: &Path,
        destination: &Path,
        project_name: &str,
    ) -> Result<PathBuf> {
        let copy_failed = |source: io::Error| EngineError::CopyFailed {
            template: template_name.to_string(),
            destination: destination.to_path_buf(),
            source,
        };

        // create_dir rather than create_dir_all: an existing destination must
        // never be written into or rolled back.
        if let Err(e) = std::fs::create_dir(destination) {
            return Err(if e.kind() == io::ErrorKind::AlreadyExists {
                EngineError::NameConflict {
                    name: project_name.to_string(),
                }
            } else {
                copy_failed(e)
            });
        }

        if let Err(e) = self.copy_tree(template_dir, destination, project_name) {
            warn!(
                template = template_name,
                destination = %destination.display(),
                error = %e,
                "template copy failed, removing partial project"
            );
            if let Err(cleanup) = std::fs::remove_dir_all(destination) {
                warn!(
                    destination = %destination.display(),
                    error = %cleanup,
                    "failed to remove partial project"
                );
            }
            return Err(copy_failed(e));
        }

        Ok(destination.to_path_buf())
    }

    fn copy_tree(
        &self,
        template_dir: &Path,
        destination: &Path,
        project_name: &str,
    ) -> io::Result<()> {
        for entry in WalkDir::new(template_dir)
            .min_depth(1)
            .follow_links(false)
            .sort_by_file_name()
        {
            let entry = entry?;
            let relative = entry
                .path()
                .strip_prefix(template_dir)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

            let target = relative
                .components()
                .fold(destination.to_path_buf(), |acc, component| {
                    let name = component.as_os_str().to_string_lossy();
                    acc.join(self.substitute_name(&name, project_name))
                });

            if entry.file_type().is_dir() {
                debug!(path = %target.display(), "creating directory");
                std::fs::create_dir(&target)?;
            } else {
                debug!(from = %entry.path().display(), to = %target.display(), "copying file");
                if target.exists() {
                    return Err(io::Error::new(
                        io::ErrorKind::AlreadyExists,
                        format!("{} collides with another template entry", target.display()),
                    ));
                }
                std::fs::copy(entry.path(), &target)?;
            }
        }

        Ok(())
    }
}
