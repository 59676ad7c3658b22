use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use std::fs::ReadDir;
use std::io;
use std::path::{Path, PathBuf};
use tokio::task;
use tracing::{debug, info, warn};

use super::{validate_project_name, Project, ProjectMetadata, TemplateEngine};
use crate::error::{EngineError, Result};
use crate::settings::Settings;
use crate::utils::fs::{current_user, has_extension};

/// Registry of project directories under the projects root.
///
/// The filesystem is the only source of truth: nothing is cached between
/// calls.
#[derive(Debug, Clone)]
pub struct ProjectRegistry {
    projects_root: PathBuf,
    project_extension: String,
    templates: TemplateEngine,
}

/// Lazy scan over the immediate subdirectories of the projects root.
///
/// Each call to [`ProjectRegistry::list`] starts a fresh scan.
#[derive(Debug)]
pub struct Projects {
    entries: ReadDir,
}

impl Iterator for Projects {
    type Item = Project;

    fn next(&mut self) -> Option<Project> {
        loop {
            let entry = match self.entries.next()? {
                Ok(entry) => entry,
                Err(e) => {
                    debug!(error = %e, "skipping unreadable projects root entry");
                    continue;
                }
            };

            let hidden = entry.file_name().to_string_lossy().starts_with('.');
            if hidden {
                continue;
            }

            if let Some(project) = Project::from_dir(&entry.path()) {
                return Some(project);
            }
        }
    }
}

impl ProjectRegistry {
    pub fn new(settings: &Settings) -> Self {
        Self {
            projects_root: settings.projects_root.clone(),
            project_extension: settings.defaults.project_extension.clone(),
            templates: TemplateEngine::new(
                settings.templates_root(),
                settings.defaults.placeholder.clone(),
            ),
        }
    }

    pub fn projects_root(&self) -> &Path {
        &self.projects_root
    }

    pub fn templates(&self) -> &TemplateEngine {
        &self.templates
    }

    fn root_unavailable(&self) -> EngineError {
        EngineError::PathUnavailable {
            what: "Projects root",
            path: self.projects_root.clone(),
        }
    }

    /// Start a scan of the projects root
    pub fn list(&self) -> Result<Projects> {
        let entries = std::fs::read_dir(&self.projects_root).map_err(|_| self.root_unavailable())?;
        Ok(Projects { entries })
    }

    /// Look up one project by name
    pub fn get(&self, name: &str) -> Result<Project> {
        validate_project_name(name)?;
        Project::from_dir(&self.projects_root.join(name)).ok_or_else(|| EngineError::NotFound {
            name: name.to_string(),
        })
    }

    /// Fuzzy-match project names against `query`, best match first.
    ///
    /// An empty query returns every project sorted by name.
    pub fn search(&self, query: &str) -> Result<Vec<Project>> {
        let query = query.trim();
        let mut projects: Vec<Project> = self.list()?.collect();

        if query.is_empty() {
            projects.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
            return Ok(projects);
        }

        let matcher = SkimMatcherV2::default().ignore_case();
        let mut scored: Vec<(i64, Project)> = projects
            .into_iter()
            .filter_map(|p| matcher.fuzzy_match(&p.name, query).map(|score| (score, p)))
            .collect();

        scored.sort_by(|(sa, a), (sb, b)| sb.cmp(sa).then_with(|| a.name.cmp(&b.name)));
        Ok(scored.into_iter().map(|(_, p)| p).collect())
    }

    /// Create a project named `name` from `template_name`.
    pub async fn create(&self, name: &str, template_name: &str) -> Result<Project> {
        validate_project_name(name)?;
        if !self.projects_root.is_dir() {
            return Err(self.root_unavailable());
        }

        let destination = self.projects_root.join(name);
        if destination.symlink_metadata().is_ok() {
            return Err(EngineError::NameConflict {
                name: name.to_string(),
            });
        }

        self.templates.instantiate(template_name, &destination).await?;

        let metadata = ProjectMetadata::new(template_name, current_user());
        let dir = destination.clone();
        let written = task::spawn_blocking(move || metadata.write(&dir))
            .await
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))
            .and_then(|r| r);

        if let Err(source) = written {
            warn!(project = name, error = %source, "failed to write project metadata, rolling back");
            if let Err(cleanup) = tokio::fs::remove_dir_all(&destination).await {
                warn!(
                    destination = %destination.display(),
                    error = %cleanup,
                    "failed to remove partial project"
                );
            }
            return Err(EngineError::CopyFailed {
                template: template_name.to_string(),
                destination,
                source,
            });
        }

        info!(project = name, template = template_name, "project created");
        Project::from_dir(&destination).ok_or_else(|| EngineError::NotFound {
            name: name.to_string(),
        })
    }

    /// Recursively remove a project directory. Irreversible.
    ///
    /// A project that is a symlink to a directory elsewhere loses only the link.
    pub async fn delete(&self, name: &str) -> Result<()> {
        validate_project_name(name)?;
        let path = self.projects_root.join(name);

        // Same test as `list`: a symlink to a directory counts as a project
        let is_project_dir = path.metadata().map(|m| m.is_dir()).unwrap_or(false);
        if !is_project_dir {
            return Err(EngineError::NotFound {
                name: name.to_string(),
            });
        }
        let is_link = path
            .symlink_metadata()
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false);

        let target = path.clone();
        task::spawn_blocking(move || {
            if is_link {
                // Only the link goes; the directory it points at is left alone
                std::fs::remove_file(&target).or_else(|_| std::fs::remove_dir(&target))
            } else {
                std::fs::remove_dir_all(&target)
            }
        })
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))
        .and_then(|r| r)
        .map_err(|source| EngineError::DeleteFailed {
            name: name.to_string(),
            source,
        })?;

        info!(project = name, path = %path.display(), "project deleted");
        Ok(())
    }

    /// Locate the host document to open for a project.
    ///
    /// Picks the first file, in name order, with the configured extension
    /// directly inside the project directory.
    pub fn project_file(&self, project: &Project) -> Result<PathBuf> {
        let extension = self.project_extension.as_str();
        let mut candidates: Vec<PathBuf> = std::fs::read_dir(&project.path)
            .map_err(|_| EngineError::NotFound {
                name: project.name.clone(),
            })?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && has_extension(path, &[extension]))
            .collect();

        candidates.sort();
        candidates
            .into_iter()
            .next()
            .ok_or_else(|| EngineError::NoProjectFile {
                name: project.name.clone(),
                extension: extension.to_string(),
            })
    }
}
