//! Facade wiring the components together behind one request/result surface.

use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::Result;
use crate::host::{HostApplication, HostPlatform, HostStatus, ProcessController};
use crate::import::{AssetLibrary, AssetRemoval, ImportPipeline, ImportRecord};
use crate::project::{Project, ProjectRegistry};
use crate::settings::{ConfigStore, Settings};
use crate::state::{ImportedAsset, RecentProject, StateStore};

/// A request from the presentation layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    ListProjects { filter: Option<String> },
    CreateProject {
        name: String,
        template: Option<String>,
        open: bool,
    },
    DeleteProject { name: String },
    OpenProject { name: String },
    RecentProjects { limit: usize },
    ListTemplates,
    LaunchHost,
    HostStatus,
    ImportAssets { paths: Vec<PathBuf> },
    ImportHistory { filter: Option<String> },
    RemoveAsset { name: String },
}

/// Result of a successful [`Command`]
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Outcome {
    Projects(Vec<Project>),
    Created { project: Project, opened: Option<PathBuf> },
    Deleted { name: String },
    Opened { project: Project, file: PathBuf },
    Recent(Vec<RecentProject>),
    Templates(Vec<String>),
    Host(HostStatus),
    Imports(Vec<ImportRecord>),
    History(Vec<ImportedAsset>),
    AssetRemoved(AssetRemoval),
}

/// Owns one instance of every component for the lifetime of the process.
pub struct Engine {
    settings: Settings,
    registry: ProjectRegistry,
    host: Arc<ProcessController>,
    library: AssetLibrary,
    imports: ImportPipeline,
    state: Arc<StateStore>,
}

impl Engine {
    /// Build the engine from loaded settings. Must be called inside a Tokio runtime.
    pub fn new(config: &ConfigStore, platform: Arc<dyn HostPlatform>, state: StateStore) -> Self {
        let settings = config.settings().clone();
        let state = Arc::new(state);

        let host = Arc::new(ProcessController::new(
            platform,
            settings.host_executable.clone(),
            settings.host.clone(),
        ));
        let library = AssetLibrary::new(&settings, state.clone());
        let imports = ImportPipeline::new(
            host.clone(),
            Some(library.clone()),
            settings.import.timeout(),
        );

        Self {
            registry: ProjectRegistry::new(&settings),
            settings,
            host,
            library,
            imports,
            state,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn registry(&self) -> &ProjectRegistry {
        &self.registry
    }

    pub fn host(&self) -> &ProcessController {
        &self.host
    }

    pub fn imports(&self) -> &ImportPipeline {
        &self.imports
    }

    /// Run one command to completion
    pub async fn dispatch(&self, command: Command) -> Result<Outcome> {
        match command {
            Command::ListProjects { filter } => {
                let projects = self.registry.search(filter.as_deref().unwrap_or(""))?;
                Ok(Outcome::Projects(projects))
            }
            Command::CreateProject {
                name,
                template,
                open,
            } => {
                let template = template.unwrap_or_else(|| self.settings.defaults.template.clone());
                if open {
                    let (project, file) = self.create_and_open(&name, &template).await?;
                    Ok(Outcome::Created {
                        project,
                        opened: Some(file),
                    })
                } else {
                    let project = self.registry.create(&name, &template).await?;
                    Ok(Outcome::Created {
                        project,
                        opened: None,
                    })
                }
            }
            Command::DeleteProject { name } => {
                self.delete_project(&name).await?;
                Ok(Outcome::Deleted { name })
            }
            Command::OpenProject { name } => {
                let project = self.registry.get(&name)?;
                let file = self.open_project(&project).await?;
                Ok(Outcome::Opened { project, file })
            }
            Command::RecentProjects { limit } => {
                let state = self.state.read().await;
                Ok(Outcome::Recent(state.get_recent_projects(limit).to_vec()))
            }
            Command::ListTemplates => Ok(Outcome::Templates(
                self.registry.templates().list_templates().await?,
            )),
            Command::LaunchHost => {
                self.host.ensure_running().await?;
                Ok(Outcome::Host(self.host.status().await?))
            }
            Command::HostStatus => Ok(Outcome::Host(self.host.status().await?)),
            Command::ImportAssets { paths } => {
                Ok(Outcome::Imports(self.import_assets(paths).await))
            }
            Command::ImportHistory { filter } => Ok(Outcome::History(
                self.library
                    .search_history(filter.as_deref().unwrap_or(""))
                    .await,
            )),
            Command::RemoveAsset { name } => {
                Ok(Outcome::AssetRemoved(self.library.remove_asset(&name).await?))
            }
        }
    }

    /// Create a project and open its document in the host.
    ///
    /// When opening fails the project stays on disk and the open error is
    /// returned.
    pub async fn create_and_open(&self, name: &str, template: &str) -> Result<(Project, PathBuf)> {
        let project = self.registry.create(name, template).await?;
        let file = self.open_project(&project).await?;
        Ok((project, file))
    }

    /// Open a project's document and remember it as recent
    pub async fn open_project(&self, project: &Project) -> Result<PathBuf> {
        let file = self.registry.project_file(project)?;
        self.host.open_project(&file).await?;
        info!(project = %project.name, path = %file.display(), "project opened");

        let name = project.name.clone();
        let recent = file.clone();
        if let Err(e) = self
            .state
            .update(move |state| state.add_recent_project(&name, recent))
            .await
        {
            warn!(error = %e, "failed to record recent project");
        }
        Ok(file)
    }

    pub async fn delete_project(&self, name: &str) -> Result<()> {
        self.registry.delete(name).await?;

        let forgotten = name.to_string();
        if let Err(e) = self
            .state
            .update(move |state| state.forget_project(&forgotten))
            .await
        {
            warn!(error = %e, "failed to update recent projects");
        }
        Ok(())
    }

    /// Import files in order, one at a time, and report every outcome.
    ///
    /// Failed imports appear as records with a reason; later files are still
    /// attempted.
    pub async fn import_assets(&self, paths: Vec<PathBuf>) -> Vec<ImportRecord> {
        let tickets: Vec<_> = paths.into_iter().map(|p| self.imports.submit(p)).collect();
        let seqs: Vec<u64> = tickets.iter().map(|t| t.seq).collect();

        for ticket in tickets {
            if let Err(e) = ticket.wait().await {
                warn!(error = %e, "import did not succeed");
            }
        }

        let mut records: Vec<ImportRecord> = self
            .imports
            .records()
            .into_iter()
            .filter(|r| seqs.contains(&r.seq))
            .collect();
        records.sort_by_key(|r| r.seq);
        records
    }

    /// Import a single file, failing with the import error
    pub async fn import_asset(&self, path: PathBuf) -> Result<ImportRecord> {
        self.imports.import_asset(path).await
    }

    /// Let queued imports finish, then stop the worker
    pub async fn shutdown(self) {
        self.imports.shutdown().await;
    }
}

