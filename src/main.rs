use anyhow::Result;
use clap::{Parser, Subcommand};
use console::style;
use inquire::Confirm;
use std::path::PathBuf;

use stagehand::host::{get_host_platform, HostStatus};
use stagehand::output::{self, writer::write_json, OutputMode};
use stagehand::settings::constants::{
    get_default_config_path, get_templates_dir, CONFIG_DIR_DISPLAY, CONFIG_ENV_VAR,
};
use stagehand::state::StateStore;
use stagehand::utils::fs::ensure_directory_exists;
use stagehand::{display_println, Command, ConfigStore, Engine, ImportStatus, Outcome, Settings};

#[derive(Parser)]
#[command(name = "stagehand")]
#[command(
    about = "Create projects from templates, open them in the host application, and queue asset imports",
    long_about = "stagehand keeps a library of projects under one projects root, creates new\n\
                  projects from template folders, and drives a single running instance of the\n\
                  host application to open projects and import assets one at a time.\n\n\
                  GETTING STARTED:\n  \
                  1. Run 'stagehand settings init' to point at the host and your folders\n  \
                  2. Create a project with 'stagehand projects create ShotA --open'\n  \
                  3. Import files with 'stagehand import plate.mov logo.png'"
)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print results as JSON on stdout
    #[arg(long, global = true)]
    json: bool,

    /// Settings file path
    #[arg(short, long, global = true, env = CONFIG_ENV_VAR)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage projects under the projects root
    Projects {
        #[command(subcommand)]
        command: ProjectsCommands,
    },

    /// Inspect project templates
    Templates {
        #[command(subcommand)]
        command: TemplatesCommands,
    },

    /// Control the host application
    Host {
        #[command(subcommand)]
        command: HostCommands,
    },

    /// Import files into the host, one at a time in the given order
    Import {
        /// Files to import
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Manage imported assets
    Assets {
        #[command(subcommand)]
        command: AssetsCommands,
    },

    /// Manage the settings file
    Settings {
        #[command(subcommand)]
        command: SettingsCommands,
    },
}

#[derive(Subcommand)]
enum ProjectsCommands {
    /// List projects, optionally fuzzy-filtered by name
    List {
        /// Fuzzy filter on project names
        #[arg(short, long)]
        filter: Option<String>,
    },

    /// Create a project from a template
    Create {
        /// Project name
        name: String,

        /// Template to copy (defaults to the configured default template)
        #[arg(short, long)]
        template: Option<String>,

        /// Open the new project in the host application
        #[arg(long)]
        open: bool,
    },

    /// Delete a project directory and everything in it
    Delete {
        /// Project name
        name: String,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Open a project in the host application
    Open {
        /// Project name
        name: String,
    },

    /// Show recently opened projects
    Recent {
        /// Maximum number of projects to show
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
}

#[derive(Subcommand)]
enum TemplatesCommands {
    /// List available templates
    List,
}

#[derive(Subcommand)]
enum HostCommands {
    /// Attach to or launch the host and wait until it is ready
    Launch,

    /// Show the host state without launching it
    Status,
}

#[derive(Subcommand)]
enum AssetsCommands {
    /// Show the import history, optionally fuzzy-filtered by file name
    History {
        /// Fuzzy filter on asset file names
        #[arg(short, long)]
        filter: Option<String>,
    },

    /// Delete an asset from the assets root and the history
    Remove {
        /// File name relative to the assets root
        name: String,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum SettingsCommands {
    /// Show the current settings and whether they are valid
    Show,

    /// Write a new settings file
    Init {
        /// Host application executable
        #[arg(long)]
        host: PathBuf,

        /// Folder imported assets are staged into
        #[arg(long)]
        assets: PathBuf,

        /// Folder holding one subfolder per project
        #[arg(long)]
        projects: PathBuf,

        /// Folder holding one subfolder per template
        #[arg(long)]
        templates: Option<PathBuf>,

        /// Overwrite an existing settings file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Cli
    };
    output::init_with_verbosity(output_mode, cli.verbose);
    console::set_colors_enabled(output::colors_enabled());

    let config_path = cli.config.unwrap_or_else(get_default_config_path);

    let command = match cli.command {
        Commands::Settings { command } => return run_settings(command, config_path).await,
        Commands::Projects { command } => match command {
            ProjectsCommands::List { filter } => Command::ListProjects { filter },
            ProjectsCommands::Create {
                name,
                template,
                open,
            } => Command::CreateProject {
                name,
                template,
                open,
            },
            ProjectsCommands::Delete { name, yes } => {
                if !yes && !confirm(&format!("Delete project '{name}' and all of its files?"))? {
                    display_println!("{} Cancelled", style("ℹ").blue());
                    return Ok(());
                }
                Command::DeleteProject { name }
            }
            ProjectsCommands::Open { name } => Command::OpenProject { name },
            ProjectsCommands::Recent { limit } => Command::RecentProjects { limit },
        },
        Commands::Templates { command } => match command {
            TemplatesCommands::List => Command::ListTemplates,
        },
        Commands::Host { command } => match command {
            HostCommands::Launch => Command::LaunchHost,
            HostCommands::Status => Command::HostStatus,
        },
        Commands::Import { paths } => Command::ImportAssets { paths },
        Commands::Assets { command } => match command {
            AssetsCommands::History { filter } => Command::ImportHistory { filter },
            AssetsCommands::Remove { name, yes } => {
                if !yes && !confirm(&format!("Delete asset '{name}' from the assets folder?"))? {
                    display_println!("{} Cancelled", style("ℹ").blue());
                    return Ok(());
                }
                Command::RemoveAsset { name }
            }
        },
    };

    if !config_path.exists() {
        anyhow::bail!(
            "No settings file at {}. Run 'stagehand settings init' to create one (default location {}).",
            config_path.display(),
            CONFIG_DIR_DISPLAY
        );
    }
    let store = ConfigStore::load(config_path).await?;
    let engine = Engine::new(&store, get_host_platform(), StateStore::at_default_location());

    let result = engine.dispatch(command).await;
    engine.shutdown().await;
    let outcome = result?;

    if output_mode == OutputMode::Json {
        write_json(&outcome)?;
    } else {
        render(&outcome);
    }

    if let Outcome::Imports(records) = &outcome {
        let failed = records
            .iter()
            .filter(|r| r.status != ImportStatus::Succeeded)
            .count();
        if failed > 0 {
            anyhow::bail!("{failed} of {} imports did not succeed", records.len());
        }
    }

    Ok(())
}

fn confirm(message: &str) -> Result<bool> {
    Ok(Confirm::new(message).with_default(false).prompt()?)
}

fn render(outcome: &Outcome) {
    match outcome {
        Outcome::Projects(projects) => {
            if projects.is_empty() {
                display_println!("{}", style("No projects found").dim());
            }
            for project in projects {
                let template = project
                    .template
                    .as_deref()
                    .map(|t| format!("from {t}"))
                    .unwrap_or_default();
                display_println!(
                    "{}  {}  {}",
                    style(&project.name).cyan().bold(),
                    style(project.created_at.format("%Y-%m-%d %H:%M")).dim(),
                    style(template).dim()
                );
            }
        }
        Outcome::Created { project, opened } => {
            display_println!(
                "{} Created project '{}' in {}",
                style("✓").green().bold(),
                style(&project.name).cyan().bold(),
                style(project.path.display()).dim()
            );
            if let Some(file) = opened {
                display_println!("{} Opened {}", style("✓").green().bold(), file.display());
            }
        }
        Outcome::Deleted { name } => {
            display_println!(
                "{} Deleted project '{}'",
                style("✓").green().bold(),
                style(name).cyan().bold()
            );
        }
        Outcome::Opened { project, file } => {
            display_println!(
                "{} Opened '{}' ({})",
                style("✓").green().bold(),
                style(&project.name).cyan().bold(),
                style(file.display()).dim()
            );
        }
        Outcome::Recent(recent) => {
            if recent.is_empty() {
                display_println!("{}", style("No recently opened projects").dim());
            }
            for entry in recent {
                display_println!(
                    "{}  {}  {}",
                    style(&entry.name).cyan().bold(),
                    style(entry.last_opened.format("%Y-%m-%d %H:%M")).dim(),
                    style(format!("opened {}x", entry.open_count)).dim()
                );
            }
        }
        Outcome::Templates(templates) => {
            if templates.is_empty() {
                display_println!("{}", style("No templates found").dim());
            }
            for template in templates {
                display_println!("  {}", style(template).cyan());
            }
        }
        Outcome::Host(status) => render_host(status),
        Outcome::Imports(records) => {
            for record in records {
                match record.status {
                    ImportStatus::Succeeded => display_println!(
                        "{} Imported {}",
                        style("✓").green().bold(),
                        record
                            .imported_path
                            .as_ref()
                            .unwrap_or(&record.path)
                            .display()
                    ),
                    _ => display_println!(
                        "{} {}: {}",
                        style("✗").red().bold(),
                        record.path.display(),
                        record.reason.as_deref().unwrap_or("not imported")
                    ),
                }
            }
        }
        Outcome::History(assets) => {
            if assets.is_empty() {
                display_println!("{}", style("No imported assets").dim());
            }
            for asset in assets {
                display_println!(
                    "{}  {}  {}",
                    style(asset.imported_at.format("%Y-%m-%d %H:%M")).dim(),
                    asset.path.display(),
                    style(&asset.imported_by).dim()
                );
            }
        }
        Outcome::AssetRemoved(removal) => {
            display_println!(
                "{} Removed {} ({} history entries)",
                style("✓").green().bold(),
                removal.path.display(),
                removal.history_entries
            );
        }
    }
}

fn render_host(status: &HostStatus) {
    let state = style(status.state.to_string()).bold();
    match &status.handle {
        Some(handle) => display_println!(
            "Host: {} (pid {}){}",
            state,
            handle.pid,
            handle
                .window
                .as_ref()
                .map(|w| format!(" - {}", w.title))
                .unwrap_or_default()
        ),
        None => display_println!("Host: {}", state),
    }
    display_println!("{}", style(format!("via {}", status.platform)).dim());
}

async fn run_settings(command: SettingsCommands, config_path: PathBuf) -> Result<()> {
    match command {
        SettingsCommands::Show => {
            let settings = Settings::read_from_file(&config_path).await?;
            if output::current_mode() == OutputMode::Json {
                write_json(&settings)?;
            } else {
                display_println!("{}", style(config_path.display()).dim());
                display_println!("{}", serde_yaml::to_string(&settings)?);
            }
            match settings.expanded().validate() {
                Ok(()) => display_println!("{} Settings are valid", style("✓").green().bold()),
                Err(e) => display_println!("{} {}", style("✗").red().bold(), e),
            }
        }
        SettingsCommands::Init {
            host,
            assets,
            projects,
            templates,
            force,
        } => {
            if config_path.exists() && !force {
                anyhow::bail!(
                    "Settings file already exists at {} (use --force to overwrite)",
                    config_path.display()
                );
            }

            let templates = match templates {
                Some(templates) => templates,
                None => {
                    let default = get_templates_dir();
                    ensure_directory_exists(&default).await?;
                    default
                }
            };

            let settings = Settings::new(host, assets, projects).with_templates_root(templates);
            let store = ConfigStore::init(config_path, settings).await?;
            display_println!(
                "{} Wrote settings to {}",
                style("✓").green().bold(),
                style(store.path().display()).dim()
            );
        }
    }

    Ok(())
}
