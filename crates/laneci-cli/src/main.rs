//! laneci CLI tool.

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use laneci_config::load_settings;
use laneci_core::NotificationPriority;
use laneci_service::Services;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "laneci")]
#[command(about = "Self-hosted CI for mobile lanes", long_about = None)]
struct Cli {
    /// Settings file
    #[arg(long, env = "LANECI_CONFIG", default_value = "laneci.kdl")]
    config: PathBuf,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// First-time setup of the configuration repository
    Setup {
        #[command(subcommand)]
        command: SetupCommands,
    },
    /// Manage projects
    Projects {
        #[command(subcommand)]
        command: ProjectCommands,
    },
    /// Inspect builds
    Builds {
        #[command(subcommand)]
        command: BuildCommands,
    },
    /// Run a build of a project and stream its output
    Trigger {
        /// Project name
        project: String,
        /// Lane parameter as key=value, repeatable
        #[arg(long = "param", short = 'p', value_parser = parse_param)]
        params: Vec<(String, String)>,
    },
    /// Manage dashboard notifications
    Notifications {
        #[command(subcommand)]
        command: NotificationCommands,
    },
    /// Synchronize the configuration repository with its remote
    Sync {
        #[command(subcommand)]
        command: SyncCommands,
    },
}

#[derive(Subcommand)]
enum SetupCommands {
    /// Show which settings are missing
    Status,
    /// Create the private configuration repository on GitHub
    CreateRepo {
        /// Repository name
        name: String,
    },
    /// Clone the configuration repository (or start a local one)
    Init,
    /// Write the CI user and an empty project list
    Seed {
        /// CI user password
        #[arg(long, env = "LANECI_CI_PASSWORD", hide_env_values = true)]
        password: String,
        /// GitHub token stored on the CI user
        #[arg(long, env = "LANECI_CLONE_TOKEN", hide_env_values = true)]
        token: Option<String>,
    },
}

#[derive(Subcommand)]
enum ProjectCommands {
    /// List all projects
    List,
    /// Register a project
    Add {
        /// Project name
        name: String,
        /// Git URL of the project repository
        #[arg(long)]
        git_url: String,
        /// Repository full name, e.g. acme/ios-app
        #[arg(long)]
        full_name: String,
        /// Lane, "<platform> <lane>" or "<lane>"
        #[arg(long)]
        lane: String,
    },
    /// Enable builds for a project
    Enable { name: String },
    /// Disable builds for a project
    Disable { name: String },
    /// Remove a project
    Remove { name: String },
}

#[derive(Subcommand)]
enum BuildCommands {
    /// List builds of a project
    List {
        /// Project name
        project: String,
        /// Only show builds left unfinished
        #[arg(long)]
        unfinished: bool,
    },
    /// Show a build with its output
    Show {
        /// Build ID
        id: String,
    },
}

#[derive(Subcommand)]
enum NotificationCommands {
    /// List notifications
    List,
    /// Post a notification
    Add {
        name: String,
        message: String,
        #[arg(long, value_enum, default_value_t = Priority::Normal)]
        priority: Priority,
    },
    /// Remove a notification
    Remove { name: String },
}

#[derive(Subcommand)]
enum SyncCommands {
    /// Push local commits to the remote
    Push,
    /// Fast-forward from the remote
    Pull,
}

#[derive(Clone, Copy, ValueEnum)]
enum Priority {
    Low,
    Normal,
    High,
    Urgent,
}

impl From<Priority> for NotificationPriority {
    fn from(priority: Priority) -> Self {
        match priority {
            Priority::Low => NotificationPriority::Low,
            Priority::Normal => NotificationPriority::Normal,
            Priority::High => NotificationPriority::High,
            Priority::Urgent => NotificationPriority::Urgent,
        }
    }
}

fn parse_param(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected key=value, got '{}'", s)),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if cli.json_logs {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let settings = load_settings(&cli.config)
        .with_context(|| format!("Failed to load settings: {}", cli.config.display()))?;
    tracing::debug!(config = %cli.config.display(), "Settings loaded");
    let services = Services::from_settings(settings);

    match cli.command {
        Commands::Setup { command } => match command {
            SetupCommands::Status => commands::setup::status(&services).await?,
            SetupCommands::CreateRepo { name } => {
                commands::setup::create_repo(&services, &name).await?
            }
            SetupCommands::Init => commands::setup::init(&services).await?,
            SetupCommands::Seed { password, token } => {
                commands::setup::seed(&services, &password, token).await?
            }
        },
        Commands::Projects { command } => match command {
            ProjectCommands::List => commands::projects::list(&services).await?,
            ProjectCommands::Add {
                name,
                git_url,
                full_name,
                lane,
            } => commands::projects::add(&services, &name, &git_url, &full_name, &lane).await?,
            ProjectCommands::Enable { name } => {
                commands::projects::set_enabled(&services, &name, true).await?
            }
            ProjectCommands::Disable { name } => {
                commands::projects::set_enabled(&services, &name, false).await?
            }
            ProjectCommands::Remove { name } => commands::projects::remove(&services, &name).await?,
        },
        Commands::Builds { command } => match command {
            BuildCommands::List {
                project,
                unfinished,
            } => commands::builds::list(&services, &project, unfinished).await?,
            BuildCommands::Show { id } => commands::builds::show(&services, &id).await?,
        },
        Commands::Trigger { project, params } => {
            commands::builds::trigger(&services, &project, params.into_iter().collect()).await?
        }
        Commands::Notifications { command } => match command {
            NotificationCommands::List => commands::notifications::list(&services).await?,
            NotificationCommands::Add {
                name,
                message,
                priority,
            } => {
                commands::notifications::add(&services, priority.into(), &name, &message).await?
            }
            NotificationCommands::Remove { name } => {
                commands::notifications::remove(&services, &name).await?
            }
        },
        Commands::Sync { command } => match command {
            SyncCommands::Push => commands::sync::push(&services).await?,
            SyncCommands::Pull => commands::sync::pull(&services).await?,
        },
    }

    Ok(())
}
