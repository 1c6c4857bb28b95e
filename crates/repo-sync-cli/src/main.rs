mod commands;
mod config;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use repo_sync::{DEFAULT_KIND, Policy, RemoteDescriptor, RepositoryId, SyncEngine, SyncOptions};
use repo_sync_remote::{HttpFetcher, default_fetcher};
use repo_sync_store::{SqliteVersionStore, UnitFilter};
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;

#[derive(Parser)]
#[command(name = "repo-sync")]
#[command(about = "Mirror remote package listings into versioned local repositories")]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,
    /// Path to the repository database
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create, list or modify repositories
    Repo {
        #[command(subcommand)]
        command: RepoCommand,
    },
    /// Synchronize a repository with a remote
    Sync {
        /// Repository name
        repository: String,
        /// Name of a remote from the config file
        #[arg(long, conflicts_with = "url", required_unless_present = "url")]
        remote: Option<String>,
        /// Ad-hoc remote URL (http, https or file)
        #[arg(long)]
        url: Option<String>,
        /// Download policy recorded with the version (immediate, on-demand)
        #[arg(long)]
        policy: Option<String>,
        /// Only add content; never remove what the remote dropped
        #[arg(long)]
        additive: bool,
        /// Print the task report as JSON
        #[arg(long)]
        json: bool,
    },
    /// List the versions of a repository
    Versions {
        /// Repository name
        repository: String,
    },
    /// Show the content of a repository version
    Show {
        /// Repository name
        repository: String,
        /// Version number (defaults to latest)
        #[arg(long)]
        version: Option<u64>,
        /// Only units whose name contains this text
        #[arg(long)]
        name: Option<String>,
        /// Only units with exactly this version
        #[arg(long)]
        version_filter: Option<String>,
    },
    /// List configured remotes
    Remotes,
}

#[derive(Subcommand)]
enum RepoCommand {
    /// Create an empty repository
    Create {
        /// Repository name
        name: String,
    },
    /// List repositories and their latest version
    List,
    /// Add or remove units directly, creating a new version
    Modify {
        /// Repository name
        name: String,
        /// Version the change is based on (defaults to latest)
        #[arg(long)]
        base: Option<u64>,
        /// Content kind of the units given
        #[arg(long, default_value = DEFAULT_KIND)]
        kind: String,
        /// Unit to add, as NAME:VERSION (repeatable)
        #[arg(long)]
        add: Vec<String>,
        /// Unit to remove, as NAME:VERSION (repeatable)
        #[arg(long)]
        remove: Vec<String>,
    },
}

fn setup_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn default_db_path() -> Result<PathBuf> {
    let base = dirs::cache_dir().context("could not determine cache directory")?;
    Ok(base.join("repo-sync").join("repositories.db"))
}

fn open_store(path: &Path) -> Result<SqliteVersionStore> {
    if let Some(dir) = path.parent()
        && !dir.as_os_str().is_empty()
    {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create directory: {}", dir.display()))?;
    }
    SqliteVersionStore::open(path)
        .with_context(|| format!("failed to open database: {}", path.display()))
}

fn resolve_remote(
    config: &AppConfig,
    remote: Option<&str>,
    url: Option<&str>,
    policy: Option<&str>,
) -> Result<RemoteDescriptor> {
    let descriptor = match (remote, url) {
        (Some(name), _) => config
            .remote(name)
            .map(|entry| entry.descriptor())
            .with_context(|| format!("no remote named '{name}' in config"))?,
        (None, Some(url)) => RemoteDescriptor::new(url, url),
        (None, None) => anyhow::bail!("either --remote or --url is required"),
    };

    match policy {
        Some(raw) => {
            let policy = Policy::parse(raw).with_context(|| {
                format!("unknown policy '{raw}' (expected immediate or on-demand)")
            })?;
            Ok(descriptor.with_policy(policy))
        }
        None => Ok(descriptor),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let config = config::load_config();

    if let Command::Remotes = cli.command {
        commands::remotes::run(&config);
        return Ok(());
    }

    let db_path = match cli.db {
        Some(path) => path,
        None => default_db_path()?,
    };
    let store = Arc::new(open_store(&db_path)?);

    match cli.command {
        Command::Repo { command } => match command {
            RepoCommand::Create { name } => commands::repo::create(store.as_ref(), &name),
            RepoCommand::List => commands::repo::list(store.as_ref()),
            RepoCommand::Modify {
                name,
                base,
                kind,
                add,
                remove,
            } => {
                commands::repo::modify_content(store.as_ref(), &name, base, &kind, &add, &remove)
            }
        },
        Command::Sync {
            repository,
            remote,
            url,
            policy,
            additive,
            json,
        } => {
            let remote = resolve_remote(
                &config,
                remote.as_deref(),
                url.as_deref(),
                policy.as_deref(),
            )?;
            let options = if additive {
                SyncOptions::additive()
            } else {
                SyncOptions::default()
            };

            let fetcher = default_fetcher(HttpFetcher::new());
            let engine = Arc::new(
                SyncEngine::new(store, Arc::new(fetcher))
                    .with_config(config.sync.to_sync_config()),
            );
            commands::sync::run(&engine, RepositoryId::new(repository), remote, options, json)
                .await
        }
        Command::Versions { repository } => {
            commands::versions::run(store.as_ref(), &RepositoryId::new(repository))
        }
        Command::Show {
            repository,
            version,
            name,
            version_filter,
        } => {
            let filter = UnitFilter {
                name,
                version: version_filter,
            };
            commands::show::run(store.as_ref(), &RepositoryId::new(repository), version, &filter)
        }
        Command::Remotes => Ok(()),
    }
}
