// src/main.rs

use anyhow::Result;
use canister::db::models::{Repository, SourceType};
use canister::server::{run_server, ServerConfig};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

const DEFAULT_DB_PATH: &str = "/var/lib/canister/canister.db";

#[derive(Parser)]
#[command(name = "canister")]
#[command(author, version, about = "Composer-protocol package repository proxy and mirror", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the canister database
    Init {
        #[arg(short, long, default_value = DEFAULT_DB_PATH)]
        db_path: PathBuf,
    },
    /// Start the server
    Serve {
        #[arg(short, long, default_value = DEFAULT_DB_PATH)]
        db_path: PathBuf,
        /// Address to bind to
        #[arg(short, long, default_value = "0.0.0.0:8080")]
        bind: String,
        /// Root directory for mirrored artifacts
        #[arg(short, long, default_value = "/var/lib/canister/artifacts")]
        storage_dir: PathBuf,
        /// Disable the scheduled sync loop
        #[arg(long)]
        no_scheduled_sync: bool,
    },
    /// Sync one repository (or all) now
    Sync {
        #[arg(short, long, default_value = DEFAULT_DB_PATH)]
        db_path: PathBuf,
        /// Repository name; omit to sync every configured repository
        repository: Option<String>,
    },
    /// Manage upstream repositories
    #[command(subcommand)]
    Repo(RepoCommands),
}

#[derive(Subcommand)]
enum RepoCommands {
    /// Add an upstream repository
    Add {
        #[arg(short, long, default_value = DEFAULT_DB_PATH)]
        db_path: PathBuf,
        name: String,
        url: String,
        /// Source type: gitlab, composer, or artifact
        #[arg(short = 't', long, default_value = "composer")]
        source_type: String,
        /// Account/group for git-hosted sources
        #[arg(long)]
        account: Option<String>,
        /// Named project; omit for an account-wide target
        #[arg(long)]
        project: Option<String>,
        /// Access token for the upstream API
        #[arg(long)]
        token: Option<String>,
        /// Glob filter for manifest paths
        #[arg(long)]
        path_filter: Option<String>,
    },
    /// List configured repositories
    List {
        #[arg(short, long, default_value = DEFAULT_DB_PATH)]
        db_path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { db_path } => {
            if let Some(parent) = db_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            canister::db::open_and_migrate(&db_path)?;
            info!("Database initialized at {}", db_path.display());
        }
        Commands::Serve {
            db_path,
            bind,
            storage_dir,
            no_scheduled_sync,
        } => {
            canister::db::open_and_migrate(&db_path)?;

            let mut config = ServerConfig {
                bind_addr: bind.parse()?,
                db_path,
                storage_dir,
                ..Default::default()
            };
            if no_scheduled_sync {
                config.sync_poll_interval = None;
            }
            run_server(config).await?;
        }
        Commands::Sync {
            db_path,
            repository,
        } => {
            let conn = canister::db::open_and_migrate(&db_path)?;
            let targets = match &repository {
                Some(name) => match Repository::find_by_name(&conn, name)? {
                    Some(repo) => vec![repo],
                    None => anyhow::bail!("unknown repository '{name}'"),
                },
                None => Repository::list_all(&conn)?,
            };
            drop(conn);

            let kv = std::sync::Arc::new(canister::KvStore::new());
            let cache = canister::MetadataCache::new(kv);
            let client = reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .user_agent(concat!("canister/", env!("CARGO_PKG_VERSION")))
                .build()?;
            let engine = canister::SyncEngine::new(db_path, cache, client);

            let mut failures = 0;
            for repo in targets {
                let Some(id) = repo.id else { continue };
                match engine.synchronize(id).await {
                    Ok(result) => info!(
                        "Synced {}: {} packages via {}",
                        repo.name,
                        result.packages.len(),
                        result.strategy
                    ),
                    Err(e) => {
                        eprintln!("Sync failed for {}: {e}", repo.name);
                        failures += 1;
                    }
                }
            }
            if failures > 0 {
                anyhow::bail!("{failures} repository sync(s) failed");
            }
        }
        Commands::Repo(RepoCommands::Add {
            db_path,
            name,
            url,
            source_type,
            account,
            project,
            token,
            path_filter,
        }) => {
            let conn = canister::db::open_and_migrate(&db_path)?;
            let source_type: SourceType = source_type.parse()?;

            let mut repo = Repository::new(name.clone(), url, source_type);
            repo.account = account;
            repo.project = project;
            repo.path_filter = path_filter;
            if let Some(token) = token {
                repo.credential_type = Some("token".to_string());
                repo.credential_token = Some(token);
            }
            repo.insert(&conn)?;
            info!("Added repository '{name}'");
        }
        Commands::Repo(RepoCommands::List { db_path }) => {
            let conn = canister::db::open_and_migrate(&db_path)?;
            for repo in Repository::list_all(&conn)? {
                println!(
                    "{:<24} {:<10} {:<8} {}",
                    repo.name,
                    repo.source_type,
                    repo.status,
                    repo.url
                );
            }
        }
    }

    Ok(())
}
