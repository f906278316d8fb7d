//! ClinicNote CLI - manage clinic records from the terminal
//!
//! Local commands (add/get/list/delete) work fully offline against the
//! per-user document store; `sync` runs one reconciliation pass against
//! the configured remote authority.

use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use clinicnote_core::config::Credentials;
use clinicnote_core::connectivity::{ConnectivityMonitor, ConnectivityState};
use clinicnote_core::gateway::{GatewayError, HttpRemoteGateway};
use clinicnote_core::sync::SyncOutcome;
use clinicnote_core::{ClientConfig, DocumentStore, EntityType, SyncEngine};
use serde_json::Value;
use thiserror::Error;

#[derive(Parser)]
#[command(name = "clinicnote")]
#[command(about = "Offline-first clinic records from the command line")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Optional data directory for the local store
    #[arg(long, value_name = "PATH")]
    data_dir: Option<PathBuf>,

    /// User whose storage namespace to open (default: $CLINICNOTE_USER or "local")
    #[arg(long)]
    user: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Save a record locally (JSON payload)
    #[command(alias = "new")]
    Add {
        /// Entity type: clinic, appointment, memo, doctor_memo
        entity: String,
        /// Record payload as JSON
        payload: String,
    },
    /// Show one record
    Get {
        /// Entity type
        entity: String,
        /// Record id
        id: String,
    },
    /// List records of one type
    List {
        /// Entity type
        entity: String,
        /// Output full documents as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a record (tombstoned until the remote delete is acknowledged)
    Delete {
        /// Entity type
        entity: String,
        /// Record id
        id: String,
    },
    /// Run one reconciliation pass against the remote authority
    Sync,
    /// Show pending (unsynced) documents
    Status,
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Core(#[from] clinicnote_core::Error),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Payload must be a JSON object")]
    PayloadNotObject,
    #[error("Record not found: {0}")]
    RecordNotFound(String),
    #[error(
        "Sync is not configured. Set CLINICNOTE_API_URL, CLINICNOTE_TOKEN, and CLINICNOTE_BASIC_AUTH to enable `clinicnote sync`."
    )]
    SyncNotConfigured,
}

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("clinicnote=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let user_id = resolve_user(cli.user);
    let data_dir = resolve_data_dir(cli.data_dir);
    let store = DocumentStore::open(&data_dir, &user_id)?;

    match cli.command {
        Commands::Add { entity, payload } => run_add(&store, &entity, &payload).await?,
        Commands::Get { entity, id } => run_get(&store, &entity, &id).await?,
        Commands::List { entity, json } => run_list(&store, &entity, json).await?,
        Commands::Delete { entity, id } => run_delete(&store, &entity, &id).await?,
        Commands::Sync => run_sync(store, &user_id).await?,
        Commands::Status => run_status(&store).await?,
    }

    Ok(())
}

fn resolve_user(flag: Option<String>) -> String {
    flag.or_else(|| env::var("CLINICNOTE_USER").ok())
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| "local".to_string())
}

fn resolve_data_dir(flag: Option<PathBuf>) -> PathBuf {
    flag.or_else(|| env::var("CLINICNOTE_DATA_DIR").ok().map(PathBuf::from))
        .or_else(|| dirs::data_local_dir().map(|dir| dir.join("clinicnote")))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn parse_entity(raw: &str) -> Result<EntityType, CliError> {
    raw.parse::<EntityType>().map_err(CliError::Core)
}

async fn run_add(store: &DocumentStore, entity: &str, payload: &str) -> Result<(), CliError> {
    let entity_type = parse_entity(entity)?;
    let payload: Value = serde_json::from_str(payload)?;
    if !payload.is_object() {
        return Err(CliError::PayloadNotObject);
    }

    let doc = store.save(entity_type, payload).await?;
    println!("{}", doc.key.entity_id);
    Ok(())
}

async fn run_get(store: &DocumentStore, entity: &str, id: &str) -> Result<(), CliError> {
    let entity_type = parse_entity(entity)?;
    let doc = store
        .get(entity_type, id)
        .await?
        .ok_or_else(|| CliError::RecordNotFound(format!("{entity_type}/{id}")))?;

    println!("{}", serde_json::to_string_pretty(&doc)?);
    Ok(())
}

async fn run_list(store: &DocumentStore, entity: &str, as_json: bool) -> Result<(), CliError> {
    let entity_type = parse_entity(entity)?;
    let docs = store.get_all(entity_type).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&docs)?);
    } else {
        for doc in &docs {
            let status = if doc.is_pending() { "pending" } else { "synced" };
            println!("{}\t{}\t{}", doc.key.entity_id, status, doc.payload);
        }
    }

    Ok(())
}

async fn run_delete(store: &DocumentStore, entity: &str, id: &str) -> Result<(), CliError> {
    let entity_type = parse_entity(entity)?;
    let tombstone = store.delete(entity_type, id).await?;

    if tombstone.is_some() {
        println!("Deleted locally; remote delete pending next sync");
    } else {
        println!("Deleted");
    }
    Ok(())
}

async fn run_sync(store: DocumentStore, user_id: &str) -> Result<(), CliError> {
    let config = remote_config(user_id)?;
    let gateway = HttpRemoteGateway::new(&config.base_url, config.credentials.clone())?;

    // A CLI invocation is online by definition; a dead link surfaces as
    // gateway failures in the pass summary.
    let monitor = ConnectivityMonitor::new(ConnectivityState::Online);
    let engine = SyncEngine::new(store, Arc::new(gateway), monitor, config.sync_interval);

    match engine.sync_now().await? {
        SyncOutcome::Completed(summary) => {
            println!(
                "Synced: {} pulled, {} pushed, {} conflicts skipped, {} failures",
                summary.pulled, summary.pushed, summary.conflicts_skipped, summary.failures
            );
        }
        SyncOutcome::AlreadySyncing => println!("Sync already in progress"),
    }

    Ok(())
}

async fn run_status(store: &DocumentStore) -> Result<(), CliError> {
    let pending = store.list_unsynced().await?;

    if pending.is_empty() {
        println!("All documents synced");
    } else {
        for doc in &pending {
            let action = if doc.deleted { "delete" } else { "push" };
            println!("{}\t{action}", doc.key);
        }
    }
    Ok(())
}

fn remote_config(user_id: &str) -> Result<ClientConfig, CliError> {
    let base_url = non_empty_env("CLINICNOTE_API_URL");
    let token = non_empty_env("CLINICNOTE_TOKEN");
    let secret = non_empty_env("CLINICNOTE_BASIC_AUTH");

    let (Some(base_url), Some(token), Some(secret)) = (base_url, token, secret) else {
        return Err(CliError::SyncNotConfigured);
    };

    let credentials = Credentials::new(token, secret)?;
    let mut config = ClientConfig::new(base_url, user_id, credentials)?;

    if let Some(interval) = non_empty_env("CLINICNOTE_SYNC_INTERVAL_SECS")
        .and_then(|value| value.parse::<u64>().ok())
    {
        config = config.with_sync_interval(Duration::from_secs(interval));
    }

    Ok(config)
}

fn non_empty_env(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
