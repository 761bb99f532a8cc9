use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use mvirt_backup::{BackupConfig, BackupManager, PolicyResponse, SqliteStore, create_audit_logger};

#[derive(Parser)]
#[command(name = "mvirt-backup")]
#[command(about = "mvirt backup policy manager")]
struct Args {
    /// Backup configuration file (providers and zone settings)
    #[arg(short, long, default_value = "/etc/mvirt/backup.json")]
    config: PathBuf,

    /// Data directory for the policy database
    #[arg(short, long, default_value = "/var/lib/mvirt/backup")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a provider policy
    Add {
        /// Policy ID on the provider side
        #[arg(long)]
        policy_id: String,

        /// Name for the policy
        #[arg(short, long)]
        name: String,

        /// Zone ID (optional if only one provider is active)
        #[arg(short, long)]
        zone: Option<String>,
    },

    /// List imported policies
    List,

    /// Stop tracking an imported policy
    Delete {
        /// Internal policy ID
        id: String,
    },

    /// List policies existing on the provider
    ProviderPolicies {
        /// Zone ID
        #[arg(short, long)]
        zone: Option<String>,
    },

    /// Assign a VM to a provider policy
    Assign {
        /// Policy ID on the provider side
        #[arg(long)]
        policy_id: String,

        /// VM ID
        #[arg(long)]
        vm: String,

        /// Zone ID
        #[arg(short, long)]
        zone: String,
    },

    /// Compare imported policies with the provider
    Reconcile {
        /// Zone ID
        #[arg(short, long)]
        zone: Option<String>,
    },

    /// List registered providers and zone settings
    Providers,
}

#[derive(Serialize)]
struct ProviderRow {
    name: String,
    description: String,
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive("mvirt_backup=info".parse()?))
        .init();

    let args = Args::parse();

    let config = BackupConfig::load(&args.config).await?;
    let registry = Arc::new(config.build_registry()?);

    tokio::fs::create_dir_all(&args.data_dir)
        .await
        .with_context(|| format!("Failed to create {}", args.data_dir.display()))?;
    let data_dir = args
        .data_dir
        .to_str()
        .context("Data directory must be valid UTF-8")?;
    let store = Arc::new(SqliteStore::new(data_dir).await?);

    info!(
        providers = registry.providers().len(),
        zones = registry.zones().len(),
        "Initialized mvirt-backup"
    );

    let manager = BackupManager::new(store, registry, create_audit_logger());

    match args.command {
        Commands::Add {
            policy_id,
            name,
            zone,
        } => {
            let policy = manager
                .add_backup_policy(&policy_id, &name, zone.as_deref())
                .await?;
            print_json(&manager.create_backup_policy_response(&policy))?;
        }
        Commands::List => {
            let policies = manager.list_backup_policies().await?;
            let responses: Vec<PolicyResponse> =
                policies.iter().map(PolicyResponse::from).collect();
            print_json(&responses)?;
        }
        Commands::Delete { id } => {
            if !manager.delete_backup_policy(&id).await? {
                anyhow::bail!("Unable to remove backup policy: {}", id);
            }
            print_json(&serde_json::json!({ "success": true }))?;
        }
        Commands::ProviderPolicies { zone } => {
            let policies = manager
                .list_backup_provider_policies(zone.as_deref())
                .await?;
            let responses: Vec<PolicyResponse> =
                policies.iter().map(PolicyResponse::from).collect();
            print_json(&responses)?;
        }
        Commands::Assign {
            policy_id,
            vm,
            zone,
        } => {
            if !manager
                .assign_vm_to_backup_policy(&policy_id, &vm, Some(&zone))
                .await?
            {
                anyhow::bail!("Failed to assign VM {} to backup policy {}", vm, policy_id);
            }
            print_json(&serde_json::json!({ "success": true }))?;
        }
        Commands::Reconcile { zone } => {
            let report = manager.reconcile_policies(zone.as_deref()).await?;
            print_json(&report)?;
        }
        Commands::Providers => {
            let providers: Vec<ProviderRow> = manager
                .registry()
                .providers()
                .iter()
                .map(|p| ProviderRow {
                    name: p.name().to_string(),
                    description: p.description().to_string(),
                })
                .collect();
            print_json(&serde_json::json!({
                "providers": providers,
                "zones": manager.registry().zones(),
            }))?;
        }
    }

    Ok(())
}
