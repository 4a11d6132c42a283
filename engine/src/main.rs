use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use alloy::providers::{Provider, ProviderBuilder};
use clap::{Parser, Subcommand};
use tracing::info;

use fleetcast_commons::env::load_env;
use fleetcast_commons::error::format_with_code;
use fleetcast_commons::telemetry::{init_telemetry_from_env, init_telemetry_from_env_with_log_file};
use fleetcast_connectors::bundler::HttpBundlerClient;
use fleetcast_connectors::context::{EvmContextProvider, TokenMetadataCache};
use fleetcast_connectors::signer::HttpThresholdSigner;
use fleetcast_core::state::{TargetStatus, TxStatus};
use fleetcast_core::template::{ResolveOptions, Template};
use fleetcast_engine::config::Config;
use fleetcast_engine::driver::ExecutionDriver;
use fleetcast_engine::members::{load_members, select_members};
use fleetcast_engine::poller::ConfirmationPoller;
use fleetcast_engine::store::sqlite::SqliteFleetStore;

#[derive(Parser)]
#[command(name = "fleetcast")]
#[command(about = "Fleet transaction engine: dispatch templated operations across member wallets.")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Starts the confirmation daemon loop
    Run {
        /// Optional local log file; defaults to stdout logs
        #[arg(long)]
        log_file: Option<PathBuf>,
    },

    /// Dispatches a template to member wallets and prints the transaction id
    Dispatch {
        /// Path to the template JSON file
        #[arg(long)]
        template: PathBuf,
        /// Comma-separated member ids; omit to target the whole roster
        #[arg(long, value_delimiter = ',')]
        members: Vec<String>,
    },

    /// Shows a dispatched transaction and its per-member targets
    Status {
        #[arg(long)]
        id: String,
    },
}

#[tokio::main]
async fn main() {
    load_env();
    let cli = Cli::parse();

    let _telemetry_guard = match &cli.command {
        Commands::Run { log_file } => match init_telemetry_from_env_with_log_file(log_file.as_deref()) {
            Ok(guard) => guard,
            Err(err) => {
                eprintln!("Failed to initialize telemetry: {err}");
                return;
            }
        },
        _ => match init_telemetry_from_env() {
            Ok(guard) => guard,
            Err(err) => {
                eprintln!("Failed to initialize telemetry: {err}");
                return;
            }
        },
    };

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Configuration error: {}", format_with_code(&err));
            return;
        }
    };

    let result = match cli.command {
        Commands::Run { .. } => run_daemon(&config).await,
        Commands::Dispatch { template, members } => dispatch(&config, &template, &members).await,
        Commands::Status { id } => status(&config, &id).await,
    };
    if let Err(err) = result {
        eprintln!("{err:#}");
    }
}

struct Wiring {
    driver: Arc<
        ExecutionDriver<
            EvmContextProvider<alloy::providers::DynProvider>,
            HttpThresholdSigner,
            HttpBundlerClient,
            SqliteFleetStore,
        >,
    >,
    bundler: Arc<HttpBundlerClient>,
    store: Arc<SqliteFleetStore>,
}

fn build_wiring(config: &Config) -> anyhow::Result<Wiring> {
    let timeout = Duration::from_secs(config.http_timeout_secs);

    let rpc_url = config.evm_rpc_url.parse()?;
    let provider = ProviderBuilder::new().connect_http(rpc_url).erased();
    let context = Arc::new(EvmContextProvider::new(
        provider,
        TokenMetadataCache::new(Duration::from_secs(600)),
    ));

    let signer = Arc::new(HttpThresholdSigner::new(&config.signer_url, timeout)?);
    let bundler = Arc::new(HttpBundlerClient::new(&config.bundler_url, timeout)?);
    let store = Arc::new(SqliteFleetStore::new(&config.db_path)?);

    let driver = Arc::new(ExecutionDriver::new(
        context,
        signer,
        Arc::clone(&bundler),
        Arc::clone(&store),
        ResolveOptions {
            fail_on_zero_amount: config.fail_on_zero_amount,
        },
        config.chain_id,
    ));

    Ok(Wiring { driver, bundler, store })
}

async fn run_daemon(config: &Config) -> anyhow::Result<()> {
    let wiring = build_wiring(config)?;
    let poller = ConfirmationPoller::new(
        wiring.store,
        wiring.bundler,
        Duration::from_secs(config.poll_interval_secs),
    );

    info!(interval_secs = config.poll_interval_secs, "confirmation poller started");
    tokio::select! {
        _ = poller.run() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }
    Ok(())
}

async fn dispatch(config: &Config, template_path: &PathBuf, member_ids: &[String]) -> anyhow::Result<()> {
    let raw = tokio::fs::read_to_string(template_path).await?;
    let template: Template = serde_json::from_str(&raw)?;

    let roster = load_members(&config.members_file)?;
    let members = select_members(&roster, member_ids)?;

    let wiring = build_wiring(config)?;
    let transaction_id = wiring
        .driver
        .dispatch(template, members)
        .await
        .map_err(|e| anyhow::anyhow!(format_with_code(&e)))?;
    println!("{transaction_id}");

    // The per-member work is detached; give it a chance to finish before the
    // process (and its runtime) goes away. Progress is durable either way.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(config.http_timeout_secs * 2);
    loop {
        tokio::time::sleep(Duration::from_millis(200)).await;
        let Some(view) = wiring.driver.get_status(&transaction_id).await.ok().flatten() else {
            break;
        };
        let in_flight = view.targets.iter().any(|t| t.status == TargetStatus::Pending);
        if !in_flight || tokio::time::Instant::now() >= deadline {
            break;
        }
    }
    Ok(())
}

async fn status(config: &Config, id: &str) -> anyhow::Result<()> {
    let wiring = build_wiring(config)?;
    let Some(view) = wiring
        .driver
        .get_status(id)
        .await
        .map_err(|e| anyhow::anyhow!(format_with_code(&e)))?
    else {
        anyhow::bail!("no transaction with id {id}");
    };

    let tx = &view.transaction;
    println!("transaction {} status={} targets={}", tx.id, tx.status, view.targets.len());
    for target in &view.targets {
        let detail = match target.status {
            TargetStatus::Confirmed => target.chain_tx_hash.clone().unwrap_or_default(),
            TargetStatus::Failed => target.error.clone().unwrap_or_default(),
            _ => target.op_handle.clone().unwrap_or_default(),
        };
        println!(
            "  {} {} status={} {}",
            target.member_id, target.wallet_address, target.status, detail
        );
    }
    if tx.status == TxStatus::Pending && view.targets.is_empty() {
        println!("  (no targets recorded)");
    }
    Ok(())
}
