use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

use oracle_sync::cache::UtxoCache;
use oracle_sync::config::Config;
use oracle_sync::node::BitcoindRpcClient;
use oracle_sync::oracle::{OracleProcessor, ProcessorContext};
use oracle_sync::store::{FileCheckpointRepository, FileTransactionRepository, OracleStore};
use oracle_sync::sync::{ChainSyncEngine, UnconfirmedSet};

#[tokio::main]
async fn main() -> ExitCode {
	tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
		)
		.with_target(false)
		.with_thread_ids(false)
		.with_thread_names(false)
		.with_file(false)
		.with_line_number(false)
		.with_timer(tracing_subscriber::fmt::time::time())
		.init();

	let config = Config::parse();
	info!("Starting oracle sync service against {}", config.rpc_url);

	let credentials = |value: &str| (!value.is_empty()).then(|| value.to_string());
	let node = match BitcoindRpcClient::new(
		config.rpc_url.clone(),
		credentials(&config.rpc_user),
		credentials(&config.rpc_password),
	) {
		Ok(node) => Arc::new(node),
		Err(e) => {
			error!("Failed to create node client: {}", e);
			return ExitCode::FAILURE;
		}
	};

	let sync_config = config.sync_config();
	let store = match OracleStore::open(&config.data_dir).await {
		Ok(store) => store,
		Err(e) => {
			error!("Failed to open oracle store: {}", e);
			return ExitCode::FAILURE;
		}
	};
	let transactions = match FileTransactionRepository::open(&config.data_dir).await {
		Ok(transactions) => Arc::new(transactions),
		Err(e) => {
			error!("Failed to open transaction store: {}", e);
			return ExitCode::FAILURE;
		}
	};
	let cache = Arc::new(UtxoCache::new());
	let oracle = Arc::new(OracleProcessor::new(ProcessorContext::new(
		store,
		cache,
		sync_config.max_concurrency,
	)));

	let engine = ChainSyncEngine::new(
		node,
		oracle,
		transactions,
		Arc::new(FileCheckpointRepository::new(config.data_dir.clone())),
		Arc::new(UnconfirmedSet::new()),
		sync_config,
	);

	info!("Created chain sync engine, data directory {}", config.data_dir.display());

	// No push notification source is wired; the poll interval drives both block and mempool sync.
	tokio::select! {
		result = engine.run(None) => {
			if let Err(e) = result {
				error!("Sync stopped: {}", e);
				return ExitCode::FAILURE;
			}
		}
		_ = tokio::signal::ctrl_c() => {
			info!("Shutting down");
		}
	}

	let stats = engine.stats().await;
	info!("{}", stats.summary());
	ExitCode::SUCCESS
}
