//! Command line and environment configuration of the oracle service.

use crate::node::RetryPolicy;
use crate::sync::SyncConfig;

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Parser)]
#[command(name = "oracle-sync", about = "Validates oracle token and unique asset transactions")]
pub struct Config {
	/// JSON-RPC endpoint of the bitcoind-compatible node
	#[arg(long, env = "ORACLE_RPC_URL", default_value = "http://127.0.0.1:8332")]
	pub rpc_url: String,

	#[arg(long, env = "ORACLE_RPC_USER", default_value = "")]
	pub rpc_user: String,

	#[arg(long, env = "ORACLE_RPC_PASSWORD", default_value = "", hide_env_values = true)]
	pub rpc_password: String,

	/// Directory holding the sync checkpoint and the storage journals
	#[arg(long, env = "ORACLE_DATA_DIR", default_value = "./data")]
	pub data_dir: PathBuf,

	/// Lowest block height to crawl from
	#[arg(long, env = "ORACLE_START_HEIGHT", default_value_t = 0)]
	pub start_height: u64,

	#[arg(long, env = "ORACLE_MAX_CONCURRENCY", default_value_t = 10)]
	pub max_concurrency: usize,

	/// Seconds between periodic resyncs
	#[arg(long, env = "ORACLE_POLL_INTERVAL_SECS", default_value_t = 60)]
	pub poll_interval_secs: u64,

	#[arg(long, env = "ORACLE_RETRY_MAX_ATTEMPTS", default_value_t = 5)]
	pub retry_max_attempts: u32,

	#[arg(long, env = "ORACLE_RETRY_INITIAL_MS", default_value_t = 500)]
	pub retry_initial_ms: u64,

	#[arg(long, env = "ORACLE_RETRY_MULTIPLIER", default_value_t = 2.0)]
	pub retry_multiplier: f64,

	#[arg(long, env = "ORACLE_RETRY_MAX_MS", default_value_t = 30_000)]
	pub retry_max_ms: u64,

	/// Randomization factor applied to each retry interval, between 0 and 1
	#[arg(long, env = "ORACLE_RETRY_JITTER", default_value_t = 0.25)]
	pub retry_jitter: f64,
}

impl Config {
	pub fn retry_policy(&self) -> RetryPolicy {
		RetryPolicy {
			max_attempts: self.retry_max_attempts.max(1),
			initial_interval: Duration::from_millis(self.retry_initial_ms),
			multiplier: self.retry_multiplier.max(1.0),
			max_interval: Duration::from_millis(self.retry_max_ms),
			jitter: self.retry_jitter.clamp(0.0, 1.0),
		}
	}

	pub fn sync_config(&self) -> SyncConfig {
		SyncConfig {
			start_height: self.start_height,
			max_concurrency: self.max_concurrency.max(1),
			poll_interval: Duration::from_secs(self.poll_interval_secs.max(1)),
			retry: self.retry_policy(),
		}
	}
}
