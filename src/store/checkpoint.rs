use super::{CheckpointRepository, StoreError};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info};

const CHECKPOINT_FILENAME: &str = "sync_checkpoint.json";

#[derive(Debug, Serialize, Deserialize)]
struct CheckpointFile {
	sync_height: u64,
	timestamp: String,
}

/// File-based implementation of CheckpointRepository
///
/// The checkpoint is rewritten through a temporary file and a rename, so a crash mid-write
/// leaves the previous height in place.
pub struct FileCheckpointRepository {
	data_dir: PathBuf,
}

impl FileCheckpointRepository {
	pub fn new(data_dir: PathBuf) -> Self {
		Self { data_dir }
	}

	fn get_checkpoint_filename(&self) -> PathBuf {
		self.data_dir.join(CHECKPOINT_FILENAME)
	}
}

#[async_trait::async_trait]
impl CheckpointRepository for FileCheckpointRepository {
	async fn get(&self) -> Result<u64, StoreError> {
		let filename = self.get_checkpoint_filename();
		let content = match tokio::fs::read_to_string(&filename).await {
			Ok(content) => content,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				debug!("No checkpoint at {:?}, starting from zero", filename);
				return Ok(0);
			}
			Err(e) => return Err(e.into()),
		};

		let checkpoint: CheckpointFile = serde_json::from_str(&content)?;
		info!(
			"Loaded checkpoint {} written at {}",
			checkpoint.sync_height, checkpoint.timestamp
		);
		Ok(checkpoint.sync_height)
	}

	async fn set(&self, height: u64) -> Result<(), StoreError> {
		tokio::fs::create_dir_all(&self.data_dir).await?;

		let checkpoint = CheckpointFile {
			sync_height: height,
			timestamp: chrono::Utc::now().to_rfc3339(),
		};
		let content = serde_json::to_string_pretty(&checkpoint)?;

		let filename = self.get_checkpoint_filename();
		let temp_filename = filename.with_extension("json.tmp");
		tokio::fs::write(&temp_filename, content).await?;
		tokio::fs::rename(&temp_filename, &filename).await?;

		debug!("Checkpoint saved at height {}", height);
		Ok(())
	}
}
