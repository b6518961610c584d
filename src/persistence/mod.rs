use std::path::{Path, PathBuf};

use crate::error::StateStoreError;
use crate::models::BotState;

/// Crash-safe snapshot store for the full trading context.
///
/// Snapshots are single JSON documents written through a temp file and
/// an atomic rename, so a crash mid-write leaves the previous snapshot
/// intact. A missing file is a fresh start; a file that exists but does
/// not decode is surfaced as corrupt and aborts startup.
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn save(&self, state: &BotState) -> Result<(), StateStoreError> {
        let payload = serde_json::to_vec_pretty(state).map_err(StateStoreError::Encode)?;

        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, &payload).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        tracing::debug!(
            "state snapshot saved to {} ({} pending orders)",
            self.path.display(),
            state.pending.len()
        );
        Ok(())
    }

    pub async fn load(&self) -> Result<Option<BotState>, StateStoreError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("no state file at {}, starting fresh", self.path.display());
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let state: BotState =
            serde_json::from_slice(&bytes).map_err(|source| StateStoreError::Corrupt {
                path: self.path.clone(),
                source,
            })?;

        tracing::info!(
            "restored state from {}: balance {:.2}, {} assets, {} pending orders",
            self.path.display(),
            state.account.balance,
            state.assets.len(),
            state.pending.len()
        );
        Ok(Some(state))
    }
}
