use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::info;

use super::{Delivery, DeliveryPayload};

/// Writes each payload as `<dir>/<sessionId>.json`
pub struct FileDelivery {
    output_dir: PathBuf,
}

impl FileDelivery {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn path_for(&self, session_id: &str) -> PathBuf {
        self.output_dir.join(format!("{}.json", session_id))
    }
}

#[async_trait::async_trait]
impl Delivery for FileDelivery {
    async fn deliver(&self, payload: &DeliveryPayload) -> Result<()> {
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .context("Failed to create delivery directory")?;

        let path = self.path_for(&payload.session_id);
        let body = serde_json::to_vec_pretty(payload).context("Failed to encode payload")?;

        tokio::fs::write(&path, body)
            .await
            .with_context(|| format!("Failed to write payload to {}", path.display()))?;

        info!("Session payload written to {}", path.display());
        Ok(())
    }

    fn name(&self) -> &str {
        "file"
    }
}
