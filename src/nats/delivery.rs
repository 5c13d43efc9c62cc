use anyhow::{Context, Result};
use async_nats::Client;
use tokio::sync::OnceCell;
use tracing::info;

use crate::delivery::{Delivery, DeliveryPayload};

/// Publishes finished sessions as JSON on a fixed subject
pub struct NatsDelivery {
    url: String,
    subject: String,
    client: OnceCell<Client>,
}

impl NatsDelivery {
    pub fn new(url: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            subject: subject.into(),
            client: OnceCell::new(),
        }
    }
}

#[async_trait::async_trait]
impl Delivery for NatsDelivery {
    async fn deliver(&self, payload: &DeliveryPayload) -> Result<()> {
        let client = self
            .client
            .get_or_try_init(|| async {
                async_nats::connect(self.url.as_str())
                    .await
                    .context("Failed to connect to NATS")
            })
            .await?;

        let body = serde_json::to_vec(payload).context("Failed to encode payload")?;
        client
            .publish(self.subject.clone(), body.into())
            .await
            .context("Failed to publish session payload")?;
        client.flush().await.context("Failed to flush NATS connection")?;

        info!("Published session {} to {}", payload.session_id, self.subject);
        Ok(())
    }

    fn name(&self) -> &str {
        "nats"
    }
}
