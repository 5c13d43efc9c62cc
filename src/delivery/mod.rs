//! Hand-off of a finished conversation to an external collaborator
//!
//! Delivery is at-most-once and best-effort: the engine spawns it after
//! teardown and only logs failures.

mod file;

pub use file::FileDelivery;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::audio::codec::base64_bytes;
use crate::audio::SessionRecorder;
use crate::error::EngineError;
use crate::session::tools::LeadRecord;
use crate::session::transcript::Utterance;

/// Everything produced by one completed session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryPayload {
    pub session_id: String,
    pub lead_record: LeadRecord,
    pub transcript: Vec<Utterance>,
    pub duration_seconds: u32,
    /// Mixed recording as a WAV file, base64 in JSON
    #[serde(with = "base64_bytes")]
    pub audio_payload: Vec<u8>,
}

#[async_trait::async_trait]
pub trait Delivery: Send + Sync {
    async fn deliver(&self, payload: &DeliveryPayload) -> Result<()>;

    fn name(&self) -> &str;
}

/// Discards payloads; used when no delivery target is configured
pub struct NoDelivery;

#[async_trait::async_trait]
impl Delivery for NoDelivery {
    async fn deliver(&self, payload: &DeliveryPayload) -> Result<()> {
        info!("Delivery disabled, dropping payload for {}", payload.session_id);
        Ok(())
    }

    fn name(&self) -> &str {
        "none"
    }
}

/// A torn-down session waiting to be rendered and delivered
pub struct CompletedSession {
    pub session_id: String,
    pub lead_record: LeadRecord,
    pub transcript: Vec<Utterance>,
    pub duration_seconds: u32,
    pub recording: SessionRecorder,
}

/// Render the recording and deliver it in the background
///
/// Never blocks the caller; failures are logged and dropped.
pub fn spawn_delivery(
    delivery: Arc<dyn Delivery>,
    completed: CompletedSession,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let CompletedSession {
            session_id,
            lead_record,
            transcript,
            duration_seconds,
            recording,
        } = completed;

        let audio_payload = match tokio::task::spawn_blocking(move || recording.render_wav()).await
        {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => {
                warn!("Failed to render recording for {}: {:#}", session_id, e);
                Vec::new()
            }
            Err(e) => {
                warn!("Recording render task for {} panicked: {}", session_id, e);
                Vec::new()
            }
        };

        let payload = DeliveryPayload {
            session_id,
            lead_record,
            transcript,
            duration_seconds,
            audio_payload,
        };

        match delivery.deliver(&payload).await {
            Ok(()) => info!(
                "Delivered session {} via {} ({} utterances, {}s)",
                payload.session_id,
                delivery.name(),
                payload.transcript.len(),
                payload.duration_seconds
            ),
            Err(e) => error!(
                "Delivery of session {} via {} failed: {}",
                payload.session_id,
                delivery.name(),
                EngineError::Delivery(format!("{:#}", e))
            ),
        }
    })
}
