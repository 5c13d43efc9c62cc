use anyhow::{Context, Result};
use async_nats::Client;
use futures::stream::StreamExt;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::messages::{ClientMessage, ServerMessage, SetupMessage};
use crate::transport::{Outbound, SessionSetup, Transport, TransportEvent, TransportLink};

/// Upper bound on draining buffered publishes when a session closes
const FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// Subjects used by one session
///
/// `<prefix>.<session>.setup` carries the setup, `.out` everything the engine
/// sends, and the agent replies on `.in`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSubjects {
    pub setup: String,
    pub outbound: String,
    pub inbound: String,
}

impl SessionSubjects {
    pub fn new(prefix: &str, session_id: &str) -> Self {
        Self {
            setup: format!("{}.{}.setup", prefix, session_id),
            outbound: format!("{}.{}.out", prefix, session_id),
            inbound: format!("{}.{}.in", prefix, session_id),
        }
    }
}

/// Transport relaying a session to a remote agent bridge over NATS
pub struct NatsTransport {
    url: String,
    subject_prefix: String,
    capacity: usize,
    client: Option<Client>,
    writer_handle: Option<JoinHandle<()>>,
    reader_handle: Option<JoinHandle<()>>,
}

impl NatsTransport {
    pub fn new(url: impl Into<String>, subject_prefix: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            subject_prefix: subject_prefix.into(),
            capacity: 64,
            client: None,
            writer_handle: None,
            reader_handle: None,
        }
    }

    async fn client(&mut self) -> Result<Client> {
        if let Some(client) = &self.client {
            return Ok(client.clone());
        }

        info!("Connecting to NATS at {}", self.url);
        let client = async_nats::connect(self.url.as_str())
            .await
            .context("Failed to connect to NATS")?;
        info!("Connected to NATS successfully");

        self.client = Some(client.clone());
        Ok(client)
    }
}

#[async_trait::async_trait]
impl Transport for NatsTransport {
    async fn open(&mut self, setup: &SessionSetup) -> Result<TransportLink> {
        let client = self.client().await?;
        let subjects = SessionSubjects::new(&self.subject_prefix, &setup.session_id);

        // Subscribe before announcing so the agent's first reply is not missed
        let mut subscriber = client
            .subscribe(subjects.inbound.clone())
            .await
            .context("Failed to subscribe to inbound subject")?;

        let message = SetupMessage {
            setup: setup.clone(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        client
            .publish(subjects.setup.clone(), serde_json::to_vec(&message)?.into())
            .await
            .context("Failed to publish session setup")?;
        info!("Published session setup to {}", subjects.setup);

        let (outbound_tx, mut outbound_rx) = mpsc::channel::<Outbound>(self.capacity);
        let (event_tx, event_rx) = mpsc::channel::<TransportEvent>(self.capacity);

        let session_id = setup.session_id.clone();
        let writer_client = client.clone();
        let outbound_subject = subjects.outbound.clone();
        self.writer_handle = Some(tokio::spawn(async move {
            while let Some(outbound) = outbound_rx.recv().await {
                let message = ClientMessage::from_outbound(&session_id, outbound);
                let payload = match serde_json::to_vec(&message) {
                    Ok(payload) => payload,
                    Err(e) => {
                        error!("Failed to encode outbound message: {}", e);
                        continue;
                    }
                };
                if let Err(e) = writer_client
                    .publish(outbound_subject.clone(), payload.into())
                    .await
                {
                    warn!("Failed to publish to {}: {}", outbound_subject, e);
                }
            }
            debug!("Outbound writer for {} finished", session_id);
        }));

        self.reader_handle = Some(tokio::spawn(async move {
            while let Some(msg) = subscriber.next().await {
                let event = match serde_json::from_slice::<ServerMessage>(&msg.payload) {
                    Ok(message) => message.into_event(),
                    Err(e) => {
                        warn!("Failed to parse inbound message: {}", e);
                        continue;
                    }
                };

                if event_tx.send(event).await.is_err() {
                    return;
                }
            }
            let _ = event_tx.send(TransportEvent::Closed).await;
        }));

        Ok(TransportLink {
            outbound: outbound_tx,
            inbound: event_rx,
        })
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(handle) = self.reader_handle.take() {
            handle.abort();
        }
        if let Some(handle) = self.writer_handle.take() {
            handle.abort();
        }
        if let Some(client) = &self.client {
            tokio::time::timeout(FLUSH_TIMEOUT, client.flush())
                .await
                .context("Timed out flushing NATS connection")?
                .context("Failed to flush NATS connection")?;
            info!("NATS transport closed");
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "nats"
    }
}
