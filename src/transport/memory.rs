//! In-process transport backed by channels
//!
//! Each `open` hands the engine one end of a fresh channel pair and publishes
//! the other end as a [`RemoteEnd`], which plays the remote agent: it sees
//! everything the engine sends and can inject events.

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::info;

use super::{Outbound, SessionSetup, Transport, TransportEvent, TransportLink};

/// The remote agent's side of an in-memory session
pub struct RemoteEnd {
    pub setup: SessionSetup,
    pub events: mpsc::Sender<TransportEvent>,
    pub outbound: mpsc::Receiver<Outbound>,
}

impl RemoteEnd {
    pub async fn send(&self, event: TransportEvent) -> Result<()> {
        self.events
            .send(event)
            .await
            .map_err(|_| anyhow::anyhow!("engine side of the transport is gone"))
    }

    /// Everything the engine has sent so far
    pub fn drain(&mut self) -> Vec<Outbound> {
        let mut sent = Vec::new();
        while let Ok(message) = self.outbound.try_recv() {
            sent.push(message);
        }
        sent
    }
}

pub struct MemoryTransport {
    capacity: usize,
    remotes: mpsc::UnboundedSender<RemoteEnd>,
    fail_next_open: Arc<Mutex<Option<String>>>,
    opened: bool,
}

impl MemoryTransport {
    /// Create a transport and the receiver of remote ends, one per opened session
    pub fn new(capacity: usize) -> (Self, mpsc::UnboundedReceiver<RemoteEnd>) {
        let (remotes, rx) = mpsc::unbounded_channel();
        (
            Self {
                capacity,
                remotes,
                fail_next_open: Arc::new(Mutex::new(None)),
                opened: false,
            },
            rx,
        )
    }

    /// Handle making the next `open` fail with `message`
    pub fn failure_switch(&self) -> Arc<Mutex<Option<String>>> {
        Arc::clone(&self.fail_next_open)
    }
}

#[async_trait::async_trait]
impl Transport for MemoryTransport {
    async fn open(&mut self, setup: &SessionSetup) -> Result<TransportLink> {
        if let Some(message) = self.fail_next_open.lock().await.take() {
            anyhow::bail!(message);
        }

        let (outbound_tx, outbound_rx) = mpsc::channel(self.capacity);
        let (event_tx, event_rx) = mpsc::channel(self.capacity);

        self.remotes
            .send(RemoteEnd {
                setup: setup.clone(),
                events: event_tx,
                outbound: outbound_rx,
            })
            .map_err(|_| anyhow::anyhow!("nobody is listening for remote ends"))?;

        self.opened = true;
        info!("Memory transport opened for {}", setup.session_id);

        Ok(TransportLink {
            outbound: outbound_tx,
            inbound: event_rx,
        })
    }

    async fn close(&mut self) -> Result<()> {
        if self.opened {
            self.opened = false;
            info!("Memory transport closed");
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
