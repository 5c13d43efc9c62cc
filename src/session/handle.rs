use tokio::sync::{mpsc, oneshot, watch};
use tracing::debug;

use super::engine::Command;
use super::state::{SessionSnapshot, SessionStatus};
use crate::error::{EngineError, Result};

/// Cloneable control surface for a running [`VoiceEngine`](super::VoiceEngine)
///
/// Commands are queued to the engine task and answered once it has handled
/// them; observable state is read from the engine's watch channel.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<SessionSnapshot>,
}

impl SessionHandle {
    pub(crate) fn new(
        commands: mpsc::Sender<Command>,
        state: watch::Receiver<SessionSnapshot>,
    ) -> Self {
        Self { commands, state }
    }

    /// Start a session, returning its id once the devices and transport are acquired
    ///
    /// The session is `Connecting` at this point; it becomes `Connected`
    /// when the transport confirms.
    pub async fn start_session(&self) -> Result<String> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Start(reply))
            .await
            .map_err(|_| EngineError::EngineStopped)?;
        rx.await.map_err(|_| EngineError::EngineStopped)?
    }

    /// End the current session, if any; resolves after teardown finished
    pub async fn stop_session(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Stop(reply))
            .await
            .map_err(|_| EngineError::EngineStopped)?;
        rx.await.map_err(|_| EngineError::EngineStopped)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.clone()
    }

    /// Wait until the published status equals `status`
    pub async fn wait_for_status(&self, status: SessionStatus) -> Result<SessionSnapshot> {
        let mut rx = self.state.clone();
        let snapshot = rx
            .wait_for(|snapshot| snapshot.status == status)
            .await
            .map_err(|_| EngineError::EngineStopped)?;
        debug!("Observed session status {}", status.as_str());
        Ok(snapshot.clone())
    }
}
