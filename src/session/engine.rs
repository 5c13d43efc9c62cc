//! The session state machine
//!
//! One engine task owns every piece of per-session state and serializes all
//! activity onto a single control path: commands from the application,
//! capture frames, transport events, playback completions and timer
//! deadlines are awaited in one `select!` and each is handled to completion
//! before the next is taken.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::config::SessionConfig;
use super::handle::SessionHandle;
use super::state::{EndReason, SessionSnapshot, SessionStatus};
use super::timers::{SessionTimers, TimerExpiry};
use super::tools::{empty_lead_record, LeadRecord, ToolDispatcher};
use super::transcript::TranscriptAssembler;
use crate::audio::codec::{decode_pcm16, encode_pcm16};
use crate::audio::{
    AudioBackend, AudioFrame, MixerConfig, PlaybackDevice, PlaybackScheduler, SessionRecorder,
    UnitId, VoiceActivityDetector,
};
use crate::delivery::{spawn_delivery, CompletedSession, Delivery};
use crate::error::{EngineError, Result};
use crate::transport::{Outbound, SessionSetup, Transport, TransportEvent, TransportLink};

/// Requests from the application to the engine task
pub(crate) enum Command {
    Start(oneshot::Sender<Result<String>>),
    Stop(oneshot::Sender<()>),
}

/// Devices and services the engine drives
pub struct Collaborators {
    pub capture: Box<dyn AudioBackend>,
    pub output: Box<dyn PlaybackDevice>,
    pub transport: Box<dyn Transport>,
    pub delivery: Arc<dyn Delivery>,
}

/// Everything that lives exactly as long as one conversation
struct Session {
    id: String,
    status: SessionStatus,
    started_at: DateTime<Utc>,
    lead_record: LeadRecord,
    pending_termination: bool,
    /// Remote turn has content that no `TurnComplete` has closed yet
    turn_open: bool,
    user_speaking: bool,
    active_tool: Option<String>,
    playback_sequence: u64,
    transcript: TranscriptAssembler,
    playback: PlaybackScheduler,
    timers: SessionTimers,
    recorder: Option<SessionRecorder>,
    frames: mpsc::Receiver<AudioFrame>,
    completions: mpsc::UnboundedReceiver<UnitId>,
    link: TransportLink,
    connect_deadline: Option<Instant>,
    termination_deadline: Option<Instant>,
    tool_indicator_deadline: Option<Instant>,
}

/// What woke the engine loop
enum Wake {
    Command(Option<Command>),
    Frame(Option<AudioFrame>),
    Event(Option<TransportEvent>),
    Played(Option<UnitId>),
    Tick,
    ConnectDeadline,
    TerminationDeadline,
    ToolIndicatorDeadline,
}

pub struct VoiceEngine {
    config: SessionConfig,
    capture: Box<dyn AudioBackend>,
    output: Box<dyn PlaybackDevice>,
    transport: Box<dyn Transport>,
    delivery: Arc<dyn Delivery>,
    dispatcher: ToolDispatcher,
    vad: VoiceActivityDetector,
    /// Deliveries still rendering or sending; awaited before the engine exits
    deliveries: Vec<JoinHandle<()>>,
    commands: mpsc::Receiver<Command>,
    state: watch::Sender<SessionSnapshot>,
    session: Option<Session>,
}

impl VoiceEngine {
    pub fn new(config: SessionConfig, collaborators: Collaborators) -> (Self, SessionHandle) {
        let (command_tx, command_rx) = mpsc::channel(16);
        let (state_tx, state_rx) = watch::channel(SessionSnapshot::idle(config.max_duration_secs()));

        let engine = Self {
            dispatcher: ToolDispatcher::new(config.termination_tool.clone()),
            vad: VoiceActivityDetector::new(config.vad),
            deliveries: Vec::new(),
            config,
            capture: collaborators.capture,
            output: collaborators.output,
            transport: collaborators.transport,
            delivery: collaborators.delivery,
            commands: command_rx,
            state: state_tx,
            session: None,
        };

        (engine, SessionHandle::new(command_tx, state_rx))
    }

    /// Build an engine and run it on its own task
    pub fn spawn(
        config: SessionConfig,
        collaborators: Collaborators,
    ) -> (SessionHandle, tokio::task::JoinHandle<()>) {
        let (engine, handle) = Self::new(config, collaborators);
        (handle, tokio::spawn(engine.run()))
    }

    /// Serve commands until every `SessionHandle` is dropped
    ///
    /// Returns once the last session's delivery has finished.
    pub async fn run(mut self) {
        info!(
            "Voice engine running (capture: {}, output: {}, transport: {})",
            self.capture.name(),
            self.output.name(),
            self.transport.name()
        );

        loop {
            let ended = match self.next_wake().await {
                Wake::Command(None) => {
                    self.teardown(EndReason::Shutdown).await;
                    break;
                }
                Wake::Command(Some(Command::Start(reply))) => {
                    let result = self.start().await;
                    let _ = reply.send(result);
                    None
                }
                Wake::Command(Some(Command::Stop(reply))) => {
                    self.teardown(EndReason::UserStop).await;
                    let _ = reply.send(());
                    None
                }
                Wake::Frame(Some(frame)) => self.on_frame(frame),
                Wake::Frame(None) => Some(EndReason::DeviceLost("capture stream ended".into())),
                Wake::Event(Some(event)) => self.on_transport_event(event).await,
                Wake::Event(None) => Some(EndReason::RemoteClosed),
                Wake::Played(Some(id)) => self.on_playback_complete(id),
                Wake::Played(None) => Some(EndReason::DeviceLost("output device closed".into())),
                Wake::Tick => self.on_tick(),
                Wake::ConnectDeadline => self.on_connect_deadline(),
                Wake::TerminationDeadline => Some(EndReason::AgentTerminated),
                Wake::ToolIndicatorDeadline => {
                    self.clear_tool_indicator();
                    None
                }
            };

            if let Some(reason) = ended {
                self.teardown(reason).await;
            }
        }

        self.deliveries.retain(|delivery| !delivery.is_finished());
        if !self.deliveries.is_empty() {
            info!("Waiting for {} pending deliveries", self.deliveries.len());
        }
        for delivery in self.deliveries.drain(..) {
            if let Err(e) = delivery.await {
                warn!("Delivery task failed: {}", e);
            }
        }

        info!("Voice engine stopped");
    }

    async fn next_wake(&mut self) -> Wake {
        let Some(session) = self.session.as_mut() else {
            return Wake::Command(self.commands.recv().await);
        };

        tokio::select! {
            biased;

            command = self.commands.recv() => Wake::Command(command),
            _ = session.timers.next_tick() => Wake::Tick,
            _ = sleep_until_opt(session.connect_deadline) => Wake::ConnectDeadline,
            _ = sleep_until_opt(session.termination_deadline) => Wake::TerminationDeadline,
            _ = sleep_until_opt(session.tool_indicator_deadline) => Wake::ToolIndicatorDeadline,
            event = session.link.inbound.recv() => Wake::Event(event),
            id = session.completions.recv() => Wake::Played(id),
            frame = session.frames.recv() => Wake::Frame(frame),
        }
    }

    // ------------------------------------------------------------------
    // Disconnected -> Connecting
    // ------------------------------------------------------------------

    async fn start(&mut self) -> Result<String> {
        if self.session.is_some() {
            warn!("Start requested while a session is active");
            return Err(EngineError::AlreadyActive);
        }

        let id = format!("nova_demo_{}", uuid::Uuid::new_v4().simple());
        info!("Starting voice session {}", id);

        self.state.send_replace(SessionSnapshot {
            status: SessionStatus::Connecting,
            session_id: Some(id.clone()),
            ..SessionSnapshot::idle(self.config.max_duration_secs())
        });

        self.vad.reset();

        let frames = match self.capture.start().await {
            Ok(frames) => frames,
            Err(e) => {
                let err = EngineError::device(e.context("Failed to acquire capture device"));
                self.abort_start(&err).await;
                return Err(err);
            }
        };

        let completions = match self.output.open().await {
            Ok(completions) => completions,
            Err(e) => {
                let err = EngineError::device(e.context("Failed to open output device"));
                self.abort_start(&err).await;
                return Err(err);
            }
        };

        let setup = SessionSetup {
            session_id: id.clone(),
            model: self.config.model.clone(),
            voice: self.config.voice.clone(),
            system_instruction: self.config.system_instruction.clone(),
            tools: self.config.tool_declarations(),
            input_sample_rate: self.config.capture_sample_rate,
            output_sample_rate: self.config.playback_sample_rate,
        };

        let link = match self.transport.open(&setup).await {
            Ok(link) => link,
            Err(e) => {
                let err = EngineError::transport(e.context("Failed to open transport"));
                self.abort_start(&err).await;
                return Err(err);
            }
        };

        self.session = Some(Session {
            id: id.clone(),
            status: SessionStatus::Connecting,
            started_at: Utc::now(),
            lead_record: empty_lead_record(&self.config.lead_fields),
            pending_termination: false,
            turn_open: false,
            user_speaking: false,
            active_tool: None,
            playback_sequence: 0,
            transcript: TranscriptAssembler::new(),
            playback: PlaybackScheduler::new(),
            timers: SessionTimers::new(self.config.max_duration_secs(), self.config.idle_timeout),
            recorder: None,
            frames,
            completions,
            link,
            connect_deadline: deadline_after(self.config.connect_timeout),
            termination_deadline: None,
            tool_indicator_deadline: None,
        });

        Ok(id)
    }

    /// Release whatever a failed start had acquired
    async fn abort_start(&mut self, err: &EngineError) {
        warn!("Session start failed: {}", err);

        if let Err(e) = self.capture.stop().await {
            warn!("Failed to stop capture after aborted start: {:#}", e);
        }
        if let Err(e) = self.output.close().await {
            warn!("Failed to close output after aborted start: {:#}", e);
        }
        self.close_transport().await;

        self.state.send_modify(|snapshot| {
            snapshot.status = SessionStatus::Disconnected;
            snapshot.last_error = Some(err.to_string());
        });
    }

    // ------------------------------------------------------------------
    // Connecting -> Connected
    // ------------------------------------------------------------------

    async fn on_opened(&mut self) -> Option<EndReason> {
        let now_output = self.output.now();
        let session = self.session.as_mut()?;
        if session.status != SessionStatus::Connecting {
            debug!("Ignoring duplicate open confirmation for {}", session.id);
            return None;
        }

        session.status = SessionStatus::Connected;
        session.connect_deadline = None;
        session.timers.start();
        session.recorder = Some(SessionRecorder::new(
            MixerConfig {
                sample_rate: self.config.playback_sample_rate,
                max_duration_secs: self.config.max_duration.as_secs() + 30,
            },
            now_output,
        ));
        info!("Voice session {} connected", session.id);

        if !self.config.greeting.is_empty() {
            let greeting = Outbound::Text(self.config.greeting.clone());
            let limit = self.config.control_timeout;
            if let Some(reason) = send_control(&session.link, greeting, limit).await {
                return Some(reason);
            }
        }

        self.publish();
        None
    }

    fn on_connect_deadline(&mut self) -> Option<EndReason> {
        let session = self.session.as_mut()?;
        session.connect_deadline = None;
        if session.status == SessionStatus::Connecting {
            warn!("Transport did not confirm session {} in time", session.id);
            return Some(EndReason::ConnectTimeout);
        }
        None
    }

    // ------------------------------------------------------------------
    // Capture path
    // ------------------------------------------------------------------

    fn on_frame(&mut self, frame: AudioFrame) -> Option<EndReason> {
        let session = self.session.as_mut()?;
        if session.status != SessionStatus::Connected {
            return None;
        }

        if let Some(recorder) = session.recorder.as_mut() {
            recorder.add_capture(&frame);
        }

        // The agent is saying goodbye; the user's audio no longer matters
        if session.pending_termination {
            return None;
        }

        let decision = self.vad.process(&frame);
        let speaking_changed = if decision.speech && !session.user_speaking {
            session.user_speaking = true;
            true
        } else if !decision.forward && session.user_speaking {
            session.user_speaking = false;
            true
        } else {
            false
        };

        if decision.forward {
            session.timers.record_activity(Instant::now());

            let message = Outbound::Audio {
                pcm: encode_pcm16(&frame.samples),
                sample_rate: frame.sample_rate,
                sequence: frame.sequence,
            };
            match session.link.outbound.try_send(message) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    debug!("Transport congested, dropping capture frame {}", frame.sequence);
                }
                Err(TrySendError::Closed(_)) => {
                    return Some(EndReason::Transport("outbound channel closed".into()));
                }
            }
        }

        if speaking_changed {
            self.publish();
        }
        None
    }

    // ------------------------------------------------------------------
    // Transport path
    // ------------------------------------------------------------------

    async fn on_transport_event(&mut self, event: TransportEvent) -> Option<EndReason> {
        match event {
            TransportEvent::Opened => self.on_opened().await,
            TransportEvent::TranscriptionDelta { role, text } => {
                let session = self.session.as_mut()?;
                session.transcript.push_delta(role, &text);
                session.turn_open = true;
                session.timers.record_activity(Instant::now());
                self.publish();
                None
            }
            TransportEvent::AudioFragment(bytes) => {
                self.on_audio_fragment(&bytes);
                None
            }
            TransportEvent::ToolCall(batch) => self.on_tool_calls(batch).await,
            TransportEvent::TurnComplete => {
                let session = self.session.as_mut()?;
                let finalized = session.transcript.complete_turn();
                session.turn_open = false;
                if !finalized.is_empty() {
                    debug!("Turn complete: {} utterances finalized", finalized.len());
                }
                self.publish();
                self.check_deferred_termination(self.config.termination_grace_after_turn);
                None
            }
            TransportEvent::Interrupted => {
                self.on_interrupted();
                None
            }
            TransportEvent::Error(message) => {
                warn!("Transport reported an error: {}", message);
                Some(EndReason::Transport(message))
            }
            TransportEvent::Closed => Some(EndReason::RemoteClosed),
        }
    }

    fn on_audio_fragment(&mut self, bytes: &[u8]) {
        let now_output = self.output.now();
        let Some(session) = self.session.as_mut() else {
            return;
        };

        session.turn_open = true;
        session.timers.record_activity(Instant::now());

        let samples = match decode_pcm16(bytes) {
            Ok(samples) => samples,
            Err(e) => {
                warn!("Skipping audio fragment: {}", e);
                return;
            }
        };

        let frame = AudioFrame::playback(
            samples,
            self.config.playback_sample_rate,
            session.playback_sequence,
        );
        session.playback_sequence += 1;

        let was_speaking = session.playback.is_agent_speaking();
        let unit = session.playback.schedule_frame(frame, now_output);

        if let Err(e) = self.output.play(&unit) {
            warn!("Output device rejected unit {}: {:#}", unit.id, e);
            session.playback.complete(unit.id);
            return;
        }

        if !was_speaking {
            self.publish();
        }
    }

    async fn on_tool_calls(&mut self, batch: Vec<super::tools::ToolCallRequest>) -> Option<EndReason> {
        let session = self.session.as_mut()?;
        let outcome = self.dispatcher.dispatch(batch, &mut session.lead_record);

        // Every request is acknowledged before the next inbound event is taken
        let limit = self.config.control_timeout;
        for result in outcome.results {
            let message = Outbound::ToolResult(result);
            if let Some(reason) = send_control(&session.link, message, limit).await {
                return Some(reason);
            }
        }

        if outcome.terminate_requested && !session.pending_termination {
            info!(
                "Session {} will end after the agent finishes ({} requested)",
                session.id,
                self.dispatcher.termination_tool()
            );
            session.pending_termination = true;
            session.user_speaking = false;
        }

        if let Some(tool) = outcome.indicator {
            session.active_tool = Some(tool);
            session.tool_indicator_deadline = deadline_after(self.config.tool_indicator);
        }

        self.publish();
        None
    }

    fn on_interrupted(&mut self) {
        let now_output = self.output.now();
        let Some(session) = self.session.as_mut() else {
            return;
        };

        if let Some(cut) = session.transcript.interrupt() {
            debug!("Agent interrupted: {}", cut.text);
        }

        let canceled = session.playback.cancel_all();
        let had_audio = !canceled.is_empty();
        for unit in &canceled {
            self.output.stop(unit.id);
            if let Some(recorder) = session.recorder.as_mut() {
                recorder.add_playback(unit, unit.played_prefix(now_output));
            }
        }

        self.publish();
        if had_audio {
            self.check_deferred_termination(self.config.termination_grace_after_playback);
        }
    }

    // ------------------------------------------------------------------
    // Playback completions and timers
    // ------------------------------------------------------------------

    fn on_playback_complete(&mut self, id: UnitId) -> Option<EndReason> {
        let session = self.session.as_mut()?;
        let Some(unit) = session.playback.complete(id) else {
            return None;
        };

        if let Some(recorder) = session.recorder.as_mut() {
            recorder.add_playback(&unit, &unit.samples);
        }

        if !session.playback.is_agent_speaking() {
            self.publish();
            self.check_deferred_termination(self.config.termination_grace_after_playback);
        }
        None
    }

    /// Arm the hang-up once the agent's closing turn is done and silent
    fn check_deferred_termination(&mut self, grace: Duration) {
        let Some(session) = self.session.as_mut() else {
            return;
        };

        if session.pending_termination
            && !session.turn_open
            && !session.playback.is_agent_speaking()
            && session.termination_deadline.is_none()
        {
            info!(
                "Session {} hanging up in {}ms",
                session.id,
                grace.as_millis()
            );
            session.termination_deadline = deadline_after(grace);
        }
    }

    fn on_tick(&mut self) -> Option<EndReason> {
        let session = self.session.as_mut()?;
        let now = Instant::now();
        match session.timers.on_tick(now) {
            Some(TimerExpiry::Duration) => {
                info!("Session {} reached its maximum duration", session.id);
                Some(EndReason::DurationLimit)
            }
            Some(TimerExpiry::Idle) => {
                let silent = now.saturating_duration_since(session.timers.idle.last_activity());
                info!(
                    "Session {} idle for {}s, ending",
                    session.id,
                    silent.as_secs()
                );
                Some(EndReason::Idle)
            }
            None => {
                self.publish();
                None
            }
        }
    }

    fn clear_tool_indicator(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.tool_indicator_deadline = None;
            if session.active_tool.take().is_some() {
                self.publish();
            }
        }
    }

    // ------------------------------------------------------------------
    // Teardown
    // ------------------------------------------------------------------

    /// Single exit path for every way a session ends
    ///
    /// Safe to call with no session. Each release step runs even if an
    /// earlier one failed.
    async fn teardown(&mut self, reason: EndReason) {
        let Some(mut session) = self.session.take() else {
            return;
        };

        info!("Ending voice session {}: {}", session.id, reason);

        if let Err(e) = self.capture.stop().await {
            warn!("Failed to release capture device: {:#}", e);
        }

        session.timers.cancel();
        session.connect_deadline = None;
        session.termination_deadline = None;
        session.tool_indicator_deadline = None;

        let now_output = self.output.now();
        for unit in session.playback.cancel_all() {
            self.output.stop(unit.id);
            if let Some(recorder) = session.recorder.as_mut() {
                recorder.add_playback(&unit, unit.played_prefix(now_output));
            }
        }
        if let Err(e) = self.output.close().await {
            warn!("Failed to close output device: {:#}", e);
        }

        self.close_transport().await;

        session.transcript.discard_buffers();
        let transcript = session.transcript.transcript().to_vec();

        if let Some(recording) = session.recorder.take() {
            debug!(
                "Session {} started {} recorded {:.1}s",
                session.id,
                session.started_at.to_rfc3339(),
                recording.duration_secs()
            );
            self.deliveries.retain(|delivery| !delivery.is_finished());
            let delivery = spawn_delivery(
                Arc::clone(&self.delivery),
                CompletedSession {
                    session_id: session.id.clone(),
                    lead_record: std::mem::take(&mut session.lead_record),
                    transcript: transcript.clone(),
                    duration_seconds: session.timers.duration.elapsed(),
                    recording,
                },
            );
            self.deliveries.push(delivery);
        }

        session.timers.reset();

        let max_duration = self.config.max_duration_secs();
        self.state.send_replace(SessionSnapshot {
            session_id: Some(session.id.clone()),
            transcript,
            last_error: reason.error_text(),
            ..SessionSnapshot::idle(max_duration)
        });
    }

    /// Close the transport, giving up after the control timeout
    async fn close_transport(&mut self) {
        let limit = self.config.control_timeout;
        match tokio::time::timeout(limit, self.transport.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Failed to close transport: {:#}", e),
            Err(_) => warn!(
                "Transport {} did not close within {}ms, abandoning it",
                self.transport.name(),
                limit.as_millis()
            ),
        }
    }

    /// Publish the current session as observable state, if anything changed
    fn publish(&self) {
        let Some(session) = self.session.as_ref() else {
            return;
        };

        let next = SessionSnapshot {
            status: session.status,
            session_id: Some(session.id.clone()),
            is_agent_speaking: session.playback.is_agent_speaking(),
            is_user_speaking: session.user_speaking,
            transcript: session.transcript.transcript().to_vec(),
            live_user: session.transcript.live_user().to_string(),
            live_agent: session.transcript.live_agent().to_string(),
            time_remaining: session.timers.duration.remaining(),
            active_tool: session.active_tool.clone(),
            last_error: None,
        };

        self.state.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}

/// Send a message that must not be dropped
///
/// A remote that accepts nothing for `limit` is treated as a failed
/// transport, so a stalled peer cannot hold the control path.
async fn send_control(
    link: &TransportLink,
    message: Outbound,
    limit: Duration,
) -> Option<EndReason> {
    match tokio::time::timeout(limit, link.outbound.send(message)).await {
        Ok(Ok(())) => None,
        Ok(Err(_)) => Some(EndReason::Transport("outbound channel closed".into())),
        Err(_) => Some(EndReason::Transport(format!(
            "remote accepted nothing for {}ms",
            limit.as_millis()
        ))),
    }
}

/// `None` when the timeout is too large to represent, meaning no deadline
fn deadline_after(timeout: Duration) -> Option<Instant> {
    Instant::now().checked_add(timeout)
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}
