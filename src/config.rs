use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::audio::{AudioBackendConfig, VadConfig};
use crate::session::{SessionConfig, DEFAULT_SYSTEM_INSTRUCTION};

/// Environment variables with this prefix override file values,
/// e.g. `NOVAVOICE__TRANSPORT__NATS_URL`
pub const ENV_PREFIX: &str = "NOVAVOICE";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub audio: AudioConfig,
    pub vad: VadConfig,
    pub session: TimingConfig,
    pub agent: AgentConfig,
    pub transport: TransportConfig,
    pub delivery: DeliveryConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "novavoice".to_string(),
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8090,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub capture_sample_rate: u32,
    pub playback_sample_rate: u32,
    /// Samples per capture frame
    pub frame_size: usize,
    /// WAV file played into the capture path
    pub capture_file: Option<PathBuf>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            capture_sample_rate: 16000,
            playback_sample_rate: 24000,
            frame_size: 4096,
            capture_file: None,
        }
    }
}

/// Session timings, in seconds or milliseconds as named
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub max_duration_secs: u64,
    pub idle_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub tool_indicator_ms: u64,
    pub control_timeout_ms: u64,
    pub termination_grace_after_turn_ms: u64,
    pub termination_grace_after_playback_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            max_duration_secs: 300,
            idle_timeout_secs: 20,
            connect_timeout_secs: 15,
            tool_indicator_ms: 2000,
            control_timeout_ms: 2000,
            termination_grace_after_turn_ms: 500,
            termination_grace_after_playback_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub model: String,
    pub voice: String,
    /// Replaces the built-in persona when set
    pub system_instruction: Option<String>,
    pub greeting: String,
    pub termination_tool: String,
    pub lead_fields: Vec<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        let session = SessionConfig::default();
        Self {
            model: session.model,
            voice: session.voice,
            system_instruction: None,
            greeting: session.greeting,
            termination_tool: session.termination_tool,
            lead_fields: session.lead_fields,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub nats_url: String,
    pub subject_prefix: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            nats_url: "nats://localhost:4222".to_string(),
            subject_prefix: "voice.session".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryKind {
    None,
    File,
    Nats,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    pub kind: DeliveryKind,
    /// Output directory for `file` delivery
    pub dir: PathBuf,
    /// Subject for `nats` delivery
    pub subject: String,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            kind: DeliveryKind::File,
            dir: PathBuf::from("sessions"),
            subject: "voice.lead.captured".to_string(),
        }
    }
}

impl Config {
    /// Load `path` (extension optional) layered under `NOVAVOICE__*` overrides
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()
            .with_context(|| format!("Failed to load configuration from {}", path))?;

        settings
            .try_deserialize()
            .context("Invalid configuration")
    }

    pub fn session_config(&self) -> SessionConfig {
        let timing = &self.session;
        SessionConfig {
            max_duration: Duration::from_secs(timing.max_duration_secs),
            idle_timeout: Duration::from_secs(timing.idle_timeout_secs),
            connect_timeout: Duration::from_secs(timing.connect_timeout_secs),
            tool_indicator: Duration::from_millis(timing.tool_indicator_ms),
            control_timeout: Duration::from_millis(timing.control_timeout_ms),
            termination_grace_after_turn: Duration::from_millis(
                timing.termination_grace_after_turn_ms,
            ),
            termination_grace_after_playback: Duration::from_millis(
                timing.termination_grace_after_playback_ms,
            ),
            capture_sample_rate: self.audio.capture_sample_rate,
            playback_sample_rate: self.audio.playback_sample_rate,
            vad: self.vad,
            model: self.agent.model.clone(),
            voice: self.agent.voice.clone(),
            system_instruction: self
                .agent
                .system_instruction
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_INSTRUCTION.to_string()),
            greeting: self.agent.greeting.clone(),
            termination_tool: self.agent.termination_tool.clone(),
            lead_fields: self.agent.lead_fields.clone(),
        }
    }

    pub fn capture_config(&self) -> AudioBackendConfig {
        AudioBackendConfig {
            sample_rate: self.audio.capture_sample_rate,
            frame_size: self.audio.frame_size,
            ..AudioBackendConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_session_defaults() {
        let cfg = Config::default();
        let session = cfg.session_config();
        let defaults = SessionConfig::default();

        assert_eq!(session.max_duration, defaults.max_duration);
        assert_eq!(session.idle_timeout, defaults.idle_timeout);
        assert_eq!(session.control_timeout, defaults.control_timeout);
        assert_eq!(
            session.termination_grace_after_playback,
            defaults.termination_grace_after_playback
        );
        assert_eq!(session.system_instruction, DEFAULT_SYSTEM_INSTRUCTION);
        assert_eq!(cfg.delivery.kind, DeliveryKind::File);
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[session]
max_duration_secs = 60
control_timeout_ms = 750

[agent]
voice = "Puck"

[delivery]
kind = "nats"
"#
        )
        .unwrap();

        let path = file.path().to_str().unwrap().to_string();
        let cfg = Config::load(&path).unwrap();

        assert_eq!(cfg.session.max_duration_secs, 60);
        assert_eq!(cfg.session.idle_timeout_secs, 20);
        assert_eq!(cfg.agent.voice, "Puck");
        assert_eq!(cfg.delivery.kind, DeliveryKind::Nats);
        assert_eq!(cfg.session_config().max_duration_secs(), 60);
        assert_eq!(
            cfg.session_config().control_timeout,
            Duration::from_millis(750)
        );
    }
}
