use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::audio::VadConfig;
use crate::session::tools::ToolDeclaration;

/// Tunables for one voice session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Hard limit on call length
    pub max_duration: Duration,

    /// Silence longer than this ends the call
    pub idle_timeout: Duration,

    /// How long the transport may take to confirm the session
    pub connect_timeout: Duration,

    /// How long the "tool active" indicator stays up
    pub tool_indicator: Duration,

    /// How long the remote side may refuse a control message or a close
    /// before the transport is treated as failed
    pub control_timeout: Duration,

    /// Grace before hanging up when the closing turn completes
    pub termination_grace_after_turn: Duration,

    /// Grace before hanging up when the closing audio finishes playing
    pub termination_grace_after_playback: Duration,

    /// Capture sample rate (what the remote agent expects)
    pub capture_sample_rate: u32,

    /// Sample rate of audio fragments from the remote agent
    pub playback_sample_rate: u32,

    pub vad: VadConfig,

    /// Remote model identifier
    pub model: String,

    /// Prebuilt voice for the agent
    pub voice: String,

    pub system_instruction: String,

    /// Prompt sent once the session opens so the agent speaks first
    pub greeting: String,

    /// Tool name that requests a hang-up
    pub termination_tool: String,

    /// Fields seeded (empty) into every lead record
    pub lead_fields: Vec<String>,
}

pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "\
You are 'Nova', the lead Voice AI specialist at NovaVoice AI.

## PERSONA:
- Professional, fluent, and extremely patient.
- You are here to demonstrate how our AI receptionists work.
- Use natural conversation.

## CONVERSATION FLOW:
1. Greet the user and ask for their name and business type.
2. Answer any questions they have about AI receptionists or lead capture.
3. Try to get an email address to send them a follow-up demo plan.
4. NEVER end the call yourself unless the user says \"Goodbye\", \"I'm done\", or \"End call\".

## IMPORTANT:
- If the user is mid-sentence or sounds like they have more to say, WAIT.
- Do not use 'terminate_call' unless the user is explicitly finished.
";

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_duration: Duration::from_secs(300), // 5 minutes
            idle_timeout: Duration::from_secs(20),
            connect_timeout: Duration::from_secs(15),
            tool_indicator: Duration::from_secs(2),
            control_timeout: Duration::from_secs(2),
            termination_grace_after_turn: Duration::from_millis(500),
            termination_grace_after_playback: Duration::from_millis(1000),
            capture_sample_rate: 16000,
            playback_sample_rate: 24000,
            vad: VadConfig::default(),
            model: "gemini-2.5-flash-native-audio-preview-09-2025".to_string(),
            voice: "Kore".to_string(),
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
            greeting: "Hi Nova, I'm a visitor. Briefly introduce yourself and ask how you can help with my business today.".to_string(),
            termination_tool: "terminate_call".to_string(),
            lead_fields: vec![
                "name".to_string(),
                "email".to_string(),
                "business_nature".to_string(),
            ],
        }
    }
}

impl SessionConfig {
    pub fn max_duration_secs(&self) -> u32 {
        self.max_duration.as_secs().min(u32::MAX as u64) as u32
    }

    /// Tools advertised to the remote agent
    pub fn tool_declarations(&self) -> Vec<ToolDeclaration> {
        vec![
            ToolDeclaration::capture_lead_info(),
            ToolDeclaration::terminate_call(&self.termination_tool),
        ]
    }
}
