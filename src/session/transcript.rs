use serde::{Deserialize, Serialize};

/// Marker appended to an agent turn that was cut off by the user
pub const INTERRUPTED_SUFFIX: &str = "...";

/// Who spoke an utterance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Agent,
}

/// A finalized turn of speech
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utterance {
    pub role: Role,
    pub text: String,
}

impl Utterance {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
        }
    }
}

/// Accumulates streaming transcription deltas into finalized utterances
///
/// The transcript only ever grows; it is cleared when a new session starts.
#[derive(Debug, Default)]
pub struct TranscriptAssembler {
    transcript: Vec<Utterance>,
    user_buffer: String,
    agent_buffer: String,
}

impl TranscriptAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_delta(&mut self, role: Role, text: &str) {
        match role {
            Role::User => self.user_buffer.push_str(text),
            Role::Agent => self.agent_buffer.push_str(text),
        }
    }

    /// Finalize the current turn
    ///
    /// Appends at most one user utterance followed by at most one agent
    /// utterance, then empties both buffers. Returns what was appended.
    pub fn complete_turn(&mut self) -> Vec<Utterance> {
        let mut finalized = Vec::with_capacity(2);

        let user = self.user_buffer.trim();
        if !user.is_empty() {
            finalized.push(Utterance::new(Role::User, user));
        }
        let agent = self.agent_buffer.trim();
        if !agent.is_empty() {
            finalized.push(Utterance::new(Role::Agent, agent));
        }

        self.user_buffer.clear();
        self.agent_buffer.clear();
        self.transcript.extend(finalized.iter().cloned());

        finalized
    }

    /// Close out an agent turn that the user talked over
    ///
    /// The partial agent text is finalized right away with an ellipsis; the
    /// user's in-progress text is left for the next turn completion.
    pub fn interrupt(&mut self) -> Option<Utterance> {
        let agent = self.agent_buffer.trim();
        let cut = if agent.is_empty() {
            None
        } else {
            let utterance = Utterance::new(Role::Agent, format!("{}{}", agent, INTERRUPTED_SUFFIX));
            self.transcript.push(utterance.clone());
            Some(utterance)
        };

        self.agent_buffer.clear();
        cut
    }

    pub fn transcript(&self) -> &[Utterance] {
        &self.transcript
    }

    pub fn live_user(&self) -> &str {
        &self.user_buffer
    }

    pub fn live_agent(&self) -> &str {
        &self.agent_buffer
    }

    /// Discard in-progress text, keeping finalized utterances
    pub fn discard_buffers(&mut self) {
        self.user_buffer.clear();
        self.agent_buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turn_complete_orders_user_before_agent() {
        let mut assembler = TranscriptAssembler::new();
        assembler.push_delta(Role::Agent, "Hello, ");
        assembler.push_delta(Role::User, "Hi");
        assembler.push_delta(Role::Agent, "how can I help?");

        let finalized = assembler.complete_turn();
        assert_eq!(
            finalized,
            vec![
                Utterance::new(Role::User, "Hi"),
                Utterance::new(Role::Agent, "Hello, how can I help?"),
            ]
        );
        assert_eq!(assembler.live_user(), "");
        assert_eq!(assembler.live_agent(), "");
        assert_eq!(assembler.transcript().len(), 2);
    }

    #[test]
    fn test_empty_turn_adds_nothing() {
        let mut assembler = TranscriptAssembler::new();
        assembler.push_delta(Role::User, "   ");

        assert!(assembler.complete_turn().is_empty());
        assert!(assembler.transcript().is_empty());
        assert_eq!(assembler.live_user(), "");
    }

    #[test]
    fn test_agent_only_turn() {
        let mut assembler = TranscriptAssembler::new();
        assembler.push_delta(Role::Agent, "Welcome!");

        let finalized = assembler.complete_turn();
        assert_eq!(finalized, vec![Utterance::new(Role::Agent, "Welcome!")]);
    }

    #[test]
    fn test_interrupt_finalizes_agent_with_ellipsis() {
        let mut assembler = TranscriptAssembler::new();
        assembler.push_delta(Role::User, "wait");
        assembler.push_delta(Role::Agent, "Our pricing starts at ");

        let cut = assembler.interrupt().unwrap();
        assert_eq!(cut.role, Role::Agent);
        assert_eq!(cut.text, "Our pricing starts at...");
        assert_eq!(assembler.live_agent(), "");
        assert_eq!(assembler.live_user(), "wait");

        // The cut-off text is not repeated at the next turn completion
        let finalized = assembler.complete_turn();
        assert_eq!(finalized, vec![Utterance::new(Role::User, "wait")]);
        assert_eq!(assembler.transcript().len(), 2);
    }

    #[test]
    fn test_interrupt_without_agent_text() {
        let mut assembler = TranscriptAssembler::new();
        assert!(assembler.interrupt().is_none());
        assert!(assembler.transcript().is_empty());
    }

    #[test]
    fn test_discard_keeps_finalized_utterances() {
        let mut assembler = TranscriptAssembler::new();
        assembler.push_delta(Role::User, "one");
        assembler.complete_turn();
        assembler.push_delta(Role::Agent, "two");

        assembler.discard_buffers();
        assert_eq!(assembler.transcript(), &[Utterance::new(Role::User, "one")]);
        assert_eq!(assembler.live_agent(), "");
    }
}
