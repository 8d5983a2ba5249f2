//! Call session state
//!
//! All per-call state lives here, owned by the state machine and mutated
//! only from its event loop.

use chrono::{DateTime, Utc};
use std::time::Instant;
use uuid::Uuid;

/// Call lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Idle,
    Connecting,
    AwaitingGreeting,
    Listening,
    Processing,
    Speaking,
    Ended,
}

impl std::fmt::Display for CallState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::AwaitingGreeting => "awaiting_greeting",
            Self::Listening => "listening",
            Self::Processing => "processing",
            Self::Speaking => "speaking",
            Self::Ended => "ended",
        };
        write!(f, "{}", name)
    }
}

/// Who currently holds the conversational floor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloorHolder {
    User,
    Agent,
    Nobody,
}

/// The character on the other end of the call
#[derive(Debug, Clone)]
pub struct CharacterRef {
    pub id: String,
    pub name: String,
}

/// One line of the conversation, user or agent
#[derive(Debug, Clone)]
pub struct VoiceMessage {
    pub id: Uuid,
    pub text: String,
    pub is_user: bool,
    pub timestamp: DateTime<Utc>,
    pub audio_url: Option<String>,
}

impl VoiceMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            is_user: true,
            timestamp: Utc::now(),
            audio_url: None,
        }
    }

    pub fn agent(text: impl Into<String>, audio_url: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            is_user: false,
            timestamp: Utc::now(),
            audio_url: Some(audio_url.into()),
        }
    }
}

/// Per-call mutable state
#[derive(Debug)]
pub struct CallSession {
    pub character: CharacterRef,
    pub state: CallState,
    pub floor: FloorHolder,
    /// Set when the user speaks during the current recording window,
    /// cleared when the window is consumed or a new listening turn starts
    pub has_user_spoken: bool,
    /// Most recent activity intensity (0-100)
    pub last_intensity: f32,
    started_at: Instant,
}

impl CallSession {
    pub fn new(character: CharacterRef) -> Self {
        Self {
            character,
            state: CallState::Idle,
            floor: FloorHolder::Nobody,
            has_user_spoken: false,
            last_intensity: 0.0,
            started_at: Instant::now(),
        }
    }

    /// Time since the session was created
    pub fn elapsed(&self) -> std::time::Duration {
        self.started_at.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_is_idle() {
        let session = CallSession::new(CharacterRef {
            id: "c1".to_string(),
            name: "Ada".to_string(),
        });
        assert_eq!(session.state, CallState::Idle);
        assert_eq!(session.floor, FloorHolder::Nobody);
        assert!(!session.has_user_spoken);
    }

    #[test]
    fn test_message_constructors() {
        let user = VoiceMessage::user("hello");
        assert!(user.is_user);
        assert!(user.audio_url.is_none());

        let agent = VoiceMessage::agent("hi there", "http://x/a.wav");
        assert!(!agent.is_user);
        assert_eq!(agent.audio_url.as_deref(), Some("http://x/a.wav"));
        assert_ne!(user.id, agent.id);
    }
}
