//! Wire protocol events
//!
//! Frames are single JSON objects delimited by newlines. The `type` field
//! selects the variant; payload fields use camelCase on the wire. Inbound
//! frames the client does not recognize are ignored so the backend can add
//! event types without breaking older clients.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Events sent from the client to the conversation backend
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Opens a conversation for a character; sent once per connection
    #[serde(rename = "init")]
    Init {
        #[serde(rename = "characterId")]
        character_id: String,
        #[serde(rename = "characterName")]
        character_name: String,
    },

    /// One transcoded recording window
    #[serde(rename = "audio")]
    Audio {
        #[serde(rename = "characterId")]
        character_id: String,
        data: Vec<u8>,
    },

    /// The user held the floor but said nothing for the timeout interval
    #[serde(rename = "silence_timeout")]
    SilenceTimeout {
        #[serde(rename = "characterId")]
        character_id: String,
    },

    /// Client finished playing the last reply and is listening again
    #[serde(rename = "ready")]
    Ready,
}

/// Events received from the conversation backend
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// Opening line for the character; starts the first agent turn
    #[serde(rename = "greeting")]
    Greeting {
        text: String,
        #[serde(rename = "audioUrl")]
        audio_url: String,
    },

    /// Provisional recognition of the user's speech
    #[serde(rename = "transcript")]
    Transcript { text: String },

    /// The character's reply to the last user turn
    #[serde(rename = "response")]
    Response {
        text: String,
        #[serde(rename = "audioUrl")]
        audio_url: String,
    },

    /// Backend-side failure; informational, never terminates the call
    #[serde(rename = "error")]
    Error { message: String },
}

impl ClientEvent {
    /// Convert event to JSON string with newline framing
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        let json = serde_json::to_string(self)?;
        Ok(format!("{}\n", json))
    }
}

impl ServerEvent {
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        let json = serde_json::to_string(self)?;
        Ok(format!("{}\n", json))
    }
}

/// Decode one inbound line, tolerating unknown and malformed frames
///
/// Unknown `type` values and malformed JSON both yield `None` after
/// logging; the connection stays open either way.
pub fn decode_server_line(line: &str) -> Option<ServerEvent> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    match serde_json::from_str::<ServerEvent>(line) {
        Ok(event) => Some(event),
        Err(e) => {
            match serde_json::from_str::<serde_json::Value>(line) {
                Ok(value) => {
                    let kind = value
                        .get("type")
                        .and_then(|t| t.as_str())
                        .unwrap_or("<missing>");
                    debug!("Ignoring unhandled server event type: {}", kind);
                }
                Err(_) => {
                    warn!("Ignoring malformed server frame: {}", e);
                }
            }
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_serialization() {
        let event = ClientEvent::Init {
            character_id: "char-42".to_string(),
            character_name: "Maribel".to_string(),
        };
        let json = event.to_json_line().unwrap();
        assert!(json.contains("\"type\":\"init\""));
        assert!(json.contains("\"characterId\":\"char-42\""));
        assert!(json.contains("\"characterName\":\"Maribel\""));
        assert!(json.ends_with('\n'));
    }

    #[test]
    fn test_audio_serialization() {
        let event = ClientEvent::Audio {
            character_id: "char-42".to_string(),
            data: vec![82, 73, 70, 70],
        };
        let json = event.to_json_line().unwrap();
        assert!(json.contains("\"type\":\"audio\""));
        assert!(json.contains("\"data\":[82,73,70,70]"));
    }

    #[test]
    fn test_silence_timeout_serialization() {
        let event = ClientEvent::SilenceTimeout {
            character_id: "char-42".to_string(),
        };
        let json = event.to_json_line().unwrap();
        assert!(json.contains("\"type\":\"silence_timeout\""));
    }

    #[test]
    fn test_ready_serialization() {
        let json = ClientEvent::Ready.to_json_line().unwrap();
        assert_eq!(json, "{\"type\":\"ready\"}\n");
    }

    #[test]
    fn test_decode_known_events() {
        let event =
            decode_server_line(r#"{"type":"greeting","text":"Hi!","audioUrl":"http://x/a.wav"}"#)
                .unwrap();
        assert_eq!(
            event,
            ServerEvent::Greeting {
                text: "Hi!".to_string(),
                audio_url: "http://x/a.wav".to_string(),
            }
        );

        let event = decode_server_line(r#"{"type":"transcript","text":"hello there"}"#).unwrap();
        assert_eq!(
            event,
            ServerEvent::Transcript {
                text: "hello there".to_string()
            }
        );

        let event = decode_server_line(r#"{"type":"error","message":"tts unavailable"}"#).unwrap();
        assert_eq!(
            event,
            ServerEvent::Error {
                message: "tts unavailable".to_string()
            }
        );
    }

    #[test]
    fn test_unknown_type_is_ignored() {
        assert!(decode_server_line(r#"{"type":"typing_indicator","on":true}"#).is_none());
        assert!(decode_server_line(r#"{"no_type_at_all":1}"#).is_none());
    }

    #[test]
    fn test_malformed_line_is_ignored() {
        assert!(decode_server_line("{not json").is_none());
        assert!(decode_server_line("").is_none());
        assert!(decode_server_line("   ").is_none());
    }
}
