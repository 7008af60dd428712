//! Wire protocol for client connections
//!
//! Every frame on a client connection is one JSON object tagged by `type`:
//!
//! | direction | `type`          | payload              |
//! |-----------|-----------------|----------------------|
//! | inbound   | `play-sound`    | `filename: string`   |
//! | outbound  | `sound-played`  | `filename: string`   |
//! | outbound  | `sound-stopped` | `filename: string`   |
//! | outbound  | `error`         | `message: string`    |
//!
//! Inbound frames that are not valid JSON, carry an unknown `type`, or are
//! missing their payload are ignored by the server.

use serde::{Deserialize, Serialize};

use crate::Result;

/// Tagged control message exchanged with a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ControlMessage {
    /// Client asks the server to toggle playback of `filename`
    PlaySound { filename: String },

    /// A toggle of `filename` succeeded
    SoundPlayed { filename: String },

    /// Playback of `filename` ended (natural end, stop, or output failure)
    SoundStopped { filename: String },

    /// Request failed; sent only to the requesting client
    Error { message: String },
}

impl ControlMessage {
    /// Create a `sound-played` message
    pub fn sound_played(filename: impl Into<String>) -> Self {
        Self::SoundPlayed {
            filename: filename.into(),
        }
    }

    /// Create a `sound-stopped` message
    pub fn sound_stopped(filename: impl Into<String>) -> Self {
        Self::SoundStopped {
            filename: filename.into(),
        }
    }

    /// Create an `error` message
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Wire name of this message's `type` tag
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::PlaySound { .. } => "play-sound",
            Self::SoundPlayed { .. } => "sound-played",
            Self::SoundStopped { .. } => "sound-stopped",
            Self::Error { .. } => "error",
        }
    }

    /// Serialize to a JSON text frame
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse an inbound frame, returning the requested filename.
    ///
    /// Returns `None` for anything other than a well-formed `play-sound`
    /// request, including outbound message types echoed back by a client.
    pub fn parse_play_request(text: &str) -> Option<String> {
        match serde_json::from_str::<ControlMessage>(text) {
            Ok(ControlMessage::PlaySound { filename }) => Some(filename),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outbound_wire_shape() {
        let played = ControlMessage::sound_played("b.mp3").to_json().unwrap();
        assert_eq!(played, r#"{"type":"sound-played","filename":"b.mp3"}"#);

        let stopped = ControlMessage::sound_stopped("b.mp3").to_json().unwrap();
        assert_eq!(stopped, r#"{"type":"sound-stopped","filename":"b.mp3"}"#);

        let error = ControlMessage::error("Sound file not found").to_json().unwrap();
        assert_eq!(error, r#"{"type":"error","message":"Sound file not found"}"#);
    }

    #[test]
    fn test_parse_play_request() {
        let filename = ControlMessage::parse_play_request(r#"{"type":"play-sound","filename":"a.mp3"}"#);
        assert_eq!(filename.as_deref(), Some("a.mp3"));

        // Extra fields are tolerated
        let filename = ControlMessage::parse_play_request(
            r#"{"filename":"a.mp3","type":"play-sound","volume":3}"#,
        );
        assert_eq!(filename.as_deref(), Some("a.mp3"));
    }

    #[test]
    fn test_parse_ignores_malformed_frames() {
        let ignored = [
            "",
            "not json",
            "[1,2,3]",
            "42",
            r#"{"type":"play-sound"}"#,
            r#"{"type":"play-sound","filename":7}"#,
            r#"{"type":"dance","filename":"a.mp3"}"#,
            r#"{"filename":"a.mp3"}"#,
            r#"{"type":"sound-played","filename":"a.mp3"}"#,
        ];

        for frame in ignored {
            assert_eq!(ControlMessage::parse_play_request(frame), None, "frame: {frame}");
        }
    }

    #[test]
    fn test_type_name_matches_serialized_tag() {
        let messages = [
            ControlMessage::PlaySound { filename: "x".into() },
            ControlMessage::sound_played("x"),
            ControlMessage::sound_stopped("x"),
            ControlMessage::error("x"),
        ];

        for message in messages {
            let value: serde_json::Value = serde_json::from_str(&message.to_json().unwrap()).unwrap();
            assert_eq!(value["type"], message.type_name());
        }
    }
}
