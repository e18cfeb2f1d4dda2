use crate::errors::ServiceError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;
use utoipa::ToSchema;

pub mod cache;
pub mod delivery;

pub use cache::MediaCache;
pub use delivery::HttpChatSink;

/// An inline button attached to an outbound message
///
/// `action` is the opaque callback token the transport feeds back through the
/// chat update endpoint when the user taps the button.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Button {
    pub label: String,
    pub action: String,
}

impl Button {
    pub fn new(label: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            action: action.into(),
        }
    }
}

/// A message produced by the conversation engine for delivery to one user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct OutboundMessage {
    pub user_id: i64,
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub buttons: Vec<Button>,
    /// Canonical media reference (local path or URL), resolved by the sink
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<String>,
}

impl OutboundMessage {
    pub fn text(user_id: i64, text: impl Into<String>) -> Self {
        Self {
            user_id,
            text: text.into(),
            buttons: Vec::new(),
            media: None,
        }
    }

    pub fn with_buttons(mut self, buttons: Vec<Button>) -> Self {
        self.buttons = buttons;
        self
    }

    pub fn with_media(mut self, media: impl Into<String>) -> Self {
        self.media = Some(media.into());
        self
    }
}

/// Boundary to the conversational transport
///
/// The engine and services only produce `OutboundMessage` values; rendering,
/// keyboards and media upload mechanics live entirely behind this trait.
#[async_trait]
pub trait ChatSink: Send + Sync {
    /// Delivers one outbound message to the transport
    async fn deliver(&self, message: OutboundMessage) -> Result<(), ServiceError>;
}

/// Sink used when no transport delivery URL is configured
///
/// Messages still flow through the engine and are returned to HTTP callers of
/// the chat update endpoint; this sink only swallows the push path.
#[derive(Debug, Default, Clone)]
pub struct NullChatSink;

#[async_trait]
impl ChatSink for NullChatSink {
    async fn deliver(&self, message: OutboundMessage) -> Result<(), ServiceError> {
        debug!(
            user_id = message.user_id,
            "Chat delivery disabled, dropping outbound message"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outbound_message_serialization_skips_empty_fields() {
        let msg = OutboundMessage::text(7, "hello");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"user_id\":7"));
        assert!(!json.contains("buttons"));
        assert!(!json.contains("media"));
    }

    #[test]
    fn outbound_message_with_buttons_and_media_roundtrips() {
        let msg = OutboundMessage::text(7, "pick one")
            .with_buttons(vec![Button::new("Catalog", "catalog")])
            .with_media("catalog/axis_black.jpg");

        let json = serde_json::to_string(&msg).unwrap();
        let back: OutboundMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
    }
}
