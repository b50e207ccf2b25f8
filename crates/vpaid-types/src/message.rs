//! Inbound messages from the embedded overlay document.
//!
//! The overlay runs third-party content, so nothing about a payload is
//! trusted: only a JSON object whose `type` or `action` field names one of
//! the three known intents is accepted. Everything else maps to `None`.

use serde_json::Value;

/// What the overlay is asking the unit to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OverlayIntent {
    ClickThrough,
    Close,
    Interaction,
}

impl OverlayIntent {
    /// Precedence order when a payload names more than one intent
    /// (e.g. `{"type": "close", "action": "clickthrough"}` is a click-through).
    pub const PRECEDENCE: [OverlayIntent; 3] = [
        OverlayIntent::ClickThrough,
        OverlayIntent::Close,
        OverlayIntent::Interaction,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            OverlayIntent::ClickThrough => "clickthrough",
            OverlayIntent::Close => "close",
            OverlayIntent::Interaction => "interaction",
        }
    }
}

/// A validated overlay message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayMessage {
    pub intent: OverlayIntent,
    /// Interaction identifier; only ever set for `Interaction`, and never empty.
    pub id: Option<String>,
}

impl OverlayMessage {
    /// Validate an already-decoded payload.
    pub fn from_value(payload: &Value) -> Option<Self> {
        let object = payload.as_object()?;
        let discriminators = [
            object.get("type").and_then(Value::as_str),
            object.get("action").and_then(Value::as_str),
        ];

        let intent = OverlayIntent::PRECEDENCE.into_iter().find(|intent| {
            discriminators
                .iter()
                .any(|field| *field == Some(intent.as_str()))
        })?;

        let id = match intent {
            OverlayIntent::Interaction => object
                .get("id")
                .and_then(Value::as_str)
                .filter(|id| !id.is_empty())
                .map(str::to_owned),
            OverlayIntent::ClickThrough | OverlayIntent::Close => None,
        };

        Some(Self { intent, id })
    }
}
