//! The fixed VPAID event vocabulary.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Name of an event the unit can emit to its host.
///
/// Variant names are the wire names, so `Debug`, `Display` and serde all
/// agree with what a VPAID player subscribes to.
#[allow(clippy::enum_variant_names)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AdEventKind {
    AdLoaded,
    AdStarted,
    AdImpression,
    AdVideoStart,
    AdStopped,
    AdSkipped,
    AdSizeChange,
    AdPaused,
    AdPlaying,
    AdExpandedChange,
    AdVolumeChange,
    AdVideoFirstQuartile,
    AdVideoMidpoint,
    AdVideoThirdQuartile,
    AdVideoComplete,
    AdError,
    AdClickThru,
    AdInteraction,
}

impl AdEventKind {
    /// Every event name, in declaration order.
    pub const ALL: [AdEventKind; 18] = [
        AdEventKind::AdLoaded,
        AdEventKind::AdStarted,
        AdEventKind::AdImpression,
        AdEventKind::AdVideoStart,
        AdEventKind::AdStopped,
        AdEventKind::AdSkipped,
        AdEventKind::AdSizeChange,
        AdEventKind::AdPaused,
        AdEventKind::AdPlaying,
        AdEventKind::AdExpandedChange,
        AdEventKind::AdVolumeChange,
        AdEventKind::AdVideoFirstQuartile,
        AdEventKind::AdVideoMidpoint,
        AdEventKind::AdVideoThirdQuartile,
        AdEventKind::AdVideoComplete,
        AdEventKind::AdError,
        AdEventKind::AdClickThru,
        AdEventKind::AdInteraction,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AdLoaded => "AdLoaded",
            Self::AdStarted => "AdStarted",
            Self::AdImpression => "AdImpression",
            Self::AdVideoStart => "AdVideoStart",
            Self::AdStopped => "AdStopped",
            Self::AdSkipped => "AdSkipped",
            Self::AdSizeChange => "AdSizeChange",
            Self::AdPaused => "AdPaused",
            Self::AdPlaying => "AdPlaying",
            Self::AdExpandedChange => "AdExpandedChange",
            Self::AdVolumeChange => "AdVolumeChange",
            Self::AdVideoFirstQuartile => "AdVideoFirstQuartile",
            Self::AdVideoMidpoint => "AdVideoMidpoint",
            Self::AdVideoThirdQuartile => "AdVideoThirdQuartile",
            Self::AdVideoComplete => "AdVideoComplete",
            Self::AdError => "AdError",
            Self::AdClickThru => "AdClickThru",
            Self::AdInteraction => "AdInteraction",
        }
    }
}

impl fmt::Display for AdEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A host asked for an event name outside the vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown VPAID event name '{0}'")]
pub struct UnknownEventName(pub String);

impl FromStr for AdEventKind {
    type Err = UnknownEventName;

    /// Names are matched case-sensitively, as players send them.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownEventName(s.to_string()))
    }
}

/// An emitted event together with its arguments.
///
/// Only three events carry arguments: `AdError` (message), `AdClickThru`
/// (url, id, player-handles flag) and `AdInteraction` (id).
#[allow(clippy::enum_variant_names)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum AdEvent {
    AdLoaded,
    AdStarted,
    AdImpression,
    AdVideoStart,
    AdStopped,
    AdSkipped,
    AdSizeChange,
    AdPaused,
    AdPlaying,
    AdExpandedChange,
    AdVolumeChange,
    AdVideoFirstQuartile,
    AdVideoMidpoint,
    AdVideoThirdQuartile,
    AdVideoComplete,
    AdError {
        message: String,
    },
    #[serde(rename_all = "camelCase")]
    AdClickThru {
        url: String,
        id: String,
        player_handles: bool,
    },
    AdInteraction {
        id: String,
    },
}

impl AdEvent {
    pub fn kind(&self) -> AdEventKind {
        match self {
            AdEvent::AdLoaded => AdEventKind::AdLoaded,
            AdEvent::AdStarted => AdEventKind::AdStarted,
            AdEvent::AdImpression => AdEventKind::AdImpression,
            AdEvent::AdVideoStart => AdEventKind::AdVideoStart,
            AdEvent::AdStopped => AdEventKind::AdStopped,
            AdEvent::AdSkipped => AdEventKind::AdSkipped,
            AdEvent::AdSizeChange => AdEventKind::AdSizeChange,
            AdEvent::AdPaused => AdEventKind::AdPaused,
            AdEvent::AdPlaying => AdEventKind::AdPlaying,
            AdEvent::AdExpandedChange => AdEventKind::AdExpandedChange,
            AdEvent::AdVolumeChange => AdEventKind::AdVolumeChange,
            AdEvent::AdVideoFirstQuartile => AdEventKind::AdVideoFirstQuartile,
            AdEvent::AdVideoMidpoint => AdEventKind::AdVideoMidpoint,
            AdEvent::AdVideoThirdQuartile => AdEventKind::AdVideoThirdQuartile,
            AdEvent::AdVideoComplete => AdEventKind::AdVideoComplete,
            AdEvent::AdError { .. } => AdEventKind::AdError,
            AdEvent::AdClickThru { .. } => AdEventKind::AdClickThru,
            AdEvent::AdInteraction { .. } => AdEventKind::AdInteraction,
        }
    }

    /// Create an error event.
    pub fn error(message: impl Into<String>) -> Self {
        AdEvent::AdError {
            message: message.into(),
        }
    }

    /// Click-through the player is expected to navigate itself.
    pub fn click_thru(url: impl Into<String>) -> Self {
        AdEvent::AdClickThru {
            url: url.into(),
            id: String::new(),
            player_handles: true,
        }
    }

    pub fn interaction(id: impl Into<String>) -> Self {
        AdEvent::AdInteraction { id: id.into() }
    }
}

impl fmt::Display for AdEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdEvent::AdError { message } => write!(f, "AdError({message})"),
            AdEvent::AdClickThru {
                url,
                id,
                player_handles,
            } => write!(f, "AdClickThru({url}, '{id}', {player_handles})"),
            AdEvent::AdInteraction { id } => write!(f, "AdInteraction({id})"),
            other => f.write_str(other.kind().as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn every_name_parses_back() {
        for kind in AdEventKind::ALL {
            assert_eq!(kind.as_str().parse::<AdEventKind>(), Ok(kind));
        }
    }

    #[test]
    fn names_are_case_sensitive() {
        assert!("adloaded".parse::<AdEventKind>().is_err());
        assert!("AdLoaded ".parse::<AdEventKind>().is_err());

        let err = "AdBogus".parse::<AdEventKind>().unwrap_err();
        assert!(err.to_string().contains("AdBogus"));
    }

    #[test]
    fn serde_uses_wire_names() {
        let json = serde_json::to_string(&AdEventKind::AdVideoThirdQuartile).unwrap();
        assert_eq!(json, "\"AdVideoThirdQuartile\"");
    }

    #[test]
    fn event_kind_matches_variant() {
        assert_eq!(AdEvent::AdLoaded.kind(), AdEventKind::AdLoaded);
        assert_eq!(AdEvent::error("boom").kind(), AdEventKind::AdError);
        assert_eq!(AdEvent::click_thru("https://x").kind(), AdEventKind::AdClickThru);
        assert_eq!(AdEvent::interaction("tap").kind(), AdEventKind::AdInteraction);
    }

    #[test]
    fn click_thru_defaults_to_player_navigation() {
        match AdEvent::click_thru("https://example.com/go") {
            AdEvent::AdClickThru {
                url,
                id,
                player_handles,
            } => {
                assert_eq!(url, "https://example.com/go");
                assert_eq!(id, "");
                assert!(player_handles);
            }
            other => panic!("Expected AdClickThru, got {other:?}"),
        }
    }

    #[test]
    fn event_serialization_is_tagged() {
        let json = serde_json::to_value(AdEvent::click_thru("https://x/y")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "event": "AdClickThru",
                "url": "https://x/y",
                "id": "",
                "playerHandles": true
            })
        );

        let json = serde_json::to_value(AdEvent::AdStopped).unwrap();
        assert_eq!(json, serde_json::json!({ "event": "AdStopped" }));
    }

    #[test]
    fn display_includes_arguments() {
        assert_eq!(AdEvent::AdStarted.to_string(), "AdStarted");
        assert_eq!(
            AdEvent::interaction("overlay_interaction").to_string(),
            "AdInteraction(overlay_interaction)"
        );
    }
}
