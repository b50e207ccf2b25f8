//! Tracking beacons
//!
//! Fire-and-forget pixel requests, at most one per event name per unit.

use std::collections::HashSet;
use std::fmt;

use chrono::Utc;
use url::Url;
use vpaid_types::AdEventKind;

use crate::error::HostResult;

/// Delivers one beacon request. Delivery itself is the host's business.
pub trait BeaconSink {
    fn fire(&mut self, url: &Url) -> HostResult<()>;
}

/// Beacon name recorded for an emitted event, if that event is tracked.
pub fn beacon_name(kind: AdEventKind) -> Option<&'static str> {
    let name = match kind {
        AdEventKind::AdImpression => "impression",
        AdEventKind::AdVideoStart => "start",
        AdEventKind::AdVideoFirstQuartile => "first_quartile",
        AdEventKind::AdVideoMidpoint => "midpoint",
        AdEventKind::AdVideoThirdQuartile => "third_quartile",
        AdEventKind::AdVideoComplete => "complete",
        AdEventKind::AdClickThru => "click_through",
        AdEventKind::AdInteraction => "interaction",
        AdEventKind::AdSkipped => "skip",
        AdEventKind::AdError => "error",
        _ => return None,
    };
    Some(name)
}

/// `<endpoint>?event=<name>&cb=<cache buster>`, keeping any query the
/// endpoint already carries.
pub fn beacon_url(endpoint: &Url, event: &str, cache_buster: i64) -> Url {
    let mut url = endpoint.clone();
    url.query_pairs_mut()
        .append_pair("event", event)
        .append_pair("cb", &cache_buster.to_string());
    url
}

pub struct BeaconTracker {
    endpoint: Option<Url>,
    sink: Option<Box<dyn BeaconSink>>,
    fired: HashSet<String>,
}

impl BeaconTracker {
    pub fn new(endpoint: Option<Url>, sink: Option<Box<dyn BeaconSink>>) -> Self {
        Self {
            endpoint,
            sink,
            fired: HashSet::new(),
        }
    }

    /// A tracker that never fires.
    pub fn disabled() -> Self {
        Self::new(None, None)
    }

    pub fn is_enabled(&self) -> bool {
        self.endpoint.is_some() && self.sink.is_some()
    }

    pub fn has_fired(&self, name: &str) -> bool {
        self.fired.contains(name)
    }

    /// Fire the beacon for `name` unless it already went out.
    ///
    /// A failed fire is not recorded, so the next occurrence retries.
    pub fn track(&mut self, name: &str) -> bool {
        self.track_at(name, Utc::now().timestamp_millis())
    }

    fn track_at(&mut self, name: &str, cache_buster: i64) -> bool {
        let (Some(endpoint), Some(sink)) = (self.endpoint.as_ref(), self.sink.as_mut()) else {
            return false;
        };
        if self.fired.contains(name) {
            return false;
        }

        let url = beacon_url(endpoint, name, cache_buster);
        match sink.fire(&url) {
            Ok(()) => {
                tracing::debug!(event = name, %url, "beacon fired");
                self.fired.insert(name.to_string());
                true
            }
            Err(err) => {
                tracing::warn!(event = name, error = %err, "beacon failed");
                false
            }
        }
    }
}

impl fmt::Debug for BeaconTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeaconTracker")
            .field("endpoint", &self.endpoint.as_ref().map(Url::as_str))
            .field("enabled", &self.is_enabled())
            .field("fired", &self.fired)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::RecordingBeacon;
    use pretty_assertions::assert_eq;

    fn endpoint() -> Url {
        Url::parse("https://track.example.com/pixel").unwrap()
    }

    #[test]
    fn url_shape() {
        let url = beacon_url(&endpoint(), "first_quartile", 1_700_000_000_000);
        assert_eq!(
            url.as_str(),
            "https://track.example.com/pixel?event=first_quartile&cb=1700000000000"
        );

        let with_query = Url::parse("https://t.example/p?campaign=7").unwrap();
        assert_eq!(
            beacon_url(&with_query, "skip", 1).as_str(),
            "https://t.example/p?campaign=7&event=skip&cb=1"
        );
    }

    #[test]
    fn dedupes_per_name() {
        let sink = RecordingBeacon::new();
        let mut tracker = BeaconTracker::new(Some(endpoint()), Some(Box::new(sink.clone())));

        assert!(tracker.track("impression"));
        assert!(!tracker.track("impression"));
        assert!(tracker.track("start"));

        assert_eq!(sink.events(), vec!["impression", "start"]);
        assert!(tracker.has_fired("impression"));
    }

    #[test]
    fn failed_fire_retries_later() {
        let sink = RecordingBeacon::new();
        sink.fail_next("offline");
        let mut tracker = BeaconTracker::new(Some(endpoint()), Some(Box::new(sink.clone())));

        assert!(!tracker.track("error"));
        assert!(!tracker.has_fired("error"));
        assert!(tracker.track("error"));
        assert_eq!(sink.events(), vec!["error"]);
    }

    #[test]
    fn disabled_without_endpoint_or_sink() {
        let sink = RecordingBeacon::new();
        let mut no_endpoint = BeaconTracker::new(None, Some(Box::new(sink.clone())));
        assert!(!no_endpoint.is_enabled());
        assert!(!no_endpoint.track("impression"));
        assert!(sink.events().is_empty());

        let mut no_sink = BeaconTracker::new(Some(endpoint()), None);
        assert!(!no_sink.track("impression"));
        assert!(!BeaconTracker::disabled().is_enabled());
    }

    #[test]
    fn only_tracked_events_have_names() {
        assert_eq!(beacon_name(AdEventKind::AdImpression), Some("impression"));
        assert_eq!(beacon_name(AdEventKind::AdClickThru), Some("click_through"));
        assert_eq!(beacon_name(AdEventKind::AdLoaded), None);
        assert_eq!(beacon_name(AdEventKind::AdVolumeChange), None);

        let tracked = AdEventKind::ALL
            .into_iter()
            .filter_map(beacon_name)
            .count();
        assert_eq!(tracked, 10);
    }
}
