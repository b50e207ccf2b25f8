//! Video media binding and quartile tracking.

use std::fmt;
use std::rc::Rc;

use bitflags::bitflags;
use vpaid_types::AdEvent;

use crate::attributes::AttributeStore;
use crate::error::{HostError, HostResult};

/// Message of the `AdError` emitted for media failures.
pub const PLAYBACK_ERROR_MESSAGE: &str = "Video playback error";

/// Something the media element reported.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaSignal {
    /// `timeupdate`: the playback position moved.
    PositionChanged,
    Ended,
    Error { detail: Option<String> },
}

/// Volumes a media element accepts: finite and within `[0, 1]`.
///
/// Browsers throw on anything else, and a throw from inside the unit leaves
/// its state borrowed, so adapters check before touching the element.
pub fn checked_volume(volume: f64) -> HostResult<f64> {
    if volume.is_finite() && (0.0..=1.0).contains(&volume) {
        Ok(volume)
    } else {
        Err(HostError::media("set_volume", format!("{volume} is outside [0, 1]")))
    }
}

/// Receives every signal of one media element.
pub type MediaListener = Rc<dyn Fn(MediaSignal)>;

/// Host-owned video element (the VPAID `videoSlot`).
pub trait MediaElement {
    /// Seconds.
    fn current_time(&self) -> f64;

    /// Seconds. NaN until metadata is loaded, infinite for live streams.
    fn duration(&self) -> f64;

    fn volume(&self) -> f64;

    fn set_volume(&mut self, volume: f64) -> HostResult<()>;

    fn play(&mut self) -> HostResult<()>;

    fn pause(&mut self) -> HostResult<()>;

    fn set_source(&mut self, url: &str) -> HostResult<()>;

    fn clear_source(&mut self) -> HostResult<()>;

    /// Register the single signal listener, replacing any previous one.
    fn attach_listener(&mut self, listener: MediaListener) -> HostResult<()>;

    fn detach_listener(&mut self) -> HostResult<()>;
}

bitflags! {
    /// Quartile markers that have already fired.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct QuartileMarkers: u8 {
        const FIRST = 1;
        const MID = 1 << 1;
        const THIRD = 1 << 2;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quartile {
    First,
    Midpoint,
    Third,
}

impl Quartile {
    /// In firing order.
    pub const ALL: [Quartile; 3] = [Quartile::First, Quartile::Midpoint, Quartile::Third];

    pub const fn threshold_percent(self) -> f64 {
        match self {
            Quartile::First => 25.0,
            Quartile::Midpoint => 50.0,
            Quartile::Third => 75.0,
        }
    }

    pub const fn marker(self) -> QuartileMarkers {
        match self {
            Quartile::First => QuartileMarkers::FIRST,
            Quartile::Midpoint => QuartileMarkers::MID,
            Quartile::Third => QuartileMarkers::THIRD,
        }
    }

    pub fn event(self) -> AdEvent {
        match self {
            Quartile::First => AdEvent::AdVideoFirstQuartile,
            Quartile::Midpoint => AdEvent::AdVideoMidpoint,
            Quartile::Third => AdEvent::AdVideoThirdQuartile,
        }
    }
}

/// Mark and return the quartiles newly reached at `position`.
///
/// A forward seek past several thresholds returns all of them, in order.
/// Nothing is evaluated while the duration is non-finite or not positive.
pub fn evaluate_quartiles(position: f64, duration: f64, fired: &mut QuartileMarkers) -> Vec<Quartile> {
    if !duration.is_finite() || duration <= 0.0 || !position.is_finite() {
        return Vec::new();
    }

    let percent = position / duration * 100.0;
    let mut reached = Vec::new();
    for quartile in Quartile::ALL {
        if percent >= quartile.threshold_percent() && !fired.contains(quartile.marker()) {
            fired.insert(quartile.marker());
            reached.push(quartile);
        }
    }
    reached
}

/// `AdError` for a media failure, with the host's detail when it has one.
pub fn playback_error(detail: Option<&str>) -> AdEvent {
    match detail.filter(|d| !d.is_empty()) {
        Some(detail) => AdEvent::error(format!("{PLAYBACK_ERROR_MESSAGE}: {detail}")),
        None => AdEvent::error(PLAYBACK_ERROR_MESSAGE),
    }
}

/// A media element bound to the ad's video.
pub struct VideoMediaBinding {
    media: Box<dyn MediaElement>,
    source: String,
}

impl VideoMediaBinding {
    /// Point `media` at `url` and register `listener`.
    pub fn bind(mut media: Box<dyn MediaElement>, url: &str, listener: MediaListener) -> HostResult<Self> {
        media.set_source(url)?;
        media.attach_listener(listener)?;
        tracing::debug!(source = url, "media bound");
        Ok(Self {
            media,
            source: url.to_string(),
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn duration(&self) -> f64 {
        self.media.duration()
    }

    pub fn volume(&self) -> f64 {
        self.media.volume()
    }

    /// Live remaining time, when the media knows its duration.
    pub fn remaining_time(&self) -> Option<f64> {
        let remaining = self.media.duration() - self.media.current_time();
        remaining.is_finite().then(|| remaining.max(0.0))
    }

    pub fn play(&mut self) -> HostResult<()> {
        self.media.play()
    }

    pub fn pause(&mut self) -> HostResult<()> {
        self.media.pause()
    }

    pub fn set_volume(&mut self, volume: f64) -> HostResult<()> {
        self.media.set_volume(volume)
    }

    /// Handle a position tick: refresh the stored timing and return the
    /// quartile events that are now due.
    pub fn on_position_changed(
        &self,
        attrs: &mut AttributeStore,
        fired: &mut QuartileMarkers,
    ) -> Vec<AdEvent> {
        let position = self.media.current_time();
        let duration = self.media.duration();
        attrs.record_playback(duration, position);

        evaluate_quartiles(position, duration, fired)
            .into_iter()
            .map(Quartile::event)
            .collect()
    }

    /// Release the element back to the host.
    pub fn unbind(mut self) {
        // Detach first: clearing the source makes browsers fire `error`.
        if let Err(err) = self.media.detach_listener() {
            tracing::warn!(error = %err, "media listener detach failed");
        }
        if let Err(err) = self.media.pause() {
            tracing::warn!(error = %err, "media pause on teardown failed");
        }
        if let Err(err) = self.media.clear_source() {
            tracing::warn!(error = %err, "media source clear failed");
        }
        tracing::debug!(source = %self.source, "media unbound");
    }
}

impl fmt::Debug for VideoMediaBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VideoMediaBinding")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimMedia;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn noop() -> MediaListener {
        Rc::new(|_: MediaSignal| {})
    }

    #[test]
    fn quartiles_fire_once_in_order() {
        let mut fired = QuartileMarkers::empty();
        assert!(evaluate_quartiles(5.0, 40.0, &mut fired).is_empty());
        assert_eq!(evaluate_quartiles(10.0, 40.0, &mut fired), vec![Quartile::First]);
        assert!(evaluate_quartiles(11.0, 40.0, &mut fired).is_empty());
        assert_eq!(evaluate_quartiles(20.0, 40.0, &mut fired), vec![Quartile::Midpoint]);
        assert_eq!(evaluate_quartiles(30.0, 40.0, &mut fired), vec![Quartile::Third]);
        assert_eq!(fired, QuartileMarkers::all());
    }

    #[test]
    fn forward_seek_catches_up() {
        let mut fired = QuartileMarkers::empty();
        assert_eq!(
            evaluate_quartiles(32.0, 40.0, &mut fired),
            vec![Quartile::First, Quartile::Midpoint, Quartile::Third]
        );
    }

    #[test]
    fn backward_seek_never_refires() {
        let mut fired = QuartileMarkers::empty();
        evaluate_quartiles(21.0, 40.0, &mut fired);
        assert!(evaluate_quartiles(2.0, 40.0, &mut fired).is_empty());
        assert!(evaluate_quartiles(21.0, 40.0, &mut fired).is_empty());
        assert_eq!(evaluate_quartiles(31.0, 40.0, &mut fired), vec![Quartile::Third]);
    }

    #[test]
    fn unusable_duration_skips_evaluation() {
        for duration in [0.0, -5.0, f64::NAN, f64::INFINITY] {
            let mut fired = QuartileMarkers::empty();
            assert!(evaluate_quartiles(10.0, duration, &mut fired).is_empty());
            assert!(fired.is_empty());
        }
    }

    #[test]
    fn playback_error_message() {
        assert_eq!(playback_error(None), AdEvent::error("Video playback error"));
        assert_eq!(playback_error(Some("")), AdEvent::error("Video playback error"));
        assert_eq!(
            playback_error(Some("MEDIA_ERR_DECODE")),
            AdEvent::error("Video playback error: MEDIA_ERR_DECODE")
        );
    }

    #[test]
    fn volume_range_is_checked() {
        assert_eq!(checked_volume(0.0), Ok(0.0));
        assert_eq!(checked_volume(1.0), Ok(1.0));
        assert_eq!(checked_volume(0.3), Ok(0.3));
        for bad in [1.5, -0.1, f64::NAN, f64::INFINITY] {
            assert!(
                matches!(checked_volume(bad), Err(HostError::Media { op: "set_volume", .. })),
                "{bad}"
            );
        }
    }

    #[test]
    fn bind_sets_source_and_listener() {
        let media = SimMedia::new(30.0);
        let binding = VideoMediaBinding::bind(Box::new(media.clone()), "https://x/a.mp4", noop()).unwrap();

        assert_eq!(binding.source(), "https://x/a.mp4");
        assert_eq!(media.snapshot().source.as_deref(), Some("https://x/a.mp4"));
        assert!(media.has_listener());
    }

    #[test]
    fn unbind_releases_element() {
        let media = SimMedia::new(30.0);
        let mut binding = VideoMediaBinding::bind(Box::new(media.clone()), "v.mp4", noop()).unwrap();
        binding.play().unwrap();

        binding.unbind();
        let snap = media.snapshot();
        assert!(!media.has_listener());
        assert!(!snap.playing);
        assert_eq!(snap.source, None);
    }

    #[test]
    fn position_tick_updates_attributes() {
        let media = SimMedia::new(20.0);
        let binding = VideoMediaBinding::bind(Box::new(media.clone()), "v.mp4", noop()).unwrap();
        let mut attrs = AttributeStore::default();
        let mut fired = QuartileMarkers::empty();

        media.set_position(6.0);
        let events = binding.on_position_changed(&mut attrs, &mut fired);
        assert_eq!(events, vec![AdEvent::AdVideoFirstQuartile]);
        assert_eq!(attrs.get().duration, 20.0);
        assert_eq!(attrs.get().remaining_time, 14.0);
        assert_eq!(binding.remaining_time(), Some(14.0));
    }

    #[test]
    fn remaining_time_unknown_without_metadata() {
        let media = SimMedia::new(f64::NAN);
        let binding = VideoMediaBinding::bind(Box::new(media), "v.mp4", noop()).unwrap();
        assert_eq!(binding.remaining_time(), None);
    }

    proptest! {
        #[test]
        fn monotonic_playback_fires_each_quartile_once_in_order(
            duration in 0.5f64..600.0,
            fractions in prop::collection::vec(0.0f64..1.2, 1..64),
        ) {
            let mut fractions = fractions;
            fractions.sort_by(f64::total_cmp);
            let mut fired = QuartileMarkers::empty();
            let mut all = Vec::new();
            for fraction in &fractions {
                all.extend(evaluate_quartiles(fraction * duration, duration, &mut fired));
            }

            let furthest = fractions.last().copied().unwrap_or(0.0) * duration / duration * 100.0;
            let expected: Vec<Quartile> = Quartile::ALL
                .into_iter()
                .filter(|q| furthest >= q.threshold_percent())
                .collect();
            prop_assert_eq!(all, expected);
        }

        #[test]
        fn arbitrary_seeks_never_duplicate(
            duration in 0.5f64..600.0,
            positions in prop::collection::vec(-10.0f64..700.0, 0..64),
        ) {
            let mut fired = QuartileMarkers::empty();
            let mut all = Vec::new();
            for position in positions {
                all.extend(evaluate_quartiles(position, duration, &mut fired));
            }
            let distinct: std::collections::HashSet<_> = all.iter().copied().collect();
            prop_assert_eq!(distinct.len(), all.len());
        }
    }
}
