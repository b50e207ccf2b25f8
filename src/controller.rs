//! Ad lifecycle controller
//!
//! `AdUnit` is what the host talks to. It owns the attribute store, the
//! event table, the media binding and the overlay bridge, and moves through
//! the VPAID lifecycle:
//!
//! ```text
//! Uninitialized ──init_ad──► Loaded ──start_ad──► Started
//!                              │                     │
//!                              └──────stop_ad────────┴──► Stopped
//! ```
//!
//! Every method takes `&self`. State lives behind a `RefCell` that is never
//! borrowed while a host callback runs, so callbacks may call straight back
//! into the unit (a `stop_ad` from an `AdStarted` handler is ordinary).
//! Listeners registered with the host hold a [`WeakAdUnit`] so that the
//! unit, its collaborators and their listeners never keep each other alive.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use vpaid_types::{AdEvent, AdEventKind, CreativeData, ViewMode, VPAID_VERSION};

use crate::attributes::{AdAttributes, AttributeStore};
use crate::config::{ResolvedCreative, UnitConfig};
use crate::dispatcher::EventDispatcher;
use crate::media::{
    playback_error, MediaElement, MediaListener, MediaSignal, QuartileMarkers, VideoMediaBinding,
};
use crate::overlay::{BridgeAction, FrameContainer, FrameSpec, MessageListener, OverlayMessageBridge};
use crate::tracking::{beacon_name, BeaconSink, BeaconTracker};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Uninitialized,
    Loaded,
    Started,
    Stopped,
}

impl LifecycleState {
    /// Loaded or Started: the states `stop_ad` and `skip_ad` act on.
    pub fn is_active(self) -> bool {
        matches!(self, LifecycleState::Loaded | LifecycleState::Started)
    }

    pub fn is_terminal(self) -> bool {
        self == LifecycleState::Stopped
    }
}

/// Host-owned surfaces handed over at `init_ad`.
#[derive(Default)]
pub struct AdEnvironment {
    /// Where the overlay frame is mounted.
    pub slot: Option<Box<dyn FrameContainer>>,
    pub video_slot: Option<Box<dyn MediaElement>>,
}

impl AdEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_slot(mut self, slot: Box<dyn FrameContainer>) -> Self {
        self.slot = Some(slot);
        self
    }

    pub fn with_video_slot(mut self, video: Box<dyn MediaElement>) -> Self {
        self.video_slot = Some(video);
        self
    }
}

impl fmt::Debug for AdEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdEnvironment")
            .field("slot", &self.slot.is_some())
            .field("video_slot", &self.video_slot.is_some())
            .finish()
    }
}

struct UnitState {
    lifecycle: LifecycleState,
    paused: bool,
    quartiles: QuartileMarkers,
    attributes: AttributeStore,
    creative: ResolvedCreative,
    media: Option<VideoMediaBinding>,
    overlay: OverlayMessageBridge,
}

impl UnitState {
    fn new(config: &UnitConfig) -> Self {
        Self {
            lifecycle: LifecycleState::Uninitialized,
            paused: false,
            quartiles: QuartileMarkers::empty(),
            attributes: AttributeStore::new(config),
            creative: config.resolve(None),
            media: None,
            overlay: OverlayMessageBridge::detached(),
        }
    }

    /// Overlay first (listener, then frame), then media.
    fn release_resources(&mut self) {
        self.overlay.close();
        if let Some(media) = self.media.take() {
            media.unbind();
        }
        self.paused = false;
    }
}

struct Inner {
    config: UnitConfig,
    state: RefCell<UnitState>,
    dispatcher: EventDispatcher,
    tracker: RefCell<BeaconTracker>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.state.get_mut().release_resources();
    }
}

/// Handle to one ad unit. Clones share the same unit.
#[derive(Clone)]
pub struct AdUnit {
    inner: Rc<Inner>,
}

/// Non-owning handle for listeners and host callbacks.
#[derive(Clone)]
pub struct WeakAdUnit {
    inner: Weak<Inner>,
}

impl WeakAdUnit {
    pub fn upgrade(&self) -> Option<AdUnit> {
        self.inner.upgrade().map(|inner| AdUnit { inner })
    }
}

impl fmt::Debug for WeakAdUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakAdUnit")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

impl AdUnit {
    pub fn new(config: UnitConfig) -> Self {
        Self::build(config, BeaconTracker::disabled())
    }

    /// A unit that reports tracking beacons through `sink`. Beacons only go
    /// out when the config also names a tracking URL.
    pub fn with_beacon_sink(config: UnitConfig, sink: Box<dyn BeaconSink>) -> Self {
        let tracker = BeaconTracker::new(config.tracking_url.clone(), Some(sink));
        Self::build(config, tracker)
    }

    fn build(config: UnitConfig, tracker: BeaconTracker) -> Self {
        Self {
            inner: Rc::new(Inner {
                state: RefCell::new(UnitState::new(&config)),
                config,
                dispatcher: EventDispatcher::new(),
                tracker: RefCell::new(tracker),
            }),
        }
    }

    pub fn downgrade(&self) -> WeakAdUnit {
        WeakAdUnit {
            inner: Rc::downgrade(&self.inner),
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    pub fn handshake_version(&self, player_version: &str) -> &'static str {
        tracing::debug!(player_version, "VPAID handshake");
        VPAID_VERSION
    }

    pub fn init_ad(
        &self,
        width: u32,
        height: u32,
        view_mode: ViewMode,
        desired_bitrate: u32,
        creative_data: &CreativeData,
        environment: AdEnvironment,
    ) {
        let config = &self.inner.config;
        let listener = media_listener(self.downgrade());

        let loaded = self
            .with_state("init_ad", |state| {
                if state.lifecycle != LifecycleState::Uninitialized {
                    tracing::debug!(state = ?state.lifecycle, "init_ad ignored");
                    return false;
                }

                state
                    .attributes
                    .apply_init(width, height, view_mode, desired_bitrate);

                let params = match creative_data.parameters() {
                    Some(Ok(params)) => Some(params),
                    Some(Err(err)) => {
                        tracing::debug!(error = %err, "ad parameters ignored");
                        None
                    }
                    None => None,
                };
                state.creative = config.resolve(params.as_ref());
                state.overlay = OverlayMessageBridge::new(
                    environment.slot,
                    state.creative.click_through.clone(),
                    config.fallback_interaction_id.clone(),
                );

                if let Some(video) = environment.video_slot {
                    match VideoMediaBinding::bind(video, &state.creative.video_url, listener) {
                        Ok(binding) => state.media = Some(binding),
                        Err(err) => tracing::warn!(error = %err, "video slot could not be bound"),
                    }
                }

                state.lifecycle = LifecycleState::Loaded;
                tracing::debug!(width, height, %view_mode, "ad loaded");
                true
            })
            .unwrap_or(false);

        if loaded {
            self.dispatch([AdEvent::AdLoaded]);
        }
    }

    pub fn start_ad(&self) {
        let listener = overlay_listener(self.downgrade());
        let sandbox = &self.inner.config.frame_sandbox;

        let started = self
            .with_state("start_ad", |state| {
                if state.lifecycle != LifecycleState::Loaded {
                    tracing::debug!(state = ?state.lifecycle, "start_ad ignored");
                    return false;
                }
                state.lifecycle = LifecycleState::Started;

                if let Some(media) = state.media.as_mut() {
                    if let Err(err) = media.play() {
                        tracing::warn!(error = %err, "media play failed");
                    }
                }

                let attrs = state.attributes.get();
                let spec = FrameSpec::new(
                    state.creative.overlay_url.clone(),
                    attrs.width,
                    attrs.height,
                    sandbox.clone(),
                );
                if let Err(err) = state.overlay.open(&spec, listener) {
                    tracing::warn!(error = %err, "overlay failed to open");
                }

                tracing::debug!("ad started");
                true
            })
            .unwrap_or(false);

        if started {
            // A handler may stop the ad part-way through the sequence.
            self.dispatch_while(
                [AdEvent::AdStarted, AdEvent::AdImpression, AdEvent::AdVideoStart],
                |state| state == LifecycleState::Started,
            );
        }
    }

    /// Universal teardown. A no-op unless the unit is Loaded or Started.
    pub fn stop_ad(&self) {
        let stopped = self
            .with_state("stop_ad", |state| {
                if !state.lifecycle.is_active() {
                    tracing::debug!(state = ?state.lifecycle, "stop_ad ignored");
                    return false;
                }
                state.release_resources();
                state.lifecycle = LifecycleState::Stopped;
                tracing::debug!("ad stopped");
                true
            })
            .unwrap_or(false);

        if stopped {
            self.dispatch([AdEvent::AdStopped]);
        }
    }

    pub fn skip_ad(&self) {
        let skippable = self
            .read(|state| state.lifecycle.is_active() && state.attributes.get().skippable_state)
            .unwrap_or(false);

        if !skippable {
            tracing::debug!("skip_ad ignored");
            return;
        }
        self.dispatch([AdEvent::AdSkipped]);
        self.stop_ad();
    }

    pub fn resize_ad(&self, width: u32, height: u32, view_mode: ViewMode) {
        let resized = self
            .with_state("resize_ad", |state| {
                if state.lifecycle.is_terminal() {
                    return false;
                }
                state.attributes.apply_resize(width, height, view_mode);
                if let Err(err) = state.overlay.resize(width, height) {
                    tracing::warn!(error = %err, "overlay resize failed");
                }
                true
            })
            .unwrap_or(false);

        if resized {
            self.dispatch([AdEvent::AdSizeChange]);
        }
    }

    pub fn pause_ad(&self) {
        if self.set_paused("pause_ad", true) {
            self.dispatch([AdEvent::AdPaused]);
        }
    }

    pub fn resume_ad(&self) {
        if self.set_paused("resume_ad", false) {
            self.dispatch([AdEvent::AdPlaying]);
        }
    }

    fn set_paused(&self, op: &'static str, paused: bool) -> bool {
        self.with_state(op, |state| {
            if !state.lifecycle.is_active() {
                tracing::debug!(state = ?state.lifecycle, op, "ignored");
                return false;
            }
            if let Some(media) = state.media.as_mut() {
                let result = if paused { media.pause() } else { media.play() };
                if let Err(err) = result {
                    tracing::warn!(error = %err, op, "media call failed");
                }
            }
            state.paused = paused;
            true
        })
        .unwrap_or(false)
    }

    pub fn expand_ad(&self) {
        if self.set_expanded("expand_ad", true) {
            self.dispatch([AdEvent::AdExpandedChange]);
        }
    }

    pub fn collapse_ad(&self) {
        if self.set_expanded("collapse_ad", false) {
            self.dispatch([AdEvent::AdExpandedChange]);
        }
    }

    fn set_expanded(&self, op: &'static str, expanded: bool) -> bool {
        self.with_state(op, |state| {
            if state.lifecycle.is_terminal() {
                return false;
            }
            state.attributes.set_expanded(expanded);
            true
        })
        .unwrap_or(false)
    }

    /// Store (per the volume policy) and forward a new volume. Always
    /// announces `AdVolumeChange`, once.
    pub fn set_ad_volume(&self, value: f64) {
        let volume = self.inner.config.volume_policy.apply(value);
        self.with_state("set_ad_volume", |state| {
            state.attributes.set_volume(volume);
            if let Some(media) = state.media.as_mut() {
                if let Err(err) = media.set_volume(volume) {
                    tracing::warn!(error = %err, "media volume change failed");
                }
            }
        });
        self.dispatch([AdEvent::AdVolumeChange]);
    }

    // =========================================================================
    // Getters
    // =========================================================================

    pub fn get_ad_linear(&self) -> bool {
        self.read(|state| state.attributes.get().linear).unwrap_or(true)
    }

    pub fn get_ad_width(&self) -> u32 {
        self.read(|state| state.attributes.get().width).unwrap_or_default()
    }

    pub fn get_ad_height(&self) -> u32 {
        self.read(|state| state.attributes.get().height).unwrap_or_default()
    }

    pub fn get_ad_expanded(&self) -> bool {
        self.read(|state| state.attributes.get().expanded).unwrap_or_default()
    }

    pub fn get_ad_skippable_state(&self) -> bool {
        self.read(|state| state.attributes.get().skippable_state).unwrap_or_default()
    }

    /// Live value from the media when it knows its duration, else the
    /// stored value.
    pub fn get_ad_remaining_time(&self) -> f64 {
        self.read(|state| {
            state
                .media
                .as_ref()
                .and_then(VideoMediaBinding::remaining_time)
                .unwrap_or(state.attributes.get().remaining_time)
        })
        .unwrap_or_default()
    }

    /// Live media duration (NaN before metadata) when bound, else the
    /// stored value.
    pub fn get_ad_duration(&self) -> f64 {
        self.read(|state| match state.media.as_ref() {
            Some(media) => media.duration(),
            None => state.attributes.get().duration,
        })
        .unwrap_or_default()
    }

    pub fn get_ad_volume(&self) -> f64 {
        self.read(|state| match state.media.as_ref() {
            Some(media) => media.volume(),
            None => state.attributes.get().volume,
        })
        .unwrap_or_default()
    }

    pub fn get_ad_companions(&self) -> String {
        self.read(|state| state.attributes.get().companions.clone()).unwrap_or_default()
    }

    pub fn get_ad_icons(&self) -> String {
        self.read(|state| state.attributes.get().icons.clone()).unwrap_or_default()
    }

    // =========================================================================
    // Events
    // =========================================================================

    /// Bind `callback` to `kind`, replacing any earlier subscriber.
    pub fn subscribe(&self, kind: AdEventKind, callback: impl Fn(&AdEvent) + 'static) {
        self.inner.dispatcher.on(kind, Rc::new(callback));
    }

    pub fn unsubscribe(&self, kind: AdEventKind) {
        self.inner.dispatcher.off(kind);
    }

    // =========================================================================
    // Inbound signals
    // =========================================================================

    /// Entry point for the media listener.
    pub fn handle_media_signal(&self, signal: MediaSignal) {
        let outcome = self
            .with_state("media signal", |state| {
                if !state.lifecycle.is_active() {
                    tracing::trace!(?signal, state = ?state.lifecycle, "media signal dropped");
                    return SignalOutcome::Ignored;
                }
                match &signal {
                    MediaSignal::PositionChanged => match state.media.as_ref() {
                        Some(media) => SignalOutcome::Emit(
                            media.on_position_changed(&mut state.attributes, &mut state.quartiles),
                        ),
                        None => SignalOutcome::Ignored,
                    },
                    MediaSignal::Ended => {
                        if let Some(media) = state.media.as_ref() {
                            state.attributes.record_completion(media.duration());
                        }
                        SignalOutcome::Complete
                    }
                    MediaSignal::Error { detail } => {
                        SignalOutcome::Emit(vec![playback_error(detail.as_deref())])
                    }
                }
            })
            .unwrap_or(SignalOutcome::Ignored);

        match outcome {
            SignalOutcome::Emit(events) => self.dispatch_while(events, LifecycleState::is_active),
            SignalOutcome::Complete => {
                self.dispatch([AdEvent::AdVideoComplete]);
                self.stop_ad();
            }
            SignalOutcome::Ignored => {}
        }
    }

    /// Entry point for the overlay message listener. Only a started unit
    /// with an open overlay listens.
    pub fn handle_overlay_message(&self, payload: &Value) {
        let action = self
            .read(|state| {
                if state.lifecycle != LifecycleState::Started || !state.overlay.is_open() {
                    tracing::trace!(state = ?state.lifecycle, "overlay message dropped");
                    return None;
                }
                state.overlay.translate(payload)
            })
            .flatten();

        match action {
            Some(BridgeAction::Emit(event)) => self.dispatch([event]),
            Some(BridgeAction::Stop) => self.stop_ad(),
            None => {}
        }
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    pub fn state(&self) -> LifecycleState {
        self.read(|state| state.lifecycle).unwrap_or(LifecycleState::Uninitialized)
    }

    pub fn is_paused(&self) -> bool {
        self.read(|state| state.paused).unwrap_or_default()
    }

    pub fn fired_quartiles(&self) -> QuartileMarkers {
        self.read(|state| state.quartiles).unwrap_or(QuartileMarkers::empty())
    }

    pub fn is_overlay_open(&self) -> bool {
        self.read(|state| state.overlay.is_open()).unwrap_or_default()
    }

    /// Snapshot of the stored attributes.
    pub fn attributes(&self) -> AdAttributes {
        self.read(|state| state.attributes.get().clone()).unwrap_or_default()
    }

    /// Creative URLs in effect (configured defaults until `init_ad`).
    pub fn creative(&self) -> ResolvedCreative {
        self.read(|state| state.creative.clone()).unwrap_or_else(|| self.inner.config.resolve(None))
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn with_state<R>(&self, op: &'static str, f: impl FnOnce(&mut UnitState) -> R) -> Option<R> {
        match self.inner.state.try_borrow_mut() {
            Ok(mut state) => Some(f(&mut *state)),
            Err(_) => {
                tracing::warn!(op, "ad unit busy, call dropped");
                None
            }
        }
    }

    fn read<R>(&self, f: impl FnOnce(&UnitState) -> R) -> Option<R> {
        match self.inner.state.try_borrow() {
            Ok(state) => Some(f(&*state)),
            Err(_) => {
                tracing::warn!("ad unit busy, read dropped");
                None
            }
        }
    }

    /// Track, then deliver, each event in order. No state borrow is held.
    fn dispatch(&self, events: impl IntoIterator<Item = AdEvent>) {
        for event in events {
            if let Some(name) = beacon_name(event.kind()) {
                match self.inner.tracker.try_borrow_mut() {
                    Ok(mut tracker) => {
                        tracker.track(name);
                    }
                    Err(_) => tracing::warn!(event = name, "beacon skipped, tracker busy"),
                }
            }
            tracing::debug!(%event, "emit");
            self.inner.dispatcher.emit(&event);
        }
    }

    /// Like `dispatch`, but stops as soon as the lifecycle no longer
    /// satisfies `still`.
    fn dispatch_while(
        &self,
        events: impl IntoIterator<Item = AdEvent>,
        still: impl Fn(LifecycleState) -> bool,
    ) {
        for event in events {
            let state = self.state();
            if !still(state) {
                tracing::debug!(%event, ?state, "emission cut short");
                return;
            }
            self.dispatch([event]);
        }
    }
}

impl fmt::Debug for AdUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdUnit")
            .field("state", &self.state())
            .field("dispatcher", &self.inner.dispatcher)
            .finish_non_exhaustive()
    }
}

enum SignalOutcome {
    Emit(Vec<AdEvent>),
    Complete,
    Ignored,
}

fn media_listener(unit: WeakAdUnit) -> MediaListener {
    Rc::new(move |signal: MediaSignal| {
        if let Some(unit) = unit.upgrade() {
            unit.handle_media_signal(signal);
        }
    })
}

fn overlay_listener(unit: WeakAdUnit) -> MessageListener {
    Rc::new(move |payload: &Value| {
        if let Some(unit) = unit.upgrade() {
            unit.handle_overlay_message(payload);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{EventRecorder, SimFrameContainer, SimMedia};
    use pretty_assertions::assert_eq;
    use std::cell::Cell;

    fn loaded_unit(config: UnitConfig) -> (AdUnit, SimMedia, SimFrameContainer, EventRecorder) {
        let unit = AdUnit::new(config);
        let recorder = EventRecorder::attach(&unit);
        let media = SimMedia::new(40.0);
        let container = SimFrameContainer::new();
        unit.init_ad(
            640,
            480,
            ViewMode::Normal,
            500,
            &CreativeData::default(),
            AdEnvironment::new()
                .with_slot(Box::new(container.clone()))
                .with_video_slot(Box::new(media.clone())),
        );
        (unit, media, container, recorder)
    }

    #[test]
    fn init_only_from_uninitialized() {
        let (unit, _media, _container, recorder) = loaded_unit(UnitConfig::default());
        assert_eq!(unit.state(), LifecycleState::Loaded);

        unit.init_ad(1, 1, ViewMode::Thumbnail, 1, &CreativeData::default(), AdEnvironment::new());
        assert_eq!(unit.get_ad_width(), 640);
        assert_eq!(recorder.kinds(), vec![AdEventKind::AdLoaded]);
    }

    #[test]
    fn start_plays_and_opens_overlay() {
        let (unit, media, container, recorder) = loaded_unit(UnitConfig::default());
        unit.start_ad();

        assert!(media.snapshot().playing);
        assert!(unit.is_overlay_open());
        assert_eq!(container.live_frames(), 1);
        assert_eq!(
            recorder.kinds(),
            vec![
                AdEventKind::AdLoaded,
                AdEventKind::AdStarted,
                AdEventKind::AdImpression,
                AdEventKind::AdVideoStart,
            ]
        );
    }

    #[test]
    fn start_before_init_is_ignored() {
        let unit = AdUnit::new(UnitConfig::default());
        let recorder = EventRecorder::attach(&unit);
        unit.start_ad();
        assert_eq!(unit.state(), LifecycleState::Uninitialized);
        assert!(recorder.kinds().is_empty());
    }

    #[test]
    fn stop_releases_everything() {
        let (unit, media, container, recorder) = loaded_unit(UnitConfig::default());
        unit.start_ad();
        unit.stop_ad();

        assert_eq!(unit.state(), LifecycleState::Stopped);
        assert!(!unit.is_overlay_open());
        assert_eq!(container.live_frames(), 0);
        assert_eq!(container.listener_count(), 0);
        assert!(!media.has_listener());
        assert_eq!(media.snapshot().source, None);
        assert_eq!(recorder.count(AdEventKind::AdStopped), 1);
    }

    #[test]
    fn stop_from_inside_started_handler() {
        let (unit, _media, container, recorder) = loaded_unit(UnitConfig::default());
        let weak = unit.downgrade();
        unit.subscribe(AdEventKind::AdStarted, move |_| {
            if let Some(unit) = weak.upgrade() {
                unit.stop_ad();
                unit.stop_ad();
            }
        });

        unit.start_ad();
        assert_eq!(unit.state(), LifecycleState::Stopped);
        assert_eq!(container.live_frames(), 0);
        // The replaced AdStarted subscriber no longer records. Nothing from the
        // start sequence follows the nested stop.
        assert_eq!(recorder.kinds(), vec![AdEventKind::AdLoaded, AdEventKind::AdStopped]);
    }

    #[test]
    fn stop_from_quartile_handler_ends_catch_up() {
        let (unit, media, _container, recorder) = loaded_unit(UnitConfig::default());
        let weak = unit.downgrade();
        unit.subscribe(AdEventKind::AdVideoFirstQuartile, move |_| {
            if let Some(unit) = weak.upgrade() {
                unit.stop_ad();
            }
        });
        unit.start_ad();
        recorder.clear();

        media.seek(35.0);
        assert_eq!(unit.state(), LifecycleState::Stopped);
        assert_eq!(recorder.kinds(), vec![AdEventKind::AdStopped]);
    }

    #[test]
    fn completion_clears_remaining_time() {
        let (unit, media, _container, _recorder) = loaded_unit(UnitConfig::default());
        unit.start_ad();
        media.seek(30.0);
        assert_eq!(unit.get_ad_remaining_time(), 10.0);

        media.finish();
        assert_eq!(unit.state(), LifecycleState::Stopped);
        assert_eq!(unit.get_ad_remaining_time(), 0.0);
        assert_eq!(unit.get_ad_duration(), 40.0);
    }

    #[test]
    fn rejected_media_volume_keeps_unit_usable() {
        let unit = AdUnit::new(UnitConfig::default());
        let recorder = EventRecorder::attach(&unit);
        let media = SimMedia::new(40.0).strict_volume();
        let container = SimFrameContainer::new();
        unit.init_ad(
            640,
            480,
            ViewMode::Normal,
            500,
            &CreativeData::default(),
            AdEnvironment::new()
                .with_slot(Box::new(container.clone()))
                .with_video_slot(Box::new(media.clone())),
        );

        unit.set_ad_volume(1.5);
        assert_eq!(recorder.count(AdEventKind::AdVolumeChange), 1);
        assert_eq!(media.snapshot().volume, 1.0);

        unit.start_ad();
        assert_eq!(unit.state(), LifecycleState::Started);
        unit.stop_ad();
        assert_eq!(unit.state(), LifecycleState::Stopped);
        assert_eq!(container.live_frames(), 0);
        assert!(!media.has_listener());
        assert_eq!(recorder.count(AdEventKind::AdStopped), 1);
    }

    #[test]
    fn ended_completes_then_stops() {
        let (unit, media, _container, recorder) = loaded_unit(UnitConfig::default());
        unit.start_ad();
        media.finish();

        assert_eq!(unit.state(), LifecycleState::Stopped);
        let kinds = recorder.kinds();
        assert_eq!(
            &kinds[kinds.len() - 2..],
            &[AdEventKind::AdVideoComplete, AdEventKind::AdStopped]
        );
    }

    #[test]
    fn media_error_does_not_stop() {
        let (unit, media, _container, recorder) = loaded_unit(UnitConfig::default());
        unit.start_ad();
        media.fail(Some("MEDIA_ERR_NETWORK"));

        assert_eq!(unit.state(), LifecycleState::Started);
        assert_eq!(
            recorder.events().last(),
            Some(&AdEvent::error("Video playback error: MEDIA_ERR_NETWORK"))
        );
    }

    #[test]
    fn pause_and_resume_toggle_flag() {
        let (unit, media, _container, recorder) = loaded_unit(UnitConfig::default());
        unit.start_ad();

        unit.pause_ad();
        assert!(unit.is_paused());
        assert!(!media.snapshot().playing);
        unit.resume_ad();
        assert!(!unit.is_paused());
        assert!(media.snapshot().playing);
        assert_eq!(unit.state(), LifecycleState::Started);
        assert_eq!(recorder.count(AdEventKind::AdPaused), 1);
        assert_eq!(recorder.count(AdEventKind::AdPlaying), 1);

        unit.stop_ad();
        unit.pause_ad();
        assert_eq!(recorder.count(AdEventKind::AdPaused), 1);
    }

    #[test]
    fn expand_and_collapse() {
        let (unit, _media, _container, recorder) = loaded_unit(UnitConfig::default());
        unit.expand_ad();
        assert!(unit.get_ad_expanded());
        unit.collapse_ad();
        assert!(!unit.get_ad_expanded());
        assert_eq!(recorder.count(AdEventKind::AdExpandedChange), 2);
    }

    #[test]
    fn resize_updates_frame() {
        let (unit, _media, container, recorder) = loaded_unit(UnitConfig::default());
        unit.start_ad();
        unit.resize_ad(1280, 720, ViewMode::Fullscreen);

        assert_eq!((unit.get_ad_width(), unit.get_ad_height()), (1280, 720));
        assert_eq!(unit.attributes().view_mode, ViewMode::Fullscreen);
        assert_eq!(container.frame_size(crate::overlay::FrameId(1)), Some((1280, 720)));
        assert_eq!(recorder.count(AdEventKind::AdSizeChange), 1);
    }

    #[test]
    fn volume_policies() {
        let (unit, media, _container, recorder) = loaded_unit(UnitConfig::default());
        unit.set_ad_volume(1.5);
        assert_eq!(unit.get_ad_volume(), 1.5);
        assert_eq!(media.snapshot().volume, 1.5);

        let (clamped, _media, _container, _recorder) =
            loaded_unit(UnitConfig::default().volume_policy(crate::config::VolumePolicy::Clamp));
        clamped.set_ad_volume(1.5);
        assert_eq!(clamped.get_ad_volume(), 1.0);

        assert_eq!(recorder.count(AdEventKind::AdVolumeChange), 1);
    }

    #[test]
    fn getters_prefer_live_media() {
        let (unit, media, _container, _recorder) = loaded_unit(UnitConfig::default());
        media.set_position(10.0);
        assert_eq!(unit.get_ad_duration(), 40.0);
        assert_eq!(unit.get_ad_remaining_time(), 30.0);

        let bare = AdUnit::new(UnitConfig::default());
        assert_eq!(bare.get_ad_duration(), 30.0);
        assert_eq!(bare.get_ad_remaining_time(), 30.0);
        assert_eq!(bare.get_ad_volume(), 1.0);
        assert!(bare.get_ad_linear());
        assert_eq!(bare.get_ad_companions(), "");
        assert_eq!(bare.get_ad_icons(), "");
    }

    #[test]
    fn overlay_messages_need_started_unit() {
        let (unit, _media, container, recorder) = loaded_unit(UnitConfig::default());
        unit.handle_overlay_message(&serde_json::json!({ "type": "clickthrough" }));
        assert_eq!(recorder.count(AdEventKind::AdClickThru), 0);

        unit.start_ad();
        container.post_message(&serde_json::json!({ "type": "clickthrough" }));
        assert_eq!(recorder.count(AdEventKind::AdClickThru), 1);
    }

    #[test]
    fn listeners_do_not_keep_unit_alive() {
        let media = SimMedia::new(10.0);
        let container = SimFrameContainer::new();
        let weak = {
            let unit = AdUnit::new(UnitConfig::default());
            unit.init_ad(
                1,
                1,
                ViewMode::Normal,
                1,
                &CreativeData::default(),
                AdEnvironment::new()
                    .with_slot(Box::new(container.clone()))
                    .with_video_slot(Box::new(media.clone())),
            );
            unit.start_ad();
            unit.downgrade()
        };

        assert!(weak.upgrade().is_none());
        assert!(!media.has_listener());
        assert_eq!(container.listener_count(), 0);
    }

    #[test]
    fn skip_requires_skippable_and_active() {
        let (unit, _media, _container, recorder) = loaded_unit(UnitConfig::default());
        unit.skip_ad();
        assert_eq!(unit.state(), LifecycleState::Loaded);

        let (unit, _media, _container, recorder2) = loaded_unit(UnitConfig::default().skippable(true));
        unit.skip_ad();
        assert_eq!(unit.state(), LifecycleState::Stopped);
        assert_eq!(
            recorder2.kinds(),
            vec![AdEventKind::AdLoaded, AdEventKind::AdSkipped, AdEventKind::AdStopped]
        );

        unit.skip_ad();
        assert_eq!(recorder2.count(AdEventKind::AdSkipped), 1);
        assert_eq!(recorder.count(AdEventKind::AdSkipped), 0);
    }

    #[test]
    fn callbacks_see_committed_state() {
        let (unit, _media, _container, _recorder) = loaded_unit(UnitConfig::default());
        let seen = Rc::new(Cell::new(None));
        let probe = seen.clone();
        let weak = unit.downgrade();
        unit.subscribe(AdEventKind::AdSizeChange, move |_| {
            probe.set(weak.upgrade().map(|u| (u.get_ad_width(), u.get_ad_height())));
        });

        unit.resize_ad(300, 250, ViewMode::Normal);
        assert_eq!(seen.get(), Some((300, 250)));
    }

    #[test]
    fn handshake_reports_vpaid_2() {
        let unit = AdUnit::new(UnitConfig::default());
        assert_eq!(unit.handshake_version("2.0"), "2.0");
        assert_eq!(unit.handshake_version("1.1"), "2.0");
    }
}
