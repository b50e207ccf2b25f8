//! In-memory host collaborators.
//!
//! Stand-ins for the video element, the overlay slot and the beacon
//! transport. They drive the unit in tests and in `vpaid_replay`. Every
//! type is a cheap clone over shared state, so a test can hand one copy to
//! the unit and keep another to poke and inspect.
//!
//! Listeners are always invoked with no internal borrow held: the unit is
//! free to call back into the collaborator (an `ended` signal stops the ad,
//! which detaches the very listener being called).

use std::cell::RefCell;
use std::rc::Rc;

use serde::Serialize;
use serde_json::Value;
use url::Url;
use vpaid_types::{AdEvent, AdEventKind};

use crate::controller::AdUnit;
use crate::error::{HostError, HostResult};
use crate::media::{checked_volume, MediaElement, MediaListener, MediaSignal};
use crate::overlay::{FrameContainer, FrameId, FrameSpec, ListenerId, MessageListener};
use crate::tracking::BeaconSink;

// ============================================================================
// Media
// ============================================================================

/// Observable state of a [`SimMedia`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaSnapshot {
    pub source: Option<String>,
    pub playing: bool,
    pub position: f64,
    pub duration: f64,
    pub volume: f64,
}

struct SimMediaState {
    snapshot: MediaSnapshot,
    listener: Option<MediaListener>,
    strict_volume: bool,
}

/// Simulated video element with a fixed duration.
#[derive(Clone)]
pub struct SimMedia {
    state: Rc<RefCell<SimMediaState>>,
}

impl SimMedia {
    pub fn new(duration: f64) -> Self {
        Self {
            state: Rc::new(RefCell::new(SimMediaState {
                snapshot: MediaSnapshot {
                    source: None,
                    playing: false,
                    position: 0.0,
                    duration,
                    volume: 1.0,
                },
                listener: None,
                strict_volume: false,
            })),
        }
    }

    /// Reject volumes outside `[0, 1]` the way a browser element does.
    pub fn strict_volume(self) -> Self {
        self.state.borrow_mut().strict_volume = true;
        self
    }

    pub fn snapshot(&self) -> MediaSnapshot {
        self.state.borrow().snapshot.clone()
    }

    pub fn has_listener(&self) -> bool {
        self.state.borrow().listener.is_some()
    }

    /// Move the playhead without telling anyone.
    pub fn set_position(&self, position: f64) {
        self.state.borrow_mut().snapshot.position = position;
    }

    /// Move the playhead and emit `timeupdate`.
    pub fn seek(&self, position: f64) {
        self.set_position(position);
        self.signal(MediaSignal::PositionChanged);
    }

    /// Play through to the end.
    pub fn finish(&self) {
        {
            let mut state = self.state.borrow_mut();
            state.snapshot.position = state.snapshot.duration;
            state.snapshot.playing = false;
        }
        self.signal(MediaSignal::Ended);
    }

    pub fn fail(&self, detail: Option<&str>) {
        self.signal(MediaSignal::Error {
            detail: detail.map(str::to_owned),
        });
    }

    /// Deliver `signal` to the attached listener. Returns whether one was attached.
    pub fn signal(&self, signal: MediaSignal) -> bool {
        let listener = self.state.borrow().listener.clone();
        match listener {
            Some(listener) => {
                listener(signal);
                true
            }
            None => false,
        }
    }
}

impl MediaElement for SimMedia {
    fn current_time(&self) -> f64 {
        self.state.borrow().snapshot.position
    }

    fn duration(&self) -> f64 {
        self.state.borrow().snapshot.duration
    }

    fn volume(&self) -> f64 {
        self.state.borrow().snapshot.volume
    }

    fn set_volume(&mut self, volume: f64) -> HostResult<()> {
        let mut state = self.state.borrow_mut();
        state.snapshot.volume = if state.strict_volume {
            checked_volume(volume)?
        } else {
            volume
        };
        Ok(())
    }

    fn play(&mut self) -> HostResult<()> {
        let mut state = self.state.borrow_mut();
        if state.snapshot.source.is_none() {
            return Err(HostError::media("play", "no source"));
        }
        state.snapshot.playing = true;
        Ok(())
    }

    fn pause(&mut self) -> HostResult<()> {
        self.state.borrow_mut().snapshot.playing = false;
        Ok(())
    }

    fn set_source(&mut self, url: &str) -> HostResult<()> {
        let mut state = self.state.borrow_mut();
        state.snapshot.source = Some(url.to_string());
        state.snapshot.position = 0.0;
        Ok(())
    }

    fn clear_source(&mut self) -> HostResult<()> {
        self.state.borrow_mut().snapshot.source = None;
        Ok(())
    }

    fn attach_listener(&mut self, listener: MediaListener) -> HostResult<()> {
        self.state.borrow_mut().listener = Some(listener);
        Ok(())
    }

    fn detach_listener(&mut self) -> HostResult<()> {
        self.state.borrow_mut().listener = None;
        Ok(())
    }
}

// ============================================================================
// Overlay slot
// ============================================================================

/// One successful call on a [`SimFrameContainer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerOp {
    AddListener(ListenerId),
    CreateFrame(FrameId),
    ResizeFrame(FrameId, u32, u32),
    RemoveListener(ListenerId),
    RemoveFrame(FrameId),
}

struct SimFrame {
    id: FrameId,
    spec: FrameSpec,
    size: (u32, u32),
}

#[derive(Default)]
struct ContainerState {
    next_frame: u64,
    next_listener: u64,
    frames: Vec<SimFrame>,
    listeners: Vec<(ListenerId, MessageListener)>,
    journal: Vec<ContainerOp>,
    fail_creation: Option<String>,
    fail_removal: Option<String>,
}

/// Simulated overlay slot plus the window it posts messages on.
#[derive(Clone, Default)]
pub struct SimFrameContainer {
    state: Rc<RefCell<ContainerState>>,
}

impl SimFrameContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn journal(&self) -> Vec<ContainerOp> {
        self.state.borrow().journal.clone()
    }

    pub fn live_frames(&self) -> usize {
        self.state.borrow().frames.len()
    }

    pub fn listener_count(&self) -> usize {
        self.state.borrow().listeners.len()
    }

    pub fn frame_size(&self, frame: FrameId) -> Option<(u32, u32)> {
        let state = self.state.borrow();
        state.frames.iter().find(|f| f.id == frame).map(|f| f.size)
    }

    pub fn frame_spec(&self, frame: FrameId) -> Option<FrameSpec> {
        let state = self.state.borrow();
        state.frames.iter().find(|f| f.id == frame).map(|f| f.spec.clone())
    }

    /// Make the next `create_frame` fail.
    pub fn fail_frame_creation(&self, reason: impl Into<String>) {
        self.state.borrow_mut().fail_creation = Some(reason.into());
    }

    /// Make the next `remove_frame` fail.
    pub fn fail_frame_removal(&self, reason: impl Into<String>) {
        self.state.borrow_mut().fail_removal = Some(reason.into());
    }

    /// Post `payload` from inside the newest live frame, like the overlay's
    /// `window.parent.postMessage`. Returns how many listeners heard it.
    pub fn post_message(&self, payload: &Value) -> usize {
        let newest = self.state.borrow().frames.last().map(|frame| frame.id);
        match newest {
            Some(frame) => self.post_message_from(Some(frame), payload),
            None => 0,
        }
    }

    /// Post `payload` as `source`; `None` is some other window on the page.
    /// Only messages from a live frame of this container reach listeners.
    pub fn post_message_from(&self, source: Option<FrameId>, payload: &Value) -> usize {
        let listeners: Vec<MessageListener> = {
            let state = self.state.borrow();
            let from_own_frame =
                source.is_some_and(|id| state.frames.iter().any(|frame| frame.id == id));
            if !from_own_frame {
                return 0;
            }
            state
                .listeners
                .iter()
                .map(|(_, listener)| listener.clone())
                .collect()
        };
        for listener in &listeners {
            listener(payload);
        }
        listeners.len()
    }
}

impl FrameContainer for SimFrameContainer {
    fn create_frame(&mut self, spec: &FrameSpec) -> HostResult<FrameId> {
        let mut state = self.state.borrow_mut();
        if let Some(reason) = state.fail_creation.take() {
            return Err(HostError::FrameCreation(reason));
        }
        state.next_frame += 1;
        let id = FrameId(state.next_frame);
        state.frames.push(SimFrame {
            id,
            spec: spec.clone(),
            size: (spec.width, spec.height),
        });
        state.journal.push(ContainerOp::CreateFrame(id));
        Ok(id)
    }

    fn resize_frame(&mut self, frame: FrameId, width: u32, height: u32) -> HostResult<()> {
        let mut state = self.state.borrow_mut();
        let Some(target) = state.frames.iter_mut().find(|f| f.id == frame) else {
            return Err(HostError::FrameResize {
                frame,
                reason: "no such frame".into(),
            });
        };
        target.size = (width, height);
        state.journal.push(ContainerOp::ResizeFrame(frame, width, height));
        Ok(())
    }

    fn remove_frame(&mut self, frame: FrameId) -> HostResult<()> {
        let mut state = self.state.borrow_mut();
        if let Some(reason) = state.fail_removal.take() {
            // The node is gone either way; only the call failed.
            state.frames.retain(|f| f.id != frame);
            return Err(HostError::FrameRemoval { frame, reason });
        }
        let before = state.frames.len();
        state.frames.retain(|f| f.id != frame);
        if state.frames.len() == before {
            return Err(HostError::FrameRemoval {
                frame,
                reason: "no such frame".into(),
            });
        }
        state.journal.push(ContainerOp::RemoveFrame(frame));
        Ok(())
    }

    fn add_message_listener(&mut self, listener: MessageListener) -> HostResult<ListenerId> {
        let mut state = self.state.borrow_mut();
        state.next_listener += 1;
        let id = ListenerId(state.next_listener);
        state.listeners.push((id, listener));
        state.journal.push(ContainerOp::AddListener(id));
        Ok(id)
    }

    fn remove_message_listener(&mut self, listener: ListenerId) -> HostResult<()> {
        let mut state = self.state.borrow_mut();
        let before = state.listeners.len();
        state.listeners.retain(|(id, _)| *id != listener);
        if state.listeners.len() == before {
            return Err(HostError::ListenerRemoval {
                listener,
                reason: "not registered".into(),
            });
        }
        state.journal.push(ContainerOp::RemoveListener(listener));
        Ok(())
    }
}

// ============================================================================
// Beacons
// ============================================================================

#[derive(Default)]
struct BeaconLog {
    urls: Vec<Url>,
    fail_next: Option<String>,
}

/// Beacon sink that keeps every URL it was asked to fire.
#[derive(Clone, Default)]
pub struct RecordingBeacon {
    log: Rc<RefCell<BeaconLog>>,
}

impl RecordingBeacon {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn urls(&self) -> Vec<Url> {
        self.log.borrow().urls.clone()
    }

    /// The `event` parameter of every fired URL, in order.
    pub fn events(&self) -> Vec<String> {
        self.log
            .borrow()
            .urls
            .iter()
            .filter_map(|url| {
                url.query_pairs()
                    .find(|(key, _)| key == "event")
                    .map(|(_, value)| value.into_owned())
            })
            .collect()
    }

    /// Make the next fire fail.
    pub fn fail_next(&self, reason: impl Into<String>) {
        self.log.borrow_mut().fail_next = Some(reason.into());
    }
}

impl BeaconSink for RecordingBeacon {
    fn fire(&mut self, url: &Url) -> HostResult<()> {
        let mut log = self.log.borrow_mut();
        if let Some(reason) = log.fail_next.take() {
            return Err(HostError::Beacon(reason));
        }
        log.urls.push(url.clone());
        Ok(())
    }
}

// ============================================================================
// Host event log
// ============================================================================

/// Subscribes to every event name and keeps what arrives.
#[derive(Clone, Default)]
pub struct EventRecorder {
    events: Rc<RefCell<Vec<AdEvent>>>,
}

impl EventRecorder {
    pub fn attach(unit: &AdUnit) -> Self {
        let recorder = Self::default();
        for kind in AdEventKind::ALL {
            let events = recorder.events.clone();
            unit.subscribe(kind, move |event| events.borrow_mut().push(event.clone()));
        }
        recorder
    }

    pub fn events(&self) -> Vec<AdEvent> {
        self.events.borrow().clone()
    }

    pub fn kinds(&self) -> Vec<AdEventKind> {
        self.events.borrow().iter().map(AdEvent::kind).collect()
    }

    pub fn count(&self, kind: AdEventKind) -> usize {
        self.events
            .borrow()
            .iter()
            .filter(|event| event.kind() == kind)
            .count()
    }

    pub fn clear(&self) {
        self.events.borrow_mut().clear();
    }
}
