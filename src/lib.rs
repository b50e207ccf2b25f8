//! Playable VPAID 2.0 ad unit
//!
//! A linear video ad with an interactive overlay. The host player drives
//! the unit through the VPAID lifecycle; the unit plays the host's video
//! element, mounts a sandboxed overlay frame in the host's slot and turns
//! the overlay's `postMessage` traffic into VPAID events.
//!
//! ```text
//!                    ┌───────────────────────── AdUnit ─────────────────────────┐
//!  host calls ─────► │ lifecycle state ─► AttributeStore                         │
//!                    │        │                                                  │
//!  videoSlot ◄─────► │ VideoMediaBinding ──quartiles──┐                          │
//!                    │                                ├─► EventDispatcher ─────► │ ──► host callbacks
//!  slot / window ◄─► │ OverlayMessageBridge ──intents─┘        │                 │
//!                    │                                   BeaconTracker ────────► │ ──► beacon sink
//!                    └───────────────────────────────────────────────────────────┘
//! ```
//!
//! Host surfaces are reached only through the [`MediaElement`],
//! [`FrameContainer`] and [`BeaconSink`] traits. The `sim` module provides
//! in-memory versions; the `web` feature provides DOM-backed ones and the
//! `getVPAIDAd()` export.

pub mod attributes;
pub mod config;
pub mod controller;
pub mod dispatcher;
pub mod error;
pub mod media;
pub mod overlay;
pub mod scenario;
pub mod sim;
pub mod tracking;

#[cfg(feature = "web")]
pub mod web;

pub use attributes::{AdAttributes, AttributeStore};
pub use config::{ResolvedCreative, UnitConfig, VolumePolicy};
pub use controller::{AdEnvironment, AdUnit, LifecycleState, WeakAdUnit};
pub use dispatcher::{AdEventCallback, EventDispatcher};
pub use error::{HostError, HostResult};
pub use media::{MediaElement, MediaListener, MediaSignal, Quartile, QuartileMarkers, VideoMediaBinding};
pub use overlay::{
    BridgeAction, FrameContainer, FrameId, FrameSpec, ListenerId, MessageListener, OverlayMessageBridge,
};
pub use tracking::{BeaconSink, BeaconTracker};

pub use vpaid_types::{
    AdEvent, AdEventKind, AdParameters, CreativeData, OverlayIntent, OverlayMessage, ParamsError,
    ViewMode, VPAID_VERSION,
};
