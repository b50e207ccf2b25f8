//! Shared VPAID wire vocabulary
//!
//! Every type that crosses a boundary of the playable ad unit lives here:
//!
//! ```text
//! ┌──────────────┐  AdEvent     ┌──────────────┐  OverlayMessage  ┌──────────────┐
//! │  Host player │ ◄─────────── │   Ad unit    │ ◄─────────────── │   Overlay    │
//! │  (VPAID 2.0) │ ───────────► │              │                  │   (iframe)   │
//! └──────────────┘  CreativeData└──────────────┘                  └──────────────┘
//! ```
//!
//! ## Rules
//!
//! 1. Event names are the exact, case-sensitive VPAID names
//! 2. Inbound payloads are parsed leniently and never trusted
//! 3. No platform dependencies - this crate builds for `wasm32` unchanged

mod event;
mod message;
mod params;
mod view_mode;

pub use event::{AdEvent, AdEventKind, UnknownEventName};
pub use message::{OverlayIntent, OverlayMessage};
pub use params::{AdParameters, CreativeData, ParamsError};
pub use view_mode::{UnknownViewMode, ViewMode};

/// VPAID protocol version negotiated with the host.
pub const VPAID_VERSION: &str = "2.0";
