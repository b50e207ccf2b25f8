//! Error types for the ad unit's collaborators.
//!
//! None of these ever reach the host: the `AdUnit` methods are the boundary
//! where a failure is either turned into an `AdError` event or logged and
//! swallowed.

use thiserror::Error;

use crate::overlay::{FrameId, ListenerId};

/// Failure reported by a host-owned collaborator (media element, frame
/// container or beacon sink).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    #[error("frame creation failed: {0}")]
    FrameCreation(String),

    #[error("{frame} could not be resized: {reason}")]
    FrameResize { frame: FrameId, reason: String },

    #[error("{frame} could not be removed: {reason}")]
    FrameRemoval { frame: FrameId, reason: String },

    #[error("message listener registration failed: {0}")]
    ListenerRegistration(String),

    #[error("{listener} could not be removed: {reason}")]
    ListenerRemoval { listener: ListenerId, reason: String },

    #[error("media operation '{op}' failed: {reason}")]
    Media { op: &'static str, reason: String },

    #[error("beacon request failed: {0}")]
    Beacon(String),
}

impl HostError {
    pub fn media(op: &'static str, reason: impl Into<String>) -> Self {
        HostError::Media {
            op,
            reason: reason.into(),
        }
    }
}

/// Result type for collaborator calls
pub type HostResult<T> = Result<T, HostError>;
