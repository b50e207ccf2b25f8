//! Overlay message bridge
//!
//! Owns the sandboxed overlay frame and the one window-message listener that
//! hears from it. Inbound payloads are validated with [`OverlayMessage`] and
//! translated into host-facing events.
//!
//! ```text
//! overlay iframe ──postMessage──► listener ──► AdUnit::handle_overlay_message
//!                                                  │
//!                                                  ▼
//!                                     OverlayMessageBridge::translate
//!                                          │               │
//!                                     Emit(AdEvent)       Stop
//! ```

use std::fmt;
use std::rc::Rc;

use serde_json::Value;
use vpaid_types::{AdEvent, OverlayIntent, OverlayMessage};

use crate::error::HostResult;

/// Handle to a frame created by a [`FrameContainer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameId(pub u64);

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "frame#{}", self.0)
    }
}

/// Token for a registered message listener. Removing a listener requires
/// the exact token its registration returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener#{}", self.0)
    }
}

/// Receives raw message payloads posted to the host window.
pub type MessageListener = Rc<dyn Fn(&Value)>;

/// Full-size wrapper that lets clicks fall through to the video.
pub const WRAPPER_STYLE: &str =
    "position:absolute;top:0;left:0;width:100%;height:100%;pointer-events:none;z-index:1000;";

/// Borderless, transparent frame that takes pointer events back.
pub const FRAME_STYLE: &str =
    "width:100%;height:100%;border:none;pointer-events:auto;background:transparent;";

pub const FRAME_ALLOW: &str = "autoplay; fullscreen";

/// Everything a container needs to render the overlay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSpec {
    pub url: String,
    pub width: u32,
    pub height: u32,
    pub sandbox: String,
    pub wrapper_style: &'static str,
    pub frame_style: &'static str,
    pub allow: &'static str,
    pub allow_fullscreen: bool,
}

impl FrameSpec {
    pub fn new(url: impl Into<String>, width: u32, height: u32, sandbox: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            width,
            height,
            sandbox: sandbox.into(),
            wrapper_style: WRAPPER_STYLE,
            frame_style: FRAME_STYLE,
            allow: FRAME_ALLOW,
            allow_fullscreen: true,
        }
    }
}

/// Host-side surface the overlay is mounted in (the VPAID `slot`).
pub trait FrameContainer {
    fn create_frame(&mut self, spec: &FrameSpec) -> HostResult<FrameId>;

    fn resize_frame(&mut self, frame: FrameId, width: u32, height: u32) -> HostResult<()>;

    fn remove_frame(&mut self, frame: FrameId) -> HostResult<()>;

    /// Register a window-level message listener. Only messages posted by a
    /// frame this container created may reach it.
    fn add_message_listener(&mut self, listener: MessageListener) -> HostResult<ListenerId>;

    fn remove_message_listener(&mut self, listener: ListenerId) -> HostResult<()>;
}

/// What the controller should do with a validated message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeAction {
    Emit(AdEvent),
    Stop,
}

#[derive(Debug, Clone, Copy)]
struct OpenChannel {
    frame: FrameId,
    listener: ListenerId,
}

/// Lifetime owner of the overlay frame and its message listener.
pub struct OverlayMessageBridge {
    container: Option<Box<dyn FrameContainer>>,
    channel: Option<OpenChannel>,
    click_through: String,
    fallback_interaction_id: String,
}

impl OverlayMessageBridge {
    pub fn new(
        container: Option<Box<dyn FrameContainer>>,
        click_through: impl Into<String>,
        fallback_interaction_id: impl Into<String>,
    ) -> Self {
        Self {
            container,
            channel: None,
            click_through: click_through.into(),
            fallback_interaction_id: fallback_interaction_id.into(),
        }
    }

    /// A bridge with nowhere to mount a frame.
    pub fn detached() -> Self {
        Self::new(None, String::new(), String::new())
    }

    pub fn is_open(&self) -> bool {
        self.channel.is_some()
    }

    /// Register `listener` and create the frame.
    ///
    /// Returns `Ok(false)` without touching the container when there is no
    /// container or a frame is already open. If frame creation fails the
    /// listener registration is rolled back.
    pub fn open(&mut self, spec: &FrameSpec, listener: MessageListener) -> HostResult<bool> {
        if self.channel.is_some() {
            tracing::debug!("overlay already open");
            return Ok(false);
        }
        let Some(container) = self.container.as_mut() else {
            return Ok(false);
        };

        let listener = container.add_message_listener(listener)?;
        let frame = match container.create_frame(spec) {
            Ok(frame) => frame,
            Err(err) => {
                if let Err(rollback) = container.remove_message_listener(listener) {
                    tracing::warn!(error = %rollback, "failed to roll back overlay listener");
                }
                return Err(err);
            }
        };

        tracing::debug!(%frame, %listener, url = %spec.url, "overlay opened");
        self.channel = Some(OpenChannel { frame, listener });
        Ok(true)
    }

    pub fn resize(&mut self, width: u32, height: u32) -> HostResult<()> {
        match (self.channel, self.container.as_mut()) {
            (Some(channel), Some(container)) => container.resize_frame(channel.frame, width, height),
            _ => Ok(()),
        }
    }

    /// Unregister the listener, then remove the frame.
    ///
    /// Safe to call with nothing open. Failures are logged and swallowed.
    /// Returns whether a channel was open.
    pub fn close(&mut self) -> bool {
        let Some(channel) = self.channel.take() else {
            return false;
        };
        let Some(container) = self.container.as_mut() else {
            return true;
        };

        if let Err(err) = container.remove_message_listener(channel.listener) {
            tracing::warn!(error = %err, "overlay listener removal failed");
        }
        if let Err(err) = container.remove_frame(channel.frame) {
            tracing::warn!(error = %err, "overlay frame removal failed");
        }
        tracing::debug!(frame = %channel.frame, "overlay closed");
        true
    }

    /// Validate a raw payload and decide what it means.
    pub fn translate(&self, payload: &Value) -> Option<BridgeAction> {
        let Some(message) = OverlayMessage::from_value(payload) else {
            tracing::trace!(%payload, "ignoring overlay message");
            return None;
        };

        let action = match message.intent {
            OverlayIntent::ClickThrough => {
                BridgeAction::Emit(AdEvent::click_thru(self.click_through.clone()))
            }
            OverlayIntent::Close => BridgeAction::Stop,
            OverlayIntent::Interaction => BridgeAction::Emit(AdEvent::interaction(
                message
                    .id
                    .unwrap_or_else(|| self.fallback_interaction_id.clone()),
            )),
        };
        Some(action)
    }
}

impl fmt::Debug for OverlayMessageBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OverlayMessageBridge")
            .field("has_container", &self.container.is_some())
            .field("channel", &self.channel)
            .field("click_through", &self.click_through)
            .finish()
    }
}
