//! Ad attribute store
//!
//! The property bag a VPAID host reads through the `getAd*` getters. It is
//! owned by the controller and only ever mutated by controller operations.

use serde::Serialize;
use vpaid_types::ViewMode;

use crate::config::UnitConfig;

/// Bitrate (kbps) reported before the host asks for one.
pub const DEFAULT_BITRATE_KBPS: u32 = 256;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdAttributes {
    pub companions: String,
    pub desired_bitrate: u32,
    /// Seconds. Only ever replaced by a finite duration from the media.
    pub duration: f64,
    pub expanded: bool,
    pub width: u32,
    pub height: u32,
    pub icons: String,
    pub linear: bool,
    /// Seconds. Never negative.
    pub remaining_time: f64,
    pub skippable_state: bool,
    pub view_mode: ViewMode,
    pub volume: f64,
}

impl Default for AdAttributes {
    fn default() -> Self {
        Self {
            companions: String::new(),
            desired_bitrate: DEFAULT_BITRATE_KBPS,
            duration: crate::config::DEFAULT_DURATION_SECS,
            expanded: false,
            width: 0,
            height: 0,
            icons: String::new(),
            linear: true,
            remaining_time: crate::config::DEFAULT_DURATION_SECS,
            skippable_state: false,
            view_mode: ViewMode::Normal,
            volume: 1.0,
        }
    }
}

/// Owner of [`AdAttributes`].
#[derive(Debug, Clone, Default)]
pub struct AttributeStore {
    attrs: AdAttributes,
}

impl AttributeStore {
    pub fn new(config: &UnitConfig) -> Self {
        Self {
            attrs: AdAttributes {
                duration: config.default_duration,
                remaining_time: config.default_duration.max(0.0),
                skippable_state: config.skippable,
                ..AdAttributes::default()
            },
        }
    }

    pub fn get(&self) -> &AdAttributes {
        &self.attrs
    }

    pub fn apply_init(&mut self, width: u32, height: u32, view_mode: ViewMode, desired_bitrate: u32) {
        self.attrs.width = width;
        self.attrs.height = height;
        self.attrs.view_mode = view_mode;
        self.attrs.desired_bitrate = desired_bitrate;
    }

    pub fn apply_resize(&mut self, width: u32, height: u32, view_mode: ViewMode) {
        self.attrs.width = width;
        self.attrs.height = height;
        self.attrs.view_mode = view_mode;
    }

    pub fn set_volume(&mut self, volume: f64) {
        self.attrs.volume = volume;
    }

    pub fn set_expanded(&mut self, expanded: bool) {
        self.attrs.expanded = expanded;
    }

    /// Record what the media last reported.
    ///
    /// The duration is stored whenever it is finite; remaining time only
    /// when the duration is also positive, so a media element that has not
    /// loaded metadata yet leaves the previous values in place.
    pub fn record_playback(&mut self, duration: f64, position: f64) {
        if !duration.is_finite() {
            return;
        }
        self.attrs.duration = duration;
        if duration > 0.0 && position.is_finite() {
            self.attrs.remaining_time = (duration - position).max(0.0);
        }
    }

    /// Playback reached the end: nothing remains, whatever the last tick said.
    pub fn record_completion(&mut self, duration: f64) {
        if duration.is_finite() {
            self.attrs.duration = duration;
        }
        self.attrs.remaining_time = 0.0;
    }
}
