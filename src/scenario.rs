//! Scripted host sessions.
//!
//! A scenario is a YAML file describing a unit configuration, the simulated
//! video, and a list of steps: host calls, media ticks and raw overlay
//! messages. Running it drives an [`AdUnit`] backed by the `sim`
//! collaborators and reports what the host would have seen.
//!
//! ```yaml
//! name: watch-and-click
//! config:
//!   tracking_url: https://track.example.com/pixel
//! media_duration: 20
//! steps:
//!   - op: init
//!     width: 640
//!     height: 480
//!   - op: start
//!   - op: seek
//!     position: 11
//!   - op: message
//!     payload: { type: clickthrough }
//! expect:
//!   beacons: [impression, start, first_quartile, midpoint, click_through]
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use vpaid_types::{AdEvent, AdEventKind, CreativeData, ViewMode};

use crate::attributes::{AdAttributes, DEFAULT_BITRATE_KBPS};
use crate::config::{UnitConfig, DEFAULT_DURATION_SECS};
use crate::controller::{AdEnvironment, AdUnit, LifecycleState};
use crate::sim::{EventRecorder, RecordingBeacon, SimFrameContainer, SimMedia};

#[derive(Error, Debug)]
pub enum ScenarioError {
    #[error("failed to read scenario {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid scenario: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("scenario '{scenario}': expected {what} {expected}, got {actual}")]
    Expectation {
        scenario: String,
        what: &'static str,
        expected: String,
        actual: String,
    },
}

fn default_true() -> bool {
    true
}

fn default_duration() -> f64 {
    DEFAULT_DURATION_SECS
}

fn default_width() -> u32 {
    640
}

fn default_height() -> u32 {
    480
}

fn default_bitrate() -> u32 {
    DEFAULT_BITRATE_KBPS
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,

    #[serde(default)]
    pub config: UnitConfig,

    /// Duration of the simulated video, seconds.
    #[serde(default = "default_duration")]
    pub media_duration: f64,

    /// Hand the unit a video slot at init.
    #[serde(default = "default_true")]
    pub with_video: bool,

    /// Hand the unit an overlay slot at init.
    #[serde(default = "default_true")]
    pub with_slot: bool,

    pub steps: Vec<Step>,

    #[serde(default)]
    pub expect: Option<Expectation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    Init {
        #[serde(default = "default_width")]
        width: u32,
        #[serde(default = "default_height")]
        height: u32,
        #[serde(default)]
        view_mode: ViewMode,
        #[serde(default = "default_bitrate")]
        bitrate: u32,
        /// Raw `AdParameters` blob.
        #[serde(default)]
        ad_parameters: Option<String>,
    },
    Start,
    Stop,
    Skip,
    Resize {
        width: u32,
        height: u32,
        #[serde(default)]
        view_mode: ViewMode,
    },
    Pause,
    Resume,
    Expand,
    Collapse,
    SetVolume {
        value: f64,
    },
    /// Move the video playhead and emit `timeupdate`.
    Seek {
        position: f64,
    },
    Ended,
    MediaError {
        #[serde(default)]
        detail: Option<String>,
    },
    /// Post a raw payload on the window, as the overlay would.
    Message {
        payload: Value,
    },
}

impl Step {
    pub fn op(&self) -> &'static str {
        match self {
            Step::Init { .. } => "init",
            Step::Start => "start",
            Step::Stop => "stop",
            Step::Skip => "skip",
            Step::Resize { .. } => "resize",
            Step::Pause => "pause",
            Step::Resume => "resume",
            Step::Expand => "expand",
            Step::Collapse => "collapse",
            Step::SetVolume { .. } => "set_volume",
            Step::Seek { .. } => "seek",
            Step::Ended => "ended",
            Step::MediaError { .. } => "media_error",
            Step::Message { .. } => "message",
        }
    }
}

/// What a scenario asserts about its outcome. Absent fields are not checked.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Expectation {
    #[serde(default)]
    pub events: Option<Vec<AdEventKind>>,
    #[serde(default)]
    pub beacons: Option<Vec<String>>,
    #[serde(default)]
    pub final_state: Option<LifecycleState>,
}

/// Events produced by one step.
#[derive(Debug, Clone, Serialize)]
pub struct StepTrace {
    pub index: usize,
    pub op: &'static str,
    pub events: Vec<AdEvent>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    pub name: String,
    pub steps: Vec<StepTrace>,
    pub beacons: Vec<String>,
    pub final_state: LifecycleState,
    pub attributes: AdAttributes,
}

impl ReplayReport {
    /// Every emitted event, in order.
    pub fn events(&self) -> impl Iterator<Item = &AdEvent> {
        self.steps.iter().flat_map(|step| step.events.iter())
    }

    pub fn event_kinds(&self) -> Vec<AdEventKind> {
        self.events().map(AdEvent::kind).collect()
    }

    pub fn verify(&self, expect: &Expectation) -> Result<(), ScenarioError> {
        let mismatch = |what: &'static str, expected: String, actual: String| ScenarioError::Expectation {
            scenario: self.name.clone(),
            what,
            expected,
            actual,
        };

        if let Some(events) = &expect.events {
            let actual = self.event_kinds();
            if &actual != events {
                return Err(mismatch("events", format!("{events:?}"), format!("{actual:?}")));
            }
        }
        if let Some(beacons) = &expect.beacons {
            if &self.beacons != beacons {
                return Err(mismatch(
                    "beacons",
                    format!("{beacons:?}"),
                    format!("{:?}", self.beacons),
                ));
            }
        }
        if let Some(state) = expect.final_state {
            if self.final_state != state {
                return Err(mismatch(
                    "final state",
                    format!("{state:?}"),
                    format!("{:?}", self.final_state),
                ));
            }
        }
        Ok(())
    }
}

impl Scenario {
    pub fn from_yaml(source: &str) -> Result<Self, ScenarioError> {
        Ok(serde_yaml::from_str(source)?)
    }

    pub fn load(path: &Path) -> Result<Self, ScenarioError> {
        let source = std::fs::read_to_string(path).map_err(|source| ScenarioError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&source)
    }

    /// Drive a fresh unit through every step.
    pub fn run(&self) -> ReplayReport {
        let media = SimMedia::new(self.media_duration);
        let container = SimFrameContainer::new();
        let beacon = RecordingBeacon::new();

        let unit = AdUnit::with_beacon_sink(self.config.clone(), Box::new(beacon.clone()));
        let recorder = EventRecorder::attach(&unit);

        let mut steps = Vec::with_capacity(self.steps.len());
        for (index, step) in self.steps.iter().enumerate() {
            recorder.clear();
            tracing::debug!(index, op = step.op(), "step");
            self.apply(step, &unit, &media, &container);
            steps.push(StepTrace {
                index,
                op: step.op(),
                events: recorder.events(),
            });
        }

        ReplayReport {
            name: self.name.clone(),
            steps,
            beacons: beacon.events(),
            final_state: unit.state(),
            attributes: unit.attributes(),
        }
    }

    /// Run, then check the scenario's own expectations.
    pub fn run_and_verify(&self) -> Result<ReplayReport, ScenarioError> {
        let report = self.run();
        if let Some(expect) = &self.expect {
            report.verify(expect)?;
        }
        Ok(report)
    }

    fn apply(&self, step: &Step, unit: &AdUnit, media: &SimMedia, container: &SimFrameContainer) {
        match step {
            Step::Init {
                width,
                height,
                view_mode,
                bitrate,
                ad_parameters,
            } => {
                let mut environment = AdEnvironment::new();
                if self.with_slot {
                    environment = environment.with_slot(Box::new(container.clone()));
                }
                if self.with_video {
                    environment = environment.with_video_slot(Box::new(media.clone()));
                }
                let creative = CreativeData {
                    ad_parameters: ad_parameters.clone(),
                };
                unit.init_ad(*width, *height, *view_mode, *bitrate, &creative, environment);
            }
            Step::Start => unit.start_ad(),
            Step::Stop => unit.stop_ad(),
            Step::Skip => unit.skip_ad(),
            Step::Resize {
                width,
                height,
                view_mode,
            } => unit.resize_ad(*width, *height, *view_mode),
            Step::Pause => unit.pause_ad(),
            Step::Resume => unit.resume_ad(),
            Step::Expand => unit.expand_ad(),
            Step::Collapse => unit.collapse_ad(),
            Step::SetVolume { value } => unit.set_ad_volume(*value),
            Step::Seek { position } => media.seek(*position),
            Step::Ended => media.finish(),
            Step::MediaError { detail } => media.fail(detail.as_deref()),
            Step::Message { payload } => {
                container.post_message(payload);
            }
        }
    }
}
