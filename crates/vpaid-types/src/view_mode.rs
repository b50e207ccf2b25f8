//! Player view modes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// How the host is currently presenting the ad.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    #[default]
    Normal,
    Fullscreen,
    Thumbnail,
}

impl ViewMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            ViewMode::Normal => "normal",
            ViewMode::Fullscreen => "fullscreen",
            ViewMode::Thumbnail => "thumbnail",
        }
    }
}

impl fmt::Display for ViewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown view mode '{0}'")]
pub struct UnknownViewMode(pub String);

impl FromStr for ViewMode {
    type Err = UnknownViewMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(ViewMode::Normal),
            "fullscreen" => Ok(ViewMode::Fullscreen),
            "thumbnail" => Ok(ViewMode::Thumbnail),
            other => Err(UnknownViewMode(other.to_string())),
        }
    }
}
