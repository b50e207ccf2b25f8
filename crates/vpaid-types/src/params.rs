//! Creative data handed to the unit at `initAd` time.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Creative data as delivered by the host. The VPAID field is `AdParameters`,
/// an opaque string the ad unit interprets itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreativeData {
    #[serde(
        rename = "AdParameters",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub ad_parameters: Option<String>,
}

impl CreativeData {
    pub fn new(ad_parameters: impl Into<String>) -> Self {
        Self {
            ad_parameters: Some(ad_parameters.into()),
        }
    }

    /// Parse the parameter blob, if there is one.
    pub fn parameters(&self) -> Option<Result<AdParameters, ParamsError>> {
        self.ad_parameters.as_deref().map(AdParameters::parse)
    }
}

/// Overrides carried in the `AdParameters` blob.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdParameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overlay_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub click_through: Option<String>,
}

#[derive(Debug, Error)]
pub enum ParamsError {
    #[error("ad parameters are not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("ad parameters must be a JSON object, found {found}")]
    NotAnObject { found: &'static str },
}

impl AdParameters {
    /// Parse a parameter blob.
    ///
    /// Fields are picked one by one: a field that is missing, empty, or not
    /// a string is simply absent, and never spoils the others.
    pub fn parse(blob: &str) -> Result<Self, ParamsError> {
        let value: Value = serde_json::from_str(blob)?;
        let object = value.as_object().ok_or(ParamsError::NotAnObject {
            found: json_kind(&value),
        })?;

        let pick = |key: &str| {
            object
                .get(key)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
        };

        Ok(Self {
            video_url: pick("videoUrl"),
            overlay_url: pick("overlayUrl"),
            click_through: pick("clickThrough"),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.video_url.is_none() && self.overlay_url.is_none() && self.click_through.is_none()
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
