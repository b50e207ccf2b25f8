//! Unit configuration.
//!
//! Where the unit's assets live and how it behaves. The asset base is
//! injected rather than discovered from the page's script tags.

use serde::{Deserialize, Serialize};
use url::Url;
use vpaid_types::AdParameters;

/// Video file served next to the unit when no `videoUrl` override is given.
pub const DEFAULT_VIDEO_FILE: &str = "cookingVideo.mp4";

/// Hosted playable loaded into the overlay frame.
pub const DEFAULT_OVERLAY_URL: &str =
    "https://tech-iion.github.io/advertiser-creatives/allkindsLandscape/";

pub const DEFAULT_CLICK_THROUGH: &str = "https://yourdomain.com/clickthrough";

/// Sandbox tokens for the overlay frame. Popups must escape the sandbox so
/// store pages open normally.
pub const DEFAULT_FRAME_SANDBOX: &str =
    "allow-scripts allow-same-origin allow-popups allow-popups-to-escape-sandbox";

/// Interaction id reported when the overlay does not send one.
pub const FALLBACK_INTERACTION_ID: &str = "overlay_interaction";

/// Stored duration (and remaining time) before any media reports its own.
pub const DEFAULT_DURATION_SECS: f64 = 30.0;

/// What `set_ad_volume` does with values outside `[0, 1]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumePolicy {
    /// Store and forward the value exactly as the host gave it.
    #[default]
    Permissive,
    /// Clamp into `[0, 1]`; NaN becomes silence.
    Clamp,
}

impl VolumePolicy {
    pub fn apply(self, value: f64) -> f64 {
        match self {
            VolumePolicy::Permissive => value,
            VolumePolicy::Clamp if value.is_nan() => 0.0,
            VolumePolicy::Clamp => value.clamp(0.0, 1.0),
        }
    }
}

/// Configuration for one ad unit instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnitConfig {
    /// Base URL the unit's own assets are served from.
    pub asset_base: Option<Url>,

    /// File name (relative to `asset_base`) of the default video.
    pub default_video_file: String,

    pub overlay_url: String,

    pub click_through: String,

    /// Beacon endpoint. Tracking is off when unset.
    pub tracking_url: Option<Url>,

    pub volume_policy: VolumePolicy,

    /// Initial `skippableState` reported to the host.
    pub skippable: bool,

    /// Stored duration reported until media is bound.
    pub default_duration: f64,

    /// `sandbox` attribute of the overlay frame.
    pub frame_sandbox: String,

    pub fallback_interaction_id: String,
}

impl Default for UnitConfig {
    fn default() -> Self {
        Self {
            asset_base: None,
            default_video_file: DEFAULT_VIDEO_FILE.to_string(),
            overlay_url: DEFAULT_OVERLAY_URL.to_string(),
            click_through: DEFAULT_CLICK_THROUGH.to_string(),
            tracking_url: None,
            volume_policy: VolumePolicy::default(),
            skippable: false,
            default_duration: DEFAULT_DURATION_SECS,
            frame_sandbox: DEFAULT_FRAME_SANDBOX.to_string(),
            fallback_interaction_id: FALLBACK_INTERACTION_ID.to_string(),
        }
    }
}

impl UnitConfig {
    /// Serve default assets from `base`.
    pub fn with_asset_base(mut self, base: Url) -> Self {
        self.asset_base = Some(base);
        self
    }

    pub fn overlay_url(mut self, url: impl Into<String>) -> Self {
        self.overlay_url = url.into();
        self
    }

    pub fn click_through(mut self, url: impl Into<String>) -> Self {
        self.click_through = url.into();
        self
    }

    pub fn tracking_url(mut self, url: Url) -> Self {
        self.tracking_url = Some(url);
        self
    }

    pub fn volume_policy(mut self, policy: VolumePolicy) -> Self {
        self.volume_policy = policy;
        self
    }

    pub fn skippable(mut self, skippable: bool) -> Self {
        self.skippable = skippable;
        self
    }

    pub fn default_duration(mut self, secs: f64) -> Self {
        self.default_duration = secs;
        self
    }

    /// Default video URL: the video file resolved against the asset base,
    /// or the bare file name when no base is known.
    pub fn default_video_url(&self) -> String {
        match &self.asset_base {
            Some(base) => base
                .join(&self.default_video_file)
                .map(String::from)
                .unwrap_or_else(|_| self.default_video_file.clone()),
            None => self.default_video_file.clone(),
        }
    }

    /// Apply `AdParameters` overrides on top of the configured defaults.
    pub fn resolve(&self, params: Option<&AdParameters>) -> ResolvedCreative {
        let params = params.cloned().unwrap_or_default();
        ResolvedCreative {
            video_url: params
                .video_url
                .unwrap_or_else(|| self.default_video_url()),
            overlay_url: params
                .overlay_url
                .unwrap_or_else(|| self.overlay_url.clone()),
            click_through: params
                .click_through
                .unwrap_or_else(|| self.click_through.clone()),
        }
    }
}

/// Creative URLs in effect for the current ad.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedCreative {
    pub video_url: String,
    pub overlay_url: String,
    pub click_through: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = UnitConfig::default();
        assert_eq!(config.asset_base, None);
        assert_eq!(config.default_video_url(), "cookingVideo.mp4");
        assert_eq!(config.click_through, DEFAULT_CLICK_THROUGH);
        assert_eq!(config.volume_policy, VolumePolicy::Permissive);
        assert!(!config.skippable);
        assert_eq!(config.default_duration, 30.0);
    }

    #[test]
    fn test_asset_base_join() {
        let base = Url::parse("https://cdn.example.com/creatives/current/vpaid_playable.js").unwrap();
        let config = UnitConfig::default().with_asset_base(base);
        assert_eq!(
            config.default_video_url(),
            "https://cdn.example.com/creatives/current/cookingVideo.mp4"
        );
    }

    #[test]
    fn test_resolve_overrides() {
        let config = UnitConfig::default().click_through("https://brand.example/buy");
        let params = AdParameters {
            video_url: Some("https://x/a.mp4".into()),
            overlay_url: None,
            click_through: None,
        };

        let creative = config.resolve(Some(&params));
        assert_eq!(creative.video_url, "https://x/a.mp4");
        assert_eq!(creative.overlay_url, DEFAULT_OVERLAY_URL);
        assert_eq!(creative.click_through, "https://brand.example/buy");

        let creative = config.resolve(None);
        assert_eq!(creative.video_url, DEFAULT_VIDEO_FILE);
    }

    #[test]
    fn test_volume_policy() {
        assert_eq!(VolumePolicy::Permissive.apply(1.7), 1.7);
        assert_eq!(VolumePolicy::Permissive.apply(-0.5), -0.5);
        assert_eq!(VolumePolicy::Clamp.apply(1.7), 1.0);
        assert_eq!(VolumePolicy::Clamp.apply(-0.5), 0.0);
        assert_eq!(VolumePolicy::Clamp.apply(0.3), 0.3);
        assert_eq!(VolumePolicy::Clamp.apply(f64::NAN), 0.0);
    }

    #[test]
    fn test_builder_pattern() {
        let config = UnitConfig::default()
            .skippable(true)
            .default_duration(15.0)
            .volume_policy(VolumePolicy::Clamp)
            .overlay_url("https://games.example/play/");

        assert!(config.skippable);
        assert_eq!(config.default_duration, 15.0);
        assert_eq!(config.volume_policy, VolumePolicy::Clamp);
        assert_eq!(config.overlay_url, "https://games.example/play/");
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: UnitConfig = serde_yaml::from_str(
            "skippable: true\ntracking_url: https://t.example/pixel\nvolume_policy: clamp\n",
        )
        .unwrap();
        assert!(config.skippable);
        assert_eq!(config.volume_policy, VolumePolicy::Clamp);
        assert_eq!(
            config.tracking_url.as_ref().map(Url::as_str),
            Some("https://t.example/pixel")
        );
        assert_eq!(config.overlay_url, DEFAULT_OVERLAY_URL);
    }
}
