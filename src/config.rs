//! Configuration: application settings from TOML and per-viewer visual
//! settings received from the discussion channel.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ReplayError, Result};
use crate::model::{Viewer, ViewerRole};
use crate::replay::OrderMode;

/// Which insight panels a viewer sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VisualConfig {
    pub graph: bool,
    pub alerts: bool,
    #[serde(alias = "statistics_user")]
    pub statistics_user: bool,
    #[serde(alias = "statistics_discussion")]
    pub statistics_discussion: bool,
}

impl Default for VisualConfig {
    fn default() -> Self {
        Self {
            graph: true,
            alerts: true,
            statistics_user: true,
            statistics_discussion: true,
        }
    }
}

/// A partial update, as sent by a moderator. Absent fields are unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualConfigPatch {
    pub graph: Option<bool>,
    pub alerts: Option<bool>,
    pub statistics_user: Option<bool>,
    pub statistics_discussion: Option<bool>,
}

impl VisualConfig {
    pub fn apply(&mut self, patch: &VisualConfigPatch) {
        if let Some(v) = patch.graph {
            self.graph = v;
        }
        if let Some(v) = patch.alerts {
            self.alerts = v;
        }
        if let Some(v) = patch.statistics_user {
            self.statistics_user = v;
        }
        if let Some(v) = patch.statistics_discussion {
            self.statistics_discussion = v;
        }
    }

    /// Settings a viewer starts with: elevated viewers see everything, users
    /// get their own settings if any, else the discussion defaults.
    pub fn resolve(viewer: &Viewer, discussion: VisualConfig, user: Option<VisualConfig>) -> Self {
        if viewer.is_elevated() {
            return Self::default();
        }
        user.unwrap_or(discussion)
    }
}

// ---------------------------------------------------------------------------
// AppConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerSection {
    pub username: String,
    pub role: ViewerRole,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplaySection {
    pub order: OrderMode,
    /// Delay between automatic steps.
    pub autoplay_interval_ms: u64,
}

impl Default for ReplaySection {
    fn default() -> Self {
        Self {
            order: OrderMode::Chronological,
            autoplay_interval_ms: 1_000,
        }
    }
}

/// Top-level settings file.
///
/// ```toml
/// [viewer]
/// username = "ann"
/// role = "MODERATOR"
///
/// [replay]
/// order = "regular"
/// autoplay_interval_ms = 500
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub viewer: ViewerSection,
    pub replay: ReplaySection,
    /// Snake-case keys (`statistics_user`) are accepted here.
    pub visual: VisualConfig,
}

impl AppConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.replay.autoplay_interval_ms == 0 {
            return Err(ReplayError::InvalidConfig(
                "replay.autoplay_interval_ms must be > 0".into(),
            ));
        }
        Ok(())
    }

    pub fn viewer(&self) -> Viewer {
        Viewer::new(self.viewer.username.clone(), self.viewer.role)
    }

    pub fn autoplay_interval(&self) -> Duration {
        Duration::from_millis(self.replay.autoplay_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_uses_defaults() {
        let cfg = AppConfig::from_toml_str("").unwrap();
        assert_eq!(cfg, AppConfig::default());
        assert_eq!(cfg.replay.order, OrderMode::Chronological);
        assert_eq!(cfg.autoplay_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_full_toml() {
        let cfg = AppConfig::from_toml_str(
            r#"
            [viewer]
            username = "ann"
            role = "MODERATOR"

            [replay]
            order = "regular"
            autoplay_interval_ms = 250

            [visual]
            graph = false
            statistics_user = false
            "#,
        )
        .unwrap();
        assert_eq!(cfg.viewer(), Viewer::new("ann", ViewerRole::Moderator));
        assert_eq!(cfg.replay.order, OrderMode::Regular);
        assert_eq!(cfg.autoplay_interval(), Duration::from_millis(250));
        assert!(!cfg.visual.graph);
        assert!(cfg.visual.alerts);
        assert!(!cfg.visual.statistics_user);
    }

    #[test]
    fn test_zero_interval_rejected() {
        let err = AppConfig::from_toml_str("[replay]\nautoplay_interval_ms = 0").unwrap_err();
        assert!(matches!(err, ReplayError::InvalidConfig(_)));
    }

    #[test]
    fn test_bad_toml_is_toml_error() {
        let err = AppConfig::from_toml_str("[viewer\n").unwrap_err();
        assert!(matches!(err, ReplayError::Toml(_)));
    }

    #[test]
    fn test_visual_config_wire_names() {
        let v: VisualConfig = serde_json::from_str(
            r#"{"graph": true, "alerts": false, "statisticsUser": false, "statisticsDiscussion": true}"#,
        )
        .unwrap();
        assert!(!v.alerts);
        assert!(!v.statistics_user);
    }

    #[test]
    fn test_patch_only_touches_present_fields() {
        let mut v = VisualConfig::default();
        v.apply(&VisualConfigPatch {
            graph: Some(false),
            ..Default::default()
        });
        assert!(!v.graph);
        assert!(v.alerts);
    }

    #[test]
    fn test_resolve_prefers_user_settings_for_users() {
        let user = Viewer::new("u", ViewerRole::User);
        let discussion = VisualConfig {
            graph: false,
            ..Default::default()
        };
        let own = VisualConfig {
            alerts: false,
            ..Default::default()
        };
        assert_eq!(VisualConfig::resolve(&user, discussion, Some(own)), own);
        assert_eq!(VisualConfig::resolve(&user, discussion, None), discussion);
        let moderator = Viewer::new("m", ViewerRole::Moderator);
        assert_eq!(
            VisualConfig::resolve(&moderator, discussion, None),
            VisualConfig::default()
        );
    }
}
