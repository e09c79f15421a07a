//! Bridge configuration.
//!
//! Loaded from a TOML file, then overridden by `ATLAS_BRIDGE_*` environment
//! variables. Every field has a default so a partial file is valid.

use std::path::{Path, PathBuf};

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::{EngineConfig, SensorMode};
use crate::geometry::SE3;
use crate::reference::{global_offset, AnchorRule};

/// Prefix of environment variables that override file values.
pub const ENV_PREFIX: &str = "ATLAS_BRIDGE_";

/// Forward validity padding applied to the map→odom transform stamp (s).
pub const DEFAULT_TF_PADDING_S: f64 = 0.5;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] figment::Error),
    #[error("{0} must not be empty")]
    EmptyPath(&'static str),
    #[error("robot start position ({0}, {1}) is not finite")]
    BadStart(f64, f64),
    #[error("transform padding {0} must be finite and non-negative")]
    BadPadding(f64),
    #[error("frame name {0} must not be empty")]
    EmptyFrame(&'static str),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub vocabulary_path: PathBuf,
    pub settings_path: PathBuf,
    pub sensor: SensorMode,
    /// Engine's own viewer window.
    pub enable_viewer: bool,
    /// Publish the global map to an external visualizer.
    pub enable_visualization: bool,
    pub global_frame: String,
    pub odom_frame: String,
    /// Robot start position in the global frame (m).
    pub robot_x: f64,
    pub robot_y: f64,
    /// Added to the odometry stamp of the map→odom transform (s).
    pub tf_padding_s: f64,
    pub anchor: AnchorRule,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            vocabulary_path: PathBuf::from("ORBvoc.txt"),
            settings_path: PathBuf::from("settings.yaml"),
            sensor: SensorMode::Rgbd,
            enable_viewer: false,
            enable_visualization: false,
            global_frame: "map".to_string(),
            odom_frame: "odom".to_string(),
            robot_x: 0.0,
            robot_y: 0.0,
            tf_padding_s: DEFAULT_TF_PADDING_S,
            anchor: AnchorRule::default(),
        }
    }
}

impl BridgeConfig {
    /// Load from `path` (if it exists) merged over defaults, then apply
    /// environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_figment(
            Figment::from(Serialized::defaults(Self::default()))
                .merge(Toml::file(path.as_ref()))
                .merge(Env::prefixed(ENV_PREFIX)),
        )
    }

    /// Parse from a TOML string, without environment overrides.
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        Self::from_figment(
            Figment::from(Serialized::defaults(Self::default())).merge(Toml::string(toml)),
        )
    }

    fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.vocabulary_path.as_os_str().is_empty() {
            return Err(ConfigError::EmptyPath("vocabulary_path"));
        }
        if self.settings_path.as_os_str().is_empty() {
            return Err(ConfigError::EmptyPath("settings_path"));
        }
        if !self.robot_x.is_finite() || !self.robot_y.is_finite() {
            return Err(ConfigError::BadStart(self.robot_x, self.robot_y));
        }
        if !self.tf_padding_s.is_finite() || self.tf_padding_s < 0.0 {
            return Err(ConfigError::BadPadding(self.tf_padding_s));
        }
        if self.global_frame.is_empty() {
            return Err(ConfigError::EmptyFrame("global_frame"));
        }
        if self.odom_frame.is_empty() {
            return Err(ConfigError::EmptyFrame("odom_frame"));
        }
        Ok(())
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            vocabulary_path: self.vocabulary_path.clone(),
            settings_path: self.settings_path.clone(),
            sensor: self.sensor,
            enable_viewer: self.enable_viewer,
        }
    }

    /// `T_global_offset`: translation to the robot start, no rotation.
    pub fn global_offset(&self) -> SE3 {
        global_offset(self.robot_x, self.robot_y)
    }
}
