//! Camera pose optimization settings.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{CameraOptError, Result};

/// Pose correction strategy.
///
/// - `Off`: no parameters, every correction is the identity.
/// - `SO3xR3`: one tangent per camera, decoupled rotation and translation.
/// - `SE3`: one tangent per camera, coupled SE(3) exponential map.
/// - `SharedSO3xR3`: a single decoupled tangent applied to every camera.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CameraOptimizerMode {
    #[default]
    #[serde(rename = "off")]
    Off,
    #[serde(rename = "SO3xR3")]
    SO3xR3,
    #[serde(rename = "SE3")]
    SE3,
    #[serde(rename = "shared_SO3xR3")]
    SharedSO3xR3,
}

impl CameraOptimizerMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CameraOptimizerMode::Off => "off",
            CameraOptimizerMode::SO3xR3 => "SO3xR3",
            CameraOptimizerMode::SE3 => "SE3",
            CameraOptimizerMode::SharedSO3xR3 => "shared_SO3xR3",
        }
    }
}

impl fmt::Display for CameraOptimizerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CameraOptimizerMode {
    type Err = CameraOptError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "off" => Ok(CameraOptimizerMode::Off),
            "SO3xR3" => Ok(CameraOptimizerMode::SO3xR3),
            "SE3" => Ok(CameraOptimizerMode::SE3),
            "shared_SO3xR3" => Ok(CameraOptimizerMode::SharedSO3xR3),
            other => Err(CameraOptError::UnknownMode(other.to_string())),
        }
    }
}

/// Configuration of the camera pose optimizer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraOptimizerConfig {
    /// Pose optimization strategy. `SO3xR3` is the recommended setting when enabled.
    pub mode: CameraOptimizerMode,

    /// L2 penalty on translation parameters.
    pub trans_l2_penalty: f32,

    /// L2 penalty on rotation parameters.
    pub rot_l2_penalty: f32,

    /// Multiplier on the translation + rotation penalties. Negative forces `Off`.
    pub penalty_scale: f32,

    /// Deprecated: optimizer settings now live under the `camera_opt` param group.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub optimizer: Option<serde_json::Value>,

    /// Deprecated: scheduler settings now live under the `camera_opt` param group.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduler: Option<serde_json::Value>,
}

impl Default for CameraOptimizerConfig {
    fn default() -> Self {
        Self {
            mode: CameraOptimizerMode::Off,
            trans_l2_penalty: 1e-2,
            rot_l2_penalty: 1e-3,
            penalty_scale: 1.0,
            optimizer: None,
            scheduler: None,
        }
    }
}

impl CameraOptimizerConfig {
    pub fn with_mode(mode: CameraOptimizerMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    /// Parse a JSON config. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.warn_deprecated();
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Mode after applying the negative-penalty override.
    pub fn effective_mode(&self) -> CameraOptimizerMode {
        if self.penalty_scale < 0.0 {
            CameraOptimizerMode::Off
        } else {
            self.mode
        }
    }

    /// Log a warning for each deprecated key that is set.
    pub fn warn_deprecated(&self) {
        if self.optimizer.is_some() {
            warn!(
                "optimizer is no longer specified in the camera optimizer config; \
                 define it with the other param groups under 'camera_opt'"
            );
        }
        if self.scheduler.is_some() {
            warn!(
                "scheduler is no longer specified in the camera optimizer config; \
                 define it with the other param groups under 'camera_opt'"
            );
        }
    }
}
