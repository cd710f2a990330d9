//! Error types for camera pose correction.
//!
//! Recoverable failures (bad config, bad inputs from the training loop) are
//! reported through `CameraOptError`. Internal consistency violations, such as
//! an `Off` optimizer owning parameters, are programming errors and panic.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CameraOptError>;

/// Errors raised by the camera optimizer and its collaborators.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CameraOptError {
    #[error("unrecognized camera optimizer mode: {0:?} (expected off | SO3xR3 | SE3 | shared_SO3xR3)")]
    UnknownMode(String),

    #[error("camera optimizer needs at least one camera")]
    InvalidCameraCount,

    #[error("camera index {index} out of range for {num_cameras} cameras")]
    CameraIndexOutOfRange { index: usize, num_cameras: usize },

    #[error("missing required camera identifier: camera metadata must carry \"cam_idx\"")]
    MissingCameraIndex,

    #[error("camera identifier must be a non-negative integer, got {0}")]
    InvalidCameraIndex(String),

    #[error(
        "ray bundle arrays disagree in length: {origins} origins, {directions} directions, {indices} camera indices"
    )]
    RayBundleShapeMismatch {
        origins: usize,
        directions: usize,
        indices: usize,
    },

    #[error("gradient batch has {got} entries, expected {expected}")]
    GradientShapeMismatch { expected: usize, got: usize },

    #[error("config error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for CameraOptError {
    fn from(err: serde_json::Error) -> Self {
        CameraOptError::Config(err.to_string())
    }
}

impl From<std::io::Error> for CameraOptError {
    fn from(err: std::io::Error) -> Self {
        CameraOptError::Config(format!("I/O error: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_camera_index_message() {
        let err = CameraOptError::MissingCameraIndex;
        assert!(err.to_string().contains("missing required camera identifier"));
    }

    #[test]
    fn test_config_error_from_json() {
        let json_err = serde_json::from_str::<u32>("not a number").unwrap_err();
        match CameraOptError::from(json_err) {
            CameraOptError::Config(msg) => assert!(!msg.is_empty()),
            other => panic!("expected config error, got {other:?}"),
        }
    }
}
