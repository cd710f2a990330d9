//! Camera model (pinhole intrinsics plus a camera-to-world pose).
//!
//! Poses follow the NeRF convention: `camera_to_world` is a 3×4 matrix `[R | t]`
//! mapping camera-local coordinates to world coordinates, with the camera
//! looking down its local -Z axis.
//!
//! Cameras can carry free-form metadata. The pose optimizer reads the camera's
//! index into the training set from the `cam_idx` entry.

use std::collections::HashMap;

use nalgebra::{Matrix3, Matrix3x4, Vector3};
use serde::{Deserialize, Serialize};

use crate::error::{CameraOptError, Result};

use super::math::{rotation_block, translation_column};

/// Metadata key holding the camera's index into the training set.
pub const CAMERA_INDEX_KEY: &str = "cam_idx";

/// A value stored in camera metadata.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Int(i64),
    Float(f64),
    Text(String),
}

/// A pinhole camera with intrinsics, a camera-to-world pose and optional metadata.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Camera {
    /// Focal length in X (pixels)
    pub fx: f32,

    /// Focal length in Y (pixels)
    pub fy: f32,

    /// Principal point X (pixels)
    pub cx: f32,

    /// Principal point Y (pixels)
    pub cy: f32,

    /// Image width (pixels)
    pub width: u32,

    /// Image height (pixels)
    pub height: u32,

    /// Camera-to-world transform `[R | t]`.
    pub camera_to_world: Matrix3x4<f32>,

    #[serde(default)]
    pub metadata: Option<HashMap<String, MetadataValue>>,
}

impl Camera {
    /// Create a new camera without metadata.
    pub fn new(
        fx: f32,
        fy: f32,
        cx: f32,
        cy: f32,
        width: u32,
        height: u32,
        camera_to_world: Matrix3x4<f32>,
    ) -> Self {
        Self {
            fx,
            fy,
            cx,
            cy,
            width,
            height,
            camera_to_world,
            metadata: None,
        }
    }

    /// Attach the training-set index under [`CAMERA_INDEX_KEY`].
    pub fn with_camera_index(mut self, index: usize) -> Self {
        self.metadata
            .get_or_insert_with(HashMap::new)
            .insert(CAMERA_INDEX_KEY.to_string(), MetadataValue::Int(index as i64));
        self
    }

    /// Read the training-set index from metadata.
    ///
    /// Fails with `MissingCameraIndex` when the metadata map or the key is absent,
    /// and with `InvalidCameraIndex` when the value is not a non-negative integer.
    pub fn camera_index(&self) -> Result<usize> {
        let value = self
            .metadata
            .as_ref()
            .and_then(|m| m.get(CAMERA_INDEX_KEY))
            .ok_or(CameraOptError::MissingCameraIndex)?;

        match value {
            MetadataValue::Int(i) if *i >= 0 => Ok(*i as usize),
            other => Err(CameraOptError::InvalidCameraIndex(format!("{other:?}"))),
        }
    }

    /// Rotation from camera to world coordinates.
    pub fn rotation(&self) -> Matrix3<f32> {
        rotation_block(&self.camera_to_world)
    }

    /// Camera center in world coordinates.
    pub fn center(&self) -> Vector3<f32> {
        translation_column(&self.camera_to_world)
    }

    /// World-space ray through the center of pixel `(px, py)`.
    ///
    /// Returns `(origin, unit direction)`. Image y grows downward while camera
    /// y points up, and the camera looks down -Z.
    pub fn pixel_ray(&self, px: f32, py: f32) -> (Vector3<f32>, Vector3<f32>) {
        let local = Vector3::new(
            (px + 0.5 - self.cx) / self.fx,
            -(py + 0.5 - self.cy) / self.fy,
            -1.0,
        );
        let direction = (self.rotation() * local).normalize();
        (self.center(), direction)
    }
}
