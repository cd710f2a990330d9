//! Ray bundles: batches of rays tagged with the camera they were cast from.

use nalgebra::Vector3;

use super::camera::Camera;

/// Per-ray camera indices.
///
/// Samplers often produce indices with a trailing singleton dimension
/// (`[N, 1]`); `Column` keeps that layout and [`CameraIndices::squeeze`]
/// collapses either form to a flat list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CameraIndices {
    Flat(Vec<usize>),
    Column(Vec<[usize; 1]>),
}

impl CameraIndices {
    pub fn len(&self) -> usize {
        match self {
            CameraIndices::Flat(v) => v.len(),
            CameraIndices::Column(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flatten to one index per ray.
    pub fn squeeze(&self) -> Vec<usize> {
        match self {
            CameraIndices::Flat(v) => v.clone(),
            CameraIndices::Column(v) => v.iter().map(|[i]| *i).collect(),
        }
    }
}

impl From<Vec<usize>> for CameraIndices {
    fn from(v: Vec<usize>) -> Self {
        CameraIndices::Flat(v)
    }
}

impl From<Vec<[usize; 1]>> for CameraIndices {
    fn from(v: Vec<[usize; 1]>) -> Self {
        CameraIndices::Column(v)
    }
}

/// A batch of rays (origin, direction, source camera).
#[derive(Clone, Debug)]
pub struct RayBundle {
    pub origins: Vec<Vector3<f32>>,
    pub directions: Vec<Vector3<f32>>,
    pub camera_indices: CameraIndices,
}

impl RayBundle {
    pub fn new(
        origins: Vec<Vector3<f32>>,
        directions: Vec<Vector3<f32>>,
        camera_indices: impl Into<CameraIndices>,
    ) -> Self {
        Self {
            origins,
            directions,
            camera_indices: camera_indices.into(),
        }
    }

    /// Cast one ray per listed pixel from a camera.
    pub fn from_camera_pixels(camera: &Camera, camera_index: usize, pixels: &[(f32, f32)]) -> Self {
        let mut origins = Vec::with_capacity(pixels.len());
        let mut directions = Vec::with_capacity(pixels.len());
        for &(px, py) in pixels {
            let (o, d) = camera.pixel_ray(px, py);
            origins.push(o);
            directions.push(d);
        }
        Self::new(origins, directions, vec![[camera_index]; pixels.len()])
    }

    pub fn len(&self) -> usize {
        self.origins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.origins.is_empty()
    }

    /// True when origins, directions and indices all have the same length.
    pub fn is_consistent(&self) -> bool {
        self.origins.len() == self.directions.len()
            && self.origins.len() == self.camera_indices.len()
    }

    /// Append another bundle. Indices are flattened in the process.
    pub fn extend(&mut self, other: RayBundle) {
        let mut indices = self.camera_indices.squeeze();
        indices.extend(other.camera_indices.squeeze());
        self.origins.extend(other.origins);
        self.directions.extend(other.directions);
        self.camera_indices = CameraIndices::Flat(indices);
    }
}
