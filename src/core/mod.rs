//! Core data structures and math.
//!
//! - `Camera`: pinhole intrinsics, camera-to-world pose, metadata
//! - `RayBundle`: batches of rays with their source camera indices
//! - `lie`: SO3xR3 / SE3 exponential maps
//! - `math`: skew matrices and 3×4 transform helpers
//!
//! Everything here is pure data and pure functions.

mod camera;
mod device;
pub mod lie;
pub mod math;
mod rays;

pub use camera::{Camera, MetadataValue, CAMERA_INDEX_KEY};
pub use device::Device;
pub use lie::{exp_map_se3, exp_map_se3_batch, exp_map_so3xr3, exp_map_so3xr3_batch};
pub use math::{compose_3x4, hat, identity_3x4, to_homogeneous};
pub use rays::{CameraIndices, RayBundle};
