//! # camopt-rs: learnable camera pose corrections
//!
//! Input camera poses from structure-from-motion or sensor metadata are never
//! exact. This crate learns a small corrective rigid transform per camera (or
//! one shared by all cameras) jointly with a scene representation, by gradient
//! descent on the same reconstruction loss.
//!
//! ## Architecture
//!
//! - `core`: cameras, ray bundles, the SO3xR3 / SE3 exponential maps
//! - `diff`: backward passes for the exponential maps and for applying
//!   corrections to rays and camera poses
//! - `optim`: the `CameraOptimizer` layer, its config, parameter groups,
//!   Adam, losses, and a reference refinement loop
//!
//! There is no autodiff tape: each forward op has an explicit backward that
//! accumulates into the parameter gradient, and the training loop owns the
//! update rule.
//!
//! ```no_run
//! use camopt_rs::core::{Device, RayBundle};
//! use camopt_rs::optim::{CameraOptimizer, CameraOptimizerConfig, CameraOptimizerMode};
//!
//! # fn main() -> camopt_rs::Result<()> {
//! let config = CameraOptimizerConfig::with_mode(CameraOptimizerMode::SO3xR3);
//! let mut camera_opt = CameraOptimizer::new(config, 10, Device::Cpu, None)?;
//! # let mut rays = RayBundle::new(Vec::new(), Vec::new(), Vec::<usize>::new());
//! let tape = camera_opt.apply_to_raybundle(&mut rays)?;
//! # let _ = tape;
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod diff;
pub mod error;
pub mod logger;
pub mod optim;

pub use self::core::{Camera, Device, RayBundle};
pub use error::{CameraOptError, Result};
pub use logger::{init_logger, init_logger_with_level};
pub use optim::{CameraOptimizer, CameraOptimizerConfig, CameraOptimizerMode};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
