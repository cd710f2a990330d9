//! Optimization components.
//!
//! - `camera_optimizer`: learnable pose corrections (forward, backward, regularizer)
//! - `config`: modes and penalty settings
//! - `params`: shared parameter blocks and parameter groups
//! - `adam`: update rule driven by the training loop
//! - `loss`: loss/metric collections and the ray alignment loss
//! - `trainer`: reference refinement loop on a synthetic rig

pub mod adam;
pub mod camera_optimizer;
pub mod config;
pub mod loss;
pub mod params;
pub mod trainer;

pub use camera_optimizer::{
    CameraCorrectionTape, CameraOptimizer, RayCorrectionTape, DEFAULT_PARAM_GROUP,
};
pub use config::{CameraOptimizerConfig, CameraOptimizerMode};
pub use loss::{LossDict, MetricsDict};
pub use params::{ParamGroups, ParamHandle, Parameter};
