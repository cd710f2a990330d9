//! Learnable per-camera pose corrections.
//!
//! `CameraOptimizer` owns a `[P, 6]` block of tangent vectors (one per camera,
//! or a single shared one) and turns them into 3×4 correction transforms
//! mapping the optimized camera frame to the given camera frame. The training
//! loop:
//!
//! 1. applies corrections to rays or camera poses before rendering,
//! 2. adds the regularizer to its losses,
//! 3. backpropagates through the `*_backward` methods, which accumulate into
//!    the parameter gradient,
//! 4. steps its optimizer over the handles exposed by `get_param_groups`.
//!
//! The component never updates its own parameters.
//!
//! Rays and cameras are corrected in place through `&mut` references. Each
//! apply call returns a tape with the pre-correction geometry needed by the
//! matching backward call.
//!
//! Parameter handles are `Rc<RefCell<_>>`. Calling into the optimizer while
//! holding a `borrow_mut` on its parameter panics.

use nalgebra::{Matrix3x4, Vector3, Vector6};
use rayon::prelude::*;
use tracing::{debug, info};

use crate::core::lie::{exp_map_se3_batch, exp_map_so3xr3, exp_map_so3xr3_batch, split_tangent};
use crate::core::math::{compose_3x4, identity_3x4, rotation_block, translation_column};
use crate::core::{Camera, Device, RayBundle};
use crate::diff::compose_grad::{camera_correction_grad, raybundle_correction_grad};
use crate::diff::lie_grad::{exp_map_se3_grad, exp_map_so3xr3_grad};
use crate::error::{CameraOptError, Result};

use super::config::{CameraOptimizerConfig, CameraOptimizerMode};
use super::loss::{LossDict, MetricsDict};
use super::params::{ParamGroups, ParamHandle, Parameter};

/// Default name of the parameter group holding pose corrections.
pub const DEFAULT_PARAM_GROUP: &str = "camera_opt";

const REGULARIZER_KEY: &str = "camera_opt_regularizer";
const TRANSLATION_METRIC_KEY: &str = "camera_opt_translation";
const ROTATION_METRIC_KEY: &str = "camera_opt_rotation";

/// Cameras whose corrections are pinned to identity.
#[derive(Clone, Debug)]
struct NonTrainableMask {
    bits: Vec<bool>,
    device: Device,
}

impl NonTrainableMask {
    fn new(num_cameras: usize, indices: &[usize], device: Device) -> Self {
        let mut bits = vec![false; num_cameras];
        for &i in indices {
            if let Some(bit) = bits.get_mut(i) {
                *bit = true;
            }
        }
        Self { bits, device }
    }

    fn is_masked(&self, index: usize) -> bool {
        self.bits.get(index).copied().unwrap_or(false)
    }
}

/// Pre-correction state recorded by [`CameraOptimizer::apply_to_raybundle`].
#[derive(Clone, Debug)]
pub struct RayCorrectionTape {
    indices: Vec<usize>,
    directions: Vec<Vector3<f32>>,
}

impl RayCorrectionTape {
    /// Squeezed per-ray camera indices.
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Pre-correction state recorded by [`CameraOptimizer::apply_to_camera`].
#[derive(Clone, Debug)]
pub struct CameraCorrectionTape {
    camera_index: usize,
    camera_to_world: Matrix3x4<f32>,
}

impl CameraCorrectionTape {
    pub fn camera_index(&self) -> usize {
        self.camera_index
    }

    /// The pose before the correction was applied.
    pub fn original_camera_to_world(&self) -> &Matrix3x4<f32> {
        &self.camera_to_world
    }
}

/// Layer that learns pose corrections jointly with the scene.
#[derive(Debug)]
pub struct CameraOptimizer {
    config: CameraOptimizerConfig,
    num_cameras: usize,
    device: Device,
    pose_adjustment: Option<ParamHandle>,
    non_trainable: Option<NonTrainableMask>,
    suffix: String,
}

impl CameraOptimizer {
    /// Build an optimizer for `num_cameras` cameras.
    ///
    /// A negative `penalty_scale` switches the mode to `Off`. Indices in
    /// `non_trainable_camera_indices` always receive the identity correction.
    pub fn new(
        config: CameraOptimizerConfig,
        num_cameras: usize,
        device: Device,
        non_trainable_camera_indices: Option<&[usize]>,
    ) -> Result<Self> {
        if num_cameras == 0 {
            return Err(CameraOptError::InvalidCameraCount);
        }

        let mut config = config;
        if config.penalty_scale < 0.0 && config.mode != CameraOptimizerMode::Off {
            debug!(
                penalty_scale = config.penalty_scale,
                requested = %config.mode,
                "negative penalty scale, camera optimization turned off"
            );
        }
        config.mode = config.effective_mode();

        let rows = match config.mode {
            CameraOptimizerMode::Off => None,
            CameraOptimizerMode::SO3xR3 | CameraOptimizerMode::SE3 => Some(num_cameras),
            CameraOptimizerMode::SharedSO3xR3 => Some(1),
        };
        let pose_adjustment =
            rows.map(|rows| Parameter::zeros("pose_adjustment", rows, 6, device).into_handle());

        let non_trainable = non_trainable_camera_indices
            .map(|indices| NonTrainableMask::new(num_cameras, indices, device));

        info!(
            mode = %config.mode,
            num_cameras,
            device = %device,
            non_trainable = non_trainable
                .as_ref()
                .map_or(0, |m| m.bits.iter().filter(|b| **b).count()),
            "camera optimizer initialized"
        );

        Ok(Self {
            config,
            num_cameras,
            device,
            pose_adjustment,
            non_trainable,
            suffix: String::new(),
        })
    }

    /// Append `suffix` to every loss and metric key this optimizer writes.
    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }

    pub fn config(&self) -> &CameraOptimizerConfig {
        &self.config
    }

    pub fn mode(&self) -> CameraOptimizerMode {
        self.config.mode
    }

    pub fn num_cameras(&self) -> usize {
        self.num_cameras
    }

    /// Device the optimizer was built for.
    pub fn device(&self) -> Device {
        self.device
    }

    pub fn is_off(&self) -> bool {
        matches!(self.config.mode, CameraOptimizerMode::Off)
    }

    /// The correction parameter block, if the mode allocates one.
    pub fn pose_adjustment(&self) -> Option<&ParamHandle> {
        self.pose_adjustment.as_ref()
    }

    /// All trainable parameters owned by this optimizer.
    pub fn parameters(&self) -> Vec<ParamHandle> {
        self.pose_adjustment.iter().cloned().collect()
    }

    /// Move the parameters to `device`. The non-trainable mask follows lazily
    /// on the next forward pass.
    pub fn to_device(&mut self, device: Device) {
        if let Some(param) = &self.pose_adjustment {
            param.borrow_mut().to_device(device);
        }
        self.device = device;
    }

    /// Bring the mask onto the parameters' device. Only moves on mismatch.
    fn sync_mask_device(&mut self) {
        let Some(param) = &self.pose_adjustment else {
            return;
        };
        let target = param.borrow().device();
        if let Some(mask) = self.non_trainable.as_mut() {
            if mask.device != target {
                debug!(from = %mask.device, to = %target, "moving non-trainable camera mask");
                mask.device = target;
            }
        }
    }

    /// Device the non-trainable mask currently lives on.
    pub fn non_trainable_mask_device(&self) -> Option<Device> {
        self.non_trainable.as_ref().map(|m| m.device)
    }

    fn is_masked(&self, index: usize) -> bool {
        self.non_trainable
            .as_ref()
            .is_some_and(|mask| mask.is_masked(index))
    }

    fn check_indices(&self, indices: &[usize]) -> Result<()> {
        match indices.iter().find(|&&i| i >= self.num_cameras) {
            Some(&index) => Err(CameraOptError::CameraIndexOutOfRange {
                index,
                num_cameras: self.num_cameras,
            }),
            None => Ok(()),
        }
    }

    /// Correction transforms for a batch of camera indices.
    ///
    /// Returns one 3×4 matrix per index, mapping the optimized camera frame to
    /// the given camera frame. Duplicates are allowed; an empty batch yields an
    /// empty result. Masked cameras get the exact identity.
    pub fn corrections(&mut self, indices: &[usize]) -> Result<Vec<Matrix3x4<f32>>> {
        let Some(handle) = self.pose_adjustment.clone() else {
            return Ok(vec![identity_3x4(); indices.len()]);
        };
        self.check_indices(indices)?;
        self.sync_mask_device();

        let param = handle.borrow();
        let mut outputs = match self.config.mode {
            CameraOptimizerMode::Off => vec![identity_3x4(); indices.len()],
            CameraOptimizerMode::SO3xR3 => {
                let tangents: Vec<Vector6<f32>> = indices.iter().map(|&i| param.row6(i)).collect();
                exp_map_so3xr3_batch(&tangents)
            }
            CameraOptimizerMode::SE3 => {
                let tangents: Vec<Vector6<f32>> = indices.iter().map(|&i| param.row6(i)).collect();
                exp_map_se3_batch(&tangents)
            }
            CameraOptimizerMode::SharedSO3xR3 => {
                vec![exp_map_so3xr3(&param.row6(0)); indices.len()]
            }
        };

        if self.non_trainable.is_some() {
            for (out, &i) in outputs.iter_mut().zip(indices) {
                if self.is_masked(i) {
                    *out = identity_3x4();
                }
            }
        }

        Ok(outputs)
    }

    /// Corrections for every camera, in index order.
    pub fn snapshot_corrections(&mut self) -> Result<Vec<Matrix3x4<f32>>> {
        let all: Vec<usize> = (0..self.num_cameras).collect();
        self.corrections(&all)
    }

    /// Accumulate `dL/dparams` given `dL/dM` for each correction returned by
    /// [`corrections`](Self::corrections) on the same `indices`.
    ///
    /// Masked cameras contribute zero gradient.
    pub fn backward(&mut self, indices: &[usize], d_corrections: &[Matrix3x4<f32>]) -> Result<()> {
        if d_corrections.len() != indices.len() {
            return Err(CameraOptError::GradientShapeMismatch {
                expected: indices.len(),
                got: d_corrections.len(),
            });
        }
        let Some(handle) = self.pose_adjustment.clone() else {
            return Ok(());
        };
        self.check_indices(indices)?;
        self.sync_mask_device();

        let live: Vec<(usize, &Matrix3x4<f32>)> = indices
            .iter()
            .copied()
            .zip(d_corrections)
            .filter(|(i, _)| !self.is_masked(*i))
            .collect();

        let mut param = handle.borrow_mut();
        match self.config.mode {
            CameraOptimizerMode::Off => {}
            CameraOptimizerMode::SO3xR3 => {
                let rows = param.rows6();
                let grads: Vec<(usize, Vector6<f32>)> = live
                    .par_iter()
                    .map(|&(i, d_m)| (i, exp_map_so3xr3_grad(&rows[i], d_m)))
                    .collect();
                for (i, g) in grads {
                    param.accumulate_grad_row6(i, &g);
                }
            }
            CameraOptimizerMode::SE3 => {
                let rows = param.rows6();
                let grads: Vec<(usize, Vector6<f32>)> = live
                    .par_iter()
                    .map(|&(i, d_m)| (i, exp_map_se3_grad(&rows[i], d_m)))
                    .collect();
                for (i, g) in grads {
                    param.accumulate_grad_row6(i, &g);
                }
            }
            CameraOptimizerMode::SharedSO3xR3 => {
                // Every camera reads the same map, so upstream gradients sum.
                if !live.is_empty() {
                    let d_total = live
                        .iter()
                        .fold(Matrix3x4::<f32>::zeros(), |acc, (_, d_m)| acc + *d_m);
                    let g = exp_map_so3xr3_grad(&param.row6(0), &d_total);
                    param.accumulate_grad_row6(0, &g);
                }
            }
        }
        Ok(())
    }

    /// Correct a ray bundle in place: `o' = o + t`, `d' = R d`.
    ///
    /// Returns `None` (and leaves the bundle untouched) when the mode is `Off`.
    /// Nothing is modified if the bundle is malformed or an index is out of range.
    pub fn apply_to_raybundle(&mut self, raybundle: &mut RayBundle) -> Result<Option<RayCorrectionTape>> {
        if self.is_off() {
            return Ok(None);
        }
        if !raybundle.is_consistent() {
            return Err(CameraOptError::RayBundleShapeMismatch {
                origins: raybundle.origins.len(),
                directions: raybundle.directions.len(),
                indices: raybundle.camera_indices.len(),
            });
        }

        let indices = raybundle.camera_indices.squeeze();
        let corrections = self.corrections(&indices)?;
        let tape = RayCorrectionTape {
            indices,
            directions: raybundle.directions.clone(),
        };

        raybundle
            .origins
            .par_iter_mut()
            .zip(raybundle.directions.par_iter_mut())
            .zip(corrections.par_iter())
            .for_each(|((origin, direction), m)| {
                *origin += translation_column(m);
                *direction = rotation_block(m) * *direction;
            });

        Ok(Some(tape))
    }

    /// Backward pass of [`apply_to_raybundle`](Self::apply_to_raybundle).
    pub fn raybundle_backward(
        &mut self,
        tape: &RayCorrectionTape,
        d_origins: &[Vector3<f32>],
        d_directions: &[Vector3<f32>],
    ) -> Result<()> {
        for got in [d_origins.len(), d_directions.len()] {
            if got != tape.len() {
                return Err(CameraOptError::GradientShapeMismatch {
                    expected: tape.len(),
                    got,
                });
            }
        }

        let d_corrections: Vec<Matrix3x4<f32>> = tape
            .directions
            .par_iter()
            .zip(d_origins.par_iter())
            .zip(d_directions.par_iter())
            .map(|((dir, d_o), d_d)| raybundle_correction_grad(dir, d_o, d_d))
            .collect();

        self.backward(&tape.indices, &d_corrections)
    }

    /// Correct a camera pose in place: `c2w' = c2w · [M; 0 0 0 1]`.
    ///
    /// The camera must carry its index under `cam_idx` in its metadata; when it
    /// does not, `MissingCameraIndex` is returned and the camera is untouched.
    pub fn apply_to_camera(&mut self, camera: &mut Camera) -> Result<Option<CameraCorrectionTape>> {
        if self.is_off() {
            return Ok(None);
        }

        let camera_index = camera.camera_index()?;
        let correction = self
            .corrections(&[camera_index])?
            .pop()
            .unwrap_or_else(identity_3x4);

        let tape = CameraCorrectionTape {
            camera_index,
            camera_to_world: camera.camera_to_world,
        };
        camera.camera_to_world = compose_3x4(&camera.camera_to_world, &correction);
        Ok(Some(tape))
    }

    /// Backward pass of [`apply_to_camera`](Self::apply_to_camera).
    pub fn camera_backward(
        &mut self,
        tape: &CameraCorrectionTape,
        d_camera_to_world: &Matrix3x4<f32>,
    ) -> Result<()> {
        let d_m = camera_correction_grad(&tape.camera_to_world, d_camera_to_world);
        self.backward(&[tape.camera_index], &[d_m])
    }

    fn key(&self, base: &str) -> String {
        format!("{base}{}", self.suffix)
    }

    /// Mean translation and rotation norms over parameter rows.
    fn mean_norms(param: &Parameter) -> (f32, f32) {
        let rows = param.rows6();
        let n = rows.len().max(1) as f32;
        let (t, r) = rows.iter().fold((0.0f32, 0.0f32), |(t, r), row| {
            let (trans, rot) = split_tangent(row);
            (t + trans.norm(), r + rot.norm())
        });
        (t / n, r / n)
    }

    /// Regularization value. Zero when `Off`.
    pub fn regularization(&self) -> f32 {
        let Some(handle) = &self.pose_adjustment else {
            return 0.0;
        };
        let (trans, rot) = Self::mean_norms(&handle.borrow());
        (trans * self.config.trans_l2_penalty + rot * self.config.rot_l2_penalty)
            * self.config.penalty_scale
    }

    /// Add the pose regularizer under `camera_opt_regularizer{suffix}`.
    ///
    /// The term pulls corrections toward the original poses. No-op when `Off`.
    pub fn get_loss_dict(&self, loss_dict: &mut LossDict) {
        if self.is_off() {
            return;
        }
        loss_dict.insert(self.key(REGULARIZER_KEY), self.regularization());
    }

    /// Accumulate the regularizer gradient scaled by `d_loss` (usually 1).
    ///
    /// The norm is not differentiable at zero; rows with a zero block get zero
    /// gradient for that block.
    pub fn regularization_backward(&self, d_loss: f32) {
        let Some(handle) = &self.pose_adjustment else {
            return;
        };
        let mut param = handle.borrow_mut();
        let n = param.rows().max(1) as f32;
        let trans_w = d_loss * self.config.penalty_scale * self.config.trans_l2_penalty / n;
        let rot_w = d_loss * self.config.penalty_scale * self.config.rot_l2_penalty / n;

        for row in 0..param.rows() {
            let (trans, rot) = split_tangent(&param.row6(row));
            let t_norm = trans.norm();
            let r_norm = rot.norm();
            let d_t = if t_norm > 0.0 { trans * (trans_w / t_norm) } else { Vector3::zeros() };
            let d_r = if r_norm > 0.0 { rot * (rot_w / r_norm) } else { Vector3::zeros() };
            let g = Vector6::new(d_t.x, d_t.y, d_t.z, d_r.x, d_r.y, d_r.z);
            param.accumulate_grad_row6(row, &g);
        }
    }

    /// Report overall translation and rotation norms. No-op when `Off`.
    pub fn get_metrics_dict(&self, metrics_dict: &mut MetricsDict) {
        let Some(handle) = &self.pose_adjustment else {
            return;
        };
        let param = handle.borrow();
        let (t_sq, r_sq) = param.rows6().iter().fold((0.0f32, 0.0f32), |(t, r), row| {
            let (trans, rot) = split_tangent(row);
            (t + trans.norm_squared(), r + rot.norm_squared())
        });
        metrics_dict.insert(self.key(TRANSLATION_METRIC_KEY), t_sq.sqrt());
        metrics_dict.insert(self.key(ROTATION_METRIC_KEY), r_sq.sqrt());
    }

    /// Register the correction parameters under `name`.
    ///
    /// # Panics
    /// If an active optimizer has no parameters, or an `Off` optimizer has some.
    pub fn get_param_groups(&self, param_groups: &mut ParamGroups, name: &str) {
        let params = self.parameters();
        match self.config.mode {
            CameraOptimizerMode::Off => {
                assert!(
                    params.is_empty(),
                    "camera optimizer is off but owns {} parameter(s)",
                    params.len()
                );
            }
            CameraOptimizerMode::SO3xR3 | CameraOptimizerMode::SE3 | CameraOptimizerMode::SharedSO3xR3 => {
                assert!(
                    !params.is_empty(),
                    "camera optimizer in mode {} has no parameters",
                    self.config.mode
                );
                param_groups.insert(name.to_string(), params);
            }
        }
    }

    /// Clear accumulated gradients.
    pub fn zero_grad(&self) {
        if let Some(param) = &self.pose_adjustment {
            param.borrow_mut().zero_grad();
        }
    }
}
