//! Gradients of applying a correction to ray geometry and camera poses.
//!
//! Forward ops (see `CameraOptimizer::apply_to_raybundle` / `apply_to_camera`):
//!   o' = o + t
//!   d' = R d
//!   c2w' = c2w · [M; 0 0 0 1]
//!
//! Both functions return dL/dM for the 3×4 correction `M = [R | t]`.

use nalgebra::{Matrix3x4, Vector3};

/// dL/dM for one ray, given the pre-correction direction and the upstream
/// gradients of the corrected origin and direction.
pub fn raybundle_correction_grad(
    direction: &Vector3<f32>,
    d_origin: &Vector3<f32>,
    d_direction: &Vector3<f32>,
) -> Matrix3x4<f32> {
    let mut d_m = Matrix3x4::zeros();
    // d' = R d  =>  dL/dR = dL/dd' · dᵀ
    d_m.fixed_view_mut::<3, 3>(0, 0)
        .copy_from(&(d_direction * direction.transpose()));
    d_m.fixed_view_mut::<3, 1>(0, 3).copy_from(d_origin);
    d_m
}

/// dL/dM for a camera pose correction, given the pre-correction pose and the
/// upstream gradient of the corrected pose.
///
/// `c2w' = c2w · H` with `H = [M; 0 0 0 1]`, so `dL/dH = c2wᵀ · dL/dc2w'`. The
/// constant last row of `H` takes no gradient.
pub fn camera_correction_grad(
    camera_to_world: &Matrix3x4<f32>,
    d_camera_to_world: &Matrix3x4<f32>,
) -> Matrix3x4<f32> {
    let d_h = camera_to_world.transpose() * d_camera_to_world;
    d_h.fixed_view::<3, 4>(0, 0).into_owned()
}
