//! Exponential maps from 6-dimensional tangent vectors to 3×4 rigid transforms.
//!
//! A tangent vector is laid out as `[tx, ty, tz, rx, ry, rz]`: the first three
//! components generate translation, the last three are an axis-angle rotation.
//!
//! Two group structures are supported:
//!
//! - **SO3xR3** (decoupled): `R = exp([ω]×)`, `t = v_trans`. Rotation and
//!   translation are independent.
//! - **SE3** (coupled): `R = exp([ω]×)`, `t = V(ω) ρ` with
//!   `V = I + (1-cosθ)/θ² [ω]× + (θ-sinθ)/θ³ [ω]×²`.
//!
//! The rotation is Rodrigues' formula, `R = I + sinθ/θ [ω]× + (1-cosθ)/θ² [ω]×²`.
//! Near θ = 0 every coefficient switches to its Taylor series, so a zero tangent
//! maps to the exact identity.

use nalgebra::{Matrix3, Matrix3x4, Vector3, Vector6};
use rayon::prelude::*;

use super::math::{from_rotation_translation, hat};

/// Below this squared angle the coefficients use their series expansions.
pub const SMALL_ANGLE_SQ: f64 = 1e-4;

/// Split a tangent vector into its (translation, rotation) halves.
pub fn split_tangent(v: &Vector6<f32>) -> (Vector3<f32>, Vector3<f32>) {
    (
        Vector3::new(v[0], v[1], v[2]),
        Vector3::new(v[3], v[4], v[5]),
    )
}

/// Scalar coefficients of the SO(3)/SE(3) exponential and their derivatives.
///
/// With θ = ‖ω‖:
/// - `a = sinθ/θ`, `b = (1-cosθ)/θ²`, `c = (θ-sinθ)/θ³`
/// - `da`, `db`, `dc` are `(1/θ) d/dθ` of each, so that `∂a/∂ω = da · ω`.
#[derive(Clone, Copy, Debug)]
pub struct ExpCoefficients {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub da: f32,
    pub db: f32,
    pub dc: f32,
}

impl ExpCoefficients {
    /// Evaluate all coefficients for a rotation vector.
    ///
    /// Computed in f64: the closed forms of the derivatives cancel badly in f32
    /// just above the series threshold.
    pub fn new(omega: &Vector3<f32>) -> Self {
        let theta_sq = omega.cast::<f64>().norm_squared();

        if theta_sq < SMALL_ANGLE_SQ {
            let t2 = theta_sq;
            let t4 = t2 * t2;
            return Self {
                a: (1.0 - t2 / 6.0 + t4 / 120.0) as f32,
                b: (0.5 - t2 / 24.0 + t4 / 720.0) as f32,
                c: (1.0 / 6.0 - t2 / 120.0 + t4 / 5040.0) as f32,
                da: (-1.0 / 3.0 + t2 / 30.0) as f32,
                db: (-1.0 / 12.0 + t2 / 180.0) as f32,
                dc: (-1.0 / 60.0 + t2 / 1260.0) as f32,
            };
        }

        let theta = theta_sq.sqrt();
        let sin = theta.sin();
        let cos = theta.cos();
        let one_minus_cos = 1.0 - cos;
        let theta_minus_sin = theta - sin;
        let t3 = theta_sq * theta;
        let t4 = theta_sq * theta_sq;
        let t5 = t4 * theta;

        Self {
            a: (sin / theta) as f32,
            b: (one_minus_cos / theta_sq) as f32,
            c: (theta_minus_sin / t3) as f32,
            da: ((theta * cos - sin) / t3) as f32,
            db: ((theta * sin - 2.0 * one_minus_cos) / t4) as f32,
            dc: (one_minus_cos / t4 - 3.0 * theta_minus_sin / t5) as f32,
        }
    }
}

/// SO(3) exponential map (Rodrigues) of an axis-angle vector.
pub fn so3_exp(omega: &Vector3<f32>) -> Matrix3<f32> {
    let coeffs = ExpCoefficients::new(omega);
    let k = hat(omega);
    Matrix3::identity() + k * coeffs.a + k * k * coeffs.b
}

/// Left Jacobian of SO(3), `V(ω) = I + b [ω]× + c [ω]×²`.
///
/// This is the matrix coupling translation to rotation in the SE(3) exponential.
pub fn so3_left_jacobian(omega: &Vector3<f32>) -> Matrix3<f32> {
    let coeffs = ExpCoefficients::new(omega);
    let k = hat(omega);
    Matrix3::identity() + k * coeffs.b + k * k * coeffs.c
}

/// Decoupled SO3xR3 exponential map of a single tangent vector.
pub fn exp_map_so3xr3(v: &Vector6<f32>) -> Matrix3x4<f32> {
    let (translation, omega) = split_tangent(v);
    from_rotation_translation(&so3_exp(&omega), &translation)
}

/// Coupled SE(3) exponential map of a single tangent vector.
pub fn exp_map_se3(v: &Vector6<f32>) -> Matrix3x4<f32> {
    let (rho, omega) = split_tangent(v);
    let coeffs = ExpCoefficients::new(&omega);
    let k = hat(&omega);
    let k2 = k * k;

    let rotation = Matrix3::identity() + k * coeffs.a + k2 * coeffs.b;
    let v_mat = Matrix3::identity() + k * coeffs.b + k2 * coeffs.c;
    from_rotation_translation(&rotation, &(v_mat * rho))
}

/// Batched [`exp_map_so3xr3`]: `[N, 6] -> [N, 3, 4]`.
pub fn exp_map_so3xr3_batch(tangents: &[Vector6<f32>]) -> Vec<Matrix3x4<f32>> {
    tangents.par_iter().map(exp_map_so3xr3).collect()
}

/// Batched [`exp_map_se3`]: `[N, 6] -> [N, 3, 4]`.
pub fn exp_map_se3_batch(tangents: &[Vector6<f32>]) -> Vec<Matrix3x4<f32>> {
    tangents.par_iter().map(exp_map_se3).collect()
}
