//! Gradients of the SO3xR3 and SE3 exponential maps.
//!
//! Each function takes the tangent vector `v = [t; ω]` and the upstream
//! gradient `d_m = dL/dM` of the 3×4 output, and returns `dL/dv`.
//!
//! Writing `K = [ω]×`, `R = I + aK + bK²` and using `∂K/∂ω_j = [e_j]×`:
//!
//! ```text
//! dL/dω = ω (da <G,K> + db <G,K²>) + a vee(G) + b vee(G Kᵀ + Kᵀ G)
//! ```
//!
//! where `G = dL/dR` and `vee(M)_j = <M, [e_j]×>`. The SE3 translation
//! `t = (I + bK + cK²) ρ` adds its own terms on top.

use nalgebra::{Matrix3, Matrix3x4, Vector3, Vector6};

use crate::core::lie::{split_tangent, ExpCoefficients};
use crate::core::math::{frobenius_dot, hat, rotation_block, translation_column, vee_inner};

fn join_tangent(translation: &Vector3<f32>, rotation: &Vector3<f32>) -> Vector6<f32> {
    Vector6::new(
        translation.x,
        translation.y,
        translation.z,
        rotation.x,
        rotation.y,
        rotation.z,
    )
}

/// dL/dω through the Rodrigues rotation, given `g_r = dL/dR`.
fn rotation_grad(
    omega: &Vector3<f32>,
    k: &Matrix3<f32>,
    coeffs: &ExpCoefficients,
    g_r: &Matrix3<f32>,
) -> Vector3<f32> {
    let k2 = k * k;
    let kt = k.transpose();

    let radial = coeffs.da * frobenius_dot(g_r, k) + coeffs.db * frobenius_dot(g_r, &k2);
    omega * radial + vee_inner(g_r) * coeffs.a + vee_inner(&(g_r * kt + kt * g_r)) * coeffs.b
}

/// Gradient of [`exp_map_so3xr3`](crate::core::lie::exp_map_so3xr3).
pub fn exp_map_so3xr3_grad(v: &Vector6<f32>, d_m: &Matrix3x4<f32>) -> Vector6<f32> {
    let (_, omega) = split_tangent(v);
    let coeffs = ExpCoefficients::new(&omega);
    let k = hat(&omega);

    let d_omega = rotation_grad(&omega, &k, &coeffs, &rotation_block(d_m));
    join_tangent(&translation_column(d_m), &d_omega)
}

/// Gradient of [`exp_map_se3`](crate::core::lie::exp_map_se3).
pub fn exp_map_se3_grad(v: &Vector6<f32>, d_m: &Matrix3x4<f32>) -> Vector6<f32> {
    let (rho, omega) = split_tangent(v);
    let coeffs = ExpCoefficients::new(&omega);
    let k = hat(&omega);
    let k2 = k * k;
    let g_t = translation_column(d_m);

    let mut d_omega = rotation_grad(&omega, &k, &coeffs, &rotation_block(d_m));

    // t = ρ + b Kρ + c K²ρ
    let k_rho = k * rho;
    let radial = coeffs.db * g_t.dot(&k_rho) + coeffs.dc * g_t.dot(&(k2 * rho));
    d_omega += omega * radial;
    d_omega += rho.cross(&g_t) * coeffs.b;
    d_omega += (k_rho.cross(&g_t) + rho.cross(&g_t.cross(&omega))) * coeffs.c;

    // dL/dρ = Vᵀ g
    let d_rho = g_t - k * g_t * coeffs.b + k2 * g_t * coeffs.c;

    join_tangent(&d_rho, &d_omega)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::lie::{exp_map_se3, exp_map_so3xr3};
    use approx::assert_relative_eq;

    fn inner(a: &Matrix3x4<f32>, b: &Matrix3x4<f32>) -> f64 {
        a.iter()
            .zip(b.iter())
            .map(|(x, y)| (*x as f64) * (*y as f64))
            .sum()
    }

    fn finite_difference(
        f: fn(&Vector6<f32>) -> Matrix3x4<f32>,
        v: &Vector6<f32>,
        d_m: &Matrix3x4<f32>,
    ) -> Vector6<f32> {
        let eps = 1e-3f32;
        let mut out = Vector6::zeros();
        for k in 0..6 {
            let mut plus = *v;
            let mut minus = *v;
            plus[k] += eps;
            minus[k] -= eps;
            out[k] = ((inner(&f(&plus), d_m) - inner(&f(&minus), d_m)) / (2.0 * eps as f64)) as f32;
        }
        out
    }

    #[test]
    fn test_so3xr3_translation_grad_passes_through() {
        let v = Vector6::new(0.1, 0.2, 0.3, 0.4, 0.5, 0.6);
        let mut d_m = Matrix3x4::zeros();
        d_m[(0, 3)] = 1.0;
        d_m[(2, 3)] = -2.0;
        let g = exp_map_so3xr3_grad(&v, &d_m);
        assert_eq!(g[0], 1.0);
        assert_eq!(g[1], 0.0);
        assert_eq!(g[2], -2.0);
    }

    #[test]
    fn test_rotation_grad_at_zero_is_vee() {
        // At ω = 0, dR/dω_j = [e_j]×.
        let d_m = Matrix3x4::new(
            0.1, 0.7, -0.3, 0.0, //
            -0.2, 0.4, 0.9, 0.0, //
            0.5, -0.6, 0.8, 0.0,
        );
        let g = exp_map_so3xr3_grad(&Vector6::zeros(), &d_m);
        let expected = vee_inner(&rotation_block(&d_m));
        assert_relative_eq!(g[3], expected.x, epsilon = 1e-7);
        assert_relative_eq!(g[4], expected.y, epsilon = 1e-7);
        assert_relative_eq!(g[5], expected.z, epsilon = 1e-7);
    }

    #[test]
    fn test_so3xr3_grad_matches_finite_difference() {
        let v = Vector6::new(0.3, -0.1, 0.2, 0.4, -0.8, 0.35);
        let d_m = Matrix3x4::new(
            0.2, -0.5, 0.1, 0.7, //
            0.3, 0.9, -0.4, -0.2, //
            -0.6, 0.05, 0.8, 0.4,
        );
        let ana = exp_map_so3xr3_grad(&v, &d_m);
        let num = finite_difference(exp_map_so3xr3, &v, &d_m);
        for k in 0..6 {
            assert_relative_eq!(ana[k], num[k], epsilon = 2e-3);
        }
    }

    #[test]
    fn test_se3_grad_matches_finite_difference() {
        let v = Vector6::new(0.5, -0.3, 0.9, -0.2, 0.6, 0.45);
        let d_m = Matrix3x4::new(
            -0.3, 0.4, 0.2, 0.6, //
            0.1, -0.7, 0.5, -0.9, //
            0.8, 0.2, -0.1, 0.3,
        );
        let ana = exp_map_se3_grad(&v, &d_m);
        let num = finite_difference(exp_map_se3, &v, &d_m);
        for k in 0..6 {
            assert_relative_eq!(ana[k], num[k], epsilon = 2e-3);
        }
    }
}
