//! Small matrix helpers shared by the Lie maps and their gradients.

use nalgebra::{Matrix3, Matrix3x4, Matrix4, Vector3};

/// Skew-symmetric (hat) matrix of a 3-vector, so that `hat(w) * v = w × v`.
///
/// ```text
/// [w]× = |  0   -wz   wy |
///        |  wz   0   -wx |
///        | -wy   wx   0  |
/// ```
pub fn hat(w: &Vector3<f32>) -> Matrix3<f32> {
    Matrix3::new(0.0, -w.z, w.y, w.z, 0.0, -w.x, -w.y, w.x, 0.0)
}

/// Inner products of `m` with the three hat generators `hat(e_x)`, `hat(e_y)`, `hat(e_z)`.
///
/// Backprop through `K = hat(w)`: if `G = dL/dK` then `dL/dw = vee_inner(G)`.
pub fn vee_inner(m: &Matrix3<f32>) -> Vector3<f32> {
    Vector3::new(
        m[(2, 1)] - m[(1, 2)],
        m[(0, 2)] - m[(2, 0)],
        m[(1, 0)] - m[(0, 1)],
    )
}

/// Frobenius inner product `<a, b> = Σ a_ij b_ij`.
pub fn frobenius_dot(a: &Matrix3<f32>, b: &Matrix3<f32>) -> f32 {
    a.component_mul(b).sum()
}

/// The 3×4 identity transform `[I | 0]`.
pub fn identity_3x4() -> Matrix3x4<f32> {
    Matrix3x4::identity()
}

/// Assemble a 3×4 transform from a rotation block and a translation column.
pub fn from_rotation_translation(rotation: &Matrix3<f32>, translation: &Vector3<f32>) -> Matrix3x4<f32> {
    let mut m = Matrix3x4::zeros();
    m.fixed_view_mut::<3, 3>(0, 0).copy_from(rotation);
    m.fixed_view_mut::<3, 1>(0, 3).copy_from(translation);
    m
}

/// Rotation block of a 3×4 transform.
pub fn rotation_block(m: &Matrix3x4<f32>) -> Matrix3<f32> {
    m.fixed_view::<3, 3>(0, 0).into_owned()
}

/// Translation column of a 3×4 transform.
pub fn translation_column(m: &Matrix3x4<f32>) -> Vector3<f32> {
    m.fixed_view::<3, 1>(0, 3).into_owned()
}

/// Promote a 3×4 transform to 4×4 by appending the row `[0, 0, 0, 1]`.
pub fn to_homogeneous(m: &Matrix3x4<f32>) -> Matrix4<f32> {
    let mut out = Matrix4::identity();
    out.fixed_view_mut::<3, 4>(0, 0).copy_from(m);
    out
}

/// Right-compose a 3×4 pose with a 3×4 correction: `pose · [correction; 0 0 0 1]`.
pub fn compose_3x4(pose: &Matrix3x4<f32>, correction: &Matrix3x4<f32>) -> Matrix3x4<f32> {
    pose * to_homogeneous(correction)
}
