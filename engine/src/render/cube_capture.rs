//! Cube Face Cameras
//!
//! Fixed axis-aligned views used for every render-to-cubemap pass: point
//! light shadows, environment captures and cubemap conversions. Face order
//! is +X, -X, +Y, -Y, +Z, -Z.
//!
//! The cube lookup convention puts +Y at the top row of the side faces and
//! mirrors them horizontally relative to a right-handed camera, so the
//! projection flips Y. Passes that render with these matrices disable
//! back-face culling.

use glam::{Mat4, Vec3};

/// (forward, up) per face.
pub const CUBE_FACE_BASES: [(Vec3, Vec3); 6] = [
    (Vec3::X, Vec3::NEG_Y),
    (Vec3::NEG_X, Vec3::NEG_Y),
    (Vec3::Y, Vec3::Z),
    (Vec3::NEG_Y, Vec3::NEG_Z),
    (Vec3::Z, Vec3::NEG_Y),
    (Vec3::NEG_Z, Vec3::NEG_Y),
];

/// 90 degree square projection with the Y flip described above.
pub fn cube_projection(near: f32, far: f32) -> Mat4 {
    Mat4::from_scale(Vec3::new(1.0, -1.0, 1.0))
        * Mat4::perspective_rh(std::f32::consts::FRAC_PI_2, 1.0, near, far)
}

pub fn cube_face_view(eye: Vec3, face: usize) -> Mat4 {
    let (forward, up) = CUBE_FACE_BASES[face % 6];
    Mat4::look_to_rh(eye, forward, up)
}

/// View matrix and view-projection of all six faces around `eye`.
pub fn cube_face_matrices(eye: Vec3, near: f32, far: f32) -> [(Mat4, Mat4); 6] {
    let proj = cube_projection(near, far);
    std::array::from_fn(|face| {
        let view = cube_face_view(eye, face);
        (view, proj * view)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_face_centers_project_to_center() {
        for (face, (_, view_proj)) in cube_face_matrices(Vec3::ZERO, 0.1, 10.0).iter().enumerate() {
            let (forward, _) = CUBE_FACE_BASES[face];
            let ndc = view_proj.project_point3(forward * 5.0);
            assert!(ndc.x.abs() < 1e-4 && ndc.y.abs() < 1e-4, "face {face}: {ndc:?}");
        }
    }

    #[test]
    fn test_positive_x_face_has_y_up() {
        // +Y must land in the top rows of the side faces (NDC y > 0)
        let (_, view_proj) = cube_face_matrices(Vec3::ZERO, 0.1, 10.0)[0];
        let ndc = view_proj.project_point3(Vec3::new(1.0, 0.5, 0.0));
        assert!(ndc.y > 0.0);
        // +Z lands on the left (cube lookup: sc = -rz)
        let ndc = view_proj.project_point3(Vec3::new(1.0, 0.0, 0.5));
        assert!(ndc.x < 0.0);
    }
}
