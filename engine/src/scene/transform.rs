//! Transform Component
//!
//! Holds a local matrix composed by the owning entity and a world matrix
//! produced by scene-graph propagation. The renderer only ever reads
//! [`Transform::world`].
//!
//! Decomposition into scale / rotation / translation / skew / perspective is
//! computed on demand by [`Transform::decompose`] and cached. Mutating the
//! matrix does NOT refresh the cache; call `decompose()` again.

use glam::{Mat3, Mat4, Quat, Vec3, Vec4};

const EPSILON: f32 = 1e-6;

/// Components of a decomposed affine (or projective) matrix.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Decomposed {
    pub scale: Vec3,
    pub rotation: Quat,
    pub translation: Vec3,
    /// Shear factors (yz, xz, xy)
    pub skew: Vec3,
    pub perspective: Vec4,
}

impl Decomposed {
    /// Split `matrix` into its components. Returns `None` for singular or
    /// degenerate matrices.
    pub fn from_matrix(matrix: &Mat4) -> Option<Self> {
        let mut local = *matrix;
        if local.w_axis.w.abs() < EPSILON {
            return None;
        }
        local = local * (1.0 / local.w_axis.w);

        let mut perspective_matrix = local;
        perspective_matrix.x_axis.w = 0.0;
        perspective_matrix.y_axis.w = 0.0;
        perspective_matrix.z_axis.w = 0.0;
        perspective_matrix.w_axis.w = 1.0;
        if perspective_matrix.determinant().abs() < EPSILON {
            return None;
        }

        // Isolate perspective
        let perspective = if local.x_axis.w.abs() > EPSILON
            || local.y_axis.w.abs() > EPSILON
            || local.z_axis.w.abs() > EPSILON
        {
            let rhs = Vec4::new(local.x_axis.w, local.y_axis.w, local.z_axis.w, local.w_axis.w);
            let inverse_transposed = perspective_matrix.inverse().transpose();
            local.x_axis.w = 0.0;
            local.y_axis.w = 0.0;
            local.z_axis.w = 0.0;
            local.w_axis.w = 1.0;
            inverse_transposed * rhs
        } else {
            Vec4::W
        };

        let translation = local.w_axis.truncate();

        let mut rows = [
            local.x_axis.truncate(),
            local.y_axis.truncate(),
            local.z_axis.truncate(),
        ];
        let mut scale = Vec3::ZERO;
        let mut skew = Vec3::ZERO;

        scale.x = rows[0].length();
        rows[0] = rows[0].normalize_or_zero();

        skew.z = rows[0].dot(rows[1]);
        rows[1] -= rows[0] * skew.z;

        scale.y = rows[1].length();
        rows[1] = rows[1].normalize_or_zero();
        skew.z /= scale.y;

        skew.y = rows[0].dot(rows[2]);
        rows[2] -= rows[0] * skew.y;
        skew.x = rows[1].dot(rows[2]);
        rows[2] -= rows[1] * skew.x;

        scale.z = rows[2].length();
        rows[2] = rows[2].normalize_or_zero();
        skew.y /= scale.z;
        skew.x /= scale.z;

        if scale.min_element().abs() < EPSILON {
            return None;
        }

        // Negative determinant: flip to keep a proper rotation
        if rows[0].dot(rows[1].cross(rows[2])) < 0.0 {
            scale = -scale;
            for row in &mut rows {
                *row = -*row;
            }
        }

        let rotation = Quat::from_mat3(&Mat3::from_cols(rows[0], rows[1], rows[2])).normalize();

        Some(Self {
            scale,
            rotation,
            translation,
            skew,
            perspective,
        })
    }

    /// Rebuild the matrix: perspective, translate, rotate, skew, then scale.
    pub fn recompose(&self) -> Mat4 {
        let mut matrix = Mat4::IDENTITY;
        matrix.x_axis.w = self.perspective.x;
        matrix.y_axis.w = self.perspective.y;
        matrix.z_axis.w = self.perspective.z;
        matrix.w_axis.w = self.perspective.w;

        matrix *= Mat4::from_translation(self.translation);
        matrix *= Mat4::from_quat(self.rotation);

        if self.skew.x != 0.0 {
            let mut shear = Mat4::IDENTITY;
            shear.z_axis.y = self.skew.x;
            matrix *= shear;
        }
        if self.skew.y != 0.0 {
            let mut shear = Mat4::IDENTITY;
            shear.z_axis.x = self.skew.y;
            matrix *= shear;
        }
        if self.skew.z != 0.0 {
            let mut shear = Mat4::IDENTITY;
            shear.y_axis.x = self.skew.z;
            matrix *= shear;
        }

        matrix * Mat4::from_scale(self.scale)
    }
}

#[derive(Clone, Debug)]
pub struct Transform {
    local: Mat4,
    world: Mat4,
    decomposed: Option<Decomposed>,
}

impl Default for Transform {
    fn default() -> Self {
        Self::from_matrix(Mat4::IDENTITY)
    }
}

impl Transform {
    /// Transform whose local and world matrices are both `matrix`.
    pub fn from_matrix(matrix: Mat4) -> Self {
        Self {
            local: matrix,
            world: matrix,
            decomposed: None,
        }
    }

    /// Translate, then rotate, then scale.
    pub fn from_trs(translation: Vec3, rotation: Quat, scale: Vec3) -> Self {
        Self::from_matrix(Mat4::from_scale_rotation_translation(scale, rotation, translation))
    }

    pub fn from_translation(translation: Vec3) -> Self {
        Self::from_matrix(Mat4::from_translation(translation))
    }

    #[inline]
    pub fn local(&self) -> Mat4 {
        self.local
    }

    #[inline]
    pub fn world(&self) -> Mat4 {
        self.world
    }

    pub fn set_local(&mut self, local: Mat4) {
        self.local = local;
    }

    /// Written by scene-graph propagation.
    pub fn set_world(&mut self, world: Mat4) {
        self.world = world;
    }

    /// World-space origin of this transform.
    pub fn world_position(&self) -> Vec3 {
        self.world.w_axis.truncate()
    }

    /// Recompute the decomposition of the local matrix and cache it.
    pub fn decompose(&mut self) -> Option<&Decomposed> {
        self.decomposed = Decomposed::from_matrix(&self.local);
        self.decomposed.as_ref()
    }

    /// The decomposition from the last `decompose()` call, possibly stale.
    pub fn decomposed(&self) -> Option<&Decomposed> {
        self.decomposed.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_mat_close(a: Mat4, b: Mat4) {
        let (a, b) = (a.to_cols_array(), b.to_cols_array());
        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x - y).abs() < 1e-4, "{a:?} != {b:?}");
        }
    }

    #[test]
    fn test_trs_round_trip() {
        let matrix = Mat4::from_translation(Vec3::new(3.0, -2.0, 7.5))
            * Mat4::from_quat(Quat::from_euler(glam::EulerRot::YXZ, 0.7, -0.3, 1.2))
            * Mat4::from_scale(Vec3::new(2.0, 0.5, 1.5));
        let decomposed = Decomposed::from_matrix(&matrix).unwrap();
        assert!(decomposed.skew.length() < 1e-4);
        assert_mat_close(decomposed.recompose(), matrix);
    }

    #[test]
    fn test_negative_scale_round_trip() {
        let matrix = Mat4::from_translation(Vec3::X)
            * Mat4::from_quat(Quat::from_rotation_z(0.4))
            * Mat4::from_scale(Vec3::new(-1.0, 2.0, 1.0));
        let decomposed = Decomposed::from_matrix(&matrix).unwrap();
        assert_mat_close(decomposed.recompose(), matrix);
    }

    #[test]
    fn test_singular_matrix_is_rejected() {
        assert!(Decomposed::from_matrix(&Mat4::ZERO).is_none());
        assert!(Decomposed::from_matrix(&Mat4::from_scale(Vec3::new(1.0, 0.0, 1.0))).is_none());
    }

    #[test]
    fn test_decomposition_is_not_refreshed_implicitly() {
        let mut transform = Transform::from_translation(Vec3::new(1.0, 0.0, 0.0));
        assert!(transform.decomposed().is_none());
        let first = transform.decompose().copied().unwrap();

        transform.set_local(Mat4::from_translation(Vec3::new(5.0, 0.0, 0.0)));
        assert_eq!(transform.decomposed().unwrap().translation, first.translation);

        let fresh = transform.decompose().unwrap();
        assert_eq!(fresh.translation, Vec3::new(5.0, 0.0, 0.0));
    }
}
