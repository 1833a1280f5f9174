// Transform utilities for Mat4
//
// Extends glam::Mat4 with the conversions the renderer scene graph expects.
// Renderer matrices are row-vector, row-major: that is exactly glam's
// column-major storage, so conversion is a straight copy of the columns.

use glam::{Mat4, Vec3, Vec4};

/// Flips Z so a host camera (looking down -Z) matches the renderer camera.
pub const RIGHT_HANDED: Mat4 = Mat4::from_cols(
    Vec4::new(1.0, 0.0, 0.0, 0.0),
    Vec4::new(0.0, 1.0, 0.0, 0.0),
    Vec4::new(0.0, 0.0, -1.0, 0.0),
    Vec4::new(0.0, 0.0, 0.0, 1.0),
);

/// Orientation applied to distant, rect, disk and sphere lights.
pub const ORIENT_PXR_LIGHT: Mat4 = Mat4::from_cols(
    Vec4::new(-1.0, 0.0, 0.0, 0.0),
    Vec4::new(0.0, -1.0, 0.0, 0.0),
    Vec4::new(0.0, 0.0, -1.0, 0.0),
    Vec4::new(0.0, 0.0, 0.0, 1.0),
);

/// Orientation applied to dome lights so the environment Z axis points up.
pub const ORIENT_PXR_DOME_LIGHT: Mat4 = Mat4::from_cols(
    Vec4::new(0.0, 0.0, -1.0, 0.0),
    Vec4::new(-1.0, 0.0, 0.0, 0.0),
    Vec4::new(0.0, 1.0, 0.0, 0.0),
    Vec4::new(0.0, 0.0, 0.0, 1.0),
);

/// Extension trait for Mat4 to provide renderer transform utilities
pub trait Mat4Ext {
    /// Flat 16-float array in the renderer's row-major layout.
    fn to_renderer_array(&self) -> [f32; 16];

    /// Build a matrix from a flat renderer array.
    fn from_renderer_array(values: &[f32; 16]) -> Mat4;

    /// Transform a vector in 3D space (applies rotation and scale, but NOT translation).
    /// Vectors have an implicit w=0 component.
    fn transform_vector3(&self, vector: Vec3) -> Vec3;

    /// World matrix of a light filter coordinate system.
    ///
    /// Filters are authored facing down the host's local -Z; the renderer
    /// expects them rotated 90 degrees about X and then about Y.
    fn light_filter_orientation(&self) -> Mat4;

    /// Approximate equality, used to skip redundant transform writes.
    fn approx_eq(&self, other: &Mat4, epsilon: f32) -> bool;
}

impl Mat4Ext for Mat4 {
    fn to_renderer_array(&self) -> [f32; 16] {
        self.to_cols_array()
    }

    fn from_renderer_array(values: &[f32; 16]) -> Mat4 {
        Mat4::from_cols_array(values)
    }

    fn transform_vector3(&self, vector: Vec3) -> Vec3 {
        // Transform as direction (w=0) - translation should not affect vectors
        let v4 = Vec4::new(vector.x, vector.y, vector.z, 0.0);
        let transformed = *self * v4;
        Vec3::new(transformed.x, transformed.y, transformed.z)
    }

    fn light_filter_orientation(&self) -> Mat4 {
        *self
            * Mat4::from_rotation_x(std::f32::consts::FRAC_PI_2)
            * Mat4::from_rotation_y(std::f32::consts::FRAC_PI_2)
    }

    fn approx_eq(&self, other: &Mat4, epsilon: f32) -> bool {
        self.to_cols_array()
            .iter()
            .zip(other.to_cols_array().iter())
            .all(|(a, b)| (a - b).abs() <= epsilon)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_renderer_array_translation_last_row() {
        let mat = Mat4::from_translation(Vec3::new(10.0, 20.0, 30.0));
        let arr = mat.to_renderer_array();

        // Row-vector convention keeps translation in the last four floats
        assert_eq!(&arr[12..15], &[10.0, 20.0, 30.0]);
        assert_eq!(arr[15], 1.0);
    }

    #[test]
    fn test_renderer_array_roundtrip() {
        let mat = Mat4::from_rotation_z(0.3) * Mat4::from_translation(Vec3::X);
        let back = Mat4::from_renderer_array(&mat.to_renderer_array());
        assert!(mat.approx_eq(&back, 1e-6));
    }

    #[test]
    fn test_transform_vector3_no_translation() {
        let mat = Mat4::from_translation(Vec3::new(10.0, 20.0, 30.0));
        let vector = Vec3::new(1.0, 0.0, 0.0);

        // Translation should NOT affect vectors (w=0)
        assert_eq!(mat.transform_vector3(vector), vector);
    }

    #[test]
    fn test_light_filter_orientation_keeps_translation() {
        let mat = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
        let oriented = mat.light_filter_orientation();
        let origin = oriented.transform_point3(Vec3::ZERO);
        assert!((origin - Vec3::new(1.0, 2.0, 3.0)).length() < 1e-5);

        // Y turn takes local X to -Z, the X turn then takes -Z to +Y
        let x = oriented.transform_vector3(Vec3::X);
        assert!((x - Vec3::Y).length() < 1e-5);
    }

    #[test]
    fn test_right_handed_flips_z() {
        let p = RIGHT_HANDED.transform_point3(Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(p, Vec3::new(1.0, 2.0, -3.0));
    }

    #[test]
    fn test_approx_eq() {
        let a = Mat4::IDENTITY;
        let b = Mat4::from_translation(Vec3::splat(1e-7));
        assert!(a.approx_eq(&b, 1e-5));
        assert!(!a.approx_eq(&Mat4::from_translation(Vec3::X), 1e-5));
    }
}
