//! Tether math: glam re-exports plus the renderer-side matrix conventions
//! and frame/sub-frame arithmetic shared by the other crates.

// Re-export glam for convenience
pub use glam::*;

pub mod time;
pub mod transform;

pub use time::{FrameTime, Subframe};
pub use transform::{Mat4Ext, ORIENT_PXR_DOME_LIGHT, ORIENT_PXR_LIGHT, RIGHT_HANDED};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec3_creation() {
        let v = Vec3::new(1.0, 2.0, 3.0);
        assert_eq!(v.x, 1.0);
        assert_eq!(v.y, 2.0);
        assert_eq!(v.z, 3.0);
    }

    #[test]
    fn test_glam_reexport_mat4() {
        let m = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(m.transform_point3(Vec3::ZERO), Vec3::new(1.0, 2.0, 3.0));
    }
}
