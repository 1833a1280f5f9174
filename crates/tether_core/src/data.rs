//! Evaluated object data for the non-mesh primitive types.

use serde::{Deserialize, Serialize};
use tether_math::Vec3;

use crate::params::Params;
use crate::scene::EntityId;

/// One spline of a curve object.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Spline {
    pub points: Vec<Vec3>,
    pub cyclic: bool,
    /// Per-point radius, falls back to the curve width when empty
    pub radius: Vec<f32>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CurveData {
    pub splines: Vec<Spline>,
    pub width: f32,
    /// Cubic (bezier/nurbs) vs linear segments
    pub cubic: bool,
    /// Children follow this curve as a path
    pub use_path: bool,
}

impl Default for CurveData {
    fn default() -> Self {
        Self {
            splines: Vec::new(),
            width: 0.01,
            cubic: false,
            use_path: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PointsData {
    pub positions: Vec<Vec3>,
    pub width: f32,
}

impl Default for PointsData {
    fn default() -> Self {
        Self {
            positions: Vec::new(),
            width: 0.1,
        }
    }
}

/// Host light types, used to pick a fallback shader.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostLightType {
    #[default]
    Point,
    Sun,
    Spot,
    Area,
}

/// Whether a light object is a light or a light filter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LightRole {
    #[default]
    Light,
    LightFilter,
}

/// How a light combines more than one light filter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterCombine {
    #[default]
    Mult,
    Max,
    Min,
    Screen,
}

impl FilterCombine {
    /// Parameter on the combiner shader that receives filters in this mode.
    pub fn combiner_param(self) -> &'static str {
        match self {
            FilterCombine::Mult => "mult",
            FilterCombine::Max => "max",
            FilterCombine::Min => "min",
            FilterCombine::Screen => "screen",
        }
    }
}

/// A light filter reference on a light.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FilterLink {
    pub filter: EntityId,
    #[serde(default)]
    pub combine: FilterCombine,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightData {
    pub role: LightRole,
    /// Renderer shader name (e.g. `PxrRectLight`, `PxrBlockerLightFilter`).
    /// Empty means derive one from `host_type`.
    pub shader: String,
    pub host_type: HostLightType,
    pub color: [f32; 3],
    pub energy: f32,
    pub mute: bool,
    pub solo: bool,
    pub params: Params,
    pub filters: Vec<FilterLink>,
}

impl Default for LightData {
    fn default() -> Self {
        Self {
            role: LightRole::Light,
            shader: String::new(),
            host_type: HostLightType::Point,
            color: [1.0, 1.0, 1.0],
            energy: 10.0,
            mute: false,
            solo: false,
            params: Params::new(),
            filters: Vec::new(),
        }
    }
}

impl LightData {
    /// Renderer shader name, falling back on the host light type.
    pub fn shader_name(&self) -> &str {
        if !self.shader.is_empty() {
            return &self.shader;
        }
        match self.role {
            LightRole::LightFilter => "PxrBlockerLightFilter",
            LightRole::Light => match self.host_type {
                HostLightType::Point => "PxrSphereLight",
                HostLightType::Sun => "PxrDistantLight",
                HostLightType::Spot => "PxrDiskLight",
                HostLightType::Area => "PxrRectLight",
            },
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraProjection {
    #[default]
    Perspective,
    Orthographic,
    Panoramic,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorFit {
    #[default]
    Horizontal,
    Vertical,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraData {
    pub projection: CameraProjection,
    /// Focal length in millimetres
    pub lens: f32,
    pub sensor_width: f32,
    pub sensor_height: f32,
    pub sensor_fit: SensorFit,
    pub ortho_scale: f32,
    pub clip_start: f32,
    pub clip_end: f32,
    pub shift_x: f32,
    pub shift_y: f32,
    pub use_dof: bool,
    pub focus_distance: f32,
    pub fstop: f32,
}

impl Default for CameraData {
    fn default() -> Self {
        Self {
            projection: CameraProjection::Perspective,
            lens: 50.0,
            sensor_width: 36.0,
            sensor_height: 24.0,
            sensor_fit: SensorFit::Horizontal,
            ortho_scale: 6.0,
            clip_start: 0.1,
            clip_end: 100.0,
            shift_x: 0.0,
            shift_y: 0.0,
            use_dof: false,
            focus_distance: 10.0,
            fstop: 2.8,
        }
    }
}

impl CameraData {
    /// Field of view in degrees for the given aspect ratio.
    pub fn fov_degrees(&self, aspect_ratio: f32) -> f32 {
        let sensor = match self.sensor_fit {
            SensorFit::Vertical => self.sensor_height,
            SensorFit::Horizontal => self.sensor_width,
        };
        let aspect = if aspect_ratio > 0.0 { aspect_ratio } else { 1.0 };
        360.0 * ((sensor * 0.5) / self.lens / aspect).atan() / std::f32::consts::PI
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeData {
    /// OpenVDB file path, may contain frame tokens
    pub filepath: String,
    pub grids: Vec<String>,
    /// Grid used for density
    pub density_grid: String,
}

/// One metaball element, already in world space.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetaElement {
    pub center: Vec3,
    pub radius: f32,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetaData {
    pub elements: Vec<MetaElement>,
    pub threshold: f32,
}

/// A grease pencil stroke.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Stroke {
    pub points: Vec<Vec3>,
    pub width: f32,
    pub material_index: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrokeData {
    pub strokes: Vec<Stroke>,
}

/// Data attached to an object, by object type.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum ObjectData {
    #[default]
    None,
    Mesh(crate::mesh::MeshData),
    Curve(CurveData),
    Points(PointsData),
    Light(LightData),
    Camera(CameraData),
    Volume(VolumeData),
    Meta(MetaData),
    GreasePencil(StrokeData),
}

impl ObjectData {
    pub fn as_mesh(&self) -> Option<&crate::mesh::MeshData> {
        match self {
            ObjectData::Mesh(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_light(&self) -> Option<&LightData> {
        match self {
            ObjectData::Light(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_camera(&self) -> Option<&CameraData> {
        match self {
            ObjectData::Camera(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_curve(&self) -> Option<&CurveData> {
        match self {
            ObjectData::Curve(c) => Some(c),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_light_shader_fallback() {
        let mut light = LightData::default();
        assert_eq!(light.shader_name(), "PxrSphereLight");
        light.host_type = HostLightType::Area;
        assert_eq!(light.shader_name(), "PxrRectLight");
        light.shader = "PxrDomeLight".into();
        assert_eq!(light.shader_name(), "PxrDomeLight");

        let filter = LightData {
            role: LightRole::LightFilter,
            ..Default::default()
        };
        assert_eq!(filter.shader_name(), "PxrBlockerLightFilter");
    }

    #[test]
    fn test_fov_50mm() {
        let cam = CameraData::default();
        let fov = cam.fov_degrees(1.0);
        // 2 * atan(18 / 50) in degrees
        assert!((fov - 39.5978).abs() < 0.01);
    }

    #[test]
    fn test_object_data_json_tag() {
        let data: ObjectData = serde_json::from_str(r#"{"kind": "light", "data": {"energy": 5.0}}"#).unwrap();
        assert_eq!(data.as_light().map(|l| l.energy), Some(5.0));
    }
}
