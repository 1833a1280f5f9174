//! Scene graph nodes.

use slotmap::new_key_type;
use tether_math::Mat4;

use crate::error::{SgError, SgResult};
use crate::params::{ParamList, PrimvarList};

new_key_type! {
    /// Handle to a node in the scene graph arena.
    pub struct NodeKey;
}

/// What a DAG node is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Group,
    Mesh,
    Points,
    Curves,
    Quadric,
    Volume,
    Procedural,
    Blobby,
    AnalyticLight,
    Camera,
    Material,
}

impl NodeKind {
    pub fn is_geometry(self) -> bool {
        matches!(
            self,
            NodeKind::Mesh
                | NodeKind::Points
                | NodeKind::Curves
                | NodeKind::Quadric
                | NodeKind::Volume
                | NodeKind::Procedural
                | NodeKind::Blobby
        )
    }
}

/// Shader roles.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderClass {
    Bxdf,
    Displacement,
    Light,
    LightFilter,
    Projection,
    Integrator,
    DisplayFilter,
    SampleFilter,
    Display,
    Pattern,
}

/// A shader instance: plugin name, handle and parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct Shader {
    pub class: ShaderClass,
    pub plugin: String,
    pub handle: String,
    pub params: ParamList,
}

impl Shader {
    pub fn new(class: ShaderClass, plugin: impl Into<String>, handle: impl Into<String>) -> Self {
        Self {
            class,
            plugin: plugin.into(),
            handle: handle.into(),
            params: ParamList::new(),
        }
    }
}

/// A node transform: static, or one matrix per motion time sample.
#[derive(Clone, Debug, PartialEq)]
pub enum Transform {
    Static(Mat4),
    Sampled {
        times: Vec<f32>,
        samples: Vec<Option<Mat4>>,
    },
}

impl Default for Transform {
    fn default() -> Self {
        Transform::Static(Mat4::IDENTITY)
    }
}

impl Transform {
    pub fn num_samples(&self) -> usize {
        match self {
            Transform::Static(_) => 1,
            Transform::Sampled { samples, .. } => samples.len(),
        }
    }

    /// The matrix at the first sample.
    pub fn first(&self) -> Option<Mat4> {
        match self {
            Transform::Static(m) => Some(*m),
            Transform::Sampled { samples, .. } => samples.first().copied().flatten(),
        }
    }

    /// All samples have been written.
    pub fn is_complete(&self) -> bool {
        match self {
            Transform::Static(_) => true,
            Transform::Sampled { samples, .. } => samples.iter().all(Option::is_some),
        }
    }
}

/// Renderable state of a camera node.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Renderable {
    /// Not rendered
    #[default]
    Off,
    /// The main render camera
    Main,
    /// Secondary camera, only feeds its own displays
    Secondary,
}

/// A display/AOV output attached to a camera.
#[derive(Clone, Debug, PartialEq)]
pub struct Display {
    pub name: String,
    pub driver: String,
    pub path: String,
    pub channels: Vec<String>,
    pub params: ParamList,
}

/// Geometry topology summary for mesh-like nodes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Topology {
    pub npolys: usize,
    pub npoints: usize,
    pub nverts: usize,
}

/// A node in the retained-mode scene graph.
#[derive(Clone, Debug, PartialEq)]
pub struct DagNode {
    pub name: String,
    pub kind: NodeKind,
    /// Non-owning links back to every group this node is placed under
    pub parents: Vec<NodeKey>,
    pub children: Vec<NodeKey>,
    pub transform: Transform,
    pub orient: Option<Mat4>,
    pub hidden: bool,
    pub attributes: ParamList,
    pub primvars: PrimvarList,
    pub material: Option<NodeKey>,
    /// Bxdf/displacement for materials, light shader for lights,
    /// projection for cameras, the plugin for procedurals
    pub shaders: Vec<Shader>,
    pub light_filters: Vec<Shader>,
    pub topology: Option<Topology>,
    /// Subdivision scheme; `None` for polygon meshes
    pub scheme: Option<String>,
    pub renderable: Renderable,
    pub displays: Vec<Display>,
}

impl DagNode {
    pub fn new(kind: NodeKind, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            parents: Vec::new(),
            children: Vec::new(),
            transform: Transform::default(),
            orient: None,
            hidden: false,
            attributes: ParamList::new(),
            primvars: PrimvarList::new(),
            material: None,
            shaders: Vec::new(),
            light_filters: Vec::new(),
            topology: None,
            scheme: None,
            renderable: Renderable::Off,
            displays: Vec::new(),
        }
    }

    pub fn set_transform(&mut self, matrix: Mat4) {
        self.transform = Transform::Static(matrix);
    }

    /// Switch to sampled motion with `count` empty samples.
    pub fn set_transform_num_samples(&mut self, count: usize) {
        if let Transform::Sampled { samples, .. } = &self.transform {
            if samples.len() == count {
                return;
            }
        }
        self.transform = Transform::Sampled {
            times: vec![0.0; count],
            samples: vec![None; count],
        };
    }

    pub fn set_transform_sample(&mut self, index: usize, matrix: Mat4, time: f32) -> SgResult<()> {
        match &mut self.transform {
            Transform::Sampled { times, samples } if index < samples.len() => {
                times[index] = time;
                samples[index] = Some(matrix);
                Ok(())
            }
            other => Err(SgError::SampleOutOfRange {
                node: self.name.clone(),
                index,
                count: other.num_samples(),
            }),
        }
    }

    /// Shader of a given class, if set.
    pub fn shader(&self, class: ShaderClass) -> Option<&Shader> {
        self.shaders.iter().find(|s| s.class == class)
    }

    /// Replace (or add) the shader of a given class.
    pub fn set_shader(&mut self, shader: Shader) {
        self.shaders.retain(|s| s.class != shader.class);
        self.shaders.push(shader);
    }

    pub fn remove_shader(&mut self, class: ShaderClass) {
        self.shaders.retain(|s| s.class != class);
    }

    /// Define mesh-like topology. Changing it resets primvar samples.
    pub fn define(&mut self, topology: Topology) {
        if self.topology != Some(topology) {
            self.primvars.clear();
        }
        self.topology = Some(topology);
    }
}
