//! Host objects: the placed, named things in a scene.

use serde::{Deserialize, Serialize};
use tether_math::{Mat4, Quat, Vec3};

use crate::data::ObjectData;
use crate::params::Params;
use crate::scene::EntityId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectType {
    Mesh,
    Curve,
    Font,
    Surface,
    Meta,
    Volume,
    Light,
    Camera,
    Empty,
    GreasePencil,
    PointCloud,
    Armature,
}

/// Entries of an object's modifier stack that the engine cares about.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Modifier {
    Subsurf {
        #[serde(default = "default_subsurf_levels")]
        levels: u32,
    },
    Displace,
    Armature,
    Cloth,
    Curve,
    Hook,
    Lattice,
    MeshDeform,
    MeshCache,
    Shrinkwrap,
    SimpleDeform,
    Smooth,
    Wave,
    SoftBody,
    Fluid {
        #[serde(default)]
        domain: bool,
    },
    Other {
        name: String,
    },
}

fn default_subsurf_levels() -> u32 {
    2
}

impl Modifier {
    /// Modifiers that move points over time without changing topology.
    pub fn is_deforming(&self) -> bool {
        matches!(
            self,
            Modifier::Displace
                | Modifier::Armature
                | Modifier::Cloth
                | Modifier::Curve
                | Modifier::Hook
                | Modifier::Lattice
                | Modifier::MeshDeform
                | Modifier::MeshCache
                | Modifier::Shrinkwrap
                | Modifier::SimpleDeform
                | Modifier::Smooth
                | Modifier::Wave
                | Modifier::SoftBody
        )
    }
}

/// Quadric shapes for the quadric override.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum QuadricShape {
    Sphere { radius: f32 },
    Cylinder { radius: f32, zmin: f32, zmax: f32 },
    Cone { radius: f32, height: f32 },
    Disk { radius: f32, height: f32 },
    Torus { major_radius: f32, minor_radius: f32 },
}

/// User override of how an object is exported.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "primitive", rename_all = "snake_case")]
pub enum PrimitiveOverride {
    #[default]
    Auto,
    Points,
    Quadric { shape: QuadricShape },
    /// Delayed read archive
    Archive { path: String },
    /// Dynamic load DSO procedural
    Dso { path: String, data: String },
    RunProgram { path: String, args: String },
    Alembic { path: String },
    /// Axis-aligned renderer volume box
    RiVolume,
    OpenVdb,
}

/// One particle of an emitter, in world space.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Particle {
    pub location: Vec3,
    #[serde(default = "default_rotation")]
    pub rotation: Quat,
    #[serde(default = "default_size")]
    pub size: f32,
    #[serde(default = "default_alive")]
    pub alive: bool,
}

fn default_rotation() -> Quat {
    Quat::IDENTITY
}

fn default_size() -> f32 {
    1.0
}

fn default_alive() -> bool {
    true
}

impl Particle {
    pub fn at(location: Vec3) -> Self {
        Self {
            location,
            rotation: Quat::IDENTITY,
            size: 1.0,
            alive: true,
        }
    }

    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(Vec3::splat(self.size), self.rotation, self.location)
    }
}

/// What a particle system draws as.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "as", content = "target", rename_all = "snake_case")]
pub enum ParticleRender {
    #[default]
    Points,
    Hair,
    Object(EntityId),
    Collection(EntityId),
}

/// Particle settings are shared data: several systems can use the same settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParticleSystem {
    pub name: String,
    /// Identity of the settings data-block
    pub settings: EntityId,
    #[serde(default)]
    pub render_as: ParticleRender,
    /// 1-based material slot, as hosts number them
    #[serde(default = "default_material_slot")]
    pub material: u32,
    #[serde(default)]
    pub particles: Vec<Particle>,
    #[serde(default)]
    pub hair: Vec<Vec<Vec3>>,
    #[serde(default = "default_particle_width")]
    pub width: f32,
    /// Whether the emitter object itself still renders
    #[serde(default = "default_alive")]
    pub render_emitter: bool,
}

fn default_material_slot() -> u32 {
    1
}

fn default_particle_width() -> f32 {
    0.05
}

impl ParticleSystem {
    pub fn alive_particles(&self) -> impl Iterator<Item = (usize, &Particle)> + '_ {
        self.particles.iter().enumerate().filter(|(_, p)| p.alive)
    }

    /// Settings type tag as used in node names.
    pub fn settings_type(&self) -> &'static str {
        match self.render_as {
            ParticleRender::Hair => "HAIR",
            _ => "EMITTER",
        }
    }
}

/// A host object.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Object {
    pub id: EntityId,
    pub name: String,
    pub object_type: ObjectType,
    pub matrix_world: Mat4,
    pub parent: Option<EntityId>,
    pub data: ObjectData,
    pub modifiers: Vec<Modifier>,
    pub primitive: PrimitiveOverride,
    /// Material per slot, `None` for empty slots
    pub material_slots: Vec<Option<EntityId>>,
    pub material_override: Option<EntityId>,
    pub particle_systems: Vec<ParticleSystem>,
    pub hidden: bool,
    /// Has animation data (keyframes, drivers, constraints)
    pub animated: bool,
    pub has_shape_keys: bool,
    /// Empties only: collection instanced at this empty
    pub instance_collection: Option<EntityId>,
    /// Empties only: export as a named coordinate system
    pub export_as_coordsys: bool,
    /// Only reachable through an instancer, never placed on its own
    pub instanced_only: bool,
    /// Per-object motion segment count, overrides the scene setting
    pub motion_segments: Option<u32>,
    pub params: Params,
    /// Lights this object does not receive
    pub lighting_exclude: Vec<EntityId>,
    /// Light filters restricted to this object
    pub lightfilter_subset: Vec<EntityId>,
    /// Grouping memberships beyond the implicit `World`
    pub groups: Vec<String>,
    pub trace_set: Option<String>,
}

impl Default for Object {
    fn default() -> Self {
        Self {
            id: EntityId(0),
            name: String::new(),
            object_type: ObjectType::Empty,
            matrix_world: Mat4::IDENTITY,
            parent: None,
            data: ObjectData::None,
            modifiers: Vec::new(),
            primitive: PrimitiveOverride::Auto,
            material_slots: Vec::new(),
            material_override: None,
            particle_systems: Vec::new(),
            hidden: false,
            animated: false,
            has_shape_keys: false,
            instance_collection: None,
            export_as_coordsys: false,
            instanced_only: false,
            motion_segments: None,
            params: Params::new(),
            lighting_exclude: Vec::new(),
            lightfilter_subset: Vec::new(),
            groups: Vec::new(),
            trace_set: None,
        }
    }
}

impl Object {
    pub fn new(id: EntityId, name: impl Into<String>, object_type: ObjectType, data: ObjectData) -> Self {
        Self {
            id,
            name: name.into(),
            object_type,
            data,
            ..Default::default()
        }
    }

    pub fn with_matrix(mut self, matrix_world: Mat4) -> Self {
        self.matrix_world = matrix_world;
        self
    }

    pub fn with_material(mut self, material: EntityId) -> Self {
        self.material_slots.push(Some(material));
        self
    }

    pub fn with_parent(mut self, parent: EntityId) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Is this an empty that instances a collection?
    pub fn is_instancer(&self) -> bool {
        self.object_type == ObjectType::Empty && self.instance_collection.is_some()
    }

    pub fn last_modifier(&self) -> Option<&Modifier> {
        self.modifiers.last()
    }

    /// Trailing subdivision modifier, optionally followed by a displace.
    pub fn is_subd_last(&self) -> bool {
        matches!(self.modifiers.last(), Some(Modifier::Subsurf { .. }))
    }

    pub fn is_subd_displace_last(&self) -> bool {
        let n = self.modifiers.len();
        n >= 2
            && matches!(self.modifiers[n - 1], Modifier::Displace)
            && matches!(self.modifiers[n - 2], Modifier::Subsurf { .. })
    }

    pub fn has_fluid_domain(&self) -> bool {
        self.modifiers
            .iter()
            .any(|m| matches!(m, Modifier::Fluid { domain: true }))
    }

    /// Does the evaluated geometry change over time with fixed topology?
    pub fn is_deforming(&self) -> bool {
        if !self.modifiers.is_empty() {
            if self.modifiers.len() == 1 && self.is_subd_last() {
                return false;
            }
            if self.modifiers.len() == 2 && self.is_subd_displace_last() {
                return false;
            }
            if self.modifiers.iter().any(Modifier::is_deforming) {
                return true;
            }
        }
        self.has_shape_keys || self.has_fluid_domain()
    }

    /// Location part of the world matrix.
    pub fn location(&self) -> Vec3 {
        self.matrix_world.w_axis.truncate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::MeshData;

    fn mesh_object(modifiers: Vec<Modifier>) -> Object {
        let mut ob = Object::new(EntityId(1), "Cube", ObjectType::Mesh, ObjectData::Mesh(MeshData::cube()));
        ob.modifiers = modifiers;
        ob
    }

    #[test]
    fn test_subsurf_alone_is_not_deforming() {
        let ob = mesh_object(vec![Modifier::Subsurf { levels: 2 }]);
        assert!(ob.is_subd_last());
        assert!(!ob.is_deforming());
    }

    #[test]
    fn test_subsurf_displace_is_not_deforming() {
        let ob = mesh_object(vec![Modifier::Subsurf { levels: 2 }, Modifier::Displace]);
        assert!(ob.is_subd_displace_last());
        assert!(!ob.is_deforming());
    }

    #[test]
    fn test_armature_is_deforming() {
        let ob = mesh_object(vec![Modifier::Armature, Modifier::Subsurf { levels: 1 }]);
        assert!(ob.is_deforming());
    }

    #[test]
    fn test_shape_keys_deform() {
        let mut ob = mesh_object(vec![]);
        assert!(!ob.is_deforming());
        ob.has_shape_keys = true;
        assert!(ob.is_deforming());
    }

    #[test]
    fn test_particle_matrix() {
        let p = Particle::at(Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(p.matrix().transform_point3(Vec3::ZERO), Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_modifier_json() {
        let mods: Vec<Modifier> =
            serde_json::from_str(r#"[{"type": "subsurf"}, {"type": "fluid", "domain": true}]"#).unwrap();
        assert_eq!(mods[0], Modifier::Subsurf { levels: 2 });
        assert_eq!(mods[1], Modifier::Fluid { domain: true });
    }
}
