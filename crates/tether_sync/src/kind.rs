//! Primitive kinds and their detection from host objects.

use std::fmt;

use tether_core::{LightRole, Object, ObjectData, ObjectType, ParticleRender, ParticleSystem, PrimitiveOverride};
use tether_sg::NodeKind;

/// What an exported entity is on the renderer side. Picks the translator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PrimitiveKind {
    Mesh,
    Subdivision,
    Curve,
    Points,
    Quadric,
    Volume,
    Procedural,
    Meta,
    Light,
    LightFilter,
    Camera,
    Material,
    Group,
    Emitter,
    Hair,
    GreasePencil,
}

impl PrimitiveKind {
    pub const ALL: [PrimitiveKind; 16] = [
        PrimitiveKind::Mesh,
        PrimitiveKind::Subdivision,
        PrimitiveKind::Curve,
        PrimitiveKind::Points,
        PrimitiveKind::Quadric,
        PrimitiveKind::Volume,
        PrimitiveKind::Procedural,
        PrimitiveKind::Meta,
        PrimitiveKind::Light,
        PrimitiveKind::LightFilter,
        PrimitiveKind::Camera,
        PrimitiveKind::Material,
        PrimitiveKind::Group,
        PrimitiveKind::Emitter,
        PrimitiveKind::Hair,
        PrimitiveKind::GreasePencil,
    ];

    /// Tag used in node names.
    pub fn tag(self) -> &'static str {
        match self {
            PrimitiveKind::Mesh => "MESH",
            PrimitiveKind::Subdivision => "SUBDIV",
            PrimitiveKind::Curve => "CURVE",
            PrimitiveKind::Points => "POINTS",
            PrimitiveKind::Quadric => "QUADRIC",
            PrimitiveKind::Volume => "VOLUME",
            PrimitiveKind::Procedural => "PROCEDURAL",
            PrimitiveKind::Meta => "META",
            PrimitiveKind::Light => "LIGHT",
            PrimitiveKind::LightFilter => "LIGHTFILTER",
            PrimitiveKind::Camera => "CAMERA",
            PrimitiveKind::Material => "MATERIAL",
            PrimitiveKind::Group => "EMPTY",
            PrimitiveKind::Emitter => "EMITTER",
            PrimitiveKind::Hair => "HAIR",
            PrimitiveKind::GreasePencil => "GPENCIL",
        }
    }

    /// Renderer node kind of the primary node.
    pub fn node_kind(self) -> NodeKind {
        match self {
            PrimitiveKind::Mesh | PrimitiveKind::Subdivision => NodeKind::Mesh,
            PrimitiveKind::Curve | PrimitiveKind::Hair => NodeKind::Curves,
            PrimitiveKind::Points | PrimitiveKind::Emitter => NodeKind::Points,
            PrimitiveKind::Quadric => NodeKind::Quadric,
            PrimitiveKind::Volume => NodeKind::Volume,
            PrimitiveKind::Procedural => NodeKind::Procedural,
            PrimitiveKind::Meta => NodeKind::Blobby,
            PrimitiveKind::Light => NodeKind::AnalyticLight,
            PrimitiveKind::Camera => NodeKind::Camera,
            PrimitiveKind::Material => NodeKind::Material,
            PrimitiveKind::LightFilter | PrimitiveKind::Group | PrimitiveKind::GreasePencil => {
                NodeKind::Group
            }
        }
    }

    /// Kinds whose points can be sampled for deformation blur.
    pub fn is_deformable(self) -> bool {
        matches!(
            self,
            PrimitiveKind::Mesh
                | PrimitiveKind::Subdivision
                | PrimitiveKind::Curve
                | PrimitiveKind::Points
                | PrimitiveKind::Emitter
        )
    }

    /// Kinds that can carry particle systems.
    pub fn has_particles(self) -> bool {
        matches!(
            self,
            PrimitiveKind::Mesh | PrimitiveKind::Subdivision | PrimitiveKind::Points
        )
    }

    /// Kinds stamped with a procedural primitive id.
    pub fn is_procedural(self) -> bool {
        self == PrimitiveKind::Procedural
    }

    /// Two kinds handled by the same translator can switch without a
    /// user-visible type change.
    pub fn is_compatible(self, other: PrimitiveKind) -> bool {
        self == other
            || matches!(
                (self, other),
                (PrimitiveKind::Mesh, PrimitiveKind::Subdivision)
                    | (PrimitiveKind::Subdivision, PrimitiveKind::Mesh)
            )
    }
}

impl fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Derive the primitive kind of an object from its type, user override and
/// modifier stack.
pub fn detect_primitive(ob: &Object) -> PrimitiveKind {
    match &ob.primitive {
        PrimitiveOverride::Auto => {}
        PrimitiveOverride::Points => return PrimitiveKind::Points,
        PrimitiveOverride::Quadric { .. } => return PrimitiveKind::Quadric,
        PrimitiveOverride::Archive { .. }
        | PrimitiveOverride::Dso { .. }
        | PrimitiveOverride::RunProgram { .. }
        | PrimitiveOverride::Alembic { .. } => return PrimitiveKind::Procedural,
        PrimitiveOverride::RiVolume | PrimitiveOverride::OpenVdb => return PrimitiveKind::Volume,
    }

    match ob.object_type {
        ObjectType::Mesh => {
            if ob.has_fluid_domain() {
                PrimitiveKind::Volume
            } else if ob.is_subd_last() || ob.is_subd_displace_last() {
                PrimitiveKind::Subdivision
            } else {
                PrimitiveKind::Mesh
            }
        }
        ObjectType::Curve | ObjectType::Font => match ob.data {
            ObjectData::Mesh(_) => PrimitiveKind::Mesh,
            _ => PrimitiveKind::Curve,
        },
        ObjectType::Surface => PrimitiveKind::Mesh,
        ObjectType::Meta => PrimitiveKind::Meta,
        ObjectType::Volume => PrimitiveKind::Volume,
        ObjectType::Light => match ob.data.as_light() {
            Some(light) if light.role == LightRole::LightFilter => PrimitiveKind::LightFilter,
            _ => PrimitiveKind::Light,
        },
        ObjectType::Camera => PrimitiveKind::Camera,
        ObjectType::GreasePencil => PrimitiveKind::GreasePencil,
        ObjectType::PointCloud => PrimitiveKind::Points,
        ObjectType::Empty | ObjectType::Armature => PrimitiveKind::Group,
    }
}

/// Kind of the node a particle system exports, `None` when it renders as
/// instanced objects instead.
pub fn detect_particles(psys: &ParticleSystem) -> Option<PrimitiveKind> {
    match psys.render_as {
        ParticleRender::Points => Some(PrimitiveKind::Emitter),
        ParticleRender::Hair => Some(PrimitiveKind::Hair),
        ParticleRender::Object(_) | ParticleRender::Collection(_) => None,
    }
}
