//! Mirror records for exported entities and their placements.

use std::collections::BTreeMap;

use tether_core::EntityId;
use tether_math::{Mat4, Subframe};
use tether_sg::{NodeKey, Shader};

use crate::kind::PrimitiveKind;

/// Translator-specific state kept between updates.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum NodeState {
    #[default]
    None,
    Mesh {
        npoints: usize,
        npolys: usize,
        nverts: usize,
        is_subdiv: bool,
        /// One child mesh per used material slot, when more than one is used
        sub_meshes: Vec<(u32, NodeKey)>,
    },
    Points {
        npoints: usize,
    },
    Curves {
        ncurves: usize,
        npoints: usize,
    },
    Light {
        is_portal: bool,
    },
    LightFilter {
        filter: Shader,
        /// Lights currently referencing this filter
        lights: Vec<EntityId>,
    },
    Material {
        has_meshlight: bool,
    },
    Camera {
        camera_node: NodeKey,
        cam_matrix: Mat4,
    },
    Group {
        is_coordsys: bool,
    },
    GreasePencil {
        strokes: Vec<NodeKey>,
    },
}

/// One placement of a shared node.
#[derive(Clone, Debug, PartialEq)]
pub struct RmanSgGroup {
    pub db_name: String,
    pub sg_node: NodeKey,
    /// Placed object
    pub object: EntityId,
    /// Instancer owning the placement
    pub parent: Option<EntityId>,
    pub particle_system: Option<usize>,
    pub material: Option<NodeKey>,
    pub is_meshlight: bool,
}

/// Renderer-side mirror of one exported entity.
#[derive(Clone, Debug, PartialEq)]
pub struct RmanSgNode {
    pub db_name: String,
    pub rman_type: PrimitiveKind,
    /// Host entity the node was exported from
    pub entity: EntityId,
    pub sg_node: NodeKey,
    /// Placements keyed by group db_name
    pub instances: BTreeMap<String, RmanSgGroup>,
    pub motion_steps: Vec<Subframe>,
    pub is_transforming: bool,
    pub is_deforming: bool,
    pub is_frame_sensitive: bool,
    pub is_hidden: bool,
    pub is_meshlight: bool,
    /// Group this node sits under, when it is not placed through instances
    pub group_parent: Option<NodeKey>,
    /// Group holding the nodes of this entity's particle systems
    pub particle_group: Option<NodeKey>,
    pub state: NodeState,
}

impl RmanSgNode {
    pub fn new(db_name: impl Into<String>, rman_type: PrimitiveKind, entity: EntityId, sg_node: NodeKey) -> Self {
        Self {
            db_name: db_name.into(),
            rman_type,
            entity,
            sg_node,
            instances: BTreeMap::new(),
            motion_steps: Vec::new(),
            is_transforming: false,
            is_deforming: false,
            is_frame_sensitive: false,
            is_hidden: false,
            is_meshlight: false,
            group_parent: None,
            particle_group: None,
            state: NodeState::None,
        }
    }

    pub fn with_state(mut self, state: NodeState) -> Self {
        self.state = state;
        self
    }

    /// Position of a global motion step in this node's own steps.
    pub fn sample_index(&self, step: Subframe) -> Option<usize> {
        self.motion_steps.iter().position(|s| *s == step)
    }

    pub fn is_moving(&self) -> bool {
        self.is_transforming || self.is_deforming
    }

    /// Drop all motion for this node.
    pub fn clear_motion(&mut self) {
        self.motion_steps.clear();
        self.is_transforming = false;
        self.is_deforming = false;
    }

    pub fn has_meshlight_material(&self) -> bool {
        matches!(self.state, NodeState::Material { has_meshlight: true })
    }

    /// Child meshes split by material slot.
    pub fn sub_meshes(&self) -> &[(u32, NodeKey)] {
        match &self.state {
            NodeState::Mesh { sub_meshes, .. } => sub_meshes,
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_sg::SgGraph;

    fn key() -> NodeKey {
        SgGraph::new().root()
    }

    #[test]
    fn test_sample_index_uses_own_steps() {
        let mut node = RmanSgNode::new("Cube_1-MESH", PrimitiveKind::Mesh, EntityId(1), key());
        node.motion_steps = vec![Subframe::new(-0.25), Subframe::new(0.25)];
        assert_eq!(node.sample_index(Subframe::new(0.25)), Some(1));
        assert_eq!(node.sample_index(Subframe::new(0.0)), None);
    }

    #[test]
    fn test_clear_motion() {
        let mut node = RmanSgNode::new("Cube_1-MESH", PrimitiveKind::Mesh, EntityId(1), key());
        node.motion_steps = vec![Subframe::new(0.0), Subframe::new(0.5)];
        node.is_deforming = true;
        assert!(node.is_moving());
        node.clear_motion();
        assert!(!node.is_moving());
        assert!(node.motion_steps.is_empty());
    }
}
