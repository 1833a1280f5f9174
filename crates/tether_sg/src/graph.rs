//! The scene graph arena and scene-level state.

use slotmap::SlotMap;

use crate::error::{SgError, SgResult};
use crate::node::{DagNode, NodeKey, NodeKind, Shader};
use crate::params::ParamList;

/// One AOV channel declared on the scene.
#[derive(Clone, Debug, PartialEq)]
pub struct DisplayChannel {
    pub name: String,
    /// Source expression, e.g. `color Ci` or `lpe:C<.D%G>[<L.>O]`
    pub source: String,
    pub declare_type: String,
    pub filter: Option<String>,
    pub statistics: Option<String>,
}

/// The renderer scene graph: nodes, root, coordinate systems and the
/// scene-wide shaders and options.
#[derive(Debug)]
pub struct SgGraph {
    nodes: SlotMap<NodeKey, DagNode>,
    root: NodeKey,
    coordinate_systems: Vec<NodeKey>,
    options: ParamList,
    integrator: Option<Shader>,
    display_filters: Vec<Shader>,
    sample_filters: Vec<Shader>,
    channels: Vec<DisplayChannel>,
}

impl Default for SgGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl SgGraph {
    pub fn new() -> Self {
        let mut nodes = SlotMap::with_key();
        let root = nodes.insert(DagNode::new(NodeKind::Group, "root"));
        Self {
            nodes,
            root,
            coordinate_systems: Vec::new(),
            options: ParamList::new(),
            integrator: None,
            display_filters: Vec::new(),
            sample_filters: Vec::new(),
            channels: Vec::new(),
        }
    }

    pub fn root(&self) -> NodeKey {
        self.root
    }

    /// Create an unattached node.
    pub fn create_node(&mut self, kind: NodeKind, name: impl Into<String>) -> NodeKey {
        let name = name.into();
        log::trace!("create {:?} node '{}'", kind, name);
        self.nodes.insert(DagNode::new(kind, name))
    }

    pub fn node(&self, key: NodeKey) -> Option<&DagNode> {
        self.nodes.get(key)
    }

    pub fn node_mut(&mut self, key: NodeKey) -> Option<&mut DagNode> {
        self.nodes.get_mut(key)
    }

    /// Like `node_mut`, but a missing node is an error.
    pub fn expect_node_mut(&mut self, key: NodeKey) -> SgResult<&mut DagNode> {
        self.nodes
            .get_mut(key)
            .ok_or_else(|| SgError::MissingNode(format!("{:?}", key)))
    }

    pub fn contains(&self, key: NodeKey) -> bool {
        self.nodes.contains_key(key)
    }

    /// Number of nodes, including the root.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeKey, &DagNode)> + '_ {
        self.nodes.iter()
    }

    pub fn find_by_name(&self, name: &str) -> Option<NodeKey> {
        self.nodes.iter().find(|(_, n)| n.name == name).map(|(k, _)| k)
    }

    fn name_of(&self, key: NodeKey) -> String {
        self.nodes
            .get(key)
            .map_or_else(|| format!("{:?}", key), |n| n.name.clone())
    }

    /// Is `ancestor` reachable by walking parents up from `key`?
    fn is_ancestor(&self, ancestor: NodeKey, key: NodeKey) -> bool {
        let mut stack = vec![key];
        let mut visited = std::collections::HashSet::new();
        while let Some(current) = stack.pop() {
            if current == ancestor {
                return true;
            }
            if !visited.insert(current) {
                continue;
            }
            if let Some(node) = self.nodes.get(current) {
                stack.extend(node.parents.iter().copied());
            }
        }
        false
    }

    /// Place `child` under `parent`. Adding an existing link is a no-op.
    pub fn add_child(&mut self, parent: NodeKey, child: NodeKey) -> SgResult<()> {
        if !self.contains(parent) {
            return Err(SgError::MissingNode(self.name_of(parent)));
        }
        if !self.contains(child) {
            return Err(SgError::MissingNode(self.name_of(child)));
        }
        if self.is_ancestor(child, parent) {
            return Err(SgError::Cycle {
                parent: self.name_of(parent),
                child: self.name_of(child),
            });
        }

        if let Some(p) = self.nodes.get_mut(parent) {
            if p.children.contains(&child) {
                return Ok(());
            }
            p.children.push(child);
        }
        if let Some(c) = self.nodes.get_mut(child) {
            c.parents.push(parent);
        }
        Ok(())
    }

    pub fn remove_child(&mut self, parent: NodeKey, child: NodeKey) {
        if let Some(p) = self.nodes.get_mut(parent) {
            p.children.retain(|c| *c != child);
        }
        if let Some(c) = self.nodes.get_mut(child) {
            c.parents.retain(|p| *p != parent);
        }
    }

    /// Detach every child of `parent`.
    pub fn remove_children(&mut self, parent: NodeKey) {
        let children = self
            .nodes
            .get(parent)
            .map(|n| n.children.clone())
            .unwrap_or_default();
        for child in children {
            self.remove_child(parent, child);
        }
    }

    /// Delete one node. Its children stay alive, detached from it, and
    /// every link or material binding pointing at it is cleared.
    pub fn delete_node(&mut self, key: NodeKey) {
        if key == self.root {
            log::warn!("refusing to delete the scene root");
            return;
        }
        let Some(node) = self.nodes.remove(key) else {
            return;
        };
        log::trace!("delete {:?} node '{}'", node.kind, node.name);

        for parent in &node.parents {
            if let Some(p) = self.nodes.get_mut(*parent) {
                p.children.retain(|c| *c != key);
            }
        }
        for child in &node.children {
            if let Some(c) = self.nodes.get_mut(*child) {
                c.parents.retain(|p| *p != key);
            }
        }
        if node.kind == NodeKind::Material {
            for (_, other) in self.nodes.iter_mut() {
                if other.material == Some(key) {
                    other.material = None;
                }
            }
        }
        self.coordinate_systems.retain(|c| *c != key);
    }

    /// Delete a node and every descendant no other live node still holds.
    pub fn delete_subtree(&mut self, key: NodeKey) {
        let children = self
            .nodes
            .get(key)
            .map(|n| n.children.clone())
            .unwrap_or_default();
        self.delete_node(key);
        for child in children {
            let orphaned = self.nodes.get(child).is_some_and(|c| c.parents.is_empty());
            if orphaned {
                self.delete_subtree(child);
            }
        }
    }

    /// Bind (or unbind) a material on a node.
    pub fn set_material(&mut self, key: NodeKey, material: Option<NodeKey>) -> SgResult<()> {
        if let Some(m) = material {
            if !self.contains(m) {
                return Err(SgError::MissingNode(self.name_of(m)));
            }
        }
        self.expect_node_mut(key)?.material = material;
        Ok(())
    }

    pub fn set_hidden(&mut self, key: NodeKey, hidden: bool) {
        if let Some(node) = self.nodes.get_mut(key) {
            node.hidden = hidden;
        }
    }

    pub fn add_coordinate_system(&mut self, key: NodeKey) {
        if !self.coordinate_systems.contains(&key) {
            self.coordinate_systems.push(key);
        }
    }

    pub fn remove_coordinate_system(&mut self, key: NodeKey) {
        self.coordinate_systems.retain(|c| *c != key);
    }

    pub fn coordinate_systems(&self) -> &[NodeKey] {
        &self.coordinate_systems
    }

    pub fn options(&self) -> &ParamList {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut ParamList {
        &mut self.options
    }

    pub fn integrator(&self) -> Option<&Shader> {
        self.integrator.as_ref()
    }

    pub fn set_integrator(&mut self, shader: Shader) {
        self.integrator = Some(shader);
    }

    pub fn display_filters(&self) -> &[Shader] {
        &self.display_filters
    }

    pub fn set_display_filters(&mut self, filters: Vec<Shader>) {
        self.display_filters = filters;
    }

    pub fn sample_filters(&self) -> &[Shader] {
        &self.sample_filters
    }

    pub fn set_sample_filters(&mut self, filters: Vec<Shader>) {
        self.sample_filters = filters;
    }

    pub fn channels(&self) -> &[DisplayChannel] {
        &self.channels
    }

    pub fn set_channels(&mut self, channels: Vec<DisplayChannel>) {
        self.channels = channels;
    }

    /// Check that every parent/child link is mirrored on both ends and
    /// points at a live node. Returns the names of offending nodes.
    pub fn dangling_links(&self) -> Vec<String> {
        let mut bad = Vec::new();
        for (key, node) in self.nodes.iter() {
            let parents_ok = node.parents.iter().all(|p| {
                self.nodes
                    .get(*p)
                    .is_some_and(|parent| parent.children.contains(&key))
            });
            let children_ok = node.children.iter().all(|c| {
                self.nodes
                    .get(*c)
                    .is_some_and(|child| child.parents.contains(&key))
            });
            let material_ok = node.material.map_or(true, |m| self.nodes.contains_key(m));
            if !(parents_ok && children_ok && material_ok) {
                bad.push(node.name.clone());
            }
        }
        bad
    }

    /// Number of nodes of one kind.
    pub fn count_kind(&self, kind: NodeKind) -> usize {
        self.nodes.values().filter(|n| n.kind == kind).count()
    }
}
