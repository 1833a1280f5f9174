//! Per-kind translators: host entity in, renderer nodes out.
//!
//! Each translator owns the conversion for one or more [`PrimitiveKind`]s.
//! `export` creates the node (or declines with `Ok(None)`), `update`
//! rewrites everything derived from the host data and
//! `export_deform_sample` writes one motion sample of the points.
//! Placement (instance groups, transforms, materials on groups) belongs to
//! the fan-out, not to translators.

mod camera;
mod curve;
mod gpencil;
mod group;
mod light;
mod lightfilter;
mod material;
mod mesh;
mod meta;
mod particles;
mod points;
mod procedural;
mod quadric;
mod volume;

use std::collections::BTreeMap;

use tether_core::{EntityId, HostValue, Material, Object, ParticleSystem, Params, Scene};
use tether_sg::{NodeKey, ParamList, ParamValue, SgError, SgGraph};
use thiserror::Error;

use crate::context::SessionContext;
use crate::handle::RmanSgNode;
use crate::kind::{detect_primitive, PrimitiveKind};
use crate::naming::{self, ObjHash};
use crate::schema::{self, is_falsy};
use crate::string_expr::is_frame_sensitive;
use crate::texture::{is_texture_path, TextureOwner};

pub use camera::{export_viewport_camera, update_camera_transform, update_viewport_camera, CameraTranslator};
pub use curve::CurveTranslator;
pub use gpencil::GreasePencilTranslator;
pub use group::GroupTranslator;
pub use light::{renderer_hidden, LightTranslator};
pub use lightfilter::{combine_filters, update_filter_transform, LightFilterTranslator};
pub use material::MaterialTranslator;
pub use mesh::MeshTranslator;
pub use meta::MetaTranslator;
pub use particles::ParticlesTranslator;
pub use points::PointsTranslator;
pub use procedural::ProceduralTranslator;
pub use quadric::QuadricTranslator;
pub use volume::VolumeTranslator;

#[derive(Error, Debug)]
pub enum TranslateError {
    #[error(transparent)]
    Graph(#[from] SgError),

    #[error("Malformed {what}: {reason}")]
    Malformed { what: &'static str, reason: String },
}

pub type TranslateResult<T> = Result<T, TranslateError>;

impl TranslateError {
    pub fn malformed(what: &'static str, reason: impl Into<String>) -> Self {
        TranslateError::Malformed {
            what,
            reason: reason.into(),
        }
    }
}

/// The host entity a translator reads.
#[derive(Clone, Copy, Debug)]
pub enum Source<'a> {
    Object(&'a Object),
    Particles {
        emitter: &'a Object,
        psys: &'a ParticleSystem,
        index: usize,
    },
    Material(&'a Material),
}

impl<'a> Source<'a> {
    /// Object for object sources, the emitter for particle sources.
    pub fn object(&self) -> Option<&'a Object> {
        match self {
            Source::Object(ob) => Some(ob),
            Source::Particles { emitter, .. } => Some(emitter),
            Source::Material(_) => None,
        }
    }

    pub fn entity(&self) -> EntityId {
        match self {
            Source::Object(ob) => ob.id,
            Source::Particles { emitter, .. } => emitter.id,
            Source::Material(mat) => mat.id,
        }
    }

    pub fn name(&self) -> &'a str {
        match self {
            Source::Object(ob) => &ob.name,
            Source::Particles { psys, .. } => &psys.name,
            Source::Material(mat) => &mat.name,
        }
    }
}

/// Everything a translator may touch during one call.
pub struct TranslateContext<'a> {
    pub graph: &'a mut SgGraph,
    pub scene: &'a Scene,
    pub session: &'a mut SessionContext,
    /// Exported materials, for material bindings on sub-meshes and strokes
    pub materials: &'a BTreeMap<EntityId, RmanSgNode>,
    pub obj_hash: &'a mut ObjHash,
}

impl TranslateContext<'_> {
    pub fn material_node(&self, id: EntityId) -> Option<NodeKey> {
        self.materials.get(&id).map(|m| m.sg_node)
    }

    /// Node of the material in a 0-based slot of `ob`.
    pub fn slot_material_node(&self, ob: &Object, slot: usize) -> Option<NodeKey> {
        self.scene
            .slot_material(ob, slot)
            .and_then(|m| self.material_node(m.id))
    }

    pub fn is_interactive(&self) -> bool {
        self.session.config.is_interactive()
    }
}

/// Conversion of one kind of host entity.
pub trait Translator: Sync {
    /// Create the renderer node for `src` named `db_name`. `Ok(None)` means
    /// the entity has nothing to render and is skipped without error.
    fn export(
        &self,
        ctx: &mut TranslateContext<'_>,
        src: Source<'_>,
        db_name: &str,
    ) -> TranslateResult<Option<RmanSgNode>>;

    /// Rewrite everything derived from the host data on an exported node.
    fn update(&self, ctx: &mut TranslateContext<'_>, src: Source<'_>, node: &mut RmanSgNode) -> TranslateResult<()>;

    /// Write the points of motion sample `sample`.
    fn export_deform_sample(
        &self,
        _ctx: &mut TranslateContext<'_>,
        _src: Source<'_>,
        _node: &mut RmanSgNode,
        _sample: usize,
    ) -> TranslateResult<()> {
        Ok(())
    }

    /// Schema-driven primvars on the geometry node(s).
    fn export_object_primvars(&self, ctx: &mut TranslateContext<'_>, ob: &Object, node: &RmanSgNode) {
        let values = object_primvar_values(ctx, ob);
        let mut targets = vec![node.sg_node];
        targets.extend(node.sub_meshes().iter().map(|(_, key)| *key));
        for key in targets {
            if let Some(dag) = ctx.graph.node_mut(key) {
                for (name, value) in &values {
                    dag.primvars.set_constant(name.clone(), value.clone());
                }
            }
        }
    }

    /// Schema-driven attributes and identity on an instance group.
    fn export_object_attributes(
        &self,
        ctx: &mut TranslateContext<'_>,
        ob: &Object,
        node: &RmanSgNode,
        group: NodeKey,
        persistent_id: i32,
    ) -> TranslateResult<()> {
        export_object_attributes(ctx, ob, node, group, persistent_id)
    }
}

/// Translator for a primitive kind.
pub fn translator(kind: PrimitiveKind) -> &'static dyn Translator {
    match kind {
        PrimitiveKind::Mesh | PrimitiveKind::Subdivision => &MeshTranslator,
        PrimitiveKind::Curve => &CurveTranslator,
        PrimitiveKind::Points => &PointsTranslator,
        PrimitiveKind::Quadric => &QuadricTranslator,
        PrimitiveKind::Volume => &VolumeTranslator,
        PrimitiveKind::Procedural => &ProceduralTranslator,
        PrimitiveKind::Meta => &MetaTranslator,
        PrimitiveKind::Light => &LightTranslator,
        PrimitiveKind::LightFilter => &LightFilterTranslator,
        PrimitiveKind::Camera => &CameraTranslator,
        PrimitiveKind::Material => &MaterialTranslator,
        PrimitiveKind::Group => &GroupTranslator,
        PrimitiveKind::Emitter | PrimitiveKind::Hair => &ParticlesTranslator,
        PrimitiveKind::GreasePencil => &GreasePencilTranslator,
    }
}

/// Primvar values an object asks for. Falsy values are skipped. A value
/// equal to the property's inherit marker takes the scene's value instead.
fn object_primvar_values(ctx: &TranslateContext<'_>, ob: &Object) -> Vec<(String, ParamValue)> {
    let schema = &ctx.session.schema;
    let mut values = Vec::new();
    for (prop, primvar, meta) in schema.object_primvars() {
        let Some(mut value) = ob.params.get(prop).or(meta.default.as_ref()) else {
            continue;
        };
        if is_falsy(value) {
            continue;
        }
        if meta.inherits(value) {
            match ctx
                .scene
                .settings
                .params
                .get(prop)
                .or_else(|| schema.scene.get(prop).and_then(|m| m.default.as_ref()))
            {
                Some(inherited) => value = inherited,
                None => continue,
            }
        }
        match meta.convert(value) {
            Some(converted) => values.push((primvar.to_string(), converted)),
            None => log::warn!("{}: cannot convert '{}' to {:?}", ob.name, prop, meta.renderman_type),
        }
    }
    values
}

/// Attributes, trace/lighting subsets and identity on an instance group.
pub fn export_object_attributes(
    ctx: &mut TranslateContext<'_>,
    ob: &Object,
    node: &RmanSgNode,
    group: NodeKey,
    persistent_id: i32,
) -> TranslateResult<()> {
    let mut attrs = ParamList::new();
    let mut inherited = Vec::new();
    for (prop, attr, meta) in ctx.session.schema.object_attributes() {
        let Some(value) = ob.params.get(prop).or(meta.default.as_ref()) else {
            continue;
        };
        if meta.inherits(value) {
            inherited.push(attr.to_string());
            continue;
        }
        match meta.convert(value) {
            Some(converted) => attrs.set(attr, converted),
            None => log::warn!("{}: cannot convert '{}' to {:?}", ob.name, prop, meta.renderman_type),
        }
    }

    let mut groups: Vec<String> = ctx
        .scene
        .settings
        .object_groups
        .iter()
        .filter(|g| g.members.contains(&ob.id))
        .map(|g| g.name.clone())
        .collect();
    for name in &ob.groups {
        if !groups.contains(name) {
            groups.push(name.clone());
        }
    }
    let mut membership = format!("World,{}", node.db_name);
    for name in &groups {
        membership.push(',');
        membership.push_str(name);
    }
    attrs.set_string("grouping:membership", membership);
    if !groups.is_empty() {
        attrs.set_string("identifier:lpegroup", format!("*,{}", groups.join(",")));
    }

    attrs.set_string("lighting:excludesubset", light_subset(ctx.scene, &ob.lighting_exclude));
    attrs.set_string("lightfilter:subset", light_subset(ctx.scene, &ob.lightfilter_subset));
    if let Some(trace_set) = &ob.trace_set {
        attrs.set_string("grouping:tracesubset", trace_set.as_str());
    }

    // Placement group names are unique per copy; data-block names are shared.
    let placement = ctx
        .graph
        .node(group)
        .map(|dag| dag.name.clone())
        .unwrap_or_else(|| node.db_name.clone());
    let id = ctx.obj_hash.stamp(&placement, persistent_id);
    attrs.set_int("identifier:id", id);
    attrs.set_string("identifier:name", ob.name.as_str());
    if node.rman_type.is_procedural() {
        attrs.set_float("user:procprimid", naming::name_hash(&node.db_name) as f32);
    }

    let dag = ctx.graph.expect_node_mut(group)?;
    for name in &inherited {
        dag.attributes.remove(name);
    }
    for (name, value) in attrs.iter() {
        dag.attributes.set(name, value.clone());
    }
    Ok(())
}

/// Space-separated db names of the given light objects.
fn light_subset(scene: &Scene, ids: &[EntityId]) -> String {
    ids.iter()
        .filter_map(|id| scene.object(*id))
        .map(|ob| naming::db_name(ob, detect_primitive(ob)))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Host shader parameters as renderer parameters.
///
/// Strings are expanded. Those that name textures are registered with the
/// texture manager under `owner` and replaced by the prepared path.
/// Returns whether any string depends on the frame.
pub(crate) fn convert_shader_params(
    session: &mut SessionContext,
    owner: TextureOwner,
    params: &Params,
    out: &mut ParamList,
) -> bool {
    let mut frame_sensitive = false;
    for (name, value) in params {
        let converted = match value {
            HostValue::String(s) => {
                frame_sensitive |= is_frame_sensitive(s);
                ParamValue::String(resolve_string(session, owner, name, s))
            }
            other => schema::infer(other),
        };
        out.set(name.as_str(), converted);
    }
    frame_sensitive
}

/// Expand a string parameter and, when it names a texture, swap in the
/// prepared file.
pub(crate) fn resolve_string(session: &mut SessionContext, owner: TextureOwner, param: &str, value: &str) -> String {
    let expanded = session.strings.expand(value);
    if !is_texture_path(&expanded) {
        return expanded;
    }
    let id = session.textures.register(owner, param, &expanded);
    session.textures.resolve(&id).unwrap_or(expanded)
}

/// Positions relative to an object's world matrix.
pub(crate) fn to_object_space(ob: &Object, points: impl Iterator<Item = tether_math::Vec3>) -> Vec<tether_math::Vec3> {
    let inverse = ob.matrix_world.inverse();
    points.map(|p| inverse.transform_point3(p)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::handle::RmanSgNode;
    use tether_core::{MeshData, ObjectData, ObjectGroup, ObjectType};

    fn setup() -> (SgGraph, Scene, SessionContext) {
        (
            SgGraph::new(),
            Scene::new("shot"),
            SessionContext::new(SessionConfig::default()).unwrap(),
        )
    }

    #[test]
    fn test_every_kind_has_translator() {
        for kind in PrimitiveKind::ALL {
            let _ = translator(kind);
        }
    }

    #[test]
    fn test_attributes_membership_and_id() {
        let (mut graph, mut scene, mut session) = setup();
        let mut ob = Object::new(EntityId(4), "Cube", ObjectType::Mesh, ObjectData::Mesh(MeshData::cube()));
        ob.groups.push("hero".into());
        scene.settings.object_groups.push(ObjectGroup {
            name: "props".into(),
            members: vec![EntityId(4)],
        });
        let group = graph.create_node(tether_sg::NodeKind::Group, "Cube_4");
        let node = RmanSgNode::new("Cube_4-MESH", PrimitiveKind::Mesh, ob.id, graph.root());
        let materials = BTreeMap::new();
        let mut obj_hash = ObjHash::new();
        let mut ctx = TranslateContext {
            graph: &mut graph,
            scene: &scene,
            session: &mut session,
            materials: &materials,
            obj_hash: &mut obj_hash,
        };
        export_object_attributes(&mut ctx, &ob, &node, group, 77).unwrap();

        let attrs = &graph.node(group).unwrap().attributes;
        assert_eq!(
            attrs.get_string("grouping:membership"),
            Some("World,Cube_4-MESH,props,hero")
        );
        assert_eq!(attrs.get_string("identifier:lpegroup"), Some("*,props,hero"));
        assert_eq!(attrs.get_int("identifier:id"), Some(77));
        assert_eq!(attrs.get_string("lighting:excludesubset"), Some(""));
        assert_eq!(obj_hash.name(77), Some("Cube_4"));
    }

    #[test]
    fn test_inherited_attribute_removed() {
        let (mut graph, scene, mut session) = setup();
        let mut ob = Object::new(EntityId(2), "Cube", ObjectType::Mesh, ObjectData::Mesh(MeshData::cube()));
        let (prop, attr) = {
            let (prop, attr, meta) = session
                .schema
                .object_attributes()
                .find(|(_, _, meta)| meta.inheritable)
                .unwrap();
            ob.params.insert(prop.to_string(), meta.inherit_true_value.clone().unwrap());
            (prop.to_string(), attr.to_string())
        };
        let group = graph.create_node(tether_sg::NodeKind::Group, "g");
        graph.node_mut(group).unwrap().attributes.set_int(attr.as_str(), 1);
        let node = RmanSgNode::new("Cube_2-MESH", PrimitiveKind::Mesh, ob.id, graph.root());
        let materials = BTreeMap::new();
        let mut obj_hash = ObjHash::new();
        let mut ctx = TranslateContext {
            graph: &mut graph,
            scene: &scene,
            session: &mut session,
            materials: &materials,
            obj_hash: &mut obj_hash,
        };
        export_object_attributes(&mut ctx, &ob, &node, group, 0).unwrap();
        assert!(
            !graph.node(group).unwrap().attributes.contains(&attr),
            "{} should defer to the scene",
            prop
        );
    }

    #[test]
    fn test_primvar_inherits_scene_value() {
        let (mut graph, mut scene, mut session) = setup();
        let mut ob = Object::new(EntityId(3), "Cube", ObjectType::Mesh, ObjectData::Mesh(MeshData::cube()));
        let (prop, primvar) = {
            let (prop, primvar, meta) = session
                .schema
                .object_primvars()
                .find(|(_, _, meta)| meta.inheritable)
                .unwrap();
            ob.params.insert(prop.to_string(), meta.inherit_true_value.clone().unwrap());
            (prop.to_string(), primvar.to_string())
        };
        scene.settings.params.insert(prop.clone(), HostValue::Float(4.0));
        let key = graph.create_node(tether_sg::NodeKind::Mesh, "m");
        let node = RmanSgNode::new("Cube_3-MESH", PrimitiveKind::Mesh, ob.id, key);
        let materials = BTreeMap::new();
        let mut obj_hash = ObjHash::new();
        let mut ctx = TranslateContext {
            graph: &mut graph,
            scene: &scene,
            session: &mut session,
            materials: &materials,
            obj_hash: &mut obj_hash,
        };
        MeshTranslator.export_object_primvars(&mut ctx, &ob, &node);
        let value = graph.node(key).unwrap().primvars.value(&primvar).cloned();
        assert_eq!(value, Some(ParamValue::Float(4.0)));
    }
}
