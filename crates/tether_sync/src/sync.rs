//! Incremental sync.
//!
//! A [`SceneSync`] owns the mirror of one exported scene and applies
//! batches of host change notifications to it. Every batch runs inside one
//! edit section of the renderer scene, in a fixed order no matter how the
//! notifications arrived:
//!
//! 1. scene settings, world, materials and camera data
//! 2. new objects
//! 3. geometry, then transforms
//! 4. collections and the delete pass
//! 5. placement re-emission, then material re-attachment
//! 6. visibility
//!
//! Entity failures end up in the returned [`SyncReport`]; only a closed
//! renderer scene fails the whole batch.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tether_core::{EntityId, HostScene, LightRole, Object, ObjectType, Scene};
use tether_sg::{SgGraph, SgScene};

use crate::context::SessionContext;
use crate::error::SyncResult;
use crate::handle::NodeState;
use crate::kind::{detect_particles, detect_primitive, PrimitiveKind};
use crate::mirror::{is_data_block, SceneMirror};
use crate::options;
use crate::report::{Operation, SyncReport};
use crate::translators::{
    renderer_hidden, update_camera_transform, update_filter_transform, update_viewport_camera, CameraTranslator, Source,
    Translator,
};

/// What changed about an entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChangeKind {
    /// Scene-level settings, including the current frame
    Scene,
    World,
    /// Camera data-block parameters
    Camera,
    Material,
    /// An object was added, edited or shown/hidden
    Object {
        #[serde(default)]
        geometry: bool,
        #[serde(default)]
        transform: bool,
    },
    Collection,
}

/// One host change notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(default)]
    pub entity: EntityId,
    #[serde(flatten)]
    pub kind: ChangeKind,
}

impl Notification {
    pub fn scene() -> Self {
        Self {
            entity: EntityId::default(),
            kind: ChangeKind::Scene,
        }
    }

    pub fn world() -> Self {
        Self {
            entity: EntityId::default(),
            kind: ChangeKind::World,
        }
    }

    pub fn camera(entity: EntityId) -> Self {
        Self {
            entity,
            kind: ChangeKind::Camera,
        }
    }

    pub fn material(entity: EntityId) -> Self {
        Self {
            entity,
            kind: ChangeKind::Material,
        }
    }

    /// Object touched without geometry or transform edits: added, shown or
    /// hidden.
    pub fn object(entity: EntityId) -> Self {
        Self {
            entity,
            kind: ChangeKind::Object {
                geometry: false,
                transform: false,
            },
        }
    }

    pub fn geometry(entity: EntityId) -> Self {
        Self {
            entity,
            kind: ChangeKind::Object {
                geometry: true,
                transform: false,
            },
        }
    }

    pub fn transform(entity: EntityId) -> Self {
        Self {
            entity,
            kind: ChangeKind::Object {
                geometry: false,
                transform: true,
            },
        }
    }

    pub fn collection(entity: EntityId) -> Self {
        Self {
            entity,
            kind: ChangeKind::Collection,
        }
    }
}

/// A batch sorted by what it touches.
#[derive(Debug, Default)]
struct BatchPlan {
    scene: bool,
    world: bool,
    cameras: BTreeSet<EntityId>,
    materials: BTreeSet<EntityId>,
    objects: BTreeSet<EntityId>,
    geometry: BTreeSet<EntityId>,
    transform: BTreeSet<EntityId>,
    collections: BTreeSet<EntityId>,
}

impl BatchPlan {
    fn new(batch: &[Notification]) -> Self {
        let mut plan = Self::default();
        for note in batch {
            match note.kind {
                ChangeKind::Scene => plan.scene = true,
                ChangeKind::World => plan.world = true,
                ChangeKind::Camera => {
                    plan.cameras.insert(note.entity);
                }
                ChangeKind::Material => {
                    plan.materials.insert(note.entity);
                }
                ChangeKind::Object { geometry, transform } => {
                    plan.objects.insert(note.entity);
                    if geometry {
                        plan.geometry.insert(note.entity);
                    }
                    if transform {
                        plan.transform.insert(note.entity);
                    }
                }
                ChangeKind::Collection => {
                    plan.collections.insert(note.entity);
                }
            }
        }
        plan
    }
}

/// Work collected while a batch runs.
#[derive(Debug, Default)]
struct BatchState {
    /// Objects exported by this batch
    created: BTreeSet<EntityId>,
    /// Objects whose placements are torn down and rebuilt
    reemit: BTreeSet<EntityId>,
    /// New materials to bind on existing placements
    reattach: BTreeSet<EntityId>,
    /// Lights whose filter list must be rebuilt
    relink: BTreeSet<EntityId>,
    report: SyncReport,
}

fn is_light_filter(ob: &Object) -> bool {
    ob.data.as_light().is_some_and(|l| l.role == LightRole::LightFilter)
}

/// Hidden as far as the renderer is concerned. Lights are also hidden
/// while muted.
/// Lights that link the filter `filter`.
fn lights_linking(scene: &Scene, filter: EntityId) -> Vec<EntityId> {
    scene
        .lights(false)
        .filter(|ob| {
            ob.data
                .as_light()
                .is_some_and(|l| l.filters.iter().any(|link| link.filter == filter))
        })
        .map(|ob| ob.id)
        .collect()
}

impl SceneMirror {
    fn is_tracked(&self, id: EntityId) -> bool {
        self.index.contains_key(&id) || self.cameras.contains_key(&id)
    }

    /// Apply one batch of notifications to `graph`.
    pub fn apply_batch(&mut self, graph: &mut SgGraph, scene: &Scene, batch: &[Notification]) -> SyncResult<SyncReport> {
        let plan = BatchPlan::new(batch);
        let mut state = BatchState::default();
        log::debug!("Applying {} notification(s) at frame {}", batch.len(), scene.frame_current);
        self.processed.clear();

        if plan.scene {
            self.sync_scene_settings(graph, scene, &mut state)?;
        }
        if plan.world {
            options::export_integrator(graph, scene, &mut self.session);
            options::export_sample_filters(graph, scene, &mut self.session);
            options::export_display_filters(graph, scene, &mut self.session);
        }
        for id in &plan.materials {
            self.sync_material(graph, scene, *id, &mut state);
        }
        for id in &plan.cameras {
            self.sync_camera_data(graph, scene, *id, &mut state);
        }

        for id in &plan.objects {
            if self.is_tracked(*id) {
                continue;
            }
            match scene.object(*id) {
                Some(ob) if !ob.hidden => self.sync_new_object(graph, scene, ob, &mut state),
                Some(_) => {}
                None => log::trace!("Object {} is already gone", id),
            }
        }
        let geometry: Vec<EntityId> = plan.geometry.difference(&state.created).copied().collect();
        for id in geometry {
            if let Some(ob) = scene.object(id) {
                self.sync_geometry(graph, scene, ob, &mut state);
            }
        }
        let transform: Vec<EntityId> = plan.transform.difference(&state.created).copied().collect();
        for id in transform {
            // Already rebuilt from scratch
            if state.reemit.contains(&id) {
                continue;
            }
            if let Some(ob) = scene.object(id) {
                self.sync_transform(graph, scene, ob, &mut state);
            }
        }

        for id in &plan.collections {
            self.mark_collection(scene, *id, &mut state);
        }
        if !plan.collections.is_empty() && state.created.is_empty() {
            self.delete_pass(graph, scene, &mut state);
        }

        // Finished textures come back through `SceneSync::poll_textures`
        self.session.textures.prepare_all(false);

        for id in &plan.objects {
            self.sync_visibility(graph, scene, *id, &mut state);
        }
        self.reemit(graph, scene, &mut state);
        for id in std::mem::take(&mut state.reattach) {
            self.reattach_material(graph, scene, id);
        }
        for id in std::mem::take(&mut state.relink) {
            if let Some(light) = scene.object(id) {
                if let Err(err) = self.attach_light_filters(graph, scene, light) {
                    state.report.record_error(id, &light.name, Some(PrimitiveKind::Light), Operation::Update, err.to_string());
                }
            }
        }

        let any_lights = scene.lights(false).any(|ob| !ob.hidden);
        if plan.scene || any_lights != self.any_lights {
            self.any_lights = any_lights;
            self.update_default_light(graph, scene)?;
        }
        if self.session.config.is_interactive() {
            self.apply_solo_light(graph, scene);
        }
        self.frame_current = scene.frame_current;

        log::debug!("Batch done: {}", state.report);
        Ok(state.report)
    }

    /// Frame change re-translates frame-sensitive entities; nothing else
    /// notifies about them.
    fn sync_scene_settings(&mut self, graph: &mut SgGraph, scene: &Scene, state: &mut BatchState) -> SyncResult<()> {
        self.session.set_scene_tokens(scene);
        if scene.frame_current != self.frame_current {
            log::debug!("Frame {} -> {}", self.frame_current, scene.frame_current);
            self.frame_current = scene.frame_current;

            let materials: Vec<EntityId> = self
                .materials
                .values()
                .filter(|m| m.is_frame_sensitive)
                .map(|m| m.entity)
                .collect();
            for id in materials {
                if let Some(mat) = scene.material(id) {
                    self.update_material(graph, scene, mat, &mut state.report);
                }
            }
            let objects: Vec<EntityId> = self
                .objects
                .values()
                .filter(|n| n.is_frame_sensitive)
                .map(|n| n.entity)
                .collect();
            for id in objects {
                if let Some(ob) = scene.object(id) {
                    self.update_object(graph, scene, ob, &mut state.report);
                }
            }
        }

        options::export_global_options(graph, scene, &self.session);
        options::export_hider(graph, scene, &self.session);
        self.refresh_renderable_cameras(graph, scene);
        self.export_displays(graph, scene)?;
        Ok(())
    }

    fn sync_material(&mut self, graph: &mut SgGraph, scene: &Scene, id: EntityId, state: &mut BatchState) {
        let Some(mat) = scene.material(id) else {
            log::trace!("Material {} is gone", id);
            return;
        };
        if !self.materials.contains_key(&id) {
            // Nothing lists the objects using a new material; bind it by
            // scanning every placement once geometry is settled.
            self.export_material(graph, scene, mat, &mut state.report);
            state.reattach.insert(id);
            return;
        }
        if !self.update_material(graph, scene, mat, &mut state.report) {
            return;
        }
        let Some(key) = self.materials.get(&id).map(|m| m.sg_node) else {
            return;
        };
        log::debug!("{}: mesh light state changed, rebuilding its placements", mat.name);
        for node in self.objects.values() {
            for group in node.instances.values().filter(|g| g.material == Some(key)) {
                state.reemit.insert(group.object);
            }
        }
    }

    /// Projection refresh of the active camera while rendering
    /// interactively.
    fn sync_camera_data(&mut self, graph: &mut SgGraph, scene: &Scene, id: EntityId, state: &mut BatchState) {
        if !self.session.config.is_interactive() || scene.camera != Some(id) {
            return;
        }
        let Some(ob) = scene.object(id) else {
            return;
        };
        let Some(node) = self.cameras.get_mut(&id) else {
            return;
        };
        match CameraTranslator.update(&mut translate_ctx!(self, graph, scene), Source::Object(ob), node) {
            Ok(()) => state.report.updated.push(id),
            Err(err) => {
                state
                    .report
                    .record_error(id, &ob.name, Some(PrimitiveKind::Camera), Operation::Update, err.to_string())
            }
        }
    }

    fn sync_new_object(&mut self, graph: &mut SgGraph, scene: &Scene, ob: &Object, state: &mut BatchState) {
        log::debug!("New object '{}'", ob.name);
        state.created.insert(ob.id);

        if ob.object_type == ObjectType::Camera {
            self.export_camera(graph, scene, ob, &mut state.report);
            self.refresh_renderable_cameras(graph, scene);
            return;
        }

        if let Some(collection) = ob.instance_collection.filter(|_| ob.is_instancer()) {
            for member in scene.collection_all_objects(collection) {
                if self.is_tracked(member) {
                    state.reemit.insert(member);
                    continue;
                }
                let Some(member_ob) = scene.object(member) else {
                    continue;
                };
                if is_data_block(member_ob) && !member_ob.hidden {
                    self.export_object(graph, scene, member_ob, &mut state.report);
                    state.created.insert(member);
                    state.reemit.insert(member);
                }
            }
        }

        if !is_data_block(ob) {
            return;
        }
        self.export_object(graph, scene, ob, &mut state.report);
        state.reemit.insert(ob.id);
        if ob.object_type == ObjectType::Light {
            if is_light_filter(ob) {
                state.relink.extend(lights_linking(scene, ob.id));
            } else {
                state.relink.insert(ob.id);
            }
        }
    }

    fn sync_geometry(&mut self, graph: &mut SgGraph, scene: &Scene, ob: &Object, state: &mut BatchState) {
        if let Some(node) = self.cameras.get_mut(&ob.id) {
            if let Err(err) = CameraTranslator.update(&mut translate_ctx!(self, graph, scene), Source::Object(ob), node) {
                state
                    .report
                    .record_error(ob.id, &ob.name, Some(PrimitiveKind::Camera), Operation::Update, err.to_string());
            }
            return;
        }
        let Some((kind, meshlight)) = self
            .object_node(ob.id)
            .map(|node| (node.rman_type, node.instances.values().any(|g| g.is_meshlight)))
        else {
            return;
        };
        let expected = detect_primitive(ob);
        if !kind.is_compatible(expected) {
            self.repair_kind(graph, scene, ob, kind, expected, state);
            return;
        }

        if (meshlight && matches!(kind, PrimitiveKind::Mesh | PrimitiveKind::Subdivision | PrimitiveKind::Points))
            || kind == PrimitiveKind::GreasePencil
        {
            // Geometry under a live mesh light can't be edited in place
            state.report.instances_removed += self.clear_instances(graph, ob.id);
            state.reemit.insert(ob.id);
        }

        self.update_object(graph, scene, ob, &mut state.report);
        if kind.has_particles() {
            let targets = self.sync_particles(graph, scene, ob, &mut state.report);
            if ob.particle_systems.iter().any(|p| detect_particles(p).is_none()) {
                state.reemit.insert(ob.id);
            }
            state.reemit.extend(targets);
        }
        match kind {
            PrimitiveKind::LightFilter => state.relink.extend(lights_linking(scene, ob.id)),
            PrimitiveKind::Light => {
                state.relink.insert(ob.id);
            }
            _ => {}
        }
    }

    fn sync_transform(&mut self, graph: &mut SgGraph, scene: &Scene, ob: &Object, state: &mut BatchState) {
        if let Some(node) = self.cameras.get_mut(&ob.id) {
            if let Err(err) = update_camera_transform(graph, node, ob.matrix_world, None) {
                state
                    .report
                    .record_error(ob.id, &ob.name, Some(PrimitiveKind::Camera), Operation::Update, err.to_string());
            }
            return;
        }
        let Some(db_name) = self.index.get(&ob.id).cloned() else {
            return;
        };
        let Some(kind) = self.objects.get(&db_name).map(|n| n.rman_type) else {
            return;
        };
        let expected = detect_primitive(ob);
        if !kind.is_compatible(expected) {
            self.repair_kind(graph, scene, ob, kind, expected, state);
            return;
        }

        match kind {
            PrimitiveKind::LightFilter => {
                let Some(node) = self.objects.get(&db_name) else {
                    return;
                };
                if let Err(err) = update_filter_transform(&mut translate_ctx!(self, graph, scene), ob, node) {
                    state.report.record_error(ob.id, &ob.name, Some(kind), Operation::Update, err.to_string());
                }
            }
            // Strokes are only rebuilt on geometry edits
            PrimitiveKind::GreasePencil => {
                self.update_instance_transforms(graph, scene, ob.id);
            }
            _ if ob.is_instancer() => {
                let moved = self.update_instance_transforms(graph, scene, ob.id);
                log::trace!("{}: moved {} placement(s)", ob.name, moved);
                if kind == PrimitiveKind::Group {
                    self.update_object(graph, scene, ob, &mut state.report);
                }
            }
            PrimitiveKind::Group => self.update_object(graph, scene, ob, &mut state.report),
            // Particle copies may have come or gone along with the move
            _ => {
                state.reemit.insert(ob.id);
            }
        }
    }

    /// Light filters can first show up as plain lights. Rebuild those; any
    /// other kind change is refused.
    fn repair_kind(
        &mut self,
        graph: &mut SgGraph,
        scene: &Scene,
        ob: &Object,
        kind: PrimitiveKind,
        expected: PrimitiveKind,
        state: &mut BatchState,
    ) {
        if kind != PrimitiveKind::LightFilter && expected != PrimitiveKind::LightFilter {
            state.report.record_error(
                ob.id,
                &ob.name,
                Some(kind),
                Operation::Retype,
                "Changing primitive type is currently not supported.",
            );
            return;
        }
        log::error!("{}: registered as {} but is a {}, re-exporting", ob.name, kind, expected);

        state.report.instances_removed += self.clear_instances(graph, ob.id);
        if let Some(node) = self.index.remove(&ob.id).and_then(|name| self.objects.remove(&name)) {
            if let NodeState::LightFilter { lights, .. } = &node.state {
                state.relink.extend(lights.iter().copied());
            }
            graph.remove_coordinate_system(node.sg_node);
            graph.delete_subtree(node.sg_node);
        }

        self.export_object(graph, scene, ob, &mut state.report);
        state.created.insert(ob.id);
        if expected == PrimitiveKind::LightFilter {
            state.relink.extend(lights_linking(scene, ob.id));
        } else {
            state.reemit.insert(ob.id);
            if expected == PrimitiveKind::Light {
                state.relink.insert(ob.id);
            }
        }
    }

    /// Members of a changed collection, and instancers of it, get their
    /// placements rebuilt.
    fn mark_collection(&self, scene: &Scene, collection: EntityId, state: &mut BatchState) {
        let members = scene.collection_all_objects(collection);
        for instancer in scene.objects.iter().filter(|ob| ob.is_instancer()) {
            let Some(instanced) = instancer.instance_collection else {
                continue;
            };
            let inner = scene.collection_all_objects(instanced);
            if instanced == collection || inner.iter().any(|m| members.contains(m)) {
                state.reemit.insert(instancer.id);
                state.reemit.extend(inner.into_iter().filter(|m| self.is_tracked(*m)));
            }
        }
    }

    /// Drop the placements of every entity the host no longer has. Shared
    /// nodes stay: a collection instance may still use them.
    fn delete_pass(&mut self, graph: &mut SgGraph, scene: &Scene, state: &mut BatchState) {
        let gone: Vec<EntityId> = self
            .index
            .keys()
            .filter(|id| scene.object(**id).is_none())
            .copied()
            .collect();
        for id in gone {
            let removed = self.clear_instances(graph, id) + self.clear_child_instances(graph, id);
            log::debug!("Entity {} deleted, {} placement(s) removed", id, removed);
            state.report.instances_removed += removed;
            state.report.deleted.push(id);
            state.reemit.remove(&id);

            let Some(db_name) = self.index.remove(&id) else {
                continue;
            };
            let Some(node) = self.objects.get_mut(&db_name) else {
                continue;
            };
            if let NodeState::LightFilter { lights, .. } = &mut node.state {
                state.relink.extend(lights.drain(..));
                graph.remove_coordinate_system(node.sg_node);
                graph.set_hidden(node.sg_node, true);
                node.is_hidden = true;
            }
        }

        let cameras: Vec<EntityId> = self
            .cameras
            .keys()
            .filter(|id| scene.object(**id).is_none())
            .copied()
            .collect();
        for id in cameras {
            if let Some(node) = self.cameras.remove(&id) {
                log::debug!("Camera {} deleted", node.db_name);
                graph.delete_subtree(node.sg_node);
                state.report.deleted.push(id);
            }
        }
        if self.main_camera.is_some_and(|key| !graph.contains(key)) {
            self.main_camera = None;
        }
    }

    fn sync_visibility(&mut self, graph: &mut SgGraph, scene: &Scene, id: EntityId, state: &mut BatchState) {
        let Some(ob) = scene.object(id) else {
            return;
        };
        let Some(node) = self.index.get(&id).and_then(|name| self.objects.get_mut(name)) else {
            return;
        };
        let hidden = renderer_hidden(scene, ob, self.session.config.is_interactive());
        if node.is_hidden != hidden {
            log::debug!("{}: {}", ob.name, if hidden { "hidden" } else { "shown" });
        }
        node.is_hidden = hidden;
        graph.set_hidden(node.sg_node, hidden);

        let placed = !matches!(node.rman_type, PrimitiveKind::LightFilter | PrimitiveKind::Group);
        if !hidden && placed && node.instances.is_empty() {
            state.reemit.insert(id);
        }
    }

    /// Delete every placement of the marked objects and rebuild the ones
    /// the host still evaluates.
    fn reemit(&mut self, graph: &mut SgGraph, scene: &Scene, state: &mut BatchState) {
        if state.reemit.is_empty() {
            return;
        }
        let ids: Vec<EntityId> = std::mem::take(&mut state.reemit).into_iter().collect();
        let mut removed = 0;
        for id in &ids {
            removed += self.clear_instances(graph, *id) + self.clear_child_instances(graph, *id);
        }
        state.report.instances_removed += removed;
        self.emit_instances_of(graph, scene, &ids, &mut state.report);
        log::debug!("Re-emitted placements of {} object(s)", ids.len());
    }

    /// Follow the host viewport.
    pub fn update_view(&mut self, graph: &mut SgGraph, scene: &Scene) -> SyncResult<()> {
        let Some(mut node) = self.viewport_camera.take() else {
            return Ok(());
        };
        let result = update_viewport_camera(&mut translate_ctx!(self, graph, scene), &mut node);
        self.viewport_camera = Some(node);
        if let Err(err) = result {
            log::error!("Viewport camera update failed: {}", err);
        }
        Ok(())
    }
}

/// The sync engine of one render session.
///
/// Owns the mirror and a handle on the renderer scene. Every call edits
/// the scene inside one edit section.
pub struct SceneSync {
    mirror: SceneMirror,
    sg: Arc<SgScene>,
}

impl SceneSync {
    pub fn new(session: SessionContext, sg: Arc<SgScene>) -> Self {
        Self {
            mirror: SceneMirror::new(session),
            sg,
        }
    }

    pub fn mirror(&self) -> &SceneMirror {
        &self.mirror
    }

    pub fn sg_scene(&self) -> &Arc<SgScene> {
        &self.sg
    }

    /// Full export of the host scene.
    pub fn export(&mut self, host: &mut dyn HostScene) -> SyncResult<SyncReport> {
        let mut edit = self.sg.edit()?;
        self.mirror.export(&mut edit, host)
    }

    /// Apply a batch of change notifications.
    pub fn update_scene(&mut self, host: &dyn HostScene, batch: &[Notification]) -> SyncResult<SyncReport> {
        if batch.is_empty() {
            return Ok(SyncReport::default());
        }
        let mut edit = self.sg.edit()?;
        self.mirror.apply_batch(&mut edit, host.scene(), batch)
    }

    pub fn update_view(&mut self, host: &dyn HostScene) -> SyncResult<()> {
        let mut edit = self.sg.edit()?;
        self.mirror.update_view(&mut edit, host.scene())
    }

    /// Re-translate owners of textures that finished since the last call.
    pub fn poll_textures(&mut self, host: &dyn HostScene) -> SyncResult<SyncReport> {
        let mut report = SyncReport::default();
        let events = self.mirror.session.textures.poll_events();
        if events.is_empty() {
            return Ok(report);
        }
        let mut edit = self.sg.edit()?;
        self.mirror.apply_texture_events(&mut edit, host.scene(), events, &mut report);
        Ok(report)
    }

    /// End the session. Later calls fail with `RendererGone`.
    pub fn stop(&self) {
        self.sg.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::error::SyncError;
    use crate::testing::{cube, init_logging};
    use tether_core::{
        Collection, FilterLink, LightData, Material, ObjectData, Particle, ParticleRender, ParticleSystem,
        PrimitiveOverride, QuadricShape, ShaderNode, TextureSlot,
    };
    use tether_math::{Mat4, Vec3};

    fn engine(config: SessionConfig) -> SceneSync {
        init_logging();
        let session = SessionContext::new(config).unwrap();
        SceneSync::new(session, Arc::new(SgScene::new()))
    }

    fn light(id: u64, name: &str, data: LightData) -> Object {
        Object::new(EntityId(id), name, ObjectType::Light, ObjectData::Light(data))
    }

    fn exported(scene: &mut Scene) -> SceneSync {
        let mut sync = engine(SessionConfig::interactive());
        let report = sync.export(scene).unwrap();
        assert!(report.is_clean(), "{:?}", report.errors);
        sync
    }

    #[test]
    fn test_new_material_binds_on_existing_placement() {
        let mut scene = Scene::new("s");
        scene.add_object(cube(1, "Cube", Vec3::ZERO));
        let mut sync = exported(&mut scene);

        scene.add_material(Material::new(EntityId(20), "Blue").with_bxdf(ShaderNode::new("PxrSurface")));
        scene.object_mut(EntityId(1)).unwrap().material_slots = vec![Some(EntityId(20))];
        let report = sync
            .update_scene(&scene, &[Notification::material(EntityId(20)), Notification::object(EntityId(1))])
            .unwrap();
        assert!(report.is_clean(), "{:?}", report.errors);

        let mirror = sync.mirror();
        let mat = mirror.material_node(EntityId(20)).unwrap();
        let node = mirror.object_node(EntityId(1)).unwrap();
        assert_eq!(node.instances.len(), 1);
        let group = node.instances.values().next().unwrap();
        assert_eq!(group.material, Some(mat.sg_node));
        assert_eq!(sync.sg_scene().read().node(group.sg_node).unwrap().material, Some(mat.sg_node));
        assert_eq!(mirror.materials.values().filter(|m| m.entity == EntityId(20)).count(), 1);
    }

    #[test]
    fn test_delete_through_collection_edit_keeps_geometry() {
        let mut scene = Scene::new("s");
        scene.add_object(cube(1, "Keep", Vec3::ZERO));
        scene.add_object(cube(2, "Gone", Vec3::X));
        scene.add_collection(Collection {
            id: EntityId(50),
            name: "Props".into(),
            objects: vec![EntityId(1), EntityId(2)],
            children: Vec::new(),
        });
        let mut sync = exported(&mut scene);
        let gone_key = sync.mirror().object_node(EntityId(2)).unwrap().sg_node;

        scene.remove_object(EntityId(2));
        scene.collection_mut(EntityId(50)).unwrap().objects.retain(|id| *id != EntityId(2));
        let report = sync.update_scene(&scene, &[Notification::collection(EntityId(50))]).unwrap();

        assert_eq!(report.deleted, vec![EntityId(2)]);
        assert_eq!(report.instances_removed, 1);
        let mirror = sync.mirror();
        assert!(mirror.object_node(EntityId(2)).is_none());
        let orphan = mirror.objects().find(|n| n.entity == EntityId(2)).unwrap();
        assert!(orphan.instances.is_empty());
        assert_eq!(mirror.object_node(EntityId(1)).unwrap().instances.len(), 1);

        let graph = sync.sg_scene().read();
        assert!(graph.contains(gone_key));
        assert!(graph.node(gone_key).unwrap().parents.is_empty());
        assert!(graph.dangling_links().is_empty(), "{:?}", graph.dangling_links());
    }

    #[test]
    fn test_new_object_notification_suppresses_delete_pass() {
        let mut scene = Scene::new("s");
        scene.add_object(cube(1, "A", Vec3::ZERO));
        scene.add_collection(Collection {
            id: EntityId(50),
            name: "Props".into(),
            objects: vec![EntityId(1)],
            children: Vec::new(),
        });
        let mut sync = exported(&mut scene);

        scene.remove_object(EntityId(1));
        scene.add_object(cube(2, "B", Vec3::ZERO));
        let report = sync
            .update_scene(&scene, &[Notification::object(EntityId(2)), Notification::collection(EntityId(50))])
            .unwrap();
        assert!(report.deleted.is_empty());
        assert_eq!(report.exported, vec![EntityId(2)]);
        assert_eq!(sync.mirror().object_node(EntityId(1)).unwrap().instances.len(), 1);
    }

    #[test]
    fn test_light_filter_provisional_node_is_rebuilt() {
        let mut scene = Scene::new("s");
        let mut key = LightData::default();
        key.filters.push(FilterLink {
            filter: EntityId(5),
            combine: Default::default(),
        });
        scene.add_object(light(1, "Key", key));
        let mut sync = exported(&mut scene);

        // The host announces the filter before its filter settings exist
        scene.add_object(light(5, "Blocker", LightData::default()));
        sync.update_scene(&scene, &[Notification::object(EntityId(5))]).unwrap();
        assert_eq!(sync.mirror().object_node(EntityId(5)).unwrap().rman_type, PrimitiveKind::Light);

        if let ObjectData::Light(data) = &mut scene.object_mut(EntityId(5)).unwrap().data {
            data.role = LightRole::LightFilter;
        }
        let report = sync.update_scene(&scene, &[Notification::geometry(EntityId(5))]).unwrap();
        assert!(report.is_clean(), "{:?}", report.errors);

        let mirror = sync.mirror();
        let filter = mirror.object_node(EntityId(5)).unwrap();
        assert_eq!(filter.rman_type, PrimitiveKind::LightFilter);
        assert!(filter.instances.is_empty());
        let light = mirror.object_node(EntityId(1)).unwrap();
        let graph = sync.sg_scene().read();
        let filters = &graph.node(light.sg_node).unwrap().light_filters;
        assert_eq!(filters.len(), 1);
        assert!(filters[0].handle.starts_with(&filter.db_name));
        assert!(graph.coordinate_systems().contains(&filter.sg_node));
        assert!(graph.find_by_name("Blocker_5-LIGHT").is_none());
    }

    #[test]
    fn test_deleted_light_filter_leaves_light_filter_list() {
        let mut scene = Scene::new("s");
        let mut key = LightData::default();
        key.filters.push(FilterLink {
            filter: EntityId(5),
            combine: Default::default(),
        });
        scene.add_object(light(1, "Key", key));
        scene.add_object(light(
            5,
            "Blocker",
            LightData {
                role: LightRole::LightFilter,
                ..LightData::default()
            },
        ));
        scene.add_collection(Collection {
            id: EntityId(50),
            name: "Lights".into(),
            objects: vec![EntityId(1), EntityId(5)],
            children: Vec::new(),
        });
        let mut sync = exported(&mut scene);
        let light_key = sync.mirror().object_node(EntityId(1)).unwrap().sg_node;
        let filter_key = sync.mirror().object_node(EntityId(5)).unwrap().sg_node;
        assert_eq!(sync.sg_scene().read().node(light_key).unwrap().light_filters.len(), 1);

        scene.remove_object(EntityId(5));
        let report = sync.update_scene(&scene, &[Notification::collection(EntityId(50))]).unwrap();

        assert_eq!(report.deleted, vec![EntityId(5)]);
        let graph = sync.sg_scene().read();
        assert!(graph.node(light_key).unwrap().light_filters.is_empty());
        assert!(!graph.coordinate_systems().contains(&filter_key));
        assert!(graph.node(filter_key).unwrap().hidden);
    }

    #[test]
    fn test_hidden_light_stays_hidden() {
        let mut scene = Scene::new("s");
        scene.add_object(light(1, "Key", LightData::default()));
        let mut sync = exported(&mut scene);
        let key = sync.mirror().object_node(EntityId(1)).unwrap().sg_node;
        assert!(!sync.sg_scene().read().node(key).unwrap().hidden);

        scene.object_mut(EntityId(1)).unwrap().hidden = true;
        sync.update_scene(&scene, &[Notification::object(EntityId(1))]).unwrap();
        assert!(sync.sg_scene().read().node(key).unwrap().hidden);
        assert!(sync.mirror().object_node(EntityId(1)).unwrap().is_hidden);

        // Re-translating the light keeps the host's hide
        sync.update_scene(&scene, &[Notification::geometry(EntityId(1))]).unwrap();
        assert!(sync.sg_scene().read().node(key).unwrap().hidden);

        scene.object_mut(EntityId(1)).unwrap().hidden = false;
        sync.update_scene(&scene, &[Notification::object(EntityId(1))]).unwrap();
        assert!(!sync.sg_scene().read().node(key).unwrap().hidden);
    }

    #[test]
    fn test_kind_change_is_reported() {
        let mut scene = Scene::new("s");
        scene.add_object(cube(1, "Cube", Vec3::ZERO));
        let mut sync = exported(&mut scene);

        scene.object_mut(EntityId(1)).unwrap().primitive = PrimitiveOverride::Quadric {
            shape: QuadricShape::Sphere { radius: 1.0 },
        };
        let report = sync.update_scene(&scene, &[Notification::geometry(EntityId(1))]).unwrap();
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].operation, Operation::Retype);
        assert_eq!(report.errors[0].message, "Changing primitive type is currently not supported.");
        assert_eq!(sync.mirror().object_node(EntityId(1)).unwrap().rman_type, PrimitiveKind::Mesh);
    }

    #[test]
    fn test_particle_copies_follow_count_changes() {
        fn burst(count: usize) -> ParticleSystem {
            ParticleSystem {
                name: "Pebbles".into(),
                settings: EntityId(40),
                render_as: ParticleRender::Object(EntityId(2)),
                material: 1,
                particles: (0..count).map(|i| Particle::at(Vec3::new(i as f32, 0.0, 0.0))).collect(),
                hair: Vec::new(),
                width: 0.05,
                render_emitter: true,
            }
        }
        fn copies(sync: &SceneSync) -> usize {
            let node = sync.mirror().object_node(EntityId(2)).unwrap();
            node.instances.values().filter(|g| g.parent == Some(EntityId(1))).count()
        }

        let mut scene = Scene::new("s");
        let mut emitter = cube(1, "Ground", Vec3::ZERO);
        emitter.particle_systems.push(burst(5));
        scene.add_object(emitter);
        let mut pebble = cube(2, "Pebble", Vec3::ZERO);
        pebble.instanced_only = true;
        scene.add_object(pebble);
        let mut sync = exported(&mut scene);
        assert_eq!(copies(&sync), 5);

        scene.object_mut(EntityId(1)).unwrap().particle_systems[0] = burst(3);
        sync.update_scene(&scene, &[Notification::geometry(EntityId(1))]).unwrap();
        assert_eq!(copies(&sync), 3);

        scene.object_mut(EntityId(1)).unwrap().particle_systems[0] = burst(7);
        sync.update_scene(&scene, &[Notification::geometry(EntityId(1))]).unwrap();
        assert_eq!(copies(&sync), 7);
        assert!(sync.sg_scene().read().dangling_links().is_empty());
    }

    #[test]
    fn test_frame_change_only_retranslates_frame_sensitive_materials() {
        let mut scene = Scene::new("s");
        let mut seq = Material::new(EntityId(20), "Seq").with_bxdf(ShaderNode::new("PxrSurface"));
        seq.textures.push(TextureSlot {
            param: "diffuseColorMap".into(),
            path: "tex/seq.<f4>.tex".into(),
        });
        scene.add_material(seq);
        scene.add_material(Material::new(EntityId(21), "Plain").with_bxdf(ShaderNode::new("PxrSurface")));
        let mut sync = exported(&mut scene);

        let report = sync.update_scene(&scene, &[Notification::scene()]).unwrap();
        assert!(report.updated.is_empty());

        scene.frame_current += 1;
        let report = sync.update_scene(&scene, &[Notification::scene()]).unwrap();
        assert!(report.was_updated(EntityId(20)));
        assert!(!report.was_updated(EntityId(21)));
        assert_eq!(sync.mirror().frame(), scene.frame_current);
    }

    #[test]
    fn test_geometry_and_transform_in_any_order() {
        let mut scene = Scene::new("s");
        scene.add_object(cube(1, "Cube", Vec3::ZERO));
        let mut sync = exported(&mut scene);

        scene.object_mut(EntityId(1)).unwrap().matrix_world = Mat4::from_translation(Vec3::new(0.0, 0.0, 3.0));
        let batch = [Notification::transform(EntityId(1)), Notification::geometry(EntityId(1))];
        let report = sync.update_scene(&scene, &batch).unwrap();
        assert!(report.is_clean(), "{:?}", report.errors);
        assert!(report.was_updated(EntityId(1)));

        let node = sync.mirror().object_node(EntityId(1)).unwrap();
        assert_eq!(node.instances.len(), 1);
        let group = node.instances.values().next().unwrap();
        let graph = sync.sg_scene().read();
        let matrix = graph.node(group.sg_node).unwrap().transform.first().unwrap();
        assert_eq!(matrix.w_axis.z, 3.0);
    }

    #[test]
    fn test_hide_and_show_object() {
        let mut scene = Scene::new("s");
        scene.add_object(cube(1, "Cube", Vec3::ZERO));
        let mut sync = exported(&mut scene);
        let key = sync.mirror().object_node(EntityId(1)).unwrap().sg_node;

        scene.object_mut(EntityId(1)).unwrap().hidden = true;
        sync.update_scene(&scene, &[Notification::object(EntityId(1))]).unwrap();
        assert!(sync.sg_scene().read().node(key).unwrap().hidden);

        scene.object_mut(EntityId(1)).unwrap().hidden = false;
        sync.update_scene(&scene, &[Notification::object(EntityId(1))]).unwrap();
        assert!(!sync.sg_scene().read().node(key).unwrap().hidden);
        assert_eq!(sync.mirror().object_node(EntityId(1)).unwrap().instances.len(), 1);
    }

    #[test]
    fn test_closed_scene_is_renderer_gone() {
        let mut scene = Scene::new("s");
        scene.add_object(cube(1, "Cube", Vec3::ZERO));
        let mut sync = exported(&mut scene);
        sync.stop();
        let err = sync.update_scene(&scene, &[Notification::geometry(EntityId(1))]).unwrap_err();
        assert!(matches!(err, SyncError::RendererGone));
    }

    #[test]
    fn test_notification_json() {
        let notes: Vec<Notification> = serde_json::from_str(
            r#"[{"entity": 3, "type": "object", "geometry": true}, {"type": "world"}]"#,
        )
        .unwrap();
        assert_eq!(notes[0], Notification::geometry(EntityId(3)));
        assert_eq!(notes[1], Notification::world());
    }
}
