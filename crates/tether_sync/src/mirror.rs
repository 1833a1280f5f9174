//! Scene Mirror - the renderer-side record of every exported entity.
//!
//! The mirror owns the maps from host entities to renderer nodes and runs
//! the full export: materials, data blocks, scene-wide state, then
//! placements (directly, or through the motion sampler when motion blur is
//! on). Incremental sync works on the same maps.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use tether_core::{EntityId, HostScene, LightRole, Material, Object, ObjectType, ParticleRender, Scene};
use tether_math::Subframe;
use tether_sg::{NodeKey, NodeKind, Renderable, SgGraph, SgResult};

use crate::context::SessionContext;
use crate::error::SyncResult;
use crate::handle::{NodeState, RmanSgNode};
use crate::kind::{detect_particles, detect_primitive, PrimitiveKind};
use crate::motion::motion_subframes;
use crate::naming::{self, ObjHash};
use crate::options;
use crate::report::{Operation, SyncReport};
use crate::texture::{TextureEvent, TextureOwner, TextureStatus};
use crate::translators::{
    combine_filters, export_viewport_camera, renderer_hidden, translator, MaterialTranslator, ParticlesTranslator,
    Source, Translator,
};

/// Renderer mirror of one host scene.
#[derive(Debug)]
pub struct SceneMirror {
    pub(crate) session: SessionContext,
    pub(crate) obj_hash: ObjHash,
    pub(crate) materials: BTreeMap<EntityId, RmanSgNode>,
    /// Data-block nodes by db_name
    pub(crate) objects: BTreeMap<String, RmanSgNode>,
    /// Entity to db_name. Several entities may share one node (meta families).
    pub(crate) index: BTreeMap<EntityId, String>,
    /// Particle system nodes by db_name
    pub(crate) particles: BTreeMap<String, RmanSgNode>,
    pub(crate) cameras: BTreeMap<EntityId, RmanSgNode>,
    pub(crate) viewport_camera: Option<RmanSgNode>,
    pub(crate) main_camera: Option<NodeKey>,
    pub(crate) default_light: Option<NodeKey>,
    /// Union of every moving entity's motion steps for the current export
    pub(crate) motion_steps: BTreeSet<Subframe>,
    /// db_names updated during the current placement pass
    pub(crate) processed: HashSet<String>,
    pub(crate) frame_current: i32,
    pub(crate) any_lights: bool,
}

/// Group under `node` that holds its particle system nodes.
fn ensure_particle_group(graph: &mut SgGraph, node: &mut RmanSgNode) -> SgResult<NodeKey> {
    if let Some(group) = node.particle_group.filter(|g| graph.contains(*g)) {
        return Ok(group);
    }
    let group = graph.create_node(NodeKind::Group, format!("{}|particles", node.db_name));
    graph.add_child(node.sg_node, group)?;
    node.particle_group = Some(group);
    Ok(group)
}

/// Objects the data-block pass leaves to other steps.
pub(crate) fn is_data_block(ob: &Object) -> bool {
    !matches!(ob.object_type, ObjectType::Armature | ObjectType::Camera)
}

impl SceneMirror {
    pub fn new(session: SessionContext) -> Self {
        Self {
            session,
            obj_hash: ObjHash::new(),
            materials: BTreeMap::new(),
            objects: BTreeMap::new(),
            index: BTreeMap::new(),
            particles: BTreeMap::new(),
            cameras: BTreeMap::new(),
            viewport_camera: None,
            main_camera: None,
            default_light: None,
            motion_steps: BTreeSet::new(),
            processed: HashSet::new(),
            frame_current: 0,
            any_lights: false,
        }
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut SessionContext {
        &mut self.session
    }

    /// Node of a host object, if it was exported.
    pub fn object_node(&self, id: EntityId) -> Option<&RmanSgNode> {
        self.index.get(&id).and_then(|name| self.objects.get(name))
    }

    pub fn objects(&self) -> impl Iterator<Item = &RmanSgNode> + '_ {
        self.objects.values()
    }

    pub fn material_node(&self, id: EntityId) -> Option<&RmanSgNode> {
        self.materials.get(&id)
    }

    pub fn particle_node(&self, db_name: &str) -> Option<&RmanSgNode> {
        self.particles.get(db_name)
    }

    pub fn camera_node(&self, id: EntityId) -> Option<&RmanSgNode> {
        self.cameras.get(&id)
    }

    pub fn main_camera(&self) -> Option<NodeKey> {
        self.main_camera
    }

    pub fn default_light(&self) -> Option<NodeKey> {
        self.default_light
    }

    pub fn obj_hash(&self) -> &ObjHash {
        &self.obj_hash
    }

    pub fn motion_steps(&self) -> impl Iterator<Item = Subframe> + '_ {
        self.motion_steps.iter().copied()
    }

    /// Frame of the last export or sync.
    pub fn frame(&self) -> i32 {
        self.frame_current
    }

    /// Total placements across every node.
    pub fn instance_count(&self) -> usize {
        self.objects.values().map(|n| n.instances.len()).sum()
    }

    /// Motion blur applies to this export.
    pub(crate) fn motion_enabled(&self, scene: &Scene) -> bool {
        let settings = &scene.settings;
        settings.motion_blur && settings.motion_segments > 1 && !self.session.config.is_interactive()
    }

    fn reset(&mut self, graph: &mut SgGraph) {
        *graph = SgGraph::new();
        self.obj_hash = ObjHash::new();
        self.materials.clear();
        self.objects.clear();
        self.index.clear();
        self.particles.clear();
        self.cameras.clear();
        self.viewport_camera = None;
        self.main_camera = None;
        self.default_light = None;
        self.motion_steps.clear();
        self.processed.clear();
        self.session.textures.clear();
    }

    /// Translate the whole scene into `graph`, replacing its contents.
    pub fn export(&mut self, graph: &mut SgGraph, host: &mut dyn HostScene) -> SyncResult<SyncReport> {
        let mut report = SyncReport::default();
        self.reset(graph);

        {
            let scene = host.scene();
            log::info!(
                "Exporting scene '{}' frame {} ({} objects, {} materials)",
                scene.name,
                scene.frame_current,
                scene.objects.len(),
                scene.materials.len()
            );
            self.frame_current = scene.frame_current;
            self.session.set_scene_tokens(scene);
            options::export_root_attributes(graph, scene, &self.session)?;

            for mat in &scene.materials {
                self.export_material(graph, scene, mat, &mut report);
            }
            let events = self.session.textures.prepare_all(true);
            self.apply_texture_events(graph, scene, events, &mut report);

            self.any_lights = scene.lights(false).any(|ob| !ob.hidden);
            for ob in scene.objects.iter().filter(|ob| !ob.hidden && is_data_block(ob)) {
                self.export_object(graph, scene, ob, &mut report);
            }
            for ob in scene.lights(false).filter(|ob| !ob.hidden) {
                if let Err(err) = self.attach_light_filters(graph, scene, ob) {
                    report.record_error(ob.id, &ob.name, Some(PrimitiveKind::Light), Operation::Update, err.to_string());
                }
            }

            self.export_scene_state(graph, scene, &mut report)?;
        }

        if self.motion_enabled(host.scene()) && self.motion_steps.len() > 1 {
            self.sample_motion(graph, host, &mut report);
        } else {
            let scene = host.scene();
            self.emit_instances(graph, scene, &mut report);
        }

        if self.session.config.is_interactive() {
            self.apply_solo_light(graph, host.scene());
        }
        log::info!("Export done: {}", report);
        Ok(report)
    }

    /// Options, hider, integrator, cameras, default light, displays and
    /// filters.
    pub(crate) fn export_scene_state(
        &mut self,
        graph: &mut SgGraph,
        scene: &Scene,
        report: &mut SyncReport,
    ) -> SyncResult<()> {
        options::export_global_options(graph, scene, &self.session);
        options::export_hider(graph, scene, &self.session);
        options::export_integrator(graph, scene, &mut self.session);
        self.export_cameras(graph, scene, report)?;
        self.update_default_light(graph, scene)?;
        self.export_displays(graph, scene)?;
        options::export_sample_filters(graph, scene, &mut self.session);
        options::export_display_filters(graph, scene, &mut self.session);
        Ok(())
    }

    pub(crate) fn export_displays(&mut self, graph: &mut SgGraph, scene: &Scene) -> SyncResult<()> {
        let cameras: BTreeMap<EntityId, NodeKey> = self
            .cameras
            .iter()
            .filter_map(|(id, node)| match node.state {
                NodeState::Camera { camera_node, .. } => Some((*id, camera_node)),
                _ => None,
            })
            .collect();
        options::export_displays(graph, scene, &self.session, self.main_camera, &cameras)?;
        Ok(())
    }

    /// Show the fallback light only when asked for and nothing else lights
    /// the scene.
    pub(crate) fn update_default_light(&mut self, graph: &mut SgGraph, scene: &Scene) -> SyncResult<()> {
        let parent = self.main_camera_group().unwrap_or_else(|| graph.root());
        let visible = scene.settings.render_default_light && !self.any_lights;
        self.default_light = Some(options::export_default_light(graph, self.default_light, parent, visible)?);
        Ok(())
    }

    /// Placement group of the main camera.
    fn main_camera_group(&self) -> Option<NodeKey> {
        self.viewport_camera
            .iter()
            .chain(self.cameras.values())
            .find(|node| match node.state {
                NodeState::Camera { camera_node, .. } => Some(camera_node) == self.main_camera,
                _ => false,
            })
            .map(|node| node.sg_node)
    }

    /// Scene cameras, or the viewport camera in viewport sessions.
    fn export_cameras(&mut self, graph: &mut SgGraph, scene: &Scene, report: &mut SyncReport) -> SyncResult<()> {
        if self.session.config.is_viewport() {
            let mut ctx = translate_ctx!(self, graph, scene);
            match export_viewport_camera(&mut ctx) {
                Ok(Some(node)) => {
                    if let NodeState::Camera { camera_node, .. } = node.state {
                        self.main_camera = Some(camera_node);
                    }
                    self.viewport_camera = Some(node);
                    return Ok(());
                }
                Ok(None) => log::debug!("No viewport state, using scene cameras"),
                Err(err) => {
                    report.record_error(EntityId(0), naming::VIEWPORT_CAMERA, Some(PrimitiveKind::Camera), Operation::Export, err.to_string());
                }
            }
        }

        for ob in scene.objects.iter().filter(|ob| ob.object_type == ObjectType::Camera) {
            self.export_camera(graph, scene, ob, report);
        }
        self.main_camera = scene
            .camera
            .and_then(|id| self.cameras.get(&id))
            .and_then(|node| match node.state {
                NodeState::Camera { camera_node, .. } => Some(camera_node),
                _ => None,
            });
        if self.main_camera.is_none() {
            log::warn!("Scene '{}' has no active camera", scene.name);
        }
        Ok(())
    }

    pub(crate) fn export_camera(&mut self, graph: &mut SgGraph, scene: &Scene, ob: &Object, report: &mut SyncReport) {
        if self.cameras.contains_key(&ob.id) {
            return;
        }
        let kind = PrimitiveKind::Camera;
        let db_name = naming::db_name(ob, kind);
        let translator = translator(kind);
        let mut node = match translator.export(&mut translate_ctx!(self, graph, scene), Source::Object(ob), &db_name) {
            Ok(Some(node)) => node,
            Ok(None) => {
                report.skipped += 1;
                return;
            }
            Err(err) => {
                report.record_error(ob.id, &ob.name, Some(kind), Operation::Export, err.to_string());
                return;
            }
        };
        self.set_motion(scene, ob, &mut node);
        if node.is_transforming {
            if let Ok(dag) = graph.expect_node_mut(node.sg_node) {
                dag.set_transform_num_samples(node.motion_steps.len());
            }
        }
        if let Err(err) = translator.update(&mut translate_ctx!(self, graph, scene), Source::Object(ob), &mut node) {
            report.record_error(ob.id, &ob.name, Some(kind), Operation::Update, err.to_string());
            graph.delete_subtree(node.sg_node);
            return;
        }
        report.exported.push(ob.id);
        self.cameras.insert(ob.id, node);
    }

    /// Decide the motion of a freshly exported node and fold its steps into
    /// the export-wide set.
    pub(crate) fn set_motion(&mut self, scene: &Scene, ob: &Object, node: &mut RmanSgNode) {
        node.clear_motion();
        if !self.motion_enabled(scene) {
            return;
        }
        let settings = &scene.settings;
        let segments = ob.motion_segments.unwrap_or(settings.motion_segments);
        if segments < 2 {
            return;
        }
        node.is_transforming = scene.is_transforming(ob);
        node.is_deforming = node.rman_type.is_deformable() && ob.is_deforming();
        if node.is_moving() {
            let steps = motion_subframes(segments, settings.shutter_angle, settings.shutter_timing);
            self.motion_steps.extend(steps.iter().copied());
            node.motion_steps = steps;
        }
    }

    /// Motion steps for particle nodes, which move on their own.
    fn particle_steps(&mut self, scene: &Scene) -> Vec<Subframe> {
        if !self.motion_enabled(scene) {
            return Vec::new();
        }
        let settings = &scene.settings;
        let steps = motion_subframes(settings.motion_segments, settings.shutter_angle, settings.shutter_timing);
        self.motion_steps.extend(steps.iter().copied());
        steps
    }

    pub(crate) fn export_material(&mut self, graph: &mut SgGraph, scene: &Scene, mat: &Material, report: &mut SyncReport) {
        if self.materials.contains_key(&mat.id) {
            self.update_material(graph, scene, mat, report);
            return;
        }
        let db_name = naming::material_db_name(mat);
        let mut ctx = translate_ctx!(self, graph, scene);
        let mut node = match MaterialTranslator.export(&mut ctx, Source::Material(mat), &db_name) {
            Ok(Some(node)) => node,
            Ok(None) => {
                report.skipped += 1;
                return;
            }
            Err(err) => {
                report.record_error(mat.id, &mat.name, Some(PrimitiveKind::Material), Operation::Export, err.to_string());
                return;
            }
        };
        if let Err(err) = MaterialTranslator.update(&mut ctx, Source::Material(mat), &mut node) {
            report.record_error(mat.id, &mat.name, Some(PrimitiveKind::Material), Operation::Update, err.to_string());
            graph.delete_node(node.sg_node);
            return;
        }
        report.exported.push(mat.id);
        self.materials.insert(mat.id, node);
    }

    /// Re-translate an exported material. Returns whether its mesh-light
    /// state flipped.
    pub(crate) fn update_material(
        &mut self,
        graph: &mut SgGraph,
        scene: &Scene,
        mat: &Material,
        report: &mut SyncReport,
    ) -> bool {
        let Some(mut node) = self.materials.remove(&mat.id) else {
            return false;
        };
        let was_meshlight = node.has_meshlight_material();
        let result = MaterialTranslator.update(&mut translate_ctx!(self, graph, scene), Source::Material(mat), &mut node);
        let flipped = node.has_meshlight_material() != was_meshlight;
        self.materials.insert(mat.id, node);
        match result {
            Ok(()) => {
                report.updated.push(mat.id);
                flipped
            }
            Err(err) => {
                report.record_error(mat.id, &mat.name, Some(PrimitiveKind::Material), Operation::Update, err.to_string());
                false
            }
        }
    }

    /// Export one data block unless its node already exists. Returns the
    /// db_name it is registered under.
    pub(crate) fn export_object(
        &mut self,
        graph: &mut SgGraph,
        scene: &Scene,
        ob: &Object,
        report: &mut SyncReport,
    ) -> Option<String> {
        let kind = detect_primitive(ob);
        let db_name = naming::db_name(ob, kind);
        if self.objects.contains_key(&db_name) {
            self.index.insert(ob.id, db_name.clone());
            return Some(db_name);
        }

        let translator = translator(kind);
        let mut node = match translator.export(&mut translate_ctx!(self, graph, scene), Source::Object(ob), &db_name) {
            Ok(Some(node)) => node,
            Ok(None) => {
                log::debug!("{} '{}' skipped", kind, ob.name);
                report.skipped += 1;
                return None;
            }
            Err(err) => {
                report.record_error(ob.id, &ob.name, Some(kind), Operation::Export, err.to_string());
                return None;
            }
        };
        self.set_motion(scene, ob, &mut node);
        let mut ctx = translate_ctx!(self, graph, scene);
        if let Err(err) = translator.update(&mut ctx, Source::Object(ob), &mut node) {
            report.record_error(ob.id, &ob.name, Some(kind), Operation::Update, err.to_string());
            graph.delete_subtree(node.sg_node);
            return None;
        }
        translator.export_object_primvars(&mut ctx, ob, &node);
        if !self.motion_enabled(scene) {
            self.processed.insert(db_name.clone());
        }

        report.exported.push(ob.id);
        self.index.insert(ob.id, db_name.clone());
        self.objects.insert(db_name.clone(), node);
        if kind.has_particles() && !ob.particle_systems.is_empty() {
            self.sync_particles(graph, scene, ob, report);
        }
        Some(db_name)
    }

    /// Bring the particle nodes of `ob` in line with its particle systems:
    /// update existing ones, export new ones, drop vanished ones. Returns the
    /// objects instanced by systems that render as objects, for
    /// re-placement.
    pub(crate) fn sync_particles(
        &mut self,
        graph: &mut SgGraph,
        scene: &Scene,
        ob: &Object,
        report: &mut SyncReport,
    ) -> Vec<EntityId> {
        let Some(db_name) = self.index.get(&ob.id).cloned() else {
            return Vec::new();
        };
        let steps = self.particle_steps(scene);
        let prefix = format!("{}|", naming::entity_tag(&ob.name, ob.id));
        let mut live = BTreeSet::new();
        let mut reinstance = Vec::new();

        for (index, psys) in ob.particle_systems.iter().enumerate() {
            let Some(kind) = detect_particles(psys) else {
                match psys.render_as {
                    ParticleRender::Object(target) => reinstance.push(target),
                    ParticleRender::Collection(c) => reinstance.extend(scene.collection_all_objects(c)),
                    ParticleRender::Points | ParticleRender::Hair => {}
                }
                continue;
            };
            let pdb = naming::particles_db_name(ob, psys, kind);
            live.insert(pdb.clone());
            let src = Source::Particles { emitter: ob, psys, index };

            if let Some(pnode) = self.particles.get_mut(&pdb) {
                pnode.is_deforming = kind == PrimitiveKind::Emitter && steps.len() > 1;
                pnode.motion_steps = if pnode.is_deforming { steps.clone() } else { Vec::new() };
                if let Err(err) = ParticlesTranslator.update(&mut translate_ctx!(self, graph, scene), src, pnode) {
                    report.record_error(ob.id, &psys.name, Some(kind), Operation::Update, err.to_string());
                }
                continue;
            }

            let mut pnode = match ParticlesTranslator.export(&mut translate_ctx!(self, graph, scene), src, &pdb) {
                Ok(Some(node)) => node,
                Ok(None) => {
                    report.skipped += 1;
                    continue;
                }
                Err(err) => {
                    report.record_error(ob.id, &psys.name, Some(kind), Operation::Export, err.to_string());
                    continue;
                }
            };
            pnode.is_deforming = kind == PrimitiveKind::Emitter && steps.len() > 1;
            if pnode.is_deforming {
                pnode.motion_steps = steps.clone();
            }
            if let Err(err) = ParticlesTranslator.update(&mut translate_ctx!(self, graph, scene), src, &mut pnode) {
                report.record_error(ob.id, &psys.name, Some(kind), Operation::Update, err.to_string());
                graph.delete_node(pnode.sg_node);
                continue;
            }
            let attached = match self.objects.get_mut(&db_name) {
                Some(node) => ensure_particle_group(graph, node).and_then(|group| graph.add_child(group, pnode.sg_node)),
                None => Ok(()),
            };
            if let Err(err) = attached {
                report.record_error(ob.id, &psys.name, Some(kind), Operation::Export, err.to_string());
                graph.delete_node(pnode.sg_node);
                continue;
            }
            self.particles.insert(pdb, pnode);
        }

        let stale: Vec<String> = self
            .particles
            .keys()
            .filter(|name| name.starts_with(&prefix) && !live.contains(*name))
            .cloned()
            .collect();
        for name in stale {
            if let Some(pnode) = self.particles.remove(&name) {
                log::debug!("Removing particle node {}", name);
                graph.delete_node(pnode.sg_node);
            }
        }
        reinstance
    }

    /// Particle nodes exported for `ob`, with the index of their system.
    pub(crate) fn particle_nodes_of(&self, ob: &Object) -> Vec<(String, usize)> {
        ob.particle_systems
            .iter()
            .enumerate()
            .filter_map(|(index, psys)| {
                let kind = detect_particles(psys)?;
                let name = naming::particles_db_name(ob, psys, kind);
                self.particles.contains_key(&name).then_some((name, index))
            })
            .collect()
    }

    /// Write the filter shaders a light carries and record the light on
    /// each filter it references.
    pub(crate) fn attach_light_filters(&mut self, graph: &mut SgGraph, scene: &Scene, light: &Object) -> SgResult<()> {
        let Some(data) = light.data.as_light() else {
            return Ok(());
        };
        let Some(light_db) = self.index.get(&light.id).cloned() else {
            return Ok(());
        };
        let Some(light_key) = self.objects.get(&light_db).map(|n| n.sg_node) else {
            return Ok(());
        };

        let linked: Vec<EntityId> = data.filters.iter().map(|link| link.filter).collect();
        for node in self.objects.values_mut() {
            if let NodeState::LightFilter { lights, .. } = &mut node.state {
                if !linked.contains(&node.entity) {
                    lights.retain(|id| *id != light.id);
                }
            }
        }

        let mut shaders = Vec::new();
        for link in &data.filters {
            let Some(filter_ob) = scene.object(link.filter) else {
                log::debug!("{}: linked light filter {} is gone", light.name, link.filter);
                continue;
            };
            let is_filter = filter_ob
                .data
                .as_light()
                .is_some_and(|l| l.role == LightRole::LightFilter);
            if !is_filter || filter_ob.hidden {
                continue;
            }
            let filter_db = naming::db_name(filter_ob, PrimitiveKind::LightFilter);
            let Some(filter_node) = self.objects.get_mut(&filter_db) else {
                continue;
            };
            if let NodeState::LightFilter { filter, lights } = &mut filter_node.state {
                if !lights.contains(&light.id) {
                    lights.push(light.id);
                }
                shaders.push((filter.clone(), link.combine));
            }
        }
        graph.expect_node_mut(light_key)?.light_filters = combine_filters(&light_db, shaders);
        Ok(())
    }

    /// Hide every light but the soloed ones, or restore host hide and mute
    /// states when nothing is soloed.
    pub(crate) fn apply_solo_light(&mut self, graph: &mut SgGraph, scene: &Scene) {
        for ob in scene.lights(false) {
            let Some(node) = self.index.get(&ob.id).and_then(|name| self.objects.get_mut(name)) else {
                continue;
            };
            let hidden = renderer_hidden(scene, ob, true);
            node.is_hidden = hidden;
            graph.set_hidden(node.sg_node, hidden);
        }
    }

    /// Re-translate the owners of finished textures.
    pub(crate) fn apply_texture_events(
        &mut self,
        graph: &mut SgGraph,
        scene: &Scene,
        events: Vec<TextureEvent>,
        report: &mut SyncReport,
    ) {
        let mut owners = BTreeSet::new();
        for event in events {
            match &event.status {
                TextureStatus::Ready(_) => {
                    owners.insert(event.owner);
                }
                TextureStatus::Failed(reason) => {
                    log::warn!("Texture {} for {} failed: {}", event.id, event.owner, reason);
                }
                TextureStatus::Pending => {}
            }
        }
        for owner in owners {
            self.retranslate_owner(graph, scene, owner, report);
        }
    }

    pub(crate) fn retranslate_owner(
        &mut self,
        graph: &mut SgGraph,
        scene: &Scene,
        owner: TextureOwner,
        report: &mut SyncReport,
    ) {
        match owner {
            TextureOwner::Material(id) => {
                if let Some(mat) = scene.material(id) {
                    self.update_material(graph, scene, mat, report);
                }
            }
            TextureOwner::Light(id) => {
                if let Some(ob) = scene.object(id) {
                    self.update_object(graph, scene, ob, report);
                }
            }
            TextureOwner::World => {
                options::export_integrator(graph, scene, &mut self.session);
                options::export_sample_filters(graph, scene, &mut self.session);
                options::export_display_filters(graph, scene, &mut self.session);
            }
        }
    }

    /// Re-run the translator update of an exported object.
    pub(crate) fn update_object(&mut self, graph: &mut SgGraph, scene: &Scene, ob: &Object, report: &mut SyncReport) {
        let Some(db_name) = self.index.get(&ob.id).cloned() else {
            return;
        };
        let Some(node) = self.objects.get_mut(&db_name) else {
            return;
        };
        let kind = node.rman_type;
        let translator = translator(kind);
        let mut ctx = translate_ctx!(self, graph, scene);
        let result = translator.update(&mut ctx, Source::Object(ob), node);
        if result.is_ok() {
            translator.export_object_primvars(&mut ctx, ob, node);
        }
        match result {
            Ok(()) => {
                self.processed.insert(db_name);
                report.updated.push(ob.id);
            }
            Err(err) => report.record_error(ob.id, &ob.name, Some(kind), Operation::Update, err.to_string()),
        }
    }

    /// Mark main and secondary cameras after the active camera changed.
    pub(crate) fn refresh_renderable_cameras(&mut self, graph: &mut SgGraph, scene: &Scene) {
        let mut main = None;
        for (id, node) in &self.cameras {
            let NodeState::Camera { camera_node, .. } = node.state else {
                continue;
            };
            let renderable = if scene.camera == Some(*id) {
                main = Some(camera_node);
                Renderable::Main
            } else {
                Renderable::Secondary
            };
            if let Some(dag) = graph.node_mut(camera_node) {
                dag.renderable = renderable;
            }
        }
        if self.viewport_camera.is_none() {
            self.main_camera = main;
        }
    }
}
