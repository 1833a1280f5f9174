//! Instance fan-out: one group per placement of a shared node.
//!
//! A placement comes from the host's evaluated instance list. Its group
//! holds the shared node as its only child and carries the transform, the
//! material and the per-object attributes.

use tether_core::{EntityId, Material, Object, ObjectInstance, ObjectType, Scene};
use tether_math::Subframe;
use tether_sg::{NodeKey, NodeKind, SgGraph};

use crate::handle::{RmanSgGroup, RmanSgNode};
use crate::kind::PrimitiveKind;
use crate::mirror::SceneMirror;
use crate::naming;
use crate::report::{Operation, SyncReport};
use crate::translators::{translator, Source};

/// Material of a placement: the object's own, then the one its particle
/// system assigns on the emitter.
fn placement_material<'a>(scene: &'a Scene, inst: &ObjectInstance, ob: &'a Object) -> Option<&'a Material> {
    scene.active_material(ob).or_else(|| {
        let emitter = inst.parent.and_then(|p| scene.object(p))?;
        let psys = emitter.particle_systems.get(inst.particle_system?)?;
        scene.slot_material(emitter, psys.material.saturating_sub(1) as usize)
    })
}

impl SceneMirror {
    /// Place every instance of the current evaluation.
    pub(crate) fn emit_instances(&mut self, graph: &mut SgGraph, scene: &Scene, report: &mut SyncReport) {
        for inst in scene.object_instances() {
            self.export_instance(graph, scene, &inst, None, report);
        }
    }

    /// Place the instances of the given objects only.
    pub(crate) fn emit_instances_of(
        &mut self,
        graph: &mut SgGraph,
        scene: &Scene,
        objects: &[EntityId],
        report: &mut SyncReport,
    ) {
        for inst in scene.object_instances() {
            if objects.contains(&inst.object) || inst.parent.is_some_and(|p| objects.contains(&p)) {
                self.export_instance(graph, scene, &inst, None, report);
            }
        }
    }

    /// Motion steps of a placement, when it moves.
    pub(crate) fn placement_steps(&self, inst: &ObjectInstance, node: &RmanSgNode) -> Option<Vec<Subframe>> {
        if self.motion_steps.len() < 2 {
            return None;
        }
        if node.is_transforming {
            return Some(node.motion_steps.clone());
        }
        if let Some(parent) = inst.parent.and_then(|p| self.object_node(p)) {
            if parent.is_transforming {
                return Some(parent.motion_steps.clone());
            }
        }
        inst.particle_system
            .is_some()
            .then(|| self.motion_steps.iter().copied().collect())
    }

    /// Create the group of one placement. `step` is the motion step being
    /// evaluated when sampling motion.
    ///
    /// Placements whose node is not exported yet are skipped, as are
    /// placements that already have a group in this pass.
    pub(crate) fn export_instance(
        &mut self,
        graph: &mut SgGraph,
        scene: &Scene,
        inst: &ObjectInstance,
        step: Option<Subframe>,
        report: &mut SyncReport,
    ) {
        let Some(ob) = scene.object(inst.object) else {
            return;
        };
        if matches!(ob.object_type, ObjectType::Armature | ObjectType::Camera) {
            return;
        }
        let Some(db_name) = self.index.get(&ob.id).cloned() else {
            log::trace!("{}: no node yet, placement skipped", ob.name);
            return;
        };
        let Some(node) = self.objects.get(&db_name) else {
            return;
        };
        let kind = node.rman_type;
        match kind {
            // Placed by their own translators
            PrimitiveKind::LightFilter | PrimitiveKind::Group => return,
            // The family root stands for the whole family
            PrimitiveKind::Meta if naming::meta_family(&ob.name) != ob.name => return,
            _ => {}
        }
        let group_name = naming::group_db_name(scene, inst);
        if node.instances.contains_key(&group_name) {
            return;
        }

        if !self.processed.contains(&db_name) {
            let Some(node) = self.objects.get_mut(&db_name) else {
                return;
            };
            let translator = translator(kind);
            let mut ctx = translate_ctx!(self, graph, scene);
            if let Err(err) = translator.update(&mut ctx, Source::Object(ob), node) {
                report.record_error(ob.id, &ob.name, Some(kind), Operation::Update, err.to_string());
                return;
            }
            translator.export_object_primvars(&mut ctx, ob, node);
            self.processed.insert(db_name.clone());
        }

        let Some(node) = self.objects.get(&db_name) else {
            return;
        };
        let steps = self.placement_steps(inst, node);
        let material = (kind != PrimitiveKind::Light)
            .then(|| placement_material(scene, inst, ob))
            .flatten()
            .and_then(|mat| self.materials.get(&mat.id));
        let material_key = material.map(|m| m.sg_node);
        let is_meshlight = material.is_some_and(|m| m.has_meshlight_material());

        let group = graph.create_node(NodeKind::Group, group_name.clone());
        let placed = (|| -> Result<(), crate::translators::TranslateError> {
            let root = graph.root();
            graph.add_child(group, node.sg_node)?;
            graph.add_child(root, group)?;
            let mut ctx = translate_ctx!(self, graph, scene);
            translator(kind).export_object_attributes(&mut ctx, ob, node, group, inst.persistent_id[0])?;
            graph.set_material(group, material_key)?;

            let dag = graph.expect_node_mut(group)?;
            if kind == PrimitiveKind::Meta {
                return Ok(());
            }
            match (&steps, step) {
                (Some(steps), Some(step)) if steps.len() > 1 => {
                    dag.set_transform_num_samples(steps.len());
                    if let Some(index) = steps.iter().position(|s| *s == step) {
                        let time = step.offset() - steps[0].offset();
                        dag.set_transform_sample(index, inst.matrix_world, time)?;
                    }
                }
                _ => dag.set_transform(inst.matrix_world),
            }
            Ok(())
        })();
        if let Err(err) = placed {
            report.record_error(ob.id, &ob.name, Some(kind), Operation::Instance, err.to_string());
            graph.delete_node(group);
            return;
        }

        let record = RmanSgGroup {
            db_name: group_name.clone(),
            sg_node: group,
            object: ob.id,
            parent: inst.parent,
            particle_system: inst.particle_system,
            material: material_key,
            is_meshlight,
        };
        if let Some(node) = self.objects.get_mut(&db_name) {
            node.instances.insert(group_name, record);
            report.instances_created += 1;
        }
    }

    /// Delete every placement of the node registered for `id`. The shared
    /// node stays. Returns how many placements were removed.
    pub(crate) fn clear_instances(&mut self, graph: &mut SgGraph, id: EntityId) -> usize {
        let Some(node) = self.index.get(&id).and_then(|name| self.objects.get_mut(name)) else {
            return 0;
        };
        // Meta families share a node; only drop this entity's placements
        let groups: Vec<String> = node
            .instances
            .iter()
            .filter(|(_, g)| g.object == id || node.rman_type != PrimitiveKind::Meta)
            .map(|(name, _)| name.clone())
            .collect();
        for name in &groups {
            if let Some(group) = node.instances.remove(name) {
                graph.delete_node(group.sg_node);
            }
        }
        groups.len()
    }

    /// Delete every placement made through the instancer `parent`.
    pub(crate) fn clear_child_instances(&mut self, graph: &mut SgGraph, parent: EntityId) -> usize {
        let mut removed = 0;
        for node in self.objects.values_mut() {
            node.instances.retain(|_, group| {
                if group.parent == Some(parent) {
                    graph.delete_node(group.sg_node);
                    removed += 1;
                    false
                } else {
                    true
                }
            });
        }
        removed
    }

    /// Group of an existing placement.
    pub(crate) fn instance_group(&self, scene: &Scene, inst: &ObjectInstance) -> Option<NodeKey> {
        let node = self.object_node(inst.object)?;
        node.instances.get(&naming::group_db_name(scene, inst)).map(|g| g.sg_node)
    }

    /// Move existing placements in place: those of `id` itself and those
    /// made through it as an instancer.
    pub(crate) fn update_instance_transforms(&mut self, graph: &mut SgGraph, scene: &Scene, id: EntityId) -> usize {
        let mut moved = 0;
        for inst in scene.object_instances() {
            if inst.object != id && inst.parent != Some(id) {
                continue;
            }
            if let Some(dag) = self.instance_group(scene, &inst).and_then(|key| graph.node_mut(key)) {
                dag.set_transform(inst.matrix_world);
                moved += 1;
            }
        }
        moved
    }

    /// Bind a material on every placement that uses it.
    pub(crate) fn reattach_material(&mut self, graph: &mut SgGraph, scene: &Scene, material: EntityId) -> usize {
        let Some(key) = self.materials.get(&material).map(|m| m.sg_node) else {
            return 0;
        };
        let is_meshlight = self.materials.get(&material).is_some_and(|m| m.has_meshlight_material());
        let mut attached = 0;
        for inst in scene.object_instances() {
            let Some(ob) = scene.object(inst.object) else {
                continue;
            };
            if placement_material(scene, &inst, ob).map(|m| m.id) != Some(material) {
                continue;
            }
            let group_name = naming::group_db_name(scene, &inst);
            let Some(node) = self.index.get(&ob.id).and_then(|name| self.objects.get_mut(name)) else {
                continue;
            };
            if node.rman_type == PrimitiveKind::Light {
                continue;
            }
            let Some(group) = node.instances.get_mut(&group_name) else {
                continue;
            };
            if graph.set_material(group.sg_node, Some(key)).is_ok() {
                group.material = Some(key);
                group.is_meshlight = is_meshlight;
                attached += 1;
            }
        }
        attached
    }
}
