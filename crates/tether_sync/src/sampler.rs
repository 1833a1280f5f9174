//! Motion-blur sampling.
//!
//! The host is moved to each motion step in ascending order. The first
//! step builds every placement; later steps only write extra transform and
//! point samples into what the first one created. The host always goes
//! back to its original frame afterwards.

use tether_core::{HostScene, Scene};
use tether_math::Subframe;
use tether_sg::{NodeKey, SgGraph, Transform};

use crate::handle::NodeState;
use crate::kind::PrimitiveKind;
use crate::mirror::SceneMirror;
use crate::motion::FrameRestore;
use crate::naming;
use crate::report::{Operation, SyncReport};
use crate::translators::{translator, update_camera_transform, ParticlesTranslator, Source, Translator};

/// Fill unwritten transform samples with the nearest written one.
fn fill_missing_samples(graph: &mut SgGraph, key: NodeKey) {
    let Some(dag) = graph.node_mut(key) else {
        return;
    };
    let Transform::Sampled { samples, .. } = &mut dag.transform else {
        return;
    };
    let Some(first) = samples.iter().flatten().next().copied() else {
        return;
    };
    let mut last = first;
    for sample in samples.iter_mut() {
        match sample {
            Some(m) => last = *m,
            None => *sample = Some(last),
        }
    }
}

impl SceneMirror {
    /// Sweep the motion steps and write every sample.
    pub(crate) fn sample_motion(&mut self, graph: &mut SgGraph, host: &mut dyn HostScene, report: &mut SyncReport) {
        let steps: Vec<Subframe> = self.motion_steps.iter().copied().collect();
        log::debug!("Sampling motion at {} step(s)", steps.len());
        self.processed.clear();
        {
            let mut frames = FrameRestore::new(host);
            for (sample, step) in steps.iter().copied().enumerate() {
                frames.set_offset(step);
                let scene = frames.scene();
                self.sample_cameras(graph, scene, step, report);
                if sample == 0 {
                    for inst in scene.object_instances() {
                        self.export_instance(graph, scene, &inst, Some(step), report);
                    }
                    self.resample_particles(graph, scene, report);
                    continue;
                }
                self.sample_transforms(graph, scene, step);
                self.sample_deformation(graph, scene, step, report);
            }
        }

        let groups: Vec<NodeKey> = self
            .objects
            .values()
            .flat_map(|node| node.instances.values().map(|g| g.sg_node))
            .chain(self.cameras.values().map(|c| c.sg_node))
            .collect();
        for key in groups {
            fill_missing_samples(graph, key);
        }
    }

    fn sample_cameras(&mut self, graph: &mut SgGraph, scene: &Scene, step: Subframe, report: &mut SyncReport) {
        for (id, node) in self.cameras.iter_mut() {
            if !node.is_transforming {
                continue;
            }
            let (Some(index), Some(ob)) = (node.sample_index(step), scene.object(*id)) else {
                continue;
            };
            let time = step.offset() - node.motion_steps[0].offset();
            if let Err(err) = update_camera_transform(graph, node, ob.matrix_world, Some((index, time))) {
                report.record_error(ob.id, &ob.name, Some(PrimitiveKind::Camera), Operation::DeformSample, err.to_string());
            }
        }
    }

    /// Particle nodes get their first sample at the first step.
    fn resample_particles(&mut self, graph: &mut SgGraph, scene: &Scene, report: &mut SyncReport) {
        for ob in scene.objects.iter().filter(|ob| !ob.particle_systems.is_empty()) {
            if self.object_node(ob.id).is_some() {
                self.sync_particles(graph, scene, ob, report);
            }
        }
    }

    /// Transform samples of moving placements.
    fn sample_transforms(&mut self, graph: &mut SgGraph, scene: &Scene, step: Subframe) {
        for inst in scene.object_instances() {
            let Some(node) = self.object_node(inst.object) else {
                continue;
            };
            if node.rman_type == PrimitiveKind::Meta {
                continue;
            }
            let Some(steps) = self.placement_steps(&inst, node) else {
                continue;
            };
            let Some(index) = steps.iter().position(|s| *s == step) else {
                continue;
            };
            let Some(group) = node.instances.get(&naming::group_db_name(scene, &inst)) else {
                // Placements appearing after the first step have no group
                continue;
            };
            let time = step.offset() - steps[0].offset();
            if let Some(dag) = graph.node_mut(group.sg_node) {
                if let Err(err) = dag.set_transform_sample(index, inst.matrix_world, time) {
                    log::trace!("{}: {}", group.db_name, err);
                }
            }
        }
    }

    /// Point samples of deforming nodes updated in this pass.
    fn sample_deformation(&mut self, graph: &mut SgGraph, scene: &Scene, step: Subframe, report: &mut SyncReport) {
        let names: Vec<String> = self.processed.iter().cloned().collect();
        for name in names {
            let Some(node) = self.objects.get_mut(&name) else {
                continue;
            };
            if !node.is_deforming {
                continue;
            }
            let Some(index) = node.sample_index(step) else {
                continue;
            };
            let Some(ob) = scene.object(node.entity) else {
                continue;
            };
            let kind = node.rman_type;
            let mut ctx = translate_ctx!(self, graph, scene);
            if let Err(err) = translator(kind).export_deform_sample(&mut ctx, Source::Object(ob), node, index) {
                report.record_error(ob.id, &ob.name, Some(kind), Operation::DeformSample, err.to_string());
            }
        }

        for ob in scene.objects.iter().filter(|ob| !ob.particle_systems.is_empty()) {
            for (name, index) in self.particle_nodes_of(ob) {
                let Some(pnode) = self.particles.get_mut(&name) else {
                    continue;
                };
                if !pnode.is_deforming || !matches!(pnode.state, NodeState::Points { .. }) {
                    continue;
                }
                let Some(sample) = pnode.sample_index(step) else {
                    continue;
                };
                let psys = &ob.particle_systems[index];
                let src = Source::Particles { emitter: ob, psys, index };
                let mut ctx = translate_ctx!(self, graph, scene);
                if let Err(err) = ParticlesTranslator.export_deform_sample(&mut ctx, src, pnode, sample) {
                    report.record_error(ob.id, &psys.name, Some(pnode.rman_type), Operation::DeformSample, err.to_string());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::SessionConfig;
    use crate::context::SessionContext;
    use crate::mirror::SceneMirror;
    use crate::testing::{cube, init_logging};
    use tether_core::{
        AnimatedScene, EntityId, HostScene, Modifier, ObjectData, Particle, ParticleRender, ParticleSystem, Scene,
    };
    use tether_math::{Mat4, Vec3};
    use tether_sg::{ParamValue, SgGraph, Transform};

    fn motion_scene() -> Scene {
        let mut scene = Scene::new("s");
        scene.frame_current = 10;
        scene.settings.motion_blur = true;
        scene.settings.motion_segments = 3;
        scene
    }

    fn export(host: &mut AnimatedScene) -> (SceneMirror, SgGraph) {
        init_logging();
        let mut mirror = SceneMirror::new(SessionContext::new(SessionConfig::default()).unwrap());
        let mut graph = SgGraph::new();
        let report = mirror.export(&mut graph, host).unwrap();
        assert!(report.is_clean(), "{:?}", report.errors);
        (mirror, graph)
    }

    #[test]
    fn test_deforming_mesh_gets_ascending_samples() {
        let mut base = motion_scene();
        let mut wobble = cube(1, "Wobble", Vec3::ZERO);
        wobble.modifiers.push(Modifier::Cloth);
        base.add_object(wobble);
        let mut host = AnimatedScene::new(base).animate(|scene, time| {
            if let Some(ObjectData::Mesh(mesh)) = scene.object_mut(EntityId(1)).map(|o| &mut o.data) {
                for p in &mut mesh.positions {
                    p.z += time;
                }
            }
        });
        let (mirror, graph) = export(&mut host);

        let node = mirror.object_node(EntityId(1)).unwrap();
        assert!(node.is_deforming);
        let dag = graph.node(node.sg_node).unwrap();
        let times = dag.primvars.times();
        assert_eq!(times, &[0.0, 0.25, 0.5]);
        assert!(times.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(dag.primvars.sample_count("P"), 3);
        let samples = &dag.primvars.get("P").unwrap().samples;
        let (ParamValue::PointArray(first), ParamValue::PointArray(last)) = (&samples[0], &samples[2]) else {
            panic!("P is not a point array");
        };
        assert!((last[0].z - first[0].z - 0.5).abs() < 1e-4);
        assert_eq!(host.scene().frame_current, 10);
        assert_eq!(host.scene().subframe, 0.0);
    }

    #[test]
    fn test_moving_object_gets_transform_samples() {
        let mut base = motion_scene();
        let mut mover = cube(1, "Mover", Vec3::ZERO);
        mover.animated = true;
        base.add_object(mover);
        base.add_object(cube(2, "Still", Vec3::ZERO));
        let mut host = AnimatedScene::new(base).animate(|scene, time| {
            if let Some(ob) = scene.object_mut(EntityId(1)) {
                ob.matrix_world = Mat4::from_translation(Vec3::new(time, 0.0, 0.0));
            }
        });
        let (mirror, graph) = export(&mut host);

        let mover = mirror.object_node(EntityId(1)).unwrap();
        let group = mover.instances.values().next().unwrap();
        let Transform::Sampled { times, samples } = &graph.node(group.sg_node).unwrap().transform else {
            panic!("static transform on a moving object");
        };
        assert_eq!(times, &vec![0.0, 0.25, 0.5]);
        let xs: Vec<f32> = samples.iter().map(|m| m.unwrap().w_axis.x).collect();
        assert!((xs[0] - 9.75).abs() < 1e-4);
        assert!((xs[2] - 10.25).abs() < 1e-4);

        let still = mirror.object_node(EntityId(2)).unwrap();
        let group = still.instances.values().next().unwrap();
        assert!(matches!(graph.node(group.sg_node).unwrap().transform, Transform::Static(_)));
    }

    #[test]
    fn test_particle_count_change_disables_motion() {
        let mut base = motion_scene();
        let mut emitter = cube(1, "Emitter", Vec3::ZERO);
        emitter.particle_systems.push(ParticleSystem {
            name: "Burst".into(),
            settings: EntityId(40),
            render_as: ParticleRender::Points,
            material: 1,
            particles: vec![Particle::at(Vec3::ZERO)],
            hair: Vec::new(),
            width: 0.05,
            render_emitter: true,
        });
        base.add_object(emitter);
        let mut host = AnimatedScene::new(base).animate(|scene, time| {
            if let Some(ob) = scene.object_mut(EntityId(1)) {
                // One more particle after the frame
                if time > 10.0 {
                    ob.particle_systems[0].particles.push(Particle::at(Vec3::X));
                }
            }
        });
        let (mirror, graph) = export(&mut host);

        let pnode = mirror.particle_node("Emitter_1|Burst-EMITTER").unwrap();
        assert!(!pnode.is_deforming);
        let dag = graph.node(pnode.sg_node).unwrap();
        assert!(dag.primvars.times().is_empty());
        assert_eq!(dag.primvars.sample_count("P"), 1);
    }
}
