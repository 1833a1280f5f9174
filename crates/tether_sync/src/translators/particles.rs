//! Particle systems drawn as points or as hair.
//!
//! Systems that instance objects have no node of their own; their copies
//! come through the instance list instead.

use tether_core::{Object, ParticleSystem};
use tether_math::Vec3;
use tether_sg::{Detail, NodeKind, ParamValue, Topology};

use super::{to_object_space, Source, TranslateContext, TranslateError, TranslateResult, Translator};
use crate::handle::{NodeState, RmanSgNode};
use crate::kind::{detect_particles, PrimitiveKind};
use crate::motion::primvar_times;

/// Fewest points a cubic hair strand can have.
const MIN_STRAND_POINTS: usize = 4;

pub struct ParticlesTranslator;

fn particles_of<'a>(src: Source<'a>) -> TranslateResult<(&'a Object, &'a ParticleSystem, usize)> {
    match src {
        Source::Particles { emitter, psys, index } => Ok((emitter, psys, index)),
        _ => Err(TranslateError::malformed("particles", "source is not a particle system")),
    }
}

/// Alive particles in the emitter's space, with their widths.
fn emitter_points(emitter: &Object, psys: &ParticleSystem) -> (Vec<Vec3>, Vec<f32>) {
    let alive: Vec<_> = psys.alive_particles().map(|(_, p)| p).collect();
    let positions = to_object_space(emitter, alive.iter().map(|p| p.location));
    let widths = alive.iter().map(|p| p.size * psys.width).collect();
    (positions, widths)
}

/// Strands long enough for a cubic curve, in the emitter's space.
fn hair_strands(emitter: &Object, psys: &ParticleSystem) -> Vec<Vec<Vec3>> {
    psys.hair
        .iter()
        .filter(|strand| strand.len() >= MIN_STRAND_POINTS)
        .map(|strand| to_object_space(emitter, strand.iter().copied()))
        .collect()
}

impl ParticlesTranslator {
    fn update_emitter(
        &self,
        ctx: &mut TranslateContext<'_>,
        emitter: &Object,
        psys: &ParticleSystem,
        node: &mut RmanSgNode,
    ) -> TranslateResult<()> {
        let (positions, widths) = emitter_points(emitter, psys);
        let npoints = positions.len();
        let dag = ctx.graph.expect_node_mut(node.sg_node)?;
        dag.define(Topology {
            npolys: 0,
            npoints,
            nverts: 0,
        });
        dag.primvars.clear();
        if node.is_deforming && node.motion_steps.len() > 1 {
            dag.primvars.set_times(&primvar_times(&node.motion_steps));
        }
        dag.primvars
            .set_detail("P", ParamValue::PointArray(positions), Detail::Vertex, 0);
        dag.primvars.set("width", ParamValue::FloatArray(widths), Detail::Vertex);
        node.state = NodeState::Points { npoints };
        Ok(())
    }

    fn update_hair(
        &self,
        ctx: &mut TranslateContext<'_>,
        emitter: &Object,
        psys: &ParticleSystem,
        node: &mut RmanSgNode,
    ) -> TranslateResult<()> {
        let strands = hair_strands(emitter, psys);
        if strands.len() < psys.hair.len() {
            log::debug!(
                "{}: {} hair strand(s) too short to render",
                psys.name,
                psys.hair.len() - strands.len()
            );
        }
        let nvertices: Vec<i32> = strands.iter().map(|s| s.len() as i32).collect();
        let points: Vec<Vec3> = strands.into_iter().flatten().collect();
        let ncurves = nvertices.len();
        let npoints = points.len();

        let dag = ctx.graph.expect_node_mut(node.sg_node)?;
        dag.define(Topology {
            npolys: ncurves,
            npoints,
            nverts: 0,
        });
        dag.primvars.clear();
        dag.primvars.set_constant("Ri:type", ParamValue::String("cubic".into()));
        dag.primvars.set_constant("Ri:wrap", ParamValue::String("nonperiodic".into()));
        dag.primvars
            .set_constant("Ri:Basis", ParamValue::String("catmull-rom".into()));
        dag.primvars
            .set("Ri:nvertices", ParamValue::IntArray(nvertices), Detail::Uniform);
        dag.primvars
            .set_detail("P", ParamValue::PointArray(points), Detail::Vertex, 0);
        dag.primvars
            .set_constant("constantwidth", ParamValue::Float(psys.width));
        node.state = NodeState::Curves { ncurves, npoints };
        Ok(())
    }
}

impl Translator for ParticlesTranslator {
    fn export(
        &self,
        ctx: &mut TranslateContext<'_>,
        src: Source<'_>,
        db_name: &str,
    ) -> TranslateResult<Option<RmanSgNode>> {
        let (emitter, psys, _) = particles_of(src)?;
        let Some(kind) = detect_particles(psys) else {
            return Ok(None);
        };
        let empty = match kind {
            PrimitiveKind::Hair => hair_strands(emitter, psys).is_empty(),
            _ => psys.alive_particles().next().is_none(),
        };
        if empty {
            log::debug!("{}: particle system has nothing to draw", psys.name);
            return Ok(None);
        }
        let key = ctx.graph.create_node(kind.node_kind(), db_name);
        Ok(Some(RmanSgNode::new(db_name, kind, emitter.id, key)))
    }

    fn update(&self, ctx: &mut TranslateContext<'_>, src: Source<'_>, node: &mut RmanSgNode) -> TranslateResult<()> {
        let (emitter, psys, _) = particles_of(src)?;
        match node.rman_type {
            PrimitiveKind::Hair => self.update_hair(ctx, emitter, psys, node)?,
            _ => self.update_emitter(ctx, emitter, psys, node)?,
        }

        // Host slots are 1-based
        let slot = psys.material.saturating_sub(1) as usize;
        let material = ctx.slot_material_node(emitter, slot);
        ctx.graph.set_material(node.sg_node, material)?;
        Ok(())
    }

    fn export_deform_sample(
        &self,
        ctx: &mut TranslateContext<'_>,
        src: Source<'_>,
        node: &mut RmanSgNode,
        sample: usize,
    ) -> TranslateResult<()> {
        let (emitter, psys, _) = particles_of(src)?;
        // Hair keeps its first sample
        let NodeState::Points { npoints } = node.state else {
            return Ok(());
        };
        let (positions, _) = emitter_points(emitter, psys);
        let dag = ctx.graph.expect_node_mut(node.sg_node)?;
        if positions.len() != npoints {
            log::warn!(
                "{}: particle count changed within the shutter, deformation blur disabled",
                psys.name
            );
            dag.primvars.set_times(&[]);
            node.clear_motion();
            return Ok(());
        }
        dag.primvars
            .set_detail("P", ParamValue::PointArray(positions), Detail::Vertex, sample);
        Ok(())
    }

    fn export_object_primvars(&self, _ctx: &mut TranslateContext<'_>, _ob: &Object, _node: &RmanSgNode) {}
}

/// Node kind a particle system exports to, for callers that only need to
/// know whether it has one.
pub fn particles_node_kind(psys: &ParticleSystem) -> Option<NodeKind> {
    detect_particles(psys).map(PrimitiveKind::node_kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TranslateFixture;
    use tether_core::{EntityId, MeshData, ObjectData, ObjectType, Particle, ParticleRender, Scene};
    use tether_math::Mat4;

    fn emitter(psys: ParticleSystem) -> Object {
        let mut ob = Object::new(EntityId(1), "Emitter", ObjectType::Mesh, ObjectData::Mesh(MeshData::quad()))
            .with_matrix(Mat4::from_translation(Vec3::new(0.0, 0.0, 2.0)));
        ob.particle_systems.push(psys);
        ob
    }

    fn system(render_as: ParticleRender) -> ParticleSystem {
        ParticleSystem {
            name: "Sparks".into(),
            settings: EntityId(50),
            render_as,
            material: 1,
            particles: vec![Particle::at(Vec3::new(0.0, 0.0, 2.0)), Particle::at(Vec3::new(1.0, 0.0, 2.0))],
            hair: Vec::new(),
            width: 0.05,
            render_emitter: true,
        }
    }

    fn translate(fx: &mut TranslateFixture, ob: &Object) -> Option<RmanSgNode> {
        let src = Source::Particles {
            emitter: ob,
            psys: &ob.particle_systems[0],
            index: 0,
        };
        let mut ctx = fx.ctx();
        let mut node = ParticlesTranslator.export(&mut ctx, src, "Emitter_1|Sparks-EMITTER").unwrap()?;
        ParticlesTranslator.update(&mut ctx, src, &mut node).unwrap();
        Some(node)
    }

    #[test]
    fn test_points_in_emitter_space() {
        let ob = emitter(system(ParticleRender::Points));
        let mut fx = TranslateFixture::new(Scene::new("s"));
        let node = translate(&mut fx, &ob).unwrap();
        assert_eq!(node.rman_type, PrimitiveKind::Emitter);
        assert_eq!(node.state, NodeState::Points { npoints: 2 });
        let dag = fx.graph.node(node.sg_node).unwrap();
        assert_eq!(dag.kind, NodeKind::Points);
        assert_eq!(
            dag.primvars.value("P"),
            Some(&ParamValue::PointArray(vec![Vec3::ZERO, Vec3::X]))
        );
        assert_eq!(
            dag.primvars.value("width"),
            Some(&ParamValue::FloatArray(vec![0.05, 0.05]))
        );
    }

    #[test]
    fn test_hair_drops_short_strands() {
        let mut psys = system(ParticleRender::Hair);
        psys.hair = vec![
            vec![Vec3::ZERO, Vec3::Z, Vec3::Z * 2.0, Vec3::Z * 3.0],
            vec![Vec3::ZERO, Vec3::Z],
        ];
        let ob = emitter(psys);
        let mut fx = TranslateFixture::new(Scene::new("s"));
        let node = translate(&mut fx, &ob).unwrap();
        assert_eq!(node.state, NodeState::Curves { ncurves: 1, npoints: 4 });
        let dag = fx.graph.node(node.sg_node).unwrap();
        assert_eq!(dag.primvars.value("Ri:nvertices"), Some(&ParamValue::IntArray(vec![4])));
    }

    #[test]
    fn test_object_instancing_system_has_no_node() {
        let ob = emitter(system(ParticleRender::Object(EntityId(2))));
        let mut fx = TranslateFixture::new(Scene::new("s"));
        assert!(translate(&mut fx, &ob).is_none());
        assert_eq!(particles_node_kind(&ob.particle_systems[0]), None);
    }

    #[test]
    fn test_count_change_disables_blur() {
        let mut ob = emitter(system(ParticleRender::Points));
        let mut fx = TranslateFixture::new(Scene::new("s"));
        let mut node = translate(&mut fx, &ob).unwrap();
        node.is_deforming = true;
        node.motion_steps = vec![
            tether_math::Subframe::new(-0.25),
            tether_math::Subframe::new(0.25),
        ];

        ob.particle_systems[0].particles.push(Particle::at(Vec3::Y));
        let src = Source::Particles {
            emitter: &ob,
            psys: &ob.particle_systems[0],
            index: 0,
        };
        ParticlesTranslator
            .export_deform_sample(&mut fx.ctx(), src, &mut node, 1)
            .unwrap();
        assert!(!node.is_deforming);
        assert!(node.motion_steps.is_empty());
        assert!(fx.graph.node(node.sg_node).unwrap().primvars.times().is_empty());
    }
}
