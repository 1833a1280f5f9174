//! Point clouds, and meshes rendered as their vertices.

use tether_core::{Object, ObjectData};
use tether_math::Vec3;
use tether_sg::{Detail, NodeKind, ParamValue, Topology};

use super::{Source, TranslateContext, TranslateError, TranslateResult, Translator};
use crate::handle::{NodeState, RmanSgNode};
use crate::kind::PrimitiveKind;
use crate::motion::primvar_times;

const DEFAULT_WIDTH: f32 = 0.1;

pub struct PointsTranslator;

fn points_of<'a>(src: Source<'a>) -> TranslateResult<(&'a Object, &'a [Vec3], f32)> {
    let ob = src
        .object()
        .ok_or_else(|| TranslateError::malformed("points", "source is not an object"))?;
    match &ob.data {
        ObjectData::Points(points) => Ok((ob, &points.positions, points.width)),
        ObjectData::Mesh(mesh) => {
            let width = ob
                .params
                .get("pointsprim_width")
                .and_then(|v| v.as_f32())
                .unwrap_or(DEFAULT_WIDTH);
            Ok((ob, &mesh.positions, width))
        }
        _ => Err(TranslateError::malformed(
            "points",
            format!("{} has no point data", ob.name),
        )),
    }
}

impl Translator for PointsTranslator {
    fn export(
        &self,
        ctx: &mut TranslateContext<'_>,
        src: Source<'_>,
        db_name: &str,
    ) -> TranslateResult<Option<RmanSgNode>> {
        let (ob, positions, _) = points_of(src)?;
        if positions.is_empty() {
            return Ok(None);
        }
        let key = ctx.graph.create_node(NodeKind::Points, db_name);
        Ok(Some(RmanSgNode::new(db_name, PrimitiveKind::Points, ob.id, key)))
    }

    fn update(&self, ctx: &mut TranslateContext<'_>, src: Source<'_>, node: &mut RmanSgNode) -> TranslateResult<()> {
        let (_, positions, width) = points_of(src)?;
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
            .set_detail("P", ParamValue::PointArray(positions.to_vec()), Detail::Vertex, 0);
        dag.primvars.set_constant("constantwidth", ParamValue::Float(width));
        node.state = NodeState::Points { npoints };
        Ok(())
    }

    fn export_deform_sample(
        &self,
        ctx: &mut TranslateContext<'_>,
        src: Source<'_>,
        node: &mut RmanSgNode,
        sample: usize,
    ) -> TranslateResult<()> {
        let (ob, positions, _) = points_of(src)?;
        let NodeState::Points { npoints } = node.state else {
            return Ok(());
        };
        let dag = ctx.graph.expect_node_mut(node.sg_node)?;
        if positions.len() != npoints {
            log::warn!("{}: point count changed within the shutter, deformation blur disabled", ob.name);
            dag.primvars.set_times(&[]);
            node.clear_motion();
            return Ok(());
        }
        dag.primvars
            .set_detail("P", ParamValue::PointArray(positions.to_vec()), Detail::Vertex, sample);
        Ok(())
    }
}
