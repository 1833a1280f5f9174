//! Grease pencil: a group holding one linear curve per stroke.

use tether_core::{Object, ObjectData, StrokeData};
use tether_sg::{Detail, NodeKind, ParamValue, Topology};

use super::{Source, TranslateContext, TranslateError, TranslateResult, Translator};
use crate::handle::{NodeState, RmanSgNode};
use crate::kind::PrimitiveKind;

pub struct GreasePencilTranslator;

fn strokes_of<'a>(src: Source<'a>) -> TranslateResult<(&'a Object, &'a StrokeData)> {
    let ob = src
        .object()
        .ok_or_else(|| TranslateError::malformed("grease pencil", "source is not an object"))?;
    match &ob.data {
        ObjectData::GreasePencil(data) => Ok((ob, data)),
        _ => Err(TranslateError::malformed("grease pencil", format!("{} has no strokes", ob.name))),
    }
}

impl Translator for GreasePencilTranslator {
    fn export(
        &self,
        ctx: &mut TranslateContext<'_>,
        src: Source<'_>,
        db_name: &str,
    ) -> TranslateResult<Option<RmanSgNode>> {
        let (ob, _) = strokes_of(src)?;
        let key = ctx.graph.create_node(NodeKind::Group, db_name);
        Ok(Some(
            RmanSgNode::new(db_name, PrimitiveKind::GreasePencil, ob.id, key)
                .with_state(NodeState::GreasePencil { strokes: Vec::new() }),
        ))
    }

    fn update(&self, ctx: &mut TranslateContext<'_>, src: Source<'_>, node: &mut RmanSgNode) -> TranslateResult<()> {
        let (ob, data) = strokes_of(src)?;
        if let NodeState::GreasePencil { strokes } = &node.state {
            for key in strokes {
                ctx.graph.delete_node(*key);
            }
        }

        let mut strokes = Vec::with_capacity(data.strokes.len());
        for (i, stroke) in data.strokes.iter().enumerate() {
            if stroke.points.len() < 2 {
                continue;
            }
            let npoints = stroke.points.len();
            let key = ctx
                .graph
                .create_node(NodeKind::Curves, format!("{}|stroke{}", node.db_name, i));
            let dag = ctx.graph.expect_node_mut(key)?;
            dag.define(Topology {
                npolys: 1,
                npoints,
                nverts: 0,
            });
            dag.primvars.set_constant("Ri:type", ParamValue::String("linear".into()));
            dag.primvars.set_constant("Ri:wrap", ParamValue::String("nonperiodic".into()));
            dag.primvars
                .set("Ri:nvertices", ParamValue::IntArray(vec![npoints as i32]), Detail::Uniform);
            dag.primvars
                .set_detail("P", ParamValue::PointArray(stroke.points.clone()), Detail::Vertex, 0);
            dag.primvars
                .set_constant("constantwidth", ParamValue::Float(stroke.width));

            let material = ctx.slot_material_node(ob, stroke.material_index as usize);
            ctx.graph.set_material(key, material)?;
            ctx.graph.add_child(node.sg_node, key)?;
            strokes.push(key);
        }
        log::trace!("{}: {} stroke(s)", ob.name, strokes.len());
        node.state = NodeState::GreasePencil { strokes };
        Ok(())
    }

    fn export_object_primvars(&self, _ctx: &mut TranslateContext<'_>, _ob: &Object, _node: &RmanSgNode) {}
}
