//! Curve objects as renderer curves.

use tether_core::{CurveData, Object, Spline};
use tether_math::Vec3;
use tether_sg::{Detail, NodeKind, ParamValue, Topology};

use super::{Source, TranslateContext, TranslateError, TranslateResult, Translator};
use crate::handle::{NodeState, RmanSgNode};
use crate::kind::PrimitiveKind;
use crate::motion::primvar_times;

pub struct CurveTranslator;

fn curve_of<'a>(src: Source<'a>) -> TranslateResult<(&'a Object, &'a CurveData)> {
    let ob = src
        .object()
        .ok_or_else(|| TranslateError::malformed("curve", "source is not an object"))?;
    let curve = ob
        .data
        .as_curve()
        .ok_or_else(|| TranslateError::malformed("curve", format!("{} has no curve data", ob.name)))?;
    Ok((ob, curve))
}

/// Splines with enough points for the curve basis.
fn renderable_splines(curve: &CurveData) -> impl Iterator<Item = &Spline> + '_ {
    let min_points = if curve.cubic { 4 } else { 2 };
    curve.splines.iter().filter(move |s| s.points.len() >= min_points)
}

fn curve_points(curve: &CurveData) -> Vec<Vec3> {
    renderable_splines(curve)
        .flat_map(|s| s.points.iter().copied())
        .collect()
}

impl Translator for CurveTranslator {
    fn export(
        &self,
        ctx: &mut TranslateContext<'_>,
        src: Source<'_>,
        db_name: &str,
    ) -> TranslateResult<Option<RmanSgNode>> {
        let (ob, curve) = curve_of(src)?;
        if renderable_splines(curve).next().is_none() {
            log::debug!("{}: no spline with enough points", ob.name);
            return Ok(None);
        }
        let key = ctx.graph.create_node(NodeKind::Curves, db_name);
        Ok(Some(RmanSgNode::new(db_name, PrimitiveKind::Curve, ob.id, key)))
    }

    fn update(&self, ctx: &mut TranslateContext<'_>, src: Source<'_>, node: &mut RmanSgNode) -> TranslateResult<()> {
        let (_, curve) = curve_of(src)?;
        let splines: Vec<&Spline> = renderable_splines(curve).collect();
        let nvertices: Vec<i32> = splines.iter().map(|s| s.points.len() as i32).collect();
        let points = curve_points(curve);
        let npoints = points.len();
        let periodic = !splines.is_empty() && splines.iter().all(|s| s.cyclic);

        let dag = ctx.graph.expect_node_mut(node.sg_node)?;
        dag.define(Topology {
            npolys: splines.len(),
            npoints,
            nverts: npoints,
        });
        dag.primvars.clear();
        if node.is_deforming && node.motion_steps.len() > 1 {
            dag.primvars.set_times(&primvar_times(&node.motion_steps));
        }
        dag.primvars
            .set_detail("P", ParamValue::PointArray(points), Detail::Vertex, 0);
        dag.primvars
            .set("Ri:nvertices", ParamValue::IntArray(nvertices), Detail::Uniform);
        dag.primvars.set_constant(
            "Ri:type",
            ParamValue::String(if curve.cubic { "cubic" } else { "linear" }.to_string()),
        );
        dag.primvars.set_constant(
            "Ri:wrap",
            ParamValue::String(if periodic { "periodic" } else { "nonperiodic" }.to_string()),
        );
        if curve.cubic {
            dag.primvars
                .set_constant("Ri:Basis", ParamValue::String("catmull-rom".to_string()));
        }

        let per_point = splines.iter().all(|s| s.radius.len() == s.points.len());
        if per_point {
            let widths = splines
                .iter()
                .flat_map(|s| s.radius.iter().map(|r| r * curve.width))
                .collect();
            dag.primvars.set("width", ParamValue::FloatArray(widths), Detail::Vertex);
        } else {
            dag.primvars
                .set_constant("constantwidth", ParamValue::Float(curve.width));
        }

        node.state = NodeState::Curves {
            ncurves: splines.len(),
            npoints,
        };
        Ok(())
    }

    fn export_deform_sample(
        &self,
        ctx: &mut TranslateContext<'_>,
        src: Source<'_>,
        node: &mut RmanSgNode,
        sample: usize,
    ) -> TranslateResult<()> {
        let (ob, curve) = curve_of(src)?;
        let NodeState::Curves { npoints, .. } = node.state else {
            return Ok(());
        };
        let points = curve_points(curve);
        let dag = ctx.graph.expect_node_mut(node.sg_node)?;
        if points.len() != npoints {
            log::warn!("{}: point count changed within the shutter, deformation blur disabled", ob.name);
            dag.primvars.set_times(&[]);
            node.clear_motion();
            return Ok(());
        }
        dag.primvars
            .set_detail("P", ParamValue::PointArray(points), Detail::Vertex, sample);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TranslateFixture;
    use tether_core::{EntityId, ObjectData, ObjectType, Scene};

    fn curve_object(splines: Vec<Spline>, cubic: bool) -> Object {
        Object::new(
            EntityId(1),
            "Path",
            ObjectType::Curve,
            ObjectData::Curve(CurveData {
                splines,
                cubic,
                ..CurveData::default()
            }),
        )
    }

    fn spline(n: usize) -> Spline {
        Spline {
            points: (0..n).map(|i| Vec3::new(i as f32, 0.0, 0.0)).collect(),
            ..Spline::default()
        }
    }

    #[test]
    fn test_update_is_idempotent() {
        let ob = curve_object(vec![spline(4), spline(6)], true);
        let mut fx = TranslateFixture::new(Scene::new("s"));
        let mut ctx = fx.ctx();
        let mut node = CurveTranslator
            .export(&mut ctx, Source::Object(&ob), "Path_1-CURVE")
            .unwrap()
            .unwrap();
        CurveTranslator.update(&mut ctx, Source::Object(&ob), &mut node).unwrap();
        let once = fx.graph.node(node.sg_node).unwrap().clone();
        let state = node.clone();

        let mut ctx = fx.ctx();
        CurveTranslator.update(&mut ctx, Source::Object(&ob), &mut node).unwrap();
        assert_eq!(fx.graph.node(node.sg_node), Some(&once));
        assert_eq!(node, state);
    }

    #[test]
    fn test_short_splines_dropped() {
        let ob = curve_object(vec![spline(3), spline(5)], true);
        let mut fx = TranslateFixture::new(Scene::new("s"));
        let mut ctx = fx.ctx();
        let mut node = CurveTranslator
            .export(&mut ctx, Source::Object(&ob), "Path_1-CURVE")
            .unwrap()
            .unwrap();
        CurveTranslator.update(&mut ctx, Source::Object(&ob), &mut node).unwrap();

        assert_eq!(node.state, NodeState::Curves { ncurves: 1, npoints: 5 });
        let dag = fx.graph.node(node.sg_node).unwrap();
        assert_eq!(dag.primvars.value("Ri:nvertices"), Some(&ParamValue::IntArray(vec![5])));
        assert_eq!(
            dag.primvars.value("Ri:type"),
            Some(&ParamValue::String("cubic".into()))
        );
    }

    #[test]
    fn test_no_renderable_spline_skipped() {
        let ob = curve_object(vec![spline(3)], true);
        let mut fx = TranslateFixture::new(Scene::new("s"));
        let mut ctx = fx.ctx();
        assert!(CurveTranslator
            .export(&mut ctx, Source::Object(&ob), "x")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_per_point_width() {
        let mut s = spline(2);
        s.radius = vec![1.0, 2.0];
        let ob = curve_object(vec![s], false);
        let mut fx = TranslateFixture::new(Scene::new("s"));
        let mut ctx = fx.ctx();
        let mut node = CurveTranslator
            .export(&mut ctx, Source::Object(&ob), "x")
            .unwrap()
            .unwrap();
        CurveTranslator.update(&mut ctx, Source::Object(&ob), &mut node).unwrap();
        let dag = fx.graph.node(node.sg_node).unwrap();
        assert_eq!(
            dag.primvars.value("width"),
            Some(&ParamValue::FloatArray(vec![0.01, 0.02]))
        );
    }
}
