//! Analytic quadrics from the quadric override.

use tether_core::{PrimitiveOverride, QuadricShape};
use tether_sg::{NodeKind, ParamValue, PrimvarList};

use super::{Source, TranslateContext, TranslateError, TranslateResult, Translator};
use crate::handle::RmanSgNode;
use crate::kind::PrimitiveKind;

pub struct QuadricTranslator;

fn shape_of(src: Source<'_>) -> TranslateResult<QuadricShape> {
    match src.object().map(|ob| &ob.primitive) {
        Some(PrimitiveOverride::Quadric { shape }) => Ok(*shape),
        _ => Err(TranslateError::malformed(
            "quadric",
            format!("{} has no quadric override", src.name()),
        )),
    }
}

fn write_shape(primvars: &mut PrimvarList, shape: QuadricShape) {
    let mut set = |name: &str, value: f32| primvars.set_constant(name, ParamValue::Float(value));
    let ty = match shape {
        QuadricShape::Sphere { radius } => {
            set("Ri:radius", radius);
            set("Ri:zmin", -radius);
            set("Ri:zmax", radius);
            "sphere"
        }
        QuadricShape::Cylinder { radius, zmin, zmax } => {
            set("Ri:radius", radius);
            set("Ri:zmin", zmin);
            set("Ri:zmax", zmax);
            "cylinder"
        }
        QuadricShape::Cone { radius, height } => {
            set("Ri:radius", radius);
            set("Ri:height", height);
            "cone"
        }
        QuadricShape::Disk { radius, height } => {
            set("Ri:radius", radius);
            set("Ri:height", height);
            "disk"
        }
        QuadricShape::Torus {
            major_radius,
            minor_radius,
        } => {
            set("Ri:majorradius", major_radius);
            set("Ri:minorradius", minor_radius);
            "torus"
        }
    };
    set("Ri:thetamax", 360.0);
    primvars.set_constant("Ri:type", ParamValue::String(ty.to_string()));
}

impl Translator for QuadricTranslator {
    fn export(
        &self,
        ctx: &mut TranslateContext<'_>,
        src: Source<'_>,
        db_name: &str,
    ) -> TranslateResult<Option<RmanSgNode>> {
        shape_of(src)?;
        let key = ctx.graph.create_node(NodeKind::Quadric, db_name);
        Ok(Some(RmanSgNode::new(db_name, PrimitiveKind::Quadric, src.entity(), key)))
    }

    fn update(&self, ctx: &mut TranslateContext<'_>, src: Source<'_>, node: &mut RmanSgNode) -> TranslateResult<()> {
        let shape = shape_of(src)?;
        let dag = ctx.graph.expect_node_mut(node.sg_node)?;
        dag.primvars.clear();
        write_shape(&mut dag.primvars, shape);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TranslateFixture;
    use tether_core::{EntityId, MeshData, Object, ObjectData, ObjectType, Scene};

    #[test]
    fn test_torus() {
        let mut ob = Object::new(EntityId(1), "Ring", ObjectType::Mesh, ObjectData::Mesh(MeshData::cube()));
        ob.primitive = PrimitiveOverride::Quadric {
            shape: QuadricShape::Torus {
                major_radius: 2.0,
                minor_radius: 0.5,
            },
        };
        let mut fx = TranslateFixture::new(Scene::new("s"));
        let mut ctx = fx.ctx();
        let mut node = QuadricTranslator
            .export(&mut ctx, Source::Object(&ob), "Ring_1-QUADRIC")
            .unwrap()
            .unwrap();
        QuadricTranslator.update(&mut ctx, Source::Object(&ob), &mut node).unwrap();

        let dag = fx.graph.node(node.sg_node).unwrap();
        assert_eq!(dag.kind, NodeKind::Quadric);
        assert_eq!(dag.primvars.value("Ri:type"), Some(&ParamValue::String("torus".into())));
        assert_eq!(dag.primvars.value("Ri:majorradius"), Some(&ParamValue::Float(2.0)));
    }

    #[test]
    fn test_without_override_is_an_error() {
        let ob = Object::new(EntityId(1), "Cube", ObjectType::Mesh, ObjectData::Mesh(MeshData::cube()));
        let mut fx = TranslateFixture::new(Scene::new("s"));
        let mut ctx = fx.ctx();
        assert!(QuadricTranslator.export(&mut ctx, Source::Object(&ob), "x").is_err());
    }
}
