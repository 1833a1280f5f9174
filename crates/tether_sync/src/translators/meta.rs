//! Metaball families as one blobby.
//!
//! Meta objects named `Ball`, `Ball.001`, ... share one node named after the
//! family. Elements are stored in world space, so the family's placement
//! carries no transform of its own.

use tether_core::{MetaElement, Object, ObjectData, Scene};
use tether_math::{Mat4, Mat4Ext, Vec3};
use tether_sg::{NodeKind, ParamValue, Topology};

use super::{Source, TranslateContext, TranslateError, TranslateResult, Translator};
use crate::handle::RmanSgNode;
use crate::kind::PrimitiveKind;
use crate::naming::meta_family;

/// Blobby opcode for an ellipsoid leaf.
const OP_ELLIPSOID: i32 = 1001;
/// Blobby opcode for the sum of the listed leaves.
const OP_ADD: i32 = 0;

pub struct MetaTranslator;

/// Every element of every visible meta object in `family`.
fn family_elements<'a>(scene: &'a Scene, family: &'a str) -> impl Iterator<Item = &'a MetaElement> + 'a {
    scene
        .objects
        .iter()
        .filter(move |o| !o.hidden && meta_family(&o.name) == family)
        .filter_map(|o| match &o.data {
            ObjectData::Meta(meta) => Some(meta.elements.iter()),
            _ => None,
        })
        .flatten()
}

fn object_of<'a>(src: Source<'a>) -> TranslateResult<&'a Object> {
    src.object()
        .ok_or_else(|| TranslateError::malformed("meta", "source is not an object"))
}

impl Translator for MetaTranslator {
    fn export(
        &self,
        ctx: &mut TranslateContext<'_>,
        src: Source<'_>,
        db_name: &str,
    ) -> TranslateResult<Option<RmanSgNode>> {
        let ob = object_of(src)?;
        if family_elements(ctx.scene, meta_family(&ob.name)).next().is_none() {
            log::debug!("{}: metaball family has no elements", ob.name);
            return Ok(None);
        }
        let key = ctx.graph.create_node(NodeKind::Blobby, db_name);
        Ok(Some(RmanSgNode::new(db_name, PrimitiveKind::Meta, ob.id, key)))
    }

    fn update(&self, ctx: &mut TranslateContext<'_>, src: Source<'_>, node: &mut RmanSgNode) -> TranslateResult<()> {
        let ob = object_of(src)?;
        let family = meta_family(&ob.name);
        let elements: Vec<&MetaElement> = family_elements(ctx.scene, family).collect();
        let count = elements.len();

        let mut code = Vec::with_capacity(2 * count + 2 + count);
        for i in 0..count {
            code.extend([OP_ELLIPSOID, (i * 16) as i32]);
        }
        code.extend([OP_ADD, count as i32]);
        code.extend((0..count).map(|i| i as i32));

        let floats: Vec<f32> = elements
            .iter()
            .flat_map(|el| {
                let m = Mat4::from_translation(el.center) * Mat4::from_scale(Vec3::splat(el.radius));
                m.to_renderer_array()
            })
            .collect();

        let threshold = ctx
            .scene
            .objects
            .iter()
            .find(|o| o.name == family)
            .unwrap_or(ob);
        let threshold = match &threshold.data {
            ObjectData::Meta(meta) => meta.threshold,
            _ => 0.6,
        };

        let dag = ctx.graph.expect_node_mut(node.sg_node)?;
        dag.define(Topology {
            npolys: 0,
            npoints: count,
            nverts: 0,
        });
        dag.primvars.clear();
        dag.primvars.set_constant("Ri:code", ParamValue::IntArray(code));
        dag.primvars.set_constant("Ri:floats", ParamValue::FloatArray(floats));
        dag.primvars.set_constant("threshold", ParamValue::Float(threshold));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TranslateFixture;
    use tether_core::{EntityId, MetaData, ObjectType};

    fn ball(id: u64, name: &str, center: Vec3) -> Object {
        Object::new(
            EntityId(id),
            name,
            ObjectType::Meta,
            ObjectData::Meta(MetaData {
                elements: vec![MetaElement { center, radius: 2.0 }],
                threshold: 0.5,
            }),
        )
    }

    #[test]
    fn test_family_merged() {
        let mut scene = Scene::new("s");
        scene.add_object(ball(1, "Ball", Vec3::ZERO));
        scene.add_object(ball(2, "Ball.001", Vec3::X));
        scene.add_object(ball(3, "Other", Vec3::Y));
        let ob = scene.objects[1].clone();

        let mut fx = TranslateFixture::new(scene);
        let mut ctx = fx.ctx();
        let mut node = MetaTranslator
            .export(&mut ctx, Source::Object(&ob), "Ball-META")
            .unwrap()
            .unwrap();
        MetaTranslator.update(&mut ctx, Source::Object(&ob), &mut node).unwrap();

        let dag = fx.graph.node(node.sg_node).unwrap();
        assert_eq!(
            dag.primvars.value("Ri:code"),
            Some(&ParamValue::IntArray(vec![1001, 0, 1001, 16, 0, 2, 0, 1]))
        );
        assert_eq!(dag.primvars.value("Ri:floats").map(|v| v.len()), Some(32));
        assert_eq!(dag.primvars.value("threshold"), Some(&ParamValue::Float(0.5)));
    }
}
