//! Empties and armatures: a transform-only group, optionally exposed as a
//! named coordinate system.

use tether_core::Object;

use super::{Source, TranslateContext, TranslateError, TranslateResult, Translator};
use crate::handle::{NodeState, RmanSgNode};
use crate::kind::PrimitiveKind;
use tether_sg::NodeKind;

pub struct GroupTranslator;

fn object_of<'a>(src: Source<'a>) -> TranslateResult<&'a Object> {
    src.object()
        .ok_or_else(|| TranslateError::malformed("group", "source is not an object"))
}

impl Translator for GroupTranslator {
    fn export(
        &self,
        ctx: &mut TranslateContext<'_>,
        src: Source<'_>,
        db_name: &str,
    ) -> TranslateResult<Option<RmanSgNode>> {
        let ob = object_of(src)?;
        let key = ctx.graph.create_node(NodeKind::Group, db_name);
        let root = ctx.graph.root();
        ctx.graph.add_child(root, key)?;
        let mut node = RmanSgNode::new(db_name, PrimitiveKind::Group, ob.id, key)
            .with_state(NodeState::Group { is_coordsys: false });
        node.group_parent = Some(root);
        Ok(Some(node))
    }

    fn update(&self, ctx: &mut TranslateContext<'_>, src: Source<'_>, node: &mut RmanSgNode) -> TranslateResult<()> {
        let ob = object_of(src)?;
        ctx.graph.expect_node_mut(node.sg_node)?.set_transform(ob.matrix_world);
        if ob.export_as_coordsys {
            ctx.graph.add_coordinate_system(node.sg_node);
        } else {
            ctx.graph.remove_coordinate_system(node.sg_node);
        }
        node.state = NodeState::Group {
            is_coordsys: ob.export_as_coordsys,
        };
        Ok(())
    }

    fn export_object_primvars(&self, _ctx: &mut TranslateContext<'_>, _ob: &Object, _node: &RmanSgNode) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TranslateFixture;
    use tether_core::{EntityId, ObjectData, ObjectType, Scene};
    use tether_math::{Mat4, Vec3};

    #[test]
    fn test_coordsys_toggle() {
        let mut ob = Object::new(EntityId(9), "Locator", ObjectType::Empty, ObjectData::None)
            .with_matrix(Mat4::from_translation(Vec3::Z));
        ob.export_as_coordsys = true;
        let mut fx = TranslateFixture::new(Scene::new("s"));
        let mut ctx = fx.ctx();
        let mut node = GroupTranslator
            .export(&mut ctx, Source::Object(&ob), "Locator_9-EMPTY")
            .unwrap()
            .unwrap();
        GroupTranslator.update(&mut ctx, Source::Object(&ob), &mut node).unwrap();
        assert_eq!(node.state, NodeState::Group { is_coordsys: true });
        assert_eq!(fx.graph.coordinate_systems(), &[node.sg_node]);

        ob.export_as_coordsys = false;
        GroupTranslator
            .update(&mut fx.ctx(), Source::Object(&ob), &mut node)
            .unwrap();
        assert!(fx.graph.coordinate_systems().is_empty());
        assert_eq!(
            fx.graph.node(node.sg_node).unwrap().transform.first(),
            Some(Mat4::from_translation(Vec3::Z))
        );
    }
}
