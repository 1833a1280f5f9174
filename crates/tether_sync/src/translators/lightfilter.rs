//! Light filters: a coordinate system group plus a filter shader that the
//! lights referencing it carry.

use tether_core::{FilterCombine, LightData, Object};
use tether_math::Mat4Ext;
use tether_sg::{NodeKind, ParamValue, Shader, ShaderClass};

use super::{convert_shader_params, Source, TranslateContext, TranslateError, TranslateResult, Translator};
use crate::handle::{NodeState, RmanSgNode};
use crate::kind::PrimitiveKind;
use crate::naming::light_filter_handle;
use crate::texture::TextureOwner;

const COMBINER: &str = "PxrCombinerLightFilter";

pub struct LightFilterTranslator;

fn filter_of<'a>(src: Source<'a>) -> TranslateResult<(&'a Object, &'a LightData)> {
    let ob = src
        .object()
        .ok_or_else(|| TranslateError::malformed("light filter", "source is not an object"))?;
    let light = ob.data.as_light().ok_or_else(|| {
        TranslateError::malformed("light filter", format!("{} has no light data", ob.name))
    })?;
    Ok((ob, light))
}

/// Move a filter's coordinate system to the object's current placement.
pub fn update_filter_transform(ctx: &mut TranslateContext<'_>, ob: &Object, node: &RmanSgNode) -> TranslateResult<()> {
    ctx.graph
        .expect_node_mut(node.sg_node)?
        .set_transform(ob.matrix_world.light_filter_orientation());
    Ok(())
}

/// The filter shaders a light carries. More than one filter adds a
/// combiner that references each filter under its combine mode.
pub fn combine_filters(light_db_name: &str, filters: Vec<(Shader, FilterCombine)>) -> Vec<Shader> {
    if filters.len() <= 1 {
        return filters.into_iter().map(|(shader, _)| shader).collect();
    }

    let mut combiner = Shader::new(
        ShaderClass::LightFilter,
        COMBINER,
        format!("{}-{}", light_db_name, COMBINER),
    );
    for mode in [FilterCombine::Mult, FilterCombine::Max, FilterCombine::Min, FilterCombine::Screen] {
        let handles: Vec<String> = filters
            .iter()
            .filter(|(_, combine)| *combine == mode)
            .map(|(shader, _)| shader.handle.clone())
            .collect();
        if !handles.is_empty() {
            combiner
                .params
                .set(mode.combiner_param(), ParamValue::ReferenceArray(handles));
        }
    }

    let mut shaders: Vec<Shader> = filters.into_iter().map(|(shader, _)| shader).collect();
    shaders.push(combiner);
    shaders
}

impl Translator for LightFilterTranslator {
    fn export(
        &self,
        ctx: &mut TranslateContext<'_>,
        src: Source<'_>,
        db_name: &str,
    ) -> TranslateResult<Option<RmanSgNode>> {
        let (ob, light) = filter_of(src)?;
        let shader_name = light.shader_name();
        let filter = Shader::new(
            ShaderClass::LightFilter,
            shader_name,
            light_filter_handle(db_name, shader_name),
        );

        let key = ctx.graph.create_node(NodeKind::Group, db_name);
        let root = ctx.graph.root();
        ctx.graph.add_child(root, key)?;
        ctx.graph.add_coordinate_system(key);

        let mut node = RmanSgNode::new(db_name, PrimitiveKind::LightFilter, ob.id, key).with_state(
            NodeState::LightFilter {
                filter,
                lights: Vec::new(),
            },
        );
        node.group_parent = Some(root);
        update_filter_transform(ctx, ob, &node)?;
        Ok(Some(node))
    }

    fn update(&self, ctx: &mut TranslateContext<'_>, src: Source<'_>, node: &mut RmanSgNode) -> TranslateResult<()> {
        let (ob, light) = filter_of(src)?;
        let shader_name = light.shader_name();
        let mut filter = Shader::new(
            ShaderClass::LightFilter,
            shader_name,
            light_filter_handle(&node.db_name, shader_name),
        );
        node.is_frame_sensitive =
            convert_shader_params(ctx.session, TextureOwner::Light(ob.id), &light.params, &mut filter.params);
        filter.params.set_string("coordsys", node.db_name.as_str());
        if let Some(group) = ob.groups.first() {
            filter.params.set_string("linkingGroups", group.as_str());
        }

        update_filter_transform(ctx, ob, node)?;
        let lights = match &node.state {
            NodeState::LightFilter { lights, .. } => lights.clone(),
            _ => Vec::new(),
        };
        node.state = NodeState::LightFilter { filter, lights };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TranslateFixture;
    use tether_core::{EntityId, LightRole, ObjectData, ObjectType, Scene};
    use tether_math::{Mat4, Vec3};

    fn blocker() -> Object {
        Object::new(
            EntityId(5),
            "Blocker",
            ObjectType::Light,
            ObjectData::Light(LightData {
                role: LightRole::LightFilter,
                ..LightData::default()
            }),
        )
        .with_matrix(Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0)))
    }

    #[test]
    fn test_filter_is_coordinate_system() {
        let ob = blocker();
        let mut fx = TranslateFixture::new(Scene::new("s"));
        let mut ctx = fx.ctx();
        let mut node = LightFilterTranslator
            .export(&mut ctx, Source::Object(&ob), "Blocker_5-LIGHTFILTER")
            .unwrap()
            .unwrap();
        LightFilterTranslator
            .update(&mut ctx, Source::Object(&ob), &mut node)
            .unwrap();

        assert!(fx.graph.coordinate_systems().contains(&node.sg_node));
        let root = fx.graph.root();
        assert!(fx.graph.node(root).unwrap().children.contains(&node.sg_node));
        let NodeState::LightFilter { filter, .. } = &node.state else {
            panic!("not a light filter state");
        };
        assert_eq!(filter.plugin, "PxrBlockerLightFilter");
        assert_eq!(filter.handle, "Blocker_5-LIGHTFILTER-PxrBlockerLightFilter");
        assert_eq!(filter.params.get_string("coordsys"), Some("Blocker_5-LIGHTFILTER"));
        let m = fx.graph.node(node.sg_node).unwrap().transform.first().unwrap();
        assert_eq!(m.w_axis.truncate(), Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_single_filter_no_combiner() {
        let f = Shader::new(ShaderClass::LightFilter, "PxrBlockerLightFilter", "a");
        let shaders = combine_filters("Key", vec![(f, FilterCombine::Mult)]);
        assert_eq!(shaders.len(), 1);
    }

    #[test]
    fn test_combiner_groups_by_mode() {
        let a = Shader::new(ShaderClass::LightFilter, "PxrBlockerLightFilter", "a");
        let b = Shader::new(ShaderClass::LightFilter, "PxrGoboLightFilter", "b");
        let c = Shader::new(ShaderClass::LightFilter, "PxrRampLightFilter", "c");
        let shaders = combine_filters(
            "Key",
            vec![
                (a, FilterCombine::Mult),
                (b, FilterCombine::Max),
                (c, FilterCombine::Mult),
            ],
        );
        assert_eq!(shaders.len(), 4);
        let combiner = shaders.last().unwrap();
        assert_eq!(combiner.plugin, COMBINER);
        assert_eq!(combiner.handle, "Key-PxrCombinerLightFilter");
        assert_eq!(
            combiner.params.get("mult"),
            Some(&ParamValue::ReferenceArray(vec!["a".into(), "c".into()]))
        );
        assert_eq!(
            combiner.params.get("max"),
            Some(&ParamValue::ReferenceArray(vec!["b".into()]))
        );
        assert!(!combiner.params.contains("screen"));
    }
}
