//! Procedurals: delayed archives, DSOs, run-program and Alembic.

use tether_core::{Object, PrimitiveOverride};
use tether_sg::{NodeKind, ParamValue, Shader, ShaderClass};

use super::{Source, TranslateContext, TranslateError, TranslateResult, Translator};
use crate::handle::RmanSgNode;
use crate::kind::PrimitiveKind;
use crate::string_expr::is_frame_sensitive;

const UNBOUNDED: [f32; 6] = [-100000.0, 100000.0, -100000.0, 100000.0, -100000.0, 100000.0];

pub struct ProceduralTranslator;

fn object_of<'a>(src: Source<'a>) -> TranslateResult<&'a Object> {
    src.object()
        .ok_or_else(|| TranslateError::malformed("procedural", "source is not an object"))
}

/// The path the override points at, `None` for other overrides.
fn procedural_path(ob: &Object) -> Option<&str> {
    match &ob.primitive {
        PrimitiveOverride::Archive { path }
        | PrimitiveOverride::Dso { path, .. }
        | PrimitiveOverride::RunProgram { path, .. }
        | PrimitiveOverride::Alembic { path } => Some(path.as_str()),
        _ => None,
    }
}

impl Translator for ProceduralTranslator {
    fn export(
        &self,
        ctx: &mut TranslateContext<'_>,
        src: Source<'_>,
        db_name: &str,
    ) -> TranslateResult<Option<RmanSgNode>> {
        let ob = object_of(src)?;
        match procedural_path(ob) {
            None => Err(TranslateError::malformed(
                "procedural",
                format!("{} has no procedural override", ob.name),
            )),
            Some("") => {
                log::warn!("{}: procedural without a path, skipped", ob.name);
                Ok(None)
            }
            Some(_) => {
                let key = ctx.graph.create_node(NodeKind::Procedural, db_name);
                Ok(Some(RmanSgNode::new(db_name, PrimitiveKind::Procedural, ob.id, key)))
            }
        }
    }

    fn update(&self, ctx: &mut TranslateContext<'_>, src: Source<'_>, node: &mut RmanSgNode) -> TranslateResult<()> {
        let ob = object_of(src)?;
        let strings = &ctx.session.strings;

        let (plugin, params, frame_sensitive) = match &ob.primitive {
            PrimitiveOverride::Archive { path } => (
                "DelayedReadArchive",
                vec![("filename", strings.expand(path))],
                is_frame_sensitive(path),
            ),
            PrimitiveOverride::Dso { path, data } => (
                "DynamicLoad",
                vec![("dsoname", strings.expand(path)), ("data", data.clone())],
                is_frame_sensitive(path),
            ),
            PrimitiveOverride::RunProgram { path, args } => (
                "RunProgram",
                vec![("filename", strings.expand(path)), ("data", args.clone())],
                is_frame_sensitive(path),
            ),
            PrimitiveOverride::Alembic { path } => {
                let use_scene_frame = ob
                    .params
                    .get("abc_use_scene_frame")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(true);
                let frame = if use_scene_frame {
                    ctx.scene.frame_current as f32
                } else {
                    ob.params.get("abc_frame").and_then(|v| v.as_f32()).unwrap_or(1.0)
                };
                let fps = ob.params.get("abc_fps").and_then(|v| v.as_f32()).unwrap_or(24.0);
                let shutter_close = ctx.scene.settings.shutter_angle / 360.0;
                let args = format!(
                    "-filename {} -frame {:.6} -fps {:.6} -shutteropen {:.6} -shutterclose {:.6} -ccw",
                    strings.expand(path),
                    frame,
                    fps,
                    0.0,
                    shutter_close
                );
                (
                    "DynamicLoad",
                    vec![("dsoname", "AlembicProcPrim".to_string()), ("data", args)],
                    use_scene_frame,
                )
            }
            _ => {
                return Err(TranslateError::malformed(
                    "procedural",
                    format!("{} has no procedural override", ob.name),
                ))
            }
        };

        node.is_frame_sensitive = frame_sensitive;
        let dag = ctx.graph.expect_node_mut(node.sg_node)?;
        dag.set_shader(Shader::new(ShaderClass::Pattern, plugin, node.db_name.as_str()));
        dag.primvars.clear();
        for (name, value) in params {
            dag.primvars.set_constant(name, ParamValue::String(value));
        }
        dag.primvars
            .set_constant("Ri:bound", ParamValue::FloatArray(UNBOUNDED.to_vec()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TranslateFixture;
    use tether_core::{EntityId, ObjectData, ObjectType, Scene};

    fn procedural(primitive: PrimitiveOverride) -> Object {
        let mut ob = Object::new(EntityId(1), "Proc", ObjectType::Empty, ObjectData::None);
        ob.primitive = primitive;
        ob
    }

    #[test]
    fn test_archive() {
        let ob = procedural(PrimitiveOverride::Archive {
            path: "set/<scene>.rib".into(),
        });
        let mut fx = TranslateFixture::new(Scene::new("s"));
        fx.session.strings.set_var("scene", "shot");
        let mut ctx = fx.ctx();
        let mut node = ProceduralTranslator
            .export(&mut ctx, Source::Object(&ob), "Proc_1-PROCEDURAL")
            .unwrap()
            .unwrap();
        ProceduralTranslator.update(&mut ctx, Source::Object(&ob), &mut node).unwrap();

        let dag = fx.graph.node(node.sg_node).unwrap();
        assert_eq!(
            dag.shader(ShaderClass::Pattern).map(|s| s.plugin.as_str()),
            Some("DelayedReadArchive")
        );
        assert_eq!(
            dag.primvars.value("filename"),
            Some(&ParamValue::String("set/shot.rib".into()))
        );
        assert!(!node.is_frame_sensitive);
    }

    #[test]
    fn test_alembic_follows_scene_frame() {
        let ob = procedural(PrimitiveOverride::Alembic { path: "anim.abc".into() });
        let mut scene = Scene::new("s");
        scene.frame_current = 42;
        let mut fx = TranslateFixture::new(scene);
        let mut ctx = fx.ctx();
        let mut node = ProceduralTranslator
            .export(&mut ctx, Source::Object(&ob), "x")
            .unwrap()
            .unwrap();
        ProceduralTranslator.update(&mut ctx, Source::Object(&ob), &mut node).unwrap();

        assert!(node.is_frame_sensitive);
        let dag = fx.graph.node(node.sg_node).unwrap();
        let Some(ParamValue::String(data)) = dag.primvars.value("data") else {
            panic!("missing alembic args");
        };
        assert!(data.contains("-filename anim.abc -frame 42.000000"));
    }

    #[test]
    fn test_empty_path_skipped() {
        let ob = procedural(PrimitiveOverride::Dso {
            path: String::new(),
            data: String::new(),
        });
        let mut fx = TranslateFixture::new(Scene::new("s"));
        let mut ctx = fx.ctx();
        assert!(ProceduralTranslator
            .export(&mut ctx, Source::Object(&ob), "x")
            .unwrap()
            .is_none());
    }
}
