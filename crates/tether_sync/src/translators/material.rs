//! Materials: bxdf, optional mesh light and displacement.

use tether_core::{Material, ShaderNode};
use tether_sg::{NodeKind, Shader, ShaderClass};

use super::{convert_shader_params, resolve_string, Source, TranslateContext, TranslateError, TranslateResult, Translator};
use crate::handle::{NodeState, RmanSgNode};
use crate::kind::PrimitiveKind;
use crate::string_expr::is_frame_sensitive;
use crate::texture::TextureOwner;

const FALLBACK_BXDF: &str = "PxrDisney";

pub struct MaterialTranslator;

fn material_of<'a>(src: Source<'a>) -> TranslateResult<&'a Material> {
    match src {
        Source::Material(mat) => Ok(mat),
        _ => Err(TranslateError::malformed("material", "source is not a material")),
    }
}

/// Shader handle: the node's own name, or one derived from the material.
fn shader_handle(db_name: &str, node: &ShaderNode) -> String {
    if node.name.is_empty() {
        format!("{}-{}", db_name, node.plugin)
    } else {
        node.name.clone()
    }
}

impl MaterialTranslator {
    /// Build one shader from a host node. Returns it with its frame
    /// sensitivity.
    fn shader(
        &self,
        ctx: &mut TranslateContext<'_>,
        mat: &Material,
        db_name: &str,
        class: ShaderClass,
        node: &ShaderNode,
    ) -> (Shader, bool) {
        let mut shader = Shader::new(class, node.plugin.as_str(), shader_handle(db_name, node));
        let frame_sensitive =
            convert_shader_params(ctx.session, TextureOwner::Material(mat.id), &node.params, &mut shader.params);
        (shader, frame_sensitive)
    }
}

impl Translator for MaterialTranslator {
    fn export(
        &self,
        ctx: &mut TranslateContext<'_>,
        src: Source<'_>,
        db_name: &str,
    ) -> TranslateResult<Option<RmanSgNode>> {
        let mat = material_of(src)?;
        let key = ctx.graph.create_node(NodeKind::Material, db_name);
        Ok(Some(
            RmanSgNode::new(db_name, PrimitiveKind::Material, mat.id, key)
                .with_state(NodeState::Material { has_meshlight: false }),
        ))
    }

    fn update(&self, ctx: &mut TranslateContext<'_>, src: Source<'_>, node: &mut RmanSgNode) -> TranslateResult<()> {
        let mat = material_of(src)?;
        let db_name = node.db_name.clone();
        let mut frame_sensitive = false;

        let mut bxdf = match mat.bxdf.as_ref().filter(|b| b.active) {
            Some(bxdf) => {
                let (shader, fs) = self.shader(ctx, mat, &db_name, ShaderClass::Bxdf, bxdf);
                frame_sensitive |= fs;
                shader
            }
            None => {
                let mut shader = Shader::new(
                    ShaderClass::Bxdf,
                    FALLBACK_BXDF,
                    format!("{}_{}", db_name, FALLBACK_BXDF),
                );
                shader.params.set_color("baseColor", mat.diffuse_color);
                shader
            }
        };
        for slot in &mat.textures {
            frame_sensitive |= is_frame_sensitive(&slot.path);
            let path = resolve_string(ctx.session, TextureOwner::Material(mat.id), &slot.param, &slot.path);
            bxdf.params.set_string(slot.param.as_str(), path);
        }

        let meshlight = mat.meshlight.as_ref().filter(|m| m.active).map(|m| {
            let (shader, fs) = self.shader(ctx, mat, &db_name, ShaderClass::Light, m);
            frame_sensitive |= fs;
            shader
        });
        let displacement = mat.displacement.as_ref().filter(|d| d.active).map(|d| {
            let (shader, fs) = self.shader(ctx, mat, &db_name, ShaderClass::Displacement, d);
            frame_sensitive |= fs;
            shader
        });

        let has_meshlight = meshlight.is_some();
        let dag = ctx.graph.expect_node_mut(node.sg_node)?;
        dag.shaders.clear();
        dag.set_shader(bxdf);
        if let Some(light) = meshlight {
            dag.set_shader(light);
        }
        if let Some(disp) = displacement {
            dag.set_shader(disp);
        }

        node.is_frame_sensitive = frame_sensitive;
        node.is_meshlight = has_meshlight;
        node.state = NodeState::Material { has_meshlight };
        Ok(())
    }

    fn export_object_primvars(&self, _ctx: &mut TranslateContext<'_>, _ob: &tether_core::Object, _node: &RmanSgNode) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TranslateFixture;
    use tether_core::{EntityId, HostValue, Scene, TextureSlot};

    fn translate(fx: &mut TranslateFixture, mat: &Material) -> RmanSgNode {
        let mut ctx = fx.ctx();
        let mut node = MaterialTranslator
            .export(&mut ctx, Source::Material(mat), "Red_7-MATERIAL")
            .unwrap()
            .unwrap();
        MaterialTranslator.update(&mut ctx, Source::Material(mat), &mut node).unwrap();
        node
    }

    #[test]
    fn test_fallback_bxdf() {
        let mut mat = Material::new(EntityId(7), "Red");
        mat.diffuse_color = [1.0, 0.0, 0.0];
        let mut fx = TranslateFixture::new(Scene::new("s"));
        let node = translate(&mut fx, &mat);

        let dag = fx.graph.node(node.sg_node).unwrap();
        let bxdf = dag.shader(ShaderClass::Bxdf).unwrap();
        assert_eq!(bxdf.plugin, "PxrDisney");
        assert_eq!(bxdf.handle, "Red_7-MATERIAL_PxrDisney");
        assert_eq!(bxdf.params.get("baseColor"), Some(&tether_sg::ParamValue::Color([1.0, 0.0, 0.0])));
        assert!(!node.is_meshlight);
        assert!(!node.is_frame_sensitive);
    }

    #[test]
    fn test_meshlight_and_displacement() {
        let mut mat = Material::new(EntityId(7), "Glow").with_bxdf(ShaderNode::new("PxrSurface").named("glow_surface"));
        mat.meshlight = Some(ShaderNode::new("PxrMeshLight"));
        mat.displacement = Some(ShaderNode::new("PxrDisplace"));
        let mut fx = TranslateFixture::new(Scene::new("s"));
        let node = translate(&mut fx, &mat);

        let dag = fx.graph.node(node.sg_node).unwrap();
        assert_eq!(dag.shader(ShaderClass::Bxdf).unwrap().handle, "glow_surface");
        assert_eq!(dag.shader(ShaderClass::Light).unwrap().handle, "Red_7-MATERIAL-PxrMeshLight");
        assert!(dag.shader(ShaderClass::Displacement).is_some());
        assert!(node.is_meshlight);
        assert!(node.has_meshlight_material());
    }

    #[test]
    fn test_meshlight_removed_on_update() {
        let mut mat = Material::new(EntityId(7), "Glow");
        mat.meshlight = Some(ShaderNode::new("PxrMeshLight"));
        let mut fx = TranslateFixture::new(Scene::new("s"));
        let mut node = translate(&mut fx, &mat);

        mat.meshlight = None;
        MaterialTranslator
            .update(&mut fx.ctx(), Source::Material(&mat), &mut node)
            .unwrap();
        assert!(!node.is_meshlight);
        assert!(fx.graph.node(node.sg_node).unwrap().shader(ShaderClass::Light).is_none());
    }

    #[test]
    fn test_frame_sensitive_texture() {
        let mut mat = Material::new(EntityId(7), "Seq").with_bxdf(ShaderNode::new("PxrSurface"));
        mat.textures.push(TextureSlot {
            param: "diffuseColorMap".into(),
            path: "tex/seq.<f4>.tex".into(),
        });
        let mut fx = TranslateFixture::new(Scene::new("s"));
        fx.session.strings.set_frame_context(3);
        let node = translate(&mut fx, &mat);
        assert!(node.is_frame_sensitive);
        let dag = fx.graph.node(node.sg_node).unwrap();
        let path = dag.shader(ShaderClass::Bxdf).unwrap().params.get_string("diffuseColorMap").unwrap();
        assert!(path.ends_with("tex/seq.0003.tex"));
        assert_eq!(fx.session.textures.len(), 1);
    }

    #[test]
    fn test_update_is_idempotent() {
        let mut surface = ShaderNode::new("PxrSurface");
        surface.params.insert("specularGain".into(), HostValue::Float(0.5));
        let mat = Material::new(EntityId(7), "Shiny").with_bxdf(surface);
        let mut fx = TranslateFixture::new(Scene::new("s"));
        let mut node = translate(&mut fx, &mat);
        let first = fx.graph.node(node.sg_node).unwrap().clone();
        MaterialTranslator
            .update(&mut fx.ctx(), Source::Material(&mat), &mut node)
            .unwrap();
        assert_eq!(fx.graph.node(node.sg_node).unwrap(), &first);
    }
}
