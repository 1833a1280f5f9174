//! Analytic lights.

use tether_core::{HostLightType, LightData, LightRole, Object, Scene};
use tether_math::{Mat4, ORIENT_PXR_DOME_LIGHT, ORIENT_PXR_LIGHT};
use tether_sg::{NodeKey, NodeKind, ParamList, Shader, ShaderClass};

use super::{convert_shader_params, Source, TranslateContext, TranslateError, TranslateResult, Translator};
use crate::handle::{NodeState, RmanSgNode};
use crate::kind::PrimitiveKind;
use crate::texture::TextureOwner;

const PORTAL_LIGHT: &str = "PxrPortalLight";
const DOME_LIGHT: &str = "PxrDomeLight";

/// Dome parameters a portal takes over from its dome.
const DOME_INHERITED: [(&str, &str); 4] = [
    ("lightColorMap", "domeColorMap"),
    ("intensity", "intensity"),
    ("exposure", "exposure"),
    ("lightColor", "lightColor"),
];

pub struct LightTranslator;

fn light_of<'a>(src: Source<'a>) -> TranslateResult<(&'a Object, &'a LightData)> {
    let ob = src
        .object()
        .ok_or_else(|| TranslateError::malformed("light", "source is not an object"))?;
    let light = ob
        .data
        .as_light()
        .ok_or_else(|| TranslateError::malformed("light", format!("{} has no light data", ob.name)))?;
    Ok((ob, light))
}

/// Whether an object's renderer node should be hidden: hidden or muted in
/// the host, or left out of an active solo. Solo only counts in
/// interactive sessions.
pub fn renderer_hidden(scene: &Scene, ob: &Object, interactive: bool) -> bool {
    if ob.hidden {
        return true;
    }
    let Some(light) = ob.data.as_light() else {
        return false;
    };
    if interactive && light.role == LightRole::Light && scene.settings.solo_light {
        let solo_active = scene
            .lights(false)
            .any(|l| l.data.as_light().is_some_and(|d| d.solo));
        if solo_active {
            return !light.solo;
        }
    }
    light.mute
}

fn is_dome(ob: &Object) -> bool {
    ob.data
        .as_light()
        .is_some_and(|l| l.role == LightRole::Light && l.shader_name() == DOME_LIGHT)
}

/// Nearest dome light up the parent chain of a portal.
pub fn find_portal_dome_parent<'a>(scene: &'a Scene, portal: &Object) -> Option<&'a Object> {
    let mut parent = portal.parent.and_then(|p| scene.object(p));
    let mut depth = 0;
    while let Some(ob) = parent {
        if is_dome(ob) {
            return Some(ob);
        }
        depth += 1;
        if depth > scene.objects.len() {
            return None;
        }
        parent = ob.parent.and_then(|p| scene.object(p));
    }
    None
}

/// Does any visible portal light feed from this dome?
pub fn dome_has_portals(scene: &Scene, dome: &Object) -> bool {
    scene.lights(false).any(|ob| {
        !ob.hidden
            && ob.data.as_light().is_some_and(|l| l.shader_name() == PORTAL_LIGHT)
            && find_portal_dome_parent(scene, ob).is_some_and(|d| d.id == dome.id)
    })
}

/// Orientation applied under the light's transform.
pub fn light_orientation(shader: &str) -> Option<Mat4> {
    match shader {
        "PxrRectLight" | "PxrDiskLight" | "PxrPortalLight" | "PxrSphereLight" | "PxrDistantLight"
        | "PxrCylinderLight" => Some(ORIENT_PXR_LIGHT),
        "PxrEnvDayLight" => Some(Mat4::from_rotation_z((-90.0f32).to_radians())),
        DOME_LIGHT => Some(ORIENT_PXR_DOME_LIGHT),
        _ => None,
    }
}

impl LightTranslator {
    fn light_shader(&self, ctx: &mut TranslateContext<'_>, ob: &Object, light: &LightData, node: &mut RmanSgNode) -> Shader {
        let shader_name = light.shader_name();
        let mut shader = Shader::new(ShaderClass::Light, shader_name, node.db_name.as_str());

        if light.shader.is_empty() {
            let exposure = match light.host_type {
                HostLightType::Sun => 0.0,
                _ => light.energy / 200.0,
            };
            shader.params.set_float("exposure", exposure);
            shader.params.set_color("lightColor", light.color);
            if light.host_type != HostLightType::Sun {
                shader.params.set_int("areaNormalize", 1);
            }
            node.is_frame_sensitive = false;
        } else {
            shader.params.set_color("lightColor", light.color);
            shader.params.set_float("intensity", light.energy);
            node.is_frame_sensitive =
                convert_shader_params(ctx.session, TextureOwner::Light(ob.id), &light.params, &mut shader.params);
        }

        if shader_name == PORTAL_LIGHT {
            match find_portal_dome_parent(ctx.scene, ob) {
                Some(dome) => {
                    shader.params.set_string("portalName", node.db_name.as_str());
                    if let Some(dome_light) = dome.data.as_light() {
                        let mut dome_params = ParamList::new();
                        convert_shader_params(
                            ctx.session,
                            TextureOwner::Light(dome.id),
                            &dome_light.params,
                            &mut dome_params,
                        );
                        dome_params.set_color("lightColor", dome_light.color);
                        for (from, to) in DOME_INHERITED {
                            if let Some(value) = dome_params.get(from) {
                                shader.params.set(to, value.clone());
                            }
                        }
                    }
                    let portal_to_dome = dome.matrix_world.inverse() * ob.matrix_world * ORIENT_PXR_LIGHT;
                    shader.params.set_matrix("portalToDome", portal_to_dome);
                }
                None => log::error!("Could not find a dome light parent for: {}", ob.name),
            }
        }
        shader
    }
}

impl Translator for LightTranslator {
    fn export(
        &self,
        ctx: &mut TranslateContext<'_>,
        src: Source<'_>,
        db_name: &str,
    ) -> TranslateResult<Option<RmanSgNode>> {
        let (ob, light) = light_of(src)?;
        let shader = light.shader_name();
        if shader == PORTAL_LIGHT && find_portal_dome_parent(ctx.scene, ob).is_none() {
            log::warn!("{}: portal light without a dome parent, skipped", ob.name);
            return Ok(None);
        }
        if shader == DOME_LIGHT && dome_has_portals(ctx.scene, ob) {
            log::debug!("{}: dome lights the scene through its portals", ob.name);
            return Ok(None);
        }

        let key = ctx.graph.create_node(NodeKind::AnalyticLight, db_name);
        let node = RmanSgNode::new(db_name, PrimitiveKind::Light, ob.id, key).with_state(NodeState::Light {
            is_portal: shader == PORTAL_LIGHT,
        });
        Ok(Some(node))
    }

    fn update(&self, ctx: &mut TranslateContext<'_>, src: Source<'_>, node: &mut RmanSgNode) -> TranslateResult<()> {
        let (ob, light) = light_of(src)?;
        let shader = self.light_shader(ctx, ob, light, node);
        let orient = light_orientation(&shader.plugin);
        let primary_vis = ob
            .params
            .get("light_primary_visibility")
            .and_then(|v| v.as_i32())
            .unwrap_or(i32::from(shader.plugin == DOME_LIGHT));

        let hidden = renderer_hidden(ctx.scene, ob, ctx.is_interactive());
        node.is_hidden = hidden;
        let dag = ctx.graph.expect_node_mut(node.sg_node)?;
        dag.set_shader(shader);
        dag.orient = orient;
        dag.hidden = hidden;
        dag.attributes.set_int("visibility:camera", primary_vis);
        dag.attributes.set_int("visibility:transmission", 0);
        dag.attributes.set_int("visibility:indirect", 0);
        dag.attributes
            .set_string("grouping:membership", format!("World,{}", node.db_name));
        Ok(())
    }

    fn export_object_primvars(&self, _ctx: &mut TranslateContext<'_>, _ob: &Object, _node: &RmanSgNode) {}

    fn export_object_attributes(
        &self,
        _ctx: &mut TranslateContext<'_>,
        _ob: &Object,
        _node: &RmanSgNode,
        _group: NodeKey,
        _persistent_id: i32,
    ) -> TranslateResult<()> {
        Ok(())
    }
}
