//! Cameras.
//!
//! A camera exports as a group carrying the placement, with a camera node
//! under it carrying the projection. The camera node gets the right-handed
//! orient so the group can use the host matrix unchanged.

use tether_core::data::SensorFit;
use tether_core::{CameraData, CameraProjection, EntityId, Object};
use tether_math::{Mat4, Mat4Ext, RIGHT_HANDED};
use tether_sg::{NodeKey, NodeKind, ParamValue, Renderable, SgGraph, Shader, ShaderClass};

use super::{Source, TranslateContext, TranslateError, TranslateResult, Translator};
use crate::handle::{NodeState, RmanSgNode};
use crate::kind::PrimitiveKind;
use crate::motion::shutter_window;
use crate::naming::VIEWPORT_CAMERA;

/// Sensor width assumed for the host viewport, in millimetres.
const VIEWPORT_SENSOR: f32 = 36.0;

pub struct CameraTranslator;

fn camera_of<'a>(src: Source<'a>) -> TranslateResult<(&'a Object, &'a CameraData)> {
    let ob = src
        .object()
        .ok_or_else(|| TranslateError::malformed("camera", "source is not an object"))?;
    let cam = ob
        .data
        .as_camera()
        .ok_or_else(|| TranslateError::malformed("camera", format!("{} has no camera data", ob.name)))?;
    Ok((ob, cam))
}

/// `(xaspect, yaspect, aspectratio)` of the frame. Only perspective
/// cameras honor the sensor fit; everything else fits the longer side.
fn frame_aspect(resolution: [u32; 2], fit: Option<SensorFit>) -> (f32, f32, f32) {
    let x = resolution[0].max(1) as f32;
    let y = resolution[1].max(1) as f32;
    match fit {
        Some(SensorFit::Horizontal) => (x / y, 1.0, x / y),
        Some(SensorFit::Vertical) => (1.0, y / x, y / x),
        None if x > y => (x / y, 1.0, x / y),
        None if y > x => (1.0, y / x, y / x),
        None => (1.0, 1.0, 1.0),
    }
}

/// Projection shader plus screen window for a camera at a resolution.
fn projection(cam: &CameraData, resolution: [u32; 2]) -> (Shader, [f32; 4]) {
    let fit = (cam.projection == CameraProjection::Perspective).then_some(cam.sensor_fit);
    let (mut xaspect, mut yaspect, aspect) = frame_aspect(resolution, fit);
    let dx = 2.0 * aspect * cam.shift_x;
    let dy = 2.0 * aspect * cam.shift_y;

    let shader = match cam.projection {
        CameraProjection::Perspective => {
            let mut proj = Shader::new(ShaderClass::Projection, "PxrCamera", "proj");
            proj.params.set_float("fov", cam.fov_degrees(aspect));
            if cam.use_dof && cam.focus_distance > 0.0 {
                proj.params.set_float("fStop", cam.fstop);
                proj.params.set_float("focalLength", cam.lens * 0.001);
                proj.params.set_float("focalDistance", cam.focus_distance);
            }
            proj
        }
        CameraProjection::Orthographic => {
            xaspect *= cam.ortho_scale / (aspect * 2.0);
            yaspect *= cam.ortho_scale / (aspect * 2.0);
            Shader::new(ShaderClass::Projection, "PxrOrthographic", "proj")
        }
        CameraProjection::Panoramic => {
            let mut proj = Shader::new(ShaderClass::Projection, "PxrSphereCamera", "proj");
            proj.params.set_float("hsweep", 360.0);
            proj.params.set_float("vsweep", 180.0);
            return (proj, [-1.0, 1.0, -1.0, 1.0]);
        }
    };
    (shader, [-xaspect + dx, xaspect + dx, -yaspect + dy, yaspect + dy])
}

/// Group plus camera node, the group placed under the root.
fn create_camera_nodes(graph: &mut SgGraph, db_name: &str) -> TranslateResult<(NodeKey, NodeKey)> {
    let group = graph.create_node(NodeKind::Group, db_name);
    let camera = graph.create_node(NodeKind::Camera, format!("{}-CAMERA", db_name));
    let root = graph.root();
    graph.add_child(root, group)?;
    graph.add_child(group, camera)?;
    graph.expect_node_mut(camera)?.orient = Some(RIGHT_HANDED);
    Ok((group, camera))
}

fn camera_node(node: &RmanSgNode) -> TranslateResult<NodeKey> {
    match node.state {
        NodeState::Camera { camera_node, .. } => Ok(camera_node),
        _ => Err(TranslateError::malformed("camera", format!("{} has no camera node", node.db_name))),
    }
}

/// Write the frame format options the main camera decides.
fn set_screen_options(graph: &mut SgGraph, screen_window: [f32; 4], resolution: [u32; 2]) {
    let options = graph.options_mut();
    options.set_float_array("Ri:ScreenWindow", screen_window.to_vec());
    options.set(
        "Ri:FormatResolution",
        ParamValue::IntArray(vec![resolution[0] as i32, resolution[1] as i32]),
    );
    options.set_float("Ri:FormatPixelAspectRatio", 1.0);
}

/// Place a camera. `sample` writes one motion sample instead of the static
/// transform. Unchanged static placements are not rewritten.
pub fn update_camera_transform(
    graph: &mut SgGraph,
    node: &mut RmanSgNode,
    matrix: Mat4,
    sample: Option<(usize, f32)>,
) -> TranslateResult<()> {
    // Renderer cameras must not carry scale
    let (_, rotation, translation) = matrix.to_scale_rotation_translation();
    let matrix = Mat4::from_rotation_translation(rotation, translation);

    let dag = graph.expect_node_mut(node.sg_node)?;
    match sample {
        Some((index, time)) => dag.set_transform_sample(index, matrix, time)?,
        None => {
            if let NodeState::Camera { cam_matrix, .. } = &mut node.state {
                if cam_matrix.approx_eq(&matrix, 1e-6) {
                    return Ok(());
                }
                *cam_matrix = matrix;
            }
            dag.set_transform(matrix);
        }
    }
    Ok(())
}

impl Translator for CameraTranslator {
    fn export(
        &self,
        ctx: &mut TranslateContext<'_>,
        src: Source<'_>,
        db_name: &str,
    ) -> TranslateResult<Option<RmanSgNode>> {
        let (ob, _) = camera_of(src)?;
        let (group, camera) = create_camera_nodes(ctx.graph, db_name)?;
        let mut node = RmanSgNode::new(db_name, PrimitiveKind::Camera, ob.id, group).with_state(NodeState::Camera {
            camera_node: camera,
            cam_matrix: Mat4::ZERO,
        });
        node.group_parent = Some(ctx.graph.root());
        Ok(Some(node))
    }

    fn update(&self, ctx: &mut TranslateContext<'_>, src: Source<'_>, node: &mut RmanSgNode) -> TranslateResult<()> {
        let (ob, cam) = camera_of(src)?;
        let settings = &ctx.scene.settings;
        let resolution = settings.resolution;
        let (proj, screen_window) = projection(cam, resolution);
        let [open, close] = shutter_window(settings.shutter_angle, settings.shutter_timing);
        let is_main = ctx.scene.camera == Some(ob.id);

        let dag = ctx.graph.expect_node_mut(camera_node(node)?)?;
        dag.set_shader(proj);
        dag.attributes.set_float("nearClip", cam.clip_start);
        dag.attributes.set_float("farClip", cam.clip_end);
        dag.attributes.set_float("shutterOpenTime", open);
        dag.attributes.set_float("shutterCloseTime", close);
        dag.renderable = if is_main { Renderable::Main } else { Renderable::Secondary };

        if is_main {
            set_screen_options(ctx.graph, screen_window, resolution);
        }
        if !node.is_transforming {
            update_camera_transform(ctx.graph, node, ob.matrix_world, None)?;
        }
        Ok(())
    }

    fn export_object_primvars(&self, _ctx: &mut TranslateContext<'_>, _ob: &Object, _node: &RmanSgNode) {}
}

/// Camera driven by the host viewport. `None` when the scene has no
/// viewport state.
pub fn export_viewport_camera(ctx: &mut TranslateContext<'_>) -> TranslateResult<Option<RmanSgNode>> {
    if ctx.scene.viewport.is_none() {
        return Ok(None);
    }
    let (group, camera) = create_camera_nodes(ctx.graph, VIEWPORT_CAMERA)?;
    let entity = ctx.scene.camera.unwrap_or(EntityId(0));
    let mut node = RmanSgNode::new(VIEWPORT_CAMERA, PrimitiveKind::Camera, entity, group).with_state(
        NodeState::Camera {
            camera_node: camera,
            cam_matrix: Mat4::ZERO,
        },
    );
    node.group_parent = Some(ctx.graph.root());
    update_viewport_camera(ctx, &mut node)?;
    Ok(Some(node))
}

/// Refresh projection and placement from the viewport.
pub fn update_viewport_camera(ctx: &mut TranslateContext<'_>, node: &mut RmanSgNode) -> TranslateResult<()> {
    let Some(viewport) = ctx.scene.viewport.as_ref() else {
        return Ok(());
    };
    let cam = CameraData {
        lens: viewport.lens,
        sensor_width: VIEWPORT_SENSOR,
        ..CameraData::default()
    };
    let (proj, screen_window) = projection(&cam, viewport.resolution);

    let dag = ctx.graph.expect_node_mut(camera_node(node)?)?;
    dag.set_shader(proj);
    dag.attributes.set_float("nearClip", cam.clip_start);
    dag.attributes.set_float("farClip", cam.clip_end);
    dag.renderable = Renderable::Main;
    set_screen_options(ctx.graph, screen_window, viewport.resolution);
    update_camera_transform(ctx.graph, node, viewport.view_matrix.inverse(), None)
}
