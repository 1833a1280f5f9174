//! Scene-wide renderer state: options, hider, integrator, filters,
//! displays and the fallback light.
//!
//! Everything here writes straight into the graph's scene-level tables and
//! can be called again at any time to refresh them.

use std::collections::BTreeMap;

use tether_core::{BucketOrder, EntityId, HoldoutMatte, Params, Scene, ShaderNode};
use tether_math::Mat4;
use tether_sg::{Display, NodeKey, NodeKind, ParamList, ParamValue, Renderable, SgGraph, SgResult, Shader, ShaderClass};

use crate::context::SessionContext;
use crate::motion::shutter_window;
use crate::naming::DEFAULT_LIGHT;
use crate::texture::TextureOwner;
use crate::translators::convert_shader_params;

const DEFAULT_INTEGRATOR: &str = "PxrPathTracer";
const WORLD_BACKGROUND_FILTER: &str = "__rman_world_df";

/// Copy schema-declared properties from `params` into `out`.
fn copy_declared<'a>(
    props: impl Iterator<Item = (&'a str, &'a str, &'a crate::schema::PropertyMeta)>,
    params: &Params,
    out: &mut ParamList,
) {
    for (prop, name, meta) in props {
        let Some(value) = params.get(prop).or(meta.default.as_ref()) else {
            continue;
        };
        match meta.convert(value) {
            Some(converted) => out.set(name, converted),
            None => log::warn!("scene property '{}' cannot be converted to {:?}", prop, meta.renderman_type),
        }
    }
}

/// Root attributes declared by the schema.
pub fn export_root_attributes(graph: &mut SgGraph, scene: &Scene, session: &SessionContext) -> SgResult<()> {
    let mut attrs = ParamList::new();
    copy_declared(session.schema.root_attributes(), &scene.settings.params, &mut attrs);
    let root = graph.root();
    let dag = graph.expect_node_mut(root)?;
    for (name, value) in attrs.iter() {
        dag.attributes.set(name, value.clone());
    }
    Ok(())
}

/// Spiral bucket origin. `-1` on an axis centers it.
fn spiral_origin(spiral: [i32; 2], resolution: [u32; 2]) -> Option<[f32; 2]> {
    let [x, y] = spiral;
    let [width, height] = resolution.map(|r| r as i32);
    if x > width || y > height {
        return None;
    }
    let x = if x == -1 { width / 2 } else { x };
    let y = if y == -1 { height / 2 } else { y };
    Some([x as f32, y as f32])
}

fn tokens(value: &str) -> Vec<String> {
    value.split_whitespace().map(str::to_string).collect()
}

/// Frame, threads, memory limits, pixel filter, buckets, checkpoints,
/// shutter and search paths.
pub fn export_global_options(graph: &mut SgGraph, scene: &Scene, session: &SessionContext) {
    let rm = &scene.settings;
    let interactive = session.config.is_interactive();
    let options = graph.options_mut();

    copy_declared(session.schema.scene_options(), &rm.params, options);

    if !session.config.external_render {
        options.set_int("threads", rm.threads);
    }
    options.set_int("limits:geocachememory", rm.limits_geocachememory);
    options.set_int("limits:opacitycachememory", rm.limits_opacitycachememory);
    options.set_int("limits:texturememory", rm.limits_texturememory);

    options.set_string("Ri:PixelFilterName", rm.pixel_filter.as_str());
    options.set_float_array("Ri:PixelFilterWidth", rm.pixel_filter_size.to_vec());

    let checkpointing = rm.enable_checkpoint && !interactive;
    if checkpointing {
        let interval = tokens(&rm.checkpoint_interval);
        if !interval.is_empty() {
            options.set_string_array("checkpoint:interval", interval);
        }
        let exitat = tokens(&rm.checkpoint_exitat);
        if !exitat.is_empty() {
            options.set_string_array("checkpoint:exitat", exitat);
        }
        options.set_int("checkpoint:asfinal", i32::from(rm.checkpoint_asfinal));
    }

    options.set_int("Ri:Frame", scene.frame_current);

    options.remove("bucket:orderorigin");
    if checkpointing {
        options.set_string("bucket:order", BucketOrder::Horizontal.as_str());
    } else {
        options.set_string("bucket:order", rm.bucket_order.as_str());
        if rm.bucket_order == BucketOrder::Spiral {
            if let Some(origin) = spiral_origin(rm.bucket_spiral, rm.resolution) {
                options.set_float_array("bucket:orderorigin", origin.to_vec());
            }
        }
    }

    if rm.motion_blur {
        let shutter = shutter_window(rm.shutter_angle, rm.shutter_timing);
        options.set_float_array("Ri:Shutter", shutter.to_vec());
    } else {
        options.remove("Ri:Shutter");
    }

    let texture_path = session
        .config
        .texture_search_path
        .as_ref()
        .map(|p| format!(".:{}:@", p.to_string_lossy()))
        .unwrap_or_else(|| ".:@".to_string());
    options.set_string("searchpath:texture", texture_path);
    options.set_string("searchpath:display", ".:@");
}

/// Sampling options. Interactive sessions use their own sample counts and
/// always render incrementally.
pub fn export_hider(graph: &mut SgGraph, scene: &Scene, session: &SessionContext) {
    let rm = &scene.settings;
    let options = graph.options_mut();
    let mut pixel_variance = rm.pixel_variance;

    options.set_int("hider:minsamples", rm.min_samples);
    options.set_int("hider:maxsamples", rm.max_samples);
    options.set_int("hider:incremental", i32::from(rm.incremental));

    if session.config.is_interactive() {
        options.set_int("hider:decidither", rm.decidither);
        options.set_int("hider:minsamples", rm.ipr_min_samples);
        options.set_int("hider:maxsamples", rm.ipr_max_samples);
        options.set_int("hider:incremental", 1);
        pixel_variance = rm.ipr_pixel_variance;
    }
    if (!session.config.external_render && session.config.render_into_host) || rm.enable_checkpoint {
        options.set_int("hider:incremental", 1);
    }
    if rm.sample_motion_blur {
        options.remove("hider:samplemotion");
    } else {
        options.set_int("hider:samplemotion", 0);
    }
    options.set_float("Ri:PixelVariance", pixel_variance);
}

/// Shader from a world node, with a generated handle when it has none.
fn world_shader(session: &mut SessionContext, class: ShaderClass, node: &ShaderNode, fallback: String) -> Shader {
    let handle = if node.name.is_empty() { fallback } else { node.name.clone() };
    let mut shader = Shader::new(class, node.plugin.as_str(), handle);
    convert_shader_params(session, TextureOwner::World, &node.params, &mut shader.params);
    shader
}

pub fn export_integrator(graph: &mut SgGraph, scene: &Scene, session: &mut SessionContext) {
    let shader = match scene.world.integrator.as_ref().filter(|n| n.active) {
        Some(node) => world_shader(session, ShaderClass::Integrator, node, "integrator".to_string()),
        None => Shader::new(ShaderClass::Integrator, DEFAULT_INTEGRATOR, "integrator"),
    };
    log::debug!("integrator: {}", shader.plugin);
    graph.set_integrator(shader);
}

/// Append a combiner referencing every filter when there is more than one.
fn with_combiner(mut filters: Vec<Shader>, class: ShaderClass, plugin: &str, handle: &str) -> Vec<Shader> {
    if filters.len() > 1 {
        let names = filters.iter().map(|f| f.handle.clone()).collect();
        let mut combiner = Shader::new(class, plugin, handle);
        combiner.params.set("filter", ParamValue::ReferenceArray(names));
        filters.push(combiner);
    }
    filters
}

/// Display filters from the world, or a plain background color when the
/// world has no renderer node tree.
pub fn export_display_filters(graph: &mut SgGraph, scene: &Scene, session: &mut SessionContext) {
    let world = &scene.world;
    if !world.use_renderman_node {
        let mut background = Shader::new(
            ShaderClass::DisplayFilter,
            "PxrBackgroundDisplayFilter",
            WORLD_BACKGROUND_FILTER,
        );
        background.params.set_color("backgroundColor", world.color);
        graph.set_display_filters(vec![background]);
        return;
    }

    let filters = world
        .display_filters
        .iter()
        .enumerate()
        .filter(|(_, node)| node.active)
        .map(|(i, node)| {
            world_shader(
                session,
                ShaderClass::DisplayFilter,
                node,
                format!("rman_displayfilter_filter{}", i),
            )
        })
        .collect();
    graph.set_display_filters(with_combiner(
        filters,
        ShaderClass::DisplayFilter,
        "PxrDisplayFilterCombiner",
        "rman_displayfilter_combiner",
    ));
}

/// Holdout shadow filter, world sample filters and a combiner.
pub fn export_sample_filters(graph: &mut SgGraph, scene: &Scene, session: &mut SessionContext) {
    let mut filters = Vec::new();
    let holdout = scene.settings.holdout_matte;
    if holdout != HoldoutMatte::Off && !session.config.is_viewport() {
        let mut shadow = Shader::new(ShaderClass::SampleFilter, "PxrShadowFilter", "rm_PxrShadowFilter_shadows");
        shadow.params.set_string("occludedAov", "occluded");
        shadow.params.set_string("unoccludedAov", "holdoutMatte");
        let shadow_aov = if holdout == HoldoutMatte::Alpha { "a" } else { "holdoutMatte" };
        shadow.params.set_string("shadowAov", shadow_aov);
        filters.push(shadow);
    }

    for (i, node) in scene.world.sample_filters.iter().enumerate() {
        if node.active {
            filters.push(world_shader(
                session,
                ShaderClass::SampleFilter,
                node,
                format!("rman_samplefilter_filter{}", i),
            ));
        }
    }
    graph.set_sample_filters(with_combiner(
        filters,
        ShaderClass::SampleFilter,
        "PxrSampleFilterCombiner",
        "rman_samplefilter_combiner",
    ));
}

/// Channels on the scene and displays on their cameras.
///
/// Displays asking for a camera that was not exported go to the main
/// camera. Other cameras with displays become secondary renderables.
pub fn export_displays(
    graph: &mut SgGraph,
    scene: &Scene,
    session: &SessionContext,
    main_camera: Option<NodeKey>,
    cameras: &BTreeMap<EntityId, NodeKey>,
) -> SgResult<()> {
    let channels = session.displays.channels(scene, &session.config);
    let specs = session.displays.displays(scene, &session.config, &session.strings);

    let mut per_camera: BTreeMap<NodeKey, Vec<Display>> = BTreeMap::new();
    for spec in specs {
        let target = spec
            .camera
            .and_then(|id| cameras.get(&id).copied())
            .or(main_camera);
        let Some(target) = target else {
            log::warn!("display '{}' has no camera to attach to", spec.name);
            continue;
        };
        let mut params = ParamList::new();
        params.set_string("mode", spec.channels.join(","));
        if spec.driver == "openexr" {
            params.set_int("asrgba", 1);
        }
        per_camera.entry(target).or_default().push(Display {
            name: spec.name,
            driver: spec.driver,
            path: spec.path,
            channels: spec.channels,
            params,
        });
    }

    for (camera, displays) in per_camera {
        let dag = graph.expect_node_mut(camera)?;
        if Some(camera) != main_camera {
            dag.renderable = Renderable::Secondary;
        }
        dag.displays = displays;
    }
    graph.set_channels(channels);
    Ok(())
}

/// The fallback distant light, created on first use under `parent`.
/// Shown only when asked for and the scene has no lights of its own.
pub fn export_default_light(
    graph: &mut SgGraph,
    existing: Option<NodeKey>,
    parent: NodeKey,
    visible: bool,
) -> SgResult<NodeKey> {
    let key = match existing.filter(|k| graph.contains(*k)) {
        Some(key) => key,
        None => {
            let key = graph.create_node(NodeKind::AnalyticLight, DEFAULT_LIGHT);
            let dag = graph.expect_node_mut(key)?;
            dag.set_shader(Shader::new(ShaderClass::Light, "PxrDistantLight", "light"));
            dag.orient = Some(Mat4::from_scale(tether_math::Vec3::NEG_ONE));
            key
        }
    };
    graph.add_child(parent, key)?;
    graph.set_hidden(key, !visible);
    Ok(key)
}
