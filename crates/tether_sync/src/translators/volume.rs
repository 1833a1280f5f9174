//! Volumes: OpenVDB files and plain density boxes.

use tether_core::{Object, ObjectData, PrimitiveOverride};
use tether_math::Vec3;
use tether_sg::{Detail, NodeKind, ParamValue, Topology};

use super::{Source, TranslateContext, TranslateError, TranslateResult, Translator};
use crate::handle::RmanSgNode;
use crate::kind::PrimitiveKind;
use crate::string_expr::is_frame_sensitive;

const OPENVDB_PLUGIN: &str = "blobbydso:impl_openvdb";

pub struct VolumeTranslator;

/// Unexpanded VDB path, if this volume reads one.
fn vdb_path(ob: &Object) -> Option<&str> {
    let path = match &ob.data {
        ObjectData::Volume(volume) if !volume.filepath.is_empty() => Some(volume.filepath.as_str()),
        _ => None,
    };
    path.or_else(|| {
        matches!(ob.primitive, PrimitiveOverride::OpenVdb)
            .then(|| ob.params.get("path_archive").and_then(|v| v.as_str()))
            .flatten()
            .filter(|p| !p.is_empty())
    })
}

/// Object-space bounds as `[xmin, xmax, ymin, ymax, zmin, zmax]`.
fn bounds(ob: &Object) -> Vec<f32> {
    let points: &[Vec3] = match &ob.data {
        ObjectData::Mesh(mesh) => &mesh.positions,
        ObjectData::Points(points) => &points.positions,
        _ => &[],
    };
    if points.is_empty() {
        return vec![-1.0, 1.0, -1.0, 1.0, -1.0, 1.0];
    }
    let (min, max) = points
        .iter()
        .fold((Vec3::splat(f32::MAX), Vec3::splat(f32::MIN)), |(lo, hi), p| (lo.min(*p), hi.max(*p)));
    vec![min.x, max.x, min.y, max.y, min.z, max.z]
}

impl Translator for VolumeTranslator {
    fn export(
        &self,
        ctx: &mut TranslateContext<'_>,
        src: Source<'_>,
        db_name: &str,
    ) -> TranslateResult<Option<RmanSgNode>> {
        let ob = src
            .object()
            .ok_or_else(|| TranslateError::malformed("volume", "source is not an object"))?;
        let wants_file = matches!(ob.primitive, PrimitiveOverride::OpenVdb) || matches!(ob.data, ObjectData::Volume(_));
        if wants_file && vdb_path(ob).is_none() {
            log::warn!("{}: volume without a file path, skipped", ob.name);
            return Ok(None);
        }
        let key = ctx.graph.create_node(NodeKind::Volume, db_name);
        Ok(Some(RmanSgNode::new(db_name, PrimitiveKind::Volume, ob.id, key)))
    }

    fn update(&self, ctx: &mut TranslateContext<'_>, src: Source<'_>, node: &mut RmanSgNode) -> TranslateResult<()> {
        let ob = src
            .object()
            .ok_or_else(|| TranslateError::malformed("volume", "source is not an object"))?;
        let bound = bounds(ob);

        match vdb_path(ob) {
            Some(path) => {
                let expanded = ctx.session.strings.expand(path);
                node.is_frame_sensitive = is_frame_sensitive(path);
                let density = match &ob.data {
                    ObjectData::Volume(volume) if !volume.density_grid.is_empty() => volume.density_grid.clone(),
                    _ => "density".to_string(),
                };
                let grids = match &ob.data {
                    ObjectData::Volume(volume) => volume.grids.clone(),
                    _ => Vec::new(),
                };

                let dag = ctx.graph.expect_node_mut(node.sg_node)?;
                dag.define(Topology::default());
                dag.primvars.clear();
                dag.primvars
                    .set_constant("Ri:type", ParamValue::String(OPENVDB_PLUGIN.to_string()));
                dag.primvars.set_constant("Ri:Bound", ParamValue::FloatArray(bound));
                dag.primvars.set_constant(
                    "blobbydso:stringargs",
                    ParamValue::StringArray(vec![expanded, format!("{}:fogvolume", density)]),
                );
                for grid in grids {
                    dag.primvars.set(grid, ParamValue::FloatArray(Vec::new()), Detail::Varying);
                }
            }
            None => {
                node.is_frame_sensitive = false;
                let dag = ctx.graph.expect_node_mut(node.sg_node)?;
                dag.define(Topology::default());
                dag.primvars.clear();
                dag.primvars
                    .set_constant("Ri:type", ParamValue::String("box".to_string()));
                dag.primvars.set_constant("Ri:Bound", ParamValue::FloatArray(bound));
                dag.primvars
                    .set("density", ParamValue::FloatArray(Vec::new()), Detail::Varying);
            }
        }
        Ok(())
    }
}
