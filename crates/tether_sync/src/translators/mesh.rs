//! Polygon and subdivision meshes.

use tether_core::{MeshData, Object};
use tether_sg::{Detail, NodeKey, NodeKind, ParamValue, PrimvarList, Topology};

use super::{Source, TranslateContext, TranslateError, TranslateResult, Translator};
use crate::handle::{NodeState, RmanSgNode};
use crate::kind::{detect_primitive, PrimitiveKind};
use crate::motion::primvar_times;

const CATMULL_CLARK: &str = "catmull-clark";

pub struct MeshTranslator;

fn mesh_of<'a>(src: Source<'a>) -> TranslateResult<(&'a Object, &'a MeshData)> {
    let ob = src
        .object()
        .ok_or_else(|| TranslateError::malformed("mesh", "source is not an object"))?;
    let mesh = ob
        .data
        .as_mesh()
        .ok_or_else(|| TranslateError::malformed("mesh", format!("{} has no mesh data", ob.name)))?;
    Ok((ob, mesh))
}

fn param_i32(ob: &Object, name: &str, default: i32) -> i32 {
    ob.params.get(name).and_then(|v| v.as_i32()).unwrap_or(default)
}

/// Edge creases as `(v0, v1, sharpness)`. Host weights are 0..1, sharpness
/// grows with their square.
fn subd_creases(mesh: &MeshData) -> Vec<(u32, u32, f32)> {
    mesh.creases
        .iter()
        .filter(|c| c.weight > 0.0)
        .map(|c| (c.v0, c.v1, c.weight * c.weight * 10.0))
        .collect()
}

fn set_subdiv_tags(ob: &Object, mesh: &MeshData, primvars: &mut PrimvarList) {
    let mut tags = vec![
        "interpolateboundary".to_string(),
        "facevaryinginterpolateboundary".to_string(),
    ];
    let mut nargs = vec![1, 0, 0, 1, 0, 0];
    let mut intargs = vec![param_i32(ob, "interp_boundary", 1), param_i32(ob, "face_boundary", 3)];
    let mut floatargs = Vec::new();

    for (v0, v1, sharpness) in subd_creases(mesh) {
        tags.push("crease".to_string());
        nargs.extend([2, 1, 0]);
        intargs.extend([v0 as i32, v1 as i32]);
        floatargs.push(sharpness);
    }

    primvars.set_constant("Ri:subdivtags", ParamValue::StringArray(tags));
    primvars.set_constant("Ri:subdivtagnargs", ParamValue::IntArray(nargs));
    primvars.set_constant("Ri:subdivtagintargs", ParamValue::IntArray(intargs));
    primvars.set_constant("Ri:subdivtagfloatargs", ParamValue::FloatArray(floatargs));
    primvars.set_constant("Ri:subdivtagstringtags", ParamValue::StringArray(Vec::new()));
}

/// Primvars shared by the main mesh and its per-material children.
fn mesh_primvars(ob: &Object, mesh: &MeshData, node: &RmanSgNode, topology: Topology) -> PrimvarList {
    let mut primvars = PrimvarList::new();
    if node.is_deforming && node.motion_steps.len() > 1 {
        primvars.set_times(&primvar_times(&node.motion_steps));
    }

    primvars.set_detail("P", ParamValue::PointArray(mesh.positions.clone()), Detail::Vertex, 0);
    primvars.set(
        "Ri:nvertices",
        ParamValue::IntArray(mesh.face_vertex_counts.iter().map(|c| *c as i32).collect()),
        Detail::Uniform,
    );
    primvars.set(
        "Ri:vertices",
        ParamValue::IntArray(mesh.face_vertex_indices.iter().map(|i| *i as i32).collect()),
        Detail::FaceVarying,
    );

    if let Some(uvs) = &mesh.uvs {
        if uvs.len() == topology.nverts {
            let st: &[f32] = bytemuck::cast_slice(uvs.as_slice());
            primvars.set("st", ParamValue::FloatArray(st.to_vec()), Detail::FaceVarying);
        } else {
            log::warn!(
                "{}: {} uvs for {} face corners, st not exported",
                ob.name,
                uvs.len(),
                topology.nverts
            );
        }
    }

    if node.rman_type == PrimitiveKind::Subdivision {
        set_subdiv_tags(ob, mesh, &mut primvars);
    } else if let Some(normals) = mesh.normals.as_ref().filter(|n| n.len() == topology.npoints) {
        primvars.set("N", ParamValue::NormalArray(normals.clone()), Detail::Vertex);
    }
    primvars
}

fn faces_with_slot(mesh: &MeshData, slot: u32) -> Vec<i32> {
    mesh.material_indices
        .as_deref()
        .unwrap_or_default()
        .iter()
        .enumerate()
        .filter(|(_, s)| **s == slot)
        .map(|(face, _)| face as i32)
        .collect()
}

impl MeshTranslator {
    /// With more than one material slot in use, faces of the first used
    /// slot stay on the main mesh and every other slot gets a child mesh
    /// restricted to its faces. Returns the child meshes.
    fn split_by_material(
        &self,
        ctx: &mut TranslateContext<'_>,
        ob: &Object,
        mesh: &MeshData,
        node: &RmanSgNode,
        base: &PrimvarList,
        topology: Topology,
    ) -> TranslateResult<Vec<(u32, NodeKey)>> {
        let old = node.sub_meshes().to_vec();
        let used = mesh.used_material_indices();
        let multi = ob.material_slots.len() > 1 && used.len() > 1;
        let Some((first, rest)) = used.split_first().filter(|_| multi) else {
            for (_, key) in old {
                ctx.graph.delete_node(key);
            }
            if let Some(dag) = ctx.graph.node_mut(node.sg_node) {
                dag.material = None;
            }
            return Ok(Vec::new());
        };

        let scheme = (node.rman_type == PrimitiveKind::Subdivision).then(|| CATMULL_CLARK.to_string());
        ctx.graph
            .expect_node_mut(node.sg_node)?
            .primvars
            .set_constant("shade:faceset", ParamValue::IntArray(faces_with_slot(mesh, *first)));
        let material = ctx.slot_material_node(ob, *first as usize);
        ctx.graph.set_material(node.sg_node, material)?;

        let mut subs = Vec::with_capacity(rest.len());
        for slot in rest {
            let existing = old
                .iter()
                .find(|(s, key)| s == slot && ctx.graph.contains(*key))
                .map(|(_, key)| *key);
            let key = match existing {
                Some(key) => key,
                None => {
                    let key = ctx
                        .graph
                        .create_node(NodeKind::Mesh, format!("{}|{}", node.db_name, slot));
                    ctx.graph.add_child(node.sg_node, key)?;
                    key
                }
            };

            let dag = ctx.graph.expect_node_mut(key)?;
            dag.define(topology);
            dag.primvars = base.clone();
            dag.primvars
                .set_constant("shade:faceset", ParamValue::IntArray(faces_with_slot(mesh, *slot)));
            dag.scheme = scheme.clone();
            let material = ctx.slot_material_node(ob, *slot as usize);
            ctx.graph.set_material(key, material)?;
            subs.push((*slot, key));
        }

        for (slot, key) in old {
            if !subs.iter().any(|(s, _)| *s == slot) {
                ctx.graph.delete_node(key);
            }
        }
        Ok(subs)
    }
}

impl Translator for MeshTranslator {
    fn export(
        &self,
        ctx: &mut TranslateContext<'_>,
        src: Source<'_>,
        db_name: &str,
    ) -> TranslateResult<Option<RmanSgNode>> {
        let (ob, mesh) = mesh_of(src)?;
        if mesh.is_empty() {
            log::debug!("{}: empty mesh, nothing to export", ob.name);
            return Ok(None);
        }
        let kind = match detect_primitive(ob) {
            PrimitiveKind::Subdivision => PrimitiveKind::Subdivision,
            _ => PrimitiveKind::Mesh,
        };
        let key = ctx.graph.create_node(NodeKind::Mesh, db_name);
        Ok(Some(RmanSgNode::new(db_name, kind, ob.id, key)))
    }

    fn update(&self, ctx: &mut TranslateContext<'_>, src: Source<'_>, node: &mut RmanSgNode) -> TranslateResult<()> {
        let (ob, mesh) = mesh_of(src)?;
        if !mesh.is_valid() {
            return Err(TranslateError::malformed(
                "mesh",
                format!("{}: face vertex indices do not match the face counts", ob.name),
            ));
        }

        let topology = Topology {
            npolys: mesh.face_count(),
            npoints: mesh.vertex_count(),
            nverts: mesh.corner_count(),
        };
        let is_subdiv = node.rman_type == PrimitiveKind::Subdivision;
        let primvars = mesh_primvars(ob, mesh, node, topology);

        let dag = ctx.graph.expect_node_mut(node.sg_node)?;
        dag.define(topology);
        dag.primvars = primvars.clone();
        dag.scheme = is_subdiv.then(|| CATMULL_CLARK.to_string());

        let sub_meshes = self.split_by_material(ctx, ob, mesh, node, &primvars, topology)?;
        node.state = NodeState::Mesh {
            npoints: topology.npoints,
            npolys: topology.npolys,
            nverts: topology.nverts,
            is_subdiv,
            sub_meshes,
        };
        Ok(())
    }

    fn export_deform_sample(
        &self,
        ctx: &mut TranslateContext<'_>,
        src: Source<'_>,
        node: &mut RmanSgNode,
        sample: usize,
    ) -> TranslateResult<()> {
        let (ob, mesh) = mesh_of(src)?;
        let NodeState::Mesh { npoints, .. } = node.state else {
            return Ok(());
        };

        let mut keys = vec![node.sg_node];
        keys.extend(node.sub_meshes().iter().map(|(_, key)| *key));

        if mesh.vertex_count() != npoints {
            log::warn!(
                "{}: point count changed within the shutter ({} -> {}), deformation blur disabled",
                ob.name,
                npoints,
                mesh.vertex_count()
            );
            for key in keys {
                if let Some(dag) = ctx.graph.node_mut(key) {
                    dag.primvars.set_times(&[]);
                }
            }
            node.clear_motion();
            return Ok(());
        }

        for key in keys {
            ctx.graph.expect_node_mut(key)?.primvars.set_detail(
                "P",
                ParamValue::PointArray(mesh.positions.clone()),
                Detail::Vertex,
                sample,
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TranslateFixture as Fixture;
    use crate::translators::translator;
    use tether_core::{EdgeCrease, EntityId, Material, Modifier, ObjectData, ObjectType, Scene};
    use tether_math::{Subframe, Vec3};

    fn cube(id: u64) -> Object {
        Object::new(EntityId(id), "Cube", ObjectType::Mesh, ObjectData::Mesh(MeshData::cube()))
    }

    fn export(fx: &mut Fixture, ob: &Object) -> RmanSgNode {
        let kind = detect_primitive(ob);
        let mut ctx = fx.ctx();
        let mut node = translator(kind)
            .export(&mut ctx, Source::Object(ob), "Cube_1-MESH")
            .unwrap()
            .unwrap();
        translator(kind).update(&mut ctx, Source::Object(ob), &mut node).unwrap();
        node
    }

    #[test]
    fn test_polygon_mesh() {
        let ob = cube(1);
        let mut fx = Fixture::new(Scene::new("s"));
        let node = export(&mut fx, &ob);
        let dag = fx.graph.node(node.sg_node).unwrap();
        assert_eq!(
            dag.topology,
            Some(Topology {
                npolys: 6,
                npoints: 8,
                nverts: 24
            })
        );
        assert_eq!(dag.scheme, None);
        assert_eq!(dag.primvars.sample_count("P"), 1);
        assert!(dag.primvars.get("Ri:subdivtags").is_none());
    }

    #[test]
    fn test_subdivision_scheme_and_creases() {
        let mut ob = cube(1);
        ob.modifiers.push(Modifier::Subsurf { levels: 2 });
        if let ObjectData::Mesh(mesh) = &mut ob.data {
            mesh.creases.push(EdgeCrease { v0: 0, v1: 1, weight: 0.5 });
            mesh.creases.push(EdgeCrease { v0: 1, v1: 2, weight: 0.0 });
        }
        let mut fx = Fixture::new(Scene::new("s"));
        let node = export(&mut fx, &ob);
        assert_eq!(node.rman_type, PrimitiveKind::Subdivision);

        let dag = fx.graph.node(node.sg_node).unwrap();
        assert_eq!(dag.scheme.as_deref(), Some(CATMULL_CLARK));
        assert_eq!(
            dag.primvars.value("Ri:subdivtagnargs"),
            Some(&ParamValue::IntArray(vec![1, 0, 0, 1, 0, 0, 2, 1, 0]))
        );
        assert_eq!(
            dag.primvars.value("Ri:subdivtagfloatargs"),
            Some(&ParamValue::FloatArray(vec![2.5]))
        );
        assert!(dag.primvars.get("N").is_none());
    }

    #[test]
    fn test_empty_mesh_skipped() {
        let ob = Object::new(EntityId(1), "Empty", ObjectType::Mesh, ObjectData::Mesh(MeshData::default()));
        let mut fx = Fixture::new(Scene::new("s"));
        let mut ctx = fx.ctx();
        let node = MeshTranslator.export(&mut ctx, Source::Object(&ob), "x").unwrap();
        assert!(node.is_none());
        assert_eq!(fx.graph.len(), 1);
    }

    #[test]
    fn test_invalid_mesh_is_an_error() {
        let mut ob = cube(1);
        if let ObjectData::Mesh(mesh) = &mut ob.data {
            mesh.face_vertex_indices[0] = 99;
        }
        let mut fx = Fixture::new(Scene::new("s"));
        let mut ctx = fx.ctx();
        let mut node = MeshTranslator.export(&mut ctx, Source::Object(&ob), "x").unwrap().unwrap();
        assert!(matches!(
            MeshTranslator.update(&mut ctx, Source::Object(&ob), &mut node),
            Err(TranslateError::Malformed { what: "mesh", .. })
        ));
    }

    #[test]
    fn test_multi_material_split() {
        let mut scene = Scene::new("s");
        let red = scene.add_material(Material::new(EntityId(10), "Red"));
        let blue = scene.add_material(Material::new(EntityId(11), "Blue"));
        let mut ob = cube(1);
        ob.material_slots = vec![Some(red), Some(blue)];
        if let ObjectData::Mesh(mesh) = &mut ob.data {
            mesh.material_indices = Some(vec![0, 0, 1, 1, 0, 1]);
        }

        let mut fx = Fixture::new(scene);
        for id in [red, blue] {
            let key = fx.graph.create_node(NodeKind::Material, format!("m{}", id));
            fx.materials
                .insert(id, RmanSgNode::new(format!("m{}", id), PrimitiveKind::Material, id, key));
        }
        let node = export(&mut fx, &ob);

        let subs = node.sub_meshes().to_vec();
        assert_eq!(subs.len(), 1);
        let (slot, sub) = subs[0];
        assert_eq!(slot, 1);

        let main = fx.graph.node(node.sg_node).unwrap();
        assert_eq!(main.material, Some(fx.materials[&red].sg_node));
        assert_eq!(
            main.primvars.value("shade:faceset"),
            Some(&ParamValue::IntArray(vec![0, 1, 4]))
        );
        assert!(main.children.contains(&sub));

        let sub_dag = fx.graph.node(sub).unwrap();
        assert_eq!(sub_dag.material, Some(fx.materials[&blue].sg_node));
        assert_eq!(
            sub_dag.primvars.value("shade:faceset"),
            Some(&ParamValue::IntArray(vec![2, 3, 5]))
        );

        // Back to one slot: the child goes away.
        let mut single = ob.clone();
        if let ObjectData::Mesh(mesh) = &mut single.data {
            mesh.material_indices = Some(vec![0; 6]);
        }
        let mut node = node;
        let mut ctx = fx.ctx();
        MeshTranslator.update(&mut ctx, Source::Object(&single), &mut node).unwrap();
        assert!(node.sub_meshes().is_empty());
        assert!(!fx.graph.contains(sub));
        assert_eq!(fx.graph.node(node.sg_node).unwrap().material, None);
    }

    #[test]
    fn test_update_is_idempotent() {
        let mut ob = cube(1);
        ob.modifiers.push(Modifier::Subsurf { levels: 2 });
        if let ObjectData::Mesh(mesh) = &mut ob.data {
            mesh.creases.push(EdgeCrease { v0: 0, v1: 1, weight: 0.5 });
        }
        let mut fx = Fixture::new(Scene::new("s"));
        let mut node = export(&mut fx, &ob);
        let once: Vec<_> = fx.graph.nodes().map(|(key, dag)| (key, dag.clone())).collect();
        let state = node.clone();

        let mut ctx = fx.ctx();
        translator(node.rman_type)
            .update(&mut ctx, Source::Object(&ob), &mut node)
            .unwrap();
        let twice: Vec<_> = fx.graph.nodes().map(|(key, dag)| (key, dag.clone())).collect();
        assert_eq!(once, twice);
        assert_eq!(state, node);
    }

    #[test]
    fn test_deform_samples_and_topology_change() {
        let ob = cube(1);
        let mut fx = Fixture::new(Scene::new("s"));
        let mut ctx = fx.ctx();
        let mut node = MeshTranslator.export(&mut ctx, Source::Object(&ob), "x").unwrap().unwrap();
        node.is_deforming = true;
        node.motion_steps = vec![Subframe::new(-0.25), Subframe::new(0.25)];
        MeshTranslator.update(&mut ctx, Source::Object(&ob), &mut node).unwrap();

        let mut moved = ob.clone();
        if let ObjectData::Mesh(mesh) = &mut moved.data {
            for p in &mut mesh.positions {
                *p += Vec3::X;
            }
        }
        MeshTranslator
            .export_deform_sample(&mut ctx, Source::Object(&moved), &mut node, 1)
            .unwrap();
        let dag = fx.graph.node(node.sg_node).unwrap();
        assert_eq!(dag.primvars.times(), &[0.0, 0.5]);
        assert_eq!(dag.primvars.sample_count("P"), 2);

        let mut grown = ob.clone();
        if let ObjectData::Mesh(mesh) = &mut grown.data {
            mesh.positions.push(Vec3::ZERO);
        }
        let mut ctx = fx.ctx();
        MeshTranslator
            .export_deform_sample(&mut ctx, Source::Object(&grown), &mut node, 1)
            .unwrap();
        assert!(!node.is_deforming);
        assert!(node.motion_steps.is_empty());
        let dag = fx.graph.node(node.sg_node).unwrap();
        assert!(dag.primvars.times().is_empty());
        assert_eq!(dag.primvars.sample_count("P"), 1);
    }
}
