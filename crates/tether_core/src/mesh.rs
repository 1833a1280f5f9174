//! Polygon mesh data as the host evaluates it.
//!
//! Faces are stored the way the renderer wants them: a per-face vertex
//! count array plus a flat vertex index array. Triangles, quads and
//! n-gons can be mixed freely.

use serde::{Deserialize, Serialize};
use tether_math::Vec3;

/// A weighted crease on one edge, used by subdivision meshes.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EdgeCrease {
    pub v0: u32,
    pub v1: u32,
    pub weight: f32,
}

/// Evaluated polygon mesh.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshData {
    /// Vertex positions in object space
    pub positions: Vec<Vec3>,

    /// Number of vertices for each face
    pub face_vertex_counts: Vec<u32>,

    /// Flat vertex indices, `sum(face_vertex_counts)` long
    pub face_vertex_indices: Vec<u32>,

    /// Per-vertex normals (optional - computed on demand)
    pub normals: Option<Vec<Vec3>>,

    /// Face-varying UVs, one per face corner
    pub uvs: Option<Vec<[f32; 2]>>,

    /// Material slot index per face
    pub material_indices: Option<Vec<u32>>,

    /// Edge creases for subdivision
    pub creases: Vec<EdgeCrease>,

    /// Whether the mesh is smooth shaded
    pub smooth: bool,
}

impl MeshData {
    /// Create a mesh from positions and per-face index lists.
    pub fn from_faces(positions: Vec<Vec3>, faces: &[&[u32]]) -> Self {
        let face_vertex_counts = faces.iter().map(|f| f.len() as u32).collect();
        let face_vertex_indices = faces.iter().flat_map(|f| f.iter().copied()).collect();
        Self {
            positions,
            face_vertex_counts,
            face_vertex_indices,
            ..Default::default()
        }
    }

    /// Unit quad in the XY plane, handy for tests and demos.
    pub fn quad() -> Self {
        Self::from_faces(
            vec![
                Vec3::new(-0.5, -0.5, 0.0),
                Vec3::new(0.5, -0.5, 0.0),
                Vec3::new(0.5, 0.5, 0.0),
                Vec3::new(-0.5, 0.5, 0.0),
            ],
            &[&[0, 1, 2, 3]],
        )
    }

    /// Axis-aligned unit cube made of six quads.
    pub fn cube() -> Self {
        let p = |x: f32, y: f32, z: f32| Vec3::new(x, y, z) * 0.5;
        Self::from_faces(
            vec![
                p(-1.0, -1.0, -1.0),
                p(1.0, -1.0, -1.0),
                p(1.0, 1.0, -1.0),
                p(-1.0, 1.0, -1.0),
                p(-1.0, -1.0, 1.0),
                p(1.0, -1.0, 1.0),
                p(1.0, 1.0, 1.0),
                p(-1.0, 1.0, 1.0),
            ],
            &[
                &[0, 3, 2, 1],
                &[4, 5, 6, 7],
                &[0, 1, 5, 4],
                &[2, 3, 7, 6],
                &[1, 2, 6, 5],
                &[0, 4, 7, 3],
            ],
        )
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn face_count(&self) -> usize {
        self.face_vertex_counts.len()
    }

    /// Total number of face corners.
    pub fn corner_count(&self) -> usize {
        self.face_vertex_indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty() || self.face_vertex_counts.is_empty()
    }

    /// Iterate faces as slices into the index array.
    pub fn faces(&self) -> impl Iterator<Item = &[u32]> + '_ {
        let mut start = 0usize;
        self.face_vertex_counts.iter().map(move |&n| {
            let end = (start + n as usize).min(self.face_vertex_indices.len());
            let face = &self.face_vertex_indices[start.min(end)..end];
            start = end;
            face
        })
    }

    /// Check that counts and indices agree and every index is in range.
    pub fn is_valid(&self) -> bool {
        let expected: usize = self.face_vertex_counts.iter().map(|&n| n as usize).sum();
        expected == self.face_vertex_indices.len()
            && self
                .face_vertex_indices
                .iter()
                .all(|&i| (i as usize) < self.positions.len())
    }

    /// Compute smooth vertex normals by averaging face normals.
    ///
    /// Each face is fanned from its first vertex; the fan triangle normals
    /// are accumulated at every vertex the face touches.
    pub fn compute_normals(&mut self) {
        let vertex_count = self.positions.len();
        let mut normals = vec![Vec3::ZERO; vertex_count];

        for face in self.faces() {
            if face.len() < 3 || face.iter().any(|&i| i as usize >= vertex_count) {
                continue;
            }

            let p0 = self.positions[face[0] as usize];
            let mut face_normal = Vec3::ZERO;
            for pair in face[1..].windows(2) {
                let p1 = self.positions[pair[0] as usize];
                let p2 = self.positions[pair[1] as usize];
                face_normal += (p1 - p0).cross(p2 - p0);
            }

            for &i in face {
                normals[i as usize] += face_normal;
            }
        }

        for normal in &mut normals {
            let len = normal.length();
            if len > 0.0 {
                *normal /= len;
            } else {
                *normal = Vec3::Z; // Default up normal for degenerate cases
            }
        }

        self.normals = Some(normals);
    }

    /// Ensure the mesh has normals, computing them if necessary.
    pub fn ensure_normals(&mut self) {
        let should_compute = match &self.normals {
            None => true,
            Some(normals) => normals.len() != self.positions.len(),
        };
        if should_compute {
            self.compute_normals();
        }
    }

    /// Distinct material slot indices used by the faces, in ascending order.
    pub fn used_material_indices(&self) -> Vec<u32> {
        let mut used: Vec<u32> = self.material_indices.clone().unwrap_or_default();
        used.sort_unstable();
        used.dedup();
        used
    }
}
