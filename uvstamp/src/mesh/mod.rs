//! Growable row-columnar polygon mesh storage
//!
//! A [`Mesh`] stores faces as offsets into a flat corner list; each corner
//! names a vertex (and, once edges are built, an edge).  Every domain owns an
//! [`AttribArray`](attrib::AttribArray) whose columns grow in lockstep with
//! it.
//!
//! Mapping treats input and map meshes as read-only; the output mesh is the
//! only one that grows.

pub mod attrib;

use crate::Error;
use attrib::{
    Attrib, AttribArray, AttribData, AttribOrigin, ATTRIB_MATERIAL,
    ATTRIB_NORMAL, ATTRIB_POSITION, ATTRIB_TANGENT, ATTRIB_TSIGN, ATTRIB_UV,
};
use nalgebra::{Vector2, Vector3};

/// One face's span within a mesh's corner list
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct FaceRange {
    /// First corner index
    pub start: usize,
    /// One past the last corner index
    pub end: usize,
    /// Index of the face itself
    pub idx: usize,
}

impl FaceRange {
    /// Number of corners in the face
    pub fn size(&self) -> usize {
        self.end - self.start
    }

    /// Next corner index within the face, wrapping
    pub fn next_corner(&self, corner: usize) -> usize {
        (corner + 1) % self.size()
    }

    /// Previous corner index within the face, wrapping
    pub fn prev_corner(&self, corner: usize) -> usize {
        if corner == 0 {
            self.size() - 1
        } else {
            corner - 1
        }
    }
}

/// Cached column indices for the well-known attributes
///
/// This is an alias cache over the attribute arrays, not a separate store;
/// [`Mesh::refresh_active`] rebuilds it after columns change.
#[derive(Copy, Clone, Debug, Default)]
struct ActiveSet {
    position: Option<usize>,
    uv: Option<usize>,
    corner_normal: Option<usize>,
    vert_normal: Option<usize>,
    tangent: Option<usize>,
    tsign: Option<usize>,
    material: Option<usize>,
}

/// A dynamic polygon mesh with typed attribute columns
#[derive(Clone, Debug, Default)]
pub struct Mesh {
    /// Per-face start offset into `corners`
    faces: Vec<u32>,
    /// Per-corner vertex index
    corners: Vec<u32>,
    /// Per-corner edge index; empty until [`Mesh::build_edges`] runs
    corner_edges: Vec<u32>,
    edge_count: usize,
    vert_count: usize,
    /// Per-face attribute columns
    pub face_attribs: AttribArray,
    /// Per-corner attribute columns
    pub corner_attribs: AttribArray,
    /// Per-edge attribute columns
    pub edge_attribs: AttribArray,
    /// Per-vertex attribute columns
    pub vert_attribs: AttribArray,
    active: ActiveSet,
}

impl Mesh {
    /// Builds an empty mesh
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a mesh from face sizes, corner vertex indices, vertex
    /// positions, and per-corner UVs
    ///
    /// This is the usual construction path for hosts and tests; further
    /// attribute columns can be added afterwards.
    pub fn from_buffers(
        face_sizes: &[usize],
        corner_verts: &[u32],
        positions: &[Vector3<f32>],
        uvs: &[Vector2<f32>],
    ) -> Result<Self, Error> {
        let total: usize = face_sizes.iter().sum();
        if total != corner_verts.len() {
            return Err(Error::InvalidMesh("face sizes do not sum to corner count"));
        }
        let mut mesh = Self::new();
        let mut offset = 0u32;
        for &sz in face_sizes {
            mesh.faces.push(offset);
            offset += sz as u32;
        }
        mesh.corners = corner_verts.to_vec();
        mesh.vert_count = positions.len();
        mesh.vert_attribs.insert(Attrib {
            name: ATTRIB_POSITION.to_owned(),
            data: AttribData::V3F32(positions.to_vec()),
            origin: AttribOrigin::MeshIn,
            interpolate: true,
        });
        if !uvs.is_empty() {
            if uvs.len() != corner_verts.len() {
                return Err(Error::InvalidMesh("uv count does not match corner count"));
            }
            mesh.corner_attribs.insert(Attrib {
                name: ATTRIB_UV.to_owned(),
                data: AttribData::V2F32(uvs.to_vec()),
                origin: AttribOrigin::MeshIn,
                interpolate: true,
            });
        }
        mesh.face_attribs.resize(mesh.faces.len());
        mesh.corner_attribs.resize(mesh.corners.len());
        mesh.refresh_active();
        mesh.validate()?;
        Ok(mesh)
    }

    /// Number of faces
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// Number of corners
    pub fn corner_count(&self) -> usize {
        self.corners.len()
    }

    /// Number of edges (0 until [`Mesh::build_edges`])
    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    /// Number of vertices
    pub fn vert_count(&self) -> usize {
        self.vert_count
    }

    /// Returns the corner span of the given face
    pub fn face_range(&self, face: usize) -> FaceRange {
        let start = self.faces[face] as usize;
        let end = self
            .faces
            .get(face + 1)
            .map(|&v| v as usize)
            .unwrap_or(self.corners.len());
        FaceRange {
            start,
            end,
            idx: face,
        }
    }

    /// Vertex index of a corner, addressed as (face, corner-within-face)
    pub fn corner_vert(&self, face: usize, corner: usize) -> u32 {
        let r = self.face_range(face);
        debug_assert!(corner < r.size());
        self.corners[r.start + corner]
    }

    /// Edge index of a corner (the edge from this corner to the next)
    ///
    /// # Panics
    /// If edges have not been built.
    pub fn corner_edge(&self, face: usize, corner: usize) -> u32 {
        let r = self.face_range(face);
        debug_assert!(corner < r.size());
        self.corner_edges[r.start + corner]
    }

    /// Whether per-corner edge indices are available
    pub fn has_edges(&self) -> bool {
        !self.corner_edges.is_empty()
    }

    /// Raw corner vertex indices
    pub fn corner_verts(&self) -> &[u32] {
        &self.corners
    }

    /// Rebuilds the active-attribute alias cache
    pub fn refresh_active(&mut self) {
        self.active = ActiveSet {
            position: self.vert_attribs.find(ATTRIB_POSITION),
            uv: self.corner_attribs.find(ATTRIB_UV),
            corner_normal: self.corner_attribs.find(ATTRIB_NORMAL),
            vert_normal: self.vert_attribs.find(ATTRIB_NORMAL),
            tangent: self.corner_attribs.find(ATTRIB_TANGENT),
            tsign: self.corner_attribs.find(ATTRIB_TSIGN),
            material: self.face_attribs.find(ATTRIB_MATERIAL),
        };
    }

    /// Vertex positions, if the position column exists
    pub fn positions(&self) -> Option<&[Vector3<f32>]> {
        let i = self.active.position?;
        match &self.vert_attribs.at(i).data {
            AttribData::V3F32(v) => Some(v),
            _ => None,
        }
    }

    /// Mutable vertex positions
    pub fn positions_mut(&mut self) -> Option<&mut [Vector3<f32>]> {
        let i = self.active.position?;
        match &mut self.vert_attribs.at_mut(i).data {
            AttribData::V3F32(v) => Some(v),
            _ => None,
        }
    }

    /// Per-corner UVs, if the uv column exists
    pub fn uvs(&self) -> Option<&[Vector2<f32>]> {
        let i = self.active.uv?;
        match &self.corner_attribs.at(i).data {
            AttribData::V2F32(v) => Some(v),
            _ => None,
        }
    }

    /// Per-corner normals, if present
    pub fn corner_normals(&self) -> Option<&[Vector3<f32>]> {
        let i = self.active.corner_normal?;
        match &self.corner_attribs.at(i).data {
            AttribData::V3F32(v) => Some(v),
            _ => None,
        }
    }

    /// Per-vertex normals, if present
    pub fn vert_normals(&self) -> Option<&[Vector3<f32>]> {
        let i = self.active.vert_normal?;
        match &self.vert_attribs.at(i).data {
            AttribData::V3F32(v) => Some(v),
            _ => None,
        }
    }

    /// Per-face material indices, if present
    pub fn materials(&self) -> Option<&[i32]> {
        let i = self.active.material?;
        match &self.face_attribs.at(i).data {
            AttribData::I32(v) => Some(v),
            _ => None,
        }
    }

    /// Position of the vertex at the given face corner
    pub fn corner_pos(&self, face: usize, corner: usize) -> Vector3<f32> {
        let v = self.corner_vert(face, corner) as usize;
        self.positions().expect("mesh has no position column")[v]
    }

    /// UV of the given face corner
    pub fn corner_uv(&self, face: usize, corner: usize) -> Vector2<f32> {
        let r = self.face_range(face);
        self.uvs().expect("mesh has no uv column")[r.start + corner]
    }

    /// Appends a vertex, growing every vertex column, and returns its index
    pub fn add_vert(&mut self) -> u32 {
        let idx = self.vert_count as u32;
        self.vert_count += 1;
        self.vert_attribs.push_defaults();
        idx
    }

    /// Begins a new face, growing every face column, and returns its index
    ///
    /// Corners appended afterwards belong to this face until the next
    /// `add_face` call.
    pub fn add_face(&mut self) -> u32 {
        let idx = self.faces.len() as u32;
        self.faces.push(self.corners.len() as u32);
        self.face_attribs.push_defaults();
        idx
    }

    /// Appends a corner to the face most recently begun
    pub fn add_corner(&mut self, vert: u32) -> u32 {
        debug_assert!(!self.faces.is_empty(), "corner added before any face");
        let idx = self.corners.len() as u32;
        self.corners.push(vert);
        self.corner_attribs.push_defaults();
        idx
    }

    /// Computes per-corner edge indices (unique undirected edges) without
    /// storing them; returns the table and the edge count
    pub fn edge_ids(&self) -> (Vec<u32>, usize) {
        use std::collections::HashMap;
        let mut table: HashMap<(u32, u32), u32> = HashMap::new();
        let mut ids = vec![0; self.corners.len()];
        for face in 0..self.face_count() {
            let r = self.face_range(face);
            for c in 0..r.size() {
                let a = self.corners[r.start + c];
                let b = self.corners[r.start + r.next_corner(c)];
                let key = (a.min(b), a.max(b));
                let next_id = table.len() as u32;
                let id = *table.entry(key).or_insert(next_id);
                ids[r.start + c] = id;
            }
        }
        (ids, table.len())
    }

    /// Builds and stores per-corner edge indices
    ///
    /// Edge attribute columns are resized to the resulting edge count.
    pub fn build_edges(&mut self) {
        let (ids, count) = self.edge_ids();
        self.corner_edges = ids;
        self.edge_count = count;
        self.edge_attribs.resize(self.edge_count);
    }

    /// UV winding of a face: `Some(true)` if flipped (negative area),
    /// `Some(false)` if regular, `None` if degenerate
    pub fn face_uv_wind(&self, face: usize) -> Option<bool> {
        let r = self.face_range(face);
        let uvs = self.uvs()?;
        let mut area = 0.0f32;
        for c in 0..r.size() {
            let a = uvs[r.start + c];
            let b = uvs[r.start + r.next_corner(c)];
            area += a.x * b.y - b.x * a.y;
        }
        if area == 0.0 {
            None
        } else {
            Some(area < 0.0)
        }
    }

    /// Geometric normal of a face (unnormalized cross product of the first
    /// corner's adjacent edges)
    pub fn face_normal(&self, face: usize) -> Vector3<f32> {
        let r = self.face_range(face);
        debug_assert!(r.size() >= 3);
        let a = self.corner_pos(face, 0);
        let b = self.corner_pos(face, 1);
        let c = self.corner_pos(face, r.size() - 1);
        (b - a).cross(&(c - a))
    }

    /// Shading normal at a face corner: corner normals, then vertex normals,
    /// then the geometric face normal
    pub fn shading_normal(&self, face: usize, corner: usize) -> Vector3<f32> {
        let r = self.face_range(face);
        if let Some(ns) = self.corner_normals() {
            return ns[r.start + corner];
        }
        if let Some(ns) = self.vert_normals() {
            return ns[self.corner_vert(face, corner) as usize];
        }
        let n = self.face_normal(face);
        let len = n.norm();
        if len > 0.0 {
            n / len
        } else {
            Vector3::z()
        }
    }

    /// Validates structural invariants
    ///
    /// Checks offset monotonicity, corner index bounds, minimum face size,
    /// and attribute column lengths.
    pub fn validate(&self) -> Result<(), Error> {
        if self.faces.is_empty() {
            return Err(Error::EmptyMesh);
        }
        let mut prev = 0usize;
        for face in 0..self.face_count() {
            let r = self.face_range(face);
            if r.start < prev || r.end < r.start || r.end > self.corners.len() {
                return Err(Error::InvalidMesh("face offsets are not monotonic"));
            }
            if r.size() < 3 {
                return Err(Error::InvalidMesh("face has fewer than 3 corners"));
            }
            prev = r.start;
        }
        for &v in &self.corners {
            if v as usize >= self.vert_count {
                return Err(Error::InvalidMesh("corner vertex index out of bounds"));
            }
        }
        if !self.corner_edges.is_empty() {
            if self.corner_edges.len() != self.corners.len() {
                return Err(Error::InvalidMesh("corner edge table length mismatch"));
            }
            for &e in &self.corner_edges {
                if e as usize >= self.edge_count {
                    return Err(Error::InvalidMesh("corner edge index out of bounds"));
                }
            }
        }
        self.face_attribs.validate(self.face_count())?;
        self.corner_attribs.validate(self.corner_count())?;
        self.edge_attribs.validate(self.edge_count)?;
        self.vert_attribs.validate(self.vert_count)?;
        Ok(())
    }

    /// Shrinks all backing storage to fit
    pub fn shrink_to_fit(&mut self) {
        self.faces.shrink_to_fit();
        self.corners.shrink_to_fit();
        self.corner_edges.shrink_to_fit();
        self.face_attribs.shrink_to_fit();
        self.corner_attribs.shrink_to_fit();
        self.edge_attribs.shrink_to_fit();
        self.vert_attribs.shrink_to_fit();
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn quad() -> Mesh {
        Mesh::from_buffers(
            &[4],
            &[0, 1, 2, 3],
            &[
                Vector3::new(0.0, 0.0, 0.0),
                Vector3::new(1.0, 0.0, 0.0),
                Vector3::new(1.0, 1.0, 0.0),
                Vector3::new(0.0, 1.0, 0.0),
            ],
            &[
                Vector2::new(0.0, 0.0),
                Vector2::new(1.0, 0.0),
                Vector2::new(1.0, 1.0),
                Vector2::new(0.0, 1.0),
            ],
        )
        .unwrap()
    }

    #[test]
    fn face_ranges_and_corners() {
        let m = quad();
        let r = m.face_range(0);
        assert_eq!((r.start, r.end), (0, 4));
        assert_eq!(m.corner_vert(0, 2), 2);
        assert_eq!(r.next_corner(3), 0);
        assert_eq!(r.prev_corner(0), 3);
    }

    #[test]
    fn build_edges_dedups() {
        let mut m = Mesh::from_buffers(
            &[3, 3],
            &[0, 1, 2, 2, 1, 3],
            &[
                Vector3::zeros(),
                Vector3::x(),
                Vector3::y(),
                Vector3::new(1.0, 1.0, 0.0),
            ],
            &[
                Vector2::new(0.0, 0.0),
                Vector2::new(1.0, 0.0),
                Vector2::new(0.0, 1.0),
                Vector2::new(0.0, 1.0),
                Vector2::new(1.0, 0.0),
                Vector2::new(1.0, 1.0),
            ],
        )
        .unwrap();
        m.build_edges();
        // 2 triangles sharing one edge: 5 unique edges
        assert_eq!(m.edge_count(), 5);
        // the shared edge (1,2) gets the same id from both faces
        assert_eq!(m.corner_edge(0, 1), m.corner_edge(1, 1));
    }

    #[test]
    fn growth_keeps_attribs_in_lockstep() {
        let mut m = quad();
        m.add_face();
        let v = m.add_vert();
        m.add_corner(v);
        m.add_corner(0);
        m.add_corner(1);
        assert_eq!(m.face_count(), 2);
        assert_eq!(m.corner_count(), 7);
        assert_eq!(m.vert_count(), 5);
        assert_eq!(m.uvs().unwrap().len(), 7);
        assert_eq!(m.positions().unwrap().len(), 5);
    }

    #[test]
    fn wind_detects_flip_and_degenerate() {
        let m = quad();
        assert_eq!(m.face_uv_wind(0), Some(false));

        let flipped = Mesh::from_buffers(
            &[3],
            &[0, 1, 2],
            &[Vector3::zeros(), Vector3::x(), Vector3::y()],
            &[
                Vector2::new(0.0, 0.0),
                Vector2::new(0.0, 1.0),
                Vector2::new(1.0, 0.0),
            ],
        )
        .unwrap();
        assert_eq!(flipped.face_uv_wind(0), Some(true));

        let degen = Mesh::from_buffers(
            &[3],
            &[0, 1, 2],
            &[Vector3::zeros(), Vector3::x(), Vector3::y()],
            &[
                Vector2::new(0.0, 0.0),
                Vector2::new(0.5, 0.0),
                Vector2::new(1.0, 0.0),
            ],
        )
        .unwrap();
        assert_eq!(degen.face_uv_wind(0), None);
    }

    #[test]
    fn validate_rejects_bad_indices() {
        let m = Mesh::from_buffers(
            &[3],
            &[0, 1, 7],
            &[Vector3::zeros(), Vector3::x(), Vector3::y()],
            &[],
        );
        assert!(m.is_err());
    }
}
