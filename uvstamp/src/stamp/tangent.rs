//! Tangent-space generation over connectivity-closed face groups
//!
//! Tangent generation itself is an external, callback-driven algorithm
//! (MikkTSpace-style); this module only prepares its inputs.  Input faces
//! are grouped into *T-pieces* — sets transitively connected through shared
//! merged output vertices — so each group can be handed to the generator
//! independently and in parallel without seams appearing at job boundaries.

use super::merge::MergeTable;
use super::output::Built;
use super::pool::{partition, run_ranged, ThreadPool, MAX_SUB_JOBS};
use super::Basic;
use crate::Error;
use nalgebra::Vector3;
use std::collections::HashMap;

/// The geometry surface handed to an external tangent generator
///
/// Mirrors the callback set MikkTSpace-style generators consume: per-face
/// corner counts, position/normal/UV getters, and a tangent setter.
pub trait TangentGeometry {
    /// Number of faces in this piece
    fn num_faces(&self) -> usize;
    /// Corner count of one face (3 or 4)
    fn num_vertices_of_face(&self, face: usize) -> usize;
    /// Position of a face corner
    fn position(&self, face: usize, vert: usize) -> [f32; 3];
    /// Shading normal of a face corner
    fn normal(&self, face: usize, vert: usize) -> [f32; 3];
    /// UV of a face corner
    fn tex_coord(&self, face: usize, vert: usize) -> [f32; 2];
    /// Receives the computed tangent and handedness sign for a face corner
    fn set_tangent(&mut self, tangent: [f32; 3], sign: f32, face: usize, vert: usize);
}

/// An external tangent-space generator
pub trait TangentGenerator: Sync {
    /// Computes tangents for every corner of the given geometry
    fn generate(&self, geom: &mut dyn TangentGeometry) -> Result<(), Error>;
}

/// Per-input-corner tangent data produced by the generator
#[derive(Debug, Clone)]
pub struct TangentData {
    /// Tangent per input-mesh corner
    pub tangents: Vec<Vector3<f32>>,
    /// Handedness sign per input-mesh corner
    pub signs: Vec<f32>,
}

/// One job's slice of T-pieces: faces plus local output buffers
struct PieceGeometry<'a> {
    basic: &'a Basic<'a>,
    faces: &'a [u32],
    // indexed by (local face, corner), flattened with per-face starts
    starts: Vec<u32>,
    tangents: Vec<Vector3<f32>>,
    signs: Vec<f32>,
}

impl<'a> PieceGeometry<'a> {
    fn new(basic: &'a Basic<'a>, faces: &'a [u32]) -> Self {
        let mut starts = Vec::with_capacity(faces.len());
        let mut total = 0u32;
        for &f in faces {
            starts.push(total);
            total += basic.in_mesh.face_range(f as usize).size() as u32;
        }
        Self {
            basic,
            faces,
            starts,
            tangents: vec![Vector3::zeros(); total as usize],
            signs: vec![0.0; total as usize],
        }
    }

    fn slot(&self, face: usize, vert: usize) -> usize {
        self.starts[face] as usize + vert
    }
}

impl TangentGeometry for PieceGeometry<'_> {
    fn num_faces(&self) -> usize {
        self.faces.len()
    }

    fn num_vertices_of_face(&self, face: usize) -> usize {
        self.basic
            .in_mesh
            .face_range(self.faces[face] as usize)
            .size()
    }

    fn position(&self, face: usize, vert: usize) -> [f32; 3] {
        self.basic
            .in_mesh
            .corner_pos(self.faces[face] as usize, vert)
            .into()
    }

    fn normal(&self, face: usize, vert: usize) -> [f32; 3] {
        self.basic
            .in_mesh
            .shading_normal(self.faces[face] as usize, vert)
            .into()
    }

    fn tex_coord(&self, face: usize, vert: usize) -> [f32; 2] {
        self.basic
            .in_mesh
            .corner_uv(self.faces[face] as usize, vert)
            .into()
    }

    fn set_tangent(&mut self, tangent: [f32; 3], sign: f32, face: usize, vert: usize) {
        let slot = self.slot(face, vert);
        self.tangents[slot] = Vector3::from(tangent);
        self.signs[slot] = sign;
    }
}

struct UnionFind {
    parent: Vec<u32>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n as u32).collect(),
        }
    }

    fn find(&mut self, i: u32) -> u32 {
        let mut i = i;
        while self.parent[i as usize] != i {
            // path halving
            self.parent[i as usize] = self.parent[self.parent[i as usize] as usize];
            i = self.parent[i as usize];
        }
        i
    }

    fn union(&mut self, a: u32, b: u32) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            // smaller root wins, keeping group ids stable
            let (lo, hi) = (ra.min(rb), ra.max(rb));
            self.parent[hi as usize] = lo;
        }
    }
}

/// Groups input faces into T-pieces via shared merged vertices
///
/// Returns groups of input-face ids, each group connectivity-closed; group
/// and face order is deterministic.
pub fn build_t_pieces(
    basic: &Basic,
    built: &Built,
    table: &MergeTable,
) -> Vec<Vec<u32>> {
    let mut uf = UnionFind::new(basic.in_mesh.face_count());
    let mut first_face: HashMap<super::merge::MergeRef, u32> = HashMap::new();
    for (pieces, bufs) in [
        (&built.pieces_direct, &built.bufs_direct),
        (&built.pieces_clip, &built.bufs_clip),
    ] {
        for buf in bufs.iter() {
            for face in 0..buf.faces.len() {
                let bf = buf.faces[face];
                let piece = &pieces[bf.piece as usize];
                for corner in 0..bf.size as usize {
                    let key = super::merge::vert_key(basic, piece, buf, face, corner);
                    let Some(r) = table.get(&key) else { continue };
                    let r = table.resolve(r);
                    match first_face.get(&r) {
                        Some(&f) => uf.union(f, bf.in_face),
                        None => {
                            first_face.insert(r, bf.in_face);
                        }
                    }
                }
            }
        }
    }
    // collect used faces in ascending order, grouped by component root
    let mut used: Vec<u32> = first_face.values().copied().collect();
    for pieces in [&built.pieces_direct, &built.pieces_clip] {
        for p in pieces.iter() {
            used.extend(p.in_faces.iter().map(|f| f.face));
        }
    }
    used.sort_unstable();
    used.dedup();
    let mut groups: Vec<Vec<u32>> = vec![];
    let mut group_of: HashMap<u32, usize> = HashMap::new();
    for f in used {
        let root = uf.find(f);
        match group_of.get(&root) {
            Some(&g) => groups[g].push(f),
            None => {
                group_of.insert(root, groups.len());
                groups.push(vec![f]);
            }
        }
    }
    groups
}

/// Runs the external generator over T-piece-partitioned jobs and gathers a
/// per-input-corner tangent table
pub fn build_tangents(
    basic: &Basic,
    built: &Built,
    table: &MergeTable,
    pool: &dyn ThreadPool,
    generator: &dyn TangentGenerator,
) -> Result<TangentData, Error> {
    let groups = build_t_pieces(basic, built, table);
    log::debug!("tangent generation over {} t-pieces", groups.len());

    // pack whole groups into at most MAX_SUB_JOBS jobs of similar size
    let ranges = partition(groups.len(), pool.thread_count().min(MAX_SUB_JOBS));
    let jobs: Vec<Vec<u32>> = ranges
        .into_iter()
        .map(|r| groups[r].iter().flatten().copied().collect())
        .collect();

    let outputs = run_ranged(pool, jobs.len(), |_, range| {
        let mut out = vec![];
        for job in range {
            let faces = &jobs[job];
            if faces.is_empty() {
                continue;
            }
            let mut geom = PieceGeometry::new(basic, faces);
            generator.generate(&mut geom)?;
            out.push((faces.clone(), geom.tangents, geom.signs));
        }
        Ok(out)
    })?;

    let mut data = TangentData {
        tangents: vec![Vector3::zeros(); basic.in_mesh.corner_count()],
        signs: vec![0.0; basic.in_mesh.corner_count()],
    };
    for (faces, tangents, signs) in outputs.into_iter().flatten() {
        let mut slot = 0;
        for f in faces {
            let r = basic.in_mesh.face_range(f as usize);
            for c in 0..r.size() {
                data.tangents[r.start + c] = tangents[slot];
                data.signs[r.start + c] = signs[slot];
                slot += 1;
            }
        }
    }
    Ok(data)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn union_find_groups_transitively() {
        let mut uf = UnionFind::new(5);
        uf.union(0, 1);
        uf.union(3, 4);
        uf.union(1, 3);
        assert_eq!(uf.find(4), uf.find(0));
        assert_ne!(uf.find(2), uf.find(0));
    }
}
