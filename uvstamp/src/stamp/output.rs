//! Output mesh assembly: stitching per-job buffer meshes into final geometry
//!
//! Assembly walks every buffer face, resolves each corner through the merge
//! table (following snap chains to their fixed point), collapses the
//! degenerate zero-length edges that merging introduces, and emits faces
//! that still have at least 3 distinct corners.  Output face order is
//! piece-set-major, then buffer-mesh, then face — deterministic given the
//! static job partitioning.

use super::bufmesh::BufMesh;
use super::encase::InPiece;
use super::merge::{vert_key, MergeRef, MergeTable};
use super::Basic;
use crate::mesh::attrib::{
    Attrib, AttribArray, AttribData, AttribOrigin, ATTRIB_POSITION,
    ATTRIB_TANGENT, ATTRIB_TSIGN,
};
use crate::mesh::Mesh;
use crate::tile::Tile;
use crate::Error;

/// Provenance of one output face
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct FaceSource {
    /// The input face the geometry lies on
    pub in_face: u32,
    /// The map face that was stamped
    pub map_face: u32,
    /// The tile instance it was stamped in
    pub tile: Tile,
}

/// Side tables produced by assembly, consumed by interpolation
#[derive(Debug, Default)]
pub struct Assembly {
    /// Resolved merge entry per output corner
    pub corner_refs: Vec<MergeRef>,
    /// Provenance per output face
    pub sources: Vec<FaceSource>,
}

/// The two buffer-mesh populations and their piece arrays
#[derive(Debug, Default)]
pub struct Built {
    /// Pieces whose map faces were fully enclosed (direct path)
    pub pieces_direct: Vec<InPiece>,
    /// Pieces that went through the clipper
    pub pieces_clip: Vec<InPiece>,
    /// Buffer meshes of the direct path
    pub bufs_direct: Vec<BufMesh>,
    /// Buffer meshes of the clip path
    pub bufs_clip: Vec<BufMesh>,
}

impl Built {
    /// Piece array and buffer mesh for a merge corner's provenance
    pub fn ctx(&self, clipped: bool, buf: usize) -> (&[InPiece], &BufMesh) {
        if clipped {
            (&self.pieces_clip, &self.bufs_clip[buf])
        } else {
            (&self.pieces_direct, &self.bufs_direct[buf])
        }
    }
}

fn init_out_attribs(
    basic: &Basic,
    out: &mut Mesh,
    with_tangents: bool,
) -> Result<(), Error> {
    let map_mesh = basic.map.mesh();
    out.face_attribs = AttribArray::union_from(
        &basic.in_mesh.face_attribs,
        &map_mesh.face_attribs,
    )?;
    out.corner_attribs = AttribArray::union_from(
        &basic.in_mesh.corner_attribs,
        &map_mesh.corner_attribs,
    )?;
    out.vert_attribs = AttribArray::union_from(
        &basic.in_mesh.vert_attribs,
        &map_mesh.vert_attribs,
    )?;
    // positions come out of the displacement pass, not generic blending
    if let Some(i) = out.vert_attribs.find(ATTRIB_POSITION) {
        out.vert_attribs.at_mut(i).origin = AttribOrigin::MeshOut;
    }
    if with_tangents {
        for (name, data) in [
            (ATTRIB_TANGENT, AttribData::V3F32(vec![])),
            (ATTRIB_TSIGN, AttribData::F32(vec![])),
        ] {
            out.corner_attribs.insert(Attrib {
                name: name.to_owned(),
                data,
                origin: AttribOrigin::MeshOut,
                interpolate: true,
            });
        }
    }
    out.refresh_active();
    Ok(())
}

/// Assigns output vertex indices to every live merge entry
fn add_verts(out: &mut Mesh, table: &mut MergeTable) {
    for entry in &mut table.verts {
        if entry.removed {
            continue;
        }
        entry.out_vert = out.add_vert();
    }
    for entry in &mut table.intersects {
        if entry.core.removed || entry.snap_to.is_some() {
            continue;
        }
        entry.core.out_vert = out.add_vert();
    }
}

fn add_faces(
    basic: &Basic,
    pieces: &[InPiece],
    bufs: &[BufMesh],
    table: &MergeTable,
    out: &mut Mesh,
    asm: &mut Assembly,
    scratch: &mut Vec<MergeRef>,
) {
    for buf in bufs {
        for face in 0..buf.faces.len() {
            let bf = buf.faces[face];
            let piece = &pieces[bf.piece as usize];
            scratch.clear();
            for corner in 0..bf.size as usize {
                let key = vert_key(basic, piece, buf, face, corner);
                let r = table.get(&key);
                debug_assert!(r.is_some(), "buffer corner missing from merge table");
                let Some(r) = r else { continue };
                let r = table.resolve(r);
                if table.entry(r).removed {
                    continue;
                }
                scratch.push(r);
            }
            // merging can collapse neighbours onto the same vertex; drop
            // the zero-length edges (wrap-aware)
            let n = scratch.len();
            let mut kept: Vec<MergeRef> = Vec::with_capacity(n);
            for i in 0..n {
                let prev = if i == 0 { n - 1 } else { i - 1 };
                if scratch[i] == scratch[prev] {
                    continue;
                }
                kept.push(scratch[i]);
            }
            if kept.len() < 3 {
                continue;
            }
            out.add_face();
            for r in kept {
                out.add_corner(table.entry(r).out_vert);
                asm.corner_refs.push(r);
            }
            asm.sources.push(FaceSource {
                in_face: bf.in_face,
                map_face: piece.map_face,
                tile: piece.tile,
            });
        }
    }
}

/// Builds the output mesh's topology and the interpolation side tables
///
/// Vertex and face order is deterministic: merge-table insertion order for
/// vertices, then direct-set faces followed by clip-set faces.
pub fn assemble(
    basic: &Basic,
    built: &Built,
    table: &mut MergeTable,
    with_tangents: bool,
) -> Result<(Mesh, Assembly), Error> {
    let mut out = Mesh::new();
    init_out_attribs(basic, &mut out, with_tangents)?;
    add_verts(&mut out, table);
    let mut asm = Assembly::default();
    let mut scratch = vec![];
    add_faces(
        basic,
        &built.pieces_direct,
        &built.bufs_direct,
        table,
        &mut out,
        &mut asm,
        &mut scratch,
    );
    add_faces(
        basic,
        &built.pieces_clip,
        &built.bufs_clip,
        table,
        &mut out,
        &mut asm,
        &mut scratch,
    );
    debug_assert_eq!(asm.corner_refs.len(), out.corner_count());
    debug_assert_eq!(asm.sources.len(), out.face_count());
    log::debug!(
        "assembled {} faces, {} corners, {} verts",
        out.face_count(),
        out.corner_count(),
        out.vert_count()
    );
    Ok((out, asm))
}
