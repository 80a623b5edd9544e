//! The map-to-mesh pipeline: stamping a tiled map mesh onto a surface
//!
//! [`map_to_mesh`] is the single entry point.  The pipeline runs in phases,
//! each job-parallel phase writing only job-private state and every merge
//! point strictly serial-after-join:
//!
//! 1. encasement — which map faces overlap which input faces, per tile
//!    ([`encase`])
//! 2. buffer-mesh construction — clip and append typed corners
//!    ([`bufmesh`])
//! 3. merge-table build and the intersection snap pass ([`merge`])
//! 4. output assembly ([`output`])
//! 5. tangent generation over T-pieces ([`tangent`], optional)
//! 6. position and attribute interpolation ([`interp`])
//!
//! Malformed geometry is skipped, not failed: n-gon faces and degenerate
//! faces produce no output and no error — callers depend on best-effort
//! stamping.  Structural errors (invalid mesh buffers, clipper breakdowns)
//! are reported as [`Error`]s after all in-flight jobs complete.

pub mod bufmesh;
pub mod encase;
pub mod interp;
pub mod merge;
pub mod output;
pub mod pool;
pub mod tangent;

use crate::map::Map;
use crate::mesh::attrib::{AttribData, AttribOrigin, BlendConfig, Domain};
use crate::mesh::Mesh;
use crate::Error;
use interp::{BufVertData, InterpCache, SrcOrigin};
use merge::{MergeRef, MergeTable};
use output::{Assembly, Built, FaceSource};
use pool::{run_ranged, StdPool, ThreadPool};
use tangent::{TangentData, TangentGenerator};

/// Options controlling one mapping call
pub struct Options<'a> {
    /// Scale applied to the map's `w` height before displacement
    pub w_scale: f32,
    /// When set, only input faces with this material index are stamped
    pub mask_material: Option<i32>,
    /// Upper bound on displacement magnitude; `0.0` disables the clamp
    pub receive_len: f32,
    /// Per-attribute blend overrides, by attribute name
    pub blend: Vec<(String, BlendConfig)>,
    /// External tangent generator; tangents are skipped when absent
    pub tangent_gen: Option<&'a dyn TangentGenerator>,
    /// Thread pool override; a default pool is built when absent
    pub pool: Option<&'a dyn ThreadPool>,
}

impl Default for Options<'_> {
    fn default() -> Self {
        Self {
            w_scale: 1.0,
            mask_material: None,
            receive_len: 0.0,
            blend: vec![],
            tangent_gen: None,
            pool: None,
        }
    }
}

impl Options<'_> {
    fn blend_for(&self, name: &str) -> BlendConfig {
        self.blend
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, c)| *c)
            .unwrap_or_default()
    }
}

/// Shared read-only state for one mapping call
pub struct Basic<'a> {
    /// The map being stamped
    pub map: &'a Map,
    /// The target surface
    pub in_mesh: &'a Mesh,
    /// Call options
    pub options: &'a Options<'a>,
    in_corner_edges: Vec<u32>,
    /// Number of unique input-mesh edges
    pub in_edge_count: usize,
}

impl Basic<'_> {
    /// Edge id of an input-face corner
    pub fn in_corner_edge(&self, face: usize, corner: usize) -> u32 {
        let r = self.in_mesh.face_range(face);
        self.in_corner_edges[r.start + corner]
    }
}

/// The result of a mapping call: the stamped mesh plus per-face provenance
#[derive(Debug, Default)]
pub struct MappedMesh {
    /// Output geometry
    pub mesh: Mesh,
    /// One source record per output face
    pub sources: Vec<FaceSource>,
}

/// Stamps `map` onto `mesh_in` and returns the merged output mesh
///
/// The input mesh must carry positions and per-corner UVs.  Faces with more
/// than 4 corners and degenerate faces are skipped silently (best-effort
/// mapping is the contract); an input mesh that produces no overlap yields
/// an empty [`MappedMesh`], not an error.
pub fn map_to_mesh(
    map: &Map,
    mesh_in: &Mesh,
    options: &Options,
) -> Result<MappedMesh, Error> {
    mesh_in.validate()?;
    if mesh_in.positions().is_none() {
        return Err(Error::InvalidMesh("input mesh has no position column"));
    }
    if mesh_in.uvs().is_none() {
        return Err(Error::InvalidMesh("input mesh has no uv column"));
    }
    let default_pool;
    let pool: &dyn ThreadPool = match options.pool {
        Some(p) => p,
        None => {
            default_pool = StdPool::new();
            &default_pool
        }
    };
    let (in_corner_edges, in_edge_count) = if mesh_in.has_edges() {
        let ids = (0..mesh_in.face_count())
            .flat_map(|f| {
                let r = mesh_in.face_range(f);
                (0..r.size()).map(move |c| (f, c))
            })
            .map(|(f, c)| mesh_in.corner_edge(f, c))
            .collect();
        (ids, mesh_in.edge_count())
    } else {
        mesh_in.edge_ids()
    };
    let basic = Basic {
        map,
        in_mesh: mesh_in,
        options,
        in_corner_edges,
        in_edge_count,
    };

    let pieces = encase::build_in_pieces(&basic, pool)?;
    if pieces.is_empty() {
        log::debug!("no overlap between map and input mesh");
        return Ok(MappedMesh::default());
    }
    let (direct, clipped) = encase::split_pieces(&pieces);
    let bufs_direct = bufmesh::build_buf_meshes(&basic, &direct, false, pool)?;
    let bufs_clip = bufmesh::build_buf_meshes(&basic, &clipped, true, pool)?;
    let built = Built {
        pieces_direct: direct,
        pieces_clip: clipped,
        bufs_direct,
        bufs_clip,
    };

    let mut table = MergeTable::default();
    merge::merge_verts(
        &basic,
        &built.pieces_direct,
        &built.bufs_direct,
        false,
        &mut table,
    );
    merge::merge_verts(
        &basic,
        &built.pieces_clip,
        &built.bufs_clip,
        true,
        &mut table,
    );
    if table.verts.is_empty() && table.intersects.is_empty() {
        return Ok(MappedMesh::default());
    }
    merge::snap_intersect_verts(&mut table, pool)?;

    let (mut out, asm) =
        output::assemble(&basic, &built, &mut table, options.tangent_gen.is_some())?;
    if out.face_count() == 0 {
        return Ok(MappedMesh::default());
    }

    let tangents = match options.tangent_gen {
        Some(g) => Some(tangent::build_tangents(&basic, &built, &table, pool, g)?),
        None => None,
    };

    interp_positions(&basic, &built, &table, &mut out, pool)?;
    interp_face_attribs(&basic, &asm, &mut out, pool)?;
    interp_corner_attribs(&basic, &built, &table, &asm, tangents.as_ref(), &mut out, pool)?;
    interp_vert_attribs(&basic, &built, &table, &mut out, pool)?;

    out.shrink_to_fit();
    out.refresh_active();
    debug_assert!(out.validate().is_ok());
    Ok(MappedMesh {
        mesh: out,
        sources: asm.sources,
    })
}

/// Live merge entries (skipping removed and snapped), in vertex order
fn live_entries(table: &MergeTable) -> Vec<MergeRef> {
    let mut out = Vec::with_capacity(table.verts.len() + table.intersects.len());
    out.extend(
        table
            .verts
            .iter()
            .enumerate()
            .filter(|(_, e)| !e.removed)
            .map(|(i, _)| MergeRef::Vert(i as u32)),
    );
    out.extend(
        table
            .intersects
            .iter()
            .enumerate()
            .filter(|(_, e)| !e.core.removed && e.snap_to.is_none())
            .map(|(i, _)| MergeRef::Intersect(i as u32)),
    );
    out
}

/// The buffer-corner context behind a merge entry's provenance
fn entry_ctx<'a>(
    built: &'a Built,
    table: &MergeTable,
    r: MergeRef,
) -> (&'a encase::InPiece, &'a bufmesh::BufMesh, usize, usize) {
    let corner = table.entry(r).corner;
    let (pieces, buf) = built.ctx(corner.clipped, corner.buf as usize);
    let piece = &pieces[buf.faces[corner.face as usize].piece as usize];
    (piece, buf, corner.face as usize, corner.corner as usize)
}

/// Resolves every output vertex position (job-parallel, serial scatter)
fn interp_positions(
    basic: &Basic,
    built: &Built,
    table: &MergeTable,
    out: &mut Mesh,
    pool: &dyn ThreadPool,
) -> Result<(), Error> {
    let entries = live_entries(table);
    let chunks = run_ranged(pool, entries.len(), |_, range| {
        let mut positions = Vec::with_capacity(range.len());
        for i in range {
            let r = entries[i];
            let (piece, buf, face, corner) = entry_ctx(built, table, r);
            let pos = interp::resolve_position(basic, piece, buf, face, corner);
            positions.push((table.entry(r).out_vert, pos));
        }
        Ok(positions)
    })?;
    let out_positions = out
        .positions_mut()
        .expect("output mesh always carries positions");
    for (vert, pos) in chunks.into_iter().flatten() {
        out_positions[vert as usize] = pos;
    }
    Ok(())
}

/// Per-output-column references to the matching source columns
fn source_columns<'a>(
    out_cols: &crate::mesh::attrib::AttribArray,
    in_cols: &'a crate::mesh::attrib::AttribArray,
    map_cols: &'a crate::mesh::attrib::AttribArray,
) -> Vec<(Option<&'a AttribData>, Option<&'a AttribData>)> {
    out_cols
        .iter()
        .map(|col| {
            (
                in_cols.get(&col.name).map(|a| &a.data),
                map_cols.get(&col.name).map(|a| &a.data),
            )
        })
        .collect()
}

/// Face attributes: direct copy from the provenance faces, blending
/// name-matched columns per their blend config
fn interp_face_attribs(
    basic: &Basic,
    asm: &Assembly,
    out: &mut Mesh,
    pool: &dyn ThreadPool,
) -> Result<(), Error> {
    let srcs = source_columns(
        &out.face_attribs,
        &basic.in_mesh.face_attribs,
        &basic.map.mesh().face_attribs,
    );
    let origins: Vec<AttribOrigin> =
        out.face_attribs.iter().map(|a| a.origin).collect();
    let configs: Vec<BlendConfig> = out
        .face_attribs
        .iter()
        .map(|a| basic.options.blend_for(&a.name))
        .collect();
    let out_ref = &*out;
    let chunks = run_ranged(pool, out_ref.face_count(), |_, range| {
        let mut segs: Vec<AttribData> = out_ref
            .face_attribs
            .iter()
            .map(|a| {
                let mut d = a.data.new_like();
                d.resize(range.len());
                d
            })
            .collect();
        for (local, f) in range.clone().enumerate() {
            let src = asm.sources[f];
            for (ci, seg) in segs.iter_mut().enumerate() {
                let (in_src, map_src) = srcs[ci];
                match origins[ci] {
                    AttribOrigin::MeshIn => {
                        if let Some(s) = in_src {
                            seg.copy_from(local, s, src.in_face as usize);
                        }
                    }
                    AttribOrigin::Map => {
                        if let Some(s) = map_src {
                            seg.copy_from(local, s, src.map_face as usize);
                        }
                    }
                    AttribOrigin::Common => {
                        let (Some(a), Some(b)) = (in_src, map_src) else {
                            continue;
                        };
                        let cfg = configs[ci];
                        if cfg.order == 0 {
                            seg.copy_from(local, a, src.in_face as usize);
                            seg.blend_with(local, b, src.map_face as usize, cfg.mode)?;
                        } else {
                            seg.copy_from(local, b, src.map_face as usize);
                            seg.blend_with(local, a, src.in_face as usize, cfg.mode)?;
                        }
                    }
                    _ => (),
                }
            }
        }
        Ok((range.start, segs))
    })?;
    for (start, segs) in chunks {
        for (ci, seg) in segs.iter().enumerate() {
            out.face_attribs.at_mut(ci).data.splice(start, seg);
        }
    }
    Ok(())
}

/// Corner attributes: cached interpolation per corner, across all columns
#[allow(clippy::too_many_arguments)]
fn interp_corner_attribs(
    basic: &Basic,
    built: &Built,
    table: &MergeTable,
    asm: &Assembly,
    tangents: Option<&TangentData>,
    out: &mut Mesh,
    pool: &dyn ThreadPool,
) -> Result<(), Error> {
    let srcs = source_columns(
        &out.corner_attribs,
        &basic.in_mesh.corner_attribs,
        &basic.map.mesh().corner_attribs,
    );
    let origins: Vec<AttribOrigin> =
        out.corner_attribs.iter().map(|a| a.origin).collect();
    let configs: Vec<BlendConfig> = out
        .corner_attribs
        .iter()
        .map(|a| basic.options.blend_for(&a.name))
        .collect();
    // generated tangents interpolate like input-mesh corner columns
    let tangent_srcs = tangents.map(|t| {
        (
            AttribData::V3F32(t.tangents.clone()),
            AttribData::F32(t.signs.clone()),
        )
    });
    let tangent_idx = out.corner_attribs.find(crate::mesh::attrib::ATTRIB_TANGENT);
    let tsign_idx = out.corner_attribs.find(crate::mesh::attrib::ATTRIB_TSIGN);

    let out_ref = &*out;
    let chunks = run_ranged(pool, out_ref.face_count(), |_, face_range| {
        let c_start = out_ref.face_range(face_range.start).start;
        let c_end = if face_range.end == out_ref.face_count() {
            out_ref.corner_count()
        } else {
            out_ref.face_range(face_range.end).start
        };
        let mut segs: Vec<AttribData> = out_ref
            .corner_attribs
            .iter()
            .map(|a| {
                let mut d = a.data.new_like();
                d.resize(c_end - c_start);
                d
            })
            .collect();
        let mut scratch: Vec<AttribData> = out_ref
            .corner_attribs
            .iter()
            .map(|a| {
                let mut d = a.data.new_like();
                d.resize(1);
                d
            })
            .collect();
        for f in face_range {
            let r = out_ref.face_range(f);
            for c in r.start..r.end {
                let local = c - c_start;
                let mref = asm.corner_refs[c];
                let (piece, buf, bface, bcorner) = entry_ctx(built, table, mref);
                let vd = interp::vert_data(buf, bface, bcorner);
                let mut cache_in = InterpCache::new(Domain::Corner, SrcOrigin::In);
                let mut cache_map = InterpCache::new(Domain::Corner, SrcOrigin::Map);
                for ci in 0..segs.len() {
                    interp_one(
                        basic,
                        piece,
                        &vd,
                        origins[ci],
                        configs[ci],
                        srcs[ci],
                        &mut cache_in,
                        &mut cache_map,
                        &mut segs[ci],
                        local,
                        &mut scratch[ci],
                    )?;
                }
                // tangent columns source from the generator's output
                if let Some((tan, sign)) = &tangent_srcs {
                    if let Some(ti) = tangent_idx {
                        cache_in.interp(basic, piece, &vd, &mut segs[ti], local, tan);
                    }
                    if let Some(si) = tsign_idx {
                        cache_in.interp(basic, piece, &vd, &mut segs[si], local, sign);
                    }
                }
            }
        }
        Ok((c_start, segs))
    })?;
    for (start, segs) in chunks {
        for (ci, seg) in segs.iter().enumerate() {
            out.corner_attribs.at_mut(ci).data.splice(start, seg);
        }
    }
    Ok(())
}

/// Interpolates one column for one corner, handling origin dispatch and
/// two-source blending
#[allow(clippy::too_many_arguments)]
fn interp_one(
    basic: &Basic,
    piece: &encase::InPiece,
    vd: &BufVertData,
    origin: AttribOrigin,
    cfg: BlendConfig,
    srcs: (Option<&AttribData>, Option<&AttribData>),
    cache_in: &mut InterpCache,
    cache_map: &mut InterpCache,
    dest: &mut AttribData,
    dest_idx: usize,
    scratch: &mut AttribData,
) -> Result<(), Error> {
    let (in_src, map_src) = srcs;
    match origin {
        AttribOrigin::MeshIn => {
            if let Some(s) = in_src {
                cache_in.interp(basic, piece, vd, dest, dest_idx, s);
            }
        }
        AttribOrigin::Map => {
            if let Some(s) = map_src {
                cache_map.interp(basic, piece, vd, dest, dest_idx, s);
            }
        }
        AttribOrigin::Common => {
            let (Some(a), Some(b)) = (in_src, map_src) else {
                return Ok(());
            };
            if cfg.order == 0 {
                cache_in.interp(basic, piece, vd, dest, dest_idx, a);
                cache_map.interp(basic, piece, vd, scratch, 0, b);
            } else {
                cache_map.interp(basic, piece, vd, dest, dest_idx, b);
                cache_in.interp(basic, piece, vd, scratch, 0, a);
            }
            dest.blend_with(dest_idx, scratch, 0, cfg.mode)?;
        }
        _ => (),
    }
    Ok(())
}

/// Vertex attributes, resolved once per live merge entry
fn interp_vert_attribs(
    basic: &Basic,
    built: &Built,
    table: &MergeTable,
    out: &mut Mesh,
    pool: &dyn ThreadPool,
) -> Result<(), Error> {
    let srcs = source_columns(
        &out.vert_attribs,
        &basic.in_mesh.vert_attribs,
        &basic.map.mesh().vert_attribs,
    );
    let origins: Vec<AttribOrigin> =
        out.vert_attribs.iter().map(|a| a.origin).collect();
    let configs: Vec<BlendConfig> = out
        .vert_attribs
        .iter()
        .map(|a| basic.options.blend_for(&a.name))
        .collect();
    let entries = live_entries(table);
    let out_ref = &*out;
    let chunks = run_ranged(pool, entries.len(), |_, range| {
        let mut segs: Vec<AttribData> = out_ref
            .vert_attribs
            .iter()
            .map(|a| {
                let mut d = a.data.new_like();
                d.resize(range.len());
                d
            })
            .collect();
        let mut scratch: Vec<AttribData> = out_ref
            .vert_attribs
            .iter()
            .map(|a| {
                let mut d = a.data.new_like();
                d.resize(1);
                d
            })
            .collect();
        let mut verts = Vec::with_capacity(range.len());
        for (local, i) in range.enumerate() {
            let r = entries[i];
            let (piece, buf, bface, bcorner) = entry_ctx(built, table, r);
            let vd = interp::vert_data(buf, bface, bcorner);
            let mut cache_in = InterpCache::new(Domain::Vert, SrcOrigin::In);
            let mut cache_map = InterpCache::new(Domain::Vert, SrcOrigin::Map);
            for ci in 0..segs.len() {
                interp_one(
                    basic,
                    piece,
                    &vd,
                    origins[ci],
                    configs[ci],
                    srcs[ci],
                    &mut cache_in,
                    &mut cache_map,
                    &mut segs[ci],
                    local,
                    &mut scratch[ci],
                )?;
            }
            verts.push(table.entry(r).out_vert);
        }
        Ok((verts, segs))
    })?;
    for (verts, segs) in chunks {
        for (ci, seg) in segs.iter().enumerate() {
            for (local, &v) in verts.iter().enumerate() {
                out.vert_attribs
                    .at_mut(ci)
                    .data
                    .copy_from(v as usize, seg, local);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mesh::attrib::{Attrib, BlendMode};
    use approx::assert_relative_eq;
    use nalgebra::{Vector2, Vector3};

    /// Flat input mesh whose positions equal `(u, v, 0)`
    fn flat_in_mesh(face_sizes: &[usize], corners: &[u32], uvs: &[Vector2<f32>]) -> Mesh {
        let vert_count = corners.iter().map(|&c| c + 1).max().unwrap() as usize;
        let mut positions = vec![Vector3::zeros(); vert_count];
        for (i, &v) in corners.iter().enumerate() {
            positions[v as usize] = Vector3::new(uvs[i].x, uvs[i].y, 0.0);
        }
        Mesh::from_buffers(face_sizes, corners, &positions, uvs).unwrap()
    }

    fn tri_map(pts: [[f32; 3]; 3]) -> Map {
        let mesh = Mesh::from_buffers(
            &[3],
            &[0, 1, 2],
            &pts.map(|p| Vector3::new(p[0], p[1], p[2])),
            &[],
        )
        .unwrap();
        Map::new(mesh).unwrap()
    }

    fn quad_map(min: f32, max: f32, w: f32) -> Map {
        let mesh = Mesh::from_buffers(
            &[4],
            &[0, 1, 2, 3],
            &[
                Vector3::new(min, min, w),
                Vector3::new(max, min, w),
                Vector3::new(max, max, w),
                Vector3::new(min, max, w),
            ],
            &[],
        )
        .unwrap();
        Map::new(mesh).unwrap()
    }

    fn serial_options() -> Options<'static> {
        Options::default()
    }

    fn face_area_3d(mesh: &Mesh, face: usize) -> f32 {
        // fan triangulation area
        let r = mesh.face_range(face);
        let a = mesh.corner_pos(face, 0);
        let mut area = 0.0;
        for i in 1..r.size() - 1 {
            let b = mesh.corner_pos(face, i);
            let c = mesh.corner_pos(face, i + 1);
            area += (b - a).cross(&(c - a)).norm() / 2.0;
        }
        area
    }

    #[test]
    fn enclosed_input_triangle_passes_through() {
        // the map triangle covers the whole input triangle: the output is
        // the input face itself, with no intersection vertices
        let map = tri_map([[-1.0, -1.0, 0.0], [3.0, -1.0, 0.0], [-1.0, 3.0, 0.0]]);
        let mesh_in = flat_in_mesh(
            &[3],
            &[0, 1, 2],
            &[
                Vector2::new(0.1, 0.1),
                Vector2::new(0.3, 0.1),
                Vector2::new(0.1, 0.3),
            ],
        );
        let opts = serial_options();
        let out = map_to_mesh(&map, &mesh_in, &opts).unwrap();
        assert_eq!(out.mesh.face_count(), 1);
        assert_eq!(out.mesh.corner_count(), 3);
        assert_eq!(out.mesh.vert_count(), 3);
        assert_eq!(out.sources[0].in_face, 0);
        assert_eq!(out.sources[0].map_face, 0);
        // no intersection vertices anywhere in the pipeline
        let basic = Basic {
            map: &map,
            in_mesh: &mesh_in,
            options: &opts,
            in_corner_edges: mesh_in.edge_ids().0,
            in_edge_count: mesh_in.edge_ids().1,
        };
        let pool = StdPool::with_threads(1);
        let pieces = encase::build_in_pieces(&basic, &pool).unwrap();
        let (direct, clipped) = encase::split_pieces(&pieces);
        assert!(direct.is_empty());
        let bufs = bufmesh::build_buf_meshes(&basic, &clipped, true, &pool).unwrap();
        let intersects: usize = bufs.iter().map(|b| b.intersect.len()).sum();
        assert_eq!(intersects, 0);
    }

    #[test]
    fn enclosed_map_triangle_uses_direct_path() {
        // map triangle strictly inside the input quad: direct append, all
        // corners are map-vertex references
        let map = tri_map([[0.3, 0.3, 0.0], [0.7, 0.3, 0.0], [0.5, 0.7, 0.0]]);
        let mesh_in = flat_in_mesh(
            &[4],
            &[0, 1, 2, 3],
            &[
                Vector2::new(0.0, 0.0),
                Vector2::new(1.0, 0.0),
                Vector2::new(1.0, 1.0),
                Vector2::new(0.0, 1.0),
            ],
        );
        let opts = serial_options();
        let out = map_to_mesh(&map, &mesh_in, &opts).unwrap();
        assert_eq!(out.mesh.face_count(), 1);
        assert_eq!(out.mesh.corner_count(), 3);
        // output geometry is the map triangle, lifted onto the flat surface
        let p = out.mesh.corner_pos(0, 0);
        assert_relative_eq!(p.z, 0.0, epsilon = 1e-5);
        assert_relative_eq!(face_area_3d(&out.mesh, 0), 0.08, epsilon = 1e-4);
    }

    #[test]
    fn crossing_edges_make_two_intersections() {
        // map triangle pokes out of the input quad through its right edge
        let map = tri_map([[0.2, 0.2, 0.0], [0.9, 0.4, 0.0], [0.2, 0.6, 0.0]]);
        let mesh_in = flat_in_mesh(
            &[4],
            &[0, 1, 2, 3],
            &[
                Vector2::new(0.0, 0.0),
                Vector2::new(0.6, 0.0),
                Vector2::new(0.6, 1.0),
                Vector2::new(0.0, 1.0),
            ],
        );
        let opts = serial_options();
        let basic = Basic {
            map: &map,
            in_mesh: &mesh_in,
            options: &opts,
            in_corner_edges: mesh_in.edge_ids().0,
            in_edge_count: mesh_in.edge_ids().1,
        };
        let pool = StdPool::with_threads(1);
        let pieces = encase::build_in_pieces(&basic, &pool).unwrap();
        let (_, clipped) = encase::split_pieces(&pieces);
        assert_eq!(clipped.len(), 1);
        let bufs = bufmesh::build_buf_meshes(&basic, &clipped, true, &pool).unwrap();
        let intersects: Vec<_> =
            bufs.iter().flat_map(|b| b.intersect.iter()).collect();
        assert_eq!(intersects.len(), 2);
        for v in intersects {
            assert!(v.t_in > 0.0 && v.t_in < 1.0);
            assert!(v.t_map > 0.0 && v.t_map < 1.0);
        }
        // and the full pipeline emits valid geometry
        let out = map_to_mesh(&map, &mesh_in, &opts).unwrap();
        assert!(out.mesh.face_count() >= 1);
        out.mesh.validate().unwrap();
    }

    #[test]
    fn tile_straddle_conserves_area() {
        // input quad spanning tiles (0,0) and (1,0); the map quad covers
        // its whole tile, so output area must equal input area exactly —
        // no gap and no double cover at the tile seam
        let map = quad_map(0.0, 1.0, 0.0);
        let mesh_in = flat_in_mesh(
            &[4],
            &[0, 1, 2, 3],
            &[
                Vector2::new(0.5, 0.1),
                Vector2::new(1.5, 0.1),
                Vector2::new(1.5, 0.9),
                Vector2::new(0.5, 0.9),
            ],
        );
        let opts = serial_options();
        let out = map_to_mesh(&map, &mesh_in, &opts).unwrap();
        assert!(out.mesh.face_count() >= 2, "seam must split the quad");
        let total: f32 = (0..out.mesh.face_count())
            .map(|f| face_area_3d(&out.mesh, f))
            .sum();
        assert_relative_eq!(total, 0.8, epsilon = 1e-4);
        // both tiles appear in the provenance
        let tiles: std::collections::HashSet<_> =
            out.sources.iter().map(|s| s.tile).collect();
        assert_eq!(tiles.len(), 2);
        out.mesh.validate().unwrap();
    }

    #[test]
    fn shared_input_edge_merges_output_verts() {
        // two input triangles sharing a diagonal, both inside the map
        // face: the shared vertices must merge into single output verts
        // (same input vertex seen under the same map face)
        let map = quad_map(0.0, 1.0, 0.0);
        let mesh_in = flat_in_mesh(
            &[3, 3],
            &[0, 1, 2, 0, 2, 3],
            &[
                Vector2::new(0.2, 0.2),
                Vector2::new(0.8, 0.2),
                Vector2::new(0.8, 0.8),
                Vector2::new(0.2, 0.2),
                Vector2::new(0.8, 0.8),
                Vector2::new(0.2, 0.8),
            ],
        );
        let out = map_to_mesh(&map, &mesh_in, &serial_options()).unwrap();
        assert_eq!(out.mesh.face_count(), 2);
        assert_eq!(out.mesh.corner_count(), 6);
        // 4 distinct vertices, not 6: the diagonal pair is shared
        assert_eq!(out.mesh.vert_count(), 4);
        out.mesh.validate().unwrap();
    }

    #[test]
    fn degenerate_input_face_is_skipped() {
        let map = quad_map(0.0, 1.0, 0.0);
        // zero UV area
        let mesh_in = flat_in_mesh(
            &[3],
            &[0, 1, 2],
            &[
                Vector2::new(0.2, 0.2),
                Vector2::new(0.5, 0.2),
                Vector2::new(0.8, 0.2),
            ],
        );
        let out = map_to_mesh(&map, &mesh_in, &serial_options()).unwrap();
        assert_eq!(out.mesh.face_count(), 0);
        assert!(out.sources.is_empty());
    }

    #[test]
    fn ngon_input_face_is_skipped() {
        let map = quad_map(0.0, 1.0, 0.0);
        let mesh_in = flat_in_mesh(
            &[5],
            &[0, 1, 2, 3, 4],
            &[
                Vector2::new(0.2, 0.2),
                Vector2::new(0.8, 0.2),
                Vector2::new(0.9, 0.6),
                Vector2::new(0.5, 0.9),
                Vector2::new(0.1, 0.6),
            ],
        );
        let out = map_to_mesh(&map, &mesh_in, &serial_options()).unwrap();
        assert_eq!(out.mesh.face_count(), 0);
    }

    #[test]
    fn w_scale_displaces_along_normal() {
        // map at height w = 0.5, scale 2: flat +Z surface moves up by 1
        let map = quad_map(0.0, 1.0, 0.5);
        let mesh_in = flat_in_mesh(
            &[4],
            &[0, 1, 2, 3],
            &[
                Vector2::new(0.25, 0.25),
                Vector2::new(0.75, 0.25),
                Vector2::new(0.75, 0.75),
                Vector2::new(0.25, 0.75),
            ],
        );
        let mut opts = serial_options();
        opts.w_scale = 2.0;
        let out = map_to_mesh(&map, &mesh_in, &opts).unwrap();
        assert!(out.mesh.vert_count() > 0);
        for p in out.mesh.positions().unwrap() {
            assert_relative_eq!(p.z, 1.0, epsilon = 1e-4);
        }

        // receive length clamps the displacement
        opts.receive_len = 0.25;
        let out = map_to_mesh(&map, &mesh_in, &opts).unwrap();
        for p in out.mesh.positions().unwrap() {
            assert_relative_eq!(p.z, 0.25, epsilon = 1e-4);
        }
    }

    #[test]
    fn replace_blend_is_lossless_copy() {
        // a map corner attribute with one interpolation source and replace
        // blending must arrive bit-identical
        let mut map_mesh = Mesh::from_buffers(
            &[3],
            &[0, 1, 2],
            &[
                Vector3::new(0.3, 0.3, 0.0),
                Vector3::new(0.7, 0.3, 0.0),
                Vector3::new(0.5, 0.7, 0.0),
            ],
            &[],
        )
        .unwrap();
        map_mesh.corner_attribs.insert(Attrib {
            name: "brightness".into(),
            data: AttribData::F32(vec![0.125, 0.25, 0.5]),
            origin: AttribOrigin::Map,
            interpolate: true,
        });
        let map = Map::new(map_mesh).unwrap();
        let mesh_in = flat_in_mesh(
            &[4],
            &[0, 1, 2, 3],
            &[
                Vector2::new(0.0, 0.0),
                Vector2::new(1.0, 0.0),
                Vector2::new(1.0, 1.0),
                Vector2::new(0.0, 1.0),
            ],
        );
        let mut opts = serial_options();
        opts.blend
            .push(("brightness".into(), BlendConfig { mode: BlendMode::Replace, order: 0 }));
        let out = map_to_mesh(&map, &mesh_in, &opts).unwrap();
        assert_eq!(out.mesh.face_count(), 1);
        let col = out.mesh.corner_attribs.get("brightness").unwrap();
        let AttribData::F32(vals) = &col.data else { panic!() };
        assert_eq!(vals.as_slice(), &[0.125, 0.25, 0.5]);
    }

    #[test]
    fn mask_material_filters_faces() {
        let map = quad_map(0.0, 1.0, 0.0);
        let mut mesh_in = flat_in_mesh(
            &[3, 3],
            &[0, 1, 2, 3, 4, 5],
            &[
                Vector2::new(0.1, 0.1),
                Vector2::new(0.4, 0.1),
                Vector2::new(0.1, 0.4),
                Vector2::new(0.6, 0.6),
                Vector2::new(0.9, 0.6),
                Vector2::new(0.6, 0.9),
            ],
        );
        mesh_in.face_attribs.insert(Attrib {
            name: crate::mesh::attrib::ATTRIB_MATERIAL.into(),
            data: AttribData::I32(vec![0, 1]),
            origin: AttribOrigin::MeshIn,
            interpolate: false,
        });
        mesh_in.refresh_active();
        let mut opts = serial_options();
        opts.mask_material = Some(1);
        let out = map_to_mesh(&map, &mesh_in, &opts).unwrap();
        assert_eq!(out.mesh.face_count(), 1);
        assert_eq!(out.sources[0].in_face, 1);

        // masking a material no face carries yields an empty result
        opts.mask_material = Some(7);
        let out = map_to_mesh(&map, &mesh_in, &opts).unwrap();
        assert_eq!(out.mesh.face_count(), 0);
    }

    #[test]
    fn uv_attribute_survives_interpolation() {
        // output corner UVs must reproduce the stamped positions: for a
        // map face interior point, the interpolated input UV is the map
        // vertex's own (global) UV
        let map = tri_map([[0.3, 0.3, 0.0], [0.7, 0.3, 0.0], [0.5, 0.7, 0.0]]);
        let mesh_in = flat_in_mesh(
            &[4],
            &[0, 1, 2, 3],
            &[
                Vector2::new(0.0, 0.0),
                Vector2::new(1.0, 0.0),
                Vector2::new(1.0, 1.0),
                Vector2::new(0.0, 1.0),
            ],
        );
        let out = map_to_mesh(&map, &mesh_in, &serial_options()).unwrap();
        let uvs = out.mesh.uvs().unwrap();
        let expect = [
            Vector2::new(0.3, 0.3),
            Vector2::new(0.7, 0.3),
            Vector2::new(0.5, 0.7),
        ];
        for (uv, e) in uvs.iter().zip(expect) {
            assert_relative_eq!(uv.x, e.x, epsilon = 1e-4);
            assert_relative_eq!(uv.y, e.y, epsilon = 1e-4);
        }
    }

    struct FaceNormalTangents;

    impl TangentGenerator for FaceNormalTangents {
        fn generate(
            &self,
            geom: &mut dyn tangent::TangentGeometry,
        ) -> Result<(), Error> {
            for f in 0..geom.num_faces() {
                for v in 0..geom.num_vertices_of_face(f) {
                    geom.set_tangent([1.0, 0.0, 0.0], 1.0, f, v);
                }
            }
            Ok(())
        }
    }

    #[test]
    fn tangent_generator_feeds_output_columns() {
        let map = tri_map([[0.3, 0.3, 0.0], [0.7, 0.3, 0.0], [0.5, 0.7, 0.0]]);
        let mesh_in = flat_in_mesh(
            &[4],
            &[0, 1, 2, 3],
            &[
                Vector2::new(0.0, 0.0),
                Vector2::new(1.0, 0.0),
                Vector2::new(1.0, 1.0),
                Vector2::new(0.0, 1.0),
            ],
        );
        let gen = FaceNormalTangents;
        let mut opts = serial_options();
        opts.tangent_gen = Some(&gen);
        let out = map_to_mesh(&map, &mesh_in, &opts).unwrap();
        let col = out
            .mesh
            .corner_attribs
            .get(crate::mesh::attrib::ATTRIB_TANGENT)
            .unwrap();
        let AttribData::V3F32(tangents) = &col.data else { panic!() };
        assert_eq!(tangents.len(), out.mesh.corner_count());
        for t in tangents {
            assert_relative_eq!(t.x, 1.0, epsilon = 1e-5);
        }
        let col = out
            .mesh
            .corner_attribs
            .get(crate::mesh::attrib::ATTRIB_TSIGN)
            .unwrap();
        let AttribData::F32(signs) = &col.data else { panic!() };
        assert!(signs.iter().all(|&s| (s - 1.0).abs() < 1e-5));
    }
}
