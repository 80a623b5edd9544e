//! Finds which map faces overlap which input faces, per UV tile
//!
//! For every input face, every tile its UV bounding box spans is probed:
//! the quadtree yields candidate map faces, a bounding-box test trims them,
//! and an exact overlap classification confirms real geometric overlap.
//! Results deduplicate into [`InPiece`]s — one per `(map face, tile)` pair,
//! each listing every input face that encases it.
//!
//! This stage is fully read-only over the map and input mesh; it is
//! partitioned by input-face range across jobs, each owning a private
//! table, and the tables are linked serially afterwards.

use super::pool::{run_ranged, ThreadPool};
use super::Basic;
use crate::clip::{self, ClipIds, SNAP_THRESHOLD};
use crate::geom::{degenerate_tri_2d, degenerate_tri_3d, signed_area, BBox};
use crate::tile::Tile;
use crate::Error;
use arrayvec::ArrayVec;
use nalgebra::{Vector2, Vector3};
use std::collections::HashMap;

/// How a map face overlaps an input face
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OverlapKind {
    /// Boundaries cross; the map face must be clipped
    Crossing,
    /// The map face lies entirely inside the input face
    MapInsideIn,
    /// The input face lies entirely inside the map face
    InInsideMap,
}

/// One input face encasing a map face
#[derive(Copy, Clone, Debug)]
pub struct EncasingInFace {
    /// Input face index
    pub face: u32,
    /// True when the input face's UV winding is flipped
    pub wind: bool,
    /// Overlap classification for this pairing
    pub kind: OverlapKind,
}

/// The encasement of one map face in one tile: every input face that
/// overlaps it there
#[derive(Clone, Debug)]
pub struct InPiece {
    /// Map face index
    pub map_face: u32,
    /// The tile instance the map face was stamped into
    pub tile: Tile,
    /// Input faces overlapping the map face in this tile
    pub in_faces: Vec<EncasingInFace>,
}

/// Job-private encasement table: insertion-ordered pieces plus an index
#[derive(Default)]
struct PieceTable {
    pieces: Vec<InPiece>,
    index: HashMap<(u32, Tile), usize>,
}

impl PieceTable {
    fn add(
        &mut self,
        map_face: u32,
        tile: Tile,
        in_face: EncasingInFace,
    ) {
        let idx = *self
            .index
            .entry((map_face, tile))
            .or_insert_with(|| {
                self.pieces.push(InPiece {
                    map_face,
                    tile,
                    in_faces: vec![],
                });
                self.pieces.len() - 1
            });
        let piece = &mut self.pieces[idx];
        if !piece.in_faces.iter().any(|e| e.face == in_face.face) {
            piece.in_faces.push(in_face);
        }
    }
}

/// UV positions of one input face, ≤ 4 corners
pub type FaceUvs = ArrayVec<Vector2<f32>, 4>;

/// Collects an input face's UVs, localized to a tile
pub fn in_face_uvs(basic: &Basic, face: usize, tile: Tile) -> FaceUvs {
    let r = basic.in_mesh.face_range(face);
    (0..r.size())
        .map(|c| tile.to_local(basic.in_mesh.corner_uv(face, c)))
        .collect()
}

/// Collects a map face's `(u, v, w)` positions (canonical tile frame)
pub fn map_face_pts(basic: &Basic, face: usize) -> ArrayVec<Vector3<f32>, 4> {
    let r = basic.map.mesh().face_range(face);
    (0..r.size())
        .map(|c| basic.map.mesh().corner_pos(face, c))
        .collect()
}

/// Even-odd point-in-polygon; points within `SNAP_THRESHOLD` of an edge
/// count as inside
fn point_in_poly(pts: &[Vector2<f32>], p: Vector2<f32>) -> bool {
    let n = pts.len();
    let mut inside = false;
    for i in 0..n {
        let a = pts[i];
        let b = pts[(i + 1) % n];
        let ab = b - a;
        let len = ab.norm();
        if len > 0.0 {
            let h = signed_area(a, b, p) / len;
            let t = (p - a).dot(&ab) / (len * len);
            if h.abs() < SNAP_THRESHOLD && (-0.01..=1.01).contains(&t) {
                return true;
            }
        }
        if (a.y > p.y) != (b.y > p.y) {
            let t = (p.y - a.y) / (b.y - a.y);
            if a.x + t * (b.x - a.x) > p.x {
                inside = !inside;
            }
        }
    }
    inside
}

/// True if segments `ab` and `cd` properly cross, with a `SNAP_THRESHOLD`
/// margin (touching configurations don't count)
fn edges_cross(
    a: Vector2<f32>,
    b: Vector2<f32>,
    c: Vector2<f32>,
    d: Vector2<f32>,
) -> bool {
    let cd_len = (d - c).norm();
    let ab_len = (b - a).norm();
    if cd_len == 0.0 || ab_len == 0.0 {
        return false;
    }
    let ha = signed_area(a, c, d) / cd_len;
    let hb = signed_area(b, c, d) / cd_len;
    let hc = signed_area(c, a, b) / ab_len;
    let hd = signed_area(d, a, b) / ab_len;
    let strict = |x: f32, y: f32| {
        (x > SNAP_THRESHOLD && y < -SNAP_THRESHOLD)
            || (x < -SNAP_THRESHOLD && y > SNAP_THRESHOLD)
    };
    strict(ha, hb) && strict(hc, hd)
}

/// Exact overlap classification between an input face (tile-local UVs) and
/// a map face (canonical UVs)
///
/// Quick tests (proper edge crossing, mutual containment) decide most
/// pairs; genuinely ambiguous touching configurations fall back to a full
/// clip query.
fn classify_overlap(
    basic: &Basic,
    in_uvs: &FaceUvs,
    in_face: usize,
    map_face: usize,
) -> Option<OverlapKind> {
    let map_pts = map_face_pts(basic, map_face);
    let map_uvs: ArrayVec<Vector2<f32>, 4> =
        map_pts.iter().map(|p| p.xy()).collect();
    for i in 0..in_uvs.len() {
        let a = in_uvs[i];
        let b = in_uvs[(i + 1) % in_uvs.len()];
        for j in 0..map_uvs.len() {
            let c = map_uvs[j];
            let d = map_uvs[(j + 1) % map_uvs.len()];
            if edges_cross(a, b, c, d) {
                return Some(OverlapKind::Crossing);
            }
        }
    }
    if map_uvs.iter().all(|&p| point_in_poly(in_uvs, p)) {
        return Some(OverlapKind::MapInsideIn);
    }
    if in_uvs.iter().all(|&p| point_in_poly(&map_uvs, p)) {
        return Some(OverlapKind::InInsideMap);
    }
    // touching-only configurations: let the clipper arbitrate
    let ids = ClipIds { in_face, map_face };
    match clip::clip(in_uvs, &map_pts, ids) {
        Ok(out) => {
            let area: f32 =
                out.faces.iter().map(|f| clip::face_area(f).abs()).sum();
            if area > SNAP_THRESHOLD * SNAP_THRESHOLD {
                Some(OverlapKind::Crossing)
            } else {
                None
            }
        }
        Err(e) => {
            log::trace!(
                "overlap query failed for map face {map_face} / input face \
                 {in_face}, skipping: {e}"
            );
            None
        }
    }
}

/// True if the input face should be skipped as degenerate
fn in_face_degenerate(basic: &Basic, face: usize) -> bool {
    let r = basic.in_mesh.face_range(face);
    let uv = |c: usize| basic.in_mesh.corner_uv(face, c);
    let p = |c: usize| basic.in_mesh.corner_pos(face, c);
    if r.size() == 4 {
        // every corner triangle of the quad must be sound
        for (a, b, c) in [(0, 2, 1), (1, 3, 2), (2, 0, 3), (3, 1, 0)] {
            if degenerate_tri_2d(uv(a), uv(b), uv(c), 0.0)
                || degenerate_tri_3d(p(a), p(b), p(c), 0.0)
            {
                return true;
            }
        }
        false
    } else {
        degenerate_tri_2d(uv(0), uv(1), uv(2), 0.0)
            || degenerate_tri_3d(p(0), p(1), p(2), 0.0)
    }
}

fn encase_one_face(basic: &Basic, face: usize, table: &mut PieceTable) {
    if let (Some(mask), Some(mats)) =
        (basic.options.mask_material, basic.in_mesh.materials())
    {
        if mats[face] != mask {
            return;
        }
    }
    let r = basic.in_mesh.face_range(face);
    if r.size() > 4 {
        // n-gons are unsupported; skipping is the documented contract
        log::trace!("skipping n-gon input face {face} ({} corners)", r.size());
        return;
    }
    if in_face_degenerate(basic, face) {
        log::trace!("skipping degenerate input face {face}");
        return;
    }
    let Some(wind) = basic.in_mesh.face_uv_wind(face) else {
        log::trace!("skipping zero-area input face {face}");
        return;
    };
    let bbox = BBox::from_points(
        (0..r.size()).map(|c| basic.in_mesh.corner_uv(face, c)),
    );
    let t_min = (bbox.min.x.floor() as i32, bbox.min.y.floor() as i32);
    let t_max = (bbox.max.x.floor() as i32, bbox.max.y.floor() as i32);
    for ty in t_min.1..=t_max.1 {
        for tx in t_min.0..=t_max.0 {
            let Ok(stamp_tile) = Tile::new(tx, ty) else {
                log::trace!("input face {face} spans out-of-range tile ({tx}, {ty})");
                continue;
            };
            let local = bbox.offset(-stamp_tile.origin());
            let candidates = basic.map.quad_tree().query(&local);
            for &map_face in &candidates.interior {
                probe_candidate(basic, face, wind, &bbox, stamp_tile, 0, 0, map_face, table);
            }
            for &map_face in candidates.edge {
                for dy in -1..=1 {
                    for dx in -1..=1 {
                        probe_candidate(
                            basic, face, wind, &bbox, stamp_tile, dx, dy, map_face,
                            table,
                        );
                    }
                }
            }
        }
    }
}

/// Tests one candidate map face in one tile instance and records the
/// encasement on success
#[allow(clippy::too_many_arguments)]
fn probe_candidate(
    basic: &Basic,
    face: usize,
    wind: bool,
    bbox: &BBox,
    stamp_tile: Tile,
    dx: i32,
    dy: i32,
    map_face: u32,
    table: &mut PieceTable,
) {
    let Ok(tile) = Tile::new(stamp_tile.x() + dx, stamp_tile.y() + dy) else {
        return;
    };
    if basic.map.mesh().face_range(map_face as usize).size() > 4 {
        log::trace!("skipping n-gon map face {map_face}");
        return;
    }
    let local = bbox.offset(-tile.origin());
    if !local.intersects(&basic.map.face_bboxes()[map_face as usize]) {
        return;
    }
    let in_uvs = in_face_uvs(basic, face, tile);
    let Some(kind) =
        classify_overlap(basic, &in_uvs, face, map_face as usize)
    else {
        return;
    };
    table.add(
        map_face,
        tile,
        EncasingInFace {
            face: face as u32,
            wind,
            kind,
        },
    );
}

/// Builds the full piece array: job-parallel encasement, then a serial
/// link of the per-job tables (dedup across job boundaries)
pub fn build_in_pieces(
    basic: &Basic,
    pool: &dyn ThreadPool,
) -> Result<Vec<InPiece>, Error> {
    let tables = run_ranged(pool, basic.in_mesh.face_count(), |_, range| {
        let mut table = PieceTable::default();
        for face in range {
            encase_one_face(basic, face, &mut table);
        }
        Ok(table)
    })?;

    let mut linked = PieceTable::default();
    for table in tables {
        for piece in table.pieces {
            for f in piece.in_faces {
                linked.add(piece.map_face, piece.tile, f);
            }
        }
    }
    log::debug!("encasement found {} pieces", linked.pieces.len());
    Ok(linked.pieces)
}

/// Splits pieces into the direct population (fully enclosed map faces) and
/// the clip population (everything touching an input-face boundary)
pub fn split_pieces(pieces: &[InPiece]) -> (Vec<InPiece>, Vec<InPiece>) {
    let mut direct = vec![];
    let mut clipped = vec![];
    for piece in pieces {
        let (d, c): (Vec<_>, Vec<_>) = piece
            .in_faces
            .iter()
            .partition(|f| f.kind == OverlapKind::MapInsideIn);
        if !d.is_empty() {
            direct.push(InPiece {
                map_face: piece.map_face,
                tile: piece.tile,
                in_faces: d.into_iter().copied().collect(),
            });
        }
        if !c.is_empty() {
            clipped.push(InPiece {
                map_face: piece.map_face,
                tile: piece.tile,
                in_faces: c.into_iter().copied().collect(),
            });
        }
    }
    (direct, clipped)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn point_in_poly_basics() {
        let square = [
            Vector2::new(0.0, 0.0),
            Vector2::new(1.0, 0.0),
            Vector2::new(1.0, 1.0),
            Vector2::new(0.0, 1.0),
        ];
        assert!(point_in_poly(&square, Vector2::new(0.5, 0.5)));
        assert!(!point_in_poly(&square, Vector2::new(1.5, 0.5)));
        // boundary counts as inside
        assert!(point_in_poly(&square, Vector2::new(1.0, 0.5)));
    }

    #[test]
    fn edges_cross_needs_proper_crossing() {
        let cross = edges_cross(
            Vector2::new(0.0, 0.0),
            Vector2::new(1.0, 1.0),
            Vector2::new(0.0, 1.0),
            Vector2::new(1.0, 0.0),
        );
        assert!(cross);
        // touching at an endpoint is not a proper crossing
        let touch = edges_cross(
            Vector2::new(0.0, 0.0),
            Vector2::new(1.0, 0.0),
            Vector2::new(1.0, 0.0),
            Vector2::new(2.0, 1.0),
        );
        assert!(!touch);
    }
}
