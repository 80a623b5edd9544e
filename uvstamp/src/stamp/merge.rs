//! Vertex merge table: deduplicating buffer corners into output vertices
//!
//! Buffer corners produced by different jobs (or in different tiles) can be
//! the *same* output vertex — an input vertex seen under the same map face,
//! the same edge-pair intersection, and so on.  The table maps a canonical
//! vertex key to one [`VertMerge`] record with find-or-add semantics: the
//! first occurrence stores its provenance (that corner is what attribute
//! interpolation later reads), subsequent occurrences only bump a counter.
//!
//! Intersection vertices live in their own shard because they need the
//! post-pass *snap*: near-coincident intersections sharing an edge are
//! redirected onto one canonical representative, killing the degenerate
//! micro-edges that would otherwise appear along clipped boundaries.

use super::bufmesh::{BufCorner, BufMesh, InOrMapVert, OnEdgeVert};
use super::encase::InPiece;
use super::pool::{run_ranged, ThreadPool};
use super::Basic;
use crate::tile::Tile;
use crate::Error;
use nalgebra::Vector2;
use std::collections::HashMap;

/// Tolerance (UV units) for unifying near-duplicate intersection vertices
///
/// The reference behavior leaves this open; it is pinned to the clipper's
/// alpha snap threshold so a point that *would* have snapped to an endpoint
/// during clipping also snaps during merging.
pub const SNAP_EPSILON: f32 = crate::clip::SNAP_THRESHOLD;

/// Canonical identity of one output vertex
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
pub enum VertKey {
    /// An input vertex seen under a map face
    InVert {
        /// Input mesh vertex id
        in_vert: u32,
        /// Map face id
        map_face: u32,
    },
    /// A map vertex seen under an input face
    MapVert {
        /// Map mesh vertex id
        map_vert: u32,
        /// Input face id
        in_face: u32,
    },
    /// An input vertex lying on a map edge
    InVertOnMapEdge {
        /// Input mesh vertex id
        in_vert: u32,
        /// Map mesh edge id
        map_edge: u32,
    },
    /// A map vertex lying on an input edge
    MapVertOnInEdge {
        /// Map mesh vertex id
        map_vert: u32,
        /// Input mesh edge id
        in_edge: u32,
    },
    /// Coincident input and map vertices
    Overlap {
        /// Input mesh vertex id
        in_vert: u32,
        /// Map mesh vertex id
        map_vert: u32,
    },
    /// The intersection of an input edge and a map edge
    Intersect {
        /// Input mesh edge id
        in_edge: u32,
        /// Map mesh edge id
        map_edge: u32,
    },
}

/// A vertex key qualified by its tile instance
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
pub struct MergeKey {
    /// Tile the vertex was stamped in
    pub tile: Tile,
    /// Canonical identity within the tile
    pub key: VertKey,
}

/// Which buffer corner a merge entry was first seen at
#[derive(Copy, Clone, Debug)]
pub struct MergeCorner {
    /// Buffer mesh index within its set
    pub buf: u8,
    /// True when the corner came from the clipped piece set
    pub clipped: bool,
    /// Buffer face index
    pub face: u32,
    /// Corner within the buffer face
    pub corner: u32,
}

/// One deduplicated output vertex
#[derive(Clone, Debug)]
pub struct VertMerge {
    /// Canonical key
    pub key: MergeKey,
    /// First-seen provenance; authoritative for interpolation
    pub corner: MergeCorner,
    /// How many buffer corners mapped here (validation)
    pub corner_count: u32,
    /// Excluded from output when set
    pub removed: bool,
    /// Assigned output vertex index (after assembly begins)
    pub out_vert: u32,
}

/// An intersection vertex, with its snap redirection
#[derive(Clone, Debug)]
pub struct VertMergeIntersect {
    /// Common merge record
    pub core: VertMerge,
    /// Tile-local position, used for snap distance tests
    pub pos: Vector2<f32>,
    /// Redirection to a lower-indexed canonical representative
    pub snap_to: Option<u32>,
}

/// Reference to a merge entry: ordinary shard or intersection shard
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum MergeRef {
    /// Index into [`MergeTable::verts`]
    Vert(u32),
    /// Index into [`MergeTable::intersects`]
    Intersect(u32),
}

/// The full merge table
#[derive(Debug, Default)]
pub struct MergeTable {
    index: HashMap<MergeKey, MergeRef>,
    /// Ordinary merge records, in first-seen order
    pub verts: Vec<VertMerge>,
    /// Intersection records, in first-seen order
    pub intersects: Vec<VertMergeIntersect>,
}

impl MergeTable {
    /// Looks up an entry by key
    pub fn get(&self, key: &MergeKey) -> Option<MergeRef> {
        self.index.get(key).copied()
    }

    /// The common record behind a reference
    pub fn entry(&self, r: MergeRef) -> &VertMerge {
        match r {
            MergeRef::Vert(i) => &self.verts[i as usize],
            MergeRef::Intersect(i) => &self.intersects[i as usize].core,
        }
    }

    /// Mutable common record behind a reference
    pub fn entry_mut(&mut self, r: MergeRef) -> &mut VertMerge {
        match r {
            MergeRef::Vert(i) => &mut self.verts[i as usize],
            MergeRef::Intersect(i) => &mut self.intersects[i as usize].core,
        }
    }

    /// Follows an intersection entry's snap chain to its fixed point
    ///
    /// Chains always point to strictly lower indices, so this terminates.
    pub fn resolve(&self, r: MergeRef) -> MergeRef {
        let MergeRef::Intersect(mut i) = r else { return r };
        while let Some(next) = self.intersects[i as usize].snap_to {
            debug_assert!(next < i, "snap chains must point downwards");
            i = next;
        }
        MergeRef::Intersect(i)
    }

    fn add(
        &mut self,
        key: MergeKey,
        corner: MergeCorner,
        pos: Option<Vector2<f32>>,
    ) {
        match self.index.get(&key) {
            Some(&r) => {
                self.entry_mut(r).corner_count += 1;
            }
            None => {
                let core = VertMerge {
                    key,
                    corner,
                    corner_count: 1,
                    removed: false,
                    out_vert: 0,
                };
                let r = match pos {
                    None => {
                        self.verts.push(core);
                        MergeRef::Vert(self.verts.len() as u32 - 1)
                    }
                    Some(pos) => {
                        self.intersects.push(VertMergeIntersect {
                            core,
                            pos,
                            snap_to: None,
                        });
                        MergeRef::Intersect(self.intersects.len() as u32 - 1)
                    }
                };
                self.index.insert(key, r);
            }
        }
    }
}

/// Computes the canonical key of a buffer corner
pub fn vert_key(
    basic: &Basic,
    piece: &InPiece,
    buf: &BufMesh,
    face: usize,
    corner: usize,
) -> MergeKey {
    let map_mesh = basic.map.mesh();
    let map_face = piece.map_face as usize;
    let key = match buf.corner(face, corner) {
        BufCorner::InOrMap(i) => match buf.in_or_map[i as usize] {
            InOrMapVert::In { in_face, in_corner } => VertKey::InVert {
                in_vert: basic
                    .in_mesh
                    .corner_vert(in_face as usize, in_corner as usize),
                map_face: piece.map_face,
            },
            InOrMapVert::Map { in_face, map_corner } => VertKey::MapVert {
                map_vert: map_mesh.corner_vert(map_face, map_corner as usize),
                in_face,
            },
        },
        BufCorner::OnEdge(i) => match buf.on_edge[i as usize] {
            OnEdgeVert::InOnMapEdge {
                in_face,
                in_corner,
                map_corner,
                ..
            } => VertKey::InVertOnMapEdge {
                in_vert: basic
                    .in_mesh
                    .corner_vert(in_face as usize, in_corner as usize),
                map_edge: map_mesh.corner_edge(map_face, map_corner as usize),
            },
            OnEdgeVert::MapOnInEdge {
                in_face,
                in_corner,
                map_corner,
                ..
            } => VertKey::MapVertOnInEdge {
                map_vert: map_mesh.corner_vert(map_face, map_corner as usize),
                in_edge: basic.in_corner_edge(in_face as usize, in_corner as usize),
            },
        },
        BufCorner::Overlap(i) => {
            let v = buf.overlap[i as usize];
            VertKey::Overlap {
                in_vert: basic
                    .in_mesh
                    .corner_vert(v.in_face as usize, v.in_corner as usize),
                map_vert: map_mesh.corner_vert(map_face, v.map_corner as usize),
            }
        }
        BufCorner::Intersect(i) => {
            let v = buf.intersect[i as usize];
            VertKey::Intersect {
                in_edge: basic.in_corner_edge(v.in_face as usize, v.in_corner as usize),
                map_edge: map_mesh.corner_edge(map_face, v.map_corner as usize),
            }
        }
    };
    MergeKey {
        tile: piece.tile,
        key,
    }
}

/// Merges every corner of one buffer-mesh set into the table
///
/// Runs once for the direct set and once for the clipped set; the order of
/// calls fixes which provenance is authoritative.
pub fn merge_verts(
    basic: &Basic,
    pieces: &[InPiece],
    bufs: &[BufMesh],
    clipped: bool,
    table: &mut MergeTable,
) {
    for (buf_idx, buf) in bufs.iter().enumerate() {
        for face in 0..buf.faces.len() {
            let piece = &pieces[buf.faces[face].piece as usize];
            for corner in 0..buf.faces[face].size as usize {
                let key = vert_key(basic, piece, buf, face, corner);
                let pos = match buf.corner(face, corner) {
                    BufCorner::Intersect(i) => {
                        Some(buf.intersect[i as usize].pos)
                    }
                    _ => None,
                };
                debug_assert_eq!(
                    matches!(key.key, VertKey::Intersect { .. }),
                    pos.is_some()
                );
                table.add(
                    key,
                    MergeCorner {
                        buf: buf_idx as u8,
                        clipped,
                        face: face as u32,
                        corner: corner as u32,
                    },
                    pos,
                );
            }
        }
    }
}

/// Snaps near-duplicate intersection vertices onto canonical representatives
///
/// Candidates are limited to intersections sharing an input-edge or
/// map-edge id.  Decisions are computed job-parallel over disjoint ranges
/// (reads only), then applied serially; every redirection targets a strictly
/// lower index, so chains cannot cycle.  Returns the snapped count.
pub fn snap_intersect_verts(
    table: &mut MergeTable,
    pool: &dyn ThreadPool,
) -> Result<usize, Error> {
    let mut by_in_edge: HashMap<(Tile, u32), Vec<u32>> = HashMap::new();
    let mut by_map_edge: HashMap<(Tile, u32), Vec<u32>> = HashMap::new();
    for (i, v) in table.intersects.iter().enumerate() {
        let VertKey::Intersect { in_edge, map_edge } = v.core.key.key else {
            debug_assert!(false, "non-intersect key in intersect shard");
            continue;
        };
        by_in_edge
            .entry((v.core.key.tile, in_edge))
            .or_default()
            .push(i as u32);
        by_map_edge
            .entry((v.core.key.tile, map_edge))
            .or_default()
            .push(i as u32);
    }

    let intersects = &table.intersects;
    let find_target = |i: u32| -> Option<u32> {
        let v = &intersects[i as usize];
        let VertKey::Intersect { in_edge, map_edge } = v.core.key.key else {
            return None;
        };
        let mut best: Option<u32> = None;
        for group in [
            by_in_edge.get(&(v.core.key.tile, in_edge)),
            by_map_edge.get(&(v.core.key.tile, map_edge)),
        ]
        .into_iter()
        .flatten()
        {
            for &j in group {
                if j >= i {
                    break; // groups are in ascending index order
                }
                let d = intersects[j as usize].pos - v.pos;
                if d.norm() < SNAP_EPSILON && best.map(|b| j < b).unwrap_or(true)
                {
                    best = Some(j);
                }
            }
        }
        best
    };

    let decisions = run_ranged(pool, table.intersects.len(), |_, range| {
        let mut out = vec![];
        for i in range {
            if let Some(j) = find_target(i as u32) {
                out.push((i as u32, j));
            }
        }
        Ok(out)
    })?;

    let mut snapped = 0;
    for (i, j) in decisions.into_iter().flatten() {
        debug_assert!(j < i);
        table.intersects[i as usize].snap_to = Some(j);
        snapped += 1;
    }
    if snapped > 0 {
        log::debug!("snapped {snapped} intersection vertices");
    }
    Ok(snapped)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::stamp::pool::StdPool;

    fn key(in_edge: u32, map_edge: u32) -> MergeKey {
        MergeKey {
            tile: Tile::new(0, 0).unwrap(),
            key: VertKey::Intersect { in_edge, map_edge },
        }
    }

    fn corner() -> MergeCorner {
        MergeCorner {
            buf: 0,
            clipped: true,
            face: 0,
            corner: 0,
        }
    }

    #[test]
    fn identical_keys_share_one_entry() {
        let mut table = MergeTable::default();
        let k = MergeKey {
            tile: Tile::new(0, 0).unwrap(),
            key: VertKey::InVert {
                in_vert: 7,
                map_face: 3,
            },
        };
        table.add(k, corner(), None);
        table.add(k, corner(), None);
        table.add(k, corner(), None);
        assert_eq!(table.verts.len(), 1);
        assert_eq!(table.verts[0].corner_count, 3);
        let r = table.get(&k).unwrap();
        assert_eq!(r, MergeRef::Vert(0));
    }

    #[test]
    fn different_tiles_are_different_verts() {
        let mut table = MergeTable::default();
        let k0 = MergeKey {
            tile: Tile::new(0, 0).unwrap(),
            key: VertKey::MapVert {
                map_vert: 1,
                in_face: 2,
            },
        };
        let k1 = MergeKey {
            tile: Tile::new(1, 0).unwrap(),
            ..k0
        };
        table.add(k0, corner(), None);
        table.add(k1, corner(), None);
        assert_eq!(table.verts.len(), 2);
    }

    #[test]
    fn snap_targets_lower_indices_and_chains_terminate() {
        let mut table = MergeTable::default();
        // three near-coincident intersections on the same input edge
        let p = Vector2::new(0.5, 0.5);
        for (i, off) in [0.0f32, 0.00003, 0.00006].iter().enumerate() {
            table.add(
                key(1, 10 + i as u32),
                corner(),
                Some(p + Vector2::new(*off, 0.0)),
            );
        }
        // and one far away on the same edge
        table.add(key(1, 99), corner(), Some(Vector2::new(0.9, 0.5)));
        let pool = StdPool::with_threads(2);
        let snapped = snap_intersect_verts(&mut table, &pool).unwrap();
        assert_eq!(snapped, 2);
        assert_eq!(table.intersects[0].snap_to, None);
        for i in 1..3 {
            let r = table.resolve(MergeRef::Intersect(i));
            assert_eq!(r, MergeRef::Intersect(0));
            let MergeRef::Intersect(t) = r else { unreachable!() };
            assert!(table.intersects[t as usize].snap_to.is_none());
        }
        assert_eq!(table.intersects[3].snap_to, None);
    }
}
