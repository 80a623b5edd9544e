//! Per-job buffer meshes with typed, unresolved corner references
//!
//! A [`BufMesh`] holds the faces a single job produced.  Its corners don't
//! name output vertices — those don't exist yet — but *semantic identities*:
//! typed records carrying enough provenance to later resolve both the final
//! position and the attribute values of each corner.  Merge decisions are
//! deferred entirely to the merge table.
//!
//! Faces arrive on two paths: map faces fully enclosed by an input face are
//! appended directly (all corners are map-vertex references), and faces
//! touching an input-face boundary go through the clipper.

use super::encase::{in_face_uvs, map_face_pts, InPiece, OverlapKind};
use super::pool::{run_ranged, ThreadPool};
use super::Basic;
use crate::clip::{self, ClipIds, OutKind};
use crate::Error;
use nalgebra::Vector2;

/// An untouched input or map vertex
#[derive(Copy, Clone, Debug)]
pub enum InOrMapVert {
    /// An input-face corner lying inside the map face
    In {
        /// Input face
        in_face: u32,
        /// Corner within the input face
        in_corner: u8,
    },
    /// A map-face corner lying inside the input face
    Map {
        /// The encasing input face
        in_face: u32,
        /// Corner within the map face
        map_corner: u8,
    },
}

/// A vertex lying exactly on the other mesh's edge
#[derive(Copy, Clone, Debug)]
pub enum OnEdgeVert {
    /// An input vertex on the interior of a map edge
    InOnMapEdge {
        /// Input face
        in_face: u32,
        /// The input corner that is the vertex
        in_corner: u8,
        /// Corner starting the map edge
        map_corner: u8,
        /// Fraction along the map edge
        t_map: f32,
    },
    /// A map vertex on the interior of an input edge
    MapOnInEdge {
        /// Input face
        in_face: u32,
        /// Corner starting the input edge
        in_corner: u8,
        /// The map corner that is the vertex
        map_corner: u8,
        /// Fraction along the input edge
        t_in: f32,
    },
}

impl OnEdgeVert {
    /// The input face this vertex belongs to
    pub fn in_face(&self) -> u32 {
        match *self {
            OnEdgeVert::InOnMapEdge { in_face, .. } => in_face,
            OnEdgeVert::MapOnInEdge { in_face, .. } => in_face,
        }
    }
}

/// A vertex coincident with both an input and a map vertex
#[derive(Copy, Clone, Debug)]
pub struct OverlapVert {
    /// Input face
    pub in_face: u32,
    /// The coincident input corner
    pub in_corner: u8,
    /// The coincident map corner
    pub map_corner: u8,
}

/// A true geometric intersection of an input edge and a map edge
#[derive(Copy, Clone, Debug)]
pub struct IntersectVert {
    /// Resolved position in the tile-local UV frame
    pub pos: Vector2<f32>,
    /// Fraction along the input edge
    pub t_in: f32,
    /// Fraction along the map edge
    pub t_map: f32,
    /// Input face
    pub in_face: u32,
    /// Corner starting the input edge
    pub in_corner: u8,
    /// Corner starting the map edge
    pub map_corner: u8,
}

/// A typed reference to one buffer vertex
///
/// The variant tag doubles as the index's target array in the owning
/// [`BufMesh`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BufCorner {
    /// Index into [`BufMesh::in_or_map`]
    InOrMap(u32),
    /// Index into [`BufMesh::on_edge`]
    OnEdge(u32),
    /// Index into [`BufMesh::overlap`]
    Overlap(u32),
    /// Index into [`BufMesh::intersect`]
    Intersect(u32),
}

/// One buffer face
#[derive(Copy, Clone, Debug)]
pub struct BufFace {
    /// First corner in [`BufMesh::corners`]
    pub start: u32,
    /// Corner count
    pub size: u32,
    /// Index of the piece (within the owning piece set) that produced it
    pub piece: u32,
    /// The encasing input face
    pub in_face: u32,
}

/// Per-job scratch mesh of typed corners
#[derive(Clone, Debug, Default)]
pub struct BufMesh {
    /// Faces, in emission order
    pub faces: Vec<BufFace>,
    /// Corner references, indexed by the faces' spans
    pub corners: Vec<BufCorner>,
    /// Untouched input/map vertices
    pub in_or_map: Vec<InOrMapVert>,
    /// On-edge vertices
    pub on_edge: Vec<OnEdgeVert>,
    /// Coincident vertices
    pub overlap: Vec<OverlapVert>,
    /// Edge-intersection vertices
    pub intersect: Vec<IntersectVert>,
}

impl BufMesh {
    fn begin_face(&mut self, piece: u32, in_face: u32) {
        self.faces.push(BufFace {
            start: self.corners.len() as u32,
            size: 0,
            piece,
            in_face,
        });
    }

    fn end_face(&mut self) {
        let face = self.faces.last_mut().unwrap();
        face.size = self.corners.len() as u32 - face.start;
        debug_assert!(face.size >= 3);
    }

    /// Drops an in-progress face (fewer than 3 usable corners)
    fn abort_face(&mut self) {
        let face = self.faces.pop().unwrap();
        self.corners.truncate(face.start as usize);
    }

    fn push_in_or_map(&mut self, v: InOrMapVert) {
        self.corners
            .push(BufCorner::InOrMap(self.in_or_map.len() as u32));
        self.in_or_map.push(v);
    }

    fn push_on_edge(&mut self, v: OnEdgeVert) {
        self.corners.push(BufCorner::OnEdge(self.on_edge.len() as u32));
        self.on_edge.push(v);
    }

    fn push_overlap(&mut self, v: OverlapVert) {
        self.corners.push(BufCorner::Overlap(self.overlap.len() as u32));
        self.overlap.push(v);
    }

    fn push_intersect(&mut self, v: IntersectVert) {
        self.corners
            .push(BufCorner::Intersect(self.intersect.len() as u32));
        self.intersect.push(v);
    }

    /// The typed corner reference at (face, corner)
    pub fn corner(&self, face: usize, corner: usize) -> BufCorner {
        let f = self.faces[face];
        debug_assert!((corner as u32) < f.size);
        self.corners[f.start as usize + corner]
    }

    /// Total buffer vertex count across all typed arrays
    pub fn vert_count(&self) -> usize {
        self.in_or_map.len()
            + self.on_edge.len()
            + self.overlap.len()
            + self.intersect.len()
    }
}

/// Appends a fully-enclosed map face: every corner is a plain map vertex
fn add_direct(basic: &Basic, piece_idx: u32, piece: &InPiece, buf: &mut BufMesh) {
    let size = basic.map.mesh().face_range(piece.map_face as usize).size();
    for entry in &piece.in_faces {
        debug_assert_eq!(entry.kind, OverlapKind::MapInsideIn);
        buf.begin_face(piece_idx, entry.face);
        for c in 0..size {
            let c = if entry.wind { size - 1 - c } else { c };
            buf.push_in_or_map(InOrMapVert::Map {
                in_face: entry.face,
                map_corner: c as u8,
            });
        }
        buf.end_face();
    }
}

/// Clips the piece's map face against each encasing input face and appends
/// the resulting loops as typed corners
fn add_clipped(
    basic: &Basic,
    piece_idx: u32,
    piece: &InPiece,
    buf: &mut BufMesh,
) -> Result<(), Error> {
    let map_pts = map_face_pts(basic, piece.map_face as usize);
    for entry in &piece.in_faces {
        let in_uvs = in_face_uvs(basic, entry.face as usize, piece.tile);
        let ids = ClipIds {
            in_face: entry.face as usize,
            map_face: piece.map_face as usize,
        };
        let out = clip::clip(&in_uvs, &map_pts, ids)?;
        for face in &out.faces {
            if face.corners.len() < 3 {
                continue;
            }
            buf.begin_face(piece_idx, entry.face);
            let corners: Box<dyn Iterator<Item = &clip::OutCorner>> =
                if entry.wind {
                    Box::new(face.corners.iter().rev())
                } else {
                    Box::new(face.corners.iter())
                };
            for oc in corners {
                match oc.kind {
                    OutKind::OriginClip { corner } => {
                        buf.push_in_or_map(InOrMapVert::In {
                            in_face: entry.face,
                            in_corner: corner as u8,
                        });
                    }
                    OutKind::OriginSubject { corner } => {
                        buf.push_in_or_map(InOrMapVert::Map {
                            in_face: entry.face,
                            map_corner: corner as u8,
                        });
                    }
                    OutKind::Intersect {
                        clip_corner,
                        subj_corner,
                        clip_alpha,
                        subj_alpha,
                    } => {
                        buf.push_intersect(IntersectVert {
                            pos: oc.pos.xy(),
                            t_in: clip_alpha,
                            t_map: subj_alpha,
                            in_face: entry.face,
                            in_corner: clip_corner as u8,
                            map_corner: subj_corner as u8,
                        });
                    }
                    OutKind::OnClipEdge {
                        edge_corner,
                        vert_corner,
                        alpha,
                    } => {
                        buf.push_on_edge(OnEdgeVert::MapOnInEdge {
                            in_face: entry.face,
                            in_corner: edge_corner as u8,
                            map_corner: vert_corner as u8,
                            t_in: alpha,
                        });
                    }
                    OutKind::OnSubjectEdge {
                        edge_corner,
                        vert_corner,
                        alpha,
                    } => {
                        buf.push_on_edge(OnEdgeVert::InOnMapEdge {
                            in_face: entry.face,
                            in_corner: vert_corner as u8,
                            map_corner: edge_corner as u8,
                            t_map: alpha,
                        });
                    }
                    OutKind::OnVert {
                        clip_corner,
                        subj_corner,
                    } => {
                        buf.push_overlap(OverlapVert {
                            in_face: entry.face,
                            in_corner: clip_corner as u8,
                            map_corner: subj_corner as u8,
                        });
                    }
                }
            }
            if buf.faces.last().map(|f| {
                (buf.corners.len() as u32 - f.start) < 3
            }) == Some(true)
            {
                buf.abort_face();
            } else {
                buf.end_face();
            }
        }
    }
    Ok(())
}

/// Builds one buffer mesh per job over the given piece set
///
/// `clipped` selects the clip path; the direct path never fails.  Jobs are
/// private: no shared mutable state exists until the merge stage consumes
/// the returned array.
pub fn build_buf_meshes(
    basic: &Basic,
    pieces: &[InPiece],
    clipped: bool,
    pool: &dyn ThreadPool,
) -> Result<Vec<BufMesh>, Error> {
    let bufs = run_ranged(pool, pieces.len(), |_, range| {
        let mut buf = BufMesh::default();
        for piece_idx in range {
            let piece = &pieces[piece_idx];
            if clipped {
                add_clipped(basic, piece_idx as u32, piece, &mut buf)?;
            } else {
                add_direct(basic, piece_idx as u32, piece, &mut buf);
            }
        }
        Ok(buf)
    })?;
    let faces: usize = bufs.iter().map(|b| b.faces.len()).sum();
    log::debug!(
        "built {} buffer meshes ({} faces, clipped: {clipped})",
        bufs.len(),
        faces
    );
    Ok(bufs)
}
