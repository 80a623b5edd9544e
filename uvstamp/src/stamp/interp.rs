//! Attribute interpolation with a one-slot resolution cache
//!
//! Every output corner resolves each attribute by exactly one rule — direct
//! copy, linear interpolation along an edge, or barycentric interpolation
//! across a triangle — chosen by the corner's structural type and the
//! attribute's source origin.  Resolving the rule (source indices, weights)
//! is the expensive part and is identical for every column of the same
//! corner and origin, so an [`InterpCache`] holds the last resolution and
//! is reused until the corner changes.
//!
//! Position is special: it combines an input-surface base point with a
//! displacement along the interpolated surface normal by the map's `w`
//! height, and is resolved here too ([`resolve_position`]).

use super::bufmesh::{
    BufCorner, BufMesh, InOrMapVert, IntersectVert, OnEdgeVert, OverlapVert,
};
use super::encase::InPiece;
use super::Basic;
use crate::geom::face_barycentric;
use crate::mesh::attrib::{AttribData, Domain};
use crate::mesh::Mesh;
use arrayvec::ArrayVec;
use nalgebra::{Vector2, Vector3};

/// The two interpolation sources an attribute can come from
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SrcOrigin {
    /// The input mesh
    In,
    /// The map mesh
    Map,
}

/// A typed view of one buffer corner's vertex record
#[derive(Copy, Clone, Debug)]
pub enum BufVertData {
    /// Untouched input or map vertex
    InOrMap(InOrMapVert),
    /// Vertex on the other mesh's edge
    OnEdge(OnEdgeVert),
    /// Coincident input and map vertices
    Overlap(OverlapVert),
    /// Edge-pair intersection
    Intersect(IntersectVert),
}

/// Fetches the typed vertex record behind a buffer corner
pub fn vert_data(buf: &BufMesh, face: usize, corner: usize) -> BufVertData {
    match buf.corner(face, corner) {
        BufCorner::InOrMap(i) => BufVertData::InOrMap(buf.in_or_map[i as usize]),
        BufCorner::OnEdge(i) => BufVertData::OnEdge(buf.on_edge[i as usize]),
        BufCorner::Overlap(i) => BufVertData::Overlap(buf.overlap[i as usize]),
        BufCorner::Intersect(i) => {
            BufVertData::Intersect(buf.intersect[i as usize])
        }
    }
}

/// The cached resolution
#[derive(Copy, Clone, Debug, PartialEq)]
enum CacheState {
    Empty,
    CopyIn { src: u32 },
    CopyMap { src: u32 },
    LerpIn { a: u32, b: u32, t: f32 },
    LerpMap { a: u32, b: u32, t: f32 },
    TriIn { tri: [u32; 3], bc: Vector3<f32> },
    TriMap { tri: [u32; 3], bc: Vector3<f32> },
}

impl CacheState {
    fn kind(&self) -> u8 {
        match self {
            CacheState::Empty => 0,
            CacheState::CopyIn { .. } => 1,
            CacheState::CopyMap { .. } => 2,
            CacheState::LerpIn { .. } => 3,
            CacheState::LerpMap { .. } => 4,
            CacheState::TriIn { .. } => 5,
            CacheState::TriMap { .. } => 6,
        }
    }
}

/// One-slot interpolation cache, scoped to a single (corner, origin) pair
///
/// Build one per corner per origin, then feed it every attribute column of
/// that corner; the resolution happens once.
#[derive(Debug)]
pub struct InterpCache {
    domain: Domain,
    origin: SrcOrigin,
    state: CacheState,
}

fn corner_or_vert(mesh: &Mesh, domain: Domain, corner_idx: usize) -> u32 {
    if domain == Domain::Vert {
        mesh.corner_verts()[corner_idx]
    } else {
        corner_idx as u32
    }
}

fn face_uvs_of(mesh: &Mesh, face: usize, offset: Vector2<f32>) -> ArrayVec<Vector2<f32>, 4> {
    let r = mesh.face_range(face);
    (0..r.size()).map(|c| mesh.corner_uv(face, c) - offset).collect()
}

fn map_face_uvs(mesh: &Mesh, face: usize) -> ArrayVec<Vector2<f32>, 4> {
    let r = mesh.face_range(face);
    (0..r.size()).map(|c| mesh.corner_pos(face, c).xy()).collect()
}

impl InterpCache {
    /// Builds an empty cache for one domain and source origin
    pub fn new(domain: Domain, origin: SrcOrigin) -> Self {
        debug_assert!(matches!(domain, Domain::Corner | Domain::Vert));
        Self {
            domain,
            origin,
            state: CacheState::Empty,
        }
    }

    fn copy_in(&mut self, basic: &Basic, in_face: usize, in_corner: usize) {
        let r = basic.in_mesh.face_range(in_face);
        let src =
            corner_or_vert(basic.in_mesh, self.domain, r.start + in_corner);
        self.state = CacheState::CopyIn { src };
    }

    fn copy_map(&mut self, basic: &Basic, map_face: usize, map_corner: usize) {
        let mesh = basic.map.mesh();
        let r = mesh.face_range(map_face);
        let src = corner_or_vert(mesh, self.domain, r.start + map_corner);
        self.state = CacheState::CopyMap { src };
    }

    fn lerp_in(&mut self, basic: &Basic, in_face: usize, in_corner: usize, t: f32) {
        let r = basic.in_mesh.face_range(in_face);
        let a = corner_or_vert(basic.in_mesh, self.domain, r.start + in_corner);
        let b = corner_or_vert(
            basic.in_mesh,
            self.domain,
            r.start + r.next_corner(in_corner),
        );
        self.state = CacheState::LerpIn { a, b, t };
    }

    fn lerp_map(&mut self, basic: &Basic, map_face: usize, map_corner: usize, t: f32) {
        let mesh = basic.map.mesh();
        let r = mesh.face_range(map_face);
        let a = corner_or_vert(mesh, self.domain, r.start + map_corner);
        let b = corner_or_vert(mesh, self.domain, r.start + r.next_corner(map_corner));
        self.state = CacheState::LerpMap { a, b, t };
    }

    /// Barycentric over the *input* face, sampled at a map vertex's UV
    fn tri_in(
        &mut self,
        basic: &Basic,
        piece: &InPiece,
        map_corner: usize,
        in_face: usize,
    ) {
        let p = basic
            .map
            .mesh()
            .corner_pos(piece.map_face as usize, map_corner)
            .xy();
        let uvs = face_uvs_of(basic.in_mesh, in_face, piece.tile.origin());
        let (tri, bc) = face_barycentric(&uvs, p);
        let r = basic.in_mesh.face_range(in_face);
        let tri = tri.map(|c| {
            corner_or_vert(basic.in_mesh, self.domain, r.start + c as usize)
        });
        self.state = CacheState::TriIn { tri, bc };
    }

    /// Barycentric over the *map* face, sampled at an input corner's UV
    fn tri_map(
        &mut self,
        basic: &Basic,
        piece: &InPiece,
        in_face: usize,
        in_corner: usize,
    ) {
        let p = basic.in_mesh.corner_uv(in_face, in_corner)
            - piece.tile.origin();
        let mesh = basic.map.mesh();
        let uvs = map_face_uvs(mesh, piece.map_face as usize);
        let (tri, bc) = face_barycentric(&uvs, p);
        let r = mesh.face_range(piece.map_face as usize);
        let tri =
            tri.map(|c| corner_or_vert(mesh, self.domain, r.start + c as usize));
        self.state = CacheState::TriMap { tri, bc };
    }

    /// Ensures the cached resolution matches this corner's rule
    fn update(&mut self, basic: &Basic, piece: &InPiece, vert: &BufVertData) {
        let wanted: CacheState = match (vert, self.origin) {
            (BufVertData::InOrMap(InOrMapVert::In { .. }), SrcOrigin::In) => {
                CacheState::CopyIn { src: 0 }
            }
            (BufVertData::InOrMap(InOrMapVert::In { .. }), SrcOrigin::Map) => {
                CacheState::TriMap {
                    tri: [0; 3],
                    bc: Vector3::zeros(),
                }
            }
            (BufVertData::InOrMap(InOrMapVert::Map { .. }), SrcOrigin::In) => {
                CacheState::TriIn {
                    tri: [0; 3],
                    bc: Vector3::zeros(),
                }
            }
            (BufVertData::InOrMap(InOrMapVert::Map { .. }), SrcOrigin::Map) => {
                CacheState::CopyMap { src: 0 }
            }
            (BufVertData::OnEdge(OnEdgeVert::InOnMapEdge { .. }), SrcOrigin::In) => {
                CacheState::CopyIn { src: 0 }
            }
            (BufVertData::OnEdge(OnEdgeVert::InOnMapEdge { .. }), SrcOrigin::Map) => {
                CacheState::LerpMap { a: 0, b: 0, t: 0.0 }
            }
            (BufVertData::OnEdge(OnEdgeVert::MapOnInEdge { .. }), SrcOrigin::In) => {
                CacheState::LerpIn { a: 0, b: 0, t: 0.0 }
            }
            (BufVertData::OnEdge(OnEdgeVert::MapOnInEdge { .. }), SrcOrigin::Map) => {
                CacheState::CopyMap { src: 0 }
            }
            (BufVertData::Overlap(_), SrcOrigin::In) => {
                CacheState::CopyIn { src: 0 }
            }
            (BufVertData::Overlap(_), SrcOrigin::Map) => {
                CacheState::CopyMap { src: 0 }
            }
            (BufVertData::Intersect(_), SrcOrigin::In) => {
                CacheState::LerpIn { a: 0, b: 0, t: 0.0 }
            }
            (BufVertData::Intersect(_), SrcOrigin::Map) => {
                CacheState::LerpMap { a: 0, b: 0, t: 0.0 }
            }
        };
        if self.state.kind() == wanted.kind() {
            return; // cache hit: same rule, same corner
        }
        match (vert, self.origin) {
            (BufVertData::InOrMap(InOrMapVert::In { in_face, in_corner }), SrcOrigin::In) => {
                self.copy_in(basic, *in_face as usize, *in_corner as usize);
            }
            (BufVertData::InOrMap(InOrMapVert::In { in_face, in_corner }), SrcOrigin::Map) => {
                self.tri_map(basic, piece, *in_face as usize, *in_corner as usize);
            }
            (BufVertData::InOrMap(InOrMapVert::Map { in_face, map_corner }), SrcOrigin::In) => {
                self.tri_in(basic, piece, *map_corner as usize, *in_face as usize);
            }
            (BufVertData::InOrMap(InOrMapVert::Map { map_corner, .. }), SrcOrigin::Map) => {
                self.copy_map(basic, piece.map_face as usize, *map_corner as usize);
            }
            (
                BufVertData::OnEdge(OnEdgeVert::InOnMapEdge {
                    in_face, in_corner, ..
                }),
                SrcOrigin::In,
            ) => {
                self.copy_in(basic, *in_face as usize, *in_corner as usize);
            }
            (
                BufVertData::OnEdge(OnEdgeVert::InOnMapEdge {
                    map_corner, t_map, ..
                }),
                SrcOrigin::Map,
            ) => {
                self.lerp_map(
                    basic,
                    piece.map_face as usize,
                    *map_corner as usize,
                    *t_map,
                );
            }
            (
                BufVertData::OnEdge(OnEdgeVert::MapOnInEdge {
                    in_face, in_corner, t_in, ..
                }),
                SrcOrigin::In,
            ) => {
                self.lerp_in(basic, *in_face as usize, *in_corner as usize, *t_in);
            }
            (
                BufVertData::OnEdge(OnEdgeVert::MapOnInEdge { map_corner, .. }),
                SrcOrigin::Map,
            ) => {
                self.copy_map(basic, piece.map_face as usize, *map_corner as usize);
            }
            (BufVertData::Overlap(v), SrcOrigin::In) => {
                self.copy_in(basic, v.in_face as usize, v.in_corner as usize);
            }
            (BufVertData::Overlap(v), SrcOrigin::Map) => {
                self.copy_map(basic, piece.map_face as usize, v.map_corner as usize);
            }
            (BufVertData::Intersect(v), SrcOrigin::In) => {
                self.lerp_in(basic, v.in_face as usize, v.in_corner as usize, v.t_in);
            }
            (BufVertData::Intersect(v), SrcOrigin::Map) => {
                self.lerp_map(
                    basic,
                    piece.map_face as usize,
                    v.map_corner as usize,
                    v.t_map,
                );
            }
        }
    }

    /// Interpolates one attribute value for the corner this cache is scoped
    /// to, resolving the rule on first use
    pub fn interp(
        &mut self,
        basic: &Basic,
        piece: &InPiece,
        vert: &BufVertData,
        dest: &mut AttribData,
        dest_idx: usize,
        src: &AttribData,
    ) {
        self.update(basic, piece, vert);
        match self.state {
            CacheState::Empty => debug_assert!(false, "cache not resolved"),
            CacheState::CopyIn { src: s } | CacheState::CopyMap { src: s } => {
                dest.copy_from(dest_idx, src, s as usize);
            }
            CacheState::LerpIn { a, b, t } | CacheState::LerpMap { a, b, t } => {
                dest.lerp_from(dest_idx, src, a as usize, b as usize, t);
            }
            CacheState::TriIn { tri, bc } | CacheState::TriMap { tri, bc } => {
                dest.tri_from(
                    dest_idx,
                    src,
                    [tri[0] as usize, tri[1] as usize, tri[2] as usize],
                    bc,
                );
            }
        }
    }
}

fn map_w(basic: &Basic, map_face: usize, map_corner: usize) -> f32 {
    basic.map.mesh().corner_pos(map_face, map_corner).z
}

fn lerp_normal(a: Vector3<f32>, b: Vector3<f32>, t: f32) -> Vector3<f32> {
    let n = a.lerp(&b, t);
    let len = n.norm();
    if len > 0.0 {
        n / len
    } else {
        a
    }
}

/// Resolves the final 3D position of a buffer corner
///
/// The base point lies on the input surface (the corner's own vertex, an
/// edge point, or a barycentric interior point); the map's `w` height then
/// displaces it along the interpolated shading normal, scaled by
/// `w_scale` and clamped to `receive_len` when set.
pub fn resolve_position(
    basic: &Basic,
    piece: &InPiece,
    buf: &BufMesh,
    face: usize,
    corner: usize,
) -> Vector3<f32> {
    let map_face = piece.map_face as usize;
    let map_r = basic.map.mesh().face_range(map_face);
    let (base, normal, w) = match vert_data(buf, face, corner) {
        BufVertData::InOrMap(InOrMapVert::In { in_face, in_corner }) => {
            let in_face = in_face as usize;
            let in_corner = in_corner as usize;
            let base = basic.in_mesh.corner_pos(in_face, in_corner);
            let n = basic.in_mesh.shading_normal(in_face, in_corner);
            // interior of the map face: barycentric height
            let p = basic.in_mesh.corner_uv(in_face, in_corner)
                - piece.tile.origin();
            let uvs = map_face_uvs(basic.map.mesh(), map_face);
            let (tri, bc) = face_barycentric(&uvs, p);
            let w = bc.x * map_w(basic, map_face, tri[0] as usize)
                + bc.y * map_w(basic, map_face, tri[1] as usize)
                + bc.z * map_w(basic, map_face, tri[2] as usize);
            (base, n, w)
        }
        BufVertData::InOrMap(InOrMapVert::Map { in_face, map_corner }) => {
            let in_face = in_face as usize;
            let p = basic
                .map
                .mesh()
                .corner_pos(map_face, map_corner as usize)
                .xy();
            let uvs = face_uvs_of(basic.in_mesh, in_face, piece.tile.origin());
            let (tri, bc) = face_barycentric(&uvs, p);
            let pos = |c: u8| basic.in_mesh.corner_pos(in_face, c as usize);
            let base = pos(tri[0]) * bc.x + pos(tri[1]) * bc.y + pos(tri[2]) * bc.z;
            let nrm = |c: u8| basic.in_mesh.shading_normal(in_face, c as usize);
            let mut n = nrm(tri[0]) * bc.x + nrm(tri[1]) * bc.y + nrm(tri[2]) * bc.z;
            let len = n.norm();
            if len > 0.0 {
                n /= len;
            }
            (base, n, map_w(basic, map_face, map_corner as usize))
        }
        BufVertData::OnEdge(OnEdgeVert::InOnMapEdge {
            in_face,
            in_corner,
            map_corner,
            t_map,
        }) => {
            let in_face = in_face as usize;
            let in_corner = in_corner as usize;
            let base = basic.in_mesh.corner_pos(in_face, in_corner);
            let n = basic.in_mesh.shading_normal(in_face, in_corner);
            let mc = map_corner as usize;
            let w_a = map_w(basic, map_face, mc);
            let w_b = map_w(basic, map_face, map_r.next_corner(mc));
            (base, n, w_a + (w_b - w_a) * t_map)
        }
        BufVertData::OnEdge(OnEdgeVert::MapOnInEdge {
            in_face,
            in_corner,
            map_corner,
            t_in,
        }) => {
            let in_face = in_face as usize;
            let in_corner = in_corner as usize;
            let in_r = basic.in_mesh.face_range(in_face);
            let next = in_r.next_corner(in_corner);
            let a = basic.in_mesh.corner_pos(in_face, in_corner);
            let b = basic.in_mesh.corner_pos(in_face, next);
            let n = lerp_normal(
                basic.in_mesh.shading_normal(in_face, in_corner),
                basic.in_mesh.shading_normal(in_face, next),
                t_in,
            );
            (a.lerp(&b, t_in), n, map_w(basic, map_face, map_corner as usize))
        }
        BufVertData::Overlap(v) => {
            let base =
                basic.in_mesh.corner_pos(v.in_face as usize, v.in_corner as usize);
            let n = basic
                .in_mesh
                .shading_normal(v.in_face as usize, v.in_corner as usize);
            (base, n, map_w(basic, map_face, v.map_corner as usize))
        }
        BufVertData::Intersect(v) => {
            let in_face = v.in_face as usize;
            let in_corner = v.in_corner as usize;
            let in_r = basic.in_mesh.face_range(in_face);
            let next = in_r.next_corner(in_corner);
            let a = basic.in_mesh.corner_pos(in_face, in_corner);
            let b = basic.in_mesh.corner_pos(in_face, next);
            let n = lerp_normal(
                basic.in_mesh.shading_normal(in_face, in_corner),
                basic.in_mesh.shading_normal(in_face, next),
                v.t_in,
            );
            let mc = v.map_corner as usize;
            let w_a = map_w(basic, map_face, mc);
            let w_b = map_w(basic, map_face, map_r.next_corner(mc));
            (a.lerp(&b, v.t_in), n, w_a + (w_b - w_a) * v.t_map)
        }
    };
    let mut d = w * basic.options.w_scale;
    if basic.options.receive_len > 0.0 {
        d = d.clamp(-basic.options.receive_len, basic.options.receive_len);
    }
    base + normal * d
}
