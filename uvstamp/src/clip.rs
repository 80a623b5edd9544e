//! Re-entrant polygon clipping with cross/bounce classification
//!
//! Clips a *subject* polygon (a map face, carrying `(u, v, w)` positions)
//! against a *clip* polygon (an input face's UV boundary).  The algorithm is
//! a Weiler–Atherton variant: pairwise edge intersection builds linked
//! corner rings for both polygons, every shared point is classified as a
//! crossing or a bounce (including chains of corners that run *along* the
//! other polygon's boundary, which are resolved lazily), and output loops
//! are traced starting from entry crossings only.
//!
//! Corner nodes live in a flat arena; `next`/`prev`/`link` are indices, so
//! the rings can be re-entered and spliced without aliasing concerns.
//!
//! Every output corner carries its provenance: which original corner(s) it
//! came from, and — for points created by the clip — the interpolation
//! parameters along the edges that produced it.

use crate::geom::{det2, signed_area};
use crate::Error;
use nalgebra::{Vector2, Vector3};

/// Distance (in UV units) under which intersection parameters collapse to
/// an endpoint; shared with the merge stage's snap pass
pub const SNAP_THRESHOLD: f32 = 1e-4;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Label {
    None,
    Cross,
    CrossDelayed,
    CrossCandidate,
    Bounce,
    BounceDelayed,
    LeftOn,
    RightOn,
    OnOn,
    OnLeft,
    OnRight,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum CrossDir {
    None,
    Entry,
    Exit,
}

/// Which ring a node belongs to
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Side {
    Clip,
    Subject,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Hand {
    Straight,
    Left,
    Right,
    On,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Neighbour {
    Prev,
    Next,
}

type NodeIdx = u32;

#[derive(Clone, Debug)]
struct Node {
    next: NodeIdx,
    prev: NodeIdx,
    next_origin: NodeIdx,
    prev_origin: NodeIdx,
    link: Option<NodeIdx>,
    pos: Vector3<f32>,
    origin_corner: u32,
    alpha: f32,
    label: Label,
    travel: CrossDir,
    side: Side,
    checked: bool,
    original: bool,
    cross: bool,
    dont_add: bool,
}

impl Node {
    fn new(side: Side) -> Self {
        Self {
            next: 0,
            prev: 0,
            next_origin: 0,
            prev_origin: 0,
            link: None,
            pos: Vector3::zeros(),
            origin_corner: 0,
            alpha: 0.0,
            label: Label::None,
            travel: CrossDir::None,
            side,
            checked: false,
            original: false,
            cross: false,
            dont_add: false,
        }
    }
}

/// Provenance of one output corner
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum OutKind {
    /// An untouched clip-polygon corner (inside the subject)
    OriginClip {
        /// Corner index within the clip polygon
        corner: u32,
    },
    /// An untouched subject-polygon corner (inside the clip region)
    OriginSubject {
        /// Corner index within the subject polygon
        corner: u32,
    },
    /// A true crossing of a clip edge and a subject edge
    Intersect {
        /// Corner starting the crossed clip edge
        clip_corner: u32,
        /// Corner starting the crossed subject edge
        subj_corner: u32,
        /// Parameter along the clip edge, strictly in `(0, 1)`
        clip_alpha: f32,
        /// Parameter along the subject edge, strictly in `(0, 1)`
        subj_alpha: f32,
    },
    /// A subject vertex lying on the interior of a clip edge
    OnClipEdge {
        /// Corner starting the clip edge the vertex lies on
        edge_corner: u32,
        /// The subject corner that is the vertex
        vert_corner: u32,
        /// Parameter along the clip edge
        alpha: f32,
    },
    /// A clip vertex lying on the interior of a subject edge
    OnSubjectEdge {
        /// Corner starting the subject edge the vertex lies on
        edge_corner: u32,
        /// The clip corner that is the vertex
        vert_corner: u32,
        /// Parameter along the subject edge
        alpha: f32,
    },
    /// A clip vertex coincident with a subject vertex
    OnVert {
        /// The clip corner
        clip_corner: u32,
        /// The subject corner
        subj_corner: u32,
    },
}

/// One corner of a clipped output loop
#[derive(Copy, Clone, Debug)]
pub struct OutCorner {
    /// Position, with `z` interpolated from the subject polygon
    pub pos: Vector3<f32>,
    /// Where the corner came from
    pub kind: OutKind,
}

/// One closed output loop
#[derive(Clone, Debug, Default)]
pub struct ClippedFace {
    /// Corners in output winding order
    pub corners: Vec<OutCorner>,
}

/// Result of clipping one subject polygon against one clip polygon
#[derive(Clone, Debug, Default)]
pub struct ClipOutput {
    /// Output loops; empty when the polygons don't overlap
    pub faces: Vec<ClippedFace>,
}

/// Context identifying the faces being clipped, for error reporting
#[derive(Copy, Clone, Debug)]
pub struct ClipIds {
    /// The input face providing the clip polygon
    pub in_face: usize,
    /// The map face providing the subject polygon
    pub map_face: usize,
}

struct Clipper {
    arena: Vec<Node>,
    clip_root: NodeIdx,
    subj_root: NodeIdx,
    ids: ClipIds,
}

enum IntersectAlpha {
    Skew(f32),
    Parallel,
    Colinear,
}

/// Parameter along segment `ab` where it meets the line through `cd`
fn intersect_alpha(
    a: Vector2<f32>,
    b: Vector2<f32>,
    c: Vector2<f32>,
    d: Vector2<f32>,
) -> IntersectAlpha {
    let acd = signed_area(a, c, d);
    let bcd = signed_area(b, c, d);
    let cd_len = (d - c).norm();
    let h_acd = acd / cd_len;
    let h_bcd = bcd / cd_len;
    let a_on_cd = h_acd.abs() < SNAP_THRESHOLD;
    if (h_acd - h_bcd).abs() < SNAP_THRESHOLD {
        return if a_on_cd {
            IntersectAlpha::Colinear
        } else {
            IntersectAlpha::Parallel
        };
    }
    if a_on_cd {
        IntersectAlpha::Skew(0.0)
    } else if h_bcd.abs() < SNAP_THRESHOLD {
        IntersectAlpha::Skew(1.0)
    } else {
        let divisor = acd - bcd;
        debug_assert!(divisor != 0.0);
        IntersectAlpha::Skew(acd / divisor)
    }
}

/// Projection parameter of `c` onto segment `ab`, snapped to the endpoints
fn colinear_alpha(a: Vector2<f32>, b: Vector2<f32>, c: Vector2<f32>) -> f32 {
    let ab = b - a;
    let ac = c - a;
    debug_assert!(ab.norm_squared() > 0.0);
    let alpha = ac.dot(&ab) / ab.dot(&ab);
    let ab_len = ab.norm();
    if (alpha * ab_len).abs() < SNAP_THRESHOLD {
        0.0
    } else if ((1.0 - alpha) * ab_len).abs() < SNAP_THRESHOLD {
        1.0
    } else {
        alpha
    }
}

fn v2(p: Vector3<f32>) -> Vector2<f32> {
    p.xy()
}

impl Clipper {
    fn new(
        clip_pts: &[Vector2<f32>],
        subj_pts: &[Vector3<f32>],
        ids: ClipIds,
    ) -> Result<Self, Error> {
        debug_assert!(clip_pts.len() >= 3 && subj_pts.len() >= 3);
        let mut arena =
            Vec::with_capacity(clip_pts.len() + subj_pts.len() + 8);
        let mut init_ring = |pts: &[Vector3<f32>], side: Side| -> NodeIdx {
            let base = arena.len() as NodeIdx;
            let n = pts.len() as u32;
            for (i, p) in pts.iter().enumerate() {
                let i = i as u32;
                let mut node = Node::new(side);
                node.pos = *p;
                node.origin_corner = i;
                node.original = true;
                node.next = base + (i + 1) % n;
                node.prev = base + if i == 0 { n - 1 } else { i - 1 };
                node.next_origin = node.next;
                node.prev_origin = node.prev;
                arena.push(node);
            }
            base
        };
        let clip_3d: Vec<Vector3<f32>> = clip_pts
            .iter()
            .map(|p| Vector3::new(p.x, p.y, 0.0))
            .collect();
        let clip_root = init_ring(&clip_3d, Side::Clip);
        let subj_root = init_ring(subj_pts, Side::Subject);
        let c = Self {
            arena,
            clip_root,
            subj_root,
            ids,
        };
        // zero-length edges break every predicate below; malformed input
        for &(root, size) in
            &[(clip_root, clip_pts.len()), (subj_root, subj_pts.len())]
        {
            for i in 0..size {
                let a = c.arena[root as usize + i].pos;
                let b = c.arena[root as usize + (i + 1) % size].pos;
                if v2(a) == v2(b) {
                    return Err(Error::DegenerateEdge {
                        in_face: ids.in_face,
                        map_face: ids.map_face,
                    });
                }
            }
        }
        Ok(c)
    }

    fn node(&self, i: NodeIdx) -> &Node {
        &self.arena[i as usize]
    }

    fn node_mut(&mut self, i: NodeIdx) -> &mut Node {
        &mut self.arena[i as usize]
    }

    fn origin_ring(&self, root: NodeIdx) -> Vec<NodeIdx> {
        let mut out = vec![];
        let mut i = root;
        loop {
            out.push(i);
            i = self.node(i).next_origin;
            if i == root {
                break;
            }
        }
        out
    }

    fn full_ring(&self, root: NodeIdx) -> Vec<NodeIdx> {
        let mut out = vec![];
        let mut i = root;
        loop {
            out.push(i);
            i = self.node(i).next;
            if i == root {
                break;
            }
        }
        out
    }

    fn link(&mut self, a: NodeIdx, b: NodeIdx) -> Result<(), Error> {
        if self.node(a).link.is_some() || self.node(b).link.is_some() {
            return Err(Error::AmbiguousVertex {
                in_face: self.ids.in_face,
                map_face: self.ids.map_face,
            });
        }
        self.node_mut(a).link = Some(b);
        self.node_mut(b).link = Some(a);
        Ok(())
    }

    /// Inserts `new` after `at`, ordered by alpha among non-original nodes
    fn insert_after(&mut self, at: NodeIdx, new: NodeIdx, make_original: bool) {
        let mut at = at;
        if !make_original {
            loop {
                let next = self.node(at).next;
                if self.node(next).original
                    || self.node(new).alpha <= self.node(next).alpha
                {
                    break;
                }
                at = next;
            }
        }
        let next = self.node(at).next;
        self.node_mut(new).next = next;
        self.node_mut(at).next = new;
        self.node_mut(next).prev = new;
        self.node_mut(new).prev = at;

        let side = self.node(at).side;
        let origin_corner = self.node(at).origin_corner;
        let next_origin = self.node(at).next_origin;
        let prev_origin = if self.node(at).original {
            at
        } else {
            self.node(at).prev_origin
        };
        let n = self.node_mut(new);
        n.side = side;
        n.original = make_original;
        n.origin_corner = origin_corner;
        n.next_origin = next_origin;
        n.prev_origin = prev_origin;
        if make_original {
            self.node_mut(at).next_origin = new;
            self.node_mut(next_origin).prev_origin = new;
        }
    }

    /// Inserts a copy of `point` on the edge starting at `edge`, linked back
    /// to `point` (a "T" configuration)
    fn insert_t(
        &mut self,
        edge: NodeIdx,
        alpha_edge: f32,
        point: NodeIdx,
    ) -> Result<(), Error> {
        let mut copy = self.node(point).clone();
        copy.alpha = alpha_edge;
        copy.link = None;
        let idx = self.arena.len() as NodeIdx;
        self.arena.push(copy);
        self.link(idx, point)?;
        self.insert_after(edge, idx, false);
        Ok(())
    }

    /// Inserts a new intersection point into both rings (an "X"
    /// configuration)
    fn insert_x(
        &mut self,
        clip: NodeIdx,
        subj: NodeIdx,
        a_clip: f32,
        a_subj: f32,
    ) -> Result<(), Error> {
        // the subject carries 3D positions, so it supplies the point
        let sp = self.node(subj).pos;
        let sn = self.node(self.node(subj).next_origin).pos;
        let pos = sp + (sn - sp) * a_subj;
        let ci = self.arena.len() as NodeIdx;
        let mut cn = Node::new(Side::Clip);
        cn.pos = pos;
        cn.alpha = a_clip;
        self.arena.push(cn);
        let si = self.arena.len() as NodeIdx;
        let mut sn = Node::new(Side::Subject);
        sn.pos = pos;
        sn.alpha = a_subj;
        self.arena.push(sn);
        self.link(ci, si)?;
        self.insert_after(clip, ci, false);
        self.insert_after(subj, si, false);
        Ok(())
    }

    /// Intersects the origin edges starting at `clip` and `subj`
    fn intersect_half_edges(
        &mut self,
        clip: NodeIdx,
        subj: NodeIdx,
    ) -> Result<(), Error> {
        let cp = v2(self.node(clip).pos);
        let cn = v2(self.node(self.node(clip).next_origin).pos);
        let sp = v2(self.node(subj).pos);
        let sn = v2(self.node(self.node(subj).next_origin).pos);

        let ra = intersect_alpha(sp, sn, cp, cn);
        let rb = intersect_alpha(cp, cn, sp, sn);
        match (ra, rb) {
            (IntersectAlpha::Colinear, IntersectAlpha::Colinear) => {
                self.insert_overlap(clip, subj)
            }
            (IntersectAlpha::Skew(a_subj), IntersectAlpha::Skew(a_clip)) => {
                if a_clip > 0.0 && a_clip < 1.0 && a_subj > 0.0 && a_subj < 1.0 {
                    self.insert_x(clip, subj, a_clip, a_subj)
                } else if a_clip == 0.0 && a_subj == 0.0 {
                    self.link(clip, subj)
                } else if a_subj == 0.0 {
                    // subject corner touches the clip edge's line
                    let a_clip = colinear_alpha(cp, cn, sp);
                    if a_clip == 0.0 {
                        self.link(clip, subj)
                    } else if a_clip > 0.0 && a_clip < 1.0 {
                        self.insert_t(clip, a_clip, subj)
                    } else {
                        Ok(())
                    }
                } else if a_clip == 0.0 {
                    let a_subj = colinear_alpha(sp, sn, cp);
                    if a_subj == 0.0 {
                        self.link(clip, subj)
                    } else if a_subj > 0.0 && a_subj < 1.0 {
                        self.insert_t(subj, a_subj, clip)
                    } else {
                        Ok(())
                    }
                } else {
                    Ok(())
                }
            }
            _ => Ok(()),
        }
    }

    /// Handles a pair of colinear edges: split whichever edge interiors
    /// contain the other's endpoint, link coincident endpoints
    fn insert_overlap(
        &mut self,
        clip: NodeIdx,
        subj: NodeIdx,
    ) -> Result<(), Error> {
        let cp = v2(self.node(clip).pos);
        let cn = v2(self.node(self.node(clip).next_origin).pos);
        let sp = v2(self.node(subj).pos);
        let sn = v2(self.node(self.node(subj).next_origin).pos);
        let a_clip = colinear_alpha(cp, cn, sp);
        let a_subj = colinear_alpha(sp, sn, cp);
        let clip_in = a_clip > 0.0 && a_clip < 1.0;
        let subj_in = a_subj > 0.0 && a_subj < 1.0;
        if clip_in && subj_in {
            self.insert_t(clip, a_clip, subj)?;
            self.insert_t(subj, a_subj, clip)?;
        } else if clip_in && (!subj_in || a_subj == 1.0) {
            self.insert_t(clip, a_clip, subj)?;
        } else if subj_in && (!clip_in || a_clip == 1.0) {
            self.insert_t(subj, a_subj, clip)?;
        } else if a_clip == 0.0 && a_subj == 0.0 {
            // both endpoints coincide; tolerate an existing link, another
            // edge pair may have linked them already
            if self.node(clip).link != Some(subj) {
                self.link(clip, subj)?;
            }
        }
        Ok(())
    }

    fn is_link_with_neighbour(
        &self,
        a: NodeIdx,
        b_prev: NodeIdx,
        b_next: NodeIdx,
    ) -> Option<Neighbour> {
        let link = self.node(a).link?;
        if link == b_prev {
            Some(Neighbour::Prev)
        } else if link == b_next {
            Some(Neighbour::Next)
        } else {
            None
        }
    }

    /// Labels every linked subject corner as cross or bounce, deferring
    /// chains that run along the clip boundary
    fn label_cross_or_bounce(&mut self) {
        let ring = self.full_ring(self.subj_root);
        for &s in &ring {
            let Some(c) = self.node(s).link else { continue };
            let s_prev = v2(self.node(self.node(s).prev).pos);
            let point = v2(self.node(s).pos);
            let s_next = v2(self.node(self.node(s).next).pos);
            let sign_next = signed_area(s_prev, point, s_next);
            let turn_s_next = if sign_next == 0.0 {
                Hand::Straight
            } else if sign_next > 0.0 {
                Hand::Left
            } else {
                Hand::Right
            };
            let s_prev_on_c = self.is_link_with_neighbour(
                self.node(s).prev,
                self.node(c).prev,
                self.node(c).next,
            );
            let s_next_on_c = self.is_link_with_neighbour(
                self.node(s).next,
                self.node(c).prev,
                self.node(c).next,
            );
            let c_prev = v2(self.node(self.node(c).prev).pos);
            let c_next = v2(self.node(self.node(c).next).pos);
            let sign_cp0 = signed_area(c_prev, s_prev, point);
            let sign_cp1 = signed_area(c_prev, point, s_next);
            let sign_cn0 = signed_area(c_next, s_prev, point);
            let sign_cn1 = signed_area(c_next, point, s_next);
            let (turn_c_prev, turn_c_next) = match turn_s_next {
                Hand::Straight | Hand::Left => (
                    if sign_cp0 < 0.0 || sign_cp1 < 0.0 {
                        Hand::Right
                    } else {
                        Hand::Left
                    },
                    if sign_cn0 < 0.0 || sign_cn1 < 0.0 {
                        Hand::Right
                    } else {
                        Hand::Left
                    },
                ),
                _ => (
                    if sign_cp0 > 0.0 || sign_cp1 > 0.0 {
                        Hand::Left
                    } else {
                        Hand::Right
                    },
                    if sign_cn0 > 0.0 || sign_cn1 > 0.0 {
                        Hand::Left
                    } else {
                        Hand::Right
                    },
                ),
            };
            let label = match (s_prev_on_c, s_next_on_c) {
                (Some(_), Some(_)) => Label::OnOn,
                (Some(which), None) => {
                    let c_turn = if which == Neighbour::Prev {
                        turn_c_next
                    } else {
                        turn_c_prev
                    };
                    if c_turn == Hand::Right {
                        Label::OnLeft
                    } else {
                        Label::OnRight
                    }
                }
                (None, Some(which)) => {
                    let c_turn = if which == Neighbour::Prev {
                        turn_c_next
                    } else {
                        turn_c_prev
                    };
                    if c_turn == Hand::Right {
                        Label::LeftOn
                    } else {
                        Label::RightOn
                    }
                }
                (None, None) => {
                    if turn_c_prev == turn_c_next {
                        Label::Bounce
                    } else {
                        self.node_mut(s).cross = true;
                        self.node_mut(c).cross = true;
                        Label::Cross
                    }
                }
            };
            self.node_mut(s).label = label;
            self.node_mut(c).label = label;
        }

        // resolve boundary chains: a LeftOn/RightOn start paired with the
        // next OnLeft/OnRight end becomes one delayed crossing or bounce
        let start = ring.iter().copied().find(|&s| {
            !matches!(
                self.node(s).label,
                Label::OnOn | Label::OnLeft | Label::OnRight
            )
        });
        let Some(start) = start else { return };
        let ring = self.full_ring(start);
        let mut chain_start: Option<NodeIdx> = None;
        for &s in &ring {
            let label = self.node(s).label;
            if self.node(s).link.is_none()
                || label == Label::Cross
                || label == Label::Bounce
            {
                debug_assert!(chain_start.is_none());
                continue;
            }
            match chain_start {
                None => {
                    if label == Label::LeftOn || label == Label::RightOn {
                        chain_start = Some(s);
                    }
                }
                Some(cs) if label != Label::OnOn => {
                    debug_assert!(
                        label == Label::OnLeft || label == Label::OnRight
                    );
                    let same = (self.node(cs).label == Label::LeftOn)
                        == (label == Label::OnLeft);
                    let new = if same {
                        Label::BounceDelayed
                    } else {
                        Label::CrossDelayed
                    };
                    for &n in &[s, cs] {
                        let link = self.node(n).link.unwrap();
                        self.node_mut(n).label = new;
                        self.node_mut(link).label = new;
                    }
                    chain_start = None;
                }
                Some(_) => (),
            }
        }
    }

    /// Ray-cast winding test against the origin ring rooted at `root`
    ///
    /// The ray points along +Y; corners exactly on the ray's line are
    /// resolved by comparing the sides of their non-on neighbours (possibly
    /// across a chain of on-line corners).
    fn is_point_in_face(&self, root: NodeIdx, point: Vector3<f32>) -> bool {
        let p = v2(point);
        let ray_b = p + Vector2::new(0.0, 1.0);
        let ring = self.origin_ring(root);
        let size = ring.len();
        let hand: Vec<Hand> = ring
            .iter()
            .map(|&i| {
                // +Y ray, so the side test is just the X offset
                let dx = self.node(i).pos.x - p.x;
                if dx == 0.0 {
                    Hand::On
                } else if dx > 0.0 {
                    Hand::Right
                } else {
                    Hand::Left
                }
            })
            .collect();
        let Some(start) = (0..size).find(|&i| hand[i] != Hand::On) else {
            return false; // ring colinear with the ray
        };
        let mut wind = 0u32;
        let mut chain: Option<(Hand, bool)> = None;
        for k in 0..size {
            let i = (start + k) % size;
            let i_next = (i + 1) % size;
            let i_prev = if i == 0 { size - 1 } else { i - 1 };
            let a = v2(self.node(ring[i]).pos);
            let b = v2(self.node(ring[i_next]).pos);
            if hand[i] != Hand::On {
                if hand[i_next] != Hand::On
                    && hand[i] != hand[i_next]
                    && (a.y >= p.y || b.y >= p.y)
                {
                    let acd = signed_area(p, a, b);
                    let bcd = signed_area(ray_b, a, b);
                    let divisor = acd - bcd;
                    if divisor != 0.0 && acd / divisor >= 0.0 {
                        wind += 1;
                    }
                }
                continue;
            }
            let prev_on = hand[i_prev] == Hand::On;
            let next_on = hand[i_next] == Hand::On;
            if prev_on && next_on {
                continue;
            }
            let on_ray = a.y >= p.y;
            if !prev_on && !next_on {
                if on_ray && hand[i_prev] != hand[i_next] {
                    wind += 1;
                }
                continue;
            }
            let not_on = if prev_on { hand[i_next] } else { hand[i_prev] };
            match chain.take() {
                Some((chain_hand, chain_on_ray)) => {
                    if on_ray && chain_on_ray && chain_hand != not_on {
                        wind += 1;
                    }
                }
                None => chain = Some((not_on, on_ray)),
            }
        }
        wind % 2 == 1
    }

    /// Assigns entry/exit directions to crossings on the ring rooted at
    /// `root`, using point-in-face tests against `other_root`
    ///
    /// Returns whether the ring's start sample was inside the other face,
    /// and whether the two rings turned out to be identical.
    fn label_cross_dir(
        &mut self,
        root: NodeIdx,
        other_root: NodeIdx,
    ) -> Result<(bool, bool), Error> {
        // the start corner must not be a shared point, so that containment
        // is unambiguous there
        let ring = self.full_ring(root);
        let start =
            ring.iter().copied().find(|&i| self.node(i).link.is_none());
        let (start, identical) = match start {
            Some(s) => (s, false),
            None => match self.make_unshared_start(root)? {
                Some(s) => (s, false),
                None => return Ok((false, true)),
            },
        };
        let mut inside = self.is_point_in_face(other_root, self.node(start).pos);
        let start_inside = inside;
        let ring = self.full_ring(start);
        let mut chain_active = false;
        let mut chain_travel = CrossDir::None;
        for &i in &ring {
            if self.node(i).link.is_none() {
                continue;
            }
            let mut cross = false;
            let label = self.node(i).label;
            if label == Label::CrossDelayed || label == Label::BounceDelayed {
                if !chain_active {
                    chain_travel = if inside {
                        CrossDir::Exit
                    } else {
                        CrossDir::Entry
                    };
                }
                match label {
                    Label::BounceDelayed => {
                        if chain_travel == CrossDir::Exit {
                            self.node_mut(i).label = Label::CrossCandidate;
                        }
                        cross = true;
                    }
                    Label::CrossDelayed => {
                        self.node_mut(i).travel = chain_travel;
                        if (chain_active && chain_travel == CrossDir::Entry)
                            || (!chain_active && chain_travel == CrossDir::Exit)
                        {
                            self.node_mut(i).cross = true;
                        }
                    }
                    _ => unreachable!(),
                }
                chain_active = !chain_active;
            }
            if self.node(i).cross || cross {
                self.node_mut(i).travel = if inside {
                    CrossDir::Exit
                } else {
                    CrossDir::Entry
                };
                inside = !inside;
            }
        }
        Ok((start_inside, identical))
    }

    /// Every corner of the ring is a shared point; finds an edge not shared
    /// with the other ring and inserts its midpoint as a start sample.
    /// Returns `None` when every edge is common (identical faces).
    fn make_unshared_start(
        &mut self,
        root: NodeIdx,
    ) -> Result<Option<NodeIdx>, Error> {
        let ring = self.full_ring(root);
        let uncommon = ring.iter().copied().find(|&a| {
            let a_link = self.node(a).link;
            let b_link = self.node(self.node(a).next).link;
            match (a_link, b_link) {
                (Some(al), Some(bl)) => {
                    self.node(al).next != bl && self.node(al).prev != bl
                }
                _ => true,
            }
        });
        let Some(a) = uncommon else {
            return Ok(None);
        };
        let b = self.node(a).next;
        let mid = self.node(a).pos + (self.node(b).pos - self.node(a).pos) / 2.0;
        let idx = self.arena.len() as NodeIdx;
        let mut node = Node::new(self.node(a).side);
        node.pos = mid;
        node.dont_add = true;
        self.arena.push(node);
        self.insert_after(a, idx, true);
        Ok(Some(idx))
    }

    /// Promotes candidate pairs (both sides flagged during delayed-chain
    /// resolution) to real crossings
    fn process_candidates(&mut self) {
        let ring = self.full_ring(self.subj_root);
        for &i in &ring {
            if self.node(i).label != Label::CrossCandidate {
                continue;
            }
            let Some(link) = self.node(i).link else { continue };
            if self.node(link).label == Label::CrossCandidate {
                self.node_mut(i).cross = true;
                self.node_mut(link).cross = true;
            }
        }
    }

    fn out_corner(&self, i: NodeIdx) -> OutCorner {
        let n = self.node(i);
        let kind = match n.link {
            None => match n.side {
                Side::Clip => OutKind::OriginClip {
                    corner: n.origin_corner,
                },
                Side::Subject => OutKind::OriginSubject {
                    corner: n.origin_corner,
                },
            },
            Some(link) => {
                let (clip, subj) = match n.side {
                    Side::Clip => (i, link),
                    Side::Subject => (link, i),
                };
                if n.label == Label::Cross {
                    OutKind::Intersect {
                        clip_corner: self.node(clip).origin_corner,
                        subj_corner: self.node(subj).origin_corner,
                        clip_alpha: self.node(clip).alpha,
                        subj_alpha: self.node(subj).alpha,
                    }
                } else if n.original && self.node(link).original {
                    OutKind::OnVert {
                        clip_corner: self.node(clip).origin_corner,
                        subj_corner: self.node(subj).origin_corner,
                    }
                } else {
                    // one end is an original vertex, the other is the copy
                    // inserted on the edge it lies on
                    let vert = if n.original { i } else { link };
                    let edge = self.node(vert).link.unwrap();
                    if self.node(vert).side == Side::Clip {
                        OutKind::OnSubjectEdge {
                            edge_corner: self.node(edge).origin_corner,
                            vert_corner: self.node(vert).origin_corner,
                            alpha: self.node(edge).alpha,
                        }
                    } else {
                        OutKind::OnClipEdge {
                            edge_corner: self.node(edge).origin_corner,
                            vert_corner: self.node(vert).origin_corner,
                            alpha: self.node(edge).alpha,
                        }
                    }
                }
            }
        };
        OutCorner { pos: n.pos, kind }
    }

    /// Emits an entire ring as one output face (containment / identity)
    fn emit_ring(&self, root: NodeIdx) -> ClippedFace {
        let mut face = ClippedFace::default();
        for &i in &self.full_ring(root) {
            if self.node(i).dont_add {
                continue;
            }
            face.corners.push(self.out_corner(i));
        }
        face
    }

    /// Traces output loops beginning at unchecked entry crossings
    fn trace(&mut self) -> Result<Vec<ClippedFace>, Error> {
        let mut out = vec![];
        let budget = self.arena.len() + 1;
        let ring = self.full_ring(self.subj_root);
        for &start in &ring {
            if self.node(start).checked
                || self.node(start).link.is_none()
                || !self.node(start).cross
            {
                continue;
            }
            let mut face = ClippedFace::default();
            let mut corner = start;
            let mut outer = 0;
            loop {
                if outer > budget {
                    return Err(Error::TraversalStuck);
                }
                outer += 1;
                self.node_mut(corner).checked = true;
                if let Some(link) = self.node(corner).link {
                    self.node_mut(link).checked = true;
                }
                let travel = self.node(corner).travel;
                let mut inner = 0;
                loop {
                    corner = if travel == CrossDir::Entry {
                        self.node(corner).next
                    } else {
                        self.node(corner).prev
                    };
                    inner += 1;
                    if inner > budget {
                        return Err(Error::TraversalStuck);
                    }
                    self.node_mut(corner).checked = true;
                    if !self.node(corner).dont_add {
                        face.corners.push(self.out_corner(corner));
                    }
                    let c = self.node(corner);
                    if (c.cross && c.travel != travel) || corner == start {
                        break;
                    }
                }
                if corner == start {
                    break;
                }
                debug_assert!(self.node(corner).link.is_some());
                corner = self.node(corner).link.unwrap();
                if corner == start {
                    break;
                }
            }
            if self.node(start).travel == CrossDir::Exit {
                face.corners.reverse();
            }
            out.push(face);
        }
        Ok(out)
    }
}

/// Clips `subj_pts` (a map face, 3D) against `clip_pts` (an input face's UV
/// boundary, wound counter-clockwise)
///
/// Returns the overlap region as zero or more loops.  When the polygons
/// share no boundary points, containment falls back to emitting the inner
/// polygon whole; clipping a polygon against itself returns it unchanged.
pub fn clip(
    clip_pts: &[Vector2<f32>],
    subj_pts: &[Vector3<f32>],
    ids: ClipIds,
) -> Result<ClipOutput, Error> {
    let mut c = Clipper::new(clip_pts, subj_pts, ids)?;

    // find all pairwise edge intersections; origin rings are stable under
    // the insertions this makes
    let clip_origin = c.origin_ring(c.clip_root);
    let subj_origin = c.origin_ring(c.subj_root);
    for &ci in &clip_origin {
        for &si in &subj_origin {
            c.intersect_half_edges(ci, si)?;
        }
    }

    c.label_cross_or_bounce();
    let (subj_inside, subj_identical) =
        c.label_cross_dir(c.subj_root, c.clip_root)?;
    let (clip_inside, _) = c.label_cross_dir(c.clip_root, c.subj_root)?;
    c.process_candidates();

    let faces = c.trace()?;
    if !faces.is_empty() {
        return Ok(ClipOutput { faces });
    }
    // no crossings: identity, containment, or disjoint
    if subj_identical {
        return Ok(ClipOutput {
            faces: vec![c.emit_ring(c.subj_root)],
        });
    }
    if subj_inside {
        return Ok(ClipOutput {
            faces: vec![c.emit_ring(c.subj_root)],
        });
    }
    if clip_inside {
        return Ok(ClipOutput {
            faces: vec![c.emit_ring(c.clip_root)],
        });
    }
    Ok(ClipOutput::default())
}

/// Signed area of an output loop (projected to UV)
pub fn face_area(face: &ClippedFace) -> f32 {
    let mut area = 0.0;
    let n = face.corners.len();
    for i in 0..n {
        let a = face.corners[i].pos;
        let b = face.corners[(i + 1) % n].pos;
        area += det2(v2(a), v2(b));
    }
    area / 2.0
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;

    const IDS: ClipIds = ClipIds {
        in_face: 0,
        map_face: 0,
    };

    fn square2(min: f32, max: f32) -> Vec<Vector2<f32>> {
        vec![
            Vector2::new(min, min),
            Vector2::new(max, min),
            Vector2::new(max, max),
            Vector2::new(min, max),
        ]
    }

    fn square3(min: f32, max: f32) -> Vec<Vector3<f32>> {
        square2(min, max)
            .into_iter()
            .map(|p| Vector3::new(p.x, p.y, 0.0))
            .collect()
    }

    fn total_area(out: &ClipOutput) -> f32 {
        out.faces.iter().map(|f| face_area(f).abs()).sum()
    }

    #[test]
    fn offset_squares_overlap_area() {
        let out = clip(&square2(0.0, 1.0), &square3(0.5, 1.5), IDS).unwrap();
        assert_eq!(out.faces.len(), 1);
        assert_relative_eq!(total_area(&out), 0.25, epsilon = 1e-5);
    }

    #[test]
    fn self_clip_is_identity() {
        let subj = square3(0.0, 1.0);
        let out = clip(&square2(0.0, 1.0), &subj, IDS).unwrap();
        assert_eq!(out.faces.len(), 1);
        let face = &out.faces[0];
        assert_eq!(face.corners.len(), 4);
        assert_relative_eq!(face_area(face).abs(), 1.0, epsilon = 1e-5);
        for c in &face.corners {
            assert!(matches!(c.kind, OutKind::OnVert { .. }));
        }
    }

    #[test]
    fn subject_inside_clip_emits_subject() {
        let out = clip(&square2(0.0, 1.0), &square3(0.25, 0.75), IDS).unwrap();
        assert_eq!(out.faces.len(), 1);
        assert_relative_eq!(total_area(&out), 0.25, epsilon = 1e-5);
        for c in &out.faces[0].corners {
            assert!(matches!(c.kind, OutKind::OriginSubject { .. }));
        }
    }

    #[test]
    fn clip_inside_subject_emits_clip() {
        let out = clip(&square2(0.25, 0.75), &square3(0.0, 1.0), IDS).unwrap();
        assert_eq!(out.faces.len(), 1);
        assert_relative_eq!(total_area(&out), 0.25, epsilon = 1e-5);
        for c in &out.faces[0].corners {
            assert!(matches!(c.kind, OutKind::OriginClip { .. }));
        }
    }

    #[test]
    fn disjoint_polygons_yield_nothing() {
        let out = clip(&square2(0.0, 1.0), &square3(2.0, 3.0), IDS).unwrap();
        assert!(out.faces.is_empty());
    }

    #[test]
    fn triangle_crossing_quad_has_two_intersections() {
        // triangle pokes through the quad's right edge
        let subj = vec![
            Vector3::new(0.5, 0.25, 0.0),
            Vector3::new(1.5, 0.5, 0.0),
            Vector3::new(0.5, 0.75, 0.0),
        ];
        let out = clip(&square2(0.0, 1.0), &subj, IDS).unwrap();
        assert_eq!(out.faces.len(), 1);
        let crossings: Vec<_> = out.faces[0]
            .corners
            .iter()
            .filter_map(|c| match c.kind {
                OutKind::Intersect {
                    clip_alpha,
                    subj_alpha,
                    ..
                } => Some((clip_alpha, subj_alpha)),
                _ => None,
            })
            .collect();
        assert_eq!(crossings.len(), 2);
        for (ca, sa) in crossings {
            assert!(ca > 0.0 && ca < 1.0);
            assert!(sa > 0.0 && sa < 1.0);
        }
    }

    #[test]
    fn analytic_intersection_area() {
        // rotated-square-vs-square with known overlap: clip the unit square
        // against a diamond centered at (0.5, 0.5) with vertices on the
        // square's edge midpoints; the overlap is the diamond, area 0.5
        let subj = vec![
            Vector3::new(0.5, 0.0, 0.0),
            Vector3::new(1.0, 0.5, 0.0),
            Vector3::new(0.5, 1.0, 0.0),
            Vector3::new(0.0, 0.5, 0.0),
        ];
        let out = clip(&square2(0.0, 1.0), &subj, IDS).unwrap();
        assert_relative_eq!(total_area(&out), 0.5, epsilon = 1e-4);
    }

    #[test]
    fn colinear_boundary_runs_resolve_as_delayed_crossings() {
        // the subject shares colinear segments of the clip's top and bottom
        // edges; the boundary runs must classify as crossings, not bounces
        let out = clip(
            &square2(0.0, 1.0),
            &[
                Vector3::new(0.5, 0.0, 0.0),
                Vector3::new(1.5, 0.0, 0.0),
                Vector3::new(1.5, 1.0, 0.0),
                Vector3::new(0.5, 1.0, 0.0),
            ],
            IDS,
        )
        .unwrap();
        assert_eq!(out.faces.len(), 1);
        assert_relative_eq!(total_area(&out), 0.5, epsilon = 1e-5);
        // every corner of the overlap is a shared-boundary point
        for c in &out.faces[0].corners {
            assert!(matches!(
                c.kind,
                OutKind::OnClipEdge { .. } | OutKind::OnSubjectEdge { .. }
            ));
        }
    }

    #[test]
    fn shared_edge_without_overlap_yields_nothing() {
        // two unit squares sharing the x = 1 edge
        let out = clip(&square2(0.0, 1.0), &square3(1.0, 2.0), IDS).unwrap();
        assert_relative_eq!(total_area(&out), 0.0, epsilon = 1e-5);
    }

    #[test]
    fn degenerate_edge_is_an_error() {
        let subj = vec![
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(1.0, 1.0, 0.0),
        ];
        assert!(matches!(
            clip(&square2(0.0, 1.0), &subj, IDS),
            Err(Error::DegenerateEdge { .. })
        ));
    }

    #[test]
    fn intersect_positions_interpolate_subject_height() {
        // subject carries z; the crossing points must lerp it
        let subj = vec![
            Vector3::new(0.5, 0.5, 0.0),
            Vector3::new(1.5, 0.5, 1.0),
            Vector3::new(0.5, 1.5, 0.0),
        ];
        let out = clip(&square2(0.0, 1.0), &subj, IDS).unwrap();
        let mut found = false;
        for f in &out.faces {
            for c in &f.corners {
                if let OutKind::Intersect { subj_alpha, .. } = c.kind {
                    if (c.pos.x - 1.0).abs() < 1e-5 && c.pos.y < 0.6 {
                        assert_relative_eq!(
                            c.pos.z,
                            subj_alpha,
                            epsilon = 1e-5
                        );
                        found = true;
                    }
                }
            }
        }
        assert!(found, "no intersection on the x = 1 edge");
    }

    #[test]
    fn point_in_face_tie_breaks() {
        // ray passes exactly through a vertex of the diamond; winding must
        // still be odd inside and even outside
        let diamond = vec![
            Vector3::new(0.5, 0.0, 0.0),
            Vector3::new(1.0, 0.5, 0.0),
            Vector3::new(0.5, 1.0, 0.0),
            Vector3::new(0.0, 0.5, 0.0),
        ];
        let c = Clipper::new(
            &square2(10.0, 11.0), // unused ring, far away
            &diamond,
            IDS,
        )
        .unwrap();
        // directly under the top vertex, inside
        assert!(c
            .is_point_in_face(c.subj_root, Vector3::new(0.5, 0.5, 0.0)));
        // directly under the bottom vertex, outside
        assert!(!c
            .is_point_in_face(c.subj_root, Vector3::new(0.5, -0.5, 0.0)));
        // clearly outside to the left
        assert!(!c
            .is_point_in_face(c.subj_root, Vector3::new(-0.25, 0.5, 0.0)));
    }
}
