//! Small 2D/3D geometric predicates shared across the pipeline

use arrayvec::ArrayVec;
use nalgebra::{Vector2, Vector3};

/// Twice the signed area of triangle `(a, b, c)`
pub fn signed_area(a: Vector2<f32>, b: Vector2<f32>, c: Vector2<f32>) -> f32 {
    let ab = b - a;
    let ac = c - a;
    ab.x * ac.y - ab.y * ac.x
}

/// 2D cross product (determinant) of two direction vectors
pub fn det2(a: Vector2<f32>, b: Vector2<f32>) -> f32 {
    a.x * b.y - a.y * b.x
}

/// True if triangle `(a, b, c)` is degenerate within `eps` of zero area,
/// relative to its longest edge
pub fn degenerate_tri_2d(
    a: Vector2<f32>,
    b: Vector2<f32>,
    c: Vector2<f32>,
    eps: f32,
) -> bool {
    let area = signed_area(a, b, c).abs();
    let longest = (b - a)
        .norm_squared()
        .max((c - b).norm_squared())
        .max((a - c).norm_squared());
    if longest == 0.0 {
        return true;
    }
    area * area <= eps * eps * longest * longest || area == 0.0
}

/// 3D variant of [`degenerate_tri_2d`]
pub fn degenerate_tri_3d(
    a: Vector3<f32>,
    b: Vector3<f32>,
    c: Vector3<f32>,
    eps: f32,
) -> bool {
    let n = (b - a).cross(&(c - a));
    let area2 = n.norm_squared();
    let longest = (b - a)
        .norm_squared()
        .max((c - b).norm_squared())
        .max((a - c).norm_squared());
    if longest == 0.0 {
        return true;
    }
    area2 <= eps * eps * longest * longest || area2 == 0.0
}

/// Barycentric coordinates of `p` in triangle `(a, b, c)`
pub fn barycentric(
    a: Vector2<f32>,
    b: Vector2<f32>,
    c: Vector2<f32>,
    p: Vector2<f32>,
) -> Vector3<f32> {
    let total = signed_area(a, b, c);
    if total == 0.0 {
        return Vector3::new(f32::NAN, f32::NAN, f32::NAN);
    }
    let wa = signed_area(p, b, c) / total;
    let wb = signed_area(a, p, c) / total;
    Vector3::new(wa, wb, 1.0 - wa - wb)
}

/// Picks the triangle of a (≤ 4 corner) face containing `p` and returns the
/// triangle's corner indices plus barycentric weights
///
/// Triangles and quads only; quads split along the 0-2 diagonal, falling
/// back to the 1-3 diagonal when `p` misses both 0-2 halves.  The weights of
/// the best candidate are returned even for points slightly outside, so
/// callers can interpolate boundary points without a separate path.
pub fn face_barycentric(
    uvs: &ArrayVec<Vector2<f32>, 4>,
    p: Vector2<f32>,
) -> ([u8; 3], Vector3<f32>) {
    debug_assert!(uvs.len() >= 3);
    if uvs.len() == 3 {
        return ([0, 1, 2], barycentric(uvs[0], uvs[1], uvs[2], p));
    }
    let tris: [[u8; 3]; 4] = [[0, 1, 2], [0, 2, 3], [1, 2, 3], [0, 1, 3]];
    let mut best = ([0u8, 1, 2], Vector3::zeros(), f32::NEG_INFINITY);
    for t in tris {
        let bc = barycentric(
            uvs[t[0] as usize],
            uvs[t[1] as usize],
            uvs[t[2] as usize],
            p,
        );
        if !bc.iter().all(|w| w.is_finite()) {
            continue;
        }
        let worst = bc.x.min(bc.y).min(bc.z);
        if worst >= 0.0 {
            return (t, bc);
        }
        if worst > best.2 {
            best = (t, bc, worst);
        }
    }
    (best.0, best.1)
}

/// Axis-aligned bounding box of a 2D point set
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BBox {
    /// Lower corner
    pub min: Vector2<f32>,
    /// Upper corner
    pub max: Vector2<f32>,
}

impl BBox {
    /// Builds a bbox over the given points
    pub fn from_points<I: IntoIterator<Item = Vector2<f32>>>(pts: I) -> Self {
        let mut min = Vector2::new(f32::INFINITY, f32::INFINITY);
        let mut max = Vector2::new(f32::NEG_INFINITY, f32::NEG_INFINITY);
        for p in pts {
            min.x = min.x.min(p.x);
            min.y = min.y.min(p.y);
            max.x = max.x.max(p.x);
            max.y = max.y.max(p.y);
        }
        Self { min, max }
    }

    /// True if the two boxes intersect (closed-interval test)
    pub fn intersects(&self, other: &BBox) -> bool {
        self.min.x <= other.max.x
            && other.min.x <= self.max.x
            && self.min.y <= other.max.y
            && other.min.y <= self.max.y
    }

    /// Translates the box
    pub fn offset(&self, d: Vector2<f32>) -> BBox {
        BBox {
            min: self.min + d,
            max: self.max + d,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn barycentric_roundtrip() {
        let a = Vector2::new(0.0, 0.0);
        let b = Vector2::new(2.0, 0.0);
        let c = Vector2::new(0.0, 2.0);
        let p = Vector2::new(0.5, 0.5);
        let bc = barycentric(a, b, c, p);
        let back = a * bc.x + b * bc.y + c * bc.z;
        assert_relative_eq!(back.x, p.x, epsilon = 1e-6);
        assert_relative_eq!(back.y, p.y, epsilon = 1e-6);
    }

    #[test]
    fn quad_barycentric_picks_containing_tri() {
        let uvs: ArrayVec<Vector2<f32>, 4> = [
            Vector2::new(0.0, 0.0),
            Vector2::new(1.0, 0.0),
            Vector2::new(1.0, 1.0),
            Vector2::new(0.0, 1.0),
        ]
        .into_iter()
        .collect();
        let (tri, bc) = face_barycentric(&uvs, Vector2::new(0.9, 0.5));
        assert!(bc.iter().all(|w| *w >= -1e-6));
        let back = uvs[tri[0] as usize] * bc.x
            + uvs[tri[1] as usize] * bc.y
            + uvs[tri[2] as usize] * bc.z;
        assert_relative_eq!(back.x, 0.9, epsilon = 1e-5);
        assert_relative_eq!(back.y, 0.5, epsilon = 1e-5);
    }

    #[test]
    fn degenerate_checks() {
        assert!(degenerate_tri_2d(
            Vector2::new(0.0, 0.0),
            Vector2::new(0.5, 0.0),
            Vector2::new(1.0, 0.0),
            0.0,
        ));
        assert!(!degenerate_tri_2d(
            Vector2::new(0.0, 0.0),
            Vector2::new(1.0, 0.0),
            Vector2::new(0.0, 1.0),
            0.0,
        ));
    }

    #[test]
    fn bbox_intersect() {
        let a = BBox::from_points([Vector2::new(0.0, 0.0), Vector2::new(1.0, 1.0)]);
        let b = BBox::from_points([Vector2::new(1.0, 1.0), Vector2::new(2.0, 2.0)]);
        let c = BBox::from_points([Vector2::new(1.5, 1.5), Vector2::new(2.0, 2.0)]);
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
    }
}
