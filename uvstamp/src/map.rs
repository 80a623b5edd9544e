//! The map object: a reusable UV-tiled template mesh plus its spatial index
//!
//! A [`Map`] is produced by the map-file subsystem (out of scope here) or
//! built directly from a mesh via [`Map::new`].  During a mapping call it is
//! strictly read-only.
//!
//! Map mesh conventions: vertex positions are `(u, v, w)` — `u`/`v` in the
//! canonical tile's coordinates, `w` the stamp height above the target
//! surface.  Faces are triangles or quads wound counter-clockwise in UV.

use crate::geom::BBox;
use crate::mesh::attrib::AttribData;
use crate::mesh::Mesh;
use crate::quadtree::QuadTree;
use crate::Error;
use nalgebra::Vector2;

/// Named indexed-attribute table carried alongside the map mesh
///
/// Indexed attributes map small integer values (e.g. material slots) to
/// entries in a lookup table; the mapping core passes them through.
#[derive(Clone, Debug)]
pub struct IndexedAttrib {
    /// Attribute name
    pub name: String,
    /// Table entries
    pub values: AttribData,
}

/// Per-tile usage overlay: local origins sampled when stamping
///
/// One entry per usage square authored into the map; the mapping core only
/// reads origins.
#[derive(Clone, Debug, Default)]
pub struct UsageSquares {
    /// Local origin per square
    pub origins: Vec<Vector2<f32>>,
}

/// A reusable map: template mesh, spatial index, and overlays
#[derive(Debug)]
pub struct Map {
    mesh: Mesh,
    quad_tree: QuadTree,
    face_bboxes: Vec<BBox>,
    usage: UsageSquares,
    indexed_attribs: Vec<IndexedAttrib>,
    z_bounds: Vector2<f32>,
}

impl Map {
    /// Builds a map from a template mesh, deriving the spatial index, face
    /// bounding boxes, and height bounds
    ///
    /// The mesh must carry positions and pass validation; per-corner edge
    /// indices are built here if missing.
    pub fn new(mut mesh: Mesh) -> Result<Self, Error> {
        mesh.validate()?;
        if mesh.positions().is_none() {
            return Err(Error::InvalidMesh("map mesh has no position column"));
        }
        if !mesh.has_edges() {
            mesh.build_edges();
        }
        let face_bboxes: Vec<BBox> = (0..mesh.face_count())
            .map(|f| {
                let r = mesh.face_range(f);
                BBox::from_points((0..r.size()).map(|c| mesh.corner_pos(f, c).xy()))
            })
            .collect();
        let mut z_bounds = Vector2::new(f32::INFINITY, f32::NEG_INFINITY);
        for p in mesh.positions().unwrap() {
            z_bounds.x = z_bounds.x.min(p.z);
            z_bounds.y = z_bounds.y.max(p.z);
        }
        let quad_tree = QuadTree::build(&mesh, &face_bboxes);
        log::debug!(
            "map built: {} faces, {} quadtree cells",
            mesh.face_count(),
            quad_tree.cell_count()
        );
        Ok(Self {
            mesh,
            quad_tree,
            face_bboxes,
            usage: UsageSquares::default(),
            indexed_attribs: vec![],
            z_bounds,
        })
    }

    /// Attaches usage squares (builder-style)
    pub fn with_usage(mut self, usage: UsageSquares) -> Self {
        self.usage = usage;
        self
    }

    /// Attaches indexed attribute tables (builder-style)
    pub fn with_indexed_attribs(mut self, attribs: Vec<IndexedAttrib>) -> Self {
        self.indexed_attribs = attribs;
        self
    }

    /// The template mesh
    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    /// The spatial index
    pub fn quad_tree(&self) -> &QuadTree {
        &self.quad_tree
    }

    /// Per-face UV bounding boxes (canonical tile coordinates)
    pub fn face_bboxes(&self) -> &[BBox] {
        &self.face_bboxes
    }

    /// Usage-square overlay
    pub fn usage(&self) -> &UsageSquares {
        &self.usage
    }

    /// Indexed attribute tables
    pub fn indexed_attribs(&self) -> &[IndexedAttrib] {
        &self.indexed_attribs
    }

    /// `(min, max)` of the template's `w` (height) coordinate
    pub fn z_bounds(&self) -> Vector2<f32> {
        self.z_bounds
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use nalgebra::Vector3;

    #[test]
    fn map_derives_bounds_and_edges() {
        let mesh = Mesh::from_buffers(
            &[3],
            &[0, 1, 2],
            &[
                Vector3::new(0.1, 0.1, -0.2),
                Vector3::new(0.9, 0.1, 0.0),
                Vector3::new(0.5, 0.9, 0.5),
            ],
            &[],
        )
        .unwrap();
        let map = Map::new(mesh).unwrap();
        assert_eq!(map.z_bounds(), Vector2::new(-0.2, 0.5));
        assert!(map.mesh().has_edges());
        assert_eq!(map.face_bboxes().len(), 1);
    }
}
