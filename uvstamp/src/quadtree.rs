//! Quadtree spatial index over the map mesh's canonical UV tile
//!
//! The map mesh is authored inside the canonical `[0, 1)²` tile.  The tree
//! subdivides that square; each face is stored at the deepest cell that
//! fully contains its bounding box, so a query walks every cell whose bounds
//! intersect the query box and collects faces along the way (no duplicates).
//!
//! Faces whose bounding box sticks out of the canonical tile (seam-crossing
//! faces) are kept in a separate `edge_faces` list; they are candidates for
//! every query, tested by the caller at wrapped tile offsets.

use crate::geom::BBox;
use crate::mesh::Mesh;
use nalgebra::Vector2;

const MAX_CELL_FACES: usize = 8;
const MAX_TREE_DEPTH: u32 = 8;

/// Index of a cell within [`QuadTree::cells`]
type CellIdx = u32;

#[derive(Debug)]
struct Cell {
    min: Vector2<f32>,
    max: Vector2<f32>,
    children: Option<[CellIdx; 4]>,
    faces: Vec<u32>,
}

impl Cell {
    fn bbox(&self) -> BBox {
        BBox {
            min: self.min,
            max: self.max,
        }
    }

    fn contains(&self, b: &BBox) -> bool {
        b.min.x >= self.min.x
            && b.min.y >= self.min.y
            && b.max.x <= self.max.x
            && b.max.y <= self.max.y
    }
}

/// Spatial index over map faces in the canonical tile
#[derive(Debug)]
pub struct QuadTree {
    cells: Vec<Cell>,
    edge_faces: Vec<u32>,
    max_depth: u32,
}

/// Result of a [`QuadTree::query`]
#[derive(Debug)]
pub struct Candidates<'a> {
    /// Faces stored in cells intersecting the query box
    pub interior: Vec<u32>,
    /// Seam-crossing faces; callers test these at wrapped offsets
    pub edge: &'a [u32],
}

impl QuadTree {
    /// Builds the index over a map mesh's faces
    ///
    /// `bboxes` must hold one UV bounding box per face (see
    /// [`Map::new`](crate::map::Map::new), which derives them).
    pub fn build(mesh: &Mesh, bboxes: &[BBox]) -> Self {
        debug_assert_eq!(mesh.face_count(), bboxes.len());
        let depth_budget = ((mesh.face_count().max(1) as f32).log2() / 2.0)
            .ceil() as u32;
        let max_depth = depth_budget.clamp(1, MAX_TREE_DEPTH);
        let mut tree = Self {
            cells: vec![Cell {
                min: Vector2::new(0.0, 0.0),
                max: Vector2::new(1.0, 1.0),
                children: None,
                faces: vec![],
            }],
            edge_faces: vec![],
            max_depth,
        };
        for (face, bb) in bboxes.iter().enumerate() {
            if !tree.cells[0].contains(bb) {
                tree.edge_faces.push(face as u32);
                continue;
            }
            tree.insert(face as u32, bb);
        }
        tree
    }

    fn split(&mut self, cell: CellIdx) {
        debug_assert!(self.cells[cell as usize].children.is_none());
        let min = self.cells[cell as usize].min;
        let max = self.cells[cell as usize].max;
        let mid = (min + max) / 2.0;
        let mut children = [0; 4];
        for (i, child) in children.iter_mut().enumerate() {
            let x = i % 2;
            let y = i / 2;
            let c_min = Vector2::new(
                if x == 0 { min.x } else { mid.x },
                if y == 0 { min.y } else { mid.y },
            );
            let c_max = Vector2::new(
                if x == 0 { mid.x } else { max.x },
                if y == 0 { mid.y } else { max.y },
            );
            *child = self.cells.len() as CellIdx;
            self.cells.push(Cell {
                min: c_min,
                max: c_max,
                children: None,
                faces: vec![],
            });
        }
        self.cells[cell as usize].children = Some(children);
    }

    fn insert(&mut self, face: u32, bb: &BBox) {
        let mut cell: CellIdx = 0;
        let mut depth = 0;
        loop {
            if depth < self.max_depth
                && self.cells[cell as usize].children.is_none()
                && self.cells[cell as usize].faces.len() >= MAX_CELL_FACES
            {
                self.split(cell);
            }
            let Some(children) = self.cells[cell as usize].children else {
                break;
            };
            let mut next = None;
            for c in children {
                if self.cells[c as usize].contains(bb) {
                    next = Some(c);
                    break;
                }
            }
            match next {
                Some(c) => {
                    cell = c;
                    depth += 1;
                }
                // straddles a split line; it lives here
                None => break,
            }
        }
        self.cells[cell as usize].faces.push(face);
    }

    /// Collects candidate faces for a query box in tile-local coordinates
    pub fn query(&self, bb: &BBox) -> Candidates<'_> {
        let mut interior = vec![];
        let mut stack = vec![0 as CellIdx];
        while let Some(cell) = stack.pop() {
            let c = &self.cells[cell as usize];
            if !c.bbox().intersects(bb) {
                continue;
            }
            interior.extend_from_slice(&c.faces);
            if let Some(children) = c.children {
                stack.extend_from_slice(&children);
            }
        }
        Candidates {
            interior,
            edge: &self.edge_faces,
        }
    }

    /// Total number of cells (diagnostics)
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use nalgebra::Vector3;

    fn grid_mesh(n: usize) -> (Mesh, Vec<BBox>) {
        // n×n triangles scattered over the canonical tile
        let mut face_sizes = vec![];
        let mut corners = vec![];
        let mut positions = vec![];
        let step = 1.0 / n as f32;
        for j in 0..n {
            for i in 0..n {
                let base = positions.len() as u32;
                let x = i as f32 * step;
                let y = j as f32 * step;
                positions.push(Vector3::new(x, y, 0.0));
                positions.push(Vector3::new(x + step * 0.9, y, 0.0));
                positions.push(Vector3::new(x, y + step * 0.9, 0.0));
                face_sizes.push(3);
                corners.extend_from_slice(&[base, base + 1, base + 2]);
            }
        }
        let mesh =
            Mesh::from_buffers(&face_sizes, &corners, &positions, &[]).unwrap();
        let bboxes = (0..mesh.face_count())
            .map(|f| {
                let r = mesh.face_range(f);
                BBox::from_points(
                    (0..r.size()).map(|c| mesh.corner_pos(f, c).xy()),
                )
            })
            .collect();
        (mesh, bboxes)
    }

    #[test]
    fn query_is_a_superset_of_exact_overlap() {
        let (mesh, bboxes) = grid_mesh(8);
        let tree = QuadTree::build(&mesh, &bboxes);
        let query = BBox {
            min: Vector2::new(0.3, 0.3),
            max: Vector2::new(0.6, 0.6),
        };
        let got = tree.query(&query);
        for (f, bb) in bboxes.iter().enumerate() {
            if bb.intersects(&query) {
                assert!(
                    got.interior.contains(&(f as u32)),
                    "face {f} missing from query result"
                );
            }
        }
    }

    #[test]
    fn no_duplicate_candidates() {
        let (mesh, bboxes) = grid_mesh(6);
        let tree = QuadTree::build(&mesh, &bboxes);
        let all = BBox {
            min: Vector2::new(0.0, 0.0),
            max: Vector2::new(1.0, 1.0),
        };
        let mut got = tree.query(&all).interior;
        let n = got.len();
        got.sort_unstable();
        got.dedup();
        assert_eq!(n, got.len());
        assert_eq!(n, mesh.face_count());
    }

    #[test]
    fn seam_crossing_faces_are_edge_candidates() {
        let mesh = Mesh::from_buffers(
            &[3],
            &[0, 1, 2],
            &[
                Vector3::new(0.9, 0.1, 0.0),
                Vector3::new(1.1, 0.1, 0.0),
                Vector3::new(0.9, 0.3, 0.0),
            ],
            &[],
        )
        .unwrap();
        let bboxes = vec![BBox::from_points([
            Vector2::new(0.9, 0.1),
            Vector2::new(1.1, 0.3),
        ])];
        let tree = QuadTree::build(&mesh, &bboxes);
        let got = tree.query(&BBox {
            min: Vector2::new(0.0, 0.0),
            max: Vector2::new(0.1, 0.1),
        });
        assert!(got.interior.is_empty());
        assert_eq!(got.edge, &[0]);
    }
}
