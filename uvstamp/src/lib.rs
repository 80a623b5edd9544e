//! uvstamp is a library for **UV-space texture stamping**: projecting a
//! reusable, tiled template mesh (the *map*) onto every face of a
//! UV-parameterized target surface (the *input mesh*), producing one merged
//! output mesh whose topology is the intersection of map-tile boundaries
//! and input-face boundaries.
//!
//! The map mesh lives in a repeating UV space: its canonical `[0, 1)²`
//! tile is stamped onto every tile the input mesh's UVs span.  Where map
//! geometry pokes out of an input face it is clipped against the face's UV
//! boundary; where faces from neighbouring tiles or different worker jobs
//! meet, duplicate vertices are merged by semantic identity rather than by
//! position, so the output is watertight across seams by construction.
//!
//! # Quick tour
//!
//! Build a [`Map`](map::Map) from a template mesh (this derives the
//! spatial index), then stamp it:
//!
//! ```
//! use nalgebra::{Vector2, Vector3};
//! use uvstamp::mesh::Mesh;
//! use uvstamp::map::Map;
//! use uvstamp::stamp::{map_to_mesh, Options};
//!
//! // a one-triangle map in the canonical tile, at height w = 0
//! let template = Mesh::from_buffers(
//!     &[3],
//!     &[0, 1, 2],
//!     &[
//!         Vector3::new(0.2, 0.2, 0.0),
//!         Vector3::new(0.8, 0.2, 0.0),
//!         Vector3::new(0.5, 0.8, 0.0),
//!     ],
//!     &[],
//! )?;
//! let map = Map::new(template)?;
//!
//! // a flat unit quad as the target surface
//! let surface = Mesh::from_buffers(
//!     &[4],
//!     &[0, 1, 2, 3],
//!     &[
//!         Vector3::new(0.0, 0.0, 0.0),
//!         Vector3::new(1.0, 0.0, 0.0),
//!         Vector3::new(1.0, 1.0, 0.0),
//!         Vector3::new(0.0, 1.0, 0.0),
//!     ],
//!     &[
//!         Vector2::new(0.0, 0.0),
//!         Vector2::new(1.0, 0.0),
//!         Vector2::new(1.0, 1.0),
//!         Vector2::new(0.0, 1.0),
//!     ],
//! )?;
//!
//! let out = map_to_mesh(&map, &surface, &Options::default())?;
//! assert_eq!(out.mesh.face_count(), 1);
//! # Ok::<(), uvstamp::Error>(())
//! ```
//!
//! Faces with more than four corners and degenerate faces are skipped
//! rather than failed — stamping is best-effort over whatever geometry a
//! host application provides.
//!
//! # Structure
//!
//! - [`mesh`] — growable polygon mesh storage with typed attribute columns
//! - [`map`] — the map object: template mesh plus quadtree spatial index
//! - [`clip`] — re-entrant polygon clipping with provenance-typed output
//! - [`stamp`] — the job-partitioned mapping pipeline and its entry point,
//!   [`stamp::map_to_mesh`]
#![warn(missing_docs)]

mod error;
pub use error::Error;

pub mod clip;
pub mod geom;
pub mod map;
pub mod mesh;
pub mod quadtree;
pub mod stamp;
pub mod tile;
