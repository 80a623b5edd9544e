//! Module containing the uvstamp universal error type
use thiserror::Error;

/// Universal error type for uvstamp
///
/// Variants describe conditions that are reachable from malformed input
/// geometry; violations of internal invariants are `debug_assert!`s instead.
#[derive(Error, Debug)]
pub enum Error {
    /// Mesh failed structural validation
    #[error("mesh is malformed: {0}")]
    InvalidMesh(&'static str),

    /// Mesh has no faces
    #[error("mesh has no faces")]
    EmptyMesh,

    /// A polygon handed to the clipper contains a zero-length edge
    #[error("degenerate edge while clipping map face {map_face} against input face {in_face}")]
    DegenerateEdge {
        /// Input face being clipped against
        in_face: usize,
        /// Map face being clipped
        map_face: usize,
    },

    /// More than one coincidence link lands on the same vertex, so the
    /// clipper cannot classify the configuration
    #[error("ambiguous coincident vertices while clipping map face {map_face} against input face {in_face}")]
    AmbiguousVertex {
        /// Input face being clipped against
        in_face: usize,
        /// Map face being clipped
        map_face: usize,
    },

    /// A clip traversal failed to return to its starting corner
    #[error("clip traversal did not close its loop")]
    TraversalStuck,

    /// UV coordinates map to a tile outside the signed 11-bit range
    #[error("tile coordinate ({0}, {1}) exceeds the supported tile range")]
    TileOutOfRange(i32, i32),

    /// An attribute column's length disagrees with its owning domain
    #[error("attribute `{0}` has a length that does not match its domain")]
    AttribLengthMismatch(String),

    /// Two attribute columns with the same name have different types
    #[error("attribute `{0}` has conflicting types between meshes")]
    AttribTypeMismatch(String),

    /// Blend mode is numeric-only but the attribute is a string (or vice
    /// versa — only replace and append apply to strings)
    #[error("blend mode is not usable with this attribute type")]
    BadBlendMode,

    /// A worker job failed; the inner error is the first failure observed in
    /// job order
    #[error("worker job {index} failed: {source}")]
    JobFailed {
        /// Index of the failed job within its phase
        index: usize,
        /// The job's own error
        source: Box<Error>,
    },

    /// The caller-provided tangent generator reported failure
    #[error("tangent generation failed")]
    TangentFailed,
}
