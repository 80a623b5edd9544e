//! Integer tile coordinates in the map's repeating UV space
//!
//! The map mesh is authored inside the canonical `[0, 1)²` tile and repeats
//! across UV space.  A [`Tile`] names one unit cell of that repetition with a
//! pair of signed integers.  Coordinates are bounded so that they pack into
//! the merge-table keys; the bound matches the 11-bit tile fields used by the
//! on-disk map format.

use crate::Error;
use nalgebra::Vector2;

/// Number of bits available per tile axis (sign included)
pub const TILE_BITS: u32 = 11;

/// Largest representable tile coordinate on either axis
pub const TILE_MAX: i32 = (1 << (TILE_BITS - 1)) - 1;

/// Smallest representable tile coordinate on either axis
pub const TILE_MIN: i32 = -(1 << (TILE_BITS - 1));

// Tiles are stored as i16 pairs in keys; the 11-bit budget must fit
static_assertions::const_assert!(TILE_MAX <= i16::MAX as i32);
static_assertions::const_assert!(TILE_MIN >= i16::MIN as i32);

/// One integer-indexed unit cell of the map's repeating UV space
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Tile {
    x: i16,
    y: i16,
}

impl Tile {
    /// Builds a tile, checking the coordinate range
    pub fn new(x: i32, y: i32) -> Result<Self, Error> {
        if x < TILE_MIN || x > TILE_MAX || y < TILE_MIN || y > TILE_MAX {
            return Err(Error::TileOutOfRange(x, y));
        }
        Ok(Self {
            x: x as i16,
            y: y as i16,
        })
    }

    /// Returns the tile containing the given UV position
    ///
    /// Positions on a tile seam belong to the tile on their upper-right.
    pub fn containing(uv: Vector2<f32>) -> Result<Self, Error> {
        Self::new(uv.x.floor() as i32, uv.y.floor() as i32)
    }

    /// X coordinate of the tile
    pub fn x(&self) -> i32 {
        self.x as i32
    }

    /// Y coordinate of the tile
    pub fn y(&self) -> i32 {
        self.y as i32
    }

    /// Offset of this tile's origin in UV space
    pub fn origin(&self) -> Vector2<f32> {
        Vector2::new(self.x as f32, self.y as f32)
    }

    /// Translates a UV position into this tile's local frame
    pub fn to_local(&self, uv: Vector2<f32>) -> Vector2<f32> {
        uv - self.origin()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn tile_range() {
        assert!(Tile::new(0, 0).is_ok());
        assert!(Tile::new(TILE_MAX, TILE_MIN).is_ok());
        assert!(Tile::new(TILE_MAX + 1, 0).is_err());
        assert!(Tile::new(0, TILE_MIN - 1).is_err());
    }

    #[test]
    fn tile_containing() {
        let t = Tile::containing(Vector2::new(1.25, -0.5)).unwrap();
        assert_eq!((t.x(), t.y()), (1, -1));
        let local = t.to_local(Vector2::new(1.25, -0.5));
        assert_eq!(local, Vector2::new(0.25, 0.5));

        // seam positions land on the upper-right tile
        let t = Tile::containing(Vector2::new(2.0, 3.0)).unwrap();
        assert_eq!((t.x(), t.y()), (2, 3));
    }
}
