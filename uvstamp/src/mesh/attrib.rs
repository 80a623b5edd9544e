//! Typed attribute columns attached to mesh domains
//!
//! Each mesh domain (face / corner / edge / vertex) owns an [`AttribArray`]:
//! a set of named, typed columns that grow in lockstep with the domain.
//! Columns are plain `Vec`s behind the [`AttribData`] tagged union, so
//! resizing the domain resizes every column.
//!
//! A handful of well-known names ("position", "uv", ...) are treated as
//! *active* attributes: the mesh caches their column indices for O(1) typed
//! access, but they remain ordinary entries in the array — the cache is an
//! alias, not a separate store.

use crate::Error;
use nalgebra::{Vector2, Vector3};

/// Well-known attribute name: vertex position (map meshes store `(u, v, w)`)
pub const ATTRIB_POSITION: &str = "position";
/// Well-known attribute name: per-corner UV coordinates
pub const ATTRIB_UV: &str = "uv";
/// Well-known attribute name: per-corner normals
pub const ATTRIB_NORMAL: &str = "normal";
/// Well-known attribute name: per-corner tangents
pub const ATTRIB_TANGENT: &str = "tangent";
/// Well-known attribute name: per-corner tangent sign
pub const ATTRIB_TSIGN: &str = "tsign";
/// Well-known attribute name: per-face material index
pub const ATTRIB_MATERIAL: &str = "material";

/// Maximum length of a string attribute value
pub const ATTRIB_STRING_MAX_LEN: usize = 64;

/// Mesh domains that may own attribute columns
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Domain {
    /// One value per face
    Face,
    /// One value per corner
    Corner,
    /// One value per edge
    Edge,
    /// One value per vertex
    Vert,
}

/// Which mesh an attribute column is sourced from during mapping
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AttribOrigin {
    /// Column exists only on the map mesh
    Map,
    /// Column exists only on the input mesh
    MeshIn,
    /// Column is produced by the mapping itself (positions, tangents)
    MeshOut,
    /// Column exists on both meshes and is blended per [`BlendConfig`]
    Common,
    /// Column is carried but never interpolated
    Ignore,
}

/// How a map-sourced value is combined with an input-sourced value
///
/// Only [`BlendMode::Replace`] and [`BlendMode::Append`] apply to string
/// attributes; `Append` applies *only* to strings.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum BlendMode {
    /// Take the map value as-is
    #[default]
    Replace,
    /// `a * b`
    Multiply,
    /// `a / b` (0 divisor passes `a` through)
    Divide,
    /// `a + b`
    Add,
    /// `a - b`
    Subtract,
    /// `a + b - 0.5`
    AddSub,
    /// `max(a, b)`
    Lighten,
    /// `min(a, b)`
    Darken,
    /// Photoshop-style overlay
    Overlay,
    /// Photoshop-style soft light
    SoftLight,
    /// Photoshop-style color dodge
    ColorDodge,
    /// String concatenation (strings only)
    Append,
}

/// Per-attribute blend policy
///
/// `order` breaks the tie between the two sources: 0 blends the map value
/// over the input value, non-zero blends the input value over the map value.
#[derive(Copy, Clone, Debug, Default)]
pub struct BlendConfig {
    /// Blend operation
    pub mode: BlendMode,
    /// Source-order tiebreak
    pub order: i8,
}

fn blend_scalar(mode: BlendMode, a: f32, b: f32) -> f32 {
    match mode {
        BlendMode::Replace => b,
        BlendMode::Multiply => a * b,
        BlendMode::Divide => {
            if b == 0.0 {
                a
            } else {
                a / b
            }
        }
        BlendMode::Add => a + b,
        BlendMode::Subtract => a - b,
        BlendMode::AddSub => a + b - 0.5,
        BlendMode::Lighten => a.max(b),
        BlendMode::Darken => a.min(b),
        BlendMode::Overlay => {
            if a < 0.5 {
                2.0 * a * b
            } else {
                1.0 - 2.0 * (1.0 - a) * (1.0 - b)
            }
        }
        BlendMode::SoftLight => {
            (1.0 - 2.0 * b) * a * a + 2.0 * b * a
        }
        BlendMode::ColorDodge => {
            if b >= 1.0 {
                1.0
            } else {
                (a / (1.0 - b)).min(1.0)
            }
        }
        BlendMode::Append => b,
    }
}

/// Typed storage for one attribute column
///
/// 8- and 16-bit integer widths from host applications widen to 32 bits on
/// import; the mapping core never needs the narrow widths.
#[derive(Clone, Debug)]
pub enum AttribData {
    /// Scalar f32
    F32(Vec<f32>),
    /// Scalar f64
    F64(Vec<f64>),
    /// Scalar i32
    I32(Vec<i32>),
    /// Scalar i64
    I64(Vec<i64>),
    /// 2-component f32 vector
    V2F32(Vec<Vector2<f32>>),
    /// 3-component f32 vector
    V3F32(Vec<Vector3<f32>>),
    /// 4-component f32 vector
    V4F32(Vec<[f32; 4]>),
    /// 2-component i32 vector
    V2I32(Vec<[i32; 2]>),
    /// 3-component i32 vector
    V3I32(Vec<[i32; 3]>),
    /// 4-component i32 vector
    V4I32(Vec<[i32; 4]>),
    /// Bounded-length string
    Str(Vec<String>),
}

impl AttribData {
    /// Number of values in the column
    pub fn len(&self) -> usize {
        match self {
            AttribData::F32(v) => v.len(),
            AttribData::F64(v) => v.len(),
            AttribData::I32(v) => v.len(),
            AttribData::I64(v) => v.len(),
            AttribData::V2F32(v) => v.len(),
            AttribData::V3F32(v) => v.len(),
            AttribData::V4F32(v) => v.len(),
            AttribData::V2I32(v) => v.len(),
            AttribData::V3I32(v) => v.len(),
            AttribData::V4I32(v) => v.len(),
            AttribData::Str(v) => v.len(),
        }
    }

    /// Returns true if the column holds no values
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Builds an empty column of the same type
    pub fn new_like(&self) -> Self {
        match self {
            AttribData::F32(_) => AttribData::F32(vec![]),
            AttribData::F64(_) => AttribData::F64(vec![]),
            AttribData::I32(_) => AttribData::I32(vec![]),
            AttribData::I64(_) => AttribData::I64(vec![]),
            AttribData::V2F32(_) => AttribData::V2F32(vec![]),
            AttribData::V3F32(_) => AttribData::V3F32(vec![]),
            AttribData::V4F32(_) => AttribData::V4F32(vec![]),
            AttribData::V2I32(_) => AttribData::V2I32(vec![]),
            AttribData::V3I32(_) => AttribData::V3I32(vec![]),
            AttribData::V4I32(_) => AttribData::V4I32(vec![]),
            AttribData::Str(_) => AttribData::Str(vec![]),
        }
    }

    /// True if both columns hold the same type
    pub fn same_type(&self, other: &AttribData) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }

    /// Appends one default value
    pub fn push_default(&mut self) {
        match self {
            AttribData::F32(v) => v.push(0.0),
            AttribData::F64(v) => v.push(0.0),
            AttribData::I32(v) => v.push(0),
            AttribData::I64(v) => v.push(0),
            AttribData::V2F32(v) => v.push(Vector2::zeros()),
            AttribData::V3F32(v) => v.push(Vector3::zeros()),
            AttribData::V4F32(v) => v.push([0.0; 4]),
            AttribData::V2I32(v) => v.push([0; 2]),
            AttribData::V3I32(v) => v.push([0; 3]),
            AttribData::V4I32(v) => v.push([0; 4]),
            AttribData::Str(v) => v.push(String::new()),
        }
    }

    /// Resizes the column with default values
    pub fn resize(&mut self, len: usize) {
        match self {
            AttribData::F32(v) => v.resize(len, 0.0),
            AttribData::F64(v) => v.resize(len, 0.0),
            AttribData::I32(v) => v.resize(len, 0),
            AttribData::I64(v) => v.resize(len, 0),
            AttribData::V2F32(v) => v.resize(len, Vector2::zeros()),
            AttribData::V3F32(v) => v.resize(len, Vector3::zeros()),
            AttribData::V4F32(v) => v.resize(len, [0.0; 4]),
            AttribData::V2I32(v) => v.resize(len, [0; 2]),
            AttribData::V3I32(v) => v.resize(len, [0; 3]),
            AttribData::V4I32(v) => v.resize(len, [0; 4]),
            AttribData::Str(v) => v.resize(len, String::new()),
        }
    }

    /// Shrinks backing storage to the current length
    pub fn shrink_to_fit(&mut self) {
        match self {
            AttribData::F32(v) => v.shrink_to_fit(),
            AttribData::F64(v) => v.shrink_to_fit(),
            AttribData::I32(v) => v.shrink_to_fit(),
            AttribData::I64(v) => v.shrink_to_fit(),
            AttribData::V2F32(v) => v.shrink_to_fit(),
            AttribData::V3F32(v) => v.shrink_to_fit(),
            AttribData::V4F32(v) => v.shrink_to_fit(),
            AttribData::V2I32(v) => v.shrink_to_fit(),
            AttribData::V3I32(v) => v.shrink_to_fit(),
            AttribData::V4I32(v) => v.shrink_to_fit(),
            AttribData::Str(v) => v.shrink_to_fit(),
        }
    }

    /// Copies `src[src_idx]` into `self[dest_idx]`
    ///
    /// Mismatched column types are a caller bug (columns are paired by name
    /// and type before interpolation begins).
    pub fn copy_from(&mut self, dest_idx: usize, src: &AttribData, src_idx: usize) {
        match (self, src) {
            (AttribData::F32(d), AttribData::F32(s)) => d[dest_idx] = s[src_idx],
            (AttribData::F64(d), AttribData::F64(s)) => d[dest_idx] = s[src_idx],
            (AttribData::I32(d), AttribData::I32(s)) => d[dest_idx] = s[src_idx],
            (AttribData::I64(d), AttribData::I64(s)) => d[dest_idx] = s[src_idx],
            (AttribData::V2F32(d), AttribData::V2F32(s)) => d[dest_idx] = s[src_idx],
            (AttribData::V3F32(d), AttribData::V3F32(s)) => d[dest_idx] = s[src_idx],
            (AttribData::V4F32(d), AttribData::V4F32(s)) => d[dest_idx] = s[src_idx],
            (AttribData::V2I32(d), AttribData::V2I32(s)) => d[dest_idx] = s[src_idx],
            (AttribData::V3I32(d), AttribData::V3I32(s)) => d[dest_idx] = s[src_idx],
            (AttribData::V4I32(d), AttribData::V4I32(s)) => d[dest_idx] = s[src_idx],
            (AttribData::Str(d), AttribData::Str(s)) => {
                d[dest_idx].clone_from(&s[src_idx])
            }
            _ => debug_assert!(false, "mismatched attribute column types"),
        }
    }

    /// Writes `lerp(src[a], src[b], t)` into `self[dest_idx]`
    ///
    /// Integer columns round to nearest; strings take the nearer source.
    pub fn lerp_from(
        &mut self,
        dest_idx: usize,
        src: &AttribData,
        a: usize,
        b: usize,
        t: f32,
    ) {
        let lerp = |x: f32, y: f32| x + (y - x) * t;
        match (self, src) {
            (AttribData::F32(d), AttribData::F32(s)) => {
                d[dest_idx] = lerp(s[a], s[b]);
            }
            (AttribData::F64(d), AttribData::F64(s)) => {
                d[dest_idx] = s[a] + (s[b] - s[a]) * t as f64;
            }
            (AttribData::I32(d), AttribData::I32(s)) => {
                d[dest_idx] = lerp(s[a] as f32, s[b] as f32).round() as i32;
            }
            (AttribData::I64(d), AttribData::I64(s)) => {
                d[dest_idx] =
                    (s[a] as f64 + (s[b] - s[a]) as f64 * t as f64).round() as i64;
            }
            (AttribData::V2F32(d), AttribData::V2F32(s)) => {
                d[dest_idx] = s[a].lerp(&s[b], t);
            }
            (AttribData::V3F32(d), AttribData::V3F32(s)) => {
                d[dest_idx] = s[a].lerp(&s[b], t);
            }
            (AttribData::V4F32(d), AttribData::V4F32(s)) => {
                for i in 0..4 {
                    d[dest_idx][i] = lerp(s[a][i], s[b][i]);
                }
            }
            (AttribData::V2I32(d), AttribData::V2I32(s)) => {
                for i in 0..2 {
                    d[dest_idx][i] =
                        lerp(s[a][i] as f32, s[b][i] as f32).round() as i32;
                }
            }
            (AttribData::V3I32(d), AttribData::V3I32(s)) => {
                for i in 0..3 {
                    d[dest_idx][i] =
                        lerp(s[a][i] as f32, s[b][i] as f32).round() as i32;
                }
            }
            (AttribData::V4I32(d), AttribData::V4I32(s)) => {
                for i in 0..4 {
                    d[dest_idx][i] =
                        lerp(s[a][i] as f32, s[b][i] as f32).round() as i32;
                }
            }
            (AttribData::Str(d), AttribData::Str(s)) => {
                d[dest_idx].clone_from(if t < 0.5 { &s[a] } else { &s[b] });
            }
            _ => debug_assert!(false, "mismatched attribute column types"),
        }
    }

    /// Writes the barycentric combination of `src[tri]` into `self[dest_idx]`
    pub fn tri_from(
        &mut self,
        dest_idx: usize,
        src: &AttribData,
        tri: [usize; 3],
        bc: Vector3<f32>,
    ) {
        let mix =
            |a: f32, b: f32, c: f32| a * bc.x + b * bc.y + c * bc.z;
        let [ia, ib, ic] = tri;
        match (self, src) {
            (AttribData::F32(d), AttribData::F32(s)) => {
                d[dest_idx] = mix(s[ia], s[ib], s[ic]);
            }
            (AttribData::F64(d), AttribData::F64(s)) => {
                d[dest_idx] = s[ia] * bc.x as f64
                    + s[ib] * bc.y as f64
                    + s[ic] * bc.z as f64;
            }
            (AttribData::I32(d), AttribData::I32(s)) => {
                d[dest_idx] =
                    mix(s[ia] as f32, s[ib] as f32, s[ic] as f32).round() as i32;
            }
            (AttribData::I64(d), AttribData::I64(s)) => {
                d[dest_idx] = (s[ia] as f64 * bc.x as f64
                    + s[ib] as f64 * bc.y as f64
                    + s[ic] as f64 * bc.z as f64)
                    .round() as i64;
            }
            (AttribData::V2F32(d), AttribData::V2F32(s)) => {
                d[dest_idx] = s[ia] * bc.x + s[ib] * bc.y + s[ic] * bc.z;
            }
            (AttribData::V3F32(d), AttribData::V3F32(s)) => {
                d[dest_idx] = s[ia] * bc.x + s[ib] * bc.y + s[ic] * bc.z;
            }
            (AttribData::V4F32(d), AttribData::V4F32(s)) => {
                for i in 0..4 {
                    d[dest_idx][i] = mix(s[ia][i], s[ib][i], s[ic][i]);
                }
            }
            (AttribData::V2I32(d), AttribData::V2I32(s)) => {
                for i in 0..2 {
                    d[dest_idx][i] =
                        mix(s[ia][i] as f32, s[ib][i] as f32, s[ic][i] as f32)
                            .round() as i32;
                }
            }
            (AttribData::V3I32(d), AttribData::V3I32(s)) => {
                for i in 0..3 {
                    d[dest_idx][i] =
                        mix(s[ia][i] as f32, s[ib][i] as f32, s[ic][i] as f32)
                            .round() as i32;
                }
            }
            (AttribData::V4I32(d), AttribData::V4I32(s)) => {
                for i in 0..4 {
                    d[dest_idx][i] =
                        mix(s[ia][i] as f32, s[ib][i] as f32, s[ic][i] as f32)
                            .round() as i32;
                }
            }
            (AttribData::Str(d), AttribData::Str(s)) => {
                // nearest corner wins
                let best = if bc.x >= bc.y && bc.x >= bc.z {
                    ia
                } else if bc.y >= bc.z {
                    ib
                } else {
                    ic
                };
                d[dest_idx].clone_from(&s[best]);
            }
            _ => debug_assert!(false, "mismatched attribute column types"),
        }
    }

    /// Blends `other[other_idx]` onto `self[dest_idx]` in place
    ///
    /// `self[dest_idx]` holds the base value (`a`), `other` supplies `b`.
    /// String columns accept only replace and append.
    pub fn blend_with(
        &mut self,
        dest_idx: usize,
        other: &AttribData,
        other_idx: usize,
        mode: BlendMode,
    ) -> Result<(), Error> {
        match (self, other) {
            (AttribData::Str(d), AttribData::Str(s)) => match mode {
                BlendMode::Replace => {
                    d[dest_idx].clone_from(&s[other_idx]);
                    Ok(())
                }
                BlendMode::Append => {
                    d[dest_idx].push_str(&s[other_idx]);
                    d[dest_idx].truncate(ATTRIB_STRING_MAX_LEN);
                    Ok(())
                }
                _ => Err(Error::BadBlendMode),
            },
            (d, s) => {
                if mode == BlendMode::Append {
                    return Err(Error::BadBlendMode);
                }
                match (d, s) {
                    (AttribData::F32(d), AttribData::F32(s)) => {
                        d[dest_idx] = blend_scalar(mode, d[dest_idx], s[other_idx]);
                    }
                    (AttribData::F64(d), AttribData::F64(s)) => {
                        d[dest_idx] = blend_scalar(
                            mode,
                            d[dest_idx] as f32,
                            s[other_idx] as f32,
                        ) as f64;
                    }
                    (AttribData::I32(d), AttribData::I32(s)) => {
                        d[dest_idx] = blend_scalar(
                            mode,
                            d[dest_idx] as f32,
                            s[other_idx] as f32,
                        )
                        .round() as i32;
                    }
                    (AttribData::I64(d), AttribData::I64(s)) => {
                        d[dest_idx] = blend_scalar(
                            mode,
                            d[dest_idx] as f32,
                            s[other_idx] as f32,
                        )
                        .round() as i64;
                    }
                    (AttribData::V2F32(d), AttribData::V2F32(s)) => {
                        for i in 0..2 {
                            d[dest_idx][i] =
                                blend_scalar(mode, d[dest_idx][i], s[other_idx][i]);
                        }
                    }
                    (AttribData::V3F32(d), AttribData::V3F32(s)) => {
                        for i in 0..3 {
                            d[dest_idx][i] =
                                blend_scalar(mode, d[dest_idx][i], s[other_idx][i]);
                        }
                    }
                    (AttribData::V4F32(d), AttribData::V4F32(s)) => {
                        for i in 0..4 {
                            d[dest_idx][i] =
                                blend_scalar(mode, d[dest_idx][i], s[other_idx][i]);
                        }
                    }
                    (AttribData::V2I32(d), AttribData::V2I32(s)) => {
                        for i in 0..2 {
                            d[dest_idx][i] = blend_scalar(
                                mode,
                                d[dest_idx][i] as f32,
                                s[other_idx][i] as f32,
                            )
                            .round() as i32;
                        }
                    }
                    (AttribData::V3I32(d), AttribData::V3I32(s)) => {
                        for i in 0..3 {
                            d[dest_idx][i] = blend_scalar(
                                mode,
                                d[dest_idx][i] as f32,
                                s[other_idx][i] as f32,
                            )
                            .round() as i32;
                        }
                    }
                    (AttribData::V4I32(d), AttribData::V4I32(s)) => {
                        for i in 0..4 {
                            d[dest_idx][i] = blend_scalar(
                                mode,
                                d[dest_idx][i] as f32,
                                s[other_idx][i] as f32,
                            )
                            .round() as i32;
                        }
                    }
                    _ => debug_assert!(false, "mismatched attribute column types"),
                }
                Ok(())
            }
        }
    }

    /// Splices `seg` into `self` starting at `offset`
    ///
    /// `self` must already be sized to cover the spliced range.
    pub fn splice(&mut self, offset: usize, seg: &AttribData) {
        for i in 0..seg.len() {
            self.copy_from(offset + i, seg, i);
        }
    }
}

/// One named attribute column
#[derive(Clone, Debug)]
pub struct Attrib {
    /// Column name; well-known names get active-alias treatment
    pub name: String,
    /// Typed values, one per element of the owning domain
    pub data: AttribData,
    /// Which mesh the column is sourced from during mapping
    pub origin: AttribOrigin,
    /// Whether the column participates in interpolation (false: first-source
    /// copy only)
    pub interpolate: bool,
}

/// Attribute columns owned by one mesh domain
#[derive(Clone, Debug, Default)]
pub struct AttribArray {
    arr: Vec<Attrib>,
}

impl AttribArray {
    /// Builds an empty attribute array
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of columns
    pub fn count(&self) -> usize {
        self.arr.len()
    }

    /// Iterates over the columns
    pub fn iter(&self) -> impl Iterator<Item = &Attrib> {
        self.arr.iter()
    }

    /// Iterates mutably over the columns
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Attrib> {
        self.arr.iter_mut()
    }

    /// Looks up a column index by name
    pub fn find(&self, name: &str) -> Option<usize> {
        self.arr.iter().position(|a| a.name == name)
    }

    /// Returns the column with the given name
    pub fn get(&self, name: &str) -> Option<&Attrib> {
        self.find(name).map(|i| &self.arr[i])
    }

    /// Returns the column at the given index
    pub fn at(&self, idx: usize) -> &Attrib {
        &self.arr[idx]
    }

    /// Returns the column at the given index, mutably
    pub fn at_mut(&mut self, idx: usize) -> &mut Attrib {
        &mut self.arr[idx]
    }

    /// Adds a column, replacing any existing column of the same name
    pub fn insert(&mut self, attrib: Attrib) -> usize {
        if let Some(i) = self.find(&attrib.name) {
            self.arr[i] = attrib;
            i
        } else {
            self.arr.push(attrib);
            self.arr.len() - 1
        }
    }

    /// Appends one default value to every column
    pub fn push_defaults(&mut self) {
        for a in &mut self.arr {
            a.data.push_default();
        }
    }

    /// Resizes every column
    pub fn resize(&mut self, len: usize) {
        for a in &mut self.arr {
            a.data.resize(len);
        }
    }

    /// Shrinks every column's backing storage
    pub fn shrink_to_fit(&mut self) {
        for a in &mut self.arr {
            a.data.shrink_to_fit();
        }
    }

    /// Checks that every column matches the domain length
    pub fn validate(&self, domain_len: usize) -> Result<(), Error> {
        for a in &self.arr {
            if a.data.len() != domain_len {
                return Err(Error::AttribLengthMismatch(a.name.clone()));
            }
        }
        Ok(())
    }

    /// Builds the union of two source arrays for an output mesh
    ///
    /// Name-matched columns of equal type become [`AttribOrigin::Common`];
    /// columns present on only one source keep that source as origin.  All
    /// columns start empty.
    pub fn union_from(
        mesh_in: &AttribArray,
        map: &AttribArray,
    ) -> Result<AttribArray, Error> {
        let mut out = AttribArray::new();
        for a in mesh_in.iter() {
            let origin = match map.get(&a.name) {
                Some(m) if !m.data.same_type(&a.data) => {
                    return Err(Error::AttribTypeMismatch(a.name.clone()));
                }
                Some(_) => AttribOrigin::Common,
                None => AttribOrigin::MeshIn,
            };
            out.insert(Attrib {
                name: a.name.clone(),
                data: a.data.new_like(),
                origin,
                interpolate: a.interpolate,
            });
        }
        for m in map.iter() {
            if out.find(&m.name).is_none() {
                out.insert(Attrib {
                    name: m.name.clone(),
                    data: m.data.new_like(),
                    origin: AttribOrigin::Map,
                    interpolate: m.interpolate,
                });
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn blend_replace_is_copy() {
        let mut a = AttribData::F32(vec![0.25]);
        let b = AttribData::F32(vec![0.75]);
        a.blend_with(0, &b, 0, BlendMode::Replace).unwrap();
        let AttribData::F32(v) = a else { unreachable!() };
        assert_eq!(v[0], 0.75);
    }

    #[test]
    fn blend_arithmetic() {
        let mut a = AttribData::F32(vec![0.5]);
        let b = AttribData::F32(vec![0.25]);
        a.blend_with(0, &b, 0, BlendMode::Add).unwrap();
        let AttribData::F32(ref v) = a else { unreachable!() };
        assert_eq!(v[0], 0.75);

        let mut a = AttribData::F32(vec![0.5]);
        a.blend_with(0, &b, 0, BlendMode::Darken).unwrap();
        let AttribData::F32(ref v) = a else { unreachable!() };
        assert_eq!(v[0], 0.25);
    }

    #[test]
    fn string_blend_rules() {
        let mut a = AttribData::Str(vec!["ab".to_owned()]);
        let b = AttribData::Str(vec!["cd".to_owned()]);
        a.blend_with(0, &b, 0, BlendMode::Append).unwrap();
        let AttribData::Str(ref v) = a else { unreachable!() };
        assert_eq!(v[0], "abcd");

        assert!(a.blend_with(0, &b, 0, BlendMode::Multiply).is_err());
        let mut n = AttribData::F32(vec![1.0]);
        let m = AttribData::F32(vec![1.0]);
        assert!(n.blend_with(0, &m, 0, BlendMode::Append).is_err());
    }

    #[test]
    fn lerp_and_tri() {
        let mut d = AttribData::V2F32(vec![Vector2::zeros()]);
        let s = AttribData::V2F32(vec![
            Vector2::new(0.0, 0.0),
            Vector2::new(1.0, 2.0),
            Vector2::new(3.0, 0.0),
        ]);
        d.lerp_from(0, &s, 0, 1, 0.5);
        let AttribData::V2F32(ref v) = d else { unreachable!() };
        assert_eq!(v[0], Vector2::new(0.5, 1.0));

        let mut d = AttribData::F32(vec![0.0]);
        let s = AttribData::F32(vec![3.0, 6.0, 9.0]);
        d.tri_from(0, &s, [0, 1, 2], Vector3::new(1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0));
        let AttribData::F32(ref v) = d else { unreachable!() };
        approx::assert_relative_eq!(v[0], 6.0, epsilon = 1e-5);
    }

    #[test]
    fn union_marks_origins() {
        let mut a = AttribArray::new();
        a.insert(Attrib {
            name: "shared".into(),
            data: AttribData::F32(vec![]),
            origin: AttribOrigin::MeshIn,
            interpolate: true,
        });
        a.insert(Attrib {
            name: "in_only".into(),
            data: AttribData::I32(vec![]),
            origin: AttribOrigin::MeshIn,
            interpolate: true,
        });
        let mut b = AttribArray::new();
        b.insert(Attrib {
            name: "shared".into(),
            data: AttribData::F32(vec![]),
            origin: AttribOrigin::Map,
            interpolate: true,
        });
        b.insert(Attrib {
            name: "map_only".into(),
            data: AttribData::Str(vec![]),
            origin: AttribOrigin::Map,
            interpolate: false,
        });
        let u = AttribArray::union_from(&a, &b).unwrap();
        assert_eq!(u.get("shared").unwrap().origin, AttribOrigin::Common);
        assert_eq!(u.get("in_only").unwrap().origin, AttribOrigin::MeshIn);
        assert_eq!(u.get("map_only").unwrap().origin, AttribOrigin::Map);

        let mut c = AttribArray::new();
        c.insert(Attrib {
            name: "shared".into(),
            data: AttribData::I32(vec![]),
            origin: AttribOrigin::Map,
            interpolate: true,
        });
        assert!(AttribArray::union_from(&a, &c).is_err());
    }
}
