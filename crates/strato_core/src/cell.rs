//! Hierarchical cube-face cell grid.
//!
//! Cell identifiers follow the S2 layout: three face bits, then two bits per
//! level along a Hilbert curve, then a trailing marker bit. Only the forward
//! mapping (point to cell) and parent truncation are needed here; coverings
//! are always produced at one fixed level.

use std::fmt;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::geo::LatLng;

pub const MAX_LEVEL: u8 = 30;
/// Level whose cells average roughly 1.27 km².
pub const DEFAULT_LEVEL: u8 = 13;

const POS_BITS: u32 = 2 * MAX_LEVEL as u32 + 1;
const MAX_SIZE: f64 = (1u64 << MAX_LEVEL) as f64;
const LOOKUP_BITS: u32 = 4;
const SWAP_MASK: usize = 0x01;
const INVERT_MASK: usize = 0x02;

const POS_TO_IJ: [[usize; 4]; 4] = [[0, 1, 3, 2], [0, 2, 3, 1], [3, 2, 0, 1], [3, 1, 0, 2]];
const POS_TO_ORIENTATION: [usize; 4] = [SWAP_MASK, 0, 0, INVERT_MASK | SWAP_MASK];

struct LookupTables {
    pos: [u16; 1 << (2 * LOOKUP_BITS + 2)],
}

fn lookup() -> &'static LookupTables {
    static TABLES: OnceLock<LookupTables> = OnceLock::new();
    TABLES.get_or_init(|| {
        let mut tables = LookupTables {
            pos: [0; 1 << (2 * LOOKUP_BITS + 2)],
        };
        for orientation in [0, SWAP_MASK, INVERT_MASK, SWAP_MASK | INVERT_MASK] {
            init_lookup_cell(&mut tables, 0, 0, 0, orientation, 0, orientation);
        }
        tables
    })
}

fn init_lookup_cell(
    tables: &mut LookupTables,
    level: u32,
    i: usize,
    j: usize,
    orig_orientation: usize,
    pos: usize,
    orientation: usize,
) {
    if level == LOOKUP_BITS {
        let ij = (i << LOOKUP_BITS) + j;
        tables.pos[(ij << 2) + orig_orientation] = ((pos << 2) + orientation) as u16;
        return;
    }
    let order = POS_TO_IJ[orientation];
    for (child, ij) in order.iter().enumerate() {
        init_lookup_cell(
            tables,
            level + 1,
            (i << 1) + (ij >> 1),
            (j << 1) + (ij & 1),
            orig_orientation,
            (pos << 2) + child,
            orientation ^ POS_TO_ORIENTATION[child],
        );
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CellId(pub u64);

impl CellId {
    /// Leaf cell containing the point.
    pub fn from_lat_lng(point: LatLng) -> Self {
        let (x, y, z) = point.to_xyz();
        let face = face_of(x, y, z);
        let (u, v) = face_xyz_to_uv(face, x, y, z);
        let i = st_to_ij(uv_to_st(u));
        let j = st_to_ij(uv_to_st(v));
        Self::from_face_ij(face, i, j)
    }

    fn from_face_ij(face: usize, i: usize, j: usize) -> Self {
        let tables = lookup();
        let mut n = (face as u64) << (POS_BITS - 1);
        let mut bits = face & SWAP_MASK;
        let mask = (1usize << LOOKUP_BITS) - 1;
        for k in (0..8u32).rev() {
            bits += ((i >> (k * LOOKUP_BITS)) & mask) << (LOOKUP_BITS + 2);
            bits += ((j >> (k * LOOKUP_BITS)) & mask) << 2;
            bits = tables.pos[bits] as usize;
            n |= ((bits >> 2) as u64) << (k * 2 * LOOKUP_BITS);
            bits &= SWAP_MASK | INVERT_MASK;
        }
        Self(n * 2 + 1)
    }

    pub fn face(self) -> u8 {
        (self.0 >> POS_BITS) as u8
    }

    fn lsb(self) -> u64 {
        self.0 & self.0.wrapping_neg()
    }

    fn lsb_for_level(level: u8) -> u64 {
        1u64 << (2 * u32::from(MAX_LEVEL - level))
    }

    pub fn level(self) -> u8 {
        MAX_LEVEL - (self.0.trailing_zeros() / 2) as u8
    }

    pub fn is_valid(self) -> bool {
        self.face() < 6 && (self.lsb() & 0x1555_5555_5555_5555) != 0
    }

    pub fn parent(self, level: u8) -> Self {
        let level = level.min(MAX_LEVEL);
        let lsb = Self::lsb_for_level(level);
        Self((self.0 & lsb.wrapping_neg()) | lsb)
    }

    pub fn contains(self, other: CellId) -> bool {
        let lsb = self.lsb();
        other.0 >= self.0 - (lsb - 1) && other.0 <= self.0 + (lsb - 1)
    }

    /// Bit-preserving conversion for signed 64-bit storage columns.
    pub fn as_i64(self) -> i64 {
        self.0 as i64
    }

    pub fn from_i64(value: i64) -> Self {
        Self(value as u64)
    }

    /// Compact hex form with trailing zero nibbles removed.
    pub fn to_token(self) -> String {
        if self.0 == 0 {
            return "X".to_string();
        }
        let hex = format!("{:016x}", self.0);
        hex.trim_end_matches('0').to_string()
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_token())
    }
}

fn face_of(x: f64, y: f64, z: f64) -> usize {
    let (ax, ay, az) = (x.abs(), y.abs(), z.abs());
    let axis = if ax > ay {
        if ax > az { 0 } else { 2 }
    } else if ay > az {
        1
    } else {
        2
    };
    let component = [x, y, z][axis];
    if component < 0.0 { axis + 3 } else { axis }
}

fn face_xyz_to_uv(face: usize, x: f64, y: f64, z: f64) -> (f64, f64) {
    match face {
        0 => (y / x, z / x),
        1 => (-x / y, z / y),
        2 => (-x / z, -y / z),
        3 => (z / x, y / x),
        4 => (z / y, -x / y),
        _ => (-y / z, -x / z),
    }
}

fn uv_to_st(u: f64) -> f64 {
    if u >= 0.0 {
        0.5 * (1.0 + 3.0 * u).sqrt()
    } else {
        1.0 - 0.5 * (1.0 - 3.0 * u).sqrt()
    }
}

fn st_to_ij(s: f64) -> usize {
    let scaled = (MAX_SIZE * s).floor();
    scaled.clamp(0.0, MAX_SIZE - 1.0) as usize
}
