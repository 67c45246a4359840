//! Index maps from the dense 468/478-point face mesh to sparse landmark schemes.
//!
//! The dense mesh is not numbered sequentially around facial features, so each
//! scheme selects mesh indices in a fixed order. The canonical scheme follows
//! the classic 68-point layout:
//!
//! | Points | Region         |
//! |--------|----------------|
//! | 0-16   | face outline   |
//! | 17-21  | right eyebrow  |
//! | 22-26  | left eyebrow   |
//! | 27-30  | nose bridge    |
//! | 31-35  | nose base      |
//! | 36-41  | right eye      |
//! | 42-47  | left eye       |
//! | 48-59  | outer mouth    |
//! | 60-67  | inner mouth    |
//!
//! The extended schemes only ever append to those 68 points.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::types::Point;

pub const FACE_OUTLINE: &[usize] = &[
    127, 234, 132, 58, 172, 150, 149, 148, 152, 377, 378, 379, 397, 288, 361, 454, 356,
];
pub const RIGHT_EYEBROW: &[usize] = &[70, 63, 105, 66, 107];
pub const LEFT_EYEBROW: &[usize] = &[336, 296, 334, 293, 300];
pub const NOSE_BRIDGE: &[usize] = &[168, 197, 5, 4];
pub const NOSE_BASE: &[usize] = &[98, 97, 2, 326, 327];
pub const RIGHT_EYE: &[usize] = &[130, 160, 158, 133, 153, 144];
pub const LEFT_EYE: &[usize] = &[362, 385, 387, 263, 373, 380];
pub const OUTER_MOUTH: &[usize] = &[61, 39, 37, 0, 267, 269, 291, 321, 314, 17, 84, 91];
pub const INNER_MOUTH: &[usize] = &[78, 82, 13, 312, 308, 317, 14, 87];

pub const FOREHEAD: &[usize] = &[162, 21, 54, 103, 67, 109, 10, 338, 297, 332, 284, 251, 389];
pub const LOWER_RIGHT_EYE: &[usize] = &[143, 117, 118, 119, 120, 121, 128, 193];
pub const LOWER_LEFT_EYE: &[usize] = &[417, 357, 350, 349, 348, 347, 346, 372];
pub const NOSE_CONTOUR: &[usize] = &[209, 48, 429, 278];
pub const MOUTH_REGION: &[usize] = &[
    57, 186, 92, 165, 167, 164, 393, 391, 322, 410, 287, 273, 335, 406, 313, 18, 83, 182, 106, 43,
];

const fn concat<const N: usize>(groups: &[&[usize]]) -> [usize; N] {
    let mut out = [0usize; N];
    let mut n = 0;
    let mut g = 0;
    while g < groups.len() {
        let group = groups[g];
        let mut i = 0;
        while i < group.len() {
            out[n] = group[i];
            n += 1;
            i += 1;
        }
        g += 1;
    }
    assert!(n == N, "index map length mismatch");
    out
}

const CANONICAL_GROUPS: [&[usize]; 9] = [
    FACE_OUTLINE,
    RIGHT_EYEBROW,
    LEFT_EYEBROW,
    NOSE_BRIDGE,
    NOSE_BASE,
    RIGHT_EYE,
    LEFT_EYE,
    OUTER_MOUTH,
    INNER_MOUTH,
];

pub const CANONICAL_68: [usize; 68] = concat(&CANONICAL_GROUPS);

pub const EXTENDED: [usize; 121] = concat(&[
    CANONICAL_68.as_slice(),
    FOREHEAD,
    LOWER_RIGHT_EYE,
    LOWER_LEFT_EYE,
    NOSE_CONTOUR,
    MOUTH_REGION,
]);

pub const EXTENDED_NO_MOUTH: [usize; 101] = concat(&[
    CANONICAL_68.as_slice(),
    FOREHEAD,
    LOWER_RIGHT_EYE,
    LOWER_LEFT_EYE,
    NOSE_CONTOUR,
]);

/// Which sparse landmark layout to emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LandmarkScheme {
    /// The classic 68-point layout.
    #[serde(rename = "68")]
    Canonical,
    /// 68 points plus forehead, lower eye, nose contour and mouth region.
    #[default]
    Extended,
    /// The extended layout without the mouth region, for analyses where the
    /// lower face is often occluded.
    ExtendedNoMouth,
}

impl LandmarkScheme {
    /// Dense-mesh index for every point of the scheme, in output order.
    pub const fn indices(self) -> &'static [usize] {
        match self {
            LandmarkScheme::Canonical => &CANONICAL_68,
            LandmarkScheme::Extended => &EXTENDED,
            LandmarkScheme::ExtendedNoMouth => &EXTENDED_NO_MOUTH,
        }
    }

    pub const fn len(self) -> usize {
        self.indices().len()
    }

    /// Smallest dense landmark count able to serve this scheme.
    pub fn required_dense_len(self) -> usize {
        self.indices().iter().max().map_or(0, |&m| m + 1)
    }

    /// Position of a dense index within this scheme, if it is part of it.
    pub fn position_of(self, dense_index: usize) -> Option<usize> {
        self.indices().iter().position(|&i| i == dense_index)
    }

    /// Select this scheme's points from a dense point list.
    ///
    /// Returns `None` when `dense` is too short to provide every point.
    pub fn remap(self, dense: &[Point]) -> Option<Vec<Point>> {
        self.indices()
            .iter()
            .map(|&i| dense.get(i).copied())
            .collect()
    }

    pub const fn name(self) -> &'static str {
        match self {
            LandmarkScheme::Canonical => "68",
            LandmarkScheme::Extended => "extended",
            LandmarkScheme::ExtendedNoMouth => "extended-no-mouth",
        }
    }
}

impl fmt::Display for LandmarkScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LandmarkScheme {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "68" | "canonical" => Ok(LandmarkScheme::Canonical),
            "extended" | "ext" => Ok(LandmarkScheme::Extended),
            "extended-no-mouth" | "ext-no-mouth" => Ok(LandmarkScheme::ExtendedNoMouth),
            _ => Err(Error::UnknownScheme(s.to_string())),
        }
    }
}
