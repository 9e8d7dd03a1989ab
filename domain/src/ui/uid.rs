//! Stable, position-derived widget identifiers.
//!
//! `uid := H(parent_uid ∥ name ∥ "x,y,w,h")`, SHA-256 truncated to 64 bits.
//! Only positional information feeds the hash: rebuilding the same layout
//! yields the same uids, so a touch event recorded against an old tree can
//! be replayed against a freshly rebuilt one.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Identifier of one UI node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Uid(pub u64);

impl Uid {
    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// Derive the uid of a child placed at `grid` under `self`.
    pub fn child(&self, name: &str, grid: &GridCoord) -> Uid {
        derive_uid(*self, name, grid)
    }
}

impl std::fmt::Display for Uid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Uid {
    fn from(value: u64) -> Self {
        Uid(value)
    }
}

/// Grid placement of a node inside its parent layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct GridCoord {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl GridCoord {
    pub fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self { x, y, w, h }
    }
}

impl std::fmt::Display for GridCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{},{},{}", self.x, self.y, self.w, self.h)
    }
}

/// Hash `(parent, name, grid)` into a uid.
pub fn derive_uid(parent: Uid, name: &str, grid: &GridCoord) -> Uid {
    let mut hasher = Sha256::new();
    hasher.update(parent.0.to_le_bytes());
    hasher.update(name.as_bytes());
    hasher.update(grid.to_string().as_bytes());
    let digest = hasher.finalize();

    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    Uid(u64::from_le_bytes(head))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_is_deterministic() {
        let grid = GridCoord::new(0, 1, 2, 1);
        assert_eq!(derive_uid(Uid(5), "date", &grid), derive_uid(Uid(5), "date", &grid));
    }

    #[test]
    fn every_input_changes_the_uid() {
        let grid = GridCoord::new(0, 1, 2, 1);
        let base = derive_uid(Uid(5), "date", &grid);
        assert_ne!(base, derive_uid(Uid(6), "date", &grid));
        assert_ne!(base, derive_uid(Uid(5), "time", &grid));
        assert_ne!(base, derive_uid(Uid(5), "date", &GridCoord::new(1, 1, 2, 1)));
        assert_ne!(base, derive_uid(Uid(5), "date", &GridCoord::new(0, 1, 1, 1)));
    }

    #[test]
    fn grid_text_matches_hash_input_format() {
        assert_eq!(GridCoord::new(1, 2, 3, 4).to_string(), "1,2,3,4");
    }

    #[test]
    fn child_is_shorthand_for_derive() {
        let grid = GridCoord::new(0, 0, 1, 1);
        assert_eq!(Uid(1).child("x", &grid), derive_uid(Uid(1), "x", &grid));
    }
}
