//! Memory slices.
//!
//! Memory is split into disjoint alias classes, one per struct field.
//! A memory type names the class it slices and the type of any value
//! that may be loaded from it.

use super::Ty;

/// Alias class lattice: a flat lattice of classes under a top and bottom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Alias {
    Top,
    Class(u32),
    /// All of memory.
    Bot,
}

impl Alias {
    pub fn meet(self, other: Alias) -> Alias {
        match (self, other) {
            (a, b) if a == b => a,
            (Alias::Top, x) | (x, Alias::Top) => x,
            _ => Alias::Bot,
        }
    }

    pub fn dual(self) -> Alias {
        match self {
            Alias::Top => Alias::Bot,
            Alias::Bot => Alias::Top,
            c => c,
        }
    }
}

/// Memory state of one alias class (or all of memory).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemType {
    pub alias: Alias,
    /// Type of values stored in this slice.
    pub t: Ty,
}
