//! Integer ranges.
//!
//! An integer type is a closed range `[min, max]`. Ranges with
//! `min > max` are the high (dual) half of the lattice: `dual` swaps the
//! bounds, and `meet` is the component-wise `(min, max)` on the pair,
//! which is a lattice over both halves at once.
//!
//! ```text
//!        ~int  = [MAX, MIN]
//!      /   |   \
//!    ...  0 1 2 ...   constants: min == max
//!      \   |   /
//!        int   = [MIN, MAX]
//! ```

/// Integer range `[min, max]`; high when `min > max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IntType {
    pub min: i64,
    pub max: i64,
}

impl IntType {
    /// Every 64-bit integer.
    pub const BOT: IntType = IntType {
        min: i64::MIN,
        max: i64::MAX,
    };
    /// No integer chosen yet.
    pub const TOP: IntType = IntType {
        min: i64::MAX,
        max: i64::MIN,
    };
    /// Truth values `[0, 1]`.
    pub const BOOL: IntType = IntType { min: 0, max: 1 };

    /// Single constant.
    #[inline]
    pub const fn con(v: i64) -> Self {
        IntType { min: v, max: v }
    }

    /// Range `[min, max]`.
    #[inline]
    pub const fn range(min: i64, max: i64) -> Self {
        IntType { min, max }
    }

    #[inline]
    pub const fn is_high(self) -> bool {
        self.min > self.max
    }

    #[inline]
    pub const fn is_constant(self) -> bool {
        self.min == self.max
    }

    /// Constant value, if this is a constant.
    #[inline]
    pub const fn value(self) -> Option<i64> {
        if self.is_constant() {
            Some(self.min)
        } else {
            None
        }
    }

    #[inline]
    pub fn meet(self, other: IntType) -> IntType {
        IntType {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    #[inline]
    pub const fn dual(self) -> IntType {
        IntType {
            min: self.max,
            max: self.min,
        }
    }

    /// True if `v` is a possible value of a low range.
    #[inline]
    pub const fn contains(self, v: i64) -> bool {
        !self.is_high() && self.min <= v && v <= self.max
    }

    /// True for low ranges with no negative member.
    #[inline]
    pub const fn is_non_negative(self) -> bool {
        !self.is_high() && self.min >= 0
    }

    /// Bits that may be set in any member of the range.
    ///
    /// Constants report themselves; non-negative ranges report the smallest
    /// all-ones mask covering `max`; anything reaching below zero may set
    /// every bit.
    pub fn mask(self) -> i64 {
        if self.is_high() {
            return 0;
        }
        if self.is_constant() {
            return self.min;
        }
        if self.min < 0 {
            return -1;
        }
        if self.max == 0 {
            return 0;
        }
        let bits = 64 - self.max.leading_zeros();
        if bits >= 63 {
            i64::MAX
        } else {
            (1i64 << bits) - 1
        }
    }

    /// Widen a low non-constant range to the full integer type.
    #[inline]
    pub fn widen(self) -> IntType {
        if self.is_high() || self.is_constant() {
            self
        } else {
            IntType::BOT
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meet_constants() {
        let r = IntType::con(3).meet(IntType::con(7));
        assert_eq!(r, IntType::range(3, 7));
        assert_eq!(IntType::TOP.meet(IntType::con(5)), IntType::con(5));
        assert_eq!(IntType::BOT.meet(IntType::con(5)), IntType::BOT);
    }

    #[test]
    fn test_high_range_meet_member() {
        // ~[3,5] meets 4 to exactly 4, meets 7 to the covering range.
        let high = IntType::range(3, 5).dual();
        assert!(high.is_high());
        assert_eq!(high.meet(IntType::con(4)), IntType::con(4));
        assert_eq!(high.meet(IntType::con(7)), IntType::range(5, 7));
    }

    #[test]
    fn test_dual_involution() {
        let r = IntType::range(-4, 9);
        assert_eq!(r.dual().dual(), r);
        assert_eq!(IntType::BOT.dual(), IntType::TOP);
    }

    #[test]
    fn test_mask() {
        assert_eq!(IntType::con(6).mask(), 6);
        assert_eq!(IntType::range(0, 5).mask(), 7);
        assert_eq!(IntType::range(0, 8).mask(), 15);
        assert_eq!(IntType::range(-1, 3).mask(), -1);
        assert_eq!(IntType::BOOL.mask(), 1);
    }

    #[test]
    fn test_contains_and_widen() {
        assert!(IntType::BOOL.contains(0));
        assert!(!IntType::range(1, 4).contains(0));
        assert!(!IntType::TOP.contains(0));
        assert_eq!(IntType::range(1, 4).widen(), IntType::BOT);
        assert_eq!(IntType::con(4).widen(), IntType::con(4));
    }
}
