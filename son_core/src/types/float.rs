//! Floating-point types.
//!
//! Floats form a short lattice keyed by `sz`:
//!
//! ```text
//!   ~flt (-64)
//!     |      \
//!   ~f32 (-32) \
//!     |         \
//!   f32 consts   other consts   (sz = 0, value in `bits`)
//!     |         /
//!   f32  (32)  /
//!     |       /
//!   flt  (64)
//! ```

/// Float type: a constant (`sz == 0`) or one of the four size bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FloatType {
    /// -64/-32 high, 0 constant, 32/64 low.
    pub sz: i8,
    /// `f64::to_bits` of the constant; zero otherwise.
    pub bits: u64,
}

impl FloatType {
    pub const F64: FloatType = FloatType { sz: 64, bits: 0 };
    pub const F32: FloatType = FloatType { sz: 32, bits: 0 };
    pub const F64_TOP: FloatType = FloatType { sz: -64, bits: 0 };
    pub const F32_TOP: FloatType = FloatType { sz: -32, bits: 0 };

    /// Constant float.
    #[inline]
    pub fn con(v: f64) -> Self {
        FloatType {
            sz: 0,
            bits: v.to_bits(),
        }
    }

    #[inline]
    pub const fn is_high(self) -> bool {
        self.sz < 0
    }

    #[inline]
    pub const fn is_constant(self) -> bool {
        self.sz == 0
    }

    /// Constant value, if this is a constant.
    #[inline]
    pub fn value(self) -> Option<f64> {
        if self.is_constant() {
            Some(f64::from_bits(self.bits))
        } else {
            None
        }
    }

    /// True if the constant survives a round trip through `f32`.
    pub fn is_f32(self) -> bool {
        match self.value() {
            Some(v) => ((v as f32) as f64).to_bits() == v.to_bits(),
            None => self.sz.abs() == 32,
        }
    }

    #[inline]
    pub fn dual(self) -> FloatType {
        FloatType {
            sz: -self.sz,
            bits: self.bits,
        }
    }

    pub fn meet(self, other: FloatType) -> FloatType {
        if self == other {
            return self;
        }
        // Sort so `lo` has the higher lattice position (smaller sz).
        let (hi, lo) = if self.sz <= other.sz {
            (self, other)
        } else {
            (other, self)
        };
        if lo.sz == 64 {
            return FloatType::F64;
        }
        if hi.sz == -64 {
            return lo;
        }
        match (hi.sz, lo.sz) {
            // Two distinct constants.
            (0, 0) => {
                if hi.is_f32() && lo.is_f32() {
                    FloatType::F32
                } else {
                    FloatType::F64
                }
            }
            (-32, 32) | (32, 32) => FloatType::F32,
            (0, 32) | (-32, 0) => {
                let con = if hi.sz == 0 { hi } else { lo };
                if !con.is_f32() {
                    FloatType::F64
                } else if lo.sz == 32 {
                    FloatType::F32
                } else {
                    con
                }
            }
            _ => lo,
        }
    }
}
