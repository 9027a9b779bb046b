//! Bit masks for permission levels.
//!
//! A [`Mask`] is the OR-combination of level bits within one permission
//! group. Level values carry exactly one bit; stored role masks carry any
//! combination of them.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

/// Number of usable bits in a group mask. The top bit is reserved so that
/// masks stay representable as signed 32-bit values in external storage.
pub const USABLE_BITS: u32 = 31;

/// Bit mask of permission levels within one group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Mask(u32);

impl Mask {
    /// The empty mask ("no access").
    pub const EMPTY: Self = Self(0);

    /// Wrap raw bits.
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Mask with only bit `index` set, or `None` if outside the usable range.
    pub const fn bit(index: u32) -> Option<Self> {
        if index < USABLE_BITS {
            Some(Self(1 << index))
        } else {
            None
        }
    }

    /// Raw bits.
    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Whether exactly one usable bit is set (a valid level value).
    pub const fn is_single_bit(self) -> bool {
        self.0.is_power_of_two() && self.0.trailing_zeros() < USABLE_BITS
    }

    /// Whether any bit of `other` is also set here.
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Whether every bit of `other` is also set here.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Set the bits of `other`.
    pub const fn set(&mut self, other: Self) {
        self.0 |= other.0;
    }
}

impl BitOr for Mask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl BitOrAssign for Mask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.set(rhs);
    }
}

impl fmt::Display for Mask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
