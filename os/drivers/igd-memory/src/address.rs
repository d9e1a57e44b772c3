//! # Address Types

use crate::PAGE_SIZE;
use core::fmt;
use core::ops::{Add, AddAssign};

/// CPU-physical address, as seen by the device for DMA.
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysicalAddress(u64);

/// Address in the GPU's translated (PPGTT) address space.
///
/// The per-process GTT covers 48 bits; addresses are not sign-extended.
#[doc(alias = "GPU virtual address")]
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct GraphicsAddress(u64);

macro_rules! address_common {
    ($ty:ident) => {
        impl $ty {
            #[inline]
            #[must_use]
            pub const fn new(v: u64) -> Self {
                Self(v)
            }

            #[inline]
            #[must_use]
            pub const fn zero() -> Self {
                Self(0)
            }

            #[inline]
            #[must_use]
            pub const fn as_u64(self) -> u64 {
                self.0
            }

            /// Offset inside the containing 4 KiB page.
            #[inline]
            #[must_use]
            pub const fn page_offset(self) -> u64 {
                self.0 & (PAGE_SIZE as u64 - 1)
            }

            /// The containing 4 KiB page base.
            #[inline]
            #[must_use]
            pub const fn page_base(self) -> Self {
                Self(self.0 & !(PAGE_SIZE as u64 - 1))
            }

            #[inline]
            #[must_use]
            pub const fn is_page_aligned(self) -> bool {
                self.page_offset() == 0
            }

            /// Low 32 bits.
            #[inline]
            #[must_use]
            #[allow(clippy::cast_possible_truncation)]
            pub const fn low_u32(self) -> u32 {
                self.0 as u32
            }

            /// High 32 bits.
            #[inline]
            #[must_use]
            #[allow(clippy::cast_possible_truncation)]
            pub const fn high_u32(self) -> u32 {
                (self.0 >> 32) as u32
            }
        }

        impl From<u64> for $ty {
            #[inline]
            fn from(v: u64) -> Self {
                Self::new(v)
            }
        }

        impl Add<u64> for $ty {
            type Output = Self;
            #[inline]
            fn add(self, rhs: u64) -> Self::Output {
                Self(self.0 + rhs)
            }
        }

        impl AddAssign<u64> for $ty {
            #[inline]
            fn add_assign(&mut self, rhs: u64) {
                self.0 += rhs;
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{:016X}", self.0)
            }
        }
    };
}

address_common!(PhysicalAddress);
address_common!(GraphicsAddress);

impl GraphicsAddress {
    /// Number of address bits the GPU translates.
    pub const BITS: u32 = 48;

    /// Whether the address is reachable through a 4-level PPGTT.
    #[inline]
    #[must_use]
    pub const fn is_translatable(self) -> bool {
        self.0 >> Self::BITS == 0
    }
}

impl fmt::Debug for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PA(0x{:016X})", self.0)
    }
}

impl fmt::Debug for GraphicsAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GA(0x{:016X})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_split() {
        let pa = PhysicalAddress::new(0x0000_0010_2000_0042);
        assert_eq!(pa.page_offset(), 0x42);
        assert_eq!(pa.page_base().as_u64(), 0x0000_0010_2000_0000);
        assert!(pa.page_base().is_page_aligned());
        assert_eq!(pa.high_u32(), 0x10);
        assert_eq!(pa.low_u32(), 0x2000_0042);
    }

    #[test]
    fn translatable_range() {
        assert!(GraphicsAddress::new(0xdead_beef_000).is_translatable());
        assert!(GraphicsAddress::new(0x0000_7fff_ffff_f000).is_translatable());
        assert!(GraphicsAddress::new(0x0000_ffff_ffff_f000).is_translatable());
        assert!(!GraphicsAddress::new(0x0001_0000_0000_0000).is_translatable());
    }

    #[test]
    fn formatting() {
        assert_eq!(format!("{:?}", PhysicalAddress::new(0x1000)), "PA(0x0000000000001000)");
        assert_eq!(format!("{:?}", GraphicsAddress::new(0x1000)), "GA(0x0000000000001000)");
        assert_eq!(format!("{}", PhysicalAddress::new(0xAB)), "0x00000000000000AB");
    }
}
