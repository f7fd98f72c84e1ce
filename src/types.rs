//! Core type definitions for the T.38 reassembly engine.
//!
//! Provides zero-cost newtypes so that sequence numbers, capture frame numbers
//! and reassembly unit identifiers cannot be mixed up at compile time.

use std::fmt;
use std::ops::{Add, AddAssign, Sub};

use serde::{Deserialize, Serialize};

/// Declares a `Copy` newtype over an unsigned integer with wrapping arithmetic.
macro_rules! t38_newtype {
    (
        $(#[$meta:meta])*
        $name:ident($inner:ty) => $prefix:literal
        $(, custom_methods: { $($custom:tt)* })?
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        #[derive(Serialize, Deserialize)]
        #[repr(transparent)]
        pub struct $name(pub $inner);

        impl $name {
            #[inline]
            pub const fn new(value: $inner) -> Self {
                Self(value)
            }

            #[inline]
            pub const fn value(self) -> $inner {
                self.0
            }

            #[inline]
            pub const fn wrapping_add(self, rhs: $inner) -> Self {
                Self(self.0.wrapping_add(rhs))
            }

            /// Forward distance from `rhs` to `self`.
            #[inline]
            pub const fn wrapping_sub(self, rhs: Self) -> $inner {
                self.0.wrapping_sub(rhs.0)
            }

            $($($custom)*)?
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}{}", $prefix, self.0)
            }
        }

        impl From<$inner> for $name {
            #[inline]
            fn from(value: $inner) -> Self {
                Self(value)
            }
        }

        impl PartialEq<$inner> for $name {
            #[inline]
            fn eq(&self, other: &$inner) -> bool {
                self.0 == *other
            }
        }

        impl Add<$inner> for $name {
            type Output = Self;

            #[inline]
            fn add(self, rhs: $inner) -> Self::Output {
                self.wrapping_add(rhs)
            }
        }

        impl AddAssign<$inner> for $name {
            #[inline]
            fn add_assign(&mut self, rhs: $inner) {
                *self = self.wrapping_add(rhs);
            }
        }

        impl Sub<Self> for $name {
            type Output = $inner;

            #[inline]
            fn sub(self, rhs: Self) -> Self::Output {
                self.wrapping_sub(rhs)
            }
        }
    };
}

t38_newtype!(
    /// UDPTL sequence number. The sequence space is 16 bits and wraps.
    SequenceNumber(u16) => "SEQ",
    custom_methods: {
        /// Wire order, as written in the UDPTL header.
        #[inline]
        pub fn to_be_bytes(self) -> [u8; 2] {
            self.0.to_be_bytes()
        }

        /// Distance from `start` to `self` in the 16-bit sequence space.
        ///
        /// A sequence number that precedes `start` yields a large distance
        /// (e.g. one step behind is `65535`), never a negative one.
        #[inline]
        pub fn offset_from(self, start: SequenceNumber) -> u32 {
            u32::from(self.0.wrapping_sub(start.0))
        }
    }
);

t38_newtype!(
    /// Capture frame number identifying one transport packet.
    FrameNumber(u32) => "#"
);

t38_newtype!(
    /// Per-direction identifier of a reassembly unit.
    UnitId(u32) => "UNIT"
);

impl UnitId {
    /// The first unit identifier handed out by a direction.
    pub const FIRST: Self = Self::new(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_number_wrapping() {
        let sn1 = SequenceNumber::new(65534);
        let sn2 = sn1 + 3;
        assert_eq!(sn2, 1);

        let diff = sn2 - sn1;
        assert_eq!(diff, 3);
    }

    #[test]
    fn offset_from_handles_wraparound() {
        let start = SequenceNumber::new(65534);
        assert_eq!(SequenceNumber::new(65534).offset_from(start), 0);
        assert_eq!(SequenceNumber::new(65535).offset_from(start), 1);
        assert_eq!(SequenceNumber::new(0).offset_from(start), 2);
        assert_eq!(SequenceNumber::new(65533).offset_from(start), 65535);
    }

    #[test]
    fn display_prefixes() {
        assert_eq!(format!("{}", SequenceNumber::new(7)), "SEQ7");
        assert_eq!(format!("{}", FrameNumber::new(42)), "#42");
        assert_eq!(format!("{}", UnitId::FIRST), "UNIT1");
    }

    #[test]
    fn unit_id_increments() {
        let mut id = UnitId::FIRST;
        id += 1;
        assert_eq!(id, 2);
        assert!(id > UnitId::FIRST);
    }

    #[test]
    fn serde_is_transparent_to_inner_value() {
        let sn = SequenceNumber::new(513);
        let json = serde_json::to_string(&sn).unwrap();
        assert_eq!(json, "513");
        let back: SequenceNumber = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sn);
    }
}
