//! Strongly-typed identifiers for pacer entities.
//!
//! Following `TigerStyle`: explicit types prevent bugs from mixing up IDs.
//! Drive keys are opaque 64-bit handles supplied by the transport.

use std::fmt;

/// Macro to generate strongly-typed ID wrappers.
///
/// Each ID type wraps a u64 and provides:
/// - Type safety (can't mix `DriveKey` with `PacerId`)
/// - Debug/Display formatting
/// - Zero-cost abstraction (same as raw u64)
macro_rules! define_id {
    ($name:ident, $prefix:expr, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        #[repr(transparent)]
        pub struct $name(u64);

        impl $name {
            /// Creates a new ID from a raw u64 value.
            #[inline]
            #[must_use]
            pub const fn new(value: u64) -> Self {
                Self(value)
            }

            /// Returns the raw u64 value.
            #[inline]
            #[must_use]
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", $prefix, self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}-{:016x}", $prefix, self.0)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self::new(value)
            }
        }

        impl From<$name> for u64 {
            fn from(id: $name) -> Self {
                id.get()
            }
        }
    };
}

// Destination identification.
define_id!(DriveKey, "drive", "Opaque identifier for the destination (drive or target) of a queue.");

// Pacer identification.
define_id!(PacerId, "pacer", "Unique identifier for a pacer instance within the process.");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_type_safety() {
        let drive = DriveKey::new(1);
        let pacer = PacerId::new(1);

        // These are different types even with same value.
        assert_eq!(drive.get(), pacer.get());
        // But they can't be compared directly (won't compile):
        // assert_ne!(drive, pacer);
    }

    #[test]
    fn test_id_display() {
        let drive = DriveKey::new(0xbeef);
        assert_eq!(format!("{drive}"), "drive-000000000000beef");
        assert_eq!(format!("{drive:?}"), "drive(48879)");
    }

    #[test]
    fn test_id_conversions() {
        let key: DriveKey = 7_u64.into();
        let raw: u64 = key.into();
        assert_eq!(raw, 7);
        assert!(DriveKey::new(1) < DriveKey::new(2));
    }
}
