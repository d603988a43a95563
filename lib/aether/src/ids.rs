use std::fmt;

/// Defines a newtype wrapping a `u64`, where zero denotes "none". Mirrors the
/// `custom_type_id!` pattern from `neutronium::identity`, minus the unsafe
/// static-registry bitflag machinery that pattern also provided: a strong
/// identifier only needs equality, ordering, hashing, and a compile error on
/// cross-type assignment, all of which a plain newtype gives for free.
macro_rules! define_id {
    ($name:ident) => {
        #[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
        #[repr(transparent)]
        pub struct $name(pub u64);

        impl $name {
            pub const NONE: $name = $name(0);

            #[inline]
            pub const fn is_none(self) -> bool {
                self.0 == 0
            }
        }

        impl From<u64> for $name {
            #[inline]
            fn from(value: u64) -> Self {
                $name(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

define_id!(EntityId);
define_id!(PlayerId);
define_id!(SessionId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_is_zero() {
        assert!(EntityId::NONE.is_none());
        assert!(!EntityId::from(1).is_none());
    }

    #[test]
    fn distinct_types_do_not_compare() {
        let e = EntityId::from(5);
        let p = PlayerId::from(5);
        assert_eq!(e.0, p.0);
        // e == p would not compile: distinct newtypes, as required.
    }
}
