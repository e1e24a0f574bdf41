/// Declares a set of flags mirroring an `ash` flags type, keeping only the bits it names.
macro_rules! vulkan_bitflags {
    {
        $(#[doc = $ty_doc:literal])*
        $ty:ident = $ty_ffi:ident($repr:ty);

        $(
            $(#[doc = $flag_doc:literal])*
            $flag_name:ident = $flag_name_ffi:ident,
        )+
    } => {
        $(#[doc = $ty_doc])*
        #[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
        pub struct $ty($repr);

        impl $ty {
            $(
                $(#[doc = $flag_doc])*
                pub const $flag_name: Self = Self(ash::vk::$ty_ffi::$flag_name_ffi.as_raw());
            )+

            const KNOWN_BITS: $repr = 0 $(| ash::vk::$ty_ffi::$flag_name_ffi.as_raw())+;

            /// Returns the set with no flags.
            #[inline]
            pub const fn empty() -> Self {
                Self(0)
            }

            /// Returns the set with every flag this type knows about.
            #[inline]
            pub const fn all() -> Self {
                Self(Self::KNOWN_BITS)
            }

            /// Returns how many flags are set.
            #[inline]
            pub const fn count(self) -> u32 {
                self.0.count_ones()
            }

            #[inline]
            pub const fn is_empty(self) -> bool {
                self.0 == 0
            }

            /// Returns whether `self` and `other` share at least one flag.
            #[inline]
            pub const fn intersects(self, other: Self) -> bool {
                self.0 & other.0 != 0
            }

            /// Returns whether every flag of `other` is also in `self`.
            #[inline]
            pub const fn contains(self, other: Self) -> bool {
                self.0 & other.0 == other.0
            }

            #[inline]
            pub const fn union(self, other: Self) -> Self {
                Self(self.0 | other.0)
            }

            #[inline]
            pub const fn intersection(self, other: Self) -> Self {
                Self(self.0 & other.0)
            }
        }

        impl std::fmt::Debug for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                let names = [$((stringify!($flag_name), Self::$flag_name)),+];
                let mut set = names
                    .iter()
                    .filter(|&&(_, flag)| self.intersects(flag))
                    .map(|&(name, _)| name)
                    .peekable();

                if set.peek().is_none() {
                    return f.write_str("empty()");
                }

                for (index, name) in set.enumerate() {
                    if index != 0 {
                        f.write_str(" | ")?;
                    }

                    f.write_str(name)?;
                }

                Ok(())
            }
        }

        impl From<$ty> for ash::vk::$ty_ffi {
            #[inline]
            fn from(val: $ty) -> Self {
                Self::from_raw(val.0)
            }
        }

        impl From<ash::vk::$ty_ffi> for $ty {
            #[inline]
            fn from(val: ash::vk::$ty_ffi) -> Self {
                Self(val.as_raw() & Self::KNOWN_BITS)
            }
        }

        impl std::ops::BitOr for $ty {
            type Output = Self;

            #[inline]
            fn bitor(self, rhs: Self) -> Self {
                self.union(rhs)
            }
        }

        impl std::ops::BitOrAssign for $ty {
            #[inline]
            fn bitor_assign(&mut self, rhs: Self) {
                self.0 |= rhs.0;
            }
        }

        impl std::ops::BitAnd for $ty {
            type Output = Self;

            #[inline]
            fn bitand(self, rhs: Self) -> Self {
                self.intersection(rhs)
            }
        }
    };
}

/// Declares a fieldless enum whose discriminants are the values of an `ash` enum type.
macro_rules! vulkan_enum {
    {
        $(#[doc = $ty_doc:literal])*
        $ty:ident = $ty_ffi:ident($repr:ty);

        $(
            $(#[doc = $variant_doc:literal])*
            $variant:ident = $variant_ffi:ident,
        )+
    } => {
        $(#[doc = $ty_doc])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        #[repr($repr)]
        pub enum $ty {
            $(
                $(#[doc = $variant_doc])*
                $variant = ash::vk::$ty_ffi::$variant_ffi.as_raw(),
            )+
        }

        impl $ty {
            #[allow(dead_code)]
            pub(crate) const COUNT: usize = [$(stringify!($variant)),+].len();
        }

        impl From<$ty> for ash::vk::$ty_ffi {
            #[inline]
            fn from(val: $ty) -> Self {
                Self::from_raw(val as $repr)
            }
        }
    };
}

/// Gives an object a process-unique id, and makes equality and hashing go through it.
macro_rules! impl_id_counter {
    ($type:ident) => {
        impl $type {
            fn next_id() -> std::num::NonZeroU64 {
                use std::sync::atomic::{AtomicU64, Ordering};

                static NEXT: AtomicU64 = AtomicU64::new(1);

                match std::num::NonZeroU64::new(NEXT.fetch_add(1, Ordering::Relaxed)) {
                    Some(id) => id,
                    None => std::process::abort(),
                }
            }

            /// Returns the process-unique id of the object.
            #[inline]
            pub fn id(&self) -> std::num::NonZeroU64 {
                self.id
            }
        }

        impl PartialEq for $type {
            #[inline]
            fn eq(&self, other: &Self) -> bool {
                self.id == other.id
            }
        }

        impl Eq for $type {}

        impl std::hash::Hash for $type {
            #[inline]
            fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
                self.id.hash(state);
            }
        }
    };
}

pub(crate) use impl_id_counter;
pub(crate) use vulkan_bitflags;
pub(crate) use vulkan_enum;
