//! Typed operand indices
//!
//! Constant-pool indices are 1-based; index 0 means "absent" (or "any" for
//! type names). Table indices for methods, classes and metadata are 0-based.

use serde::Serialize;

macro_rules! index_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        #[serde(transparent)]
        #[repr(transparent)]
        pub struct $name(pub u32);

        impl $name {
            /// Create a new index
            #[inline]
            pub const fn new(index: u32) -> Self {
                Self(index)
            }

            /// Get index value
            #[inline]
            pub const fn index(self) -> u32 {
                self.0
            }
        }

        impl From<u32> for $name {
            fn from(index: u32) -> Self {
                Self(index)
            }
        }
    };
}

macro_rules! pool_index_type {
    ($(#[$doc:meta])* $name:ident) => {
        index_type!($(#[$doc])* $name);

        impl $name {
            /// The reserved "absent" entry
            pub const NONE: Self = Self(0);

            /// Check if this refers to the reserved slot 0
            #[inline]
            pub const fn is_none(self) -> bool {
                self.0 == 0
            }
        }
    };
}

pool_index_type!(
    /// Index into the int pool
    IntIndex
);
pool_index_type!(
    /// Index into the uint pool
    UintIndex
);
pool_index_type!(
    /// Index into the double pool
    DoubleIndex
);
pool_index_type!(
    /// Index into the string pool
    StringIndex
);
pool_index_type!(
    /// Index into the namespace pool
    NamespaceIndex
);
pool_index_type!(
    /// Index into the namespace-set pool
    NsSetIndex
);
pool_index_type!(
    /// Index into the multiname pool (0 means the any type `*`)
    MultinameIndex
);

index_type!(
    /// Index into the method-info table
    MethodIndex
);
index_type!(
    /// Index into the class/instance tables
    ClassIndex
);
index_type!(
    /// Index into the metadata table
    MetadataIndex
);
index_type!(
    /// Local register number (register 0 holds the receiver)
    Register
);

/// Relative branch displacement, measured from the end of the branch instruction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct JumpOffset(pub i32);

impl JumpOffset {
    /// Placeholder written before the target is known
    pub const PLACEHOLDER: Self = Self(0);

    /// Create a new jump offset
    #[inline]
    pub const fn new(offset: i32) -> Self {
        Self(offset)
    }

    /// Get offset value
    #[inline]
    pub const fn offset(self) -> i32 {
        self.0
    }
}
