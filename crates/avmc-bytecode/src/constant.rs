//! Constant pool with per-table deduplication
//!
//! A module carries seven independent tables. Each table hands out 1-based
//! indices in insertion order and returns the existing index when a
//! structurally equal value is interned again. Entries are never removed or
//! renumbered.

use std::fmt;
use std::hash::Hash;

use rustc_hash::FxHashMap;
use serde::{Serialize, Serializer};

use crate::operand::{
    DoubleIndex, IntIndex, MultinameIndex, NamespaceIndex, NsSetIndex, StringIndex, UintIndex,
};

/// Namespace kinds as encoded in the namespace pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum NamespaceKind {
    /// User-defined namespace
    Namespace = 0x08,
    /// Public namespace of a package
    Package = 0x16,
    /// Internal namespace of a package
    PackageInternal = 0x17,
    /// Protected namespace of a class
    Protected = 0x18,
    /// Explicitly opened namespace
    Explicit = 0x19,
    /// Static protected namespace of a class
    StaticProtected = 0x1A,
    /// Private namespace
    Private = 0x05,
}

impl NamespaceKind {
    /// Decode from the pool byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x08 => Some(Self::Namespace),
            0x16 => Some(Self::Package),
            0x17 => Some(Self::PackageInternal),
            0x18 => Some(Self::Protected),
            0x19 => Some(Self::Explicit),
            0x1A => Some(Self::StaticProtected),
            0x05 => Some(Self::Private),
            _ => None,
        }
    }

    /// Encoded byte
    #[inline]
    pub fn to_byte(self) -> u8 {
        self as u8
    }
}

/// A namespace as resolved by the front end
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    /// Namespace kind
    pub kind: NamespaceKind,
    /// Namespace URI or package name
    pub name: String,
}

impl Namespace {
    /// Create a namespace
    pub fn new(kind: NamespaceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }

    /// Public namespace of `package` (empty string for the unnamed package)
    pub fn package(package: impl Into<String>) -> Self {
        Self::new(NamespaceKind::Package, package)
    }

    /// The public namespace of the unnamed package
    pub fn public() -> Self {
        Self::package("")
    }

    /// Internal namespace of `package`
    pub fn internal(package: impl Into<String>) -> Self {
        Self::new(NamespaceKind::PackageInternal, package)
    }

    /// Private namespace named `name`
    pub fn private(name: impl Into<String>) -> Self {
        Self::new(NamespaceKind::Private, name)
    }

    /// Protected namespace named `name`
    pub fn protected(name: impl Into<String>) -> Self {
        Self::new(NamespaceKind::Protected, name)
    }
}

/// A property name as resolved by the front end
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Multiname {
    /// Name in exactly one namespace
    QName {
        /// Qualifying namespace
        ns: Namespace,
        /// Local name
        name: String,
        /// XML attribute name
        attribute: bool,
    },
    /// Name with a namespace supplied on the operand stack
    RtqName {
        /// Local name
        name: String,
        /// XML attribute name
        attribute: bool,
    },
    /// Name and namespace supplied on the operand stack
    RtqNameL {
        /// XML attribute name
        attribute: bool,
    },
    /// Name resolved against a set of candidate namespaces
    Multiname {
        /// Local name
        name: String,
        /// Candidate namespaces
        ns_set: Vec<Namespace>,
        /// XML attribute name
        attribute: bool,
    },
    /// Name supplied on the operand stack, resolved against a namespace set
    MultinameL {
        /// Candidate namespaces
        ns_set: Vec<Namespace>,
        /// XML attribute name
        attribute: bool,
    },
    /// Parameterized type such as `Vector.<int>`
    TypeName {
        /// Generic base type
        base: Box<Multiname>,
        /// Type parameters
        params: Vec<Multiname>,
    },
}

impl Multiname {
    /// Qualified name in `ns`
    pub fn qname(ns: Namespace, name: impl Into<String>) -> Self {
        Self::QName {
            ns,
            name: name.into(),
            attribute: false,
        }
    }

    /// Qualified name in the public namespace of the unnamed package
    pub fn public(name: impl Into<String>) -> Self {
        Self::qname(Namespace::public(), name)
    }

    /// Name resolved against `ns_set`
    pub fn multiname(name: impl Into<String>, ns_set: Vec<Namespace>) -> Self {
        Self::Multiname {
            name: name.into(),
            ns_set,
            attribute: false,
        }
    }

    /// Late-bound name resolved against `ns_set`
    pub fn late(ns_set: Vec<Namespace>) -> Self {
        Self::MultinameL {
            ns_set,
            attribute: false,
        }
    }
}

/// Multiname kind bytes
pub mod multiname_kind {
    /// `QName`
    pub const QNAME: u8 = 0x07;
    /// `QNameA`
    pub const QNAME_A: u8 = 0x0D;
    /// `RTQName`
    pub const RTQNAME: u8 = 0x0F;
    /// `RTQNameA`
    pub const RTQNAME_A: u8 = 0x10;
    /// `RTQNameL`
    pub const RTQNAME_L: u8 = 0x11;
    /// `RTQNameLA`
    pub const RTQNAME_LA: u8 = 0x12;
    /// `Multiname`
    pub const MULTINAME: u8 = 0x09;
    /// `MultinameA`
    pub const MULTINAME_A: u8 = 0x0E;
    /// `MultinameL`
    pub const MULTINAME_L: u8 = 0x1B;
    /// `MultinameLA`
    pub const MULTINAME_LA: u8 = 0x1C;
    /// `TypeName`
    pub const TYPENAME: u8 = 0x1D;
}

/// Namespace as stored in the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct NamespaceEntry {
    /// Namespace kind
    pub kind: NamespaceKind,
    /// Name string
    pub name: StringIndex,
}

/// Namespace set as stored in the pool
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct NsSetEntry(pub Vec<NamespaceIndex>);

/// Multiname as stored in the pool
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum MultinameEntry {
    /// `QName` / `QNameA`
    QName {
        /// Namespace
        ns: NamespaceIndex,
        /// Local name
        name: StringIndex,
        /// Attribute flag
        attribute: bool,
    },
    /// `RTQName` / `RTQNameA`
    RtqName {
        /// Local name
        name: StringIndex,
        /// Attribute flag
        attribute: bool,
    },
    /// `RTQNameL` / `RTQNameLA`
    RtqNameL {
        /// Attribute flag
        attribute: bool,
    },
    /// `Multiname` / `MultinameA`
    Multiname {
        /// Local name
        name: StringIndex,
        /// Candidate namespaces
        ns_set: NsSetIndex,
        /// Attribute flag
        attribute: bool,
    },
    /// `MultinameL` / `MultinameLA`
    MultinameL {
        /// Candidate namespaces
        ns_set: NsSetIndex,
        /// Attribute flag
        attribute: bool,
    },
    /// `TypeName`
    TypeName {
        /// Generic base
        base: MultinameIndex,
        /// Parameters
        params: Vec<MultinameIndex>,
    },
}

impl MultinameEntry {
    /// Kind byte written ahead of the entry
    pub fn kind_byte(&self) -> u8 {
        use multiname_kind::*;
        match self {
            Self::QName { attribute, .. } => pick(*attribute, QNAME_A, QNAME),
            Self::RtqName { attribute, .. } => pick(*attribute, RTQNAME_A, RTQNAME),
            Self::RtqNameL { attribute } => pick(*attribute, RTQNAME_LA, RTQNAME_L),
            Self::Multiname { attribute, .. } => pick(*attribute, MULTINAME_A, MULTINAME),
            Self::MultinameL { attribute, .. } => pick(*attribute, MULTINAME_LA, MULTINAME_L),
            Self::TypeName { .. } => TYPENAME,
        }
    }

    /// Number of operand-stack values an instruction consumes to complete this name
    pub fn runtime_arity(&self) -> u32 {
        match self {
            Self::RtqName { .. } | Self::MultinameL { .. } => 1,
            Self::RtqNameL { .. } => 2,
            _ => 0,
        }
    }

    /// Whether part of the name is only known at run time
    pub fn is_runtime(&self) -> bool {
        self.runtime_arity() > 0
    }
}

#[inline]
fn pick(attribute: bool, with: u8, without: u8) -> u8 {
    if attribute { with } else { without }
}

/// Bit pattern of a double, so equal encodings deduplicate (NaN included)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DoubleBits(pub u64);

impl DoubleBits {
    /// Wrap a double
    #[inline]
    pub fn new(value: f64) -> Self {
        Self(value.to_bits())
    }

    /// Get the double back
    #[inline]
    pub fn value(self) -> f64 {
        f64::from_bits(self.0)
    }
}

impl Serialize for DoubleBits {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.value())
    }
}

/// One deduplicating pool table
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct PoolTable<T: Eq + Hash> {
    values: Vec<T>,
    #[serde(skip)]
    lookup: FxHashMap<T, u32>,
}

impl<T: Eq + Hash> Default for PoolTable<T> {
    fn default() -> Self {
        Self {
            values: Vec::new(),
            lookup: FxHashMap::default(),
        }
    }
}

impl<T: Eq + Hash + Clone> PoolTable<T> {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern `value`, returning its 1-based index
    pub fn intern(&mut self, value: T) -> u32 {
        if let Some(&position) = self.lookup.get(&value) {
            return position + 1;
        }
        let position = self.values.len() as u32;
        self.lookup.insert(value.clone(), position);
        self.values.push(value);
        position + 1
    }

    /// Append without deduplication, keeping the first index for lookups
    ///
    /// Used when reading a module whose pools may already contain duplicates.
    pub fn push(&mut self, value: T) -> u32 {
        let position = self.values.len() as u32;
        self.lookup.entry(value.clone()).or_insert(position);
        self.values.push(value);
        position + 1
    }

    /// Look up an existing value without inserting it
    pub fn find(&self, value: &T) -> Option<u32> {
        self.lookup.get(value).map(|p| p + 1)
    }

    /// Entry at a 1-based index
    #[inline]
    pub fn get(&self, index: u32) -> Option<&T> {
        index.checked_sub(1).and_then(|i| self.values.get(i as usize))
    }

    /// Number of real entries (slot 0 excluded)
    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if the table has no entries
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate entries in index order (index 1 first)
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.values.iter()
    }

    /// Count as declared in the container: `len + 1`, or 0 when empty
    pub fn declared_count(&self) -> usize {
        if self.values.is_empty() {
            0
        } else {
            self.values.len() + 1
        }
    }
}

impl PoolTable<String> {
    /// Intern a string slice without allocating on a hit
    pub fn intern_str(&mut self, value: &str) -> u32 {
        if let Some(&position) = self.lookup.get(value) {
            return position + 1;
        }
        self.intern(value.to_owned())
    }
}

/// The seven constant tables of a module
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConstantPool {
    /// Signed integers
    pub ints: PoolTable<i32>,
    /// Unsigned integers
    pub uints: PoolTable<u32>,
    /// Doubles
    pub doubles: PoolTable<DoubleBits>,
    /// UTF-8 strings
    pub strings: PoolTable<String>,
    /// Namespaces
    pub namespaces: PoolTable<NamespaceEntry>,
    /// Namespace sets
    pub ns_sets: PoolTable<NsSetEntry>,
    /// Multinames
    pub multinames: PoolTable<MultinameEntry>,
}

impl ConstantPool {
    /// Create an empty pool
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a signed integer
    pub fn int(&mut self, value: i32) -> IntIndex {
        IntIndex(self.ints.intern(value))
    }

    /// Intern an unsigned integer
    pub fn uint(&mut self, value: u32) -> UintIndex {
        UintIndex(self.uints.intern(value))
    }

    /// Intern a double
    pub fn double(&mut self, value: f64) -> DoubleIndex {
        DoubleIndex(self.doubles.intern(DoubleBits::new(value)))
    }

    /// Intern a string
    pub fn string(&mut self, value: &str) -> StringIndex {
        StringIndex(self.strings.intern_str(value))
    }

    /// Intern a namespace and its name
    pub fn namespace(&mut self, ns: &Namespace) -> NamespaceIndex {
        let name = self.string(&ns.name);
        NamespaceIndex(self.namespaces.intern(NamespaceEntry {
            kind: ns.kind,
            name,
        }))
    }

    /// Intern a namespace set (order is significant)
    pub fn ns_set(&mut self, set: &[Namespace]) -> NsSetIndex {
        let members = set.iter().map(|ns| self.namespace(ns)).collect();
        NsSetIndex(self.ns_sets.intern(NsSetEntry(members)))
    }

    /// Intern a multiname and everything it references
    pub fn multiname(&mut self, name: &Multiname) -> MultinameIndex {
        let entry = match name {
            Multiname::QName {
                ns,
                name,
                attribute,
            } => MultinameEntry::QName {
                ns: self.namespace(ns),
                name: self.string(name),
                attribute: *attribute,
            },
            Multiname::RtqName { name, attribute } => MultinameEntry::RtqName {
                name: self.string(name),
                attribute: *attribute,
            },
            Multiname::RtqNameL { attribute } => MultinameEntry::RtqNameL {
                attribute: *attribute,
            },
            Multiname::Multiname {
                name,
                ns_set,
                attribute,
            } => MultinameEntry::Multiname {
                name: self.string(name),
                ns_set: self.ns_set(ns_set),
                attribute: *attribute,
            },
            Multiname::MultinameL { ns_set, attribute } => MultinameEntry::MultinameL {
                ns_set: self.ns_set(ns_set),
                attribute: *attribute,
            },
            Multiname::TypeName { base, params } => {
                let base = self.multiname(base);
                let params = params.iter().map(|p| self.multiname(p)).collect();
                MultinameEntry::TypeName { base, params }
            }
        };
        MultinameIndex(self.multinames.intern(entry))
    }

    /// Intern `name` qualified by `ns`
    pub fn qname(&mut self, ns: &Namespace, name: &str) -> MultinameIndex {
        let entry = MultinameEntry::QName {
            ns: self.namespace(ns),
            name: self.string(name),
            attribute: false,
        };
        MultinameIndex(self.multinames.intern(entry))
    }

    /// Get an int by index
    pub fn get_int(&self, index: IntIndex) -> Option<i32> {
        self.ints.get(index.0).copied()
    }

    /// Get a uint by index
    pub fn get_uint(&self, index: UintIndex) -> Option<u32> {
        self.uints.get(index.0).copied()
    }

    /// Get a double by index
    pub fn get_double(&self, index: DoubleIndex) -> Option<f64> {
        self.doubles.get(index.0).map(|d| d.value())
    }

    /// Get a string by index
    pub fn get_string(&self, index: StringIndex) -> Option<&str> {
        self.strings.get(index.0).map(String::as_str)
    }

    /// Get a namespace entry by index
    pub fn get_namespace(&self, index: NamespaceIndex) -> Option<&NamespaceEntry> {
        self.namespaces.get(index.0)
    }

    /// Get a multiname entry by index
    pub fn get_multiname(&self, index: MultinameIndex) -> Option<&MultinameEntry> {
        self.multinames.get(index.0)
    }

    /// Stack values consumed to complete the multiname at `index` (0 for unknown)
    pub fn runtime_arity(&self, index: MultinameIndex) -> u32 {
        self.get_multiname(index)
            .map(MultinameEntry::runtime_arity)
            .unwrap_or(0)
    }

    /// Local-name string of the multiname at `index`, if it has one
    pub fn multiname_local_name(&self, index: MultinameIndex) -> Option<&str> {
        match self.get_multiname(index)? {
            MultinameEntry::QName { name, .. }
            | MultinameEntry::RtqName { name, .. }
            | MultinameEntry::Multiname { name, .. } => self.get_string(*name),
            MultinameEntry::TypeName { base, .. } => self.multiname_local_name(*base),
            _ => None,
        }
    }

    /// Render a multiname for listings
    pub fn display_multiname(&self, index: MultinameIndex) -> String {
        if index.is_none() {
            return "*".to_string();
        }
        match self.get_multiname(index) {
            Some(entry) => MultinameDisplay { pool: self, entry }.to_string(),
            None => format!("<bad multiname #{}>", index.0),
        }
    }

    fn display_namespace(&self, index: NamespaceIndex) -> String {
        match self.get_namespace(index) {
            Some(ns) => {
                let name = self.get_string(ns.name).unwrap_or("");
                match ns.kind {
                    NamespaceKind::Package if name.is_empty() => "public".to_string(),
                    NamespaceKind::Package => name.to_string(),
                    NamespaceKind::PackageInternal => format!("internal({name})"),
                    NamespaceKind::Private => format!("private({name})"),
                    NamespaceKind::Protected => format!("protected({name})"),
                    NamespaceKind::StaticProtected => format!("static protected({name})"),
                    NamespaceKind::Explicit => format!("explicit({name})"),
                    NamespaceKind::Namespace => format!("namespace({name})"),
                }
            }
            None => "*".to_string(),
        }
    }
}

struct MultinameDisplay<'a> {
    pool: &'a ConstantPool,
    entry: &'a MultinameEntry,
}

impl fmt::Display for MultinameDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pool = self.pool;
        let string = |i: StringIndex| pool.get_string(i).unwrap_or("");
        let set = |i: NsSetIndex| -> String {
            pool.ns_sets
                .get(i.0)
                .map(|s| {
                    s.0.iter()
                        .map(|ns| pool.display_namespace(*ns))
                        .collect::<Vec<_>>()
                        .join(",")
                })
                .unwrap_or_default()
        };
        match self.entry {
            MultinameEntry::QName { ns, name, attribute } => {
                let at = if *attribute { "@" } else { "" };
                write!(f, "{}::{at}{}", pool.display_namespace(*ns), string(*name))
            }
            MultinameEntry::RtqName { name, .. } => write!(f, "[rt]::{}", string(*name)),
            MultinameEntry::RtqNameL { .. } => write!(f, "[rt]::[rt]"),
            MultinameEntry::Multiname { name, ns_set, .. } => {
                write!(f, "{{{}}}::{}", set(*ns_set), string(*name))
            }
            MultinameEntry::MultinameL { ns_set, .. } => write!(f, "{{{}}}::[rt]", set(*ns_set)),
            MultinameEntry::TypeName { base, params } => {
                let params = params
                    .iter()
                    .map(|p| pool.display_multiname(*p))
                    .collect::<Vec<_>>()
                    .join(",");
                write!(f, "{}.<{params}>", pool.display_multiname(*base))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    #[test]
    fn test_string_dedup() {
        let mut pool = ConstantPool::new();

        let idx1 = pool.string("hello");
        let idx2 = pool.string("world");
        let idx3 = pool.string("hello");

        assert_eq!(idx1, StringIndex(1));
        assert_eq!(idx2, StringIndex(2));
        assert_eq!(idx3, idx1);
        assert_eq!(pool.strings.len(), 2);
        assert_eq!(pool.strings.declared_count(), 3);
    }

    #[test]
    fn test_tables_are_independent() {
        let mut pool = ConstantPool::new();
        assert_eq!(pool.int(7), IntIndex(1));
        assert_eq!(pool.uint(7), UintIndex(1));
        assert_eq!(pool.double(7.0), DoubleIndex(1));
        assert_eq!(pool.string("7"), StringIndex(1));
    }

    #[test]
    fn test_double_dedup_by_bits() {
        let mut pool = ConstantPool::new();
        let nan1 = pool.double(f64::NAN);
        let nan2 = pool.double(f64::NAN);
        let zero = pool.double(0.0);
        let neg_zero = pool.double(-0.0);
        assert_eq!(nan1, nan2);
        assert_ne!(zero, neg_zero);
    }

    #[test]
    fn test_multiname_interns_parts() {
        let mut pool = ConstantPool::new();
        let a = pool.multiname(&Multiname::multiname(
            "x",
            vec![Namespace::public(), Namespace::internal("pkg")],
        ));
        let b = pool.multiname(&Multiname::multiname(
            "x",
            vec![Namespace::public(), Namespace::internal("pkg")],
        ));
        assert_eq!(a, b);
        assert_eq!(pool.ns_sets.len(), 1);
        assert_eq!(pool.namespaces.len(), 2);
        // "x", "", "pkg"
        assert_eq!(pool.strings.len(), 3);
    }

    #[test]
    fn test_runtime_arity() {
        let mut pool = ConstantPool::new();
        let static_name = pool.multiname(&Multiname::public("a"));
        let late = pool.multiname(&Multiname::late(vec![Namespace::public()]));
        let rtql = pool.multiname(&Multiname::RtqNameL { attribute: false });
        assert_eq!(pool.runtime_arity(static_name), 0);
        assert_eq!(pool.runtime_arity(late), 1);
        assert_eq!(pool.runtime_arity(rtql), 2);
    }

    #[test]
    fn test_display_multiname() {
        let mut pool = ConstantPool::new();
        let idx = pool.qname(&Namespace::package("flash.display"), "Sprite");
        assert_eq!(pool.display_multiname(idx), "flash.display::Sprite");
        assert_eq!(pool.display_multiname(MultinameIndex::NONE), "*");
    }

    #[test]
    fn test_empty_table_declares_zero() {
        let pool = ConstantPool::new();
        assert_eq!(pool.ints.declared_count(), 0);
        assert_eq!(pool.ints.get(0), None);
    }

    proptest! {
        #[test]
        fn prop_string_interning_is_idempotent(
            values in proptest::collection::vec("[a-c]{0,3}", 0..40),
        ) {
            let mut pool = ConstantPool::new();
            let first: Vec<_> = values.iter().map(|v| pool.string(v)).collect();
            let second: Vec<_> = values.iter().map(|v| pool.string(v)).collect();
            prop_assert_eq!(&first, &second);

            let distinct: HashSet<&String> = values.iter().collect();
            prop_assert_eq!(pool.strings.len(), distinct.len());

            // new entries appear as 1, 2, 3, ... in first-seen order
            let mut next = 1;
            for index in &first {
                prop_assert!(index.0 <= next);
                if index.0 == next {
                    next += 1;
                }
            }
        }

        #[test]
        fn prop_int_pool_distinct_values(values in proptest::collection::hash_set(any::<i32>(), 0..30)) {
            let mut pool = ConstantPool::new();
            let indices: Vec<u32> = values.iter().map(|v| pool.int(*v).0).collect();
            let expected: Vec<u32> = (1..=values.len() as u32).collect();
            prop_assert_eq!(indices, expected);
        }
    }
}
