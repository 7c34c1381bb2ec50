//! Interned string identifiers.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;

/// Interned string identifier.
///
/// A compact `u32` index into a [`StringInterner`]. Two `Name`s compare
/// equal iff the interned strings are identical.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct Name(u32);

impl Name {
    /// Pre-interned empty string.
    pub const EMPTY: Name = Name(0);

    /// Get raw u32 value.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Create from raw u32 value.
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Name(raw)
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Name({})", self.0)
    }
}

/// String interner mapping `&str` to [`Name`] and back.
///
/// Uses interior mutability so it can be shared immutably across compiler
/// stages; interning the same string twice yields the same `Name`.
pub struct StringInterner {
    inner: RefCell<Inner>,
}

struct Inner {
    map: HashMap<String, Name>,
    strings: Vec<String>,
}

impl StringInterner {
    /// Create an interner with the empty string pre-interned as `Name::EMPTY`.
    pub fn new() -> Self {
        let interner = StringInterner {
            inner: RefCell::new(Inner {
                map: HashMap::new(),
                strings: Vec::new(),
            }),
        };
        let empty = interner.intern("");
        debug_assert_eq!(empty, Name::EMPTY);
        interner
    }

    /// Intern a string, returning its `Name`.
    pub fn intern(&self, s: &str) -> Name {
        let mut inner = self.inner.borrow_mut();
        if let Some(&name) = inner.map.get(s) {
            return name;
        }
        let name = Name(inner.strings.len() as u32);
        inner.strings.push(s.to_owned());
        inner.map.insert(s.to_owned(), name);
        name
    }

    /// Resolve a `Name` back to its string.
    ///
    /// Panics if `name` was not produced by this interner.
    pub fn resolve(&self, name: Name) -> String {
        self.inner.borrow().strings[name.0 as usize].clone()
    }
}

impl Default for StringInterner {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
