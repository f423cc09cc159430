//! Symbol - String interning for efficient identifier handling.
//!
//! A [`Symbol`] is a compact (4-byte) handle to a string stored in a global
//! table. Interning gives O(1) equality and hashing, and deduplicates the
//! thousands of repeated identifiers a compilation touches.
//!
//! Interned strings are allocated once and never freed (leak-on-purpose):
//! the compiler runs for a finite duration and the table is bounded by the
//! amount of distinct source text, so lifetime tracking would buy nothing.
//!
//! The table is behind a `parking_lot::RwLock`; interning from multiple
//! threads (the driver fans out across modules) is safe.
//!
//! # Examples
//!
//! ```
//! use surgec_util::Symbol;
//!
//! let s1 = Symbol::intern("hello");
//! let s2 = Symbol::intern("hello");
//! let s3 = Symbol::intern("world");
//!
//! assert_eq!(s1, s2);
//! assert_ne!(s1, s3);
//! assert_eq!(s1.as_str(), "hello");
//! ```

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::OnceLock;

/// An interned string identifier.
///
/// Exactly 4 bytes; comparison and hashing are integer operations on the
/// table index.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Symbol {
    index: u32,
}

struct Interner {
    /// Content → index. Keys borrow from the leaked string storage.
    index: FxHashMap<&'static str, u32>,
    /// Index → content.
    strings: Vec<&'static str>,
}

impl Interner {
    fn new() -> Self {
        Self {
            index: FxHashMap::default(),
            strings: Vec::new(),
        }
    }

    fn intern(&mut self, string: &str) -> u32 {
        if let Some(&idx) = self.index.get(string) {
            return idx;
        }
        let owned: &'static str = Box::leak(string.to_owned().into_boxed_str());
        let idx = u32::try_from(self.strings.len()).expect("symbol table overflow");
        self.strings.push(owned);
        self.index.insert(owned, idx);
        idx
    }
}

fn table() -> &'static RwLock<Interner> {
    static TABLE: OnceLock<RwLock<Interner>> = OnceLock::new();
    TABLE.get_or_init(|| RwLock::new(Interner::new()))
}

impl Symbol {
    /// Intern a string, returning its symbol.
    ///
    /// Read-locks first so the common already-interned case never contends
    /// with other readers.
    pub fn intern(string: &str) -> Self {
        {
            let guard = table().read();
            if let Some(&index) = guard.index.get(string) {
                return Symbol { index };
            }
        }
        let index = table().write().intern(string);
        Symbol { index }
    }

    /// Get the string value associated with this symbol.
    pub fn as_str(self) -> &'static str {
        table().read().strings[self.index as usize]
    }

    /// Get the raw index value. Useful for tie-breaking orderings.
    #[inline]
    pub fn as_u32(self) -> u32 {
        self.index
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({:?})", self.as_str())
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
