//! Named coverage contexts.
//!
//! A context tags elements with the construct they came from so reports can
//! filter by it (e.g. hide coverage of static initialisers). Each registered
//! name maps to one bit of a [`ContextSet`].

use serde::{Deserialize, Serialize};

/// Maximum number of contexts a store can hold (one bit each)
pub const MAX_CONTEXTS: usize = 64;

/// Bitmask of context indices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ContextSet(u64);

impl ContextSet {
    /// The empty set
    pub const EMPTY: Self = Self(0);

    /// Wrap raw bits
    #[inline]
    #[must_use]
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    /// Raw bits
    #[inline]
    #[must_use]
    pub const fn bits(self) -> u64 {
        self.0
    }

    /// Set containing only `index`
    #[inline]
    #[must_use]
    pub const fn single(index: usize) -> Self {
        Self(1 << index)
    }

    /// This set plus `index`
    #[inline]
    #[must_use]
    pub const fn with(self, index: usize) -> Self {
        Self(self.0 | (1 << index))
    }

    /// True if `index` is in the set
    #[inline]
    #[must_use]
    pub const fn contains(self, index: usize) -> bool {
        index < MAX_CONTEXTS && self.0 & (1 << index) != 0
    }

    /// Union of both sets
    #[inline]
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// True if no context is set
    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

/// Registry-owned table of context names
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextStore {
    names: Vec<String>,
}

impl ContextStore {
    /// Static initialiser code
    pub const STATIC: usize = 0;
    /// Instance initialiser code
    pub const INSTANCE: usize = 1;
    /// Method bodies
    pub const METHOD: usize = 2;
    /// Plain statements
    pub const STATEMENT: usize = 3;
    /// Branch conditions
    pub const BRANCH: usize = 4;

    const BUILTINS: [&'static str; 5] = ["static", "instance", "method", "statement", "branch"];

    /// Store holding only the built-in contexts
    #[must_use]
    pub fn new() -> Self {
        Self {
            names: Self::BUILTINS.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    /// Index of a context, registering it if new.
    ///
    /// Returns `None` once all [`MAX_CONTEXTS`] bits are taken.
    pub fn register(&mut self, name: &str) -> Option<usize> {
        if let Some(index) = self.index_of(name) {
            return Some(index);
        }
        if self.names.len() >= MAX_CONTEXTS {
            return None;
        }
        self.names.push(name.to_string());
        Some(self.names.len() - 1)
    }

    /// Index of a registered context
    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Name of a context index
    #[must_use]
    pub fn name_of(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    /// Number of registered contexts
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Always false; built-ins are present from construction
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Names of the contexts in `set`
    #[must_use]
    pub fn describe(&self, set: ContextSet) -> Vec<&str> {
        self.names
            .iter()
            .enumerate()
            .filter(|(i, _)| set.contains(*i))
            .map(|(_, n)| n.as_str())
            .collect()
    }
}

impl Default for ContextStore {
    fn default() -> Self {
        Self::new()
    }
}
