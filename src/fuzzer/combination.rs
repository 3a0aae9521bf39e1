use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// The set of target function names one harness exercises.
///
/// Names keep their emission order for display and file naming; identity is
/// the sorted, de-duplicated name set (see [`CombinationKey`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Combination {
    names: Vec<String>,
}

/// Order-insensitive identity of a [`Combination`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CombinationKey(Vec<String>);

impl Combination {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut out: Vec<String> = Vec::new();
        for name in names {
            let name = name.into();
            if !out.contains(&name) {
                out.push(name);
            }
        }
        Self { names: out }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn key(&self) -> CombinationKey {
        let mut names = self.names.clone();
        names.sort();
        CombinationKey(names)
    }
}

impl fmt::Display for Combination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.names.join(", "))
    }
}

/// Every combination attempted so far, in attempt order, plus a key index
/// for the "already tested" check.
#[derive(Debug, Default, Clone)]
pub struct TestedSet {
    order: Vec<Combination>,
    keys: HashSet<CombinationKey>,
}

impl TestedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an attempt. Returns false when the combination was already
    /// recorded.
    pub fn insert(&mut self, combination: Combination) -> bool {
        if !self.keys.insert(combination.key()) {
            return false;
        }
        self.order.push(combination);
        true
    }

    pub fn contains(&self, combination: &Combination) -> bool {
        self.keys.contains(&combination.key())
    }

    pub fn contains_key(&self, key: &CombinationKey) -> bool {
        self.keys.contains(key)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// The most recent `n` attempts, oldest first.
    pub fn recent(&self, n: usize) -> &[Combination] {
        let start = self.order.len().saturating_sub(n);
        &self.order[start..]
    }
}

impl<C: Into<Combination>> FromIterator<C> for TestedSet {
    fn from_iter<T: IntoIterator<Item = C>>(iter: T) -> Self {
        let mut set = TestedSet::new();
        for c in iter {
            set.insert(c.into());
        }
        set
    }
}

impl From<Vec<&str>> for Combination {
    fn from(names: Vec<&str>) -> Self {
        Combination::new(names)
    }
}
