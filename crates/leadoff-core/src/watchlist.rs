// Watched player names, held as a normalized set for membership tests.

use std::collections::HashSet;

use crate::names::normalize_name;

#[derive(Debug, Clone, Default)]
pub struct Watchlist {
    normalized: HashSet<String>,
    display: Vec<String>,
}

impl Watchlist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_names<I, T>(names: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let mut list = Self::new();
        for name in names {
            list.add(name.as_ref());
        }
        list
    }

    /// Add a name. Returns `false` for blanks and for names already watched.
    pub fn add(&mut self, name: &str) -> bool {
        let key = normalize_name(name);
        if key.is_empty() || !self.normalized.insert(key) {
            return false;
        }
        self.display.push(name.trim().to_string());
        true
    }

    pub fn remove(&mut self, name: &str) -> bool {
        let key = normalize_name(name);
        if !self.normalized.remove(&key) {
            return false;
        }
        self.display.retain(|n| normalize_name(n) != key);
        true
    }

    pub fn contains(&self, name: &str) -> bool {
        self.normalized.contains(&normalize_name(name))
    }

    /// Display names in insertion order.
    pub fn names(&self) -> &[String] {
        &self.display
    }

    pub fn len(&self) -> usize {
        self.display.len()
    }

    pub fn is_empty(&self) -> bool {
        self.display.is_empty()
    }
}
