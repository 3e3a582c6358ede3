//! The global execution scope shared by a page session.
//!
//! Loaded resources announce the capabilities they provide by defining a
//! probe name here. A host page can also pre-define names for capabilities
//! it already bundles, in which case the loader never fetches them.

use std::collections::HashSet;
use std::sync::RwLock;

#[derive(Debug, Default)]
pub struct GlobalScope {
    names: RwLock<HashSet<String>>,
}

impl GlobalScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scope with the given names already defined.
    pub fn with_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let scope = Self::new();
        for name in names {
            scope.define(name);
        }
        scope
    }

    pub fn define(&self, name: impl Into<String>) {
        let mut g = self.names.write().unwrap_or_else(|e| e.into_inner());
        g.insert(name.into());
    }

    pub fn is_defined(&self, name: &str) -> bool {
        let g = self.names.read().unwrap_or_else(|e| e.into_inner());
        g.contains(name)
    }
}
