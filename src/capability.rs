//! Capability detection for collaborators that only become usable once
//! their resource has loaded.

use crate::scope::GlobalScope;
use std::sync::{Arc, OnceLock};

pub enum Capability<T: ?Sized> {
    Available(Arc<T>),
    Unavailable,
}

/// Resolves a capability by its probe name.
///
/// A successful resolution is cached for the resolver's lifetime; a miss
/// is not, so a later load can still make the capability available.
pub struct CapabilityResolver<T: ?Sized> {
    probe: String,
    provider: Arc<T>,
    resolved: OnceLock<Arc<T>>,
}

impl<T: ?Sized> CapabilityResolver<T> {
    pub fn new(probe: impl Into<String>, provider: Arc<T>) -> Self {
        Self {
            probe: probe.into(),
            provider,
            resolved: OnceLock::new(),
        }
    }

    pub fn probe(&self) -> &str {
        &self.probe
    }

    pub fn provider(&self) -> Arc<T> {
        self.provider.clone()
    }

    pub fn resolve(&self, scope: &GlobalScope) -> Capability<T> {
        if let Some(p) = self.resolved.get() {
            return Capability::Available(p.clone());
        }
        if !scope.is_defined(&self.probe) {
            return Capability::Unavailable;
        }
        log::debug!("Capability {} resolved", self.probe);
        Capability::Available(self.resolved.get_or_init(|| self.provider.clone()).clone())
    }
}
