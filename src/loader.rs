//! Lazy, de-duplicating loader for external resources.
//!
//! The loader owns the table that decides whether a resource has been
//! loaded. Each identifier is fetched at most once at a time: callers that
//! arrive while a fetch is in flight await the same shared future. Failures
//! are recorded but never cached, so the next `ensure` retries.
//!
//! Fetches are driven by spawned tasks, so `ensure` must be called from
//! within a tokio runtime. A caller that stops awaiting (or an aggregate
//! that fails fast) never cancels the underlying fetch.

use crate::error::DependencyLoadError;
use crate::fetch::ResourceFetcher;
use crate::scope::GlobalScope;
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

type LoadFuture = Shared<BoxFuture<'static, Result<(), DependencyLoadError>>>;

/// An external resource the page depends on
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    /// URL (or logical name resolved by the fetcher)
    pub identifier: String,
    /// Name defined in the global scope once the resource is usable. If it
    /// is already defined the resource is never fetched.
    #[serde(default)]
    pub probe: Option<String>,
}

impl ResourceDescriptor {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            probe: None,
        }
    }

    pub fn with_probe(identifier: impl Into<String>, probe: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            probe: Some(probe.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Unloaded,
    Loading,
    Loaded,
    Failed,
}

enum Slot {
    Loading(LoadFuture),
    Loaded,
    Failed,
}

struct LoaderInner {
    table: Mutex<HashMap<String, Slot>>,
    fetcher: Arc<dyn ResourceFetcher>,
    scope: Arc<GlobalScope>,
}

impl LoaderInner {
    fn table(&self) -> std::sync::MutexGuard<'_, HashMap<String, Slot>> {
        self.table.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn load(self: Arc<Self>, desc: ResourceDescriptor) -> Result<(), DependencyLoadError> {
        let res = self.fetcher.fetch(&desc.identifier).await;

        let mut table = self.table();
        match res {
            Ok(body) => {
                if let Some(probe) = &desc.probe {
                    self.scope.define(probe.clone());
                }
                table.insert(desc.identifier.clone(), Slot::Loaded);
                log::info!("Loaded {} ({} bytes)", desc.identifier, body.len());
                Ok(())
            }
            Err(e) => {
                table.insert(desc.identifier.clone(), Slot::Failed);
                log::warn!("Loading {} failed: {}", desc.identifier, e);
                Err(DependencyLoadError {
                    identifier: desc.identifier,
                    cause: e.to_string(),
                })
            }
        }
    }
}

/// Process-wide (per page session) resource cache. Entries are never evicted.
#[derive(Clone)]
pub struct ResourceLoader {
    inner: Arc<LoaderInner>,
}

impl ResourceLoader {
    pub fn new(fetcher: Arc<dyn ResourceFetcher>, scope: Arc<GlobalScope>) -> Self {
        Self {
            inner: Arc::new(LoaderInner {
                table: Mutex::new(HashMap::new()),
                fetcher,
                scope,
            }),
        }
    }

    pub fn scope(&self) -> &Arc<GlobalScope> {
        &self.inner.scope
    }

    pub fn state(&self, identifier: &str) -> LoadState {
        match self.inner.table().get(identifier) {
            None => LoadState::Unloaded,
            Some(Slot::Loading(_)) => LoadState::Loading,
            Some(Slot::Loaded) => LoadState::Loaded,
            Some(Slot::Failed) => LoadState::Failed,
        }
    }

    /// Resolve once every descriptor is loaded.
    ///
    /// Fails with the first failure to complete; loads of the remaining
    /// descriptors keep running and populate the table for later calls.
    pub async fn ensure(&self, descriptors: &[ResourceDescriptor]) -> Result<(), DependencyLoadError> {
        let pending: Vec<LoadFuture> = descriptors.iter().filter_map(|d| self.begin(d)).collect();
        if pending.is_empty() {
            return Ok(());
        }
        futures::future::try_join_all(pending).await.map(|_| ())
    }

    /// Returns the in-flight load for `desc`, starting one if needed, or
    /// `None` when it is already usable.
    fn begin(&self, desc: &ResourceDescriptor) -> Option<LoadFuture> {
        let mut table = self.inner.table();
        match table.get(&desc.identifier) {
            Some(Slot::Loaded) => return None,
            Some(Slot::Loading(fut)) => {
                log::debug!("Joining in-flight load of {}", desc.identifier);
                return Some(fut.clone());
            }
            Some(Slot::Failed) => log::debug!("Retrying {}", desc.identifier),
            None => {}
        }

        if let Some(probe) = &desc.probe {
            if self.inner.scope.is_defined(probe) {
                log::debug!("{} already provided by the host as {}", desc.identifier, probe);
                table.insert(desc.identifier.clone(), Slot::Loaded);
                return None;
            }
        }

        let identifier = desc.identifier.clone();
        let task = tokio::spawn(self.inner.clone().load(desc.clone()));
        let fut: LoadFuture = async move {
            match task.await {
                Ok(res) => res,
                Err(join) => Err(DependencyLoadError {
                    identifier,
                    cause: join.to_string(),
                }),
            }
        }
        .boxed()
        .shared();

        table.insert(desc.identifier.clone(), Slot::Loading(fut.clone()));
        Some(fut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Error, Result};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Semaphore;

    /// Counts fetches; each fetch waits for a permit, and the first
    /// `fail_first` fetches fail.
    struct SpyFetcher {
        calls: AtomicUsize,
        gate: Option<Semaphore>,
        fail_first: usize,
    }

    impl SpyFetcher {
        fn open() -> Self {
            Self { calls: AtomicUsize::new(0), gate: None, fail_first: 0 }
        }

        fn gated() -> Self {
            Self { calls: AtomicUsize::new(0), gate: Some(Semaphore::new(0)), fail_first: 0 }
        }

        fn failing(n: usize) -> Self {
            Self { calls: AtomicUsize::new(0), gate: None, fail_first: n }
        }

        fn release(&self) {
            if let Some(g) = &self.gate {
                g.add_permits(1);
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ResourceFetcher for SpyFetcher {
        async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(g) = &self.gate {
                let permit = g.acquire().await.map_err(|e| Error::Fetch(e.to_string()))?;
                permit.forget();
            }
            if url.contains("broken") || n < self.fail_first {
                return Err(Error::Fetch(format!("{} unreachable", url)));
            }
            Ok(b"ok".to_vec())
        }
    }

    fn loader(fetcher: Arc<SpyFetcher>) -> ResourceLoader {
        ResourceLoader::new(fetcher, Arc::new(GlobalScope::new()))
    }

    #[tokio::test]
    async fn concurrent_ensure_shares_one_fetch() {
        let spy = Arc::new(SpyFetcher::gated());
        let loader = loader(spy.clone());
        let d = ResourceDescriptor::with_probe("https://cdn.example/marked.js", "marked");

        let first = loader.ensure(std::slice::from_ref(&d));
        let second = loader.ensure(std::slice::from_ref(&d));
        let release = async {
            tokio::task::yield_now().await;
            assert_eq!(loader.state(&d.identifier), LoadState::Loading);
            spy.release();
        };
        let (a, b, _) = tokio::join!(first, second, release);

        assert!(a.is_ok());
        assert!(b.is_ok());
        assert_eq!(spy.calls(), 1);
        assert_eq!(loader.state(&d.identifier), LoadState::Loaded);
        assert!(loader.scope().is_defined("marked"));
    }

    #[tokio::test]
    async fn probe_already_defined_skips_fetch() {
        let spy = Arc::new(SpyFetcher::open());
        let scope = Arc::new(GlobalScope::with_names(["DOMPurify"]));
        let loader = ResourceLoader::new(spy.clone(), scope);
        let d = ResourceDescriptor::with_probe("https://cdn.example/purify.js", "DOMPurify");

        loader.ensure(&[d.clone()]).await.unwrap();
        assert_eq!(spy.calls(), 0);
        assert_eq!(loader.state(&d.identifier), LoadState::Loaded);
    }

    #[tokio::test]
    async fn loaded_resource_is_not_fetched_again() {
        let spy = Arc::new(SpyFetcher::open());
        let loader = loader(spy.clone());
        let d = ResourceDescriptor::new("https://cdn.example/writer.js");

        loader.ensure(&[d.clone()]).await.unwrap();
        loader.ensure(&[d.clone()]).await.unwrap();
        assert_eq!(spy.calls(), 1);
    }

    #[tokio::test]
    async fn failure_is_not_cached() {
        let spy = Arc::new(SpyFetcher::failing(1));
        let loader = loader(spy.clone());
        let d = ResourceDescriptor::with_probe("https://cdn.example/marked.js", "marked");

        let err = loader.ensure(&[d.clone()]).await.unwrap_err();
        assert_eq!(err.identifier, d.identifier);
        assert!(err.cause.contains("unreachable"));
        assert_eq!(loader.state(&d.identifier), LoadState::Failed);
        assert!(!loader.scope().is_defined("marked"));

        loader.ensure(&[d.clone()]).await.unwrap();
        assert_eq!(spy.calls(), 2);
        assert_eq!(loader.state(&d.identifier), LoadState::Loaded);
    }

    #[tokio::test]
    async fn aggregate_fails_fast_without_cancelling_siblings() {
        let spy = Arc::new(SpyFetcher::gated());
        let loader = loader(spy.clone());
        let broken = ResourceDescriptor::new("https://cdn.example/broken.js");
        let slow = ResourceDescriptor::new("https://cdn.example/slow.js");

        // One permit lets exactly one fetch through; the other stays parked.
        spy.release();
        let err = loader.ensure(&[broken.clone(), slow.clone()]).await.unwrap_err();
        assert_eq!(err.identifier, broken.identifier);
        assert_eq!(loader.state(&slow.identifier), LoadState::Loading);

        spy.release();
        loader.ensure(&[slow.clone()]).await.unwrap();
        assert_eq!(loader.state(&slow.identifier), LoadState::Loaded);
        assert_eq!(spy.calls(), 2);
    }
}
