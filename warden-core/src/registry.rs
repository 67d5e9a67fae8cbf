//! Process-wide namespace registry: name -> [`MultiLocker`].
//!
//! A plain struct, not a singleton — callers own an instance (typically
//! one per process, but tests instantiate isolated registries freely).

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tracing::info;

use crate::locker::MultiLocker;

/// Maps namespace names to their multi-locker instance, lazily creating
/// on first reference and coordinating drained shutdown.
#[derive(Default)]
pub struct NamespaceRegistry {
    namespaces: DashMap<String, Arc<MultiLocker>>,
}

impl NamespaceRegistry {
    pub fn new() -> Self {
        NamespaceRegistry {
            namespaces: DashMap::new(),
        }
    }

    /// Returns the namespace's multi-locker, creating it if this is the
    /// first reference. The bool is `true` when a new namespace was
    /// created by this call.
    pub fn get_or_create(&self, name: &str) -> (Arc<MultiLocker>, bool) {
        if let Some(existing) = self.namespaces.get(name) {
            return (Arc::clone(&existing), false);
        }
        let created = Arc::new(MultiLocker::new());
        match self.namespaces.entry(name.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(e) => (Arc::clone(e.get()), false),
            dashmap::mapref::entry::Entry::Vacant(e) => {
                e.insert(Arc::clone(&created));
                (created, true)
            }
        }
    }

    /// Looks up an existing namespace without creating one.
    pub fn get(&self, name: &str) -> Option<Arc<MultiLocker>> {
        self.namespaces.get(name).map(|e| Arc::clone(e.value()))
    }

    /// A snapshot of currently known namespace names.
    pub fn list(&self) -> Vec<String> {
        self.namespaces.iter().map(|e| e.key().clone()).collect()
    }

    /// Marks every namespace as draining, then polls until every one has
    /// released its last batch. New namespaces created after this call
    /// begins are not draining unless referenced through a racing
    /// `get_or_create` that observed the pre-drain map — callers should
    /// stop routing new connections before calling this.
    pub async fn close_all(&self) {
        let lockers: Vec<Arc<MultiLocker>> = self
            .namespaces
            .iter()
            .map(|e| Arc::clone(e.value()))
            .collect();

        for locker in &lockers {
            locker.set_draining();
        }
        info!(count = lockers.len(), "draining namespaces");

        for locker in &lockers {
            while !locker.is_drained() {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        }
        self.namespaces.clear();
        info!("all namespaces drained");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Claim, Mode};

    #[test]
    fn get_or_create_is_lazy_and_idempotent() {
        let registry = NamespaceRegistry::new();
        let (a, created_a) = registry.get_or_create("default");
        assert!(created_a);
        let (b, created_b) = registry.get_or_create("default");
        assert!(!created_b);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn list_reflects_created_namespaces() {
        let registry = NamespaceRegistry::new();
        registry.get_or_create("a");
        registry.get_or_create("b");
        let mut names = registry.list();
        names.sort();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn close_all_waits_for_outstanding_batches_to_release() {
        let registry = NamespaceRegistry::new();
        let (locker, _) = registry.get_or_create("default");
        let handle = locker
            .submit(vec![Claim {
                mode: Mode::Write,
                path: vec!["a".into()],
            }])
            .unwrap();

        let registry = Arc::new(registry);
        let r = Arc::clone(&registry);
        let waiter = tokio::spawn(async move {
            r.close_all().await;
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        handle.release();
        waiter.await.unwrap();
        assert!(registry.list().is_empty());
    }
}
