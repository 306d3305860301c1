//! Node identifiers and the shared id counter.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

/// Unique identifier for a launch, browser tab or server
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct NodeId(u64);

impl NodeId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Monotonic id source shared by every node created through one registry.
///
/// Cloning shares the underlying counter.
#[derive(Debug, Clone)]
pub struct IdIssuer {
    next: Arc<AtomicU64>,
}

impl Default for IdIssuer {
    fn default() -> Self {
        Self::new()
    }
}

impl IdIssuer {
    pub fn new() -> Self {
        Self {
            next: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Issue the next id
    pub fn next_id(&self) -> NodeId {
        NodeId(self.next.fetch_add(1, Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_monotonic() {
        let ids = IdIssuer::new();
        let a = ids.next_id();
        let b = ids.next_id();
        let c = ids.next_id();
        assert!(a < b && b < c);
    }

    #[test]
    fn test_clones_share_counter() {
        let ids = IdIssuer::new();
        let other = ids.clone();
        let a = ids.next_id();
        let b = other.next_id();
        assert_ne!(a, b);
        assert_eq!(b.get(), a.get() + 1);
    }

    #[test]
    fn test_concurrent_issuance_is_unique() {
        let ids = IdIssuer::new();
        let mut all: Vec<NodeId> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let ids = ids.clone();
                    scope.spawn(move || (0..250).map(|_| ids.next_id()).collect::<Vec<_>>())
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|h| h.join().unwrap())
                .collect()
        });
        all.sort();
        all.dedup();
        assert_eq!(all.len(), 1000);
    }
}
