use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use arc_swap::ArcSwap;

use crate::upstream::target::{Target, TargetSnapshot};

/// Which list a target belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolKind {
    Primary,
    Failover,
}

impl PoolKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Failover => "failover",
        }
    }
}

/// Ordered set of targets with an independent round-robin cursor.
///
/// The list lives behind an `ArcSwap` so selection never blocks on a refresh. Each
/// add or remove is its own read-copy-update; a concurrent reader may see a list with
/// some of a refresh applied.
pub struct TargetPool {
    kind: PoolKind,
    targets: ArcSwap<Vec<Arc<Target>>>,
    cursor: AtomicUsize,
}

impl TargetPool {
    #[must_use]
    pub fn new(kind: PoolKind) -> Self {
        Self { kind, targets: ArcSwap::from_pointee(Vec::new()), cursor: AtomicUsize::new(0) }
    }

    #[must_use]
    pub fn kind(&self) -> PoolKind {
        self.kind
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.targets.load().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.targets.load().is_empty()
    }

    /// Current list. Cheap: clones one `Arc`.
    #[must_use]
    pub fn targets(&self) -> Arc<Vec<Arc<Target>>> {
        self.targets.load_full()
    }

    #[must_use]
    pub fn find(&self, url: &str) -> Option<Arc<Target>> {
        self.targets.load().iter().find(|t| t.url() == url).cloned()
    }

    /// Appends a target unless one with the same URL already exists.
    pub fn add(&self, target: Arc<Target>) {
        self.targets.rcu(|current| {
            let mut next = (**current).clone();
            if !next.iter().any(|t| t.url() == target.url()) {
                next.push(Arc::clone(&target));
            }
            next
        });
    }

    /// Removes the target with this URL. Returns `true` if one was present.
    pub fn remove(&self, url: &str) -> bool {
        let previous = self.targets.rcu(|current| {
            current.iter().filter(|t| t.url() != url).cloned().collect::<Vec<_>>()
        });
        previous.iter().any(|t| t.url() == url)
    }

    /// Walks the list once from the shared cursor and returns the first target that is
    /// available and passes `eligible`.
    ///
    /// The cursor advances by one per call, so over a static list of size K where every
    /// target is available, K calls return each target exactly once.
    pub fn next_available<F>(&self, eligible: F) -> Option<Arc<Target>>
    where
        F: Fn(&Target) -> bool,
    {
        let targets = self.targets.load();
        if targets.is_empty() {
            return None;
        }

        let count = targets.len();
        let start = self.cursor.fetch_add(1, Ordering::Relaxed) % count;

        for offset in 0..count {
            let target = &targets[(start + offset) % count];
            if target.is_available() && eligible(target) {
                tracing::trace!(
                    pool = self.kind.as_str(),
                    target_url = %target.url(),
                    offset = offset,
                    "target selected"
                );
                return Some(Arc::clone(target));
            }
        }

        None
    }

    /// Number of targets available right now.
    #[must_use]
    pub fn available_count(&self) -> usize {
        self.targets.load().iter().filter(|t| t.is_available()).count()
    }

    #[must_use]
    pub fn snapshots(&self) -> Vec<TargetSnapshot> {
        self.targets.load().iter().map(|t| t.snapshot()).collect()
    }
}
