//! The multi-locker: the scheduling core for one namespace.
//!
//! Holds the queue of lock batches, decides compatibility against the
//! path store, admits batches, and fires one-shot readiness signals.
//! Every public operation is synchronous and serialized under one mutex;
//! nothing here ever awaits.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::error::LockerError;
use crate::path::PathStore;
use crate::protocol::{Claim, Mode};

pub type BatchId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BatchState {
    Enqueued,
    Acquired,
    Released,
}

struct BatchRecord {
    claims: Vec<Claim>,
    state: BatchState,
    blockers: u32,
    /// Batches that listed this one in their blocker set at submit time;
    /// released here to decrement their count.
    successors: Vec<BatchId>,
    ready_tx: Option<oneshot::Sender<()>>,
}

/// Point-in-time counters for a namespace, exposed read-only.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct Statistics {
    pub total_submitted: u64,
    pub currently_acquired: u64,
    pub currently_enqueued: u64,
    pub max_queue_depth: u64,
    pub total_read_claims: u64,
    pub total_write_claims: u64,
}

struct Inner {
    path_store: PathStore,
    batches: HashMap<BatchId, BatchRecord>,
    queue: VecDeque<BatchId>,
    stats: Statistics,
    draining: bool,
}

/// The scheduling core for one namespace.
///
/// Construct one per namespace name; the [`crate::registry::NamespaceRegistry`]
/// owns the mapping from name to instance.
pub struct MultiLocker {
    next_id: AtomicU64,
    inner: Mutex<Inner>,
}

impl Default for MultiLocker {
    fn default() -> Self {
        Self::new()
    }
}

impl MultiLocker {
    pub fn new() -> Self {
        MultiLocker {
            next_id: AtomicU64::new(1),
            inner: Mutex::new(Inner {
                path_store: PathStore::new(),
                batches: HashMap::new(),
                queue: VecDeque::new(),
                stats: Statistics::default(),
                draining: false,
            }),
        }
    }

    /// Enqueues a normalized batch, returning a handle the caller awaits
    /// for acquisition and later uses to release.
    ///
    /// Fails only if the namespace is draining.
    pub fn submit(self: &Arc<Self>, claims: Vec<Claim>) -> Result<BatchHandle, LockerError> {
        let mut inner = self.inner.lock();
        if inner.draining {
            return Err(LockerError::Draining);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let mut blocker_set: HashSet<BatchId> = HashSet::new();
        for claim in &claims {
            for (other_id, other_mode) in inner.path_store.probe(&claim.path) {
                if other_mode.conflicts_with(claim.mode) {
                    blocker_set.insert(other_id);
                }
            }
        }

        for claim in &claims {
            match claim.mode {
                Mode::Read => inner.stats.total_read_claims += 1,
                Mode::Write => inner.stats.total_write_claims += 1,
            }
            inner.path_store.claim(id, claim.mode, &claim.path);
        }

        for &blocker in &blocker_set {
            if let Some(b) = inner.batches.get_mut(&blocker) {
                b.successors.push(id);
            }
        }

        let blockers = blocker_set.len() as u32;
        let (ready_tx, ready_rx) = oneshot::channel();
        let mut record = BatchRecord {
            claims,
            state: BatchState::Enqueued,
            blockers,
            successors: Vec::new(),
            ready_tx: Some(ready_tx),
        };

        inner.queue.push_back(id);
        inner.stats.total_submitted += 1;
        inner.stats.currently_enqueued += 1;
        if inner.queue.len() as u64 > inner.stats.max_queue_depth {
            inner.stats.max_queue_depth = inner.queue.len() as u64;
        }

        let mut ready_tx_to_fire = None;
        if blockers == 0 {
            ready_tx_to_fire = Self::grant(&mut inner, id, &mut record);
        }
        inner.batches.insert(id, record);

        trace!(namespace_batch = id, blockers, "batch submitted");

        // Drop the mutex before firing the readiness signal, so a waiter
        // that immediately re-enters the multi-locker cannot deadlock on
        // or be reordered behind it.
        drop(inner);
        if let Some(tx) = ready_tx_to_fire {
            let _ = tx.send(());
        }

        Ok(BatchHandle {
            id,
            ready_rx: Some(ready_rx),
            locker: Arc::clone(self),
        })
    }

    /// Marks `record` acquired and updates counters; returns its readiness
    /// sender for the caller to fire once `inner`'s mutex has been released.
    fn grant(
        inner: &mut Inner,
        id: BatchId,
        record: &mut BatchRecord,
    ) -> Option<oneshot::Sender<()>> {
        record.state = BatchState::Acquired;
        inner.stats.currently_enqueued -= 1;
        inner.stats.currently_acquired += 1;
        debug!(batch = id, "batch acquired");
        record.ready_tx.take()
    }

    /// Releases a batch, idempotently. Safe to call on a batch that is
    /// still enqueued (equivalent to cancellation) or already acquired.
    /// A second release on the same batch is a no-op.
    pub fn release(&self, id: BatchId) {
        let mut inner = self.inner.lock();
        let was_acquired = match inner.batches.get(&id) {
            Some(b) if b.state != BatchState::Released => b.state == BatchState::Acquired,
            _ => return,
        };

        let (claims, successors) = {
            let record = inner.batches.get_mut(&id).unwrap();
            record.state = BatchState::Released;
            (
                std::mem::take(&mut record.claims),
                std::mem::take(&mut record.successors),
            )
        };

        for claim in &claims {
            inner.path_store.release(id, &claim.path);
        }
        inner.queue.retain(|&b| b != id);

        if was_acquired {
            inner.stats.currently_acquired -= 1;
        } else {
            inner.stats.currently_enqueued -= 1;
        }

        let mut ready_txs_to_fire = Vec::new();
        for successor in successors {
            let grant_now = if let Some(s) = inner.batches.get_mut(&successor) {
                if s.state == BatchState::Enqueued {
                    s.blockers -= 1;
                    s.blockers == 0
                } else {
                    false
                }
            } else {
                false
            };
            if grant_now {
                let mut record = inner.batches.remove(&successor).unwrap();
                if let Some(tx) = Self::grant(&mut inner, successor, &mut record) {
                    ready_txs_to_fire.push(tx);
                }
                inner.batches.insert(successor, record);
            }
        }

        inner.batches.remove(&id);
        debug!(batch = id, "batch released");

        // As in `submit`, fire readiness only after the mutex is released.
        drop(inner);
        for tx in ready_txs_to_fire {
            let _ = tx.send(());
        }
    }

    /// A point-in-time snapshot of this namespace's counters.
    pub fn statistics(&self) -> Statistics {
        self.inner.lock().stats
    }

    /// Marks the namespace as draining: further [`MultiLocker::submit`]
    /// calls fail until... they never stop failing; draining is terminal.
    pub fn set_draining(&self) {
        self.inner.lock().draining = true;
    }

    /// True once every batch has been released. Used by the namespace
    /// registry to decide when it is safe to drop a draining namespace.
    pub fn is_drained(&self) -> bool {
        self.inner.lock().batches.is_empty()
    }
}

/// A handle to a submitted batch: its assigned id, a one-shot readiness
/// future, and a release action.
pub struct BatchHandle {
    id: BatchId,
    ready_rx: Option<oneshot::Receiver<()>>,
    locker: Arc<MultiLocker>,
}

impl BatchHandle {
    pub fn id(&self) -> BatchId {
        self.id
    }

    /// Resolves once this batch has been acquired. Resolves immediately
    /// if it already was by the time [`MultiLocker::submit`] returned.
    /// Subsequent calls resolve immediately without waiting again.
    pub async fn ready(&mut self) {
        if let Some(rx) = self.ready_rx.take() {
            let _ = rx.await;
        }
    }

    /// Non-blocking check: true if the batch has already been acquired,
    /// without awaiting. Used right after [`MultiLocker::submit`] returns
    /// to learn whether the grant happened synchronously, without
    /// consuming the readiness future needlessly.
    pub fn poll_acquired(&mut self) -> bool {
        match self.ready_rx.as_mut() {
            None => true,
            Some(rx) => match rx.try_recv() {
                Ok(()) => {
                    self.ready_rx = None;
                    true
                }
                Err(oneshot::error::TryRecvError::Empty) => false,
                Err(oneshot::error::TryRecvError::Closed) => {
                    self.ready_rx = None;
                    false
                }
            },
        }
    }

    /// Releases the batch. Safe to call whether or not it has been
    /// acquired yet, and safe to call more than once.
    pub fn release(&self) {
        self.locker.release(self.id);
    }
}

impl Drop for BatchHandle {
    fn drop(&mut self) {
        self.locker.release(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Claim, Mode};

    fn claim(mode: Mode, segs: &[&str]) -> Claim {
        Claim {
            mode,
            path: segs.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn second_submit_on_conflicting_path_enqueues_then_acquires_on_release() {
        let locker = Arc::new(MultiLocker::new());
        let mut h1 = locker.submit(vec![claim(Mode::Write, &["a"])]).unwrap();
        h1.ready().await;
        assert_eq!(locker.statistics().currently_acquired, 1);

        let mut h2 = locker
            .submit(vec![claim(Mode::Read, &["a", "b"])])
            .unwrap();
        assert_eq!(locker.statistics().currently_enqueued, 1);

        h1.release();
        h2.ready().await;
        assert_eq!(locker.statistics().currently_acquired, 1);
        assert_eq!(locker.statistics().currently_enqueued, 0);
    }

    #[tokio::test]
    async fn writer_is_not_starved_by_later_readers() {
        let locker = Arc::new(MultiLocker::new());
        let mut r1 = locker.submit(vec![claim(Mode::Read, &["a"])]).unwrap();
        r1.ready().await;
        let mut r2 = locker.submit(vec![claim(Mode::Read, &["a"])]).unwrap();
        r2.ready().await;

        let mut w = locker.submit(vec![claim(Mode::Write, &["a"])]).unwrap();
        let mut r3 = locker.submit(vec![claim(Mode::Read, &["a"])]).unwrap();

        // r3 must wait behind w even though read/read would otherwise be
        // compatible with r1/r2 — writer fairness.
        assert_eq!(locker.statistics().currently_enqueued, 2);

        r1.release();
        r2.release();
        w.ready().await;
        assert_eq!(locker.statistics().currently_acquired, 1);

        w.release();
        r3.ready().await;
        assert_eq!(locker.statistics().currently_acquired, 1);
    }

    #[tokio::test]
    async fn sibling_paths_do_not_conflict() {
        let locker = Arc::new(MultiLocker::new());
        let mut h1 = locker
            .submit(vec![claim(Mode::Write, &["x", "y"])])
            .unwrap();
        h1.ready().await;
        let mut h2 = locker
            .submit(vec![claim(Mode::Write, &["x", "z"])])
            .unwrap();
        h2.ready().await;
        assert_eq!(locker.statistics().currently_acquired, 2);
    }

    #[tokio::test]
    async fn release_of_enqueued_batch_unblocks_successors_without_acquiring() {
        let locker = Arc::new(MultiLocker::new());
        let mut h1 = locker.submit(vec![claim(Mode::Write, &["a"])]).unwrap();
        h1.ready().await;
        let h2 = locker.submit(vec![claim(Mode::Write, &["a"])]).unwrap();
        let mut h3 = locker.submit(vec![claim(Mode::Write, &["a"])]).unwrap();

        // Cancel h2 while still enqueued.
        h2.release();
        h1.release();
        h3.ready().await;
        assert_eq!(locker.statistics().currently_acquired, 1);
    }

    #[tokio::test]
    async fn double_release_is_a_no_op() {
        let locker = Arc::new(MultiLocker::new());
        let h1 = locker.submit(vec![claim(Mode::Write, &["a"])]).unwrap();
        h1.release();
        h1.release();
        assert_eq!(locker.statistics().currently_acquired, 0);
    }

    #[tokio::test]
    async fn draining_rejects_new_submits() {
        let locker = Arc::new(MultiLocker::new());
        locker.set_draining();
        let err = locker.submit(vec![claim(Mode::Read, &["a"])]).unwrap_err();
        assert_eq!(err, LockerError::Draining);
    }
}
