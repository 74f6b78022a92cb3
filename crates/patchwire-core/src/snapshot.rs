//! Immutable snapshot swap.
//!
//! Larger structured state (a curve, a lookup table, a connection set) is
//! shared with the block path by replacing it whole, never by mutating it in
//! place. The writer builds a complete value, then [`SnapshotSwap::publish`]
//! swaps it in with one atomic pointer exchange. Readers either
//! [`acquire`](SnapshotSwap::acquire) a reference-counted handle or take a
//! short-lived [`read`](SnapshotSwap::read) guard; both are lock-free.
//!
//! Superseded snapshots go to a writer-side retirement list and are freed by
//! the writer once no reader holds them, so the real-time thread never pays
//! for a deallocation.
//!
//! # Example
//!
//! ```rust
//! use patchwire_core::SnapshotSwap;
//!
//! let swap = SnapshotSwap::new(vec![0.0_f32, 1.0]);
//! let held = swap.acquire();
//!
//! swap.publish(vec![0.0, 0.5, 1.0]);
//!
//! assert_eq!(held.len(), 2); // still the old one
//! assert_eq!(swap.acquire().len(), 3);
//! assert_eq!(swap.acquire().version(), 1);
//! ```

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use arc_swap::{ArcSwap, Guard};
use parking_lot::Mutex;

use crate::router::Connectivity;

/// One published generation of shared state.
#[derive(Debug)]
pub struct Snapshot<T> {
    version: u64,
    value: T,
}

impl<T> Snapshot<T> {
    /// Monotonic publish counter; the initial value is version 0.
    #[inline]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// The published value.
    #[inline]
    pub fn value(&self) -> &T {
        &self.value
    }
}

impl<T> Deref for Snapshot<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T: Connectivity> Connectivity for Snapshot<T> {
    #[inline]
    fn is_input_connected(&self, absolute: usize) -> bool {
        self.value.is_input_connected(absolute)
    }
}

struct WriterState<T> {
    next_version: u64,
    retired: Vec<Arc<Snapshot<T>>>,
}

impl<T> WriterState<T> {
    /// Frees every retired snapshot nobody else holds. Returns how many were freed.
    fn collect(&mut self) -> usize {
        let before = self.retired.len();
        self.retired.retain(|snap| Arc::strong_count(snap) > 1);
        before - self.retired.len()
    }
}

/// Single-slot container of versioned immutable state.
///
/// Share it between threads with an `Arc`. Writers are serialized by an
/// internal lock that readers never touch.
pub struct SnapshotSwap<T> {
    current: ArcSwap<Snapshot<T>>,
    writer: Mutex<WriterState<T>>,
}

impl<T> SnapshotSwap<T> {
    /// Creates the container with `initial` published as version 0.
    pub fn new(initial: T) -> Self {
        Self {
            current: ArcSwap::from_pointee(Snapshot {
                version: 0,
                value: initial,
            }),
            writer: Mutex::new(WriterState {
                next_version: 1,
                retired: Vec::new(),
            }),
        }
    }

    /// Retains the current snapshot for as long as the handle lives.
    ///
    /// Lock-free and allocation-free.
    #[inline]
    pub fn acquire(&self) -> Arc<Snapshot<T>> {
        self.current.load_full()
    }

    /// Borrows the current snapshot for a short scope.
    ///
    /// Cheaper than [`acquire`](Self::acquire); meant for use within one block.
    #[inline]
    pub fn read(&self) -> Guard<Arc<Snapshot<T>>> {
        self.current.load()
    }

    /// Version of the current snapshot.
    pub fn version(&self) -> u64 {
        self.current.load().version
    }

    /// Publishes a fully built value. Returns its version.
    pub fn publish(&self, value: T) -> u64 {
        let mut writer = self.writer.lock();
        let version = writer.next_version;
        writer.next_version += 1;
        let previous = self.current.swap(Arc::new(Snapshot { version, value }));
        writer.retired.push(previous);
        let freed = writer.collect();
        tracing::debug!(version, freed, pending = writer.retired.len(), "snapshot published");
        version
    }

    /// Builds a value and publishes it only if the build succeeds.
    ///
    /// On failure nothing is published and the previous snapshot stays current.
    pub fn try_publish_with<E, F>(&self, build: F) -> Result<u64, E>
    where
        E: fmt::Display,
        F: FnOnce() -> Result<T, E>,
    {
        match build() {
            Ok(value) => Ok(self.publish(value)),
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    version = self.version(),
                    "snapshot build failed, keeping previous"
                );
                Err(err)
            }
        }
    }

    /// Builds the next value from the current one and publishes it on success.
    pub fn update<E, F>(&self, edit: F) -> Result<u64, E>
    where
        E: fmt::Display,
        F: FnOnce(&T) -> Result<T, E>,
    {
        let current = self.acquire();
        self.try_publish_with(|| edit(&current.value))
    }

    /// Frees retired snapshots that no reader still holds.
    ///
    /// Call from the writer side, e.g. on an editor tick. Returns how many were freed.
    pub fn collect(&self) -> usize {
        self.writer.lock().collect()
    }

    /// Number of superseded snapshots still awaiting reclamation.
    pub fn retired(&self) -> usize {
        self.writer.lock().retired.len()
    }
}

impl<T: Default> Default for SnapshotSwap<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> fmt::Debug for SnapshotSwap<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapshotSwap")
            .field("version", &self.version())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::ConnectionSet;

    #[test]
    fn versions_increase() {
        let swap = SnapshotSwap::new(1u32);
        assert_eq!(swap.version(), 0);
        assert_eq!(swap.publish(2), 1);
        assert_eq!(swap.publish(3), 2);
        assert_eq!(*swap.read().value(), 3);
    }

    #[test]
    fn held_snapshot_is_kept_until_released() {
        let swap = SnapshotSwap::new(String::from("old"));
        let held = swap.acquire();
        swap.publish(String::from("new"));
        assert_eq!(held.as_str(), "old");
        assert_eq!(swap.retired(), 1);
        assert_eq!(swap.collect(), 0);

        drop(held);
        assert_eq!(swap.collect(), 1);
        assert_eq!(swap.retired(), 0);
    }

    #[test]
    fn unheld_snapshots_are_freed_on_publish() {
        let swap = SnapshotSwap::new(0u8);
        for v in 1..10 {
            swap.publish(v);
        }
        assert_eq!(swap.retired(), 0);
    }

    #[test]
    fn failed_build_keeps_previous() {
        let swap = SnapshotSwap::new(vec![1, 2, 3]);
        let result: Result<u64, String> = swap.try_publish_with(|| Err("unsorted".into()));
        assert!(result.is_err());
        assert_eq!(swap.version(), 0);
        assert_eq!(swap.acquire().len(), 3);
    }

    #[test]
    fn update_builds_from_current() {
        let swap = SnapshotSwap::new(vec![1]);
        swap.update(|v| {
            let mut next = v.clone();
            next.push(2);
            Ok::<_, String>(next)
        })
        .unwrap();
        assert_eq!(swap.acquire().value(), &vec![1, 2]);
    }

    #[test]
    fn connectivity_through_snapshot() {
        let swap = SnapshotSwap::new(ConnectionSet::new(4));
        swap.publish(ConnectionSet::with_connected(4, [2]));
        let snap = swap.read();
        assert!(snap.is_input_connected(2));
        assert!(!snap.is_input_connected(1));
    }
}
