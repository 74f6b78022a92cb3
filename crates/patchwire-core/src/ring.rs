//! Bounded single-producer/single-consumer handoff channel.
//!
//! Built on an `rtrb` ring: a fixed array of cells with independent read and
//! write cursors. Storage is allocated once by [`channel`] and never resized.
//! Neither side ever blocks, locks, or allocates after construction.
//!
//! Writes are two-phase: [`Producer::begin_write`] hands back up to two
//! contiguous ranges (two when the request straddles the end of the array),
//! the caller fills them, and [`WriteGrant::commit`] publishes the items.
//! Reads mirror this with [`Consumer::begin_read`] and [`ReadGrant::commit`].
//!
//! Overflow never waits: a write that does not fit is refused whole and its
//! item count is added to [`Producer::dropped`]. A read asking for more than
//! is available gets whatever is ready.
//!
//! # Example
//!
//! ```rust
//! use patchwire_core::ring;
//!
//! let (mut tx, mut rx) = ring::channel::<u32>(4)?;
//! for item in 0..6 {
//!     tx.push(item);
//! }
//! assert_eq!(tx.dropped(), 2);
//!
//! let mut out = [0; 8];
//! assert_eq!(rx.pop_into(&mut out), 4);
//! assert_eq!(&out[..4], &[0, 1, 2, 3]);
//! # Ok::<(), patchwire_core::Error>(())
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use rtrb::RingBuffer;
use rtrb::chunks::{ChunkError, ReadChunk, WriteChunk};

use crate::{Error, Result};

/// Counters shared by both ends.
#[derive(Debug)]
struct Stats {
    capacity: usize,
    dropped: AtomicU64,
    underflows: AtomicU64,
}

/// Creates a channel holding up to `capacity` items.
///
/// All storage is allocated here; the ends never allocate afterwards. Fails
/// with [`Error::ZeroCapacity`] for an empty ring.
pub fn channel<T>(capacity: usize) -> Result<(Producer<T>, Consumer<T>)>
where
    T: Copy + Default + Send,
{
    if capacity == 0 {
        return Err(Error::ZeroCapacity);
    }
    let (tx, rx) = RingBuffer::new(capacity);
    let stats = Arc::new(Stats {
        capacity,
        dropped: AtomicU64::new(0),
        underflows: AtomicU64::new(0),
    });
    tracing::debug!(capacity, item_size = size_of::<T>(), "ring channel created");
    Ok((
        Producer {
            inner: tx,
            stats: Arc::clone(&stats),
        },
        Consumer { inner: rx, stats },
    ))
}

/// Writing end of a ring channel. There is exactly one per channel.
pub struct Producer<T> {
    inner: rtrb::Producer<T>,
    stats: Arc<Stats>,
}

/// Reading end of a ring channel. There is exactly one per channel.
pub struct Consumer<T> {
    inner: rtrb::Consumer<T>,
    stats: Arc<Stats>,
}

impl<T> std::fmt::Debug for Producer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Producer")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .field("dropped", &self.dropped())
            .finish()
    }
}

impl<T> std::fmt::Debug for Consumer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Consumer")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .field("dropped", &self.dropped())
            .finish()
    }
}

macro_rules! stats {
    () => {
        /// Fixed number of cells.
        #[inline]
        pub fn capacity(&self) -> usize {
            self.stats.capacity
        }

        /// Returns `true` if nothing is waiting to be read.
        #[inline]
        pub fn is_empty(&self) -> bool {
            self.len() == 0
        }

        /// Cells currently available to the producer.
        #[inline]
        pub fn free(&self) -> usize {
            self.stats.capacity - self.len()
        }

        /// Total items refused because the ring was full.
        #[inline]
        pub fn dropped(&self) -> u64 {
            self.stats.dropped.load(Ordering::Relaxed)
        }

        /// Number of reads that found the ring empty.
        #[inline]
        pub fn underflows(&self) -> u64 {
            self.stats.underflows.load(Ordering::Relaxed)
        }
    };
}

impl<T> Producer<T> {
    stats!();

    /// Items written and not yet read.
    #[inline]
    pub fn len(&self) -> usize {
        self.stats.capacity - self.inner.slots()
    }

    fn refuse(&self, n: usize) {
        self.stats.dropped.fetch_add(n as u64, Ordering::Relaxed);
    }
}

impl<T> Consumer<T> {
    stats!();

    /// Items written and not yet read.
    #[inline]
    pub fn len(&self) -> usize {
        self.inner.slots()
    }
}

impl<T: Copy + Default> Producer<T> {
    /// Reserves exactly `n` cells for writing.
    ///
    /// Returns `None` when fewer than `n` cells are free; the request is then
    /// counted as `n` dropped items and nothing is written.
    pub fn begin_write(&mut self, n: usize) -> Option<WriteGrant<'_, T>> {
        match self.inner.write_chunk(n) {
            Ok(chunk) => Some(WriteGrant { chunk }),
            Err(ChunkError::TooFewSlots(_)) => {
                // Disjoint field borrow: `self.inner` stays borrowed on the `Ok` path.
                self.stats.dropped.fetch_add(n as u64, Ordering::Relaxed);
                None
            }
        }
    }

    /// Writes one item. Returns `false` (and counts a drop) if the ring is full.
    #[inline]
    pub fn push(&mut self, item: T) -> bool {
        if self.inner.push(item).is_err() {
            self.refuse(1);
            return false;
        }
        true
    }

    /// Writes as many leading items of `items` as fit.
    ///
    /// Items that do not fit are counted as dropped. Returns the number written.
    pub fn push_slice(&mut self, items: &[T]) -> usize {
        let n = items.len().min(self.inner.slots());
        let refused = items.len() - n;
        if refused > 0 {
            self.refuse(refused);
        }
        if let Some(mut grant) = self.begin_write(n) {
            grant.copy_from_slice(&items[..n]);
            grant.commit();
        }
        n
    }
}

impl<T: Copy> Consumer<T> {
    /// Claims up to `max` ready items for reading.
    ///
    /// The grant may hold fewer than `max` items, or none.
    pub fn begin_read(&mut self, max: usize) -> ReadGrant<'_, T> {
        let n = max.min(self.inner.slots());
        if n == 0 && max > 0 {
            self.stats.underflows.fetch_add(1, Ordering::Relaxed);
        }
        // Only this end shrinks the readable region, so `n` items stay ready.
        ReadGrant {
            chunk: self.inner.read_chunk(n).ok(),
        }
    }

    /// Reads the oldest item.
    #[inline]
    pub fn pop(&mut self) -> Option<T> {
        let grant = self.begin_read(1);
        let item = grant.slices().0.first().copied();
        grant.commit();
        item
    }

    /// Reads up to `out.len()` items in order. Returns the number read.
    pub fn pop_into(&mut self, out: &mut [T]) -> usize {
        let grant = self.begin_read(out.len());
        let (head, tail) = grant.slices();
        out[..head.len()].copy_from_slice(head);
        out[head.len()..head.len() + tail.len()].copy_from_slice(tail);
        let n = grant.len();
        grant.commit();
        n
    }

    /// Drains everything and returns the newest item, or `None` if the ring was empty.
    ///
    /// Use for telemetry where only the freshest value matters.
    pub fn latest(&mut self) -> Option<T> {
        let grant = self.begin_read(usize::MAX);
        let (head, tail) = grant.slices();
        let newest = tail.last().or(head.last()).copied();
        grant.commit();
        newest
    }

    /// Calls `f` for every ready item in order, consuming them.
    pub fn drain(&mut self, mut f: impl FnMut(T)) -> usize {
        let grant = self.begin_read(usize::MAX);
        let (head, tail) = grant.slices();
        for &item in head.iter().chain(tail.iter()) {
            f(item);
        }
        let n = grant.len();
        grant.commit();
        n
    }
}

/// Reserved write region. Dropping it without [`commit`](Self::commit)
/// abandons the write.
pub struct WriteGrant<'a, T> {
    chunk: WriteChunk<'a, T>,
}

impl<T: Copy + Default> WriteGrant<'_, T> {
    /// Number of reserved cells.
    pub fn len(&self) -> usize {
        self.chunk.len()
    }

    /// Returns `true` if nothing was reserved.
    pub fn is_empty(&self) -> bool {
        self.chunk.is_empty()
    }

    /// The one or two contiguous ranges to fill, in write order.
    pub fn slices_mut(&mut self) -> (&mut [T], &mut [T]) {
        self.chunk.as_mut_slices()
    }

    /// Fills the reservation from `items`, which must have exactly [`len`](Self::len) items.
    pub fn copy_from_slice(&mut self, items: &[T]) {
        let (head, tail) = self.chunk.as_mut_slices();
        let (a, b) = items.split_at(head.len());
        head.copy_from_slice(a);
        tail.copy_from_slice(b);
    }

    /// Publishes the reserved items to the consumer.
    pub fn commit(self) {
        self.chunk.commit_all();
    }
}

/// Claimed read region. Dropping it without [`commit`](Self::commit) leaves the
/// items in the ring.
pub struct ReadGrant<'a, T> {
    chunk: Option<ReadChunk<'a, T>>,
}

impl<T: Copy> ReadGrant<'_, T> {
    /// Number of claimed items.
    pub fn len(&self) -> usize {
        self.chunk.as_ref().map_or(0, ReadChunk::len)
    }

    /// Returns `true` if nothing was ready.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The one or two contiguous ranges holding the items, oldest first.
    pub fn slices(&self) -> (&[T], &[T]) {
        match &self.chunk {
            Some(chunk) => chunk.as_slices(),
            None => (&[], &[]),
        }
    }

    /// Releases the claimed cells back to the producer.
    pub fn commit(self) {
        if let Some(chunk) = self.chunk {
            chunk.commit_all();
        }
    }
}
