//! Pooled record handle that returns to its pool on drop.
//!
//! A [`Record`] is the unique owner of one fixed-size slot. Ownership moves
//! from the pool to the caller on allocation and back when the record is
//! released or dropped, so a released record cannot be touched again.

use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::pool::PoolShared;

/// Information needed to return a record slot to the pool.
#[derive(Debug)]
pub(crate) struct ReturnInfo {
    /// Start of the slot.
    pub ptr: NonNull<u8>,
}

// SAFETY: ReturnInfo only carries a slot pointer whose ownership travels with it
unsafe impl Send for ReturnInfo {}

/// A fixed-size record allocated from an [`ObjectPool`](crate::ObjectPool).
///
/// The record dereferences to its bytes. It is zero-filled when handed out.
///
/// # Example
///
/// ```rust
/// use slabdev::ObjectPool;
///
/// # fn main() -> slabdev::Result<()> {
/// let pool = ObjectPool::create("demo", 255)?;
/// let mut record = pool.allocate()?;
///
/// record[0] = b'h';
/// assert_eq!(record[0], b'h');
/// assert_eq!(record.len(), 255);
///
/// // Back to the pool
/// pool.release(record)?;
/// # Ok(())
/// # }
/// ```
pub struct Record {
    /// Start of the slot.
    ptr: NonNull<u8>,

    /// Slot size, equal to the pool's record size.
    len: usize,

    /// Pool bookkeeping shared with every record of the same pool.
    shared: Arc<PoolShared>,
}

// SAFETY: Record exclusively owns its slot; the shared state is Send + Sync
unsafe impl Send for Record {}

// SAFETY: shared access only hands out `&[u8]`
unsafe impl Sync for Record {}

impl Record {
    /// Creates a new record.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    /// - `ptr` points to a zero-initialized slot of `len` bytes obtained from
    ///   `shared.allocator`
    /// - No other record or free list entry refers to the same slot
    pub(crate) const unsafe fn new(ptr: NonNull<u8>, len: usize, shared: Arc<PoolShared>) -> Self {
        Self { ptr, len, shared }
    }

    /// Returns the record size in bytes.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the record has no bytes.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the record as a byte slice.
    #[inline]
    #[must_use]
    pub const fn as_slice(&self) -> &[u8] {
        // SAFETY: ptr is valid and initialized for len bytes
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    /// Returns the record as a mutable byte slice.
    #[inline]
    #[must_use]
    pub const fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: ptr is valid for len bytes and we have exclusive access
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    /// Name of the pool this record came from.
    #[must_use]
    pub fn pool_name(&self) -> &str {
        &self.shared.name
    }

    /// Returns `true` if this record was produced by the pool owning `shared`.
    pub(crate) fn belongs_to(&self, shared: &Arc<PoolShared>) -> bool {
        Arc::ptr_eq(&self.shared, shared)
    }
}

impl Drop for Record {
    fn drop(&mut self) {
        // Non-blocking, works in any context.
        match self.shared.return_tx.send(ReturnInfo { ptr: self.ptr }) {
            Ok(()) => self.shared.returned.notify_one(),
            Err(mpsc::error::SendError(info)) => {
                // The pool is gone; free the slot directly.
                // SAFETY: the slot came from this allocator with this size
                unsafe {
                    self.shared
                        .allocator
                        .deallocate(info.ptr.as_ptr(), self.len);
                }
            }
        }
    }
}

impl Deref for Record {
    type Target = [u8];

    #[inline]
    fn deref(&self) -> &Self::Target {
        self.as_slice()
    }
}

impl DerefMut for Record {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.as_mut_slice()
    }
}

impl AsRef<[u8]> for Record {
    #[inline]
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl AsMut<[u8]> for Record {
    #[inline]
    fn as_mut(&mut self) -> &mut [u8] {
        self.as_mut_slice()
    }
}

impl std::fmt::Debug for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Record")
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .field("pool", &self.shared.name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use crate::{DefaultAllocator, ObjectPool, ObjectPoolBuilder, TrackingAllocator};

    #[test]
    fn test_record_basic_operations() {
        let pool = ObjectPool::create("records", 255).unwrap();
        let mut record = pool.allocate().unwrap();

        assert_eq!(record.len(), 255);
        assert!(!record.is_empty());
        assert!(record.iter().all(|&b| b == 0));

        record[0] = 0xAB;
        record[254] = 0xCD;
        assert_eq!(record.as_slice()[0], 0xAB);
        assert_eq!(record[254], 0xCD);

        record.as_mut_slice()[1] = 0xEF;
        assert_eq!(record[1], 0xEF);
    }

    #[test]
    fn test_record_debug() {
        let pool = ObjectPool::create("debug-pool", 16).unwrap();
        let record = pool.allocate().unwrap();

        let debug_str = format!("{record:?}");
        assert!(debug_str.contains("Record"));
        assert!(debug_str.contains("debug-pool"));
        assert_eq!(record.pool_name(), "debug-pool");
    }

    #[test]
    fn test_record_drop_returns_to_pool() {
        let pool = ObjectPool::create("drop-pool", 32).unwrap();
        let record = pool.allocate().unwrap();
        assert_eq!(pool.stats().outstanding, 1);

        drop(record);
        let stats = pool.stats();
        assert_eq!(stats.outstanding, 0);
        assert_eq!(stats.cached, 1);
    }

    #[test]
    fn test_record_outlives_pool() {
        let tracking = TrackingAllocator::new(DefaultAllocator::new());
        let counter = tracking.counter();
        let pool = ObjectPoolBuilder::new("short-lived", 64)
            .allocator(Box::new(tracking))
            .build()
            .unwrap();

        let mut record = pool.allocate().unwrap();
        drop(pool);

        // Still usable, and freed when dropped.
        record[0] = 1;
        assert_eq!(counter.live(), 1);
        drop(record);
        assert_eq!(counter.live(), 0);
    }
}
