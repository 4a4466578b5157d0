//! Typed object pool producing fixed-size records.
//!
//! This module provides the [`ObjectPool`] and [`ObjectPoolBuilder`] types. A
//! pool hands out [`Record`]s of one size, caches the slots of returned
//! records for reuse, and gives every slot back to its backing allocator on
//! teardown.

use std::fmt;
use std::ptr::NonNull;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Notify, mpsc};
use tracing::{debug, info, warn};

use crate::allocator::{Allocator, DefaultAllocator};
use crate::error::{Error, Result};
use crate::record::{Record, ReturnInfo};

/// Builder for creating an [`ObjectPool`] with custom configuration.
///
/// # Example
///
/// ```rust
/// use slabdev::ObjectPoolBuilder;
///
/// # fn main() -> slabdev::Result<()> {
/// let pool = ObjectPoolBuilder::new("messages", 255)
///     .max_records(4)
///     .build()?;
/// assert_eq!(pool.record_size(), 255);
/// # Ok(())
/// # }
/// ```
pub struct ObjectPoolBuilder {
    name: String,
    record_size: usize,
    max_records: Option<usize>,
    allocator: Box<dyn Allocator>,
}

impl ObjectPoolBuilder {
    /// Creates a builder for a pool of `record_size`-byte records tagged `name`.
    ///
    /// Default settings:
    /// - Max records: unlimited
    /// - Allocator: [`DefaultAllocator`]
    #[must_use]
    pub fn new(name: impl Into<String>, record_size: usize) -> Self {
        Self {
            name: name.into(),
            record_size,
            max_records: None,
            allocator: Box::new(DefaultAllocator::new()),
        }
    }

    /// Caps the number of records that may be outstanding or cached at once.
    ///
    /// When the cap is reached:
    /// - [`ObjectPool::allocate`] returns [`Error::AllocationFailure`]
    /// - [`ObjectPool::async_allocate`] waits for a record to come back
    #[must_use]
    pub const fn max_records(mut self, max_records: usize) -> Self {
        self.max_records = Some(max_records);
        self
    }

    /// Sets the allocator record slots are drawn from.
    #[must_use]
    pub fn allocator(mut self, allocator: Box<dyn Allocator>) -> Self {
        self.allocator = allocator;
        self
    }

    /// Builds the pool.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the record size is zero or the
    /// record limit is zero.
    pub fn build(self) -> Result<ObjectPool> {
        if self.record_size == 0 {
            return Err(Error::invalid_argument("record_size", "must be > 0"));
        }
        if self.max_records == Some(0) {
            return Err(Error::invalid_argument("max_records", "must be > 0"));
        }

        let (return_tx, return_rx) = mpsc::unbounded_channel();

        let shared = Arc::new(PoolShared {
            name: self.name,
            record_size: self.record_size,
            allocator: self.allocator,
            return_tx,
            returned: Notify::new(),
        });

        info!(
            pool = %shared.name,
            record_size = shared.record_size,
            max_records = ?self.max_records,
            "object pool created"
        );

        Ok(ObjectPool {
            shared,
            max_records: self.max_records,
            inner: Mutex::new(PoolInner {
                return_rx,
                free: Vec::new(),
                outstanding: 0,
                total_allocations: 0,
            }),
        })
    }
}

/// State shared between a pool and every record it produced.
pub(crate) struct PoolShared {
    /// Pool tag.
    pub name: String,
    /// Size of every record.
    pub record_size: usize,
    /// Backing memory manager.
    pub allocator: Box<dyn Allocator>,
    /// Return path used by [`Record`]'s `Drop`.
    pub return_tx: mpsc::UnboundedSender<ReturnInfo>,
    /// Wakes `async_allocate` callers when a record comes back.
    pub returned: Notify,
}

/// Point-in-time counters of an [`ObjectPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Size of every record in bytes.
    pub record_size: usize,
    /// Records currently owned by callers.
    pub outstanding: usize,
    /// Returned slots kept for reuse.
    pub cached: usize,
    /// Configured record cap, if any.
    pub max_records: Option<usize>,
    /// Records handed out over the pool's lifetime.
    pub total_allocations: u64,
}

/// A pool of fixed-size [`Record`]s.
///
/// Records return to the pool when released or dropped. The pool itself is
/// torn down with [`destroy`](Self::destroy), which refuses while records are
/// still outstanding.
///
/// # Thread Safety
///
/// Bookkeeping sits behind a `parking_lot::Mutex`; records come back over a
/// non-blocking channel, so dropping a record never takes the lock.
///
/// # Example
///
/// ```rust
/// use slabdev::ObjectPool;
///
/// # fn main() -> slabdev::Result<()> {
/// let pool = ObjectPool::create("Slab Alloc cache", 255)?;
/// let record = pool.allocate()?;
/// pool.release(record)?;
/// pool.destroy()?;
/// # Ok(())
/// # }
/// ```
pub struct ObjectPool {
    shared: Arc<PoolShared>,
    max_records: Option<usize>,
    inner: Mutex<PoolInner>,
}

impl ObjectPool {
    /// Creates a pool of `record_size`-byte records tagged `name` with default settings.
    ///
    /// This is equivalent to `ObjectPoolBuilder::new(name, record_size).build()`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `record_size` is zero.
    pub fn create(name: impl Into<String>, record_size: usize) -> Result<Self> {
        ObjectPoolBuilder::new(name, record_size).build()
    }

    /// Returns the pool's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Returns the size of every record.
    #[must_use]
    pub fn record_size(&self) -> usize {
        self.shared.record_size
    }

    /// Allocates one zero-filled record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllocationFailure`] if the record cap is reached or the
    /// backing allocator fails.
    pub fn allocate(&self) -> Result<Record> {
        let mut inner = self.inner.lock();
        inner.process_returns();
        inner.try_allocate(&self.shared, self.max_records)
    }

    /// Allocates one record, waiting for a release when the cap is reached.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllocationFailure`] if the backing allocator fails.
    pub async fn async_allocate(&self) -> Result<Record> {
        loop {
            let notified = self.shared.returned.notified();
            {
                let mut inner = self.inner.lock();
                inner.process_returns();
                if !inner.is_exhausted(self.max_records) {
                    return inner.try_allocate(&self.shared, self.max_records);
                }
            }
            debug!(pool = %self.shared.name, "pool exhausted, waiting for a release");
            notified.await;
        }
    }

    /// Returns `record` to the pool.
    ///
    /// The record is consumed, so it cannot be used or released again.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PoolMisuse`] if the record came from another pool. The
    /// record still goes back to the pool that produced it.
    pub fn release(&self, record: Record) -> Result<()> {
        if !record.belongs_to(&self.shared) {
            let message = format!(
                "record from pool `{}` released to pool `{}`",
                record.pool_name(),
                self.shared.name
            );
            warn!(pool = %self.shared.name, "{message}");
            return Err(Error::pool_misuse(message));
        }

        drop(record);
        self.inner.lock().process_returns();
        Ok(())
    }

    /// Returns the pool's current counters.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let mut inner = self.inner.lock();
        inner.process_returns();
        PoolStats {
            record_size: self.shared.record_size,
            outstanding: inner.outstanding,
            cached: inner.free.len(),
            max_records: self.max_records,
            total_allocations: inner.total_allocations,
        }
    }

    /// Destroys the pool, handing every cached slot back to the allocator.
    ///
    /// # Errors
    ///
    /// Returns a [`DestroyError`] holding the pool if records are still
    /// outstanding. Release them and try again.
    pub fn destroy(self) -> std::result::Result<(), DestroyError> {
        let outstanding = {
            let mut inner = self.inner.lock();
            inner.process_returns();
            inner.outstanding
        };

        if outstanding > 0 {
            warn!(
                pool = %self.shared.name,
                outstanding,
                "refusing to destroy pool with outstanding records"
            );
            return Err(DestroyError {
                pool: self,
                outstanding,
            });
        }

        info!(pool = %self.shared.name, "object pool destroyed");
        drop(self);
        Ok(())
    }
}

impl fmt::Debug for ObjectPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectPool")
            .field("name", &self.shared.name)
            .field("record_size", &self.shared.record_size)
            .field("max_records", &self.max_records)
            .finish_non_exhaustive()
    }
}

impl Drop for ObjectPool {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();

        // Late records free themselves once the return path is closed.
        inner.return_rx.close();
        inner.process_returns();

        if inner.outstanding > 0 {
            warn!(
                pool = %self.shared.name,
                outstanding = inner.outstanding,
                "pool dropped with outstanding records"
            );
        }

        for ptr in inner.free.drain(..) {
            // SAFETY: every cached slot came from this allocator with record_size bytes
            unsafe {
                self.shared
                    .allocator
                    .deallocate(ptr.as_ptr(), self.shared.record_size);
            }
        }
    }
}

/// Error returned by [`ObjectPool::destroy`] while records are outstanding.
///
/// The pool is handed back unchanged.
#[derive(thiserror::Error)]
#[error("pool `{}` still has {outstanding} outstanding record(s)", .pool.name())]
pub struct DestroyError {
    pool: ObjectPool,
    outstanding: usize,
}

impl DestroyError {
    /// Number of records that were still out.
    #[must_use]
    pub const fn outstanding(&self) -> usize {
        self.outstanding
    }

    /// Takes the pool back.
    #[must_use]
    pub fn into_pool(self) -> ObjectPool {
        self.pool
    }
}

impl fmt::Debug for DestroyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DestroyError")
            .field("pool", &self.pool.name())
            .field("outstanding", &self.outstanding)
            .finish()
    }
}

impl From<DestroyError> for Error {
    fn from(err: DestroyError) -> Self {
        Self::pool_misuse(err.to_string())
    }
}

/// Internal pool state protected by the mutex.
struct PoolInner {
    /// Receiving end of the record return path.
    return_rx: mpsc::UnboundedReceiver<ReturnInfo>,

    /// Cached slots ready for reuse.
    free: Vec<NonNull<u8>>,

    /// Records currently owned by callers.
    outstanding: usize,

    /// Records handed out over the pool's lifetime.
    total_allocations: u64,
}

// SAFETY: the cached pointers are owned exclusively by this pool
unsafe impl Send for PoolInner {}

impl PoolInner {
    /// Moves every returned record onto the free list.
    fn process_returns(&mut self) {
        while let Ok(info) = self.return_rx.try_recv() {
            self.free.push(info.ptr);
            self.outstanding -= 1;
        }
    }

    /// Returns `true` if no cached slot exists and the cap forbids a new one.
    fn is_exhausted(&self, max_records: Option<usize>) -> bool {
        self.free.is_empty()
            && max_records.is_some_and(|max| self.outstanding + self.free.len() >= max)
    }

    /// Reuses a cached slot or draws a new one from the allocator.
    fn try_allocate(
        &mut self,
        shared: &Arc<PoolShared>,
        max_records: Option<usize>,
    ) -> Result<Record> {
        let size = shared.record_size;

        let ptr = if let Some(ptr) = self.free.pop() {
            ptr
        } else {
            if self.is_exhausted(max_records) {
                return Err(Error::allocation(format!(
                    "pool `{}` exhausted: {} of {} records outstanding",
                    shared.name,
                    self.outstanding,
                    max_records.unwrap_or_default()
                )));
            }
            let raw = shared.allocator.allocate(size).inspect_err(|e| {
                warn!(pool = %shared.name, error = %e, "backing allocator failed");
            })?;
            NonNull::new(raw).ok_or_else(|| Error::allocation("allocator returned null"))?
        };

        // SAFETY: ptr is valid for `size` bytes and owned by nobody else
        unsafe { std::ptr::write_bytes(ptr.as_ptr(), 0, size) };

        self.outstanding += 1;
        self.total_allocations += 1;

        // SAFETY: ptr is a zeroed slot of `size` bytes from shared.allocator
        Ok(unsafe { Record::new(ptr, size, Arc::clone(shared)) })
    }
}
