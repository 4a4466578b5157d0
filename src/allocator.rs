//! Backing allocator trait and its implementations.
//!
//! The [`Allocator`] trait is the memory manager a pool draws its record slots
//! from. [`DefaultAllocator`] uses the global allocator; [`TrackingAllocator`]
//! wraps another allocator and counts live allocations so leaks can be
//! checked after a pool is destroyed.

use std::alloc::{Layout, alloc, dealloc};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{Error, Result};

/// Trait for record slot allocation backends.
///
/// # Safety
///
/// Implementations must ensure:
/// - `allocate` returns a valid pointer aligned to at least [`RECORD_ALIGN`]
///   for the requested size
/// - `deallocate` is only called with pointers previously returned by `allocate`
/// - The allocated memory remains valid until `deallocate` is called
///
/// # Example
///
/// ```rust
/// use slabdev::{Allocator, Result};
///
/// struct MyAllocator;
///
/// impl Allocator for MyAllocator {
///     fn allocate(&self, size: usize) -> Result<*mut u8> {
///         // Custom allocation logic
///         # unimplemented!()
///     }
///
///     unsafe fn deallocate(&self, ptr: *mut u8, size: usize) {
///         // Custom deallocation logic
///         # unimplemented!()
///     }
/// }
/// ```
pub trait Allocator: Send + Sync {
    /// Allocates a slot of `size` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllocationFailure`] if the memory cannot be provided.
    fn allocate(&self, size: usize) -> Result<*mut u8>;

    /// Deallocates a slot previously returned by [`allocate`](Self::allocate).
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    /// - `ptr` was returned by a previous call to `allocate` on this allocator
    /// - `size` matches the size passed to the original `allocate` call
    /// - The memory has not already been deallocated
    unsafe fn deallocate(&self, ptr: *mut u8, size: usize);
}

/// Alignment every record slot is guaranteed to have.
pub const RECORD_ALIGN: usize = 16;

/// Default allocator using the standard library's global allocator.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultAllocator;

impl DefaultAllocator {
    /// Creates a new default allocator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Allocator for DefaultAllocator {
    fn allocate(&self, size: usize) -> Result<*mut u8> {
        if size == 0 {
            return Err(Error::invalid_argument("size", "must be > 0"));
        }

        let layout = Layout::from_size_align(size, RECORD_ALIGN)
            .map_err(|e| Error::allocation(e.to_string()))?;

        // SAFETY: layout is valid (non-zero size, valid alignment)
        let ptr = unsafe { alloc(layout) };

        if ptr.is_null() {
            Err(Error::allocation(format!("global allocator refused {size} bytes")))
        } else {
            Ok(ptr)
        }
    }

    unsafe fn deallocate(&self, ptr: *mut u8, size: usize) {
        if size == 0 || ptr.is_null() {
            return;
        }

        if let Ok(layout) = Layout::from_size_align(size, RECORD_ALIGN) {
            // SAFETY: ptr was allocated with this layout by allocate()
            unsafe { dealloc(ptr, layout) };
        }
    }
}

/// Shared view of a [`TrackingAllocator`]'s live allocation count.
#[derive(Debug, Clone, Default)]
pub struct AllocationCounter(Arc<AtomicUsize>);

impl AllocationCounter {
    /// Number of slots currently allocated and not yet deallocated.
    #[must_use]
    pub fn live(&self) -> usize {
        self.0.load(Ordering::Acquire)
    }
}

/// Allocator wrapper that counts live allocations.
///
/// ```rust
/// use slabdev::{DefaultAllocator, ObjectPoolBuilder, TrackingAllocator};
///
/// # fn main() -> slabdev::Result<()> {
/// let tracking = TrackingAllocator::new(DefaultAllocator::new());
/// let counter = tracking.counter();
///
/// let pool = ObjectPoolBuilder::new("demo", 64)
///     .allocator(Box::new(tracking))
///     .build()?;
/// let record = pool.allocate()?;
/// assert_eq!(counter.live(), 1);
///
/// pool.release(record)?;
/// pool.destroy().map_err(slabdev::Error::from)?;
/// assert_eq!(counter.live(), 0);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct TrackingAllocator<A> {
    inner: A,
    counter: AllocationCounter,
}

impl<A: Allocator> TrackingAllocator<A> {
    /// Wraps `inner`.
    #[must_use]
    pub fn new(inner: A) -> Self {
        Self {
            inner,
            counter: AllocationCounter::default(),
        }
    }

    /// Returns a handle that keeps reporting after the allocator moved into a pool.
    #[must_use]
    pub fn counter(&self) -> AllocationCounter {
        self.counter.clone()
    }
}

impl<A: Allocator> Allocator for TrackingAllocator<A> {
    fn allocate(&self, size: usize) -> Result<*mut u8> {
        let ptr = self.inner.allocate(size)?;
        self.counter.0.fetch_add(1, Ordering::AcqRel);
        Ok(ptr)
    }

    unsafe fn deallocate(&self, ptr: *mut u8, size: usize) {
        // SAFETY: forwarded contract
        unsafe { self.inner.deallocate(ptr, size) };
        self.counter.0.fetch_sub(1, Ordering::AcqRel);
    }
}
