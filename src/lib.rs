//! # slabdev
//!
//! A single long-lived record drawn from a dedicated fixed-size object pool,
//! exposed through an open/read/write/close interface that exchanges one
//! bounded textual message.
//!
//! ## Features
//!
//! - **Typed Object Pool**: Fixed-size records, cached for reuse, returned to
//!   the backing allocator on teardown
//! - **Move-Only Records**: A released record cannot be used again; dropping a
//!   record returns it to its pool
//! - **Checked Teardown**: Destroying a pool with outstanding records is
//!   rejected and the pool handed back
//! - **Serialized Channel**: Reads, writes and close on the message slot never
//!   interleave; reads never alter the stored message
//! - **Pluggable Collaborators**: Backing allocator, byte transfer and host
//!   registry are traits
//!
//! ## Example
//!
//! ```rust
//! use slabdev::{Device, Error};
//!
//! # fn main() -> slabdev::Result<()> {
//! let device = Device::new()?;
//! device.open()?;
//!
//! assert_eq!(device.write(b"hello")?, 5);
//!
//! let mut buf = [0u8; 10];
//! let report = device.read(&mut buf)?;
//! assert_eq!(&buf[..report.transferred], b"hello");
//!
//! device.close()?;
//! assert!(matches!(device.read(&mut buf), Err(Error::ChannelClosed)));
//!
//! device.shutdown()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Pool Example
//!
//! ```rust
//! use slabdev::ObjectPool;
//!
//! # fn main() -> slabdev::Result<()> {
//! let pool = ObjectPool::create("Slab Alloc cache", 255)?;
//! let record = pool.allocate()?;
//!
//! // Rejected while the record is out; the pool comes back.
//! let pool = pool.destroy().unwrap_err().into_pool();
//!
//! pool.release(record)?;
//! pool.destroy()?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(unsafe_op_in_unsafe_fn)]

mod allocator;
mod channel;
mod device;
mod error;
mod pool;
mod record;
mod registry;
mod transfer;

pub use allocator::{
    AllocationCounter, Allocator, DefaultAllocator, RECORD_ALIGN, TrackingAllocator,
};
pub use channel::{ChannelState, DEFAULT_GREETING, MESSAGE_CAPACITY, MessageChannel, ReadReport};
pub use device::{DEFAULT_DEVICE_NAME, DEFAULT_POOL_NAME, Device, DeviceBuilder};
pub use error::{Error, Result};
pub use pool::{DestroyError, ObjectPool, ObjectPoolBuilder, PoolStats};
pub use record::Record;
pub use registry::{DeviceId, FIRST_DYNAMIC_ID, LocalRegistry, Registry};
pub use transfer::{DirectTransfer, Transfer};
