//! The message device: registration, pool, record and channel in one context.
//!
//! [`DeviceBuilder::build`] performs initialization in order (register the
//! name, create the pool, allocate the record, seed the channel) and unwinds
//! whatever was already set up if a later step fails. Teardown runs in the
//! opposite order: release the record, destroy the pool, unregister.

use std::fmt;
use std::sync::Arc;

use tracing::{error, info};

use crate::allocator::{Allocator, DefaultAllocator};
use crate::channel::{ChannelState, DEFAULT_GREETING, MESSAGE_CAPACITY, MessageChannel, ReadReport};
use crate::error::{Error, Result};
use crate::pool::{ObjectPool, ObjectPoolBuilder, PoolStats};
use crate::registry::{DeviceId, LocalRegistry, Registry};
use crate::transfer::{DirectTransfer, Transfer};

/// Name the device registers under by default.
pub const DEFAULT_DEVICE_NAME: &str = "SlabAlloc";

/// Name of the device's record pool by default.
pub const DEFAULT_POOL_NAME: &str = "Slab Alloc cache";

/// Builder for a [`Device`].
///
/// # Example
///
/// ```rust
/// use slabdev::DeviceBuilder;
///
/// # fn main() -> slabdev::Result<()> {
/// let device = DeviceBuilder::new().name("demo").build()?;
/// device.open()?;
/// device.write(b"hello")?;
///
/// let mut buf = [0u8; 10];
/// let report = device.read(&mut buf)?;
/// assert_eq!(&buf[..report.transferred], b"hello");
///
/// device.shutdown()?;
/// # Ok(())
/// # }
/// ```
pub struct DeviceBuilder {
    name: String,
    pool_name: String,
    greeting: Vec<u8>,
    record_size: usize,
    allocator: Box<dyn Allocator>,
    transfer: Arc<dyn Transfer>,
    registry: Arc<dyn Registry>,
}

impl Default for DeviceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceBuilder {
    /// Creates a builder with default settings.
    ///
    /// Default settings:
    /// - Name: [`DEFAULT_DEVICE_NAME`]
    /// - Pool name: [`DEFAULT_POOL_NAME`]
    /// - Greeting: [`DEFAULT_GREETING`]
    /// - Record size: [`MESSAGE_CAPACITY`]
    /// - Allocator: [`DefaultAllocator`]
    /// - Transfer: [`DirectTransfer`]
    /// - Registry: a private [`LocalRegistry`]
    #[must_use]
    pub fn new() -> Self {
        Self {
            name: DEFAULT_DEVICE_NAME.to_owned(),
            pool_name: DEFAULT_POOL_NAME.to_owned(),
            greeting: DEFAULT_GREETING.as_bytes().to_vec(),
            record_size: MESSAGE_CAPACITY,
            allocator: Box::new(DefaultAllocator::new()),
            transfer: Arc::new(DirectTransfer),
            registry: Arc::new(LocalRegistry::new()),
        }
    }

    /// Sets the name registered with the host.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the record pool's name.
    #[must_use]
    pub fn pool_name(mut self, pool_name: impl Into<String>) -> Self {
        self.pool_name = pool_name.into();
        self
    }

    /// Sets the message the record is seeded with.
    #[must_use]
    pub fn greeting(mut self, greeting: impl Into<Vec<u8>>) -> Self {
        self.greeting = greeting.into();
        self
    }

    /// Sets the record size, terminator included.
    #[must_use]
    pub const fn record_size(mut self, record_size: usize) -> Self {
        self.record_size = record_size;
        self
    }

    /// Sets the allocator the record pool draws from.
    #[must_use]
    pub fn allocator(mut self, allocator: Box<dyn Allocator>) -> Self {
        self.allocator = allocator;
        self
    }

    /// Sets the collaborator that copies bytes to and from callers.
    #[must_use]
    pub fn transfer(mut self, transfer: Arc<dyn Transfer>) -> Self {
        self.transfer = transfer;
        self
    }

    /// Sets the host registry.
    #[must_use]
    pub fn registry(mut self, registry: Arc<dyn Registry>) -> Self {
        self.registry = registry;
        self
    }

    /// Initializes the device.
    ///
    /// # Errors
    ///
    /// - [`Error::Registration`] if the registry refuses the name
    /// - [`Error::InvalidArgument`] if the record size is zero
    /// - [`Error::AllocationFailure`] if the record cannot be allocated
    /// - [`Error::BufferOverflow`] if the greeting does not fit the record
    ///
    /// Resources created before the failing step are released in reverse order.
    pub fn build(self) -> Result<Device> {
        let Self {
            name,
            pool_name,
            greeting,
            record_size,
            allocator,
            transfer,
            registry,
        } = self;
        info!(device = %name, "initializing device");

        let id = registry.register(&name).inspect_err(|e| {
            error!(device = %name, error = %e, "failed to register device");
        })?;
        info!(device = %name, %id, "registered correctly");

        let pool = ObjectPoolBuilder::new(pool_name, record_size)
            .allocator(allocator)
            .build();
        let (pool, channel) = match pool.and_then(|pool| seed(&name, pool, &greeting, transfer)) {
            Ok(parts) => parts,
            Err(e) => {
                error!(device = %name, error = %e, "device initialization failed, unwinding");
                registry.unregister(id);
                return Err(e);
            }
        };

        Ok(Device {
            id,
            name,
            registry,
            pool: Some(pool),
            channel,
        })
    }
}

/// Allocates the record from `pool` and seeds the channel with it.
///
/// On failure the record goes back to the pool before the pool is dropped.
fn seed(
    name: &str,
    pool: ObjectPool,
    greeting: &[u8],
    transfer: Arc<dyn Transfer>,
) -> Result<(ObjectPool, MessageChannel)> {
    info!(pool = %pool.name(), record_size = pool.record_size(), "record pool allocated");

    let record = pool.allocate()?;
    let channel = MessageChannel::new(name, record, greeting, transfer)?;
    Ok((pool, channel))
}

impl fmt::Debug for DeviceBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceBuilder")
            .field("name", &self.name)
            .field("pool_name", &self.pool_name)
            .field("record_size", &self.record_size)
            .finish_non_exhaustive()
    }
}

/// A registered message device owning one pooled record.
///
/// Callers interact through [`open`](Self::open), [`read`](Self::read),
/// [`write`](Self::write) and [`close`](Self::close). Call
/// [`shutdown`](Self::shutdown) to tear the device down and observe errors;
/// dropping it performs the same teardown and logs them instead.
pub struct Device {
    id: DeviceId,
    name: String,
    registry: Arc<dyn Registry>,
    /// `None` once torn down.
    pool: Option<ObjectPool>,
    channel: MessageChannel,
}

impl Device {
    /// Creates a device with default settings.
    ///
    /// This is equivalent to `DeviceBuilder::new().build()`.
    ///
    /// # Errors
    ///
    /// See [`DeviceBuilder::build`].
    pub fn new() -> Result<Self> {
        DeviceBuilder::new().build()
    }

    /// Identifier assigned by the registry.
    #[must_use]
    pub const fn id(&self) -> DeviceId {
        self.id
    }

    /// Registered name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// State of the message channel.
    #[must_use]
    pub fn state(&self) -> ChannelState {
        self.channel.state()
    }

    /// The underlying channel.
    #[must_use]
    pub const fn channel(&self) -> &MessageChannel {
        &self.channel
    }

    /// Counters of the record pool.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChannelClosed`] once the device is torn down.
    pub fn pool_stats(&self) -> Result<PoolStats> {
        Ok(self.pool()?.stats())
    }

    /// Starts a session. See [`MessageChannel::open`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChannelClosed`] after [`close`](Self::close).
    pub fn open(&self) -> Result<()> {
        self.channel.open()
    }

    /// Copies the stored message into `buf`. See [`MessageChannel::read`].
    ///
    /// # Errors
    ///
    /// [`Error::ChannelClosed`] or [`Error::TransferFault`].
    pub fn read(&self, buf: &mut [u8]) -> Result<ReadReport> {
        self.channel.read(buf)
    }

    /// Replaces the stored message. See [`MessageChannel::write`].
    ///
    /// # Errors
    ///
    /// [`Error::ChannelClosed`], [`Error::BufferOverflow`] or [`Error::TransferFault`].
    pub fn write(&self, buf: &[u8]) -> Result<usize> {
        self.channel.write(buf)
    }

    /// Closes the channel and releases the record to the pool.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChannelClosed`] if already closed.
    pub fn close(&self) -> Result<()> {
        self.channel.close(self.pool()?)
    }

    /// Tears the device down: release record, destroy pool, unregister.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PoolMisuse`] if the pool still had outstanding records.
    /// The device is unregistered regardless.
    pub fn shutdown(mut self) -> Result<()> {
        self.teardown()
    }

    fn pool(&self) -> Result<&ObjectPool> {
        self.pool.as_ref().ok_or(Error::ChannelClosed)
    }

    fn teardown(&mut self) -> Result<()> {
        let Some(pool) = self.pool.take() else {
            return Ok(());
        };
        info!(device = %self.name, id = %self.id, "tearing down device");

        match self.channel.close(&pool) {
            Ok(()) | Err(Error::ChannelClosed) => {}
            Err(e) => error!(device = %self.name, error = %e, "failed to release record"),
        }

        let destroyed = pool.destroy().map_err(|e| {
            error!(device = %self.name, error = %e, "failed to destroy record pool");
            Error::from(e)
        });

        self.registry.unregister(self.id);
        info!(device = %self.name, "goodbye");
        destroyed
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        if let Err(e) = self.teardown() {
            error!(device = %self.name, error = %e, "teardown on drop failed");
        }
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("pool", &self.pool)
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::TrackingAllocator;

    struct FailingAllocator;

    impl Allocator for FailingAllocator {
        fn allocate(&self, _size: usize) -> Result<*mut u8> {
            Err(Error::allocation("injected failure"))
        }

        unsafe fn deallocate(&self, _ptr: *mut u8, _size: usize) {}
    }

    #[test]
    fn test_default_device() {
        let device = Device::new().unwrap();
        assert_eq!(device.name(), DEFAULT_DEVICE_NAME);
        assert_eq!(device.state(), ChannelState::Ready);

        let mut buf = [0u8; 64];
        let report = device.read(&mut buf).unwrap();
        assert_eq!(&buf[..report.transferred], DEFAULT_GREETING.as_bytes());

        let stats = device.pool_stats().unwrap();
        assert_eq!(stats.record_size, MESSAGE_CAPACITY);
        assert_eq!(stats.outstanding, 1);
    }

    #[test]
    fn test_shutdown_releases_everything() {
        let registry = Arc::new(LocalRegistry::new());
        let tracking = TrackingAllocator::new(DefaultAllocator::new());
        let counter = tracking.counter();

        let device = DeviceBuilder::new()
            .registry(registry.clone())
            .allocator(Box::new(tracking))
            .build()
            .unwrap();
        assert_eq!(registry.lookup(device.id()).as_deref(), Some(DEFAULT_DEVICE_NAME));
        assert_eq!(counter.live(), 1);

        device.shutdown().unwrap();
        assert!(registry.is_empty());
        assert_eq!(counter.live(), 0);
    }

    #[test]
    fn test_shutdown_after_close() {
        let device = Device::new().unwrap();
        device.close().unwrap();
        assert!(matches!(device.close(), Err(Error::ChannelClosed)));
        assert_eq!(device.pool_stats().unwrap().outstanding, 0);
        device.shutdown().unwrap();
    }

    #[test]
    fn test_drop_tears_down() {
        let registry = Arc::new(LocalRegistry::new());
        let device = DeviceBuilder::new()
            .registry(registry.clone())
            .build()
            .unwrap();
        assert_eq!(registry.len(), 1);

        drop(device);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_registration_failure() {
        let registry = Arc::new(LocalRegistry::new());
        let _first = DeviceBuilder::new()
            .registry(registry.clone())
            .build()
            .unwrap();

        let second = DeviceBuilder::new().registry(registry.clone()).build();
        assert!(matches!(second, Err(Error::Registration { .. })));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_allocation_failure_unwinds_registration() {
        let registry = Arc::new(LocalRegistry::new());
        let result = DeviceBuilder::new()
            .registry(registry.clone())
            .allocator(Box::new(FailingAllocator))
            .build();

        assert!(matches!(result, Err(Error::AllocationFailure { .. })));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_oversized_greeting_unwinds_everything() {
        let registry = Arc::new(LocalRegistry::new());
        let tracking = TrackingAllocator::new(DefaultAllocator::new());
        let counter = tracking.counter();

        let result = DeviceBuilder::new()
            .registry(registry.clone())
            .allocator(Box::new(tracking))
            .record_size(8)
            .greeting("far too long for eight bytes")
            .build();

        assert!(matches!(result, Err(Error::BufferOverflow { max: 7, .. })));
        assert!(registry.is_empty());
        assert_eq!(counter.live(), 0);
    }

    #[test]
    fn test_zero_record_size_rejected() {
        let registry = Arc::new(LocalRegistry::new());
        let result = DeviceBuilder::new()
            .registry(registry.clone())
            .record_size(0)
            .build();

        assert!(matches!(result, Err(Error::InvalidArgument { .. })));
        assert!(registry.is_empty());
    }
}
