//! End-to-end scenarios for the message device and its record pool.

use std::sync::Arc;

use proptest::prelude::*;
use slabdev::{
    ChannelState, DefaultAllocator, Device, DeviceBuilder, Error, LocalRegistry, MESSAGE_CAPACITY,
    ObjectPoolBuilder, TrackingAllocator,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

#[test]
fn open_write_read_close() {
    init_tracing();
    let device = Device::new().unwrap();

    device.open().unwrap();
    assert_eq!(device.write(b"hello").unwrap(), 5);

    let mut buf = [0u8; 10];
    let report = device.read(&mut buf).unwrap();
    assert_eq!(report.transferred, 5);
    assert_eq!(&buf[..5], b"hello");

    device.close().unwrap();
    assert_eq!(device.state(), ChannelState::Closed);
    assert!(matches!(device.read(&mut buf), Err(Error::ChannelClosed)));
    assert!(matches!(device.write(b"again"), Err(Error::ChannelClosed)));
    assert!(matches!(device.close(), Err(Error::ChannelClosed)));

    device.shutdown().unwrap();
}

#[test]
fn overflow_is_rejected_and_message_kept() {
    init_tracing();
    let device = Device::new().unwrap();
    device.write(b"survivor").unwrap();

    for len in [MESSAGE_CAPACITY, MESSAGE_CAPACITY + 1, 4096] {
        let data = vec![b'z'; len];
        assert!(matches!(
            device.write(&data),
            Err(Error::BufferOverflow { .. })
        ));
    }

    assert_eq!(device.channel().snapshot().unwrap(), b"survivor");
}

#[test]
fn allocate_release_destroy_leaves_no_allocations() {
    init_tracing();
    let tracking = TrackingAllocator::new(DefaultAllocator::new());
    let counter = tracking.counter();
    let pool = ObjectPoolBuilder::new("Slab Alloc cache", MESSAGE_CAPACITY)
        .allocator(Box::new(tracking))
        .build()
        .unwrap();

    let record = pool.allocate().unwrap();
    pool.release(record).unwrap();
    pool.destroy().unwrap();

    assert_eq!(counter.live(), 0);
}

#[test]
fn destroy_with_held_record_is_rejected() {
    init_tracing();
    let pool = ObjectPoolBuilder::new("Slab Alloc cache", MESSAGE_CAPACITY)
        .build()
        .unwrap();
    let mut record = pool.allocate().unwrap();

    let err = pool.destroy().unwrap_err();
    assert_eq!(err.outstanding(), 1);

    // The record is still intact and the pool still works.
    record[0] = b'x';
    let pool = err.into_pool();
    assert_eq!(pool.stats().outstanding, 1);
    pool.release(record).unwrap();
    pool.destroy().unwrap();
}

#[test]
fn concurrent_writers_leave_one_whole_message() {
    init_tracing();
    let device = Arc::new(Device::new().unwrap());

    let writers: Vec<_> = [b"AAA".as_slice(), b"BB".as_slice()]
        .into_iter()
        .map(|msg| {
            let device = Arc::clone(&device);
            std::thread::spawn(move || {
                for _ in 0..500 {
                    device.write(msg).unwrap();
                }
            })
        })
        .collect();
    for writer in writers {
        writer.join().unwrap();
    }

    let last = device.channel().snapshot().unwrap();
    assert!(last == b"AAA" || last == b"BB", "mixed message: {last:?}");
}

#[test]
fn shared_registry_across_devices() {
    init_tracing();
    let registry = Arc::new(LocalRegistry::new());

    let first = DeviceBuilder::new()
        .name("first")
        .registry(registry.clone())
        .build()
        .unwrap();
    let second = DeviceBuilder::new()
        .name("second")
        .registry(registry.clone())
        .build()
        .unwrap();

    assert_ne!(first.id(), second.id());
    assert_eq!(registry.len(), 2);

    first.shutdown().unwrap();
    assert_eq!(registry.lookup(second.id()).as_deref(), Some("second"));
    drop(second);
    assert!(registry.is_empty());
}

proptest! {
    #[test]
    fn write_then_read_round_trips(
        message in proptest::collection::vec(any::<u8>(), 0..MESSAGE_CAPACITY)
    ) {
        let device = Device::new().unwrap();

        prop_assert_eq!(device.write(&message).unwrap(), message.len());

        let mut buf = [0u8; MESSAGE_CAPACITY];
        let report = device.read(&mut buf).unwrap();
        prop_assert_eq!(report.transferred, message.len());
        prop_assert_eq!(report.message_len, message.len());
        prop_assert_eq!(&buf[..report.transferred], message.as_slice());

        // A second read sees the same message.
        let again = device.read(&mut buf).unwrap();
        prop_assert_eq!(again, report);
    }
}
