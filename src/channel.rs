//! Single-slot message channel over one pooled record.
//!
//! A [`MessageChannel`] owns exactly one [`Record`] and stores a bounded,
//! terminator-ended message in it. Reads copy the message out without
//! changing it, writes replace it, and [`close`](MessageChannel::close) gives
//! the record back to its pool.
//!
//! ```text
//!  (no channel) ──new()──▶ Ready ──close()──▶ Closed
//!                          │  ▲
//!                          └──┘ open / read / write / clear
//! ```
//!
//! Every operation is serialized on one mutex. Caller memory is only touched
//! through the [`Transfer`] collaborator, and never while the mutex is held.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::pool::ObjectPool;
use crate::record::Record;
use crate::transfer::Transfer;

/// Record size of the message device, terminator included.
pub const MESSAGE_CAPACITY: usize = 255;

/// Message seeded into a fresh channel by default.
pub const DEFAULT_GREETING: &str = "Initial message";

/// Observable state of a [`MessageChannel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Record owned; read and write are legal.
    Ready,
    /// Record released; terminal.
    Closed,
}

/// Outcome of a successful [`MessageChannel::read`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadReport {
    /// Bytes copied into the caller's buffer.
    pub transferred: usize,
    /// Length of the stored message, unaffected by the read.
    pub message_len: usize,
}

impl ReadReport {
    /// Returns `true` if the caller's buffer was too small for the whole message.
    #[must_use]
    pub const fn is_truncated(&self) -> bool {
        self.transferred < self.message_len
    }
}

enum Slot {
    Ready { record: Record, len: usize },
    Closed,
}

/// Stateful endpoint binding one pooled record to the open/read/write/close protocol.
pub struct MessageChannel {
    name: String,
    capacity: usize,
    slot: Mutex<Slot>,
    transfer: Arc<dyn Transfer>,
    sessions: AtomicU64,
}

impl MessageChannel {
    /// Takes ownership of `record` and seeds it with `greeting`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BufferOverflow`] if the greeting plus its terminator
    /// does not fit in the record. The record is then dropped back to its pool.
    pub fn new(
        name: impl Into<String>,
        mut record: Record,
        greeting: &[u8],
        transfer: Arc<dyn Transfer>,
    ) -> Result<Self> {
        let capacity = record.len();
        if greeting.len() >= capacity {
            return Err(Error::BufferOverflow {
                len: greeting.len(),
                max: capacity.saturating_sub(1),
            });
        }

        record[..greeting.len()].copy_from_slice(greeting);
        record[greeting.len()] = 0;

        Ok(Self {
            name: name.into(),
            capacity,
            slot: Mutex::new(Slot::Ready {
                record,
                len: greeting.len(),
            }),
            transfer,
            sessions: AtomicU64::new(0),
        })
    }

    /// Record size in bytes, terminator included.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Longest message a write accepts.
    #[must_use]
    pub const fn max_message_len(&self) -> usize {
        self.capacity - 1
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ChannelState {
        match &*self.slot.lock() {
            Slot::Ready { .. } => ChannelState::Ready,
            Slot::Closed => ChannelState::Closed,
        }
    }

    /// Number of sessions opened so far.
    #[must_use]
    pub fn sessions(&self) -> u64 {
        self.sessions.load(Ordering::Relaxed)
    }

    /// Starts a usage session. Does not touch the message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChannelClosed`] after [`close`](Self::close).
    pub fn open(&self) -> Result<()> {
        self.ensure_ready()?;
        let session = self.sessions.fetch_add(1, Ordering::Relaxed) + 1;
        info!(device = %self.name, session, "device has been opened");
        Ok(())
    }

    /// Copies the stored message into `dest`, up to `dest.len()` bytes.
    ///
    /// The stored message and its length are left as they were.
    ///
    /// # Errors
    ///
    /// - [`Error::ChannelClosed`] after [`close`](Self::close)
    /// - [`Error::TransferFault`] if the copy to `dest` fails
    pub fn read(&self, dest: &mut [u8]) -> Result<ReadReport> {
        let (staged, message_len) = {
            let slot = self.slot.lock();
            let Slot::Ready { record, len } = &*slot else {
                return Err(Error::ChannelClosed);
            };
            let n = (*len).min(dest.len());
            (record[..n].to_vec(), *len)
        };

        let requested = staged.len();
        let moved = self
            .transfer
            .transfer_out(&mut dest[..requested], &staged)
            .map_err(|e| as_fault(e, requested))
            .and_then(|moved| check_moved(requested, moved))
            .inspect_err(|e| {
                warn!(
                    device = %self.name,
                    requested,
                    error = %e,
                    "failed to send message to the caller"
                );
            })?;

        debug!(device = %self.name, bytes = moved, message_len, "sent message to the caller");
        Ok(ReadReport {
            transferred: moved,
            message_len,
        })
    }

    /// Replaces the stored message with `src` and returns the bytes accepted.
    ///
    /// # Errors
    ///
    /// - [`Error::ChannelClosed`] after [`close`](Self::close)
    /// - [`Error::BufferOverflow`] if `src` leaves no room for the terminator
    /// - [`Error::TransferFault`] if the copy from `src` fails
    ///
    /// On any error the stored message is unchanged.
    pub fn write(&self, src: &[u8]) -> Result<usize> {
        self.ensure_ready()?;

        let max = self.max_message_len();
        if src.len() > max {
            warn!(device = %self.name, len = src.len(), max, "write exceeds message capacity");
            return Err(Error::BufferOverflow {
                len: src.len(),
                max,
            });
        }

        let requested = src.len();
        let mut staged = vec![0u8; requested];
        self.transfer
            .transfer_in(&mut staged, src)
            .map_err(|e| as_fault(e, requested))
            .and_then(|moved| check_moved(requested, moved))
            .inspect_err(|e| {
                warn!(
                    device = %self.name,
                    requested,
                    error = %e,
                    "failed to receive message from the caller"
                );
            })?;

        let mut slot = self.slot.lock();
        let Slot::Ready { record, len } = &mut *slot else {
            return Err(Error::ChannelClosed);
        };
        record[..requested].copy_from_slice(&staged);
        record[requested] = 0;
        *len = requested;

        debug!(
            device = %self.name,
            bytes = requested,
            message = %String::from_utf8_lossy(&record[..requested]),
            "received message from the caller"
        );
        Ok(requested)
    }

    /// Truncates the stored message to empty.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChannelClosed`] after [`close`](Self::close).
    pub fn clear(&self) -> Result<()> {
        let mut slot = self.slot.lock();
        let Slot::Ready { record, len } = &mut *slot else {
            return Err(Error::ChannelClosed);
        };
        record[0] = 0;
        *len = 0;
        Ok(())
    }

    /// Returns a copy of the stored message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChannelClosed`] after [`close`](Self::close).
    pub fn snapshot(&self) -> Result<Vec<u8>> {
        match &*self.slot.lock() {
            Slot::Ready { record, len } => Ok(record[..*len].to_vec()),
            Slot::Closed => Err(Error::ChannelClosed),
        }
    }

    /// Closes the channel and releases its record to `pool`.
    ///
    /// # Errors
    ///
    /// - [`Error::ChannelClosed`] if already closed
    /// - [`Error::PoolMisuse`] if `pool` did not produce the record; the
    ///   channel is closed regardless
    pub fn close(&self, pool: &ObjectPool) -> Result<()> {
        let previous = std::mem::replace(&mut *self.slot.lock(), Slot::Closed);
        let Slot::Ready { record, .. } = previous else {
            return Err(Error::ChannelClosed);
        };

        info!(device = %self.name, pool = %pool.name(), "channel closed, releasing record");
        pool.release(record)
    }

    fn ensure_ready(&self) -> Result<()> {
        match self.state() {
            ChannelState::Ready => Ok(()),
            ChannelState::Closed => Err(Error::ChannelClosed),
        }
    }
}

impl fmt::Debug for MessageChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageChannel")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("state", &self.state())
            .field("sessions", &self.sessions())
            .finish_non_exhaustive()
    }
}

/// Collapses any collaborator error into a transfer fault.
fn as_fault(err: Error, requested: usize) -> Error {
    match err {
        Error::TransferFault { .. } => err,
        _ => Error::transfer_fault(requested, 0),
    }
}

fn check_moved(requested: usize, moved: usize) -> Result<usize> {
    if moved == requested {
        Ok(moved)
    } else {
        Err(Error::transfer_fault(requested, moved))
    }
}
