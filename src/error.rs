//! Error types for pool, channel and device operations.

/// Result type alias for this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Every failure a pool, channel or device operation can report.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The backing allocator could not produce memory, or the pool hit its
    /// record limit.
    #[error("allocation failure: {reason}")]
    AllocationFailure {
        /// What went wrong.
        reason: String,
    },

    /// A write did not fit into the record, terminator included.
    #[error("buffer overflow: {len} bytes exceeds the {max} byte message limit")]
    BufferOverflow {
        /// Length the caller tried to write.
        len: usize,
        /// Longest message the record can hold.
        max: usize,
    },

    /// The transfer collaborator failed to move every requested byte.
    #[error("transfer fault: {uncopied} of {requested} bytes not copied")]
    TransferFault {
        /// Bytes the caller asked to move.
        requested: usize,
        /// Bytes left behind.
        uncopied: usize,
    },

    /// The channel has released its record.
    #[error("channel is closed")]
    ChannelClosed,

    /// A record was handed to a pool that did not produce it, or a pool was
    /// torn down while records were still out.
    #[error("pool misuse: {message}")]
    PoolMisuse {
        /// Description of the violated contract.
        message: String,
    },

    /// Invalid parameter passed to a constructor or builder.
    #[error("invalid argument `{parameter}`: {message}")]
    InvalidArgument {
        /// Name of the offending parameter.
        parameter: &'static str,
        /// Why it was rejected.
        message: String,
    },

    /// The host registry refused the device name.
    #[error("registration of `{name}` failed: {reason}")]
    Registration {
        /// Device name that was being registered.
        name: String,
        /// Reason reported by the registry.
        reason: String,
    },
}

impl Error {
    /// Create an allocation failure.
    pub fn allocation(reason: impl Into<String>) -> Self {
        Self::AllocationFailure {
            reason: reason.into(),
        }
    }

    /// Create a pool misuse error.
    pub fn pool_misuse(message: impl Into<String>) -> Self {
        Self::PoolMisuse {
            message: message.into(),
        }
    }

    /// Create an invalid argument error.
    pub fn invalid_argument(parameter: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            parameter,
            message: message.into(),
        }
    }

    /// Create a registration error.
    pub fn registration(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Registration {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create a transfer fault for a short copy.
    #[must_use]
    pub const fn transfer_fault(requested: usize, copied: usize) -> Self {
        Self::TransferFault {
            requested,
            uncopied: requested.saturating_sub(copied),
        }
    }
}
