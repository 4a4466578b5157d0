//! Byte transfer across the caller's trust boundary.
//!
//! A channel never touches caller memory directly; every copy in or out goes
//! through a [`Transfer`] implementation. [`DirectTransfer`] is the in-process
//! implementation used when caller buffers are ordinary slices.

use crate::error::{Error, Result};

/// Moves bytes between caller buffers and a channel's record.
///
/// Both methods return the number of bytes moved. Anything short of
/// `src.len()` is treated by the channel as [`Error::TransferFault`].
pub trait Transfer: Send + Sync {
    /// Copies `src` (channel side) into `dest` (caller side).
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransferFault`] if the caller buffer cannot be written.
    fn transfer_out(&self, dest: &mut [u8], src: &[u8]) -> Result<usize>;

    /// Copies `src` (caller side) into `dest` (channel side).
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransferFault`] if the caller buffer cannot be read.
    fn transfer_in(&self, dest: &mut [u8], src: &[u8]) -> Result<usize>;
}

/// Plain memory copy between slices in the same address space.
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectTransfer;

impl DirectTransfer {
    fn copy(dest: &mut [u8], src: &[u8]) -> Result<usize> {
        if dest.len() < src.len() {
            return Err(Error::transfer_fault(src.len(), dest.len()));
        }
        dest[..src.len()].copy_from_slice(src);
        Ok(src.len())
    }
}

impl Transfer for DirectTransfer {
    fn transfer_out(&self, dest: &mut [u8], src: &[u8]) -> Result<usize> {
        Self::copy(dest, src)
    }

    fn transfer_in(&self, dest: &mut [u8], src: &[u8]) -> Result<usize> {
        Self::copy(dest, src)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_copy() {
        let mut dest = [0u8; 8];
        let n = DirectTransfer.transfer_out(&mut dest, b"hello").unwrap();
        assert_eq!(n, 5);
        assert_eq!(&dest[..5], b"hello");
        assert_eq!(dest[5], 0);

        let n = DirectTransfer.transfer_in(&mut dest, b"bye").unwrap();
        assert_eq!(n, 3);
        assert_eq!(&dest[..5], b"byelo");
    }

    #[test]
    fn test_direct_copy_short_destination() {
        let mut dest = [0u8; 2];
        let err = DirectTransfer.transfer_out(&mut dest, b"hello").unwrap_err();
        assert!(matches!(
            err,
            Error::TransferFault {
                requested: 5,
                uncopied: 3
            }
        ));
        assert_eq!(dest, [0, 0]);
    }
}
