// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

//! Wire formats for IPMI messaging between an IPMC and its shelf manager.

pub mod command;
pub mod fields;
pub mod message;

use thiserror::Error;

/// The maximum number of data bytes in a single IPMB message.
///
/// An IPMB transaction is limited to 32 bytes on the I2C bus, of which 5 are
/// header bytes shared by every message.
pub const MAX_DATA_LEN: usize = 27;

/// The minimum length of a non-broadcast IPMB frame: the two address bytes,
/// the NetFn/LUN and seq/LUN bytes, the command, and both checksums.
pub const MIN_FRAME_LEN: usize = 7;

#[derive(Clone, Copy, Debug, Error, Eq, PartialEq)]
pub enum Error {
    /// The frame is shorter than the smallest legal IPMB message.
    #[error("IPMB frame too short ({0} bytes)")]
    FrameTooShort(usize),

    /// The two-byte connection header failed its checksum.
    #[error("IPMB header checksum mismatch")]
    HeaderChecksum,

    /// The full frame failed its trailing checksum.
    #[error("IPMB message checksum mismatch")]
    MessageChecksum,

    /// An attempt to build a message with more data than a frame can carry.
    #[error("IPMB messages carry at most {MAX_DATA_LEN} data bytes, not {0}")]
    DataTooLong(usize),

    /// The output buffer cannot hold the serialized frame.
    #[error("output buffer too small ({available} bytes for a {needed} byte frame)")]
    BufferTooSmall { needed: usize, available: usize },
}

/// Compute the IPMI two's-complement checksum of a byte slice.
///
/// The sum of `bytes` and the returned checksum is zero, mod 256. This is the
/// algorithm used for both the IPMB connection-header checksum and the
/// full-message checksum. It is order-agnostic.
pub fn checksum(bytes: &[u8]) -> u8 {
    let sum = bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    (!sum).wrapping_add(1)
}

#[cfg(test)]
mod tests {
    use super::checksum;

    #[test]
    fn test_checksum_zeroes_the_sum() {
        for data in [&[0x20u8, 0x06 << 2][..], &[0xff, 0x01, 0x80], &[]] {
            let ck = checksum(data);
            let total = data.iter().fold(ck, |acc, b| acc.wrapping_add(*b));
            assert_eq!(total, 0);
        }
    }

    #[test]
    fn test_checksum_is_order_agnostic() {
        assert_eq!(checksum(&[0x20, 0x06]), checksum(&[0x06, 0x20]));
    }
}
