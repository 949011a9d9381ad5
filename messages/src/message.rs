// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

//! The IPMB message frame and its codec.

use crate::checksum;
use crate::command;
use crate::command::CompletionCode;
use crate::Error;
use crate::MAX_DATA_LEN;
use crate::MIN_FRAME_LEN;
use std::fmt;

/// A single IPMI message, as carried on an IPMB.
///
/// The wire layout is fixed by the IPMB specification:
///
/// ```text
/// byte 0:  rsSA
/// byte 1:  [7:2] = netFn, [1:0] = rsLUN
/// byte 2:  connection header checksum (bytes 0..2 sum to zero)
/// byte 3:  rqSA
/// byte 4:  [7:2] = rqSeq, [1:0] = rqLUN
/// byte 5:  cmd
/// byte 6+: data (up to [`MAX_DATA_LEN`] bytes)
/// last:    message checksum (all bytes sum to zero)
/// ```
///
/// A broadcast frame carries the broadcast slave address (`0x00`) in byte 0
/// instead of a specific responder; the responder substitutes its own address
/// when parsing. The `broadcast` and `duplicate` flags are bookkeeping for the
/// receive path and are not themselves wire-encoded.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct IpmiMessage {
    /// Responder slave address.
    pub rs_sa: u8,
    /// Network function (6 bits; bit 0 marks a response).
    pub net_fn: u8,
    /// Responder logical unit (2 bits).
    pub rs_lun: u8,
    /// Requester slave address.
    pub rq_sa: u8,
    /// Requester sequence number (6 bits).
    pub rq_seq: u8,
    /// Requester logical unit (2 bits).
    pub rq_lun: u8,
    /// Command code, interpreted within `net_fn`.
    pub cmd: u8,
    /// Set when the frame arrived on the broadcast slave address.
    pub broadcast: bool,
    /// Set by the receive path when this request repeats a recently seen
    /// sequence number. Deduplication policy belongs to the service layer;
    /// the codec only carries the mark.
    pub duplicate: bool,
    data: [u8; MAX_DATA_LEN],
    data_len: usize,
}

impl Default for IpmiMessage {
    fn default() -> Self {
        Self {
            rs_sa: 0,
            net_fn: 0,
            rs_lun: 0,
            rq_sa: 0,
            rq_seq: 0,
            rq_lun: 0,
            cmd: 0,
            broadcast: false,
            duplicate: false,
            data: [0; MAX_DATA_LEN],
            data_len: 0,
        }
    }
}

impl IpmiMessage {
    /// Construct a message from its addressing fields and data bytes.
    ///
    /// Fails if `data` exceeds [`MAX_DATA_LEN`].
    pub fn new(
        rs_sa: u8,
        rs_lun: u8,
        rq_sa: u8,
        rq_lun: u8,
        net_fn: u8,
        cmd: u8,
        data: &[u8],
    ) -> Result<Self, Error> {
        let mut out = Self {
            rs_sa,
            rs_lun: rs_lun & 0x03,
            rq_sa,
            rq_lun: rq_lun & 0x03,
            net_fn,
            cmd,
            ..Self::default()
        };
        out.set_data(data)?;
        Ok(out)
    }

    /// Parse a raw IPMB frame received at `local_address`.
    ///
    /// Both checksums are validated before any field is extracted; a frame
    /// that fails validation yields a typed error, never a partial message.
    pub fn parse(raw: &[u8], local_address: u8) -> Result<Self, Error> {
        if raw.len() < MIN_FRAME_LEN {
            return Err(Error::FrameTooShort(raw.len()));
        }
        let data_len = raw.len() - MIN_FRAME_LEN;
        if data_len > MAX_DATA_LEN {
            return Err(Error::DataTooLong(data_len));
        }
        if checksum(&raw[..3]) != 0 {
            return Err(Error::HeaderChecksum);
        }
        if checksum(raw) != 0 {
            return Err(Error::MessageChecksum);
        }

        // Byte 0 is the broadcast slave address for a broadcast frame, per
        // IPMI2 Figure 20-1. We are the responder either way.
        let broadcast = raw[0] == 0x00;
        let mut data = [0; MAX_DATA_LEN];
        data[..data_len].copy_from_slice(&raw[6..6 + data_len]);
        Ok(Self {
            rs_sa: if broadcast { local_address } else { raw[0] },
            net_fn: raw[1] >> 2,
            rs_lun: raw[1] & 0x03,
            rq_sa: raw[3],
            rq_seq: raw[4] >> 2,
            rq_lun: raw[4] & 0x03,
            cmd: raw[5],
            broadcast,
            duplicate: false,
            data,
            data_len,
        })
    }

    /// Serialize this message into `buf`, returning the number of bytes
    /// written.
    ///
    /// Both checksums are regenerated. Fails with
    /// [`Error::BufferTooSmall`] if `buf` cannot hold the frame.
    pub fn unparse(&self, buf: &mut [u8]) -> Result<usize, Error> {
        if self.data_len > MAX_DATA_LEN {
            return Err(Error::DataTooLong(self.data_len));
        }
        let needed = self.wire_length();
        if buf.len() < needed {
            return Err(Error::BufferTooSmall {
                needed,
                available: buf.len(),
            });
        }
        buf[0] = self.rs_sa;
        buf[1] = (self.net_fn << 2) | (self.rs_lun & 0x03);
        buf[2] = checksum(&buf[..2]);
        buf[3] = self.rq_sa;
        buf[4] = (self.rq_seq << 2) | (self.rq_lun & 0x03);
        buf[5] = self.cmd;
        buf[6..6 + self.data_len].copy_from_slice(&self.data[..self.data_len]);
        buf[needed - 1] = checksum(&buf[..needed - 1]);
        Ok(needed)
    }

    /// The length of this message's wire frame, in bytes.
    pub fn wire_length(&self) -> usize {
        MIN_FRAME_LEN + self.data_len
    }

    /// Begin a reply to this request.
    ///
    /// The requester and responder addressing swap roles; NetFn, command and
    /// sequence number are carried over unchanged. The data is left empty for
    /// the handler to fill, completion code first, per IPMI convention. The
    /// command table owns the request/response NetFn pairing.
    pub fn prepare_reply(&self) -> Self {
        Self {
            rs_sa: self.rq_sa,
            rs_lun: self.rq_lun,
            rq_sa: self.rs_sa,
            rq_lun: self.rs_lun,
            net_fn: self.net_fn,
            cmd: self.cmd,
            rq_seq: self.rq_seq,
            ..Self::default()
        }
    }

    /// True if `other` is the same request: identical addressing, sequence
    /// number, NetFn and command. Used to recognize retransmissions of a
    /// recently seen request.
    pub fn match_request(&self, other: &Self) -> bool {
        self.rq_sa == other.rq_sa
            && self.rs_sa == other.rs_sa
            && self.rq_lun == other.rq_lun
            && self.rs_lun == other.rs_lun
            && self.rq_seq == other.rq_seq
            && self.net_fn == other.net_fn
            && self.cmd == other.cmd
    }

    /// True if `response` is structurally the reply this request expects:
    /// swapped addressing, the paired NetFn, the same sequence number and
    /// command.
    pub fn match_reply(&self, response: &Self) -> bool {
        self.rq_sa == response.rs_sa
            && self.rs_sa == response.rq_sa
            && self.rq_lun == response.rs_lun
            && self.rs_lun == response.rq_lun
            && self.rq_seq == response.rq_seq
            && command::request_netfn(self.net_fn) == command::request_netfn(response.net_fn)
            && self.cmd == response.cmd
    }

    /// True if this message is a response (odd NetFn).
    pub fn is_response(&self) -> bool {
        self.net_fn & 0x01 != 0
    }

    /// The 16-bit command identifier `(request NetFn << 8) | cmd`, as used by
    /// the command table and the name registry.
    pub fn netcmd(&self) -> u16 {
        (u16::from(command::request_netfn(self.net_fn)) << 8) | u16::from(self.cmd)
    }

    /// The message data bytes.
    pub fn data(&self) -> &[u8] {
        &self.data[..self.data_len]
    }

    /// Replace the message data. Fails if `data` exceeds [`MAX_DATA_LEN`].
    pub fn set_data(&mut self, data: &[u8]) -> Result<(), Error> {
        if data.len() > MAX_DATA_LEN {
            return Err(Error::DataTooLong(data.len()));
        }
        self.data = [0; MAX_DATA_LEN];
        self.data[..data.len()].copy_from_slice(data);
        self.data_len = data.len();
        Ok(())
    }
}

impl fmt::Display for IpmiMessage {
    /// Render in the form used throughout the message logs:
    /// `rqLUN.rqSA -> rsLUN.rsSA: netFn.cmd (seq nn) [data] (name)`.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}.{:02x} -> {}{}.{:02x}: {:02x}.{:02x} (seq {:02x}) [",
            self.rq_lun,
            self.rq_sa,
            if self.broadcast { "*" } else { "" },
            self.rs_lun,
            self.rs_sa,
            self.net_fn,
            self.cmd,
            self.rq_seq,
        )?;
        for (i, byte) in self.data().iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{byte:02x}")?;
        }
        write!(f, "]")?;
        let name = command::describe(self.netcmd()).unwrap_or("Unknown Command");
        write!(f, " ({name}")?;
        if self.is_response() && self.data_len >= 1 {
            write!(f, "; {}", CompletionCode::from(self.data[0]))?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::IpmiMessage;
    use crate::Error;
    use crate::MAX_DATA_LEN;

    // The Get Device ID request frame from IPMI2 Figure 20-1, minus the
    // broadcast prefix: 0x10 asks 0x20 for App/0x01.
    fn get_device_id_frame() -> Vec<u8> {
        let msg = IpmiMessage::new(0x20, 0, 0x10, 0, 0x06, 0x01, &[]).unwrap();
        let mut buf = [0u8; 32];
        let len = msg.unparse(&mut buf).unwrap();
        buf[..len].to_vec()
    }

    #[test]
    fn test_parse_get_device_id() {
        let frame = get_device_id_frame();
        assert_eq!(frame.len(), 7);
        let msg = IpmiMessage::parse(&frame, 0x20).unwrap();
        assert_eq!(msg.net_fn, 0x06);
        assert_eq!(msg.cmd, 0x01);
        assert_eq!(msg.rs_sa, 0x20);
        assert_eq!(msg.rq_sa, 0x10);
        assert_eq!(msg.data().len(), 0);
        assert!(!msg.broadcast);
    }

    #[test]
    fn test_round_trip() {
        let msg =
            IpmiMessage::new(0x82, 1, 0x20, 0, 0x04, 0x2d, &[0x01, 0x02, 0xfe]).unwrap();
        let mut buf = [0u8; 32];
        let len = msg.unparse(&mut buf).unwrap();
        assert_eq!(len, msg.wire_length());
        let parsed = IpmiMessage::parse(&buf[..len], 0x82).unwrap();
        assert_eq!(parsed, msg);
    }

    #[test]
    fn test_parse_rejects_short_frames() {
        for len in 0..crate::MIN_FRAME_LEN {
            let frame = vec![0u8; len];
            assert_eq!(
                IpmiMessage::parse(&frame, 0x20).unwrap_err(),
                Error::FrameTooShort(len)
            );
        }
    }

    #[test]
    fn test_parse_rejects_corrupt_checksums() {
        let frame = get_device_id_frame();

        // Any single-bit flip in either checksum byte must be caught.
        for byte in [2, frame.len() - 1] {
            for bit in 0..8 {
                let mut corrupt = frame.clone();
                corrupt[byte] ^= 1 << bit;
                assert!(IpmiMessage::parse(&corrupt, 0x20).is_err());
            }
        }

        // Header corruption is reported as a header checksum failure.
        let mut corrupt = frame.clone();
        corrupt[2] ^= 0x01;
        assert_eq!(
            IpmiMessage::parse(&corrupt, 0x20).unwrap_err(),
            Error::HeaderChecksum
        );
    }

    #[test]
    fn test_parse_broadcast() {
        let msg = IpmiMessage::new(0x20, 0, 0x10, 0, 0x06, 0x01, &[]).unwrap();
        let mut buf = [0u8; 32];
        let len = msg.unparse(&mut buf).unwrap();

        // Rebuild the frame with the broadcast slave address in byte 0.
        buf[0] = 0x00;
        buf[2] = crate::checksum(&buf[..2]);
        buf[len - 1] = crate::checksum(&buf[..len - 1]);
        let parsed = IpmiMessage::parse(&buf[..len], 0x74).unwrap();
        assert!(parsed.broadcast);
        assert_eq!(parsed.rs_sa, 0x74);
    }

    #[test]
    fn test_data_bounds() {
        let too_long = [0u8; MAX_DATA_LEN + 1];
        assert_eq!(
            IpmiMessage::new(0x20, 0, 0x10, 0, 0x06, 0x01, &too_long).unwrap_err(),
            Error::DataTooLong(MAX_DATA_LEN + 1)
        );

        let msg = IpmiMessage::new(0x20, 0, 0x10, 0, 0x06, 0x01, &[0xaa; 4]).unwrap();
        let mut small = [0u8; 8];
        assert_eq!(
            msg.unparse(&mut small).unwrap_err(),
            Error::BufferTooSmall {
                needed: 11,
                available: 8
            }
        );
    }

    #[test]
    fn test_prepare_reply_swaps_addressing() {
        let req = IpmiMessage::new(0x20, 1, 0x10, 2, 0x06, 0x01, &[0x12]).unwrap();
        let reply = req.prepare_reply();
        assert_eq!(reply.rs_sa, req.rq_sa);
        assert_eq!(reply.rs_lun, req.rq_lun);
        assert_eq!(reply.rq_sa, req.rs_sa);
        assert_eq!(reply.rq_lun, req.rs_lun);
        assert_eq!(reply.net_fn, req.net_fn);
        assert_eq!(reply.cmd, req.cmd);
        assert_eq!(reply.rq_seq, req.rq_seq);
        assert_eq!(reply.data().len(), 0);
        assert!(req.match_reply(&reply));
    }

    #[test]
    fn test_match_request_distinguishes_sequence() {
        let a = IpmiMessage::new(0x20, 0, 0x10, 0, 0x06, 0x01, &[]).unwrap();
        let mut b = a;
        assert!(a.match_request(&b));
        b.rq_seq = a.rq_seq + 1;
        assert!(!a.match_request(&b));
    }

    #[test]
    fn test_match_reply_requires_pairing() {
        let req = IpmiMessage::new(0x20, 0, 0x10, 0, 0x06, 0x01, &[]).unwrap();
        let mut reply = req.prepare_reply();

        // The response NetFn (request | 1) still matches.
        reply.net_fn |= 0x01;
        assert!(req.match_reply(&reply));

        reply.rq_seq = req.rq_seq + 1;
        assert!(!req.match_reply(&reply));
    }

    #[test]
    fn test_display_includes_command_name() {
        let req = IpmiMessage::new(0x20, 0, 0x10, 0, 0x06, 0x01, &[]).unwrap();
        let rendered = format!("{req}");
        assert!(rendered.contains("Get Device ID"), "{rendered}");
    }
}
