// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

//! Sequence-number bookkeeping for the IPMB service layer.
//!
//! Outgoing requests draw a sequence number that is fresh for their (target,
//! NetFn, command) tuple; incoming requests repeating a recently seen
//! sequence number are flagged as duplicates. Both tables take the current
//! monotonic time from the caller rather than reading a clock, keeping them
//! independent of any timer service.

use ipmc_messages::message::IpmiMessage;
use std::collections::HashMap;
use std::time::Duration;

// The rqSeq field is six bits wide on the wire.
const MAX_SEQUENCE: u8 = 0x3f;

// Pack the identifying fields and a sequence number into one table key.
fn sequence_key(sa: u8, net_fn: u8, cmd: u8, seq: u8) -> u32 {
    (u32::from(sa) << 24) | (u32::from(net_fn) << 16) | (u32::from(cmd) << 8) | u32::from(seq)
}

/// Allocation of outgoing request sequence numbers.
///
/// The IPMB spec (Table 4-1) requires a sequence number not to repeat for the
/// same target and command within the expiration interval, so that responders
/// can use it for duplicate detection. Entries expire `reuse_delay` after
/// allocation; the delay should cover the five-second interval plus however
/// long retransmits of the request may continue.
#[derive(Debug)]
pub struct SequenceNumberTable {
    reuse_delay: Duration,
    used: HashMap<u32, Duration>,
}

impl SequenceNumberTable {
    pub fn new(reuse_delay: Duration) -> Self {
        Self {
            reuse_delay,
            used: HashMap::new(),
        }
    }

    /// Assign a fresh sequence number to an outgoing request, recording it as
    /// used at time `now`.
    ///
    /// Responses are passed through untouched: a reply carries the sequence
    /// number of the request it answers. Returns false if every sequence
    /// number for this (target, NetFn, command) tuple is in use, which only
    /// happens when the bus is being flooded with one command.
    pub fn assign(&mut self, message: &mut IpmiMessage, now: Duration) -> bool {
        if message.is_response() {
            return true;
        }

        self.expire(now);

        for seq in 1..=MAX_SEQUENCE {
            let key = sequence_key(message.rs_sa, message.net_fn, message.cmd, seq);
            if self.used.contains_key(&key) {
                continue;
            }
            self.used.insert(key, now);
            message.rq_seq = seq;
            return true;
        }
        false
    }

    fn expire(&mut self, now: Duration) {
        let reuse_delay = self.reuse_delay;
        self.used
            .retain(|_, used_at| now.saturating_sub(*used_at) < reuse_delay);
    }
}

/// Duplicate detection for incoming requests.
///
/// A request repeating the (requester, NetFn, command, sequence) of one seen
/// within the window is a retransmit. IPMI handling is expected to be largely
/// idempotent and every request needs some response, so duplicates are
/// delivered anyway, only marked.
#[derive(Debug)]
pub struct DuplicateTable {
    window: Duration,
    seen: HashMap<u32, Duration>,
}

impl DuplicateTable {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            seen: HashMap::new(),
        }
    }

    /// Record an incoming request at time `now` and report whether it
    /// repeats one seen within the window.
    pub fn check(&mut self, message: &IpmiMessage, now: Duration) -> bool {
        let window = self.window;
        self.seen
            .retain(|_, seen_at| now.saturating_sub(*seen_at) < window);

        let key = sequence_key(message.rq_sa, message.net_fn, message.cmd, message.rq_seq);
        let duplicate = self.seen.contains_key(&key);
        self.seen.insert(key, now);
        duplicate
    }
}

#[cfg(test)]
mod tests {
    use super::DuplicateTable;
    use super::SequenceNumberTable;
    use super::MAX_SEQUENCE;
    use ipmc_messages::message::IpmiMessage;
    use std::time::Duration;

    fn request() -> IpmiMessage {
        IpmiMessage::new(0x20, 0, 0x82, 0, 0x06, 0x01, &[]).unwrap()
    }

    #[test]
    fn test_assign_unique_until_exhausted() {
        let mut table = SequenceNumberTable::new(Duration::from_secs(6));
        let now = Duration::ZERO;
        let mut seen = std::collections::HashSet::new();
        for _ in 1..=MAX_SEQUENCE {
            let mut msg = request();
            assert!(table.assign(&mut msg, now));
            assert!(msg.rq_seq >= 1 && msg.rq_seq <= MAX_SEQUENCE);
            assert!(seen.insert(msg.rq_seq), "sequence {} reused", msg.rq_seq);
        }
        // All 63 numbers are now held for this (target, NetFn, cmd).
        let mut msg = request();
        assert!(!table.assign(&mut msg, now));

        // A different command still gets a number.
        let mut other = request();
        other.cmd = 0x04;
        assert!(table.assign(&mut other, now));
    }

    #[test]
    fn test_sequences_expire() {
        let mut table = SequenceNumberTable::new(Duration::from_secs(6));
        for _ in 1..=MAX_SEQUENCE {
            assert!(table.assign(&mut request(), Duration::ZERO));
        }
        assert!(!table.assign(&mut request(), Duration::from_secs(5)));
        assert!(table.assign(&mut request(), Duration::from_secs(6)));
    }

    #[test]
    fn test_responses_keep_their_sequence() {
        let mut table = SequenceNumberTable::new(Duration::from_secs(6));
        let mut reply = request();
        reply.net_fn |= 0x01;
        reply.rq_seq = 0x2a;
        assert!(table.assign(&mut reply, Duration::ZERO));
        assert_eq!(reply.rq_seq, 0x2a);
    }

    #[test]
    fn test_duplicate_detection_window() {
        let mut table = DuplicateTable::new(Duration::from_secs(5));
        let msg = request();

        assert!(!table.check(&msg, Duration::ZERO));
        assert!(table.check(&msg, Duration::from_secs(1)));

        // A different sequence number is not a duplicate.
        let mut other = msg;
        other.rq_seq = msg.rq_seq + 1;
        assert!(!table.check(&other, Duration::from_secs(1)));

        // Beyond the window the sequence number is fresh again. The repeat
        // at t=1 renewed the entry, so measure from there.
        assert!(!table.check(&msg, Duration::from_secs(7)));
    }
}
