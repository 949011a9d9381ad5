// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

//! Routing across the redundant IPMB pair.
//!
//! The two physical IPMBs present as one logical bus. Each message-and-retry
//! combination hashes to a preferred link, so traffic spreads across both
//! buses and consecutive retries of one message alternate between them;
//! failover to the other link happens when the preferred one is disabled.

use crate::Error;
use ipmc_messages::message::IpmiMessage;
use slog::debug;
use slog::info;
use slog::Logger;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

/// One physical IPMB transmit path.
///
/// `send` blocks the calling thread until the transfer completes or
/// `timeout` elapses; there is no cancellation. The retry count is the
/// caller's attempt number for this message, passed through for link-level
/// diagnostics.
pub trait IpmbLink: Send + Sync {
    fn send(&self, message: &IpmiMessage, retry: u32, timeout: Duration) -> Result<(), Error>;
}

struct Link {
    link: Box<dyn IpmbLink>,
    enabled: AtomicBool,
}

/// A pair of physical IPMB links presented as a single logical bus.
pub struct IpmbRouter {
    log: Logger,
    links: [Link; 2],
}

impl IpmbRouter {
    /// Create a router over two physical links, both initially enabled.
    pub fn new(log: Logger, link_a: Box<dyn IpmbLink>, link_b: Box<dyn IpmbLink>) -> Self {
        Self {
            log,
            links: [
                Link {
                    link: link_a,
                    enabled: AtomicBool::new(true),
                },
                Link {
                    link: link_b,
                    enabled: AtomicBool::new(true),
                },
            ],
        }
    }

    /// Administratively enable or disable one link of the pair.
    ///
    /// The flag is read with relaxed ordering on the send path: toggling a
    /// link is rare reconfiguration, and an in-flight send may still observe
    /// the previous setting.
    pub fn set_enabled(&self, index: usize, enabled: bool) {
        self.links[index].enabled.store(enabled, Ordering::Relaxed);
        info!(
            self.log,
            "IPMB link state changed";
            "link" => index,
            "enabled" => enabled,
        );
    }

    pub fn is_enabled(&self, index: usize) -> bool {
        self.links[index].enabled.load(Ordering::Relaxed)
    }

    /// The preferred link for a given message and attempt number.
    ///
    /// A pure function of the message addressing fields and the retry count:
    /// unrelated messages spread evenly across both links, while incrementing
    /// the retry count by one flips the selection, so retries of a message
    /// that is failing on one bus alternate onto the other.
    pub fn select_link(message: &IpmiMessage, retry: u32) -> usize {
        let mut hash = 0u32;
        hash = hash.wrapping_add(u32::from(message.rs_sa));
        hash = hash.wrapping_add(u32::from(message.rs_lun));
        hash = hash.wrapping_add(u32::from(message.rq_sa));
        hash = hash.wrapping_add(u32::from(message.rq_lun));
        hash = hash.wrapping_add(u32::from(message.rq_seq));
        hash = hash.wrapping_add(u32::from(message.net_fn));
        hash = hash.wrapping_add(u32::from(message.cmd));
        hash = hash.wrapping_add(retry);
        (hash % 2) as usize
    }

    /// Transmit one attempt of `message` on the pair.
    ///
    /// The preferred link is tried if enabled, otherwise the other; if both
    /// are disabled the call fails without transmitting. A link-level send
    /// failure is returned as-is: the caller owns the retry loop and
    /// re-invokes with an incremented retry count, which moves the attempt to
    /// the other link.
    pub fn send(
        &self,
        message: &IpmiMessage,
        retry: u32,
        timeout: Duration,
    ) -> Result<(), Error> {
        let preferred = Self::select_link(message, retry);
        if self.is_enabled(preferred) {
            debug!(
                self.log,
                "dispatching message to preferred IPMB";
                "link" => preferred,
                "message" => %message,
            );
            return self.links[preferred].link.send(message, retry, timeout);
        }

        let secondary = 1 - preferred;
        if self.is_enabled(secondary) {
            debug!(
                self.log,
                "dispatching message to secondary IPMB";
                "link" => secondary,
                "message" => %message,
            );
            return self.links[secondary].link.send(message, retry, timeout);
        }

        info!(
            self.log,
            "unable to dispatch message, no IPMB enabled";
            "message" => %message,
        );
        Err(Error::NoLinkEnabled)
    }
}
