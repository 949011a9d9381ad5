// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

//! Configuration of the IPMB service layer.

use std::time::Duration;

/// Return the default number of delivery attempts for an outgoing request
/// before the service gives up.
pub const fn default_max_retries() -> u32 {
    5
}

/// Return the default per-attempt transmit timeout handed through to the
/// physical links.
pub const fn default_send_timeout() -> Duration {
    Duration::from_millis(250)
}

/// Return the default interval after which a used sequence number may be
/// reused for the same target and command.
///
/// IPMB spec Table 4-1 specifies five seconds; one extra second covers
/// retransmits still in flight when the window closes.
pub const fn default_sequence_expiry() -> Duration {
    Duration::from_secs(6)
}

/// Return the default window within which a repeated incoming sequence number
/// marks a duplicate request, per IPMB spec Table 4-1.
pub const fn default_duplicate_window() -> Duration {
    Duration::from_secs(5)
}

/// Configuration for the IPMB service layer.
#[derive(Clone, Debug)]
pub struct Config {
    /// This controller's slave address on the IPMB.
    pub local_address: u8,

    /// Delivery attempts per outgoing request before reporting failure.
    pub max_retries: u32,

    /// Per-attempt transmit timeout passed through to the physical links.
    pub send_timeout: Duration,

    /// How long an outgoing sequence number stays reserved.
    pub sequence_expiry: Duration,

    /// How long an incoming sequence number marks repeats as duplicates.
    pub duplicate_window: Duration,
}

/// A builder for [`Config`] with defaults suitable for a shelf-resident
/// controller.
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    local_address: u8,
    max_retries: Option<u32>,
    send_timeout: Option<Duration>,
    sequence_expiry: Option<Duration>,
    duplicate_window: Option<Duration>,
}

impl ConfigBuilder {
    /// Create a new builder for a controller at the given IPMB address.
    pub fn new(local_address: u8) -> Self {
        Self {
            local_address,
            ..Default::default()
        }
    }

    /// Set the number of delivery attempts before failure.
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    /// Set the per-attempt transmit timeout.
    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = Some(timeout);
        self
    }

    /// Set the outgoing sequence-number reuse interval.
    pub fn sequence_expiry(mut self, expiry: Duration) -> Self {
        self.sequence_expiry = Some(expiry);
        self
    }

    /// Set the incoming duplicate-detection window.
    pub fn duplicate_window(mut self, window: Duration) -> Self {
        self.duplicate_window = Some(window);
        self
    }

    /// Build a `Config` from `self`.
    pub fn build(self) -> Config {
        Config {
            local_address: self.local_address,
            max_retries: self.max_retries.unwrap_or_else(default_max_retries),
            send_timeout: self.send_timeout.unwrap_or_else(default_send_timeout),
            sequence_expiry: self.sequence_expiry.unwrap_or_else(default_sequence_expiry),
            duplicate_window: self
                .duplicate_window
                .unwrap_or_else(default_duplicate_window),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ConfigBuilder;
    use std::time::Duration;

    #[test]
    fn test_config_builder_defaults() {
        let config = ConfigBuilder::new(0x82).build();
        assert_eq!(config.local_address, 0x82);
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.duplicate_window, Duration::from_secs(5));

        let config = ConfigBuilder::new(0x82)
            .max_retries(2)
            .send_timeout(Duration::from_millis(100))
            .build();
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.send_timeout, Duration::from_millis(100));
    }
}
