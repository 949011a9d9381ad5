// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

//! Runtime sensor state shared by every sensor implementation.

use slog::info;
use slog::Logger;
use std::sync::Arc;
use std::sync::Mutex;

/// Whether a sensor event reports a state being entered or left.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EventDirection {
    Assertion,
    Deassertion,
}

/// The delivery path for IPMI sensor events.
///
/// Sensors know their SDR key and their event data; the service layer owns
/// the event receiver address and the Platform Event message construction.
/// Implementations must not call back into the emitting sensor.
pub trait EventSink: Send + Sync {
    fn emit_event(&self, direction: EventDirection, sensor_key: &[u8], event_data: &[u8]);
}

// Event-enable masks are fifteen bits wide in the IPMI event commands.
const EVENT_MASK: u16 = 0x7fff;

#[derive(Debug)]
struct Runtime {
    all_events_disabled: bool,
    scanning_disabled: bool,
    assertion_events_enabled: u16,
    deassertion_events_enabled: u16,
}

/// State common to all sensors: identity, event routing, and the runtime
/// enables managed by the IPMI sensor commands.
pub struct Sensor {
    sdr_key: Vec<u8>,
    log: Logger,
    events: Arc<dyn EventSink>,
    runtime: Mutex<Runtime>,
}

impl Sensor {
    /// Create the common state for a sensor identified by `sdr_key` in the
    /// device SDR repository.
    pub fn new(sdr_key: Vec<u8>, events: Arc<dyn EventSink>, log: Logger) -> Self {
        Self {
            sdr_key,
            log,
            events,
            runtime: Mutex::new(Runtime {
                all_events_disabled: false,
                scanning_disabled: false,
                // All bits set distinguishes "never configured" from an
                // explicit empty mask.
                assertion_events_enabled: 0xffff,
                deassertion_events_enabled: 0xffff,
            }),
        }
    }

    /// The SDR key bytes identifying this sensor.
    pub fn sdr_key(&self) -> &[u8] {
        &self.sdr_key
    }

    /// Deliver an event for this sensor, unless its events are disabled.
    pub fn send_event(&self, direction: EventDirection, event_data: &[u8]) {
        if self.all_events_disabled() {
            info!(
                self.log,
                "discarding event, all events disabled on this sensor";
                "sensor" => format!("{:02x?}", self.sdr_key),
            );
            return;
        }
        self.events.emit_event(direction, &self.sdr_key, event_data);
    }

    pub fn all_events_disabled(&self) -> bool {
        self.runtime.lock().unwrap().all_events_disabled
    }

    pub fn set_all_events_disabled(&self, disabled: bool) {
        self.runtime.lock().unwrap().all_events_disabled = disabled;
    }

    pub fn scanning_disabled(&self) -> bool {
        self.runtime.lock().unwrap().scanning_disabled
    }

    pub fn set_scanning_disabled(&self, disabled: bool) {
        self.runtime.lock().unwrap().scanning_disabled = disabled;
    }

    pub fn assertion_events_enabled(&self) -> u16 {
        self.runtime.lock().unwrap().assertion_events_enabled & EVENT_MASK
    }

    pub fn set_assertion_events_enabled(&self, events: u16) {
        self.runtime.lock().unwrap().assertion_events_enabled = events & EVENT_MASK;
    }

    pub fn deassertion_events_enabled(&self) -> u16 {
        self.runtime.lock().unwrap().deassertion_events_enabled & EVENT_MASK
    }

    pub fn set_deassertion_events_enabled(&self, events: u16) {
        self.runtime.lock().unwrap().deassertion_events_enabled = events & EVENT_MASK;
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::test_log;
    use super::test_support::RecordingSink;
    use super::EventDirection;
    use super::Sensor;
    use std::sync::Arc;

    #[test]
    fn test_event_delivery_and_disable() {
        let sink = Arc::new(RecordingSink::default());
        let sensor = Sensor::new(vec![0x82, 0x00, 0x05], Arc::clone(&sink) as _, test_log());

        sensor.send_event(EventDirection::Assertion, &[0xa1, 0x02, 0x00]);
        {
            let events = sink.events.lock().unwrap();
            assert_eq!(events.len(), 1);
            let (direction, key, data) = &events[0];
            assert_eq!(*direction, EventDirection::Assertion);
            assert_eq!(key, &[0x82, 0x00, 0x05]);
            assert_eq!(data, &[0xa1, 0x02, 0x00]);
        }

        sensor.set_all_events_disabled(true);
        sensor.send_event(EventDirection::Assertion, &[0xa2, 0x12, 0x00]);
        assert_eq!(sink.events.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_event_masks_are_fifteen_bits() {
        let sensor = Sensor::new(
            vec![0x82, 0x00, 0x05],
            Arc::new(RecordingSink::default()),
            test_log(),
        );
        // Unconfigured masks read back as all events enabled.
        assert_eq!(sensor.assertion_events_enabled(), 0x7fff);
        sensor.set_assertion_events_enabled(0xffff);
        assert_eq!(sensor.assertion_events_enabled(), 0x7fff);
        sensor.set_deassertion_events_enabled(0x0123);
        assert_eq!(sensor.deassertion_events_enabled(), 0x0123);
    }
}
