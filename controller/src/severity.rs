// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

//! The severity sensor: a discrete sensor reporting OK / non-critical /
//! critical / non-recoverable health, with the IPMI "severity event states"
//! transition codes from IPMI2 Table 42-2.

use crate::sensor::EventDirection;
use crate::sensor::EventSink;
use crate::sensor::Sensor;
use ipmc_messages::command::CompletionCode;
use ipmc_messages::command::SensorStatus;
use slog::Logger;
use std::fmt;
use std::sync::Arc;
use std::sync::Mutex;

/// A severity level reported by platform health monitoring.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(test, derive(strum::EnumIter))]
pub enum Level {
    Ok,
    NonCritical,
    Critical,
    NonRecoverable,
    Monitor,
    Informational,
}

/// The severity event states of IPMI2 Table 42-2. The state carried by the
/// sensor encodes not just the current level but which direction it was
/// approached from.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StateTransition {
    /// 0: transition to OK.
    ToOk,
    /// 1: transition to Non-Critical from OK.
    NonCriticalFromOk,
    /// 2: transition to Critical from less severe.
    CriticalFromLess,
    /// 3: transition to Non-recoverable from less severe.
    NonRecoverableFromLess,
    /// 4: transition to Non-Critical from more severe.
    NonCriticalFromMore,
    /// 5: transition to Critical from Non-recoverable.
    CriticalFromNonRecoverable,
    /// 6: transition to Non-recoverable.
    NonRecoverable,
    /// 7: Monitor.
    Monitor,
    /// 8: Informational.
    Informational,
}

impl From<StateTransition> for u8 {
    fn from(transition: StateTransition) -> u8 {
        use StateTransition::*;
        match transition {
            ToOk => 0,
            NonCriticalFromOk => 1,
            CriticalFromLess => 2,
            NonRecoverableFromLess => 3,
            NonCriticalFromMore => 4,
            CriticalFromNonRecoverable => 5,
            NonRecoverable => 6,
            Monitor => 7,
            Informational => 8,
        }
    }
}

impl fmt::Display for StateTransition {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use StateTransition::*;
        let label = match self {
            ToOk => "transition to OK",
            NonCriticalFromOk => "transition to Non-Critical from OK",
            CriticalFromLess => "transition to Critical from less severe",
            NonRecoverableFromLess => "transition to Non-recoverable from less severe",
            NonCriticalFromMore => "transition to Non-Critical from more severe",
            CriticalFromNonRecoverable => "transition to Critical from Non-recoverable",
            NonRecoverable => "transition to Non-recoverable",
            Monitor => "Monitor",
            Informational => "Informational",
        };
        write!(f, "{label}")
    }
}

/// A sensor carrying a discrete severity level, emitting the Table 42-2
/// transition event implied by each (previous, new) level pair.
pub struct SeveritySensor {
    sensor: Sensor,
    status: Mutex<StateTransition>,
}

impl SeveritySensor {
    pub fn new(sdr_key: Vec<u8>, events: Arc<dyn EventSink>, log: Logger) -> Self {
        Self {
            sensor: Sensor::new(sdr_key, events, log),
            status: Mutex::new(StateTransition::ToOk),
        }
    }

    /// The common sensor state (event enables, scanning, SDR key).
    pub fn sensor(&self) -> &Sensor {
        &self.sensor
    }

    /// The current severity event state.
    pub fn status(&self) -> StateTransition {
        *self.status.lock().unwrap()
    }

    /// The current severity level, with the approach direction stripped.
    pub fn level(&self) -> Level {
        use StateTransition::*;
        match self.status() {
            ToOk => Level::Ok,
            NonCriticalFromOk | NonCriticalFromMore => Level::NonCritical,
            CriticalFromLess | CriticalFromNonRecoverable => Level::Critical,
            NonRecoverableFromLess | NonRecoverable => Level::NonRecoverable,
            Monitor => Level::Monitor,
            Informational => Level::Informational,
        }
    }

    /// Move to a new severity level, emitting the Table 42-2 event for the
    /// (previous, new) pair. Re-asserting the current level emits nothing.
    /// Returns the resulting event state.
    ///
    /// The event is emitted after the state lock is released.
    pub fn transition(&self, level: Level, send_event: bool) -> StateTransition {
        use StateTransition::*;
        let (new_status, event_data) = {
            let mut status = self.status.lock().unwrap();
            let old_status = *status;
            let mut send_event = send_event;
            let new_status = match level {
                Level::Ok => {
                    if old_status == ToOk {
                        send_event = false;
                    }
                    ToOk
                }
                Level::NonCritical => match old_status {
                    ToOk => NonCriticalFromOk,
                    NonCriticalFromOk => {
                        send_event = false;
                        NonCriticalFromOk
                    }
                    NonCriticalFromMore => {
                        send_event = false;
                        NonCriticalFromMore
                    }
                    CriticalFromLess
                    | CriticalFromNonRecoverable
                    | NonRecoverableFromLess
                    | NonRecoverable => NonCriticalFromMore,
                    Monitor | Informational => NonCriticalFromOk,
                },
                Level::Critical => match old_status {
                    ToOk | NonCriticalFromOk | NonCriticalFromMore => CriticalFromLess,
                    CriticalFromLess => {
                        send_event = false;
                        CriticalFromLess
                    }
                    CriticalFromNonRecoverable => {
                        send_event = false;
                        CriticalFromNonRecoverable
                    }
                    NonRecoverableFromLess | NonRecoverable => CriticalFromNonRecoverable,
                    Monitor | Informational => CriticalFromLess,
                },
                Level::NonRecoverable => match old_status {
                    ToOk
                    | NonCriticalFromOk
                    | NonCriticalFromMore
                    | CriticalFromLess
                    | CriticalFromNonRecoverable => NonRecoverableFromLess,
                    NonRecoverableFromLess => {
                        send_event = false;
                        NonRecoverableFromLess
                    }
                    NonRecoverable => {
                        send_event = false;
                        NonRecoverable
                    }
                    Monitor | Informational => NonRecoverable,
                },
                Level::Monitor => {
                    if old_status == Monitor {
                        send_event = false;
                    }
                    Monitor
                }
                Level::Informational => {
                    if old_status == Informational {
                        send_event = false;
                    }
                    Informational
                }
            };
            *status = new_status;
            let event_data = send_event
                .then(|| [0x40 | u8::from(new_status), u8::from(old_status), 0x00]);
            (new_status, event_data)
        };

        if let Some(data) = event_data {
            self.sensor.send_event(EventDirection::Assertion, &data);
        }
        new_status
    }

    /// Re-emit the current event state without changing it.
    pub fn rearm(&self) {
        let data = [u8::from(self.status())];
        self.sensor.send_event(EventDirection::Assertion, &data);
    }

    /// The Get Sensor Reading response for this sensor: completion code,
    /// reserved reading byte, status flags, and the two event-state bytes.
    pub fn get_sensor_reading(&self) -> [u8; 5] {
        let mut flags = SensorStatus::empty();
        if !self.sensor.all_events_disabled() {
            flags |= SensorStatus::EVENTS_ENABLED;
        }
        if !self.sensor.scanning_disabled() {
            flags |= SensorStatus::SCANNING_ENABLED;
        }
        let event_state: u16 = 1 << u8::from(self.status());
        [
            CompletionCode::Success.into(),
            0,
            flags.bits(),
            event_state as u8,
            (event_state >> 8) as u8,
        ]
    }

    /// The current event status in Platform Event format: one bit per event
    /// state, with the current state's bit set.
    pub fn get_sensor_event_status(&self) -> u16 {
        1 << u8::from(self.status())
    }
}

#[cfg(test)]
mod tests {
    use super::Level;
    use super::SeveritySensor;
    use super::StateTransition;
    use crate::sensor::test_support::test_log;
    use crate::sensor::test_support::RecordingSink;
    use std::sync::Arc;
    use strum::IntoEnumIterator;

    fn severity() -> (SeveritySensor, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let sensor =
            SeveritySensor::new(vec![0x82, 0x00, 0x02], Arc::clone(&sink) as _, test_log());
        (sensor, sink)
    }

    #[test]
    fn test_escalation_codes() {
        let (sensor, sink) = severity();

        // OK -> NC -> CR -> NR climbs through codes 1, 2, 3.
        assert_eq!(
            sensor.transition(Level::NonCritical, true),
            StateTransition::NonCriticalFromOk
        );
        assert_eq!(
            sensor.transition(Level::Critical, true),
            StateTransition::CriticalFromLess
        );
        assert_eq!(
            sensor.transition(Level::NonRecoverable, true),
            StateTransition::NonRecoverableFromLess
        );

        let events = sink.events.lock().unwrap();
        let codes: Vec<u8> = events.iter().map(|(_, _, data)| data[0]).collect();
        assert_eq!(codes, vec![0x41, 0x42, 0x43]);
        // Each event carries the state it left.
        let previous: Vec<u8> = events.iter().map(|(_, _, data)| data[1]).collect();
        assert_eq!(previous, vec![0, 1, 2]);
    }

    #[test]
    fn test_deescalation_codes() {
        let (sensor, sink) = severity();
        sensor.transition(Level::NonRecoverable, false);

        // NR -> CR is code 5; CR -> NC is code 4; NC -> OK is code 0.
        assert_eq!(
            sensor.transition(Level::Critical, true),
            StateTransition::CriticalFromNonRecoverable
        );
        assert_eq!(
            sensor.transition(Level::NonCritical, true),
            StateTransition::NonCriticalFromMore
        );
        assert_eq!(sensor.transition(Level::Ok, true), StateTransition::ToOk);

        let events = sink.events.lock().unwrap();
        let codes: Vec<u8> = events.iter().map(|(_, _, data)| data[0]).collect();
        assert_eq!(codes, vec![0x45, 0x44, 0x40]);
    }

    #[test]
    fn test_reasserting_level_is_silent() {
        let (sensor, sink) = severity();
        for level in Level::iter() {
            sensor.transition(level, true);
            let count = sink.events.lock().unwrap().len();
            // The same level again must not emit another event.
            sensor.transition(level, true);
            assert_eq!(sink.events.lock().unwrap().len(), count, "level {level:?}");
        }
    }

    #[test]
    fn test_monitor_and_informational() {
        let (sensor, _) = severity();
        assert_eq!(
            sensor.transition(Level::Monitor, true),
            StateTransition::Monitor
        );
        assert_eq!(sensor.level(), Level::Monitor);

        // Leaving Monitor for a severity level uses the from-OK entry.
        assert_eq!(
            sensor.transition(Level::NonCritical, true),
            StateTransition::NonCriticalFromOk
        );

        assert_eq!(
            sensor.transition(Level::Informational, true),
            StateTransition::Informational
        );
        assert_eq!(sensor.level(), Level::Informational);
    }

    #[test]
    fn test_sensor_reading_event_state() {
        let (sensor, _) = severity();
        sensor.transition(Level::Informational, false);
        // State 8 sets bit 8, which lands in the second event-state byte.
        assert_eq!(sensor.get_sensor_reading(), [0x00, 0x00, 0xc0, 0x00, 0x01]);
        assert_eq!(sensor.get_sensor_event_status(), 1 << 8);
    }

    #[test]
    fn test_rearm_emits_bare_status() {
        let (sensor, sink) = severity();
        sensor.transition(Level::Critical, false);
        sensor.rearm();
        let events = sink.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].2, vec![0x02]);
    }
}
