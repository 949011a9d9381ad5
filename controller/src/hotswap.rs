// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

//! The PICMG hot-swap (M-state) sensor.

use crate::sensor::EventDirection;
use crate::sensor::EventSink;
use crate::sensor::Sensor;
use crate::Error;
use ipmc_messages::command::CompletionCode;
use ipmc_messages::command::SensorStatus;
use slog::Logger;
use std::sync::Arc;
use std::sync::Mutex;

/// The cause reported with an M-state transition, per PICMG 3.0 Table 3-22.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TransitionReason {
    Normal,
    CommandedByShelf,
    OperatorSwitch,
    FruProgrammatic,
    CommunicationLostOrRegained,
    CommunicationLostOrRegainedInternal,
    SurpriseExtraction,
    ProvidedInformation,
    InvalidHwAddress,
    UnexpectedDeactivation,
    SurprisePowerFail,
    Unknown,
}

impl From<TransitionReason> for u8 {
    fn from(reason: TransitionReason) -> u8 {
        use TransitionReason::*;
        match reason {
            Normal => 0,
            CommandedByShelf => 1,
            OperatorSwitch => 2,
            FruProgrammatic => 3,
            CommunicationLostOrRegained => 4,
            CommunicationLostOrRegainedInternal => 5,
            SurpriseExtraction => 6,
            ProvidedInformation => 7,
            InvalidHwAddress => 8,
            UnexpectedDeactivation => 9,
            SurprisePowerFail => 10,
            Unknown => 0x0f,
        }
    }
}

#[derive(Debug)]
struct State {
    mstate: u8,
    previous_mstate: u8,
    last_transition_reason: TransitionReason,
}

/// The board's hot-swap sensor, tracking its current M-state (M0 through M7)
/// and emitting the PICMG hot-swap event on every transition.
pub struct HotswapSensor {
    sensor: Sensor,
    fru_device_id: u8,
    state: Mutex<State>,
}

impl HotswapSensor {
    /// Create the hot-swap sensor for the FRU with the given device ID.
    ///
    /// A board comes up in M1 (inactive): the handle transition into M1 has,
    /// by definition, already happened by the time firmware runs.
    pub fn new(
        sdr_key: Vec<u8>,
        fru_device_id: u8,
        events: Arc<dyn EventSink>,
        log: Logger,
    ) -> Self {
        Self {
            sensor: Sensor::new(sdr_key, events, log),
            fru_device_id,
            state: Mutex::new(State {
                mstate: 1,
                previous_mstate: 0,
                last_transition_reason: TransitionReason::Normal,
            }),
        }
    }

    /// The common sensor state (event enables, scanning, SDR key).
    pub fn sensor(&self) -> &Sensor {
        &self.sensor
    }

    /// The current M-state.
    pub fn mstate(&self) -> u8 {
        self.state.lock().unwrap().mstate
    }

    /// Move to a new M-state, recording the cause.
    ///
    /// The state update is atomic; the hot-swap event (current state, cause,
    /// previous state, FRU device ID) is emitted after the state lock is
    /// released so event delivery can never deadlock against a reader.
    pub fn transition(
        &self,
        new_state: u8,
        reason: TransitionReason,
        send_event: bool,
    ) -> Result<(), Error> {
        if new_state >= 8 {
            return Err(Error::InvalidMState(new_state));
        }

        let event_data = {
            let mut state = self.state.lock().unwrap();
            let data = [
                0xa0 | new_state,
                (u8::from(reason) << 4) | state.mstate,
                self.fru_device_id,
            ];
            state.previous_mstate = state.mstate;
            state.mstate = new_state;
            state.last_transition_reason = reason;
            data
        };

        if send_event {
            self.sensor.send_event(EventDirection::Assertion, &event_data);
        }
        Ok(())
    }

    /// Re-emit the event for the most recent transition without changing
    /// state.
    ///
    /// A shelf manager that missed the original event (say, across its own
    /// restart) issues Rearm Sensor Events to ask for it again.
    pub fn rearm(&self) {
        let event_data = {
            let state = self.state.lock().unwrap();
            [
                0xa0 | state.mstate,
                (u8::from(state.last_transition_reason) << 4) | state.previous_mstate,
                self.fru_device_id,
            ]
        };
        self.sensor.send_event(EventDirection::Assertion, &event_data);
    }

    /// The Get Sensor Reading response for this sensor: completion code,
    /// reserved reading byte, status flags, and the current M-state.
    pub fn get_sensor_reading(&self) -> [u8; 4] {
        let mut status = SensorStatus::empty();
        if !self.sensor.all_events_disabled() {
            status |= SensorStatus::EVENTS_ENABLED;
        }
        if !self.sensor.scanning_disabled() {
            status |= SensorStatus::SCANNING_ENABLED;
        }
        [
            CompletionCode::Success.into(),
            0,
            status.bits(),
            self.mstate(),
        ]
    }

    /// The current event status in Platform Event format: one bit per
    /// M-state, with the current state's bit set.
    pub fn get_sensor_event_status(&self) -> u16 {
        1 << self.mstate()
    }
}

#[cfg(test)]
mod tests {
    use super::HotswapSensor;
    use super::TransitionReason;
    use crate::sensor::test_support::test_log;
    use crate::sensor::test_support::RecordingSink;
    use crate::sensor::EventDirection;
    use crate::Error;
    use std::sync::Arc;

    fn hotswap() -> (HotswapSensor, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let sensor = HotswapSensor::new(
            vec![0x82, 0x00, 0x01],
            0,
            Arc::clone(&sink) as _,
            test_log(),
        );
        (sensor, sink)
    }

    #[test]
    fn test_initial_state_is_m1() {
        let (sensor, _) = hotswap();
        assert_eq!(sensor.mstate(), 1);
        assert_eq!(sensor.get_sensor_event_status(), 1 << 1);
    }

    #[test]
    fn test_transition_updates_state_and_emits_event() {
        let (sensor, sink) = hotswap();
        sensor
            .transition(2, TransitionReason::CommandedByShelf, true)
            .unwrap();

        assert_eq!(sensor.mstate(), 2);
        let events = sink.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        let (direction, key, data) = &events[0];
        assert_eq!(*direction, EventDirection::Assertion);
        assert_eq!(key, &[0x82, 0x00, 0x01]);
        // [0xA0 | new, reason << 4 | old, fru]
        assert_eq!(data, &[0xa2, 0x11, 0x00]);
    }

    #[test]
    fn test_transition_bounds() {
        let (sensor, sink) = hotswap();
        assert_eq!(
            sensor
                .transition(8, TransitionReason::Normal, true)
                .unwrap_err(),
            Error::InvalidMState(8)
        );
        assert_eq!(sensor.mstate(), 1);
        assert!(sink.events.lock().unwrap().is_empty());

        sensor.transition(7, TransitionReason::Normal, true).unwrap();
        assert_eq!(sensor.mstate(), 7);
    }

    #[test]
    fn test_transition_without_event() {
        let (sensor, sink) = hotswap();
        sensor
            .transition(4, TransitionReason::Normal, false)
            .unwrap();
        assert_eq!(sensor.mstate(), 4);
        assert!(sink.events.lock().unwrap().is_empty());
    }

    #[test]
    fn test_rearm_resends_last_transition() {
        let (sensor, sink) = hotswap();
        sensor
            .transition(3, TransitionReason::OperatorSwitch, true)
            .unwrap();
        sensor.rearm();

        let events = sink.events.lock().unwrap();
        assert_eq!(events.len(), 2);
        // The rearm event repeats the M1 -> M3 transition.
        assert_eq!(events[1].2, vec![0xa3, 0x21, 0x00]);
        assert_eq!(sensor.mstate(), 3);
    }

    #[test]
    fn test_sensor_reading_flags() {
        let (sensor, _) = hotswap();
        sensor.transition(5, TransitionReason::Normal, false).unwrap();
        assert_eq!(sensor.get_sensor_reading(), [0x00, 0x00, 0xc0, 0x05]);

        sensor.sensor().set_all_events_disabled(true);
        sensor.sensor().set_scanning_disabled(true);
        assert_eq!(sensor.get_sensor_reading(), [0x00, 0x00, 0x00, 0x05]);
    }
}
