// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

//! The sensor-describing SDR variants.
//!
//! Types 0x01 (full), 0x02 (compact) and 0x03 (event-only) share their first
//! ten bytes (ownership, entity and sensor number) and then diverge. Fields
//! that sit at the same offset in every variant live as default methods on
//! [`SensorRecord`]; fields whose position varies are routed through a
//! per-type [`SensorFieldTable`]. The shared-sensor block (instance modifiers
//! and share counts) exists only on types 0x02 and 0x03 and is exposed only
//! there, via [`SharedSensorFields`].

use crate::field::BitField;
use crate::record::validate_header;
use crate::record::Record;
use crate::record::HEADER_LEN;
use crate::record::SDR_VERSION;
use crate::sdr_field;
use crate::Error;
use ipmc_messages::fields;

// Fields common to every sensor record type.
const SENSOR_OWNER_ID: BitField = BitField::new(5, 7, 0);
const SENSOR_OWNER_CHANNEL: BitField = BitField::new(6, 7, 4);
const SENSOR_OWNER_LUN: BitField = BitField::new(6, 1, 0);
const SENSOR_NUMBER: BitField = BitField::new(7, 7, 0);
const ENTITY_ID: BitField = BitField::new(8, 7, 0);
const ENTITY_INSTANCE_IS_CONTAINER: BitField = BitField::new(9, 7, 7);
const ENTITY_INSTANCE: BitField = BitField::new(9, 6, 0);

// Initialization and capability fields common to readable (full and compact)
// sensor records.
const SENSOR_SETABLE: BitField = BitField::new(10, 7, 7);
const INIT_SCANNING_ENABLED: BitField = BitField::new(10, 6, 6);
const INIT_EVENTS_ENABLED: BitField = BitField::new(10, 5, 5);
const INIT_THRESHOLDS: BitField = BitField::new(10, 4, 4);
const INIT_HYSTERESIS: BitField = BitField::new(10, 3, 3);
const INIT_SENSOR_TYPE: BitField = BitField::new(10, 2, 2);
const EVENTS_ENABLED_DEFAULT: BitField = BitField::new(10, 1, 1);
const SCANNING_ENABLED_DEFAULT: BitField = BitField::new(10, 0, 0);
const IGNORE_IF_ENTITY_ABSENT: BitField = BitField::new(11, 7, 7);
const SENSOR_AUTO_REARM: BitField = BitField::new(11, 6, 6);
const HYSTERESIS_SUPPORT: BitField = BitField::new(11, 5, 4);
const THRESHOLD_ACCESS_SUPPORT: BitField = BitField::new(11, 3, 2);
const EVENT_MESSAGE_CONTROL: BitField = BitField::new(11, 1, 0);
const UNITS_RATE_UNIT: BitField = BitField::new(20, 5, 3);
const UNITS_MODIFIER_METHOD: BitField = BitField::new(20, 2, 1);
const UNITS_PERCENTAGE: BitField = BitField::new(20, 0, 0);
const UNITS_BASE_UNIT: BitField = BitField::new(21, 7, 0);
const UNITS_MODIFIER_UNIT: BitField = BitField::new(22, 7, 0);

/// The event/reading type code marking a threshold sensor; any other value
/// describes a discrete sensor.
pub const EVENT_TYPE_THRESHOLD: u8 = 0x01;

/// A sensor's measurement direction.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(
    any(feature = "api-traits", test),
    derive(schemars::JsonSchema, serde::Deserialize, serde::Serialize)
)]
#[cfg_attr(any(feature = "api-traits", test), serde(rename_all = "snake_case"))]
pub enum Direction {
    Unspecified,
    Input,
    Output,
    Reserved,
}

impl From<u8> for Direction {
    fn from(x: u8) -> Self {
        match x & 0x03 {
            0 => Direction::Unspecified,
            1 => Direction::Input,
            2 => Direction::Output,
            _ => Direction::Reserved,
        }
    }
}

impl From<Direction> for u8 {
    fn from(d: Direction) -> u8 {
        match d {
            Direction::Unspecified => 0,
            Direction::Input => 1,
            Direction::Output => 2,
            Direction::Reserved => 3,
        }
    }
}

/// How a shared-sensor ID-string instance modifier is rendered.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(
    any(feature = "api-traits", test),
    derive(schemars::JsonSchema, serde::Deserialize, serde::Serialize)
)]
#[cfg_attr(any(feature = "api-traits", test), serde(rename_all = "snake_case"))]
pub enum InstanceModifier {
    Numeric,
    Alpha,
    Reserved(u8),
}

impl From<u8> for InstanceModifier {
    fn from(x: u8) -> Self {
        match x & 0x03 {
            0 => InstanceModifier::Numeric,
            1 => InstanceModifier::Alpha,
            other => InstanceModifier::Reserved(other),
        }
    }
}

impl From<InstanceModifier> for u8 {
    fn from(m: InstanceModifier) -> u8 {
        match m {
            InstanceModifier::Numeric => 0,
            InstanceModifier::Alpha => 1,
            InstanceModifier::Reserved(x) => x,
        }
    }
}

/// The fields whose byte positions vary across sensor record types.
#[derive(Clone, Copy, Debug)]
pub struct SensorFieldTable {
    pub sensor_type_code: BitField,
    pub event_type_reading_code: BitField,
    pub direction: BitField,
    pub oem: BitField,
}

/// The shared-sensor block, present only on types 0x02 and 0x03.
#[derive(Clone, Copy, Debug)]
pub struct SharedFieldTable {
    pub instance_modifier_type: BitField,
    pub share_count: BitField,
    pub entity_instance_sharing: BitField,
    pub instance_modifier_offset: BitField,
}

// Validate a sensor record buffer: header structure, expected type code, and
// a well-formed ID-string field that stays within the buffer.
fn validate_sensor(data: &[u8], expected_type: u8, id_string_offset: usize) -> Result<(), Error> {
    validate_header(data)?;
    if data[3] != expected_type {
        return Err(Error::WrongType {
            expected: expected_type,
            actual: data[3],
        });
    }
    if data.len() < id_string_offset + 1 {
        return Err(Error::Truncated);
    }
    let id_len =
        fields::field_length(&data[id_string_offset..]).ok_or(Error::InvalidIdString)?;
    // One Type/Length byte plus at most sixteen characters.
    if id_len > 17 {
        return Err(Error::InvalidIdString);
    }
    Ok(())
}

// Allocate a zero-filled record of the given type carrying only its name.
fn blank_record(record_type: u8, id_string_offset: usize, name: &str) -> Result<Vec<u8>, Error> {
    if name.len() > 16 {
        return Err(Error::NameTooLong);
    }
    let mut data = vec![0u8; id_string_offset];
    data.extend_from_slice(&fields::encode(name, false));
    data[2] = SDR_VERSION;
    data[3] = record_type;
    data[4] = (data.len() - HEADER_LEN) as u8;
    Ok(data)
}

// Export a sensor record, substituting the exporter's own address and channel
// for a zero owner.
fn export_sensor(data: &[u8], len: usize, self_ipmb_addr: u8, self_ipmb_channel: u8) -> Vec<u8> {
    let mut out = data[..len].to_vec();
    if out[5] == 0x00 {
        out[5] = self_ipmb_addr;
    }
    if out[6] & 0xf0 == 0x00 {
        out[6] |= (self_ipmb_channel & 0x0f) << 4;
    }
    out
}

fn get_word(data: &[u8], lo: usize) -> u16 {
    u16::from(data[lo]) | (u16::from(data[lo + 1]) << 8)
}

fn set_word(data: &mut [u8], lo: usize, value: u16) {
    data[lo] = value as u8;
    data[lo + 1] = (value >> 8) as u8;
}

/// Accessors shared by every sensor-describing record type.
pub trait SensorRecord: Record {
    /// The position table for fields that move between record types.
    fn sensor_fields(&self) -> &'static SensorFieldTable;

    /// The offset of the ID-string Type/Length field.
    fn id_string_offset(&self) -> usize;

    fn sensor_owner_id(&self) -> u8 {
        SENSOR_OWNER_ID.get(self.sdr_data())
    }

    fn set_sensor_owner_id(&mut self, value: u8) -> Result<(), Error> {
        SENSOR_OWNER_ID.set(self.sdr_data_mut(), value)
    }

    fn sensor_owner_channel(&self) -> u8 {
        SENSOR_OWNER_CHANNEL.get(self.sdr_data())
    }

    fn set_sensor_owner_channel(&mut self, value: u8) -> Result<(), Error> {
        SENSOR_OWNER_CHANNEL.set(self.sdr_data_mut(), value)
    }

    fn sensor_owner_lun(&self) -> u8 {
        SENSOR_OWNER_LUN.get(self.sdr_data())
    }

    fn set_sensor_owner_lun(&mut self, value: u8) -> Result<(), Error> {
        SENSOR_OWNER_LUN.set(self.sdr_data_mut(), value)
    }

    fn sensor_number(&self) -> u8 {
        SENSOR_NUMBER.get(self.sdr_data())
    }

    fn set_sensor_number(&mut self, value: u8) -> Result<(), Error> {
        SENSOR_NUMBER.set(self.sdr_data_mut(), value)
    }

    fn entity_id(&self) -> u8 {
        ENTITY_ID.get(self.sdr_data())
    }

    fn set_entity_id(&mut self, value: u8) -> Result<(), Error> {
        ENTITY_ID.set(self.sdr_data_mut(), value)
    }

    fn entity_instance_is_container(&self) -> bool {
        ENTITY_INSTANCE_IS_CONTAINER.get_bool(self.sdr_data())
    }

    fn set_entity_instance_is_container(&mut self, value: bool) -> Result<(), Error> {
        ENTITY_INSTANCE_IS_CONTAINER.set_bool(self.sdr_data_mut(), value)
    }

    fn entity_instance(&self) -> u8 {
        ENTITY_INSTANCE.get(self.sdr_data())
    }

    fn set_entity_instance(&mut self, value: u8) -> Result<(), Error> {
        ENTITY_INSTANCE.set(self.sdr_data_mut(), value)
    }

    fn sensor_type_code(&self) -> u8 {
        self.sensor_fields().sensor_type_code.get(self.sdr_data())
    }

    fn set_sensor_type_code(&mut self, value: u8) -> Result<(), Error> {
        let field = self.sensor_fields().sensor_type_code;
        field.set(self.sdr_data_mut(), value)
    }

    fn event_type_reading_code(&self) -> u8 {
        self.sensor_fields()
            .event_type_reading_code
            .get(self.sdr_data())
    }

    fn set_event_type_reading_code(&mut self, value: u8) -> Result<(), Error> {
        let field = self.sensor_fields().event_type_reading_code;
        field.set(self.sdr_data_mut(), value)
    }

    fn sensor_direction(&self) -> Direction {
        Direction::from(self.sensor_fields().direction.get(self.sdr_data()))
    }

    fn set_sensor_direction(&mut self, direction: Direction) -> Result<(), Error> {
        let field = self.sensor_fields().direction;
        field.set(self.sdr_data_mut(), direction.into())
    }

    fn oem(&self) -> u8 {
        self.sensor_fields().oem.get(self.sdr_data())
    }

    fn set_oem(&mut self, value: u8) -> Result<(), Error> {
        let field = self.sensor_fields().oem;
        field.set(self.sdr_data_mut(), value)
    }

    /// Decode the sensor's name from its ID-string field.
    fn id_string(&self) -> String {
        fields::render(&self.sdr_data()[self.id_string_offset()..])
    }

    /// Replace the sensor's name, preserving any bytes beyond the ID string
    /// and refreshing the header length.
    fn set_id_string(&mut self, name: &str) -> Result<(), Error> {
        if name.len() > 16 {
            return Err(Error::NameTooLong);
        }
        let id_offset = self.id_string_offset();
        let old_len = fields::field_length(&self.sdr_data()[id_offset..])
            .ok_or(Error::InvalidIdString)?;
        let encoded = fields::encode(name, false);
        let data = self.sdr_data_mut();
        let tail = data[id_offset + old_len..].to_vec();
        data.truncate(id_offset);
        data.extend_from_slice(&encoded);
        data.extend_from_slice(&tail);
        data[4] = (data.len() - HEADER_LEN) as u8;
        Ok(())
    }
}

/// Accessors for the shared-sensor block carried by compact and event-only
/// records. Full sensor records have no such block, and do not implement
/// this.
pub trait SharedSensorFields: SensorRecord {
    /// The position table for this type's shared-sensor block.
    fn shared_fields(&self) -> &'static SharedFieldTable;

    fn id_string_instance_modifier_type(&self) -> InstanceModifier {
        InstanceModifier::from(
            self.shared_fields()
                .instance_modifier_type
                .get(self.sdr_data()),
        )
    }

    fn set_id_string_instance_modifier_type(
        &mut self,
        modifier: InstanceModifier,
    ) -> Result<(), Error> {
        let field = self.shared_fields().instance_modifier_type;
        field.set(self.sdr_data_mut(), modifier.into())
    }

    fn share_count(&self) -> u8 {
        self.shared_fields().share_count.get(self.sdr_data())
    }

    fn set_share_count(&mut self, value: u8) -> Result<(), Error> {
        let field = self.shared_fields().share_count;
        field.set(self.sdr_data_mut(), value)
    }

    fn entity_instance_sharing(&self) -> u8 {
        self.shared_fields()
            .entity_instance_sharing
            .get(self.sdr_data())
    }

    fn set_entity_instance_sharing(&mut self, value: u8) -> Result<(), Error> {
        let field = self.shared_fields().entity_instance_sharing;
        field.set(self.sdr_data_mut(), value)
    }

    fn id_string_instance_modifier_offset(&self) -> u8 {
        self.shared_fields()
            .instance_modifier_offset
            .get(self.sdr_data())
    }

    fn set_id_string_instance_modifier_offset(&mut self, value: u8) -> Result<(), Error> {
        let field = self.shared_fields().instance_modifier_offset;
        field.set(self.sdr_data_mut(), value)
    }
}

/// Accessors for readable sensors (full and compact records): initialization
/// defaults, capability flags, event masks, units, and hysteresis.
pub trait ReadableSensorRecord: SensorRecord {
    /// The `(high, low)` hysteresis byte positions for this type.
    fn hysteresis_fields(&self) -> (BitField, BitField);

    fn sensor_setable(&self) -> bool {
        SENSOR_SETABLE.get_bool(self.sdr_data())
    }

    fn initialize_scanning_enabled(&self) -> bool {
        INIT_SCANNING_ENABLED.get_bool(self.sdr_data())
    }

    fn set_initialize_scanning_enabled(&mut self, value: bool) -> Result<(), Error> {
        INIT_SCANNING_ENABLED.set_bool(self.sdr_data_mut(), value)
    }

    fn initialize_events_enabled(&self) -> bool {
        INIT_EVENTS_ENABLED.get_bool(self.sdr_data())
    }

    fn set_initialize_events_enabled(&mut self, value: bool) -> Result<(), Error> {
        INIT_EVENTS_ENABLED.set_bool(self.sdr_data_mut(), value)
    }

    fn initialize_thresholds(&self) -> bool {
        INIT_THRESHOLDS.get_bool(self.sdr_data())
    }

    fn initialize_hysteresis(&self) -> bool {
        INIT_HYSTERESIS.get_bool(self.sdr_data())
    }

    fn initialize_sensor_type(&self) -> bool {
        INIT_SENSOR_TYPE.get_bool(self.sdr_data())
    }

    fn events_enabled_default(&self) -> bool {
        EVENTS_ENABLED_DEFAULT.get_bool(self.sdr_data())
    }

    fn set_events_enabled_default(&mut self, value: bool) -> Result<(), Error> {
        EVENTS_ENABLED_DEFAULT.set_bool(self.sdr_data_mut(), value)
    }

    fn scanning_enabled_default(&self) -> bool {
        SCANNING_ENABLED_DEFAULT.get_bool(self.sdr_data())
    }

    fn set_scanning_enabled_default(&mut self, value: bool) -> Result<(), Error> {
        SCANNING_ENABLED_DEFAULT.set_bool(self.sdr_data_mut(), value)
    }

    fn ignore_if_entity_absent(&self) -> bool {
        IGNORE_IF_ENTITY_ABSENT.get_bool(self.sdr_data())
    }

    fn sensor_auto_rearm(&self) -> bool {
        SENSOR_AUTO_REARM.get_bool(self.sdr_data())
    }

    fn set_sensor_auto_rearm(&mut self, value: bool) -> Result<(), Error> {
        SENSOR_AUTO_REARM.set_bool(self.sdr_data_mut(), value)
    }

    fn sensor_hysteresis_support(&self) -> u8 {
        HYSTERESIS_SUPPORT.get(self.sdr_data())
    }

    fn sensor_threshold_access_support(&self) -> u8 {
        THRESHOLD_ACCESS_SUPPORT.get(self.sdr_data())
    }

    fn sensor_event_message_control_support(&self) -> u8 {
        EVENT_MESSAGE_CONTROL.get(self.sdr_data())
    }

    /// Assertion event / lower threshold reading mask (bytes 14-15).
    fn assertion_event_mask(&self) -> u16 {
        get_word(self.sdr_data(), 14)
    }

    fn set_assertion_event_mask(&mut self, value: u16) {
        set_word(self.sdr_data_mut(), 14, value)
    }

    /// Deassertion event / upper threshold reading mask (bytes 16-17).
    fn deassertion_event_mask(&self) -> u16 {
        get_word(self.sdr_data(), 16)
    }

    fn set_deassertion_event_mask(&mut self, value: u16) {
        set_word(self.sdr_data_mut(), 16, value)
    }

    /// Discrete reading / settable threshold reading mask (bytes 18-19).
    fn discrete_reading_mask(&self) -> u16 {
        get_word(self.sdr_data(), 18)
    }

    fn set_discrete_reading_mask(&mut self, value: u16) {
        set_word(self.sdr_data_mut(), 18, value)
    }

    fn units_rate_unit(&self) -> u8 {
        UNITS_RATE_UNIT.get(self.sdr_data())
    }

    fn units_modifier_unit_method(&self) -> u8 {
        UNITS_MODIFIER_METHOD.get(self.sdr_data())
    }

    fn units_percentage(&self) -> bool {
        UNITS_PERCENTAGE.get_bool(self.sdr_data())
    }

    fn units_base_unit(&self) -> u8 {
        UNITS_BASE_UNIT.get(self.sdr_data())
    }

    fn set_units_base_unit(&mut self, value: u8) -> Result<(), Error> {
        UNITS_BASE_UNIT.set(self.sdr_data_mut(), value)
    }

    fn units_modifier_unit(&self) -> u8 {
        UNITS_MODIFIER_UNIT.get(self.sdr_data())
    }

    fn hysteresis_high(&self) -> u8 {
        self.hysteresis_fields().0.get(self.sdr_data())
    }

    fn set_hysteresis_high(&mut self, value: u8) -> Result<(), Error> {
        let field = self.hysteresis_fields().0;
        field.set(self.sdr_data_mut(), value)
    }

    fn hysteresis_low(&self) -> u8 {
        self.hysteresis_fields().1.get(self.sdr_data())
    }

    fn set_hysteresis_low(&mut self, value: u8) -> Result<(), Error> {
        let field = self.hysteresis_fields().1;
        field.set(self.sdr_data_mut(), value)
    }
}

/// A type 0x01 SDR: a full sensor record, carrying reading conversion
/// factors alongside the common sensor description.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FullSensorRecord {
    sdr_data: Vec<u8>,
}

impl FullSensorRecord {
    pub const RECORD_TYPE: u8 = 0x01;
    pub const ID_STRING_OFFSET: usize = 47;

    /// The linearization code for a linear sensor, the only kind whose
    /// readings this controller converts.
    pub const LINEARIZATION_LINEAR: u8 = 0x00;

    const FIELDS: SensorFieldTable = SensorFieldTable {
        sensor_type_code: BitField::new(12, 7, 0),
        event_type_reading_code: BitField::new(13, 7, 0),
        direction: BitField::new(28, 1, 0),
        oem: BitField::new(46, 7, 0),
    };

    /// Adopt a raw buffer as a full sensor record, validating it first.
    pub fn new(sdr_data: Vec<u8>) -> Result<Self, Error> {
        validate_sensor(&sdr_data, Self::RECORD_TYPE, Self::ID_STRING_OFFSET)?;
        Ok(Self { sdr_data })
    }

    /// Allocate a blank record carrying only `name`.
    pub fn initialize_blank(name: &str) -> Result<Self, Error> {
        let sdr_data = blank_record(Self::RECORD_TYPE, Self::ID_STRING_OFFSET, name)?;
        Ok(Self { sdr_data })
    }

    sdr_field!(
        /// The numeric format of raw readings (unsigned, 1s or 2s
        /// complement).
        units_numeric_format, set_units_numeric_format, u8, 20, 7, 6);
    sdr_field!(linearization, set_linearization, u8, 23, 7, 0);
    sdr_field!(
        /// Tolerance of the M conversion factor, in half raw counts.
        conversion_m_tolerance, set_conversion_m_tolerance, u8, 25, 5, 0);
    sdr_field!(conversion_b_accuracy_exp, set_conversion_b_accuracy_exp, u8, 28, 3, 2);
    sdr_field!(normal_min_specified, set_normal_min_specified, bool, 30, 2);
    sdr_field!(normal_max_specified, set_normal_max_specified, bool, 30, 1);
    sdr_field!(nominal_reading_specified, set_nominal_reading_specified, bool, 30, 0);
    sdr_field!(nominal_reading_raw, set_nominal_reading_raw, u8, 31, 7, 0);
    sdr_field!(normal_max_raw, set_normal_max_raw, u8, 32, 7, 0);
    sdr_field!(normal_min_raw, set_normal_min_raw, u8, 33, 7, 0);
    sdr_field!(sensor_max_raw, set_sensor_max_raw, u8, 34, 7, 0);
    sdr_field!(sensor_min_raw, set_sensor_min_raw, u8, 35, 7, 0);
    sdr_field!(threshold_unr_raw, set_threshold_unr_raw, u8, 36, 7, 0);
    sdr_field!(threshold_ucr_raw, set_threshold_ucr_raw, u8, 37, 7, 0);
    sdr_field!(threshold_unc_raw, set_threshold_unc_raw, u8, 38, 7, 0);
    sdr_field!(threshold_lnr_raw, set_threshold_lnr_raw, u8, 39, 7, 0);
    sdr_field!(threshold_lcr_raw, set_threshold_lcr_raw, u8, 40, 7, 0);
    sdr_field!(threshold_lnc_raw, set_threshold_lnc_raw, u8, 41, 7, 0);

    /// The signed 10-bit M conversion factor, split across bytes 24 and
    /// 25[7:6].
    pub fn conversion_m(&self) -> i16 {
        let high = ((self.sdr_data[25] as i8) >> 6) as i16;
        (high << 8) | i16::from(self.sdr_data[24])
    }

    pub fn set_conversion_m(&mut self, value: i16) -> Result<(), Error> {
        // A mask check cannot catch 512 vs -512; compare against the signed
        // 10-bit range directly.
        if !(-512..=511).contains(&value) {
            return Err(Error::FieldWidth {
                value: value as u16,
                bits: 10,
            });
        }
        self.sdr_data[24] = value as u8;
        self.sdr_data[25] &= !0xc0;
        self.sdr_data[25] |= ((value as u16 & 0x0300) >> 2) as u8;
        Ok(())
    }

    /// The signed 10-bit B conversion factor, split across bytes 26 and
    /// 27[7:6].
    pub fn conversion_b(&self) -> i16 {
        let high = ((self.sdr_data[27] as i8) >> 6) as i16;
        (high << 8) | i16::from(self.sdr_data[26])
    }

    pub fn set_conversion_b(&mut self, value: i16) -> Result<(), Error> {
        if !(-512..=511).contains(&value) {
            return Err(Error::FieldWidth {
                value: value as u16,
                bits: 10,
            });
        }
        self.sdr_data[26] = value as u8;
        self.sdr_data[27] &= !0xc0;
        self.sdr_data[27] |= ((value as u16 & 0x0300) >> 2) as u8;
        Ok(())
    }

    /// The unsigned 10-bit accuracy, split across bytes 27[5:0] and
    /// 28[7:4].
    pub fn conversion_b_accuracy(&self) -> u16 {
        u16::from(self.sdr_data[27] & 0x3f) | ((u16::from(self.sdr_data[28]) & 0x00f0) << 2)
    }

    pub fn set_conversion_b_accuracy(&mut self, value: u16) -> Result<(), Error> {
        if value & 0x3ff != value {
            return Err(Error::FieldWidth { value, bits: 10 });
        }
        self.sdr_data[27] &= !0x3f;
        self.sdr_data[27] |= (value & 0x3f) as u8;
        self.sdr_data[28] &= !0xf0;
        self.sdr_data[28] |= ((value >> 2) & 0xf0) as u8;
        Ok(())
    }

    /// The signed 4-bit result exponent in byte 29[7:4].
    pub fn conversion_r_exp(&self) -> i8 {
        let mut value = self.sdr_data[29] >> 4;
        if value & 0x08 != 0 {
            value |= 0xf0;
        }
        value as i8
    }

    pub fn set_conversion_r_exp(&mut self, value: i8) -> Result<(), Error> {
        if !(-8..=7).contains(&value) {
            return Err(Error::FieldWidth {
                value: value as u16,
                bits: 4,
            });
        }
        self.sdr_data[29] = ((value as u8) << 4) | (self.sdr_data[29] & 0x0f);
        Ok(())
    }

    /// The signed 4-bit B exponent in byte 29[3:0].
    pub fn conversion_b_exp(&self) -> i8 {
        let mut value = self.sdr_data[29] & 0x0f;
        if value & 0x08 != 0 {
            value |= 0xf0;
        }
        value as i8
    }

    pub fn set_conversion_b_exp(&mut self, value: i8) -> Result<(), Error> {
        if !(-8..=7).contains(&value) {
            return Err(Error::FieldWidth {
                value: value as u16,
                bits: 4,
            });
        }
        self.sdr_data[29] = (self.sdr_data[29] & 0xf0) | ((value as u8) & 0x0f);
        Ok(())
    }

    /// Convert a raw one-byte reading to its engineering value:
    /// `(M * raw + B * 10^Bexp) * 10^Rexp`.
    ///
    /// Returns `NaN` for non-linear sensors, whose curves this controller
    /// does not model.
    pub fn to_value(&self, raw: u8) -> f32 {
        if self.linearization() != Self::LINEARIZATION_LINEAR {
            return f32::NAN;
        }
        let m = f32::from(self.conversion_m());
        let b = f32::from(self.conversion_b()) * 10f32.powi(self.conversion_b_exp().into());
        (m * f32::from(raw) + b) * 10f32.powi(self.conversion_r_exp().into())
    }

    /// Convert an engineering value back to the nearest raw one-byte
    /// reading, saturating at the ends of the raw range. Returns `0xff` for
    /// non-linear sensors so a misconfiguration reads as an alarm rather
    /// than a plausible value.
    pub fn from_value(&self, value: f32) -> u8 {
        if self.linearization() != Self::LINEARIZATION_LINEAR {
            return 0xff;
        }
        let b = f32::from(self.conversion_b()) * 10f32.powi(self.conversion_b_exp().into());
        let raw = ((value / 10f32.powi(self.conversion_r_exp().into())) - b)
            / f32::from(self.conversion_m());
        raw.round().clamp(0.0, 255.0) as u8
    }
}

impl Record for FullSensorRecord {
    fn sdr_data(&self) -> &[u8] {
        &self.sdr_data
    }

    fn sdr_data_mut(&mut self) -> &mut Vec<u8> {
        &mut self.sdr_data
    }

    fn parsed_record_type(&self) -> u8 {
        Self::RECORD_TYPE
    }

    fn validate(&self) -> Result<(), Error> {
        validate_sensor(&self.sdr_data, Self::RECORD_TYPE, Self::ID_STRING_OFFSET)
    }

    fn record_key(&self) -> &[u8] {
        &self.sdr_data[5..8]
    }

    fn u8export(&self, self_ipmb_addr: u8, self_ipmb_channel: u8) -> Vec<u8> {
        export_sensor(
            &self.sdr_data,
            self.record_length(),
            self_ipmb_addr,
            self_ipmb_channel,
        )
    }
}

impl SensorRecord for FullSensorRecord {
    fn sensor_fields(&self) -> &'static SensorFieldTable {
        &Self::FIELDS
    }

    fn id_string_offset(&self) -> usize {
        Self::ID_STRING_OFFSET
    }
}

impl ReadableSensorRecord for FullSensorRecord {
    fn hysteresis_fields(&self) -> (BitField, BitField) {
        (BitField::new(42, 7, 0), BitField::new(43, 7, 0))
    }
}

/// A type 0x02 SDR: a compact sensor record, optionally describing a run of
/// shared sensors.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CompactSensorRecord {
    sdr_data: Vec<u8>,
}

impl CompactSensorRecord {
    pub const RECORD_TYPE: u8 = 0x02;
    pub const ID_STRING_OFFSET: usize = 31;

    const FIELDS: SensorFieldTable = SensorFieldTable {
        sensor_type_code: BitField::new(12, 7, 0),
        event_type_reading_code: BitField::new(13, 7, 0),
        direction: BitField::new(23, 7, 6),
        oem: BitField::new(30, 7, 0),
    };

    const SHARED_FIELDS: SharedFieldTable = SharedFieldTable {
        instance_modifier_type: BitField::new(23, 5, 4),
        share_count: BitField::new(23, 3, 0),
        entity_instance_sharing: BitField::new(24, 7, 7),
        instance_modifier_offset: BitField::new(24, 6, 0),
    };

    pub fn new(sdr_data: Vec<u8>) -> Result<Self, Error> {
        validate_sensor(&sdr_data, Self::RECORD_TYPE, Self::ID_STRING_OFFSET)?;
        Ok(Self { sdr_data })
    }

    pub fn initialize_blank(name: &str) -> Result<Self, Error> {
        let sdr_data = blank_record(Self::RECORD_TYPE, Self::ID_STRING_OFFSET, name)?;
        Ok(Self { sdr_data })
    }
}

impl Record for CompactSensorRecord {
    fn sdr_data(&self) -> &[u8] {
        &self.sdr_data
    }

    fn sdr_data_mut(&mut self) -> &mut Vec<u8> {
        &mut self.sdr_data
    }

    fn parsed_record_type(&self) -> u8 {
        Self::RECORD_TYPE
    }

    fn validate(&self) -> Result<(), Error> {
        validate_sensor(&self.sdr_data, Self::RECORD_TYPE, Self::ID_STRING_OFFSET)
    }

    fn record_key(&self) -> &[u8] {
        &self.sdr_data[5..8]
    }

    fn u8export(&self, self_ipmb_addr: u8, self_ipmb_channel: u8) -> Vec<u8> {
        export_sensor(
            &self.sdr_data,
            self.record_length(),
            self_ipmb_addr,
            self_ipmb_channel,
        )
    }
}

impl SensorRecord for CompactSensorRecord {
    fn sensor_fields(&self) -> &'static SensorFieldTable {
        &Self::FIELDS
    }

    fn id_string_offset(&self) -> usize {
        Self::ID_STRING_OFFSET
    }
}

impl SharedSensorFields for CompactSensorRecord {
    fn shared_fields(&self) -> &'static SharedFieldTable {
        &Self::SHARED_FIELDS
    }
}

impl ReadableSensorRecord for CompactSensorRecord {
    fn hysteresis_fields(&self) -> (BitField, BitField) {
        (BitField::new(25, 7, 0), BitField::new(26, 7, 0))
    }
}

/// A type 0x03 SDR: an event-only sensor record.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EventOnlySensorRecord {
    sdr_data: Vec<u8>,
}

impl EventOnlySensorRecord {
    pub const RECORD_TYPE: u8 = 0x03;
    pub const ID_STRING_OFFSET: usize = 16;

    const FIELDS: SensorFieldTable = SensorFieldTable {
        sensor_type_code: BitField::new(10, 7, 0),
        event_type_reading_code: BitField::new(11, 7, 0),
        direction: BitField::new(12, 7, 6),
        oem: BitField::new(15, 7, 0),
    };

    const SHARED_FIELDS: SharedFieldTable = SharedFieldTable {
        instance_modifier_type: BitField::new(12, 5, 4),
        share_count: BitField::new(12, 3, 0),
        entity_instance_sharing: BitField::new(13, 7, 7),
        instance_modifier_offset: BitField::new(13, 6, 0),
    };

    pub fn new(sdr_data: Vec<u8>) -> Result<Self, Error> {
        validate_sensor(&sdr_data, Self::RECORD_TYPE, Self::ID_STRING_OFFSET)?;
        Ok(Self { sdr_data })
    }

    pub fn initialize_blank(name: &str) -> Result<Self, Error> {
        let sdr_data = blank_record(Self::RECORD_TYPE, Self::ID_STRING_OFFSET, name)?;
        Ok(Self { sdr_data })
    }
}

impl Record for EventOnlySensorRecord {
    fn sdr_data(&self) -> &[u8] {
        &self.sdr_data
    }

    fn sdr_data_mut(&mut self) -> &mut Vec<u8> {
        &mut self.sdr_data
    }

    fn parsed_record_type(&self) -> u8 {
        Self::RECORD_TYPE
    }

    fn validate(&self) -> Result<(), Error> {
        validate_sensor(&self.sdr_data, Self::RECORD_TYPE, Self::ID_STRING_OFFSET)
    }

    fn record_key(&self) -> &[u8] {
        &self.sdr_data[5..8]
    }

    fn u8export(&self, self_ipmb_addr: u8, self_ipmb_channel: u8) -> Vec<u8> {
        export_sensor(
            &self.sdr_data,
            self.record_length(),
            self_ipmb_addr,
            self_ipmb_channel,
        )
    }
}

impl SensorRecord for EventOnlySensorRecord {
    fn sensor_fields(&self) -> &'static SensorFieldTable {
        &Self::FIELDS
    }

    fn id_string_offset(&self) -> usize {
        Self::ID_STRING_OFFSET
    }
}

impl SharedSensorFields for EventOnlySensorRecord {
    fn shared_fields(&self) -> &'static SharedFieldTable {
        &Self::SHARED_FIELDS
    }
}

/// A type 0x12 SDR: a management controller device locator.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct McDeviceLocatorRecord {
    sdr_data: Vec<u8>,
}

impl McDeviceLocatorRecord {
    pub const RECORD_TYPE: u8 = 0x12;
    pub const ID_STRING_OFFSET: usize = 15;

    pub fn new(sdr_data: Vec<u8>) -> Result<Self, Error> {
        validate_header(&sdr_data)?;
        if sdr_data[3] != Self::RECORD_TYPE {
            return Err(Error::WrongType {
                expected: Self::RECORD_TYPE,
                actual: sdr_data[3],
            });
        }
        if sdr_data.len() < Self::ID_STRING_OFFSET + 1 {
            return Err(Error::Truncated);
        }
        fields::field_length(&sdr_data[Self::ID_STRING_OFFSET..])
            .ok_or(Error::InvalidIdString)?;
        Ok(Self { sdr_data })
    }

    pub fn initialize_blank(name: &str) -> Result<Self, Error> {
        let sdr_data = blank_record(Self::RECORD_TYPE, Self::ID_STRING_OFFSET, name)?;
        Ok(Self { sdr_data })
    }

    sdr_field!(device_slave_address, set_device_slave_address, u8, 5, 7, 0);
    sdr_field!(channel, set_channel, u8, 6, 3, 0);
    sdr_field!(is_static, set_is_static, bool, 7, 5);
    sdr_field!(cap_chassis_device, set_cap_chassis_device, bool, 8, 7);
    sdr_field!(cap_bridge, set_cap_bridge, bool, 8, 6);
    sdr_field!(cap_ipmb_event_generator, set_cap_ipmb_event_generator, bool, 8, 5);
    sdr_field!(cap_ipmb_event_receiver, set_cap_ipmb_event_receiver, bool, 8, 4);
    sdr_field!(cap_fru_inventory_device, set_cap_fru_inventory_device, bool, 8, 3);
    sdr_field!(cap_sel_device, set_cap_sel_device, bool, 8, 2);
    sdr_field!(cap_sdr_repository_device, set_cap_sdr_repository_device, bool, 8, 1);
    sdr_field!(cap_sensor_device, set_cap_sensor_device, bool, 8, 0);
    sdr_field!(entity_id, set_entity_id, u8, 12, 7, 0);
    sdr_field!(entity_instance, set_entity_instance, u8, 13, 7, 0);
    sdr_field!(oem, set_oem, u8, 14, 7, 0);

    /// Decode the controller's name from its ID-string field.
    pub fn id_string(&self) -> String {
        fields::render(&self.sdr_data[Self::ID_STRING_OFFSET..])
    }
}

impl Record for McDeviceLocatorRecord {
    fn sdr_data(&self) -> &[u8] {
        &self.sdr_data
    }

    fn sdr_data_mut(&mut self) -> &mut Vec<u8> {
        &mut self.sdr_data
    }

    fn parsed_record_type(&self) -> u8 {
        Self::RECORD_TYPE
    }

    fn validate(&self) -> Result<(), Error> {
        validate_header(&self.sdr_data)
    }

    fn record_key(&self) -> &[u8] {
        &self.sdr_data[5..7]
    }

    fn u8export(&self, self_ipmb_addr: u8, self_ipmb_channel: u8) -> Vec<u8> {
        let mut out = self.sdr_data[..self.record_length()].to_vec();
        if out[5] == 0x00 {
            out[5] = self_ipmb_addr;
        }
        if out[6] & 0x0f == 0x00 {
            out[6] |= self_ipmb_channel & 0x0f;
        }
        out
    }
}
