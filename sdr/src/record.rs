// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

//! The SDR header, structural validation, and record-type dispatch.
//!
//! Every SDR begins with the same five-byte header:
//!
//! ```text
//! byte 0:  record ID, LS byte
//! byte 1:  record ID, MS byte
//! byte 2:  SDR version (0x51)
//! byte 3:  record type
//! byte 4:  number of remaining bytes
//! ```
//!
//! The record ID is positional bookkeeping assigned by the repository; the
//! record type selects which layout governs the remaining bytes.

use crate::sensor::CompactSensorRecord;
use crate::sensor::EventOnlySensorRecord;
use crate::sensor::FullSensorRecord;
use crate::sensor::McDeviceLocatorRecord;
use crate::Error;

/// The SDR format version this controller writes.
pub const SDR_VERSION: u8 = 0x51;

/// The length of the header common to every record type.
pub const HEADER_LEN: usize = 5;

/// Structurally validate the header of a raw SDR buffer: the header must be
/// present, the remaining-length byte must describe a representable record,
/// and the buffer must hold at least that many bytes.
pub fn validate_header(data: &[u8]) -> Result<(), Error> {
    if data.len() < HEADER_LEN {
        return Err(Error::HeaderTooShort(data.len()));
    }
    if 255 - data[4] < HEADER_LEN as u8 {
        return Err(Error::LengthOverflow(data[4]));
    }
    if data.len() < HEADER_LEN + usize::from(data[4]) {
        return Err(Error::Truncated);
    }
    Ok(())
}

/// Behavior common to every SDR variant.
///
/// Accessors other than `validate` require a structurally valid buffer; the
/// typed constructors guarantee this, so an index panic here indicates a
/// record mutated out from under its type.
pub trait Record {
    /// The raw record bytes, including the header.
    fn sdr_data(&self) -> &[u8];

    /// Mutable access to the raw record bytes.
    fn sdr_data_mut(&mut self) -> &mut Vec<u8>;

    /// The record-type byte this variant parses.
    fn parsed_record_type(&self) -> u8;

    /// Check the structural invariants of this record.
    fn validate(&self) -> Result<(), Error>;

    /// The bytes identifying this record for lookup and replacement,
    /// excluding the positional record ID.
    fn record_key(&self) -> &[u8];

    /// The positional record ID, assigned by the repository.
    fn record_id(&self) -> u16 {
        let data = self.sdr_data();
        (u16::from(data[1]) << 8) | u16::from(data[0])
    }

    fn set_record_id(&mut self, id: u16) {
        let data = self.sdr_data_mut();
        data[0] = id as u8;
        data[1] = (id >> 8) as u8;
    }

    /// The SDR format version byte.
    fn record_version(&self) -> u8 {
        self.sdr_data()[2]
    }

    /// The record-type byte as stored.
    fn record_type(&self) -> u8 {
        self.sdr_data()[3]
    }

    /// The total record length described by the header.
    fn record_length(&self) -> usize {
        HEADER_LEN + usize::from(self.sdr_data()[4])
    }

    /// Serialize this record to its wire form.
    ///
    /// A record written with a zero sensor owner describes "whoever exports
    /// me"; the exporter's own address and channel are substituted.
    fn u8export(&self, self_ipmb_addr: u8, self_ipmb_channel: u8) -> Vec<u8>;

    /// Compare the contents of two records, optionally ignoring the
    /// positional record IDs.
    fn identical_content(&self, other: &dyn Record, compare_record_id: bool) -> bool {
        let len = self.record_length();
        if len != other.record_length() {
            return false;
        }
        let mut a = self.sdr_data()[..len].to_vec();
        let mut b = other.sdr_data()[..len].to_vec();
        if !compare_record_id {
            a[0] = 0;
            a[1] = 0;
            b[0] = 0;
            b[1] = 0;
        }
        a == b
    }
}

/// A parsed Sensor Data Record of any supported type.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SdrRecord {
    /// Type 0x01: a full sensor record, with reading conversion factors.
    FullSensor(FullSensorRecord),
    /// Type 0x02: a compact sensor record, possibly describing a set of
    /// shared sensors.
    CompactSensor(CompactSensorRecord),
    /// Type 0x03: an event-only sensor record.
    EventOnlySensor(EventOnlySensorRecord),
    /// Type 0x12: a management controller device locator.
    McDeviceLocator(McDeviceLocatorRecord),
}

impl SdrRecord {
    /// View this record through the type-independent [`Record`] interface.
    pub fn as_record(&self) -> &dyn Record {
        match self {
            SdrRecord::FullSensor(r) => r,
            SdrRecord::CompactSensor(r) => r,
            SdrRecord::EventOnlySensor(r) => r,
            SdrRecord::McDeviceLocator(r) => r,
        }
    }

    pub fn as_record_mut(&mut self) -> &mut dyn Record {
        match self {
            SdrRecord::FullSensor(r) => r,
            SdrRecord::CompactSensor(r) => r,
            SdrRecord::EventOnlySensor(r) => r,
            SdrRecord::McDeviceLocator(r) => r,
        }
    }

    pub fn record_id(&self) -> u16 {
        self.as_record().record_id()
    }

    pub fn set_record_id(&mut self, id: u16) {
        self.as_record_mut().set_record_id(id)
    }

    pub fn record_type(&self) -> u8 {
        self.as_record().record_type()
    }

    pub fn record_length(&self) -> usize {
        self.as_record().record_length()
    }

    pub fn record_key(&self) -> &[u8] {
        self.as_record().record_key()
    }

    pub fn validate(&self) -> Result<(), Error> {
        self.as_record().validate()
    }

    pub fn u8export(&self, self_ipmb_addr: u8, self_ipmb_channel: u8) -> Vec<u8> {
        self.as_record().u8export(self_ipmb_addr, self_ipmb_channel)
    }

    pub fn identical_content(&self, other: &SdrRecord, compare_record_id: bool) -> bool {
        self.as_record()
            .identical_content(other.as_record(), compare_record_id)
    }
}

/// Parse a raw SDR buffer into the variant its record-type byte selects.
///
/// Unrecognized record types are a recoverable error, not a crash; the caller
/// decides whether to skip or reject them.
pub fn interpret(data: &[u8]) -> Result<SdrRecord, Error> {
    validate_header(data)?;
    match data[3] {
        FullSensorRecord::RECORD_TYPE => {
            Ok(SdrRecord::FullSensor(FullSensorRecord::new(data.to_vec())?))
        }
        CompactSensorRecord::RECORD_TYPE => Ok(SdrRecord::CompactSensor(
            CompactSensorRecord::new(data.to_vec())?,
        )),
        EventOnlySensorRecord::RECORD_TYPE => Ok(SdrRecord::EventOnlySensor(
            EventOnlySensorRecord::new(data.to_vec())?,
        )),
        McDeviceLocatorRecord::RECORD_TYPE => Ok(SdrRecord::McDeviceLocator(
            McDeviceLocatorRecord::new(data.to_vec())?,
        )),
        record_type => Err(Error::UnrecognizedType(record_type)),
    }
}

#[cfg(test)]
mod tests {
    use super::interpret;
    use super::validate_header;
    use super::HEADER_LEN;
    use crate::sensor::EventOnlySensorRecord;
    use crate::sensor::SensorRecord;
    use crate::Error;
    use crate::Record;
    use crate::SdrRecord;

    #[test]
    fn test_validate_header() {
        assert_eq!(
            validate_header(&[0, 0, 0x51]).unwrap_err(),
            Error::HeaderTooShort(3)
        );
        assert_eq!(
            validate_header(&[0, 0, 0x51, 0x01, 0xfc]).unwrap_err(),
            Error::LengthOverflow(0xfc)
        );
        assert_eq!(
            validate_header(&[0, 0, 0x51, 0x01, 2, 0xaa]).unwrap_err(),
            Error::Truncated
        );
        validate_header(&[0, 0, 0x51, 0x01, 1, 0xaa]).unwrap();
    }

    #[test]
    fn test_interpret_unknown_type() {
        let data = [0, 0, 0x51, 0x7f, 0];
        assert_eq!(
            interpret(&data).unwrap_err(),
            Error::UnrecognizedType(0x7f)
        );
    }

    #[test]
    fn test_interpret_round_trip() {
        let record = EventOnlySensorRecord::initialize_blank("PSU").unwrap();
        let parsed = interpret(record.sdr_data()).unwrap();
        match &parsed {
            SdrRecord::EventOnlySensor(r) => assert_eq!(r.id_string(), "PSU"),
            other => panic!("wrong variant: {other:?}"),
        }
        assert_eq!(parsed.record_length(), record.record_length());
    }

    #[test]
    fn test_record_id_round_trip() {
        let mut record = EventOnlySensorRecord::initialize_blank("T0").unwrap();
        assert_eq!(record.record_id(), 0);
        record.set_record_id(0x1234);
        assert_eq!(record.record_id(), 0x1234);
        // LS byte first on the wire.
        assert_eq!(record.sdr_data()[0], 0x34);
        assert_eq!(record.sdr_data()[1], 0x12);
    }

    #[test]
    fn test_identical_content_ignores_record_id() {
        let a = EventOnlySensorRecord::initialize_blank("FAN").unwrap();
        let mut b = a.clone();
        b.set_record_id(7);
        assert!(a.identical_content(&b, false));
        assert!(!a.identical_content(&b, true));
        assert_eq!(a.record_length(), HEADER_LEN + usize::from(a.sdr_data()[4]));
    }
}
