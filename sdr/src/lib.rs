// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

//! Sensor Data Records: the binary descriptors a shelf manager reads to learn
//! what sensors this controller carries, and the repository that stores them.

pub mod field;
pub mod record;
pub mod repository;
pub mod sensor;

pub use record::interpret;
pub use record::Record;
pub use record::SdrRecord;
pub use repository::SensorDataRepository;

use thiserror::Error;

/// An error related to decoding, mutating or storing a Sensor Data Record.
#[derive(Clone, Copy, Debug, Error, Eq, PartialEq)]
pub enum Error {
    /// The buffer is shorter than the five-byte SDR header.
    #[error("SDR shorter than the required header ({0} bytes)")]
    HeaderTooShort(usize),

    /// The header's remaining-length byte describes a record no buffer could
    /// hold.
    #[error("SDR claims to be too long ({0} remaining bytes)")]
    LengthOverflow(u8),

    /// The buffer is shorter than the header's remaining-length byte claims.
    #[error("SDR shorter than specified in its header")]
    Truncated,

    /// The record-type byte is not one this controller interprets.
    #[error("unrecognized SDR record type {0:#04x}")]
    UnrecognizedType(u8),

    /// The buffer does not carry the record type the caller asked for.
    #[error("SDR record type {actual:#04x} where {expected:#04x} was required")]
    WrongType { expected: u8, actual: u8 },

    /// The sensor ID-string Type/Length field is malformed or overruns the
    /// record.
    #[error("invalid sensor ID string")]
    InvalidIdString,

    /// A value does not fit in the bit field it is destined for.
    #[error("value {value:#x} does not fit in a {bits}-bit field")]
    FieldWidth { value: u16, bits: u8 },

    /// Sensor names are limited to sixteen characters by the SDR format.
    #[error("sensor name longer than 16 characters")]
    NameTooLong,

    /// A repository mutation presented a reservation that is no longer
    /// current. The caller must re-reserve and restart its read-modify-write.
    #[error("stale SDR repository reservation {supplied} (current {current})")]
    StaleReservation { supplied: u8, current: u8 },

    /// An SDR repository image failed validation partway through; no records
    /// were imported.
    #[error("malformed SDR repository image at offset {0}")]
    MalformedImage(usize),
}
