// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

//! The Sensor Data Record repository.
//!
//! Records are stored in positional order: record IDs are always exactly
//! `0..len`, reassigned after every structural change. Readers iterating the
//! repository over the management bus guard against concurrent mutation with
//! a reservation ID; any mutation invalidates outstanding reservations, so a
//! reader caught mid-iteration fails its next reserved operation and starts
//! over rather than seeing renumbered records.

use crate::record::interpret;
use crate::record::HEADER_LEN;
use crate::Error;
use crate::SdrRecord;
use std::sync::Arc;
use std::sync::Mutex;

/// A repository reservation token, obtained from
/// [`SensorDataRepository::reserve`].
pub type ReservationId = u8;

#[derive(Debug, Default)]
struct Inner {
    records: Vec<Arc<SdrRecord>>,
    reservation: ReservationId,
}

impl Inner {
    fn check_reservation(&self, supplied: ReservationId) -> Result<(), Error> {
        if supplied != self.reservation {
            return Err(Error::StaleReservation {
                supplied,
                current: self.reservation,
            });
        }
        Ok(())
    }

    // Reassign positional record IDs after a structural change, and
    // invalidate outstanding reservations.
    fn renumber(&mut self) {
        for (id, record) in self.records.iter_mut().enumerate() {
            Arc::make_mut(record).set_record_id(id as u16);
        }
        self.reservation = self.reservation.wrapping_add(1);
    }
}

/// An ordered, mutex-guarded store of Sensor Data Records.
///
/// Records handed out by [`get`](Self::get) and [`find`](Self::find) are
/// shared immutable snapshots; the repository copies on write, so holding one
/// across a mutation is safe and requires no lock.
#[derive(Debug, Default)]
pub struct SensorDataRepository {
    inner: Mutex<Inner>,
}

impl SensorDataRepository {
    /// Create an empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance and return the reservation counter. Call before a read-modify-
    /// write sequence; every mutating operation requires the current value.
    pub fn reserve(&self) -> ReservationId {
        let mut inner = self.inner.lock().unwrap();
        inner.reservation = inner.reservation.wrapping_add(1);
        inner.reservation
    }

    /// The reservation that mutating operations currently require.
    pub fn current_reservation(&self) -> ReservationId {
        self.inner.lock().unwrap().reservation
    }

    /// Add a record, replacing any existing record with the same type and key
    /// bytes. Returns the record ID the record holds after renumbering.
    ///
    /// Fails without mutating if the record is structurally invalid or the
    /// reservation is stale.
    pub fn add(&self, record: SdrRecord, reservation: ReservationId) -> Result<u16, Error> {
        record.validate()?;
        let mut inner = self.inner.lock().unwrap();
        inner.check_reservation(reservation)?;
        let position = inner.records.iter().position(|existing| {
            existing.record_type() == record.record_type()
                && existing.record_key() == record.record_key()
        });
        let id = match position {
            Some(position) => {
                inner.records[position] = Arc::new(record);
                position
            }
            None => {
                inner.records.push(Arc::new(record));
                inner.records.len() - 1
            }
        };
        inner.renumber();
        Ok(id as u16)
    }

    /// Remove the record with the given positional ID. Returns true if a
    /// record was removed.
    pub fn remove(&self, id: u16, reservation: ReservationId) -> Result<bool, Error> {
        let mut inner = self.inner.lock().unwrap();
        inner.check_reservation(reservation)?;
        if usize::from(id) >= inner.records.len() {
            return Ok(false);
        }
        inner.records.remove(usize::from(id));
        inner.renumber();
        Ok(true)
    }

    /// Remove every record matching the type and key bytes of `record`.
    /// Returns true if at least one record was removed.
    pub fn remove_by_key(
        &self,
        record: &SdrRecord,
        reservation: ReservationId,
    ) -> Result<bool, Error> {
        let mut inner = self.inner.lock().unwrap();
        inner.check_reservation(reservation)?;
        let before = inner.records.len();
        inner.records.retain(|existing| {
            existing.record_type() != record.record_type()
                || existing.record_key() != record.record_key()
        });
        let removed = inner.records.len() != before;
        if removed {
            inner.renumber();
        }
        Ok(removed)
    }

    /// Erase the contents of the repository.
    pub fn clear(&self, reservation: ReservationId) -> Result<(), Error> {
        let mut inner = self.inner.lock().unwrap();
        inner.check_reservation(reservation)?;
        inner.records.clear();
        inner.renumber();
        Ok(())
    }

    /// Retrieve the record with the given positional ID.
    pub fn get(&self, id: u16) -> Option<Arc<SdrRecord>> {
        let inner = self.inner.lock().unwrap();
        inner.records.get(usize::from(id)).cloned()
    }

    /// Retrieve the first record whose key bytes equal `key`.
    pub fn find(&self, key: &[u8]) -> Option<Arc<SdrRecord>> {
        let inner = self.inner.lock().unwrap();
        inner
            .records
            .iter()
            .find(|record| record.record_key() == key)
            .cloned()
    }

    /// The number of records currently stored.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot the record list for iteration or analysis.
    pub fn records(&self) -> Vec<Arc<SdrRecord>> {
        self.inner.lock().unwrap().records.clone()
    }

    /// Serialize the repository to the concatenated-record SDR image form.
    ///
    /// Records describing this controller's own sensors with a zero owner
    /// export with `self_ipmb_addr` and `self_ipmb_channel` substituted.
    pub fn u8export(&self, self_ipmb_addr: u8, self_ipmb_channel: u8) -> Vec<u8> {
        let records = self.records();
        let mut out = Vec::new();
        for record in records {
            out.extend_from_slice(&record.u8export(self_ipmb_addr, self_ipmb_channel));
        }
        out
    }

    /// Replace the repository contents with the records in an SDR image.
    ///
    /// The whole image is parsed and validated before anything changes; a
    /// malformed or unrecognized record anywhere in the image fails the
    /// import and leaves the repository untouched. Returns the number of
    /// records imported.
    pub fn u8import(&self, data: &[u8], reservation: ReservationId) -> Result<usize, Error> {
        let mut imported = Vec::new();
        let mut offset = 0;
        while offset < data.len() {
            let remaining = &data[offset..];
            if remaining.len() < HEADER_LEN {
                return Err(Error::MalformedImage(offset));
            }
            let record_len = HEADER_LEN + usize::from(remaining[4]);
            if remaining.len() < record_len {
                return Err(Error::MalformedImage(offset));
            }
            let record =
                interpret(&remaining[..record_len]).map_err(|_| Error::MalformedImage(offset))?;
            imported.push(Arc::new(record));
            offset += record_len;
        }

        let mut inner = self.inner.lock().unwrap();
        inner.check_reservation(reservation)?;
        let count = imported.len();
        inner.records = imported;
        inner.renumber();
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::SensorDataRepository;
    use crate::record::interpret;
    use crate::sensor::CompactSensorRecord;
    use crate::sensor::EventOnlySensorRecord;
    use crate::sensor::SensorRecord;
    use crate::Error;
    use crate::SdrRecord;

    fn sensor(name: &str, number: u8) -> SdrRecord {
        let mut record = EventOnlySensorRecord::initialize_blank(name).unwrap();
        record.set_sensor_owner_id(0x82).unwrap();
        record.set_sensor_number(number).unwrap();
        SdrRecord::EventOnlySensor(record)
    }

    #[test]
    fn test_add_renumbers_densely() {
        let repo = SensorDataRepository::new();
        for (i, name) in ["A", "B", "C"].iter().enumerate() {
            let reservation = repo.reserve();
            let id = repo.add(sensor(name, i as u8), reservation).unwrap();
            assert_eq!(id, i as u16);
        }
        for id in 0..3 {
            assert_eq!(repo.get(id).unwrap().record_id(), id);
        }
        assert!(repo.get(3).is_none());
    }

    #[test]
    fn test_add_replaces_same_key() {
        let repo = SensorDataRepository::new();
        let reservation = repo.reserve();
        repo.add(sensor("OLD", 4), reservation).unwrap();
        let reservation = repo.reserve();
        repo.add(sensor("NEW", 4), reservation).unwrap();

        assert_eq!(repo.len(), 1);
        match &*repo.get(0).unwrap() {
            SdrRecord::EventOnlySensor(r) => assert_eq!(r.id_string(), "NEW"),
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn test_remove_renumbers() {
        let repo = SensorDataRepository::new();
        for (i, name) in ["A", "B", "C"].iter().enumerate() {
            repo.add(sensor(name, i as u8), repo.reserve()).unwrap();
        }
        assert!(repo.remove(1, repo.reserve()).unwrap());
        assert_eq!(repo.len(), 2);
        for id in 0..2 {
            assert_eq!(repo.get(id).unwrap().record_id(), id);
        }
        // Removing a nonexistent ID reports false, not an error.
        assert!(!repo.remove(9, repo.reserve()).unwrap());
    }

    #[test]
    fn test_stale_reservation_rejected_without_mutation() {
        let repo = SensorDataRepository::new();
        let stale = repo.reserve();
        repo.add(sensor("A", 0), stale).unwrap();

        // The add invalidated `stale`; the repository must be byte-for-byte
        // unchanged by the failed operations below.
        let image = repo.u8export(0, 0);
        assert!(matches!(
            repo.add(sensor("B", 1), stale),
            Err(Error::StaleReservation { .. })
        ));
        assert!(matches!(
            repo.remove(0, stale),
            Err(Error::StaleReservation { .. })
        ));
        assert!(matches!(
            repo.clear(stale),
            Err(Error::StaleReservation { .. })
        ));
        assert!(matches!(
            repo.u8import(&image, stale),
            Err(Error::StaleReservation { .. })
        ));
        assert_eq!(repo.u8export(0, 0), image);
        assert_eq!(repo.len(), 1);
    }

    #[test]
    fn test_find_by_key() {
        let repo = SensorDataRepository::new();
        repo.add(sensor("A", 7), repo.reserve()).unwrap();
        repo.add(sensor("B", 9), repo.reserve()).unwrap();

        let found = repo.find(&[0x82, 0x00, 9]).unwrap();
        match &*found {
            SdrRecord::EventOnlySensor(r) => assert_eq!(r.id_string(), "B"),
            other => panic!("wrong variant: {other:?}"),
        }
        assert!(repo.find(&[0x82, 0x00, 0x55]).is_none());
    }

    #[test]
    fn test_snapshots_survive_mutation() {
        let repo = SensorDataRepository::new();
        repo.add(sensor("A", 0), repo.reserve()).unwrap();
        let snapshot = repo.get(0).unwrap();
        repo.clear(repo.reserve()).unwrap();
        // The held handle still reads the record as it was.
        assert_eq!(snapshot.record_id(), 0);
        assert_eq!(repo.len(), 0);
    }

    #[test]
    fn test_export_import_round_trip() {
        let repo = SensorDataRepository::new();
        repo.add(sensor("A", 0), repo.reserve()).unwrap();
        repo.add(sensor("B", 1), repo.reserve()).unwrap();
        let mut compact = CompactSensorRecord::initialize_blank("V12").unwrap();
        compact.set_sensor_owner_id(0x82).unwrap();
        compact.set_sensor_number(2).unwrap();
        repo.add(SdrRecord::CompactSensor(compact), repo.reserve())
            .unwrap();

        let image = repo.u8export(0x82, 0);

        let restored = SensorDataRepository::new();
        let count = restored.u8import(&image, restored.reserve()).unwrap();
        assert_eq!(count, 3);
        assert_eq!(restored.u8export(0x82, 0), image);

        // Each record survives individually as well.
        let mut offset = 0;
        while offset < image.len() {
            let record = interpret(&image[offset..]).unwrap();
            offset += record.record_length();
        }
        assert_eq!(offset, image.len());
    }

    #[test]
    fn test_import_is_atomic() {
        let repo = SensorDataRepository::new();
        repo.add(sensor("KEEP", 0), repo.reserve()).unwrap();
        let before = repo.u8export(0, 0);

        // A good record followed by a truncated one: nothing imports.
        let mut image = sensor("NEW", 1).u8export(0, 0);
        image.extend_from_slice(&[0x00, 0x00, 0x51]);
        let err = repo.u8import(&image, repo.reserve()).unwrap_err();
        assert!(matches!(err, Error::MalformedImage(_)));
        assert_eq!(repo.u8export(0, 0), before);

        // An unrecognized record type also fails the whole import.
        let mut image = sensor("NEW", 1).u8export(0, 0);
        image.extend_from_slice(&[0x00, 0x00, 0x51, 0x7f, 0x00]);
        assert!(repo.u8import(&image, repo.reserve()).is_err());
        assert_eq!(repo.u8export(0, 0), before);
    }
}
