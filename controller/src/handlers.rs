// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

//! Handlers for the Device SDR commands, serving the device SDR repository
//! to the shelf manager.

use crate::dispatch::CommandTable;
use crate::Ipmb;
use ipmc_messages::command::response_netfn;
use ipmc_messages::command::sensor_event;
use ipmc_messages::command::CompletionCode;
use ipmc_messages::message::IpmiMessage;
use ipmc_messages::MAX_DATA_LEN;
use ipmc_sdr::SensorDataRepository;
use std::sync::Arc;

// The record ID reported as "next" after the last record in the repository.
const LAST_RECORD_ID: u16 = 0xffff;

fn reply_with(bus: &dyn Ipmb, request: &IpmiMessage, data: &[u8]) {
    let mut reply = request.prepare_reply();
    reply.net_fn = response_netfn(reply.net_fn);
    // Data is bounded by construction in the handlers below.
    reply.set_data(data).expect("reply data within bounds");
    bus.send(reply);
}

fn reply_code(bus: &dyn Ipmb, request: &IpmiMessage, code: CompletionCode) {
    reply_with(bus, request, &[code.into()]);
}

/// Register the Device SDR commands (Get Device SDR Info, Reserve Device SDR
/// Repository, Get Device SDR) against `repository`.
pub fn register_sdr_commands(table: &CommandTable, repository: Arc<SensorDataRepository>) {
    let repo = Arc::clone(&repository);
    table.register(
        sensor_event::GET_DEVICE_SDR_INFO,
        Some(Arc::new(move |bus, message| {
            let count = repo.len().min(0xff) as u8;
            // Static sensor population, LUN 0 only.
            reply_with(
                bus,
                message,
                &[CompletionCode::Success.into(), count, 0x01],
            );
        })),
    );

    let repo = Arc::clone(&repository);
    table.register(
        sensor_event::RESERVE_DEVICE_SDR_REPOSITORY,
        Some(Arc::new(move |bus, message| {
            let reservation = repo.reserve();
            reply_with(
                bus,
                message,
                &[CompletionCode::Success.into(), reservation, 0x00],
            );
        })),
    );

    let repo = Arc::clone(&repository);
    table.register(
        sensor_event::GET_DEVICE_SDR,
        Some(Arc::new(move |bus, message| {
            // Request: reservation ID (2), record ID (2), offset, count.
            let request = message.data();
            if request.len() != 6 {
                reply_code(bus, message, CompletionCode::RequestDataLengthInvalid);
                return;
            }
            let reservation = request[0];
            let record_id = u16::from(request[2]) | (u16::from(request[3]) << 8);
            let offset = usize::from(request[4]);
            let count = usize::from(request[5]);

            // A reservation is only required for partial reads.
            if offset != 0 && reservation != repo.current_reservation() {
                reply_code(bus, message, CompletionCode::ReservationCancelled);
                return;
            }

            let Some(record) = repo.get(record_id) else {
                reply_code(bus, message, CompletionCode::RequestedDataNotPresent);
                return;
            };
            let image = record.u8export(bus.local_address(), 0);
            if offset >= image.len() {
                reply_code(bus, message, CompletionCode::ParameterOutOfRange);
                return;
            }
            let end = image.len().min(offset + count);
            // Two bytes of next-record ID share the frame with the record
            // data.
            if 2 + (end - offset) > MAX_DATA_LEN - 1 {
                reply_code(bus, message, CompletionCode::CannotReturnRequestedBytes);
                return;
            }

            let next = if usize::from(record_id) + 1 < repo.len() {
                record_id + 1
            } else {
                LAST_RECORD_ID
            };
            let mut data = vec![CompletionCode::Success.into(), next as u8, (next >> 8) as u8];
            data.extend_from_slice(&image[offset..end]);
            reply_with(bus, message, &data);
        })),
    );
}
