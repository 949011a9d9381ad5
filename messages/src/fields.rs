// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

//! The IPMI Type/Length field codec.
//!
//! SDR and FRU records embed variable-length strings as a single header byte
//! (tag in the top two bits, byte count in the low six) followed by the
//! payload. Four encodings exist: raw binary, packed BCD-plus, packed 6-bit
//! ASCII, and plain 8-bit ASCII. The decoder handles all four; the encoder
//! only ever emits 8-bit ASCII, since consumers are required to decode every
//! tag and nothing here benefits from the packed forms.

/// The Type/Length header byte that terminates a list of fields in FRU data:
/// an 8-bit-ASCII tag with length one. Encoders must avoid producing it for
/// real content.
pub const END_OF_FIELDS: u8 = 0xc1;

/// The marker rendered for a field whose header claims more payload than is
/// present.
const INVALID_FIELD: &str = "<invalid type/length field>";

/// BCD-plus nibble values, per IPMI2 section 43.15.
const BCD_PLUS: &[u8; 16] = b"0123456789 -.???";

/// Return the total length (header plus payload) of the Type/Length field at
/// the start of `data`, or `None` if `data` is too short to contain the field
/// its header describes.
pub fn field_length(data: &[u8]) -> Option<usize> {
    let header = data.first()?;
    let length = 1 + usize::from(header & 0x3f);
    if length > data.len() {
        None
    } else {
        Some(length)
    }
}

/// Decode the Type/Length field at the start of `data` into a human-readable
/// string.
///
/// Binary fields render as space-separated hex bytes. A field whose header
/// overruns `data` renders as an explicit invalid marker rather than garbage.
pub fn render(data: &[u8]) -> String {
    let Some(total) = field_length(data) else {
        return INVALID_FIELD.to_string();
    };
    let payload = &data[1..total];
    match data[0] >> 6 {
        0b00 => {
            // Binary or unspecified.
            payload
                .iter()
                .map(|b| format!("0x{b:02x}"))
                .collect::<Vec<_>>()
                .join(" ")
        }
        0b01 => {
            let mut out = String::with_capacity(payload.len() * 2);
            for byte in payload {
                out.push(BCD_PLUS[usize::from(byte >> 4)] as char);
                out.push(BCD_PLUS[usize::from(byte & 0x0f)] as char);
            }
            out
        }
        0b10 => render_six_bit(payload),
        _ => String::from_utf8_lossy(payload).into_owned(),
    }
}

// Unpack 6-bit ASCII: characters are packed LSbit-first, four to every three
// bytes, and offset from 0x20.
fn render_six_bit(payload: &[u8]) -> String {
    let count = payload.len() * 8 / 6;
    let mut out = String::with_capacity(count);
    for i in 0..count {
        let offset = i * 6;
        let byte = offset / 8;
        let shift = offset % 8;
        let mut value = payload[byte] >> shift;
        if shift > 2 {
            value |= payload[byte + 1] << (8 - shift);
        }
        out.push((0x20 + (value & 0x3f)) as char);
    }
    out
}

/// Encode `text` as an 8-bit-ASCII Type/Length field.
///
/// Content beyond the 63 bytes a header can describe is trimmed. If the
/// encoded field would consist of exactly one byte, its header would equal
/// [`END_OF_FIELDS`]; with `prevent_c1` set, a trailing space is appended so
/// the field cannot be mistaken for a list terminator.
pub fn encode(text: &str, prevent_c1: bool) -> Vec<u8> {
    let mut payload = text.as_bytes().to_vec();
    payload.truncate(63);
    if payload.len() == 1 && prevent_c1 {
        payload.push(b' ');
    }
    let mut out = Vec::with_capacity(1 + payload.len());
    out.push(0xc0 | payload.len() as u8);
    out.extend_from_slice(&payload);
    out
}
