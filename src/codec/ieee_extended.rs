// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
//! The 80-bit IEEE 754 extended sample rate field of the AIFF `COMM` chunk.
//!
//! Only the rates below are read or written. The bytes are matched exactly,
//! since hardware readers compare them verbatim.

/// Leading bytes of each supported rate; the remaining six bytes are zero.
const RATE_TABLE: [(u32, [u8; 4]); 13] = [
    (8000, [64, 11, 250, 0]),
    (11025, [64, 12, 172, 68]),
    (12000, [64, 12, 187, 128]),
    (16000, [64, 12, 250, 0]),
    (22050, [64, 13, 172, 68]),
    (24000, [64, 13, 187, 128]),
    (32000, [64, 13, 250, 0]),
    (44100, [64, 14, 172, 68]),
    (48000, [64, 14, 187, 128]),
    (88200, [64, 15, 172, 68]),
    (96000, [64, 15, 187, 128]),
    (176400, [64, 16, 172, 68]),
    (192000, [64, 16, 187, 128]),
];

/// Encodes `rate`, or `None` when the rate has no table entry.
pub fn encode_rate(rate: u32) -> Option<[u8; 10]> {
    RATE_TABLE
        .iter()
        .find(|(r, _)| *r == rate)
        .map(|(_, head)| {
            let mut bytes = [0u8; 10];
            bytes[..4].copy_from_slice(head);
            bytes
        })
}

/// Decodes a 10-byte rate field, or `None` when it matches no table entry.
pub fn decode_rate(bytes: &[u8]) -> Option<u32> {
    if bytes.len() < 10 || bytes[4..10].iter().any(|&b| b != 0) {
        return None;
    }
    RATE_TABLE
        .iter()
        .find(|(_, head)| head.as_slice() == &bytes[..4])
        .map(|(rate, _)| *rate)
}

/// Every rate that can be encoded.
pub fn supported_rates() -> impl Iterator<Item = u32> {
    RATE_TABLE.iter().map(|(rate, _)| *rate)
}
