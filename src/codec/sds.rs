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
//! MIDI Sample Dump Standard sysex dumps.
//!
//! A dump is a 21-byte dump header followed by 127-byte data packets, each
//! carrying 120 bytes of 7-bit data: 40 sixteen-bit words packed three bytes
//! per word.

use tracing::debug;

use super::error::DecodeError;
use super::{ContainerDecoder, ContainerKind, DecodeOptions, Decoded, Metadata};
use crate::audio::Sample;
use crate::slices::rescale_position;

const FORMAT: &str = "SDS";

const SYSEX_START: u8 = 0xF0;
const SYSEX_END: u8 = 0xF7;
const NON_REALTIME: u8 = 0x7E;
const DUMP_HEADER: u8 = 0x01;
const DATA_PACKET: u8 = 0x02;

const HEADER_SIZE: usize = 21;
const PACKET_SIZE: usize = 127;
const PACKET_DATA: std::ops::Range<usize> = 5..125;

const MIN_RATE: u32 = 4000;
const MAX_RATE: u32 = 96000;

const LOOP_OFF: u8 = 0x7F;

/// Loop information from the dump header, in frames at the working rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SdsLoop {
    pub start: usize,
    pub end: usize,
    /// 0 forward, 1 alternating.
    pub loop_type: u8,
}

/// Reads a 21-bit little-endian value stored in three 7-bit bytes.
fn read_7bit(bytes: &[u8]) -> u32 {
    (bytes[0] as u32 & 0x7F) | ((bytes[1] as u32 & 0x7F) << 7) | ((bytes[2] as u32 & 0x7F) << 14)
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SdsDecoder;

impl ContainerDecoder for SdsDecoder {
    fn kind(&self) -> ContainerKind {
        ContainerKind::Sds
    }

    fn matches(&self, bytes: &[u8]) -> bool {
        bytes.len() >= HEADER_SIZE
            && bytes[0] == SYSEX_START
            && bytes[1] == NON_REALTIME
            && bytes[3] == DUMP_HEADER
            && bytes[HEADER_SIZE - 1] == SYSEX_END
    }

    fn decode(&self, bytes: &[u8], options: &DecodeOptions) -> Result<Decoded, DecodeError> {
        if !self.matches(bytes) {
            return Err(DecodeError::FormatMismatch(FORMAT));
        }

        let bits = bytes[6];
        if bits != 16 {
            return Err(DecodeError::unsupported(FORMAT, format!("{} bits", bits)));
        }
        let period_ns = read_7bit(&bytes[7..10]);
        if period_ns == 0 {
            return Err(DecodeError::malformed(FORMAT, "sample period is 0"));
        }
        let sample_rate = (1e9 / period_ns as f64).round() as u32;
        if !(MIN_RATE..=MAX_RATE).contains(&sample_rate) {
            return Err(DecodeError::unsupported(
                FORMAT,
                format!("sample rate {}Hz", sample_rate),
            ));
        }
        let length = read_7bit(&bytes[10..13]) as usize;
        let loop_start = read_7bit(&bytes[13..16]) as usize;
        let loop_end = read_7bit(&bytes[16..19]) as usize;
        let loop_type = bytes[19];

        let mut data = Vec::with_capacity(length);
        let mut offset = HEADER_SIZE;
        let mut packets = 0usize;
        while offset + PACKET_SIZE <= bytes.len() && data.len() < length {
            let packet = &bytes[offset..offset + PACKET_SIZE];
            if packet[0] != SYSEX_START || packet[1] != NON_REALTIME || packet[3] != DATA_PACKET {
                // Resynchronize on the next sysex start.
                offset += 1;
                continue;
            }
            for word in packet[PACKET_DATA].chunks_exact(3) {
                let raw = ((word[0] as i32) << 9) | ((word[1] as i32) << 2) | ((word[2] as i32) >> 5);
                data.push((raw - 0x8000) as f32 / 32768.0);
            }
            packets += 1;
            offset += PACKET_SIZE;
        }
        if packets == 0 {
            return Err(DecodeError::malformed(FORMAT, "no data packets"));
        }

        data.truncate(length);
        // The last packets of a dump are padding in practice.
        let keep = data.len() - data.len() / 24;
        data.truncate(keep);
        debug!(
            sample_rate,
            packets,
            frames = data.len(),
            declared = length,
            "Decoded SDS dump"
        );

        let sds_loop = (loop_type != LOOP_OFF && loop_start < loop_end && loop_end <= keep).then(
            || SdsLoop {
                start: rescale_position(loop_start, sample_rate, options.working_rate),
                end: rescale_position(loop_end, sample_rate, options.working_rate),
                loop_type,
            },
        );

        let sample = Sample::mono(data, sample_rate)?.with_source(sample_rate, bits as u16);
        let metadata = Metadata {
            sds_loop,
            ..Metadata::default()
        };
        Decoded::from_native(ContainerKind::Sds, sample, None, metadata, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::ResampleQuality;
    use crate::codec::error::FailureKind;

    fn write_7bit(value: u32) -> [u8; 3] {
        [
            (value & 0x7F) as u8,
            ((value >> 7) & 0x7F) as u8,
            ((value >> 14) & 0x7F) as u8,
        ]
    }

    /// Builds a dump of `words` at `rate`.
    fn dump(words: &[i32], rate: u32, bits: u8) -> Vec<u8> {
        let period = (1e9 / rate as f64).round() as u32;
        let mut bytes = vec![SYSEX_START, NON_REALTIME, 0, DUMP_HEADER, 0, 0, bits];
        bytes.extend_from_slice(&write_7bit(period));
        bytes.extend_from_slice(&write_7bit(words.len() as u32));
        bytes.extend_from_slice(&write_7bit(0));
        bytes.extend_from_slice(&write_7bit(0));
        bytes.push(LOOP_OFF);
        bytes.push(SYSEX_END);

        for (number, packet_words) in words.chunks(40).enumerate() {
            let mut packet = vec![SYSEX_START, NON_REALTIME, 0, DATA_PACKET, number as u8 & 0x7F];
            for i in 0..40 {
                let word = packet_words.get(i).copied().unwrap_or(0) + 0x8000;
                packet.push(((word >> 9) & 0x7F) as u8);
                packet.push(((word >> 2) & 0x7F) as u8);
                packet.push(((word & 0x3) << 5) as u8);
            }
            packet.push(0);
            packet.push(SYSEX_END);
            bytes.extend_from_slice(&packet);
        }
        bytes
    }

    fn options() -> DecodeOptions {
        DecodeOptions {
            working_rate: 44100,
            quality: ResampleQuality::Fast,
        }
    }

    #[test]
    fn test_decodes_words_and_trims_tail() {
        let words: Vec<i32> = (0..240).map(|i| (i - 120) * 200).collect();
        let bytes = dump(&words, 44100, 16);
        let decoded = SdsDecoder.decode(&bytes, &options()).unwrap();

        assert_eq!(decoded.kind, ContainerKind::Sds);
        assert_eq!(decoded.sample.len(), 240 - 10);
        assert_eq!(decoded.sample.channels()[0][0], -24000.0 / 32768.0);
        assert_eq!(decoded.sample.channels()[0][130], 2000.0 / 32768.0);
        assert_eq!(decoded.slices, None);
    }

    #[test]
    fn test_resamples_to_working_rate() {
        let words = vec![0; 400];
        let bytes = dump(&words, 22050, 16);
        let decoded = SdsDecoder.decode(&bytes, &options()).unwrap();
        assert_eq!(decoded.sample.sample_rate(), 44100);
        assert_eq!(decoded.sample.source_sample_rate(), 22050);
        assert!(decoded.sample.len() >= 2 * (400 - 16) - 4);
    }

    #[test]
    fn test_rejections() {
        let words = vec![0; 40];
        assert_eq!(
            SdsDecoder
                .decode(&dump(&words, 44100, 12), &options())
                .unwrap_err()
                .kind(),
            FailureKind::UnsupportedVariant
        );
        assert_eq!(
            SdsDecoder
                .decode(&dump(&words, 2000, 16), &options())
                .unwrap_err()
                .kind(),
            FailureKind::UnsupportedVariant
        );
        let header_only = &dump(&words, 44100, 16)[..HEADER_SIZE];
        assert_eq!(
            SdsDecoder.decode(header_only, &options()).unwrap_err().kind(),
            FailureKind::MalformedData
        );
        assert_eq!(
            SdsDecoder.decode(b"RIFF", &options()).unwrap_err().kind(),
            FailureKind::FormatMismatch
        );
    }
}
