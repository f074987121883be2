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
//! AIFF decoding and encoding, including the OP-1 `APPL` patch chunk.

use std::io::Write;

use byteorder::{BigEndian, ByteOrder, LittleEndian, WriteBytesExt};
use tracing::{debug, warn};

use super::chunk::{self, Endian};
use super::error::{DecodeError, EncodeError};
use super::ieee_extended;
use super::{ContainerDecoder, ContainerKind, DecodeOptions, Decoded, Metadata, SliceSource};
use crate::audio::channels::interleave_channels;
use crate::audio::{BitDepth, Sample};
use crate::slices::op1::Op1Patch;
use crate::slices::SliceMarker;

const FORMAT: &str = "AIFF";

const COMM: &[u8; 4] = b"COMM";
const APPL: &[u8; 4] = b"APPL";
const SSND: &[u8; 4] = b"SSND";
const OP1_SIGNATURE: &[u8; 4] = b"op-1";

/// Total size of the `APPL` chunk including its header.
pub const APPL_CHUNK_SIZE: usize = 4104;

/// Room for the patch JSON after the signature.
const APPL_JSON_CAPACITY: usize = APPL_CHUNK_SIZE - 8 - OP1_SIGNATURE.len();

/// The common chunk fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Common {
    channels: u16,
    frames: u32,
    bits: u16,
    sample_rate: u32,
    little_endian: bool,
}

impl Common {
    fn parse(data: &[u8], aifc: bool) -> Result<Self, DecodeError> {
        if data.len() < 18 {
            return Err(DecodeError::malformed(FORMAT, "COMM chunk is too short"));
        }
        let channels = BigEndian::read_u16(&data[0..2]);
        let frames = BigEndian::read_u32(&data[2..6]);
        let bits = BigEndian::read_u16(&data[6..8]);
        let sample_rate = ieee_extended::decode_rate(&data[8..18]).ok_or_else(|| {
            DecodeError::unsupported(FORMAT, format!("sample rate bytes {:?}", &data[8..12]))
        })?;

        let little_endian = match (aifc, data.get(18..22)) {
            (true, Some(b"sowt")) => true,
            (true, Some(b"NONE" | b"twos")) | (true, None) | (false, _) => false,
            (true, Some(other)) => {
                return Err(DecodeError::unsupported(
                    FORMAT,
                    format!("compression {}", String::from_utf8_lossy(other)),
                ))
            }
        };

        if bits != 16 {
            return Err(DecodeError::unsupported(FORMAT, format!("{} bits", bits)));
        }
        if channels < 1 {
            return Err(DecodeError::unsupported(FORMAT, "no channels"));
        }

        Ok(Common {
            channels,
            frames,
            bits,
            sample_rate,
            little_endian,
        })
    }
}

/// Decoder for AIFF and uncompressed AIFC files.
#[derive(Debug, Default, Clone, Copy)]
pub struct AiffDecoder;

impl ContainerDecoder for AiffDecoder {
    fn kind(&self) -> ContainerKind {
        ContainerKind::Aiff
    }

    fn matches(&self, bytes: &[u8]) -> bool {
        bytes.len() >= 12 && &bytes[0..4] == b"FORM" && matches!(&bytes[8..12], b"AIFF" | b"AIFC")
    }

    fn decode(&self, bytes: &[u8], options: &DecodeOptions) -> Result<Decoded, DecodeError> {
        if !self.matches(bytes) {
            return Err(DecodeError::FormatMismatch(FORMAT));
        }
        let aifc = &bytes[8..12] == b"AIFC";

        let chunks = chunk::scan(bytes, 12, &[COMM, APPL, SSND], Endian::Big);
        let common = chunk::first(&chunks, COMM)
            .ok_or_else(|| DecodeError::malformed(FORMAT, "missing COMM chunk"))
            .and_then(|comm| Common::parse(comm.data, aifc))?;
        let ssnd = chunk::first(&chunks, SSND)
            .ok_or_else(|| DecodeError::malformed(FORMAT, "missing SSND chunk"))?;
        if ssnd.data.len() < 8 {
            return Err(DecodeError::malformed(FORMAT, "SSND chunk is too short"));
        }

        let offset = BigEndian::read_u32(&ssnd.data[0..4]) as usize;
        let audio = ssnd.data.get(8 + offset..).unwrap_or(&[]);
        let channels = common.channels as usize;
        let available = audio.len() / (2 * channels);
        let frames = available.min(common.frames as usize);
        if frames < common.frames as usize {
            debug!(
                declared = common.frames,
                available, "AIFF sound data is shorter than declared"
            );
        }

        let mut planar = vec![Vec::with_capacity(frames); channels];
        for frame in audio.chunks_exact(2 * channels).take(frames) {
            for (channel, bytes) in frame.chunks_exact(2).enumerate() {
                let value = if common.little_endian {
                    LittleEndian::read_i16(bytes)
                } else {
                    BigEndian::read_i16(bytes)
                };
                planar[channel].push(value as f32 / 32768.0);
            }
        }
        if planar.len() > 2 {
            warn!(channels, "Only the first two AIFF channels are kept");
            planar.truncate(2);
        }
        let stereo = planar.len() == 2;
        let sample =
            Sample::new(planar, common.sample_rate)?.with_source(common.sample_rate, common.bits);

        let patch = chunk::all(&chunks, APPL)
            .filter_map(|appl| appl.data.strip_prefix(OP1_SIGNATURE.as_slice()))
            .find_map(|json| match parse_patch(json) {
                Ok(patch) => Some(patch),
                Err(e) => {
                    warn!(err = %e, "Ignoring unreadable OP-1 patch");
                    None
                }
            });
        let slices = patch
            .as_ref()
            .map(|patch| patch.slices(options.working_rate, stereo))
            .filter(|slices| !slices.is_empty());

        let metadata = Metadata {
            slice_source: slices.as_ref().map(|_| SliceSource::Op1Patch),
            op1_patch: patch,
            ..Metadata::default()
        };
        Decoded::from_native(ContainerKind::Aiff, sample, slices, metadata, options)
    }
}

/// The patch JSON is padded with spaces (and sometimes NULs) to fill the chunk.
fn parse_patch(json: &[u8]) -> Result<Op1Patch, serde_json::Error> {
    let end = json
        .iter()
        .rposition(|&b| b != b' ' && b != 0 && b != b'\n')
        .map(|i| i + 1)
        .unwrap_or(0);
    serde_json::from_slice(&json[..end])
}

/// Encodes planar audio as a 16-bit AIFF with an OP-1 drum patch.
///
/// `slices` are frame offsets into `channels`; without slices the patch maps
/// the whole sample to the first key.
pub fn encode(
    channels: &[Vec<f32>],
    sample_rate: u32,
    bit_depth: BitDepth,
    slices: Option<&[SliceMarker]>,
    name: &str,
) -> Result<Vec<u8>, EncodeError> {
    if channels.is_empty() || channels.len() > 2 {
        return Err(EncodeError::UnsupportedChannels {
            format: FORMAT,
            channels: channels.len(),
        });
    }
    if bit_depth != BitDepth::Sixteen {
        return Err(EncodeError::UnsupportedBitDepth {
            format: FORMAT,
            bits: bit_depth.bits(),
        });
    }
    let rate_bytes =
        ieee_extended::encode_rate(sample_rate).ok_or(EncodeError::UnsupportedRate(sample_rate))?;

    let stereo = channels.len() == 2;
    let frames = channels[0].len();
    let whole = [SliceMarker::new(0, frames)];
    let slices = match slices {
        Some(slices) if !slices.is_empty() => slices,
        _ if frames > 0 => &whole[..],
        _ => &[],
    };
    let patch = Op1Patch::drum_kit(name, slices, sample_rate, stereo);
    let json = serde_json::to_vec(&patch)?;
    if json.len() > APPL_JSON_CAPACITY {
        return Err(EncodeError::MetadataTooLarge {
            format: FORMAT,
            size: json.len(),
            limit: APPL_JSON_CAPACITY,
        });
    }

    let mut comm = Vec::with_capacity(18);
    comm.write_u16::<BigEndian>(channels.len() as u16)?;
    comm.write_u32::<BigEndian>(frames as u32)?;
    comm.write_u16::<BigEndian>(16)?;
    comm.write_all(&rate_bytes)?;

    let mut appl = Vec::with_capacity(APPL_CHUNK_SIZE - 8);
    appl.write_all(OP1_SIGNATURE)?;
    appl.write_all(&json)?;
    appl.resize(APPL_CHUNK_SIZE - 8, b' ');

    let mut ssnd = Vec::with_capacity(8 + frames * channels.len() * 2);
    ssnd.write_u32::<BigEndian>(0)?;
    ssnd.write_u32::<BigEndian>(0)?;
    for value in interleave_channels(channels) {
        let value = value.clamp(-1.0, 1.0);
        let scaled = if value < 0.0 { value * 32768.0 } else { value * 32767.0 };
        ssnd.write_i16::<BigEndian>(scaled as i16)?;
    }

    let mut bytes = Vec::with_capacity(12 + 26 + APPL_CHUNK_SIZE + 8 + ssnd.len());
    bytes.write_all(b"FORM")?;
    bytes.write_u32::<BigEndian>(0)?;
    bytes.write_all(b"AIFF")?;
    chunk::write_chunk(&mut bytes, COMM, &comm, Endian::Big)?;
    chunk::write_chunk(&mut bytes, APPL, &appl, Endian::Big)?;
    chunk::write_chunk(&mut bytes, SSND, &ssnd, Endian::Big)?;

    let form_size = (bytes.len() - 8) as u32;
    BigEndian::write_u32(&mut bytes[4..8], form_size);
    debug!(
        frames,
        channels = channels.len(),
        sample_rate,
        slices = slices.len(),
        "Encoded AIFF"
    );
    Ok(bytes)
}
