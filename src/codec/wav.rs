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
//! RIFF/WAVE decoding and encoding.
//!
//! Slice metadata travels in three places: a base64 JSON document in
//! `LIST`/`INFO`/`ISBJ`, standard `cue ` points, and the `ORSL` vendor chunk.
//! The custom document and the cue points both become slices; `ORSL` is
//! carried as metadata only.

use std::io::Write;

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use tracing::{debug, warn};

use super::chunk::{self, Chunk, Endian};
use super::error::{DecodeError, EncodeError};
use super::{ContainerDecoder, ContainerKind, DecodeOptions, Decoded, Metadata, SliceSource};
use crate::audio::channels::interleave_channels;
use crate::audio::{BitDepth, Sample};
use crate::slices::{self, digichain, SliceMarker};

const FORMAT: &str = "WAV";

const FMT: &[u8; 4] = b"fmt ";
const DATA: &[u8; 4] = b"data";
const LIST: &[u8; 4] = b"LIST";
const CUE: &[u8; 4] = b"cue ";
const ORSL: &[u8; 4] = b"ORSL";
const ISBJ: &[u8; 4] = b"ISBJ";

const FORMAT_PCM: u16 = 1;
const FORMAT_FLOAT: u16 = 3;
const FORMAT_EXTENSIBLE: u16 = 0xFFFE;

const ORSL_VERSION: u32 = 1;

/// What the `fmt ` chunk says about the audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaveFormat {
    pub format_tag: u16,
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
}

impl WaveFormat {
    fn parse(chunk: &Chunk) -> Result<Self, DecodeError> {
        let data = chunk.data;
        if data.len() < 16 {
            return Err(DecodeError::malformed(FORMAT, "fmt chunk is too short"));
        }
        let mut format_tag = LittleEndian::read_u16(&data[0..2]);
        if format_tag == FORMAT_EXTENSIBLE && data.len() >= 26 {
            format_tag = LittleEndian::read_u16(&data[24..26]);
        }
        let format = WaveFormat {
            format_tag,
            channels: LittleEndian::read_u16(&data[2..4]),
            sample_rate: LittleEndian::read_u32(&data[4..8]),
            bits_per_sample: LittleEndian::read_u16(&data[14..16]),
        };

        if format.channels < 1 || format.sample_rate == 0 || format.bits_per_sample > 32 {
            return Err(DecodeError::unsupported(
                FORMAT,
                format!(
                    "{} channels at {}Hz with {} bits",
                    format.channels, format.sample_rate, format.bits_per_sample
                ),
            ));
        }
        match (format.format_tag, format.bits_per_sample) {
            (FORMAT_PCM, 8 | 16 | 24 | 32) | (FORMAT_FLOAT, 32) => Ok(format),
            (tag, bits) => Err(DecodeError::unsupported(
                FORMAT,
                format!("format tag {} with {} bits", tag, bits),
            )),
        }
    }

    fn block_align(&self) -> usize {
        self.channels as usize * (self.bits_per_sample as usize / 8)
    }
}

/// Decoder for RIFF/WAVE files.
#[derive(Debug, Default, Clone, Copy)]
pub struct WavDecoder;

impl ContainerDecoder for WavDecoder {
    fn kind(&self) -> ContainerKind {
        ContainerKind::Wav
    }

    fn matches(&self, bytes: &[u8]) -> bool {
        bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WAVE"
    }

    fn decode(&self, bytes: &[u8], options: &DecodeOptions) -> Result<Decoded, DecodeError> {
        if !self.matches(bytes) {
            return Err(DecodeError::FormatMismatch(FORMAT));
        }

        let chunks = chunk::scan(bytes, 12, &[FMT, DATA, LIST, CUE, ORSL], Endian::Little);
        let format = chunk::first(&chunks, FMT)
            .ok_or_else(|| DecodeError::malformed(FORMAT, "missing fmt chunk"))
            .and_then(WaveFormat::parse)?;
        // Cue points name their chunk as `data` with a zero size field; skip those.
        let data = chunk::all(&chunks, DATA)
            .find(|c| c.declared_size > 0)
            .or_else(|| chunk::first(&chunks, DATA))
            .ok_or_else(|| DecodeError::malformed(FORMAT, "missing data chunk"))?;
        if data.is_truncated() {
            debug!(
                declared = data.declared_size,
                available = data.data.len(),
                "WAV data chunk is truncated"
            );
        }

        let mut planar = decode_pcm(data.data, &format);
        if planar.len() > 2 {
            warn!(
                channels = planar.len(),
                "Only the first two WAV channels are kept"
            );
            planar.truncate(2);
        }
        let frames = planar[0].len();
        let sample = Sample::new(planar, format.sample_rate)?
            .with_source(format.sample_rate, format.bits_per_sample);

        let working_rate = options.working_rate;
        let custom = chunk::all(&chunks, LIST)
            .find_map(|list| chunk::find_sub_chunk(list.data, ISBJ, Endian::Little))
            .and_then(|isbj| match digichain::decode_base64(isbj.data, working_rate) {
                Ok(slices) => Some(slices),
                Err(e) => {
                    warn!(err = %e, "Ignoring unreadable ISBJ slice data");
                    None
                }
            })
            .filter(|slices| !slices.is_empty());
        let cues = chunk::first(&chunks, CUE)
            .map(|cue| parse_cue_points(cue.data, frames))
            .map(|starts| slices::from_starts(&starts, frames))
            .map(|native| slices::rescale_slices(&native, format.sample_rate, working_rate))
            .filter(|slices| !slices.is_empty());

        let (slices, slice_source) = match (custom, cues) {
            (Some(custom), Some(cues)) => {
                let mut merged = custom;
                merged.extend(cues);
                (Some(slices::dedup_by_start(merged)), Some(SliceSource::Merged))
            }
            (Some(custom), None) => (Some(custom), Some(SliceSource::CustomChunk)),
            (None, Some(cues)) => (Some(cues), Some(SliceSource::CuePoints)),
            (None, None) => (None, None),
        };

        let orsl_slices = chunk::first(&chunks, ORSL)
            .and_then(|orsl| parse_orsl(orsl.data))
            .map(|native| slices::rescale_slices(&native, format.sample_rate, working_rate));

        let metadata = Metadata {
            slice_source,
            orsl_slices,
            wave_format: Some(format),
            ..Metadata::default()
        };
        Decoded::from_native(ContainerKind::Wav, sample, slices, metadata, options)
    }
}

/// Converts interleaved PCM into planar floats in `[-1, 1]`.
fn decode_pcm(data: &[u8], format: &WaveFormat) -> Vec<Vec<f32>> {
    let channels = format.channels as usize;
    let block_align = format.block_align();
    let width = block_align / channels;
    let frames = data.len() / block_align;

    let mut planar = vec![Vec::with_capacity(frames); channels];
    for frame in data.chunks_exact(block_align) {
        for (channel, bytes) in frame.chunks_exact(width).enumerate() {
            let value = match (format.format_tag, format.bits_per_sample) {
                (_, 8) => (bytes[0] as f32 - 128.0) / 128.0,
                (_, 16) => LittleEndian::read_i16(bytes) as f32 / 32768.0,
                (_, 24) => LittleEndian::read_i24(bytes) as f32 / 8388608.0,
                (FORMAT_FLOAT, _) => LittleEndian::read_f32(bytes),
                _ => LittleEndian::read_i32(bytes) as f32 / 2147483648.0,
            };
            planar[channel].push(value);
        }
    }
    planar
}

/// Reads the sample offsets of a `cue ` chunk. Points beyond `frames` are dropped
/// and the result is sorted.
fn parse_cue_points(data: &[u8], frames: usize) -> Vec<usize> {
    if data.len() < 4 {
        return Vec::new();
    }
    let declared = LittleEndian::read_u32(&data[0..4]) as usize;
    let mut starts: Vec<usize> = data[4..]
        .chunks_exact(24)
        .take(declared)
        .map(|point| LittleEndian::read_u32(&point[20..24]) as usize)
        .filter(|&start| start < frames)
        .collect();
    starts.sort_unstable();
    starts.dedup();
    starts
}

/// Reads an `ORSL` chunk: `version, count, count x {start, end, loop}`.
fn parse_orsl(data: &[u8]) -> Option<Vec<SliceMarker>> {
    if data.len() < 8 {
        return None;
    }
    let version = LittleEndian::read_u32(&data[0..4]);
    if version != ORSL_VERSION {
        debug!(version, "Unknown ORSL version");
        return None;
    }
    let count = LittleEndian::read_u32(&data[4..8]) as usize;
    let slices = data[8..]
        .chunks_exact(12)
        .take(count)
        .filter_map(|entry| {
            let start = LittleEndian::read_u32(&entry[0..4]) as usize;
            let end = LittleEndian::read_u32(&entry[4..8]) as usize;
            let loop_point = LittleEndian::read_i32(&entry[8..12]);
            (start < end).then(|| SliceMarker {
                loop_point: (loop_point >= 0).then_some(loop_point as usize),
                ..SliceMarker::new(start, end)
            })
        })
        .collect();
    Some(slices)
}

/// Which slice chunks a WAV export carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavMetadataOptions {
    pub slice_data: bool,
    pub cue_points: bool,
    pub orsl: bool,
}

impl Default for WavMetadataOptions {
    fn default() -> Self {
        WavMetadataOptions {
            slice_data: true,
            cue_points: true,
            orsl: false,
        }
    }
}

/// Encodes planar audio as a WAV file.
///
/// `sample_rate` is the rate written to the header, and slice positions are
/// frame offsets into `channels`.
pub fn encode(
    channels: &[Vec<f32>],
    sample_rate: u32,
    bit_depth: BitDepth,
    slices: Option<&[SliceMarker]>,
    metadata: WavMetadataOptions,
) -> Result<Vec<u8>, EncodeError> {
    if channels.is_empty() || channels.len() > 2 {
        return Err(EncodeError::UnsupportedChannels {
            format: FORMAT,
            channels: channels.len(),
        });
    }

    let channel_count = channels.len() as u16;
    let frames = channels[0].len();
    let bytes_per_sample = bit_depth.bytes_per_sample();
    let block_align = channel_count as usize * bytes_per_sample;
    let data_size = frames * block_align;

    let mut pcm = Vec::with_capacity(data_size);
    for value in interleave_channels(channels) {
        write_sample(&mut pcm, value, bit_depth)?;
    }

    let mut bytes = Vec::with_capacity(44 + data_size + 64);
    bytes.write_all(b"RIFF")?;
    bytes.write_u32::<LittleEndian>(0)?;
    bytes.write_all(b"WAVE")?;
    bytes.write_all(FMT)?;
    bytes.write_u32::<LittleEndian>(16)?;
    bytes.write_u16::<LittleEndian>(bit_depth.wave_format_tag())?;
    bytes.write_u16::<LittleEndian>(channel_count)?;
    bytes.write_u32::<LittleEndian>(sample_rate)?;
    bytes.write_u32::<LittleEndian>(sample_rate * block_align as u32)?;
    bytes.write_u16::<LittleEndian>(block_align as u16)?;
    bytes.write_u16::<LittleEndian>(bit_depth.bits())?;
    chunk::write_chunk(&mut bytes, DATA, &pcm, Endian::Little)?;

    if let Some(slices) = slices.filter(|s| !s.is_empty() && !slices::is_trivial(s, frames)) {
        if metadata.slice_data {
            let payload = digichain::encode_base64(slices, sample_rate)?;
            let mut list = Vec::with_capacity(payload.len() + 12);
            list.write_all(b"INFO")?;
            chunk::write_chunk(&mut list, ISBJ, payload.as_bytes(), Endian::Little)?;
            chunk::write_chunk(&mut bytes, LIST, &list, Endian::Little)?;
        }
        if metadata.cue_points {
            chunk::write_chunk(&mut bytes, CUE, &cue_payload(slices)?, Endian::Little)?;
        }
        if metadata.orsl {
            chunk::write_chunk(&mut bytes, ORSL, &orsl_payload(slices)?, Endian::Little)?;
        }
    }

    let riff_size = (bytes.len() - 8) as u32;
    LittleEndian::write_u32(&mut bytes[4..8], riff_size);
    debug!(
        frames,
        channels = channel_count,
        sample_rate,
        bits = bit_depth.bits(),
        slices = slices.map(|s| s.len()).unwrap_or(0),
        "Encoded WAV"
    );
    Ok(bytes)
}

fn write_sample(pcm: &mut Vec<u8>, value: f32, bit_depth: BitDepth) -> std::io::Result<()> {
    let value = value.clamp(-1.0, 1.0);
    match bit_depth {
        BitDepth::Eight => pcm.write_u8((value * 127.0 + 128.0).round() as u8),
        BitDepth::Sixteen => {
            let scaled = if value < 0.0 { value * 32768.0 } else { value * 32767.0 };
            pcm.write_i16::<LittleEndian>(scaled as i16)
        }
        BitDepth::TwentyFour => {
            let scaled = if value < 0.0 {
                value * 8388608.0
            } else {
                value * 8388607.0
            };
            pcm.write_i24::<LittleEndian>(scaled as i32)
        }
        BitDepth::ThirtyTwoFloat => pcm.write_f32::<LittleEndian>(value),
    }
}

/// One cue point per slice, positioned at the slice start.
fn cue_payload(slices: &[SliceMarker]) -> std::io::Result<Vec<u8>> {
    let mut payload = Vec::with_capacity(4 + 24 * slices.len());
    payload.write_u32::<LittleEndian>(slices.len() as u32)?;
    for (i, slice) in slices.iter().enumerate() {
        payload.write_u32::<LittleEndian>(i as u32 + 1)?;
        payload.write_u32::<LittleEndian>(slice.start as u32)?;
        payload.write_all(DATA)?;
        payload.write_u32::<LittleEndian>(0)?;
        payload.write_u32::<LittleEndian>(0)?;
        payload.write_u32::<LittleEndian>(slice.start as u32)?;
    }
    Ok(payload)
}

fn orsl_payload(slices: &[SliceMarker]) -> std::io::Result<Vec<u8>> {
    let mut payload = Vec::with_capacity(8 + 12 * slices.len());
    payload.write_u32::<LittleEndian>(ORSL_VERSION)?;
    payload.write_u32::<LittleEndian>(slices.len() as u32)?;
    for slice in slices {
        payload.write_u32::<LittleEndian>(slice.start as u32)?;
        payload.write_u32::<LittleEndian>(slice.end as u32)?;
        payload.write_i32::<LittleEndian>(slice.loop_point.map(|l| l as i32).unwrap_or(-1))?;
    }
    Ok(payload)
}
