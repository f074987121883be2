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

//! The host PCM decode primitive. Containers the codec module does not parse
//! itself (FLAC, MP3, AAC/M4A) are handed to symphonia and come back as a
//! [`Sample`] at the file's native rate.

use std::io::Cursor;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};
use tracing::{debug, warn};

use super::channels::deinterleave;
use super::{AudioError, Sample};

/// Error types for the host decoder
#[derive(Debug, thiserror::Error)]
pub enum HostDecodeError {
    #[error("Audio file error: {0}")]
    AudioError(#[from] SymphoniaError),

    #[error("No audio track found")]
    NoTrack,

    #[error("Sample rate not specified")]
    UnknownSampleRate,

    #[error(transparent)]
    Layout(#[from] AudioError),
}

/// Turns encoded bytes into PCM. Implemented by whatever the host provides.
pub trait HostDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8], extension: Option<&str>) -> Result<Sample, HostDecodeError>;
}

/// Host decoder backed by symphonia.
#[derive(Debug, Default, Clone, Copy)]
pub struct SymphoniaDecoder;

impl HostDecoder for SymphoniaDecoder {
    fn decode(&self, bytes: &[u8], extension: Option<&str>) -> Result<Sample, HostDecodeError> {
        let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes.to_vec())), Default::default());

        // Create a hint to help the format registry guess the format
        let mut hint = Hint::new();
        if let Some(extension) = extension {
            hint.with_extension(extension);
        }

        let meta_opts: MetadataOptions = Default::default();
        let fmt_opts: FormatOptions = Default::default();
        let probed = get_probe().format(&hint, mss, &fmt_opts, &meta_opts)?;
        let mut format_reader = probed.format;

        let track = format_reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or(HostDecodeError::NoTrack)?;
        let track_id = track.id;
        let params = track.codec_params.clone();
        let sample_rate = params
            .sample_rate
            .ok_or(HostDecodeError::UnknownSampleRate)?;
        let bits_per_sample = params.bits_per_sample.unwrap_or(16) as u16;

        let decoder_opts: DecoderOptions = Default::default();
        let mut decoder = get_codecs().make(&params, &decoder_opts)?;

        let mut channel_count = params.channels.map(|c| c.count()).unwrap_or(0);
        let mut interleaved: Vec<f32> = Vec::new();
        let mut sample_buffer: Option<SampleBuffer<f32>> = None;

        loop {
            let packet = match format_reader.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break
                }
                Err(SymphoniaError::ResetRequired) => break,
                Err(e) => return Err(e.into()),
            };
            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(e)) => {
                    // Corrupt packets are skipped, the rest of the stream is still usable.
                    warn!(error = e, "Skipping undecodable packet");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let spec = *decoded.spec();
            if channel_count == 0 {
                channel_count = spec.channels.count();
            }
            let buffer = sample_buffer
                .get_or_insert_with(|| SampleBuffer::<f32>::new(decoded.capacity() as u64, spec));
            if buffer.capacity() < decoded.capacity() * spec.channels.count() {
                *buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
            }
            buffer.copy_interleaved_ref(decoded);
            interleaved.extend_from_slice(buffer.samples());
        }

        if channel_count == 0 {
            return Err(HostDecodeError::NoTrack);
        }

        let mut planar = deinterleave(&interleaved, channel_count);
        // Only the first two channels are carried.
        planar.truncate(2);
        debug!(
            sample_rate,
            channels = channel_count,
            frames = planar[0].len(),
            "Host decoded audio"
        );

        Ok(Sample::new(planar, sample_rate)?.with_source(sample_rate, bits_per_sample))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn test_garbage_is_rejected() {
        let result = SymphoniaDecoder.decode(&[0u8; 64], Some("mp3"));
        assert!(result.is_err());
    }

    #[test]
    fn test_decodes_pcm_wav() {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 22050,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for i in 0..100i16 {
                writer.write_sample(i * 100).unwrap();
                writer.write_sample(-i * 100).unwrap();
            }
            writer.finalize().unwrap();
        }

        let sample = SymphoniaDecoder
            .decode(cursor.get_ref(), Some("wav"))
            .unwrap();
        assert_eq!(sample.sample_rate(), 22050);
        assert_eq!(sample.channel_count(), 2);
        assert_eq!(sample.len(), 100);
        assert!((sample.channels()[0][10] - 1000.0 / 32768.0).abs() < 1e-4);
        assert!((sample.channels()[1][10] + 1000.0 / 32768.0).abs() < 1e-4);
    }
}
