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
//! Container decoding.
//!
//! Every decoder turns container bytes into a [`Sample`] at the working rate
//! plus optional slices at that same rate. [`decode`] tries the decoders in
//! turn and reports a tagged [`DecodeOutcome`]; a format that does not match
//! never escapes as an error.

use tracing::{debug, warn};

use crate::audio::channels::is_dual_mono;
use crate::audio::{ResampleQuality, Sample};
use crate::slices::op1::Op1Patch;
use crate::slices::{self, SliceMarker};

pub mod aiff;
pub mod chunk;
pub mod error;
pub mod ieee_extended;
pub mod ot;
pub mod pti;
pub mod sds;
pub mod wav;

pub use error::{DecodeError, EncodeError, FailureKind};

/// Which container a sample came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    Wav,
    Aiff,
    Sds,
    Pti,
    /// Decoded by the host decode primitive.
    Host,
}

/// Where the slices of a decoded sample were read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceSource {
    /// The base64 document in the WAV `ISBJ` chunk.
    CustomChunk,
    CuePoints,
    /// Custom chunk and cue points combined, one slice per start.
    Merged,
    /// A companion `.ot` file.
    Sidecar,
    Op1Patch,
    PtiHeader,
}

/// Decode parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Rate every decoded sample is converted to.
    pub working_rate: u32,
    pub quality: ResampleQuality,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        DecodeOptions {
            working_rate: 48000,
            quality: ResampleQuality::Fast,
        }
    }
}

/// Container metadata that is not audio or slices.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    pub slice_source: Option<SliceSource>,
    /// `ORSL` slices, at the working rate. Informational only.
    pub orsl_slices: Option<Vec<SliceMarker>>,
    pub op1_patch: Option<Op1Patch>,
    pub sds_loop: Option<sds::SdsLoop>,
    pub wave_format: Option<wav::WaveFormat>,
    /// Both channels of the decoded file are identical.
    pub dual_mono: bool,
}

/// A successfully decoded sample.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub kind: ContainerKind,
    pub sample: Sample,
    /// `None` when the container carries no usable slices.
    pub slices: Option<Vec<SliceMarker>>,
    pub metadata: Metadata,
}

impl Decoded {
    /// Finishes a decode: converts `sample` to the working rate and clamps the
    /// slices (already at the working rate) to the converted length.
    pub fn from_native(
        kind: ContainerKind,
        sample: Sample,
        slices: Option<Vec<SliceMarker>>,
        mut metadata: Metadata,
        options: &DecodeOptions,
    ) -> Result<Self, DecodeError> {
        metadata.dual_mono = is_dual_mono(&sample);
        let sample = sample.resampled(options.working_rate, options.quality)?;
        let slices = slices.and_then(|s| slices::normalize(s, sample.len()));
        Ok(Decoded {
            kind,
            sample,
            slices,
            metadata,
        })
    }
}

/// Why a file could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeFailure {
    pub id: String,
    pub kind: FailureKind,
    pub message: String,
}

/// Result of [`decode`].
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeOutcome {
    Decoded(Box<Decoded>),
    Failed(DecodeFailure),
}

impl DecodeOutcome {
    pub fn failed(id: &str, error: &DecodeError) -> Self {
        DecodeOutcome::Failed(DecodeFailure {
            id: id.to_string(),
            kind: error.kind(),
            message: error.to_string(),
        })
    }
}

/// A container format that can be recognized and decoded.
pub trait ContainerDecoder: Send + Sync {
    fn kind(&self) -> ContainerKind;

    /// Cheap check of the magic bytes.
    fn matches(&self, bytes: &[u8]) -> bool;

    fn decode(&self, bytes: &[u8], options: &DecodeOptions) -> Result<Decoded, DecodeError>;
}

/// Every built-in decoder, in detection order.
pub fn decoders() -> [&'static dyn ContainerDecoder; 4] {
    [
        &wav::WavDecoder,
        &aiff::AiffDecoder,
        &sds::SdsDecoder,
        &pti::PtiDecoder,
    ]
}

/// Decodes `bytes`, identified by `id` in the outcome.
pub fn decode(id: &str, bytes: &[u8], options: &DecodeOptions) -> DecodeOutcome {
    let Some(decoder) = decoders().into_iter().find(|d| d.matches(bytes)) else {
        debug!(id, "No container decoder matches");
        return DecodeOutcome::failed(id, &DecodeError::FormatMismatch("known container"));
    };

    match decoder.decode(bytes, options) {
        Ok(decoded) => {
            debug!(
                id,
                kind = ?decoded.kind,
                frames = decoded.sample.len(),
                slices = decoded.slices.as_ref().map(|s| s.len()).unwrap_or(0),
                "Decoded sample"
            );
            DecodeOutcome::Decoded(Box::new(decoded))
        }
        Err(e) => {
            if e.kind() != FailureKind::FormatMismatch {
                warn!(id, kind = ?decoder.kind(), err = %e, "Skipping file");
            }
            DecodeOutcome::failed(id, &e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::BitDepth;

    #[test]
    fn test_dispatch_by_magic() {
        let options = DecodeOptions {
            working_rate: 44100,
            ..DecodeOptions::default()
        };
        let wav = wav::encode(
            &[vec![0.0; 100]],
            44100,
            BitDepth::Sixteen,
            None,
            wav::WavMetadataOptions::default(),
        )
        .unwrap();
        let aiff = aiff::encode(&[vec![0.0; 100]], 44100, BitDepth::Sixteen, None, "x").unwrap();

        for (bytes, kind) in [(wav, ContainerKind::Wav), (aiff, ContainerKind::Aiff)] {
            match decode("file", &bytes, &options) {
                DecodeOutcome::Decoded(decoded) => assert_eq!(decoded.kind, kind),
                DecodeOutcome::Failed(failure) => panic!("{:?}", failure),
            }
        }
    }

    #[test]
    fn test_dual_mono_is_detected_on_decode() {
        let options = DecodeOptions::default();
        let same = vec![0.25f32; 64];
        let mut different = same.clone();
        different[10] = -0.25;

        for (channels, expected) in [
            (vec![same.clone(), same.clone()], true),
            (vec![same.clone(), different], false),
            (vec![same], false),
        ] {
            let bytes = wav::encode(
                &channels,
                44100,
                BitDepth::Sixteen,
                None,
                wav::WavMetadataOptions::default(),
            )
            .unwrap();
            match decode("file.wav", &bytes, &options) {
                DecodeOutcome::Decoded(decoded) => {
                    assert_eq!(decoded.metadata.dual_mono, expected)
                }
                DecodeOutcome::Failed(failure) => panic!("{:?}", failure),
            }
        }
    }

    #[test]
    fn test_unknown_bytes_are_a_format_mismatch() {
        match decode("mystery.bin", b"not audio at all", &DecodeOptions::default()) {
            DecodeOutcome::Failed(failure) => {
                assert_eq!(failure.id, "mystery.bin");
                assert_eq!(failure.kind, FailureKind::FormatMismatch);
            }
            DecodeOutcome::Decoded(_) => panic!("decoded garbage"),
        }
    }

    #[test]
    fn test_unsupported_variant_is_reported() {
        let mut bytes = wav::encode(
            &[vec![0.0; 10]],
            44100,
            BitDepth::Sixteen,
            None,
            wav::WavMetadataOptions::default(),
        )
        .unwrap();
        bytes[34] = 40;
        match decode("odd.wav", &bytes, &DecodeOptions::default()) {
            DecodeOutcome::Failed(failure) => {
                assert_eq!(failure.kind, FailureKind::UnsupportedVariant);
                assert!(!failure.message.is_empty());
            }
            DecodeOutcome::Decoded(_) => panic!("decoded a 40-bit WAV"),
        }
    }
}
