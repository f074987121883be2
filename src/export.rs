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
//! Export: renders a sample for a target device and encodes it.
//!
//! Rendering converts to the target rate, applies the channel mode, runs the
//! cleanup passes and rescales the slices. The encoders in [`crate::codec`]
//! only ever see audio that is ready to be written.

use std::{error::Error, fmt, str::FromStr};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::audio::channels::{apply_channel_mode, declick, dither};
use crate::audio::{AudioError, BitDepth, ChannelMode, ResampleQuality, Sample, TargetFormat};
use crate::codec::{aiff, ieee_extended};
use crate::codec::error::EncodeError;
use crate::codec::ot::{self, OtSettings};
use crate::codec::wav::{self, WavMetadataOptions};
use crate::slices::{self, SliceMarker};

/// Output container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Wav,
    Aiff,
    /// The Octatrack slice file on its own.
    Ot,
}

impl ExportFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            ExportFormat::Wav => "wav",
            ExportFormat::Aiff => "aiff",
            ExportFormat::Ot => "ot",
        }
    }

    /// File extension for this format.
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Wav => "wav",
            ExportFormat::Aiff => "aif",
            ExportFormat::Ot => "ot",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = Box<dyn Error>;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "wav" | "wave" => Ok(ExportFormat::Wav),
            "aif" | "aiff" => Ok(ExportFormat::Aiff),
            "ot" => Ok(ExportFormat::Ot),
            _ => Err(format!("Unsupported export format: {}", s).into()),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Everything an export needs to know.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeOptions {
    pub format: ExportFormat,
    pub target: TargetFormat,
    pub channel_mode: ChannelMode,
    /// Allows a dual-mono source to be written as mono.
    pub treat_dual_mono_as_mono: bool,
    /// The source was found to be dual mono when it was decoded
    /// (see [`crate::codec::Metadata::dual_mono`]).
    pub dual_mono: bool,
    pub wav_metadata: WavMetadataOptions,
    /// 0 disables de-clicking.
    pub declick_threshold: f32,
    /// Multiplies the sample rate written to the header. AIFF headers only hold
    /// the fixed table of rates; when the modified rate is not one of them the
    /// pitch change is baked into the audio instead.
    pub pitch_modifier: f64,
    pub dither: bool,
    pub quality: ResampleQuality,
    pub ot: OtSettings,
    /// Patch name for formats that carry one.
    pub name: String,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        EncodeOptions {
            format: ExportFormat::Wav,
            target: TargetFormat::default(),
            channel_mode: ChannelMode::Stereo,
            treat_dual_mono_as_mono: true,
            dual_mono: false,
            wav_metadata: WavMetadataOptions::default(),
            declick_threshold: 0.0,
            pitch_modifier: 1.0,
            dither: false,
            quality: ResampleQuality::Fast,
            ot: OtSettings::default(),
            name: String::new(),
        }
    }
}

/// Audio and slices ready for an encoder.
#[derive(Debug, Clone, PartialEq)]
pub struct Rendered {
    pub channels: Vec<Vec<f32>>,
    /// Rate of the rendered frames.
    pub sample_rate: u32,
    /// Rate written to the header, after the pitch modifier.
    pub declared_rate: u32,
    /// `None` when there are no slices, or only one spanning everything.
    pub slices: Option<Vec<SliceMarker>>,
}

impl Rendered {
    pub fn frames(&self) -> usize {
        self.channels.first().map(|c| c.len()).unwrap_or(0)
    }
}

/// Converts `sample` into the layout `options` describe.
pub fn render(
    sample: &Sample,
    slices: Option<&[SliceMarker]>,
    options: &EncodeOptions,
) -> Result<Rendered, EncodeError> {
    let target_rate = options.target.sample_rate;
    let converted = sample.resampled(target_rate, options.quality)?;

    let mut channels = apply_channel_mode(&converted, options.channel_mode);
    if options.channel_mode == ChannelMode::Stereo
        && options.treat_dual_mono_as_mono
        && options.dual_mono
    {
        debug!("Writing dual-mono sample as mono");
        channels.truncate(1);
    }

    let bit_depth = options.target.bit_depth;
    let mut rng = rand::thread_rng();
    for channel in channels.iter_mut() {
        declick(channel, options.declick_threshold);
        if options.dither && bit_depth != BitDepth::ThirtyTwoFloat {
            dither(channel, bit_depth.bits(), &mut rng);
        }
    }

    let frames = channels[0].len();
    let slices = slices
        .map(|s| slices::rescale_slices(s, sample.sample_rate(), target_rate))
        .and_then(|s| slices::normalize(s, frames))
        .filter(|s| !slices::is_trivial(s, frames));

    Ok(Rendered {
        channels,
        sample_rate: target_rate,
        declared_rate: declared_rate(target_rate, options.pitch_modifier),
        slices,
    })
}

/// The header rate for `sample_rate` played back `modifier` times faster.
pub fn declared_rate(sample_rate: u32, modifier: f64) -> u32 {
    if !(modifier.is_finite() && modifier > 0.0) {
        warn!(modifier, "Ignoring invalid pitch modifier");
        return sample_rate;
    }
    ((sample_rate as f64 * modifier).round() as u32).max(1)
}

/// True when an AIFF header cannot carry the pitch-modified rate but can carry
/// the plain target rate.
fn needs_baked_pitch(options: &EncodeOptions) -> bool {
    let rate = options.target.sample_rate;
    options.format == ExportFormat::Aiff
        && options.pitch_modifier != 1.0
        && ieee_extended::encode_rate(rate).is_some()
        && ieee_extended::encode_rate(declared_rate(rate, options.pitch_modifier)).is_none()
}

/// Keeps the first slices that fit an `.ot` file.
fn ot_slices(slices: &[SliceMarker]) -> &[SliceMarker] {
    if slices.len() > ot::MAX_SLICES {
        warn!(
            slices = slices.len(),
            "Octatrack files hold {} slices, extra slices are dropped",
            ot::MAX_SLICES
        );
    }
    &slices[..slices.len().min(ot::MAX_SLICES)]
}

/// Encodes `sample` with its slices according to `options`.
pub fn encode(
    sample: &Sample,
    slices: Option<&[SliceMarker]>,
    options: &EncodeOptions,
) -> Result<Vec<u8>, EncodeError> {
    if needs_baked_pitch(options) {
        debug!(
            modifier = options.pitch_modifier,
            rate = options.target.sample_rate,
            "Baking pitch change into AIFF audio"
        );
        let (baked, baked_slices) =
            bake_pitch(sample, slices, options.pitch_modifier, options.quality)?;
        let options = EncodeOptions {
            pitch_modifier: 1.0,
            ..options.clone()
        };
        return encode(&baked, baked_slices.as_deref(), &options);
    }

    let rendered = render(sample, slices, options)?;
    let bit_depth = options.target.bit_depth;

    let bytes = match options.format {
        ExportFormat::Wav => wav::encode(
            &rendered.channels,
            rendered.declared_rate,
            bit_depth,
            rendered.slices.as_deref(),
            options.wav_metadata,
        )?,
        ExportFormat::Aiff => aiff::encode(
            &rendered.channels,
            rendered.declared_rate,
            bit_depth,
            rendered.slices.as_deref(),
            &options.name,
        )?,
        ExportFormat::Ot => ot::encode(
            rendered.frames(),
            rendered.sample_rate,
            ot_slices(rendered.slices.as_deref().unwrap_or(&[])),
            &options.ot,
        )?,
    };

    info!(
        name = %options.name,
        format = %options.format,
        rate = rendered.declared_rate,
        bits = bit_depth.bits(),
        channels = rendered.channels.len(),
        bytes = bytes.len(),
        "Exported sample"
    );
    Ok(bytes)
}

/// Encodes the `.ot` file that accompanies an export of `sample`.
pub fn encode_ot_sidecar(
    sample: &Sample,
    slices: Option<&[SliceMarker]>,
    settings: &OtSettings,
) -> Result<Vec<u8>, EncodeError> {
    ot::encode(
        sample.len(),
        sample.sample_rate(),
        ot_slices(slices.unwrap_or(&[])),
        settings,
    )
}

/// One entry of a batch export.
#[derive(Debug, Clone, Copy)]
pub struct ExportJob<'a> {
    pub sample: &'a Sample,
    pub slices: Option<&'a [SliceMarker]>,
    pub options: &'a EncodeOptions,
}

/// Encodes independent jobs in parallel. Results are in job order.
pub fn encode_batch(jobs: &[ExportJob]) -> Vec<Result<Vec<u8>, EncodeError>> {
    jobs.par_iter()
        .map(|job| encode(job.sample, job.slices, job.options))
        .collect()
}

/// Makes a pitch change permanent: the audio is resampled as if it had been
/// recorded at `rate * modifier`, so it plays back at the new pitch at its
/// original rate. Slices follow the audio.
pub fn bake_pitch(
    sample: &Sample,
    slices: Option<&[SliceMarker]>,
    modifier: f64,
    quality: ResampleQuality,
) -> Result<(Sample, Option<Vec<SliceMarker>>), AudioError> {
    let rate = sample.sample_rate();
    let pitched_rate = declared_rate(rate, modifier);
    let pitched = Sample::new(sample.channels().to_vec(), pitched_rate)?
        .with_source(sample.source_sample_rate(), sample.source_bit_depth());
    let baked = pitched.resampled(rate, quality)?;
    let slices = slices
        .map(|s| slices::rescale_slices(s, pitched_rate, rate))
        .and_then(|s| slices::normalize(s, baked.len()));
    Ok((baked, slices))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::codec::{self, DecodeOptions, DecodeOutcome};
    use crate::testutil::{calculate_rms, generate_sine};

    fn stereo_sample(rate: u32, frames: usize) -> Sample {
        Sample::new(
            vec![
                generate_sine(440.0, 0.5, rate, frames),
                generate_sine(660.0, 0.25, rate, frames),
            ],
            rate,
        )
        .unwrap()
    }

    fn decode(bytes: &[u8], working_rate: u32) -> codec::Decoded {
        let options = DecodeOptions {
            working_rate,
            quality: ResampleQuality::Fast,
        };
        match codec::decode("test", bytes, &options) {
            DecodeOutcome::Decoded(decoded) => *decoded,
            DecodeOutcome::Failed(failure) => panic!("{:?}", failure),
        }
    }

    #[test]
    fn test_float_round_trip_at_working_rate() {
        let sample = stereo_sample(48000, 4800);
        let options = EncodeOptions {
            target: TargetFormat::new(48000, BitDepth::ThirtyTwoFloat).unwrap(),
            ..EncodeOptions::default()
        };
        let bytes = encode(&sample, None, &options).unwrap();
        let decoded = decode(&bytes, 48000);
        assert_eq!(decoded.sample.channels(), sample.channels());
    }

    #[test]
    fn test_slices_survive_rate_change() {
        let sample = stereo_sample(48000, 48000);
        let slices = vec![
            SliceMarker::new(0, 12000),
            SliceMarker::new(12000, 30000),
            SliceMarker::new(30000, 48000),
        ];
        let bytes = encode(&sample, Some(&slices), &EncodeOptions::default()).unwrap();

        let reader = hound::WavReader::new(Cursor::new(bytes.clone())).unwrap();
        assert_eq!(reader.spec().sample_rate, 44100);

        let decoded = decode(&bytes, 48000);
        let decoded_slices = decoded.slices.unwrap();
        assert_eq!(decoded_slices.len(), 3);
        for (original, round_tripped) in slices.iter().zip(decoded_slices.iter()) {
            assert!(original.start.abs_diff(round_tripped.start) <= 1);
        }
    }

    #[test]
    fn test_channel_modes() {
        let sample = stereo_sample(44100, 1000);
        let options = EncodeOptions {
            channel_mode: ChannelMode::Right,
            ..EncodeOptions::default()
        };
        let rendered = render(&sample, None, &options).unwrap();
        assert_eq!(rendered.channels.len(), 1);
        assert_eq!(rendered.channels[0], sample.channels()[1]);

        let dual = Sample::new(vec![vec![0.1; 10], vec![0.1; 10]], 44100).unwrap();
        let detected = EncodeOptions {
            dual_mono: true,
            ..EncodeOptions::default()
        };
        assert_eq!(render(&dual, None, &detected).unwrap().channels.len(), 1);
        let options = EncodeOptions {
            treat_dual_mono_as_mono: false,
            ..detected.clone()
        };
        assert_eq!(render(&dual, None, &options).unwrap().channels.len(), 2);
    }

    #[test]
    fn test_dual_mono_flag_decides_channel_count() {
        // Identical channels stay stereo unless the caller reports them as dual mono.
        let dual = Sample::new(vec![vec![0.1; 10], vec![0.1; 10]], 44100).unwrap();
        let rendered = render(&dual, None, &EncodeOptions::default()).unwrap();
        assert_eq!(rendered.channels.len(), 2);

        // The flag is trusted as given.
        let sample = stereo_sample(44100, 100);
        let options = EncodeOptions {
            dual_mono: true,
            ..EncodeOptions::default()
        };
        let rendered = render(&sample, None, &options).unwrap();
        assert_eq!(rendered.channels.len(), 1);
        assert_eq!(rendered.channels[0], sample.channels()[0]);
    }

    #[test]
    fn test_trivial_slices_are_not_written() {
        let sample = stereo_sample(44100, 1000);
        let whole = [SliceMarker::new(0, 1000)];
        let rendered = render(&sample, Some(&whole[..]), &EncodeOptions::default()).unwrap();
        assert_eq!(rendered.slices, None);
    }

    #[test]
    fn test_pitch_modifier_changes_declared_rate_only() {
        let sample = stereo_sample(44100, 1000);
        let options = EncodeOptions {
            pitch_modifier: 2.0,
            ..EncodeOptions::default()
        };
        let bytes = encode(&sample, None, &options).unwrap();
        let reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.spec().sample_rate, 88200);
        assert_eq!(reader.duration(), 1000);
        assert_eq!(declared_rate(44100, -1.0), 44100);
    }

    #[test]
    fn test_aiff_export() {
        let sample = stereo_sample(44100, 2000);
        let options = EncodeOptions {
            format: ExportFormat::Aiff,
            name: "chain".to_string(),
            ..EncodeOptions::default()
        };
        let slices = vec![SliceMarker::new(0, 1000), SliceMarker::new(1000, 2000)];
        let decoded = decode(&encode(&sample, Some(&slices), &options).unwrap(), 44100);
        assert_eq!(decoded.slices, Some(slices));

        let options = EncodeOptions {
            target: TargetFormat::new(44100, BitDepth::TwentyFour).unwrap(),
            ..options
        };
        assert!(matches!(
            encode(&sample, None, &options),
            Err(EncodeError::UnsupportedBitDepth { bits: 24, .. })
        ));
    }

    #[test]
    fn test_aiff_bakes_pitch_outside_rate_table() {
        let sample = stereo_sample(44100, 4410);
        let options = EncodeOptions {
            format: ExportFormat::Aiff,
            pitch_modifier: 1.5,
            ..EncodeOptions::default()
        };
        let bytes = encode(&sample, None, &options).unwrap();
        let decoded = decode(&bytes, 44100);
        assert_eq!(decoded.sample.source_sample_rate(), 44100);
        assert!((decoded.sample.len() as i64 - 2940).abs() <= 2);

        // An octave up fits the table and only changes the header.
        let options = EncodeOptions {
            pitch_modifier: 2.0,
            ..options
        };
        let bytes = encode(&sample, None, &options).unwrap();
        let decoded = decode(&bytes, 88200);
        assert_eq!(decoded.sample.source_sample_rate(), 88200);
        assert_eq!(decoded.sample.len(), 4410);
    }

    #[test]
    fn test_ot_sidecar() {
        let sample = stereo_sample(44100, 88200);
        let slices: Vec<SliceMarker> = (0..70)
            .map(|i| SliceMarker::new(i * 1260, (i + 1) * 1260))
            .collect();
        let bytes = encode_ot_sidecar(&sample, Some(&slices), &OtSettings::default()).unwrap();
        let file = ot::OtFile::parse(&bytes).unwrap();
        assert_eq!(file.slices.len(), ot::MAX_SLICES);
        assert_eq!(file.trim_bars(), 2.0);
    }

    #[test]
    fn test_batch_preserves_order() {
        let samples: Vec<Sample> = (1..=4).map(|i| stereo_sample(44100, i * 100)).collect();
        let options = EncodeOptions {
            treat_dual_mono_as_mono: false,
            ..EncodeOptions::default()
        };
        let jobs: Vec<ExportJob> = samples
            .iter()
            .map(|sample| ExportJob {
                sample,
                slices: None,
                options: &options,
            })
            .collect();
        let results = encode_batch(&jobs);
        assert_eq!(results.len(), 4);
        for (i, result) in results.into_iter().enumerate() {
            let reader = hound::WavReader::new(Cursor::new(result.unwrap())).unwrap();
            assert_eq!(reader.duration() as usize, (i + 1) * 100);
        }
    }

    #[test]
    fn test_bake_pitch() {
        let sample = Sample::mono(generate_sine(440.0, 0.5, 44100, 44100), 44100).unwrap();
        let slices = vec![SliceMarker::new(0, 22050), SliceMarker::new(22050, 44100)];
        let (baked, baked_slices) =
            bake_pitch(&sample, Some(&slices), 2.0, ResampleQuality::Fast).unwrap();
        assert_eq!(baked.sample_rate(), 44100);
        assert!(baked.len().abs_diff(22050) <= 2);
        let baked_slices = baked_slices.unwrap();
        assert_eq!(baked_slices[1].start, 11025);
        let rms = calculate_rms(baked.channels()[0].as_slice());
        assert!((rms - 0.5 / 2f32.sqrt()).abs() < 0.02);
    }

    #[test]
    fn test_export_format_from_str() {
        assert_eq!(ExportFormat::from_str("AIFF").unwrap(), ExportFormat::Aiff);
        assert_eq!(ExportFormat::from_str("wav").unwrap().extension(), "wav");
        assert!(ExportFormat::from_str("mp3").is_err());
    }
}
