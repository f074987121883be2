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
use std::fs;
use std::path::Path;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::ConfigError;
use crate::audio::{BitDepth, ChannelMode, ResampleQuality, TargetFormat};
use crate::codec::ot::OtSettings;
use crate::codec::wav::WavMetadataOptions;
use crate::codec::DecodeOptions;
use crate::export::{EncodeOptions, ExportFormat};

/// Prefix of the environment variables that override file settings.
const ENV_PREFIX: &str = "SLICEKIT";

/// The user's import and export preferences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Rate every imported sample is converted to.
    pub working_sample_rate: u32,
    /// Rate of exported files.
    pub target_sample_rate: u32,
    pub bit_depth: BitDepth,
    pub channel_mode: ChannelMode,
    pub treat_dual_mono_as_mono: bool,
    /// Write the base64 slice document into WAV exports.
    pub embed_slice_data: bool,
    pub embed_cue_points: bool,
    pub embed_orsl: bool,
    /// Spike threshold of the de-click pass, 0 disables it.
    pub declick_threshold: f32,
    pub pitch_modifier: f64,
    pub dither: bool,
    pub resample_quality: ResampleQuality,
    /// Tempo written to `.ot` files.
    pub ot_tempo: f64,
    /// Write an `.ot` file next to every WAV export.
    pub write_ot_sidecar: bool,
    pub export_format: ExportFormat,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            working_sample_rate: 48000,
            target_sample_rate: 44100,
            bit_depth: BitDepth::Sixteen,
            channel_mode: ChannelMode::Stereo,
            treat_dual_mono_as_mono: true,
            embed_slice_data: true,
            embed_cue_points: true,
            embed_orsl: false,
            declick_threshold: 0.0,
            pitch_modifier: 1.0,
            dither: false,
            resample_quality: ResampleQuality::Fast,
            ot_tempo: 120.0,
            write_ot_sidecar: false,
            export_format: ExportFormat::Wav,
        }
    }
}

impl Settings {
    /// Loads settings from `path` (if given and present) and the environment.
    /// Unset values keep their defaults.
    pub fn load(path: Option<&Path>) -> Result<Settings, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            debug!(path = %path.display(), "Loading settings");
            builder = builder.add_source(File::from(path).required(false));
        }
        let settings = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?
            .try_deserialize::<Settings>()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Writes the settings to `path` as YAML.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        self.validate()?;
        let serialized = serde_yml::to_string(self)?;
        fs::write(path, serialized)?;
        info!(path = %path.display(), "Saved settings");
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.working_sample_rate == 0 {
            return Err(ConfigError::Invalid {
                name: "working_sample_rate",
                reason: "must be greater than 0".to_string(),
            });
        }
        if self.target_sample_rate == 0 {
            return Err(ConfigError::Invalid {
                name: "target_sample_rate",
                reason: "must be greater than 0".to_string(),
            });
        }
        if !(self.pitch_modifier.is_finite() && self.pitch_modifier > 0.0) {
            return Err(ConfigError::Invalid {
                name: "pitch_modifier",
                reason: format!("{} is not a positive number", self.pitch_modifier),
            });
        }
        if !(self.ot_tempo > 0.0 && self.ot_tempo < 1000.0) {
            return Err(ConfigError::Invalid {
                name: "ot_tempo",
                reason: format!("{} is out of range", self.ot_tempo),
            });
        }
        if self.declick_threshold < 0.0 {
            return Err(ConfigError::Invalid {
                name: "declick_threshold",
                reason: "must not be negative".to_string(),
            });
        }
        Ok(())
    }

    pub fn decode_options(&self) -> DecodeOptions {
        DecodeOptions {
            working_rate: self.working_sample_rate,
            quality: self.resample_quality,
        }
    }

    pub fn ot_settings(&self) -> OtSettings {
        OtSettings {
            tempo: self.ot_tempo,
            ..OtSettings::default()
        }
    }

    /// Export options for a file called `name`.
    pub fn to_encode_options(&self, name: &str) -> EncodeOptions {
        EncodeOptions {
            format: self.export_format,
            target: TargetFormat {
                sample_rate: self.target_sample_rate,
                bit_depth: self.bit_depth,
            },
            channel_mode: self.channel_mode,
            treat_dual_mono_as_mono: self.treat_dual_mono_as_mono,
            dual_mono: false,
            wav_metadata: WavMetadataOptions {
                slice_data: self.embed_slice_data,
                cue_points: self.embed_cue_points,
                orsl: self.embed_orsl,
            },
            declick_threshold: self.declick_threshold,
            pitch_modifier: self.pitch_modifier,
            dither: self.dither,
            quality: self.resample_quality,
            ot: self.ot_settings(),
            name: name.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use config::FileFormat;

    use super::*;

    #[test]
    fn test_defaults_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(Some(&dir.path().join("missing.yaml"))).unwrap();
        assert_eq!(settings.working_sample_rate, 48000);
        assert_eq!(settings.target_sample_rate, 44100);
        assert_eq!(settings.bit_depth, BitDepth::Sixteen);
        assert!(settings.treat_dual_mono_as_mono);
        assert!(!settings.embed_orsl);
    }

    #[test]
    fn test_partial_yaml() {
        let yaml = r#"
            target_sample_rate: 48000
            bit_depth: 24
            channel_mode: sum
            resample_quality: sinc
            export_format: aiff
        "#;
        let settings: Settings = Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(settings.target_sample_rate, 48000);
        assert_eq!(settings.bit_depth, BitDepth::TwentyFour);
        assert_eq!(settings.channel_mode, ChannelMode::Sum);
        assert_eq!(settings.resample_quality, ResampleQuality::Sinc);
        assert_eq!(settings.export_format, ExportFormat::Aiff);
        assert_eq!(settings.working_sample_rate, 48000);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.yaml");
        let settings = Settings {
            bit_depth: BitDepth::ThirtyTwoFloat,
            channel_mode: ChannelMode::Left,
            embed_orsl: true,
            ot_tempo: 98.0,
            ..Settings::default()
        };
        settings.save(&path).unwrap();
        assert_eq!(Settings::load(Some(&path)).unwrap(), settings);
    }

    #[test]
    fn test_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.yaml");
        fs::write(&path, "pitch_modifier: 0\n").unwrap();
        assert!(matches!(
            Settings::load(Some(&path)),
            Err(ConfigError::Invalid {
                name: "pitch_modifier",
                ..
            })
        ));
        fs::write(&path, "bit_depth: 12\n").unwrap();
        assert!(matches!(
            Settings::load(Some(&path)),
            Err(ConfigError::Load(_))
        ));
    }

    #[test]
    fn test_encode_options() {
        let settings = Settings {
            embed_cue_points: false,
            pitch_modifier: 0.5,
            ..Settings::default()
        };
        let options = settings.to_encode_options("kit");
        assert_eq!(options.name, "kit");
        assert_eq!(options.target.sample_rate, 44100);
        assert!(!options.wav_metadata.cue_points);
        assert!(options.wav_metadata.slice_data);
        assert_eq!(options.pitch_modifier, 0.5);
        assert_eq!(options.ot.tempo, 120.0);
        assert_eq!(settings.decode_options().working_rate, 48000);
    }
}
