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

use std::{error::Error, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// PCM bit depth for encoded output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum BitDepth {
    /// 8-bit unsigned, biased around 128.
    Eight,
    /// 16-bit signed integer.
    Sixteen,
    /// 24-bit signed integer, packed in three bytes.
    TwentyFour,
    /// 32-bit IEEE float.
    ThirtyTwoFloat,
}

impl BitDepth {
    /// Number of bits per sample.
    pub fn bits(self) -> u16 {
        match self {
            BitDepth::Eight => 8,
            BitDepth::Sixteen => 16,
            BitDepth::TwentyFour => 24,
            BitDepth::ThirtyTwoFloat => 32,
        }
    }

    /// Number of bytes one sample occupies.
    pub fn bytes_per_sample(self) -> usize {
        self.bits() as usize / 8
    }

    /// WAVE format tag: 3 for IEEE float, 1 for integer PCM.
    pub fn wave_format_tag(self) -> u16 {
        match self {
            BitDepth::ThirtyTwoFloat => 3,
            _ => 1,
        }
    }
}

impl TryFrom<u16> for BitDepth {
    type Error = String;

    fn try_from(bits: u16) -> Result<Self, Self::Error> {
        match bits {
            8 => Ok(BitDepth::Eight),
            16 => Ok(BitDepth::Sixteen),
            24 => Ok(BitDepth::TwentyFour),
            32 => Ok(BitDepth::ThirtyTwoFloat),
            _ => Err(format!("Unsupported bit depth: {}", bits)),
        }
    }
}

impl From<BitDepth> for u16 {
    fn from(depth: BitDepth) -> Self {
        depth.bits()
    }
}

impl FromStr for BitDepth {
    type Err = Box<dyn Error>;

    fn from_str(s: &str) -> Result<Self, Box<dyn Error>> {
        let bits: u16 = s.trim().parse()?;
        Ok(BitDepth::try_from(bits)?)
    }
}

impl fmt::Display for BitDepth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.bits())
    }
}

/// How the channels of a sample are mapped into the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelMode {
    /// Left channel only.
    Left,
    /// Right channel only (falls back to left for mono sources).
    Right,
    /// Mean of left and right.
    Sum,
    /// Half the difference of left and right (side signal).
    Difference,
    /// Source channels passed through untouched.
    #[default]
    Stereo,
}

impl ChannelMode {
    /// Convert to string representation
    pub fn as_str(self) -> &'static str {
        match self {
            ChannelMode::Left => "left",
            ChannelMode::Right => "right",
            ChannelMode::Sum => "sum",
            ChannelMode::Difference => "difference",
            ChannelMode::Stereo => "stereo",
        }
    }

    /// Whether the mode collapses its input to a single channel.
    pub fn is_mono(self) -> bool {
        !matches!(self, ChannelMode::Stereo)
    }
}

impl FromStr for ChannelMode {
    type Err = Box<dyn Error>;

    fn from_str(s: &str) -> Result<Self, Box<dyn Error>> {
        match s.to_ascii_lowercase().as_str() {
            "left" | "l" => Ok(ChannelMode::Left),
            "right" | "r" => Ok(ChannelMode::Right),
            "sum" | "s" => Ok(ChannelMode::Sum),
            "difference" | "diff" | "d" => Ok(ChannelMode::Difference),
            "stereo" | "source" => Ok(ChannelMode::Stereo),
            _ => Err(format!("Unsupported channel mode: {}", s).into()),
        }
    }
}

impl fmt::Display for ChannelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Target audio format for encoding.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetFormat {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Output bit depth
    pub bit_depth: BitDepth,
}

impl TargetFormat {
    /// Creates a new TargetFormat
    pub fn new(sample_rate: u32, bit_depth: BitDepth) -> Result<Self, Box<dyn Error>> {
        if sample_rate == 0 {
            return Err("Sample rate must be greater than 0".into());
        }

        Ok(TargetFormat {
            sample_rate,
            bit_depth,
        })
    }
}

impl Default for TargetFormat {
    /// Creates a default target format (44.1kHz, 16-bit integer)
    fn default() -> Self {
        TargetFormat {
            sample_rate: 44100,
            bit_depth: BitDepth::Sixteen,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bit_depth_from_str() {
        assert_eq!(BitDepth::from_str("8").unwrap(), BitDepth::Eight);
        assert_eq!(BitDepth::from_str("16").unwrap(), BitDepth::Sixteen);
        assert_eq!(BitDepth::from_str(" 24 ").unwrap(), BitDepth::TwentyFour);
        assert_eq!(BitDepth::from_str("32").unwrap(), BitDepth::ThirtyTwoFloat);
    }

    #[test]
    fn test_bit_depth_from_str_invalid() {
        assert!(BitDepth::from_str("12").is_err());
        assert!(BitDepth::from_str("").is_err());
        assert!(BitDepth::from_str("float").is_err());
    }

    #[test]
    fn test_bit_depth_sizes() {
        assert_eq!(BitDepth::Eight.bytes_per_sample(), 1);
        assert_eq!(BitDepth::TwentyFour.bytes_per_sample(), 3);
        assert_eq!(BitDepth::ThirtyTwoFloat.wave_format_tag(), 3);
        assert_eq!(BitDepth::Sixteen.wave_format_tag(), 1);
    }

    #[test]
    fn test_channel_mode_from_str() {
        assert_eq!(ChannelMode::from_str("L").unwrap(), ChannelMode::Left);
        assert_eq!(ChannelMode::from_str("right").unwrap(), ChannelMode::Right);
        assert_eq!(ChannelMode::from_str("Sum").unwrap(), ChannelMode::Sum);
        assert_eq!(ChannelMode::from_str("diff").unwrap(), ChannelMode::Difference);
        assert_eq!(ChannelMode::from_str("stereo").unwrap(), ChannelMode::Stereo);
        assert!(ChannelMode::from_str("quad").is_err());
    }

    #[test]
    fn test_channel_mode_display() {
        assert_eq!(format!("{}", ChannelMode::Difference), "difference");
        assert_eq!(format!("{}", ChannelMode::Stereo), "stereo");
    }

    #[test]
    fn test_target_format_new_invalid() {
        assert!(TargetFormat::new(0, BitDepth::Sixteen).is_err());
        let format = TargetFormat::new(48000, BitDepth::TwentyFour).unwrap();
        assert_eq!(format.sample_rate, 48000);
        assert_eq!(format.bit_depth, BitDepth::TwentyFour);
    }

    #[test]
    fn test_target_format_default() {
        let format = TargetFormat::default();
        assert_eq!(format.sample_rate, 44100);
        assert_eq!(format.bit_depth, BitDepth::Sixteen);
    }
}
