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

//! The OP-1 / OP-1 Field patch descriptor stored in an AIFF `APPL op-1` chunk.
//!
//! Drum kits describe their slices through parallel arrays (`start`, `end`,
//! `pitch`, `pan`, `pan_ab`, ...). Positions are fixed point: one frame at
//! 44100 Hz is `2147483646 / (44100 * 12)` units for mono kits and
//! `2147483646 / (44100 * 20)` units for stereo kits.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use super::{rescale_slices, SliceMarker, PAN_CENTER, PAN_MAX, PITCH_LIMIT};

/// Reference rate of every OP-1 position.
pub const OP1_SAMPLE_RATE: u32 = 44100;

/// Number of keys in a drum kit.
pub const DRUM_SLOTS: usize = 24;

/// Fixed-point units per 44.1 kHz frame.
pub fn position_scale(stereo: bool) -> f64 {
    2147483646.0 / (OP1_SAMPLE_RATE as f64 * if stereo { 20.0 } else { 12.0 })
}

fn default_version() -> u32 {
    2
}

fn default_type() -> String {
    "drum".to_string()
}

fn default_slot_param() -> Vec<i32> {
    vec![8192; DRUM_SLOTS]
}

fn default_dyna_env() -> Vec<i32> {
    vec![0, 8192, 0, 8192, 0, 0, 0, 0]
}

fn default_fx_type() -> String {
    "delay".to_string()
}

fn default_fx_params() -> Vec<i32> {
    vec![8000; 8]
}

fn default_lfo_type() -> String {
    "tremolo".to_string()
}

fn default_lfo_params() -> Vec<i32> {
    vec![16000, 16000, 16000, 16000, 0, 0, 0, 0]
}

/// An OP-1 patch. Unknown keys survive a decode/encode round trip in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Op1Patch {
    #[serde(default = "default_version")]
    pub drum_version: u32,
    #[serde(rename = "type", default = "default_type")]
    pub patch_type: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub octave: i32,
    #[serde(default)]
    pub pitch: Vec<i32>,
    #[serde(default)]
    pub start: Vec<i64>,
    #[serde(default)]
    pub end: Vec<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pan: Option<Vec<i32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pan_ab: Option<Vec<bool>>,
    #[serde(default = "default_slot_param")]
    pub playmode: Vec<i32>,
    #[serde(default = "default_slot_param")]
    pub reverse: Vec<i32>,
    #[serde(default = "default_slot_param")]
    pub volume: Vec<i32>,
    #[serde(default = "default_dyna_env")]
    pub dyna_env: Vec<i32>,
    #[serde(default)]
    pub fx_active: bool,
    #[serde(default = "default_fx_type")]
    pub fx_type: String,
    #[serde(default = "default_fx_params")]
    pub fx_params: Vec<i32>,
    #[serde(default)]
    pub lfo_active: bool,
    #[serde(default = "default_lfo_type")]
    pub lfo_type: String,
    #[serde(default = "default_lfo_params")]
    pub lfo_params: Vec<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stereo: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Op1Patch {
    /// Builds a drum patch describing `slices`, which are positioned at `sample_rate`.
    /// Only the first 24 slices fit; unused keys are left empty.
    pub fn drum_kit(name: &str, slices: &[SliceMarker], sample_rate: u32, stereo: bool) -> Self {
        if slices.len() > DRUM_SLOTS {
            warn!(
                slices = slices.len(),
                "OP-1 drum kits hold {} slices, extra slices are ignored", DRUM_SLOTS
            );
        }
        let scale = position_scale(stereo);
        let kept = &slices[..slices.len().min(DRUM_SLOTS)];
        let reference = rescale_slices(kept, sample_rate, OP1_SAMPLE_RATE);
        let to_fixed =
            |frame: usize| -> i64 { (frame as f64 * scale).round().min(i32::MAX as f64) as i64 };

        let last_end = reference.last().map(|s| to_fixed(s.end)).unwrap_or(0);
        let mut start = vec![last_end; DRUM_SLOTS];
        let mut end = vec![last_end; DRUM_SLOTS];
        let mut pitch = vec![0; DRUM_SLOTS];
        let mut pan = vec![PAN_CENTER as i32; DRUM_SLOTS];
        let mut pan_ab = vec![false; DRUM_SLOTS];

        for (i, slice) in reference.iter().enumerate() {
            start[i] = to_fixed(slice.start);
            end[i] = to_fixed(slice.end);
            pitch[i] = slice.pitch.clamp(-PITCH_LIMIT, PITCH_LIMIT);
            pan[i] = slice.pan.min(PAN_MAX) as i32;
            pan_ab[i] = slice.pan_is_ab;
        }

        Op1Patch {
            drum_version: default_version(),
            patch_type: default_type(),
            name: name.to_string(),
            octave: 0,
            pitch,
            start,
            end,
            pan: Some(pan),
            pan_ab: Some(pan_ab),
            playmode: default_slot_param(),
            reverse: default_slot_param(),
            volume: default_slot_param(),
            dyna_env: default_dyna_env(),
            fx_active: false,
            fx_type: default_fx_type(),
            fx_params: default_fx_params(),
            lfo_active: false,
            lfo_type: default_lfo_type(),
            lfo_params: default_lfo_params(),
            stereo: stereo.then_some(true),
            extra: Map::new(),
        }
    }

    /// Extracts the slices of a drum patch at `working_rate`.
    /// `stereo` selects the fixed-point scale; empty keys are skipped.
    pub fn slices(&self, working_rate: u32, stereo: bool) -> Vec<SliceMarker> {
        let scale = position_scale(self.stereo.unwrap_or(stereo));
        let to_frame = |value: i64| -> usize { (value.max(0) as f64 / scale).round() as usize };

        let reference: Vec<SliceMarker> = self
            .start
            .iter()
            .zip(self.end.iter())
            .enumerate()
            .filter_map(|(i, (&start, &end))| {
                let (start, end) = (to_frame(start), to_frame(end));
                if start >= end {
                    return None;
                }
                Some(SliceMarker {
                    pan: self
                        .pan
                        .as_ref()
                        .and_then(|p| p.get(i))
                        .map(|&p| p.clamp(0, PAN_MAX as i32) as u16)
                        .unwrap_or(PAN_CENTER),
                    pan_is_ab: self
                        .pan_ab
                        .as_ref()
                        .and_then(|p| p.get(i))
                        .copied()
                        .unwrap_or(false),
                    pitch: self.pitch.get(i).copied().unwrap_or(0),
                    ..SliceMarker::new(start, end)
                })
            })
            .collect();

        rescale_slices(&reference, OP1_SAMPLE_RATE, working_rate)
    }
}
