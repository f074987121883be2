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

//! The normalized slice model shared by every container dialect.
//!
//! Positions are frame offsets at the owning sample's working rate. Whenever
//! a dialect stores positions at a different rate, they pass through
//! [`SliceMarker::rescaled`], which multiplies by `to / from`, rounds to the
//! nearest frame and refuses to produce an empty or inverted slice.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

pub mod digichain;
pub mod op1;

/// Centre pan position.
pub const PAN_CENTER: u16 = 16384;

/// Full-right pan position.
pub const PAN_MAX: u16 = 32768;

/// Fine pitch is clamped to this magnitude on export.
pub const PITCH_LIMIT: i32 = 24576;

/// Error types for slice metadata dialects
#[derive(Debug, thiserror::Error)]
pub enum SliceError {
    #[error("Invalid base64 slice payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Slice payload is not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("Invalid slice JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// One cue/slice of a sample.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SliceMarker {
    /// First frame of the slice.
    pub start: usize,
    /// One past the last frame of the slice.
    pub end: usize,
    /// Loop point, `None` when the slice does not loop.
    #[serde(default, rename = "loop")]
    pub loop_point: Option<usize>,
    #[serde(default)]
    pub name: Option<String>,
    /// Pan in `0..=32768`, 16384 is centre.
    #[serde(default = "default_pan")]
    pub pan: u16,
    /// Pan addresses the A/B crossfade instead of left/right.
    #[serde(default)]
    pub pan_is_ab: bool,
    /// Fine pitch offset in OP-1 units.
    #[serde(default)]
    pub pitch: i32,
}

fn default_pan() -> u16 {
    PAN_CENTER
}

impl SliceMarker {
    /// Creates a plain slice with centred pan, no loop and no pitch offset.
    pub fn new(start: usize, end: usize) -> Self {
        SliceMarker {
            start,
            end,
            loop_point: None,
            name: None,
            pan: PAN_CENTER,
            pan_is_ab: false,
            pitch: 0,
        }
    }

    pub fn with_loop(mut self, loop_point: usize) -> Self {
        self.loop_point = Some(loop_point);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Number of frames covered by the slice.
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Converts the slice from `from_rate` positions to `to_rate` positions.
    /// Returns `None` when the rescaled slice would be empty or inverted.
    pub fn rescaled(&self, from_rate: u32, to_rate: u32) -> Option<SliceMarker> {
        if from_rate == to_rate || from_rate == 0 {
            return (self.start < self.end).then(|| self.clone());
        }
        let start = rescale_position(self.start, from_rate, to_rate);
        let end = rescale_position(self.end, from_rate, to_rate);
        if end <= start {
            return None;
        }
        let loop_point = self
            .loop_point
            .map(|l| rescale_position(l, from_rate, to_rate));

        Some(SliceMarker {
            start,
            end,
            loop_point,
            ..self.clone()
        })
    }
}

/// Scales one frame position by `to_rate / from_rate`, rounding to the nearest frame.
pub fn rescale_position(position: usize, from_rate: u32, to_rate: u32) -> usize {
    if from_rate == to_rate || from_rate == 0 {
        return position;
    }
    (position as f64 * to_rate as f64 / from_rate as f64).round() as usize
}

/// Rescales a slice list, dropping slices that collapse.
pub fn rescale_slices(slices: &[SliceMarker], from_rate: u32, to_rate: u32) -> Vec<SliceMarker> {
    slices
        .iter()
        .filter_map(|slice| {
            let rescaled = slice.rescaled(from_rate, to_rate);
            if rescaled.is_none() {
                debug!(
                    start = slice.start,
                    end = slice.end,
                    from_rate,
                    to_rate,
                    "Dropping degenerate slice"
                );
            }
            rescaled
        })
        .collect()
}

/// Clamps slices to `length` frames and drops the ones left empty.
/// An empty result is reported as `None`: absent and empty slice lists are the same thing.
pub fn normalize(slices: Vec<SliceMarker>, length: usize) -> Option<Vec<SliceMarker>> {
    let normalized: Vec<SliceMarker> = slices
        .into_iter()
        .filter_map(|mut slice| {
            slice.end = slice.end.min(length);
            if let Some(loop_point) = slice.loop_point {
                if loop_point >= length {
                    slice.loop_point = None;
                }
            }
            (slice.start < slice.end).then_some(slice)
        })
        .collect();
    (!normalized.is_empty()).then_some(normalized)
}

/// True for the single slice spanning the whole buffer, which carries no information.
pub fn is_trivial(slices: &[SliceMarker], length: usize) -> bool {
    matches!(slices, [only] if only.start == 0 && only.end == length)
}

/// Keeps the first slice for every distinct start frame.
pub fn dedup_by_start(slices: Vec<SliceMarker>) -> Vec<SliceMarker> {
    let mut seen = HashSet::new();
    slices
        .into_iter()
        .filter(|slice| seen.insert(slice.start))
        .collect()
}

/// Builds slices from start points: every slice ends where the next begins,
/// the last one at `length`.
pub fn from_starts(starts: &[usize], length: usize) -> Vec<SliceMarker> {
    starts
        .iter()
        .enumerate()
        .filter_map(|(i, &start)| {
            let end = starts.get(i + 1).copied().unwrap_or(length);
            (start < end && start < length).then(|| SliceMarker::new(start, end.min(length)))
        })
        .collect()
}

/// Splits `length` frames into `count` equal slices.
pub fn even_slices(length: usize, count: usize) -> Vec<SliceMarker> {
    if count == 0 || length == 0 {
        return Vec::new();
    }
    let step = length as f64 / count as f64;
    (0..count)
        .map(|i| {
            let start = (i as f64 * step).round() as usize;
            let end = ((i + 1) as f64 * step).round() as usize;
            SliceMarker::new(start, end.min(length))
        })
        .filter(|slice| !slice.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rescale_rounds_to_nearest() {
        let slice = SliceMarker::new(100, 1001).with_loop(500);
        let rescaled = slice.rescaled(44100, 48000).unwrap();
        assert_eq!(rescaled.start, 109);
        assert_eq!(rescaled.end, 1090);
        assert_eq!(rescaled.loop_point, Some(544));
    }

    #[test]
    fn test_rescale_drops_collapsed_slice() {
        let slice = SliceMarker::new(10, 11);
        assert!(slice.rescaled(48000, 8000).is_none());
        let slices = rescale_slices(&[slice, SliceMarker::new(0, 600)], 48000, 8000);
        assert_eq!(slices, vec![SliceMarker::new(0, 100)]);
    }

    #[test]
    fn test_rescale_never_inverts_or_drops_large_slices() {
        let rates = [8000u32, 11025, 22050, 44100, 48000, 96000];
        for &from in &rates {
            for &to in &rates {
                // A slice longer than one destination frame plus rounding slack survives.
                let min_len = (from as f64 / to as f64).ceil() as usize * 2;
                for start in (0..5000).step_by(397) {
                    for len in [1usize, 2, 3, min_len, min_len + 7, 1000] {
                        let slice = SliceMarker::new(start, start + len);
                        match slice.rescaled(from, to) {
                            Some(r) => assert!(r.start < r.end),
                            None => assert!(len < min_len, "{} -> {} dropped {:?}", from, to, slice),
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(vec![], 100), None);
        assert_eq!(normalize(vec![SliceMarker::new(150, 200)], 100), None);
        let normalized = normalize(
            vec![SliceMarker::new(0, 50), SliceMarker::new(50, 150).with_loop(120)],
            100,
        )
        .unwrap();
        assert_eq!(normalized[1].end, 100);
        assert_eq!(normalized[1].loop_point, None);
    }

    #[test]
    fn test_is_trivial() {
        assert!(is_trivial(&[SliceMarker::new(0, 100)], 100));
        assert!(!is_trivial(&[SliceMarker::new(0, 99)], 100));
        assert!(!is_trivial(
            &[SliceMarker::new(0, 50), SliceMarker::new(50, 100)],
            100
        ));
        assert!(!is_trivial(&[], 100));
    }

    #[test]
    fn test_from_starts() {
        let slices = from_starts(&[0, 1000, 2500], 4000);
        assert_eq!(
            slices,
            vec![
                SliceMarker::new(0, 1000),
                SliceMarker::new(1000, 2500),
                SliceMarker::new(2500, 4000)
            ]
        );
    }

    #[test]
    fn test_dedup_by_start() {
        let slices = dedup_by_start(vec![
            SliceMarker::new(0, 10).with_name("json"),
            SliceMarker::new(0, 12),
            SliceMarker::new(10, 20),
        ]);
        assert_eq!(slices.len(), 2);
        assert_eq!(slices[0].name.as_deref(), Some("json"));
    }

    #[test]
    fn test_even_slices() {
        let slices = even_slices(10, 3);
        assert_eq!(slices.len(), 3);
        assert_eq!(slices[0].start, 0);
        assert_eq!(slices[2].end, 10);
        assert!(even_slices(10, 0).is_empty());
    }
}
