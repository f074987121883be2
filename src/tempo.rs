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
//! Tempo detection.
//!
//! A tempo in the file name wins. Otherwise the low end of the first 30
//! seconds is band-passed, one peak is taken per half second, and the
//! intervals between the loudest peaks vote for a tempo folded into
//! 90..=180 BPM.

use std::collections::HashMap;
use std::f64::consts::PI;
use std::path::Path;

use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

use crate::audio::Sample;

lazy_static! {
    static ref FILE_NAME_BPM: Regex =
        Regex::new(r"(?i)(?:^|[^0-9a-z.])(?<bpm>\d{2,3}(?:\.\d+)?)\s*(?:bpm)?(?:[^0-9a-z]|$)")
            .expect("valid tempo regex");
}

const ANALYSIS_SECONDS: f64 = 30.0;
const LOWPASS_HZ: f64 = 150.0;
const HIGHPASS_HZ: f64 = 100.0;
const PARTITION_SECONDS: f64 = 0.5;
const NEIGHBOURS: usize = 10;
const MIN_BPM: f64 = 90.0;
const MAX_BPM: f64 = 180.0;

/// A tempo and the number of intervals that voted for it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TempoCandidate {
    pub bpm: f64,
    pub votes: usize,
}

/// Result of [`detect_tempo`].
#[derive(Debug, Clone, PartialEq)]
pub struct TempoEstimate {
    pub bpm: f64,
    /// Up to two candidates, best first. Empty for file-name matches.
    pub alternatives: Vec<TempoCandidate>,
    pub from_file_name: bool,
}

/// Offline rendering of a band-limited copy of a channel.
pub trait BandRender {
    fn band_pass(&self, samples: &[f32], sample_rate: u32, low_hz: f64, high_hz: f64) -> Vec<f32>;
}

/// Renders with a low-pass biquad followed by a high-pass biquad.
#[derive(Debug, Default, Clone, Copy)]
pub struct BiquadRender;

impl BandRender for BiquadRender {
    fn band_pass(&self, samples: &[f32], sample_rate: u32, low_hz: f64, high_hz: f64) -> Vec<f32> {
        let mut lowpass = Biquad::lowpass(high_hz, sample_rate);
        let mut highpass = Biquad::highpass(low_hz, sample_rate);
        samples
            .iter()
            .map(|&x| highpass.process(lowpass.process(x as f64)) as f32)
            .collect()
    }
}

/// Direct form I biquad with RBJ cookbook coefficients, Q = 1/sqrt(2).
#[derive(Debug, Clone, Copy)]
struct Biquad {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,
}

impl Biquad {
    fn new(b: [f64; 3], a: [f64; 3]) -> Self {
        Biquad {
            b0: b[0] / a[0],
            b1: b[1] / a[0],
            b2: b[2] / a[0],
            a1: a[1] / a[0],
            a2: a[2] / a[0],
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        }
    }

    fn terms(frequency: f64, sample_rate: u32) -> (f64, f64) {
        let omega = 2.0 * PI * frequency / sample_rate as f64;
        let alpha = omega.sin() / (2.0 * std::f64::consts::FRAC_1_SQRT_2);
        (omega.cos(), alpha)
    }

    fn lowpass(frequency: f64, sample_rate: u32) -> Self {
        let (cos, alpha) = Self::terms(frequency, sample_rate);
        Self::new(
            [(1.0 - cos) / 2.0, 1.0 - cos, (1.0 - cos) / 2.0],
            [1.0 + alpha, -2.0 * cos, 1.0 - alpha],
        )
    }

    fn highpass(frequency: f64, sample_rate: u32) -> Self {
        let (cos, alpha) = Self::terms(frequency, sample_rate);
        Self::new(
            [(1.0 + cos) / 2.0, -(1.0 + cos), (1.0 + cos) / 2.0],
            [1.0 + alpha, -2.0 * cos, 1.0 - alpha],
        )
    }

    fn process(&mut self, x: f64) -> f64 {
        let y = self.b0 * x + self.b1 * self.x1 + self.b2 * self.x2
            - self.a1 * self.y1
            - self.a2 * self.y2;
        self.x2 = self.x1;
        self.x1 = x;
        self.y2 = self.y1;
        self.y1 = y;
        y
    }
}

/// Reads a tempo out of a file name such as `break_92bpm.wav` or `Loop 120.aif`.
pub fn tempo_from_file_name(file_name: &str) -> Option<f64> {
    let stem = Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name);
    FILE_NAME_BPM
        .captures(stem)
        .and_then(|c| c.name("bpm"))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .filter(|&bpm| bpm > 0.0)
}

/// Estimates the tempo of `sample`, trying `file_name` first.
pub fn detect_tempo(sample: &Sample, file_name: Option<&str>) -> Option<TempoEstimate> {
    detect_tempo_with(sample, file_name, &BiquadRender)
}

pub fn detect_tempo_with<R: BandRender + ?Sized>(
    sample: &Sample,
    file_name: Option<&str>,
    renderer: &R,
) -> Option<TempoEstimate> {
    if let Some(bpm) = file_name.and_then(tempo_from_file_name) {
        debug!(bpm, "Tempo taken from file name");
        return Some(TempoEstimate {
            bpm,
            alternatives: Vec::new(),
            from_file_name: true,
        });
    }

    let rate = sample.sample_rate();
    let frames = sample.len().min((ANALYSIS_SECONDS * rate as f64) as usize);
    let mono: Vec<f32> = (0..frames)
        .map(|i| sample.channels().iter().map(|c| c[i]).sum::<f32>())
        .collect();
    let filtered = renderer.band_pass(&mono, rate, HIGHPASS_HZ, LOWPASS_HZ);

    let partition = ((rate as f64 * PARTITION_SECONDS) as usize).max(1);
    let mut peaks: Vec<(usize, f32)> = filtered
        .chunks(partition)
        .enumerate()
        .filter_map(|(index, chunk)| {
            chunk
                .iter()
                .enumerate()
                .map(|(i, v)| (index * partition + i, v.abs()))
                .max_by(|a, b| a.1.total_cmp(&b.1))
        })
        .filter(|(_, volume)| *volume > 0.0)
        .collect();
    peaks.sort_by(|a, b| b.1.total_cmp(&a.1));
    peaks.truncate(peaks.len().div_ceil(2));
    peaks.sort_by_key(|(position, _)| *position);

    let mut votes: HashMap<u32, usize> = HashMap::new();
    for (i, (position, _)) in peaks.iter().enumerate() {
        for (next, _) in peaks.iter().skip(i + 1).take(NEIGHBOURS) {
            let interval = next - position;
            if interval == 0 {
                continue;
            }
            let tempo = fold(60.0 * rate as f64 / interval as f64);
            *votes.entry(tempo.round() as u32).or_default() += 1;
        }
    }

    let mut candidates: Vec<TempoCandidate> = votes
        .into_iter()
        .map(|(bpm, votes)| TempoCandidate {
            bpm: bpm as f64,
            votes,
        })
        .collect();
    candidates.sort_by(|a, b| b.votes.cmp(&a.votes).then(b.bpm.total_cmp(&a.bpm)));
    candidates.truncate(2);

    let best = match candidates.as_slice() {
        [] => return None,
        [only] => only.bpm,
        [first, second] if first.votes == second.votes => first.bpm.max(second.bpm),
        [first, ..] => first.bpm,
    };
    debug!(bpm = best, peaks = peaks.len(), "Tempo detected");
    Some(TempoEstimate {
        bpm: best,
        alternatives: candidates,
        from_file_name: false,
    })
}

/// Doubles or halves `tempo` into `90..=180`.
fn fold(mut tempo: f64) -> f64 {
    while tempo < MIN_BPM {
        tempo *= 2.0;
    }
    while tempo > MAX_BPM {
        tempo /= 2.0;
    }
    tempo
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::generate_sine;

    #[test]
    fn test_tempo_from_file_name() {
        assert_eq!(tempo_from_file_name("break_92bpm.wav"), Some(92.0));
        assert_eq!(tempo_from_file_name("Loop 120.aif"), Some(120.0));
        assert_eq!(tempo_from_file_name("funk-128-BPM-Am.wav"), Some(128.0));
        assert_eq!(tempo_from_file_name("dnb 174.5 bpm.wav"), Some(174.5));
        assert_eq!(tempo_from_file_name("kick1.wav"), None);
        assert_eq!(tempo_from_file_name("pad.wav"), None);
        assert_eq!(tempo_from_file_name("v2000.wav"), None);
    }

    #[test]
    fn test_file_name_pattern_compiles() {
        lazy_static::initialize(&FILE_NAME_BPM);
        assert!(FILE_NAME_BPM.capture_names().any(|name| name == Some("bpm")));
    }

    #[test]
    fn test_fold() {
        assert_eq!(fold(60.0), 120.0);
        assert_eq!(fold(240.0), 120.0);
        assert_eq!(fold(45.0), 90.0);
        assert_eq!(fold(180.0), 180.0);
    }

    #[test]
    fn test_file_name_short_circuits() {
        let sample = Sample::mono(vec![0.0; 100], 44100).unwrap();
        let estimate = detect_tempo(&sample, Some("loop_100bpm.wav")).unwrap();
        assert_eq!(estimate.bpm, 100.0);
        assert!(estimate.from_file_name);
        assert!(detect_tempo(&sample, Some("silence.wav")).is_none());
    }

    #[test]
    fn test_detects_pulse_train() {
        let rate = 22050;
        let beat = rate as usize / 2;
        let burst = generate_sine(120.0, 1.0, rate, rate as usize / 20);
        let mut data = vec![0.0f32; beat * 20];
        for n in 0..20 {
            // Accented beats are the loudest half.
            let accent = if n % 2 == 0 { 0.9 } else { 0.3 };
            let start = n * beat + beat / 5;
            for (i, v) in burst.iter().enumerate() {
                let envelope = 1.0 - i as f32 / burst.len() as f32;
                data[start + i] = v * envelope * accent;
            }
        }
        let sample = Sample::mono(data, rate).unwrap();

        let estimate = detect_tempo(&sample, None).unwrap();
        assert_eq!(estimate.bpm, 120.0);
        assert!(!estimate.from_file_name);
        assert!(!estimate.alternatives.is_empty());
    }
}
