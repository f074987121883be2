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

//! The compact slice document embedded (base64) in the WAV `ISBJ` chunk:
//! `{"sr": 48000, "dcs": [{"s": 0, "e": 1000, "l": -1, "n": "kick"}]}`.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Deserializer, Serialize};

use super::{rescale_slices, SliceError, SliceMarker};

/// Loop value meaning "no loop".
const NO_LOOP: i64 = -1;

/// The slice document. `sr` is the rate the positions were written at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SliceDocument {
    #[serde(default)]
    pub sr: u32,
    #[serde(default)]
    pub dcs: Vec<DocumentSlice>,
}

/// One slice entry of a [`SliceDocument`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSlice {
    #[serde(deserialize_with = "lenient_int")]
    pub s: i64,
    #[serde(deserialize_with = "lenient_int")]
    pub e: i64,
    #[serde(default = "no_loop", deserialize_with = "lenient_int")]
    pub l: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,
}

fn no_loop() -> i64 {
    NO_LOOP
}

/// Accepts integers and floats; positions written by other tools are not always integral.
fn lenient_int<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = f64::deserialize(deserializer)?;
    Ok(value.round() as i64)
}

impl SliceDocument {
    /// Builds a document from slices positioned at `sample_rate`.
    pub fn from_slices(slices: &[SliceMarker], sample_rate: u32) -> Self {
        SliceDocument {
            sr: sample_rate,
            dcs: slices
                .iter()
                .map(|slice| DocumentSlice {
                    s: slice.start as i64,
                    e: slice.end as i64,
                    l: slice.loop_point.map(|l| l as i64).unwrap_or(NO_LOOP),
                    n: slice.name.clone(),
                })
                .collect(),
        }
    }

    /// Converts the document into slices at `working_rate`.
    /// Negative or inverted entries are dropped, as are entries that collapse on rescale.
    pub fn into_slices(self, working_rate: u32) -> Vec<SliceMarker> {
        let slices: Vec<SliceMarker> = self
            .dcs
            .into_iter()
            .filter(|entry| entry.s >= 0 && entry.e > entry.s)
            .map(|entry| SliceMarker {
                loop_point: (entry.l >= 0).then_some(entry.l as usize),
                name: entry.n,
                ..SliceMarker::new(entry.s as usize, entry.e as usize)
            })
            .collect();

        let source_rate = if self.sr == 0 { working_rate } else { self.sr };
        rescale_slices(&slices, source_rate, working_rate)
    }
}

/// Serializes slices to the base64 payload stored in the `ISBJ` chunk.
pub fn encode_base64(slices: &[SliceMarker], sample_rate: u32) -> Result<String, SliceError> {
    let json = serde_json::to_string(&SliceDocument::from_slices(slices, sample_rate))?;
    Ok(STANDARD.encode(json))
}

/// Parses an `ISBJ` payload. Surrounding whitespace and NUL padding are ignored.
pub fn decode_base64(payload: &[u8], working_rate: u32) -> Result<Vec<SliceMarker>, SliceError> {
    let text = String::from_utf8(payload.to_vec())?;
    let trimmed = text.trim_matches(|c: char| c == '\0' || c.is_whitespace());
    let json = String::from_utf8(STANDARD.decode(trimmed)?)?;
    let document: SliceDocument = serde_json::from_str(json.trim())?;
    Ok(document.into_slices(working_rate))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_shape() {
        let slices = vec![
            SliceMarker::new(0, 1000).with_name("kick"),
            SliceMarker::new(1000, 2000).with_loop(1500),
        ];
        let json = serde_json::to_string(&SliceDocument::from_slices(&slices, 48000)).unwrap();
        assert_eq!(
            json,
            r#"{"sr":48000,"dcs":[{"s":0,"e":1000,"l":-1,"n":"kick"},{"s":1000,"e":2000,"l":1500}]}"#
        );
    }

    #[test]
    fn test_base64_payload_is_word_aligned() {
        for count in 1..6 {
            let slices: Vec<SliceMarker> = (0..count)
                .map(|i| SliceMarker::new(i * 10, i * 10 + 10))
                .collect();
            let payload = encode_base64(&slices, 44100).unwrap();
            assert_eq!(payload.len() % 4, 0);
        }
    }

    #[test]
    fn test_decode_rescales_from_document_rate() {
        let slices = vec![SliceMarker::new(0, 44100), SliceMarker::new(44100, 88200)];
        let payload = encode_base64(&slices, 44100).unwrap();
        let mut padded = payload.into_bytes();
        padded.extend_from_slice(b"\0 ");

        let decoded = decode_base64(&padded, 48000).unwrap();
        assert_eq!(
            decoded,
            vec![SliceMarker::new(0, 48000), SliceMarker::new(48000, 96000)]
        );
    }

    #[test]
    fn test_lenient_numbers_and_missing_loop() {
        let document: SliceDocument =
            serde_json::from_str(r#"{"sr":44100,"dcs":[{"s":0.4,"e":99.6},{"s":-5,"e":3}]}"#)
                .unwrap();
        let slices = document.into_slices(44100);
        assert_eq!(slices, vec![SliceMarker::new(0, 100)]);
    }

    #[test]
    fn test_invalid_payload() {
        assert!(matches!(
            decode_base64(b"not base64!", 44100),
            Err(SliceError::Base64(_))
        ));
        let payload = STANDARD.encode("{broken");
        assert!(matches!(
            decode_base64(payload.as_bytes(), 44100),
            Err(SliceError::Json(_))
        ));
    }
}
