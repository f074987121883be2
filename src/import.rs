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
//! File import: container detection, host-decode fallback and companion `.ot`
//! files.
//!
//! An `.ot` file carries no audio. Importing one parks its slices in a pending
//! pool keyed by file stem; the next sample imported with the same stem takes
//! them over, replacing whatever slices its own container held.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::audio::host::{HostDecoder, SymphoniaDecoder};
use crate::codec::{
    self, ot, ContainerKind, DecodeFailure, DecodeOptions, DecodeOutcome, Decoded, FailureKind,
    Metadata, SliceSource,
};
use crate::slices::{self, SliceMarker};
use crate::util::{extension, stem_key};

/// Result of importing one file.
#[derive(Debug, Clone, PartialEq)]
pub enum ImportOutcome {
    Sample(Box<Decoded>),
    /// An `.ot` file was parked for the sample with the same stem.
    Sidecar { stem: String, slices: usize },
    Failed(DecodeFailure),
}

/// Imports files into samples at a common working rate.
pub struct Importer<H: HostDecoder = SymphoniaDecoder> {
    options: DecodeOptions,
    host: H,
    pending: HashMap<String, Vec<SliceMarker>>,
}

impl Importer<SymphoniaDecoder> {
    pub fn new(options: DecodeOptions) -> Self {
        Importer::with_host(options, SymphoniaDecoder)
    }
}

impl<H: HostDecoder> Importer<H> {
    pub fn with_host(options: DecodeOptions, host: H) -> Self {
        Importer {
            options,
            host,
            pending: HashMap::new(),
        }
    }

    pub fn options(&self) -> &DecodeOptions {
        &self.options
    }

    /// Stems of `.ot` files still waiting for their sample.
    pub fn pending_sidecars(&self) -> Vec<&str> {
        let mut stems: Vec<&str> = self.pending.keys().map(|k| k.as_str()).collect();
        stems.sort_unstable();
        stems
    }

    /// Imports `bytes` read from a file called `file_name`.
    pub fn import(&mut self, file_name: &str, bytes: &[u8]) -> ImportOutcome {
        let ext = extension(file_name);
        if ext.as_deref() == Some("ot") || ot::is_ot(bytes) {
            return self.park_sidecar(file_name, bytes);
        }

        match codec::decode(file_name, bytes, &self.options) {
            DecodeOutcome::Decoded(mut decoded) => {
                self.apply_sidecar(file_name, &mut decoded);
                ImportOutcome::Sample(decoded)
            }
            DecodeOutcome::Failed(failure) if failure.kind == FailureKind::FormatMismatch => {
                self.host_decode(file_name, ext.as_deref(), bytes, failure)
            }
            DecodeOutcome::Failed(failure) => ImportOutcome::Failed(failure),
        }
    }

    /// Reads and imports one file.
    pub fn import_path(&mut self, path: &Path) -> Result<ImportOutcome, io::Error> {
        let bytes = fs::read(path)?;
        let file_name = path.to_string_lossy();
        Ok(self.import(&file_name, &bytes))
    }

    /// Imports several files, companion `.ot` files first so every sample
    /// finds its slices. Results keep the input order.
    pub fn import_paths(
        &mut self,
        paths: &[PathBuf],
    ) -> Vec<(PathBuf, Result<ImportOutcome, io::Error>)> {
        let mut order: Vec<usize> = (0..paths.len()).collect();
        order.sort_by_key(|&i| extension(&paths[i].to_string_lossy()).as_deref() != Some("ot"));

        let mut results: Vec<Option<Result<ImportOutcome, io::Error>>> =
            (0..paths.len()).map(|_| None).collect();
        for i in order {
            results[i] = Some(self.import_path(&paths[i]));
        }
        paths
            .iter()
            .cloned()
            .zip(results)
            .filter_map(|(path, result)| result.map(|r| (path, r)))
            .collect()
    }

    fn park_sidecar(&mut self, file_name: &str, bytes: &[u8]) -> ImportOutcome {
        match ot::decode(bytes, self.options.working_rate) {
            Ok(slices) => {
                let stem = stem_key(file_name);
                info!(file = file_name, slices = slices.len(), "Parked OT slices");
                let count = slices.len();
                self.pending.insert(stem.clone(), slices);
                ImportOutcome::Sidecar {
                    stem,
                    slices: count,
                }
            }
            Err(e) => DecodeOutcome::failed(file_name, &e).into(),
        }
    }

    /// Moves pending `.ot` slices onto the sample with the same stem.
    fn apply_sidecar(&mut self, file_name: &str, decoded: &mut Decoded) {
        let Some(sidecar) = self.pending.remove(&stem_key(file_name)) else {
            return;
        };
        match slices::normalize(sidecar, decoded.sample.len()) {
            Some(slices) => {
                debug!(
                    file = file_name,
                    slices = slices.len(),
                    "Applying OT slices"
                );
                decoded.slices = Some(slices);
                decoded.metadata.slice_source = Some(SliceSource::Sidecar);
            }
            None => debug!(file = file_name, "OT slices lie outside the sample"),
        }
    }

    fn host_decode(
        &mut self,
        file_name: &str,
        ext: Option<&str>,
        bytes: &[u8],
        failure: DecodeFailure,
    ) -> ImportOutcome {
        let sample = match self.host.decode(bytes, ext) {
            Ok(sample) => sample,
            Err(e) => {
                debug!(file = file_name, err = %e, "Host decoder rejected file");
                return ImportOutcome::Failed(DecodeFailure {
                    message: format!("{}; host decoder: {}", failure.message, e),
                    ..failure
                });
            }
        };

        match Decoded::from_native(
            ContainerKind::Host,
            sample,
            None,
            Metadata::default(),
            &self.options,
        ) {
            Ok(mut decoded) => {
                self.apply_sidecar(file_name, &mut decoded);
                ImportOutcome::Sample(Box::new(decoded))
            }
            Err(e) => DecodeOutcome::failed(file_name, &e).into(),
        }
    }
}

impl From<DecodeOutcome> for ImportOutcome {
    fn from(outcome: DecodeOutcome) -> Self {
        match outcome {
            DecodeOutcome::Decoded(decoded) => ImportOutcome::Sample(decoded),
            DecodeOutcome::Failed(failure) => ImportOutcome::Failed(failure),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{BitDepth, ResampleQuality};
    use crate::codec::ot::OtSettings;
    use crate::codec::wav::{self, WavMetadataOptions};
    use crate::testutil::hound_wav;

    fn importer(working_rate: u32) -> Importer {
        Importer::new(DecodeOptions {
            working_rate,
            quality: ResampleQuality::Fast,
        })
    }

    fn expect_sample(outcome: ImportOutcome) -> Decoded {
        match outcome {
            ImportOutcome::Sample(decoded) => *decoded,
            other => panic!("expected a sample, got {:?}", other),
        }
    }

    #[test]
    fn test_sidecar_overrides_embedded_slices() {
        let embedded = vec![SliceMarker::new(0, 500), SliceMarker::new(500, 1000)];
        let wav = wav::encode(
            &[vec![0.0; 1000]],
            44100,
            BitDepth::Sixteen,
            Some(&embedded),
            WavMetadataOptions::default(),
        )
        .unwrap();
        let sidecar_slices = vec![SliceMarker::new(0, 250), SliceMarker::new(250, 1000)];
        let sidecar = ot::encode(1000, 44100, &sidecar_slices, &OtSettings::default()).unwrap();

        let mut importer = importer(44100);
        assert_eq!(
            importer.import("Loop.ot", &sidecar),
            ImportOutcome::Sidecar {
                stem: "loop".to_string(),
                slices: 2
            }
        );
        assert_eq!(importer.pending_sidecars(), vec!["loop"]);

        let decoded = expect_sample(importer.import("loop.wav", &wav));
        assert_eq!(decoded.slices, Some(sidecar_slices));
        assert_eq!(decoded.metadata.slice_source, Some(SliceSource::Sidecar));
        assert!(importer.pending_sidecars().is_empty());

        // The sidecar is consumed by the first match.
        let decoded = expect_sample(importer.import("loop.wav", &wav));
        assert_eq!(decoded.slices, Some(embedded));
    }

    struct FixedHost;

    impl HostDecoder for FixedHost {
        fn decode(
            &self,
            _bytes: &[u8],
            extension: Option<&str>,
        ) -> Result<crate::audio::Sample, crate::audio::host::HostDecodeError> {
            assert_eq!(extension, Some("flac"));
            Ok(crate::audio::Sample::mono(vec![0.5; 100], 22050)?)
        }
    }

    #[test]
    fn test_host_fallback() {
        let mut importer = Importer::with_host(
            DecodeOptions {
                working_rate: 44100,
                quality: ResampleQuality::Fast,
            },
            FixedHost,
        );
        let decoded = expect_sample(importer.import("pad.flac", b"fLaC\0\0\0\x22"));
        assert_eq!(decoded.kind, ContainerKind::Host);
        assert_eq!(decoded.sample.sample_rate(), 44100);
        assert_eq!(decoded.sample.source_sample_rate(), 22050);
        assert_eq!(decoded.slices, None);
    }

    #[test]
    fn test_host_rejection_keeps_format_mismatch() {
        let mut bytes = hound_wav(&[vec![0.25; 100]], 22050);
        let mut importer = importer(44100);
        let decoded = expect_sample(importer.import("plain.wav", &bytes));
        assert_eq!(decoded.kind, ContainerKind::Wav);

        bytes[8..12].copy_from_slice(b"XXXX");
        match importer.import("broken.wav", &bytes) {
            ImportOutcome::Failed(failure) => {
                assert_eq!(failure.kind, FailureKind::FormatMismatch);
                assert!(failure.message.contains("host decoder"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_import_paths_reads_sidecars_first() {
        let dir = tempfile::tempdir().unwrap();
        let wav_path = dir.path().join("beat.wav");
        let ot_path = dir.path().join("beat.ot");
        fs::write(&wav_path, hound_wav(&[vec![0.0; 2000]], 44100)).unwrap();
        let slices = vec![SliceMarker::new(0, 1000), SliceMarker::new(1000, 2000)];
        fs::write(
            &ot_path,
            ot::encode(2000, 44100, &slices, &OtSettings::default()).unwrap(),
        )
        .unwrap();

        let mut importer = importer(44100);
        let results = importer.import_paths(&[wav_path.clone(), ot_path.clone()]);
        assert_eq!(results[0].0, wav_path);
        assert_eq!(results[1].0, ot_path);

        let mut results = results.into_iter();
        let (_, first) = results.next().unwrap();
        let decoded = expect_sample(first.unwrap());
        assert_eq!(decoded.slices, Some(slices));
        assert!(matches!(
            results.next().unwrap().1.unwrap(),
            ImportOutcome::Sidecar { .. }
        ));
    }

    #[test]
    fn test_unsupported_files_fail_without_panicking() {
        let mut bytes = hound_wav(&[vec![0.0; 10]], 44100);
        bytes[34] = 12;
        let mut importer = importer(44100);
        match importer.import("odd.wav", &bytes) {
            ImportOutcome::Failed(failure) => {
                assert_eq!(failure.kind, FailureKind::UnsupportedVariant);
                assert_eq!(failure.id, "odd.wav");
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
