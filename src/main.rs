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
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use clap::{crate_version, Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use slicekit::audio::channels::is_dual_mono;
use slicekit::audio::{BitDepth, ChannelMode};
use slicekit::chain::{build_chain, ChainOptions, ChainPart};
use slicekit::codec::{ContainerKind, Decoded, Metadata};
use slicekit::config::Settings;
use slicekit::export::{self, ExportFormat};
use slicekit::import::{ImportOutcome, Importer};
use slicekit::tempo::detect_tempo;
use slicekit::util::{duration_minutes_seconds, filename_display};

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "Sample chain conversion for hardware samplers."
)]
struct Cli {
    /// Settings file (YAML, TOML or JSON).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decodes files and lists their format and slices.
    Inspect {
        /// The files to inspect.
        files: Vec<PathBuf>,
    },
    /// Converts files for a target device.
    Convert {
        /// The files to convert. Companion .ot files are applied to their samples.
        files: Vec<PathBuf>,
        /// Directory the converted files are written to.
        #[arg(short, long)]
        out_dir: PathBuf,
        /// Output format: wav, aiff or ot.
        #[arg(short, long)]
        format: Option<String>,
        /// Output sample rate in Hz.
        #[arg(short, long)]
        rate: Option<u32>,
        /// Output bit depth: 8, 16, 24 or 32.
        #[arg(short, long)]
        bits: Option<String>,
        /// Channel mode: left, right, sum, difference or stereo.
        #[arg(short, long)]
        mode: Option<String>,
    },
    /// Joins files into one sliced sample chain.
    Chain {
        /// The files to join, in order.
        files: Vec<PathBuf>,
        /// The output file.
        #[arg(short, long)]
        out: PathBuf,
        /// Pad every part to the longest part's length.
        #[arg(short, long)]
        even: bool,
    },
    /// Estimates the tempo of each file.
    Tempo {
        /// The files to analyze.
        files: Vec<PathBuf>,
    },
    /// Prints the effective settings, or writes them to a file.
    Settings {
        /// Where to write the settings.
        #[arg(short, long)]
        write: Option<PathBuf>,
    },
}

/// Imports `files`, printing failures, and returns the decoded samples.
fn import_all(settings: &Settings, files: &[PathBuf]) -> Vec<(PathBuf, Decoded)> {
    let mut importer = Importer::new(settings.decode_options());
    let mut decoded = Vec::new();
    for (path, result) in importer.import_paths(files) {
        match result {
            Ok(ImportOutcome::Sample(sample)) => decoded.push((path, *sample)),
            Ok(ImportOutcome::Sidecar { .. }) => {}
            Ok(ImportOutcome::Failed(failure)) => {
                println!("{}: skipped ({})", failure.id, failure.message)
            }
            Err(e) => error!(file = %path.display(), err = %e, "Unable to read file"),
        }
    }
    for stem in importer.pending_sidecars() {
        println!("{}.ot: no matching sample", stem);
    }
    decoded
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "sample".to_string())
}

/// Encodes one sample and writes it, plus its `.ot` file when configured.
fn write_export(
    settings: &Settings,
    decoded: &Decoded,
    out: &Path,
) -> Result<(), Box<dyn Error>> {
    let mut options = settings.to_encode_options(&file_stem(out));
    options.dual_mono = decoded.metadata.dual_mono;
    let bytes = export::encode(&decoded.sample, decoded.slices.as_deref(), &options)?;
    fs::write(out, bytes)?;
    println!("Wrote {}", out.display());

    if settings.write_ot_sidecar && options.format == ExportFormat::Wav {
        let ot = export::encode_ot_sidecar(
            &decoded.sample,
            decoded.slices.as_deref(),
            &settings.ot_settings(),
        )?;
        let ot_path = out.with_extension("ot");
        fs::write(&ot_path, ot)?;
        println!("Wrote {}", ot_path.display());
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut settings = Settings::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Inspect { files } => {
            for (path, decoded) in import_all(&settings, &files) {
                let sample = &decoded.sample;
                println!(
                    "{}: {:?}, {} Hz / {} bit source, {} channel(s), {}",
                    filename_display(&path),
                    decoded.kind,
                    sample.source_sample_rate(),
                    sample.source_bit_depth(),
                    sample.channel_count(),
                    duration_minutes_seconds(sample.duration()),
                );
                match &decoded.slices {
                    Some(slices) => {
                        println!(
                            "  Slices ({}, from {:?}):",
                            slices.len(),
                            decoded.metadata.slice_source
                        );
                        for (i, slice) in slices.iter().enumerate() {
                            println!(
                                "  {:>3}: {:>9} - {:>9} {}",
                                i + 1,
                                slice.start,
                                slice.end,
                                slice.name.as_deref().unwrap_or("")
                            );
                        }
                    }
                    None => println!("  No slices"),
                }
            }
        }
        Commands::Convert {
            files,
            out_dir,
            format,
            rate,
            bits,
            mode,
        } => {
            if let Some(format) = format {
                settings.export_format = ExportFormat::from_str(&format)?;
            }
            if let Some(rate) = rate {
                settings.target_sample_rate = rate;
            }
            if let Some(bits) = bits {
                settings.bit_depth = BitDepth::from_str(&bits)?;
            }
            if let Some(mode) = mode {
                settings.channel_mode = ChannelMode::from_str(&mode)?;
            }
            settings.validate()?;
            fs::create_dir_all(&out_dir)?;

            let extension = settings.export_format.extension();
            for (path, decoded) in import_all(&settings, &files) {
                let out = out_dir.join(format!("{}.{}", file_stem(&path), extension));
                if let Err(e) = write_export(&settings, &decoded, &out) {
                    error!(file = %path.display(), err = %e, "Unable to convert file");
                }
            }
        }
        Commands::Chain { files, out, even } => {
            let decoded = import_all(&settings, &files);
            let names: Vec<String> = decoded.iter().map(|(path, _)| file_stem(path)).collect();
            let parts: Vec<ChainPart> = decoded
                .iter()
                .zip(names.iter())
                .map(|((_, d), name)| ChainPart {
                    name,
                    sample: &d.sample,
                })
                .collect();
            let options = ChainOptions {
                even_spacing: even,
                quality: settings.resample_quality,
            };
            let (sample, slices) = build_chain(&parts, &options)?;
            info!(parts = parts.len(), "Chained samples");

            let metadata = Metadata {
                dual_mono: is_dual_mono(&sample),
                ..Metadata::default()
            };
            let chained = Decoded {
                kind: ContainerKind::Wav,
                sample,
                slices: Some(slices),
                metadata,
            };
            write_export(&settings, &chained, &out)?;
        }
        Commands::Tempo { files } => {
            for (path, decoded) in import_all(&settings, &files) {
                let name = filename_display(&path);
                match detect_tempo(&decoded.sample, Some(name)) {
                    Some(estimate) if estimate.from_file_name => {
                        println!("{}: {} BPM (file name)", name, estimate.bpm)
                    }
                    Some(estimate) => {
                        let alternatives: Vec<String> = estimate
                            .alternatives
                            .iter()
                            .map(|c| format!("{} ({} votes)", c.bpm, c.votes))
                            .collect();
                        println!(
                            "{}: {} BPM, candidates {}",
                            name,
                            estimate.bpm,
                            alternatives.join(", ")
                        );
                    }
                    None => println!("{}: no tempo found", name),
                }
            }
        }
        Commands::Settings { write } => match write {
            Some(path) => {
                settings.save(&path)?;
                println!("Wrote {}", path.display());
            }
            None => print!("{}", serde_yml::to_string(&settings)?),
        },
    }

    Ok(())
}
