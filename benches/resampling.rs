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
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use slicekit::audio::{ResampleQuality, Sample};
use slicekit::export::{self, EncodeOptions, ExportFormat};
use slicekit::slices::even_slices;

fn generate_test_audio(duration_seconds: f32, sample_rate: u32) -> Vec<f32> {
    let num_samples = (duration_seconds * sample_rate as f32) as usize;
    (0..num_samples)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            0.3 * (2.0 * std::f32::consts::PI * 440.0 * t).sin()
                + 0.2 * (2.0 * std::f32::consts::PI * 880.0 * t).sin()
                + 0.1 * (2.0 * std::f32::consts::PI * 1320.0 * t).sin()
        })
        .collect()
}

fn benchmark_resampling(c: &mut Criterion) {
    let mut group = c.benchmark_group("resampling");

    let test_cases = vec![
        ("fast_44.1kHz_to_48kHz", 44100, 48000, ResampleQuality::Fast),
        ("fast_48kHz_to_44.1kHz", 48000, 44100, ResampleQuality::Fast),
        ("fast_96kHz_to_48kHz", 96000, 48000, ResampleQuality::Fast),
        ("sinc_44.1kHz_to_48kHz", 44100, 48000, ResampleQuality::Sinc),
        ("sinc_48kHz_to_44.1kHz", 48000, 44100, ResampleQuality::Sinc),
    ];

    for (name, source_rate, target_rate, quality) in test_cases {
        let left = generate_test_audio(1.0, source_rate);
        let sample = Sample::new(vec![left.clone(), left], source_rate).unwrap();

        group.bench_function(name, |b| {
            b.iter(|| black_box(sample.resampled(black_box(target_rate), quality)))
        });
    }

    group.finish();
}

fn benchmark_export(c: &mut Criterion) {
    let mut group = c.benchmark_group("export");

    let data = generate_test_audio(2.0, 48000);
    let sample = Sample::new(vec![data.clone(), data], 48000).unwrap();
    let slices = even_slices(sample.len(), 16);

    for format in [ExportFormat::Wav, ExportFormat::Aiff, ExportFormat::Ot] {
        let options = EncodeOptions {
            format,
            ..Default::default()
        };
        group.bench_function(BenchmarkId::new("format", format.as_str()), |b| {
            b.iter(|| black_box(export::encode(&sample, Some(&slices), black_box(&options))))
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_resampling, benchmark_export);
criterion_main!(benches);
