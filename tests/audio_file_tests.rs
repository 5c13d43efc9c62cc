// Integration tests for audio file processing
//
// These tests verify that we can read WAV files and turn them into mono
// capture audio at the rate the remote agent expects.

use anyhow::Result;
use hound::{SampleFormat, WavSpec, WavWriter};
use novavoice::audio::AudioFile;
use std::path::Path;

fn write_wav(path: &Path, sample_rate: u32, channels: u16, samples: &[i16]) -> Result<()> {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec)?;
    for &s in samples {
        writer.write_sample(s)?;
    }
    writer.finalize()?;
    Ok(())
}

#[test]
fn test_audio_file_open() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("visitor.wav");
    write_wav(&path, 16000, 1, &vec![500i16; 16000])?;

    let audio = AudioFile::open(&path)?;

    assert_eq!(audio.sample_rate, 16000);
    assert_eq!(audio.channels, 1);
    assert_eq!(audio.samples.len(), 16000);
    assert!((audio.duration_seconds - 1.0).abs() < 1e-9);
    assert!(audio.path.contains("visitor.wav"));

    Ok(())
}

#[test]
fn test_stereo_file_duration_counts_frames() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("stereo.wav");
    write_wav(&path, 8000, 2, &vec![0i16; 8000 * 2])?;

    let audio = AudioFile::open(&path)?;

    assert_eq!(audio.channels, 2);
    assert!((audio.duration_seconds - 1.0).abs() < 1e-9);

    Ok(())
}

#[test]
fn test_to_mono_averages_channels() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("stereo.wav");
    // Left 1000, right 3000
    let interleaved: Vec<i16> = (0..100).flat_map(|_| [1000i16, 3000]).collect();
    write_wav(&path, 16000, 2, &interleaved)?;

    let mono = AudioFile::open(&path)?.to_mono(16000);

    assert_eq!(mono.len(), 100);
    assert!(mono.iter().all(|&s| s == 2000));

    Ok(())
}

#[test]
fn test_to_mono_resamples_to_capture_rate() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("hifi.wav");
    write_wav(&path, 48000, 1, &vec![1200i16; 48000])?;

    let mono = AudioFile::open(&path)?.to_mono(16000);

    assert!((mono.len() as i64 - 16000).abs() <= 1, "got {} samples", mono.len());
    assert!(mono.iter().all(|&s| s == 1200));

    Ok(())
}

#[test]
fn test_audio_file_missing() {
    let result = AudioFile::open("definitely/not/here.wav");
    assert!(result.is_err());
}
