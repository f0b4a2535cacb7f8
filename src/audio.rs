//! Audio preprocessing and augmentation via FFmpeg and Rust DSP
//!
//! WAV is decoded in-process with `hound`; MP3 (and anything else FFmpeg
//! understands) is first converted to WAV by the system `ffmpeg` binary.
//! Clips are mixed down to mono at their native sample rate. Results are
//! 16-bit PCM WAV, base64 encoded.

use crate::error::{MediaError, Result};
use crate::ffmpeg;
use crate::modality::Modality;
use crate::pipeline::{encode_base64, Pipeline};
use crate::spectral::{noise_profile, Stft};
use crate::technique::{techniques, TechniqueReport};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use rustfft::num_complex::Complex32;
use std::io::Cursor;
use std::path::Path;
use tracing::debug;

techniques! {
    pub enum AudioPreprocess for Modality::Audio {
        Normalize => "normalize",
        NoiseReduction => "noise_reduction",
        TrimSilence => "trim_silence",
    }
}

techniques! {
    pub enum AudioAugment for Modality::Audio {
        PitchShift => "pitch_shift",
        TimeStretch => "time_stretch",
        Reverse => "reverse",
    }
}

#[derive(Debug, Clone)]
pub struct AudioConfig {
    pub preview_seconds: u32,
    pub n_fft: usize,
    pub hop_length: usize,
    /// Leading frames averaged into the noise profile
    pub noise_frames: usize,
    /// Frames quieter than this many dB below the peak count as silence
    pub top_db: f32,
    pub pitch_semitones: f32,
    pub stretch_rate: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            preview_seconds: 10,
            n_fft: 2048,
            hop_length: 512,
            noise_frames: 10,
            top_db: 20.0,
            pitch_semitones: 2.0,
            stretch_rate: 1.2,
        }
    }
}

/// Mono clip with samples in [-1, 1]
#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioClip {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self { samples, sample_rate }
    }

    pub fn duration_secs(&self) -> f32 {
        self.samples.len() as f32 / self.sample_rate as f32
    }

    /// Decode WAV bytes, averaging channels down to mono
    pub fn from_wav_bytes(bytes: &[u8]) -> std::result::Result<Self, hound::Error> {
        let mut reader = WavReader::new(Cursor::new(bytes))?;
        let spec = reader.spec();
        let channels = spec.channels.max(1) as usize;

        let interleaved: Vec<f32> = match spec.sample_format {
            SampleFormat::Float => reader.samples::<f32>().collect::<std::result::Result<_, _>>()?,
            SampleFormat::Int => {
                let scale = (1i64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<std::result::Result<_, _>>()?
            }
        };

        let samples = interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect();

        Ok(Self::new(samples, spec.sample_rate))
    }

    /// Encode as mono 16-bit PCM WAV
    pub fn to_wav_bytes(&self) -> std::result::Result<Vec<u8>, hound::Error> {
        let spec = WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };

        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(&mut cursor, spec)?;
            for &sample in &self.samples {
                // Same 2^15 scale as decoding so 16-bit input round-trips exactly
                let value = (sample * 32768.0).round().clamp(i16::MIN as f32, i16::MAX as f32);
                writer.write_sample(value as i16)?;
            }
            writer.finalize()?;
        }
        Ok(cursor.into_inner())
    }

    fn with_samples(&self, samples: Vec<f32>) -> Self {
        Self::new(samples, self.sample_rate)
    }
}

pub struct AudioPipeline {
    config: AudioConfig,
}

impl AudioPipeline {
    pub fn new(config: AudioConfig) -> Self {
        Self { config }
    }

    fn stft(&self) -> Stft {
        Stft::new(self.config.n_fft, self.config.hop_length)
    }

    /// Load WAV directly, anything else through FFmpeg
    pub fn load(&self, path: &Path) -> Result<AudioClip> {
        let bytes = std::fs::read(path).map_err(|e| MediaError::load(path, e))?;

        let sniffed = infer::get(&bytes).map(|kind| kind.extension());
        let declared = path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase);
        let is_wav = match sniffed {
            Some(ext) => ext == "wav",
            None => declared.as_deref() == Some("wav"),
        };

        if is_wav {
            return AudioClip::from_wav_bytes(&bytes).map_err(|e| MediaError::load(path, e));
        }

        debug!(path = %path.display(), format = ?sniffed.or(declared.as_deref()), "decoding audio via ffmpeg");
        let decoded = tempfile::Builder::new().suffix(".wav").tempfile()?;
        ffmpeg::decode_to_wav(path, decoded.path())?;
        let wav = std::fs::read(decoded.path())?;
        AudioClip::from_wav_bytes(&wav).map_err(|e| MediaError::load(path, e))
    }

    /// Scale so the loudest sample reaches full scale
    pub fn normalize(&self, clip: &AudioClip) -> AudioClip {
        let peak = clip.samples.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        if peak <= f32::EPSILON {
            return clip.clone();
        }
        clip.with_samples(clip.samples.iter().map(|s| s / peak).collect())
    }

    /// Spectral subtraction using the leading frames as the noise estimate
    pub fn reduce_noise(&self, clip: &AudioClip) -> AudioClip {
        let stft = self.stft();
        let spectrogram = stft.forward(&clip.samples);
        let magnitudes = spectrogram.mapv(|c| c.norm());
        let noise = noise_profile(&magnitudes, self.config.noise_frames);

        let mut cleaned = spectrogram.clone();
        for ((k, _), value) in cleaned.indexed_iter_mut() {
            let magnitude = (value.norm() - noise[k]).max(0.0);
            *value = Complex32::from_polar(magnitude, value.arg());
        }

        clip.with_samples(stft.inverse(&cleaned, Some(clip.samples.len())))
    }

    /// Strip leading and trailing frames more than `top_db` below the peak
    pub fn trim_silence(&self, clip: &AudioClip) -> AudioClip {
        let frame_length = self.config.n_fft;
        let hop = self.config.hop_length;
        let len = clip.samples.len();
        if len == 0 {
            return clip.clone();
        }

        let pad = frame_length / 2;
        let mut padded = vec![0.0f32; len + 2 * pad];
        padded[pad..pad + len].copy_from_slice(&clip.samples);

        let frames = 1 + (padded.len() - frame_length) / hop;
        let power: Vec<f32> = (0..frames)
            .map(|t| {
                let frame = &padded[t * hop..t * hop + frame_length];
                frame.iter().map(|s| s * s).sum::<f32>() / frame_length as f32
            })
            .collect();

        const AMIN: f32 = 1e-10;
        let reference = power.iter().cloned().fold(AMIN, f32::max);
        let threshold = -self.config.top_db;
        let loud: Vec<bool> = power
            .iter()
            .map(|&p| 10.0 * p.max(AMIN).log10() - 10.0 * reference.log10() > threshold)
            .collect();

        let (Some(first), Some(last)) = (loud.iter().position(|&l| l), loud.iter().rposition(|&l| l)) else {
            return clip.with_samples(Vec::new());
        };

        let start = (first * hop).min(len);
        let end = ((last + 1) * hop).min(len);
        clip.with_samples(clip.samples[start..end.max(start)].to_vec())
    }

    /// Phase-vocoder time stretch; output length is `len / rate`
    pub fn time_stretch(&self, clip: &AudioClip, rate: f32) -> Result<AudioClip> {
        if !(rate.is_finite() && rate > 0.0) {
            return Err(MediaError::technique(AudioAugment::TimeStretch, format!("invalid rate {}", rate)));
        }
        let stft = self.stft();
        let stretched = stft.phase_vocoder(&stft.forward(&clip.samples), rate);
        let length = (clip.samples.len() as f32 / rate).round() as usize;
        Ok(clip.with_samples(stft.inverse(&stretched, Some(length))))
    }

    /// Time stretch by 2^(-n/12), then resample back to the original length
    pub fn pitch_shift(&self, clip: &AudioClip, semitones: f32) -> Result<AudioClip> {
        let rate = 2f32.powf(-semitones / 12.0);
        let stretched = self.time_stretch(clip, rate)?;
        Ok(clip.with_samples(resample_linear(&stretched.samples, clip.samples.len())))
    }
}

impl Pipeline for AudioPipeline {
    type Process = AudioPreprocess;
    type Augment = AudioAugment;

    const MODALITY: Modality = Modality::Audio;

    fn preview(&self, path: &Path) -> Result<String> {
        let clip = self.load(path)?;
        let limit = clip.sample_rate as usize * self.config.preview_seconds as usize;
        let preview = clip.with_samples(clip.samples.iter().take(limit).copied().collect());
        encode_clip(&preview, "preview")
    }

    fn process(&self, path: &Path, techniques: &[AudioPreprocess]) -> Result<TechniqueReport> {
        let clip = self.load(path)?;
        debug!(samples = clip.samples.len(), sample_rate = clip.sample_rate, "audio loaded");

        Ok(TechniqueReport::collect(techniques, |technique| {
            let processed = match technique {
                AudioPreprocess::Normalize => self.normalize(&clip),
                AudioPreprocess::NoiseReduction => self.reduce_noise(&clip),
                AudioPreprocess::TrimSilence => self.trim_silence(&clip),
            };
            encode_clip(&processed, technique)
        }))
    }

    fn augment(&self, path: &Path, techniques: &[AudioAugment]) -> Result<TechniqueReport> {
        let clip = self.load(path)?;

        Ok(TechniqueReport::collect(techniques, |technique| {
            let processed = match technique {
                AudioAugment::PitchShift => self.pitch_shift(&clip, self.config.pitch_semitones)?,
                AudioAugment::TimeStretch => self.time_stretch(&clip, self.config.stretch_rate)?,
                AudioAugment::Reverse => clip.with_samples(clip.samples.iter().rev().copied().collect()),
            };
            encode_clip(&processed, technique)
        }))
    }
}

fn encode_clip(clip: &AudioClip, technique: impl ToString) -> Result<String> {
    let wav = clip.to_wav_bytes().map_err(|e| MediaError::technique(technique, e))?;
    Ok(encode_base64(&wav))
}

/// Linear interpolation onto `target_len` evenly spaced points
fn resample_linear(samples: &[f32], target_len: usize) -> Vec<f32> {
    match (samples.len(), target_len) {
        (_, 0) => Vec::new(),
        (0, n) => vec![0.0; n],
        (1, n) => vec![samples[0]; n],
        (len, n) => {
            let step = (len - 1) as f64 / (n.max(2) - 1) as f64;
            (0..n)
                .map(|i| {
                    let pos = i as f64 * step;
                    let idx = (pos.floor() as usize).min(len - 2);
                    let frac = (pos - idx as f64) as f32;
                    samples[idx] * (1.0 - frac) + samples[idx + 1] * frac
                })
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::decode_base64;
    use std::f32::consts::PI;
    use tempfile::NamedTempFile;

    const SR: u32 = 22050;

    fn wav_file(samples: &[i16], channels: u16) -> NamedTempFile {
        let file = tempfile::Builder::new().suffix(".wav").tempfile().unwrap();
        let spec = WavSpec { channels, sample_rate: SR, bits_per_sample: 16, sample_format: SampleFormat::Int };
        let mut writer = WavWriter::create(file.path(), spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
        file
    }

    fn sine(len: usize, amplitude: f32) -> Vec<i16> {
        (0..len)
            .map(|i| (amplitude * (2.0 * PI * 440.0 * i as f32 / SR as f32).sin() * 32767.0) as i16)
            .collect()
    }

    fn decode_i16(payload: &str) -> (Vec<i16>, u32) {
        let bytes = decode_base64(payload).unwrap();
        let mut reader = WavReader::new(Cursor::new(bytes)).unwrap();
        let rate = reader.spec().sample_rate;
        (reader.samples::<i16>().map(|s| s.unwrap()).collect(), rate)
    }

    fn rms(samples: &[f32]) -> f32 {
        (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
    }

    #[test]
    fn test_reverse_is_exact() {
        let samples: Vec<i16> = vec![0, 1, -1, 32767, -32768, 1234, -4321, 7];
        let file = wav_file(&samples, 1);

        let report = AudioPipeline::new(AudioConfig::default())
            .augment(file.path(), &[AudioAugment::Reverse])
            .unwrap();
        let (reversed, rate) = decode_i16(report.output("reverse").unwrap());

        let mut expected = samples.clone();
        expected.reverse();
        assert_eq!(reversed, expected);
        assert_eq!(rate, SR);
    }

    #[test]
    fn test_stereo_is_mixed_to_mono() {
        let file = wav_file(&[1000, 3000, -2000, -4000], 2);
        let clip = AudioPipeline::new(AudioConfig::default()).load(file.path()).unwrap();
        assert_eq!(clip.samples, vec![2000.0 / 32768.0, -3000.0 / 32768.0]);
    }

    #[test]
    fn test_preview_is_capped_at_ten_seconds() {
        let file = wav_file(&vec![100i16; SR as usize * 12], 1);
        let pipeline = AudioPipeline::new(AudioConfig::default());
        let (preview, _) = decode_i16(&pipeline.preview(file.path()).unwrap());
        assert_eq!(preview.len(), SR as usize * 10);

        let short = wav_file(&vec![100i16; 500], 1);
        let (preview, _) = decode_i16(&pipeline.preview(short.path()).unwrap());
        assert_eq!(preview.len(), 500);
    }

    #[test]
    fn test_normalize_reaches_full_scale() {
        let file = wav_file(&sine(4096, 0.25), 1);
        let report = AudioPipeline::new(AudioConfig::default())
            .process(file.path(), &[AudioPreprocess::Normalize])
            .unwrap();
        let (samples, _) = decode_i16(report.output("normalize").unwrap());
        let peak = samples.iter().map(|s| (*s as i32).abs()).max().unwrap();
        assert!(peak >= 32767, "peak {}", peak);
    }

    #[test]
    fn test_trim_silence_drops_quiet_edges() {
        let mut samples = vec![0i16; SR as usize];
        samples.extend(sine(SR as usize, 0.5));
        samples.extend(vec![0i16; SR as usize]);
        let file = wav_file(&samples, 1);

        let report = AudioPipeline::new(AudioConfig::default())
            .process(file.path(), &[AudioPreprocess::TrimSilence])
            .unwrap();
        let (trimmed, _) = decode_i16(report.output("trim_silence").unwrap());

        assert!(trimmed.len() < samples.len() / 2, "kept {} of {}", trimmed.len(), samples.len());
        assert!(trimmed.len() >= SR as usize);
    }

    #[test]
    fn test_noise_reduction_suppresses_stationary_tone() {
        let pipeline = AudioPipeline::new(AudioConfig::default());
        let clip = AudioClip::new(
            sine(SR as usize, 0.5).iter().map(|&s| s as f32 / 32768.0).collect(),
            SR,
        );
        let cleaned = pipeline.reduce_noise(&clip);

        assert_eq!(cleaned.samples.len(), clip.samples.len());
        assert!(cleaned.samples.iter().all(|s| s.is_finite()));
        assert!(rms(&cleaned.samples) < 0.3 * rms(&clip.samples));
    }

    #[test]
    fn test_stretch_and_pitch_lengths() {
        let file = wav_file(&sine(SR as usize, 0.5), 1);
        let report = AudioPipeline::new(AudioConfig::default())
            .augment(file.path(), &[AudioAugment::TimeStretch, AudioAugment::PitchShift])
            .unwrap();

        let (stretched, _) = decode_i16(report.output("time_stretch").unwrap());
        assert_eq!(stretched.len(), (SR as f32 / 1.2).round() as usize);

        let (shifted, _) = decode_i16(report.output("pitch_shift").unwrap());
        assert_eq!(shifted.len(), SR as usize);
    }

    #[test]
    fn test_resample_linear_endpoints() {
        let out = resample_linear(&[0.0, 1.0, 2.0], 5);
        assert_eq!(out, vec![0.0, 0.5, 1.0, 1.5, 2.0]);
        assert!(resample_linear(&[], 3).iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_garbage_wav_is_load_error() {
        let file = tempfile::Builder::new().suffix(".wav").tempfile().unwrap();
        std::fs::write(file.path(), b"RIFF\x00\x00").unwrap();
        let err = AudioPipeline::new(AudioConfig::default()).process(file.path(), &[AudioPreprocess::Normalize]);
        assert!(matches!(err, Err(MediaError::Load { .. })));
    }
}
