//! Short-time Fourier transform and phase vocoder
//!
//! Frames are centered (the signal is zero padded by `n_fft / 2` on both
//! sides) and windowed with a periodic Hann window. Spectrograms are stored
//! as `(bins, frames)` with `bins = n_fft / 2 + 1`.

use ndarray::{s, Array1, Array2, Axis};
use rustfft::num_complex::Complex32;
use rustfft::FftPlanner;
use std::f32::consts::PI;

pub struct Stft {
    n_fft: usize,
    hop_length: usize,
    window: Vec<f32>,
}

impl Stft {
    pub fn new(n_fft: usize, hop_length: usize) -> Self {
        let window = (0..n_fft)
            .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f32 / n_fft as f32).cos())
            .collect();
        Self { n_fft, hop_length, window }
    }

    pub fn bins(&self) -> usize {
        self.n_fft / 2 + 1
    }

    /// Complex spectrogram of a mono signal
    pub fn forward(&self, signal: &[f32]) -> Array2<Complex32> {
        let pad = self.n_fft / 2;
        let mut padded = vec![0.0f32; signal.len() + 2 * pad];
        padded[pad..pad + signal.len()].copy_from_slice(signal);

        let frames = 1 + (padded.len() - self.n_fft) / self.hop_length;
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(self.n_fft);

        let mut spectrogram = Array2::zeros((self.bins(), frames));
        let mut buffer = vec![Complex32::new(0.0, 0.0); self.n_fft];
        for t in 0..frames {
            let start = t * self.hop_length;
            for (i, slot) in buffer.iter_mut().enumerate() {
                *slot = Complex32::new(padded[start + i] * self.window[i], 0.0);
            }
            fft.process(&mut buffer);
            for k in 0..self.bins() {
                spectrogram[[k, t]] = buffer[k];
            }
        }
        spectrogram
    }

    /// Overlap-add inverse; `length` trims or zero pads the output
    pub fn inverse(&self, spectrogram: &Array2<Complex32>, length: Option<usize>) -> Vec<f32> {
        let frames = spectrogram.ncols();
        let pad = self.n_fft / 2;
        if frames == 0 {
            return vec![0.0; length.unwrap_or(0)];
        }

        let total = self.n_fft + self.hop_length * (frames - 1);
        let mut output = vec![0.0f32; total];
        let mut window_sum = vec![0.0f32; total];

        let mut planner = FftPlanner::<f32>::new();
        let ifft = planner.plan_fft_inverse(self.n_fft);
        let mut buffer = vec![Complex32::new(0.0, 0.0); self.n_fft];
        let bins = self.bins().min(spectrogram.nrows());

        for t in 0..frames {
            buffer.iter_mut().for_each(|c| *c = Complex32::new(0.0, 0.0));
            for k in 0..bins {
                let value = spectrogram[[k, t]];
                buffer[k] = value;
                // Hermitian mirror so the inverse is real
                if k > 0 && k < self.n_fft - k {
                    buffer[self.n_fft - k] = value.conj();
                }
            }
            ifft.process(&mut buffer);

            let start = t * self.hop_length;
            for i in 0..self.n_fft {
                let w = self.window[i];
                output[start + i] += buffer[i].re / self.n_fft as f32 * w;
                window_sum[start + i] += w * w;
            }
        }

        for (sample, norm) in output.iter_mut().zip(&window_sum) {
            if *norm > 1e-8 {
                *sample /= norm;
            }
        }

        let end = match length {
            Some(len) => pad + len,
            None => total.saturating_sub(pad),
        };
        let mut trimmed: Vec<f32> = output.into_iter().skip(pad).take(end.saturating_sub(pad)).collect();
        if let Some(len) = length {
            trimmed.resize(len, 0.0);
        }
        trimmed
    }

    /// Time-scale a spectrogram by `rate` (> 1 is faster / shorter)
    pub fn phase_vocoder(&self, spectrogram: &Array2<Complex32>, rate: f32) -> Array2<Complex32> {
        let (bins, frames) = spectrogram.dim();
        if frames == 0 {
            return spectrogram.clone();
        }

        let steps: Vec<f32> = (0..)
            .map(|i| i as f32 * rate)
            .take_while(|&step| step < frames as f32)
            .collect();

        let phase_advance: Array1<f32> =
            Array1::from_shape_fn(bins, |k| PI * self.hop_length as f32 * k as f32 / (bins - 1).max(1) as f32);

        // Two trailing zero frames let every step read a pair of columns
        let mut padded = Array2::<Complex32>::zeros((bins, frames + 2));
        padded.slice_mut(s![.., ..frames]).assign(spectrogram);

        let mut phase: Array1<f32> = spectrogram.column(0).mapv(|c| c.arg());
        let mut stretched = Array2::<Complex32>::zeros((bins, steps.len()));

        for (t, &step) in steps.iter().enumerate() {
            let idx = step.floor() as usize;
            let alpha = step - idx as f32;
            let left = padded.column(idx);
            let right = padded.column(idx + 1);

            for k in 0..bins {
                let magnitude = (1.0 - alpha) * left[k].norm() + alpha * right[k].norm();
                stretched[[k, t]] = Complex32::from_polar(magnitude, phase[k]);

                let mut delta = right[k].arg() - left[k].arg() - phase_advance[k];
                delta -= 2.0 * PI * (delta / (2.0 * PI)).round();
                phase[k] += phase_advance[k] + delta;
            }
        }
        stretched
    }
}

/// Mean magnitude per bin over the first `frames` frames
pub fn noise_profile(magnitudes: &Array2<f32>, frames: usize) -> Array1<f32> {
    let frames = frames.min(magnitudes.ncols());
    if frames == 0 {
        return Array1::zeros(magnitudes.nrows());
    }
    magnitudes
        .slice(s![.., ..frames])
        .mean_axis(Axis(1))
        .unwrap_or_else(|| Array1::zeros(magnitudes.nrows()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, sample_rate: f32, len: usize) -> Vec<f32> {
        (0..len).map(|i| 0.5 * (2.0 * PI * freq * i as f32 / sample_rate).sin()).collect()
    }

    #[test]
    fn test_stft_shape() {
        let stft = Stft::new(2048, 512);
        let spec = stft.forward(&vec![0.0; 22050]);
        assert_eq!(spec.dim(), (1025, 1 + 22050 / 512));
    }

    #[test]
    fn test_inverse_reconstructs_signal() {
        let stft = Stft::new(512, 128);
        let signal = sine(440.0, 8000.0, 4000);
        let restored = stft.inverse(&stft.forward(&signal), Some(signal.len()));

        assert_eq!(restored.len(), signal.len());
        let max_err = signal
            .iter()
            .zip(&restored)
            .map(|(a, b)| (a - b).abs())
            .fold(0.0f32, f32::max);
        assert!(max_err < 1e-3, "max reconstruction error {}", max_err);
    }

    #[test]
    fn test_phase_vocoder_frame_count() {
        let stft = Stft::new(512, 128);
        let spec = stft.forward(&sine(440.0, 8000.0, 8000));
        let frames = spec.ncols();

        let faster = stft.phase_vocoder(&spec, 2.0);
        assert_eq!(faster.ncols(), (frames + 1) / 2);
        let slower = stft.phase_vocoder(&spec, 0.5);
        assert_eq!(slower.ncols(), frames * 2);
    }

    #[test]
    fn test_noise_profile_handles_short_input() {
        let mags = Array2::from_elem((3, 2), 2.0f32);
        assert_eq!(noise_profile(&mags, 10).to_vec(), vec![2.0, 2.0, 2.0]);
        assert_eq!(noise_profile(&Array2::zeros((3, 0)), 10).len(), 3);
    }
}
