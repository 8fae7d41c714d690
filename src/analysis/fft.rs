//! Windowed spectrum of a probe waveform, with THD and SNR.
//!
//! The transform is an iterative radix-2 FFT over buffers owned by an
//! [`FftWorkspace`]. Each caller keeps its own workspace, so two analyses
//! never share scratch memory.
//!
//! THD and SNR come from a least-squares sine fit rather than from bins.
//! The fundamental is located at the peak bin, its frequency is refined by
//! minimizing the fit residual, and the fitted tone is subtracted. Harmonic
//! amplitudes are fitted on the residual at multiples of the refined
//! frequency, and everything left in the residual counts as noise. This
//! keeps both figures independent of the window and of where the tone
//! falls between bins.

use std::f64::consts::PI;

use num_complex::Complex64;

use crate::solver::linalg::{self, DenseMatrix};

/// Largest supported transform length.
pub const MAX_FFT_SIZE: usize = 8192;

/// Default transform length.
pub const DEFAULT_FFT_SIZE: usize = 4096;

/// Highest harmonic included in THD.
pub const MAX_HARMONIC: usize = 10;

/// SNR reported when the noise power is negligible.
pub const SNR_CEILING_DB: f64 = 120.0;

/// Floor for magnitudes in dB.
pub const MIN_DB: f64 = -200.0;

/// Half-width of the tone frequency search around the peak bin, in bins.
const FIT_SEARCH_BINS: f64 = 0.75;

/// Golden-section iterations when refining the tone frequency.
const FIT_ITERATIONS: usize = 96;

/// Fitted amplitude below this fraction of the sample peak is no tone.
const MIN_TONE_FRACTION: f64 = 1e-9;

/// Window applied to the samples before the transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WindowFunction {
    Rectangular,
    #[default]
    Hanning,
    Hamming,
    Blackman,
}

impl WindowFunction {
    /// Parse window name.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "rect" | "rectangular" | "none" => Some(Self::Rectangular),
            "hann" | "hanning" => Some(Self::Hanning),
            "hamming" => Some(Self::Hamming),
            "blackman" => Some(Self::Blackman),
            _ => None,
        }
    }

    /// Coefficient for sample `i` of a span of `len` samples.
    pub fn coefficient(self, i: usize, len: usize) -> f64 {
        if len < 2 {
            return 1.0;
        }
        let x = 2.0 * PI * i as f64 / (len - 1) as f64;
        match self {
            WindowFunction::Rectangular => 1.0,
            WindowFunction::Hanning => 0.5 - 0.5 * x.cos(),
            WindowFunction::Hamming => 0.54 - 0.46 * x.cos(),
            WindowFunction::Blackman => 0.42 - 0.5 * x.cos() + 0.08 * (2.0 * x).cos(),
        }
    }
}

/// Spectrum of one waveform.
#[derive(Debug, Clone, Default)]
pub struct FftResult {
    /// Bin centre frequencies, `k·fs/N` for `k < N/2`
    pub frequencies: Vec<f64>,
    pub magnitude_db: Vec<f64>,
    pub phase_deg: Vec<f64>,
    pub sample_rate: f64,
    /// Transform length
    pub size: usize,
    pub fundamental_bin: usize,
    pub fundamental_frequency: f64,
    pub fundamental_db: f64,
    /// Total harmonic distortion in percent
    pub thd_percent: f64,
    pub snr_db: f64,
}

impl FftResult {
    /// Number of bins up to Nyquist.
    pub fn bins(&self) -> usize {
        self.frequencies.len()
    }
}

/// Transform length, twiddle table and scratch buffer.
#[derive(Debug, Clone)]
pub struct FftWorkspace {
    size: usize,
    twiddles: Vec<Complex64>,
    bit_reverse: Vec<usize>,
    buffer: Vec<Complex64>,
    magnitude: Vec<f64>,
}

impl Default for FftWorkspace {
    fn default() -> Self {
        Self::new(DEFAULT_FFT_SIZE)
    }
}

impl FftWorkspace {
    /// Create a workspace; the length is rounded up to a power of two and
    /// clamped to `2..=MAX_FFT_SIZE`.
    pub fn new(size: usize) -> Self {
        let size = size.clamp(2, MAX_FFT_SIZE).next_power_of_two().min(MAX_FFT_SIZE);
        let bits = size.trailing_zeros();
        let twiddles = (0..size / 2)
            .map(|k| Complex64::from_polar(1.0, -2.0 * PI * k as f64 / size as f64))
            .collect();
        let bit_reverse = (0..size)
            .map(|i| i.reverse_bits() >> (usize::BITS - bits))
            .collect();
        Self {
            size,
            twiddles,
            bit_reverse,
            buffer: vec![Complex64::new(0.0, 0.0); size],
            magnitude: vec![0.0; size / 2],
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Window, zero-pad and transform `samples` into the scratch buffer.
    fn transform(&mut self, samples: &[f64], window: WindowFunction) {
        let n = self.size;
        let used = samples.len().min(n);
        for (i, slot) in self.buffer.iter_mut().enumerate() {
            *slot = if i < used {
                Complex64::new(samples[i] * window.coefficient(i, used), 0.0)
            } else {
                Complex64::new(0.0, 0.0)
            };
        }

        for i in 0..n {
            let j = self.bit_reverse[i];
            if i < j {
                self.buffer.swap(i, j);
            }
        }

        let mut len = 2;
        while len <= n {
            let half = len / 2;
            let stride = n / len;
            for start in (0..n).step_by(len) {
                for k in 0..half {
                    let w = self.twiddles[k * stride];
                    let u = self.buffer[start + k];
                    let v = self.buffer[start + k + half] * w;
                    self.buffer[start + k] = u + v;
                    self.buffer[start + k + half] = u - v;
                }
            }
            len <<= 1;
        }
    }

    /// Spectrum of evenly spaced samples taken at `sample_rate`.
    pub fn analyze(&mut self, samples: &[f64], sample_rate: f64, window: WindowFunction) -> FftResult {
        self.transform(samples, window);

        let n = self.size;
        let bins = n / 2;
        let scale = 1.0 / n as f64;
        let mut result = FftResult {
            frequencies: Vec::with_capacity(bins),
            magnitude_db: Vec::with_capacity(bins),
            phase_deg: Vec::with_capacity(bins),
            sample_rate,
            size: n,
            ..FftResult::default()
        };

        for k in 0..bins {
            let x = self.buffer[k];
            let mag = x.norm() * scale;
            self.magnitude[k] = mag;
            result.frequencies.push(k as f64 * sample_rate / n as f64);
            result.magnitude_db.push(to_db(mag));
            result.phase_deg.push(x.arg().to_degrees());
        }

        let fundamental = (1..bins).max_by(|&a, &b| self.magnitude[a].total_cmp(&self.magnitude[b]));
        let Some(k0) = fundamental else {
            return result;
        };
        let fund_mag = self.magnitude[k0];
        result.fundamental_bin = k0;
        result.fundamental_frequency = result.frequencies[k0];
        result.fundamental_db = result.magnitude_db[k0];
        if fund_mag <= 0.0 {
            return result;
        }

        let used = &samples[..samples.len().min(n)];
        let bin_hz = sample_rate / n as f64;
        let nyquist = 0.5 * sample_rate;
        let lo = ((k0 as f64 - FIT_SEARCH_BINS) * bin_hz).max(0.25 * bin_hz);
        let hi = ((k0 as f64 + FIT_SEARCH_BINS) * bin_hz).min(nyquist);
        let Some(tone) = ToneFit::refine(used, sample_rate, lo, hi) else {
            return result;
        };
        let peak = used.iter().fold(0.0f64, |m, v| m.max(v.abs()));
        let amplitude = tone.amplitude();
        if amplitude <= peak * MIN_TONE_FRACTION {
            return result;
        }
        let residual: Vec<f64> = used
            .iter()
            .enumerate()
            .map(|(i, &x)| x - tone.value(i))
            .collect();

        let harmonic_power: f64 = (2..=MAX_HARMONIC)
            .map(|h| h as f64 * tone.frequency)
            .take_while(|&f| f < nyquist)
            .filter_map(|f| ToneFit::solve(&residual, sample_rate, f))
            .map(|h| h.amplitude().powi(2))
            .sum();
        result.thd_percent = harmonic_power.sqrt() / amplitude * 100.0;

        let noise_power = residual.iter().map(|r| r * r).sum::<f64>() / used.len() as f64;
        let signal_power = 0.5 * amplitude * amplitude;
        result.snr_db = if noise_power <= signal_power * 1e-12 {
            SNR_CEILING_DB
        } else {
            (10.0 * (signal_power / noise_power).log10()).min(SNR_CEILING_DB)
        };

        result
    }
}

/// Least-squares fit of `a·cos(ωi) + b·sin(ωi) + c` to a sample run.
#[derive(Debug, Clone, Copy)]
struct ToneFit {
    frequency: f64,
    omega: f64,
    cos: f64,
    sin: f64,
    offset: f64,
}

impl ToneFit {
    /// Fit at a fixed frequency; `None` when the normal equations are singular.
    fn solve(samples: &[f64], sample_rate: f64, frequency: f64) -> Option<Self> {
        let omega = 2.0 * PI * frequency / sample_rate;
        let mut normal = DenseMatrix::<f64>::new(3);
        let mut rhs = [0.0; 3];
        for (i, &x) in samples.iter().enumerate() {
            let (s, c) = (omega * i as f64).sin_cos();
            let basis = [c, s, 1.0];
            for (r, &br) in basis.iter().enumerate() {
                rhs[r] += br * x;
                for (k, &bk) in basis.iter().enumerate() {
                    normal.add(r, k, br * bk);
                }
            }
        }
        let coef = linalg::solve(&normal, &rhs).ok()?;
        Some(Self {
            frequency,
            omega,
            cos: coef[0],
            sin: coef[1],
            offset: coef[2],
        })
    }

    /// Golden-section search for the frequency in `[lo, hi]` with the
    /// smallest residual.
    fn refine(samples: &[f64], sample_rate: f64, lo: f64, hi: f64) -> Option<Self> {
        if samples.len() < 3 || hi <= lo {
            return None;
        }
        let residual = |f: f64| {
            Self::solve(samples, sample_rate, f)
                .map(|fit| fit.residual_energy(samples))
                .unwrap_or(f64::INFINITY)
        };
        let ratio = 0.5 * (5f64.sqrt() - 1.0);
        let (mut a, mut b) = (lo, hi);
        let mut x1 = b - ratio * (b - a);
        let mut x2 = a + ratio * (b - a);
        let (mut e1, mut e2) = (residual(x1), residual(x2));
        for _ in 0..FIT_ITERATIONS {
            if b - a <= 4.0 * f64::EPSILON * b {
                break;
            }
            if e1 <= e2 {
                b = x2;
                x2 = x1;
                e2 = e1;
                x1 = b - ratio * (b - a);
                e1 = residual(x1);
            } else {
                a = x1;
                x1 = x2;
                e1 = e2;
                x2 = a + ratio * (b - a);
                e2 = residual(x2);
            }
        }
        let best = if e1 <= e2 { x1 } else { x2 };
        Self::solve(samples, sample_rate, best)
    }

    fn value(&self, i: usize) -> f64 {
        let (s, c) = (self.omega * i as f64).sin_cos();
        self.cos * c + self.sin * s + self.offset
    }

    fn amplitude(&self) -> f64 {
        self.cos.hypot(self.sin)
    }

    fn residual_energy(&self, samples: &[f64]) -> f64 {
        samples
            .iter()
            .enumerate()
            .map(|(i, &x)| (x - self.value(i)).powi(2))
            .sum()
    }
}

fn to_db(magnitude: f64) -> f64 {
    (20.0 * magnitude.log10()).max(MIN_DB)
}

/// Average sample rate of a `(time, value)` series.
pub fn sample_rate(samples: &[(f64, f64)]) -> Option<f64> {
    let (first, last) = (samples.first()?, samples.last()?);
    let span = last.0 - first.0;
    if samples.len() < 2 || span <= 0.0 {
        return None;
    }
    Some((samples.len() - 1) as f64 / span)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const FS: f64 = 40960.0;
    const N: usize = 4096;

    fn tone(parts: &[(f64, f64)]) -> Vec<f64> {
        (0..N)
            .map(|i| {
                let t = i as f64 / FS;
                parts.iter().map(|&(a, f)| a * (2.0 * PI * f * t).sin()).sum()
            })
            .collect()
    }

    #[test]
    fn test_size_rounding() {
        assert_eq!(FftWorkspace::new(1000).size(), 1024);
        assert_eq!(FftWorkspace::new(1 << 20).size(), MAX_FFT_SIZE);
        assert_eq!(FftWorkspace::new(0).size(), 2);
    }

    #[test]
    fn test_pure_tone_on_bin() {
        // 10 Hz per bin, 640 Hz sits exactly on bin 64
        let samples = tone(&[(1.0, 640.0)]);
        let mut ws = FftWorkspace::new(N);
        let r = ws.analyze(&samples, FS, WindowFunction::Hanning);

        assert_eq!(r.bins(), N / 2);
        assert_eq!(r.fundamental_bin, 64);
        assert_relative_eq!(r.fundamental_frequency, 640.0, epsilon = 1e-9);
        assert!(r.thd_percent < 0.01, "thd {}", r.thd_percent);
        assert_relative_eq!(r.snr_db, SNR_CEILING_DB);
    }

    #[test]
    fn test_rectangular_amplitude() {
        let samples = tone(&[(2.0, 1000.0)]);
        let mut ws = FftWorkspace::new(N);
        let r = ws.analyze(&samples, FS, WindowFunction::Rectangular);
        // A sine of amplitude A puts A/2 in its bin
        assert_relative_eq!(r.fundamental_db, 0.0, epsilon = 1e-9);
        assert_relative_eq!(r.phase_deg[100], -90.0, epsilon = 1e-6);
    }

    #[test]
    fn test_third_harmonic_thd() {
        let samples = tone(&[(1.0, 1000.0), (0.1, 3000.0)]);
        let mut ws = FftWorkspace::new(N);
        let r = ws.analyze(&samples, FS, WindowFunction::Rectangular);
        assert_relative_eq!(r.thd_percent, 10.0, epsilon = 1e-3);
        // The harmonic counts as noise, 20 dB below the fundamental
        assert_relative_eq!(r.snr_db, 20.0, epsilon = 1e-3);
    }

    #[test]
    fn test_off_bin_tone_is_clean_in_every_window() {
        // 1 kHz at 100 kHz falls between bins 40 and 41
        let fs = 1e5;
        let samples: Vec<f64> = (0..N)
            .map(|i| (2.0 * PI * 1000.0 * i as f64 / fs).sin())
            .collect();
        let mut ws = FftWorkspace::new(N);
        for window in [
            WindowFunction::Rectangular,
            WindowFunction::Hanning,
            WindowFunction::Hamming,
            WindowFunction::Blackman,
        ] {
            let r = ws.analyze(&samples, fs, window);
            assert_eq!(r.fundamental_bin, 41, "{window:?}");
            assert!(r.thd_percent < 1e-6, "{window:?} thd {}", r.thd_percent);
            assert_relative_eq!(r.snr_db, SNR_CEILING_DB);
        }
    }

    #[test]
    fn test_off_bin_noise_floor() {
        // A -40 dB tone far from the fundamental counts as noise in full
        let fs = 1e5;
        let samples: Vec<f64> = (0..N)
            .map(|i| {
                let t = i as f64 / fs;
                (2.0 * PI * 1000.0 * t).sin() + 0.01 * (2.0 * PI * 17_321.0 * t).sin()
            })
            .collect();
        let mut ws = FftWorkspace::new(N);
        let r = ws.analyze(&samples, fs, WindowFunction::Hanning);
        assert_relative_eq!(r.snr_db, 40.0, epsilon = 0.05);
        assert!(r.thd_percent < 0.01, "thd {}", r.thd_percent);
    }

    #[test]
    fn test_silence_floors_magnitude() {
        let mut ws = FftWorkspace::new(256);
        let r = ws.analyze(&[0.0; 256], 1000.0, WindowFunction::Blackman);
        assert!(r.magnitude_db.iter().all(|&db| db == MIN_DB));
        assert_eq!(r.thd_percent, 0.0);
    }

    #[test]
    fn test_short_input_is_zero_padded() {
        let mut ws = FftWorkspace::new(1024);
        let r = ws.analyze(&[1.0; 10], 1000.0, WindowFunction::Rectangular);
        assert_eq!(r.bins(), 512);
        assert_relative_eq!(r.magnitude_db[0], to_db(10.0 / 1024.0), epsilon = 1e-9);
    }

    #[test]
    fn test_sample_rate() {
        let samples: Vec<(f64, f64)> = (0..11).map(|i| (i as f64 * 1e-3, 0.0)).collect();
        assert_relative_eq!(sample_rate(&samples).unwrap(), 1000.0, epsilon = 1e-9);
        assert!(sample_rate(&samples[..1]).is_none());
    }
}
