//! Scope-style measurements on `(time, value)` waveforms.

/// Summary of one waveform.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WaveformMeasurements {
    /// False when fewer than two samples were available
    pub valid: bool,
    pub min: f64,
    pub max: f64,
    pub peak_to_peak: f64,
    /// Arithmetic mean of the samples
    pub mean: f64,
    pub rms: f64,
    /// Time-weighted average
    pub dc_offset: f64,
    /// Hz, 0 when fewer than two rising crossings were seen
    pub frequency: f64,
    pub period: f64,
    /// 10 % to 90 % of the first rising edge
    pub rise_time: f64,
    /// 90 % to 10 % of the first falling edge
    pub fall_time: f64,
    /// Percent of time above the mid level
    pub duty_cycle: f64,
    pub pulse_width: f64,
    /// Phase against a reference channel, degrees
    pub phase: f64,
}

impl WaveformMeasurements {
    /// Measure a waveform sampled in time order.
    pub fn measure(samples: &[(f64, f64)]) -> Self {
        if samples.len() < 2 {
            return Self::default();
        }
        let n = samples.len() as f64;

        let (min, max) = samples
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &(_, v)| (lo.min(v), hi.max(v)));
        let mean = samples.iter().map(|&(_, v)| v).sum::<f64>() / n;
        let rms = (samples.iter().map(|&(_, v)| v * v).sum::<f64>() / n).sqrt();

        let span = samples[samples.len() - 1].0 - samples[0].0;
        let dc_offset = if span > 0.0 {
            samples
                .windows(2)
                .map(|w| 0.5 * (w[0].1 + w[1].1) * (w[1].0 - w[0].0))
                .sum::<f64>()
                / span
        } else {
            mean
        };

        let crossings = rising_crossings(samples, mean);
        let frequency = match (crossings.first(), crossings.last()) {
            (Some(&first), Some(&last)) if crossings.len() >= 2 && last > first => {
                (crossings.len() - 1) as f64 / (last - first)
            }
            _ => 0.0,
        };
        let period = if frequency > 0.0 { 1.0 / frequency } else { 0.0 };

        let pp = max - min;
        let low = min + 0.1 * pp;
        let high = min + 0.9 * pp;
        let rise_time = edge_time(samples, low, high, true);
        let fall_time = edge_time(samples, high, low, false);

        let duty_cycle = if span > 0.0 {
            100.0 * time_above(samples, 0.5 * (max + min)) / span
        } else {
            0.0
        };

        Self {
            valid: true,
            min,
            max,
            peak_to_peak: pp,
            mean,
            rms,
            dc_offset,
            frequency,
            period,
            rise_time,
            fall_time,
            duty_cycle,
            pulse_width: duty_cycle / 100.0 * period,
            phase: 0.0,
        }
    }

    /// Measure `samples` and its phase against `reference`.
    pub fn measure_against(samples: &[(f64, f64)], reference: &[(f64, f64)]) -> Self {
        let mut m = Self::measure(samples);
        m.phase = phase_difference(reference, samples).unwrap_or(0.0);
        m
    }
}

/// Interpolated times where the waveform rises through `level`.
pub fn rising_crossings(samples: &[(f64, f64)], level: f64) -> Vec<f64> {
    samples
        .windows(2)
        .filter(|w| w[0].1 < level && w[1].1 >= level)
        .map(|w| interpolate_crossing(w[0], w[1], level))
        .collect()
}

fn interpolate_crossing((t0, v0): (f64, f64), (t1, v1): (f64, f64), level: f64) -> f64 {
    let dv = v1 - v0;
    if dv == 0.0 {
        t0
    } else {
        t0 + (level - v0) / dv * (t1 - t0)
    }
}

/// Time from crossing `from` to crossing `to` on the first edge in the
/// given direction, 0 when no complete edge exists.
fn edge_time(samples: &[(f64, f64)], from: f64, to: f64, rising: bool) -> f64 {
    let crosses = |a: f64, b: f64, level: f64| {
        if rising {
            a < level && b >= level
        } else {
            a > level && b <= level
        }
    };

    let mut start = None;
    for w in samples.windows(2) {
        match start {
            None if crosses(w[0].1, w[1].1, from) => {
                let t = interpolate_crossing(w[0], w[1], from);
                // Both thresholds inside one segment
                if crosses(w[0].1, w[1].1, to) {
                    return interpolate_crossing(w[0], w[1], to) - t;
                }
                start = Some(t);
            }
            Some(t) if crosses(w[0].1, w[1].1, to) => {
                return interpolate_crossing(w[0], w[1], to) - t;
            }
            _ => {}
        }
    }
    0.0
}

/// Total time the piecewise-linear waveform spends above `level`.
fn time_above(samples: &[(f64, f64)], level: f64) -> f64 {
    samples
        .windows(2)
        .map(|w| {
            let ((t0, v0), (t1, v1)) = (w[0], w[1]);
            let dt = t1 - t0;
            match (v0 > level, v1 > level) {
                (true, true) => dt,
                (false, false) => 0.0,
                (true, false) => interpolate_crossing(w[0], w[1], level) - t0,
                (false, true) => t1 - interpolate_crossing(w[0], w[1], level),
            }
        })
        .sum()
}

/// Wrap an angle into (-180, 180].
pub fn normalize_phase(degrees: f64) -> f64 {
    let mut p = degrees % 360.0;
    if p > 180.0 {
        p -= 360.0;
    } else if p <= -180.0 {
        p += 360.0;
    }
    p
}

/// Phase of `b` relative to `a` in degrees, positive when `b` leads.
///
/// Uses the first rising crossing of each channel's mean and the period of
/// `a`. None when either channel has no usable crossing.
pub fn phase_difference(a: &[(f64, f64)], b: &[(f64, f64)]) -> Option<f64> {
    let ma = WaveformMeasurements::measure(a);
    let mb = WaveformMeasurements::measure(b);
    if !ma.valid || !mb.valid || ma.period <= 0.0 {
        return None;
    }
    let ta = *rising_crossings(a, ma.mean).first()?;
    let tb = *rising_crossings(b, mb.mean).first()?;
    Some(normalize_phase(-360.0 * (tb - ta) / ma.period))
}

/// Noise floor estimate in dBV.
///
/// Robust sigma from the median absolute difference of consecutive
/// samples, so slow signal content barely contributes.
pub fn noise_floor_dbv(samples: &[(f64, f64)]) -> f64 {
    const MIN_DBV: f64 = -200.0;
    if samples.len() < 2 {
        return MIN_DBV;
    }
    let mut diffs: Vec<f64> = samples.windows(2).map(|w| (w[1].1 - w[0].1).abs()).collect();
    diffs.sort_by(f64::total_cmp);
    let mid = diffs.len() / 2;
    let median = if diffs.len() % 2 == 0 {
        0.5 * (diffs[mid - 1] + diffs[mid])
    } else {
        diffs[mid]
    };
    let sigma = median * 1.4826 / std::f64::consts::SQRT_2;
    (20.0 * sigma.log10()).max(MIN_DBV)
}
