//! Time cursors over probe waveforms.

/// Linearly interpolated value at `t`, held at the end points outside the
/// sampled range. None for an empty waveform.
pub fn value_at(samples: &[(f64, f64)], t: f64) -> Option<f64> {
    let first = samples.first()?;
    let last = samples.last()?;
    if t <= first.0 {
        return Some(first.1);
    }
    if t >= last.0 {
        return Some(last.1);
    }
    // First sample at or after t; the guards above keep it in 1..len
    let i = samples.partition_point(|&(ts, _)| ts < t);
    let (t0, v0) = samples[i - 1];
    let (t1, v1) = samples[i];
    if t1 == t0 {
        return Some(v1);
    }
    Some(v0 + (v1 - v0) * (t - t0) / (t1 - t0))
}

/// Readout of a cursor pair on one waveform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CursorReadout {
    pub v1: f64,
    pub v2: f64,
    pub delta_v: f64,
}

/// Two vertical cursors.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CursorPair {
    pub t1: f64,
    pub t2: f64,
}

impl CursorPair {
    pub fn new(t1: f64, t2: f64) -> Self {
        Self { t1, t2 }
    }

    pub fn delta_t(&self) -> f64 {
        self.t2 - self.t1
    }

    /// `1 / |Δt|`, 0 when the cursors coincide.
    pub fn frequency(&self) -> f64 {
        let dt = self.delta_t().abs();
        if dt > 0.0 {
            1.0 / dt
        } else {
            0.0
        }
    }

    pub fn readout(&self, samples: &[(f64, f64)]) -> Option<CursorReadout> {
        let v1 = value_at(samples, self.t1)?;
        let v2 = value_at(samples, self.t2)?;
        Some(CursorReadout {
            v1,
            v2,
            delta_v: v2 - v1,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ramp() -> Vec<(f64, f64)> {
        (0..=10).map(|i| (i as f64 * 1e-3, i as f64)).collect()
    }

    #[test]
    fn test_interpolation_and_clamping() {
        let r = ramp();
        assert_relative_eq!(value_at(&r, 2.5e-3).unwrap(), 2.5, epsilon = 1e-9);
        assert_eq!(value_at(&r, -1.0), Some(0.0));
        assert_eq!(value_at(&r, 1.0), Some(10.0));
        assert_eq!(value_at(&[], 0.0), None);
    }

    #[test]
    fn test_cursor_pair() {
        let pair = CursorPair::new(2e-3, 7e-3);
        assert_relative_eq!(pair.delta_t(), 5e-3, epsilon = 1e-15);
        assert_relative_eq!(pair.frequency(), 200.0, epsilon = 1e-9);
        let readout = pair.readout(&ramp()).unwrap();
        assert_relative_eq!(readout.delta_v, 5.0, epsilon = 1e-9);
        assert_eq!(CursorPair::new(1.0, 1.0).frequency(), 0.0);
    }
}
