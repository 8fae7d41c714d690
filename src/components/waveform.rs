//! Periodic waveform shapes and sweep ramps for time-varying sources.
//!
//! Waveforms are evaluated from an absolute phase in cycles, never
//! accumulated sample by sample, so any time point can be evaluated
//! independently of the step history.

use std::f64::consts::PI;

/// Periodic waveform shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaveShape {
    #[default]
    Sine,
    /// High for `duty` of the period, low for the rest
    Square,
    Triangle,
    /// Rising ramp
    Sawtooth,
}

impl WaveShape {
    /// Parse shape from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "sine" | "sin" => Some(Self::Sine),
            "square" | "sq" | "pulse" => Some(Self::Square),
            "triangle" | "tri" => Some(Self::Triangle),
            "sawtooth" | "saw" => Some(Self::Sawtooth),
            _ => None,
        }
    }

    /// Unit-amplitude value (-1..=1) at a phase given in cycles.
    pub fn evaluate(self, phase: f64, duty: f64) -> f64 {
        let p = phase.rem_euclid(1.0);
        match self {
            WaveShape::Sine => (2.0 * PI * p).sin(),
            WaveShape::Square => {
                if p < duty {
                    1.0
                } else {
                    -1.0
                }
            }
            // Starts at 0 and rises, like the sine
            WaveShape::Triangle => {
                if p < 0.25 {
                    4.0 * p
                } else if p < 0.75 {
                    2.0 - 4.0 * p
                } else {
                    4.0 * p - 4.0
                }
            }
            WaveShape::Sawtooth => 2.0 * p - 1.0,
        }
    }
}

/// Which source property a sweep ramp drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepTarget {
    Frequency,
    Amplitude,
}

/// How a sweep moves from its start to its end value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RampMode {
    Linear,
    Logarithmic,
    /// Equal-duration plateaus, including both endpoints
    Stepped { steps: usize },
}

/// A ramp applied to a function generator's frequency or amplitude.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceSweep {
    pub target: SweepTarget,
    pub mode: RampMode,
    pub start: f64,
    pub end: f64,
    /// Seconds from start to end
    pub duration: f64,
    /// Restart from `start` after each `duration`; otherwise hold `end`
    pub repeat: bool,
}

impl SourceSweep {
    /// Ramp value at `tau` seconds into a single pass (0..=duration).
    fn ramp_value(&self, tau: f64) -> f64 {
        let frac = if self.duration > 0.0 {
            (tau / self.duration).clamp(0.0, 1.0)
        } else {
            1.0
        };
        match self.mode {
            RampMode::Linear => self.start + (self.end - self.start) * frac,
            RampMode::Logarithmic => {
                if self.start > 0.0 && self.end > 0.0 {
                    self.start * (self.end / self.start).powf(frac)
                } else {
                    self.start + (self.end - self.start) * frac
                }
            }
            RampMode::Stepped { steps } => {
                let steps = steps.max(1);
                if steps == 1 {
                    return self.start;
                }
                let k = ((frac * steps as f64) as usize).min(steps - 1);
                self.start + (self.end - self.start) * k as f64 / (steps - 1) as f64
            }
        }
    }

    /// Value of the swept property at absolute time `t`.
    pub fn value_at(&self, t: f64) -> f64 {
        if self.duration <= 0.0 {
            return self.end;
        }
        if self.repeat {
            self.ramp_value(t.rem_euclid(self.duration))
        } else {
            self.ramp_value(t.min(self.duration))
        }
    }

    /// Cycles elapsed in the first `tau` seconds of one pass, with the
    /// ramp interpreted as an instantaneous frequency.
    fn pass_cycles(&self, tau: f64) -> f64 {
        let tau = tau.clamp(0.0, self.duration);
        let d = self.duration;
        match self.mode {
            RampMode::Linear => self.start * tau + (self.end - self.start) * tau * tau / (2.0 * d),
            RampMode::Logarithmic => {
                if self.start <= 0.0 || self.end <= 0.0 {
                    return self.start * tau + (self.end - self.start) * tau * tau / (2.0 * d);
                }
                let ratio_ln = (self.end / self.start).ln();
                if ratio_ln.abs() < 1e-12 {
                    self.start * tau
                } else {
                    self.start * d / ratio_ln * ((ratio_ln * tau / d).exp() - 1.0)
                }
            }
            RampMode::Stepped { steps } => {
                let steps = steps.max(1);
                let plateau = d / steps as f64;
                let mut cycles = 0.0;
                let mut elapsed = 0.0;
                for k in 0..steps {
                    if elapsed >= tau {
                        break;
                    }
                    let span = plateau.min(tau - elapsed);
                    let f = if steps == 1 {
                        self.start
                    } else {
                        self.start + (self.end - self.start) * k as f64 / (steps - 1) as f64
                    };
                    cycles += f * span;
                    elapsed += plateau;
                }
                cycles
            }
        }
    }

    /// Phase in cycles accumulated up to absolute time `t` when this ramp
    /// drives frequency. Integrating keeps the waveform continuous.
    pub fn cycles_at(&self, t: f64) -> f64 {
        if self.duration <= 0.0 {
            return self.end * t;
        }
        let full_pass = self.pass_cycles(self.duration);
        if self.repeat {
            let passes = (t / self.duration).floor();
            passes * full_pass + self.pass_cycles(t - passes * self.duration)
        } else if t <= self.duration {
            self.pass_cycles(t)
        } else {
            full_pass + self.end * (t - self.duration)
        }
    }

    /// Largest value the ramp reaches.
    pub fn peak(&self) -> f64 {
        self.start.abs().max(self.end.abs())
    }
}
