//! Independent sources: DC voltage and current sources, the function
//! generator and the noise source.
//!
//! Voltage-type sources with a series resistance are stamped as their
//! Norton equivalent and need no branch current. With zero series
//! resistance they enforce V+ - V- = E through an explicit branch.

use num_complex::Complex64;

use crate::circuit::{ComponentId, NodeId};
use crate::solver::{AcContext, ComplexMnaSystem, MnaSystem, StampContext};

use super::waveform::{SourceSweep, SweepTarget, WaveShape};

/// Stamp a voltage-type source of value `voltage` and series resistance `rs`.
fn stamp_voltage_like(
    sys: &mut MnaSystem,
    ctx: &StampContext,
    id: ComponentId,
    nodes: [NodeId; 2],
    voltage: f64,
    rs: f64,
) {
    let n_pos = ctx.index(nodes[0]);
    let n_neg = ctx.index(nodes[1]);
    if rs > 0.0 {
        let g = 1.0 / rs;
        sys.stamp_conductance(n_pos, n_neg, g);
        sys.stamp_current_source(n_pos, n_neg, -g * voltage);
    } else if let Some(br) = ctx.branch(id) {
        sys.stamp_voltage_source(n_pos, n_neg, br, voltage);
    }
}

/// Small-signal counterpart of [`stamp_voltage_like`]: the source value is
/// its AC stimulus (1 for the excitation, 0 otherwise).
fn stamp_voltage_like_ac(
    sys: &mut ComplexMnaSystem,
    ctx: &AcContext,
    id: ComponentId,
    nodes: [NodeId; 2],
    rs: f64,
) {
    let n_pos = ctx.index(nodes[0]);
    let n_neg = ctx.index(nodes[1]);
    let stimulus = Complex64::new(ctx.stimulus(id), 0.0);
    if rs > 0.0 {
        let g = Complex64::new(1.0 / rs, 0.0);
        sys.stamp_conductance(n_pos, n_neg, g);
        sys.stamp_current_source(n_pos, n_neg, -g * stimulus);
    } else if let Some(br) = ctx.branch(id) {
        sys.stamp_voltage_source(n_pos, n_neg, br, stimulus);
    }
}

/// A DC voltage source.
#[derive(Debug, Clone)]
pub struct VoltageSource {
    pub id: ComponentId,
    pub name: String,
    pub nodes: [NodeId; 2], // [positive, negative]
    pub voltage: f64,
    /// Series resistance; 0 makes the source ideal
    pub series_resistance: f64,
}

impl VoltageSource {
    /// Create a new ideal voltage source.
    pub fn new(id: ComponentId, name: impl Into<String>, nodes: [NodeId; 2], voltage: f64) -> Self {
        Self {
            id,
            name: name.into(),
            nodes,
            voltage,
            series_resistance: 0.0,
        }
    }

    pub fn with_series_resistance(mut self, rs: f64) -> Self {
        self.series_resistance = rs.max(0.0);
        self
    }

    pub fn is_ideal(&self) -> bool {
        self.series_resistance <= 0.0
    }

    pub fn stamp(&self, sys: &mut MnaSystem, ctx: &StampContext) {
        stamp_voltage_like(sys, ctx, self.id, self.nodes, self.voltage, self.series_resistance);
    }

    pub fn stamp_ac(&self, sys: &mut ComplexMnaSystem, ctx: &AcContext) {
        stamp_voltage_like_ac(sys, ctx, self.id, self.nodes, self.series_resistance);
    }
}

/// A DC current source.
///
/// Current flows from the positive node through the source to the
/// negative node.
#[derive(Debug, Clone)]
pub struct CurrentSource {
    pub id: ComponentId,
    pub name: String,
    pub nodes: [NodeId; 2],
    pub current: f64,
    /// Optional shunt resistance across the source
    pub parallel_resistance: Option<f64>,
}

impl CurrentSource {
    /// Create a new ideal current source.
    pub fn new(id: ComponentId, name: impl Into<String>, nodes: [NodeId; 2], current: f64) -> Self {
        Self {
            id,
            name: name.into(),
            nodes,
            current,
            parallel_resistance: None,
        }
    }

    pub fn with_parallel_resistance(mut self, rp: f64) -> Self {
        self.parallel_resistance = (rp > 0.0 && rp.is_finite()).then_some(rp);
        self
    }

    pub fn stamp(&self, sys: &mut MnaSystem, ctx: &StampContext) {
        let n_pos = ctx.index(self.nodes[0]);
        let n_neg = ctx.index(self.nodes[1]);
        sys.stamp_current_source(n_pos, n_neg, self.current);
        if let Some(rp) = self.parallel_resistance {
            sys.stamp_conductance(n_pos, n_neg, 1.0 / rp);
        }
    }

    pub fn stamp_ac(&self, sys: &mut ComplexMnaSystem, ctx: &AcContext) {
        let n_pos = ctx.index(self.nodes[0]);
        let n_neg = ctx.index(self.nodes[1]);
        sys.stamp_current_source(n_pos, n_neg, Complex64::new(ctx.stimulus(self.id), 0.0));
        if let Some(rp) = self.parallel_resistance {
            sys.stamp_conductance(n_pos, n_neg, Complex64::new(1.0 / rp, 0.0));
        }
    }
}

/// A periodic voltage source with an optional frequency or amplitude ramp.
#[derive(Debug, Clone)]
pub struct FunctionGenerator {
    pub id: ComponentId,
    pub name: String,
    pub nodes: [NodeId; 2],
    pub shape: WaveShape,
    /// Peak amplitude (V)
    pub amplitude: f64,
    /// Frequency (Hz)
    pub frequency: f64,
    /// Phase offset (degrees)
    pub phase: f64,
    /// DC offset (V)
    pub offset: f64,
    /// High fraction of a square wave period
    pub duty: f64,
    pub series_resistance: f64,
    pub sweep: Option<SourceSweep>,
}

impl FunctionGenerator {
    /// Create a sine generator with no offset and no series resistance.
    pub fn new(
        id: ComponentId,
        name: impl Into<String>,
        nodes: [NodeId; 2],
        shape: WaveShape,
        amplitude: f64,
        frequency: f64,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            nodes,
            shape,
            amplitude,
            frequency,
            phase: 0.0,
            offset: 0.0,
            duty: 0.5,
            series_resistance: 0.0,
            sweep: None,
        }
    }

    pub fn with_offset(mut self, offset: f64) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_phase(mut self, degrees: f64) -> Self {
        self.phase = degrees;
        self
    }

    pub fn with_duty(mut self, duty: f64) -> Self {
        self.duty = duty.clamp(0.0, 1.0);
        self
    }

    pub fn with_series_resistance(mut self, rs: f64) -> Self {
        self.series_resistance = rs.max(0.0);
        self
    }

    pub fn with_sweep(mut self, sweep: SourceSweep) -> Self {
        self.sweep = Some(sweep);
        self
    }

    pub fn is_ideal(&self) -> bool {
        self.series_resistance <= 0.0
    }

    /// Instantaneous output voltage at time `t`.
    pub fn voltage_at(&self, t: f64) -> f64 {
        let (cycles, amplitude) = match &self.sweep {
            Some(s) if s.target == SweepTarget::Frequency => (s.cycles_at(t), self.amplitude),
            Some(s) => (self.frequency * t, s.value_at(t)),
            None => (self.frequency * t, self.amplitude),
        };
        let phase = cycles + self.phase / 360.0;
        self.offset + amplitude * self.shape.evaluate(phase, self.duty)
    }

    /// Highest frequency this generator produces.
    pub fn highest_frequency(&self) -> f64 {
        match &self.sweep {
            Some(s) if s.target == SweepTarget::Frequency => s.peak(),
            _ => self.frequency.abs(),
        }
    }

    pub fn stamp(&self, sys: &mut MnaSystem, ctx: &StampContext) {
        let t = if ctx.is_dc() { 0.0 } else { ctx.time };
        stamp_voltage_like(sys, ctx, self.id, self.nodes, self.voltage_at(t), self.series_resistance);
    }

    pub fn stamp_ac(&self, sys: &mut ComplexMnaSystem, ctx: &AcContext) {
        stamp_voltage_like_ac(sys, ctx, self.id, self.nodes, self.series_resistance);
    }
}

/// Sample-and-hold Gaussian noise voltage source.
///
/// The value in each time slot of length `1 / bandwidth` is derived from
/// the seed and the slot number alone.
#[derive(Debug, Clone)]
pub struct NoiseSource {
    pub id: ComponentId,
    pub name: String,
    pub nodes: [NodeId; 2],
    /// RMS amplitude (V)
    pub amplitude: f64,
    pub offset: f64,
    /// Slot rate (Hz)
    pub bandwidth: f64,
    pub seed: u64,
    pub series_resistance: f64,
}

impl NoiseSource {
    pub fn new(
        id: ComponentId,
        name: impl Into<String>,
        nodes: [NodeId; 2],
        amplitude: f64,
        bandwidth: f64,
        seed: u64,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            nodes,
            amplitude,
            offset: 0.0,
            bandwidth,
            seed,
            series_resistance: 0.0,
        }
    }

    pub fn with_offset(mut self, offset: f64) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_series_resistance(mut self, rs: f64) -> Self {
        self.series_resistance = rs.max(0.0);
        self
    }

    pub fn is_ideal(&self) -> bool {
        self.series_resistance <= 0.0
    }

    /// Noise voltage at time `t`.
    pub fn voltage_at(&self, t: f64) -> f64 {
        if self.bandwidth <= 0.0 || t < 0.0 {
            return self.offset;
        }
        let slot = (t * self.bandwidth).floor() as u64;
        self.offset + self.amplitude * slot_gaussian(self.seed, slot)
    }

    pub fn stamp(&self, sys: &mut MnaSystem, ctx: &StampContext) {
        // At DC only the offset is applied
        let v = if ctx.is_dc() { self.offset } else { self.voltage_at(ctx.time) };
        stamp_voltage_like(sys, ctx, self.id, self.nodes, v, self.series_resistance);
    }

    pub fn stamp_ac(&self, sys: &mut ComplexMnaSystem, ctx: &AcContext) {
        stamp_voltage_like_ac(sys, ctx, self.id, self.nodes, self.series_resistance);
    }
}

fn splitmix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Standard normal deviate for one slot (Box-Muller on two hashed uniforms).
fn slot_gaussian(seed: u64, slot: u64) -> f64 {
    let a = splitmix64(seed ^ slot.wrapping_mul(0xD6E8_FEB8_6659_FD93));
    let b = splitmix64(a);
    // Uniforms in (0, 1]
    let u1 = ((a >> 11) as f64 + 1.0) / (1u64 << 53) as f64;
    let u2 = (b >> 11) as f64 / (1u64 << 53) as f64;
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::waveform::RampMode;
    use approx::assert_relative_eq;

    #[test]
    fn test_function_generator_sine() {
        let fg = FunctionGenerator::new(
            ComponentId(0),
            "FG1",
            [NodeId(1), NodeId(0)],
            WaveShape::Sine,
            2.0,
            1000.0,
        )
        .with_offset(1.0);
        assert_relative_eq!(fg.voltage_at(0.0), 1.0);
        assert_relative_eq!(fg.voltage_at(0.25e-3), 3.0, epsilon = 1e-9);
        assert_relative_eq!(fg.voltage_at(0.75e-3), -1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_function_generator_phase_shift() {
        let fg = FunctionGenerator::new(
            ComponentId(0),
            "FG1",
            [NodeId(1), NodeId(0)],
            WaveShape::Sine,
            1.0,
            50.0,
        )
        .with_phase(90.0);
        assert_relative_eq!(fg.voltage_at(0.0), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_amplitude_sweep() {
        let fg = FunctionGenerator::new(
            ComponentId(0),
            "FG1",
            [NodeId(1), NodeId(0)],
            WaveShape::Square,
            1.0,
            1.0,
        )
        .with_sweep(SourceSweep {
            target: SweepTarget::Amplitude,
            mode: RampMode::Linear,
            start: 1.0,
            end: 5.0,
            duration: 4.0,
            repeat: false,
        });
        // Square is high in the first half of each 1 s period
        assert_relative_eq!(fg.voltage_at(2.25), 3.25);
        assert_relative_eq!(fg.highest_frequency(), 1.0);
    }

    #[test]
    fn test_noise_is_repeatable_per_slot() {
        let n = NoiseSource::new(ComponentId(0), "N1", [NodeId(1), NodeId(0)], 0.1, 1000.0, 42);
        // Same slot, same value
        assert_eq!(n.voltage_at(1.2e-3), n.voltage_at(1.7e-3));
        assert_eq!(n.voltage_at(5e-3), n.voltage_at(5e-3));
        // Different slots differ
        assert_ne!(n.voltage_at(1.2e-3), n.voltage_at(2.2e-3));
    }

    #[test]
    fn test_noise_statistics() {
        let n = NoiseSource::new(ComponentId(0), "N1", [NodeId(1), NodeId(0)], 1.0, 1.0, 7)
            .with_offset(0.5);
        let samples: Vec<f64> = (0..20_000).map(|k| n.voltage_at(k as f64 + 0.5)).collect();
        let mean = samples.iter().sum::<f64>() / samples.len() as f64;
        let var = samples.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / samples.len() as f64;
        assert!((mean - 0.5).abs() < 0.05, "mean = {mean}");
        assert!((var.sqrt() - 1.0).abs() < 0.05, "std = {}", var.sqrt());
    }
}
