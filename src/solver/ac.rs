//! Small-signal frequency response (Bode) analysis.

use log::{debug, info};
use num_complex::Complex64;

use crate::circuit::{find_short_circuit, Circuit, ComponentId, NodeId, NodeMap};
use crate::error::{Result, SimError};

use super::mna::{assemble_ac, AcContext, AnalysisMode, ComplexMnaSystem, StampContext};
use super::simulator::thermal_voltage;
use super::sweep_task::CancelToken;
use super::NewtonRaphson;

/// Upper bound on the number of frequency points per scan.
pub const MAX_BODE_POINTS: usize = 1000;

/// Magnitudes below this are reported as -200 dB.
const MIN_MAGNITUDE: f64 = 1e-10;

/// Input voltages smaller than this make the ratio meaningless.
const MIN_INPUT: f64 = 1e-30;

/// A frequency scan request.
#[derive(Debug, Clone)]
pub struct BodeConfig {
    /// Source driven with the unit AC stimulus
    pub input: ComponentId,
    /// Node whose response is measured
    pub output: NodeId,
    pub start_frequency: f64,
    pub stop_frequency: f64,
    /// Log-spaced points, clamped to [`MAX_BODE_POINTS`]
    pub points: usize,
    /// Iteration limit and tolerances for the operating point
    pub newton: NewtonRaphson,
}

impl BodeConfig {
    pub fn new(input: ComponentId, output: NodeId) -> Self {
        Self {
            input,
            output,
            start_frequency: 10.0,
            stop_frequency: 100e3,
            points: 100,
            newton: NewtonRaphson::new(),
        }
    }

    pub fn with_range(mut self, start: f64, stop: f64) -> Self {
        self.start_frequency = start;
        self.stop_frequency = stop;
        self
    }

    pub fn with_points(mut self, points: usize) -> Self {
        self.points = points;
        self
    }

    /// Solve the operating point with these limits, usually
    /// [`Simulator::newton`](super::Simulator::newton).
    pub fn with_newton(mut self, newton: NewtonRaphson) -> Self {
        self.newton = newton;
        self
    }

    /// Reject ranges that cannot be log-spaced.
    pub fn validate(&self) -> Result<()> {
        let (start, stop) = (self.start_frequency, self.stop_frequency);
        if !(start.is_finite() && stop.is_finite()) || start <= 0.0 {
            return Err(SimError::sweep_range(format!(
                "start frequency must be positive and finite, got {start}"
            )));
        }
        if stop <= start {
            return Err(SimError::sweep_range(format!(
                "stop frequency {stop} must exceed start frequency {start}"
            )));
        }
        if self.points == 0 {
            return Err(SimError::sweep_range("a frequency scan needs at least one point"));
        }
        Ok(())
    }

    /// Log-spaced scan frequencies.
    pub fn frequencies(&self) -> Vec<f64> {
        let n = self.points.clamp(1, MAX_BODE_POINTS);
        if n == 1 {
            return vec![self.start_frequency];
        }
        let ratio = self.stop_frequency / self.start_frequency;
        (0..n)
            .map(|i| self.start_frequency * ratio.powf(i as f64 / (n - 1) as f64))
            .collect()
    }
}

/// One point of a frequency response.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodePoint {
    pub frequency: f64,
    pub magnitude_db: f64,
    pub phase_deg: f64,
}

/// Run a frequency scan on a snapshot of the circuit.
///
/// Solves the DC operating point first, then one complex system per
/// frequency. Any solver failure aborts the scan. `cancel` is checked
/// before each point and `progress(done, total)` called after each one.
pub fn run_bode<F>(
    circuit: &Circuit,
    config: &BodeConfig,
    temperature: f64,
    cancel: &CancelToken,
    mut progress: F,
) -> Result<Vec<BodePoint>>
where
    F: FnMut(usize, usize),
{
    config.validate()?;
    let source = circuit.component(config.input)?;
    if !source.is_source() {
        return Err(SimError::sweep_range(format!(
            "'{}' is not an independent source",
            source.name()
        )));
    }
    let input_node = source.nodes()[0];
    circuit.node(config.output)?;

    if circuit.components().is_empty() {
        return Err(SimError::EmptyCircuit);
    }
    if let Some(components) = find_short_circuit(circuit, true) {
        return Err(SimError::ShortCircuit { components });
    }

    let nodes = NodeMap::build(circuit)?;
    let vt = thermal_voltage(temperature);
    let ctx = StampContext {
        nodes: &nodes,
        x: &[],
        time: 0.0,
        dt: 0.0,
        mode: AnalysisMode::DcOperatingPoint,
        thermal_voltage: vt,
    };
    let x_op = config.newton.solve(circuit.components(), ctx)?.x;

    let frequencies = config.frequencies();
    let total = frequencies.len();
    let mut sys = ComplexMnaSystem::new(nodes.size());
    let mut points = Vec::with_capacity(total);

    for (i, &frequency) in frequencies.iter().enumerate() {
        if cancel.is_cancelled() {
            debug!("frequency scan cancelled after {i} of {total} points");
            return Err(SimError::SweepCancelled);
        }

        let ctx = AcContext {
            nodes: &nodes,
            x_op: &x_op,
            omega: 2.0 * std::f64::consts::PI * frequency,
            excitation: config.input,
            thermal_voltage: vt,
        };
        assemble_ac(&mut sys, circuit.components(), &ctx);
        let x = sys.solve().map_err(|err| match err {
            SimError::SingularMatrix { index, .. } => SimError::SingularMatrix {
                index,
                unknown: nodes.describe(index),
            },
            other => other,
        })?;

        let phasor = |node: NodeId| {
            nodes
                .index(node)
                .map(|k| x[k])
                .unwrap_or_else(|| Complex64::new(0.0, 0.0))
        };
        let v_out = phasor(config.output);
        let v_in = phasor(input_node);
        let h = if v_in.norm() < MIN_INPUT { v_out } else { v_out / v_in };

        points.push(BodePoint {
            frequency,
            magnitude_db: 20.0 * h.norm().max(MIN_MAGNITUDE).log10(),
            phase_deg: h.arg().to_degrees(),
        });
        progress(i + 1, total);
    }

    info!(
        "frequency scan complete: {} points, {:.1} Hz to {:.1} Hz",
        total, config.start_frequency, config.stop_frequency
    );
    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Capacitor, Diode, DiodeKind, Inductor, Resistor, VoltageSource};
    use approx::assert_relative_eq;

    const GND: NodeId = NodeId::GROUND;

    fn rc_lowpass() -> (Circuit, ComponentId, NodeId) {
        let mut c = Circuit::new();
        let a = c.add_node("in");
        let b = c.add_node("out");
        let v = c.add(|id| VoltageSource::new(id, "V1", [a, GND], 0.0)).unwrap();
        c.add(|id| Resistor::new(id, "R1", [a, b], 1e3)).unwrap();
        c.add(|id| Capacitor::new(id, "C1", [b, GND], 1e-6)).unwrap();
        (c, v, b)
    }

    #[test]
    fn test_frequencies_log_spaced() {
        let config = BodeConfig::new(ComponentId(0), NodeId(1))
            .with_range(10.0, 1e4)
            .with_points(4);
        let f = config.frequencies();
        assert_eq!(f.len(), 4);
        assert_relative_eq!(f[1], 100.0, max_relative = 1e-12);
        assert_relative_eq!(f[3], 1e4, max_relative = 1e-12);

        let many = config.with_points(5000).frequencies();
        assert_eq!(many.len(), MAX_BODE_POINTS);
    }

    #[test]
    fn test_invalid_ranges() {
        let base = BodeConfig::new(ComponentId(0), NodeId(1));
        assert!(base.clone().with_range(0.0, 10.0).validate().is_err());
        assert!(base.clone().with_range(100.0, 10.0).validate().is_err());
        assert!(base.with_points(0).validate().is_err());
    }

    #[test]
    fn test_rc_lowpass_corner() {
        let (c, v, out) = rc_lowpass();
        let fc = 1.0 / (2.0 * std::f64::consts::PI * 1e3 * 1e-6);
        let config = BodeConfig::new(v, out).with_range(fc / 100.0, fc).with_points(3);
        let points = run_bode(&c, &config, 27.0, &CancelToken::new(), |_, _| {}).unwrap();

        assert_eq!(points.len(), 3);
        assert_relative_eq!(points[0].magnitude_db, 0.0, epsilon = 1e-3);
        assert_relative_eq!(points[2].magnitude_db, -3.0103, epsilon = 1e-3);
        assert_relative_eq!(points[2].phase_deg, -45.0, epsilon = 1e-6);
    }

    #[test]
    fn test_rl_highpass_phase() {
        let mut c = Circuit::new();
        let a = c.add_node("in");
        let b = c.add_node("out");
        let v = c.add(|id| VoltageSource::new(id, "V1", [a, GND], 0.0)).unwrap();
        c.add(|id| Resistor::new(id, "R1", [a, b], 100.0)).unwrap();
        c.add(|id| Inductor::new(id, "L1", [b, GND], 10e-3)).unwrap();
        // Corner at R / (2πL)
        let fc = 100.0 / (2.0 * std::f64::consts::PI * 10e-3);
        let config = BodeConfig::new(v, b).with_range(fc, fc * 10.0).with_points(2);
        let points = run_bode(&c, &config, 27.0, &CancelToken::new(), |_, _| {}).unwrap();
        assert_relative_eq!(points[0].phase_deg, 45.0, epsilon = 1e-6);
        assert_relative_eq!(points[0].magnitude_db, -3.0103, epsilon = 1e-3);
    }

    #[test]
    fn test_cancelled_before_start() {
        let (c, v, out) = rc_lowpass();
        let token = CancelToken::new();
        token.cancel();
        let err = run_bode(&c, &BodeConfig::new(v, out), 27.0, &token, |_, _| {}).unwrap_err();
        assert!(matches!(err, SimError::SweepCancelled));
    }

    #[test]
    fn test_progress_reported() {
        let (c, v, out) = rc_lowpass();
        let mut seen = Vec::new();
        let config = BodeConfig::new(v, out).with_points(5);
        run_bode(&c, &config, 27.0, &CancelToken::new(), |done, total| seen.push((done, total)))
            .unwrap();
        assert_eq!(seen.last(), Some(&(5, 5)));
    }

    #[test]
    fn test_operating_point_uses_configured_limits() {
        let mut c = Circuit::new();
        let a = c.add_node("a");
        let k = c.add_node("k");
        let v = c.add(|id| VoltageSource::new(id, "V1", [a, GND], 5.0)).unwrap();
        c.add(|id| Resistor::new(id, "R1", [a, k], 1e3)).unwrap();
        c.add(|id| Diode::new(id, "D1", [k, GND], DiodeKind::Standard)).unwrap();

        let config = BodeConfig::new(v, k).with_points(3);
        assert!(run_bode(&c, &config, 27.0, &CancelToken::new(), |_, _| {}).is_ok());

        let starved = config.with_newton(NewtonRaphson::with_config(1, 1e-6, 1e-3));
        let err = run_bode(&c, &starved, 27.0, &CancelToken::new(), |_, _| {}).unwrap_err();
        assert!(matches!(err, SimError::ConvergenceFailure { iterations: 1, .. }));
    }

    #[test]
    fn test_input_must_be_source() {
        let (c, _, out) = rc_lowpass();
        let r = c.find_component("R1").unwrap();
        let err = run_bode(&c, &BodeConfig::new(r, out), 27.0, &CancelToken::new(), |_, _| {})
            .unwrap_err();
        assert!(matches!(err, SimError::InvalidSweepRange { .. }));
    }
}
