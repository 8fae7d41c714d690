//! Parametric sweep: re-solve the circuit for a range of one component value.
//!
//! The sweep advances one point per call so a frame loop can interleave it
//! with drawing. The simulator is snapshotted before the first point and put
//! back (parameter value, component state and transient run) when the sweep
//! completes or is aborted.

use log::{debug, info, warn};

use crate::buffer::BoundedVec;
use crate::circuit::{ComponentId, NodeId};
use crate::components::ParameterKind;
use crate::error::{Result, SimError};
use crate::solver::{Simulator, SimulatorSnapshot};

/// Upper bound on sweep points.
pub const MAX_SWEEP_POINTS: usize = 1000;

/// How sweep values are spaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SweepSpacing {
    #[default]
    Linear,
    Logarithmic,
}

/// What to sweep and how.
#[derive(Debug, Clone)]
pub struct ParametricSweepConfig {
    pub component: ComponentId,
    pub parameter: ParameterKind,
    pub start: f64,
    pub end: f64,
    pub points: usize,
    pub spacing: SweepSpacing,
    /// Probe whose waveform is summarized at each point
    pub probe: usize,
    /// Transient steps after the DC solve; 0 records the DC voltage
    pub settle_steps: usize,
}

impl ParametricSweepConfig {
    pub fn new(component: ComponentId, parameter: ParameterKind, start: f64, end: f64) -> Self {
        Self {
            component,
            parameter,
            start,
            end,
            points: 10,
            spacing: SweepSpacing::Linear,
            probe: 0,
            settle_steps: 0,
        }
    }

    pub fn with_points(mut self, points: usize) -> Self {
        self.points = points;
        self
    }

    pub fn with_spacing(mut self, spacing: SweepSpacing) -> Self {
        self.spacing = spacing;
        self
    }

    pub fn with_probe(mut self, probe: usize) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_settle_steps(mut self, steps: usize) -> Self {
        self.settle_steps = steps;
        self
    }
}

/// Summary of the probe waveform at one sweep value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepSample {
    pub value: f64,
    pub min: f64,
    pub max: f64,
    /// Halfway between min and max
    pub mid: f64,
    pub rms: f64,
    /// False when the solver failed at this value
    pub valid: bool,
}

impl SweepSample {
    fn invalid(value: f64) -> Self {
        Self {
            value,
            min: 0.0,
            max: 0.0,
            mid: 0.0,
            rms: 0.0,
            valid: false,
        }
    }

    fn from_values(value: f64, values: impl Iterator<Item = f64>) -> Self {
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut sum_sq = 0.0;
        let mut n = 0usize;
        for v in values {
            min = min.min(v);
            max = max.max(v);
            sum_sq += v * v;
            n += 1;
        }
        if n == 0 {
            return Self::invalid(value);
        }
        Self {
            value,
            min,
            max,
            mid: 0.5 * (min + max),
            rms: (sum_sq / n as f64).sqrt(),
            valid: true,
        }
    }
}

/// An armed parametric sweep.
#[derive(Debug, Clone)]
pub struct ParametricSweep {
    config: ParametricSweepConfig,
    points: usize,
    cursor: usize,
    original: Option<f64>,
    saved: Option<SimulatorSnapshot>,
    results: BoundedVec<SweepSample>,
    complete: bool,
}

impl ParametricSweep {
    /// Validate the configuration; the point count is clamped to
    /// [`MAX_SWEEP_POINTS`].
    pub fn new(config: ParametricSweepConfig) -> Result<Self> {
        if config.points == 0 {
            return Err(SimError::sweep_range("a sweep needs at least one point"));
        }
        if !(config.start.is_finite() && config.end.is_finite()) {
            return Err(SimError::sweep_range("sweep bounds must be finite"));
        }
        if config.spacing == SweepSpacing::Logarithmic && (config.start <= 0.0 || config.end <= 0.0) {
            return Err(SimError::sweep_range(format!(
                "logarithmic sweep needs positive bounds, got {} to {}",
                config.start, config.end
            )));
        }
        let points = config.points.min(MAX_SWEEP_POINTS);
        Ok(Self {
            config,
            points,
            cursor: 0,
            original: None,
            saved: None,
            results: BoundedVec::new(points),
            complete: false,
        })
    }

    pub fn config(&self) -> &ParametricSweepConfig {
        &self.config
    }

    pub fn num_points(&self) -> usize {
        self.points
    }

    /// Parameter value of point `i`.
    pub fn value_at(&self, i: usize) -> f64 {
        let (start, end) = (self.config.start, self.config.end);
        if self.points < 2 {
            return start;
        }
        let frac = i as f64 / (self.points - 1) as f64;
        match self.config.spacing {
            SweepSpacing::Linear => start + (end - start) * frac,
            SweepSpacing::Logarithmic => start * (end / start).powf(frac),
        }
    }

    /// Solve the next point; returns true once every point is done.
    ///
    /// Solver failures become invalid samples. Errors are returned only
    /// when the target itself is unusable (missing component, probe or
    /// parameter).
    pub fn step(&mut self, sim: &mut Simulator) -> Result<bool> {
        if self.complete {
            return Ok(true);
        }
        let (id, kind) = (self.config.component, self.config.parameter);
        if self.original.is_none() {
            self.original = Some(sim.parameter(id, kind)?);
            self.saved = Some(sim.snapshot());
        }
        let node = sim.circuit().probe(self.config.probe)?.node;

        let value = self.value_at(self.cursor);
        let sample = match sim.set_parameter(id, kind, value) {
            Ok(()) => self.measure(sim, node, value),
            Err(err) => {
                warn!("sweep value {value} rejected: {err}");
                SweepSample::invalid(value)
            }
        };
        self.results.push(sample);
        self.cursor += 1;
        debug!("sweep point {}/{}: {} = {value:.4e}", self.cursor, self.points, kind);

        if self.cursor >= self.points {
            self.restore(sim)?;
            self.complete = true;
            info!("parametric sweep finished: {} points", self.results.len());
        }
        Ok(self.complete)
    }

    fn measure(&self, sim: &mut Simulator, node: NodeId, value: f64) -> SweepSample {
        sim.reset();
        if sim.dc_operating_point().is_err() {
            return SweepSample::invalid(value);
        }
        if self.config.settle_steps == 0 {
            return match sim.node_voltage(node) {
                Ok(v) => SweepSample::from_values(value, std::iter::once(v)),
                Err(_) => SweepSample::invalid(value),
            };
        }
        for _ in 0..self.config.settle_steps {
            if sim.step().is_err() {
                return SweepSample::invalid(value);
            }
        }
        match sim.probe_history(self.config.probe) {
            Ok(history) => SweepSample::from_values(value, history.iter().map(|&(_, v)| v)),
            Err(_) => SweepSample::invalid(value),
        }
    }

    fn restore(&mut self, sim: &mut Simulator) -> Result<()> {
        if let Some(snapshot) = self.saved.take() {
            if sim.restore_snapshot(snapshot) {
                self.original = None;
            }
        }
        if let Some(original) = self.original.take() {
            sim.set_parameter(self.config.component, self.config.parameter, original)?;
        }
        Ok(())
    }

    /// Stop early and put the simulator back as it was before the sweep.
    pub fn abort(&mut self, sim: &mut Simulator) -> Result<()> {
        self.complete = true;
        self.restore(sim)
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// `(done, total)` points.
    pub fn progress(&self) -> (usize, usize) {
        (self.cursor, self.points)
    }

    pub fn results(&self) -> &[SweepSample] {
        self.results.as_slice()
    }
}
