//! Monte Carlo tolerance analysis.
//!
//! Each run perturbs every value-bearing component by a Gaussian relative
//! error, solves the DC operating point without committing it and records
//! one node voltage. Runs are executed in slices so a frame loop stays
//! responsive; the circuit always holds its pristine values between calls.

use std::f64::consts::PI;

use log::{debug, info};

use crate::buffer::BoundedVec;
use crate::circuit::{ComponentId, NodeId};
use crate::components::ParameterKind;
use crate::error::Result;
use crate::solver::Simulator;

/// Upper bound on runs per analysis.
pub const MAX_MONTE_CARLO_RUNS: usize = 10_000;

/// Runs executed per frame by default.
pub const DEFAULT_RUNS_PER_SLICE: usize = 10;

/// Source of uniform deviates in `[0, 1)`.
pub trait UniformSource {
    fn next_f64(&mut self) -> f64;
}

/// 64-bit linear congruential generator (Knuth's MMIX constants).
#[derive(Debug, Clone)]
pub struct Lcg {
    state: u64,
}

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    pub fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        self.state
    }
}

impl UniformSource for Lcg {
    fn next_f64(&mut self) -> f64 {
        // Top 53 bits; the low bits of an LCG are weak
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }
}

/// Standard normal deviates by the Box-Muller transform.
#[derive(Debug, Clone)]
pub struct GaussianRng<U = Lcg> {
    uniform: U,
    spare: Option<f64>,
}

impl GaussianRng<Lcg> {
    pub fn seeded(seed: u64) -> Self {
        Self::new(Lcg::new(seed))
    }
}

impl<U: UniformSource> GaussianRng<U> {
    pub fn new(uniform: U) -> Self {
        Self { uniform, spare: None }
    }

    pub fn next_gaussian(&mut self) -> f64 {
        if let Some(z) = self.spare.take() {
            return z;
        }
        // 1 - u keeps the logarithm finite
        let u1 = 1.0 - self.uniform.next_f64();
        let u2 = self.uniform.next_f64();
        let r = (-2.0 * u1.ln()).sqrt();
        let theta = 2.0 * PI * u2;
        self.spare = Some(r * theta.sin());
        r * theta.cos()
    }
}

/// Relative tolerance per parameter kind; three sigma equals the tolerance.
#[derive(Debug, Clone, PartialEq)]
pub struct TolerancePolicy {
    pub resistor: f64,
    pub capacitor: f64,
    pub inductor: f64,
    pub source: f64,
}

impl Default for TolerancePolicy {
    fn default() -> Self {
        Self {
            resistor: 0.05,
            capacitor: 0.10,
            inductor: 0.10,
            source: 0.01,
        }
    }
}

impl TolerancePolicy {
    pub fn tolerance_for(&self, kind: ParameterKind) -> f64 {
        match kind {
            ParameterKind::Resistance => self.resistor,
            ParameterKind::Capacitance => self.capacitor,
            ParameterKind::Inductance => self.inductor,
            ParameterKind::Voltage | ParameterKind::Current => self.source,
            ParameterKind::Frequency | ParameterKind::Temperature => 0.0,
        }
    }
}

/// Monte Carlo request.
#[derive(Debug, Clone)]
pub struct MonteCarloConfig {
    /// Clamped to [`MAX_MONTE_CARLO_RUNS`]
    pub runs: usize,
    /// Node whose DC voltage is recorded
    pub output: NodeId,
    pub tolerances: TolerancePolicy,
    pub seed: u64,
    pub runs_per_slice: usize,
}

impl MonteCarloConfig {
    pub fn new(output: NodeId) -> Self {
        Self {
            runs: 100,
            output,
            tolerances: TolerancePolicy::default(),
            seed: 1,
            runs_per_slice: DEFAULT_RUNS_PER_SLICE,
        }
    }

    pub fn with_runs(mut self, runs: usize) -> Self {
        self.runs = runs;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_tolerances(mut self, tolerances: TolerancePolicy) -> Self {
        self.tolerances = tolerances;
        self
    }
}

/// Statistics over the successful runs.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MonteCarloStats {
    pub mean: f64,
    /// Population standard deviation
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub p1: f64,
    pub p99: f64,
    pub valid_runs: usize,
    pub failed_runs: usize,
}

impl MonteCarloStats {
    /// Statistics of `values`; percentiles by nearest rank.
    pub fn from_values(values: &[f64], failed_runs: usize) -> Self {
        if values.is_empty() {
            return Self {
                failed_runs,
                ..Self::default()
            };
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;

        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);
        let rank = |p: f64| {
            let k = (p * sorted.len() as f64 / 100.0).ceil() as usize;
            sorted[k.clamp(1, sorted.len()) - 1]
        };

        Self {
            mean,
            std_dev: variance.sqrt(),
            min: sorted[0],
            max: sorted[sorted.len() - 1],
            p1: rank(1.0),
            p99: rank(99.0),
            valid_runs: values.len(),
            failed_runs,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Backup {
    component: ComponentId,
    kind: ParameterKind,
    value: f64,
}

/// An armed Monte Carlo analysis.
#[derive(Debug, Clone)]
pub struct MonteCarloAnalysis<U = Lcg> {
    config: MonteCarloConfig,
    runs: usize,
    rng: GaussianRng<U>,
    backups: Vec<Backup>,
    outputs: BoundedVec<f64>,
    completed: usize,
    failed: usize,
    stats: Option<MonteCarloStats>,
    complete: bool,
}

impl MonteCarloAnalysis<Lcg> {
    pub fn new(config: MonteCarloConfig) -> Self {
        let rng = GaussianRng::seeded(config.seed);
        Self::with_rng(config, rng)
    }

    /// Start over with a fresh generator from the configured seed.
    pub fn reset(&mut self, sim: &mut Simulator) -> Result<()> {
        self.rng = GaussianRng::seeded(self.config.seed);
        self.clear(sim)
    }
}

impl<U: UniformSource> MonteCarloAnalysis<U> {
    /// Use an explicit deviate source.
    pub fn with_rng(config: MonteCarloConfig, rng: GaussianRng<U>) -> Self {
        let runs = config.runs.min(MAX_MONTE_CARLO_RUNS);
        Self {
            config,
            runs,
            rng,
            backups: Vec::new(),
            outputs: BoundedVec::new(runs),
            completed: 0,
            failed: 0,
            stats: None,
            complete: false,
        }
    }

    pub fn config(&self) -> &MonteCarloConfig {
        &self.config
    }

    pub fn num_runs(&self) -> usize {
        self.runs
    }

    /// Execute up to `n` runs; returns true once all runs are done.
    pub fn run_slice(&mut self, sim: &mut Simulator, n: usize) -> Result<bool> {
        if self.complete {
            return Ok(true);
        }
        if self.backups.is_empty() && self.completed == 0 {
            self.take_backups(sim);
        }

        let budget = n.min(self.runs - self.completed);
        for _ in 0..budget {
            self.run_once(sim)?;
        }
        debug!("monte carlo: {}/{} runs, {} failed", self.completed, self.runs, self.failed);

        if self.completed >= self.runs {
            self.finish(sim)?;
        }
        Ok(self.complete)
    }

    /// Run a slice of the configured default size.
    pub fn run_frame(&mut self, sim: &mut Simulator) -> Result<bool> {
        let n = self.config.runs_per_slice.max(1);
        self.run_slice(sim, n)
    }

    fn take_backups(&mut self, sim: &Simulator) {
        self.backups = sim
            .circuit()
            .components()
            .iter()
            .filter_map(|c| {
                let kind = c.tolerance_kind()?;
                let value = c.parameter(kind)?;
                Some(Backup {
                    component: c.id(),
                    kind,
                    value,
                })
            })
            .collect();
        debug!("monte carlo: {} toleranced values", self.backups.len());
    }

    fn run_once(&mut self, sim: &mut Simulator) -> Result<()> {
        self.restore(sim)?;

        let mut applied = true;
        for i in 0..self.backups.len() {
            let backup = self.backups[i];
            let sigma = self.config.tolerances.tolerance_for(backup.kind) / 3.0;
            let mut value = backup.value * (1.0 + sigma * self.rng.next_gaussian());
            if backup.kind.is_passive() {
                value = value.max(0.0);
            }
            if sim.set_parameter(backup.component, backup.kind, value).is_err() {
                applied = false;
            }
        }

        let output = if applied {
            sim.solve_dc()
                .ok()
                .map(|x| sim.node_map().voltage(&x, self.config.output))
        } else {
            None
        };
        match output {
            Some(v) if v.is_finite() => {
                self.outputs.push(v);
            }
            _ => self.failed += 1,
        }
        self.completed += 1;

        self.restore(sim)
    }

    /// Put every backed-up value back.
    fn restore(&self, sim: &mut Simulator) -> Result<()> {
        for b in &self.backups {
            sim.set_parameter(b.component, b.kind, b.value)?;
        }
        Ok(())
    }

    fn finish(&mut self, sim: &mut Simulator) -> Result<()> {
        self.restore(sim)?;
        let stats = MonteCarloStats::from_values(self.outputs.as_slice(), self.failed);
        info!(
            "monte carlo finished: mean {:.6e}, std {:.3e} over {} runs ({} failed)",
            stats.mean, stats.std_dev, stats.valid_runs, stats.failed_runs
        );
        self.stats = Some(stats);
        self.complete = true;
        Ok(())
    }

    /// Stop now; the circuit keeps its pristine values.
    pub fn abort(&mut self, sim: &mut Simulator) -> Result<()> {
        self.complete = true;
        self.restore(sim)
    }

    fn clear(&mut self, sim: &mut Simulator) -> Result<()> {
        let restored = self.restore(sim);
        self.backups.clear();
        self.outputs.clear();
        self.completed = 0;
        self.failed = 0;
        self.stats = None;
        self.complete = false;
        restored
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// `(done, total)` runs.
    pub fn progress(&self) -> (usize, usize) {
        (self.completed, self.runs)
    }

    pub fn failed_runs(&self) -> usize {
        self.failed
    }

    /// Recorded output voltages of the successful runs.
    pub fn outputs(&self) -> &[f64] {
        self.outputs.as_slice()
    }

    /// Available once every run is done.
    pub fn stats(&self) -> Option<&MonteCarloStats> {
        self.stats.as_ref()
    }
}
