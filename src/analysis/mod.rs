//! Analyses built on simulator output.
//!
//! - [`sweep`]: parametric sweep of one component value
//! - [`monte_carlo`]: tolerance analysis over randomized component values
//! - [`fft`]: windowed spectrum with THD and SNR
//! - [`measure`]: scope-style waveform measurements and noise floor
//! - [`math`]: derived channels
//! - [`cursor`]: time cursors
//! - [`export`]: CSV writers
//!
//! [`AnalysisState`] holds everything an interactive front end keeps
//! between frames.

pub mod cursor;
pub mod export;
pub mod fft;
pub mod math;
pub mod measure;
pub mod monte_carlo;
pub mod sweep;

pub use cursor::{value_at, CursorPair, CursorReadout};
pub use fft::{FftResult, FftWorkspace, WindowFunction, DEFAULT_FFT_SIZE, MAX_FFT_SIZE};
pub use math::{MathChannel, MathOp};
pub use measure::{noise_floor_dbv, phase_difference, WaveformMeasurements};
pub use monte_carlo::{
    GaussianRng, Lcg, MonteCarloAnalysis, MonteCarloConfig, MonteCarloStats, TolerancePolicy,
    UniformSource,
};
pub use sweep::{ParametricSweep, ParametricSweepConfig, SweepSample, SweepSpacing};

use log::debug;

use crate::buffer::BoundedVec;
use crate::error::{Result, SimError};
use crate::solver::Simulator;

/// Upper bound on math channels.
pub const MAX_MATH_CHANNELS: usize = 4;

/// Analysis results and armed analyses kept across frames.
#[derive(Debug, Clone)]
pub struct AnalysisState {
    /// Ambient temperature applied to the simulator
    pub temperature: f64,
    pub sweep: Option<ParametricSweep>,
    pub monte_carlo: Option<MonteCarloAnalysis>,
    /// Last spectrum per probe
    pub spectra: Vec<Option<FftResult>>,
    /// Last measurements per probe
    pub measurements: Vec<Option<WaveformMeasurements>>,
    math: BoundedVec<MathChannel>,
    fft: FftWorkspace,
}

impl Default for AnalysisState {
    fn default() -> Self {
        Self::new(DEFAULT_FFT_SIZE)
    }
}

impl AnalysisState {
    pub fn new(fft_size: usize) -> Self {
        Self {
            temperature: crate::solver::DEFAULT_TEMPERATURE,
            sweep: None,
            monte_carlo: None,
            spectra: Vec::new(),
            measurements: Vec::new(),
            math: BoundedVec::new(MAX_MATH_CHANNELS),
            fft: FftWorkspace::new(fft_size),
        }
    }

    pub fn set_temperature(&mut self, sim: &mut Simulator, celsius: f64) -> Result<()> {
        sim.set_temperature(celsius)?;
        self.temperature = celsius;
        Ok(())
    }

    // ============ Parametric sweep ============

    /// Arm a sweep, aborting any sweep still in progress.
    pub fn arm_sweep(&mut self, sim: &mut Simulator, config: ParametricSweepConfig) -> Result<()> {
        self.reset_sweep(sim)?;
        self.sweep = Some(ParametricSweep::new(config)?);
        Ok(())
    }

    /// Advance the armed sweep by one point; false when none is armed or
    /// it still has points left.
    pub fn step_sweep(&mut self, sim: &mut Simulator) -> Result<bool> {
        match &mut self.sweep {
            Some(sweep) => sweep.step(sim),
            None => Ok(false),
        }
    }

    pub fn reset_sweep(&mut self, sim: &mut Simulator) -> Result<()> {
        match self.sweep.take() {
            Some(mut sweep) if !sweep.is_complete() => sweep.abort(sim),
            _ => Ok(()),
        }
    }

    // ============ Monte Carlo ============

    pub fn arm_monte_carlo(&mut self, sim: &mut Simulator, config: MonteCarloConfig) -> Result<()> {
        self.reset_monte_carlo(sim)?;
        self.monte_carlo = Some(MonteCarloAnalysis::new(config));
        Ok(())
    }

    /// Run one slice of the armed analysis.
    pub fn run_monte_carlo_frame(&mut self, sim: &mut Simulator) -> Result<bool> {
        match &mut self.monte_carlo {
            Some(mc) => mc.run_frame(sim),
            None => Ok(false),
        }
    }

    pub fn reset_monte_carlo(&mut self, sim: &mut Simulator) -> Result<()> {
        match self.monte_carlo.take() {
            Some(mut mc) => mc.abort(sim),
            None => Ok(()),
        }
    }

    // ============ Spectrum and measurements ============

    /// Spectrum of a probe's history.
    pub fn analyze_spectrum(&mut self, sim: &Simulator, probe: usize, window: WindowFunction) -> Result<&FftResult> {
        let samples = sim.probe_samples(probe)?;
        let rate = fft::sample_rate(&samples)
            .ok_or_else(|| SimError::InvalidSimulationParam {
                message: format!("probe {probe} has too few samples for a spectrum"),
            })?;
        // Most recent samples when the history is longer than the transform
        let skip = samples.len().saturating_sub(self.fft.size());
        let values: Vec<f64> = samples[skip..].iter().map(|&(_, v)| v).collect();
        let result = self.fft.analyze(&values, rate, window);
        debug!(
            "spectrum of probe {probe}: fundamental {:.3} Hz, THD {:.3} %",
            result.fundamental_frequency, result.thd_percent
        );
        Ok(Self::slot(&mut self.spectra, probe).insert(result))
    }

    /// Measure a probe, optionally with phase against a reference probe.
    pub fn measure_probe(
        &mut self,
        sim: &Simulator,
        probe: usize,
        reference: Option<usize>,
    ) -> Result<&WaveformMeasurements> {
        let samples = sim.probe_samples(probe)?;
        let m = match reference {
            Some(r) => WaveformMeasurements::measure_against(&samples, &sim.probe_samples(r)?),
            None => WaveformMeasurements::measure(&samples),
        };
        Ok(Self::slot(&mut self.measurements, probe).insert(m))
    }

    fn slot<T>(items: &mut Vec<Option<T>>, index: usize) -> &mut Option<T> {
        if items.len() <= index {
            items.resize_with(index + 1, || None);
        }
        &mut items[index]
    }

    // ============ Math channels ============

    /// Add a channel; false when all slots are taken.
    pub fn add_math_channel(&mut self, channel: MathChannel) -> bool {
        self.math.push(channel)
    }

    pub fn remove_math_channel(&mut self, index: usize) -> Option<MathChannel> {
        self.math.remove(index)
    }

    pub fn math_channels(&self) -> &[MathChannel] {
        self.math.as_slice()
    }

    /// Bring every enabled channel up to date with the probe histories.
    ///
    /// Only samples newer than the previous call are processed, so running
    /// integrals keep accumulating after the histories wrap.
    pub fn evaluate_math(&mut self, sim: &Simulator) -> Result<Vec<(String, Vec<(f64, f64)>)>> {
        let mut out = Vec::new();
        for channel in self.math.iter_mut().filter(|c| c.enabled) {
            let a = sim.probe_history(channel.source_a)?;
            let b = if channel.op.is_binary() {
                Some(sim.probe_history(channel.source_b)?)
            } else {
                None
            };
            out.push((channel.name.clone(), channel.update(a, b)));
        }
        Ok(out)
    }
}
