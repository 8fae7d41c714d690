//! Main simulator interface.

use log::{debug, info, warn};

use crate::buffer::RingBuffer;
use crate::circuit::{find_short_circuit, Circuit, ComponentId, NodeId, NodeMap};
use crate::components::ParameterKind;
use crate::error::{Result, SimError};

use super::mna::{AnalysisMode, StampContext};
use super::{NewtonRaphson, CONVERGENCE_TOLERANCE, MAX_ITERATIONS, RELATIVE_TOLERANCE};

/// Default transient time step (s).
pub const DEFAULT_TIME_STEP: f64 = 1e-5;

/// Default number of samples kept per probe.
pub const DEFAULT_HISTORY_CAPACITY: usize = 4096;

/// Default ambient temperature (°C).
pub const DEFAULT_TEMPERATURE: f64 = 27.0;

/// Steps per period of the fastest source used by [`Simulator::suggest_time_step`].
const STEPS_PER_PERIOD: f64 = 40.0;

const MIN_SUGGESTED_STEP: f64 = 1e-9;
const MAX_SUGGESTED_STEP: f64 = 1e-4;

/// Configuration for the simulator.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Maximum Newton-Raphson iterations per solve.
    pub max_iterations: usize,
    /// Absolute convergence tolerance (volts or amperes).
    pub abstol: f64,
    /// Relative convergence tolerance.
    pub reltol: f64,
    /// Transient time step (seconds).
    pub time_step: f64,
    /// Samples kept per probe history.
    pub history_capacity: usize,
    /// Ambient temperature (°C).
    pub temperature: f64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            max_iterations: MAX_ITERATIONS,
            abstol: CONVERGENCE_TOLERANCE,
            reltol: RELATIVE_TOLERANCE,
            time_step: DEFAULT_TIME_STEP,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            temperature: DEFAULT_TEMPERATURE,
        }
    }
}

impl SimulatorConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum Newton-Raphson iterations.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Set the absolute convergence tolerance.
    ///
    /// - 1e-6 (default): precise, may need more iterations
    /// - 1e-4: good balance for interactive use
    pub fn with_abstol(mut self, abstol: f64) -> Self {
        self.abstol = abstol;
        self
    }

    /// Set the relative convergence tolerance.
    pub fn with_reltol(mut self, reltol: f64) -> Self {
        self.reltol = reltol;
        self
    }

    /// Set the transient time step in seconds.
    pub fn with_time_step(mut self, dt: f64) -> Self {
        self.time_step = dt;
        self
    }

    /// Set the per-probe history length.
    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    /// Set the ambient temperature in °C.
    pub fn with_temperature(mut self, celsius: f64) -> Self {
        self.temperature = celsius;
        self
    }
}

/// How [`Simulator::run_frame`] advances time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    #[default]
    Paused,
    Running,
    /// Take exactly one step on the next frame, then pause.
    SingleStep,
}

/// Transient state of one simulation run.
#[derive(Debug, Clone)]
pub struct SimulationState {
    pub time: f64,
    pub dt: f64,
    pub mode: RunMode,
    /// Accepted transient steps since the last reset
    pub steps: u64,
    /// Last accepted solution vector
    pub solution: Option<Vec<f64>>,
    /// `(time, voltage)` per probe
    pub histories: Vec<RingBuffer<(f64, f64)>>,
    pub last_error: Option<String>,
}

impl SimulationState {
    fn new(dt: f64, probes: usize, capacity: usize) -> Self {
        Self {
            time: 0.0,
            dt,
            mode: RunMode::Paused,
            steps: 0,
            solution: None,
            histories: (0..probes).map(|_| RingBuffer::new(capacity)).collect(),
            last_error: None,
        }
    }
}

/// Saved simulator state, see [`Simulator::snapshot`].
#[derive(Debug, Clone)]
pub struct SimulatorSnapshot {
    circuit: Circuit,
    state: SimulationState,
    temperature: f64,
}

/// Unknown layout and topology checks for one circuit revision.
#[derive(Debug, Clone, Default)]
struct Layout {
    revision: Option<u64>,
    nodes: NodeMap,
    short_dc: Option<Vec<ComponentId>>,
    short_transient: Option<Vec<ComponentId>>,
}

/// Thermal voltage kT/q at a temperature in °C.
pub fn thermal_voltage(celsius: f64) -> f64 {
    crate::BOLTZMANN * (celsius + 273.15) / crate::ELECTRON_CHARGE
}

/// The interactive circuit simulator.
///
/// Owns the circuit, its transient state and the per-probe histories. Any
/// structural edit to the circuit (visible as a new revision) discards the
/// transient state on the next solve.
#[derive(Debug, Clone)]
pub struct Simulator {
    circuit: Circuit,
    config: SimulatorConfig,
    newton: NewtonRaphson,
    state: SimulationState,
    layout: Layout,
    temperature: f64,
}

impl Simulator {
    /// Create a new simulator for the given circuit with default configuration.
    pub fn new(circuit: Circuit) -> Self {
        Self::with_config(circuit, SimulatorConfig::default())
    }

    /// Create a new simulator for the given circuit with custom configuration.
    pub fn with_config(circuit: Circuit, config: SimulatorConfig) -> Self {
        let newton = NewtonRaphson::with_config(config.max_iterations, config.abstol, config.reltol);
        let state = SimulationState::new(
            config.time_step,
            circuit.probes().len(),
            config.history_capacity,
        );
        Self {
            circuit,
            newton,
            state,
            layout: Layout::default(),
            temperature: config.temperature,
            config,
        }
    }

    pub fn circuit(&self) -> &Circuit {
        &self.circuit
    }

    /// Mutable access to the circuit; structural edits reset the run.
    pub fn circuit_mut(&mut self) -> &mut Circuit {
        &mut self.circuit
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    pub fn state(&self) -> &SimulationState {
        &self.state
    }

    /// Newton limits taken from the configuration.
    pub fn newton(&self) -> &NewtonRaphson {
        &self.newton
    }

    /// Unknown layout of the last prepared revision.
    pub fn node_map(&self) -> &NodeMap {
        &self.layout.nodes
    }

    pub fn time(&self) -> f64 {
        self.state.time
    }

    pub fn steps(&self) -> u64 {
        self.state.steps
    }

    pub fn solution(&self) -> Option<&[f64]> {
        self.state.solution.as_deref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.state.last_error.as_deref()
    }

    pub fn thermal_voltage(&self) -> f64 {
        thermal_voltage(self.temperature)
    }

    // ============ Layout ============

    /// Rebuild the unknown layout if the topology changed since the last solve.
    fn prepare(&mut self) -> Result<()> {
        let stale = self.layout.revision != Some(self.circuit.revision())
            || !self.layout.nodes.matches(&self.circuit);
        if !stale {
            return Ok(());
        }

        if self.circuit.components().is_empty() {
            return Err(SimError::EmptyCircuit);
        }
        let nodes = NodeMap::build(&self.circuit)?;
        debug!(
            "layout rebuilt: {} voltages, {} branches",
            nodes.num_voltages(),
            nodes.num_branches()
        );
        self.layout = Layout {
            revision: Some(self.circuit.revision()),
            nodes,
            short_dc: find_short_circuit(&self.circuit, true),
            short_transient: find_short_circuit(&self.circuit, false),
        };
        self.reset();
        Ok(())
    }

    fn check_short(&self, dc: bool) -> Result<()> {
        let short = if dc {
            &self.layout.short_dc
        } else {
            &self.layout.short_transient
        };
        match short {
            Some(components) => Err(SimError::ShortCircuit {
                components: components.clone(),
            }),
            None => Ok(()),
        }
    }

    fn record<T>(&mut self, result: Result<T>) -> Result<T> {
        match &result {
            Ok(_) => self.state.last_error = None,
            Err(err) => {
                warn!("simulation error: {err}");
                self.state.last_error = Some(err.to_string());
            }
        }
        result
    }

    // ============ Analyses ============

    /// Compute the DC operating point from a cold start and commit it.
    ///
    /// Capacitor and inductor state is seeded from the result so a
    /// following transient run starts in steady state.
    pub fn dc_operating_point(&mut self) -> Result<()> {
        let result = self.solve_dc();
        let x = self.record(result)?;

        let nodes = &self.layout.nodes;
        for component in self.circuit.components_mut() {
            component.commit_operating_point(nodes, &x);
        }
        self.circuit.set_node_voltages(nodes, &x);
        self.state.solution = Some(x);
        info!("DC operating point solved");
        Ok(())
    }

    /// Solve the DC operating point without committing anything.
    pub fn solve_dc(&mut self) -> Result<Vec<f64>> {
        self.prepare()?;
        self.check_short(true)?;
        let ctx = StampContext {
            nodes: &self.layout.nodes,
            x: &[],
            time: 0.0,
            dt: 0.0,
            mode: AnalysisMode::DcOperatingPoint,
            thermal_voltage: self.thermal_voltage(),
        };
        let solution = self.newton.solve(self.circuit.components(), ctx)?;
        Ok(solution.x)
    }

    /// Advance the transient simulation by one fixed time step.
    ///
    /// On failure nothing is committed and the error is kept as the last error.
    pub fn step(&mut self) -> Result<()> {
        let result = self.try_step();
        self.record(result)
    }

    fn try_step(&mut self) -> Result<()> {
        self.prepare()?;
        self.check_short(false)?;

        let dt = self.state.dt;
        let t_next = self.state.time + dt;
        let guess = self.state.solution.as_deref().unwrap_or(&[]);
        let ctx = StampContext {
            nodes: &self.layout.nodes,
            x: guess,
            time: t_next,
            dt,
            mode: AnalysisMode::Transient,
            thermal_voltage: thermal_voltage(self.temperature),
        };
        let x = self.newton.solve(self.circuit.components(), ctx)?.x;

        let nodes = &self.layout.nodes;
        for component in self.circuit.components_mut() {
            component.commit_step(nodes, &x, dt);
        }
        self.circuit.set_node_voltages(nodes, &x);
        for (history, probe) in self.state.histories.iter_mut().zip(self.circuit.probes()) {
            history.push((t_next, nodes.voltage(&x, probe.node)));
        }
        self.state.solution = Some(x);
        self.state.time = t_next;
        self.state.steps += 1;
        Ok(())
    }

    /// Advance according to the run mode; returns the number of steps taken.
    ///
    /// A failed step pauses the run.
    pub fn run_frame(&mut self, max_steps: usize) -> Result<usize> {
        let budget = match self.state.mode {
            RunMode::Paused => return Ok(0),
            RunMode::SingleStep => {
                self.state.mode = RunMode::Paused;
                1
            }
            RunMode::Running => max_steps,
        };

        for taken in 0..budget {
            if let Err(err) = self.step() {
                self.state.mode = RunMode::Paused;
                debug!("run paused after {taken} steps");
                return Err(err);
            }
        }
        Ok(budget)
    }

    /// Drop all transient state and probe histories.
    pub fn reset(&mut self) {
        let mode = self.state.mode;
        self.state = SimulationState::new(
            self.state.dt,
            self.circuit.probes().len(),
            self.config.history_capacity,
        );
        self.state.mode = mode;
        for component in self.circuit.components_mut() {
            component.reset_state();
        }
        self.circuit.clear_node_voltages();
    }

    /// Capture the circuit values, component state and transient run.
    pub fn snapshot(&self) -> SimulatorSnapshot {
        SimulatorSnapshot {
            circuit: self.circuit.clone(),
            state: self.state.clone(),
            temperature: self.temperature,
        }
    }

    /// Return to a captured snapshot.
    ///
    /// A snapshot taken before a structural edit is stale: the run is reset
    /// instead and `false` is returned.
    pub fn restore_snapshot(&mut self, snapshot: SimulatorSnapshot) -> bool {
        if snapshot.circuit.revision() != self.circuit.revision() {
            warn!("snapshot is from an older topology, resetting instead");
            self.reset();
            return false;
        }
        let mode = self.state.mode;
        let dt = self.state.dt;
        self.circuit = snapshot.circuit;
        self.state = snapshot.state;
        self.state.mode = mode;
        self.state.dt = dt;
        self.temperature = snapshot.temperature;
        true
    }

    // ============ Run control ============

    pub fn start(&mut self) {
        self.state.mode = RunMode::Running;
    }

    pub fn pause(&mut self) {
        self.state.mode = RunMode::Paused;
    }

    /// Take one step on the next frame.
    pub fn request_step(&mut self) {
        self.state.mode = RunMode::SingleStep;
    }

    pub fn mode(&self) -> RunMode {
        self.state.mode
    }

    pub fn is_running(&self) -> bool {
        self.state.mode == RunMode::Running
    }

    // ============ Time step and temperature ============

    pub fn time_step(&self) -> f64 {
        self.state.dt
    }

    pub fn set_time_step(&mut self, dt: f64) -> Result<()> {
        if !dt.is_finite() || dt <= 0.0 {
            return Err(SimError::InvalidSimulationParam {
                message: format!("time step must be positive, got {dt}"),
            });
        }
        self.state.dt = dt;
        Ok(())
    }

    /// A step that resolves the fastest source in the circuit.
    ///
    /// `1 / (40 · f_max)` clamped to [1 ns, 100 µs], or the configured step
    /// when nothing in the circuit oscillates.
    pub fn suggest_time_step(&self) -> f64 {
        let f_max = self
            .circuit
            .components()
            .iter()
            .filter_map(|c| c.highest_frequency())
            .filter(|f| f.is_finite() && *f > 0.0)
            .fold(0.0f64, f64::max);

        if f_max > 0.0 {
            (1.0 / (f_max * STEPS_PER_PERIOD)).clamp(MIN_SUGGESTED_STEP, MAX_SUGGESTED_STEP)
        } else {
            self.config.time_step
        }
    }

    /// Ambient temperature in °C.
    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn set_temperature(&mut self, celsius: f64) -> Result<()> {
        if !celsius.is_finite() || celsius <= -273.15 {
            return Err(SimError::InvalidSimulationParam {
                message: format!("temperature {celsius} °C is below absolute zero"),
            });
        }
        self.temperature = celsius;
        Ok(())
    }

    // ============ Parameters ============

    /// Change a component parameter (or the ambient temperature).
    pub fn set_parameter(&mut self, id: ComponentId, kind: ParameterKind, value: f64) -> Result<()> {
        match kind {
            ParameterKind::Temperature => self.set_temperature(value),
            _ => self.circuit.set_parameter(id, kind, value),
        }
    }

    pub fn parameter(&self, id: ComponentId, kind: ParameterKind) -> Result<f64> {
        match kind {
            ParameterKind::Temperature => Ok(self.temperature),
            _ => self.circuit.parameter(id, kind),
        }
    }

    // ============ Readouts ============

    pub fn node_voltage(&self, node: NodeId) -> Result<f64> {
        self.circuit.node_voltage(node)
    }

    pub fn node_voltage_by_name(&self, name: &str) -> Result<f64> {
        self.circuit.node_voltage(self.circuit.node_id(name)?)
    }

    /// Current through a branch-owning component in the last solution.
    pub fn branch_current(&self, id: ComponentId) -> Option<f64> {
        let br = self.layout.nodes.branch(id)?;
        self.state.solution.as_ref()?.get(br).copied()
    }

    pub fn probe_history(&self, index: usize) -> Result<&RingBuffer<(f64, f64)>> {
        self.state
            .histories
            .get(index)
            .ok_or(SimError::ProbeNotFound { index })
    }

    /// Probe history as `(time, voltage)` pairs, oldest first.
    pub fn probe_samples(&self, index: usize) -> Result<Vec<(f64, f64)>> {
        self.probe_history(index).map(RingBuffer::to_vec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{
        Bjt, BjtParams, BjtType, Capacitor, CurrentSource, Diode, DiodeKind, FunctionGenerator,
        Inductor, Mosfet, MosfetParams, MosfetType, OpAmp, OpAmpParams, Resistor, VoltageSource,
        WaveShape,
    };
    use approx::assert_relative_eq;

    const GND: NodeId = NodeId::GROUND;

    fn divider() -> (Circuit, NodeId) {
        let mut c = Circuit::new();
        let a = c.add_node("in");
        let b = c.add_node("out");
        c.add(|id| VoltageSource::new(id, "V1", [a, GND], 10.0)).unwrap();
        c.add(|id| Resistor::new(id, "R1", [a, b], 1e3)).unwrap();
        c.add(|id| Resistor::new(id, "R2", [b, GND], 1e3)).unwrap();
        (c, b)
    }

    #[test]
    fn test_voltage_divider() {
        let (c, out) = divider();
        let mut sim = Simulator::new(c);
        sim.dc_operating_point().unwrap();
        assert_relative_eq!(sim.node_voltage(out).unwrap(), 5.0, epsilon = 1e-9);
        let v1 = sim.circuit().find_component("V1").unwrap();
        assert_relative_eq!(sim.branch_current(v1).unwrap(), -5e-3, epsilon = 1e-12);
        assert!(sim.last_error().is_none());
    }

    #[test]
    fn test_dc_is_deterministic() {
        let mut c = Circuit::new();
        let a = c.add_node("a");
        let k = c.add_node("k");
        c.add(|id| VoltageSource::new(id, "V1", [a, GND], 5.0)).unwrap();
        c.add(|id| Resistor::new(id, "R1", [a, k], 1e3)).unwrap();
        c.add(|id| Diode::new(id, "D1", [k, GND], DiodeKind::Standard)).unwrap();
        let mut sim = Simulator::new(c);

        sim.dc_operating_point().unwrap();
        let first = sim.node_voltage(k).unwrap();
        sim.dc_operating_point().unwrap();
        assert_eq!(sim.node_voltage(k).unwrap(), first);
        assert!(first > 0.55 && first < 0.75);
    }

    #[test]
    fn test_npn_common_emitter_saturates_and_amplifies() {
        let mut c = Circuit::new();
        let vcc = c.add_node("vcc");
        let base = c.add_node("b");
        let col = c.add_node("c");
        c.add(|id| VoltageSource::new(id, "VCC", [vcc, GND], 12.0)).unwrap();
        c.add(|id| Resistor::new(id, "RB", [vcc, base], 1e6)).unwrap();
        c.add(|id| Resistor::new(id, "RC", [vcc, col], 2e3)).unwrap();
        c.add(|id| Bjt::new(id, "Q1", [col, base, GND], BjtType::Npn, BjtParams::default()))
            .unwrap();
        let mut sim = Simulator::new(c);
        sim.dc_operating_point().unwrap();

        let vb = sim.node_voltage(base).unwrap();
        let vc = sim.node_voltage(col).unwrap();
        assert!(vb > 0.5 && vb < 0.8, "vbe {vb}");
        // Ib ≈ 11.3 µA, Ic ≈ 1.1 mA: collector sits mid-supply, forward active
        assert!(vc > 8.0 && vc < 11.0, "vc {vc}");
    }

    #[test]
    fn test_nmos_switch() {
        let mut c = Circuit::new();
        let vdd = c.add_node("vdd");
        let gate = c.add_node("g");
        let drain = c.add_node("d");
        c.add(|id| VoltageSource::new(id, "VDD", [vdd, GND], 5.0)).unwrap();
        let vg = c.add(|id| VoltageSource::new(id, "VG", [gate, GND], 0.0)).unwrap();
        c.add(|id| Resistor::new(id, "RD", [vdd, drain], 10e3)).unwrap();
        c.add(|id| Mosfet::new(id, "M1", [drain, gate, GND], MosfetType::Nmos, MosfetParams::default()))
            .unwrap();
        let mut sim = Simulator::new(c);

        sim.dc_operating_point().unwrap();
        assert!(sim.node_voltage(drain).unwrap() > 4.99);

        sim.set_parameter(vg, ParameterKind::Voltage, 5.0).unwrap();
        sim.dc_operating_point().unwrap();
        assert!(sim.node_voltage(drain).unwrap() < 0.5);
    }

    fn opamp_circuit(feedback: bool) -> (Simulator, NodeId, ComponentId) {
        let mut c = Circuit::new();
        let input = c.add_node("in");
        let inv = c.add_node("inv");
        let out = c.add_node("out");
        let vin = c.add(|id| VoltageSource::new(id, "VIN", [input, GND], 0.5)).unwrap();
        if feedback {
            // Inverting amplifier, gain -10
            c.add(|id| Resistor::new(id, "RI", [input, inv], 1e3)).unwrap();
            c.add(|id| Resistor::new(id, "RF", [inv, out], 10e3)).unwrap();
            c.add(|id| OpAmp::new(id, "U1", [out, GND, inv], OpAmpParams::ua741())).unwrap();
        } else {
            // Follower
            c.add(|id| Resistor::new(id, "RL", [out, GND], 10e3)).unwrap();
            c.add(|id| OpAmp::new(id, "U1", [out, input, out], OpAmpParams::ua741())).unwrap();
            c.add(|id| Resistor::new(id, "RX", [inv, GND], 1e3)).unwrap();
        }
        (Simulator::new(c), out, vin)
    }

    #[test]
    fn test_opamp_follower() {
        let (mut sim, out, _) = opamp_circuit(false);
        sim.dc_operating_point().unwrap();
        assert_relative_eq!(sim.node_voltage(out).unwrap(), 0.5, epsilon = 1e-3);
    }

    #[test]
    fn test_opamp_inverting_gain_and_rails() {
        let (mut sim, out, vin) = opamp_circuit(true);
        sim.dc_operating_point().unwrap();
        assert_relative_eq!(sim.node_voltage(out).unwrap(), -5.0, epsilon = 5e-3);

        // 3 V in would need -30 V out
        sim.set_parameter(vin, ParameterKind::Voltage, 3.0).unwrap();
        sim.dc_operating_point().unwrap();
        let v = sim.node_voltage(out).unwrap();
        assert!(v < -14.0 && v >= -15.0, "clamped output {v}");
    }

    #[test]
    fn test_rc_step_response() {
        let mut c = Circuit::new();
        let a = c.add_node("a");
        let b = c.add_node("b");
        c.add(|id| VoltageSource::new(id, "V1", [a, GND], 1.0)).unwrap();
        c.add(|id| Resistor::new(id, "R1", [a, b], 1e3)).unwrap();
        c.add(|id| Capacitor::new(id, "C1", [b, GND], 1e-6)).unwrap();
        c.add_probe("out", b).unwrap();

        let config = SimulatorConfig::new().with_time_step(1e-6);
        let mut sim = Simulator::with_config(c, config);
        // Starts from an uncharged capacitor; run one time constant
        for _ in 0..1000 {
            sim.step().unwrap();
        }
        assert_relative_eq!(sim.time(), 1e-3, epsilon = 1e-12);
        let v = sim.node_voltage(b).unwrap();
        assert_relative_eq!(v, 1.0 - (-1.0f64).exp(), epsilon = 1e-3);

        let history = sim.probe_history(0).unwrap();
        assert_eq!(history.len(), 1000);
        let (t_last, v_last) = *history.latest().unwrap();
        assert_relative_eq!(t_last, 1e-3, epsilon = 1e-12);
        assert_eq!(v_last, v);
    }

    #[test]
    fn test_capacitor_charges_linearly() {
        let mut c = Circuit::new();
        let a = c.add_node("a");
        c.add(|id| CurrentSource::new(id, "I1", [GND, a], 1e-3)).unwrap();
        c.add(|id| Capacitor::new(id, "C1", [a, GND], 1e-6)).unwrap();
        let mut sim = Simulator::with_config(c, SimulatorConfig::new().with_time_step(1e-6));
        for _ in 0..500 {
            sim.step().unwrap();
        }
        // ΔV = I·T/C = 1e-3 · 5e-4 / 1e-6
        assert_relative_eq!(sim.node_voltage(a).unwrap(), 0.5, max_relative = 1e-3);
    }

    #[test]
    fn test_inductor_dc_and_transient() {
        let mut c = Circuit::new();
        let a = c.add_node("a");
        let b = c.add_node("b");
        c.add(|id| VoltageSource::new(id, "V1", [a, GND], 1.0)).unwrap();
        c.add(|id| Resistor::new(id, "R1", [a, b], 100.0)).unwrap();
        let l = c.add(|id| Inductor::new(id, "L1", [b, GND], 10e-3)).unwrap();
        let mut sim = Simulator::with_config(c, SimulatorConfig::new().with_time_step(1e-6));

        sim.dc_operating_point().unwrap();
        assert_relative_eq!(sim.node_voltage(b).unwrap(), 0.0, epsilon = 1e-9);
        assert_relative_eq!(sim.branch_current(l).unwrap(), 10e-3, epsilon = 1e-9);

        // Steady state is preserved by the transient step
        sim.step().unwrap();
        assert_relative_eq!(sim.branch_current(l).unwrap(), 10e-3, epsilon = 1e-9);
    }

    #[test]
    fn test_short_circuit_reported() {
        let mut c = Circuit::new();
        let a = c.add_node("a");
        c.add(|id| VoltageSource::new(id, "V1", [a, GND], 5.0)).unwrap();
        c.add(|id| VoltageSource::new(id, "V2", [a, GND], 1.0)).unwrap();
        let mut sim = Simulator::new(c);
        let err = sim.dc_operating_point().unwrap_err();
        match err {
            SimError::ShortCircuit { components } => {
                assert_eq!(components, vec![ComponentId(0), ComponentId(1)])
            }
            other => panic!("unexpected {other}"),
        }
        assert!(sim.last_error().unwrap().contains("Short circuit"));
    }

    #[test]
    fn test_floating_nodes_are_singular() {
        let mut c = Circuit::new();
        let a = c.add_node("a");
        let b = c.add_node("b");
        let x = c.add_node("x");
        let y = c.add_node("y");
        c.add(|id| VoltageSource::new(id, "V1", [a, GND], 1.0)).unwrap();
        c.add(|id| Resistor::new(id, "R1", [a, b], 1e3)).unwrap();
        c.add(|id| Resistor::new(id, "R2", [b, GND], 1e3)).unwrap();
        c.add(|id| Resistor::new(id, "R3", [x, y], 1e3)).unwrap();
        let mut sim = Simulator::new(c);

        let err = sim.dc_operating_point().unwrap_err();
        assert!(matches!(err, SimError::SingularMatrix { .. }));
        assert!(sim.solution().is_none());
    }

    #[test]
    fn test_failure_keeps_previous_state() {
        let mut c = Circuit::new();
        let a = c.add_node("a");
        let k = c.add_node("k");
        c.add(|id| VoltageSource::new(id, "V1", [a, GND], 5.0)).unwrap();
        c.add(|id| Resistor::new(id, "R1", [a, k], 1e3)).unwrap();
        c.add(|id| Diode::new(id, "D1", [k, GND], DiodeKind::Standard)).unwrap();
        let config = SimulatorConfig::new().with_max_iterations(1);
        let mut sim = Simulator::with_config(c, config);
        sim.start();

        assert!(sim.run_frame(10).is_err());
        assert_eq!(sim.mode(), RunMode::Paused);
        assert_eq!(sim.steps(), 0);
        assert_eq!(sim.time(), 0.0);
        assert!(sim.last_error().is_some());
    }

    #[test]
    fn test_run_modes() {
        let (c, _) = divider();
        let mut sim = Simulator::new(c);
        assert_eq!(sim.run_frame(5).unwrap(), 0);
        sim.request_step();
        assert_eq!(sim.run_frame(5).unwrap(), 1);
        assert_eq!(sim.mode(), RunMode::Paused);
        sim.start();
        assert_eq!(sim.run_frame(5).unwrap(), 5);
        assert_eq!(sim.steps(), 6);
    }

    #[test]
    fn test_topology_edit_resets_state() {
        let (c, out) = divider();
        let mut sim = Simulator::new(c);
        sim.step().unwrap();
        assert_eq!(sim.steps(), 1);
        sim.circuit_mut().add_probe("out", out).unwrap();
        sim.step().unwrap();
        assert_eq!(sim.steps(), 1);
        assert_eq!(sim.probe_history(0).unwrap().len(), 1);
    }

    #[test]
    fn test_snapshot_round_trip() {
        let (mut c, out) = divider();
        c.add_probe("out", out).unwrap();
        let mut sim = Simulator::new(c);
        for _ in 0..3 {
            sim.step().unwrap();
        }
        let saved = sim.snapshot();
        sim.set_parameter(ComponentId(2), ParameterKind::Resistance, 1.0).unwrap();
        sim.reset();
        sim.dc_operating_point().unwrap();
        assert!(sim.node_voltage(out).unwrap() < 0.1);

        assert!(sim.restore_snapshot(saved));
        assert_eq!(sim.steps(), 3);
        assert_eq!(sim.probe_history(0).unwrap().len(), 3);
        assert_relative_eq!(sim.node_voltage(out).unwrap(), 5.0, epsilon = 1e-9);
        assert_eq!(sim.parameter(ComponentId(2), ParameterKind::Resistance).unwrap(), 1e3);
    }

    #[test]
    fn test_stale_snapshot_resets() {
        let (c, out) = divider();
        let mut sim = Simulator::new(c);
        sim.step().unwrap();
        let saved = sim.snapshot();
        sim.circuit_mut().add_probe("again", out).unwrap();
        assert!(!sim.restore_snapshot(saved));
        assert_eq!(sim.steps(), 0);
    }

    #[test]
    fn test_suggest_time_step() {
        let mut c = Circuit::new();
        let a = c.add_node("a");
        c.add(|id| Resistor::new(id, "R1", [a, GND], 1e3)).unwrap();
        let mut sim = Simulator::new(c.clone());
        assert_eq!(sim.suggest_time_step(), DEFAULT_TIME_STEP);

        c.add(|id| FunctionGenerator::new(id, "FG1", [a, GND], WaveShape::Sine, 1.0, 1e3))
            .unwrap();
        sim = Simulator::new(c.clone());
        assert_relative_eq!(sim.suggest_time_step(), 2.5e-5);

        c.add(|id| FunctionGenerator::new(id, "FG2", [a, GND], WaveShape::Sine, 1.0, 1e12))
            .unwrap();
        sim = Simulator::new(c);
        assert_eq!(sim.suggest_time_step(), MIN_SUGGESTED_STEP);
    }

    #[test]
    fn test_invalid_settings() {
        let (c, _) = divider();
        let mut sim = Simulator::new(c);
        assert!(sim.set_time_step(0.0).is_err());
        assert!(sim.set_temperature(-300.0).is_err());
        sim.set_parameter(ComponentId(0), ParameterKind::Temperature, 50.0).unwrap();
        assert_eq!(sim.temperature(), 50.0);
        assert!(matches!(sim.probe_history(0), Err(SimError::ProbeNotFound { index: 0 })));
    }

    #[test]
    fn test_thermal_voltage() {
        assert_relative_eq!(thermal_voltage(27.0), 0.0258648, epsilon = 1e-6);
    }
}
