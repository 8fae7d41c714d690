//! Voltaic - Analog Circuit Simulator
//!
//! Runs one analysis on a netlist and prints the result as CSV.
//!
//! # Usage
//!
//! ```bash
//! voltaic filter.cir dc
//! voltaic filter.cir tran --steps 2000 --dt 10u > waves.csv
//! voltaic filter.cir ac V1 out --start 10 --stop 100k
//! RUST_LOG=debug voltaic amp.cir fft --probe 1 --window blackman
//! ```

use std::io::{self, Write};
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use log::info;
use voltaic_core::{
    analysis::{
        export, AnalysisState, MonteCarloConfig, ParametricSweepConfig, SweepSpacing, WindowFunction,
        DEFAULT_FFT_SIZE,
    },
    circuit::{Circuit, NodeId},
    components::ParameterKind,
    error::{Result, SimError},
    netlist::{self, parse_value},
    solver::{
        BodeConfig, FrequencySweeper, SimulatorConfig, SweepStatus, DEFAULT_HISTORY_CAPACITY,
    },
    Netlist, Simulator,
};

/// Analog circuit simulator
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the netlist file
    #[arg(value_name = "NETLIST")]
    netlist: PathBuf,

    /// Ambient temperature in °C, overriding `.temp`
    #[arg(long, value_parser = parse_engineering)]
    temp: Option<f64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// DC operating point: net voltages and branch currents
    Dc,
    /// Transient run; prints every probe
    Tran(Transient),
    /// Small-signal frequency response from a source to a node
    Ac {
        /// Source driven with the AC stimulus
        source: String,
        /// Output node
        output: String,
        #[arg(long, default_value = "10", value_parser = parse_engineering)]
        start: f64,
        #[arg(long, default_value = "100k", value_parser = parse_engineering)]
        stop: f64,
        #[arg(long, default_value_t = 100)]
        points: usize,
    },
    /// Spectrum of one probe after a transient run
    Fft {
        #[command(flatten)]
        run: Transient,
        #[arg(long, default_value_t = 0)]
        probe: usize,
        /// rectangular, hanning, hamming or blackman
        #[arg(long, default_value = "hanning", value_parser = parse_window)]
        window: WindowFunction,
    },
    /// Scope measurements of every probe after a transient run
    Measure {
        #[command(flatten)]
        run: Transient,
        /// Probe used as the phase reference
        #[arg(long)]
        reference: Option<usize>,
    },
    /// Step one component parameter across a range
    Sweep {
        component: String,
        /// r, c, l, v, i or f
        parameter: String,
        #[arg(value_parser = parse_engineering)]
        start: f64,
        #[arg(value_parser = parse_engineering)]
        stop: f64,
        #[arg(long, default_value_t = 20)]
        points: usize,
        /// Logarithmic spacing
        #[arg(long)]
        log: bool,
        #[arg(long, default_value_t = 0)]
        probe: usize,
        /// Transient steps per point; 0 records the DC voltage
        #[arg(long, default_value_t = 0)]
        settle: usize,
    },
    /// Tolerance statistics of one node's DC voltage
    MonteCarlo {
        output: String,
        #[arg(long, default_value_t = 100)]
        runs: usize,
        #[arg(long, default_value_t = 1)]
        seed: u64,
    },
}

#[derive(Args, Debug)]
struct Transient {
    /// Number of time steps
    #[arg(long, default_value_t = DEFAULT_FFT_SIZE)]
    steps: usize,
    /// Time step; suggested from the sources when omitted
    #[arg(long, value_parser = parse_engineering)]
    dt: Option<f64>,
    /// Start from the DC operating point instead of zero state
    #[arg(long)]
    op: bool,
}

fn parse_engineering(s: &str) -> std::result::Result<f64, String> {
    parse_value(s).ok_or_else(|| format!("invalid value '{s}'"))
}

fn parse_window(s: &str) -> std::result::Result<WindowFunction, String> {
    WindowFunction::parse(s).ok_or_else(|| format!("unknown window '{s}'"))
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut netlist = netlist::parse_file(&cli.netlist)?;
    probe_all_nets(&mut netlist.circuit)?;
    let temperature = cli.temp.or(netlist.temperature);

    let stdout = io::stdout();
    let mut out = stdout.lock();

    match cli.command {
        Command::Dc => {
            let mut sim = simulator(netlist, temperature, DEFAULT_HISTORY_CAPACITY)?;
            sim.dc_operating_point()?;
            write_operating_point(&mut out, &sim)?;
        }
        Command::Tran(run) => {
            let mut sim = simulator(netlist, temperature, run.steps + 1)?;
            run_transient(&mut sim, &run)?;
            let names: Vec<&str> = sim.circuit().probes().iter().map(|p| p.name.as_str()).collect();
            let channels = (0..names.len())
                .map(|i| sim.probe_samples(i))
                .collect::<Result<Vec<_>>>()?;
            export::write_waveforms_csv(&mut out, &names, &channels)?;
        }
        Command::Ac {
            source,
            output,
            start,
            stop,
            points,
        } => {
            let sim = simulator(netlist, temperature, 1)?;
            let circuit = sim.circuit();
            let config = BodeConfig::new(circuit.find_component(&source)?, circuit.node_id(&output)?)
                .with_range(start, stop)
                .with_points(points)
                .with_newton(sim.newton().clone());
            let mut sweeper = FrequencySweeper::new();
            sweeper.request(circuit, config, sim.temperature())?;
            let status = sweeper.wait().clone();
            match status {
                SweepStatus::Finished => export::write_bode_csv(&mut out, sweeper.results())?,
                SweepStatus::Failed(message) => return Err(SimError::InvalidSimulationParam { message }),
                _ => return Err(SimError::SweepCancelled),
            }
        }
        Command::Fft { run, probe, window } => {
            let mut sim = simulator(netlist, temperature, run.steps)?;
            run_transient(&mut sim, &run)?;
            let mut state = AnalysisState::new(run.steps);
            let spectrum = state.analyze_spectrum(&sim, probe, window)?;
            info!(
                "fundamental {:.3} Hz at {:.2} dB, THD {:.4} %, SNR {:.1} dB",
                spectrum.fundamental_frequency, spectrum.fundamental_db, spectrum.thd_percent, spectrum.snr_db
            );
            export::write_spectrum_csv(&mut out, spectrum)?;
        }
        Command::Measure { run, reference } => {
            let mut sim = simulator(netlist, temperature, run.steps + 1)?;
            run_transient(&mut sim, &run)?;
            let mut state = AnalysisState::default();
            let probes = sim.circuit().probes().len();
            for i in 0..probes {
                state.measure_probe(&sim, i, reference)?;
            }
            let rows: Vec<_> = sim
                .circuit()
                .probes()
                .iter()
                .zip(&state.measurements)
                .filter_map(|(p, m)| m.as_ref().map(|m| (p.name.as_str(), m)))
                .collect();
            export::write_measurements_csv(&mut out, &rows)?;
        }
        Command::Sweep {
            component,
            parameter,
            start,
            stop,
            points,
            log,
            probe,
            settle,
        } => {
            let kind = ParameterKind::parse(&parameter).ok_or_else(|| SimError::InvalidSimulationParam {
                message: format!("unknown parameter '{parameter}'"),
            })?;
            let mut sim = simulator(netlist, temperature, settle.max(1))?;
            let id = sim.circuit().find_component(&component)?;
            let spacing = if log {
                SweepSpacing::Logarithmic
            } else {
                SweepSpacing::Linear
            };
            let config = ParametricSweepConfig::new(id, kind, start, stop)
                .with_points(points)
                .with_spacing(spacing)
                .with_probe(probe)
                .with_settle_steps(settle);
            let mut state = AnalysisState::default();
            state.arm_sweep(&mut sim, config)?;
            while !state.step_sweep(&mut sim)? {}
            if let Some(sweep) = &state.sweep {
                export::write_sweep_csv(&mut out, sweep.results())?;
            }
        }
        Command::MonteCarlo { output, runs, seed } => {
            let node = netlist.circuit.node_id(&output)?;
            let mut sim = simulator(netlist, temperature, DEFAULT_HISTORY_CAPACITY)?;
            let mut state = AnalysisState::default();
            state.arm_monte_carlo(&mut sim, MonteCarloConfig::new(node).with_runs(runs).with_seed(seed))?;
            while !state.run_monte_carlo_frame(&mut sim)? {}
            let stats = state
                .monte_carlo
                .as_ref()
                .and_then(|mc| mc.stats())
                .ok_or_else(|| SimError::InvalidSimulationParam {
                    message: "no Monte Carlo run produced a result".to_string(),
                })?;
            export::write_monte_carlo_csv(&mut out, stats)?;
        }
    }

    out.flush()?;
    Ok(())
}

/// Probe every named net when the netlist declares no probes.
fn probe_all_nets(circuit: &mut Circuit) -> Result<()> {
    if !circuit.probes().is_empty() {
        return Ok(());
    }
    let nets: Vec<(String, NodeId)> = circuit
        .nodes()
        .iter()
        .filter(|n| !n.id.is_ground())
        .map(|n| (n.name.clone(), n.id))
        .collect();
    for (name, id) in nets {
        circuit.add_probe(name, id)?;
    }
    Ok(())
}

fn simulator(netlist: Netlist, temperature: Option<f64>, history: usize) -> Result<Simulator> {
    let config = SimulatorConfig::new().with_history_capacity(history);
    let mut sim = Simulator::with_config(netlist.circuit, config);
    if let Some(celsius) = temperature {
        sim.set_temperature(celsius)?;
    }
    Ok(sim)
}

fn run_transient(sim: &mut Simulator, run: &Transient) -> Result<()> {
    let dt = match run.dt {
        Some(dt) => dt,
        None => sim.suggest_time_step(),
    };
    sim.set_time_step(dt)?;
    if run.op {
        sim.dc_operating_point()?;
    }
    for _ in 0..run.steps {
        sim.step()?;
    }
    info!("transient: {} steps of {:.3e} s", run.steps, dt);
    Ok(())
}

fn write_operating_point<W: Write>(out: &mut W, sim: &Simulator) -> Result<()> {
    let mut rows = Vec::new();
    for node in sim.circuit().nodes().iter().filter(|n| !n.id.is_ground()) {
        rows.push((format!("V({})", node.name), sim.node_voltage(node.id)?));
    }
    for component in sim.circuit().components() {
        if let Some(current) = sim.branch_current(component.id()) {
            rows.push((format!("I({})", component.name()), current));
        }
    }
    export::write_operating_point_csv(out, &rows)
}
