//! # Voltaic Core
//!
//! An interactive analog circuit simulator.
//!
//! This library provides:
//! - Modified Nodal Analysis (MNA) with Newton-Raphson for nonlinear devices
//! - DC operating point, transient stepping and small-signal AC (Bode) scans
//! - Linear, source, semiconductor, op-amp and control components
//! - Parametric sweeps, Monte Carlo tolerance runs, FFT with THD/SNR,
//!   scope measurements, math channels and CSV export
//! - A SPICE-flavoured netlist reader
//!
//! ## Architecture
//!
//! - [`circuit`] - Circuit graph, node map and validation
//! - [`components`] - Component models and their MNA stamps
//! - [`solver`] - MNA assembly, Newton-Raphson, the simulator and AC scans
//! - [`analysis`] - Sweeps, Monte Carlo, spectra, measurements, export
//! - [`netlist`] - Text netlist reader
//! - [`buffer`] - Bounded history containers
//!
//! ## Usage
//!
//! ```no_run
//! use voltaic_core::{netlist, Simulator};
//!
//! let netlist = netlist::parse_netlist("V1 in 0 sine 1 1k\nR1 in out 1k\nC1 out 0 100n\n.probe out\n")?;
//! let mut sim = Simulator::new(netlist.circuit);
//! sim.dc_operating_point()?;
//! for _ in 0..1000 {
//!     sim.step()?;
//! }
//! let trace = sim.probe_samples(0)?;
//! # Ok::<(), voltaic_core::SimError>(())
//! ```
//!
//! ## Circuit Simulation Method
//!
//! Wires are merged into nets, and each net other than ground gets one
//! voltage unknown. Voltage-type elements add a branch current unknown.
//! For each time step:
//!
//! 1. Assemble the system matrix A and source vector z
//! 2. Solve Ax = z for net voltages and branch currents
//! 3. For nonlinear elements, iterate using Newton-Raphson until convergence
//!
//! Reactive elements (C, L) are discretized using the trapezoidal rule.

pub mod analysis;
pub mod buffer;
pub mod circuit;
pub mod components;
pub mod error;
pub mod netlist;
pub mod solver;

// Re-export main types for convenience
pub use analysis::AnalysisState;
pub use circuit::Circuit;
pub use error::{Result, SimError};
pub use netlist::Netlist;
pub use solver::{FrequencySweeper, Simulator};

/// Boltzmann constant (J/K)
pub const BOLTZMANN: f64 = 1.380649e-23;

/// Elementary charge (C)
pub const ELECTRON_CHARGE: f64 = 1.602176634e-19;
