//! MNA (Modified Nodal Analysis) solver.
//!
//! This module provides the numerical engine for circuit simulation.
//!
//! ## Modified Nodal Analysis
//!
//! MNA assembles a system of equations Ax = z where:
//! - x contains net voltages and branch currents
//! - A is the conductance/coefficient matrix
//! - z is the source vector
//!
//! The matrix structure is:
//! ```text
//! [ G   B ] [ v ]   [ i ]
//! [ C   D ] [ j ] = [ e ]
//! ```
//!
//! where:
//! - G is the conductance matrix (node equations)
//! - B, C connect voltage-type branches to nodes
//! - D holds series impedances of branches (inductor companions, op-amp gain stage)
//! - v is the vector of net voltages
//! - j is the vector of branch currents
//! - i is the sum of current sources into each node
//! - e is the vector of branch source values
//!
//! Nonlinear devices are linearized around the current iterate and the
//! system is re-solved until the Newton-Raphson update settles. The same
//! assembly with complex admittances gives the small-signal AC response.

mod ac;
pub mod linalg;
mod mna;
mod newton;
mod simulator;
mod sweep_task;

pub use ac::{run_bode, BodeConfig, BodePoint, MAX_BODE_POINTS};
pub use mna::{
    assemble, assemble_ac, AcContext, AnalysisMode, ComplexMnaSystem, MnaSystem, StampContext,
    TerminalCurrents,
};
pub use newton::{NewtonRaphson, NewtonSolution};
pub use simulator::{
    thermal_voltage, RunMode, SimulationState, Simulator, SimulatorConfig, SimulatorSnapshot,
    DEFAULT_HISTORY_CAPACITY, DEFAULT_TEMPERATURE, DEFAULT_TIME_STEP,
};
pub use sweep_task::{CancelToken, FrequencySweeper, SweepEvent, SweepStatus};

/// Absolute convergence tolerance for Newton-Raphson iteration.
pub const CONVERGENCE_TOLERANCE: f64 = 1e-6;

/// Relative convergence tolerance for Newton-Raphson iteration.
pub const RELATIVE_TOLERANCE: f64 = 1e-6;

/// Maximum Newton-Raphson iterations per solve.
pub const MAX_ITERATIONS: usize = 100;

/// Minimum conductance to prevent singular matrix.
pub const MIN_CONDUCTANCE: f64 = 1e-12;

/// Largest unknown vector the dense solver accepts.
pub const MAX_UNKNOWNS: usize = 512;
