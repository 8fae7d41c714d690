//! Error types for the Voltaic circuit simulator.
//!
//! This module provides a unified error type [`SimError`] that covers
//! all error conditions that can occur while building a circuit, solving it,
//! running analyses on the results, and reading netlists.

use thiserror::Error;

use crate::circuit::{ComponentId, NodeId};

/// Result type alias using [`SimError`].
pub type Result<T> = std::result::Result<T, SimError>;

/// Unified error type for all Voltaic operations.
#[derive(Error, Debug)]
pub enum SimError {
    // ============ Netlist Errors ============
    /// Error while reading a netlist line
    #[error("Netlist error at line {line}: {message}")]
    Netlist { line: usize, message: String },

    // ============ Circuit Errors ============
    /// Node not found in circuit
    #[error("Node {node} not found in circuit")]
    NodeNotFound { node: NodeId },

    /// Node name not found in circuit
    #[error("Node '{name}' not found in circuit")]
    NodeNameNotFound { name: String },

    /// Component not found in circuit
    #[error("Component {id} not found in circuit")]
    ComponentNotFound { id: ComponentId },

    /// Component name not found in circuit
    #[error("Component '{name}' not found in circuit")]
    ComponentNameNotFound { name: String },

    /// Probe index out of range
    #[error("Probe #{index} does not exist")]
    ProbeNotFound { index: usize },

    /// Duplicate component name
    #[error("Duplicate component name '{name}'")]
    DuplicateComponent { name: String },

    /// Invalid parameter value or parameter not supported by a component
    #[error("Invalid parameter '{param}' for component '{component}': {message}")]
    InvalidParameter {
        component: String,
        param: String,
        message: String,
    },

    /// Circuit has nothing to simulate
    #[error("Circuit has no components")]
    EmptyCircuit,

    /// Two fixed-voltage constraints fight over the same nodes
    #[error("Short circuit through ideal voltage constraints: {}", format_ids(.components))]
    ShortCircuit { components: Vec<ComponentId> },

    /// Unknown vector exceeds the solver bound
    #[error("Circuit needs {size} unknowns, the solver supports at most {max}")]
    CircuitTooLarge { size: usize, max: usize },

    // ============ Simulation Errors ============
    /// Matrix is singular and cannot be solved
    #[error("Singular matrix at {unknown} - check for a floating node or conflicting sources")]
    SingularMatrix { index: usize, unknown: String },

    /// Newton-Raphson iteration did not converge
    #[error("Newton-Raphson did not converge after {iterations} iterations (residual: {residual:.2e})")]
    ConvergenceFailure { iterations: usize, residual: f64 },

    /// Numerical overflow detected
    #[error("Numerical overflow detected at {unknown} (value: {value:.2e})")]
    NumericalOverflow { unknown: String, value: f64 },

    /// Invalid simulation parameter
    #[error("Invalid simulation parameter: {message}")]
    InvalidSimulationParam { message: String },

    // ============ Analysis Errors ============
    /// Sweep bounds or point count cannot produce a sweep
    #[error("Invalid sweep range: {message}")]
    InvalidSweepRange { message: String },

    /// A frequency sweep is already running
    #[error("A frequency sweep is already in progress")]
    SweepInProgress,

    /// The frequency sweep was cancelled by its owner
    #[error("Frequency sweep cancelled")]
    SweepCancelled,

    // ============ I/O Errors ============
    /// Error reading a netlist file
    #[error("Failed to read netlist file '{path}': {source}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Error writing exported data
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn format_ids(ids: &[ComponentId]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl SimError {
    /// Create a netlist error
    pub fn netlist(line: usize, message: impl Into<String>) -> Self {
        Self::Netlist {
            line,
            message: message.into(),
        }
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter(
        component: impl Into<String>,
        param: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidParameter {
            component: component.into(),
            param: param.into(),
            message: message.into(),
        }
    }

    /// Create a convergence failure error
    pub fn convergence_failure(iterations: usize, residual: f64) -> Self {
        Self::ConvergenceFailure {
            iterations,
            residual,
        }
    }

    /// Create a sweep range error
    pub fn sweep_range(message: impl Into<String>) -> Self {
        Self::InvalidSweepRange {
            message: message.into(),
        }
    }

    /// True for errors caused by the circuit's topology rather than numerics.
    pub fn is_topology_error(&self) -> bool {
        matches!(
            self,
            Self::ShortCircuit { .. } | Self::SingularMatrix { .. } | Self::CircuitTooLarge { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_circuit_message_lists_components() {
        let err = SimError::ShortCircuit {
            components: vec![ComponentId(2), ComponentId(5)],
        };
        assert_eq!(
            err.to_string(),
            "Short circuit through ideal voltage constraints: C2, C5"
        );
        assert!(err.is_topology_error());
    }
}
