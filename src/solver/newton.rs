//! Newton-Raphson iteration for nonlinear components.

use log::{debug, trace, warn};

use crate::circuit::NodeMap;
use crate::components::Component;
use crate::error::{Result, SimError};

use super::mna::{assemble, MnaSystem, StampContext};
use super::{CONVERGENCE_TOLERANCE, MAX_ITERATIONS, RELATIVE_TOLERANCE};

/// A converged solution and the work it took.
#[derive(Debug, Clone)]
pub struct NewtonSolution {
    pub x: Vec<f64>,
    pub iterations: usize,
}

/// Newton-Raphson solver for nonlinear circuits.
#[derive(Debug, Clone)]
pub struct NewtonRaphson {
    /// Maximum iterations
    pub max_iterations: usize,
    /// Absolute convergence tolerance
    pub abstol: f64,
    /// Relative convergence tolerance
    pub reltol: f64,
}

impl Default for NewtonRaphson {
    fn default() -> Self {
        Self::new()
    }
}

impl NewtonRaphson {
    /// Create a new Newton-Raphson solver.
    pub fn new() -> Self {
        Self {
            max_iterations: MAX_ITERATIONS,
            abstol: CONVERGENCE_TOLERANCE,
            reltol: RELATIVE_TOLERANCE,
        }
    }

    /// Create a solver with custom limits.
    pub fn with_config(max_iterations: usize, abstol: f64, reltol: f64) -> Self {
        Self {
            max_iterations: max_iterations.max(1),
            abstol,
            reltol,
        }
    }

    /// Solve the circuit starting from the iterate in `ctx.x`.
    ///
    /// A circuit without nonlinear components takes a single linear solve.
    /// Nothing is committed: the caller decides what to do with the result.
    pub fn solve(&self, components: &[Component], ctx: StampContext) -> Result<NewtonSolution> {
        let nodes = ctx.nodes;
        let size = nodes.size();
        let mut sys = MnaSystem::new(size);
        let mut x = if ctx.x.len() == size {
            ctx.x.to_vec()
        } else {
            vec![0.0; size]
        };

        let nonlinear = components.iter().any(Component::is_nonlinear);
        if !nonlinear {
            assemble(&mut sys, components, &StampContext { x: &x, ..ctx });
            let x_new = solve_checked(&sys, nodes)?;
            return Ok(NewtonSolution { x: x_new, iterations: 1 });
        }

        let mut residual = f64::INFINITY;
        for iter in 0..self.max_iterations {
            assemble(&mut sys, components, &StampContext { x: &x, ..ctx });
            let x_new = solve_checked(&sys, nodes)?;

            let mut converged = true;
            residual = 0.0;
            for (new, old) in x_new.iter().zip(&x) {
                let diff = (new - old).abs();
                residual = residual.max(diff);
                if diff > self.abstol + self.reltol * new.abs() {
                    converged = false;
                }
            }
            trace!("newton iteration {}: max |dx| = {:.3e}", iter + 1, residual);

            x = x_new;
            if converged {
                debug!("newton converged in {} iterations", iter + 1);
                return Ok(NewtonSolution { x, iterations: iter + 1 });
            }
        }

        warn!(
            "newton failed to converge after {} iterations (residual {:.3e})",
            self.max_iterations, residual
        );
        Err(SimError::convergence_failure(self.max_iterations, residual))
    }
}

/// Solve one linear system, naming the offending unknown on failure.
fn solve_checked(sys: &MnaSystem, nodes: &NodeMap) -> Result<Vec<f64>> {
    let x = sys.solve().map_err(|err| match err {
        SimError::SingularMatrix { index, .. } => SimError::SingularMatrix {
            index,
            unknown: nodes.describe(index),
        },
        other => other,
    })?;

    if let Some((i, &value)) = x.iter().enumerate().find(|(_, v)| !v.is_finite()) {
        return Err(SimError::NumericalOverflow {
            unknown: nodes.describe(i),
            value,
        });
    }
    Ok(x)
}
