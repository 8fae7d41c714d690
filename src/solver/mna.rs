//! MNA system assembly.
//!
//! [`MnaSystem`] holds `A` and `z` for one Newton iteration (real) or one
//! frequency point (complex). Components stamp into it through the helpers
//! below, given a [`StampContext`] or [`AcContext`] describing the present
//! iterate.

use num_complex::Complex64;

use crate::circuit::{ComponentId, NodeId, NodeMap};
use crate::components::Component;
use crate::error::Result;

use super::linalg::{self, DenseMatrix, Scalar};

/// Which companion models the devices should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisMode {
    /// Sources at t = 0, capacitors open, inductors shorted.
    DcOperatingPoint,
    /// Trapezoidal companions with the configured time step.
    Transient,
}

/// Everything a device needs to stamp itself for one Newton iteration.
#[derive(Debug, Clone, Copy)]
pub struct StampContext<'a> {
    pub nodes: &'a NodeMap,
    /// Current Newton iterate (node voltages then branch currents)
    pub x: &'a [f64],
    pub time: f64,
    pub dt: f64,
    pub mode: AnalysisMode,
    /// kT/q at the simulation temperature
    pub thermal_voltage: f64,
}

impl<'a> StampContext<'a> {
    /// Matrix index of a node (None for ground).
    pub fn index(&self, node: NodeId) -> Option<usize> {
        self.nodes.index(node)
    }

    /// Voltage of a node in the current iterate.
    pub fn voltage(&self, node: NodeId) -> f64 {
        self.nodes.index(node).map(|i| self.x[i]).unwrap_or(0.0)
    }

    /// Branch index of a component that owns a branch current.
    pub fn branch(&self, id: ComponentId) -> Option<usize> {
        self.nodes.branch(id)
    }

    /// True when energy-storage devices must use their DC companion.
    pub fn is_dc(&self) -> bool {
        self.mode == AnalysisMode::DcOperatingPoint || self.dt <= 0.0
    }
}

/// Small-signal stamping context for one frequency point.
#[derive(Debug, Clone, Copy)]
pub struct AcContext<'a> {
    pub nodes: &'a NodeMap,
    /// DC operating point the nonlinear devices are linearized about
    pub x_op: &'a [f64],
    /// Angular frequency (rad/s)
    pub omega: f64,
    /// Source driven with a unit AC stimulus; all others are zeroed
    pub excitation: ComponentId,
    pub thermal_voltage: f64,
}

impl<'a> AcContext<'a> {
    pub fn index(&self, node: NodeId) -> Option<usize> {
        self.nodes.index(node)
    }

    /// Operating-point voltage of a node.
    pub fn voltage(&self, node: NodeId) -> f64 {
        self.nodes.index(node).map(|i| self.x_op[i]).unwrap_or(0.0)
    }

    pub fn branch(&self, id: ComponentId) -> Option<usize> {
        self.nodes.branch(id)
    }

    /// AC stimulus amplitude for a source.
    pub fn stimulus(&self, id: ComponentId) -> f64 {
        if id == self.excitation {
            1.0
        } else {
            0.0
        }
    }
}

/// Terminal currents of a nonlinear device and their Jacobian.
///
/// `current[k]` is the current flowing from the node at terminal `k` into
/// the device; `jacobian[k][j]` is its derivative with respect to the
/// voltage of terminal `j`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TerminalCurrents<const N: usize> {
    pub current: [f64; N],
    pub jacobian: [[f64; N]; N],
}

impl<const N: usize> TerminalCurrents<N> {
    pub fn zero() -> Self {
        Self {
            current: [0.0; N],
            jacobian: [[0.0; N]; N],
        }
    }
}

/// MNA matrix system Ax = z.
#[derive(Debug, Clone)]
pub struct MnaSystem<T = f64> {
    /// System matrix A
    pub a: DenseMatrix<T>,
    /// Source vector z
    pub z: Vec<T>,
}

/// Complex system used by the AC sweep.
pub type ComplexMnaSystem = MnaSystem<Complex64>;

impl<T: Scalar> MnaSystem<T> {
    /// Create a new MNA system of the given dimension.
    pub fn new(size: usize) -> Self {
        Self {
            a: DenseMatrix::new(size),
            z: vec![T::zero(); size],
        }
    }

    /// Matrix dimension.
    pub fn size(&self) -> usize {
        self.z.len()
    }

    /// Clear the matrix and vectors to zero.
    pub fn clear(&mut self) {
        self.a.clear();
        self.z.fill(T::zero());
    }

    /// Add to matrix element at (row, col).
    pub fn add(&mut self, row: usize, col: usize, value: T) {
        self.a.add(row, col, value);
    }

    /// Add to source vector element.
    pub fn add_source(&mut self, row: usize, value: T) {
        self.z[row] += value;
    }

    /// Stamp a conductance (or complex admittance) between two nodes.
    ///   A[n1,n1] += G, A[n2,n2] += G, A[n1,n2] -= G, A[n2,n1] -= G
    pub fn stamp_conductance(&mut self, n1: Option<usize>, n2: Option<usize>, g: T) {
        if let Some(i) = n1 {
            self.add(i, i, g);
        }
        if let Some(j) = n2 {
            self.add(j, j, g);
        }
        if let (Some(i), Some(j)) = (n1, n2) {
            self.add(i, j, -g);
            self.add(j, i, -g);
        }
    }

    /// Stamp a current source between two nodes.
    /// Current flows from n+ through the source to n-.
    pub fn stamp_current_source(&mut self, n_pos: Option<usize>, n_neg: Option<usize>, current: T) {
        if let Some(i) = n_pos {
            self.add_source(i, -current);
        }
        if let Some(j) = n_neg {
            self.add_source(j, current);
        }
    }

    /// Stamp a voltage source between two nodes with branch current at index br.
    /// V[n+] - V[n-] = E; the branch current flows from n+ through the source.
    pub fn stamp_voltage_source(
        &mut self,
        n_pos: Option<usize>,
        n_neg: Option<usize>,
        br: usize,
        voltage: T,
    ) {
        let one = T::from(1.0);
        if let Some(i) = n_pos {
            self.add(br, i, one);
            self.add(i, br, one);
        }
        if let Some(j) = n_neg {
            self.add(br, j, -one);
            self.add(j, br, -one);
        }
        self.add_source(br, voltage);
    }

    /// Add a series impedance term to a branch equation: V[n+] - V[n-] - Z·I = E.
    pub fn stamp_branch_impedance(&mut self, br: usize, impedance: T) {
        self.add(br, br, -impedance);
    }

    /// Stamp a VCCS (Voltage-Controlled Current Source).
    /// I = gm * (V[ctrl+] - V[ctrl-]) flowing from out+ to out- through the source.
    pub fn stamp_vccs(
        &mut self,
        n_out_pos: Option<usize>,
        n_out_neg: Option<usize>,
        n_ctrl_pos: Option<usize>,
        n_ctrl_neg: Option<usize>,
        gm: T,
    ) {
        if let (Some(i), Some(k)) = (n_out_pos, n_ctrl_pos) {
            self.add(i, k, gm);
        }
        if let (Some(i), Some(l)) = (n_out_pos, n_ctrl_neg) {
            self.add(i, l, -gm);
        }
        if let (Some(j), Some(k)) = (n_out_neg, n_ctrl_pos) {
            self.add(j, k, -gm);
        }
        if let (Some(j), Some(l)) = (n_out_neg, n_ctrl_neg) {
            self.add(j, l, gm);
        }
    }

    /// Stamp the Jacobian of a nonlinear device (small-signal part only).
    pub fn stamp_jacobian<const N: usize>(
        &mut self,
        rows: [Option<usize>; N],
        jacobian: &[[f64; N]; N],
    ) {
        for (k, row) in rows.iter().enumerate() {
            let Some(r) = *row else { continue };
            for (j, col) in rows.iter().enumerate() {
                if let Some(c) = *col {
                    if jacobian[k][j] != 0.0 {
                        self.add(r, c, T::from(jacobian[k][j]));
                    }
                }
            }
        }
    }

    /// Solve the assembled system.
    pub fn solve(&self) -> Result<Vec<T>> {
        linalg::solve(&self.a, &self.z)
    }
}

impl MnaSystem<f64> {
    /// Stamp a nonlinear device linearized at terminal voltages `v`:
    /// I_k ≈ I_k(v) + Σ_j J_kj (V_j - v_j).
    pub fn stamp_linearized<const N: usize>(
        &mut self,
        rows: [Option<usize>; N],
        v: [f64; N],
        device: &TerminalCurrents<N>,
    ) {
        self.stamp_jacobian(rows, &device.jacobian);
        for k in 0..N {
            let Some(r) = rows[k] else { continue };
            let mut i_eq = device.current[k];
            for j in 0..N {
                i_eq -= device.jacobian[k][j] * v[j];
            }
            self.add_source(r, -i_eq);
        }
    }
}

/// Clear the system and stamp every component for one Newton iteration.
pub fn assemble(sys: &mut MnaSystem, components: &[Component], ctx: &StampContext) {
    sys.clear();
    for component in components {
        component.stamp(sys, ctx);
    }
}

/// Clear the complex system and stamp every small-signal model.
pub fn assemble_ac(sys: &mut ComplexMnaSystem, components: &[Component], ctx: &AcContext) {
    sys.clear();
    for component in components {
        component.stamp_ac(sys, ctx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_divider_by_hand() {
        // V1 = 10 V at node 0, R1 1k node0-node1, R2 1k node1-gnd
        let mut sys = MnaSystem::<f64>::new(3);
        sys.stamp_voltage_source(Some(0), None, 2, 10.0);
        sys.stamp_conductance(Some(0), Some(1), 1e-3);
        sys.stamp_conductance(Some(1), None, 1e-3);
        let x = sys.solve().unwrap();
        assert_relative_eq!(x[0], 10.0, epsilon = 1e-12);
        assert_relative_eq!(x[1], 5.0, epsilon = 1e-12);
        // Source delivers 5 mA, so the branch current (into n+) is -5 mA.
        assert_relative_eq!(x[2], -5e-3, epsilon = 1e-12);
    }

    #[test]
    fn test_linearized_stamp_of_linear_device_is_exact() {
        // A "nonlinear" 1 kOhm resistor expressed through terminal currents.
        let g = 1e-3;
        let v = [3.0, 1.0];
        let device = TerminalCurrents {
            current: [g * (v[0] - v[1]), -g * (v[0] - v[1])],
            jacobian: [[g, -g], [-g, g]],
        };
        let mut sys = MnaSystem::<f64>::new(1);
        sys.stamp_linearized([Some(0), None], v, &device);
        sys.stamp_current_source(None, Some(0), 1e-3);
        let x = sys.solve().unwrap();
        assert_relative_eq!(x[0], 1.0, epsilon = 1e-12);
    }
}
