//! Linear passive components: Resistor, Capacitor, Inductor.

use num_complex::Complex64;

use crate::circuit::{ComponentId, NodeId};
use crate::solver::{AcContext, ComplexMnaSystem, MnaSystem, StampContext, MIN_CONDUCTANCE};

/// Smallest resistance used when stamping, so a 0 Ω part stays solvable.
pub const MIN_RESISTANCE: f64 = 1e-9;

/// A resistor component.
#[derive(Debug, Clone)]
pub struct Resistor {
    pub id: ComponentId,
    pub name: String,
    pub nodes: [NodeId; 2],
    pub resistance: f64,
}

impl Resistor {
    /// Create a new resistor.
    pub fn new(id: ComponentId, name: impl Into<String>, nodes: [NodeId; 2], resistance: f64) -> Self {
        Self {
            id,
            name: name.into(),
            nodes,
            resistance,
        }
    }

    /// Get the conductance (1/R).
    pub fn conductance(&self) -> f64 {
        1.0 / self.resistance.max(MIN_RESISTANCE)
    }

    pub fn stamp(&self, sys: &mut MnaSystem, ctx: &StampContext) {
        sys.stamp_conductance(
            ctx.index(self.nodes[0]),
            ctx.index(self.nodes[1]),
            self.conductance(),
        );
    }

    pub fn stamp_ac(&self, sys: &mut ComplexMnaSystem, ctx: &AcContext) {
        sys.stamp_conductance(
            ctx.index(self.nodes[0]),
            ctx.index(self.nodes[1]),
            Complex64::new(self.conductance(), 0.0),
        );
    }
}

/// A capacitor component.
///
/// Trapezoidal companion model:
///   i(n) = G·v(n) - I_eq,  G = 2C/dt,  I_eq = G·v(n-1) + i(n-1)
///
/// At DC the capacitor is open (only a leakage of `MIN_CONDUCTANCE`).
#[derive(Debug, Clone)]
pub struct Capacitor {
    pub id: ComponentId,
    pub name: String,
    pub nodes: [NodeId; 2],
    pub capacitance: f64,

    /// Voltage across the capacitor at the last accepted step
    pub v_prev: f64,
    /// Current through the capacitor at the last accepted step
    pub i_prev: f64,
}

impl Capacitor {
    /// Create a new capacitor.
    pub fn new(id: ComponentId, name: impl Into<String>, nodes: [NodeId; 2], capacitance: f64) -> Self {
        Self {
            id,
            name: name.into(),
            nodes,
            capacitance,
            v_prev: 0.0,
            i_prev: 0.0,
        }
    }

    /// Equivalent conductance of the companion model.
    pub fn conductance(&self, dt: f64) -> f64 {
        2.0 * self.capacitance / dt
    }

    /// History current I_eq of the companion model.
    pub fn history_current(&self, dt: f64) -> f64 {
        self.conductance(dt) * self.v_prev + self.i_prev
    }

    pub fn stamp(&self, sys: &mut MnaSystem, ctx: &StampContext) {
        let n1 = ctx.index(self.nodes[0]);
        let n2 = ctx.index(self.nodes[1]);
        if ctx.is_dc() {
            sys.stamp_conductance(n1, n2, MIN_CONDUCTANCE);
            return;
        }
        sys.stamp_conductance(n1, n2, self.conductance(ctx.dt));
        sys.stamp_current_source(n1, n2, -self.history_current(ctx.dt));
    }

    pub fn stamp_ac(&self, sys: &mut ComplexMnaSystem, ctx: &AcContext) {
        sys.stamp_conductance(
            ctx.index(self.nodes[0]),
            ctx.index(self.nodes[1]),
            Complex64::new(0.0, ctx.omega * self.capacitance),
        );
    }

    /// Update the state after an accepted transient step.
    pub fn update_state(&mut self, v_new: f64, dt: f64) {
        // i(n) = G·(v(n) - v(n-1)) - i(n-1)
        let g = self.conductance(dt);
        let i_new = g * (v_new - self.v_prev) - self.i_prev;
        self.v_prev = v_new;
        self.i_prev = i_new;
    }

    /// Seed the state from a DC operating point.
    pub fn set_operating_point(&mut self, v: f64) {
        self.v_prev = v;
        self.i_prev = 0.0;
    }

    pub fn reset(&mut self) {
        self.v_prev = 0.0;
        self.i_prev = 0.0;
    }
}

/// An inductor component.
///
/// Trapezoidal companion model with an explicit branch current i:
///   v(n) = R·i(n) - V_eq,  R = 2L/dt,  V_eq = R·i(n-1) + v(n-1)
///
/// At DC the branch equation degenerates to v = 0 (a short).
#[derive(Debug, Clone)]
pub struct Inductor {
    pub id: ComponentId,
    pub name: String,
    pub nodes: [NodeId; 2],
    pub inductance: f64,

    /// Current through the inductor at the last accepted step
    pub i_prev: f64,
    /// Voltage across the inductor at the last accepted step
    pub v_prev: f64,
}

impl Inductor {
    /// Create a new inductor.
    pub fn new(id: ComponentId, name: impl Into<String>, nodes: [NodeId; 2], inductance: f64) -> Self {
        Self {
            id,
            name: name.into(),
            nodes,
            inductance,
            i_prev: 0.0,
            v_prev: 0.0,
        }
    }

    /// Equivalent resistance of the companion model.
    pub fn resistance(&self, dt: f64) -> f64 {
        2.0 * self.inductance / dt
    }

    /// History voltage V_eq of the companion model.
    pub fn history_voltage(&self, dt: f64) -> f64 {
        self.resistance(dt) * self.i_prev + self.v_prev
    }

    pub fn stamp(&self, sys: &mut MnaSystem, ctx: &StampContext) {
        let Some(br) = ctx.branch(self.id) else { return };
        let n1 = ctx.index(self.nodes[0]);
        let n2 = ctx.index(self.nodes[1]);
        if ctx.is_dc() {
            sys.stamp_voltage_source(n1, n2, br, 0.0);
            return;
        }
        sys.stamp_voltage_source(n1, n2, br, -self.history_voltage(ctx.dt));
        sys.stamp_branch_impedance(br, self.resistance(ctx.dt));
    }

    pub fn stamp_ac(&self, sys: &mut ComplexMnaSystem, ctx: &AcContext) {
        let Some(br) = ctx.branch(self.id) else { return };
        sys.stamp_voltage_source(
            ctx.index(self.nodes[0]),
            ctx.index(self.nodes[1]),
            br,
            Complex64::new(0.0, 0.0),
        );
        sys.stamp_branch_impedance(br, Complex64::new(0.0, ctx.omega * self.inductance));
    }

    /// Update the state after an accepted transient step.
    pub fn update_state(&mut self, i_new: f64, dt: f64) {
        // v(n) = R·(i(n) - i(n-1)) - v(n-1)
        let r = self.resistance(dt);
        let v_new = r * (i_new - self.i_prev) - self.v_prev;
        self.i_prev = i_new;
        self.v_prev = v_new;
    }

    /// Seed the state from a DC operating point.
    pub fn set_operating_point(&mut self, i: f64) {
        self.i_prev = i;
        self.v_prev = 0.0;
    }

    pub fn reset(&mut self) {
        self.i_prev = 0.0;
        self.v_prev = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_resistor_conductance() {
        let r = Resistor::new(ComponentId(0), "R1", [NodeId(1), NodeId(0)], 1000.0);
        assert_relative_eq!(r.conductance(), 0.001);
    }

    #[test]
    fn test_zero_resistor_stays_finite() {
        let r = Resistor::new(ComponentId(0), "R1", [NodeId(1), NodeId(0)], 0.0);
        assert!(r.conductance().is_finite());
    }

    #[test]
    fn test_capacitor_companion() {
        let mut c = Capacitor::new(ComponentId(0), "C1", [NodeId(1), NodeId(0)], 1e-6);
        let dt = 1e-6;
        assert_relative_eq!(c.conductance(dt), 2.0);

        // A 1 mV jump in one step from rest.
        c.update_state(1e-3, dt);
        assert_relative_eq!(c.i_prev, 2e-3);
        assert_relative_eq!(c.history_current(dt), 2.0 * 1e-3 + 2e-3);
    }

    #[test]
    fn test_inductor_companion() {
        let mut l = Inductor::new(ComponentId(0), "L1", [NodeId(1), NodeId(0)], 1e-3);
        let dt = 1e-6;
        assert_relative_eq!(l.resistance(dt), 2000.0);
        l.set_operating_point(0.5);
        assert_relative_eq!(l.history_voltage(dt), 1000.0);
        // Holding the current leaves no voltage across the inductor.
        l.update_state(0.5, dt);
        assert_relative_eq!(l.v_prev, 0.0);
    }
}
