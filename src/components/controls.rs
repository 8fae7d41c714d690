//! Control components: Potentiometer, Switch and Fuse.

use num_complex::Complex64;

use crate::circuit::{ComponentId, NodeId};
use crate::solver::{AcContext, ComplexMnaSystem, MnaSystem, StampContext};

/// A potentiometer component.
///
/// Modeled as two resistors in series with a wiper tap:
///   n1 ----[R1]---- wiper ----[R2]---- n2
///
/// where R1 = position * total_resistance
/// and   R2 = (1 - position) * total_resistance
#[derive(Debug, Clone)]
pub struct Potentiometer {
    pub id: ComponentId,
    pub name: String,
    pub nodes: [NodeId; 3], // [n1, wiper, n2]
    pub total_resistance: f64,
    /// Position from 0.0 to 1.0
    pub position: f64,
}

impl Potentiometer {
    /// Smallest resistance either half may reach.
    pub const MIN_SEGMENT: f64 = 0.1;

    /// Create a new potentiometer.
    pub fn new(
        id: ComponentId,
        name: impl Into<String>,
        nodes: [NodeId; 3],
        total_resistance: f64,
        position: f64,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            nodes,
            total_resistance,
            position: position.clamp(0.0, 1.0),
        }
    }

    /// Get the resistance from n1 to wiper.
    pub fn r1(&self) -> f64 {
        (self.position * self.total_resistance).max(Self::MIN_SEGMENT)
    }

    /// Get the resistance from wiper to n2.
    pub fn r2(&self) -> f64 {
        ((1.0 - self.position) * self.total_resistance).max(Self::MIN_SEGMENT)
    }

    /// Set the wiper position.
    pub fn set_position(&mut self, position: f64) {
        self.position = position.clamp(0.0, 1.0);
    }

    pub fn stamp(&self, sys: &mut MnaSystem, ctx: &StampContext) {
        let [n1, wiper, n2] = self.nodes.map(|n| ctx.index(n));
        sys.stamp_conductance(n1, wiper, 1.0 / self.r1());
        sys.stamp_conductance(wiper, n2, 1.0 / self.r2());
    }

    pub fn stamp_ac(&self, sys: &mut ComplexMnaSystem, ctx: &AcContext) {
        let [n1, wiper, n2] = self.nodes.map(|n| ctx.index(n));
        sys.stamp_conductance(n1, wiper, Complex64::new(1.0 / self.r1(), 0.0));
        sys.stamp_conductance(wiper, n2, Complex64::new(1.0 / self.r2(), 0.0));
    }
}

/// A switch component.
///
/// Modeled as a resistance:
/// - Closed: very small resistance (0.01 ohms)
/// - Open: very large resistance (1e9 ohms)
#[derive(Debug, Clone)]
pub struct Switch {
    pub id: ComponentId,
    pub name: String,
    pub nodes: [NodeId; 2],
    pub closed: bool,
}

impl Switch {
    /// Resistance when closed.
    pub const R_CLOSED: f64 = 0.01;
    /// Resistance when open.
    pub const R_OPEN: f64 = 1e9;

    /// Create a new switch.
    pub fn new(id: ComponentId, name: impl Into<String>, nodes: [NodeId; 2], closed: bool) -> Self {
        Self {
            id,
            name: name.into(),
            nodes,
            closed,
        }
    }

    /// Get the current resistance.
    pub fn resistance(&self) -> f64 {
        if self.closed {
            Self::R_CLOSED
        } else {
            Self::R_OPEN
        }
    }

    /// Toggle the switch state.
    pub fn toggle(&mut self) {
        self.closed = !self.closed;
    }

    pub fn stamp(&self, sys: &mut MnaSystem, ctx: &StampContext) {
        sys.stamp_conductance(
            ctx.index(self.nodes[0]),
            ctx.index(self.nodes[1]),
            1.0 / self.resistance(),
        );
    }

    pub fn stamp_ac(&self, sys: &mut ComplexMnaSystem, ctx: &AcContext) {
        sys.stamp_conductance(
            ctx.index(self.nodes[0]),
            ctx.index(self.nodes[1]),
            Complex64::new(1.0 / self.resistance(), 0.0),
        );
    }
}

/// A fuse that opens once its I²t budget above the rated current is spent.
///
/// Heat accumulates as `(i² - rating²)·dt` per accepted step and never drops
/// below zero; once it exceeds `i2t` the fuse blows and stays open until
/// the simulation is reset.
#[derive(Debug, Clone)]
pub struct Fuse {
    pub id: ComponentId,
    pub name: String,
    pub nodes: [NodeId; 2],
    /// Cold resistance (Ω)
    pub resistance: f64,
    /// Rated current (A)
    pub rating: f64,
    /// Melting integral (A²s)
    pub i2t: f64,

    /// Accumulated excess I²t
    pub heat: f64,
    pub blown: bool,
}

impl Fuse {
    pub fn new(id: ComponentId, name: impl Into<String>, nodes: [NodeId; 2], rating: f64) -> Self {
        Self {
            id,
            name: name.into(),
            nodes,
            resistance: 0.05,
            rating,
            i2t: 1e-3,
            heat: 0.0,
            blown: false,
        }
    }

    pub fn with_i2t(mut self, i2t: f64) -> Self {
        self.i2t = i2t;
        self
    }

    /// Present resistance, [`Switch::R_OPEN`] once blown.
    pub fn effective_resistance(&self) -> f64 {
        if self.blown {
            Switch::R_OPEN
        } else {
            self.resistance.max(1e-6)
        }
    }

    /// Accumulate heating for one accepted step with voltage `v` across the fuse.
    pub fn update_state(&mut self, v: f64, dt: f64) {
        if self.blown {
            return;
        }
        let i = v / self.effective_resistance();
        self.heat = (self.heat + (i * i - self.rating * self.rating) * dt).max(0.0);
        if self.heat > self.i2t {
            self.blown = true;
        }
    }

    pub fn reset(&mut self) {
        self.heat = 0.0;
        self.blown = false;
    }

    pub fn stamp(&self, sys: &mut MnaSystem, ctx: &StampContext) {
        sys.stamp_conductance(
            ctx.index(self.nodes[0]),
            ctx.index(self.nodes[1]),
            1.0 / self.effective_resistance(),
        );
    }

    pub fn stamp_ac(&self, sys: &mut ComplexMnaSystem, ctx: &AcContext) {
        sys.stamp_conductance(
            ctx.index(self.nodes[0]),
            ctx.index(self.nodes[1]),
            Complex64::new(1.0 / self.effective_resistance(), 0.0),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_potentiometer_split() {
        let mut p = Potentiometer::new(ComponentId(0), "P1", [NodeId(1), NodeId(2), NodeId(0)], 10e3, 0.25);
        assert_relative_eq!(p.r1(), 2500.0);
        assert_relative_eq!(p.r2(), 7500.0);
        p.set_position(1.5);
        assert_relative_eq!(p.r2(), Potentiometer::MIN_SEGMENT);
    }

    #[test]
    fn test_switch_toggle() {
        let mut s = Switch::new(ComponentId(0), "S1", [NodeId(1), NodeId(0)], true);
        assert_eq!(s.resistance(), Switch::R_CLOSED);
        s.toggle();
        assert_eq!(s.resistance(), Switch::R_OPEN);
    }

    #[test]
    fn test_fuse_survives_rated_current() {
        let mut f = Fuse::new(ComponentId(0), "F1", [NodeId(1), NodeId(0)], 1.0);
        let v = 0.9 * f.resistance;
        for _ in 0..10_000 {
            f.update_state(v, 1e-3);
        }
        assert!(!f.blown);
        assert_eq!(f.heat, 0.0);
    }

    #[test]
    fn test_fuse_blows_on_overload() {
        let mut f = Fuse::new(ComponentId(0), "F1", [NodeId(1), NodeId(0)], 1.0).with_i2t(0.0305);
        // 2 A: excess 3 A², so 3e-3 A²s per step
        let v = 2.0 * f.resistance;
        let mut steps = 0;
        while !f.blown && steps < 1000 {
            f.update_state(v, 1e-3);
            steps += 1;
        }
        assert!(f.blown);
        assert_eq!(steps, 11);
        assert_eq!(f.effective_resistance(), Switch::R_OPEN);
        f.reset();
        assert!(!f.blown);
    }
}
