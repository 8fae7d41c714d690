//! Component models for circuit simulation.
//!
//! This module provides models for all supported circuit components:
//! - Linear: Resistor, Capacitor, Inductor
//! - Sources: DC voltage/current sources, function generator, noise source
//! - Nonlinear: Diode family, BJT, MOSFET, Op-Amp
//! - Controls: Potentiometer, Switch, Fuse
//!
//! Each component stamps its contribution into the MNA system for the
//! current Newton iterate, and its small-signal model into the complex
//! system of an AC sweep.

mod bjt;
mod controls;
mod diode;
mod linear;
mod mosfet;
mod opamp;
mod sources;
pub mod waveform;

pub use bjt::{Bjt, BjtParams, BjtType};
pub use controls::{Fuse, Potentiometer, Switch};
pub use diode::{Diode, DiodeKind, DiodeParams, MAX_EXPONENT};
pub use linear::{Capacitor, Inductor, Resistor, MIN_RESISTANCE};
pub use mosfet::{Mosfet, MosfetParams, MosfetType};
pub use opamp::{OpAmp, OpAmpParams};
pub use sources::{CurrentSource, FunctionGenerator, NoiseSource, VoltageSource};
pub use waveform::{RampMode, SourceSweep, SweepTarget, WaveShape};

use std::fmt;

use crate::circuit::{ComponentId, NodeId, NodeMap};
use crate::error::{Result, SimError};
use crate::solver::{AcContext, ComplexMnaSystem, MnaSystem, StampContext};

/// A value a sweep, a tolerance run or the editor can change on a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterKind {
    Resistance,
    Capacitance,
    Inductance,
    Voltage,
    Current,
    Frequency,
    /// Ambient temperature; owned by the simulator, not by a component
    Temperature,
}

impl ParameterKind {
    /// Parse a parameter name.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "r" | "resistance" => Some(Self::Resistance),
            "c" | "capacitance" => Some(Self::Capacitance),
            "l" | "inductance" => Some(Self::Inductance),
            "v" | "voltage" | "amplitude" => Some(Self::Voltage),
            "i" | "current" => Some(Self::Current),
            "f" | "freq" | "frequency" => Some(Self::Frequency),
            "t" | "temp" | "temperature" => Some(Self::Temperature),
            _ => None,
        }
    }

    /// True for quantities that must not go negative.
    pub fn is_passive(self) -> bool {
        matches!(self, Self::Resistance | Self::Capacitance | Self::Inductance)
    }
}

impl fmt::Display for ParameterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Resistance => "resistance",
            Self::Capacitance => "capacitance",
            Self::Inductance => "inductance",
            Self::Voltage => "voltage",
            Self::Current => "current",
            Self::Frequency => "frequency",
            Self::Temperature => "temperature",
        };
        f.write_str(s)
    }
}

/// A circuit component.
#[derive(Debug, Clone)]
pub enum Component {
    Resistor(Resistor),
    Capacitor(Capacitor),
    Inductor(Inductor),
    VoltageSource(VoltageSource),
    CurrentSource(CurrentSource),
    FunctionGenerator(FunctionGenerator),
    NoiseSource(NoiseSource),
    Diode(Diode),
    Bjt(Bjt),
    Mosfet(Mosfet),
    OpAmp(OpAmp),
    Potentiometer(Potentiometer),
    Switch(Switch),
    Fuse(Fuse),
}

macro_rules! impl_from_component {
    ($($variant:ident),* $(,)?) => {
        $(
            impl From<$variant> for Component {
                fn from(c: $variant) -> Self {
                    Component::$variant(c)
                }
            }
        )*
    };
}

impl_from_component!(
    Resistor,
    Capacitor,
    Inductor,
    VoltageSource,
    CurrentSource,
    FunctionGenerator,
    NoiseSource,
    Diode,
    Bjt,
    Mosfet,
    OpAmp,
    Potentiometer,
    Switch,
    Fuse,
);

impl Component {
    /// Get the component ID.
    pub fn id(&self) -> ComponentId {
        match self {
            Component::Resistor(r) => r.id,
            Component::Capacitor(c) => c.id,
            Component::Inductor(l) => l.id,
            Component::VoltageSource(v) => v.id,
            Component::CurrentSource(i) => i.id,
            Component::FunctionGenerator(g) => g.id,
            Component::NoiseSource(n) => n.id,
            Component::Diode(d) => d.id,
            Component::Bjt(q) => q.id,
            Component::Mosfet(m) => m.id,
            Component::OpAmp(o) => o.id,
            Component::Potentiometer(p) => p.id,
            Component::Switch(s) => s.id,
            Component::Fuse(f) => f.id,
        }
    }

    /// Get the component name.
    pub fn name(&self) -> &str {
        match self {
            Component::Resistor(r) => &r.name,
            Component::Capacitor(c) => &c.name,
            Component::Inductor(l) => &l.name,
            Component::VoltageSource(v) => &v.name,
            Component::CurrentSource(i) => &i.name,
            Component::FunctionGenerator(g) => &g.name,
            Component::NoiseSource(n) => &n.name,
            Component::Diode(d) => &d.name,
            Component::Bjt(q) => &q.name,
            Component::Mosfet(m) => &m.name,
            Component::OpAmp(o) => &o.name,
            Component::Potentiometer(p) => &p.name,
            Component::Switch(s) => &s.name,
            Component::Fuse(f) => &f.name,
        }
    }

    /// Terminal-to-node bindings, in the component's terminal order.
    pub fn nodes(&self) -> &[NodeId] {
        match self {
            Component::Resistor(r) => &r.nodes,
            Component::Capacitor(c) => &c.nodes,
            Component::Inductor(l) => &l.nodes,
            Component::VoltageSource(v) => &v.nodes,
            Component::CurrentSource(i) => &i.nodes,
            Component::FunctionGenerator(g) => &g.nodes,
            Component::NoiseSource(n) => &n.nodes,
            Component::Diode(d) => &d.nodes,
            Component::Bjt(q) => &q.nodes,
            Component::Mosfet(m) => &m.nodes,
            Component::OpAmp(o) => &o.nodes,
            Component::Potentiometer(p) => &p.nodes,
            Component::Switch(s) => &s.nodes,
            Component::Fuse(f) => &f.nodes,
        }
    }

    /// Check if this component is nonlinear (requires Newton-Raphson iteration).
    pub fn is_nonlinear(&self) -> bool {
        matches!(
            self,
            Component::Diode(_) | Component::Bjt(_) | Component::Mosfet(_) | Component::OpAmp(_)
        )
    }

    /// True when the component owns an extra unknown after the node voltages.
    pub fn needs_branch(&self) -> bool {
        match self {
            Component::Inductor(_) | Component::OpAmp(_) => true,
            Component::VoltageSource(v) => v.is_ideal(),
            Component::FunctionGenerator(g) => g.is_ideal(),
            Component::NoiseSource(n) => n.is_ideal(),
            _ => false,
        }
    }

    /// True when the component pins the voltage between its two terminals.
    /// Inductors only do so at DC.
    pub fn is_voltage_constraint(&self, dc: bool) -> bool {
        match self {
            Component::Inductor(_) => dc,
            Component::VoltageSource(v) => v.is_ideal(),
            Component::FunctionGenerator(g) => g.is_ideal(),
            Component::NoiseSource(n) => n.is_ideal(),
            _ => false,
        }
    }

    /// True for independent sources that can drive an AC sweep.
    pub fn is_source(&self) -> bool {
        matches!(
            self,
            Component::VoltageSource(_)
                | Component::CurrentSource(_)
                | Component::FunctionGenerator(_)
                | Component::NoiseSource(_)
        )
    }

    /// Stamp into the real MNA system for the current Newton iterate.
    pub fn stamp(&self, sys: &mut MnaSystem, ctx: &StampContext) {
        match self {
            Component::Resistor(r) => r.stamp(sys, ctx),
            Component::Capacitor(c) => c.stamp(sys, ctx),
            Component::Inductor(l) => l.stamp(sys, ctx),
            Component::VoltageSource(v) => v.stamp(sys, ctx),
            Component::CurrentSource(i) => i.stamp(sys, ctx),
            Component::FunctionGenerator(g) => g.stamp(sys, ctx),
            Component::NoiseSource(n) => n.stamp(sys, ctx),
            Component::Diode(d) => d.stamp(sys, ctx),
            Component::Bjt(q) => q.stamp(sys, ctx),
            Component::Mosfet(m) => m.stamp(sys, ctx),
            Component::OpAmp(o) => o.stamp(sys, ctx),
            Component::Potentiometer(p) => p.stamp(sys, ctx),
            Component::Switch(s) => s.stamp(sys, ctx),
            Component::Fuse(f) => f.stamp(sys, ctx),
        }
    }

    /// Stamp the small-signal model into the complex system.
    pub fn stamp_ac(&self, sys: &mut ComplexMnaSystem, ctx: &AcContext) {
        match self {
            Component::Resistor(r) => r.stamp_ac(sys, ctx),
            Component::Capacitor(c) => c.stamp_ac(sys, ctx),
            Component::Inductor(l) => l.stamp_ac(sys, ctx),
            Component::VoltageSource(v) => v.stamp_ac(sys, ctx),
            Component::CurrentSource(i) => i.stamp_ac(sys, ctx),
            Component::FunctionGenerator(g) => g.stamp_ac(sys, ctx),
            Component::NoiseSource(n) => n.stamp_ac(sys, ctx),
            Component::Diode(d) => d.stamp_ac(sys, ctx),
            Component::Bjt(q) => q.stamp_ac(sys, ctx),
            Component::Mosfet(m) => m.stamp_ac(sys, ctx),
            Component::OpAmp(o) => o.stamp_ac(sys, ctx),
            Component::Potentiometer(p) => p.stamp_ac(sys, ctx),
            Component::Switch(s) => s.stamp_ac(sys, ctx),
            Component::Fuse(f) => f.stamp_ac(sys, ctx),
        }
    }

    /// Read a parameter, if the component carries it.
    pub fn parameter(&self, kind: ParameterKind) -> Option<f64> {
        use ParameterKind::*;
        match (self, kind) {
            (Component::Resistor(r), Resistance) => Some(r.resistance),
            (Component::Capacitor(c), Capacitance) => Some(c.capacitance),
            (Component::Inductor(l), Inductance) => Some(l.inductance),
            (Component::VoltageSource(v), Voltage) => Some(v.voltage),
            (Component::VoltageSource(v), Resistance) => Some(v.series_resistance),
            (Component::CurrentSource(i), Current) => Some(i.current),
            (Component::FunctionGenerator(g), Voltage) => Some(g.amplitude),
            (Component::FunctionGenerator(g), Frequency) => Some(g.frequency),
            (Component::FunctionGenerator(g), Resistance) => Some(g.series_resistance),
            (Component::NoiseSource(n), Voltage) => Some(n.amplitude),
            (Component::NoiseSource(n), Frequency) => Some(n.bandwidth),
            (Component::Potentiometer(p), Resistance) => Some(p.total_resistance),
            (Component::Fuse(f), Resistance) => Some(f.resistance),
            (Component::Fuse(f), Current) => Some(f.rating),
            _ => None,
        }
    }

    /// Change a parameter in place.
    ///
    /// Fails with [`SimError::InvalidParameter`] when the component has no
    /// such parameter or the value is out of range.
    pub fn set_parameter(&mut self, kind: ParameterKind, value: f64) -> Result<()> {
        use ParameterKind::*;
        let invalid = |name: &str, message: &str| SimError::invalid_parameter(name, kind.to_string(), message);

        if !value.is_finite() {
            return Err(invalid(self.name(), "value must be finite"));
        }
        if kind.is_passive() && value < 0.0 {
            return Err(invalid(self.name(), "value must not be negative"));
        }
        if kind == Frequency && value <= 0.0 {
            return Err(invalid(self.name(), "frequency must be positive"));
        }

        let applied = match (&mut *self, kind) {
            (Component::Resistor(r), Resistance) => {
                r.resistance = value;
                true
            }
            (Component::Capacitor(c), Capacitance) => {
                c.capacitance = value;
                true
            }
            (Component::Inductor(l), Inductance) => {
                l.inductance = value;
                true
            }
            (Component::VoltageSource(v), Voltage) => {
                v.voltage = value;
                true
            }
            (Component::CurrentSource(i), Current) => {
                i.current = value;
                true
            }
            (Component::FunctionGenerator(g), Voltage) => {
                g.amplitude = value;
                true
            }
            (Component::FunctionGenerator(g), Frequency) => {
                g.frequency = value;
                true
            }
            (Component::NoiseSource(n), Voltage) => {
                n.amplitude = value;
                true
            }
            (Component::NoiseSource(n), Frequency) => {
                n.bandwidth = value;
                true
            }
            (Component::Potentiometer(p), Resistance) => {
                p.total_resistance = value;
                true
            }
            (Component::Fuse(f), Current) => {
                f.rating = value;
                true
            }
            // Series resistance changes the unknown layout, so it is not
            // adjustable in place.
            _ => false,
        };

        if applied {
            Ok(())
        } else {
            Err(invalid(self.name(), "not adjustable on this component"))
        }
    }

    /// The value a tolerance analysis perturbs, if any.
    pub fn tolerance_kind(&self) -> Option<ParameterKind> {
        match self {
            Component::Resistor(_) | Component::Potentiometer(_) => Some(ParameterKind::Resistance),
            Component::Capacitor(_) => Some(ParameterKind::Capacitance),
            Component::Inductor(_) => Some(ParameterKind::Inductance),
            Component::VoltageSource(_) | Component::FunctionGenerator(_) | Component::NoiseSource(_) => {
                Some(ParameterKind::Voltage)
            }
            Component::CurrentSource(_) => Some(ParameterKind::Current),
            _ => None,
        }
    }

    /// Highest frequency a time-varying source produces.
    pub fn highest_frequency(&self) -> Option<f64> {
        match self {
            Component::FunctionGenerator(g) => Some(g.highest_frequency()),
            Component::NoiseSource(n) => Some(n.bandwidth),
            _ => None,
        }
    }

    /// Update reactive and thermal state after an accepted transient step.
    pub fn commit_step(&mut self, nodes: &NodeMap, x: &[f64], dt: f64) {
        match self {
            Component::Capacitor(c) => {
                let v = nodes.voltage(x, c.nodes[0]) - nodes.voltage(x, c.nodes[1]);
                c.update_state(v, dt);
            }
            Component::Inductor(l) => {
                if let Some(br) = nodes.branch(l.id) {
                    l.update_state(x[br], dt);
                }
            }
            Component::Fuse(f) => {
                let v = nodes.voltage(x, f.nodes[0]) - nodes.voltage(x, f.nodes[1]);
                f.update_state(v, dt);
            }
            _ => {}
        }
    }

    /// Seed reactive state from an accepted DC operating point.
    pub fn commit_operating_point(&mut self, nodes: &NodeMap, x: &[f64]) {
        match self {
            Component::Capacitor(c) => {
                let v = nodes.voltage(x, c.nodes[0]) - nodes.voltage(x, c.nodes[1]);
                c.set_operating_point(v);
            }
            Component::Inductor(l) => {
                if let Some(br) = nodes.branch(l.id) {
                    l.set_operating_point(x[br]);
                }
            }
            _ => {}
        }
    }

    /// Return to the power-on state.
    pub fn reset_state(&mut self) {
        match self {
            Component::Capacitor(c) => c.reset(),
            Component::Inductor(l) => l.reset(),
            Component::Fuse(f) => f.reset(),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameter_round_trip() {
        let mut c: Component = Resistor::new(ComponentId(0), "R1", [NodeId(1), NodeId(0)], 1e3).into();
        assert_eq!(c.parameter(ParameterKind::Resistance), Some(1e3));
        c.set_parameter(ParameterKind::Resistance, 2.2e3).unwrap();
        assert_eq!(c.parameter(ParameterKind::Resistance), Some(2.2e3));
        assert_eq!(c.parameter(ParameterKind::Capacitance), None);
    }

    #[test]
    fn test_invalid_parameters_rejected() {
        let mut c: Component = Capacitor::new(ComponentId(0), "C1", [NodeId(1), NodeId(0)], 1e-6).into();
        assert!(c.set_parameter(ParameterKind::Capacitance, -1.0).is_err());
        assert!(c.set_parameter(ParameterKind::Capacitance, f64::NAN).is_err());
        assert!(c.set_parameter(ParameterKind::Voltage, 1.0).is_err());
    }

    #[test]
    fn test_branch_requirements() {
        let ideal: Component = VoltageSource::new(ComponentId(0), "V1", [NodeId(1), NodeId(0)], 5.0).into();
        let soft: Component = VoltageSource::new(ComponentId(1), "V2", [NodeId(1), NodeId(0)], 5.0)
            .with_series_resistance(50.0)
            .into();
        let inductor: Component = Inductor::new(ComponentId(2), "L1", [NodeId(1), NodeId(0)], 1e-3).into();
        assert!(ideal.needs_branch() && ideal.is_voltage_constraint(false));
        assert!(!soft.needs_branch() && !soft.is_voltage_constraint(true));
        assert!(inductor.needs_branch());
        assert!(inductor.is_voltage_constraint(true));
        assert!(!inductor.is_voltage_constraint(false));
    }

    #[test]
    fn test_source_amplitudes_are_toleranced() {
        let nodes = [NodeId(1), NodeId(0)];
        let generator: Component =
            FunctionGenerator::new(ComponentId(0), "FG1", nodes, WaveShape::Sine, 2.0, 1e3).into();
        let noise: Component = NoiseSource::new(ComponentId(1), "N1", nodes, 0.1, 10e3, 1).into();
        let diode: Component = Diode::new(ComponentId(2), "D1", nodes, DiodeKind::Standard).into();
        assert_eq!(generator.tolerance_kind(), Some(ParameterKind::Voltage));
        assert_eq!(generator.parameter(ParameterKind::Voltage), Some(2.0));
        assert_eq!(noise.tolerance_kind(), Some(ParameterKind::Voltage));
        assert_eq!(noise.parameter(ParameterKind::Voltage), Some(0.1));
        assert_eq!(diode.tolerance_kind(), None);
    }

    #[test]
    fn test_parameter_kind_parse() {
        assert_eq!(ParameterKind::parse("Capacitance"), Some(ParameterKind::Capacitance));
        assert_eq!(ParameterKind::parse("freq"), Some(ParameterKind::Frequency));
        assert_eq!(ParameterKind::parse("bogus"), None);
    }
}
