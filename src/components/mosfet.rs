//! MOSFET model (Shichman-Hodges, SPICE Level 1).
//!
//! ```text
//! cutoff     Vgs <= Vto            Id = 0
//! linear     Vds <  Vgs - Vto      Id = β (Vov Vds - Vds²/2)(1 + λ Vds)
//! saturation Vds >= Vgs - Vto      Id = β/2 Vov² (1 + λ Vds)
//! ```
//!
//! with β = Kp·W/L. The body is tied to the source. Drain and source swap
//! roles when Vds is negative, so the device conducts symmetrically.

use crate::circuit::{ComponentId, NodeId};
use crate::solver::{AcContext, ComplexMnaSystem, MnaSystem, StampContext, TerminalCurrents, MIN_CONDUCTANCE};

/// MOSFET channel type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MosfetType {
    Nmos,
    Pmos,
}

impl MosfetType {
    fn sign(self) -> f64 {
        match self {
            MosfetType::Nmos => 1.0,
            MosfetType::Pmos => -1.0,
        }
    }
}

/// Level-1 model parameters. `vto` is the threshold magnitude for both
/// polarities.
#[derive(Debug, Clone, PartialEq)]
pub struct MosfetParams {
    pub vto: f64,
    /// Process transconductance (A/V²)
    pub kp: f64,
    pub w: f64,
    pub l: f64,
    /// Channel-length modulation (1/V)
    pub lambda: f64,
}

impl Default for MosfetParams {
    fn default() -> Self {
        Self {
            vto: 1.0,
            kp: 2e-5,
            w: 100e-6,
            l: 1e-6,
            lambda: 0.02,
        }
    }
}

impl MosfetParams {
    pub fn beta(&self) -> f64 {
        self.kp * self.w / self.l.max(1e-12)
    }
}

/// A MOSFET component.
#[derive(Debug, Clone)]
pub struct Mosfet {
    pub id: ComponentId,
    pub name: String,
    pub nodes: [NodeId; 3], // [drain, gate, source]
    pub mos_type: MosfetType,
    pub params: MosfetParams,
}

impl Mosfet {
    pub fn new(
        id: ComponentId,
        name: impl Into<String>,
        nodes: [NodeId; 3],
        mos_type: MosfetType,
        params: MosfetParams,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            nodes,
            mos_type,
            params,
        }
    }

    /// Forward-biased drain current and its partials (gm, gds) for Vds >= 0.
    fn forward(&self, vgs: f64, vds: f64) -> (f64, f64, f64) {
        let beta = self.params.beta();
        let lambda = self.params.lambda;
        let vov = vgs - self.params.vto;
        if vov <= 0.0 {
            return (0.0, 0.0, 0.0);
        }
        let clm = 1.0 + lambda * vds;
        if vds < vov {
            let core = vov * vds - 0.5 * vds * vds;
            let id = beta * core * clm;
            let gm = beta * vds * clm;
            let gds = beta * (vov - vds) * clm + beta * core * lambda;
            (id, gm, gds)
        } else {
            let id = 0.5 * beta * vov * vov * clm;
            let gm = beta * vov * clm;
            let gds = 0.5 * beta * vov * vov * lambda;
            (id, gm, gds)
        }
    }

    /// Drain current (into the drain, device frame) and partials w.r.t.
    /// Vgs and Vds, handling source/drain reversal.
    fn channel(&self, vgs: f64, vds: f64) -> (f64, f64, f64) {
        if vds >= 0.0 {
            self.forward(vgs, vds)
        } else {
            // Roles swap: the drain terminal acts as the source.
            let (i, gm, gds) = self.forward(vgs - vds, -vds);
            (-i, -gm, gm + gds)
        }
    }

    /// Drain current (into the drain terminal) at node voltages.
    pub fn drain_current(&self, vd: f64, vg: f64, vs: f64) -> f64 {
        let s = self.mos_type.sign();
        let (i, _, _) = self.channel(s * (vg - vs), s * (vd - vs));
        s * (i + MIN_CONDUCTANCE * s * (vd - vs))
    }

    /// Terminal currents at node voltages [vd, vg, vs].
    fn terminal_currents(&self, v: [f64; 3]) -> TerminalCurrents<3> {
        let s = self.mos_type.sign();
        let (i, gm, gds) = self.channel(s * (v[1] - v[2]), s * (v[0] - v[2]));
        let gds = gds + MIN_CONDUCTANCE;
        let id = s * i + MIN_CONDUCTANCE * (v[0] - v[2]);

        let drain = [gds, gm, -(gm + gds)];
        TerminalCurrents {
            current: [id, 0.0, -id],
            jacobian: [drain, [0.0; 3], [-drain[0], -drain[1], -drain[2]]],
        }
    }

    fn rows(&self, index: impl Fn(NodeId) -> Option<usize>) -> [Option<usize>; 3] {
        [index(self.nodes[0]), index(self.nodes[1]), index(self.nodes[2])]
    }

    pub fn stamp(&self, sys: &mut MnaSystem, ctx: &StampContext) {
        let v = [
            ctx.voltage(self.nodes[0]),
            ctx.voltage(self.nodes[1]),
            ctx.voltage(self.nodes[2]),
        ];
        let device = self.terminal_currents(v);
        sys.stamp_linearized(self.rows(|n| ctx.index(n)), v, &device);
    }

    pub fn stamp_ac(&self, sys: &mut ComplexMnaSystem, ctx: &AcContext) {
        let v = [
            ctx.voltage(self.nodes[0]),
            ctx.voltage(self.nodes[1]),
            ctx.voltage(self.nodes[2]),
        ];
        let device = self.terminal_currents(v);
        sys.stamp_jacobian(self.rows(|n| ctx.index(n)), &device.jacobian);
    }
}
