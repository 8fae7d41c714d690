//! BJT (Bipolar Junction Transistor) model.
//!
//! Simplified Gummel-Poon transport model:
//!
//! ```text
//! If  = Is (exp(Vbe / Nf Vt) - 1)        Ir = Is (exp(Vbc / Nr Vt) - 1)
//! qb  = (1 + sqrt(1 + 4 If / Ikf)) / 2   (high-injection knee)
//! Ic  = (If - Ir) (1 - Vbc / Vaf) / qb - Ir / Br
//! Ib  = If / Bf + Ir / Br
//! ```
//!
//! PNP devices use the same equations on inverted voltages and currents.

use crate::circuit::{ComponentId, NodeId};
use crate::solver::{AcContext, ComplexMnaSystem, MnaSystem, StampContext, TerminalCurrents, MIN_CONDUCTANCE};

use super::diode::limited_exp;

/// BJT polarity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BjtType {
    Npn,
    Pnp,
}

impl BjtType {
    fn sign(self) -> f64 {
        match self {
            BjtType::Npn => 1.0,
            BjtType::Pnp => -1.0,
        }
    }
}

/// Parameters for a BJT model.
#[derive(Debug, Clone, PartialEq)]
pub struct BjtParams {
    /// Transport saturation current
    pub is: f64,
    /// Forward current gain (β_F)
    pub beta_f: f64,
    /// Reverse current gain (β_R)
    pub beta_r: f64,
    /// Forward emission coefficient
    pub nf: f64,
    /// Reverse emission coefficient
    pub nr: f64,
    /// Forward Early voltage, 0 = infinite
    pub vaf: f64,
    /// Forward knee current, 0 = infinite
    pub ikf: f64,
}

impl Default for BjtParams {
    fn default() -> Self {
        Self {
            is: 1e-14,
            beta_f: 100.0,
            beta_r: 1.0,
            nf: 1.0,
            nr: 1.0,
            vaf: 100.0,
            ikf: 0.0,
        }
    }
}

/// Terminal currents and partial derivatives in the device frame
/// (NPN orientation, currents into collector and base).
struct Operating {
    ic: f64,
    ib: f64,
    dic_dvbe: f64,
    dic_dvbc: f64,
    dib_dvbe: f64,
    dib_dvbc: f64,
}

/// A BJT component.
#[derive(Debug, Clone)]
pub struct Bjt {
    pub id: ComponentId,
    pub name: String,
    pub nodes: [NodeId; 3], // [collector, base, emitter]
    pub bjt_type: BjtType,
    pub params: BjtParams,
}

impl Bjt {
    /// Create a new BJT.
    pub fn new(
        id: ComponentId,
        name: impl Into<String>,
        nodes: [NodeId; 3],
        bjt_type: BjtType,
        params: BjtParams,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            nodes,
            bjt_type,
            params,
        }
    }

    /// Get the collector node.
    pub fn collector(&self) -> NodeId {
        self.nodes[0]
    }

    /// Get the base node.
    pub fn base(&self) -> NodeId {
        self.nodes[1]
    }

    /// Get the emitter node.
    pub fn emitter(&self) -> NodeId {
        self.nodes[2]
    }

    fn operating(&self, vbe: f64, vbc: f64, vt: f64) -> Operating {
        let p = &self.params;
        let nf_vt = p.nf * vt;
        let nr_vt = p.nr * vt;

        let (ef, def) = limited_exp(vbe / nf_vt);
        let (er, der) = limited_exp(vbc / nr_vt);
        let i_f = p.is * (ef - 1.0);
        let i_r = p.is * (er - 1.0);
        let g_f = p.is * def / nf_vt;
        let g_r = p.is * der / nr_vt;

        // Early effect, kept positive in deep reverse of the b-c junction
        let (early, dearly_dvbc) = if p.vaf > 0.0 {
            let e = 1.0 - vbc / p.vaf;
            if e > 0.1 {
                (e, -1.0 / p.vaf)
            } else {
                (0.1, 0.0)
            }
        } else {
            (1.0, 0.0)
        };

        // High-injection knee
        let (qb, dqb_dif) = if p.ikf > 0.0 && i_f > 0.0 {
            let s = (1.0 + 4.0 * i_f / p.ikf).sqrt();
            ((1.0 + s) / 2.0, 1.0 / (p.ikf * s))
        } else {
            (1.0, 0.0)
        };

        let i_ct = (i_f - i_r) * early / qb;
        let dict_dvbe = g_f * (early / qb - (i_f - i_r) * early / (qb * qb) * dqb_dif);
        let dict_dvbc = -g_r * early / qb + (i_f - i_r) * dearly_dvbc / qb;

        Operating {
            ic: i_ct - i_r / p.beta_r - MIN_CONDUCTANCE * vbc,
            ib: i_f / p.beta_f + i_r / p.beta_r + MIN_CONDUCTANCE * (vbe + vbc),
            dic_dvbe: dict_dvbe,
            dic_dvbc: dict_dvbc - g_r / p.beta_r - MIN_CONDUCTANCE,
            dib_dvbe: g_f / p.beta_f + MIN_CONDUCTANCE,
            dib_dvbc: g_r / p.beta_r + MIN_CONDUCTANCE,
        }
    }

    /// Collector and base currents (into the device) for node voltages.
    pub fn currents(&self, vc: f64, vb: f64, ve: f64, vt: f64) -> (f64, f64) {
        let s = self.bjt_type.sign();
        let op = self.operating(s * (vb - ve), s * (vb - vc), vt);
        (s * op.ic, s * op.ib)
    }

    /// Terminal currents at node voltages [vc, vb, ve].
    fn terminal_currents(&self, v: [f64; 3], vt: f64) -> TerminalCurrents<3> {
        let s = self.bjt_type.sign();
        let op = self.operating(s * (v[1] - v[2]), s * (v[1] - v[0]), vt);
        let ic = s * op.ic;
        let ib = s * op.ib;

        // The polarity sign cancels in the derivatives.
        let dc = [-op.dic_dvbc, op.dic_dvbe + op.dic_dvbc, -op.dic_dvbe];
        let db = [-op.dib_dvbc, op.dib_dvbe + op.dib_dvbc, -op.dib_dvbe];
        let de = [-(dc[0] + db[0]), -(dc[1] + db[1]), -(dc[2] + db[2])];

        TerminalCurrents {
            current: [ic, ib, -(ic + ib)],
            jacobian: [dc, db, de],
        }
    }

    fn rows(&self, index: impl Fn(NodeId) -> Option<usize>) -> [Option<usize>; 3] {
        [index(self.nodes[0]), index(self.nodes[1]), index(self.nodes[2])]
    }

    pub fn stamp(&self, sys: &mut MnaSystem, ctx: &StampContext) {
        let v = [
            ctx.voltage(self.collector()),
            ctx.voltage(self.base()),
            ctx.voltage(self.emitter()),
        ];
        let device = self.terminal_currents(v, ctx.thermal_voltage);
        sys.stamp_linearized(self.rows(|n| ctx.index(n)), v, &device);
    }

    pub fn stamp_ac(&self, sys: &mut ComplexMnaSystem, ctx: &AcContext) {
        let v = [
            ctx.voltage(self.collector()),
            ctx.voltage(self.base()),
            ctx.voltage(self.emitter()),
        ];
        let device = self.terminal_currents(v, ctx.thermal_voltage);
        sys.stamp_jacobian(self.rows(|n| ctx.index(n)), &device.jacobian);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const VT: f64 = 0.025852;

    fn npn() -> Bjt {
        Bjt::new(
            ComponentId(0),
            "Q1",
            [NodeId(1), NodeId(2), NodeId(0)],
            BjtType::Npn,
            BjtParams::default(),
        )
    }

    #[test]
    fn test_forward_active_gain() {
        let q = npn();
        let (ic, ib) = q.currents(5.0, 0.65, 0.0, VT);
        assert!(ic > 0.0 && ib > 0.0);
        // β_F scaled up by the Early factor (1 + Vce/Vaf roughly)
        let beta = ic / ib;
        assert!(beta > 100.0 && beta < 110.0, "beta = {beta}");
    }

    #[test]
    fn test_cutoff() {
        let q = npn();
        let (ic, ib) = q.currents(5.0, 0.0, 0.0, VT);
        assert!(ic.abs() < 1e-9);
        assert!(ib.abs() < 1e-9);
    }

    #[test]
    fn test_pnp_mirrors_npn() {
        let n = npn();
        let mut p = npn();
        p.bjt_type = BjtType::Pnp;
        let (ic_n, ib_n) = n.currents(5.0, 0.65, 0.0, VT);
        let (ic_p, ib_p) = p.currents(-5.0, -0.65, 0.0, VT);
        assert_relative_eq!(ic_p, -ic_n, max_relative = 1e-12);
        assert_relative_eq!(ib_p, -ib_n, max_relative = 1e-12);
    }

    #[test]
    fn test_jacobian_matches_finite_difference() {
        let mut q = npn();
        q.params.ikf = 0.01;
        let v = [3.0, 0.7, 0.05];
        let tc = q.terminal_currents(v, VT);
        let h = 1e-7;
        for j in 0..3 {
            let mut vp = v;
            vp[j] += h;
            let up = q.terminal_currents(vp, VT);
            for k in 0..3 {
                let numeric = (up.current[k] - tc.current[k]) / h;
                assert_relative_eq!(
                    tc.jacobian[k][j],
                    numeric,
                    epsilon = 1e-9,
                    max_relative = 1e-3
                );
            }
        }
    }

    #[test]
    fn test_knee_reduces_gain_at_high_current() {
        let mut q = npn();
        let (ic_lo, _) = q.currents(5.0, 0.75, 0.0, VT);
        q.params.ikf = 1e-3;
        let (ic_hi, _) = q.currents(5.0, 0.75, 0.0, VT);
        assert!(ic_hi < ic_lo);
    }
}
