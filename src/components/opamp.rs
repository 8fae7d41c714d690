//! Operational amplifier macromodel.
//!
//! Differential input resistance, a gain stage that saturates smoothly at
//! the rails, and an output resistance:
//!
//! ```text
//! w    = Vmid + Vhalf · tanh(A · (V+ - V-) / Vhalf)
//! Iout = (Vout - w) / Rout
//! ```
//!
//! The gain-stage voltage `w` is an extra unknown. Its equation is written
//! in the inverse form `V+ - V- = (Vhalf / A) · atanh((w - Vmid) / Vhalf)`,
//! whose slope never vanishes, so Newton keeps moving when the output is
//! pinned at a rail.

use crate::circuit::{ComponentId, NodeId};
use crate::solver::{AcContext, ComplexMnaSystem, MnaSystem, StampContext};

/// Closest approach of the gain stage to a rail, as a fraction of the swing.
const RAIL_MARGIN: f64 = 1e-12;

/// Parameters for an op-amp model.
#[derive(Debug, Clone, PartialEq)]
pub struct OpAmpParams {
    /// Open-loop DC gain (A_OL)
    pub gain: f64,
    /// Output resistance (R_out)
    pub r_out: f64,
    /// Differential input resistance (R_in)
    pub r_in: f64,
    /// Positive rail voltage
    pub v_rail_pos: f64,
    /// Negative rail voltage
    pub v_rail_neg: f64,
}

impl Default for OpAmpParams {
    fn default() -> Self {
        Self::ua741()
    }
}

impl OpAmpParams {
    /// Near-ideal op-amp.
    pub fn ideal() -> Self {
        Self {
            gain: 1e7,
            r_out: 0.1,
            r_in: 1e12,
            v_rail_pos: 15.0,
            v_rail_neg: -15.0,
        }
    }

    /// Typical 741-style op-amp.
    pub fn ua741() -> Self {
        Self {
            gain: 2e5,
            r_out: 75.0,
            r_in: 2e6,
            v_rail_pos: 15.0,
            v_rail_neg: -15.0,
        }
    }

    /// TL072-style JFET-input op-amp.
    pub fn tl072() -> Self {
        Self {
            gain: 2e5,
            r_out: 100.0,
            r_in: 1e12,
            v_rail_pos: 15.0,
            v_rail_neg: -15.0,
        }
    }

    /// Look up a preset by model name.
    pub fn preset(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "ideal" => Some(Self::ideal()),
            "741" | "ua741" | "lm741" => Some(Self::ua741()),
            "tl072" | "tl071" | "tl074" => Some(Self::tl072()),
            _ => None,
        }
    }

    fn mid(&self) -> f64 {
        0.5 * (self.v_rail_pos + self.v_rail_neg)
    }

    fn half_swing(&self) -> f64 {
        (0.5 * (self.v_rail_pos - self.v_rail_neg)).max(1e-3)
    }
}

/// An operational amplifier component.
#[derive(Debug, Clone)]
pub struct OpAmp {
    pub id: ComponentId,
    pub name: String,
    pub nodes: [NodeId; 3], // [output, non-inverting (+), inverting (-)]
    pub params: OpAmpParams,
}

impl OpAmp {
    /// Create a new op-amp.
    pub fn new(id: ComponentId, name: impl Into<String>, nodes: [NodeId; 3], params: OpAmpParams) -> Self {
        Self {
            id,
            name: name.into(),
            nodes,
            params,
        }
    }

    /// Get the output node.
    pub fn output(&self) -> NodeId {
        self.nodes[0]
    }

    /// Get the non-inverting input node.
    pub fn input_pos(&self) -> NodeId {
        self.nodes[1]
    }

    /// Get the inverting input node.
    pub fn input_neg(&self) -> NodeId {
        self.nodes[2]
    }

    /// Open-circuit output voltage for a differential input.
    pub fn transfer(&self, v_diff: f64) -> f64 {
        let half = self.params.half_swing();
        self.params.mid() + half * (self.params.gain * v_diff / half).tanh()
    }

    /// Input voltage needed to hold the gain stage at `w`, and its slope,
    /// evaluated no closer to a rail than `RAIL_MARGIN`.
    fn inverse(&self, w: f64) -> (f64, f64, f64) {
        let half = self.params.half_swing();
        let limit = 1.0 - RAIL_MARGIN;
        let u = ((w - self.params.mid()) / half).clamp(-limit, limit);
        let w_eval = self.params.mid() + u * half;
        let gain = self.params.gain.max(1.0);
        let v_diff = half / gain * u.atanh();
        let slope = 1.0 / (gain * (1.0 - u * u));
        (w_eval, v_diff, slope)
    }

    fn output_conductance(&self) -> f64 {
        1.0 / self.params.r_out.max(1e-6)
    }

    fn input_conductance(&self) -> f64 {
        1.0 / self.params.r_in.max(1.0)
    }

    pub fn stamp(&self, sys: &mut MnaSystem, ctx: &StampContext) {
        let Some(br) = ctx.branch(self.id) else { return };
        let n_out = ctx.index(self.output());
        let n_pos = ctx.index(self.input_pos());
        let n_neg = ctx.index(self.input_neg());

        sys.stamp_conductance(n_pos, n_neg, self.input_conductance());

        let go = self.output_conductance();
        if let Some(o) = n_out {
            sys.add(o, o, go);
            sys.add(o, br, -go);
        }

        // V+ - V- ≈ v_diff(w*) + slope·(w - w*)
        let (w_eval, v_diff, slope) = self.inverse(ctx.x[br]);
        if let Some(p) = n_pos {
            sys.add(br, p, 1.0);
        }
        if let Some(n) = n_neg {
            sys.add(br, n, -1.0);
        }
        sys.add(br, br, -slope);
        sys.add_source(br, v_diff - slope * w_eval);
    }

    pub fn stamp_ac(&self, sys: &mut ComplexMnaSystem, ctx: &AcContext) {
        let Some(br) = ctx.branch(self.id) else { return };
        let n_out = ctx.index(self.output());
        let n_pos = ctx.index(self.input_pos());
        let n_neg = ctx.index(self.input_neg());
        let one = num_complex::Complex64::new(1.0, 0.0);

        sys.stamp_conductance(n_pos, n_neg, one * self.input_conductance());

        let go = one * self.output_conductance();
        if let Some(o) = n_out {
            sys.add(o, o, go);
            sys.add(o, br, -go);
        }

        let (_, _, slope) = self.inverse(ctx.x_op[br]);
        if let Some(p) = n_pos {
            sys.add(br, p, one);
        }
        if let Some(n) = n_neg {
            sys.add(br, n, -one);
        }
        sys.add(br, br, -one * slope);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn opamp() -> OpAmp {
        OpAmp::new(
            ComponentId(0),
            "U1",
            [NodeId(1), NodeId(2), NodeId(3)],
            OpAmpParams::ua741(),
        )
    }

    #[test]
    fn test_transfer_saturates_at_rails() {
        let u = opamp();
        assert_relative_eq!(u.transfer(0.0), 0.0);
        assert_relative_eq!(u.transfer(1.0), 15.0, epsilon = 1e-9);
        assert_relative_eq!(u.transfer(-1.0), -15.0, epsilon = 1e-9);
        // Small-signal gain equals the open-loop gain
        assert_relative_eq!(u.transfer(1e-9) / 1e-9, 2e5, max_relative = 1e-6);
    }

    #[test]
    fn test_inverse_undoes_transfer() {
        let u = opamp();
        for v_diff in [-4e-5, -1e-6, 0.0, 3e-5] {
            let w = u.transfer(v_diff);
            let (_, back, slope) = u.inverse(w);
            assert_relative_eq!(back, v_diff, epsilon = 1e-12, max_relative = 1e-6);
            assert!(slope > 0.0);
        }
    }

    #[test]
    fn test_asymmetric_rails() {
        let mut u = opamp();
        u.params.v_rail_pos = 5.0;
        u.params.v_rail_neg = 0.0;
        assert_relative_eq!(u.transfer(1.0), 5.0, epsilon = 1e-9);
        assert_relative_eq!(u.transfer(-1.0), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_presets() {
        assert_eq!(OpAmpParams::preset("TL072"), Some(OpAmpParams::tl072()));
        assert!(OpAmpParams::preset("unknown").is_none());
    }
}
