//! Diode model.
//!
//! Uses the Shockley diode equation:
//!   I = Is * (exp(V / (n * Vt)) - 1)
//!
//! Zener diodes add a reverse breakdown branch mirrored about -BV.
//! The exponentials are continued linearly above [`MAX_EXPONENT`] so a wild
//! Newton iterate cannot overflow.

use crate::circuit::{ComponentId, NodeId};
use crate::solver::{AcContext, ComplexMnaSystem, MnaSystem, StampContext, TerminalCurrents, MIN_CONDUCTANCE};

/// Exponent above which `exp` is linearly extrapolated.
pub const MAX_EXPONENT: f64 = 40.0;

/// `exp(x)` and its derivative, continued linearly above [`MAX_EXPONENT`].
pub(crate) fn limited_exp(x: f64) -> (f64, f64) {
    if x > MAX_EXPONENT {
        let e = MAX_EXPONENT.exp();
        (e * (1.0 + x - MAX_EXPONENT), e)
    } else {
        let e = x.exp();
        (e, e)
    }
}

/// Diode family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiodeKind {
    #[default]
    Standard,
    Zener,
    Led,
    Schottky,
}

/// Parameters for a diode model.
#[derive(Debug, Clone, PartialEq)]
pub struct DiodeParams {
    /// Saturation current (Is)
    pub is: f64,
    /// Ideality factor (n)
    pub n: f64,
    /// Reverse breakdown voltage, zener only
    pub bv: Option<f64>,
}

impl Default for DiodeParams {
    fn default() -> Self {
        Self::for_kind(DiodeKind::Standard)
    }
}

impl DiodeParams {
    /// Typical parameters for each family.
    pub fn for_kind(kind: DiodeKind) -> Self {
        match kind {
            DiodeKind::Standard => Self {
                is: 1e-14,
                n: 1.0,
                bv: None,
            },
            DiodeKind::Zener => Self {
                is: 1e-14,
                n: 1.0,
                bv: Some(5.1),
            },
            // Red LED, about 1.8 V at a few mA
            DiodeKind::Led => Self {
                is: 1e-18,
                n: 2.0,
                bv: None,
            },
            DiodeKind::Schottky => Self {
                is: 1e-8,
                n: 1.05,
                bv: None,
            },
        }
    }
}

/// A diode component.
#[derive(Debug, Clone)]
pub struct Diode {
    pub id: ComponentId,
    pub name: String,
    pub nodes: [NodeId; 2], // [anode, cathode]
    pub kind: DiodeKind,
    pub params: DiodeParams,
}

impl Diode {
    /// Create a new diode with the default parameters of its family.
    pub fn new(id: ComponentId, name: impl Into<String>, nodes: [NodeId; 2], kind: DiodeKind) -> Self {
        Self {
            id,
            name: name.into(),
            nodes,
            kind,
            params: DiodeParams::for_kind(kind),
        }
    }

    pub fn with_params(mut self, params: DiodeParams) -> Self {
        self.params = params;
        self
    }

    /// Diode current and conductance (dI/dV) at anode-cathode voltage `v`.
    pub fn evaluate(&self, v: f64, vt: f64) -> (f64, f64) {
        let n_vt = self.params.n * vt;
        let (e, de) = limited_exp(v / n_vt);
        let mut i = self.params.is * (e - 1.0);
        let mut g = self.params.is * de / n_vt;

        if let Some(bv) = self.params.bv {
            // Breakdown: mirror image of the forward junction at -bv
            let (eb, deb) = limited_exp(-(v + bv) / n_vt);
            i -= self.params.is * eb;
            g += self.params.is * deb / n_vt;
        }

        (i + MIN_CONDUCTANCE * v, g + MIN_CONDUCTANCE)
    }

    /// Diode current at voltage `v`.
    pub fn current(&self, v: f64, vt: f64) -> f64 {
        self.evaluate(v, vt).0
    }

    fn terminal_currents(&self, v: f64, vt: f64) -> TerminalCurrents<2> {
        let (i, g) = self.evaluate(v, vt);
        TerminalCurrents {
            current: [i, -i],
            jacobian: [[g, -g], [-g, g]],
        }
    }

    pub fn stamp(&self, sys: &mut MnaSystem, ctx: &StampContext) {
        let va = ctx.voltage(self.nodes[0]);
        let vc = ctx.voltage(self.nodes[1]);
        let device = self.terminal_currents(va - vc, ctx.thermal_voltage);
        sys.stamp_linearized(
            [ctx.index(self.nodes[0]), ctx.index(self.nodes[1])],
            [va, vc],
            &device,
        );
    }

    pub fn stamp_ac(&self, sys: &mut ComplexMnaSystem, ctx: &AcContext) {
        let v = ctx.voltage(self.nodes[0]) - ctx.voltage(self.nodes[1]);
        let device = self.terminal_currents(v, ctx.thermal_voltage);
        sys.stamp_jacobian(
            [ctx.index(self.nodes[0]), ctx.index(self.nodes[1])],
            &device.jacobian,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const VT: f64 = 0.025852;

    fn diode(kind: DiodeKind) -> Diode {
        Diode::new(ComponentId(0), "D1", [NodeId(1), NodeId(0)], kind)
    }

    #[test]
    fn test_diode_forward_bias() {
        let d = diode(DiodeKind::Standard);

        // At 0V, current should be approximately 0
        assert!(d.current(0.0, VT).abs() < 1e-10);

        // At forward bias, current should increase exponentially
        let i_small = d.current(0.3, VT);
        let i_large = d.current(0.6, VT);
        assert!(i_large > i_small * 100.0);
    }

    #[test]
    fn test_diode_reverse_bias() {
        let d = diode(DiodeKind::Standard);

        // In reverse bias, current approaches -Is (plus the leakage floor)
        let i_rev = d.current(-1.0, VT);
        assert!(i_rev < 0.0);
        assert!(i_rev > -2e-12);
    }

    #[test]
    fn test_extrapolation_is_continuous_and_finite() {
        let d = diode(DiodeKind::Standard);
        let v_crit = MAX_EXPONENT * VT;
        let below = d.current(v_crit - 1e-9, VT);
        let above = d.current(v_crit + 1e-9, VT);
        assert_relative_eq!(below, above, max_relative = 1e-6);
        let (i, g) = d.evaluate(1000.0, VT);
        assert!(i.is_finite() && g.is_finite());
    }

    #[test]
    fn test_zener_breakdown() {
        let d = diode(DiodeKind::Zener);
        // Well below breakdown: negligible current
        assert!(d.current(-3.0, VT).abs() < 1e-9);
        // Past breakdown: large reverse current
        assert!(d.current(-5.8, VT) < -1e-3);
    }

    #[test]
    fn test_schottky_conducts_earlier() {
        let si = diode(DiodeKind::Standard);
        let sk = diode(DiodeKind::Schottky);
        assert!(sk.current(0.3, VT) > 1000.0 * si.current(0.3, VT));
    }
}
