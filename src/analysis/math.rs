//! Derived channels computed from probe waveforms.

use crate::buffer::RingBuffer;

/// Operation applied by a math channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MathOp {
    #[default]
    Add,
    Subtract,
    Multiply,
    /// `a / b`, 0 where `b` is effectively zero
    Divide,
    Abs,
    /// `da/dt` by backward difference
    Derivative,
    /// Running trapezoidal integral of `a`
    Integral,
}

impl MathOp {
    /// Parse operation name.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "add" | "+" => Some(Self::Add),
            "sub" | "subtract" | "-" => Some(Self::Subtract),
            "mul" | "multiply" | "*" => Some(Self::Multiply),
            "div" | "divide" | "/" => Some(Self::Divide),
            "abs" => Some(Self::Abs),
            "deriv" | "derivative" | "d/dt" => Some(Self::Derivative),
            "integ" | "integral" => Some(Self::Integral),
            _ => None,
        }
    }

    /// True when the operation reads a second source.
    pub fn is_binary(self) -> bool {
        matches!(self, Self::Add | Self::Subtract | Self::Multiply | Self::Divide)
    }
}

/// Below this magnitude a divisor counts as zero.
const MIN_DIVISOR: f64 = 1e-15;

/// One derived channel: `scale · op(a, b) + offset`.
#[derive(Debug, Clone)]
pub struct MathChannel {
    pub name: String,
    pub enabled: bool,
    pub op: MathOp,
    /// Probe index of the first operand
    pub source_a: usize,
    /// Probe index of the second operand (binary operations only)
    pub source_b: usize,
    pub scale: f64,
    pub offset: f64,

    integral: f64,
    last: Option<(f64, f64)>,
    trace: RingBuffer<(f64, f64)>,
}

impl MathChannel {
    pub fn new(name: impl Into<String>, op: MathOp, source_a: usize, source_b: usize) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            op,
            source_a,
            source_b,
            scale: 1.0,
            offset: 0.0,
            integral: 0.0,
            last: None,
            trace: RingBuffer::new(1),
        }
    }

    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_offset(mut self, offset: f64) -> Self {
        self.offset = offset;
        self
    }

    /// Clear the running integral, derivative history and trace.
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.last = None;
        self.trace.clear();
    }

    /// Accumulated integral so far.
    pub fn integral(&self) -> f64 {
        self.integral
    }

    /// Feed one sample; returns the channel value at `t`.
    pub fn process(&mut self, t: f64, a: f64, b: f64) -> f64 {
        let raw = match self.op {
            MathOp::Add => a + b,
            MathOp::Subtract => a - b,
            MathOp::Multiply => a * b,
            MathOp::Divide => {
                if b.abs() < MIN_DIVISOR {
                    0.0
                } else {
                    a / b
                }
            }
            MathOp::Abs => a.abs(),
            MathOp::Derivative => match self.last {
                Some((t0, a0)) if t > t0 => (a - a0) / (t - t0),
                _ => 0.0,
            },
            MathOp::Integral => {
                if let Some((t0, a0)) = self.last {
                    self.integral += 0.5 * (a + a0) * (t - t0);
                }
                self.integral
            }
        };
        self.last = Some((t, a));
        self.scale * raw + self.offset
    }

    /// Feed the samples of a probe history newer than the last call and
    /// return the channel trace over the same window, oldest first.
    ///
    /// The running integral carries across calls, including samples that
    /// have since dropped out of the history. The channel restarts when
    /// the history went back in time (the run was reset).
    pub fn update(&mut self, a: &RingBuffer<(f64, f64)>, b: Option<&RingBuffer<(f64, f64)>>) -> Vec<(f64, f64)> {
        let since = self.last.map(|(t, _)| t);
        let rewound = match (since, a.latest()) {
            (Some(t), Some(&(latest, _))) => latest < t,
            (Some(_), None) => true,
            (None, _) => false,
        };
        if rewound {
            self.reset();
        }
        if self.trace.capacity() != a.capacity() {
            self.trace = RingBuffer::new(a.capacity());
        }

        let since = self.last.map(|(t, _)| t);
        let fresh = |t: f64| since.map_or(true, |s| t > s);
        let pending: Vec<(f64, f64, f64)> = match b {
            Some(b) => a
                .iter()
                .zip(b.iter())
                .filter(|&(&(t, _), _)| fresh(t))
                .map(|(&(t, va), &(_, vb))| (t, va, vb))
                .collect(),
            None => a
                .iter()
                .filter(|&&(t, _)| fresh(t))
                .map(|&(t, va)| (t, va, 0.0))
                .collect(),
        };
        for (t, va, vb) in pending {
            let value = self.process(t, va, vb);
            self.trace.push((t, value));
        }
        self.trace.to_vec()
    }

    /// Evaluate over whole waveforms, aligned by sample index.
    ///
    /// Restarts the running state; the result is as long as the shorter
    /// operand (or `a` alone for unary operations).
    pub fn evaluate(&mut self, a: &[(f64, f64)], b: &[(f64, f64)]) -> Vec<(f64, f64)> {
        self.reset();
        if self.op.is_binary() {
            a.iter()
                .zip(b)
                .map(|(&(t, va), &(_, vb))| (t, self.process(t, va, vb)))
                .collect()
        } else {
            a.iter().map(|&(t, va)| (t, self.process(t, va, 0.0))).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn constant(v: f64, n: usize, dt: f64) -> Vec<(f64, f64)> {
        (0..n).map(|i| (i as f64 * dt, v)).collect()
    }

    #[test]
    fn test_integral_of_constant() {
        let mut ch = MathChannel::new("int", MathOp::Integral, 0, 0);
        let out = ch.evaluate(&constant(2.0, 1001, 1e-3), &[]);
        assert_eq!(out.len(), 1001);
        assert_relative_eq!(out[1000].1, 2.0, epsilon = 1e-9);
        assert_relative_eq!(ch.integral(), 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_binary_ops_with_scale_offset() {
        let a = constant(3.0, 4, 1.0);
        let b = constant(1.5, 3, 1.0);
        let mut ch = MathChannel::new("diff", MathOp::Subtract, 0, 1)
            .with_scale(2.0)
            .with_offset(-1.0);
        let out = ch.evaluate(&a, &b);
        assert_eq!(out.len(), 3);
        assert_relative_eq!(out[0].1, 2.0);
    }

    #[test]
    fn test_divide_by_zero_is_zero() {
        let mut ch = MathChannel::new("ratio", MathOp::Divide, 0, 1);
        assert_eq!(ch.process(0.0, 1.0, 0.0), 0.0);
        assert_eq!(ch.process(1.0, 1.0, 4.0), 0.25);
    }

    #[test]
    fn test_derivative_of_ramp() {
        let ramp: Vec<(f64, f64)> = (0..10).map(|i| (i as f64 * 0.5, i as f64)).collect();
        let mut ch = MathChannel::new("slope", MathOp::Derivative, 0, 0);
        let out = ch.evaluate(&ramp, &[]);
        assert_eq!(out[0].1, 0.0);
        assert_relative_eq!(out[9].1, 2.0);
    }

    #[test]
    fn test_update_integrates_across_history_wrap() {
        let mut history = RingBuffer::new(8);
        let mut ch = MathChannel::new("int", MathOp::Integral, 0, 0);
        for i in 0..5 {
            history.push((i as f64, 1.0));
        }
        let out = ch.update(&history, None);
        assert_eq!(out.len(), 5);
        assert_relative_eq!(ch.integral(), 4.0);

        for i in 5..20 {
            history.push((i as f64, 1.0));
        }
        let out = ch.update(&history, None);
        assert_eq!(out.len(), 8);
        assert_relative_eq!(out[7].1, 19.0);
        assert_relative_eq!(out[0].1, 12.0);

        // Nothing new, nothing changes
        ch.update(&history, None);
        assert_relative_eq!(ch.integral(), 19.0);
    }

    #[test]
    fn test_update_restarts_after_rewind() {
        let mut history = RingBuffer::new(8);
        let mut ch = MathChannel::new("int", MathOp::Integral, 0, 0);
        for i in 0..6 {
            history.push((i as f64, 2.0));
        }
        ch.update(&history, None);
        assert_relative_eq!(ch.integral(), 10.0);

        history.clear();
        for i in 0..3 {
            history.push((i as f64, 2.0));
        }
        let out = ch.update(&history, None);
        assert_eq!(out.len(), 3);
        assert_relative_eq!(ch.integral(), 4.0);
    }

    #[test]
    fn test_parse() {
        assert_eq!(MathOp::parse("d/dt"), Some(MathOp::Derivative));
        assert_eq!(MathOp::parse("*"), Some(MathOp::Multiply));
        assert!(MathOp::Add.is_binary());
        assert!(!MathOp::Abs.is_binary());
    }
}
