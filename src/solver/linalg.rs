//! Dense linear algebra kernel.
//!
//! Gaussian elimination with partial pivoting over a row-major dense matrix.
//! The same routine serves the real MNA system (transient/DC) and the complex
//! small-signal system (AC), so it is generic over [`Scalar`].

use std::fmt::Debug;
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};

use num_complex::Complex64;

use crate::error::{Result, SimError};

/// A pivot is rejected when it is this small relative to its column scale.
pub const PIVOT_RELATIVE_EPSILON: f64 = 1e-13;

/// Absolute floor under which any pivot is treated as zero.
pub const PIVOT_ABSOLUTE_EPSILON: f64 = 1e-300;

/// Matrix entry type: real for DC/transient, complex for AC.
pub trait Scalar:
    Copy
    + Debug
    + PartialEq
    + From<f64>
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + AddAssign
    + SubAssign
{
    /// Absolute value (modulus for complex numbers).
    fn magnitude(&self) -> f64;

    /// True when no component is NaN or infinite.
    fn is_finite_value(&self) -> bool;

    fn zero() -> Self {
        Self::from(0.0)
    }
}

impl Scalar for f64 {
    fn magnitude(&self) -> f64 {
        self.abs()
    }

    fn is_finite_value(&self) -> bool {
        self.is_finite()
    }
}

impl Scalar for Complex64 {
    fn magnitude(&self) -> f64 {
        self.norm()
    }

    fn is_finite_value(&self) -> bool {
        self.re.is_finite() && self.im.is_finite()
    }
}

/// Square dense matrix stored row-major.
#[derive(Debug, Clone)]
pub struct DenseMatrix<T> {
    size: usize,
    data: Vec<T>,
}

impl<T: Scalar> DenseMatrix<T> {
    /// Create a zero matrix of dimension `size`.
    pub fn new(size: usize) -> Self {
        Self {
            size,
            data: vec![T::zero(); size * size],
        }
    }

    /// Matrix dimension.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Reset every entry to zero.
    pub fn clear(&mut self) {
        self.data.fill(T::zero());
    }

    /// Get matrix element at (row, col).
    pub fn get(&self, row: usize, col: usize) -> T {
        self.data[row * self.size + col]
    }

    /// Set matrix element at (row, col).
    pub fn set(&mut self, row: usize, col: usize, value: T) {
        self.data[row * self.size + col] = value;
    }

    /// Add to matrix element at (row, col).
    pub fn add(&mut self, row: usize, col: usize, value: T) {
        self.data[row * self.size + col] += value;
    }

    fn swap_rows(&mut self, r1: usize, r2: usize) {
        let n = self.size;
        for j in 0..n {
            self.data.swap(r1 * n + j, r2 * n + j);
        }
    }
}

/// Solve `A·x = b` without modifying the inputs.
pub fn solve<T: Scalar>(a: &DenseMatrix<T>, b: &[T]) -> Result<Vec<T>> {
    let mut work = a.clone();
    let mut x = b.to_vec();
    solve_in_place(&mut work, &mut x)?;
    Ok(x)
}

/// Solve `A·x = b` in place: `a` is destroyed and `b` becomes `x`.
///
/// Fails with [`SimError::SingularMatrix`] naming the unknown index when a
/// pivot column has no entry above the singularity threshold.
pub fn solve_in_place<T: Scalar>(a: &mut DenseMatrix<T>, b: &mut [T]) -> Result<()> {
    let n = a.size();
    debug_assert_eq!(b.len(), n);

    // Column scales taken before elimination set the per-column threshold.
    let mut scale = vec![0.0f64; n];
    for i in 0..n {
        for (j, s) in scale.iter_mut().enumerate() {
            *s = s.max(a.get(i, j).magnitude());
        }
    }

    for k in 0..n {
        // Find pivot
        let mut max_val = a.get(k, k).magnitude();
        let mut max_row = k;
        for i in (k + 1)..n {
            let val = a.get(i, k).magnitude();
            if val > max_val {
                max_val = val;
                max_row = i;
            }
        }

        let threshold = (PIVOT_RELATIVE_EPSILON * scale[k]).max(PIVOT_ABSOLUTE_EPSILON);
        if max_val <= threshold {
            return Err(SimError::SingularMatrix {
                index: k,
                unknown: format!("unknown #{k}"),
            });
        }

        if max_row != k {
            a.swap_rows(k, max_row);
            b.swap(k, max_row);
        }

        // Eliminate below the pivot
        let pivot = a.get(k, k);
        for i in (k + 1)..n {
            let factor = a.get(i, k) / pivot;
            if factor.magnitude() == 0.0 {
                continue;
            }
            a.set(i, k, T::zero());
            for j in (k + 1)..n {
                let v = a.get(k, j);
                a.add(i, j, -(factor * v));
            }
            let bk = b[k];
            b[i] -= factor * bk;
        }
    }

    // Back substitution
    for i in (0..n).rev() {
        let mut sum = b[i];
        for j in (i + 1)..n {
            sum -= a.get(i, j) * b[j];
        }
        b[i] = sum / a.get(i, i);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_solve_needs_pivoting() {
        // Zero on the leading diagonal forces a row swap.
        let mut a = DenseMatrix::<f64>::new(3);
        let rows = [[0.0, 2.0, 1.0], [1.0, 1.0, 1.0], [2.0, 1.0, 3.0]];
        for (i, row) in rows.iter().enumerate() {
            for (j, &v) in row.iter().enumerate() {
                a.set(i, j, v);
            }
        }
        let x = solve(&a, &[5.0, 6.0, 13.0]).unwrap();
        assert_relative_eq!(x[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(x[1], 2.0, epsilon = 1e-12);
        assert_relative_eq!(x[2], 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_singular_matrix_is_reported() {
        let mut a = DenseMatrix::<f64>::new(2);
        a.set(0, 0, 1e-3);
        a.set(0, 1, -1e-3);
        a.set(1, 0, -1e-3);
        a.set(1, 1, 1e-3);
        let err = solve(&a, &[0.0, 0.0]).unwrap_err();
        assert!(matches!(err, SimError::SingularMatrix { .. }));
    }

    #[test]
    fn test_zero_column_is_singular() {
        let mut a = DenseMatrix::<f64>::new(2);
        a.set(0, 0, 1.0);
        let err = solve(&a, &[1.0, 0.0]).unwrap_err();
        assert!(matches!(err, SimError::SingularMatrix { .. }));
    }

    #[test]
    fn test_tiny_but_consistent_conductance_is_not_singular() {
        // A node held only by a reverse-biased junction is still solvable.
        let mut a = DenseMatrix::<f64>::new(2);
        a.set(0, 0, 1e3);
        a.set(1, 1, 1e-12);
        let x = solve(&a, &[1e3, 1e-12]).unwrap();
        assert_relative_eq!(x[0], 1.0);
        assert_relative_eq!(x[1], 1.0);
    }

    #[test]
    fn test_complex_solve() {
        let mut a = DenseMatrix::<Complex64>::new(2);
        a.set(0, 0, Complex64::new(1.0, 1.0));
        a.set(0, 1, Complex64::new(0.0, -1.0));
        a.set(1, 0, Complex64::new(0.0, -1.0));
        a.set(1, 1, Complex64::new(2.0, 0.0));
        let b = [Complex64::new(1.0, 0.0), Complex64::new(0.0, 0.0)];
        let x = solve(&a, &b).unwrap();
        // Check A·x = b
        let r0 = a.get(0, 0) * x[0] + a.get(0, 1) * x[1];
        let r1 = a.get(1, 0) * x[0] + a.get(1, 1) * x[1];
        assert_relative_eq!(r0.re, 1.0, epsilon = 1e-12);
        assert_relative_eq!(r0.im, 0.0, epsilon = 1e-12);
        assert_relative_eq!(r1.norm(), 0.0, epsilon = 1e-12);
    }
}
