//! Core traits for lgs
//!
//! This module defines the dense linear-algebra contract the inference
//! routines are written against. High-level code (lgs-inference) does not
//! depend on how a backend multiplies or factorizes; it only sees this trait.
//!
//! Storage is nalgebra's column-major `DMatrix<f64>` / `DVector<f64>`. Every
//! "transpose" is expressed through a [`Transpose`] flag, so callers never
//! materialize transposed copies.

use nalgebra::{DMatrix, DVector};

use crate::Result;

/// Operand transposition flag, BLAS style.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transpose {
    /// Use the operand as stored.
    No,
    /// Use the transpose of the operand.
    Yes,
}

impl Transpose {
    /// Shape `(rows, cols)` of `op(m)` for a stored `rows x cols` matrix.
    #[inline]
    pub fn shape(self, rows: usize, cols: usize) -> (usize, usize) {
        match self {
            Transpose::No => (rows, cols),
            Transpose::Yes => (cols, rows),
        }
    }
}

/// Dense linear-algebra backend (double precision).
///
/// Shapes are the caller's responsibility; implementations may panic on a
/// shape mismatch. The only recoverable failure is a matrix that is not
/// positive definite.
pub trait DenseLinalg: Send + Sync {
    /// `c <- alpha * op(a) * op(b) + beta * c`.
    ///
    /// With `beta == 0` the previous contents of `c` are ignored (NaNs included).
    #[allow(clippy::too_many_arguments)]
    fn gemm(
        &self,
        trans_a: Transpose,
        trans_b: Transpose,
        alpha: f64,
        a: &DMatrix<f64>,
        b: &DMatrix<f64>,
        beta: f64,
        c: &mut DMatrix<f64>,
    );

    /// `y <- alpha * op(a) * x + beta * y`.
    fn gemv(
        &self,
        trans_a: Transpose,
        alpha: f64,
        a: &DMatrix<f64>,
        x: &DVector<f64>,
        beta: f64,
        y: &mut DVector<f64>,
    );

    /// Overwrite a symmetric positive-definite `a` with its lower Cholesky factor
    /// `L` (`a = L L^T`), zeroing the strict upper triangle.
    ///
    /// Returns [`crate::Error::NumericalDegeneracy`] when `a` is not (numerically)
    /// positive definite. The contents of `a` are unspecified after a failure.
    fn cholesky_in_place(&self, a: &mut DMatrix<f64>) -> Result<()>;

    /// Solve `op(L) X = B` in place for a lower-triangular `l` (multiple right-hand sides).
    ///
    /// `Transpose::No` is forward substitution, `Transpose::Yes` back substitution.
    fn solve_lower(&self, trans: Transpose, l: &DMatrix<f64>, b: &mut DMatrix<f64>) -> Result<()>;

    /// Solve `op(L) x = b` in place for a lower-triangular `l` (single right-hand side).
    fn solve_lower_vec(&self, trans: Transpose, l: &DMatrix<f64>, b: &mut DVector<f64>)
    -> Result<()>;

    /// `y <- x`.
    fn copy(&self, x: &DVector<f64>, y: &mut DVector<f64>);

    /// `y <- alpha * x + y`.
    fn axpy(&self, alpha: f64, x: &DVector<f64>, y: &mut DVector<f64>);

    /// `x . y`.
    fn dot(&self, x: &DVector<f64>, y: &DVector<f64>) -> f64;

    /// Rank-1 update `a <- a + alpha * x y^T`.
    fn ger(&self, alpha: f64, x: &DVector<f64>, y: &DVector<f64>, a: &mut DMatrix<f64>);

    /// Backend name (e.g. "CPU").
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transpose_shape() {
        assert_eq!(Transpose::No.shape(3, 2), (3, 2));
        assert_eq!(Transpose::Yes.shape(3, 2), (2, 3));
    }
}
