//! CPU linear-algebra backend
//!
//! Thin layer over nalgebra's in-place kernels (`gemm`, `gemm_tr`, `gemv`,
//! `ger`, triangular solves, Cholesky). Every kernel writes into a buffer the
//! caller already owns, so a recursion that reuses its workspace does no heap
//! allocation per step.

use lgs_core::{DenseLinalg, Error, Result, Transpose};
use nalgebra::linalg::Cholesky;
use nalgebra::{DMatrix, DVector};

/// CPU backend built on nalgebra.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuBackend;

impl CpuBackend {
    /// Create a new CPU backend
    pub fn new() -> Self {
        Self
    }
}

/// `c <- beta * c`, treating `beta == 0` as an overwrite.
fn scale_output(beta: f64, c: &mut DMatrix<f64>) {
    if beta == 0.0 {
        c.fill(0.0);
    } else if beta != 1.0 {
        *c *= beta;
    }
}

impl DenseLinalg for CpuBackend {
    fn gemm(
        &self,
        trans_a: Transpose,
        trans_b: Transpose,
        alpha: f64,
        a: &DMatrix<f64>,
        b: &DMatrix<f64>,
        beta: f64,
        c: &mut DMatrix<f64>,
    ) {
        let (m, k) = trans_a.shape(a.nrows(), a.ncols());
        let (kb, n) = trans_b.shape(b.nrows(), b.ncols());
        assert_eq!(k, kb, "gemm: inner dimensions differ");
        assert_eq!((c.nrows(), c.ncols()), (m, n), "gemm: output has wrong shape");

        match (trans_a, trans_b) {
            (Transpose::No, Transpose::No) => c.gemm(alpha, a, b, beta),
            (Transpose::Yes, Transpose::No) => c.gemm_tr(alpha, a, b, beta),
            (Transpose::No, Transpose::Yes) => {
                // a b^T = sum_l a[:, l] b[:, l]^T
                scale_output(beta, c);
                for l in 0..k {
                    c.ger(alpha, &a.column(l), &b.column(l), 1.0);
                }
            }
            (Transpose::Yes, Transpose::Yes) => {
                scale_output(beta, c);
                for j in 0..n {
                    for i in 0..m {
                        c[(i, j)] += alpha * a.column(i).tr_dot(&b.row(j));
                    }
                }
            }
        }
    }

    fn gemv(
        &self,
        trans_a: Transpose,
        alpha: f64,
        a: &DMatrix<f64>,
        x: &DVector<f64>,
        beta: f64,
        y: &mut DVector<f64>,
    ) {
        let (m, k) = trans_a.shape(a.nrows(), a.ncols());
        assert_eq!(x.len(), k, "gemv: x has wrong length");
        assert_eq!(y.len(), m, "gemv: y has wrong length");

        match trans_a {
            Transpose::No => y.gemv(alpha, a, x, beta),
            Transpose::Yes => y.gemv_tr(alpha, a, x, beta),
        }
    }

    fn cholesky_in_place(&self, a: &mut DMatrix<f64>) -> Result<()> {
        let n = a.nrows();
        if a.ncols() != n {
            return Err(Error::DimensionMismatch(format!(
                "Cholesky needs a square matrix, got {}x{}",
                n,
                a.ncols()
            )));
        }

        // nalgebra factorizes the owned storage in place; hand it over and take it back.
        let owned = std::mem::replace(a, DMatrix::zeros(0, 0));
        let Some(chol) = Cholesky::new(owned) else {
            *a = DMatrix::zeros(n, n);
            return Err(Error::NumericalDegeneracy(
                "matrix is not positive definite (Cholesky failed)".to_string(),
            ));
        };
        *a = chol.unpack();

        for i in 0..n {
            let d = a[(i, i)];
            if d <= 0.0 || !d.is_finite() {
                return Err(Error::NumericalDegeneracy(
                    "matrix is not positive definite (invalid Cholesky diagonal)".to_string(),
                ));
            }
        }
        Ok(())
    }

    fn solve_lower(&self, trans: Transpose, l: &DMatrix<f64>, b: &mut DMatrix<f64>) -> Result<()> {
        assert_eq!(l.nrows(), b.nrows(), "solve_lower: factor and rhs rows differ");
        let ok = match trans {
            Transpose::No => l.solve_lower_triangular_mut(b),
            Transpose::Yes => l.tr_solve_lower_triangular_mut(b),
        };
        if ok {
            Ok(())
        } else {
            Err(Error::NumericalDegeneracy("triangular factor has a zero pivot".to_string()))
        }
    }

    fn solve_lower_vec(
        &self,
        trans: Transpose,
        l: &DMatrix<f64>,
        b: &mut DVector<f64>,
    ) -> Result<()> {
        assert_eq!(l.nrows(), b.len(), "solve_lower_vec: factor and rhs lengths differ");
        let ok = match trans {
            Transpose::No => l.solve_lower_triangular_mut(b),
            Transpose::Yes => l.tr_solve_lower_triangular_mut(b),
        };
        if ok {
            Ok(())
        } else {
            Err(Error::NumericalDegeneracy("triangular factor has a zero pivot".to_string()))
        }
    }

    fn copy(&self, x: &DVector<f64>, y: &mut DVector<f64>) {
        y.copy_from(x);
    }

    fn axpy(&self, alpha: f64, x: &DVector<f64>, y: &mut DVector<f64>) {
        y.axpy(alpha, x, 1.0);
    }

    fn dot(&self, x: &DVector<f64>, y: &DVector<f64>) -> f64 {
        x.dot(y)
    }

    fn ger(&self, alpha: f64, x: &DVector<f64>, y: &DVector<f64>, a: &mut DMatrix<f64>) {
        a.ger(alpha, x, y, 1.0);
    }

    fn name(&self) -> &str {
        "CPU"
    }
}
