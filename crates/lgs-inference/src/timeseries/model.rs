//! Time-varying linear-Gaussian state-space model.
//!
//! State:
//! `x_{t+1} = A_t x_t + w_t`,  `w_t ~ N(0, Q_t)`
//!
//! Observation:
//! `y_t = C_t x_t + v_t`,      `v_t ~ N(0, R_t)`
//!
//! Initial prior:
//! `x_0 ~ N(mu0, Sigma0)`
//!
//! `A[t]`/`Q[t]` drive the transition out of step `t`; `C[t]`/`R[t]` the
//! observation at step `t`. A stationary model repeats the same slice.

use lgs_core::{Error, Result};
use nalgebra::{DMatrix, DVector};

/// Relative tolerance used when checking covariance inputs for symmetry.
const SYMMETRY_RTOL: f64 = 1e-9;

/// Time-varying linear Gaussian state-space model over a horizon of `T` steps.
#[derive(Debug, Clone)]
pub struct StateSpaceModel {
    /// State transition matrices `A_t` (T of n x n).
    pub a: Vec<DMatrix<f64>>,
    /// Process noise covariances `Q_t` (T of n x n).
    pub q: Vec<DMatrix<f64>>,
    /// Observation matrices `C_t` (T of p x n).
    pub c: Vec<DMatrix<f64>>,
    /// Observation noise covariances `R_t` (T of p x p).
    pub r: Vec<DMatrix<f64>>,
    /// Initial state mean `mu0` (n).
    pub mu0: DVector<f64>,
    /// Initial state covariance `Sigma0` (n x n).
    pub sigma0: DMatrix<f64>,
}

impl StateSpaceModel {
    /// Create a new model and validate matrix/vector dimensions.
    pub fn new(
        a: Vec<DMatrix<f64>>,
        q: Vec<DMatrix<f64>>,
        c: Vec<DMatrix<f64>>,
        r: Vec<DMatrix<f64>>,
        mu0: DVector<f64>,
        sigma0: DMatrix<f64>,
    ) -> Result<Self> {
        let model = Self { a, q, c, r, mu0, sigma0 };
        model.validate()?;
        Ok(model)
    }

    /// Repeat a single `(A, Q, C, R)` slice over `t_max` steps.
    pub fn time_invariant(
        a: DMatrix<f64>,
        q: DMatrix<f64>,
        c: DMatrix<f64>,
        r: DMatrix<f64>,
        mu0: DVector<f64>,
        sigma0: DMatrix<f64>,
        t_max: usize,
    ) -> Result<Self> {
        if t_max == 0 {
            return Err(Error::DimensionMismatch("horizon must have T >= 1".to_string()));
        }
        StateSpaceModel::new(
            vec![a; t_max],
            vec![q; t_max],
            vec![c; t_max],
            vec![r; t_max],
            mu0,
            sigma0,
        )
    }

    /// Build a model from flat row-major buffers.
    ///
    /// `a`/`q` hold `t_max` consecutive `n x n` blocks, `c` holds `t_max`
    /// `p x n` blocks and `r` holds `t_max` `p x p` blocks; every block is read
    /// row by row. `sigma0` is a single row-major `n x n` block.
    #[allow(clippy::too_many_arguments)]
    pub fn from_row_major(
        n: usize,
        p: usize,
        t_max: usize,
        a: &[f64],
        q: &[f64],
        c: &[f64],
        r: &[f64],
        mu0: &[f64],
        sigma0: &[f64],
    ) -> Result<Self> {
        if n == 0 || p == 0 || t_max == 0 {
            return Err(Error::DimensionMismatch(format!(
                "n_state, n_obs and T must be > 0 (got n={n}, p={p}, T={t_max})"
            )));
        }
        let a = blocks_from_row_major(a, t_max, n, n, "A")?;
        let q = blocks_from_row_major(q, t_max, n, n, "Q")?;
        let c = blocks_from_row_major(c, t_max, p, n, "C")?;
        let r = blocks_from_row_major(r, t_max, p, p, "R")?;
        if mu0.len() != n {
            return Err(Error::DimensionMismatch(format!(
                "mu0 must have length {n}, got {}",
                mu0.len()
            )));
        }
        if sigma0.len() != n * n {
            return Err(Error::DimensionMismatch(format!(
                "Sigma0 must have {} entries, got {}",
                n * n,
                sigma0.len()
            )));
        }
        StateSpaceModel::new(
            a,
            q,
            c,
            r,
            DVector::from_row_slice(mu0),
            DMatrix::from_row_slice(n, n, sigma0),
        )
    }

    /// Number of latent state dimensions (inferred from `C`).
    pub fn n_state(&self) -> usize {
        self.c.first().map_or(0, |c| c.ncols())
    }

    /// Number of observation dimensions (inferred from `C`).
    pub fn n_obs(&self) -> usize {
        self.c.first().map_or(0, |c| c.nrows())
    }

    /// Horizon length `T`.
    pub fn len(&self) -> usize {
        self.c.len()
    }

    /// True for a model without any timestep (never valid).
    pub fn is_empty(&self) -> bool {
        self.c.is_empty()
    }

    /// Check shapes only: every slice agrees on `n`, `p` and `T`.
    pub fn validate_dims(&self) -> Result<()> {
        let t_max = self.len();
        if t_max == 0 {
            return Err(Error::DimensionMismatch("horizon must have T >= 1".to_string()));
        }
        let n = self.n_state();
        let p = self.n_obs();
        if n == 0 || p == 0 {
            return Err(Error::DimensionMismatch(
                "C must be n_obs x n_state with n_obs>0 and n_state>0".to_string(),
            ));
        }
        for (name, len) in [("A", self.a.len()), ("Q", self.q.len()), ("R", self.r.len())] {
            if len != t_max {
                return Err(Error::DimensionMismatch(format!(
                    "{name} has {len} timesteps, C has {t_max}"
                )));
            }
        }
        for t in 0..t_max {
            check_shape(&self.a[t], n, n, "A", t)?;
            check_shape(&self.q[t], n, n, "Q", t)?;
            check_shape(&self.c[t], p, n, "C", t)?;
            check_shape(&self.r[t], p, p, "R", t)?;
        }
        if self.mu0.len() != n {
            return Err(Error::DimensionMismatch(format!(
                "mu0 must have length {n}, got {}",
                self.mu0.len()
            )));
        }
        if self.sigma0.shape() != (n, n) {
            return Err(Error::DimensionMismatch(format!(
                "Sigma0 must be {n}x{n}, got {}x{}",
                self.sigma0.nrows(),
                self.sigma0.ncols()
            )));
        }
        Ok(())
    }

    /// Full validation: shapes, finiteness, and symmetry of the covariances.
    pub fn validate(&self) -> Result<()> {
        self.validate_dims()?;

        fn all_finite(ms: &[DMatrix<f64>]) -> bool {
            ms.iter().all(|m| m.iter().all(|v| v.is_finite()))
        }
        if !all_finite(&self.a)
            || !all_finite(&self.q)
            || !all_finite(&self.c)
            || !all_finite(&self.r)
            || self.mu0.iter().any(|v| !v.is_finite())
            || self.sigma0.iter().any(|v| !v.is_finite())
        {
            return Err(Error::Validation("model matrices/vectors must be finite".to_string()));
        }

        for t in 0..self.len() {
            check_symmetric(&self.q[t], "Q", Some(t))?;
            check_symmetric(&self.r[t], "R", Some(t))?;
        }
        check_symmetric(&self.sigma0, "Sigma0", None)
    }
}

/// Split a flat `T x p` row-major buffer into one observation vector per timestep.
pub fn observations_from_row_major(data: &[f64], p: usize) -> Result<Vec<DVector<f64>>> {
    if p == 0 {
        return Err(Error::DimensionMismatch("n_obs must be > 0".to_string()));
    }
    if data.is_empty() || data.len() % p != 0 {
        return Err(Error::DimensionMismatch(format!(
            "observation buffer of length {} is not a non-empty multiple of n_obs={p}",
            data.len()
        )));
    }
    Ok(data.chunks_exact(p).map(DVector::from_row_slice).collect())
}

fn blocks_from_row_major(
    data: &[f64],
    t_max: usize,
    rows: usize,
    cols: usize,
    name: &str,
) -> Result<Vec<DMatrix<f64>>> {
    let block = rows * cols;
    if data.len() != t_max * block {
        return Err(Error::DimensionMismatch(format!(
            "{name} buffer must hold {t_max} blocks of {rows}x{cols} ({} values), got {}",
            t_max * block,
            data.len()
        )));
    }
    Ok(data.chunks_exact(block).map(|b| DMatrix::from_row_slice(rows, cols, b)).collect())
}

fn check_shape(m: &DMatrix<f64>, rows: usize, cols: usize, name: &str, t: usize) -> Result<()> {
    if m.shape() != (rows, cols) {
        return Err(Error::DimensionMismatch(format!(
            "{name}[{t}] must be {rows}x{cols}, got {}x{}",
            m.nrows(),
            m.ncols()
        )));
    }
    Ok(())
}

fn check_symmetric(m: &DMatrix<f64>, name: &str, t: Option<usize>) -> Result<()> {
    let n = m.nrows();
    let scale = m.amax().max(1.0);
    for j in 0..n {
        for i in (j + 1)..n {
            if (m[(i, j)] - m[(j, i)]).abs() > SYMMETRY_RTOL * scale {
                let at = t.map(|t| format!("[{t}]")).unwrap_or_default();
                return Err(Error::Validation(format!(
                    "{name}{at} must be symmetric (entry ({i},{j}) differs from ({j},{i}))"
                )));
            }
        }
    }
    Ok(())
}
