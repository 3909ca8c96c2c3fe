//! Gaussian primitives the filter, smoother and sampler are assembled from.
//!
//! Primitives take their scratch from a [`KalmanWorkspace`] and write into
//! caller-provided buffers. Shape disagreements come back as
//! `Error::DimensionMismatch`. In-place primitives ([`condition_on`],
//! [`sample_gaussian`], [`rts_step`]) update their target through `&mut`;
//! the out-of-place ones ([`predict`], [`cross_moment`]) take the result
//! buffer as a separate `&mut` argument, so input and output can never alias.

use lgs_core::{DenseLinalg, Error, GaussianBelief, Result, Transpose};
use nalgebra::{DMatrix, DVector};

use super::internal::{LN_2PI, degenerate, symmetrize_in_place};
use super::workspace::KalmanWorkspace;

/// True when `y` carries the whole-vector missing sentinel (NaN first coordinate).
#[inline]
pub fn is_missing(y: &DVector<f64>) -> bool {
    y.get(0).is_some_and(|v| v.is_nan())
}

/// Condition `belief` on `y ~ N(C x, R)` in place and return `log N(y; C mu, C Sigma C^T + R)`.
///
/// A NaN first coordinate marks `y` missing: the belief is left unchanged and
/// the returned log-likelihood is `0.0`.
///
/// The update uses a single Cholesky factor `L` of the innovation covariance:
/// with `z = L^{-1}(y - C mu)` and `W = L^{-1} C Sigma`,
/// `mu += W^T z` and `Sigma -= W^T W`.
pub fn condition_on<B: DenseLinalg + ?Sized>(
    backend: &B,
    belief: &mut GaussianBelief,
    c: &DMatrix<f64>,
    r: &DMatrix<f64>,
    y: &DVector<f64>,
    ws: &mut KalmanWorkspace,
) -> Result<f64> {
    let n = belief.dim();
    let p = y.len();
    ws.ensure(n, p)?;
    if c.shape() != (p, n) || r.shape() != (p, p) {
        return Err(Error::DimensionMismatch(format!(
            "observation operator must be {p}x{n} with {p}x{p} noise, got {}x{} and {}x{}",
            c.nrows(),
            c.ncols(),
            r.nrows(),
            r.ncols()
        )));
    }
    if is_missing(y) {
        return Ok(0.0);
    }

    // S = C Sigma C^T + R
    backend.gemm(Transpose::No, Transpose::No, 1.0, c, &belief.cov, 0.0, &mut ws.cs);
    ws.s.copy_from(r);
    backend.gemm(Transpose::No, Transpose::Yes, 1.0, &ws.cs, c, 1.0, &mut ws.s);
    backend.cholesky_in_place(&mut ws.s).map_err(degenerate("innovation covariance"))?;

    // z = L^{-1} (y - C mu)
    backend.copy(y, &mut ws.resid);
    backend.gemv(Transpose::No, -1.0, c, &belief.mean, 1.0, &mut ws.resid);
    backend.solve_lower_vec(Transpose::No, &ws.s, &mut ws.resid)?;

    let half_log_det: f64 = (0..p).map(|i| ws.s[(i, i)].ln()).sum();
    let ll = -0.5 * backend.dot(&ws.resid, &ws.resid) - 0.5 * (p as f64) * LN_2PI - half_log_det;

    // W = L^{-1} C Sigma
    backend.solve_lower(Transpose::No, &ws.s, &mut ws.cs)?;
    backend.gemv(Transpose::Yes, 1.0, &ws.cs, &ws.resid, 1.0, &mut belief.mean);
    backend.gemm(Transpose::Yes, Transpose::No, -1.0, &ws.cs, &ws.cs, 1.0, &mut belief.cov);
    symmetrize_in_place(&mut belief.cov);

    Ok(ll)
}

/// Push `belief` through `x' = A x + w`, `w ~ N(0, Q)`, writing `N(A mu, A Sigma A^T + Q)` to `out`.
pub fn predict<B: DenseLinalg + ?Sized>(
    backend: &B,
    belief: &GaussianBelief,
    a: &DMatrix<f64>,
    q: &DMatrix<f64>,
    out: &mut GaussianBelief,
    ws: &mut KalmanWorkspace,
) -> Result<()> {
    let n = belief.dim();
    ws.ensure_state(n)?;
    if a.shape() != (n, n) || q.shape() != (n, n) || out.dim() != n {
        return Err(Error::DimensionMismatch(format!(
            "prediction expects n_state={n} throughout"
        )));
    }

    backend.gemv(Transpose::No, 1.0, a, &belief.mean, 0.0, &mut out.mean);
    backend.gemm(Transpose::No, Transpose::No, 1.0, a, &belief.cov, 0.0, &mut ws.nn);
    out.cov.copy_from(q);
    backend.gemm(Transpose::No, Transpose::Yes, 1.0, &ws.nn, a, 1.0, &mut out.cov);
    symmetrize_in_place(&mut out.cov);
    Ok(())
}

/// Turn standard-normal draws `z` into a draw from `belief`: `z <- mu + L z` with `L L^T = Sigma`.
pub fn sample_gaussian<B: DenseLinalg + ?Sized>(
    backend: &B,
    belief: &GaussianBelief,
    z: &mut DVector<f64>,
    ws: &mut KalmanWorkspace,
) -> Result<()> {
    let n = belief.dim();
    ws.ensure_state(n)?;
    if z.len() != n {
        return Err(Error::DimensionMismatch(format!(
            "draw buffer must have length {n}, got {}",
            z.len()
        )));
    }

    ws.nn.copy_from(&belief.cov);
    backend.cholesky_in_place(&mut ws.nn).map_err(degenerate("sampling covariance"))?;
    backend.copy(&belief.mean, &mut ws.tmp_n);
    backend.gemv(Transpose::No, 1.0, &ws.nn, z, 1.0, &mut ws.tmp_n);
    backend.copy(&ws.tmp_n, z);
    Ok(())
}

/// One Rauch-Tung-Striebel step, turning `filtered` (time `t`) into the smoothed belief in place.
///
/// `predicted_next` is `N(A mu_t, A Sigma_t A^T + Q)` from the forward pass and
/// is consumed as scratch. `gain_t` receives the transposed smoother gain
/// `G^T = P_{t+1|t}^{-1} A Sigma_{t|t}`, computed through two triangular solves
/// rather than an explicit inverse.
pub fn rts_step<B: DenseLinalg + ?Sized>(
    backend: &B,
    a: &DMatrix<f64>,
    filtered: &mut GaussianBelief,
    predicted_next: &mut GaussianBelief,
    smoothed_next: &GaussianBelief,
    gain_t: &mut DMatrix<f64>,
    ws: &mut KalmanWorkspace,
) -> Result<()> {
    let n = filtered.dim();
    ws.ensure_state(n)?;
    if a.shape() != (n, n)
        || gain_t.shape() != (n, n)
        || predicted_next.dim() != n
        || smoothed_next.dim() != n
    {
        return Err(Error::DimensionMismatch(format!(
            "smoother step expects n_state={n} throughout"
        )));
    }

    ws.nn.copy_from(&predicted_next.cov);
    backend.cholesky_in_place(&mut ws.nn).map_err(degenerate("predicted covariance"))?;

    backend.gemm(Transpose::No, Transpose::No, 1.0, a, &filtered.cov, 0.0, gain_t);
    backend.solve_lower(Transpose::No, &ws.nn, gain_t)?;
    backend.solve_lower(Transpose::Yes, &ws.nn, gain_t)?;

    // predicted_next <- predicted_next - smoothed_next
    backend.axpy(-1.0, &smoothed_next.mean, &mut predicted_next.mean);
    predicted_next.cov -= &smoothed_next.cov;

    backend.gemv(Transpose::Yes, -1.0, gain_t, &predicted_next.mean, 1.0, &mut filtered.mean);
    backend.gemm(Transpose::No, Transpose::No, 1.0, &predicted_next.cov, gain_t, 0.0, &mut ws.nn2);
    backend.gemm(Transpose::Yes, Transpose::No, -1.0, gain_t, &ws.nn2, 1.0, &mut filtered.cov);
    symmetrize_in_place(&mut filtered.cov);
    Ok(())
}

/// Smoothed lag-one cross moment `E[x_t x_{t+1}^T | y] = G Sigma_{t+1|T} + mu_{t|T} mu_{t+1|T}^T`.
///
/// `gain_t` is the transposed gain written by [`rts_step`] for the same `t`.
pub fn cross_moment<B: DenseLinalg + ?Sized>(
    backend: &B,
    mean_t: &DVector<f64>,
    smoothed_next: &GaussianBelief,
    gain_t: &DMatrix<f64>,
    out: &mut DMatrix<f64>,
) -> Result<()> {
    let n = smoothed_next.dim();
    if mean_t.len() != n || gain_t.shape() != (n, n) || out.shape() != (n, n) {
        return Err(Error::DimensionMismatch(format!(
            "cross moment expects n_state={n} throughout"
        )));
    }
    backend.gemm(Transpose::Yes, Transpose::No, 1.0, gain_t, &smoothed_next.cov, 0.0, out);
    backend.ger(1.0, mean_t, &smoothed_next.mean, out);
    Ok(())
}
