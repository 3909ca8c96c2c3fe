//! Linear-Gaussian state space models.

/// Time-varying model definition and flat-buffer constructors.
pub mod model;

/// Preallocated scratch buffers.
pub mod workspace;

/// Gaussian primitives (conditioning, prediction, sampling, RTS step).
pub mod gaussian;

/// Kalman filter / RTS smoother.
pub mod kalman;

/// Forward-filtering backward-sampling.
pub mod ffbs;

/// E-step sufficient statistics for EM.
pub mod em;

/// Forecasting utilities.
pub mod forecast;

/// Simulation utilities.
pub mod simulate;

mod internal;
