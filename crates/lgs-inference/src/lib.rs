//! # lgs-inference
//!
//! Inference for time-varying linear-Gaussian state space models.
//!
//! This crate provides:
//! - Kalman filtering and Rauch-Tung-Striebel smoothing
//! - Forward-filtering backward-sampling (FFBS)
//! - E-step sufficient statistics for EM
//! - Forecasting and simulation
//! - Parallel batch execution over sequences and draws
//!
//! ## Architecture
//!
//! Every routine is assembled from a handful of Gaussian primitives in
//! [`timeseries::gaussian`], which are written against the `DenseLinalg`
//! trait from lgs-core. The `*_with` entry points accept any backend; the
//! short forms use `lgs_compute::CpuBackend`.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Parallel batch execution (rayon).
pub mod batch;
/// Linear-Gaussian state space models.
pub mod timeseries;

pub use batch::{ffbs_sample_draws, kalman_filter_batch, kalman_smoother_batch};
pub use timeseries::em::{KalmanEStepResult, kalman_e_step, kalman_e_step_with};
pub use timeseries::ffbs::{KalmanSampleResult, ffbs_sample, ffbs_sample_with};
pub use timeseries::forecast::{
    KalmanForecastIntervals, KalmanForecastResult, kalman_forecast, kalman_forecast_from_last,
    kalman_forecast_intervals,
};
pub use timeseries::kalman::{
    KalmanConfig, KalmanFilterResult, KalmanSmootherResult, MissingPolicy, kalman_filter,
    kalman_filter_with, kalman_smoother, kalman_smoother_with,
};
pub use timeseries::model::{StateSpaceModel, observations_from_row_major};
pub use timeseries::simulate::{KalmanSimResult, kalman_simulate};
pub use timeseries::workspace::KalmanWorkspace;
