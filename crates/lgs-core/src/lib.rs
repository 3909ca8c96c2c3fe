//! # lgs-core
//!
//! Core types for `lgs`:
//! - [`Error`] / [`Result`] shared by every crate in the workspace
//! - [`DenseLinalg`], the dense linear-algebra contract the inference code is
//!   written against
//! - [`GaussianBelief`], the mean/covariance pair passed between primitives
//!
//! The inference crate depends on the trait, not on a concrete backend;
//! `lgs-compute` provides the CPU implementation.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use traits::{DenseLinalg, Transpose};
pub use types::GaussianBelief;
