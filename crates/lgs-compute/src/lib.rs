//! # lgs-compute
//!
//! Dense linear-algebra backends for lgs.
//!
//! This crate provides implementations of the `DenseLinalg` trait:
//! - **CPU backend** (nalgebra BLAS-style kernels) - always available
//!
//! ## Architecture
//!
//! Inference code (lgs-inference) is written against the `DenseLinalg`
//! trait from lgs-core, not against nalgebra kernels directly. Swapping the
//! backend (e.g. for a LAPACK-backed one) does not touch the recursions.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cpu;

pub use cpu::CpuBackend;
