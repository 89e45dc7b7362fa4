//! # Workflows Module
//!
//! High-level procedures that drive a running [`BondCalculator`](crate::engine::calculator::BondCalculator)
//! end to end.
//!
//! ## Overview
//!
//! A workflow owns the submit/collect loop a caller would otherwise write by hand: it turns
//! the calculator's sampler into jobs, reports progress while results trickle in, and folds
//! every result into a per-point summary.
//!
//! ## Architecture
//!
//! - **Sampling Workflow** ([`sample`]) - One job per sampler point, with scores and
//!   deviations tallied per point and non-finite values left out of the means.

pub mod sample;
