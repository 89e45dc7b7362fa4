//! # bondcalc Core Library
//!
//! A multi-threaded engine that materializes many sampled conformations of a flexible
//! molecular model at once. Each conformation is produced by walking a directed bond graph
//! from its anchor and applying per-bond torsion rotations; the resulting positions feed a
//! fixed pipeline of downstream stages (deviations, force-field scores, surface areas and
//! electron-density maps).
//!
//! ## Architectural Philosophy
//!
//! The library follows a strict three-layer architecture:
//!
//! - **[`core`]: The Foundation.** Stateless data models (`BondGraph`), geometry helpers,
//!   density grids, the element table and pure potentials.
//!
//! - **[`engine`]: The Logic Core.** The stateful concurrent pipeline: jobs and tickets,
//!   `BondSequence` state machines, blocking resource pools, worker threads, the
//!   `MapSumHandler` fan-in aggregator and the `BondCalculator` facade.
//!
//! - **[`workflows`]: The Public API.** High-level procedures that drive a calculator over a
//!   whole sampler and summarize the results per sample point.

pub mod core;
pub mod engine;
pub mod workflows;
