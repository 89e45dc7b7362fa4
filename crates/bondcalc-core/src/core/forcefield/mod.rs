//! # Forcefield Module
//!
//! Pairwise potentials used by the structural scoring stage.

pub mod potentials;
