//! # Density Module
//!
//! Regular grids that hold calculated electron density, plus the solvent mask derived from
//! atom positions on the same grid.
//!
//! - [`grid`] - Grid geometry and the additive density grid used as map segments
//! - [`solvent`] - Solvent/protein classification of grid voxels

pub mod grid;
pub mod solvent;
