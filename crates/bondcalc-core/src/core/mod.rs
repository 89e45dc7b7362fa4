//! # Core Module
//!
//! Stateless building blocks shared by the engine: the bond graph model, the element table,
//! geometry utilities, density grids, pairwise potentials and the surface area algorithm.
//!
//! - **Molecular Representation** ([`models`]) - Atoms, anchors, bonds and torsion parameters
//! - **Element Data** ([`elements`]) - Radii, well depths and electron counts per element
//! - **Density** ([`density`]) - Map grids, per-element summation targets and solvent masks
//! - **Energy Calculations** ([`forcefield`]) - Pairwise potentials used for scoring
//! - **Surface Area** ([`surface`]) - Solvent accessible surface area
//! - **Geometry** ([`utils`]) - Internal-coordinate placement and RMSD

pub mod density;
pub mod elements;
pub mod forcefield;
pub mod models;
pub mod surface;
pub mod utils;
