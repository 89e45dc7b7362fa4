//! # Core Models Module
//!
//! Data structures describing the flexible molecular model that every bond sequence
//! materializes.
//!
//! - [`atom`] - Atom identity, element, role and reference position
//! - [`graph`] - The anchored bond graph with internal coordinates and torsion parameters
//! - [`ids`] - Slot-map keys for atoms
//!
//! ```ignore
//! use bondcalc::core::models::{atom::Atom, graph::BondGraph};
//!
//! let mut graph = BondGraph::new();
//! let n = graph.add_anchor(Atom::new("N", "N", Point3::origin()), frame)?;
//! let phi = graph.add_parameter("phi", true)?;
//! graph.add_atom_from_reference(Atom::new("CA", "C", ca_pos), n, Some(phi))?;
//! ```

pub mod atom;
pub mod graph;
pub mod ids;
