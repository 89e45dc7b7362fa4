use crate::core::models::graph::{BondGraph, TorsionParameter};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Debug;
use std::ops::AddAssign;

/// Maps sampled coordinates onto per-parameter torsion deltas.
pub trait TorsionBasis: Send + Sync + Debug {
    fn parameter_count(&self) -> usize;

    /// Delta in degrees added to the reference torsion of every atom rotated by `parameter`.
    fn torsion_delta(&self, parameter: usize, coords: &[f64]) -> f64;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TorsionBasisType {
    /// Coordinate `i` is the delta of parameter `i`.
    #[default]
    Simple,
    /// Each coordinate scales a supplied vector of deltas over all parameters.
    Concerted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimpleBasis {
    parameters: usize,
}

impl SimpleBasis {
    pub fn new(graph: &BondGraph) -> Self {
        Self {
            parameters: graph.parameters().len(),
        }
    }
}

impl TorsionBasis for SimpleBasis {
    fn parameter_count(&self) -> usize {
        self.parameters
    }

    fn torsion_delta(&self, parameter: usize, coords: &[f64]) -> f64 {
        coords.get(parameter).copied().unwrap_or(0.0)
    }
}

/// Count of graph parameters that a supplied torsion list left without a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MissingTorsions {
    pub main_chain: usize,
    pub side_chain: usize,
}

impl MissingTorsions {
    pub fn total(&self) -> usize {
        self.main_chain + self.side_chain
    }
}

impl AddAssign for MissingTorsions {
    fn add_assign(&mut self, rhs: Self) {
        self.main_chain += rhs.main_chain;
        self.side_chain += rhs.side_chain;
    }
}

/// Outcome of filling one axis of a [`ConcertedBasis`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AxisReport {
    pub axis: usize,
    pub missing: MissingTorsions,
    /// Supplied names that match no parameter of the graph.
    pub unused: Vec<String>,
}

/// A basis in which every sampler axis moves many torsions together.
#[derive(Debug, Clone, Default)]
pub struct ConcertedBasis {
    parameters: Vec<TorsionParameter>,
    index: HashMap<String, usize>,
    axes: Vec<Vec<f64>>,
    missing: MissingTorsions,
}

impl ConcertedBasis {
    pub fn new(graph: &BondGraph) -> Self {
        let parameters = graph.parameters().to_vec();
        let index = parameters
            .iter()
            .enumerate()
            .map(|(i, p)| (p.name.clone(), i))
            .collect();
        Self {
            parameters,
            index,
            axes: Vec::new(),
            missing: MissingTorsions::default(),
        }
    }

    /// Appends an axis whose delta for each named parameter is the paired value. Parameters
    /// that receive no value stay at zero on this axis and are tallied as missing.
    pub fn supply_torsions<S: AsRef<str>>(&mut self, names: &[S], values: &[f64]) -> AxisReport {
        let mut axis = vec![0.0; self.parameters.len()];
        let mut covered = vec![false; self.parameters.len()];
        let mut unused = Vec::new();

        for (name, value) in names.iter().zip(values) {
            match self.index.get(name.as_ref()) {
                Some(&idx) => {
                    axis[idx] = *value;
                    covered[idx] = true;
                }
                None => unused.push(name.as_ref().to_string()),
            }
        }

        let mut missing = MissingTorsions::default();
        for (parameter, _) in self
            .parameters
            .iter()
            .zip(&covered)
            .filter(|(_, covered)| !**covered)
        {
            if parameter.main_chain {
                missing.main_chain += 1;
            } else {
                missing.side_chain += 1;
            }
        }

        self.axes.push(axis);
        self.missing += missing;
        AxisReport {
            axis: self.axes.len() - 1,
            missing,
            unused,
        }
    }

    pub fn axis_count(&self) -> usize {
        self.axes.len()
    }

    /// Missing torsions accumulated over every supplied axis.
    pub fn missing(&self) -> MissingTorsions {
        self.missing
    }
}

impl TorsionBasis for ConcertedBasis {
    fn parameter_count(&self) -> usize {
        self.parameters.len()
    }

    fn torsion_delta(&self, parameter: usize, coords: &[f64]) -> f64 {
        self.axes
            .iter()
            .zip(coords)
            .map(|(axis, weight)| axis.get(parameter).copied().unwrap_or(0.0) * weight)
            .sum()
    }
}
