use super::config::{ScoringConfig, SurfaceConfig};
use super::job::{Job, Requests};
use super::result::{AtomPosMap, ResultStore};
use super::sequence::ElePos;
use crate::core::elements::{self, ElementData};
use crate::core::forcefield::potentials::{apply_flat_bottom, combine, lennard_jones_12_6};
use crate::core::models::graph::{BondGraph, ordered_pair};
use crate::core::models::ids::AtomId;
use crate::core::surface::SurfaceCalculator;
use crossbeam_channel::Sender;
use itertools::Itertools;
use slotmap::SecondaryMap;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{trace, warn};

/// Downstream stages in the order a job visits them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Surface,
    ForceField,
    Maps,
}

impl Stage {
    const ORDER: [Stage; 3] = [Stage::Surface, Stage::ForceField, Stage::Maps];

    pub fn requests(self) -> Requests {
        match self {
            Stage::Surface => Requests::SURFACE_AREA,
            Stage::ForceField => Requests::SCORE_STRUCTURE,
            Stage::Maps => Requests::MAP_SEGMENT
                .union(Requests::MAP_CORRELATION)
                .union(Requests::SOLVENT_MASK),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Stage::Surface => "surface",
            Stage::ForceField => "force-field",
            Stage::Maps => "maps",
        }
    }

    /// First stage after `after` that serves any of `requests`.
    pub fn next(requests: Requests, after: Option<Stage>) -> Option<Stage> {
        Self::ORDER
            .into_iter()
            .filter(|stage| after.is_none_or(|a| *stage > a))
            .find(|stage| requests.intersects(stage.requests()))
    }
}

/// A job in transit between stages, with the positions the remaining stages need.
#[derive(Debug)]
pub struct Handoff {
    pub job: Job,
    pub positions: AtomPosMap,
    /// Element-tagged positions, filled only for jobs that reach the map stage.
    pub map_points: Vec<ElePos>,
}

/// Routes handoffs to the next stage a job needs, or completes the job.
#[derive(Clone)]
pub struct Dispatcher {
    surface: Sender<Handoff>,
    force_field: Sender<Handoff>,
    maps: Option<Sender<Handoff>>,
    results: ResultStore,
}

impl Dispatcher {
    pub fn new(
        surface: Sender<Handoff>,
        force_field: Sender<Handoff>,
        maps: Option<Sender<Handoff>>,
        results: ResultStore,
    ) -> Self {
        Self {
            surface,
            force_field,
            maps,
            results,
        }
    }

    /// Hands the job to the first stage after `after` that it still needs. Only ever
    /// enqueues, so the calling worker can move on at once.
    pub fn forward(&self, handoff: Handoff, after: Option<Stage>) {
        let ticket = handoff.job.ticket();
        let next = Stage::next(handoff.job.requests(), after);
        trace!(%ticket, ?after, ?next, "Forwarding job");

        let sender = match next {
            None => {
                self.results.submit(handoff.job.into_result());
                return;
            }
            Some(Stage::Surface) => &self.surface,
            Some(Stage::ForceField) => &self.force_field,
            Some(Stage::Maps) => match &self.maps {
                Some(maps) => maps,
                None => {
                    warn!(%ticket, "No map stage configured, completing without maps");
                    self.results.submit(handoff.job.into_result());
                    return;
                }
            },
        };
        if sender.send(handoff).is_err() {
            warn!(%ticket, stage = ?next, "Stage has shut down, dropping job");
        }
    }
}

/// A downstream stage that adds its output to a job in transit.
pub trait StageHandler: Send + Sync {
    fn stage(&self) -> Stage;

    fn process(&self, handoff: &mut Handoff);
}

fn element_table(graph: &BondGraph) -> SecondaryMap<AtomId, Arc<str>> {
    graph
        .atoms_iter()
        .map(|(id, atom)| (id, Arc::from(atom.element.as_str())))
        .collect()
}

/// Solvent accessible surface area of the extracted atoms.
#[derive(Debug)]
pub struct SurfaceStage {
    calculator: SurfaceCalculator,
    elements: SecondaryMap<AtomId, Arc<str>>,
}

impl SurfaceStage {
    pub fn new(graph: &BondGraph, config: &SurfaceConfig) -> Self {
        Self {
            calculator: SurfaceCalculator::new(config.probe_radius, config.dots_per_atom),
            elements: element_table(graph),
        }
    }
}

impl StageHandler for SurfaceStage {
    fn stage(&self) -> Stage {
        Stage::Surface
    }

    fn process(&self, handoff: &mut Handoff) {
        let atoms = handoff.positions.iter().filter_map(|(id, pos)| {
            self.elements
                .get(id)
                .map(|element| (pos, element.as_ref()))
        });
        let area = self.calculator.total_area(atoms);
        handoff.job.result_mut().surface_area = Some(area);
    }
}

/// Lennard-Jones 12-6 energy over atom pairs that are not bonded neighbours.
#[derive(Debug)]
pub struct ForceFieldStage {
    params: SecondaryMap<AtomId, &'static ElementData>,
    excluded: HashSet<(AtomId, AtomId)>,
    flat_bottom: f64,
}

impl ForceFieldStage {
    pub fn new(graph: &BondGraph, config: &ScoringConfig) -> Self {
        Self {
            params: graph
                .atoms_iter()
                .map(|(id, atom)| (id, elements::lookup_or_default(&atom.element)))
                .collect(),
            excluded: graph.pairs_within(config.excluded_bonds),
            flat_bottom: config.flat_bottom,
        }
    }

    pub fn score(&self, positions: &AtomPosMap) -> f64 {
        positions
            .iter()
            .filter(|(id, _)| self.params.contains_key(*id))
            .tuple_combinations()
            .filter(|((a, _), (b, _))| !self.excluded.contains(&ordered_pair(*a, *b)))
            .map(|((a, pa), (b, pb))| {
                let (r_min, well_depth) = combine(self.params[a], self.params[b]);
                let dist = (pa - pb).norm();
                apply_flat_bottom(dist, r_min, self.flat_bottom, |d| {
                    lennard_jones_12_6(d, r_min, well_depth)
                })
            })
            .sum()
    }
}

impl StageHandler for ForceFieldStage {
    fn stage(&self) -> Stage {
        Stage::ForceField
    }

    fn process(&self, handoff: &mut Handoff) {
        let score = self.score(&handoff.positions);
        handoff.job.result_mut().score = Some(score);
    }
}
