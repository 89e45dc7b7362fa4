pub mod block;

use self::block::{AtomBlock, Reference, build_blocks};
use super::calculator::CancelFlags;
use super::job::{Job, SampleSource};
use super::result::AtomPosMap;
use super::sampler::Sampler;
use super::torsion::TorsionBasis;
use crate::core::models::graph::{BondGraph, GraphError};
use crate::core::utils::geometry::{calculate_rmsd, place_atom};
use nalgebra::Point3;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Range;
use std::sync::Arc;
use tracing::{instrument, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SequenceState {
    Idle,
    InPreparation,
    Calculating,
    PositionsReady,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalcOutcome {
    Completed,
    /// A cancellation flag was raised between blocks; positions are not usable.
    Interrupted,
}

/// An atom position tagged with its element, as consumed by the map stage.
#[derive(Debug, Clone, PartialEq)]
pub struct ElePos {
    pub element: Arc<str>,
    pub position: Point3<f64>,
}

/// One materialized conformation of a bond graph.
///
/// A sequence is owned by exactly one worker at a time and moves through
/// `Idle -> InPreparation -> Calculating -> PositionsReady -> Idle` once per job.
pub struct BondSequence {
    id: usize,
    blocks: Vec<AtomBlock>,
    basis: Arc<dyn TorsionBasis>,
    sampler: Option<Arc<dyn Sampler>>,
    parameter_count: usize,
    state: SequenceState,
    job: Option<Job>,
    custom: Option<Vec<f64>>,
    fetched: Vec<f64>,
    /// Deltas the current positions were computed with.
    applied: Option<Vec<f64>>,
    full_recalculation: bool,
    last_range: Range<usize>,
}

impl fmt::Debug for BondSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BondSequence")
            .field("id", &self.id)
            .field("blocks", &self.blocks.len())
            .field("state", &self.state)
            .field("ticket", &self.job.as_ref().map(|j| j.ticket()))
            .finish()
    }
}

impl BondSequence {
    pub fn new(
        id: usize,
        graph: &BondGraph,
        basis: Arc<dyn TorsionBasis>,
    ) -> Result<Self, GraphError> {
        let blocks = build_blocks(graph)?;
        Ok(Self {
            id,
            blocks,
            basis,
            sampler: None,
            parameter_count: graph.parameters().len(),
            state: SequenceState::Idle,
            job: None,
            custom: None,
            fetched: Vec::new(),
            applied: None,
            full_recalculation: true,
            last_range: 0..0,
        })
    }

    pub fn set_sampler(&mut self, sampler: Option<Arc<dyn Sampler>>) {
        self.sampler = sampler;
    }

    /// With full recalculation off, only blocks at or after the first block whose torsion
    /// changed since the previous job are recomputed.
    pub fn set_full_recalculation(&mut self, full: bool) {
        self.full_recalculation = full;
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn state(&self) -> SequenceState {
        self.state
    }

    pub fn blocks(&self) -> &[AtomBlock] {
        &self.blocks
    }

    pub fn job(&self) -> Option<&Job> {
        self.job.as_ref()
    }

    pub(crate) fn job_mut(&mut self) -> Option<&mut Job> {
        self.job.as_mut()
    }

    /// Block range recomputed by the most recent completed calculation.
    pub fn last_calculated(&self) -> Range<usize> {
        self.last_range.clone()
    }

    /// Forces the sequence into preparation without touching its job or positions.
    pub fn reset(&mut self) {
        self.state = SequenceState::InPreparation;
    }

    /// Binds `job` and fetches the torsion deltas for its sample.
    ///
    /// # Panics
    ///
    /// Panics if the sequence is not idle.
    pub fn begin_job(&mut self, job: Job) {
        assert_eq!(
            self.state,
            SequenceState::Idle,
            "bond sequence {} must be idle to accept a job",
            self.id
        );

        let sampled: Vec<f64> = match job.sample() {
            SampleSource::Custom(values) => {
                self.custom = Some(values.clone());
                Vec::new()
            }
            SampleSource::Point(idx) => match self.sampler.as_ref().and_then(|s| s.point(*idx)) {
                Some(point) => point.to_vec(),
                None => {
                    warn!(
                        ticket = %job.ticket(),
                        point = *idx,
                        "Sample point unavailable, using reference torsions"
                    );
                    Vec::new()
                }
            },
        };

        let coords = self.custom.as_deref().unwrap_or(&sampled);
        self.fetched = (0..self.parameter_count)
            .map(|p| self.basis.torsion_delta(p, coords))
            .collect();
        self.job = Some(job);
        self.state = SequenceState::InPreparation;
    }

    fn first_changed_block(&self) -> usize {
        let applied = match &self.applied {
            Some(applied) if !self.full_recalculation => applied,
            _ => return 0,
        };
        self.blocks
            .iter()
            .position(|block| {
                block
                    .geometry
                    .as_ref()
                    .and_then(|g| g.parameter)
                    .is_some_and(|p| applied[p] != self.fetched[p])
            })
            .unwrap_or(self.blocks.len())
    }

    fn resolve(&self, reference: Reference) -> Point3<f64> {
        match reference {
            Reference::Block(idx) => self.blocks[idx].position,
            Reference::Fixed(point) => point,
        }
    }

    /// Places every computed block from its ancestors, checking `flags` before each block.
    ///
    /// # Panics
    ///
    /// Panics unless the sequence is in preparation.
    #[instrument(level = "trace", skip_all, fields(sequence = self.id))]
    pub fn calculate(&mut self, flags: &CancelFlags) -> CalcOutcome {
        assert_eq!(
            self.state,
            SequenceState::InPreparation,
            "bond sequence {} must be prepared before calculation",
            self.id
        );
        self.state = SequenceState::Calculating;

        let start = self.first_changed_block();
        let end = self.blocks.len();
        trace!(start, end, "Calculating blocks");

        for i in start..end {
            if flags.should_interrupt() {
                self.applied = None;
                return CalcOutcome::Interrupted;
            }
            let block = &self.blocks[i];
            if !block.computed {
                continue;
            }
            let position = match &block.geometry {
                None => block.reference,
                Some(geometry) => {
                    let [a, b, c] = geometry.ancestors.map(|r| self.resolve(r));
                    let delta = geometry.parameter.map_or(0.0, |p| self.fetched[p]);
                    place_atom(
                        &a,
                        &b,
                        &c,
                        geometry.bond_length,
                        geometry.bond_angle,
                        geometry.torsion + delta,
                    )
                }
            };
            self.blocks[i].position = position;
        }

        self.applied = Some(self.fetched.clone());
        self.last_range = start..end;
        self.state = SequenceState::PositionsReady;
        CalcOutcome::Completed
    }

    fn assert_ready(&self) {
        assert_eq!(
            self.state,
            SequenceState::PositionsReady,
            "positions requested from bond sequence {} before calculation",
            self.id
        );
    }

    fn extracted(&self) -> impl Iterator<Item = &AtomBlock> {
        self.blocks.iter().filter(|b| b.extracted)
    }

    /// # Panics
    ///
    /// Panics unless positions are ready.
    pub fn extract_positions(&self) -> AtomPosMap {
        self.assert_ready();
        let mut map = AtomPosMap::with_capacity(self.blocks.len());
        for block in self.extracted() {
            map.insert(block.atom, block.position);
        }
        map
    }

    /// Extracted positions in sequence order.
    ///
    /// # Panics
    ///
    /// Panics unless positions are ready.
    pub fn extract_vector(&self) -> Vec<Point3<f64>> {
        self.assert_ready();
        self.extracted().map(|b| b.position).collect()
    }

    /// # Panics
    ///
    /// Panics unless positions are ready.
    pub fn extract_for_map(&self) -> Vec<ElePos> {
        self.assert_ready();
        self.extracted()
            .map(|b| ElePos {
                element: Arc::clone(&b.element),
                position: b.position,
            })
            .collect()
    }

    /// RMSD of extracted atoms against their reference positions; NaN when no atom is
    /// comparable.
    ///
    /// # Panics
    ///
    /// Panics unless positions are ready.
    pub fn calculate_deviations(&self) -> f64 {
        self.assert_ready();
        let (calculated, reference): (Vec<_>, Vec<_>) = self
            .extracted()
            .filter(|b| b.reference.coords.iter().all(|v| v.is_finite()))
            .map(|b| (b.position, b.reference))
            .unzip();
        calculate_rmsd(&calculated, &reference).unwrap_or(f64::NAN)
    }

    /// Drops all per-job state and returns the bound job, if any. Calling it again on an
    /// idle sequence is a no-op returning `None`.
    pub fn clean_up_to_idle(&mut self) -> Option<Job> {
        self.custom = None;
        self.fetched.clear();
        if self.state != SequenceState::PositionsReady {
            self.applied = None;
        }
        self.state = SequenceState::Idle;
        self.job.take()
    }

    /// Limits computation to blocks at most `max` bonds from the anchor and at most
    /// `side_max` bonds into a side chain. Blocks closer than `min` are computed but not
    /// extracted.
    pub fn reflag_depth(&mut self, min: usize, max: usize, side_max: usize) {
        for i in 0..self.blocks.len() {
            let parent_computed = self.blocks[i]
                .parent
                .is_none_or(|p| self.blocks[p].computed);
            let block = &mut self.blocks[i];
            block.computed = parent_computed && block.depth <= max && block.side_depth <= side_max;
            block.extracted = block.computed && block.depth >= min;
        }
        self.applied = None;
    }

    pub fn element_list(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for block in self.extracted() {
            *counts.entry(block.element.to_string()).or_insert(0) += 1;
        }
        counts
    }
}
