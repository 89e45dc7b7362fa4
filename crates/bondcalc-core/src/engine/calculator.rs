use super::config::{CalculatorConfig, ConfigError};
use super::error::EngineError;
use super::job::{Job, SampleSource, Ticket};
use super::map_sum::MapSumHandler;
use super::result::{JobResult, ResultStore};
use super::sampler::Sampler;
use super::sequence::BondSequence;
use super::sequence_handler::BondSequenceHandler;
use super::stages::{Dispatcher, ForceFieldStage, Handoff, SurfaceStage};
use super::torsion::{
    AxisReport, ConcertedBasis, MissingTorsions, SimpleBasis, TorsionBasis, TorsionBasisType,
};
use super::workers;
use crate::core::models::graph::{BondGraph, GraphError};
use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Cooperative cancellation shared by every calculator worker, checked between blocks.
#[derive(Debug, Default)]
pub struct CancelFlags {
    stop: AtomicBool,
    skip: AtomicBool,
}

impl CancelFlags {
    /// Interrupts every calculation until [`resume`](Self::resume) is called.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    pub fn resume(&self) {
        self.stop.store(false, Ordering::Release);
    }

    /// Interrupts the next block check of whichever calculation sees it first.
    pub fn skip_current(&self) {
        self.skip.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    pub(crate) fn should_interrupt(&self) -> bool {
        self.stop.load(Ordering::Acquire) || self.skip.swap(false, Ordering::AcqRel)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Configuring,
    SetUp,
    Running,
    Finished,
}

struct Runtime {
    sequences: Arc<BondSequenceHandler>,
    maps: Option<Arc<MapSumHandler>>,
    shutdown: Option<Sender<()>>,
    threads: Vec<JoinHandle<()>>,
}

/// Runs jobs against one bond graph on a fixed set of worker threads.
///
/// The calculator is configured, set up, started, fed jobs, and finished. Results arrive in
/// completion order and are collected by polling.
pub struct BondCalculator {
    graph: Arc<BondGraph>,
    config: CalculatorConfig,
    sampler: Option<Arc<dyn Sampler>>,
    custom_basis: Option<Arc<dyn TorsionBasis>>,
    concerted: Option<ConcertedBasis>,
    lifecycle: Lifecycle,
    next_ticket: AtomicU64,
    flags: Arc<CancelFlags>,
    results: ResultStore,
    runtime: Option<Runtime>,
}

impl BondCalculator {
    pub fn new(graph: BondGraph, config: CalculatorConfig) -> Self {
        Self {
            graph: Arc::new(graph),
            config,
            sampler: None,
            custom_basis: None,
            concerted: None,
            lifecycle: Lifecycle::Configuring,
            next_ticket: AtomicU64::new(1),
            flags: Arc::new(CancelFlags::default()),
            results: ResultStore::new(),
            runtime: None,
        }
    }

    pub fn graph(&self) -> &BondGraph {
        &self.graph
    }

    pub fn config(&self) -> &CalculatorConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.lifecycle == Lifecycle::Running
    }

    /// Number of points of the configured sampler, zero without one.
    pub fn sample_point_count(&self) -> usize {
        self.sampler.as_ref().map_or(0, |s| s.point_count())
    }

    fn ensure_configurable(&mut self) -> Result<(), EngineError> {
        match self.lifecycle {
            Lifecycle::Running | Lifecycle::Finished => Err(EngineError::AlreadyStarted),
            Lifecycle::SetUp => {
                self.lifecycle = Lifecycle::Configuring;
                self.concerted = None;
                Ok(())
            }
            Lifecycle::Configuring => Ok(()),
        }
    }

    pub fn set_sampler(&mut self, sampler: Arc<dyn Sampler>) -> Result<(), EngineError> {
        self.ensure_configurable()?;
        self.sampler = Some(sampler);
        Ok(())
    }

    /// Selects a built-in basis. Any previous setup must be repeated.
    pub fn set_torsion_basis_type(&mut self, kind: TorsionBasisType) -> Result<(), EngineError> {
        self.ensure_configurable()?;
        self.config.basis = kind;
        self.custom_basis = None;
        Ok(())
    }

    /// Replaces the built-in basis with a caller-supplied one.
    pub fn set_torsion_basis(&mut self, basis: Arc<dyn TorsionBasis>) -> Result<(), EngineError> {
        self.ensure_configurable()?;
        self.custom_basis = Some(basis);
        Ok(())
    }

    pub fn set_max_simultaneous_threads(&mut self, threads: usize) -> Result<(), EngineError> {
        self.ensure_configurable()?;
        if threads == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "threads",
                reason: "must be at least 1".into(),
            }
            .into());
        }
        self.config.threads = threads;
        Ok(())
    }

    /// Validates the configuration and prepares the torsion basis.
    #[instrument(skip_all, name = "calculator_setup")]
    pub fn setup(&mut self) -> Result<(), EngineError> {
        self.ensure_configurable()?;
        let anchor = self.graph.anchor().ok_or(GraphError::MissingAnchor)?;
        let parameters = self.graph.parameters().len();

        if self.custom_basis.is_none() && self.config.basis == TorsionBasisType::Concerted {
            self.concerted = Some(ConcertedBasis::new(&self.graph));
        }
        if let (Some(sampler), None, TorsionBasisType::Simple) =
            (&self.sampler, &self.custom_basis, self.config.basis)
        {
            if sampler.dims() < parameters {
                warn!(
                    dims = sampler.dims(),
                    parameters, "Sampler has fewer dimensions than torsion parameters."
                );
            }
        }

        info!(
            ?anchor,
            atoms = self.graph.atom_count(),
            parameters,
            sequences = self.config.sequence_count(),
            "Calculator set up."
        );
        self.lifecycle = Lifecycle::SetUp;
        Ok(())
    }

    /// Adds one axis to the concerted basis. Only valid between setup and start.
    pub fn supply_torsions<S: AsRef<str>>(
        &mut self,
        names: &[S],
        values: &[f64],
    ) -> Result<AxisReport, EngineError> {
        match self.lifecycle {
            Lifecycle::Configuring => {
                return Err(EngineError::NotSetUp {
                    action: "supplied torsions",
                });
            }
            Lifecycle::Running | Lifecycle::Finished => return Err(EngineError::AlreadyStarted),
            Lifecycle::SetUp => {}
        }
        if names.len() != values.len() {
            return Err(EngineError::TorsionBasis(format!(
                "{} torsion names but {} values",
                names.len(),
                values.len()
            )));
        }
        let basis = self.concerted.as_mut().ok_or_else(|| {
            EngineError::TorsionBasis("torsions can only be supplied to a concerted basis".into())
        })?;

        let report = basis.supply_torsions(names, values);
        if !report.unused.is_empty() {
            debug!(axis = report.axis, unused = ?report.unused, "Supplied torsions not in graph.");
        }
        Ok(report)
    }

    /// Torsion parameters left without a value, summed over every concerted axis.
    pub fn missing_torsions(&self) -> MissingTorsions {
        self.concerted
            .as_ref()
            .map(ConcertedBasis::missing)
            .unwrap_or_default()
    }

    fn build_basis(&self) -> Arc<dyn TorsionBasis> {
        if let Some(basis) = &self.custom_basis {
            return Arc::clone(basis);
        }
        match &self.concerted {
            Some(basis) => {
                if basis.axis_count() == 0 {
                    warn!("Concerted basis has no axes; every sample uses reference torsions.");
                }
                let missing = basis.missing();
                if missing.total() > 0 {
                    info!(
                        main_chain = missing.main_chain,
                        side_chain = missing.side_chain,
                        "Torsions missing from the concerted basis."
                    );
                }
                Arc::new(basis.clone())
            }
            None => Arc::new(SimpleBasis::new(&self.graph)),
        }
    }

    /// Spawns every worker thread. Jobs may be submitted once this returns.
    #[instrument(skip_all, name = "calculator_start")]
    pub fn start(&mut self) -> Result<(), EngineError> {
        match self.lifecycle {
            Lifecycle::Configuring => return Err(EngineError::NotSetUp { action: "started" }),
            Lifecycle::Running | Lifecycle::Finished => return Err(EngineError::AlreadyStarted),
            Lifecycle::SetUp => {}
        }

        let basis = self.build_basis();
        let depth = self.config.depth;
        let sequences = (0..self.config.sequence_count())
            .map(|id| -> Result<BondSequence, EngineError> {
                let mut sequence = BondSequence::new(id, &self.graph, Arc::clone(&basis))?;
                sequence.set_sampler(self.sampler.clone());
                sequence.set_full_recalculation(self.config.full_recalculation);
                sequence.reflag_depth(depth.min, depth.max, depth.side_max);
                Ok(sequence)
            })
            .collect::<Result<Vec<_>, _>>()?;
        let sequences = Arc::new(BondSequenceHandler::new(sequences));

        let maps = self.config.map.clone().map(|map| {
            Arc::new(MapSumHandler::new(
                map,
                self.config.surface.probe_radius,
                self.config.map_threads + 1,
                self.results.clone(),
            ))
        });

        let (surface_tx, surface_rx) = unbounded();
        let (force_field_tx, force_field_rx) = unbounded();
        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);
        let dispatcher = Dispatcher::new(
            surface_tx,
            force_field_tx,
            maps.as_ref().map(|maps| maps.intake()),
            self.results.clone(),
        );

        let mut runtime = Runtime {
            sequences: Arc::clone(&sequences),
            maps: maps.clone(),
            shutdown: Some(shutdown_tx),
            threads: Vec::new(),
        };
        let spawned = self.spawn_workers(
            &mut runtime,
            dispatcher,
            surface_rx,
            force_field_rx,
            &shutdown_rx,
        );
        if let Err(err) = spawned {
            shutdown_runtime(runtime);
            return Err(err);
        }

        info!(
            threads = self.config.threads,
            workers = runtime.threads.len(),
            maps = maps.is_some(),
            "Calculator started."
        );
        self.runtime = Some(runtime);
        self.lifecycle = Lifecycle::Running;
        Ok(())
    }

    fn spawn_workers(
        &self,
        runtime: &mut Runtime,
        dispatcher: Dispatcher,
        surface_rx: Receiver<Handoff>,
        force_field_rx: Receiver<Handoff>,
        shutdown_rx: &Receiver<()>,
    ) -> Result<(), EngineError> {
        for idx in 0..self.config.threads {
            runtime.threads.push(workers::calculator::spawn(
                idx,
                Arc::clone(&runtime.sequences),
                Arc::clone(&self.flags),
            )?);
            runtime.threads.push(workers::extractor::spawn(
                idx,
                Arc::clone(&runtime.sequences),
                dispatcher.clone(),
            )?);
        }

        let surface = Arc::new(SurfaceStage::new(&self.graph, &self.config.surface));
        for idx in 0..self.config.surface_threads {
            runtime.threads.push(workers::stage::spawn(
                idx,
                Arc::clone(&surface),
                surface_rx.clone(),
                shutdown_rx.clone(),
                dispatcher.clone(),
            )?);
        }
        let force_field = Arc::new(ForceFieldStage::new(&self.graph, &self.config.scoring));
        for idx in 0..self.config.scoring_threads {
            runtime.threads.push(workers::stage::spawn(
                idx,
                Arc::clone(&force_field),
                force_field_rx.clone(),
                shutdown_rx.clone(),
                dispatcher.clone(),
            )?);
        }

        if let Some(maps) = &runtime.maps {
            let summers = maps.start(self.config.map_threads, shutdown_rx)?;
            runtime.threads.extend(summers);
        }
        Ok(())
    }

    /// Queues a job and returns its ticket.
    ///
    /// # Errors
    ///
    /// Fails when the calculator is not running, when the job needs maps but no map grid is
    /// configured, or when it names a sample point the sampler does not have.
    pub fn submit(&self, mut job: Job) -> Result<Ticket, EngineError> {
        let runtime = match (&self.runtime, self.lifecycle) {
            (Some(runtime), Lifecycle::Running) => runtime,
            _ => return Err(EngineError::NotRunning),
        };

        let requests = job.requests();
        if requests.needs_maps() && self.config.map.is_none() {
            return Err(EngineError::MissingMapGrid { requests });
        }
        if let SampleSource::Point(index) = job.sample() {
            let count = self.sample_point_count();
            if *index >= count {
                return Err(EngineError::SamplePoint {
                    index: *index,
                    count,
                });
            }
        }

        let ticket = Ticket(self.next_ticket.fetch_add(1, Ordering::Relaxed));
        job.issue(ticket);
        runtime.sequences.submit_job(job);
        Ok(ticket)
    }

    /// Next completed result, without blocking.
    pub fn acquire_result(&self) -> Option<JobResult> {
        self.results.acquire()
    }

    /// Next completed result, waiting up to `timeout`.
    pub fn acquire_result_timeout(&self, timeout: Duration) -> Option<JobResult> {
        self.results.acquire_timeout(timeout)
    }

    pub fn cancel_flags(&self) -> &CancelFlags {
        &self.flags
    }

    /// Jobs submitted but not yet picked up by a calculator worker.
    pub fn queued_jobs(&self) -> usize {
        self.runtime
            .as_ref()
            .map_or(0, |runtime| runtime.sequences.queued_jobs())
    }

    /// Stops every worker and joins its thread. Completed results stay collectable.
    #[instrument(skip_all, name = "calculator_finish")]
    pub fn finish(&mut self) {
        let Some(runtime) = self.runtime.take() else {
            return;
        };
        shutdown_runtime(runtime);
        self.lifecycle = Lifecycle::Finished;
        info!(pending_results = self.results.pending(), "Calculator finished.");
    }
}

fn shutdown_runtime(mut runtime: Runtime) {
    let dropped = runtime.sequences.finish();
    if dropped > 0 {
        warn!(dropped, "Jobs still queued at shutdown were dropped.");
    }
    if let Some(maps) = &runtime.maps {
        maps.finish();
    }
    drop(runtime.shutdown.take());
    for handle in runtime.threads.drain(..) {
        let name = handle.thread().name().unwrap_or("worker").to_string();
        if handle.join().is_err() {
            warn!(thread = %name, "Worker thread panicked.");
        }
    }
}

impl Drop for BondCalculator {
    fn drop(&mut self) {
        self.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::density::grid::GridSpec;
    use crate::core::models::graph::tests::small_graph;
    use crate::engine::config::CalculatorConfigBuilder;
    use crate::engine::job::Requests;
    use crate::engine::sampler::PointSampler;
    use std::collections::HashSet;

    const WAIT: Duration = Duration::from_secs(10);

    fn calculator(config: CalculatorConfig) -> BondCalculator {
        let (graph, _) = small_graph();
        BondCalculator::new(graph, config)
    }

    fn collect(calc: &BondCalculator, count: usize) -> Vec<JobResult> {
        (0..count)
            .map_while(|_| calc.acquire_result_timeout(WAIT))
            .collect()
    }

    fn map_grid() -> GridSpec {
        GridSpec {
            origin: [-6.0, -6.0, -6.0],
            dims: [16, 16, 16],
            spacing: 0.8,
        }
    }

    #[test]
    fn lifecycle_misuse_is_reported() {
        let mut calc = calculator(CalculatorConfig::default());
        assert!(matches!(
            calc.submit(Job::custom(vec![], Requests::NONE)),
            Err(EngineError::NotRunning)
        ));
        assert!(matches!(calc.start(), Err(EngineError::NotSetUp { .. })));

        calc.setup().unwrap();
        calc.start().unwrap();
        assert!(matches!(calc.start(), Err(EngineError::AlreadyStarted)));
        assert!(matches!(
            calc.set_max_simultaneous_threads(2),
            Err(EngineError::AlreadyStarted)
        ));
        calc.finish();
        assert!(!calc.is_running());
        calc.finish();
    }

    #[test]
    fn vector_only_jobs_on_four_threads_yield_vector_only_results() {
        let mut calc = calculator(CalculatorConfig::default());
        calc.set_max_simultaneous_threads(4).unwrap();
        calc.setup().unwrap();
        calc.start().unwrap();

        let tickets: HashSet<Ticket> = (0..10)
            .map(|i| {
                calc.submit(Job::custom(vec![i as f64 * 10.0, 0.0], Requests::POSITION_VECTOR))
                    .unwrap()
            })
            .collect();
        assert_eq!(tickets.len(), 10);

        let results = collect(&calc, 10);
        assert_eq!(results.len(), 10);
        for result in &results {
            assert_eq!(result.populated(), Requests::POSITION_VECTOR);
            assert_eq!(result.vector.as_ref().unwrap().len(), 6);
        }
        let returned: HashSet<Ticket> = results.iter().map(|r| r.ticket).collect();
        assert_eq!(returned, tickets);
        calc.finish();
    }

    #[test]
    fn stage_jobs_on_four_threads_are_shared_by_every_stage_worker() {
        let config = CalculatorConfigBuilder::new()
            .threads(4)
            .scoring_threads(3)
            .build()
            .unwrap();
        assert_eq!(config.surface_threads, 4);
        let mut calc = calculator(config);
        calc.setup().unwrap();
        calc.start().unwrap();

        let requests = Requests::SURFACE_AREA | Requests::SCORE_STRUCTURE;
        let tickets: HashSet<Ticket> = (0..24)
            .map(|i| {
                calc.submit(Job::custom(vec![i as f64 * 15.0, -(i as f64)], requests))
                    .unwrap()
            })
            .collect();

        let results = collect(&calc, tickets.len());
        assert_eq!(results.len(), tickets.len());
        for result in &results {
            assert_eq!(result.populated(), requests);
            assert!(result.surface_area.unwrap() > 0.0);
        }
        let returned: HashSet<Ticket> = results.iter().map(|r| r.ticket).collect();
        assert_eq!(returned, tickets);
        calc.finish();
    }

    #[test]
    fn results_contain_exactly_the_requested_outputs() {
        let config = CalculatorConfigBuilder::new()
            .threads(2)
            .map_grid(map_grid())
            .build()
            .unwrap();
        let mut calc = calculator(config);
        calc.setup().unwrap();
        calc.start().unwrap();

        let masks = [
            Requests::NONE,
            Requests::EXTRACT_POSITIONS | Requests::CALCULATE_DEVIATIONS,
            Requests::SURFACE_AREA,
            Requests::SCORE_STRUCTURE | Requests::POSITION_VECTOR,
            Requests::MAP_SEGMENT | Requests::SURFACE_AREA,
            Requests::MAP_CORRELATION | Requests::SOLVENT_MASK,
            Requests::SOLVENT_MASK,
        ];
        let mut expected = std::collections::HashMap::new();
        for mask in masks {
            let ticket = calc.submit(Job::custom(vec![0.0, 0.0], mask)).unwrap();
            expected.insert(ticket, mask);
        }

        let results = collect(&calc, masks.len());
        assert_eq!(results.len(), masks.len());
        for result in results {
            assert_eq!(result.populated(), expected[&result.ticket]);
            assert_eq!(result.requests, expected[&result.ticket]);
        }
        calc.finish();
    }

    #[test]
    fn map_requests_need_a_grid() {
        let mut calc = calculator(CalculatorConfig::default());
        calc.setup().unwrap();
        calc.start().unwrap();
        assert!(matches!(
            calc.submit(Job::custom(vec![], Requests::MAP_SEGMENT)),
            Err(EngineError::MissingMapGrid { .. })
        ));
    }

    #[test]
    fn sample_points_are_validated_and_recorded() {
        let mut calc = calculator(CalculatorConfig::default());
        let sampler = PointSampler::new(vec![vec![0.0, 0.0], vec![30.0, -30.0]]).unwrap();
        calc.set_sampler(Arc::new(sampler)).unwrap();
        calc.setup().unwrap();
        calc.start().unwrap();

        assert!(matches!(
            calc.submit(Job::for_point(2, Requests::NONE)),
            Err(EngineError::SamplePoint { index: 2, count: 2 })
        ));
        let ticket = calc
            .submit(Job::for_point(1, Requests::POSITION_VECTOR))
            .unwrap();
        let result = calc.acquire_result_timeout(WAIT).unwrap();
        assert_eq!(result.ticket, ticket);
        assert_eq!(result.sample, Some(1));
    }

    #[test]
    fn tickets_are_monotonic_from_one() {
        let mut calc = calculator(CalculatorConfig::default());
        calc.setup().unwrap();
        calc.start().unwrap();
        let first = calc.submit(Job::custom(vec![], Requests::NONE)).unwrap();
        let second = calc.submit(Job::custom(vec![], Requests::NONE)).unwrap();
        assert_eq!(first, Ticket(1));
        assert_eq!(second, Ticket(2));
    }

    #[test]
    fn stopped_jobs_produce_no_result() {
        let mut calc = calculator(CalculatorConfig::default());
        calc.setup().unwrap();
        calc.start().unwrap();

        calc.cancel_flags().stop();
        let job = Job::custom(vec![], Requests::POSITION_VECTOR);
        calc.submit(job).unwrap();
        let stopped = calc.acquire_result_timeout(Duration::from_millis(200));
        assert!(stopped.is_none());

        calc.cancel_flags().resume();
        let ticket = calc
            .submit(Job::custom(vec![], Requests::POSITION_VECTOR))
            .unwrap();
        assert_eq!(calc.acquire_result_timeout(WAIT).unwrap().ticket, ticket);
    }

    #[test]
    fn concerted_basis_takes_torsions_between_setup_and_start() {
        let mut calc = calculator(CalculatorConfig::default());
        let concerted = TorsionBasisType::Concerted;
        calc.set_torsion_basis_type(concerted).unwrap();
        assert!(matches!(
            calc.supply_torsions(&["phi"], &[10.0]),
            Err(EngineError::NotSetUp { .. })
        ));

        calc.setup().unwrap();
        let report = calc.supply_torsions(&["chi1"], &[20.0]).unwrap();
        assert_eq!(report.missing.main_chain, 1);
        assert!(matches!(
            calc.supply_torsions(&["chi1"], &[1.0, 2.0]),
            Err(EngineError::TorsionBasis(_))
        ));
        assert_eq!(calc.missing_torsions().total(), 1);

        calc.start().unwrap();
        let job = Job::custom(vec![1.0], Requests::POSITION_VECTOR);
        calc.submit(job).unwrap();
        assert!(calc.acquire_result_timeout(WAIT).is_some());
        assert!(matches!(
            calc.supply_torsions(&["phi"], &[1.0]),
            Err(EngineError::AlreadyStarted)
        ));
    }

    #[test]
    fn simple_basis_rejects_supplied_torsions() {
        let mut calc = calculator(CalculatorConfig::default());
        calc.setup().unwrap();
        assert!(matches!(
            calc.supply_torsions(&["phi"], &[10.0]),
            Err(EngineError::TorsionBasis(_))
        ));
    }
}
