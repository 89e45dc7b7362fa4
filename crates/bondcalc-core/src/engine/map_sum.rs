//! Fan-out/fan-in summation of per-element density segments.
//!
//! Jobs reach the map stage through its intake queue. The intake worker computes the
//! solvent mask, claims a pooled segment and splits the job into one sub-job per distinct
//! element, so no producer ever waits on the segment pool. Summing workers render each sub-job into a private scratch grid and add it into the ticket's
//! pooled segment; whichever worker completes the last sub-job of a ticket finalizes it.

use super::config::MapConfig;
use super::error::EngineError;
use super::job::{Job, Requests, Ticket};
use super::pool::ResourcePool;
use super::result::ResultStore;
use super::stages::Handoff;
use super::workers::map_summer;
use crate::core::density::grid::DensityGrid;
use crate::core::density::solvent::SolventMask;
use crate::core::elements;
use crossbeam_channel::{Receiver, Sender, unbounded};
use itertools::Itertools;
use nalgebra::Point3;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, error, trace, warn};

/// Atoms of one element belonging to one ticket.
#[derive(Debug)]
pub struct MapSubJob {
    pub ticket: Ticket,
    /// Number of sub-jobs the ticket was split into.
    pub expected: usize,
    pub element: Arc<str>,
    pub points: Vec<Point3<f64>>,
    /// Exactly one sub-job of a ticket carries the job itself.
    pub job: Option<Job>,
}

#[derive(Debug, Default)]
struct Tally {
    summed: usize,
    job: Option<Job>,
}

/// Aggregation record of one in-flight ticket.
#[derive(Debug)]
pub struct MapJob {
    ticket: Ticket,
    expected: usize,
    segment: Mutex<Option<DensityGrid>>,
    tally: Mutex<Tally>,
}

impl MapJob {
    pub fn ticket(&self) -> Ticket {
        self.ticket
    }

    pub fn expected(&self) -> usize {
        self.expected
    }

    pub fn summed(&self) -> usize {
        self.tally.lock().summed
    }

    /// Adds a rendered element segment into the ticket's segment.
    pub fn add_segment(&self, scratch: &DensityGrid) {
        if let Some(segment) = self.segment.lock().as_mut() {
            segment.add(scratch);
        }
    }
}

/// Splits element-tagged points into one sub-job per element, in element order. The job
/// rides on the first sub-job.
pub fn split_by_element(
    ticket: Ticket,
    points: impl IntoIterator<Item = (Arc<str>, Point3<f64>)>,
    job: Job,
) -> Vec<MapSubJob> {
    let groups = points
        .into_iter()
        .into_group_map()
        .into_iter()
        .sorted_by(|(a, _), (b, _)| a.cmp(b))
        .collect::<Vec<_>>();
    let expected = groups.len();

    let mut job = Some(job);
    groups
        .into_iter()
        .map(|(element, points)| MapSubJob {
            ticket,
            expected,
            element,
            points,
            job: job.take(),
        })
        .collect()
}

pub struct MapSumHandler {
    config: MapConfig,
    probe_radius: f64,
    segments: ResourcePool<DensityGrid>,
    records: Mutex<HashMap<Ticket, Arc<MapJob>>>,
    intake: Sender<Handoff>,
    arrivals: Receiver<Handoff>,
    queue: Sender<MapSubJob>,
    work: Receiver<MapSubJob>,
    results: ResultStore,
}

impl MapSumHandler {
    /// Creates a handler with `segment_count` pooled segments on the configured grid.
    pub fn new(
        config: MapConfig,
        probe_radius: f64,
        segment_count: usize,
        results: ResultStore,
    ) -> Self {
        let segments =
            ResourcePool::with_objects((0..segment_count).map(|_| DensityGrid::new(config.grid)));
        let (intake, arrivals) = unbounded();
        let (queue, work) = unbounded();
        Self {
            config,
            probe_radius,
            segments,
            records: Mutex::new(HashMap::new()),
            intake,
            arrivals,
            queue,
            work,
            results,
        }
    }

    pub fn config(&self) -> &MapConfig {
        &self.config
    }

    /// Queue the dispatcher forwards map jobs to.
    pub fn intake(&self) -> Sender<Handoff> {
        self.intake.clone()
    }

    pub fn in_flight(&self) -> usize {
        self.records.lock().len()
    }

    pub fn available_segments(&self) -> usize {
        self.segments.len()
    }

    /// Spawns the intake worker and `threads` summing workers, all running until
    /// `shutdown` disconnects.
    pub fn start(
        self: &Arc<Self>,
        threads: usize,
        shutdown: &Receiver<()>,
    ) -> Result<Vec<JoinHandle<()>>, EngineError> {
        let mut handles = vec![map_summer::spawn_intake(
            Arc::clone(self),
            self.arrivals.clone(),
            shutdown.clone(),
        )?];
        for idx in 0..threads {
            handles.push(map_summer::spawn(
                idx,
                Arc::clone(self),
                self.work.clone(),
                shutdown.clone(),
            )?);
        }
        Ok(handles)
    }

    /// Closes the segment pool; workers blocked on it give up.
    pub fn finish(&self) {
        self.segments.finish();
        let dropped = {
            let mut records = self.records.lock();
            let count = records.len();
            records.clear();
            count
        };
        if dropped > 0 {
            warn!(dropped, "Map stage finished with tickets still being summed");
        }
    }

    /// Takes one job off the intake queue: computes the solvent mask and fans the map
    /// requests out to the summing workers. Blocks while every segment is in use.
    pub fn submit(&self, handoff: Handoff) {
        let Handoff {
            mut job,
            map_points,
            ..
        } = handoff;
        let ticket = job.ticket();
        let requests = job.requests();

        if requests.contains(Requests::SOLVENT_MASK) {
            let mask = SolventMask::from_atoms(
                self.config.grid,
                map_points
                    .iter()
                    .map(|p| (&p.position, p.element.as_ref())),
                self.probe_radius,
            );
            job.result_mut().solvent_mask = Some(mask);
        }

        if !requests.intersects(Requests::MAP_SEGMENT | Requests::MAP_CORRELATION) {
            self.results.submit(job.into_result());
            return;
        }

        if map_points.is_empty() {
            let segment = DensityGrid::new(self.config.grid);
            self.fill_result(&mut job, &segment);
            self.results.submit(job.into_result());
            return;
        }

        let sub_jobs = split_by_element(
            ticket,
            map_points.into_iter().map(|p| (p.element, p.position)),
            job,
        );
        let expected = sub_jobs.len();

        // Claimed before any sub-job is queued, so summing workers never wait on the pool.
        if self.acquire_map_job(ticket, expected).is_none() {
            warn!(%ticket, "Map segment pool finished, dropping job");
            return;
        }
        debug!(%ticket, expected, "Fanning out map job");
        for sub_job in sub_jobs {
            if self.queue.send(sub_job).is_err() {
                error!(%ticket, "Map work queue disconnected");
            }
        }
    }

    /// Returns the aggregation record for `ticket`, creating it with a fresh segment on
    /// first use. Returns `None` only when the segment pool has finished.
    pub fn acquire_map_job(&self, ticket: Ticket, expected: usize) -> Option<Arc<MapJob>> {
        if let Some(record) = self.records.lock().get(&ticket) {
            return Some(Arc::clone(record));
        }

        let mut segment = self.segments.acquire_object()?;
        segment.clear();

        let mut records = self.records.lock();
        match records.entry(ticket) {
            Entry::Occupied(entry) => {
                let record = Arc::clone(entry.get());
                drop(records);
                self.segments.push_object(segment);
                Some(record)
            }
            Entry::Vacant(entry) => {
                let record = Arc::new(MapJob {
                    ticket,
                    expected,
                    segment: Mutex::new(Some(segment)),
                    tally: Mutex::new(Tally::default()),
                });
                Some(Arc::clone(entry.insert(record)))
            }
        }
    }

    /// Records one summed sub-job. The caller that completes the ticket finalizes it.
    pub fn return_mini_job(&self, record: &Arc<MapJob>, carried: Option<Job>) {
        let completed = {
            let mut tally = record.tally.lock();
            if let Some(job) = carried {
                tally.job = Some(job);
            }
            tally.summed += 1;
            if tally.summed == record.expected {
                Some(tally.job.take())
            } else {
                None
            }
        };

        match completed {
            None => {}
            Some(Some(job)) => self.finalize(record, job),
            Some(None) => error!(ticket = %record.ticket, "Map job completed without its job"),
        }
    }

    fn finalize(&self, record: &Arc<MapJob>, mut job: Job) {
        let ticket = record.ticket;
        let Some(segment) = record.segment.lock().take() else {
            error!(%ticket, "Map job finalized twice");
            return;
        };

        self.fill_result(&mut job, &segment);
        self.segments.push_object(segment);
        self.records.lock().remove(&ticket);
        trace!(%ticket, "Map job finalized");
        self.results.submit(job.into_result());
    }

    fn fill_result(&self, job: &mut Job, segment: &DensityGrid) {
        let requests = job.requests();
        let result = job.result_mut();
        if requests.contains(Requests::MAP_CORRELATION) {
            result.correlation = Some(
                self.config
                    .reference
                    .as_ref()
                    .map_or(f64::NAN, |reference| segment.correlation(reference)),
            );
        }
        if requests.contains(Requests::MAP_SEGMENT) {
            result.map = Some(segment.clone());
        }
    }

    /// Renders one sub-job into `scratch`, adds it to the ticket's segment and reports it.
    pub(crate) fn sum_sub_job(&self, sub_job: MapSubJob, scratch: &mut DensityGrid) {
        let MapSubJob {
            ticket,
            expected,
            element,
            points,
            job,
        } = sub_job;

        scratch.clear();
        let weight = elements::lookup_or_default(&element).electrons;
        for point in &points {
            scratch.add_gaussian(point, weight, self.config.sigma, self.config.cutoff);
        }

        let Some(record) = self.acquire_map_job(ticket, expected) else {
            debug!(%ticket, "Map stage finished, discarding sub-job");
            return;
        };
        record.add_segment(scratch);
        self.return_mini_job(&record, job);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::density::grid::GridSpec;
    use crate::engine::sequence::ElePos;
    use crate::engine::result::AtomPosMap;
    use crate::engine::stages::Dispatcher;
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;

    fn config(reference: Option<DensityGrid>) -> MapConfig {
        MapConfig {
            grid: GridSpec {
                origin: [-3.0, -3.0, -3.0],
                dims: [13, 13, 13],
                spacing: 0.5,
            },
            sigma: 0.6,
            cutoff: 3.0,
            reference,
        }
    }

    fn issued(requests: Requests, ticket: u64) -> Job {
        let mut job = Job::custom(vec![], requests);
        job.issue(Ticket(ticket));
        job
    }

    fn points() -> Vec<ElePos> {
        [
            ("C", [0.0, 0.0, 0.0]),
            ("N", [1.2, 0.3, 0.0]),
            ("O", [-1.1, 0.8, 0.4]),
            ("S", [0.2, -1.5, 0.9]),
            ("FE", [0.9, 1.1, -1.2]),
            ("C", [-0.4, -0.6, -1.3]),
        ]
        .into_iter()
        .map(|(element, [x, y, z])| ElePos {
            element: Arc::from(element),
            position: Point3::new(x, y, z),
        })
        .collect()
    }

    fn handoff(job: Job) -> Handoff {
        Handoff {
            job,
            positions: AtomPosMap::new(),
            map_points: points(),
        }
    }

    fn drain(handler: &MapSumHandler) {
        let mut scratch = DensityGrid::new(handler.config().grid);
        while let Ok(sub_job) = handler.work.try_recv() {
            handler.sum_sub_job(sub_job, &mut scratch);
        }
    }

    #[test]
    fn split_groups_by_element_and_carries_job_once() {
        let sub_jobs = split_by_element(
            Ticket(3),
            points().into_iter().map(|p| (p.element, p.position)),
            issued(Requests::MAP_SEGMENT, 3),
        );
        assert_eq!(sub_jobs.len(), 5);
        assert!(sub_jobs.iter().all(|s| s.expected == 5));
        assert_eq!(sub_jobs.iter().filter(|s| s.job.is_some()).count(), 1);
        let carbon = sub_jobs.iter().find(|s| &*s.element == "C").unwrap();
        assert_eq!(carbon.points.len(), 2);
    }

    #[test]
    fn acquire_map_job_is_idempotent() {
        let handler = MapSumHandler::new(config(None), 1.4, 2, ResultStore::new());
        let first = handler.acquire_map_job(Ticket(1), 3).unwrap();
        let second = handler.acquire_map_job(Ticket(1), 3).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(handler.available_segments(), 1);
        assert_eq!(handler.in_flight(), 1);
    }

    #[test]
    fn racing_workers_share_one_record_and_return_the_spare_segment() {
        let handler = Arc::new(MapSumHandler::new(config(None), 1.4, 3, ResultStore::new()));
        let barrier = Arc::new(Barrier::new(2));
        let racers: Vec<_> = (0..2)
            .map(|_| {
                let handler = Arc::clone(&handler);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    handler.acquire_map_job(Ticket(1), 4).unwrap()
                })
            })
            .collect();
        let records: Vec<_> = racers.into_iter().map(|r| r.join().unwrap()).collect();

        assert!(Arc::ptr_eq(&records[0], &records[1]));
        assert_eq!(records[0].expected(), 4);
        assert_eq!(handler.in_flight(), 1);
        assert_eq!(handler.available_segments(), 2);
    }

    #[test]
    fn forwarding_never_waits_for_a_free_segment() {
        let results = ResultStore::new();
        let handler = MapSumHandler::new(config(None), 1.4, 1, results.clone());
        let held = handler.acquire_map_job(Ticket(99), 1).unwrap();
        assert_eq!(handler.available_segments(), 0);

        let (surface_tx, _surface_rx) = unbounded();
        let (ff_tx, _ff_rx) = unbounded();
        let dispatcher = Dispatcher::new(surface_tx, ff_tx, Some(handler.intake()), results);
        let (done_tx, done_rx) = unbounded();
        let producer = thread::spawn(move || {
            for ticket in 1..=2 {
                dispatcher.forward(handoff(issued(Requests::MAP_SEGMENT, ticket)), None);
            }
            done_tx.send(()).unwrap();
        });

        assert!(done_rx.recv_timeout(Duration::from_secs(5)).is_ok());
        producer.join().unwrap();
        assert_eq!(handler.arrivals.len(), 2);
        assert_eq!(held.ticket(), Ticket(99));
    }

    #[test]
    fn five_element_map_is_the_sum_of_element_segments() {
        let results = ResultStore::new();
        let handler = MapSumHandler::new(config(None), 1.4, 2, results.clone());
        handler.submit(handoff(issued(Requests::MAP_SEGMENT, 1)));
        drain(&handler);

        let result = results.acquire().unwrap();
        let map = result.map.unwrap();
        assert!(result.correlation.is_none());

        let spec = handler.config().grid;
        let mut expected = DensityGrid::new(spec);
        for (element, group) in points()
            .into_iter()
            .map(|p| (p.element, p.position))
            .into_group_map()
        {
            let mut segment = DensityGrid::new(spec);
            let weight = elements::lookup_or_default(&element).electrons;
            for point in &group {
                segment.add_gaussian(point, weight, 0.6, 3.0);
            }
            expected.add(&segment);
        }
        for (a, b) in map.data().iter().zip(expected.data()) {
            assert!((a - b).abs() < 1e-9);
        }
        assert_eq!(handler.available_segments(), 2);
        assert_eq!(handler.in_flight(), 0);
    }

    #[test]
    fn fan_in_finalizes_exactly_once_under_concurrent_completion() {
        const WORKERS: usize = 6;
        const TICKETS: u64 = 20;

        let results = ResultStore::new();
        let handler = Arc::new(MapSumHandler::new(
            config(None),
            1.4,
            TICKETS as usize,
            results.clone(),
        ));
        for ticket in 1..=TICKETS {
            handler.submit(handoff(issued(Requests::MAP_SEGMENT, ticket)));
        }

        let barrier = Arc::new(Barrier::new(WORKERS));
        let workers: Vec<_> = (0..WORKERS)
            .map(|_| {
                let handler = Arc::clone(&handler);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    drain(&handler);
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        let mut tickets: Vec<u64> = std::iter::from_fn(|| results.acquire())
            .map(|r| r.ticket.0)
            .collect();
        tickets.sort_unstable();
        assert_eq!(tickets, (1..=TICKETS).collect::<Vec<_>>());
        assert_eq!(handler.in_flight(), 0);
        assert_eq!(handler.available_segments(), TICKETS as usize);
    }

    #[test]
    fn correlation_against_reference_map() {
        let spec = config(None).grid;
        let mut reference = DensityGrid::new(spec);
        for p in points() {
            let weight = elements::lookup_or_default(&p.element).electrons;
            reference.add_gaussian(&p.position, weight, 0.6, 3.0);
        }

        let results = ResultStore::new();
        let handler = MapSumHandler::new(config(Some(reference)), 1.4, 1, results.clone());
        handler.submit(handoff(issued(Requests::MAP_CORRELATION, 1)));
        drain(&handler);

        let result = results.acquire().unwrap();
        assert!(result.map.is_none());
        assert!((result.correlation.unwrap() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn correlation_without_reference_is_nan() {
        let results = ResultStore::new();
        let handler = MapSumHandler::new(config(None), 1.4, 1, results.clone());
        handler.submit(handoff(issued(Requests::MAP_CORRELATION, 1)));
        drain(&handler);
        assert!(results.acquire().unwrap().correlation.unwrap().is_nan());
    }

    #[test]
    fn map_job_without_atoms_completes_immediately() {
        let results = ResultStore::new();
        let handler = MapSumHandler::new(config(None), 1.4, 1, results.clone());
        let mut empty = handoff(issued(Requests::MAP_SEGMENT, 4));
        empty.map_points.clear();
        handler.submit(empty);

        let map = results.acquire().unwrap().map.unwrap();
        assert_eq!(map.sum(), 0.0);
        assert_eq!(handler.available_segments(), 1);
    }

    #[test]
    fn solvent_mask_alone_skips_fan_out() {
        let results = ResultStore::new();
        let handler = MapSumHandler::new(config(None), 1.4, 1, results.clone());
        handler.submit(handoff(issued(Requests::SOLVENT_MASK, 1)));

        assert!(handler.work.is_empty());
        let mask = results.acquire().unwrap().solvent_mask.unwrap();
        assert!(!mask.is_solvent(6, 6, 6));
        assert!(mask.solvent_fraction() > 0.0);
        assert_eq!(handler.in_flight(), 0);
    }
}
