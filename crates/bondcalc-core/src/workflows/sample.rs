use crate::engine::calculator::BondCalculator;
use crate::engine::error::EngineError;
use crate::engine::job::{Job, Requests, Ticket};
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::result::JobResult;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleConfig {
    /// Outputs requested for every sample point.
    pub requests: Requests,
    /// How long to wait for the next result before giving up on the rest.
    pub idle_timeout: Duration,
}

impl Default for SampleConfig {
    fn default() -> Self {
        Self {
            requests: Requests::SCORE_STRUCTURE | Requests::CALCULATE_DEVIATIONS,
            idle_timeout: Duration::from_secs(60),
        }
    }
}

/// Running sums for one sample point.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PointStats {
    pub completed: usize,
    score_sum: f64,
    score_count: usize,
    deviation_sum: f64,
    deviation_count: usize,
    surface_sum: f64,
    surface_count: usize,
}

fn mean(sum: f64, count: usize) -> Option<f64> {
    (count > 0).then(|| sum / count as f64)
}

impl PointStats {
    pub fn mean_score(&self) -> Option<f64> {
        mean(self.score_sum, self.score_count)
    }

    pub fn mean_deviation(&self) -> Option<f64> {
        mean(self.deviation_sum, self.deviation_count)
    }

    pub fn mean_surface_area(&self) -> Option<f64> {
        mean(self.surface_sum, self.surface_count)
    }

    fn add(&mut self, result: &JobResult) {
        self.completed += 1;
        let fields = [
            (result.score, &mut self.score_sum, &mut self.score_count),
            (
                result.deviation,
                &mut self.deviation_sum,
                &mut self.deviation_count,
            ),
            (
                result.surface_area,
                &mut self.surface_sum,
                &mut self.surface_count,
            ),
        ];
        for (value, sum, count) in fields {
            if let Some(v) = value.filter(|v| v.is_finite()) {
                *sum += v;
                *count += 1;
            }
        }
    }
}

/// Maps tickets back to the sample points they were submitted for and accumulates their
/// results. Non-finite scores and deviations are counted as completed but kept out of the
/// means.
#[derive(Debug, Default)]
pub struct ScoreTally {
    outstanding: HashMap<Ticket, usize>,
    points: BTreeMap<usize, PointStats>,
}

impl ScoreTally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, ticket: Ticket, point: usize) {
        self.outstanding.insert(ticket, point);
        self.points.entry(point).or_default();
    }

    /// Folds in a result, returning `false` for tickets this tally never registered or has
    /// already seen.
    pub fn record(&mut self, result: &JobResult) -> bool {
        let Some(point) = self.outstanding.remove(&result.ticket) else {
            return false;
        };
        self.points.entry(point).or_default().add(result);
        true
    }

    /// Registered tickets whose result has not been recorded.
    pub fn pending(&self) -> usize {
        self.outstanding.len()
    }

    pub fn stats(&self, point: usize) -> Option<&PointStats> {
        self.points.get(&point)
    }

    /// Every registered point in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &PointStats)> {
        self.points.iter().map(|(point, stats)| (*point, stats))
    }

    /// The point with the lowest mean score.
    pub fn best_by_score(&self) -> Option<(usize, f64)> {
        self.iter()
            .filter_map(|(point, stats)| stats.mean_score().map(|s| (point, s)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }
}

#[derive(Debug)]
pub struct SampleSummary {
    pub submitted: usize,
    pub tally: ScoreTally,
}

impl SampleSummary {
    pub fn completed(&self) -> usize {
        self.submitted - self.tally.pending()
    }

    pub fn is_complete(&self) -> bool {
        self.tally.pending() == 0
    }
}

/// Submits one job per sampler point to a running calculator and collects every result.
///
/// Collection stops early when no result arrives within `config.idle_timeout`; the summary
/// then reports the missing points as pending.
///
/// # Errors
///
/// Returns the calculator's error when a job cannot be submitted.
#[instrument(skip_all, name = "sample_workflow")]
pub fn run(
    calculator: &BondCalculator,
    config: &SampleConfig,
    reporter: &ProgressReporter,
) -> Result<SampleSummary, EngineError> {
    let points = calculator.sample_point_count();
    info!(points, requests = ?config.requests, "Starting sampling workflow.");

    let mut tally = ScoreTally::new();
    reporter.phase("Submitting", || -> Result<(), EngineError> {
        reporter.report(Progress::TaskStart {
            total_steps: points as u64,
        });
        for point in 0..points {
            let ticket = calculator.submit(Job::for_point(point, config.requests))?;
            tally.register(ticket, point);
            reporter.report(Progress::TaskIncrement);
        }
        reporter.report(Progress::TaskFinish);
        Ok(())
    })?;

    reporter.phase("Collecting", || {
        reporter.report(Progress::TaskStart {
            total_steps: points as u64,
        });
        while tally.pending() > 0 {
            let Some(result) = calculator.acquire_result_timeout(config.idle_timeout) else {
                warn!(
                    pending = tally.pending(),
                    timeout = ?config.idle_timeout,
                    "Timed out waiting for results."
                );
                break;
            };
            if tally.record(&result) {
                reporter.report(Progress::TaskIncrement);
            } else {
                debug!(ticket = %result.ticket, "Ignoring result of a job submitted elsewhere.");
            }
        }
        reporter.report(Progress::TaskFinish);
    });

    let summary = SampleSummary {
        submitted: points,
        tally,
    };
    info!(
        completed = summary.completed(),
        submitted = summary.submitted,
        "Sampling workflow complete."
    );
    Ok(summary)
}
