use super::result::JobResult;
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Opaque identity of a submitted job. Issued by the calculator, unique for the lifetime of
/// that calculator and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Ticket(pub u64);

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Bitmask of the outputs a job asks for.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Requests(u16);

impl Requests {
    pub const NONE: Requests = Requests(0);
    pub const EXTRACT_POSITIONS: Requests = Requests(1 << 0);
    pub const POSITION_VECTOR: Requests = Requests(1 << 1);
    pub const CALCULATE_DEVIATIONS: Requests = Requests(1 << 2);
    pub const SCORE_STRUCTURE: Requests = Requests(1 << 3);
    pub const SURFACE_AREA: Requests = Requests(1 << 4);
    pub const MAP_SEGMENT: Requests = Requests(1 << 5);
    pub const MAP_CORRELATION: Requests = Requests(1 << 6);
    pub const SOLVENT_MASK: Requests = Requests(1 << 7);

    const NAMED: [(&'static str, Requests); 8] = [
        ("positions", Requests::EXTRACT_POSITIONS),
        ("vector", Requests::POSITION_VECTOR),
        ("deviation", Requests::CALCULATE_DEVIATIONS),
        ("score", Requests::SCORE_STRUCTURE),
        ("surface-area", Requests::SURFACE_AREA),
        ("map", Requests::MAP_SEGMENT),
        ("correlation", Requests::MAP_CORRELATION),
        ("solvent-mask", Requests::SOLVENT_MASK),
    ];

    pub const fn bits(self) -> u16 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Whether every bit of `other` is set.
    pub const fn contains(self, other: Requests) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether any bit of `other` is set.
    pub const fn intersects(self, other: Requests) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn union(self, other: Requests) -> Requests {
        Requests(self.0 | other.0)
    }

    pub const fn difference(self, other: Requests) -> Requests {
        Requests(self.0 & !other.0)
    }

    /// Requests served by the map stage rather than by the position extractor.
    pub const fn needs_maps(self) -> bool {
        self.intersects(
            Requests::MAP_SEGMENT
                .union(Requests::MAP_CORRELATION)
                .union(Requests::SOLVENT_MASK),
        )
    }

    /// Parses a single request name such as `"vector"` or `"surface-area"`.
    pub fn from_name(name: &str) -> Option<Requests> {
        let name = name.trim().to_ascii_lowercase().replace('_', "-");
        Self::NAMED
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, r)| *r)
    }

    pub fn names(self) -> impl Iterator<Item = &'static str> {
        Self::NAMED
            .into_iter()
            .filter(move |(_, r)| self.contains(*r))
            .map(|(n, _)| n)
    }
}

impl BitOr for Requests {
    type Output = Requests;

    fn bitor(self, rhs: Self) -> Self::Output {
        self.union(rhs)
    }
}

impl BitOrAssign for Requests {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for Requests {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.names()).finish()
    }
}

/// Where a job takes its torsion-space coordinates from.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleSource {
    /// A point of the calculator's sampler.
    Point(usize),
    /// An explicit parameter vector supplied by the caller.
    Custom(Vec<f64>),
}

/// One sampled conformation to compute, and the outputs wanted from it.
///
/// A job is built by the caller, receives its ticket on submission and is then moved from
/// stage to stage until its result is handed back.
#[derive(Debug)]
pub struct Job {
    ticket: Ticket,
    requests: Requests,
    sample: SampleSource,
    result: Option<JobResult>,
}

impl Job {
    pub fn new(requests: Requests, sample: SampleSource) -> Self {
        Self {
            ticket: Ticket::default(),
            requests,
            sample,
            result: None,
        }
    }

    pub fn for_point(point: usize, requests: Requests) -> Self {
        Self::new(requests, SampleSource::Point(point))
    }

    pub fn custom(coordinates: Vec<f64>, requests: Requests) -> Self {
        Self::new(requests, SampleSource::Custom(coordinates))
    }

    pub fn ticket(&self) -> Ticket {
        self.ticket
    }

    pub fn requests(&self) -> Requests {
        self.requests
    }

    pub fn sample(&self) -> &SampleSource {
        &self.sample
    }

    pub(crate) fn issue(&mut self, ticket: Ticket) {
        self.ticket = ticket;
    }

    /// The job's result, created on first access.
    pub(crate) fn result_mut(&mut self) -> &mut JobResult {
        let (ticket, requests, point) = (self.ticket, self.requests, self.point());
        self.result
            .get_or_insert_with(|| JobResult::new(ticket, requests, point))
    }

    /// Consumes the job, yielding its (possibly empty) result.
    pub(crate) fn into_result(mut self) -> JobResult {
        match self.result.take() {
            Some(result) => result,
            None => JobResult::new(self.ticket, self.requests, self.point()),
        }
    }

    fn point(&self) -> Option<usize> {
        match self.sample {
            SampleSource::Point(idx) => Some(idx),
            SampleSource::Custom(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_and_contains_behave_like_bit_sets() {
        let mask = Requests::POSITION_VECTOR | Requests::SCORE_STRUCTURE;
        assert!(mask.contains(Requests::POSITION_VECTOR));
        assert!(mask.contains(Requests::SCORE_STRUCTURE));
        assert!(!mask.contains(Requests::MAP_SEGMENT));
        assert!(!mask.contains(Requests::POSITION_VECTOR | Requests::MAP_SEGMENT));
        assert!(mask.intersects(Requests::POSITION_VECTOR | Requests::MAP_SEGMENT));
        assert!(Requests::NONE.is_empty());
    }

    #[test]
    fn needs_maps_covers_every_map_request() {
        assert!(Requests::MAP_SEGMENT.needs_maps());
        assert!(Requests::MAP_CORRELATION.needs_maps());
        assert!(Requests::SOLVENT_MASK.needs_maps());
        assert!(!(Requests::SURFACE_AREA | Requests::SCORE_STRUCTURE).needs_maps());
    }

    #[test]
    fn from_name_accepts_known_names() {
        assert_eq!(Requests::from_name("vector"), Some(Requests::POSITION_VECTOR));
        assert_eq!(Requests::from_name("Surface_Area"), Some(Requests::SURFACE_AREA));
        assert_eq!(Requests::from_name("bogus"), None);
    }

    #[test]
    fn debug_lists_request_names() {
        let mask = Requests::MAP_SEGMENT | Requests::EXTRACT_POSITIONS;
        assert_eq!(format!("{:?}", mask), r#"{"positions", "map"}"#);
    }

    #[test]
    fn into_result_creates_result_lazily() {
        let mut job = Job::for_point(3, Requests::POSITION_VECTOR);
        job.issue(Ticket(7));
        let result = job.into_result();
        assert_eq!(result.ticket, Ticket(7));
        assert_eq!(result.sample, Some(3));
        assert_eq!(result.requests, Requests::POSITION_VECTOR);
        assert!(result.populated().is_empty());
    }

    #[test]
    fn result_mut_keeps_accumulated_fields() {
        let mut job = Job::custom(vec![1.0], Requests::SCORE_STRUCTURE);
        job.result_mut().score = Some(-1.5);
        let result = job.into_result();
        assert_eq!(result.score, Some(-1.5));
        assert_eq!(result.sample, None);
    }
}
