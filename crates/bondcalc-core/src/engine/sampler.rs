use rand::Rng;

/// Supplies the points of parameter space that jobs are built from.
pub trait Sampler: Send + Sync {
    fn point_count(&self) -> usize;

    /// Dimensionality of every point.
    fn dims(&self) -> usize;

    fn point(&self, index: usize) -> Option<&[f64]>;
}

/// A sampler over an explicit list of points.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointSampler {
    dims: usize,
    points: Vec<Vec<f64>>,
}

impl PointSampler {
    /// Builds a sampler from points that all share the first point's dimensionality; points of
    /// another length are rejected.
    pub fn new(points: Vec<Vec<f64>>) -> Option<Self> {
        let dims = points.first().map_or(0, |p| p.len());
        if points.iter().any(|p| p.len() != dims) {
            return None;
        }
        Some(Self { dims, points })
    }

    /// `count` points drawn uniformly from `[-spread, spread]` in every dimension. The first
    /// point is always the origin, i.e. the unperturbed model.
    pub fn random(count: usize, dims: usize, spread: f64, rng: &mut impl Rng) -> Self {
        let points = (0..count)
            .map(|i| {
                if i == 0 || spread <= 0.0 {
                    vec![0.0; dims]
                } else {
                    (0..dims).map(|_| rng.gen_range(-spread..=spread)).collect()
                }
            })
            .collect();
        Self { dims, points }
    }
}

impl Sampler for PointSampler {
    fn point_count(&self) -> usize {
        self.points.len()
    }

    fn dims(&self) -> usize {
        self.dims
    }

    fn point(&self, index: usize) -> Option<&[f64]> {
        self.points.get(index).map(|p| p.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn new_rejects_ragged_points() {
        assert!(PointSampler::new(vec![vec![1.0, 2.0], vec![3.0]]).is_none());
        let sampler = PointSampler::new(vec![vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        assert_eq!(sampler.dims(), 2);
        assert_eq!(sampler.point_count(), 2);
        assert_eq!(sampler.point(1), Some(&[3.0, 4.0][..]));
        assert_eq!(sampler.point(2), None);
    }

    #[test]
    fn random_sampler_starts_at_origin_and_stays_in_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        let sampler = PointSampler::random(20, 3, 30.0, &mut rng);
        assert_eq!(sampler.point(0), Some(&[0.0, 0.0, 0.0][..]));
        for i in 0..sampler.point_count() {
            assert!(sampler.point(i).unwrap().iter().all(|v| v.abs() <= 30.0));
        }
    }

    #[test]
    fn random_sampler_is_reproducible_for_a_seed() {
        let a = PointSampler::random(5, 2, 10.0, &mut StdRng::seed_from_u64(1));
        let b = PointSampler::random(5, 2, 10.0, &mut StdRng::seed_from_u64(1));
        assert_eq!(a, b);
    }
}
