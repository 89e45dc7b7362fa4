use nalgebra::Point3;
use serde::{Deserialize, Serialize};

/// Geometry of a regular, axis-aligned grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    /// Centre of voxel `(0, 0, 0)`.
    pub origin: [f64; 3],
    pub dims: [usize; 3],
    /// Edge length of a cubic voxel in Angstroms.
    pub spacing: f64,
}

impl GridSpec {
    pub fn voxel_count(&self) -> usize {
        self.dims.iter().product()
    }

    #[inline]
    pub fn index(&self, ix: usize, iy: usize, iz: usize) -> usize {
        (iz * self.dims[1] + iy) * self.dims[0] + ix
    }

    pub fn voxel_center(&self, ix: usize, iy: usize, iz: usize) -> Point3<f64> {
        Point3::new(
            self.origin[0] + ix as f64 * self.spacing,
            self.origin[1] + iy as f64 * self.spacing,
            self.origin[2] + iz as f64 * self.spacing,
        )
    }

    /// Inclusive voxel index range along `axis` covering `[lo, hi]` in Angstroms, or `None`
    /// when the interval misses the grid.
    fn axis_range(&self, axis: usize, lo: f64, hi: f64) -> Option<(usize, usize)> {
        let to_index = |v: f64| (v - self.origin[axis]) / self.spacing;
        let start = to_index(lo).ceil().max(0.0);
        let end = to_index(hi).floor().min(self.dims[axis] as f64 - 1.0);
        if end < start {
            return None;
        }
        Some((start as usize, end as usize))
    }

    /// Visits every voxel whose centre lies within `radius` of `center`, passing the flat
    /// index and the squared distance.
    pub fn for_each_within<F>(&self, center: &Point3<f64>, radius: f64, mut visit: F)
    where
        F: FnMut(usize, f64),
    {
        let ranges = [0, 1, 2]
            .map(|axis| self.axis_range(axis, center[axis] - radius, center[axis] + radius));
        let [Some((x0, x1)), Some((y0, y1)), Some((z0, z1))] = ranges else {
            return;
        };
        let radius_sq = radius * radius;
        for iz in z0..=z1 {
            for iy in y0..=y1 {
                for ix in x0..=x1 {
                    let dist_sq = (self.voxel_center(ix, iy, iz) - center).norm_squared();
                    if dist_sq <= radius_sq {
                        visit(self.index(ix, iy, iz), dist_sq);
                    }
                }
            }
        }
    }
}

/// Calculated density on a [`GridSpec`]. Used both as the per-element scratch segment of a
/// summing worker and as the pooled per-ticket accumulation target.
#[derive(Debug, Clone, PartialEq)]
pub struct DensityGrid {
    spec: GridSpec,
    data: Vec<f64>,
}

impl DensityGrid {
    pub fn new(spec: GridSpec) -> Self {
        Self {
            data: vec![0.0; spec.voxel_count()],
            spec,
        }
    }

    pub fn spec(&self) -> &GridSpec {
        &self.spec
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn clear(&mut self) {
        self.data.iter_mut().for_each(|v| *v = 0.0);
    }

    pub fn sum(&self) -> f64 {
        self.data.iter().sum()
    }

    /// Adds another grid voxel by voxel. Both grids must share a spec.
    pub fn add(&mut self, other: &DensityGrid) {
        assert_eq!(
            self.spec, other.spec,
            "cannot add density grids with different geometry"
        );
        for (a, b) in self.data.iter_mut().zip(&other.data) {
            *a += *b;
        }
    }

    /// Adds a normalized isotropic Gaussian of total weight `weight`, truncated at
    /// `cutoff` standard deviations.
    pub fn add_gaussian(&mut self, center: &Point3<f64>, weight: f64, sigma: f64, cutoff: f64) {
        let norm = weight / (2.0 * std::f64::consts::PI * sigma * sigma).powf(1.5)
            * self.spec.spacing.powi(3);
        let two_sigma_sq = 2.0 * sigma * sigma;
        let data = &mut self.data;
        self.spec
            .for_each_within(center, cutoff * sigma, |idx, dist_sq| {
                data[idx] += norm * (-dist_sq / two_sigma_sq).exp();
            });
    }

    /// Pearson correlation between two grids of equal geometry; NaN when either grid has
    /// no variance or the geometries differ.
    pub fn correlation(&self, other: &DensityGrid) -> f64 {
        if self.spec != other.spec || self.data.is_empty() {
            return f64::NAN;
        }
        let n = self.data.len() as f64;
        let mean_a = self.sum() / n;
        let mean_b = other.sum() / n;
        let (mut cov, mut var_a, mut var_b) = (0.0, 0.0, 0.0);
        for (a, b) in self.data.iter().zip(&other.data) {
            let da = a - mean_a;
            let db = b - mean_b;
            cov += da * db;
            var_a += da * da;
            var_b += db * db;
        }
        let denom = (var_a * var_b).sqrt();
        if denom <= f64::EPSILON {
            return f64::NAN;
        }
        cov / denom
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> GridSpec {
        GridSpec {
            origin: [0.0, 0.0, 0.0],
            dims: [10, 10, 10],
            spacing: 0.5,
        }
    }

    #[test]
    fn index_is_x_fastest() {
        let s = spec();
        assert_eq!(s.index(1, 0, 0), 1);
        assert_eq!(s.index(0, 1, 0), 10);
        assert_eq!(s.index(0, 0, 1), 100);
        assert_eq!(s.voxel_count(), 1000);
    }

    #[test]
    fn gaussian_integrates_to_roughly_its_weight() {
        let s = GridSpec {
            origin: [-5.0, -5.0, -5.0],
            dims: [41, 41, 41],
            spacing: 0.25,
        };
        let mut grid = DensityGrid::new(s);
        grid.add_gaussian(&Point3::origin(), 8.0, 0.8, 4.0);
        assert!((grid.sum() - 8.0).abs() < 0.05, "sum was {}", grid.sum());
    }

    #[test]
    fn gaussian_outside_grid_is_ignored() {
        let mut grid = DensityGrid::new(spec());
        grid.add_gaussian(&Point3::new(100.0, 100.0, 100.0), 6.0, 0.5, 3.0);
        assert_eq!(grid.sum(), 0.0);
    }

    #[test]
    fn add_is_elementwise() {
        let mut a = DensityGrid::new(spec());
        let mut b = DensityGrid::new(spec());
        a.add_gaussian(&Point3::new(1.0, 1.0, 1.0), 6.0, 0.5, 3.0);
        b.add_gaussian(&Point3::new(3.0, 3.0, 3.0), 8.0, 0.5, 3.0);
        let expected: Vec<f64> = a.data().iter().zip(b.data()).map(|(x, y)| x + y).collect();
        a.add(&b);
        assert_eq!(a.data(), expected.as_slice());
    }

    #[test]
    #[should_panic(expected = "different geometry")]
    fn add_rejects_mismatched_grids() {
        let mut a = DensityGrid::new(spec());
        let mut other = spec();
        other.spacing = 1.0;
        a.add(&DensityGrid::new(other));
    }

    #[test]
    fn clear_zeroes_every_voxel() {
        let mut grid = DensityGrid::new(spec());
        grid.add_gaussian(&Point3::new(2.0, 2.0, 2.0), 6.0, 0.5, 3.0);
        grid.clear();
        assert_eq!(grid.sum(), 0.0);
    }

    #[test]
    fn correlation_of_grid_with_itself_is_one() {
        let mut grid = DensityGrid::new(spec());
        grid.add_gaussian(&Point3::new(2.0, 2.0, 2.0), 6.0, 0.5, 3.0);
        assert!((grid.correlation(&grid.clone()) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn correlation_of_flat_grid_is_nan() {
        let flat = DensityGrid::new(spec());
        assert!(flat.correlation(&flat.clone()).is_nan());
    }
}
