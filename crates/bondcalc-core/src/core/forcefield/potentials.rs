use crate::core::elements::ElementData;

/// Energy returned for coincident atoms instead of an infinity.
pub const COINCIDENT_ENERGY: f64 = 1e10;

#[inline]
pub fn lennard_jones_12_6(dist: f64, r_min: f64, well_depth: f64) -> f64 {
    if dist < 1e-6 {
        return COINCIDENT_ENERGY;
    }
    let rho = r_min / dist;
    let rho6 = rho.powi(6);
    let rho12 = rho6 * rho6;
    well_depth * (rho12 - 2.0 * rho6)
}

/// Lorentz-Berthelot mixing: `r_min` is the sum of radii, the well depth the geometric mean.
#[inline]
pub fn combine(a: &ElementData, b: &ElementData) -> (f64, f64) {
    (
        a.vdw_radius + b.vdw_radius,
        (a.well_depth * b.well_depth).sqrt(),
    )
}

/// Softens a repulsive wall: inside `ideal_dist - delta` the potential is evaluated at a
/// distance shifted outwards by `delta`, and within `delta` of the ideal distance it is flat.
#[inline]
pub fn apply_flat_bottom<F>(dist: f64, ideal_dist: f64, delta: f64, potential_fn: F) -> f64
where
    F: Fn(f64) -> f64,
{
    if delta <= 1e-9 || dist >= ideal_dist {
        potential_fn(dist)
    } else if dist > ideal_dist - delta {
        potential_fn(ideal_dist)
    } else {
        potential_fn(dist + delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-9;

    fn f64_approx_equal(a: f64, b: f64) -> bool {
        (a - b).abs() < TOLERANCE
    }

    #[test]
    fn lennard_jones_at_minimum_distance_returns_negative_well_depth() {
        let energy = lennard_jones_12_6(2.0, 2.0, 10.0);
        assert!(f64_approx_equal(energy, -10.0));
    }

    #[test]
    fn lennard_jones_at_very_small_distance_returns_large_positive_energy() {
        let energy = lennard_jones_12_6(1e-7, 2.0, 10.0);
        assert!(f64_approx_equal(energy, COINCIDENT_ENERGY));
    }

    #[test]
    fn combine_sums_radii_and_takes_geometric_mean_depth() {
        let a = ElementData {
            vdw_radius: 1.5,
            well_depth: 0.1,
            electrons: 6.0,
        };
        let b = ElementData {
            vdw_radius: 2.0,
            well_depth: 0.4,
            electrons: 8.0,
        };
        let (r_min, depth) = combine(&a, &b);
        assert!(f64_approx_equal(r_min, 3.5));
        assert!(f64_approx_equal(depth, 0.2));
    }

    #[test]
    fn flat_bottom_is_identity_outside_the_wall() {
        assert!(f64_approx_equal(apply_flat_bottom(10.0, 8.0, 1.0, |d| d * d), 100.0));
        assert!(f64_approx_equal(apply_flat_bottom(5.0, 8.0, 0.0, |d| d * d), 25.0));
    }

    #[test]
    fn flat_bottom_is_flat_near_the_ideal_distance() {
        assert!(f64_approx_equal(apply_flat_bottom(7.5, 8.0, 1.0, |d| d * d), 64.0));
    }

    #[test]
    fn flat_bottom_shifts_distance_inside_the_wall() {
        assert!(f64_approx_equal(apply_flat_bottom(6.0, 8.0, 1.0, |d| d * d), 49.0));
    }
}
