//! Solvent accessible surface area by the Shrake-Rupley dot method.

use crate::core::elements;
use nalgebra::{Point3, Vector3};
use std::f64::consts::PI;

pub const DEFAULT_PROBE_RADIUS: f64 = 1.4;
pub const DEFAULT_DOTS_PER_ATOM: usize = 96;

/// Evenly distributed unit vectors on a sphere (golden-section spiral).
pub fn sphere_dots(count: usize) -> Vec<Vector3<f64>> {
    let golden_angle = PI * (3.0 - 5.0_f64.sqrt());
    (0..count)
        .map(|i| {
            let y = 1.0 - 2.0 * (i as f64 + 0.5) / count as f64;
            let r = (1.0 - y * y).sqrt();
            let theta = golden_angle * i as f64;
            Vector3::new(r * theta.cos(), y, r * theta.sin())
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct SurfaceCalculator {
    probe_radius: f64,
    dots: Vec<Vector3<f64>>,
}

impl Default for SurfaceCalculator {
    fn default() -> Self {
        Self::new(DEFAULT_PROBE_RADIUS, DEFAULT_DOTS_PER_ATOM)
    }
}

impl SurfaceCalculator {
    pub fn new(probe_radius: f64, dots_per_atom: usize) -> Self {
        Self {
            probe_radius,
            dots: sphere_dots(dots_per_atom.max(1)),
        }
    }

    /// Total accessible area in square Angstroms of atoms given as `(position, element)`.
    pub fn total_area<'a, I>(&self, atoms: I) -> f64
    where
        I: IntoIterator<Item = (&'a Point3<f64>, &'a str)>,
    {
        let spheres: Vec<(Point3<f64>, f64)> = atoms
            .into_iter()
            .map(|(pos, element)| {
                let radius = elements::lookup_or_default(element).vdw_radius + self.probe_radius;
                (*pos, radius)
            })
            .collect();

        (0..spheres.len())
            .map(|i| self.atom_area(&spheres, i))
            .sum()
    }

    fn atom_area(&self, spheres: &[(Point3<f64>, f64)], i: usize) -> f64 {
        let (center, radius) = spheres[i];
        let neighbours: Vec<&(Point3<f64>, f64)> = spheres
            .iter()
            .enumerate()
            .filter(|&(j, (other, other_radius))| {
                j != i && (other - center).norm() < radius + other_radius
            })
            .map(|(_, s)| s)
            .collect();

        let exposed = self
            .dots
            .iter()
            .filter(|dot| {
                let point = center + *dot * radius;
                neighbours.iter().all(|(other, other_radius)| {
                    (point - other).norm_squared() >= other_radius * other_radius
                })
            })
            .count();

        4.0 * PI * radius * radius * exposed as f64 / self.dots.len() as f64
    }
}
