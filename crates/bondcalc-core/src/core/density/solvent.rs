use super::grid::GridSpec;
use crate::core::elements;
use nalgebra::Point3;

/// Voxel-wise solvent classification: a voxel is solvent when its centre lies farther than
/// the atom's van der Waals radius plus the probe radius from every atom.
#[derive(Debug, Clone, PartialEq)]
pub struct SolventMask {
    spec: GridSpec,
    solvent: Vec<bool>,
}

impl SolventMask {
    pub fn from_atoms<'a, I>(spec: GridSpec, atoms: I, probe_radius: f64) -> Self
    where
        I: IntoIterator<Item = (&'a Point3<f64>, &'a str)>,
    {
        let mut solvent = vec![true; spec.voxel_count()];
        for (position, element) in atoms {
            let radius = elements::lookup_or_default(element).vdw_radius + probe_radius;
            spec.for_each_within(position, radius, |idx, _| solvent[idx] = false);
        }
        Self { spec, solvent }
    }

    pub fn spec(&self) -> &GridSpec {
        &self.spec
    }

    pub fn is_solvent(&self, ix: usize, iy: usize, iz: usize) -> bool {
        self.solvent[self.spec.index(ix, iy, iz)]
    }

    pub fn solvent_fraction(&self) -> f64 {
        if self.solvent.is_empty() {
            return 0.0;
        }
        self.solvent.iter().filter(|&&s| s).count() as f64 / self.solvent.len() as f64
    }
}
