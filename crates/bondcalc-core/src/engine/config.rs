use super::torsion::TorsionBasisType;
use crate::core::density::grid::{DensityGrid, GridSpec};
use crate::core::surface::{DEFAULT_DOTS_PER_ATOM, DEFAULT_PROBE_RADIUS};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("Invalid value for '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

/// Which blocks of every sequence are computed and extracted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthLimits {
    pub min: usize,
    pub max: usize,
    pub side_max: usize,
}

impl Default for DepthLimits {
    fn default() -> Self {
        Self {
            min: 0,
            max: usize::MAX,
            side_max: usize::MAX,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MapConfig {
    pub grid: GridSpec,
    /// Gaussian width of one atom's density, in Angstroms.
    pub sigma: f64,
    /// Truncation radius in multiples of `sigma`.
    pub cutoff: f64,
    /// Map the summed density is correlated against.
    pub reference: Option<DensityGrid>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceConfig {
    pub probe_radius: f64,
    pub dots_per_atom: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringConfig {
    /// Width of the flat bottom applied to the repulsive wall, in Angstroms.
    pub flat_bottom: f64,
    /// Pairs separated by at most this many bonds are not scored.
    pub excluded_bonds: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CalculatorConfig {
    pub threads: usize,
    pub sequences_per_thread: usize,
    pub surface_threads: usize,
    pub scoring_threads: usize,
    pub map_threads: usize,
    pub basis: TorsionBasisType,
    pub full_recalculation: bool,
    pub depth: DepthLimits,
    pub map: Option<MapConfig>,
    pub surface: SurfaceConfig,
    pub scoring: ScoringConfig,
}

impl Default for CalculatorConfig {
    fn default() -> Self {
        Self {
            threads: 1,
            sequences_per_thread: 2,
            surface_threads: 1,
            scoring_threads: 1,
            map_threads: 1,
            basis: TorsionBasisType::Simple,
            full_recalculation: true,
            depth: DepthLimits::default(),
            map: None,
            surface: SurfaceConfig {
                probe_radius: DEFAULT_PROBE_RADIUS,
                dots_per_atom: DEFAULT_DOTS_PER_ATOM,
            },
            scoring: ScoringConfig {
                flat_bottom: 0.0,
                excluded_bonds: 3,
            },
        }
    }
}

impl CalculatorConfig {
    /// Number of bond sequences shared by the calculator workers.
    pub fn sequence_count(&self) -> usize {
        self.threads * self.sequences_per_thread
    }
}

#[derive(Default)]
pub struct CalculatorConfigBuilder {
    threads: Option<usize>,
    sequences_per_thread: Option<usize>,
    surface_threads: Option<usize>,
    scoring_threads: Option<usize>,
    map_threads: Option<usize>,
    basis: Option<TorsionBasisType>,
    full_recalculation: Option<bool>,
    depth: Option<DepthLimits>,
    map_grid: Option<GridSpec>,
    map_sigma: Option<f64>,
    map_cutoff: Option<f64>,
    reference_map: Option<DensityGrid>,
    probe_radius: Option<f64>,
    dots_per_atom: Option<usize>,
    flat_bottom: Option<f64>,
    excluded_bonds: Option<usize>,
}

impl CalculatorConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn threads(mut self, n: usize) -> Self {
        self.threads = Some(n);
        self
    }
    pub fn sequences_per_thread(mut self, n: usize) -> Self {
        self.sequences_per_thread = Some(n);
        self
    }
    pub fn surface_threads(mut self, n: usize) -> Self {
        self.surface_threads = Some(n);
        self
    }
    pub fn scoring_threads(mut self, n: usize) -> Self {
        self.scoring_threads = Some(n);
        self
    }
    pub fn map_threads(mut self, n: usize) -> Self {
        self.map_threads = Some(n);
        self
    }
    pub fn basis(mut self, basis: TorsionBasisType) -> Self {
        self.basis = Some(basis);
        self
    }
    pub fn full_recalculation(mut self, full: bool) -> Self {
        self.full_recalculation = Some(full);
        self
    }
    pub fn depth(mut self, min: usize, max: usize, side_max: usize) -> Self {
        self.depth = Some(DepthLimits { min, max, side_max });
        self
    }
    pub fn map_grid(mut self, grid: GridSpec) -> Self {
        self.map_grid = Some(grid);
        self
    }
    pub fn map_sigma(mut self, sigma: f64) -> Self {
        self.map_sigma = Some(sigma);
        self
    }
    pub fn map_cutoff(mut self, cutoff: f64) -> Self {
        self.map_cutoff = Some(cutoff);
        self
    }
    pub fn reference_map(mut self, map: DensityGrid) -> Self {
        self.reference_map = Some(map);
        self
    }
    pub fn probe_radius(mut self, radius: f64) -> Self {
        self.probe_radius = Some(radius);
        self
    }
    pub fn dots_per_atom(mut self, dots: usize) -> Self {
        self.dots_per_atom = Some(dots);
        self
    }
    pub fn flat_bottom(mut self, delta: f64) -> Self {
        self.flat_bottom = Some(delta);
        self
    }
    pub fn excluded_bonds(mut self, bonds: usize) -> Self {
        self.excluded_bonds = Some(bonds);
        self
    }

    pub fn build(self) -> Result<CalculatorConfig, ConfigError> {
        let defaults = CalculatorConfig::default();
        let threads = positive("threads", self.threads.unwrap_or(defaults.threads))?;
        let sequences_per_thread = positive(
            "sequences_per_thread",
            self.sequences_per_thread
                .unwrap_or(defaults.sequences_per_thread),
        )?;
        let surface_threads =
            positive("surface_threads", self.surface_threads.unwrap_or(threads))?;
        let scoring_threads =
            positive("scoring_threads", self.scoring_threads.unwrap_or(threads))?;
        let map_threads = positive("map_threads", self.map_threads.unwrap_or(threads))?;

        let wants_map = self.map_sigma.is_some()
            || self.map_cutoff.is_some()
            || self.reference_map.is_some();
        let map = match self.map_grid {
            None if wants_map => return Err(ConfigError::MissingParameter("map_grid")),
            None => None,
            Some(grid) => {
                if grid.voxel_count() == 0 || grid.spacing <= 0.0 {
                    return Err(ConfigError::InvalidParameter {
                        name: "map_grid",
                        reason: "grid must have a positive spacing and at least one voxel".into(),
                    });
                }
                let sigma = self.map_sigma.unwrap_or(grid.spacing);
                if sigma <= 0.0 {
                    return Err(ConfigError::InvalidParameter {
                        name: "map_sigma",
                        reason: format!("must be positive, got {sigma}"),
                    });
                }
                if let Some(reference) = &self.reference_map {
                    if reference.spec() != &grid {
                        return Err(ConfigError::InvalidParameter {
                            name: "reference_map",
                            reason: "reference map geometry differs from the map grid".into(),
                        });
                    }
                }
                Some(MapConfig {
                    grid,
                    sigma,
                    cutoff: self.map_cutoff.unwrap_or(3.0),
                    reference: self.reference_map,
                })
            }
        };

        Ok(CalculatorConfig {
            threads,
            sequences_per_thread,
            surface_threads,
            scoring_threads,
            map_threads,
            basis: self.basis.unwrap_or(defaults.basis),
            full_recalculation: self
                .full_recalculation
                .unwrap_or(defaults.full_recalculation),
            depth: self.depth.unwrap_or(defaults.depth),
            map,
            surface: SurfaceConfig {
                probe_radius: self
                    .probe_radius
                    .unwrap_or(defaults.surface.probe_radius),
                dots_per_atom: positive(
                    "dots_per_atom",
                    self.dots_per_atom
                        .unwrap_or(defaults.surface.dots_per_atom),
                )?,
            },
            scoring: ScoringConfig {
                flat_bottom: self.flat_bottom.unwrap_or(defaults.scoring.flat_bottom),
                excluded_bonds: self
                    .excluded_bonds
                    .unwrap_or(defaults.scoring.excluded_bonds),
            },
        })
    }
}

fn positive(name: &'static str, value: usize) -> Result<usize, ConfigError> {
    if value == 0 {
        return Err(ConfigError::InvalidParameter {
            name,
            reason: "must be at least 1".into(),
        });
    }
    Ok(value)
}
