use crate::cli::SampleArgs;
use crate::error::{CliError, Result};
use bondcalc::core::density::grid::GridSpec;
use bondcalc::core::models::atom::{Atom, AtomRole};
use bondcalc::core::models::graph::BondGraph;
use bondcalc::core::models::ids::AtomId;
use bondcalc::engine::config::{CalculatorConfig, CalculatorConfigBuilder};
use bondcalc::engine::job::Requests;
use bondcalc::engine::sampler::PointSampler;
use bondcalc::engine::torsion::TorsionBasisType;
use bondcalc::workflows::sample::SampleConfig;
use nalgebra::Point3;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

const DEFAULT_POINTS: usize = 100;
const DEFAULT_SPREAD: f64 = 30.0;
const DEFAULT_SEED: u64 = 42;
const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct FileAnchor {
    name: String,
    element: String,
    position: [f64; 3],
    /// Virtual parent and grandparent of the anchor.
    frame: [[f64; 3]; 2],
    role: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct FileParameter {
    name: String,
    #[serde(default)]
    main_chain: bool,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct FileAtom {
    name: String,
    element: String,
    parent: String,
    position: [f64; 3],
    parameter: Option<String>,
    role: Option<String>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct PartialSamplingConfig {
    points: Option<usize>,
    spread: Option<f64>,
    seed: Option<u64>,
    /// Explicit sample points; replaces random sampling when present.
    explicit: Option<Vec<Vec<f64>>>,
    requests: Option<Vec<String>>,
    timeout_secs: Option<u64>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct PartialDepthConfig {
    min: Option<usize>,
    max: Option<usize>,
    side_max: Option<usize>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct PartialCalculatorConfig {
    threads: Option<usize>,
    sequences_per_thread: Option<usize>,
    surface_threads: Option<usize>,
    scoring_threads: Option<usize>,
    map_threads: Option<usize>,
    basis: Option<TorsionBasisType>,
    full_recalculation: Option<bool>,
    depth: Option<PartialDepthConfig>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct PartialSurfaceConfig {
    probe_radius: Option<f64>,
    dots_per_atom: Option<usize>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct PartialScoringConfig {
    flat_bottom: Option<f64>,
    excluded_bonds: Option<usize>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct PartialMapConfig {
    origin: [f64; 3],
    dims: [usize; 3],
    spacing: f64,
    sigma: Option<f64>,
    cutoff: Option<f64>,
}

/// One axis of a concerted torsion basis: torsion name to delta in degrees.
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct FileAxis {
    torsions: BTreeMap<String, f64>,
}

/// A model file as written on disk: the bond graph plus optional run settings.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ModelFile {
    anchor: FileAnchor,
    #[serde(default)]
    parameters: Vec<FileParameter>,
    #[serde(default)]
    atoms: Vec<FileAtom>,
    sampling: Option<PartialSamplingConfig>,
    calculator: Option<PartialCalculatorConfig>,
    surface: Option<PartialSurfaceConfig>,
    scoring: Option<PartialScoringConfig>,
    map: Option<PartialMapConfig>,
    #[serde(default)]
    axes: Vec<FileAxis>,
}

/// Everything the `sample` command needs, after merging file and command line.
#[derive(Debug)]
pub struct RunConfig {
    pub calculator: CalculatorConfig,
    pub sampler: PointSampler,
    pub sample: SampleConfig,
    /// Concerted-basis axes as parallel name and value lists.
    pub axes: Vec<(Vec<String>, Vec<f64>)>,
}

fn parse_role(role: Option<&str>, default: AtomRole) -> Result<AtomRole> {
    match role {
        None => Ok(default),
        Some(name) => AtomRole::from_str(name)
            .map_err(|_| CliError::Model(format!("Unknown atom role '{}'", name))),
    }
}

fn point(coords: [f64; 3]) -> Point3<f64> {
    Point3::new(coords[0], coords[1], coords[2])
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| CliError::Config(format!("Invalid value for {}: {}", key, value)))
}

impl ModelFile {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading model from file: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })
    }

    /// Builds the bond graph. Atoms are listed parent-first; each one's internal
    /// coordinates are measured from the reference positions in the file.
    pub fn build_graph(&self) -> Result<BondGraph> {
        let mut graph = BondGraph::new();
        for parameter in &self.parameters {
            graph.add_parameter(&parameter.name, parameter.main_chain)?;
        }

        let anchor = &self.anchor;
        let role = parse_role(anchor.role.as_deref(), AtomRole::MainChain)?;
        let anchor_id = graph.add_anchor(
            Atom::new(&anchor.name, &anchor.element, point(anchor.position)).with_role(role),
            [point(anchor.frame[0]), point(anchor.frame[1])],
        )?;

        let mut ids: HashMap<&str, AtomId> = HashMap::new();
        ids.insert(anchor.name.as_str(), anchor_id);
        for atom in &self.atoms {
            let parent = *ids.get(atom.parent.as_str()).ok_or_else(|| {
                CliError::Model(format!(
                    "Atom '{}' names parent '{}', which is not defined before it",
                    atom.name, atom.parent
                ))
            })?;
            let parameter = match &atom.parameter {
                Some(name) => Some(graph.parameter_index(name).ok_or_else(|| {
                    CliError::Model(format!(
                        "Atom '{}' uses undefined torsion parameter '{}'",
                        atom.name, name
                    ))
                })?),
                None => None,
            };
            let role = parse_role(atom.role.as_deref(), AtomRole::Other)?;
            let id = graph.add_atom_from_reference(
                Atom::new(&atom.name, &atom.element, point(atom.position)).with_role(role),
                parent,
                parameter,
            )?;
            if ids.insert(atom.name.as_str(), id).is_some() {
                return Err(CliError::Model(format!(
                    "Atom name '{}' is used more than once",
                    atom.name
                )));
            }
        }
        Ok(graph)
    }

    /// Merges the file's run settings with command-line overrides. Command-line values win,
    /// then `--set` values, then the file, then built-in defaults.
    pub fn merge_with_cli(
        &self,
        args: &SampleArgs,
        threads: Option<usize>,
        parameter_count: usize,
    ) -> Result<RunConfig> {
        let mut sampling = self.sampling.clone().unwrap_or_default();
        let mut calc = self.calculator.clone().unwrap_or_default();
        let mut scoring = self.scoring.clone().unwrap_or_default();
        Self::apply_set_values(&args.set_values, &mut sampling, &mut calc, &mut scoring)?;

        let calculator = self.merge_calculator(args, threads, calc, scoring)?;
        let axes: Vec<(Vec<String>, Vec<f64>)> = self
            .axes
            .iter()
            .map(|axis| axis.torsions.clone().into_iter().unzip())
            .collect();
        if !axes.is_empty() && calculator.basis != TorsionBasisType::Concerted {
            return Err(CliError::Config(
                "`axes` are only used with `calculator.basis = \"concerted\"`".to_string(),
            ));
        }

        let dims = match calculator.basis {
            TorsionBasisType::Simple => parameter_count,
            TorsionBasisType::Concerted => axes.len(),
        };
        let sampler = Self::merge_sampler(args, &sampling, dims)?;

        let requests = if args.requests.is_empty() {
            sampling.requests.clone().unwrap_or_default()
        } else {
            args.requests.clone()
        };
        let requests = parse_requests(&requests)?;
        let timeout = args
            .timeout
            .or(sampling.timeout_secs)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        Ok(RunConfig {
            calculator,
            sampler,
            sample: SampleConfig {
                requests,
                idle_timeout: Duration::from_secs(timeout),
            },
            axes,
        })
    }

    fn merge_calculator(
        &self,
        args: &SampleArgs,
        threads: Option<usize>,
        calc: PartialCalculatorConfig,
        scoring: PartialScoringConfig,
    ) -> Result<CalculatorConfig> {
        let mut builder = CalculatorConfigBuilder::new();
        if let Some(n) = threads.or(calc.threads) {
            builder = builder.threads(n);
        }
        if let Some(n) = calc.sequences_per_thread {
            builder = builder.sequences_per_thread(n);
        }
        if let Some(n) = calc.surface_threads {
            builder = builder.surface_threads(n);
        }
        if let Some(n) = calc.scoring_threads {
            builder = builder.scoring_threads(n);
        }
        if let Some(n) = calc.map_threads {
            builder = builder.map_threads(n);
        }
        if let Some(basis) = calc.basis {
            builder = builder.basis(basis);
        }
        let full = !args.partial_recalculation && calc.full_recalculation.unwrap_or(true);
        builder = builder.full_recalculation(full);

        if let Some(depth) = calc.depth {
            builder = builder.depth(
                depth.min.unwrap_or(0),
                depth.max.unwrap_or(usize::MAX),
                depth.side_max.unwrap_or(usize::MAX),
            );
        }
        if let Some(surface) = &self.surface {
            if let Some(radius) = surface.probe_radius {
                builder = builder.probe_radius(radius);
            }
            if let Some(dots) = surface.dots_per_atom {
                builder = builder.dots_per_atom(dots);
            }
        }
        if let Some(delta) = scoring.flat_bottom {
            builder = builder.flat_bottom(delta);
        }
        if let Some(bonds) = scoring.excluded_bonds {
            builder = builder.excluded_bonds(bonds);
        }
        if let Some(map) = &self.map {
            builder = builder.map_grid(GridSpec {
                origin: map.origin,
                dims: map.dims,
                spacing: map.spacing,
            });
            if let Some(sigma) = map.sigma {
                builder = builder.map_sigma(sigma);
            }
            if let Some(cutoff) = map.cutoff {
                builder = builder.map_cutoff(cutoff);
            }
        }

        builder.build().map_err(|e| CliError::Config(e.to_string()))
    }

    fn merge_sampler(
        args: &SampleArgs,
        sampling: &PartialSamplingConfig,
        dims: usize,
    ) -> Result<PointSampler> {
        if let Some(points) = &sampling.explicit {
            if args.points.is_some() || args.seed.is_some() || args.spread.is_some() {
                return Err(CliError::Argument(
                    "--points, --seed and --spread cannot override explicit sample points"
                        .to_string(),
                ));
            }
            let sampler = PointSampler::new(points.clone()).ok_or_else(|| {
                CliError::Config("Explicit sample points differ in length".to_string())
            })?;
            if !points.is_empty() && points[0].len() != dims {
                return Err(CliError::Config(format!(
                    "Explicit sample points have {} coordinates, the basis needs {}",
                    points[0].len(),
                    dims
                )));
            }
            return Ok(sampler);
        }

        let count = args.points.or(sampling.points).unwrap_or(DEFAULT_POINTS);
        let spread = args.spread.or(sampling.spread).unwrap_or(DEFAULT_SPREAD);
        let seed = args.seed.or(sampling.seed).unwrap_or(DEFAULT_SEED);
        let mut rng = StdRng::seed_from_u64(seed);
        Ok(PointSampler::random(count, dims, spread, &mut rng))
    }

    fn apply_set_values(
        set_values: &[String],
        sampling: &mut PartialSamplingConfig,
        calc: &mut PartialCalculatorConfig,
        scoring: &mut PartialScoringConfig,
    ) -> Result<()> {
        for kv_pair in set_values {
            let Some((key, value)) = kv_pair.split_once('=') else {
                return Err(CliError::Config(format!(
                    "Invalid --set format: '{}'. Expected KEY=VALUE.",
                    kv_pair
                )));
            };
            match key {
                "sampling.points" => sampling.points = Some(parse_value(key, value)?),
                "sampling.spread" => sampling.spread = Some(parse_value(key, value)?),
                "sampling.seed" => sampling.seed = Some(parse_value(key, value)?),
                "sampling.timeout-secs" => sampling.timeout_secs = Some(parse_value(key, value)?),
                "calculator.threads" => calc.threads = Some(parse_value(key, value)?),
                "calculator.sequences-per-thread" => {
                    calc.sequences_per_thread = Some(parse_value(key, value)?)
                }
                "calculator.surface-threads" => {
                    calc.surface_threads = Some(parse_value(key, value)?)
                }
                "calculator.scoring-threads" => {
                    calc.scoring_threads = Some(parse_value(key, value)?)
                }
                "calculator.map-threads" => calc.map_threads = Some(parse_value(key, value)?),
                "calculator.full-recalculation" => {
                    calc.full_recalculation = Some(parse_value(key, value)?)
                }
                "scoring.flat-bottom" => scoring.flat_bottom = Some(parse_value(key, value)?),
                "scoring.excluded-bonds" => {
                    scoring.excluded_bonds = Some(parse_value(key, value)?)
                }
                _ => {
                    return Err(CliError::Config(format!(
                        "Unsupported configuration key for --set: '{}'",
                        key
                    )));
                }
            }
        }
        Ok(())
    }
}

fn parse_requests(names: &[String]) -> Result<Requests> {
    if names.is_empty() {
        return Ok(SampleConfig::default().requests);
    }
    names.iter().try_fold(Requests::NONE, |acc, name| {
        Requests::from_name(name)
            .map(|r| acc | r)
            .ok_or_else(|| CliError::Config(format!("Unknown request '{}'", name)))
    })
}
