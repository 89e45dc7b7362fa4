use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    author = "Tony Kan",
    version,
    about = "bondcalc CLI - Sample torsion-space conformations of a bond graph and score them on a pool of worker threads.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Number of calculator threads, overriding `calculator.threads` in the model file.
    #[arg(short = 'j', long, global = true, value_name = "NUM")]
    pub threads: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run every sample point of a model through the calculator and summarize the results.
    Sample(SampleArgs),
    /// Print the atoms, elements and torsion parameters of a model.
    Inspect(InspectArgs),
}

/// Arguments for the `sample` subcommand.
#[derive(Args, Debug)]
pub struct SampleArgs {
    /// Path to the model file in TOML format.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub model: PathBuf,

    // --- Sampling Overrides ---
    /// Override the number of random sample points.
    #[arg(short = 'n', long, value_name = "INT")]
    pub points: Option<usize>,

    /// Override the random seed.
    #[arg(long, value_name = "INT")]
    pub seed: Option<u64>,

    /// Override the torsion spread in degrees.
    #[arg(long, value_name = "FLOAT")]
    pub spread: Option<f64>,

    /// Request an output for every point; replaces the model's request list.
    /// Can be used multiple times. Example: -r score -r surface-area
    #[arg(short, long = "request", value_name = "NAME")]
    pub requests: Vec<String>,

    /// Seconds to wait for the next result before giving up.
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    // --- Calculator Overrides ---
    /// Only recompute atoms downstream of the first changed torsion.
    #[arg(long)]
    pub partial_recalculation: bool,

    /// Number of sample points listed in the summary.
    #[arg(long, value_name = "INT", default_value_t = 10)]
    pub top: usize,

    /// Set a specific configuration value, overriding the model file.
    /// Can be used multiple times. Example: -S sampling.points=50
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}

/// Arguments for the `inspect` subcommand.
#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Path to the model file in TOML format.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub model: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_arguments_parse_with_global_flags() {
        let cli = Cli::parse_from([
            "bondcalc", "-vv", "-j", "4", "sample", "-m", "model.toml", "-n", "25", "-r",
            "score", "-r", "surface-area", "-S", "sampling.seed=7",
        ]);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.threads, Some(4));
        let Commands::Sample(args) = cli.command else {
            panic!("Expected 'sample' subcommand");
        };
        assert_eq!(args.model, PathBuf::from("model.toml"));
        assert_eq!(args.points, Some(25));
        assert_eq!(args.requests, vec!["score", "surface-area"]);
        assert_eq!(args.set_values, vec!["sampling.seed=7"]);
        assert_eq!(args.top, 10);
        assert!(!args.partial_recalculation);
    }

    #[test]
    fn quiet_conflicts_with_verbose() {
        let result = Cli::try_parse_from(["bondcalc", "-q", "-v", "inspect", "-m", "m.toml"]);
        assert!(result.is_err());
    }

    #[test]
    fn model_path_is_required() {
        assert!(Cli::try_parse_from(["bondcalc", "inspect"]).is_err());
    }
}
