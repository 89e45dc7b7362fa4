use crate::cli::SampleArgs;
use crate::config::ModelFile;
use crate::error::Result;
use crate::utils::progress::CliProgressHandler;
use bondcalc::engine::calculator::BondCalculator;
use bondcalc::engine::progress::ProgressReporter;
use bondcalc::workflows::sample::{self, PointStats, SampleSummary};
use std::sync::Arc;
use tracing::{info, warn};

pub fn run(args: SampleArgs, threads: Option<usize>, quiet: bool) -> Result<()> {
    let model = ModelFile::from_file(&args.model)?;
    let graph = model.build_graph()?;
    let run_config = model.merge_with_cli(&args, threads, graph.parameters().len())?;
    info!(
        threads = run_config.calculator.threads,
        sequences = run_config.calculator.sequence_count(),
        "Configuration merged."
    );

    let mut calculator = BondCalculator::new(graph, run_config.calculator);
    calculator.set_sampler(Arc::new(run_config.sampler))?;
    calculator.setup()?;
    for (names, values) in &run_config.axes {
        let report = calculator.supply_torsions(names.as_slice(), values)?;
        if !report.unused.is_empty() {
            warn!(
                "Axis {} names torsions not in the model: {}",
                report.axis,
                report.unused.join(", ")
            );
        }
    }
    let missing = calculator.missing_torsions();
    if missing.total() > 0 {
        println!(
            "Note: {} main-chain and {} side-chain torsion value(s) missing from the axes.",
            missing.main_chain, missing.side_chain
        );
    }
    calculator.start()?;

    let progress_handler = if quiet {
        CliProgressHandler::hidden()
    } else {
        CliProgressHandler::new()
    };
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());

    println!(
        "Sampling {} point(s)...",
        calculator.sample_point_count()
    );
    let summary = sample::run(&calculator, &run_config.sample, &reporter);
    calculator.finish();
    let summary = summary?;

    if !summary.is_complete() {
        warn!(
            "{} of {} point(s) produced no result.",
            summary.tally.pending(),
            summary.submitted
        );
    }
    for line in format_summary(&summary, args.top) {
        println!("{}", line);
    }
    Ok(())
}

fn cell(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{:.4}", v))
}

/// Header plus up to `top` rows, best mean score first when scores were requested and in
/// point order otherwise.
pub fn format_summary(summary: &SampleSummary, top: usize) -> Vec<String> {
    let mut rows: Vec<(usize, &PointStats)> = summary.tally.iter().collect();
    if rows.iter().any(|(_, s)| s.mean_score().is_some()) {
        rows.sort_by(|a, b| {
            let (sa, sb) = (a.1.mean_score(), b.1.mean_score());
            match (sa, sb) {
                (Some(x), Some(y)) => x.total_cmp(&y),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => a.0.cmp(&b.0),
            }
        });
    }

    let mut lines = vec![
        format!(
            "Completed {}/{} point(s).",
            summary.completed(),
            summary.submitted
        ),
        format!(
            "{:>6}  {:>14}  {:>10}  {:>12}",
            "point", "score", "deviation", "surface-area"
        ),
    ];
    lines.extend(rows.into_iter().take(top).map(|(point, stats)| {
        format!(
            "{:>6}  {:>14}  {:>10}  {:>12}",
            point,
            cell(stats.mean_score()),
            cell(stats.mean_deviation()),
            cell(stats.mean_surface_area())
        )
    }));
    lines
}
