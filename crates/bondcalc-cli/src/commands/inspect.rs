use crate::cli::InspectArgs;
use crate::config::ModelFile;
use crate::error::Result;
use bondcalc::core::models::graph::BondGraph;
use tracing::info;

pub fn run(args: InspectArgs) -> Result<()> {
    let model = ModelFile::from_file(&args.model)?;
    let graph = model.build_graph()?;
    info!("Model loaded with {} atom(s).", graph.atom_count());

    for line in describe(&graph) {
        println!("{}", line);
    }
    Ok(())
}

/// Human-readable summary of a graph: element counts, torsion parameters, then every atom
/// in placement order with its parent and the torsion that rotates it.
pub fn describe(graph: &BondGraph) -> Vec<String> {
    let mut lines = Vec::new();

    let elements = graph
        .element_list()
        .iter()
        .map(|(element, count)| format!("{} x{}", element, count))
        .collect::<Vec<_>>()
        .join(", ");
    lines.push(format!("Atoms: {} ({})", graph.atom_count(), elements));

    lines.push(format!("Torsion parameters: {}", graph.parameters().len()));
    let order = graph.breadth_first();
    for (index, parameter) in graph.parameters().iter().enumerate() {
        let rotated = order
            .iter()
            .filter(|id| {
                graph
                    .placement(**id)
                    .is_some_and(|p| p.parameter == Some(index))
            })
            .count();
        let chain = if parameter.main_chain {
            "main chain"
        } else {
            "side chain"
        };
        lines.push(format!(
            "  {} ({}): rotates {} atom(s)",
            parameter.name, chain, rotated
        ));
    }

    lines.push("Placement order:".to_string());
    for id in order {
        let Some(atom) = graph.atom(id) else {
            continue;
        };
        let detail = match graph.placement(id) {
            None => "anchor".to_string(),
            Some(placement) => {
                let parent = graph
                    .atom(placement.parent)
                    .map_or("?", |a| a.name.as_str());
                let torsion = placement
                    .parameter
                    .and_then(|i| graph.parameters().get(i))
                    .map_or("fixed", |p| p.name.as_str());
                format!(
                    "parent {:<4} bond {:.3} angle {:.1} torsion {:.1} ({})",
                    parent, placement.bond_length, placement.bond_angle, placement.torsion, torsion
                )
            }
        };
        lines.push(format!(
            "  {:<4} {:<2} {:?}  {}",
            atom.name, atom.element, atom.role, detail
        ));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::{MODEL, write_model};

    #[test]
    fn describe_lists_elements_parameters_and_atoms() {
        let model: ModelFile = toml::from_str(MODEL).unwrap();
        let graph = model.build_graph().unwrap();
        let lines = describe(&graph);

        assert_eq!(lines[0], "Atoms: 5 (C x3, N x1, S x1)");
        assert_eq!(lines[1], "Torsion parameters: 2");
        assert_eq!(lines[2], "  phi (main chain): rotates 2 atom(s)");
        assert_eq!(lines[3], "  chi1 (side chain): rotates 1 atom(s)");
        assert_eq!(lines[4], "Placement order:");
        assert!(lines[5].contains("anchor"));
        assert!(lines[5].trim_start().starts_with("N "));
        assert_eq!(lines.len(), 10);
        assert!(lines.iter().any(|l| l.contains("SG") && l.contains("(chi1)")));
    }

    #[test]
    fn run_reads_the_model_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_model(&dir, "model.toml", MODEL);
        assert!(run(InspectArgs { model: path }).is_ok());
    }

    #[test]
    fn run_reports_parse_errors_with_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_model(&dir, "broken.toml", "[anchor]\nname = 3\n");
        let err = run(InspectArgs { model: path }).unwrap_err();
        assert!(err.to_string().contains("broken.toml"));
    }
}
