// SPDX-License-Identifier: MIT OR Apache-2.0
//! Eval command - evaluate a graph document.

use anyhow::{Context, Result};
use nodeflow_graph::evaluator::EvaluationOutcome;
use nodeflow_graph::{Evaluator, EvaluatorConfig, Resources};
use std::path::Path;

use super::{format_value, load_graph, print_skipped};

/// Run the eval command.
pub fn run(file: &Path, config: Option<&Path>) -> Result<()> {
    let config = match config {
        Some(path) => EvaluatorConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => EvaluatorConfig::default(),
    };

    let (graph, load) = load_graph(file)?;
    println!(
        "Loaded {}: {} node(s), {} edge(s)",
        file.display(),
        load.nodes_loaded,
        load.edges_loaded
    );
    print_skipped(&load);

    let evaluator = Evaluator::new(config);
    let report = evaluator.evaluate(&graph, &mut Resources::new());

    if let EvaluationOutcome::CycleDetected { unresolved } = &report.outcome {
        anyhow::bail!(
            "Graph contains a cycle through {} node(s); nothing was evaluated",
            unresolved.len()
        );
    }

    println!();
    for node_id in &report.order {
        let Some(node) = graph.node(*node_id) else {
            continue;
        };
        let base = node.base();
        println!("{} ({}) {}", base.label, base.node_type(), node_id);
        for port in base.outputs() {
            let value = port
                .value
                .as_ref()
                .map_or_else(|| "-".to_string(), format_value);
            println!("  {} = {}", port.name(), value);
        }
    }

    if !report.failures.is_empty() {
        println!();
        for failure in &report.failures {
            println!(
                "  failed: {} ({}): {}",
                failure.node, failure.node_type, failure.error
            );
        }
        anyhow::bail!("{} node(s) failed to evaluate", report.failures.len());
    }

    Ok(())
}
