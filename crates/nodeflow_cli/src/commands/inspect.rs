// SPDX-License-Identifier: MIT OR Apache-2.0
//! Inspect command - show a graph document's structure.

use anyhow::Result;
use nodeflow_graph::NodeId;
use std::path::Path;

use super::{load_graph, print_skipped};

/// Run the inspect command.
pub fn run(file: &Path) -> Result<()> {
    let (graph, load) = load_graph(file)?;

    println!("Graph: {}", graph.name);
    println!("{}", "=".repeat(7 + graph.name.len()));
    println!("Nodes: {}", graph.node_count());
    println!("Edges: {}", graph.edge_count());
    if !load.is_complete() {
        print_skipped(&load);
    }
    println!();

    let label = |id: NodeId| {
        graph
            .node(id)
            .map_or_else(|| id.to_string(), |node| format!("{} ({id})", node.base().label))
    };

    match graph.topological_order() {
        Ok(order) => {
            println!("Evaluation order:");
            for (step, id) in order.into_iter().enumerate() {
                println!("  {}. {}", step + 1, label(id));
            }
        }
        Err(err) => {
            println!("{err}:");
            for id in err.unresolved {
                println!("  - {}", label(id));
            }
        }
    }

    println!();
    println!("Edges:");
    for edge in graph.edges() {
        println!("  {}", edge.id());
    }

    Ok(())
}
