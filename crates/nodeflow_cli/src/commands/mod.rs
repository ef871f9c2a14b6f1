// SPDX-License-Identifier: MIT OR Apache-2.0
//! CLI command implementations.

pub mod convert;
pub mod eval;
pub mod inspect;

use anyhow::{Context, Result};
use nodeflow_graph::{Graph, GraphDocument, LoadReport, PortValue};
use std::path::Path;

use crate::library;

/// Document encoding, chosen by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// `.json` and anything unrecognized
    Json,
    /// `.ron`
    Ron,
}

impl Format {
    /// Pick the encoding for a path
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("ron") => Self::Ron,
            _ => Self::Json,
        }
    }
}

/// Read and parse a document file
pub fn read_document(path: &Path) -> Result<GraphDocument> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let document = match Format::from_path(path) {
        Format::Json => GraphDocument::from_json(&text),
        Format::Ron => GraphDocument::from_ron(&text),
    }
    .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(document)
}

/// Encode and write a document file
pub fn write_document(document: &GraphDocument, path: &Path) -> Result<()> {
    let text = match Format::from_path(path) {
        Format::Json => document.to_json(),
        Format::Ron => document.to_ron(),
    }?;
    std::fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))
}

/// Load a document file into a fresh graph built from the demo library
pub fn load_graph(path: &Path) -> Result<(Graph, LoadReport)> {
    let document = read_document(path)?;
    let name = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut graph = Graph::new(name);
    let report = document.restore(&mut graph, &library::create_math_registry());
    Ok((graph, report))
}

/// Print what a load had to leave out
pub fn print_skipped(report: &LoadReport) {
    for (id, node_type) in &report.skipped_nodes {
        println!("  skipped node {id}: unknown type {node_type:?}");
    }
    if report.skipped_edges > 0 {
        println!("  skipped {} edge(s)", report.skipped_edges);
    }
}

/// Human-readable rendering of a port value
pub fn format_value(value: &PortValue) -> String {
    match value {
        PortValue::Number(n) => n.to_string(),
        PortValue::Bool(b) => b.to_string(),
        PortValue::Text(s) => format!("{s:?}"),
        PortValue::Vector3(v) => format!("{v:?}"),
        PortValue::Color(c) => format!("{c:?}"),
        PortValue::Matrix(m) => format!("{m:?}"),
        PortValue::Point2(p) => format!("{p:?}"),
        PortValue::List(items) => {
            let items: Vec<String> = items.iter().map(format_value).collect();
            format!("[{}]", items.join(", "))
        }
        PortValue::Object(object) => format!("{object:?}"),
    }
}
