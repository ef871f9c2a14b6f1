// SPDX-License-Identifier: MIT OR Apache-2.0
//! Convert command - re-encode a graph document.

use anyhow::Result;
use std::path::Path;

use super::{read_document, write_document, Format};

/// Run the convert command.
pub fn run(input: &Path, output: &Path) -> Result<()> {
    let document = read_document(input)?;
    write_document(&document, output)?;

    tracing::info!(
        from = ?Format::from_path(input),
        to = ?Format::from_path(output),
        nodes = document.nodes.len(),
        edges = document.edges.len(),
        "Document converted"
    );
    println!("Wrote {}", output.display());
    Ok(())
}
