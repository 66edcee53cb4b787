use std::io::{self, Write};

use overflow_mcp::Catalog;

/// Write the `--test` listing of `catalog` to `out` and any discovery
/// failures to `err`. Returns whether every backend answered.
pub fn write_listing(catalog: &Catalog, out: &mut impl Write, err: &mut impl Write) -> io::Result<bool> {
    writeln!(out, "Overflow tools available: {}", catalog.tools.len())?;
    for tool in &catalog.tools {
        writeln!(
            out,
            "  - {}: {}",
            tool.namespaced_name,
            tool.description.as_deref().unwrap_or("No description")
        )?;
    }

    for failure in &catalog.failures {
        writeln!(err, "Backend '{}' failed: {}", failure.backend, failure.error)?;
    }
    Ok(catalog.failures.is_empty())
}
