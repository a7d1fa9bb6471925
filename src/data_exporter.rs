use anyhow::{anyhow, Result};
use std::io::Write;
use std::path::Path;

use crate::table_renderer::RenderedTable;

/// Writes the plain text of a rendered table to CSV
pub struct DataExporter;

impl DataExporter {
    /// Export every row, or only `rows` (e.g. the result of a search filter)
    pub fn write_csv<W: Write>(
        table: &RenderedTable,
        rows: Option<&[usize]>,
        writer: W,
    ) -> Result<usize> {
        if table.headers.is_empty() {
            return Err(anyhow!("No columns to export - render a table first"));
        }

        let mut wtr = csv::Writer::from_writer(writer);
        wtr.write_record(&table.headers)?;

        let selected: Vec<usize> = match rows {
            Some(rows) => rows.to_vec(),
            None => (0..table.rows.len()).collect(),
        };

        let mut row_count = 0;
        for idx in selected {
            let row = match table.rows.get(idx) {
                Some(row) => row,
                None => continue,
            };
            wtr.write_record(row.cells.iter().map(|c| c.text.as_str()))?;
            row_count += 1;
        }

        wtr.flush()?;
        Ok(row_count)
    }

    pub fn export_to_file(
        table: &RenderedTable,
        rows: Option<&[usize]>,
        path: &Path,
    ) -> Result<String> {
        let file = std::fs::File::create(path)?;
        let row_count = Self::write_csv(table, rows, file)?;
        Ok(format!("Exported {} rows to {}", row_count, path.display()))
    }
}
