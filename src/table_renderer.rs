//! Projects the nested per-sample payload of `/api/v1/project/{id}` into
//! HTML table rows.
//!
//! Each column reads from the region of the sample record its group names.
//! Prep-level groups are either joined across every prep of a sample or,
//! on the library validation tab, split into one row per prep.

use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

use crate::cell_renderer::{
    escape_html, header_label, CellRenderer, ImagePlaceholder, PlaceholderRegistry, RenderedCell,
};
use crate::column_manager::{ColumnDescriptor, ColumnGroup};
use crate::image_resolver::ImageOutcome;

/// Joins the per-prep values of a sample inside one cell
const PREP_SEPARATOR: &str = "<br>";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TableTab {
    #[default]
    Samples,
    /// One row per (sample, prep) pair
    LibraryValidation,
}

impl TableTab {
    pub fn is_split(&self) -> bool {
        matches!(self, TableTab::LibraryValidation)
    }
}

impl FromStr for TableTab {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_lowercase().as_str() {
            "samples" | "overview" => Ok(TableTab::Samples),
            "library-validation" | "lib-val" => Ok(TableTab::LibraryValidation),
            other => Err(anyhow::anyhow!("Unknown tab '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// The API returned no samples at all
    Empty,
    InvalidPayload(String),
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::Empty => write!(f, "no samples in payload"),
            RenderError::InvalidPayload(msg) => write!(f, "invalid sample payload: {}", msg),
        }
    }
}

impl std::error::Error for RenderError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedRow {
    pub sample_id: String,
    pub prep_id: Option<String>,
    pub striped: bool,
    pub cells: Vec<RenderedCell>,
}

impl RenderedRow {
    fn to_html(&self) -> String {
        let mut html = String::from(if self.striped {
            r#"<tr class="stripe">"#
        } else {
            "<tr>"
        });
        for cell in &self.cells {
            html.push_str("<td>");
            html.push_str(&cell.html);
            html.push_str("</td>");
        }
        html.push_str("</tr>");
        html
    }
}

#[derive(Debug, Clone, Default)]
pub struct RenderedTable {
    pub headers: Vec<String>,
    pub column_ids: Vec<String>,
    pub header_html: String,
    pub body_html: String,
    pub rows: Vec<RenderedRow>,
    pub placeholders: Vec<ImagePlaceholder>,
}

impl RenderedTable {
    /// Plain-text cells, row by row, for the search index and exports
    pub fn text_rows(&self) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .map(|row| row.cells.iter().map(|c| c.text.clone()).collect())
            .collect()
    }

    /// Swap a loading placeholder for its resolved markup; false when it is gone
    pub fn apply_image(&mut self, placeholder: &ImagePlaceholder, outcome: &ImageOutcome) -> bool {
        let loading = placeholder.loading_html();
        if !self.body_html.contains(&loading) {
            debug!(target: "images", "Placeholder {} no longer rendered", placeholder.id);
            return false;
        }

        let resolved = outcome.to_html(placeholder);
        self.body_html = self.body_html.replace(&loading, &resolved);
        for cell in self.rows.iter_mut().flat_map(|r| r.cells.iter_mut()) {
            if cell.html.contains(&loading) {
                cell.html = cell.html.replace(&loading, &resolved);
            }
        }
        self.placeholders.retain(|p| p.id != placeholder.id);
        true
    }

    /// Placeholders still showing the loading marker
    pub fn pending_images(&self) -> &[ImagePlaceholder] {
        &self.placeholders
    }

    pub fn to_html(&self) -> String {
        format!(
            "<table class=\"table table-sm table-bordered\" id=\"samples_table\">\n<thead>{}</thead>\n<tbody>\n{}\n</tbody>\n</table>",
            self.header_html, self.body_html
        )
    }
}

/// Plain string order, the way the API's process ids have always been compared.
/// `"9"` sorts after `"10"`.
pub fn compare_process_ids(a: &str, b: &str) -> Ordering {
    a.cmp(b)
}

/// The "most recent" entry of a validation map keyed by process id
pub fn latest_process(entries: &Map<String, Value>) -> Option<(&String, &Value)> {
    entries
        .iter()
        .max_by(|(a, _), (b, _)| compare_process_ids(a, b))
}

fn nested_field<'a>(record: &'a Value, container: &str, column_id: &str) -> Option<&'a Value> {
    record.get(container).and_then(|c| c.get(column_id))
}

/// Preps of a sample sorted by prep key
fn sorted_preps(record: &Value) -> Vec<(&String, &Value)> {
    let mut preps: Vec<_> = match record.get("library_prep").and_then(Value::as_object) {
        Some(preps) => preps.iter().collect(),
        None => Vec::new(),
    };
    preps.sort_by(|(a, _), (b, _)| a.cmp(b));
    preps
}

pub struct TableRenderer {
    cells: CellRenderer,
}

impl TableRenderer {
    pub fn new(cells: CellRenderer) -> Self {
        Self { cells }
    }

    pub fn render(
        &self,
        columns: &[ColumnDescriptor],
        records: &Value,
        tab: TableTab,
        placeholders: &mut PlaceholderRegistry,
    ) -> Result<RenderedTable, RenderError> {
        let samples = records
            .as_object()
            .ok_or_else(|| RenderError::InvalidPayload("expected an object keyed by sample".into()))?;
        if samples.is_empty() {
            return Err(RenderError::Empty);
        }

        let headers: Vec<String> = columns
            .iter()
            .map(|c| header_label(&c.display_name).to_string())
            .collect();

        let mut rows = Vec::new();
        let mut striped = false;
        let mut last_sample: Option<&str> = None;

        for (sample_id, record) in samples {
            if !record.is_object() {
                warn!(target: "render", "Skipping sample {}: record is not an object", sample_id);
                continue;
            }

            if !tab.is_split() {
                rows.push(RenderedRow {
                    sample_id: sample_id.clone(),
                    prep_id: None,
                    striped: false,
                    cells: columns
                        .iter()
                        .map(|c| self.sample_cell(c, record, placeholders))
                        .collect(),
                });
                continue;
            }

            if last_sample.is_some_and(|last| last != sample_id.as_str()) {
                striped = !striped;
            }
            last_sample = Some(sample_id.as_str());

            let preps = sorted_preps(record);
            if preps.is_empty() {
                debug!(target: "render", "Sample {} has no library preps", sample_id);
                rows.push(RenderedRow {
                    sample_id: sample_id.clone(),
                    prep_id: None,
                    striped,
                    cells: columns
                        .iter()
                        .map(|c| {
                            if c.group.is_prep_level() {
                                RenderedCell::placeholder()
                            } else {
                                self.sample_cell(c, record, placeholders)
                            }
                        })
                        .collect(),
                });
                continue;
            }

            for (prep_id, prep) in preps {
                rows.push(RenderedRow {
                    sample_id: sample_id.clone(),
                    prep_id: Some(prep_id.clone()),
                    striped,
                    cells: columns
                        .iter()
                        .map(|c| {
                            if c.group.is_prep_level() {
                                self.prep_cell(c, prep_id, prep, placeholders)
                            } else {
                                self.sample_cell(c, record, placeholders)
                            }
                        })
                        .collect(),
                });
            }
        }

        let header_html = format!(
            "<tr>{}</tr>",
            columns
                .iter()
                .zip(&headers)
                .map(|(c, label)| format!(
                    r#"<th class="sort" data-sort="{}">{}</th>"#,
                    escape_html(&c.column_id),
                    escape_html(label)
                ))
                .collect::<String>()
        );
        let body_html = rows
            .iter()
            .map(RenderedRow::to_html)
            .collect::<Vec<_>>()
            .join("\n");

        debug!(target: "render", "Rendered {} rows x {} columns ({:?})", rows.len(), columns.len(), tab);

        Ok(RenderedTable {
            headers,
            column_ids: columns.iter().map(|c| c.column_id.clone()).collect(),
            header_html,
            body_html,
            rows,
            placeholders: placeholders.take_pending(),
        })
    }

    /// Cell of a one-row-per-sample row
    fn sample_cell(
        &self,
        column: &ColumnDescriptor,
        record: &Value,
        placeholders: &mut PlaceholderRegistry,
    ) -> RenderedCell {
        let id = column.column_id.as_str();
        match column.group {
            ColumnGroup::Basic => self.cells.render_cell(id, record.get(id), placeholders),
            ColumnGroup::InitialQc => {
                self.cells
                    .render_cell(id, nested_field(record, "initial_qc", id), placeholders)
            }
            ColumnGroup::LibraryPrep
            | ColumnGroup::LibraryValidation
            | ColumnGroup::PrePrepLibraryValidation => {
                let preps = sorted_preps(record);
                if preps.is_empty() {
                    return RenderedCell::placeholder();
                }
                let cells: Vec<RenderedCell> = preps
                    .into_iter()
                    .map(|(prep_id, prep)| self.prep_cell(column, prep_id, prep, placeholders))
                    .collect();
                join_cells(cells)
            }
            ColumnGroup::Details => {
                self.cells
                    .render_cell(id, nested_field(record, "details", id), placeholders)
            }
        }
    }

    /// Cell for a single prep of a sample
    fn prep_cell(
        &self,
        column: &ColumnDescriptor,
        prep_id: &str,
        prep: &Value,
        placeholders: &mut PlaceholderRegistry,
    ) -> RenderedCell {
        let id = column.column_id.as_str();
        match column.group {
            ColumnGroup::LibraryPrep if id == "prep_id" => {
                let key = Value::String(prep_id.to_string());
                self.cells.render_cell(id, Some(&key), placeholders)
            }
            ColumnGroup::LibraryPrep => self.cells.render_cell(id, prep.get(id), placeholders),
            ColumnGroup::LibraryValidation => {
                self.validation_cell(id, prep, "library_validation", placeholders)
            }
            ColumnGroup::PrePrepLibraryValidation => {
                self.validation_cell(id, prep, "pre_prep_library_validation", placeholders)
            }
            _ => RenderedCell::placeholder(),
        }
    }

    fn validation_cell(
        &self,
        column_id: &str,
        prep: &Value,
        container: &str,
        placeholders: &mut PlaceholderRegistry,
    ) -> RenderedCell {
        let latest = prep
            .get(container)
            .and_then(Value::as_object)
            .and_then(latest_process);
        match latest {
            Some((_, process)) => self
                .cells
                .render_cell(column_id, process.get(column_id), placeholders),
            None => RenderedCell::placeholder(),
        }
    }
}

fn join_cells(cells: Vec<RenderedCell>) -> RenderedCell {
    if cells.len() == 1 {
        return cells.into_iter().next().unwrap_or_else(RenderedCell::placeholder);
    }
    RenderedCell {
        html: cells
            .iter()
            .map(|c| c.html.as_str())
            .collect::<Vec<_>>()
            .join(PREP_SEPARATOR),
        text: cells
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join(" "),
    }
}
