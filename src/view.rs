//! Render context for one project page view.
//!
//! A `ProjectView` owns everything the page needs between user actions:
//! the column selection, the loaded presets, the last rendered table and
//! its search index, and the lifecycle flag that cancels outstanding
//! thumbnail fetches when the view goes away.

use anyhow::{anyhow, Result};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cell_renderer::{escape_html, CellRenderer, PlaceholderRegistry};
use crate::column_manager::{ColumnCatalog, ColumnDescriptor, ColumnFilterState};
use crate::datasource_trait::DataSource;
use crate::image_resolver::{ImageResolver, ViewLifecycle};
use crate::presets::{PresetControls, PresetKind, PresetSet};
use crate::running_notes::{latest_sticky, RunningNote};
use crate::search_filter::SearchIndex;
use crate::table_renderer::{RenderError, RenderedTable, TableRenderer, TableTab};

/// What the content panel shows after a render
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewContent {
    Table,
    /// Informational panel replacing the whole content area
    Empty(String),
    /// The fetch failed; the previous content is left as it was
    Unavailable,
}

pub struct ProjectView {
    project_id: String,
    source: Arc<dyn DataSource>,
    filter: ColumnFilterState,
    presets: PresetSet,
    controls: PresetControls,
    renderer: TableRenderer,
    placeholders: PlaceholderRegistry,
    table: Option<RenderedTable>,
    search: SearchIndex,
    tab: TableTab,
    title: Option<String>,
    sticky_note: Option<RunningNote>,
    empty_panel: Option<String>,
    lifecycle: ViewLifecycle,
}

impl ProjectView {
    pub fn new(
        project_id: &str,
        source: Arc<dyn DataSource>,
        catalog: ColumnCatalog,
        cells: CellRenderer,
    ) -> Self {
        debug!(target: "render", "Opening view for {} from {}", project_id, source.describe());
        Self {
            project_id: project_id.to_string(),
            source,
            filter: ColumnFilterState::new(catalog),
            presets: PresetSet::default(),
            controls: PresetControls::default(),
            renderer: TableRenderer::new(cells),
            placeholders: PlaceholderRegistry::new(),
            table: None,
            search: SearchIndex::default(),
            tab: TableTab::default(),
            title: None,
            sticky_note: None,
            empty_panel: None,
            lifecycle: ViewLifecycle::new(),
        }
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn filter(&self) -> &ColumnFilterState {
        &self.filter
    }

    pub fn filter_mut(&mut self) -> &mut ColumnFilterState {
        &mut self.filter
    }

    pub fn presets(&self) -> &PresetSet {
        &self.presets
    }

    pub fn controls(&self) -> &PresetControls {
        &self.controls
    }

    pub fn table(&self) -> Option<&RenderedTable> {
        self.table.as_ref()
    }

    pub fn search_index(&self) -> &SearchIndex {
        &self.search
    }

    pub fn sticky_note(&self) -> Option<&RunningNote> {
        self.sticky_note.as_ref()
    }

    pub fn lifecycle(&self) -> &ViewLifecycle {
        &self.lifecycle
    }

    pub fn set_tab(&mut self, tab: TableTab) {
        self.tab = tab;
    }

    /// Fetch presets and build the picker controls.
    /// A failed fetch leaves the controls empty; nothing is retried.
    pub fn load_presets(&mut self) {
        match self.source.presets().and_then(|v| PresetSet::from_value(&v)) {
            Ok(presets) => {
                info!(
                    target: "presets",
                    "Loaded {} default and {} user presets",
                    presets.default.len(),
                    presets.user.len()
                );
                self.controls = PresetControls::render(&presets);
                self.presets = presets;
            }
            Err(e) => warn!(target: "presets", "Could not load presets: {}", e),
        }

        if self.filter.checked_count() == 0 {
            self.filter.reset_default_checkboxes();
        }
    }

    /// Overwrite the column selection with a preset and return the new columns
    pub fn select_preset(&mut self, kind: PresetKind, name: &str) -> Result<Vec<ColumnDescriptor>> {
        let preset = self
            .presets
            .find(kind, name)
            .ok_or_else(|| anyhow!("No {} preset named '{}'", kind, name))?;
        self.filter.apply_preset(preset);
        debug!(target: "presets", "Applied {} preset '{}'", kind, name);
        Ok(self.filter.selected_columns())
    }

    pub fn reset_filter(&mut self) -> Vec<ColumnDescriptor> {
        self.filter.reset_default_checkboxes();
        self.filter.selected_columns()
    }

    /// Read the project name for the page title; failures only lose the title
    pub fn load_title(&mut self) {
        match self.source.project_summary(&self.project_id) {
            Ok(summary) => {
                self.title = summary
                    .get("project_name")
                    .and_then(Value::as_str)
                    .map(str::to_string);
            }
            Err(e) => warn!(target: "api", "Could not load summary for {}: {}", self.project_id, e),
        }
    }

    /// Latest sticky running note, shown above the presets
    pub fn load_sticky_note(&mut self) {
        match self.source.latest_sticky_note(&self.project_id) {
            Ok(value) => {
                self.sticky_note = latest_sticky(&value);
                debug!(
                    target: "notes",
                    "{} sticky note for {}",
                    if self.sticky_note.is_some() { "Loaded" } else { "No" },
                    self.project_id
                );
            }
            Err(e) => debug!(target: "notes", "No sticky note for {}: {}", self.project_id, e),
        }
    }

    /// Fetch the samples and replace the table with the current selection
    pub fn render_table(&mut self) -> ViewContent {
        let records = match self.source.project_samples(&self.project_id) {
            Ok(records) => records,
            Err(e) => {
                warn!(target: "api", "Could not load samples for {}: {}", self.project_id, e);
                return ViewContent::Unavailable;
            }
        };
        self.render_records(&records)
    }

    /// Render an already fetched payload
    pub fn render_records(&mut self, records: &Value) -> ViewContent {
        let columns = self.filter.selected_columns();

        match self
            .renderer
            .render(&columns, records, self.tab, &mut self.placeholders)
        {
            Ok(table) => {
                self.search = SearchIndex::new(table.headers.clone(), table.text_rows());
                self.table = Some(table);
                self.empty_panel = None;
                ViewContent::Table
            }
            Err(RenderError::Empty) => {
                let panel = format!(
                    r#"<div class="alert alert-info" role="alert"><h4>No samples found</h4><p>Project {} has no sample information yet.</p></div>"#,
                    escape_html(&self.project_id)
                );
                info!(target: "render", "Project {} has no samples", self.project_id);
                self.table = None;
                self.search = SearchIndex::default();
                self.empty_panel = Some(panel.clone());
                ViewContent::Empty(panel)
            }
            Err(e) => {
                warn!(target: "render", "Cannot render {}: {}", self.project_id, e);
                ViewContent::Unavailable
            }
        }
    }

    /// Resolve pending thumbnails and patch them into the table
    pub async fn resolve_images(&mut self, resolver: &ImageResolver) -> usize {
        let pending = match &self.table {
            Some(table) => table.pending_images().to_vec(),
            None => return 0,
        };

        let results = resolver.resolve(pending, &self.lifecycle).await;

        let mut patched = 0;
        if let Some(table) = self.table.as_mut() {
            for (placeholder, outcome) in &results {
                if table.apply_image(placeholder, outcome) {
                    patched += 1;
                }
            }
        }
        debug!(target: "images", "Patched {} of {} thumbnails", patched, results.len());
        patched
    }

    /// Standalone HTML document with the preset pickers and the content panel
    pub fn page_html(&self) -> String {
        let title = match &self.title {
            Some(name) => format!("{}, {}", self.project_id, name),
            None => self.project_id.clone(),
        };

        let content = match (&self.table, &self.empty_panel) {
            (Some(table), _) => table.to_html(),
            (None, Some(panel)) => panel.clone(),
            (None, None) => String::new(),
        };

        let sticky_note = match &self.sticky_note {
            Some(note) => format!("<div id=\"sticky_note\">\n{}\n</div>\n", note.to_html()),
            None => String::new(),
        };

        format!(
            r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>{title}</title>
<style>
tr.stripe {{ background-color: #f2f2f2; }}
.thumbnail {{ max-height: 60px; }}
</style>
</head>
<body>
<h1>{title}</h1>
{sticky_note}<div id="default_presets">
{default_presets}
</div>
<div id="user_presets">
{user_presets}
</div>
<div id="tab_content">
{content}
</div>
</body>
</html>
"#,
            title = escape_html(&title),
            sticky_note = sticky_note,
            default_presets = self.controls.default_html,
            user_presets = self.controls.user_html,
            content = content,
        )
    }

    /// End of the page view: outstanding fetches are cancelled
    pub fn teardown(self) {
        debug!(target: "render", "Closing view for {}", self.project_id);
    }
}

impl Drop for ProjectView {
    fn drop(&mut self) {
        self.lifecycle.cancel();
    }
}
