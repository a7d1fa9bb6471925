use reqwest::Url;
use serde_json::Value;
use tracing::warn;

use crate::config::config::RenderConfig;

/// Rendered in place of missing, null and empty values
pub const PLACEHOLDER: &str = "-";

/// Sample name the sequencer reports for reads it could not demultiplex
pub const UNEXPECTED_BARCODE: &str = "Unexpectedbarcode";

/// How a column's value is turned into markup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellFormat {
    /// Escaped text
    Plain,
    /// Link to the external sample search tool
    Link,
    /// Danger badge
    Badge,
    /// `<samp>` wrapped link
    MonospaceLink,
    /// Thumbnail resolved after the table is written
    ImagePlaceholder,
    /// Operator initials with the trailing `X` signature marker removed
    Signature,
}

impl CellFormat {
    /// Formatter lookup by column id
    pub fn for_column(column_id: &str) -> Self {
        match column_id {
            "scilife_name" => CellFormat::Link,
            "workset_name" | "workset_setup" | "reagent_label" => CellFormat::MonospaceLink,
            "initials" => CellFormat::Signature,
            "caliper_image" | "frag_an_image" => CellFormat::ImagePlaceholder,
            _ => CellFormat::Plain,
        }
    }
}

/// Header labels that differ from the checkbox labels
const HEADER_OVERRIDES: &[(&str, &str)] = &[
    ("SciLife Sample Name", "Sample"),
    ("Customer Sample Name", "Customer Name"),
    ("Library Validation Status", "LV Status"),
];

pub fn header_label(display_name: &str) -> &str {
    HEADER_OVERRIDES
        .iter()
        .find(|(from, _)| *from == display_name)
        .map(|(_, to)| *to)
        .unwrap_or(display_name)
}

/// A rendered table cell: markup plus the text used for search and export
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedCell {
    pub html: String,
    pub text: String,
}

impl RenderedCell {
    pub fn placeholder() -> Self {
        Self {
            html: PLACEHOLDER.to_string(),
            text: PLACEHOLDER.to_string(),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.text == PLACEHOLDER
    }
}

/// A thumbnail waiting for its image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePlaceholder {
    pub id: String,
    pub url: String,
    pub column_id: String,
}

impl ImagePlaceholder {
    /// Markup written into the table body until the image arrives
    pub fn loading_html(&self) -> String {
        format!(
            r#"<a id="{}" class="thumbnail-link loading" href="{}" data-src="{}"><span class="spinner-border spinner-border-sm" role="status"></span> Loading</a>"#,
            self.id,
            escape_html(&self.url),
            escape_html(&self.url)
        )
    }
}

/// Hands out placeholder ids for one page view
#[derive(Debug, Default)]
pub struct PlaceholderRegistry {
    next_id: usize,
    pending: Vec<ImagePlaceholder>,
}

impl PlaceholderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self, column_id: &str, url: &str) -> ImagePlaceholder {
        self.next_id += 1;
        let placeholder = ImagePlaceholder {
            id: format!("thumb-{}-{}", column_id.replace('_', "-"), self.next_id),
            url: url.to_string(),
            column_id: column_id.to_string(),
        };
        self.pending.push(placeholder.clone());
        placeholder
    }

    /// Placeholders allocated since the last take
    pub fn take_pending(&mut self) -> Vec<ImagePlaceholder> {
        std::mem::take(&mut self.pending)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

/// Fixed two-decimal rendering of a number
pub fn round_two(value: f64) -> String {
    format!("{:.2}", value)
}

/// True for the values the table shows as a dash
pub fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::Object(map)) => map.is_empty(),
        _ => false,
    }
}

/// Plain-text form of a JSON value as shown in the table
pub fn display_value(value: Option<&Value>) -> String {
    if is_blank(value) {
        return PLACEHOLDER.to_string();
    }

    match value {
        Some(Value::Number(n)) => {
            if n.is_f64() {
                n.as_f64().map(round_two).unwrap_or_else(|| n.to_string())
            } else {
                n.to_string()
            }
        }
        Some(Value::String(s)) => s.clone(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| display_value(Some(v)))
            .collect::<Vec<_>>()
            .join(", "),
        Some(other) => other.to_string(),
        None => PLACEHOLDER.to_string(),
    }
}

pub fn escape_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Renders single cells according to the per-column formatter table
#[derive(Debug, Clone)]
pub struct CellRenderer {
    sample_search_url: String,
    workset_url: String,
    reagent_label_url: String,
}

impl Default for CellRenderer {
    fn default() -> Self {
        Self::new(&RenderConfig::default())
    }
}

impl CellRenderer {
    pub fn new(config: &RenderConfig) -> Self {
        Self {
            sample_search_url: config.sample_search_url.clone(),
            workset_url: config.workset_url.clone(),
            reagent_label_url: config.reagent_label_url.clone(),
        }
    }

    pub fn render_cell(
        &self,
        column_id: &str,
        value: Option<&Value>,
        placeholders: &mut PlaceholderRegistry,
    ) -> RenderedCell {
        let text = display_value(value);
        if text == PLACEHOLDER {
            return RenderedCell::placeholder();
        }

        let format = match CellFormat::for_column(column_id) {
            CellFormat::Link if text == UNEXPECTED_BARCODE => CellFormat::Badge,
            other => other,
        };

        let html = match format {
            CellFormat::Plain => escape_html(&text),
            CellFormat::Link => self.render_sample_link(&text),
            CellFormat::Badge => format!(
                r#"<span class="badge bg-danger">{}</span>"#,
                escape_html(&text)
            ),
            CellFormat::MonospaceLink => self.render_monospace_link(column_id, &text),
            CellFormat::Signature => render_signature(&text),
            CellFormat::ImagePlaceholder => placeholders.allocate(column_id, &text).loading_html(),
        };

        RenderedCell { html, text }
    }

    fn render_sample_link(&self, name: &str) -> String {
        let escaped = escape_html(name);
        match Url::parse_with_params(&self.sample_search_url, &[("query", name)]) {
            Ok(href) => format!(
                r#"<a href="{}" target="_blank" rel="noopener">{}</a>"#,
                escape_html(href.as_str()),
                escaped
            ),
            Err(e) => {
                warn!(target: "render", "Invalid sample search URL '{}': {}", self.sample_search_url, e);
                escaped
            }
        }
    }

    fn render_monospace_link(&self, column_id: &str, value: &str) -> String {
        let prefix = match column_id {
            "reagent_label" => &self.reagent_label_url,
            _ => &self.workset_url,
        };
        let escaped = escape_html(value);
        format!(
            r#"<samp class="text-nowrap"><a href="{}{}">{}</a></samp>"#,
            escape_html(prefix),
            escaped,
            escaped
        )
    }
}

fn render_signature(initials: &str) -> String {
    let chars: Vec<char> = initials.chars().collect();
    if chars.len() == 3 && chars[2] == 'X' {
        let short: String = chars[..2].iter().collect();
        format!(
            r#"<span class="signature" title="Signature: {}">{}</span>"#,
            escape_html(initials),
            escape_html(&short)
        )
    } else {
        escape_html(initials)
    }
}
