//! Running notes attached to a project, flowcell or workset.
//!
//! `/api/v1/running_notes/{partition}` answers with an object keyed by the
//! creation timestamp; the sticky note endpoint uses the same shape with at
//! most one entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use tracing::warn;

use crate::cell_renderer::escape_html;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteType {
    Project,
    Flowcell,
    FlowcellOnt,
    Workset,
}

impl NoteType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoteType::Project => "project",
            NoteType::Flowcell => "flowcell",
            NoteType::FlowcellOnt => "flowcell_ont",
            NoteType::Workset => "workset",
        }
    }
}

impl FromStr for NoteType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "project" => Ok(NoteType::Project),
            "flowcell" => Ok(NoteType::Flowcell),
            "flowcell_ont" => Ok(NoteType::FlowcellOnt),
            "workset" => Ok(NoteType::Workset),
            other => Err(anyhow::anyhow!("Unknown note type '{}'", other)),
        }
    }
}

impl fmt::Display for NoteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of `POST /api/v1/running_notes/{partition}`
#[derive(Debug, Serialize)]
pub struct RunningNoteRequest<'a> {
    pub note: &'a str,
    pub categories: &'a [String],
    pub note_type: NoteType,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RunningNote {
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub note: String,
    #[serde(default, deserialize_with = "deserialize_categories")]
    pub categories: Vec<String>,
    #[serde(default)]
    pub created_at_utc: String,
    #[serde(default)]
    pub updated_at_utc: String,
}

// Notes copied from the old project notes store keep categories as one string
#[derive(Deserialize)]
#[serde(untagged)]
enum Categories {
    List(Vec<String>),
    Joined(String),
}

fn deserialize_categories<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Categories>::deserialize(deserializer)? {
        Some(Categories::List(list)) => list,
        Some(Categories::Joined(joined)) => joined
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect(),
        None => Vec::new(),
    })
}

impl RunningNote {
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.created_at_utc)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }

    fn created_label(&self) -> String {
        match self.created_at() {
            Some(dt) => dt.format("%Y-%m-%d %H:%M").to_string(),
            None => self.created_at_utc.clone(),
        }
    }

    /// One line header plus the note body, for terminal output
    pub fn to_text(&self) -> String {
        let categories = if self.categories.is_empty() {
            String::new()
        } else {
            format!(" [{}]", self.categories.join(", "))
        };
        format!("{} {}{}\n{}", self.created_label(), self.user, categories, self.note)
    }

    pub fn to_html(&self) -> String {
        let badges: String = self
            .categories
            .iter()
            .map(|c| format!(r#" <span class="badge bg-info">{}</span>"#, escape_html(c)))
            .collect();
        format!(
            r#"<div class="card sticky-note"><div class="card-header"><strong>{}</strong> {}{}</div><div class="card-body">{}</div></div>"#,
            escape_html(&self.user),
            escape_html(&self.created_label()),
            badges,
            escape_html(&self.note).replace('\n', "<br>")
        )
    }
}

/// Notes of a running notes response, newest first
pub fn parse_notes(value: &Value) -> Vec<RunningNote> {
    let map = match value.as_object() {
        Some(map) => map,
        None => return Vec::new(),
    };

    let mut notes: Vec<(&String, RunningNote)> = map
        .iter()
        .filter_map(|(key, entry)| match RunningNote::deserialize(entry) {
            Ok(note) => Some((key, note)),
            Err(e) => {
                warn!(target: "api", "Skipping running note {}: {}", key, e);
                None
            }
        })
        .collect();
    notes.sort_by(|(a, _), (b, _)| b.cmp(a));
    notes.into_iter().map(|(_, note)| note).collect()
}

/// The sticky note response: empty body, `{}` or a single keyed note
pub fn latest_sticky(value: &Value) -> Option<RunningNote> {
    parse_notes(value).into_iter().next()
}
