//! Named column selections stored server side
//!
//! The presets endpoint returns two maps, `default` and `user`, each keyed
//! by preset name. A preset maps column group to column id to a selected
//! flag, and may carry an explicit `COLUMNORDER` list.

use anyhow::{anyhow, Result};
use serde_json::Value;
use std::fmt;
use tracing::warn;

use crate::cell_renderer::escape_html;
use crate::column_manager::ColumnGroup;

/// Reserved key holding the explicit column order of a preset
pub const COLUMN_ORDER_KEY: &str = "COLUMNORDER";

/// Placeholder shown in place of the user preset list when it is empty
pub const NO_USER_PRESETS: &str = "No user presets";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresetKind {
    Default,
    User,
}

impl PresetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PresetKind::Default => "default",
            PresetKind::User => "user",
        }
    }
}

impl std::str::FromStr for PresetKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "default" => Ok(PresetKind::Default),
            "user" => Ok(PresetKind::User),
            other => Err(anyhow!("Unknown preset type '{}'", other)),
        }
    }
}

impl fmt::Display for PresetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable snapshot of a server-side preset
#[derive(Debug, Clone, PartialEq)]
pub struct Preset {
    pub name: String,
    pub selections: Vec<(ColumnGroup, Vec<(String, bool)>)>,
    pub column_order: Option<Vec<String>>,
}

impl Preset {
    pub fn from_value(name: &str, value: &Value) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| anyhow!("Preset '{}' is not an object", name))?;

        let mut selections = Vec::new();
        let mut column_order = None;

        for (key, entry) in obj {
            if key == COLUMN_ORDER_KEY {
                column_order = match entry.as_array() {
                    Some(order) => Some(
                        order
                            .iter()
                            .filter_map(|v| v.as_str().map(str::to_string))
                            .collect(),
                    ),
                    None => {
                        warn!(target: "presets", "{} of preset '{}' is not a list, using checkbox order", COLUMN_ORDER_KEY, name);
                        None
                    }
                };
                continue;
            }

            let columns = match entry.as_object() {
                Some(columns) => columns
                    .iter()
                    .map(|(id, selected)| (id.clone(), is_selected(selected)))
                    .collect(),
                None => continue,
            };
            selections.push((ColumnGroup::from(key.as_str()), columns));
        }

        Ok(Self {
            name: name.to_string(),
            selections,
            column_order,
        })
    }

    /// Every (group, column id) flagged as selected
    pub fn selected(&self) -> impl Iterator<Item = (ColumnGroup, &str)> + '_ {
        self.selections.iter().flat_map(|(group, columns)| {
            columns
                .iter()
                .filter(|(_, selected)| *selected)
                .map(move |(id, _)| (*group, id.as_str()))
        })
    }
}

// Older presets store "true"/"false" strings
fn is_selected(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

/// Both preset lists, in the order the API returned them
#[derive(Debug, Clone, Default)]
pub struct PresetSet {
    pub default: Vec<Preset>,
    pub user: Vec<Preset>,
}

impl PresetSet {
    pub fn from_value(value: &Value) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| anyhow!("Presets response is not an object"))?;

        Ok(Self {
            default: parse_preset_map(PresetKind::Default, obj.get("default")),
            user: parse_preset_map(PresetKind::User, obj.get("user")),
        })
    }

    pub fn list(&self, kind: PresetKind) -> &[Preset] {
        match kind {
            PresetKind::Default => &self.default,
            PresetKind::User => &self.user,
        }
    }

    pub fn find(&self, kind: PresetKind, name: &str) -> Option<&Preset> {
        self.list(kind).iter().find(|p| p.name == name)
    }
}

/// Malformed presets are skipped so the rest of the list stays usable
fn parse_preset_map(kind: PresetKind, value: Option<&Value>) -> Vec<Preset> {
    match value {
        Some(Value::Object(map)) => map
            .iter()
            .filter_map(|(name, preset)| match Preset::from_value(name, preset) {
                Ok(preset) => Some(preset),
                Err(e) => {
                    warn!(target: "presets", "Skipping {} preset: {}", kind, e);
                    None
                }
            })
            .collect(),
        Some(Value::Null) | None => Vec::new(),
        Some(_) => {
            warn!(target: "presets", "The {} preset list is not an object", kind);
            Vec::new()
        }
    }
}

/// HTML for the two preset pickers
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PresetControls {
    pub default_html: String,
    pub user_html: String,
}

impl PresetControls {
    pub fn render(presets: &PresetSet) -> Self {
        let user_html = if presets.user.is_empty() {
            NO_USER_PRESETS.to_string()
        } else {
            render_buttons(PresetKind::User, &presets.user)
        };

        Self {
            default_html: render_buttons(PresetKind::Default, &presets.default),
            user_html,
        }
    }
}

fn render_buttons(kind: PresetKind, presets: &[Preset]) -> String {
    presets
        .iter()
        .map(|p| {
            let name = escape_html(&p.name);
            format!(
                r#"<button type="button" class="btn btn-outline-secondary preset-button" data-preset-type="{}" data-preset="{}">{}</button>"#,
                kind, name, name
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_response() -> Value {
        json!({
            "default": {
                "Basic": {
                    "basic": {"scilife_name": true, "customer_name": true, "status_manual": false}
                },
                "Library Validation": {
                    "basic": {"scilife_name": true},
                    "library-validation": {"size_(bp)": true, "initials": "true"},
                    "COLUMNORDER": ["size_(bp)", "scilife_name"]
                }
            },
            "user": {}
        })
    }

    #[test]
    fn test_parse_preset_set() {
        let presets = PresetSet::from_value(&sample_response()).unwrap();
        assert_eq!(presets.default.len(), 2);
        assert!(presets.user.is_empty());
        assert_eq!(presets.default[0].name, "Basic");

        let lv = presets.find(PresetKind::Default, "Library Validation").unwrap();
        assert_eq!(
            lv.column_order.as_deref(),
            Some(&["size_(bp)".to_string(), "scilife_name".to_string()][..])
        );
        let selected: Vec<_> = lv.selected().collect();
        assert_eq!(
            selected,
            vec![
                (ColumnGroup::Basic, "scilife_name"),
                (ColumnGroup::LibraryValidation, "size_(bp)"),
                (ColumnGroup::LibraryValidation, "initials"),
            ]
        );
    }

    #[test]
    fn test_unselected_entries_are_skipped() {
        let presets = PresetSet::from_value(&sample_response()).unwrap();
        let basic = presets.find(PresetKind::Default, "Basic").unwrap();
        assert_eq!(basic.selected().count(), 2);
        assert!(basic.column_order.is_none());
    }

    #[test]
    fn test_empty_user_presets_show_placeholder() {
        let presets = PresetSet::from_value(&sample_response()).unwrap();
        let controls = PresetControls::render(&presets);
        assert_eq!(controls.user_html, "No user presets");
        assert!(!controls.user_html.contains("<button"));
        assert_eq!(controls.default_html.matches("<button").count(), 2);
    }

    #[test]
    fn test_missing_user_key_is_empty() {
        let presets = PresetSet::from_value(&json!({"default": {}})).unwrap();
        assert!(presets.user.is_empty());
        assert!(presets.find(PresetKind::User, "anything").is_none());
    }

    #[test]
    fn test_user_buttons_escape_names() {
        let presets = PresetSet::from_value(&json!({
            "default": {},
            "user": {"<mine>": {"basic": {"scilife_name": true}}}
        }))
        .unwrap();
        let controls = PresetControls::render(&presets);
        assert!(controls.user_html.contains("&lt;mine&gt;"));
        assert!(controls.user_html.contains(r#"data-preset-type="user""#));
    }

    #[test]
    fn test_broken_user_preset_keeps_the_rest() {
        let presets = PresetSet::from_value(&json!({
            "default": {
                "Basic": {"basic": {"scilife_name": true}}
            },
            "user": {
                "Broken": {"basic": {"scilife_name": true}, "COLUMNORDER": null},
                "Not a preset": "oops",
                "Mine": {"basic": {"customer_name": true}}
            }
        }))
        .unwrap();

        assert_eq!(presets.default.len(), 1);
        let names: Vec<_> = presets.user.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Broken", "Mine"]);

        let broken = presets.find(PresetKind::User, "Broken").unwrap();
        assert!(broken.column_order.is_none());
        assert_eq!(broken.selected().count(), 1);
    }

    #[test]
    fn test_malformed_list_is_empty() {
        let presets = PresetSet::from_value(&json!({
            "default": ["not", "a", "map"],
            "user": {"Mine": {"basic": {"customer_name": true}}}
        }))
        .unwrap();
        assert!(presets.default.is_empty());
        assert_eq!(presets.user.len(), 1);
    }

    #[test]
    fn test_preset_kind_parsing() {
        assert_eq!("User".parse::<PresetKind>().unwrap(), PresetKind::User);
        assert!("other".parse::<PresetKind>().is_err());
    }
}
