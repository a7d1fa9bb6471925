use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::presets::Preset;

/// Region of a sample record a column reads its value from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ColumnGroup {
    Basic,
    InitialQc,
    LibraryPrep,
    LibraryValidation,
    PrePrepLibraryValidation,
    /// Fallback for anything the API tags with an unknown group
    Details,
}

impl ColumnGroup {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnGroup::Basic => "basic",
            ColumnGroup::InitialQc => "initial-qc",
            ColumnGroup::LibraryPrep => "library-prep",
            ColumnGroup::LibraryValidation => "library-validation",
            ColumnGroup::PrePrepLibraryValidation => "pre-prep-library-validation",
            ColumnGroup::Details => "details",
        }
    }

    /// Groups whose values live underneath `library_prep`
    pub fn is_prep_level(&self) -> bool {
        matches!(
            self,
            ColumnGroup::LibraryPrep
                | ColumnGroup::LibraryValidation
                | ColumnGroup::PrePrepLibraryValidation
        )
    }
}

impl From<&str> for ColumnGroup {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "basic" => ColumnGroup::Basic,
            "initial-qc" => ColumnGroup::InitialQc,
            "library-prep" => ColumnGroup::LibraryPrep,
            "library-validation" => ColumnGroup::LibraryValidation,
            "pre-prep-library-validation" => ColumnGroup::PrePrepLibraryValidation,
            _ => ColumnGroup::Details,
        }
    }
}

impl From<String> for ColumnGroup {
    fn from(s: String) -> Self {
        ColumnGroup::from(s.as_str())
    }
}

impl From<ColumnGroup> for String {
    fn from(group: ColumnGroup) -> Self {
        group.as_str().to_string()
    }
}

impl fmt::Display for ColumnGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A selectable table column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub display_name: String,
    pub column_id: String,
    pub group: ColumnGroup,
}

impl ColumnDescriptor {
    pub fn new(display_name: &str, column_id: &str, group: ColumnGroup) -> Self {
        Self {
            display_name: display_name.to_string(),
            column_id: column_id.to_string(),
            group,
        }
    }
}

/// One entry of `read_current_filtering`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilteredColumn {
    pub display_name: String,
    pub column_id: String,
    pub group: Option<ColumnGroup>,
}

/// Every selectable column, in checkbox order
#[derive(Debug, Clone)]
pub struct ColumnCatalog {
    columns: Vec<ColumnDescriptor>,
}

impl ColumnCatalog {
    pub fn new(columns: Vec<ColumnDescriptor>) -> Self {
        Self { columns }
    }

    pub fn builtin() -> Self {
        use ColumnGroup::*;

        let columns = [
            ("SciLife Sample Name", "scilife_name", Basic),
            ("Customer Sample Name", "customer_name", Basic),
            ("Status (manual)", "status_manual", Basic),
            ("Million Reads Sequenced", "total_reads_(m)", Basic),
            ("Received Date", "received_date", Basic),
            ("Initial QC Status", "initial_qc_status", InitialQc),
            ("Concentration", "concentration", InitialQc),
            ("Volume (ul)", "volume_(ul)", InitialQc),
            ("RIN", "rin", InitialQc),
            ("Caliper Image", "caliper_image", InitialQc),
            ("Fragment Analyzer Image", "frag_an_image", InitialQc),
            ("Initial QC Initials", "initials", InitialQc),
            ("Library Prep", "prep_id", LibraryPrep),
            ("Prep Status", "prep_status", LibraryPrep),
            ("Workset", "workset_name", LibraryPrep),
            ("Workset Setup", "workset_setup", LibraryPrep),
            ("Reagent Label", "reagent_label", LibraryPrep),
            ("Library Validation Status", "finished_library", LibraryValidation),
            ("Size (bp)", "size_(bp)", LibraryValidation),
            ("Library Concentration", "concentration", LibraryValidation),
            ("Library Caliper Image", "caliper_image", LibraryValidation),
            ("Library Validation Initials", "initials", LibraryValidation),
            ("Pre-prep Concentration", "concentration", PrePrepLibraryValidation),
            ("Pre-prep Size (bp)", "size_(bp)", PrePrepLibraryValidation),
            ("Sample Type", "sample_type", Details),
            ("Ratio 260/280", "ratio_(260/280)", Details),
        ];

        Self::new(
            columns
                .iter()
                .map(|(name, id, group)| ColumnDescriptor::new(name, id, *group))
                .collect(),
        )
    }

    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn position(&self, group: ColumnGroup, column_id: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.group == group && c.column_id == column_id)
    }
}

/// Which columns are currently selected, in catalog order
#[derive(Debug, Clone)]
pub struct ColumnFilterState {
    catalog: ColumnCatalog,
    checked: Vec<bool>,
    column_order: Option<Vec<String>>,
}

impl ColumnFilterState {
    pub fn new(catalog: ColumnCatalog) -> Self {
        let checked = vec![false; catalog.len()];
        Self {
            catalog,
            checked,
            column_order: None,
        }
    }

    pub fn catalog(&self) -> &ColumnCatalog {
        &self.catalog
    }

    pub fn is_checked(&self, group: ColumnGroup, column_id: &str) -> bool {
        self.catalog
            .position(group, column_id)
            .map(|idx| self.checked[idx])
            .unwrap_or(false)
    }

    /// Check a column; returns false when the catalog has no such column
    pub fn check(&mut self, group: ColumnGroup, column_id: &str) -> bool {
        match self.catalog.position(group, column_id) {
            Some(idx) => {
                self.checked[idx] = true;
                true
            }
            None => false,
        }
    }

    pub fn uncheck(&mut self, group: ColumnGroup, column_id: &str) {
        if let Some(idx) = self.catalog.position(group, column_id) {
            self.checked[idx] = false;
        }
    }

    pub fn uncheck_all(&mut self) {
        self.checked.iter_mut().for_each(|c| *c = false);
        self.column_order = None;
    }

    pub fn checked_count(&self) -> usize {
        self.checked.iter().filter(|c| **c).count()
    }

    /// Clear everything and re-check the basic group
    pub fn reset_default_checkboxes(&mut self) {
        self.uncheck_all();
        for (idx, column) in self.catalog.columns().iter().enumerate() {
            if column.group == ColumnGroup::Basic {
                self.checked[idx] = true;
            }
        }
        debug!(target: "presets", "Reset to {} basic columns", self.checked_count());
    }

    pub fn set_column_order(&mut self, order: Option<Vec<String>>) {
        self.column_order = order;
    }

    pub fn column_order(&self) -> Option<&[String]> {
        self.column_order.as_deref()
    }

    /// Overwrite the current selection with a preset
    pub fn apply_preset(&mut self, preset: &Preset) {
        self.uncheck_all();
        for (group, column_id) in preset.selected() {
            if !self.check(group, column_id) {
                debug!(target: "presets", "Preset '{}' names unknown column {}/{}", preset.name, group, column_id);
            }
        }
        self.column_order = preset.column_order.clone();
    }

    /// Checked columns in checkbox order
    pub fn read_current_filtering(&self, with_group: bool) -> Vec<FilteredColumn> {
        self.catalog
            .columns()
            .iter()
            .zip(&self.checked)
            .filter(|(_, checked)| **checked)
            .map(|(column, _)| FilteredColumn {
                display_name: column.display_name.clone(),
                column_id: column.column_id.clone(),
                group: with_group.then_some(column.group),
            })
            .collect()
    }

    /// Checked columns rearranged to `order`; anything not named in `order` is dropped
    pub fn read_current_filtering_ordered(
        &self,
        with_group: bool,
        order: &[String],
    ) -> Vec<FilteredColumn> {
        let mut pending: Vec<Option<FilteredColumn>> = self
            .read_current_filtering(with_group)
            .into_iter()
            .map(Some)
            .collect();

        let mut ordered = Vec::with_capacity(order.len());
        for column_id in order {
            let slot = pending
                .iter_mut()
                .find(|c| c.as_ref().is_some_and(|c| &c.column_id == column_id));
            match slot.and_then(Option::take) {
                Some(column) => ordered.push(column),
                None => debug!(target: "presets", "Column '{}' in order list is not selected", column_id),
            }
        }
        ordered
    }

    /// Descriptors handed to the renderer, honouring the active column order
    pub fn selected_columns(&self) -> Vec<ColumnDescriptor> {
        let filtered = match &self.column_order {
            Some(order) => self.read_current_filtering_ordered(true, order),
            None => self.read_current_filtering(true),
        };

        filtered
            .into_iter()
            .map(|c| ColumnDescriptor {
                display_name: c.display_name,
                column_id: c.column_id,
                group: c.group.unwrap_or(ColumnGroup::Details),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_catalog() -> ColumnCatalog {
        ColumnCatalog::new(vec![
            ColumnDescriptor::new("SciLife Sample Name", "scilife_name", ColumnGroup::Basic),
            ColumnDescriptor::new("Customer Sample Name", "customer_name", ColumnGroup::Basic),
            ColumnDescriptor::new("RIN", "rin", ColumnGroup::InitialQc),
            ColumnDescriptor::new("Workset", "workset_name", ColumnGroup::LibraryPrep),
            ColumnDescriptor::new("Size (bp)", "size_(bp)", ColumnGroup::LibraryValidation),
        ])
    }

    fn all_checked() -> ColumnFilterState {
        let mut state = ColumnFilterState::new(small_catalog());
        for c in small_catalog().columns() {
            state.check(c.group, &c.column_id);
        }
        state
    }

    fn ids(columns: &[FilteredColumn]) -> Vec<&str> {
        columns.iter().map(|c| c.column_id.as_str()).collect()
    }

    #[test]
    fn test_group_parsing_falls_back_to_details() {
        assert_eq!(ColumnGroup::from("initial-qc"), ColumnGroup::InitialQc);
        assert_eq!(
            ColumnGroup::from("pre-prep-library-validation"),
            ColumnGroup::PrePrepLibraryValidation
        );
        assert_eq!(ColumnGroup::from("something-else"), ColumnGroup::Details);
        assert_eq!(ColumnGroup::LibraryPrep.to_string(), "library-prep");
    }

    #[test]
    fn test_reset_checks_basic_group_only() {
        let mut state = all_checked();
        state.reset_default_checkboxes();

        let current = state.read_current_filtering(false);
        assert_eq!(ids(&current), vec!["scilife_name", "customer_name"]);
        assert!(current.iter().all(|c| c.group.is_none()));
    }

    #[test]
    fn test_read_with_group() {
        let mut state = ColumnFilterState::new(small_catalog());
        state.check(ColumnGroup::InitialQc, "rin");
        let current = state.read_current_filtering(true);
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].group, Some(ColumnGroup::InitialQc));
    }

    #[test]
    fn test_ordering_keeps_only_listed_columns() {
        let state = all_checked();
        let order = vec![
            "workset_name".to_string(),
            "scilife_name".to_string(),
            "rin".to_string(),
        ];
        let ordered = state.read_current_filtering_ordered(false, &order);
        assert_eq!(ids(&ordered), vec!["workset_name", "scilife_name", "rin"]);
    }

    #[test]
    fn test_ordering_skips_unselected_ids() {
        let mut state = ColumnFilterState::new(small_catalog());
        state.check(ColumnGroup::Basic, "scilife_name");
        let order = vec!["rin".to_string(), "scilife_name".to_string()];
        let ordered = state.read_current_filtering_ordered(true, &order);
        assert_eq!(ids(&ordered), vec!["scilife_name"]);
    }

    #[test]
    fn test_duplicate_ids_resolve_in_checkbox_order() {
        let catalog = ColumnCatalog::new(vec![
            ColumnDescriptor::new("Concentration", "concentration", ColumnGroup::InitialQc),
            ColumnDescriptor::new("Lib Conc", "concentration", ColumnGroup::LibraryValidation),
        ]);
        let mut state = ColumnFilterState::new(catalog);
        state.check(ColumnGroup::InitialQc, "concentration");
        state.check(ColumnGroup::LibraryValidation, "concentration");

        let order = vec!["concentration".to_string(), "concentration".to_string()];
        let ordered = state.read_current_filtering_ordered(true, &order);
        assert_eq!(ordered[0].group, Some(ColumnGroup::InitialQc));
        assert_eq!(ordered[1].group, Some(ColumnGroup::LibraryValidation));
    }

    #[test]
    fn test_uncheck_single_column() {
        let mut state = all_checked();
        state.uncheck(ColumnGroup::InitialQc, "rin");
        assert!(!state.is_checked(ColumnGroup::InitialQc, "rin"));
        assert_eq!(state.checked_count(), state.catalog().len() - 1);
    }

    #[test]
    fn test_check_unknown_column_is_rejected() {
        let mut state = ColumnFilterState::new(small_catalog());
        assert!(!state.check(ColumnGroup::Details, "nope"));
        assert_eq!(state.checked_count(), 0);
    }

    #[test]
    fn test_selected_columns_use_active_order() {
        let mut state = all_checked();
        state.set_column_order(Some(vec!["size_(bp)".to_string(), "customer_name".to_string()]));
        let selected = state.selected_columns();
        assert_eq!(selected.len(), 2);
        assert_eq!(selected[0].group, ColumnGroup::LibraryValidation);
        assert_eq!(selected[1].display_name, "Customer Sample Name");

        state.uncheck_all();
        assert!(state.column_order().is_none());
    }

    #[test]
    fn test_apply_preset_overwrites_selection() {
        let preset = Preset::from_value(
            "LV",
            &serde_json::json!({
                "basic": {"scilife_name": true, "customer_name": false},
                "library-validation": {"size_(bp)": true},
                "details": {"not_in_catalog": true},
                "COLUMNORDER": ["size_(bp)", "scilife_name"]
            }),
        )
        .unwrap();

        let mut state = all_checked();
        state.apply_preset(&preset);
        assert_eq!(state.checked_count(), 2);
        assert!(!state.is_checked(ColumnGroup::InitialQc, "rin"));

        let selected = state.selected_columns();
        let selected_ids: Vec<_> = selected.iter().map(|c| c.column_id.as_str()).collect();
        assert_eq!(selected_ids, vec!["size_(bp)", "scilife_name"]);
    }

    #[test]
    fn test_builtin_catalog_has_basic_columns() {
        let catalog = ColumnCatalog::builtin();
        assert!(catalog.position(ColumnGroup::Basic, "scilife_name").is_some());
        assert!(catalog
            .position(ColumnGroup::LibraryValidation, "caliper_image")
            .is_some());
    }
}
