use anyhow::Result;
use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use regex::Regex;
use std::cmp::Ordering;

use crate::cell_renderer::PLACEHOLDER;

/// Search and sort index over the text of a rendered table
#[derive(Debug, Clone, Default)]
pub struct SearchIndex {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl SearchIndex {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn row(&self, idx: usize) -> Option<&[String]> {
        self.rows.get(idx).map(Vec::as_slice)
    }

    pub fn column_index(&self, header: &str) -> Option<usize> {
        self.headers
            .iter()
            .position(|h| h.eq_ignore_ascii_case(header))
    }

    /// Perform a regex search and return matching (row, column) positions
    pub fn search(&self, pattern: &str) -> Result<Vec<(usize, usize)>> {
        let regex = Regex::new(pattern)?;
        let mut matches = Vec::new();

        for (row_idx, row) in self.rows.iter().enumerate() {
            for (col_idx, cell) in row.iter().enumerate() {
                if regex.is_match(cell) {
                    matches.push((row_idx, col_idx));
                }
            }
        }

        Ok(matches)
    }

    /// Rows with any cell containing `query`, case-insensitively
    pub fn filter_rows(&self, query: &str) -> Vec<usize> {
        if query.is_empty() {
            return (0..self.rows.len()).collect();
        }

        let needle = query.to_lowercase();
        self.rows
            .iter()
            .enumerate()
            .filter(|(_, row)| row.iter().any(|cell| cell.to_lowercase().contains(&needle)))
            .map(|(idx, _)| idx)
            .collect()
    }

    /// Rows whose best fuzzy score reaches `score_threshold`
    pub fn fuzzy_filter(&self, pattern: &str, score_threshold: i64) -> Vec<usize> {
        let matcher = SkimMatcherV2::default();
        let mut filtered_indices = Vec::new();

        for (idx, row) in self.rows.iter().enumerate() {
            let best_score = row
                .iter()
                .filter_map(|cell| matcher.fuzzy_match(cell, pattern))
                .max()
                .unwrap_or(0);

            if best_score >= score_threshold {
                filtered_indices.push(idx);
            }
        }

        filtered_indices
    }

    /// Row order sorted on one column; numbers compare numerically, dashes go last
    pub fn sorted_rows(&self, column: usize, descending: bool) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.rows.len()).collect();
        order.sort_by(|&a, &b| {
            let left = self.rows[a].get(column).map(String::as_str).unwrap_or(PLACEHOLDER);
            let right = self.rows[b].get(column).map(String::as_str).unwrap_or(PLACEHOLDER);
            match (left == PLACEHOLDER, right == PLACEHOLDER) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => {
                    let ord = compare_cells(left, right);
                    if descending {
                        ord.reverse()
                    } else {
                        ord
                    }
                }
            }
        });
        order
    }
}

fn compare_cells(left: &str, right: &str) -> Ordering {
    match (left.parse::<f64>(), right.parse::<f64>()) {
        (Ok(l), Ok(r)) => l.partial_cmp(&r).unwrap_or(Ordering::Equal),
        _ => left.to_lowercase().cmp(&right.to_lowercase()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> SearchIndex {
        SearchIndex::new(
            vec!["Sample".to_string(), "RIN".to_string()],
            vec![
                vec!["P1_101".to_string(), "8.10".to_string()],
                vec!["P1_102".to_string(), "-".to_string()],
                vec!["P1_103".to_string(), "10.00".to_string()],
                vec!["Unexpectedbarcode".to_string(), "2.00".to_string()],
            ],
        )
    }

    #[test]
    fn test_regex_search_positions() {
        let matches = index().search(r"^P1_10[13]$").unwrap();
        assert_eq!(matches, vec![(0, 0), (2, 0)]);
        assert!(index().search("(").is_err());
    }

    #[test]
    fn test_filter_rows_is_case_insensitive() {
        assert_eq!(index().filter_rows("unexpected"), vec![3]);
        assert_eq!(index().filter_rows("").len(), 4);
    }

    #[test]
    fn test_fuzzy_filter() {
        let rows = index().fuzzy_filter("unxbar", 1);
        assert_eq!(rows, vec![3]);
    }

    #[test]
    fn test_numeric_sort_puts_dashes_last() {
        let idx = index();
        assert_eq!(idx.sorted_rows(1, false), vec![3, 0, 2, 1]);
        assert_eq!(idx.sorted_rows(1, true), vec![2, 0, 3, 1]);
    }

    #[test]
    fn test_column_lookup() {
        assert_eq!(index().column_index("rin"), Some(1));
        assert_eq!(index().column_index("missing"), None);
    }
}
