// Copyright 2025 Cowboy AI, LLC.

//! Table-name to node-label normalisation
//!
//! Upstream tables are lower snake_case plurals; graph labels are
//! PascalCase singulars (`user_skills` → `UserSkill`). Singularisation is
//! deliberately naive English: it only has to be right for the tables the
//! schema registry declares.

use std::collections::HashMap;

/// Convert a snake_case table name to a PascalCase singular label
///
/// Rules, in order: a trailing `ies` becomes `y`; otherwise a trailing `s`
/// is stripped; then each `_`-separated segment is title-cased and the
/// segments are concatenated.
pub fn table_to_label(table: &str) -> String {
    if table.is_empty() {
        return String::new();
    }

    let singular = if table.len() >= 3 && table.ends_with("ies") {
        format!("{}y", &table[..table.len() - 3])
    } else if table.ends_with('s') {
        table[..table.len() - 1].to_string()
    } else {
        table.to_string()
    };

    singular
        .split('_')
        .map(|segment| {
            let mut chars = segment.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

/// Memoised label lookup, owned by whoever builds labels repeatedly
///
/// Bounded by the number of distinct tables seen, which in practice is the
/// size of the schema registry.
#[derive(Debug, Default)]
pub struct LabelCache {
    cache: HashMap<String, String>,
}

impl LabelCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Label for a table, computing and caching it on first use
    pub fn get(&mut self, table: &str) -> &str {
        self.cache
            .entry(table.to_string())
            .or_insert_with(|| table_to_label(table))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regular_plural_s_is_removed() {
        assert_eq!(table_to_label("users"), "User");
        assert_eq!(table_to_label("projects"), "Project");
    }

    #[test]
    fn plural_ies_becomes_y() {
        assert_eq!(table_to_label("categories"), "Category");
        assert_eq!(table_to_label("industries"), "Industry");
    }

    #[test]
    fn multi_word_snake_case() {
        assert_eq!(table_to_label("user_skills"), "UserSkill");
        assert_eq!(
            table_to_label("project_business_categories"),
            "ProjectBusinessCategory"
        );
    }

    #[test]
    fn word_without_plural_is_only_capitalised() {
        assert_eq!(table_to_label("data"), "Data");
    }

    #[test]
    fn empty_string_stays_empty() {
        assert_eq!(table_to_label(""), "");
    }

    #[test]
    fn cache_returns_the_same_label() {
        let mut cache = LabelCache::new();
        assert_eq!(cache.get("daily_activities"), "DailyActivity");
        assert_eq!(cache.get("daily_activities"), "DailyActivity");
    }
}
