// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! `schema.table` subscription filters.
//!
//! A filter is a comma-separated list of regular expressions, each matched
//! against the whole `schema.table` string (`shop\\.orders,audit\\..*`).
//! An empty filter matches every table.

use regex::Regex;
use std::fmt;

/// Compiled subscription filter.
#[derive(Clone)]
pub struct TableFilter {
    source: String,
    patterns: Vec<Regex>,
}

impl TableFilter {
    /// Compile `filter`. Fails with the offending alternative on a bad regex.
    pub fn parse(filter: &str) -> Result<Self, String> {
        let patterns = filter
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| {
                Regex::new(&format!("^(?:{})$", p))
                    .map_err(|e| format!("invalid filter pattern {:?}: {}", p, e))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            source: filter.to_string(),
            patterns,
        })
    }

    /// Whether `schema.table` passes the filter.
    pub fn matches(&self, qualified_table: &str) -> bool {
        self.patterns.is_empty() || self.patterns.iter().any(|p| p.is_match(qualified_table))
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl fmt::Debug for TableFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TableFilter").field(&self.source).finish()
    }
}
