//! Header cleanup shared by the tabular adapters.

use std::collections::HashSet;

use crate::contract::IDENTITY_COLUMN;

/// Trim headers, name blanks `column_N` (1-based) and make every name unique.
///
/// Repeats get `_1`, `_2`, ... suffixes in order of appearance. The reserved
/// identity column name is treated as already taken.
pub fn normalize_headers<S: AsRef<str>>(raw: &[S]) -> Vec<String> {
    let mut taken: HashSet<String> = HashSet::from([IDENTITY_COLUMN.to_string()]);
    let mut names = Vec::with_capacity(raw.len());

    for (index, header) in raw.iter().enumerate() {
        let trimmed = header.as_ref().trim();
        let base = if trimmed.is_empty() {
            format!("column_{}", index + 1)
        } else {
            trimmed.to_string()
        };

        let mut candidate = base.clone();
        let mut suffix = 1;
        while taken.contains(&candidate) {
            candidate = format!("{base}_{suffix}");
            suffix += 1;
        }
        taken.insert(candidate.clone());
        names.push(candidate);
    }

    names
}

/// Placeholder names `column_1..=count`.
pub fn synthesize_headers(count: usize) -> Vec<String> {
    (1..=count).map(|index| format!("column_{index}")).collect()
}
