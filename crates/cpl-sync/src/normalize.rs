//! Display normalization applied before matching.

use cpl_core::CandidateTable;

/// Uppercases the first letter of every alphabetic run and lowercases the
/// rest, so `"o'NEIL-smith"` becomes `"O'Neil-Smith"`.
pub fn title_case(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut in_word = false;
    for c in value.chars() {
        if c.is_alphabetic() {
            if in_word {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            in_word = true;
        } else {
            out.push(c);
            in_word = false;
        }
    }
    out
}

/// Trims and title-cases every name; returns how many changed.
pub fn standardize_names(table: &mut CandidateTable) -> usize {
    let mut changed = 0;
    for row in table.rows_mut() {
        let Some(name) = row.name.as_deref() else {
            continue;
        };
        let cased = title_case(name.trim());
        if cased != name {
            row.name = Some(cased);
            changed += 1;
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use cpl_core::{CandidateRecord, Value, NAME};

    #[test]
    fn title_case_handles_separators() {
        assert_eq!(title_case("jane DOE"), "Jane Doe");
        assert_eq!(title_case("o'NEIL-smith"), "O'Neil-Smith");
        assert_eq!(title_case("  mary   ann "), "  Mary   Ann ");
        assert_eq!(title_case("r2d2"), "R2D2");
        assert_eq!(title_case(""), "");
    }

    #[test]
    fn standardize_counts_changed_rows() {
        let mut t = CandidateTable::from_parts(
            vec![NAME.to_string()],
            vec![
                CandidateRecord::from_pairs([(NAME, Value::from("jane doe"))]),
                CandidateRecord::from_pairs([(NAME, Value::from("Bob Lee"))]),
                CandidateRecord::from_pairs([(NAME, Value::from(" Amy Chu "))]),
                CandidateRecord::default(),
            ],
        );
        assert_eq!(standardize_names(&mut t), 2);
        assert_eq!(t.rows()[0].name.as_deref(), Some("Jane Doe"));
        assert_eq!(t.rows()[2].name.as_deref(), Some("Amy Chu"));
    }
}
