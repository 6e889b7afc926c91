//! Field reconciliation for one identity cluster.

use std::collections::{BTreeSet, HashSet};

use cpl_core::{merge_records, CandidateRecord, SOURCE};

#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    pub record: CandidateRecord,
    /// Columns where members disagreed on a non-null value. The base value
    /// was kept; disagreements are counted, not resolved.
    pub conflicts: usize,
}

/// Collapses a cluster into one record. `cluster[0]` is the base: every
/// non-null base value survives, and each null is filled from the first later
/// member holding a value. `source` becomes the ordered union of all members'
/// tags. Returns `None` for an empty cluster.
pub fn reconcile(cluster: &[&CandidateRecord]) -> Option<Reconciled> {
    let (base, rest) = cluster.split_first()?;
    let mut record = rest
        .iter()
        .fold((*base).clone(), |acc, member| merge_records(&acc, member));

    let tags = union_source_tags(cluster.iter().copied());
    record.source = (!tags.is_empty()).then(|| tags.join(","));

    Some(Reconciled {
        record,
        conflicts: count_conflicts(cluster),
    })
}

/// Tags in first-appearance order without repeats.
pub fn union_source_tags<'a>(members: impl IntoIterator<Item = &'a CandidateRecord>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut tags = Vec::new();
    for member in members {
        for tag in member.source_tags() {
            if seen.insert(tag.clone()) {
                tags.push(tag);
            }
        }
    }
    tags
}

fn count_conflicts(cluster: &[&CandidateRecord]) -> usize {
    if cluster.len() < 2 {
        return 0;
    }
    let columns: BTreeSet<&str> = cluster
        .iter()
        .flat_map(|member| member.populated_columns())
        .filter(|column| *column != SOURCE)
        .collect();
    columns
        .into_iter()
        .filter(|column| {
            let distinct: HashSet<String> = cluster
                .iter()
                .filter_map(|member| member.get(column).to_text())
                .map(|value| value.trim().to_lowercase())
                .collect();
            distinct.len() > 1
        })
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cpl_core::Value;

    fn rec(pairs: &[(&str, &str)]) -> CandidateRecord {
        CandidateRecord::from_pairs(pairs.iter().map(|(k, v)| (*k, Value::from(*v))))
    }

    #[test]
    fn empty_cluster_has_no_result() {
        assert!(reconcile(&[]).is_none());
    }

    #[test]
    fn base_values_win_and_nulls_are_filled_in_member_order() {
        let base = rec(&[("name", "Jane Doe"), ("email", "jane@x.com"), ("source", "Indeed_US")]);
        let second = rec(&[
            ("name", "J. Doe"),
            ("email", "jane@x.com"),
            ("phone", "555-0100"),
            ("source", "LinkedIn_US"),
        ]);
        let third = rec(&[("name", "Jane"), ("phone", "555-0199"), ("location", "Austin"), ("source", "Calendly_US")]);

        let out = reconcile(&[&base, &second, &third]).expect("non-empty");
        assert_eq!(out.record.name.as_deref(), Some("Jane Doe"));
        assert_eq!(out.record.phone.as_deref(), Some("555-0100"));
        assert_eq!(out.record.get("location"), Value::from("Austin"));
        assert_eq!(out.record.source.as_deref(), Some("Indeed_US,LinkedIn_US,Calendly_US"));
        // name and phone disagree; email agrees
        assert_eq!(out.conflicts, 2);
    }

    #[test]
    fn existing_tag_lists_are_flattened_without_repeats() {
        let a = rec(&[("name", "A"), ("source", "Indeed_US, LinkedIn_US")]);
        let b = rec(&[("name", "A"), ("source", "LinkedIn_US,Naukri_India")]);
        let c = rec(&[("name", "A")]);
        let out = reconcile(&[&a, &b, &c]).expect("non-empty");
        assert_eq!(out.record.source.as_deref(), Some("Indeed_US,LinkedIn_US,Naukri_India"));
        assert_eq!(out.conflicts, 0);
    }

    #[test]
    fn case_and_whitespace_differences_are_not_conflicts() {
        let a = rec(&[("name", "Jane Doe"), ("email", "JANE@x.com")]);
        let b = rec(&[("name", " jane doe "), ("email", "jane@x.com")]);
        assert_eq!(reconcile(&[&a, &b]).expect("non-empty").conflicts, 0);
    }

    #[test]
    fn singleton_keeps_record_and_has_no_source_when_untagged() {
        let a = rec(&[("name", "Solo")]);
        let out = reconcile(&[&a]).expect("non-empty");
        assert_eq!(out.record, a);
        assert_eq!(out.conflicts, 0);
    }
}
