//! Duplicate-merge engine.
//!
//! Rows are connected when they share a non-degenerate match key (name+email,
//! name+phone or email+phone after normalization). Connectivity is tracked in
//! a disjoint set fed by one hash-grouping pass per key type, so clustering is
//! linear in the number of rows. Each connected component collapses into one
//! record through [`crate::reconcile::reconcile`].

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap, HashSet};

use cpl_core::{CandidateRecord, CandidateTable, SchemaError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::reconcile::reconcile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyType {
    NameEmail,
    NamePhone,
    EmailPhone,
}

impl KeyType {
    pub const ALL: [KeyType; 3] = [KeyType::NameEmail, KeyType::NamePhone, KeyType::EmailPhone];

    pub fn label(self) -> &'static str {
        match self {
            KeyType::NameEmail => "name_email",
            KeyType::NamePhone => "name_phone",
            KeyType::EmailPhone => "email_phone",
        }
    }
}

pub fn normalize_name(value: &str) -> String {
    value.trim().to_lowercase()
}

pub fn normalize_email(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Keeps ASCII digits only; malformed input simply yields fewer digits.
pub fn normalize_phone(value: &str) -> String {
    value.chars().filter(char::is_ascii_digit).collect()
}

/// Normalized identifying fields of one row. Missing fields are empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedIdentity {
    pub name: String,
    pub email: String,
    pub phone: String,
}

impl NormalizedIdentity {
    pub fn of(record: &CandidateRecord) -> Self {
        Self {
            name: record.name.as_deref().map(normalize_name).unwrap_or_default(),
            email: record.email.as_deref().map(normalize_email).unwrap_or_default(),
            phone: record.phone.as_deref().map(normalize_phone).unwrap_or_default(),
        }
    }

    /// Both components of the key, or `None` when either is empty. A key with
    /// an empty side is degenerate and never links rows.
    pub fn parts(&self, key_type: KeyType) -> Option<(&str, &str)> {
        let (a, b) = match key_type {
            KeyType::NameEmail => (&self.name, &self.email),
            KeyType::NamePhone => (&self.name, &self.phone),
            KeyType::EmailPhone => (&self.email, &self.phone),
        };
        if a.is_empty() || b.is_empty() {
            None
        } else {
            Some((a.as_str(), b.as_str()))
        }
    }

    /// Display form of the key, `"<a>_<b>"`.
    pub fn match_key(&self, key_type: KeyType) -> Option<String> {
        self.parts(key_type).map(|(a, b)| format!("{a}_{b}"))
    }

    pub fn has_any_key(&self) -> bool {
        KeyType::ALL.iter().any(|k| self.parts(*k).is_some())
    }
}

/// Union-find with path halving and union by size.
#[derive(Debug, Clone)]
pub struct DisjointSet {
    parent: Vec<usize>,
    size: Vec<usize>,
}

impl DisjointSet {
    pub fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
            size: vec![1; len],
        }
    }

    pub fn len(&self) -> usize {
        self.parent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }

    pub fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    /// Returns `true` when `a` and `b` were in different sets.
    pub fn union(&mut self, a: usize, b: usize) -> bool {
        let (mut ra, mut rb) = (self.find(a), self.find(b));
        if ra == rb {
            return false;
        }
        if self.size[ra] < self.size[rb] {
            std::mem::swap(&mut ra, &mut rb);
        }
        self.parent[rb] = ra;
        self.size[ra] += self.size[rb];
        true
    }
}

/// Row indices of one connected component, ascending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityCluster {
    pub members: Vec<usize>,
}

impl IdentityCluster {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Smallest row index; the reconciliation base.
    pub fn base(&self) -> usize {
        self.members[0]
    }
}

#[derive(Debug, Clone)]
pub struct DedupConfig {
    pub key_types: Vec<KeyType>,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            key_types: KeyType::ALL.to_vec(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    pub input_rows: usize,
    pub output_rows: usize,
    /// Clusters with two or more members, summed over passes.
    pub merged_clusters: usize,
    pub largest_cluster: usize,
    pub passes: usize,
    pub rows_without_keys: usize,
    pub rows_missing_name: usize,
    /// Fields where a cluster held two or more distinct non-null values.
    pub conflicting_fields: usize,
    /// Rows absorbed after the first pass, i.e. joined through a key that
    /// only exists once null-fill combined fields from different rows.
    pub late_links: usize,
    /// Links that joined two separate clusters, per key type.
    pub links_by_key: BTreeMap<String, usize>,
}

#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub table: CandidateTable,
    pub report: MergeReport,
}

pub struct DedupEngine {
    config: DedupConfig,
}

impl Default for DedupEngine {
    fn default() -> Self {
        Self::new(DedupConfig::default())
    }
}

impl DedupEngine {
    pub fn new(config: DedupConfig) -> Self {
        Self { config }
    }

    /// Partitions `rows` into identity clusters ordered by their base row.
    pub fn clusters(&self, rows: &[CandidateRecord]) -> Vec<IdentityCluster> {
        self.clusters_with_links(rows).0
    }

    fn clusters_with_links(&self, rows: &[CandidateRecord]) -> (Vec<IdentityCluster>, BTreeMap<String, usize>) {
        let identities: Vec<NormalizedIdentity> = rows.iter().map(NormalizedIdentity::of).collect();
        let mut sets = DisjointSet::new(rows.len());
        let mut links = BTreeMap::new();

        let key_types: Vec<KeyType> = {
            let mut seen = HashSet::new();
            self.config.key_types.iter().copied().filter(|k| seen.insert(*k)).collect()
        };
        for key_type in key_types {
            // Linking every member to the first row holding the key yields the
            // same components as linking all pairs.
            let mut first_holder: HashMap<(&str, &str), usize> = HashMap::with_capacity(rows.len());
            let mut joined = 0usize;
            for (i, identity) in identities.iter().enumerate() {
                let Some(parts) = identity.parts(key_type) else {
                    continue;
                };
                match first_holder.entry(parts) {
                    Entry::Occupied(entry) => {
                        if sets.union(*entry.get(), i) {
                            joined += 1;
                        }
                    }
                    Entry::Vacant(entry) => {
                        entry.insert(i);
                    }
                }
            }
            links.insert(key_type.label().to_string(), joined);
        }

        let mut slot_by_root: HashMap<usize, usize> = HashMap::new();
        let mut clusters: Vec<IdentityCluster> = Vec::new();
        for i in 0..rows.len() {
            let root = sets.find(i);
            let slot = *slot_by_root.entry(root).or_insert_with(|| {
                clusters.push(IdentityCluster { members: Vec::new() });
                clusters.len() - 1
            });
            clusters[slot].members.push(i);
        }
        (clusters, links)
    }

    /// Collapses every identity cluster into one record. Passes repeat until
    /// one merges nothing, so the result is stable under another merge.
    pub fn merge(&self, table: CandidateTable) -> Result<MergeOutcome, SchemaError> {
        table.validate()?;
        let (columns, mut rows) = table.into_parts();

        let mut report = MergeReport {
            input_rows: rows.len(),
            rows_missing_name: rows.iter().filter(|r| r.is_blank(cpl_core::NAME)).count(),
            rows_without_keys: rows
                .iter()
                .filter(|r| !NormalizedIdentity::of(r).has_any_key())
                .count(),
            ..MergeReport::default()
        };

        loop {
            let (clusters, links) = self.clusters_with_links(&rows);
            let collapsed = clusters.iter().filter(|c| c.len() > 1).count();
            report.passes += 1;
            report.merged_clusters += collapsed;
            if report.passes > 1 {
                report.late_links += clusters.iter().map(|c| c.len() - 1).sum::<usize>();
            }
            report.largest_cluster = clusters
                .iter()
                .map(IdentityCluster::len)
                .max()
                .unwrap_or(0)
                .max(report.largest_cluster);
            for (key, joined) in links {
                *report.links_by_key.entry(key).or_default() += joined;
            }

            let mut merged = Vec::with_capacity(clusters.len());
            for cluster in &clusters {
                let members: Vec<&CandidateRecord> = cluster.members.iter().map(|&i| &rows[i]).collect();
                if let Some(reconciled) = reconcile(&members) {
                    report.conflicting_fields += reconciled.conflicts;
                    merged.push(reconciled.record);
                }
            }
            debug!(pass = report.passes, clusters = clusters.len(), collapsed, "merge pass");
            rows = merged;
            if collapsed == 0 {
                break;
            }
        }

        report.output_rows = rows.len();
        if report.rows_missing_name > 0 {
            warn!(rows = report.rows_missing_name, "rows without a name carried through merge");
        }
        if report.late_links > 0 {
            warn!(rows = report.late_links, "rows joined on keys assembled by null-fill");
        }
        info!(
            input_rows = report.input_rows,
            output_rows = report.output_rows,
            merged_clusters = report.merged_clusters,
            conflicting_fields = report.conflicting_fields,
            "duplicate merge complete"
        );

        Ok(MergeOutcome {
            table: CandidateTable::from_parts(columns, rows),
            report,
        })
    }
}

/// Merges with the default engine (all three key types).
pub fn merge(table: CandidateTable) -> Result<MergeOutcome, SchemaError> {
    DedupEngine::default().merge(table)
}

/// Keep-first removal of exact repeats: a row is dropped when an earlier row
/// has the same lowercased name, email and phone digits. No fields are merged.
pub fn drop_exact_duplicates(table: CandidateTable) -> Result<(CandidateTable, usize), SchemaError> {
    table.validate()?;
    let (columns, rows) = table.into_parts();
    let before = rows.len();
    let mut seen: HashSet<(String, String, String)> = HashSet::with_capacity(before);
    let kept: Vec<CandidateRecord> = rows
        .into_iter()
        .filter(|row| {
            let identity = NormalizedIdentity::of(row);
            seen.insert((identity.name, identity.email, identity.phone))
        })
        .collect();
    let removed = before - kept.len();
    Ok((CandidateTable::from_parts(columns, kept), removed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cpl_core::Value;

    fn rec(name: Option<&str>, email: Option<&str>, phone: Option<&str>, source: &str) -> CandidateRecord {
        CandidateRecord::from_pairs([
            ("name", Value::from(name)),
            ("email", Value::from(email)),
            ("phone", Value::from(phone)),
            ("source", Value::from(source)),
        ])
    }

    fn table(rows: Vec<CandidateRecord>) -> CandidateTable {
        CandidateTable::from_parts(
            vec!["name".into(), "email".into(), "phone".into(), "source".into()],
            rows,
        )
    }

    #[test]
    fn phone_normalization_strips_non_digits() {
        assert_eq!(normalize_phone("(555) 123-4567"), "5551234567");
        assert_eq!(normalize_phone("+1 555.123.4567 ext"), "15551234567");
        assert_eq!(normalize_phone("n/a"), "");
    }

    #[test]
    fn keys_with_an_empty_side_are_degenerate() {
        let id = NormalizedIdentity::of(&rec(Some(" Jane Doe "), Some("JANE@X.COM"), None, "A"));
        assert_eq!(id.match_key(KeyType::NameEmail).as_deref(), Some("jane doe_jane@x.com"));
        assert_eq!(id.parts(KeyType::NamePhone), None);
        assert_eq!(id.parts(KeyType::EmailPhone), None);
        assert!(!NormalizedIdentity::default().has_any_key());
    }

    #[test]
    fn disjoint_set_tracks_components() {
        let mut sets = DisjointSet::new(5);
        assert!(sets.union(0, 1));
        assert!(sets.union(3, 4));
        assert!(!sets.union(1, 0));
        assert!(sets.union(1, 4));
        assert_eq!(sets.find(0), sets.find(3));
        assert_ne!(sets.find(2), sets.find(0));
        assert_eq!(sets.len(), 5);
    }

    #[test]
    fn clusters_partition_rows_and_order_by_base() {
        let rows = vec![
            rec(Some("Solo"), None, None, "A"),
            rec(Some("Jane"), Some("j@x.com"), None, "A"),
            rec(Some("Bob"), Some("b@x.com"), Some("1"), "B"),
            rec(Some("jane"), Some("J@X.com"), Some("2"), "B"),
        ];
        let clusters = DedupEngine::default().clusters(&rows);
        let members: Vec<Vec<usize>> = clusters.into_iter().map(|c| c.members).collect();
        assert_eq!(members, vec![vec![0], vec![1, 3], vec![2]]);
    }

    #[test]
    fn restricting_key_types_disables_other_links() {
        let rows = vec![
            rec(Some("Jane"), Some("j@x.com"), Some("555"), "A"),
            rec(Some("Jane"), None, Some("555"), "B"),
        ];
        let engine = DedupEngine::new(DedupConfig {
            key_types: vec![KeyType::NameEmail],
        });
        assert_eq!(engine.clusters(&rows).len(), 2);
        assert_eq!(DedupEngine::default().clusters(&rows).len(), 1);
    }

    #[test]
    fn merge_without_name_column_is_a_schema_error() {
        let t = CandidateTable::from_parts(vec!["email".into()], vec![]);
        assert_eq!(
            merge(t).unwrap_err(),
            SchemaError::MissingColumn("name".to_string())
        );
    }

    #[test]
    fn merge_reports_counts() {
        let t = table(vec![
            rec(Some("Jane"), Some("j@x.com"), None, "Indeed_US"),
            rec(Some("Jane"), Some("j@x.com"), Some("555"), "LinkedIn_US"),
            rec(None, None, Some("777"), "Calendly_US"),
        ]);
        let outcome = merge(t).unwrap();
        assert_eq!(outcome.table.len(), 2);
        let r = &outcome.report;
        assert_eq!((r.input_rows, r.output_rows), (3, 2));
        assert_eq!(r.merged_clusters, 1);
        assert_eq!(r.largest_cluster, 2);
        assert_eq!(r.passes, 2);
        assert_eq!(r.rows_missing_name, 1);
        assert_eq!(r.rows_without_keys, 1);
        assert_eq!(r.links_by_key.get("name_email"), Some(&1));
    }

    #[test]
    fn table_without_duplicates_takes_a_single_pass() {
        let t = table(vec![
            rec(Some("Jane"), Some("j@x.com"), None, "A"),
            rec(Some("Bob"), Some("b@x.com"), Some("555"), "B"),
        ]);
        let outcome = merge(t).unwrap();
        assert_eq!(outcome.report.passes, 1);
        assert_eq!(outcome.report.merged_clusters, 0);
        assert_eq!(outcome.table.len(), 2);
    }

    #[test]
    fn chained_links_collapse_in_one_pass() {
        // 0-1 name+email, 1-2 name+phone, 2-3 email+phone; 0 and 3 share nothing.
        let t = table(vec![
            rec(Some("Jane"), Some("j@x.com"), None, "A"),
            rec(Some("Jane"), Some("j@x.com"), Some("555"), "B"),
            rec(Some("Jane"), Some("other@y.com"), Some("5-5-5"), "C"),
            rec(Some("Janet"), Some("other@y.com"), Some("(555)"), "D"),
        ]);
        let outcome = merge(t).unwrap();
        assert_eq!(outcome.table.len(), 1);
        assert_eq!(outcome.report.passes, 2);
        assert_eq!(outcome.report.largest_cluster, 4);
        let merged = &outcome.table.rows()[0];
        assert_eq!(merged.source.as_deref(), Some("A,B,C,D"));
        assert_eq!(merged.email.as_deref(), Some("j@x.com"));
        assert_eq!(merged.phone.as_deref(), Some("555"));
        assert_eq!(outcome.report.late_links, 0);
    }

    #[test]
    fn links_formed_by_null_fill_are_counted() {
        // G only matches the merged A..E row, whose Jane+e1 pair comes from A's name and B's email.
        let t = table(vec![
            rec(Some("Jane"), None, Some("111"), "A"),
            rec(Some("Zed"), Some("e1@x.com"), Some("222"), "B"),
            rec(Some("Jane"), Some("e2@x.com"), Some("111"), "C"),
            rec(Some("Zed"), Some("e2@x.com"), Some("111"), "D"),
            rec(Some("Zed"), Some("e1@x.com"), Some("111"), "E"),
            rec(Some("Jane"), Some("e1@x.com"), Some("999"), "G"),
        ]);
        let first_pass = DedupEngine::default().clusters(t.rows());
        assert_eq!(first_pass.len(), 2);
        assert_eq!(first_pass[1].members, vec![5]);

        let outcome = merge(t).unwrap();
        assert_eq!(outcome.table.len(), 1);
        assert_eq!(outcome.report.passes, 3);
        assert_eq!(outcome.report.late_links, 1);
        assert_eq!(outcome.table.rows()[0].source.as_deref(), Some("A,B,C,D,E,G"));
    }

    #[test]
    fn drop_exact_duplicates_keeps_first_occurrence() {
        let t = table(vec![
            rec(Some("Jane"), Some("J@x.com"), Some("(555) 1"), "A"),
            rec(Some("jane"), Some("j@x.com"), Some("5551"), "B"),
            rec(Some("Jane"), Some("j@x.com"), None, "C"),
        ]);
        let (out, removed) = drop_exact_duplicates(t).unwrap();
        assert_eq!(removed, 1);
        assert_eq!(out.len(), 2);
        assert_eq!(out.rows()[0].source.as_deref(), Some("A"));
    }
}
