use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use cpl_core::{CandidateRecord, CandidateTable, Value};
use cpl_sync::{merge, DedupEngine, NormalizedIdentity};

fn mk_row(name: Option<&str>, email: Option<&str>, phone: Option<&str>, source: &str) -> CandidateRecord {
    CandidateRecord::from_pairs([
        ("name", Value::from(name)),
        ("email", Value::from(email)),
        ("phone", Value::from(phone)),
        ("source", Value::from(source)),
    ])
}

fn mk_table(rows: Vec<CandidateRecord>) -> CandidateTable {
    CandidateTable::from_parts(
        vec!["name".into(), "email".into(), "phone".into(), "source".into()],
        rows,
    )
}

fn tags(record: &CandidateRecord) -> BTreeSet<String> {
    record.source_tags().into_iter().collect()
}

fn mixed_table() -> CandidateTable {
    let mut jane = mk_row(Some("Jane Doe"), Some("jane@x.com"), None, "r0");
    jane.set("position", Value::from("Engineer"));
    mk_table(vec![
        jane,
        mk_row(Some("jane doe"), Some("JANE@x.com"), Some("(555) 123-4567"), "r1"),
        mk_row(None, Some("jane@x.com"), Some("555.123.4567"), "r2"),
        mk_row(Some("Bob Lee"), None, Some("555-000-1111"), "r3"),
        mk_row(Some("Bob Lee"), Some("bob@y.com"), Some("5550001111"), "r4"),
        mk_row(None, None, Some("777"), "r5"),
        mk_row(None, None, Some("888"), "r6"),
        mk_row(Some("Solo"), None, None, "r7"),
    ])
}

#[test]
fn merge_is_idempotent() {
    let once = merge(mixed_table()).expect("merge").table;
    let twice = merge(once.clone()).expect("merge again").table;
    assert_eq!(once, twice);
}

#[test]
fn every_input_row_lands_in_exactly_one_output_row() {
    let input = mixed_table();
    let input_tags: Vec<String> = input.rows().iter().flat_map(CandidateRecord::source_tags).collect();
    let out = merge(input).expect("merge").table;

    for tag in &input_tags {
        let holders = out.rows().iter().filter(|r| tags(r).contains(tag)).count();
        assert_eq!(holders, 1, "tag {tag} should appear in exactly one output row");
    }
    let total: usize = out.rows().iter().map(|r| r.source_tags().len()).sum();
    assert_eq!(total, input_tags.len());
    assert!(out.len() <= input_tags.len());
}

#[test]
fn rows_sharing_only_empty_components_stay_apart() {
    let t = mk_table(vec![
        mk_row(None, None, Some("555-1000"), "A"),
        mk_row(None, None, Some("555-2000"), "B"),
        mk_row(None, None, None, "C"),
        mk_row(None, None, None, "D"),
    ]);
    let out = merge(t).expect("merge");
    assert_eq!(out.table.len(), 4);
    assert_eq!(out.report.merged_clusters, 0);
    assert_eq!(out.report.rows_without_keys, 4);
}

#[test]
fn missing_name_and_email_never_link_on_blank_text() {
    let t = mk_table(vec![
        mk_row(Some("  "), Some(""), Some("555"), "A"),
        mk_row(Some(" "), Some("   "), Some("555"), "B"),
    ]);
    assert_eq!(merge(t).expect("merge").table.len(), 2);
}

#[test]
fn transitive_chain_collapses_to_one_record() {
    // A-B share name+email, B-C share email+phone; A and C share no key.
    let a = mk_row(Some("Jane Doe"), Some("jane@x.com"), None, "A");
    let b = mk_row(Some("Jane Doe"), Some("JANE@x.com"), Some("(555) 123-4567"), "B");
    let c = mk_row(None, Some("jane@x.com"), Some("555.123.4567"), "C");
    let ia = NormalizedIdentity::of(&a);
    let ic = NormalizedIdentity::of(&c);
    assert!(cpl_sync::KeyType::ALL
        .iter()
        .all(|k| ia.parts(*k).is_none() || ia.parts(*k) != ic.parts(*k)));

    let out = merge(mk_table(vec![a, b, c, mk_row(Some("Other"), Some("o@z.com"), None, "D")]))
        .expect("merge")
        .table;
    assert_eq!(out.len(), 2);
    let jane = out
        .rows()
        .iter()
        .find(|r| tags(r).contains("A"))
        .expect("jane row");
    assert_eq!(tags(jane), ["A", "B", "C"].into_iter().map(String::from).collect::<BTreeSet<_>>());
    assert_eq!(jane.name.as_deref(), Some("Jane Doe"));
    assert_eq!(jane.phone.as_deref(), Some("(555) 123-4567"));
}

#[test]
fn null_fill_takes_value_and_unions_provenance() {
    let mut indeed = mk_row(Some("Jane Doe"), Some("jane@x.com"), None, "Indeed_US");
    indeed.set("position", Value::Null);
    let mut linkedin = mk_row(Some("Jane Doe"), Some("jane@x.com"), None, "LinkedIn_US");
    linkedin.set("position", Value::from("Engineer"));
    let t = CandidateTable::from_parts(
        vec!["name".into(), "email".into(), "position".into(), "source".into()],
        vec![indeed, linkedin],
    );

    let out = merge(t).expect("merge").table;
    assert_eq!(out.len(), 1);
    let merged = &out.rows()[0];
    assert_eq!(merged.get("position"), Value::from("Engineer"));
    assert_eq!(
        tags(merged),
        ["Indeed_US", "LinkedIn_US"].into_iter().map(String::from).collect::<BTreeSet<_>>()
    );
    assert_eq!(out.columns(), ["name", "email", "position", "source"]);
}

#[test]
fn differently_formatted_phones_match() {
    let t = mk_table(vec![
        mk_row(Some("Sam Park"), None, Some("(555) 123-4567"), "A"),
        mk_row(Some("Sam Park"), None, Some("555-123-4567"), "B"),
    ]);
    assert_eq!(merge(t).expect("merge").table.len(), 1);
}

#[test]
fn email_matching_ignores_case() {
    let t = mk_table(vec![
        mk_row(Some("Jane"), Some("Jane@X.com"), None, "A"),
        mk_row(Some("Jane"), Some("jane@x.com"), None, "B"),
    ]);
    assert_eq!(merge(t).expect("merge").table.len(), 1);
}

#[test]
fn tables_without_email_or_phone_columns_are_accepted() {
    let t = CandidateTable::from_parts(
        vec!["name".into(), "notes".into()],
        vec![
            CandidateRecord::from_pairs([("name", "Jane"), ("notes", "first")]),
            CandidateRecord::from_pairs([("name", "Jane"), ("notes", "second")]),
        ],
    );
    let out = merge(t).expect("merge");
    assert_eq!(out.table.len(), 2);
    assert_eq!(out.table.columns(), ["name", "notes"]);
}

#[test]
fn clustering_is_deterministic_for_identical_input() {
    let engine = DedupEngine::default();
    let table = mixed_table();
    let first = engine.clusters(table.rows());
    for _ in 0..5 {
        assert_eq!(engine.clusters(table.rows()), first);
    }
}

#[test]
fn ten_thousand_rows_cluster_quickly() {
    let rows: Vec<CandidateRecord> = (0..10_000)
        .map(|i| {
            // one row in twenty repeats an earlier identity
            let id = if i % 20 == 19 { i - 7 } else { i };
            mk_row(
                Some(&format!("Candidate {id}")),
                Some(&format!("c{id}@example.com")),
                Some(&format!("555{id:07}")),
                &format!("row{i}"),
            )
        })
        .collect();
    let table = mk_table(rows);

    let started = Instant::now();
    let out = merge(table).expect("merge");
    let elapsed = started.elapsed();

    assert_eq!(out.table.len(), 10_000 - 500);
    assert!(elapsed < Duration::from_secs(1), "merge took {elapsed:?}");
}
