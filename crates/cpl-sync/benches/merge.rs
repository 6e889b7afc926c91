use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};

use cpl_core::{CandidateRecord, CandidateTable, Value};
use cpl_sync::{merge, DedupEngine};

/// `rows` candidates where every twentieth row repeats an earlier identity
/// with reformatted email and phone.
fn synthetic_table(rows: usize) -> CandidateTable {
    let mut out = Vec::with_capacity(rows);
    for i in 0..rows {
        let id = if i % 20 == 19 { i / 2 } else { i };
        out.push(CandidateRecord::from_pairs([
            ("name", Value::from(format!("Candidate {id}"))),
            (
                "email",
                Value::from(if id == i {
                    format!("c{id}@example.com")
                } else {
                    format!("C{id}@Example.com")
                }),
            ),
            ("phone", Value::from(format!("(555) {:03}-{:04}", id / 10_000, id % 10_000))),
            ("source", Value::from(if i % 2 == 0 { "Indeed_US" } else { "Linkedin_US" })),
        ]));
    }
    CandidateTable::from_parts(
        vec!["name".into(), "email".into(), "phone".into(), "source".into()],
        out,
    )
}

fn bench_merge(c: &mut Criterion) {
    let table = synthetic_table(10_000);

    c.bench_function("clusters_10k", |b| {
        let engine = DedupEngine::default();
        b.iter(|| black_box(engine.clusters(black_box(table.rows())).len()))
    });

    c.bench_function("merge_10k", |b| {
        b.iter_batched(
            || table.clone(),
            |t| black_box(merge(t).map(|o| o.table.len()).unwrap_or(0)),
            BatchSize::LargeInput,
        )
    });
}

criterion_group!(benches, bench_merge);
criterion_main!(benches);
