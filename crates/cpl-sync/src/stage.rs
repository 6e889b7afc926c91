//! Pipeline stage derived from status columns and scheduling evidence.

use std::fmt;

use cpl_core::{CandidateRecord, CandidateTable, Value};
use serde::{Deserialize, Serialize};

pub const STAGE: &str = "stage";
pub const DATE: &str = "date";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    #[serde(rename = "Call Stage")]
    CallStage,
    Scheduled,
    Rejected,
}

impl Stage {
    pub fn label(self) -> &'static str {
        match self {
            Stage::CallStage => "Call Stage",
            Stage::Scheduled => "Scheduled",
            Stage::Rejected => "Rejected",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StageReport {
    pub call_stage: usize,
    pub scheduled: usize,
    pub rejected: usize,
    /// Rows that already carried a stage.
    pub kept: usize,
}

/// Columns whose values can mark a candidate as rejected.
pub fn status_columns(table: &CandidateTable) -> Vec<String> {
    table
        .columns()
        .iter()
        .filter(|column| {
            let lower = column.to_lowercase();
            lower == "no-show"
                || lower == "no_show"
                || ["status", "rejection", "result"].iter().any(|k| lower.contains(k))
        })
        .cloned()
        .collect()
}

fn is_rejection(value: &str) -> bool {
    let lower = value.to_lowercase();
    lower.contains("reject") || lower.contains("no show")
}

/// Rejected wins over Scheduled, which wins over Call Stage.
pub fn derive_stage(record: &CandidateRecord, status_columns: &[String]) -> Stage {
    let rejected = status_columns
        .iter()
        .filter_map(|column| record.get(column).to_text())
        .any(|value| is_rejection(&value));
    if rejected {
        return Stage::Rejected;
    }
    let via_calendly = record
        .source_tags()
        .iter()
        .any(|tag| tag.to_lowercase().contains("calendly"));
    if via_calendly || !record.is_blank(DATE) {
        return Stage::Scheduled;
    }
    Stage::CallStage
}

/// Fills `stage` for rows that have none; existing stages are left alone.
/// A newly created stage column is placed first.
pub fn assign_stages(table: &mut CandidateTable) -> StageReport {
    if !table.has_column(STAGE) {
        table.insert_column_front(STAGE);
    }
    let columns = status_columns(table);
    let mut report = StageReport::default();
    for row in table.rows_mut() {
        if !row.is_blank(STAGE) {
            report.kept += 1;
            continue;
        }
        let stage = derive_stage(row, &columns);
        match stage {
            Stage::CallStage => report.call_stage += 1,
            Stage::Scheduled => report.scheduled += 1,
            Stage::Rejected => report.rejected += 1,
        }
        row.set(STAGE, Value::from(stage.label()));
    }
    report
}
