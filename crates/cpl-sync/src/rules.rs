//! Per-source synonym columns: two columns that carry the same fact under
//! different headers are made consistent before the merge.

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{Context, Result};
use cpl_core::{CandidateRecord, CandidateTable, Value};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const SYNONYMS_FILE: &str = "synonyms.yaml";

/// Which side of a rule wins when both hold different values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Precedence {
    #[default]
    Primary,
    Secondary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynonymRule {
    /// Source tag the rule applies to (ASCII case-insensitive), or `"*"` for
    /// every row.
    pub source: String,
    pub primary: String,
    pub secondary: String,
    #[serde(default)]
    pub precedence: Precedence,
    /// Drop the secondary column once its values are folded in. The column
    /// stays when rows outside this rule's source still hold values in it.
    #[serde(default)]
    pub retire_secondary: bool,
    /// Only fill an empty primary; the secondary is never written.
    #[serde(default)]
    pub fill_only: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RuleEffect {
    Unchanged,
    Filled,
    Overwritten,
}

impl SynonymRule {
    pub fn new(source: &str, primary: &str, secondary: &str) -> Self {
        Self {
            source: source.to_string(),
            primary: primary.to_string(),
            secondary: secondary.to_string(),
            precedence: Precedence::Primary,
            retire_secondary: false,
            fill_only: false,
        }
    }

    pub fn retiring(mut self) -> Self {
        self.retire_secondary = true;
        self
    }

    pub fn filling_only(mut self) -> Self {
        self.fill_only = true;
        self
    }

    pub fn applies_to(&self, record: &CandidateRecord) -> bool {
        self.source == "*"
            || record
                .source_tags()
                .iter()
                .any(|tag| tag.eq_ignore_ascii_case(&self.source))
    }

    fn apply(&self, record: &mut CandidateRecord) -> RuleEffect {
        let primary = record.get(&self.primary);
        let secondary = record.get(&self.secondary);
        match (primary.is_null(), secondary.is_null()) {
            (true, true) => RuleEffect::Unchanged,
            (true, false) => {
                record.set(&self.primary, secondary);
                RuleEffect::Filled
            }
            (false, true) if self.fill_only => RuleEffect::Unchanged,
            (false, true) => {
                record.set(&self.secondary, primary);
                RuleEffect::Filled
            }
            (false, false) => {
                if self.fill_only || same_text(&primary, &secondary) {
                    return RuleEffect::Unchanged;
                }
                match self.precedence {
                    Precedence::Primary => record.set(&self.secondary, primary),
                    Precedence::Secondary => record.set(&self.primary, secondary),
                }
                RuleEffect::Overwritten
            }
        }
    }
}

fn same_text(a: &Value, b: &Value) -> bool {
    a.to_text().map(|s| s.trim().to_string()) == b.to_text().map(|s| s.trim().to_string())
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SynonymReport {
    pub filled: usize,
    pub overwritten: usize,
    pub retired_columns: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct SynonymRulesFile {
    #[allow(dead_code)]
    version: u32,
    #[serde(default)]
    rules: Vec<SynonymRule>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynonymRules {
    rules: Vec<SynonymRule>,
}

impl Default for SynonymRules {
    fn default() -> Self {
        Self::defaults()
    }
}

impl SynonymRules {
    pub fn new(rules: Vec<SynonymRule>) -> Self {
        Self { rules }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Rules for the export formats the adapters ship presets for.
    pub fn defaults() -> Self {
        Self::new(vec![
            SynonymRule::new("Indeed_US", "experience", "current_title"),
            SynonymRule::new("Linkedin_US", "experience", "current_title"),
            SynonymRule::new("Linkedin_US", "status", "project_details").filling_only(),
            SynonymRule::new("Linkedin_US", "position", "active_project").retiring(),
            SynonymRule::new("Linkedin_India", "position", "active_project").retiring(),
            SynonymRule::new("Naukri_India", "position", "active_project").retiring(),
        ])
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let file: SynonymRulesFile = serde_yaml::from_str(text).context("parsing synonym rules")?;
        Ok(Self::new(file.rules))
    }

    /// Reads `rules/synonyms.yaml`; a workspace without one gets the defaults.
    pub fn from_workspace_root(root: &Path) -> Result<Self> {
        let path = root.join("rules").join(SYNONYMS_FILE);
        if !path.exists() {
            debug!(path = %path.display(), "no synonym rules file; using defaults");
            return Ok(Self::defaults());
        }
        let text = std::fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
        Self::from_yaml_str(&text).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn rules(&self) -> &[SynonymRule] {
        &self.rules
    }

    /// Applies every rule whose columns the table carries, then drops
    /// retired secondary columns.
    pub fn apply(&self, table: &mut CandidateTable) -> SynonymReport {
        let mut report = SynonymReport::default();
        let active: Vec<&SynonymRule> = self
            .rules
            .iter()
            .filter(|rule| table.has_column(&rule.primary) || table.has_column(&rule.secondary))
            .collect();

        let mut touched = false;
        for rule in &active {
            for row in table.rows_mut() {
                if !rule.applies_to(row) {
                    continue;
                }
                match rule.apply(row) {
                    RuleEffect::Unchanged => {}
                    RuleEffect::Filled => {
                        report.filled += 1;
                        touched = true;
                    }
                    RuleEffect::Overwritten => {
                        report.overwritten += 1;
                        touched = true;
                    }
                }
            }
        }
        if touched {
            for rule in &active {
                table.ensure_column(&rule.primary);
                table.ensure_column(&rule.secondary);
            }
        }

        let retired: BTreeSet<&str> = active
            .iter()
            .filter(|rule| rule.retire_secondary)
            .map(|rule| rule.secondary.as_str())
            .collect();
        for column in retired {
            if !self.fully_folded(table, column) {
                debug!(column, "keeping synonym column still holding values from other sources");
                continue;
            }
            if table.drop_column(column) {
                report.retired_columns.push(column.to_string());
            }
        }
        report
    }

    /// True when every row holding a value in `column` is covered by a rule
    /// that retires it.
    fn fully_folded(&self, table: &CandidateTable, column: &str) -> bool {
        table.rows().iter().filter(|row| !row.is_blank(column)).all(|row| {
            self.rules
                .iter()
                .any(|rule| rule.retire_secondary && rule.secondary == column && rule.applies_to(row))
        })
    }
}
