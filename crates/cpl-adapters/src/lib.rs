//! Source adapter contracts + header-alias adapters for recruiting exports.

use std::collections::HashSet;
use std::path::Path;

use anyhow::Result;
use cpl_core::{CandidateRecord, CandidateTable, SchemaError, Value, NAME, SOURCE};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CRATE_NAME: &str = "cpl-adapters";

pub const FIRST_NAME: &str = "first_name";
pub const LAST_NAME: &str = "last_name";

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("source {source_id} produced an unusable table: {error}")]
    Schema {
        source_id: String,
        #[source]
        error: SchemaError,
    },
}

/// One canonical column and the export headers that feed it, in priority order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnRule {
    pub column: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl ColumnRule {
    fn new(column: &str, aliases: &[&str]) -> Self {
        Self {
            column: column.to_string(),
            aliases: aliases.iter().map(ToString::to_string).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    #[serde(default)]
    pub columns: Vec<ColumnRule>,
    /// Banner lines above the header row.
    #[serde(default)]
    pub skip_rows: usize,
    /// Carry headers no rule claimed, renamed to snake case.
    #[serde(default)]
    pub keep_unmapped: bool,
}

impl Default for ColumnMapping {
    fn default() -> Self {
        Self::passthrough()
    }
}

impl ColumnMapping {
    /// Every header is kept under its snake-case name.
    pub fn passthrough() -> Self {
        Self {
            columns: Vec::new(),
            skip_rows: 0,
            keep_unmapped: true,
        }
    }

    /// Built-in header tables for the export formats seen in practice.
    pub fn preset(source_id: &str) -> Option<Self> {
        let name = ColumnRule::new(NAME, &["name", "full name", "candidate name"]);
        let email = ColumnRule::new("email", &["email", "email address", "email id"]);
        let phone = ColumnRule::new("phone", &["phone", "phone number", "mobile", "contact"]);
        let first = ColumnRule::new(FIRST_NAME, &["first name", "firstname", "given name"]);
        let last = ColumnRule::new(LAST_NAME, &["last name", "lastname", "surname", "family name"]);
        let location = ColumnRule::new("location", &["location", "current location", "city"]);
        let current_title = ColumnRule::new("current_title", &["current title", "job title", "position title"]);
        let company = ColumnRule::new("current_company", &["current company", "company", "employer"]);
        let profile_url = ColumnRule::new("profile_url", &["profile url", "linkedin url", "profile link"]);
        let project = ColumnRule::new("active_project", &["active project", "current project", "project"]);

        let columns = match source_id {
            "Indeed_US" => vec![
                name,
                email,
                phone,
                ColumnRule::new("status", &["status", "application status", "job status"]),
                ColumnRule::new("location", &["candidate location", "location", "city", "address"]),
                ColumnRule::new("experience", &["experience", "years of experience", "work experience"]),
                ColumnRule::new("position", &["position", "job title", "role", "job position"]),
            ],
            "Linkedin_US" => vec![
                name,
                first,
                last,
                location,
                current_title,
                email,
                phone,
                profile_url,
                project,
                ColumnRule::new("experience", &["experience"]),
                ColumnRule::new("status", &["status"]),
                ColumnRule::new("project_details", &["project details"]),
            ],
            "Linkedin_India" => vec![
                name,
                first,
                last,
                location,
                current_title,
                company,
                email,
                phone,
                profile_url,
                project,
            ],
            "Naukri_India" => vec![
                name,
                email,
                phone,
                ColumnRule::new("position", &["position", "job position", "role", "job title", "designation"]),
                location,
                ColumnRule::new("total_experience", &["total experience", "experience", "exp"]),
                ColumnRule::new("annual_salary", &["annual salary", "current ctc", "ctc", "salary"]),
                ColumnRule::new("notice_period", &["notice period", "availability to join", "joining time"]),
            ],
            "Calendly_US" => vec![
                ColumnRule::new(NAME, &["invitee name", "name", "full name"]),
                ColumnRule::new("email", &["invitee email", "email", "email address"]),
                phone,
                ColumnRule::new("date", &["scheduled date", "meeting date", "date"]),
                ColumnRule::new("profile", &["profile", "user profile", "candidate profile"]),
                ColumnRule::new("salary", &["expected salary", "current salary", "salary"]),
                ColumnRule::new("declaration", &["declaration", "self declaration", "legal declaration"]),
                ColumnRule::new("position", &["position", "job position", "role"]),
                ColumnRule::new("no-show", &["no-show", "no show", "attendance"]),
                ColumnRule::new("status", &["event status", "meeting status", "status"]),
            ],
            _ => return None,
        };
        Some(Self {
            columns,
            skip_rows: if source_id.starts_with("Linkedin") { 1 } else { 0 },
            keep_unmapped: false,
        })
    }
}

/// Lowercase snake case: `"Candidate  E-mail"` becomes `candidate_e_mail`.
pub fn canonical_header(input: &str) -> String {
    input
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect::<String>()
        .split('_')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

fn header_key(input: &str) -> String {
    input.trim().to_lowercase()
}

pub trait SourceAdapter: Send + Sync {
    fn source_id(&self) -> &str;

    /// Banner lines the reader must skip before the header row.
    fn skip_rows(&self) -> usize {
        0
    }

    fn normalize(&self, raw: CandidateTable) -> Result<CandidateTable, AdapterError>;
}

#[derive(Debug, Clone)]
pub struct AliasMappingAdapter {
    source_id: String,
    mapping: ColumnMapping,
}

impl AliasMappingAdapter {
    pub fn new(source_id: impl Into<String>, mapping: ColumnMapping) -> Self {
        Self {
            source_id: source_id.into(),
            mapping,
        }
    }

    pub fn mapping(&self) -> &ColumnMapping {
        &self.mapping
    }

    /// Resolves every rule to at most one raw header. Exact (case-insensitive)
    /// matches are settled for all rules before any substring match, and a
    /// header feeds only one rule.
    fn resolve(&self, headers: &[String]) -> Vec<(String, Option<String>)> {
        let keys: Vec<String> = headers.iter().map(|h| header_key(h)).collect();
        let rules: Vec<Vec<String>> = self
            .mapping
            .columns
            .iter()
            .map(|rule| rule.aliases.iter().map(|a| header_key(a)).collect())
            .collect();
        let mut claimed: HashSet<usize> = HashSet::new();
        let mut found: Vec<Option<usize>> = vec![None; rules.len()];

        for exact in [true, false] {
            for (slot, aliases) in found.iter_mut().zip(&rules) {
                if slot.is_some() {
                    continue;
                }
                *slot = aliases.iter().find_map(|alias| {
                    keys.iter().enumerate().position(|(i, key)| {
                        !claimed.contains(&i)
                            && if exact { key == alias } else { key.contains(alias.as_str()) }
                    })
                });
                if let Some(i) = *slot {
                    claimed.insert(i);
                }
            }
        }

        let mut out: Vec<(String, Option<String>)> = self
            .mapping
            .columns
            .iter()
            .zip(&found)
            .map(|(rule, slot)| (rule.column.clone(), slot.map(|i| headers[i].clone())))
            .collect();

        if self.mapping.keep_unmapped {
            for (i, header) in headers.iter().enumerate() {
                if !claimed.contains(&i) {
                    out.push((canonical_header(header), Some(header.clone())));
                }
            }
        }
        out
    }
}

impl SourceAdapter for AliasMappingAdapter {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    fn skip_rows(&self) -> usize {
        self.mapping.skip_rows
    }

    fn normalize(&self, raw: CandidateTable) -> Result<CandidateTable, AdapterError> {
        let plan = self.resolve(raw.columns());
        let mut columns: Vec<String> = plan.iter().map(|(target, _)| target.clone()).collect();
        columns.push(SOURCE.to_string());
        let compose_name = plan.iter().any(|(target, _)| target == FIRST_NAME || target == LAST_NAME);
        if compose_name {
            columns.push(NAME.to_string());
        }

        let mut out = CandidateTable::from_parts(columns, Vec::new());
        let (_, rows) = raw.into_parts();
        for row in rows {
            let mut mapped = CandidateRecord::default();
            for (target, raw_column) in &plan {
                let Some(raw_column) = raw_column else {
                    continue;
                };
                if mapped.is_blank(target) {
                    mapped.set(target, row.get(raw_column));
                }
            }
            if mapped.populated_columns().is_empty() {
                continue;
            }
            if compose_name && mapped.is_blank(NAME) {
                let full = [FIRST_NAME, LAST_NAME]
                    .iter()
                    .filter_map(|c| mapped.get(c).to_text())
                    .map(|s| s.trim().to_string())
                    .collect::<Vec<_>>()
                    .join(" ");
                mapped.set(NAME, Value::text(full));
            }
            if mapped.is_blank(SOURCE) {
                mapped.source = Some(self.source_id.clone());
            }
            out.push_row(mapped);
        }

        out.validate().map_err(|error| AdapterError::Schema {
            source_id: self.source_id.clone(),
            error,
        })?;
        Ok(out)
    }
}

/// Explicit mapping first, then the built-in preset, then passthrough.
pub fn adapter_for_source(source_id: &str, mapping: Option<&ColumnMapping>) -> Box<dyn SourceAdapter> {
    let mapping = mapping
        .cloned()
        .or_else(|| ColumnMapping::preset(source_id))
        .unwrap_or_else(ColumnMapping::passthrough);
    Box::new(AliasMappingAdapter::new(source_id, mapping))
}

/// Reads a raw export the way the sync pipeline does, for fixture tests.
pub fn load_fixture_export(path: impl AsRef<Path>, skip_rows: usize) -> Result<CandidateTable> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|e| anyhow::anyhow!("reading {}: {e}", path.display()))?;
    cpl_storage::parse_csv_table_skipping(&bytes, skip_rows)
        .map_err(|e| anyhow::anyhow!("parsing {}: {e}", path.display()))
}
