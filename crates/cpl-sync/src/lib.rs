//! Candidate sync pipeline: source exports in, one merged candidate database out.

pub mod dedup;
pub mod normalize;
pub mod reconcile;
pub mod rules;
pub mod stage;

use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use arrow_array::{ArrayRef, RecordBatch, StringArray, UInt32Array};
use arrow_schema::{DataType, Field as ArrowField, Schema};
use chrono::{DateTime, Utc};
use cpl_adapters::{adapter_for_source, canonical_header, ColumnMapping};
use cpl_core::{CandidateTable, KNOWN_COLUMNS};
use cpl_storage::{archive_uploads, read_table, read_table_skipping, sha256_hex, write_table_atomic, SnapshotStore};
use parquet::arrow::ArrowWriter;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

pub use dedup::{
    drop_exact_duplicates, merge, DedupConfig, DedupEngine, DisjointSet, IdentityCluster, KeyType, MergeOutcome,
    MergeReport, NormalizedIdentity,
};
pub use normalize::{standardize_names, title_case};
pub use reconcile::{reconcile, Reconciled};
pub use rules::{Precedence, SynonymReport, SynonymRule, SynonymRules};
pub use stage::{assign_stages, derive_stage, Stage, StageReport, STAGE};

pub const CRATE_NAME: &str = "cpl-sync";

pub const SOURCES_FILE: &str = "sources.yaml";
pub const RUN_REPORT_FILE: &str = "run_report.json";
pub const RUN_SUMMARY_FILE: &str = "run_summary.md";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRegistry {
    pub sources: Vec<SourceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub source_id: String,
    pub display_name: String,
    pub enabled: bool,
    /// Relative to the workspace root.
    pub export_path: PathBuf,
    #[serde(default)]
    pub region: Option<String>,
    /// Overrides the adapter's built-in header table.
    #[serde(default)]
    pub mapping: Option<ColumnMapping>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub workspace_root: PathBuf,
    pub database_path: PathBuf,
    pub snapshot_dir: PathBuf,
    pub keep_snapshots: usize,
    pub archive_uploads: bool,
    pub uploads_dir: PathBuf,
    pub archive_dir: PathBuf,
    pub title_case_names: bool,
    pub assign_stages: bool,
}

impl PipelineConfig {
    /// Default layout under `root`.
    pub fn for_workspace(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            database_path: root.join("data").join("candidates.csv"),
            snapshot_dir: root.join("data").join("snapshots"),
            keep_snapshots: 5,
            archive_uploads: false,
            uploads_dir: root.join("uploads"),
            archive_dir: root.join("archives"),
            title_case_names: true,
            assign_stages: true,
            workspace_root: root,
        }
    }

    pub fn from_env() -> Self {
        let root = std::env::var("CPL_WORKSPACE_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."));
        let defaults = Self::for_workspace(root.clone());
        let path_var = |name: &str, default: PathBuf| {
            std::env::var(name)
                .map(|v| root.join(v))
                .unwrap_or(default)
        };
        Self {
            database_path: path_var("CPL_DATABASE_PATH", defaults.database_path),
            snapshot_dir: path_var("CPL_SNAPSHOT_DIR", defaults.snapshot_dir),
            keep_snapshots: std::env::var("CPL_KEEP_SNAPSHOTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.keep_snapshots),
            archive_uploads: env_flag("CPL_ARCHIVE_UPLOADS", defaults.archive_uploads),
            uploads_dir: path_var("CPL_UPLOADS_DIR", defaults.uploads_dir),
            archive_dir: path_var("CPL_ARCHIVE_DIR", defaults.archive_dir),
            title_case_names: env_flag("CPL_TITLE_CASE_NAMES", defaults.title_case_names),
            assign_stages: env_flag("CPL_ASSIGN_STAGES", defaults.assign_stages),
            workspace_root: root,
        }
    }

    pub fn snapshot_store(&self) -> SnapshotStore {
        SnapshotStore::new(&self.database_path, &self.snapshot_dir, self.keep_snapshots)
    }
}

fn env_flag(name: &str, default: bool) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "True" | "yes"))
        .unwrap_or(default)
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncRunRecord {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub status: String,
    pub database_path: String,
    pub snapshot_path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    Loaded,
    MissingExport,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceOutcome {
    pub source_id: String,
    pub display_name: String,
    pub export_path: String,
    pub status: SourceStatus,
    pub rows: usize,
    pub synonyms: SynonymReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncRunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub enabled_sources: usize,
    pub loaded_sources: usize,
    pub database_rows: usize,
    pub input_rows: usize,
    pub output_rows: usize,
    pub merged_clusters: usize,
    pub conflicting_fields: usize,
    pub late_links: usize,
    pub archived_files: usize,
    pub database_path: String,
    pub snapshot_path: String,
    pub reports_dir: String,
    pub parquet_manifest: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParquetManifest {
    pub schema_version: u32,
    pub files: Vec<ParquetManifestFile>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParquetManifestFile {
    pub name: String,
    pub path: String,
    pub sha256: String,
    pub bytes: u64,
}

pub trait MergeHook: Send + Sync {
    fn apply(&self, table: CandidateTable) -> Result<MergeOutcome>;
}

pub trait EnrichmentHook: Send + Sync {
    fn apply(&self, table: CandidateTable) -> Result<CandidateTable>;
}

impl MergeHook for DedupEngine {
    fn apply(&self, table: CandidateTable) -> Result<MergeOutcome> {
        Ok(self.merge(table)?)
    }
}

#[derive(Debug, Default)]
pub struct NoopEnrichmentHook;

impl EnrichmentHook for NoopEnrichmentHook {
    fn apply(&self, table: CandidateTable) -> Result<CandidateTable> {
        Ok(table)
    }
}

#[derive(Debug, Default)]
pub struct StageEnrichmentHook;

impl EnrichmentHook for StageEnrichmentHook {
    fn apply(&self, mut table: CandidateTable) -> Result<CandidateTable> {
        let report = assign_stages(&mut table);
        info!(
            call_stage = report.call_stage,
            scheduled = report.scheduled,
            rejected = report.rejected,
            kept = report.kept,
            "assigned stages"
        );
        Ok(table)
    }
}

pub struct SyncPipeline {
    config: PipelineConfig,
    store: SnapshotStore,
    synonyms: SynonymRules,
    merge: Box<dyn MergeHook>,
    enrichment: Box<dyn EnrichmentHook>,
}

impl SyncPipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        let store = config.snapshot_store();
        let synonyms = SynonymRules::from_workspace_root(&config.workspace_root)?;
        let enrichment: Box<dyn EnrichmentHook> = if config.assign_stages {
            Box::<StageEnrichmentHook>::default()
        } else {
            Box::<NoopEnrichmentHook>::default()
        };
        Ok(Self {
            config,
            store,
            synonyms,
            merge: Box::<DedupEngine>::default(),
            enrichment,
        })
    }

    pub fn with_hooks(mut self, merge: Box<dyn MergeHook>, enrichment: Box<dyn EnrichmentHook>) -> Self {
        self.merge = merge;
        self.enrichment = enrichment;
        self
    }

    pub fn with_synonyms(mut self, synonyms: SynonymRules) -> Self {
        self.synonyms = synonyms;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    pub async fn run_once(&self) -> Result<SyncRunSummary> {
        let started_at = Utc::now();
        let run_id = Uuid::new_v4();
        self.run(run_id, started_at)
            .instrument(info_span!("sync_run", %run_id))
            .await
    }

    async fn run(&self, run_id: Uuid, started_at: DateTime<Utc>) -> Result<SyncRunSummary> {
        let registry = self.load_source_registry().await?;
        let enabled_sources: Vec<_> = registry.sources.into_iter().filter(|s| s.enabled).collect();

        let mut tables = Vec::with_capacity(enabled_sources.len() + 1);
        let database_rows = match self.store.load_database().await? {
            Some(table) => {
                let rows = table.len();
                tables.push(table);
                rows
            }
            None => 0,
        };

        let mut outcomes = Vec::with_capacity(enabled_sources.len());
        for source in &enabled_sources {
            let (table, outcome) = self.load_source(source).await?;
            tables.extend(table);
            outcomes.push(outcome);
        }
        if tables.is_empty() {
            bail!(
                "nothing to process: no database at {} and no source exports found",
                self.store.database_path().display()
            );
        }

        let mut combined = CandidateTable::concat(tables);
        if self.config.title_case_names {
            let changed = standardize_names(&mut combined);
            debug!(changed, "standardized candidate names");
        }
        let MergeOutcome { table, report } = self.merge.apply(combined).context("merging candidate rows")?;
        let table = self.enrichment.apply(table).context("enriching merged candidates")?;

        let receipt = self.store.commit(&table, started_at).await?;
        let archived_files = if self.config.archive_uploads {
            archive_uploads(&self.config.uploads_dir, &self.config.archive_dir, started_at)
                .await?
                .map(|r| r.moved.len())
                .unwrap_or(0)
        } else {
            0
        };

        let finished_at = Utc::now();
        let record = SyncRunRecord {
            run_id,
            started_at,
            finished_at,
            status: "completed".to_string(),
            database_path: receipt.database.path.display().to_string(),
            snapshot_path: receipt.snapshot.path.display().to_string(),
        };
        let reports_dir = self.write_reports(&record, &report, &outcomes, &table).await?;
        let manifest_path = self.export_parquet_snapshots(&reports_dir, &table).await?;

        let loaded_sources = outcomes
            .iter()
            .filter(|o| o.status == SourceStatus::Loaded)
            .count();
        info!(
            loaded_sources,
            input_rows = report.input_rows,
            output_rows = report.output_rows,
            "sync run complete"
        );

        Ok(SyncRunSummary {
            run_id,
            started_at,
            finished_at,
            enabled_sources: enabled_sources.len(),
            loaded_sources,
            database_rows,
            input_rows: report.input_rows,
            output_rows: report.output_rows,
            merged_clusters: report.merged_clusters,
            conflicting_fields: report.conflicting_fields,
            late_links: report.late_links,
            archived_files,
            database_path: record.database_path,
            snapshot_path: record.snapshot_path,
            reports_dir: reports_dir.display().to_string(),
            parquet_manifest: manifest_path.display().to_string(),
        })
    }

    pub async fn load_source_registry(&self) -> Result<SourceRegistry> {
        let path = self.config.workspace_root.join(SOURCES_FILE);
        let text = fs::read_to_string(&path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }

    async fn load_source(&self, source: &SourceConfig) -> Result<(Option<CandidateTable>, SourceOutcome)> {
        let path = self.config.workspace_root.join(&source.export_path);
        let mut outcome = SourceOutcome {
            source_id: source.source_id.clone(),
            display_name: source.display_name.clone(),
            export_path: path.display().to_string(),
            status: SourceStatus::Loaded,
            rows: 0,
            synonyms: SynonymReport::default(),
        };
        if !fs::try_exists(&path)
            .await
            .with_context(|| format!("checking {}", path.display()))?
        {
            warn!(source_id = %source.source_id, path = %path.display(), "export not found; skipping source");
            outcome.status = SourceStatus::MissingExport;
            return Ok((None, outcome));
        }

        let adapter = adapter_for_source(&source.source_id, source.mapping.as_ref());
        let raw = read_table_skipping(&path, adapter.skip_rows()).await?;
        let mut table = adapter
            .normalize(raw)
            .with_context(|| format!("normalizing export for {}", source.source_id))?;
        outcome.synonyms = self.synonyms.apply(&mut table);
        outcome.rows = table.len();
        info!(source_id = %source.source_id, rows = outcome.rows, "loaded source export");
        Ok((Some(table), outcome))
    }

    async fn write_reports(
        &self,
        record: &SyncRunRecord,
        report: &MergeReport,
        outcomes: &[SourceOutcome],
        table: &CandidateTable,
    ) -> Result<PathBuf> {
        let reports_dir = self
            .config
            .workspace_root
            .join("reports")
            .join(record.run_id.to_string());
        fs::create_dir_all(&reports_dir)
            .await
            .with_context(|| format!("creating {}", reports_dir.display()))?;

        let tag_counts = source_tag_counts(table);
        let stage_counts = stage_counts(table);
        let bullet_list = |counts: &BTreeMap<String, usize>| {
            if counts.is_empty() {
                return "- none".to_string();
            }
            counts
                .iter()
                .map(|(k, v)| format!("- {k}: {v}"))
                .collect::<Vec<_>>()
                .join("\n")
        };

        let summary = format!(
            "# CPL Run Summary\n\n- Run ID: `{}`\n- Started: {}\n- Finished: {}\n- Sources loaded: {} of {}\n- Input rows: {}\n- Output rows: {}\n- Merged clusters: {}\n- Largest cluster: {}\n- Conflicting fields: {}\n- Late links: {}\n- Rows missing name: {}\n- Database: `{}`\n\n## Candidates by Source\n{}\n\n## Stages\n{}\n",
            record.run_id,
            record.started_at,
            record.finished_at,
            outcomes.iter().filter(|o| o.status == SourceStatus::Loaded).count(),
            outcomes.len(),
            report.input_rows,
            report.output_rows,
            report.merged_clusters,
            report.largest_cluster,
            report.conflicting_fields,
            report.late_links,
            report.rows_missing_name,
            record.database_path,
            bullet_list(&tag_counts),
            bullet_list(&stage_counts),
        );
        fs::write(reports_dir.join(RUN_SUMMARY_FILE), summary)
            .await
            .with_context(|| format!("writing {RUN_SUMMARY_FILE}"))?;

        let report_json = serde_json::to_vec_pretty(&serde_json::json!({
            "run": record,
            "merge": report,
            "sources": outcomes,
            "candidates_by_source": tag_counts,
            "stages": stage_counts,
        }))
        .context("serializing run report")?;
        fs::write(reports_dir.join(RUN_REPORT_FILE), report_json)
            .await
            .with_context(|| format!("writing {RUN_REPORT_FILE}"))?;

        Ok(reports_dir)
    }

    async fn export_parquet_snapshots(&self, reports_dir: &Path, table: &CandidateTable) -> Result<PathBuf> {
        let snapshot_dir = reports_dir.join("snapshots");
        fs::create_dir_all(&snapshot_dir)
            .await
            .with_context(|| format!("creating {}", snapshot_dir.display()))?;

        let candidates_path = snapshot_dir.join("candidates.parquet");
        let sources_path = snapshot_dir.join("source_counts.parquet");
        write_candidates_parquet(&candidates_path, table)?;
        write_source_counts_parquet(&sources_path, &source_tag_counts(table))?;

        let manifest = ParquetManifest {
            schema_version: 1,
            files: vec![
                manifest_entry("candidates", reports_dir, &candidates_path)?,
                manifest_entry("source_counts", reports_dir, &sources_path)?,
            ],
        };

        let manifest_path = snapshot_dir.join("manifest.json");
        let bytes = serde_json::to_vec_pretty(&manifest).context("serializing parquet manifest")?;
        fs::write(&manifest_path, bytes)
            .await
            .with_context(|| format!("writing {}", manifest_path.display()))?;
        Ok(manifest_path)
    }
}

pub async fn run_sync_once_from_env() -> Result<SyncRunSummary> {
    let config = PipelineConfig::from_env();
    let pipeline = SyncPipeline::new(config)?;
    pipeline.run_once().await
}

#[derive(Debug, Clone, Serialize)]
pub struct DedupFileSummary {
    pub input: PathBuf,
    pub output: PathBuf,
    pub input_rows: usize,
    pub output_rows: usize,
    pub keep_first: bool,
    pub report: Option<MergeReport>,
}

impl DedupFileSummary {
    pub fn removed(&self) -> usize {
        self.input_rows - self.output_rows
    }
}

/// Deduplicates one CSV file. Writes back over `input` unless `output` is
/// given. `keep_first` drops exact repeats instead of merging clusters.
pub async fn dedup_file(input: &Path, output: Option<&Path>, keep_first: bool) -> Result<DedupFileSummary> {
    let mut table = read_table(input).await?;
    canonicalize_identity_headers(&mut table);
    let input_rows = table.len();

    let (table, report) = if keep_first {
        let (table, removed) =
            drop_exact_duplicates(table).with_context(|| format!("deduplicating {}", input.display()))?;
        debug!(removed, "dropped exact duplicates");
        (table, None)
    } else {
        let outcome = merge(table).with_context(|| format!("merging {}", input.display()))?;
        (outcome.table, Some(outcome.report))
    };

    let output = output.unwrap_or(input);
    write_table_atomic(output, &table).await?;
    info!(
        input = %input.display(),
        output = %output.display(),
        input_rows,
        output_rows = table.len(),
        "deduplicated file"
    );
    Ok(DedupFileSummary {
        input: input.to_path_buf(),
        output: output.to_path_buf(),
        input_rows,
        output_rows: table.len(),
        keep_first,
        report,
    })
}

/// Renames headers whose snake-case form is exactly an identity column, so
/// `Name` becomes `name` while `Phone Number` is left alone.
fn canonicalize_identity_headers(table: &mut CandidateTable) {
    let renames: Vec<(String, String)> = table
        .columns()
        .iter()
        .filter_map(|column| {
            let canonical = canonical_header(column);
            (KNOWN_COLUMNS.contains(&canonical.as_str()) && canonical != *column)
                .then(|| (column.clone(), canonical))
        })
        .collect();
    for (from, to) in renames {
        table.rename_column(&from, &to);
    }
}

pub fn report_runs_markdown(runs: usize, workspace_root: Option<PathBuf>) -> Result<String> {
    let root = workspace_root.unwrap_or_else(|| PathBuf::from("."));
    let reports_root = root.join("reports");
    let mut dirs = std::fs::read_dir(&reports_root)
        .with_context(|| format!("reading {}", reports_root.display()))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().join(RUN_REPORT_FILE).exists())
        .map(|entry| -> Result<(DateTime<Utc>, PathBuf, serde_json::Value)> {
            let path = entry.path().join(RUN_REPORT_FILE);
            let value: serde_json::Value = serde_json::from_str(
                &std::fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?,
            )
            .with_context(|| format!("parsing {}", path.display()))?;
            let started_at = value
                .pointer("/run/started_at")
                .and_then(|v| v.as_str())
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or(DateTime::<Utc>::MIN_UTC);
            Ok((started_at, entry.path(), value))
        })
        .collect::<Result<Vec<_>>>()?;
    dirs.sort_by(|a, b| b.0.cmp(&a.0));

    let mut lines = vec!["# CPL Run Report".to_string(), String::new()];
    for (_, dir, value) in dirs.into_iter().take(runs.max(1)) {
        let run_id = dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let count = |pointer: &str| value.pointer(pointer).and_then(|v| v.as_u64()).unwrap_or(0);
        let database = value
            .pointer("/run/database_path")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        let summary_path = dir.join(RUN_SUMMARY_FILE);
        let manifest_path = dir.join("snapshots").join("manifest.json");

        lines.push(format!("## Run `{run_id}`"));
        lines.push(format!(
            "- rows: {} in, {} out",
            count("/merge/input_rows"),
            count("/merge/output_rows")
        ));
        lines.push(format!("- merged clusters: {}", count("/merge/merged_clusters")));
        lines.push(format!("- conflicting fields: {}", count("/merge/conflicting_fields")));
        lines.push(format!("- late links: {}", count("/merge/late_links")));
        if summary_path.exists() {
            lines.push(format!("- summary: `{}`", summary_path.display()));
        }
        if manifest_path.exists() {
            lines.push(format!("- parquet manifest: `{}`", manifest_path.display()));
        }
        lines.push(format!("- database: `{database}`"));
        lines.push(String::new());
    }

    Ok(lines.join("\n"))
}

fn source_tag_counts(table: &CandidateTable) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for row in table.rows() {
        for tag in row.source_tags() {
            *counts.entry(tag).or_default() += 1;
        }
    }
    counts
}

fn stage_counts(table: &CandidateTable) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    if !table.has_column(STAGE) {
        return counts;
    }
    for row in table.rows() {
        if let Some(stage) = row.get(STAGE).to_text() {
            *counts.entry(stage).or_default() += 1;
        }
    }
    counts
}

fn write_parquet(path: &Path, batch: RecordBatch) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None)
        .with_context(|| format!("opening parquet writer {}", path.display()))?;
    writer
        .write(&batch)
        .with_context(|| format!("writing parquet batch {}", path.display()))?;
    writer
        .close()
        .with_context(|| format!("closing parquet writer {}", path.display()))?;
    Ok(())
}

/// Every column as nullable UTF-8, in table order.
fn write_candidates_parquet(path: &Path, table: &CandidateTable) -> Result<()> {
    let schema = Arc::new(Schema::new(
        table
            .columns()
            .iter()
            .map(|c| ArrowField::new(c.as_str(), DataType::Utf8, true))
            .collect::<Vec<_>>(),
    ));
    let arrays = table
        .columns()
        .iter()
        .map(|c| {
            let values = table.rows().iter().map(|r| r.get(c).to_text()).collect::<Vec<_>>();
            Arc::new(StringArray::from(values)) as ArrayRef
        })
        .collect::<Vec<_>>();
    let batch = RecordBatch::try_new(schema, arrays).context("building candidates record batch")?;
    write_parquet(path, batch)
}

fn write_source_counts_parquet(path: &Path, counts: &BTreeMap<String, usize>) -> Result<()> {
    let schema = Arc::new(Schema::new(vec![
        ArrowField::new("source", DataType::Utf8, false),
        ArrowField::new("candidates", DataType::UInt32, false),
    ]));
    let sources = StringArray::from(counts.keys().map(|k| Some(k.as_str())).collect::<Vec<_>>());
    let candidates = UInt32Array::from(
        counts
            .values()
            .map(|v| u32::try_from(*v).unwrap_or(u32::MAX))
            .collect::<Vec<_>>(),
    );
    let batch = RecordBatch::try_new(schema, vec![Arc::new(sources), Arc::new(candidates)])
        .context("building source counts record batch")?;
    write_parquet(path, batch)
}

fn manifest_entry(name: &str, reports_dir: &Path, path: &Path) -> Result<ParquetManifestFile> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let rel = path
        .strip_prefix(reports_dir)
        .unwrap_or(path)
        .display()
        .to_string();
    Ok(ParquetManifestFile {
        name: name.to_string(),
        path: rel,
        sha256: sha256_hex(&bytes),
        bytes: bytes.len() as u64,
    })
}
