//! CSV table persistence, atomic file writes and snapshot retention for CPL.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, NaiveDateTime, Utc};
use cpl_core::{CandidateRecord, CandidateTable, Value};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument};
use uuid::Uuid;

pub const CRATE_NAME: &str = "cpl-storage";

pub const SNAPSHOT_PREFIX: &str = "candidates_";
pub const SNAPSHOT_STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
pub const UPLOADS_PLACEHOLDER: &str = "README.txt";

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("snapshot {0} not found")]
    SnapshotNotFound(String),
    #[error("export has no header row")]
    MissingHeader,
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

pub fn parse_csv_table(bytes: &[u8]) -> Result<CandidateTable, StorageError> {
    parse_csv_table_skipping(bytes, 0)
}

/// Parses CSV whose header row follows `skip_rows` leading lines (some
/// vendor exports put a banner line above the header). Empty cells are null,
/// blank headers become `column_<n>` and repeated headers get a `_<n>` suffix.
pub fn parse_csv_table_skipping(bytes: &[u8], skip_rows: usize) -> Result<CandidateTable, StorageError> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);
    let mut records = reader.records().skip(skip_rows);

    let header = records.next().ok_or(StorageError::MissingHeader)??;
    let columns = disambiguate_headers(header.iter());

    let mut rows = Vec::new();
    for record in records {
        let record = record?;
        let mut row = CandidateRecord::default();
        for (column, cell) in columns.iter().zip(record.iter()) {
            row.set(column, Value::text(cell));
        }
        rows.push(row);
    }
    Ok(CandidateTable::from_parts(columns, rows))
}

fn disambiguate_headers<'a>(headers: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    headers
        .enumerate()
        .map(|(i, raw)| {
            let base = match raw.trim() {
                "" => format!("column_{}", i + 1),
                trimmed => trimmed.to_string(),
            };
            let count = seen.entry(base.clone()).or_default();
            *count += 1;
            if *count == 1 {
                base
            } else {
                format!("{base}_{count}")
            }
        })
        .collect()
}

/// Renders the table's columns in order; nulls become empty cells.
pub fn render_csv_table(table: &CandidateTable) -> Result<Vec<u8>, StorageError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(table.columns())?;
    for row in table.rows() {
        writer.write_record(table.columns().iter().map(|c| row.get(c).to_string()))?;
    }
    writer.into_inner().map_err(|e| StorageError::Io(e.into_error()))
}

pub async fn read_table(path: impl AsRef<Path>) -> anyhow::Result<CandidateTable> {
    read_table_skipping(path, 0).await
}

pub async fn read_table_skipping(path: impl AsRef<Path>, skip_rows: usize) -> anyhow::Result<CandidateTable> {
    let path = path.as_ref();
    let bytes = fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    parse_csv_table_skipping(&bytes, skip_rows).with_context(|| format!("parsing {}", path.display()))
}

#[derive(Debug, Clone)]
pub struct StoredTable {
    pub content_hash: String,
    pub path: PathBuf,
    pub byte_size: usize,
    pub rows: usize,
    /// The file already held identical bytes; nothing was written.
    pub unchanged: bool,
}

pub async fn write_table_atomic(path: impl AsRef<Path>, table: &CandidateTable) -> anyhow::Result<StoredTable> {
    let path = path.as_ref();
    let bytes = render_csv_table(table).with_context(|| format!("rendering {}", path.display()))?;
    let mut stored = write_bytes_atomic(path, &bytes).await?;
    stored.rows = table.len();
    Ok(stored)
}

/// Replaces `path` via a temp file in the same directory and a rename, so
/// readers never observe a partially written file.
pub async fn write_bytes_atomic(path: &Path, bytes: &[u8]) -> anyhow::Result<StoredTable> {
    let content_hash = sha256_hex(bytes);
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent)
        .await
        .with_context(|| format!("creating directory {}", parent.display()))?;

    let stored = |unchanged| StoredTable {
        content_hash: content_hash.clone(),
        path: path.to_path_buf(),
        byte_size: bytes.len(),
        rows: 0,
        unchanged,
    };

    if fs::try_exists(path)
        .await
        .with_context(|| format!("checking {}", path.display()))?
    {
        let existing = fs::read(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        if sha256_hex(&existing) == content_hash {
            debug!(path = %path.display(), "content unchanged; skipping write");
            return Ok(stored(true));
        }
    }

    let temp_path = parent.join(format!(".{}.{}.tmp", Uuid::new_v4(), bytes.len()));
    let mut file = fs::OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(&temp_path)
        .await
        .with_context(|| format!("opening temp file {}", temp_path.display()))?;
    file.write_all(bytes)
        .await
        .with_context(|| format!("writing temp file {}", temp_path.display()))?;
    file.flush()
        .await
        .with_context(|| format!("flushing temp file {}", temp_path.display()))?;
    drop(file);

    if let Err(err) = fs::rename(&temp_path, path).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(err).with_context(|| {
            format!("renaming temp file {} -> {}", temp_path.display(), path.display())
        });
    }
    Ok(stored(false))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotEntry {
    pub file_name: String,
    pub path: PathBuf,
    pub taken_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct CommitReceipt {
    pub database: StoredTable,
    pub snapshot: StoredTable,
    pub pruned: Vec<PathBuf>,
}

/// The candidate database file plus its timestamped history.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    database_path: PathBuf,
    snapshot_dir: PathBuf,
    keep_last: usize,
}

impl SnapshotStore {
    pub fn new(database_path: impl Into<PathBuf>, snapshot_dir: impl Into<PathBuf>, keep_last: usize) -> Self {
        Self {
            database_path: database_path.into(),
            snapshot_dir: snapshot_dir.into(),
            keep_last: keep_last.max(1),
        }
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    pub fn snapshot_dir(&self) -> &Path {
        &self.snapshot_dir
    }

    pub fn snapshot_file_name(at: DateTime<Utc>) -> String {
        format!("{SNAPSHOT_PREFIX}{}.csv", at.format(SNAPSHOT_STAMP_FORMAT))
    }

    fn parse_snapshot_stamp(file_name: &str) -> Option<DateTime<Utc>> {
        let stamp = file_name.strip_prefix(SNAPSHOT_PREFIX)?.strip_suffix(".csv")?;
        NaiveDateTime::parse_from_str(stamp, SNAPSHOT_STAMP_FORMAT)
            .ok()
            .map(|naive| naive.and_utc())
    }

    /// `None` when no run has written the database yet.
    pub async fn load_database(&self) -> anyhow::Result<Option<CandidateTable>> {
        if !fs::try_exists(&self.database_path)
            .await
            .with_context(|| format!("checking {}", self.database_path.display()))?
        {
            return Ok(None);
        }
        read_table(&self.database_path).await.map(Some)
    }

    /// Replaces the database and records a timestamped copy, then prunes
    /// history to the newest `keep_last` snapshots.
    #[instrument(name = "snapshot_commit", skip_all, fields(rows = table.len()))]
    pub async fn commit(&self, table: &CandidateTable, at: DateTime<Utc>) -> anyhow::Result<CommitReceipt> {
        let database = write_table_atomic(&self.database_path, table).await?;
        let snapshot_path = self.snapshot_dir.join(Self::snapshot_file_name(at));
        let snapshot = write_table_atomic(&snapshot_path, table).await?;
        let pruned = self.prune().await?;

        info!(
            database = %database.path.display(),
            snapshot = %snapshot.path.display(),
            pruned = pruned.len(),
            "committed candidate database"
        );
        Ok(CommitReceipt {
            database,
            snapshot,
            pruned,
        })
    }

    /// Oldest first.
    pub async fn list_snapshots(&self) -> anyhow::Result<Vec<SnapshotEntry>> {
        if !fs::try_exists(&self.snapshot_dir)
            .await
            .with_context(|| format!("checking {}", self.snapshot_dir.display()))?
        {
            return Ok(Vec::new());
        }
        let mut entries = fs::read_dir(&self.snapshot_dir)
            .await
            .with_context(|| format!("reading {}", self.snapshot_dir.display()))?;
        let mut out = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name().to_string_lossy().to_string();
            if !file_name.starts_with(SNAPSHOT_PREFIX) || !file_name.ends_with(".csv") {
                continue;
            }
            out.push(SnapshotEntry {
                taken_at: Self::parse_snapshot_stamp(&file_name),
                path: entry.path(),
                file_name,
            });
        }
        out.sort_by(|a, b| {
            a.taken_at
                .cmp(&b.taken_at)
                .then_with(|| a.file_name.cmp(&b.file_name))
        });
        Ok(out)
    }

    pub async fn prune(&self) -> anyhow::Result<Vec<PathBuf>> {
        let snapshots = self.list_snapshots().await?;
        let excess = snapshots.len().saturating_sub(self.keep_last);
        let mut removed = Vec::with_capacity(excess);
        for entry in snapshots.into_iter().take(excess) {
            fs::remove_file(&entry.path)
                .await
                .with_context(|| format!("removing {}", entry.path.display()))?;
            removed.push(entry.path);
        }
        Ok(removed)
    }

    /// Copies a snapshot back over the database.
    pub async fn restore(&self, file_name: &str) -> anyhow::Result<StoredTable> {
        let entry = self
            .list_snapshots()
            .await?
            .into_iter()
            .find(|e| e.file_name == file_name)
            .ok_or_else(|| StorageError::SnapshotNotFound(file_name.to_string()))?;
        let table = read_table(&entry.path).await?;
        write_table_atomic(&self.database_path, &table).await
    }
}

#[derive(Debug, Clone)]
pub struct ArchiveReceipt {
    pub archive_dir: PathBuf,
    pub moved: Vec<PathBuf>,
}

/// Moves processed exports out of `uploads_dir` into
/// `archive_root/uploads_<stamp>/` and leaves a placeholder behind.
pub async fn archive_uploads(
    uploads_dir: &Path,
    archive_root: &Path,
    at: DateTime<Utc>,
) -> anyhow::Result<Option<ArchiveReceipt>> {
    if !fs::try_exists(uploads_dir)
        .await
        .with_context(|| format!("checking {}", uploads_dir.display()))?
    {
        return Ok(None);
    }
    let archive_dir = archive_root.join(format!("uploads_{}", at.format(SNAPSHOT_STAMP_FORMAT)));
    fs::create_dir_all(&archive_dir)
        .await
        .with_context(|| format!("creating {}", archive_dir.display()))?;

    let mut entries = fs::read_dir(uploads_dir)
        .await
        .with_context(|| format!("reading {}", uploads_dir.display()))?;
    let mut moved = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() || entry.file_name() == UPLOADS_PLACEHOLDER {
            continue;
        }
        let dest = archive_dir.join(entry.file_name());
        if fs::rename(entry.path(), &dest).await.is_err() {
            fs::copy(entry.path(), &dest)
                .await
                .with_context(|| format!("copying {} -> {}", entry.path().display(), dest.display()))?;
            fs::remove_file(entry.path())
                .await
                .with_context(|| format!("removing {}", entry.path().display()))?;
        }
        moved.push(dest);
    }
    moved.sort();

    fs::write(
        uploads_dir.join(UPLOADS_PLACEHOLDER),
        "Place new data files in this directory for processing.\n",
    )
    .await
    .context("writing uploads placeholder")?;

    Ok(Some(ArchiveReceipt { archive_dir, moved }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, h, m, s).single().expect("ts")
    }

    fn small_table() -> CandidateTable {
        parse_csv_table(b"name,email,phone\nJane Doe,jane@x.com,(555) 123-4567\nJohn,,\n").expect("parse")
    }

    #[test]
    fn hashing_is_stable() {
        assert_eq!(
            sha256_hex(b"hello world"),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn empty_cells_parse_as_null() {
        let table = small_table();
        assert_eq!(table.columns(), ["name", "email", "phone"]);
        assert_eq!(table.len(), 2);
        assert!(table.rows()[1].email.is_none());
        assert_eq!(table.rows()[0].phone.as_deref(), Some("(555) 123-4567"));
    }

    #[test]
    fn headers_are_disambiguated_and_banner_rows_skipped() {
        let csv = "\u{feff}Exported by vendor\nName,Name,,Email\nJane,J.,x,jane@x.com\n";
        let table = parse_csv_table_skipping(csv.as_bytes(), 1).expect("parse");
        assert_eq!(table.columns(), ["Name", "Name_2", "column_3", "Email"]);
        assert_eq!(table.rows()[0].get("Name_2").to_string(), "J.");
    }

    #[test]
    fn missing_header_is_an_error() {
        let err = parse_csv_table(b"").unwrap_err();
        assert!(matches!(err, StorageError::MissingHeader));
    }

    #[test]
    fn render_quotes_cells_and_keeps_column_order() {
        let table = parse_csv_table(b"name,notes\n\"Doe, Jane\",\"said \"\"hi\"\"\"\n").expect("parse");
        let out = String::from_utf8(render_csv_table(&table).expect("render")).expect("utf8");
        assert_eq!(out, "name,notes\n\"Doe, Jane\",\"said \"\"hi\"\"\"\n");
    }

    #[tokio::test]
    async fn atomic_write_detects_unchanged_content() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("candidates.csv");
        let table = small_table();

        let first = write_table_atomic(&path, &table).await.expect("first write");
        let second = write_table_atomic(&path, &table).await.expect("second write");
        assert!(!first.unchanged);
        assert!(second.unchanged);
        assert_eq!(first.content_hash, second.content_hash);
        assert_eq!(first.rows, 2);

        let reread = read_table(&path).await.expect("reread");
        assert_eq!(reread, table);
    }

    #[tokio::test]
    async fn commit_keeps_only_the_newest_snapshots() {
        let dir = tempdir().expect("tempdir");
        let store = SnapshotStore::new(dir.path().join("candidates.csv"), dir.path().join("snapshots"), 2);
        assert!(store.load_database().await.expect("load").is_none());

        let table = small_table();
        for minute in [1, 2, 3] {
            store.commit(&table, at(9, minute, 0)).await.expect("commit");
        }

        let names: Vec<_> = store
            .list_snapshots()
            .await
            .expect("list")
            .into_iter()
            .map(|e| e.file_name)
            .collect();
        assert_eq!(names, vec!["candidates_20260302_090200.csv", "candidates_20260302_090300.csv"]);
        assert_eq!(store.load_database().await.expect("load"), Some(table));
    }

    #[tokio::test]
    async fn restore_replaces_database_and_rejects_unknown_snapshots() {
        let dir = tempdir().expect("tempdir");
        let store = SnapshotStore::new(dir.path().join("candidates.csv"), dir.path().join("snapshots"), 5);
        let old = small_table();
        store.commit(&old, at(8, 0, 0)).await.expect("commit old");
        let newer = parse_csv_table(b"name\nOnly One\n").expect("parse");
        store.commit(&newer, at(9, 0, 0)).await.expect("commit new");

        store
            .restore("candidates_20260302_080000.csv")
            .await
            .expect("restore");
        assert_eq!(store.load_database().await.expect("load"), Some(old));

        let err = store.restore("candidates_19990101_000000.csv").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StorageError>(),
            Some(StorageError::SnapshotNotFound(_))
        ));
    }

    #[tokio::test]
    async fn archive_moves_uploads_and_leaves_placeholder() {
        let dir = tempdir().expect("tempdir");
        let uploads = dir.path().join("uploads");
        std::fs::create_dir_all(&uploads).expect("mkdir");
        std::fs::write(uploads.join("indeed_us.csv"), "name\nA\n").expect("write");

        let receipt = archive_uploads(&uploads, &dir.path().join("archives"), at(10, 0, 0))
            .await
            .expect("archive")
            .expect("uploads dir exists");
        assert_eq!(receipt.moved.len(), 1);
        assert!(receipt.archive_dir.ends_with("uploads_20260302_100000"));
        assert!(receipt.moved[0].exists());
        assert!(!uploads.join("indeed_us.csv").exists());
        assert!(uploads.join(UPLOADS_PLACEHOLDER).exists());

        let missing = archive_uploads(&dir.path().join("nope"), &dir.path().join("archives"), at(10, 0, 0))
            .await
            .expect("archive");
        assert!(missing.is_none());
    }
}
