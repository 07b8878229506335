use anyhow::{anyhow, bail, Context};
use rusqlite::{Connection, OpenFlags};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Cursor, Read, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const MANIFEST_ENTRY: &str = "manifest.json";
const DB_ENTRY: &str = "db/termsd.sqlite3";
const META_WORKSPACE_ENTRY: &str = "meta/workspace.json";
const DB_FILE_NAME: &str = "termsd.sqlite3";
const IMPORT_TMP_NAME: &str = "termsd.sqlite3.importing";
const ZIP_MAGIC: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];
const SQLITE_MAGIC: &[u8; 16] = b"SQLite format 3\0";
pub const BUNDLE_FORMAT_V1: &str = "termsd-workspace-v1";
pub const LEGACY_SQLITE_FORMAT: &str = "legacy-sqlite3";

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub bundle_format: String,
    pub entry_count: usize,
    pub db_sha256: String,
}

#[derive(Debug, Clone)]
pub struct ImportSummary {
    pub bundle_format_detected: String,
    pub term_count: i64,
}

fn sha256_hex(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

struct BundleWriter {
    zip: ZipWriter<File>,
    opts: FileOptions,
    entries: usize,
}

impl BundleWriter {
    fn create(out_path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {}", parent.display()))?;
        }
        let file = File::create(out_path)
            .with_context(|| format!("failed to create output file {}", out_path.display()))?;
        Ok(Self {
            zip: ZipWriter::new(file),
            opts: FileOptions::default().compression_method(CompressionMethod::Deflated),
            entries: 0,
        })
    }

    fn add_bytes(&mut self, name: &str, bytes: &[u8]) -> anyhow::Result<()> {
        self.zip
            .start_file(name, self.opts)
            .with_context(|| format!("failed to start entry {}", name))?;
        self.zip
            .write_all(bytes)
            .with_context(|| format!("failed to write entry {}", name))?;
        self.entries += 1;
        Ok(())
    }

    fn add_json(&mut self, name: &str, value: &serde_json::Value) -> anyhow::Result<()> {
        let text = serde_json::to_string_pretty(value)
            .with_context(|| format!("failed to serialize {}", name))?;
        self.add_bytes(name, text.as_bytes())
    }

    fn finish(mut self) -> anyhow::Result<usize> {
        self.zip.finish().context("failed to finalize zip bundle")?;
        Ok(self.entries)
    }
}

pub fn export_workspace_bundle(
    workspace_path: &Path,
    out_path: &Path,
) -> anyhow::Result<ExportSummary> {
    let db_path = workspace_path.join(DB_FILE_NAME);
    if !db_path.is_file() {
        bail!("workspace database not found: {}", db_path.display());
    }
    let db_bytes = std::fs::read(&db_path)
        .with_context(|| format!("failed to read database {}", db_path.display()))?;
    let db_sha256 = sha256_hex(&db_bytes);
    let exported_at = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    let mut bundle = BundleWriter::create(out_path)?;
    bundle.add_json(
        MANIFEST_ENTRY,
        &json!({
            "format": BUNDLE_FORMAT_V1,
            "version": 1,
            "appVersion": env!("CARGO_PKG_VERSION"),
            "exportedAt": exported_at,
            "dbSha256": db_sha256,
        }),
    )?;
    bundle.add_bytes(DB_ENTRY, &db_bytes)?;
    bundle.add_json(
        META_WORKSPACE_ENTRY,
        &json!({ "sourceWorkspace": workspace_path.to_string_lossy() }),
    )?;
    let entry_count = bundle.finish()?;

    Ok(ExportSummary {
        bundle_format: BUNDLE_FORMAT_V1.to_string(),
        entry_count,
        db_sha256,
    })
}

/// Database bytes carried by a bundle, after the format and checksum checks.
fn unpack_bundle(raw: Vec<u8>) -> anyhow::Result<Vec<u8>> {
    let mut archive = ZipArchive::new(Cursor::new(raw)).context("invalid zip archive")?;

    let mut manifest_text = String::new();
    archive
        .by_name(MANIFEST_ENTRY)
        .context("bundle missing manifest.json")?
        .read_to_string(&mut manifest_text)
        .context("failed to read manifest.json")?;
    let manifest: serde_json::Value =
        serde_json::from_str(&manifest_text).context("manifest.json is invalid JSON")?;
    let format = manifest.get("format").and_then(|v| v.as_str()).unwrap_or("");
    if format != BUNDLE_FORMAT_V1 {
        bail!("unsupported bundle format: {}", format);
    }
    let expected_sha = manifest
        .get("dbSha256")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow!("manifest.json missing dbSha256"))?;

    let mut db_bytes = Vec::new();
    archive
        .by_name(DB_ENTRY)
        .context("bundle missing db/termsd.sqlite3")?
        .read_to_end(&mut db_bytes)
        .context("failed to extract database entry")?;
    let actual_sha = sha256_hex(&db_bytes);
    if actual_sha != expected_sha {
        bail!(
            "database checksum mismatch: expected {}, got {}",
            expected_sha,
            actual_sha
        );
    }
    Ok(db_bytes)
}

/// Opens a staged copy read-only and checks it carries a readable terms table.
fn verify_terms_database(path: &Path) -> anyhow::Result<i64> {
    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .context("failed to open imported database")?;
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM terms", [], |r| r.get(0))
        .context("imported database has no readable terms table")?;
    Ok(count)
}

/// Replaces the workspace database with a bundle or a bare SQLite file.
///
/// The candidate is staged next to the live database and verified first; the
/// live file is only replaced once the staged copy opens and has a terms table.
pub fn import_workspace_bundle(
    in_path: &Path,
    workspace_path: &Path,
) -> anyhow::Result<ImportSummary> {
    let raw = std::fs::read(in_path)
        .with_context(|| format!("failed to read input file {}", in_path.display()))?;

    let (format, db_bytes) = if raw.starts_with(&ZIP_MAGIC) {
        (BUNDLE_FORMAT_V1, unpack_bundle(raw)?)
    } else if raw.starts_with(SQLITE_MAGIC) {
        (LEGACY_SQLITE_FORMAT, raw)
    } else {
        bail!(
            "{} is neither a workspace bundle nor a SQLite database",
            in_path.display()
        );
    };
    if !db_bytes.starts_with(SQLITE_MAGIC) {
        bail!("bundle database entry is not a SQLite database");
    }

    std::fs::create_dir_all(workspace_path)
        .with_context(|| format!("failed to create workspace {}", workspace_path.display()))?;
    let staged = workspace_path.join(IMPORT_TMP_NAME);
    std::fs::write(&staged, &db_bytes)
        .with_context(|| format!("failed to stage database {}", staged.display()))?;

    let term_count = match verify_terms_database(&staged) {
        Ok(n) => n,
        Err(e) => {
            let _ = std::fs::remove_file(&staged);
            return Err(e);
        }
    };

    // rename replaces the destination atomically on the same filesystem.
    let dst = workspace_path.join(DB_FILE_NAME);
    std::fs::rename(&staged, &dst)
        .with_context(|| format!("failed to move imported database to {}", dst.display()))?;

    Ok(ImportSummary {
        bundle_format_detected: format.to_string(),
        term_count,
    })
}
