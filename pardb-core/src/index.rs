//! Crash-tolerant persistent index: `path -> FileRecord` plus
//! `digest -> VaultEntry`, stored as CSV with a JSON metadata header and a
//! trailing checksum sentinel.
//!
//! File layout:
//! ```text
//! {"version":[1,1],"hash":"sha512","truncate":64,"mtime":<unix-seconds>}
//! kind,a,b,c,d
//! R,<path>,<digest>,<mtime>,<size>
//! V,<file_digest>,<artifact_name>,<artifact_digest>,
//! #CHECKSUM:<hex>
//! ```
//! Ported from the original's `csvbase.py` (JSON meta line, header line,
//! data rows, running-digest checksum trailer) generalized to carry both
//! logical maps (`hexbase.py`'s `self.data`/`self.pfiles`) in one file via
//! the `kind` discriminant column.

use crate::record::{FileRecord, VaultEntry};
use crate::rotate::rotate;
use anyhow::{bail, Context, Result};
use sha2::Digest;
use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub const BAK_NUM: usize = 8;
const ROTATE_SEP: &str = ".";
const HEADER: [&str; 5] = ["kind", "a", "b", "c", "d"];

const CURRENT_VERSION: (u32, u32) = (1, 1);

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct IndexMeta {
    pub version: (u32, u32),
    pub hash: String,
    pub truncate: usize,
    pub encoding: String,
    pub mtime: f64,
}

impl Default for IndexMeta {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            hash: "sha512".to_string(),
            truncate: crate::hash::DEFAULT_TRUNCATE,
            encoding: "hex".to_string(),
            mtime: 0.0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Index {
    pub meta: IndexMeta,
    pub records: HashMap<String, FileRecord>,
    pub vault: HashMap<String, VaultEntry>,
    dirty: bool,
}

impl Index {
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn index_path(basedir: &Path) -> PathBuf {
        basedir.join("database.csv")
    }

    /// Load the index, trying the primary file and then each rotated backup
    /// in turn. A file that fails to parse (truncated write, checksum
    /// mismatch, unreadable) is logged and skipped rather than treated as
    /// fatal; if nothing loads, the corrupt primary (if any) is rotated out
    /// of the way and an empty index is returned, matching the "never
    /// overwrite, never fabricate" error policy.
    pub fn load(basedir: &Path) -> Result<Self> {
        let path = Self::index_path(basedir);
        let backups = rotate(&path, BAK_NUM, ROTATE_SEP, false);
        for candidate in &backups {
            if !candidate.exists() {
                continue;
            }
            match Self::load_one(candidate) {
                Ok(mut idx) => {
                    idx.migrate()?;
                    return Ok(idx);
                }
                Err(err) => {
                    tracing::warn!(path = %candidate.display(), error = %err, "failed to load index candidate");
                }
            }
        }
        if path.exists() {
            tracing::warn!(path = %path.display(), "no valid index backup found, rotating corrupt primary aside");
            rotate(&path, BAK_NUM, ROTATE_SEP, true);
        }
        Ok(Index::default())
    }

    fn load_one(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
        parse_index_bytes(&bytes)
    }

    /// Rewrite the index if `min_interval` has elapsed since the last save.
    /// Pass [`Duration::ZERO`] to force an unconditional save. Returns
    /// whether a write actually happened.
    pub fn save(&mut self, basedir: &Path, min_interval: Duration) -> Result<bool> {
        let now = now_secs();
        if !min_interval.is_zero() && now - self.meta.mtime < min_interval.as_secs_f64() {
            return Ok(false);
        }
        let path = Self::index_path(basedir);
        std::fs::create_dir_all(basedir)?;
        rotate(&path, BAK_NUM, ROTATE_SEP, true);

        self.meta.mtime = now;
        let bytes = serialize_index(&self.meta, &self.records, &self.vault)?;
        {
            let mut f = File::create(&path).with_context(|| format!("create {}", path.display()))?;
            f.write_all(&bytes)?;
            f.sync_all()?;
        }

        let bak1 = rotate(&path, BAK_NUM, ROTATE_SEP, false)[1].clone();
        if !bak1.exists() {
            std::fs::copy(&path, &bak1).context("write first backup copy")?;
        }
        self.dirty = false;
        Ok(true)
    }

    fn migrate(&mut self) -> Result<()> {
        if self.meta.version > CURRENT_VERSION {
            bail!(
                "index version {:?} is newer than this binary understands ({:?})",
                self.meta.version,
                CURRENT_VERSION
            );
        }
        if self.meta.version < (1, 1) {
            // 1.0 -> 1.1: paths used to be stored absolute; this binary only
            // ever writes relative paths, so any absolute path left over
            // from a 1.0 database is rewritten in place.
            let mut migrated = HashMap::with_capacity(self.records.len());
            for (key, mut rec) in self.records.drain() {
                if Path::new(&rec.path).is_absolute() {
                    if let Ok(stripped) = Path::new(&rec.path).strip_prefix("/") {
                        rec.path = stripped.to_string_lossy().replace('\\', "/");
                    }
                }
                migrated.insert(key, rec);
            }
            self.records = migrated;
            self.meta.version = (1, 1);
            self.dirty = true;
        }
        Ok(())
    }
}

fn now_secs() -> f64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs_f64()
}

fn serialize_index(
    meta: &IndexMeta,
    records: &HashMap<String, FileRecord>,
    vault: &HashMap<String, VaultEntry>,
) -> Result<Vec<u8>> {
    let mut rows: Vec<u8> = Vec::new();
    {
        let meta_json = serde_json::to_string(meta)?;
        rows.extend_from_slice(meta_json.as_bytes());
        rows.push(b'\n');
    }

    let mut body_rows: Vec<[String; 5]> = Vec::new();
    let mut sorted_paths: Vec<&String> = records.keys().collect();
    sorted_paths.sort();
    for path in sorted_paths {
        let rec = &records[path];
        body_rows.push([
            "R".to_string(),
            rec.path.clone(),
            rec.digest.clone(),
            rec.mtime.to_string(),
            rec.size.to_string(),
        ]);
    }
    let mut sorted_digests: Vec<&String> = vault.keys().collect();
    sorted_digests.sort();
    for digest in sorted_digests {
        let entry = &vault[digest];
        for (name, artifact_digest) in &entry.artifacts {
            body_rows.push([
                "V".to_string(),
                entry.file_digest.clone(),
                name.clone(),
                artifact_digest.clone(),
                String::new(),
            ]);
        }
    }

    let mut hasher = sha2::Sha512::new();
    {
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(&mut rows);
        writer.write_record(HEADER)?;
        hasher.update(HEADER.join(","));
        for row in &body_rows {
            writer.write_record(row)?;
            hasher.update(row.join(","));
        }
        writer.flush()?;
    }
    let truncate = meta.truncate.min(128);
    let checksum = hex::encode(hasher.finalize());
    let checksum_line = format!("#CHECKSUM:{}\n", &checksum[..truncate.min(checksum.len())]);
    rows.extend_from_slice(checksum_line.as_bytes());
    Ok(rows)
}

fn parse_index_bytes(bytes: &[u8]) -> Result<Index> {
    let text = std::str::from_utf8(bytes).context("index is not valid utf-8")?;
    let mut lines = text.splitn(2, '\n');
    let meta_line = lines.next().context("empty index file")?;
    let rest = lines.next().unwrap_or("");
    let meta: IndexMeta = serde_json::from_str(meta_line).context("parse index meta header")?;

    let checksum_pos = rest.rfind("#CHECKSUM:").context("missing checksum sentinel")?;
    let (body, checksum_line) = rest.split_at(checksum_pos);
    let expected = checksum_line.trim_start_matches("#CHECKSUM:").trim();

    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(body.as_bytes());
    let headers = reader.headers()?.clone();
    if headers.iter().collect::<Vec<_>>() != HEADER.to_vec() {
        bail!("unexpected index header row");
    }

    let mut hasher = sha2::Sha512::new();
    hasher.update(HEADER.join(","));

    let mut records = HashMap::new();
    let mut vault: HashMap<String, VaultEntry> = HashMap::new();

    for result in reader.records() {
        let row = result.context("parse index row")?;
        let joined = row.iter().collect::<Vec<_>>().join(",");
        hasher.update(&joined);
        let fields: Vec<&str> = row.iter().collect();
        if fields.len() != 5 {
            bail!("malformed index row: {joined}");
        }
        match fields[0] {
            "R" => {
                let path = fields[1].to_string();
                let rec = FileRecord {
                    path: path.clone(),
                    digest: fields[2].to_string(),
                    mtime: fields[3].parse().context("parse mtime")?,
                    size: fields[4].parse().context("parse size")?,
                };
                records.insert(path, rec);
            }
            "V" => {
                let file_digest = fields[1].to_string();
                let entry = vault
                    .entry(file_digest.clone())
                    .or_insert_with(|| VaultEntry::new(file_digest.clone()));
                entry.artifacts.push((fields[2].to_string(), fields[3].to_string()));
            }
            other => bail!("unknown index row kind: {other}"),
        }
    }

    let got = hex::encode(hasher.finalize());
    let truncate = meta.truncate.min(128).min(got.len());
    if &got[..truncate] != expected {
        bail!("index checksum mismatch");
    }

    Ok(Index { meta, records, vault, dirty: false })
}
