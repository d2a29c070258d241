//! Diff the filesystem against the index under two independent filter sets
//! and produce two disjoint work lists. Ported from `database.py::scan`:
//! paths are walked once per profile, `updated()` decides whether a record
//! needs rehashing, and a path eligible under both profiles goes to
//! `needs_parity` only.

use crate::record::{FileRecord, VaultEntry};
use crate::walk::{walk, WalkFilters};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Default)]
pub struct ScanPlan {
    pub needs_hash: Vec<String>,
    pub needs_parity: Vec<String>,
}

fn rel_path(root: &Path, path: &Path) -> String {
    pathdiff::diff_paths(path, root)
        .unwrap_or_else(|| path.to_path_buf())
        .to_string_lossy()
        .replace('\\', "/")
}

/// A record needs rehashing if it has never been hashed or its on-disk
/// mtime has moved since the stored value (`database.py::updated`).
fn updated(record: &FileRecord, mtime: f64) -> bool {
    !record.has_digest() || (record.mtime - mtime).abs() > f64::EPSILON
}

/// A record needs (re)parity if it was just updated, or it has a digest that
/// the vault has no entry for (e.g. the vault entry was dropped by a clean
/// or never installed in the first place).
fn needs_parity_now(record: &FileRecord, mtime: f64, vault: &HashMap<String, VaultEntry>) -> bool {
    updated(record, mtime) || !vault.contains_key(&record.digest)
}

pub fn plan(
    records: &mut HashMap<String, FileRecord>,
    vault: &HashMap<String, VaultEntry>,
    root: &Path,
    scan_filters: &WalkFilters,
    parity_filters: &WalkFilters,
) -> ScanPlan {
    let mut needs_hash_set: Vec<String> = Vec::new();
    for (path, meta) in walk(root, scan_filters) {
        let rel = rel_path(root, &path);
        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        let size = meta.len();
        let entry = records.entry(rel.clone()).or_insert_with(|| FileRecord::new(rel.clone(), mtime, size));
        if updated(entry, mtime) {
            entry.mtime = mtime;
            entry.size = size;
            needs_hash_set.push(rel);
        }
    }

    let mut needs_parity_set: Vec<String> = Vec::new();
    for (path, meta) in walk(root, parity_filters) {
        let rel = rel_path(root, &path);
        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        let size = meta.len();
        let entry = records.entry(rel.clone()).or_insert_with(|| FileRecord::new(rel.clone(), mtime, size));
        if needs_parity_now(entry, mtime, vault) {
            needs_parity_set.push(rel);
        }
    }

    // A path appearing in both sets only needs parity: hashing it happens
    // as a side effect of the parity race (see parity_pipeline).
    let parity_lookup: std::collections::HashSet<&String> = needs_parity_set.iter().collect();
    let needs_hash: Vec<String> =
        needs_hash_set.into_iter().filter(|p| !parity_lookup.contains(p)).collect();

    ScanPlan { needs_hash, needs_parity: needs_parity_set }
}
