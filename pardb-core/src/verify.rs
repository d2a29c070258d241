//! Re-hash every indexed file and report mismatches; repair a single file
//! by pulling its artifacts from the vault and invoking the external tool.
//! Ported from `database.py::verify`/`repair`.

use crate::context::Context;
use crate::hash::{hash_cmp, hash_file};
use crate::index::Index;
use crate::par2child::run_repair;
use crate::vault::{OverwritePolicy, Vault};
use anyhow::{bail, Context as _, Result};

const MTIME_SLOP: f64 = 1e-3;

#[derive(Debug, Default)]
pub struct VerifyReport {
    pub ok: usize,
    pub corrupted: Vec<String>,
    pub missing: Vec<String>,
    /// mtime moved since last hash without a rescan having run yet.
    pub updated_without_rescan: Vec<String>,
    pub bad_vault_digests: Vec<String>,
    /// records with no digest yet (never hashed, or left at the io-error
    /// sentinel by an interrupted or failed prior run).
    pub no_digest: Vec<String>,
}

pub fn verify(ctx: &Context, index: &mut Index, vault_obj: &Vault) -> VerifyReport {
    let mut report = VerifyReport::default();
    let paths: Vec<String> = index.records.keys().cloned().collect();

    for path in paths {
        let record = &index.records[&path];
        let full_path = record.full_path(&ctx.root);
        if !full_path.exists() {
            report.missing.push(path);
            continue;
        }
        let on_disk_mtime = std::fs::metadata(&full_path)
            .ok()
            .and_then(|m| m.modified().ok())
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs_f64())
            .unwrap_or(record.mtime);
        if on_disk_mtime > record.mtime + MTIME_SLOP {
            report.updated_without_rescan.push(path);
            continue;
        }
        if !record.has_digest() {
            report.no_digest.push(path);
            continue;
        }
        let actual = hash_file(&full_path, ctx.algo, ctx.truncate_width);
        if hash_cmp(&record.digest, &actual) {
            report.ok += 1;
        } else {
            report.corrupted.push(path);
        }
    }

    if report.updated_without_rescan.len() > 10
        && report.updated_without_rescan.len() as f64 / index.records.len().max(1) as f64 > 0.2
    {
        tracing::warn!(
            count = report.updated_without_rescan.len(),
            "more than 20% of files changed since last scan; consider rescanning on a schedule"
        );
    }

    report.bad_vault_digests = vault_obj.verify(&mut index.vault);
    if !report.bad_vault_digests.is_empty() {
        index.mark_dirty();
    }
    report
}

/// Repair `relative_path` by copying its vault artifacts next to the target
/// and invoking the parity tool's repair mode, then re-hashing on success.
pub fn repair(ctx: &Context, index: &mut Index, vault_obj: &Vault, relative_path: &str) -> Result<bool> {
    let record = index
        .records
        .get(relative_path)
        .with_context(|| format!("{relative_path} is not indexed"))?
        .clone();
    let full_path = record.full_path(&ctx.root);
    let cwd = record.parent(&ctx.root);

    let dest_files =
        vault_obj.get(&index.vault, &record.digest, &cwd, &OverwritePolicy::Overwrite)?;
    if dest_files.is_empty() {
        bail!("no parity artifacts available for {relative_path}");
    }
    let mut sorted = dest_files.clone();
    sorted.sort();
    let first = &sorted[0];

    let success = run_repair(&ctx.parity_binary, &cwd, first, &full_path)?;
    if !success {
        return Ok(false);
    }
    for artifact in &dest_files {
        let _ = std::fs::remove_file(artifact);
    }

    let fresh_digest = hash_file(&full_path, ctx.algo, ctx.truncate_width);
    if let Some(record) = index.records.get_mut(relative_path) {
        record.digest = fresh_digest;
        if let Ok(meta) = std::fs::metadata(&full_path) {
            record.size = meta.len();
            if let Ok(mtime) = meta.modified() {
                if let Ok(d) = mtime.duration_since(std::time::UNIX_EPOCH) {
                    record.mtime = d.as_secs_f64();
                }
            }
        }
    }
    index.mark_dirty();
    Ok(true)
}
