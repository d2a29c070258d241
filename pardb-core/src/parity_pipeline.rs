//! Consumes the scanner's `needs_parity` list, orchestrating the hash/parity
//! race per record and installing dedup-aware artifacts into the vault.
//! Ported from `database.py::gen_pars`/`Database.generate` and
//! `info.py`'s temp-file and `run_par2` handling.

use crate::context::{Context, ParityMode};
use crate::hash::hash_file;
use crate::index::Index;
use crate::par2child::Par2Child;
use crate::record::VaultEntry;
use crate::signal::{interrupted, InterruptGuard};
use crate::vault::Vault;
use anyhow::{Context as _, Result};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Tag matching the original's string sentinel for a parity run that was
/// terminated early because the vault already had this digest.
pub const PARALLEL_EARLY_QUIT: &str = "PARALLEL_EARLY_QUIT";

const TMP_PREFIX: &str = ".pardatabase_tmp_file";
const SINGLECHAR_RENAME_SUFFIX: &str = ".pardatabase.tmp.rename";

#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    Installed,
    EarlyQuit,
    ToolFailed,
    IoError,
    Interrupted,
}

#[derive(Debug, Default)]
pub struct ParityRunReport {
    pub installed: usize,
    pub deduped: usize,
    pub tool_failed: usize,
    pub io_errors: usize,
    pub degraded_to_sequential: bool,
    pub interrupted: bool,
}

struct SinglecharGuard {
    active: Option<(PathBuf, PathBuf)>,
}

impl SinglecharGuard {
    fn apply(path: &Path, enabled: bool) -> Result<(PathBuf, Self)> {
        let basename = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        if !enabled || basename.chars().count() != 1 {
            return Ok((path.to_path_buf(), Self { active: None }));
        }
        let renamed = path.with_file_name(format!("{basename}{SINGLECHAR_RENAME_SUFFIX}"));
        std::fs::rename(path, &renamed).context("singlecharfix rename")?;
        Ok((renamed.clone(), Self { active: Some((renamed, path.to_path_buf())) }))
    }
}

impl Drop for SinglecharGuard {
    fn drop(&mut self) {
        if let Some((renamed, original)) = self.active.take() {
            if renamed.exists() {
                let _ = std::fs::rename(&renamed, &original);
            }
        }
    }
}

/// Ring buffer of the last 5 outcomes, used to decide auto-degrade.
#[derive(Default)]
struct RecentOutcomes(Vec<bool>);

impl RecentOutcomes {
    fn push(&mut self, was_early_quit: bool) {
        self.0.push(was_early_quit);
        if self.0.len() > 5 {
            self.0.remove(0);
        }
    }

    fn all_early_quit(&self) -> bool {
        self.0.len() == 5 && self.0.iter().all(|&x| x)
    }
}

/// Runs the hash/parity race for one record. Returns the outcome alongside
/// the digest computed along the way (or [`crate::hash::IO_ERROR_SENTINEL`]),
/// so the caller never has to re-hash the file to learn what was found.
fn process_parallel(
    ctx: &Context,
    vault_obj: &Vault,
    vault_map: &mut std::collections::HashMap<String, VaultEntry>,
    path: &Path,
) -> Result<(Outcome, String)> {
    let cwd = path.parent().unwrap_or(Path::new(".")).to_path_buf();
    let (target, _guard) = SinglecharGuard::apply(path, ctx.singlecharfix)?;
    let basename_owned = target.file_name().and_then(|n| n.to_str()).unwrap_or_default().to_string();

    let mut child = Par2Child::start_create(
        &ctx.parity_binary,
        &cwd,
        TMP_PREFIX,
        &basename_owned,
        &ctx.par2_options,
    )?;

    let digest = hash_file(&target, ctx.algo, ctx.truncate_width);
    if digest == crate::hash::IO_ERROR_SENTINEL {
        child.terminate()?;
        cleanup_tmp_artifacts(&cwd);
        return Ok((Outcome::IoError, digest));
    }

    if vault_map.contains_key(&digest) {
        child.terminate()?;
        cleanup_tmp_artifacts(&cwd);
        return Ok((Outcome::EarlyQuit, digest));
    }

    let success = loop {
        if interrupted() {
            child.kill();
            cleanup_tmp_artifacts(&cwd);
            return Ok((Outcome::Interrupted, digest));
        }
        if let Some(done) = child.poll()? {
            break done;
        }
        std::thread::sleep(Duration::from_millis(50));
    };

    if !success {
        cleanup_tmp_artifacts(&cwd);
        return Ok((Outcome::ToolFailed, digest));
    }

    install_artifacts(vault_obj, vault_map, &cwd, &digest)?;
    Ok((Outcome::Installed, digest))
}

fn process_sequential(
    ctx: &Context,
    vault_obj: &Vault,
    vault_map: &mut std::collections::HashMap<String, VaultEntry>,
    path: &Path,
) -> Result<(Outcome, String)> {
    let cwd = path.parent().unwrap_or(Path::new(".")).to_path_buf();
    let (target, _guard) = SinglecharGuard::apply(path, ctx.singlecharfix)?;
    let basename = target.file_name().and_then(|n| n.to_str()).unwrap_or_default().to_string();

    let digest = hash_file(&target, ctx.algo, ctx.truncate_width);
    if digest == crate::hash::IO_ERROR_SENTINEL {
        return Ok((Outcome::IoError, digest));
    }
    if vault_map.contains_key(&digest) {
        return Ok((Outcome::EarlyQuit, digest));
    }

    let child =
        Par2Child::start_create(&ctx.parity_binary, &cwd, TMP_PREFIX, &basename, &ctx.par2_options)?;
    let success = child.wait()?;
    if !success {
        cleanup_tmp_artifacts(&cwd);
        return Ok((Outcome::ToolFailed, digest));
    }

    install_artifacts(vault_obj, vault_map, &cwd, &digest)?;
    Ok((Outcome::Installed, digest))
}

fn cleanup_tmp_artifacts(cwd: &Path) {
    let Ok(entries) = std::fs::read_dir(cwd) else { return };
    for entry in entries.flatten() {
        if entry.file_name().to_string_lossy().starts_with(TMP_PREFIX) {
            let _ = std::fs::remove_file(entry.path());
        }
    }
}

fn install_artifacts(
    vault_obj: &Vault,
    vault_map: &mut std::collections::HashMap<String, VaultEntry>,
    cwd: &Path,
    digest: &str,
) -> Result<()> {
    let Ok(entries) = std::fs::read_dir(cwd) else { return Ok(()) };
    let mut artifacts: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with(TMP_PREFIX) && n.ends_with(".par2"))
                .unwrap_or(false)
        })
        .collect();
    artifacts.sort();
    for (i, artifact) in artifacts.iter().enumerate() {
        let suffix = format!(".{i}.par2");
        vault_obj.put(vault_map, artifact, digest, &suffix)?;
    }
    Ok(())
}

pub fn run(
    ctx: &mut Context,
    index: &mut Index,
    vault_obj: &Vault,
    needs_parity: &[String],
) -> Result<ParityRunReport> {
    let mut report = ParityRunReport::default();
    let mut recent = RecentOutcomes::default();
    let guard = InterruptGuard::arm();

    for (i, path) in needs_parity.iter().enumerate() {
        if interrupted() {
            report.interrupted = true;
            break;
        }
        let full_path = match index.records.get(path) {
            Some(rec) => rec.full_path(&ctx.root),
            None => continue,
        };

        let (outcome, digest) = match ctx.parity_mode {
            ParityMode::Parallel => process_parallel(ctx, vault_obj, &mut index.vault, &full_path)?,
            ParityMode::Sequential => process_sequential(ctx, vault_obj, &mut index.vault, &full_path)?,
        };

        if outcome == Outcome::Interrupted {
            report.interrupted = true;
            break;
        }

        match outcome {
            Outcome::Installed => {
                report.installed += 1;
                recent.push(false);
            }
            Outcome::EarlyQuit => {
                report.deduped += 1;
                recent.push(true);
            }
            Outcome::ToolFailed => {
                report.tool_failed += 1;
                recent.push(false);
            }
            Outcome::IoError => {
                report.io_errors += 1;
                recent.push(false);
            }
            Outcome::Interrupted => unreachable!("handled above"),
        }

        if let Some(record) = index.records.get_mut(path) {
            record.digest = digest;
        }
        index.mark_dirty();

        if ctx.parity_mode == ParityMode::Parallel
            && recent.all_early_quit()
            && !report.degraded_to_sequential
        {
            tracing::warn!("five consecutive dedup hits, degrading to sequential parity mode");
            ctx.parity_mode = ParityMode::Sequential;
            report.degraded_to_sequential = true;
        }

        if (i + 1) % ctx.checkpoint_every == 0 {
            index.save(&ctx.basedir, ctx.checkpoint_interval)?;
        }
    }

    drop(guard);
    index.save(&ctx.basedir, Duration::ZERO)?;
    Ok(report)
}
