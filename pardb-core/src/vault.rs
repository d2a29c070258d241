//! Content-addressed parity artifact store: a fixed 256-way hex-shard
//! directory layout keyed by file digest. Ported from `hexbase.py`'s
//! `HexBase` (`put`/`get`/`clean`/`verify`).

use crate::hash::{hash_cmp, hash_file, HashAlgo};
use crate::record::VaultEntry;
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// What to do when `get` would overwrite an existing file at the
/// destination.
pub enum OverwritePolicy {
    Decline,
    Overwrite,
    Ask(Box<dyn Fn(&Path) -> bool>),
}

impl Default for OverwritePolicy {
    fn default() -> Self {
        OverwritePolicy::Decline
    }
}

pub struct Vault {
    par2_dir: PathBuf,
    algo: HashAlgo,
    truncate_width: usize,
}

fn shard_names() -> impl Iterator<Item = String> {
    (0u16..256).map(|n| format!("{n:02X}"))
}

impl Vault {
    /// Open the vault rooted at `<basedir>/par2`, pre-creating all 256 shard
    /// directories on first use (`hexbase.py::load`'s `os.makedirs` loop).
    pub fn open(basedir: &Path, algo: HashAlgo, truncate_width: usize) -> Result<Self> {
        let par2_dir = basedir.join("par2");
        std::fs::create_dir_all(&par2_dir)?;
        for shard in shard_names() {
            std::fs::create_dir_all(par2_dir.join(shard))?;
        }
        Ok(Self { par2_dir, algo, truncate_width })
    }

    fn locate(&self, name: &str) -> PathBuf {
        self.par2_dir.join(name)
    }

    /// `H[0:2].upper() / H[2:34] ⊕ suffix`.
    fn artifact_name(file_digest: &str, suffix: &str) -> String {
        let folder = file_digest[..2.min(file_digest.len())].to_uppercase();
        let tail_end = (34.min(file_digest.len())).max(2.min(file_digest.len()));
        let tail = &file_digest[2.min(file_digest.len())..tail_end];
        format!("{folder}/{tail}{suffix}")
    }

    /// Move `src` into the vault under the digest/suffix naming scheme,
    /// recording its own digest for later verification.
    pub fn put(
        &self,
        vault: &mut HashMap<String, VaultEntry>,
        src: &Path,
        file_digest: &str,
        suffix: &str,
    ) -> Result<()> {
        let name = Self::artifact_name(file_digest, suffix);
        let dest = self.locate(&name);
        let artifact_digest = hash_file(src, self.algo, self.truncate_width);
        if dest.exists() {
            std::fs::remove_file(&dest).context("remove existing vault artifact")?;
        }
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if std::fs::rename(src, &dest).is_err() {
            std::fs::copy(src, &dest).context("copy artifact into vault")?;
            std::fs::remove_file(src).ok();
        }
        let entry = vault
            .entry(file_digest.to_string())
            .or_insert_with(|| VaultEntry::new(file_digest.to_string()));
        entry.artifacts.push((name, artifact_digest));
        Ok(())
    }

    /// Copy every artifact for `file_digest` into `dest_dir`. Mismatched
    /// on-disk digests are logged but not fatal (`hexbase.py::get`'s
    /// "WARNING! .par2 files failed validation!" still proceeds to copy).
    /// Returns an empty vec if any artifact is missing or any overwrite is
    /// declined.
    pub fn get(
        &self,
        vault: &HashMap<String, VaultEntry>,
        file_digest: &str,
        dest_dir: &Path,
        overwrite: &OverwritePolicy,
    ) -> Result<Vec<PathBuf>> {
        let Some(entry) = vault.get(file_digest) else {
            return Ok(Vec::new());
        };
        let mut dest_files = Vec::with_capacity(entry.artifacts.len());
        for (name, recorded_digest) in &entry.artifacts {
            let src = self.locate(name);
            if !src.exists() {
                tracing::warn!(path = %src.display(), "missing vault artifact");
                return Ok(Vec::new());
            }
            let actual = hash_file(&src, self.algo, self.truncate_width);
            if !hash_cmp(recorded_digest, &actual) {
                tracing::warn!(path = %src.display(), "vault artifact failed validation");
            }
            let base = Path::new(name).file_name().context("artifact name has no file component")?;
            let dest = dest_dir.join(base);
            if dest.exists() {
                let proceed = match overwrite {
                    OverwritePolicy::Decline => false,
                    OverwritePolicy::Overwrite => true,
                    OverwritePolicy::Ask(f) => f(&dest),
                };
                if !proceed {
                    return Ok(Vec::new());
                }
            }
            std::fs::copy(&src, &dest).context("copy artifact out of vault")?;
            dest_files.push(dest);
        }
        Ok(dest_files)
    }

    /// Remove every artifact for `file_digest` and drop its vault entry.
    /// Returns the number of artifact files removed.
    pub fn clean(&self, vault: &mut HashMap<String, VaultEntry>, file_digest: &str) -> usize {
        let Some(entry) = vault.remove(file_digest) else {
            return 0;
        };
        let mut removed = 0;
        for (name, _) in &entry.artifacts {
            let path = self.locate(name);
            if path.exists() {
                if std::fs::remove_file(&path).is_ok() {
                    removed += 1;
                }
            } else {
                tracing::warn!(path = %path.display(), digest = %file_digest, "vault artifact already missing, cannot delete");
            }
        }
        removed
    }

    /// Re-verify every artifact on disk. Returns the digests of entries with
    /// at least one missing or mismatched artifact; those entries are
    /// dropped from `vault` as a side effect so the caller's index reflects
    /// reality.
    pub fn verify(&self, vault: &mut HashMap<String, VaultEntry>) -> Vec<String> {
        let mut bad = Vec::new();
        vault.retain(|digest, entry| {
            let mut ok = true;
            for (name, recorded_digest) in &entry.artifacts {
                let path = self.locate(name);
                if !path.exists() {
                    tracing::warn!(path = %path.display(), "vault artifact missing during verify");
                    ok = false;
                    continue;
                }
                let actual = hash_file(&path, self.algo, self.truncate_width);
                if !hash_cmp(recorded_digest, &actual) {
                    tracing::warn!(path = %path.display(), "vault artifact hash mismatch during verify");
                    ok = false;
                }
            }
            if !ok {
                bad.push(digest.clone());
            }
            ok
        });
        bad
    }
}
