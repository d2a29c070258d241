//! Advisory single-writer lock on the vault's base directory, enforcing the
//! single-writer assumption (spec §5) across processes. Ported from the
//! teacher's global repair lock (`repair.rs`'s `.parx.repair.lock`,
//! `fs2::FileExt::try_lock_exclusive`).

use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::File;
use std::path::Path;

/// Held for the lifetime of a run. Dropping releases the OS advisory lock.
pub struct VaultLock {
    _file: File,
}

impl VaultLock {
    /// Acquire `<basedir>/.lock`, failing immediately (rather than blocking)
    /// if another process already holds it.
    pub fn acquire(basedir: &Path) -> Result<Self> {
        std::fs::create_dir_all(basedir)?;
        let path = basedir.join(".lock");
        let file = File::create(&path).with_context(|| format!("create {}", path.display()))?;
        file.try_lock_exclusive()
            .context("another pardb process already holds the vault lock")?;
        Ok(Self { _file: file })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_lock_on_same_basedir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let _first = VaultLock::acquire(dir.path()).unwrap();
        assert!(VaultLock::acquire(dir.path()).is_err());
    }

    #[test]
    fn lock_is_released_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        {
            let _first = VaultLock::acquire(dir.path()).unwrap();
        }
        assert!(VaultLock::acquire(dir.path()).is_ok());
    }
}
