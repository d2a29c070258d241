//! External parity tool invocation. The tool itself is a black box: this
//! module only knows its two command-line contracts (create, repair) and
//! gives callers a single `start`/`poll`/`wait`/`terminate`/`kill` primitive
//! so the parity pipeline's parallel and sequential modes can share one
//! code path. Ported from `info.py::run_par2`/`repair`.

use anyhow::{bail, Context, Result};
use std::path::Path;
use std::process::{Child, Command, Stdio};

/// Name of the `par2`-compatible binary to invoke, resolved once via PATH
/// lookup at startup (`pardatabase.py`'s `shutil.which('par2')` check).
pub fn resolve_binary(name: &str) -> Result<()> {
    let found = std::env::var_os("PATH")
        .map(|paths| {
            std::env::split_paths(&paths).any(|dir| {
                let candidate = dir.join(name);
                candidate.is_file()
            })
        })
        .unwrap_or(false);
    if !found {
        bail!("parity tool '{name}' not found on PATH");
    }
    Ok(())
}

/// A running or finished parity-create child process.
pub struct Par2Child {
    child: Child,
}

impl Par2Child {
    /// `par2 create -n1 -qq [options] -a <artifact_prefix>.par2 -- <basename>`,
    /// run with `cwd` as the working directory so artifacts land alongside
    /// the target file.
    pub fn start_create(
        binary: &str,
        cwd: &Path,
        artifact_prefix: &str,
        basename: &str,
        extra_options: &[String],
    ) -> Result<Self> {
        let mut cmd = Command::new(binary);
        cmd.current_dir(cwd)
            .arg("create")
            .arg("-n1")
            .arg("-qq")
            .args(extra_options)
            .arg("-a")
            .arg(format!("{artifact_prefix}.par2"))
            .arg("--")
            .arg(basename)
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        let child = cmd.spawn().with_context(|| format!("spawn {binary} create"))?;
        Ok(Self { child })
    }

    /// `None` while still running, `Some(true)` on a zero exit code.
    pub fn poll(&mut self) -> Result<Option<bool>> {
        match self.child.try_wait()? {
            Some(status) => Ok(Some(status.success())),
            None => Ok(None),
        }
    }

    pub fn wait(mut self) -> Result<bool> {
        let status = self.child.wait()?;
        Ok(status.success())
    }

    /// Ask the child to exit, without blocking further (used on dedup hit:
    /// `PARALLEL_EARLY_QUIT`).
    pub fn terminate(&mut self) -> Result<()> {
        self.child.kill().context("terminate parity child")?;
        let _ = self.child.wait();
        Ok(())
    }

    /// Force-kill, used from the interrupt path.
    pub fn kill(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// `par2 repair <first_artifact> <target_file>`, run with `cwd` as the
/// working directory.
pub fn run_repair(binary: &str, cwd: &Path, first_artifact: &Path, target: &Path) -> Result<bool> {
    let status = Command::new(binary)
        .current_dir(cwd)
        .arg("repair")
        .arg(first_artifact)
        .arg(target)
        .stdout(Stdio::null())
        .status()
        .with_context(|| format!("spawn {binary} repair"))?;
    Ok(status.success())
}
