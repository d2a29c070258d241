//! Run-scoped configuration, owned rather than global.
//!
//! The original keeps its hash function, base directory, and tool options
//! as module-level/instance state mutated over the life of the process.
//! Here everything a pipeline needs is gathered into one `Context` built
//! once at startup and passed by reference, so nothing is implicit global
//! state.

use crate::hash::HashAlgo;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParityMode {
    Parallel,
    Sequential,
}

#[derive(Debug, Clone)]
pub struct Context {
    pub root: PathBuf,
    pub basedir: PathBuf,
    pub algo: HashAlgo,
    pub truncate_width: usize,
    pub parity_binary: String,
    pub parity_mode: ParityMode,
    pub singlecharfix: bool,
    pub par2_options: Vec<String>,
    pub delay_factor: Option<f64>,
    pub dry_run: bool,
    pub checkpoint_every: usize,
    pub checkpoint_interval: Duration,
}

impl Context {
    pub fn new(root: PathBuf, basedir: PathBuf) -> Self {
        Self {
            root,
            basedir,
            algo: HashAlgo::Sha512,
            truncate_width: crate::hash::DEFAULT_TRUNCATE,
            parity_binary: "par2".to_string(),
            parity_mode: ParityMode::Parallel,
            singlecharfix: false,
            par2_options: Vec::new(),
            delay_factor: None,
            dry_run: false,
            checkpoint_every: 10,
            checkpoint_interval: Duration::from_secs(3600),
        }
    }
}

/// Splits a user-supplied par2 passthrough string into argv tokens, mirroring
/// `pardatabase.py::parse_args`'s preprocessing that strips a leading `-`
/// doubling so users can write `--options "-r10 -n4"` without the outer
/// parser eating the flags meant for `par2` itself.
pub fn parse_par2_options(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(|s| s.trim_start_matches("--").to_string()).collect()
}

/// Best-effort I/O niceness, mirroring `pardatabase.py`'s `psutil`-based
/// attempt to lower its own priority: never fatal if the platform primitive
/// is unavailable or refuses.
#[cfg(unix)]
pub fn apply_niceness() {
    // SAFETY: nice(2) with an increment only ever adjusts this process's own
    // scheduling priority; -1 on error just means the request was declined.
    let result = unsafe { libc::nice(10) };
    if result == -1 {
        tracing::debug!("failed to lower process niceness, continuing at current priority");
    }
}

#[cfg(not(unix))]
pub fn apply_niceness() {
    tracing::debug!("process niceness is not supported on this platform");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_par2_options_splits_on_whitespace() {
        let opts = parse_par2_options("-r10 -n4");
        assert_eq!(opts, vec!["-r10".to_string(), "-n4".to_string()]);
    }

    #[test]
    fn parse_par2_options_strips_leading_double_dash() {
        let opts = parse_par2_options("--r10 --quiet");
        assert_eq!(opts, vec!["r10".to_string(), "quiet".to_string()]);
    }
}
