//! Consumes the scanner's `needs_hash` list, hashing each file and updating
//! its record. Ported from `database.py::gen_hashes`.

use crate::context::Context;
use crate::hash::hash_file;
use crate::index::Index;
use crate::signal::{interrupted, InterruptGuard};
use anyhow::Result;
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
pub struct HashRunReport {
    pub hashed: usize,
    pub io_errors: usize,
    pub interrupted: bool,
}

/// Hash every path in `needs_hash`, saving a checkpoint every
/// `ctx.checkpoint_every` records and on interruption. Returns once the
/// list is exhausted or Ctrl+C is observed between records.
pub fn run(ctx: &Context, index: &mut Index, needs_hash: &[String]) -> Result<HashRunReport> {
    let mut report = HashRunReport::default();
    let guard = InterruptGuard::arm();

    for (i, path) in needs_hash.iter().enumerate() {
        if interrupted() {
            report.interrupted = true;
            break;
        }
        let Some(record) = index.records.get_mut(path) else { continue };
        let full_path = record.full_path(&ctx.root);

        let start = Instant::now();
        let digest = hash_file(&full_path, ctx.algo, ctx.truncate_width);
        if digest == crate::hash::IO_ERROR_SENTINEL {
            report.io_errors += 1;
        } else {
            report.hashed += 1;
        }
        record.digest = digest;
        index.mark_dirty();

        if let Some(factor) = ctx.delay_factor {
            let elapsed = start.elapsed();
            std::thread::sleep(Duration::from_secs_f64(elapsed.as_secs_f64() * factor));
        }

        if (i + 1) % ctx.checkpoint_every == 0 {
            index.save(&ctx.basedir, ctx.checkpoint_interval)?;
        }
    }

    drop(guard);
    index.save(&ctx.basedir, Duration::ZERO)?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::FileRecord;

    #[test]
    fn hashes_every_requested_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"hello").unwrap();
        std::fs::write(dir.path().join("b.txt"), b"world").unwrap();

        let basedir = dir.path().join(".pardatabase");
        let mut ctx = Context::new(dir.path().to_path_buf(), basedir);
        ctx.checkpoint_every = 1000;
        let mut index = Index::default();
        index.records.insert("a.txt".into(), FileRecord::new("a.txt".into(), 0.0, 5));
        index.records.insert("b.txt".into(), FileRecord::new("b.txt".into(), 0.0, 5));

        let report = run(&ctx, &mut index, &["a.txt".to_string(), "b.txt".to_string()]).unwrap();
        assert_eq!(report.hashed, 2);
        assert!(index.records["a.txt"].has_digest());
        assert!(index.records["b.txt"].has_digest());
    }

    #[test]
    fn missing_file_records_io_error_sentinel() {
        let dir = tempfile::tempdir().unwrap();
        let basedir = dir.path().join(".pardatabase");
        let mut ctx = Context::new(dir.path().to_path_buf(), basedir);
        ctx.checkpoint_every = 1000;
        let mut index = Index::default();
        index.records.insert("missing.txt".into(), FileRecord::new("missing.txt".into(), 0.0, 0));

        let report = run(&ctx, &mut index, &["missing.txt".to_string()]).unwrap();
        assert_eq!(report.io_errors, 1);
        assert_eq!(index.records["missing.txt"].digest, crate::hash::IO_ERROR_SENTINEL);
    }
}
