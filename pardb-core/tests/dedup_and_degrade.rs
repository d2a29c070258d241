//! Cross-module invariant checks for the parity pipeline's dedup and
//! auto-degrade behavior, driven through `parity_pipeline::run` against a
//! fake `par2`-compatible binary that actually produces artifact files
//! (unlike the bare `exit 0` stub used by `pardb-cli`'s integration suite,
//! which never drives these code paths).

use pardb_core::context::{Context, ParityMode};
use pardb_core::index::Index;
use pardb_core::parity_pipeline;
use pardb_core::record::FileRecord;
use pardb_core::vault::Vault;
use std::path::Path;

/// Writes a `par2`-compatible shell script into `dir` that, on `create`,
/// touches the file named by its `-a` argument in the invocation's working
/// directory and exits 0. Good enough to drive `install_artifacts` without
/// shelling out to a real parity tool.
fn write_fake_par2(dir: &Path) -> std::path::PathBuf {
    let bin = dir.join("par2");
    std::fs::write(
        &bin,
        "#!/bin/sh\n\
         if [ \"$1\" = \"create\" ]; then\n\
         \tshift\n\
         \tart=\"\"\n\
         \twhile [ $# -gt 0 ]; do\n\
         \t\tif [ \"$1\" = \"-a\" ]; then\n\
         \t\t\tshift\n\
         \t\t\tart=\"$1\"\n\
         \t\tfi\n\
         \t\tshift\n\
         \tdone\n\
         \t: > \"$art\"\n\
         fi\n\
         exit 0\n",
    )
    .unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&bin, std::fs::Permissions::from_mode(0o755)).unwrap();
    }
    bin
}

fn record_for(root: &Path, name: &str, contents: &[u8]) -> (String, FileRecord) {
    std::fs::write(root.join(name), contents).unwrap();
    (name.to_string(), FileRecord::new(name.to_string(), 0.0, contents.len() as u64))
}

/// Two paths with identical content install exactly one vault entry: the
/// second path's processing must early-quit and leave no temp artifact
/// behind.
#[test]
fn identical_content_under_two_paths_dedups_to_one_vault_entry() {
    let root = tempfile::tempdir().unwrap();
    let fake_par2 = write_fake_par2(root.path());
    let basedir = root.path().join(".pardatabase");

    let mut ctx = Context::new(root.path().to_path_buf(), basedir.clone());
    ctx.parity_binary = fake_par2.to_string_lossy().to_string();
    ctx.parity_mode = ParityMode::Parallel;

    let vault_obj = Vault::open(&basedir, ctx.algo, ctx.truncate_width).unwrap();
    let mut index = Index::default();

    let (path_a, rec_a) = record_for(root.path(), "a.bin", b"identical payload");
    let (path_b, rec_b) = record_for(root.path(), "b.bin", b"identical payload");
    index.records.insert(path_a.clone(), rec_a);
    index.records.insert(path_b.clone(), rec_b);

    let needs_parity = vec![path_a.clone(), path_b.clone()];
    let report = parity_pipeline::run(&mut ctx, &mut index, &vault_obj, &needs_parity).unwrap();

    assert_eq!(report.installed, 1);
    assert_eq!(report.deduped, 1);
    assert_eq!(report.tool_failed, 0);
    assert_eq!(report.io_errors, 0);
    assert_eq!(index.vault.len(), 1, "both paths share one digest, so exactly one vault entry");

    let digest_a = index.records[&path_a].digest.clone();
    let digest_b = index.records[&path_b].digest.clone();
    assert_eq!(digest_a, digest_b);
    assert!(!digest_a.is_empty());

    let leftovers: Vec<_> = std::fs::read_dir(root.path())
        .unwrap()
        .flatten()
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|n| n.starts_with(".pardatabase_tmp_file"))
        .collect();
    assert!(leftovers.is_empty(), "early-quit must not leave temp artifacts behind: {leftovers:?}");
}

/// Five consecutive dedup hits flip parallel mode to sequential mid-run.
#[test]
fn five_consecutive_dedup_hits_degrade_to_sequential() {
    let root = tempfile::tempdir().unwrap();
    let fake_par2 = write_fake_par2(root.path());
    let basedir = root.path().join(".pardatabase");

    let mut ctx = Context::new(root.path().to_path_buf(), basedir.clone());
    ctx.parity_binary = fake_par2.to_string_lossy().to_string();
    ctx.parity_mode = ParityMode::Parallel;

    let vault_obj = Vault::open(&basedir, ctx.algo, ctx.truncate_width).unwrap();
    let mut index = Index::default();

    let mut needs_parity = Vec::new();
    let (seed_path, seed_rec) = record_for(root.path(), "seed.bin", b"shared content");
    index.records.insert(seed_path.clone(), seed_rec);
    needs_parity.push(seed_path);

    for i in 0..5 {
        let name = format!("dup{i}.bin");
        let (path, rec) = record_for(root.path(), &name, b"shared content");
        index.records.insert(path.clone(), rec);
        needs_parity.push(path);
    }

    let report = parity_pipeline::run(&mut ctx, &mut index, &vault_obj, &needs_parity).unwrap();

    assert_eq!(report.installed, 1);
    assert_eq!(report.deduped, 5);
    assert!(report.degraded_to_sequential);
    assert_eq!(ctx.parity_mode, ParityMode::Sequential);
}
