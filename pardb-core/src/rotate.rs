//! N-deep atomic backup rotation for a single path, e.g. `db`, `db.1`, …
//! `db.8`. Ported from the original `rotate(path, limit, prefix, move)`
//! helper: the oldest slot is dropped, and every remaining slot shifts down
//! by one.

use std::path::{Path, PathBuf};

/// Build the `limit + 1` candidate names `path, path.sep1, …, path.sepN`.
fn candidate_names(path: &Path, limit: usize, sep: &str) -> Vec<PathBuf> {
    let mut names = Vec::with_capacity(limit + 1);
    names.push(path.to_path_buf());
    let stem = path.with_extension("");
    let ext = path.extension().map(|e| e.to_string_lossy().to_string());
    for n in 1..=limit {
        let mut name = stem.clone().into_os_string();
        name.push(format!("{sep}{n}"));
        let mut p = PathBuf::from(name);
        if let Some(ext) = &ext {
            p.set_extension(ext);
        }
        names.push(p);
    }
    names
}

/// Rotate `path` through `limit` numbered backups.
///
/// Returns the `limit`-long prefix of the rotation sequence (the slots that
/// now hold, or would hold, live data) without the dropped final slot. When
/// `do_move` is true, the oldest slot is deleted and every other slot is
/// renamed down by one; when false, nothing on disk is touched and the
/// sequence is just enumerated, used by the index loader to probe backups
/// without committing to a rotation.
pub fn rotate(path: &Path, limit: usize, sep: &str, do_move: bool) -> Vec<PathBuf> {
    let mut files = candidate_names(path, limit, sep);
    let mut dest = files.pop().expect("limit + 1 >= 1");
    if do_move {
        if dest.exists() {
            let _ = std::fs::remove_file(&dest);
        }
        for src in files.iter().rev() {
            if src.exists() {
                let _ = std::fs::rename(src, &dest);
            }
            dest = src.clone();
        }
    }
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn sequence_has_limit_entries_and_starts_with_path() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("db.csv");
        let seq = candidate_names(&p, 3, ".");
        assert_eq!(seq.len(), 4);
        assert_eq!(seq[0], p);
        assert_eq!(seq[1], dir.path().join("db.1.csv"));
        assert_eq!(seq[3], dir.path().join("db.3.csv"));
    }

    #[test]
    fn rotate_shifts_files_down_and_drops_oldest() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("db.csv");
        fs::write(&p, b"current").unwrap();
        fs::write(dir.path().join("db.1.csv"), b"one").unwrap();
        fs::write(dir.path().join("db.2.csv"), b"two").unwrap();
        fs::write(dir.path().join("db.3.csv"), b"three-gets-dropped").unwrap();

        let live = rotate(&p, 3, ".", true);

        assert_eq!(live.len(), 3);
        assert!(!p.exists());
        assert_eq!(fs::read(dir.path().join("db.1.csv")).unwrap(), b"current");
        assert_eq!(fs::read(dir.path().join("db.2.csv")).unwrap(), b"one");
        assert_eq!(fs::read(dir.path().join("db.3.csv")).unwrap(), b"two");
    }

    #[test]
    fn rotate_without_move_does_not_touch_disk() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("db.csv");
        fs::write(&p, b"current").unwrap();
        let live = rotate(&p, 3, ".", false);
        assert_eq!(live.len(), 3);
        assert!(p.exists());
        assert!(fs::read(&p).unwrap() == b"current");
    }

    #[test]
    fn rotate_on_empty_backups_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("db.csv");
        let live = rotate(&p, 8, ".", true);
        assert_eq!(live.len(), 8);
        assert!(!p.exists());
    }

    use proptest::prelude::*;

    proptest! {
        #[test]
        fn rotation_always_returns_limit_entries(limit in 1usize..16) {
            let dir = tempfile::tempdir().unwrap();
            let p = dir.path().join("db.csv");
            fs::write(&p, b"current").unwrap();
            let live = rotate(&p, limit, ".", true);
            prop_assert_eq!(live.len(), limit);
            prop_assert!(!p.exists());
        }

        #[test]
        fn rotation_without_move_never_touches_disk(limit in 1usize..16) {
            let dir = tempfile::tempdir().unwrap();
            let p = dir.path().join("db.csv");
            fs::write(&p, b"current").unwrap();
            let live = rotate(&p, limit, ".", false);
            prop_assert_eq!(live.len(), limit);
            prop_assert!(p.exists());
            prop_assert_eq!(fs::read(&p).unwrap(), b"current".to_vec());
        }
    }
}
