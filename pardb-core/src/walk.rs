//! Filtered directory tree walker. Ported from `sd/tree.py`'s `Tree.walk`:
//! the same filter order (extension, mime, hidden, cache, symlink, exact
//! path, directory keyword, readability) and the same size/mtime bounds
//! applied only to files.

use std::collections::HashSet;
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Clone)]
pub struct WalkFilters {
    pub min_size: u64,
    pub max_size: Option<u64>,
    pub min_mtime: Option<f64>,
    pub max_mtime: Option<f64>,
    pub skip_exts: HashSet<String>,
    pub skip_mimes: Vec<String>,
    pub skip_dirs: Vec<String>,
    pub skip_paths: HashSet<String>,
    pub skip_hidden: bool,
    pub skip_cache: bool,
    pub skip_syms: bool,
}

impl Default for WalkFilters {
    fn default() -> Self {
        let mut skip_exts = HashSet::new();
        skip_exts.insert("par2".to_string());
        Self {
            min_size: 1,
            max_size: None,
            min_mtime: None,
            max_mtime: None,
            skip_exts,
            skip_mimes: Vec::new(),
            skip_dirs: vec![".pardatabase".to_string()],
            skip_paths: HashSet::new(),
            skip_hidden: false,
            skip_cache: false,
            skip_syms: true,
        }
    }
}

/// Small extension-based substitute for `mimetypes.guess_type`: enough to
/// support `skip_mimes` entries like `image` or `video` without pulling in
/// a MIME-sniffing dependency the original only used for its prefix match.
fn guess_mime(name: &str) -> Option<&'static str> {
    let ext = Path::new(name).extension()?.to_str()?.to_lowercase();
    Some(match ext.as_str() {
        "png" | "jpg" | "jpeg" | "gif" | "bmp" | "webp" => "image",
        "mp4" | "mkv" | "avi" | "mov" | "webm" => "video",
        "mp3" | "wav" | "flac" | "ogg" => "audio",
        "txt" | "md" | "csv" | "json" | "xml" | "html" => "text",
        _ => return None,
    })
}

fn is_hidden(name: &str) -> bool {
    name.ends_with('~') || name.starts_with('.')
}

struct Walker<'a> {
    root: &'a Path,
    filters: &'a WalkFilters,
}

impl<'a> Walker<'a> {
    fn skip_name(&self, name: &str, rel: &str, is_dir: bool, is_symlink: bool) -> bool {
        if !is_dir {
            if let Some(ext) = Path::new(name).extension().and_then(|e| e.to_str()) {
                if self.filters.skip_exts.contains(ext) {
                    return true;
                }
            }
            if !self.filters.skip_mimes.is_empty() {
                if let Some(mime) = guess_mime(name) {
                    if self.filters.skip_mimes.iter().any(|m| mime.contains(m.as_str())) {
                        return true;
                    }
                }
            }
        }
        if self.filters.skip_hidden && is_hidden(name) {
            return true;
        }
        if self.filters.skip_cache && name.to_lowercase().contains("cache") {
            return true;
        }
        if self.filters.skip_syms && is_symlink {
            return true;
        }
        if self.filters.skip_paths.contains(rel) {
            return true;
        }
        if is_dir {
            let lower = name.to_lowercase();
            if self.filters.skip_dirs.iter().any(|d| lower.contains(d.as_str())) {
                return true;
            }
        }
        false
    }
}

fn mtime_secs(meta: &Metadata) -> f64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Walk `root` applying `filters`, returning `(absolute path, metadata)` for
/// every file in bounds. Unreadable directories are skipped with a warning
/// rather than aborting the whole walk (`tree.py::skip`'s `os.access`
/// check).
pub fn walk(root: &Path, filters: &WalkFilters) -> Vec<(PathBuf, Metadata)> {
    let walker = Walker { root, filters };
    let mut out = Vec::new();

    let iter = WalkDir::new(root).follow_links(false).into_iter().filter_entry(|entry| {
        let name = entry.file_name().to_string_lossy().to_string();
        if entry.depth() == 0 {
            return true;
        }
        let rel = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .replace('\\', "/");
        let is_dir = entry.file_type().is_dir();
        let is_symlink = entry.path_is_symlink();
        if walker.skip_name(&name, &rel, is_dir, is_symlink) {
            return false;
        }
        if is_dir && !is_symlink {
            match std::fs::metadata(entry.path()) {
                Ok(_) => {}
                Err(_) => {
                    tracing::warn!(path = %entry.path().display(), "cannot access directory");
                    return false;
                }
            }
        }
        true
    });

    for entry in iter.flatten() {
        if entry.file_type().is_dir() {
            continue;
        }
        let meta = match entry.metadata() {
            Ok(m) => m,
            Err(err) => {
                tracing::warn!(path = %entry.path().display(), error = %err, "cannot stat file");
                continue;
            }
        };
        let size = meta.len();
        let mtime = mtime_secs(&meta);
        if size < filters.min_size {
            continue;
        }
        if let Some(max) = filters.max_size {
            if size > max {
                continue;
            }
        }
        if let Some(min_t) = filters.min_mtime {
            if mtime < min_t {
                continue;
            }
        }
        if let Some(max_t) = filters.max_mtime {
            if mtime > max_t {
                continue;
            }
        }
        out.push((entry.into_path(), meta));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn skips_par2_extension_by_default() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"hi").unwrap();
        fs::write(dir.path().join("a.par2"), b"parity").unwrap();
        let found = walk(dir.path(), &WalkFilters::default());
        assert_eq!(found.len(), 1);
        assert!(found[0].0.ends_with("a.txt"));
    }

    #[test]
    fn respects_size_bounds() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("small.txt"), b"x").unwrap();
        fs::write(dir.path().join("big.txt"), vec![0u8; 1000]).unwrap();
        let filters = WalkFilters { max_size: Some(10), ..WalkFilters::default() };
        let found = walk(dir.path(), &filters);
        assert_eq!(found.len(), 1);
        assert!(found[0].0.ends_with("small.txt"));
    }

    #[test]
    fn skip_hidden_excludes_dotfiles() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(".hidden"), b"x").unwrap();
        fs::write(dir.path().join("visible"), b"x").unwrap();
        let filters = WalkFilters { skip_hidden: true, ..WalkFilters::default() };
        let found = walk(dir.path(), &filters);
        assert_eq!(found.len(), 1);
        assert!(found[0].0.ends_with("visible"));
    }

    #[test]
    fn skip_dirs_keyword_prunes_subtree() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("node_modules")).unwrap();
        fs::write(dir.path().join("node_modules/dep.js"), b"x").unwrap();
        fs::write(dir.path().join("main.js"), b"x").unwrap();
        let filters =
            WalkFilters { skip_dirs: vec!["node_modules".to_string()], ..WalkFilters::default() };
        let found = walk(dir.path(), &filters);
        assert_eq!(found.len(), 1);
        assert!(found[0].0.ends_with("main.js"));
    }

    #[test]
    fn skips_vault_directory_by_default() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join(".pardatabase")).unwrap();
        fs::write(dir.path().join(".pardatabase/database.csv"), b"x").unwrap();
        fs::write(dir.path().join("real.txt"), b"x").unwrap();
        let found = walk(dir.path(), &WalkFilters::default());
        assert_eq!(found.len(), 1);
        assert!(found[0].0.ends_with("real.txt"));
    }

    #[test]
    fn zero_byte_files_are_skipped_by_default_min_size() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("empty.txt"), b"").unwrap();
        let found = walk(dir.path(), &WalkFilters::default());
        assert!(found.is_empty());
    }
}
