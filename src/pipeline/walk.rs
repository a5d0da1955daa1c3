//! Deterministic directory walks over a working tree.
//!
//! Every walk returns a fresh, immutable list of matches. Entries are visited
//! depth-first with siblings sorted by file name, so "first match" means the
//! same file on every platform and every run.

use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// All regular files under `root`, depth-first, siblings sorted by name.
pub fn files_under(root: &Path) -> Vec<PathBuf> {
    files_matching(root, |_| true)
}

/// Regular files under `root` accepted by `keep`.
pub fn files_matching(root: &Path, keep: impl Fn(&Path) -> bool) -> Vec<PathBuf> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!("Skipping unreadable entry under {}: {}", root.display(), e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
        .filter(|path| keep(path.as_path()))
        .collect()
}

/// First file under `root` whose file name equals `name`.
pub fn find_named(root: &Path, name: &str) -> Option<PathBuf> {
    let matches = files_matching(root, |p| p.file_name().is_some_and(|n| n == name));
    if matches.len() > 1 {
        debug!(
            "{} files named '{}' under {}; using {}",
            matches.len(),
            name,
            root.display(),
            matches[0].display()
        );
    }
    matches.into_iter().next()
}

/// Lower-cased extension of `path`, if any.
pub fn extension_lower(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn walk_is_sorted_depth_first() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("b/inner")).unwrap();
        fs::write(dir.path().join("c.txt"), "c").unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();
        fs::write(dir.path().join("b/inner/x.txt"), "x").unwrap();
        fs::write(dir.path().join("b/y.txt"), "y").unwrap();

        let names: Vec<String> = files_under(dir.path())
            .iter()
            .map(|p| {
                p.strip_prefix(dir.path())
                    .unwrap()
                    .to_string_lossy()
                    .replace('\\', "/")
            })
            .collect();
        assert_eq!(names, ["a.txt", "b/inner/x.txt", "b/y.txt", "c.txt"]);
    }

    #[test]
    fn repeated_walks_do_not_accumulate() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("one.png"), "1").unwrap();
        assert_eq!(files_under(dir.path()).len(), 1);
        assert_eq!(files_under(dir.path()).len(), 1);
    }

    #[test]
    fn find_named_returns_first_in_walk_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("a")).unwrap();
        fs::create_dir_all(dir.path().join("z")).unwrap();
        fs::write(dir.path().join("z/logo.png"), "z").unwrap();
        fs::write(dir.path().join("a/logo.png"), "a").unwrap();

        let found = find_named(dir.path(), "logo.png").unwrap();
        assert!(found.ends_with("a/logo.png"));
        assert!(find_named(dir.path(), "missing.png").is_none());
    }

    #[test]
    fn extension_is_lowercased() {
        assert_eq!(extension_lower(Path::new("a/B.PNG")).as_deref(), Some("png"));
        assert_eq!(extension_lower(Path::new("noext")), None);
    }
}
