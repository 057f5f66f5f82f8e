//! Discovering plain-text documents in the configured folder.

use std::path::{Path, PathBuf};

use globset::{Glob, GlobMatcher};
use walkdir::WalkDir;

/// A document file we found: path and full text.
#[derive(Debug, Clone)]
pub struct Document {
    pub path: PathBuf,
    pub text: String,
}

/// Scans `root` for files whose path relative to `root` matches `pattern`.
/// Results are sorted by path so chunk ids come out the same on every run.
pub fn scan_documents(root: &Path, pattern: &str) -> Result<Vec<Document>, ScanError> {
    if !root.is_dir() {
        return Err(ScanError::NotADirectory(root.to_path_buf()));
    }
    let matcher = compile_glob(pattern)?;
    let mut docs = Vec::new();
    for entry in WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e))
    {
        let entry = entry.map_err(|e| ScanError::Walk(e.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        if !matcher.is_match(relative) {
            continue;
        }
        let text = std::fs::read_to_string(path).map_err(|e| ScanError::Read(path.to_path_buf(), e))?;
        docs.push(Document {
            path: path.to_path_buf(),
            text,
        });
    }
    tracing::debug!("scanned {} document(s) under {}", docs.len(), root.display());
    Ok(docs)
}

fn compile_glob(pattern: &str) -> Result<GlobMatcher, ScanError> {
    globset::GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map(|g: Glob| g.compile_matcher())
        .map_err(|e| ScanError::Glob(pattern.to_string(), e.to_string()))
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),
    #[error("invalid glob {0:?}: {1}")]
    Glob(String, String),
    #[error("walk error: {0}")]
    Walk(String),
    #[error("read error for {0}: {1}")]
    Read(PathBuf, std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, body: &str) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, body).unwrap();
    }

    #[test]
    fn top_level_glob_is_sorted_and_filtered() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "b.txt", "second");
        write(tmp.path(), "a.txt", "first");
        write(tmp.path(), "notes.md", "skip");
        write(tmp.path(), "nested/c.txt", "deep");
        write(tmp.path(), ".hidden.txt", "skip");

        let docs = scan_documents(tmp.path(), "*.txt").unwrap();
        let names: Vec<_> = docs
            .iter()
            .map(|d| d.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["a.txt", "b.txt"]);
        assert_eq!(docs[0].text, "first");
    }

    #[test]
    fn recursive_glob_reaches_subfolders() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "a.txt", "x");
        write(tmp.path(), "nested/c.txt", "y");
        let docs = scan_documents(tmp.path(), "**/*.txt").unwrap();
        assert_eq!(docs.len(), 2);
    }

    #[test]
    fn missing_root_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = scan_documents(&tmp.path().join("nope"), "*.txt").unwrap_err();
        assert!(matches!(err, ScanError::NotADirectory(_)));
    }

    #[test]
    fn bad_glob_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = scan_documents(tmp.path(), "[").unwrap_err();
        assert!(matches!(err, ScanError::Glob(..)));
    }
}
