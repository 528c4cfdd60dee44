//! Blacklist store: locates a blacklist set on disk, parses it into ordered
//! rule lists and exposes its version marker.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::warn;

use crate::config::BlacklistConfig;
use crate::engine::{split_lines, strip_line, Diagnostic, RuleList};

pub const VERSION_FILENAME: &str = "version";

#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("blacklist index not found at {}", .0.display())]
    IndexMissing(PathBuf),
    #[error("failed to read blacklist index {}: {source}", .path.display())]
    IndexUnreadable {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Where a blacklist set comes from.
#[derive(Debug, Clone)]
pub enum BlacklistSource {
    /// Directory containing an index file, a version marker and rule files.
    Dir(PathBuf),
    /// Explicit ordered rule files. No index, no version, not updatable.
    Files(Vec<PathBuf>),
}

/// An immutable, fully loaded blacklist set. Owned here, borrowed read-only
/// by the matcher, replaced wholesale by the updater.
#[derive(Debug, Clone, Default)]
pub struct BlacklistSet {
    pub lists: Vec<RuleList>,
    pub version: Option<String>,
    /// Non-fatal problems encountered while loading.
    pub diagnostics: Vec<Diagnostic>,
}

impl BlacklistSet {
    pub fn rule_count(&self) -> usize {
        self.lists.iter().map(RuleList::len).sum()
    }
}

#[derive(Debug, Clone)]
pub struct BlacklistStore {
    source: BlacklistSource,
    index_filename: String,
}

impl BlacklistStore {
    pub fn new(source: BlacklistSource, index_filename: impl Into<String>) -> Self {
        Self {
            source,
            index_filename: index_filename.into(),
        }
    }

    pub fn from_config(config: &BlacklistConfig) -> Self {
        let source = if config.files.is_empty() {
            BlacklistSource::Dir(config.directory.clone())
        } else {
            BlacklistSource::Files(config.files.clone())
        };
        Self::new(source, config.index_filename.clone())
    }

    pub fn index_filename(&self) -> &str {
        &self.index_filename
    }

    /// The store directory, for directory-backed stores.
    pub fn directory(&self) -> Option<&Path> {
        match &self.source {
            BlacklistSource::Dir(dir) => Some(dir),
            BlacklistSource::Files(_) => None,
        }
    }

    pub fn index_path(&self) -> Option<PathBuf> {
        self.directory().map(|d| d.join(&self.index_filename))
    }

    pub fn version_path(&self) -> Option<PathBuf> {
        self.directory().map(|d| d.join(VERSION_FILENAME))
    }

    /// Filenames listed by the index, in match order. Blank lines and `#`
    /// comments are ignored, like in rule files.
    pub fn index_entries(&self) -> Result<Vec<String>, ResolutionError> {
        let path = match self.index_path() {
            Some(p) => p,
            None => return Ok(vec![]),
        };
        let text = match fs::read_to_string(&path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ResolutionError::IndexMissing(path))
            }
            Err(e) => return Err(ResolutionError::IndexUnreadable { path, source: e }),
        };
        Ok(split_lines(&text)
            .into_iter()
            .map(strip_line)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Loads the whole set. Bad lines and unreadable rule files are skipped
    /// and surface as diagnostics on the returned set; only a missing or
    /// unreadable index is fatal.
    pub fn resolve(&self) -> Result<BlacklistSet, ResolutionError> {
        let mut set = BlacklistSet::default();

        let file_refs: Vec<(String, PathBuf)> = match &self.source {
            BlacklistSource::Dir(dir) => self
                .index_entries()?
                .into_iter()
                .map(|name| {
                    let path = resolve_path(dir, &name);
                    (name, path)
                })
                .collect(),
            BlacklistSource::Files(files) => files
                .iter()
                .map(|p| (p.display().to_string(), p.clone()))
                .collect(),
        };

        for (name, path) in file_refs {
            let (list, diags) = match load_rule_file(&name, &path) {
                Ok(parsed) => parsed,
                Err(diag) => {
                    warn!(%diag, "skipping rule file");
                    set.diagnostics.push(diag);
                    continue;
                }
            };
            for diag in &diags {
                warn!(%diag, "skipping rule line");
            }
            set.diagnostics.extend(diags);
            set.lists.push(list);
        }

        set.version = self.version();
        Ok(set)
    }

    /// Raw bytes of the version marker, for byte-for-byte comparison with a
    /// fetched remote marker.
    pub fn version_bytes(&self) -> Option<Vec<u8>> {
        fs::read(self.version_path()?).ok()
    }

    /// The version marker as a trimmed string, `None` when the store has no
    /// notion of versioning.
    pub fn version(&self) -> Option<String> {
        self.version_bytes()
            .map(|b| String::from_utf8_lossy(&b).trim().to_string())
    }
}

/// Resolves an index entry to a concrete path: an absolute entry wins,
/// anything else is taken relative to the store directory.
pub fn resolve_path(base: &Path, name: &str) -> PathBuf {
    let candidate = Path::new(name);
    if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        base.join(candidate)
    }
}

fn load_rule_file(name: &str, path: &Path) -> Result<(RuleList, Vec<Diagnostic>), Diagnostic> {
    let bytes = fs::read(path).map_err(|e| Diagnostic::UnreadableFile {
        file: name.to_string(),
        error: e.to_string(),
    })?;
    let text = String::from_utf8_lossy(&bytes);
    Ok(RuleList::parse(name, &text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn write_file(dir: &Path, name: &str, contents: &str) {
        let mut f = fs::File::create(dir.join(name)).unwrap();
        write!(f, "{contents}").unwrap();
    }

    #[test]
    fn resolve_path_precedence() {
        let base = Path::new("/var/lib/spamfence");
        assert_eq!(
            resolve_path(base, "keywords.txt"),
            PathBuf::from("/var/lib/spamfence/keywords.txt")
        );
        assert_eq!(
            resolve_path(base, "/etc/spam/extra.txt"),
            PathBuf::from("/etc/spam/extra.txt")
        );
    }

    #[test]
    fn missing_index_is_fatal() {
        let dir = tempdir().unwrap();
        let store = BlacklistStore::new(BlacklistSource::Dir(dir.path().to_path_buf()), "index");
        match store.resolve() {
            Err(ResolutionError::IndexMissing(path)) => {
                assert_eq!(path, dir.path().join("index"));
            }
            other => panic!("expected IndexMissing, got {other:?}"),
        }
    }

    #[test]
    fn resolves_lists_in_index_order() {
        let dir = tempdir().unwrap();
        write_file(dir.path(), "index", "# ordered\nsecond.txt\nfirst.txt\n\n");
        write_file(dir.path(), "first.txt", "foo\n");
        write_file(dir.path(), "second.txt", "bar\n");
        write_file(dir.path(), "version", "2024-01-01\n");

        let store = BlacklistStore::new(BlacklistSource::Dir(dir.path().to_path_buf()), "index");
        let set = store.resolve().unwrap();

        assert_eq!(set.lists.len(), 2);
        assert_eq!(set.lists[0].name, "second.txt");
        assert_eq!(set.lists[1].name, "first.txt");
        assert_eq!(set.version.as_deref(), Some("2024-01-01"));
        assert!(set.diagnostics.is_empty());
    }

    #[test]
    fn missing_rule_file_is_a_diagnostic_not_an_error() {
        let dir = tempdir().unwrap();
        write_file(dir.path(), "index", "present.txt\nabsent.txt\n");
        write_file(dir.path(), "present.txt", "spam\n");

        let store = BlacklistStore::new(BlacklistSource::Dir(dir.path().to_path_buf()), "index");
        let set = store.resolve().unwrap();

        assert_eq!(set.lists.len(), 1);
        assert_eq!(set.diagnostics.len(), 1);
        assert!(matches!(
            &set.diagnostics[0],
            Diagnostic::UnreadableFile { file, .. } if file == "absent.txt"
        ));
    }

    #[test]
    fn explicit_file_list_has_no_version() {
        let dir = tempdir().unwrap();
        write_file(dir.path(), "a.txt", "foo\n");
        write_file(dir.path(), "b.txt", "bar\n");

        let store = BlacklistStore::new(
            BlacklistSource::Files(vec![dir.path().join("a.txt"), dir.path().join("b.txt")]),
            "index",
        );
        let set = store.resolve().unwrap();

        assert_eq!(set.lists.len(), 2);
        assert_eq!(set.version, None);
        assert!(store.index_path().is_none());
    }
}
