//! Typed paths into a project ledger layout.
//!
//! Centralizing path construction keeps file access consistent across the
//! pipeline and gives every entry point one place to enforce that
//! user-supplied paths stay inside the project root.
use crate::schema::Category;
use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Convenience wrapper for locating ledger artifacts under a project root.
#[derive(Debug, Clone)]
pub struct ProjectPaths {
    root: PathBuf,
}

impl ProjectPaths {
    /// Create a new path helper rooted at the project root.
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Return the project root used for path derivation.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Return the `ledger/` directory path.
    pub fn ledger_dir(&self) -> PathBuf {
        self.root.join("ledger")
    }

    /// Return the `ledger/findings.jsonl` store path.
    pub fn store_path(&self) -> PathBuf {
        self.ledger_dir().join("findings.jsonl")
    }

    /// Return the `ledger/validation_state.json` path.
    pub fn state_path(&self) -> PathBuf {
        self.ledger_dir().join("validation_state.json")
    }

    /// Return the `ledger/validation_report.md` path.
    pub fn report_path(&self) -> PathBuf {
        self.ledger_dir().join("validation_report.md")
    }

    /// Return the `findings/` batch root path.
    pub fn findings_dir(&self) -> PathBuf {
        self.root.join("findings")
    }

    /// Return the per-category batch directory path.
    pub fn category_dir(&self, category: Category) -> PathBuf {
        self.findings_dir().join(category.dir_name())
    }

    /// Return the dated batch path for a category.
    pub fn batch_path(&self, category: Category, date: NaiveDate) -> PathBuf {
        self.category_dir(category)
            .join(format!("{}.jsonl", date.format("%Y-%m-%d")))
    }
}

/// Resolve and create the project root directory.
pub fn ensure_project_root(path: &Path, create: bool) -> Result<PathBuf> {
    if create {
        fs::create_dir_all(path).context("create project root")?;
    }
    path.canonicalize()
        .with_context(|| format!("resolve project root {}", path.display()))
}

/// Resolve a user-supplied path and reject anything that escapes the project
/// root, whether by `..` traversal or by a symlink pointing outside.
///
/// The check runs before any read or write: the deepest existing ancestor is
/// canonicalized (resolving symlinks), the non-existing remainder is appended
/// verbatim, and the result must stay under the canonical root.
pub fn resolve_in_root(root: &Path, candidate: &Path) -> Result<PathBuf> {
    let root = root
        .canonicalize()
        .with_context(|| format!("resolve project root {}", root.display()))?;
    let joined = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        root.join(candidate)
    };
    let resolved = resolve_existing_prefix(&joined)?;
    if !resolved.starts_with(&root) {
        return Err(anyhow!(
            "path {} escapes project root {}",
            candidate.display(),
            root.display()
        ));
    }
    Ok(resolved)
}

/// Canonicalize the deepest existing ancestor of `path` and re-append the
/// remaining components, rejecting traversal in the non-existing tail.
fn resolve_existing_prefix(path: &Path) -> Result<PathBuf> {
    let mut existing = path.to_path_buf();
    let mut tail: Vec<std::ffi::OsString> = Vec::new();
    loop {
        if existing.exists() {
            break;
        }
        let Some(name) = existing.file_name() else {
            break;
        };
        tail.push(name.to_os_string());
        existing = existing
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("/"));
    }
    let mut resolved = existing
        .canonicalize()
        .with_context(|| format!("resolve {}", existing.display()))?;
    for name in tail.iter().rev() {
        let component = Path::new(name)
            .components()
            .next()
            .ok_or_else(|| anyhow!("empty path component in {}", path.display()))?;
        match component {
            Component::Normal(part) => resolved.push(part),
            _ => {
                return Err(anyhow!(
                    "path {} contains traversal components",
                    path.display()
                ));
            }
        }
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn batch_path_is_category_and_date_scoped() {
        let paths = ProjectPaths::new(PathBuf::from("/proj"));
        let date = NaiveDate::from_ymd_opt(2026, 8, 5).unwrap();
        assert_eq!(
            paths.batch_path(Category::Security, date),
            PathBuf::from("/proj/findings/security/2026-08-05.jsonl")
        );
    }

    #[test]
    fn rejects_parent_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve_in_root(dir.path(), Path::new("../../etc/passwd")).unwrap_err();
        assert!(err.to_string().contains("escapes project root"));
    }

    #[test]
    fn rejects_symlink_escape() {
        let dir = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        let link = dir.path().join("link");
        std::os::unix::fs::symlink(outside.path(), &link).unwrap();
        let err = resolve_in_root(dir.path(), Path::new("link/batch.jsonl")).unwrap_err();
        assert!(err.to_string().contains("escapes project root"));
    }

    #[test]
    fn accepts_nested_paths_that_do_not_exist_yet() {
        let dir = tempfile::tempdir().unwrap();
        let resolved =
            resolve_in_root(dir.path(), Path::new("findings/security/2026-08-05.jsonl")).unwrap();
        assert!(resolved.starts_with(dir.path().canonicalize().unwrap()));
    }
}
