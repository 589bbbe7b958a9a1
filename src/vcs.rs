//! Narrow synchronous interface to version-control history.
//!
//! The resolution classifier only ever needs one question answered: does this
//! path still exist, and how many commits touched it since a date. Keeping
//! the interface that small lets tests substitute an in-memory fake.
use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Command;

/// Answer to a single version-control query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VcsAnswer {
    pub exists: bool,
    pub commit_count: usize,
}

/// `(path, since?) -> {exists, commit_count}` over the working tree.
pub trait VcsQuery {
    fn query(&self, path: &str, since: Option<NaiveDate>) -> Result<VcsAnswer>;
}

/// Git-backed implementation shelling out to the `git` CLI.
pub struct GitCli {
    repo_root: PathBuf,
    git: PathBuf,
}

impl GitCli {
    /// Locate `git` on PATH and bind the query to a repository root.
    pub fn discover(repo_root: PathBuf) -> Result<GitCli> {
        let git = which::which("git").context("locate git on PATH")?;
        Ok(GitCli { repo_root, git })
    }
}

impl VcsQuery for GitCli {
    fn query(&self, path: &str, since: Option<NaiveDate>) -> Result<VcsAnswer> {
        let exists = self.repo_root.join(path).exists();

        let mut command = Command::new(&self.git);
        command
            .arg("-C")
            .arg(&self.repo_root)
            .arg("log")
            .arg("--oneline");
        if let Some(since) = since {
            command.arg(format!("--since={}", since.format("%Y-%m-%d")));
        }
        command.arg("--").arg(path);
        command.env("LC_ALL", "C");

        let output = command
            .output()
            .with_context(|| format!("run git log for {path}"))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("git log failed for {path}: {}", stderr.trim());
        }
        let commit_count = output
            .stdout
            .split(|byte| *byte == b'\n')
            .filter(|line| !line.is_empty())
            .count();
        Ok(VcsAnswer {
            exists,
            commit_count,
        })
    }
}

/// In-memory double for tests: answers from a fixed map, unknown paths are
/// reported as deleted with no history.
#[derive(Debug, Default, Clone)]
pub struct FakeVcs {
    answers: BTreeMap<String, VcsAnswer>,
    failing: bool,
}

impl FakeVcs {
    pub fn with_answer(mut self, path: &str, exists: bool, commit_count: usize) -> Self {
        self.answers.insert(
            path.to_string(),
            VcsAnswer {
                exists,
                commit_count,
            },
        );
        self
    }

    /// Make every query fail, for exercising the degrade-to-unknown path.
    pub fn failing() -> Self {
        FakeVcs {
            answers: BTreeMap::new(),
            failing: true,
        }
    }
}

impl VcsQuery for FakeVcs {
    fn query(&self, path: &str, _since: Option<NaiveDate>) -> Result<VcsAnswer> {
        if self.failing {
            anyhow::bail!("fake vcs failure for {path}");
        }
        Ok(self
            .answers
            .get(path)
            .copied()
            .unwrap_or(VcsAnswer {
                exists: false,
                commit_count: 0,
            }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_answers_and_defaults() {
        let vcs = FakeVcs::default().with_answer("src/app.ts", true, 2);
        let answer = vcs.query("src/app.ts", None).unwrap();
        assert_eq!(answer, VcsAnswer { exists: true, commit_count: 2 });
        let missing = vcs.query("src/gone.ts", None).unwrap();
        assert!(!missing.exists);
    }

    #[test]
    fn failing_fake_propagates_errors() {
        let vcs = FakeVcs::failing();
        assert!(vcs.query("src/app.ts", None).is_err());
    }
}
