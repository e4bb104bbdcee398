//! # contract: records, walkers and the sink they write to
//!
//! This module holds the plain data that flows through an extraction run and
//! the two traits at its seams:
//!
//! - [`Walker`]: discovers candidate files under a root and routes them
//!   through normalization into a sink. Implemented by
//!   [`crate::local::LocalWalker`] and [`crate::download::RemoteWalker`].
//! - [`RecordSink`]: append-only destination for [`Record`]s. Implemented by
//!   [`crate::sink::JsonlSink`].
//!
//! ## Mocking & Testing
//! - [`RecordSink`] is annotated for `mockall`; the generated `MockRecordSink`
//!   is exported under the `test-export-mocks` feature so integration tests
//!   can assert on exactly which records a walker emits.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;
use serde::{Deserialize, Serialize};

use crate::error::{ExtractError, SinkError};

/// One line of the output library.
///
/// Local records carry only `title` and `text`; remote records also carry
/// their provenance. Field order matches the serialized JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    #[serde(default)]
    pub text: String,
}

impl Record {
    pub fn local(title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            repo_owner: None,
            repo_name: None,
            module: None,
            text: text.into(),
        }
    }

    pub fn remote(title: impl Into<String>, repo: &RepoInfo, text: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            repo_owner: Some(repo.owner.clone()),
            repo_name: Some(repo.repo.clone()),
            module: Some(repo.module_label()),
            text: text.into(),
        }
    }
}

/// Identifies a remote source tree and the directory currently being visited.
///
/// Values are never mutated during traversal: each recursive step derives a
/// fresh one with [`RepoInfo::with_module`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoInfo {
    pub owner: String,
    pub repo: String,
    pub module: PathBuf,
}

impl RepoInfo {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            module: PathBuf::new(),
        }
    }

    pub fn with_module(&self, module: impl Into<PathBuf>) -> Self {
        Self {
            owner: self.owner.clone(),
            repo: self.repo.clone(),
            module: module.into(),
        }
    }

    /// Dotted module name used in records: `docs/api` becomes `docs.api`,
    /// the repository root becomes `.`.
    pub fn module_label(&self) -> String {
        let raw = self.module.to_string_lossy();
        if raw.is_empty() {
            ".".to_string()
        } else {
            raw.replace(['/', '\\'], ".")
        }
    }
}

/// Set of file suffixes (with leading dot) a walker should pick up.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FileTypes(BTreeSet<String>);

impl FileTypes {
    pub fn new<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let set = types
            .into_iter()
            .map(|t| t.as_ref().trim().to_string())
            .filter(|t| !t.is_empty())
            .map(|t| if t.starts_with('.') { t } else { format!(".{t}") })
            .collect();
        Self(set)
    }

    /// Matches on the final suffix of the file name, so `notes.tar.md` has
    /// suffix `.md` and a bare `.md` dotfile has none.
    pub fn matches(&self, path: &Path) -> bool {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => self.0.contains(&format!(".{ext}")),
            None => false,
        }
    }

    pub fn matches_name(&self, name: &str) -> bool {
        self.matches(Path::new(name))
    }
}

/// Counters a walker accumulates while traversing a tree.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WalkReport {
    pub dirs_visited: usize,
    pub records_written: usize,
    pub files_staged: usize,
    /// Subtrees or entries that were intentionally passed over.
    pub skipped: usize,
    /// Files that matched but could not be read, downloaded or written.
    pub failed: usize,
}

impl WalkReport {
    pub fn merge(&mut self, other: &WalkReport) {
        self.dirs_visited += other.dirs_visited;
        self.records_written += other.records_written;
        self.files_staged += other.files_staged;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

/// Append-only destination for records.
///
/// Implementations must make every successful `append` durable on its own:
/// a crash after it returns must not lose that record.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait RecordSink: Send + Sync {
    fn append(&self, record: &Record) -> Result<(), SinkError>;
}

/// Traversal strategy over a source tree.
///
/// `root` is interpreted by the implementation: a filesystem directory for
/// the local walker, a path inside the repository for the remote one.
#[async_trait]
pub trait Walker: Send + Sync {
    async fn walk(
        &self,
        root: &Path,
        sink: &dyn RecordSink,
        file_types: &FileTypes,
    ) -> Result<WalkReport, ExtractError>;
}

/// Appends `record` and updates `report`. A record-level failure is logged
/// and counted; an unavailable sink is returned as an error.
pub(crate) fn emit(
    sink: &dyn RecordSink,
    record: &Record,
    report: &mut WalkReport,
) -> Result<(), ExtractError> {
    if record.text.is_empty() {
        tracing::debug!(title = %record.title, "Record text is empty after normalization");
    }
    match sink.append(record) {
        Ok(()) => {
            report.records_written += 1;
            Ok(())
        }
        Err(e) if e.is_fatal() => {
            tracing::error!(error = %e, title = %record.title, "Output sink unavailable, aborting");
            Err(ExtractError::Sink(e))
        }
        Err(e) => {
            tracing::warn!(error = %e, title = %record.title, "Failed to write record, skipping");
            report.failed += 1;
            Ok(())
        }
    }
}
