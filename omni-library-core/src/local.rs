//! Local filesystem walker: globs a directory tree and emits one record per
//! matching file, titled with the file name and carrying no provenance.

use std::fs;
use std::path::Path;

use async_trait::async_trait;
use glob::Pattern;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::contract::{emit, FileTypes, Record, RecordSink, WalkReport, Walker};
use crate::error::ExtractError;
use crate::preprocess::normalize;

pub const DEFAULT_PATTERN: &str = "**/*.md";

pub struct LocalWalker {
    pattern: String,
    cancel: CancellationToken,
}

impl LocalWalker {
    pub fn new(pattern: impl Into<String>, cancel: CancellationToken) -> Self {
        Self {
            pattern: pattern.into(),
            cancel,
        }
    }

    /// Walks `path`, normalizing every file whose suffix is in `file_types`.
    pub fn walk_local(
        &self,
        path: &Path,
        sink: &dyn RecordSink,
        file_types: &FileTypes,
    ) -> Result<WalkReport, ExtractError> {
        if !path.is_dir() {
            return Err(ExtractError::Config(format!(
                "local source path {} is not a directory",
                path.display()
            )));
        }

        info!(path = %path.display(), pattern = %self.pattern, "Processing local directory");
        let full_pattern = format!(
            "{}/{}",
            Pattern::escape(&path.to_string_lossy()),
            self.pattern
        );
        let entries = glob::glob(&full_pattern).map_err(|e| {
            ExtractError::Config(format!("invalid glob pattern {:?}: {e}", self.pattern))
        })?;

        let mut report = WalkReport {
            dirs_visited: 1,
            ..WalkReport::default()
        };

        for entry in entries {
            if self.cancel.is_cancelled() {
                warn!(path = %path.display(), "Local walk cancelled");
                return Err(ExtractError::Cancelled);
            }

            let file = match entry {
                Ok(file) => file,
                Err(e) => {
                    warn!(error = %e, "Failed to read glob entry, skipping");
                    report.failed += 1;
                    continue;
                }
            };
            if !file.is_file() {
                continue;
            }
            if !file_types.matches(&file) {
                debug!(file = %file.display(), "File type not selected, skipping");
                report.skipped += 1;
                continue;
            }

            let title = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let raw = match fs::read_to_string(&file) {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(error = %e, file = %file.display(), "Failed to read file, skipping");
                    report.failed += 1;
                    continue;
                }
            };

            info!(file = %title, "Processing document");
            emit(sink, &Record::local(title, normalize(&raw)), &mut report)?;
        }

        info!(
            path = %path.display(),
            records = report.records_written,
            skipped = report.skipped,
            failed = report.failed,
            "Finished local directory"
        );
        Ok(report)
    }
}

#[async_trait]
impl Walker for LocalWalker {
    async fn walk(
        &self,
        root: &Path,
        sink: &dyn RecordSink,
        file_types: &FileTypes,
    ) -> Result<WalkReport, ExtractError> {
        self.walk_local(root, sink, file_types)
    }
}
