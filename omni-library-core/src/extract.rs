//! High-level pipeline: prepares the dated library file and runs one walker
//! strategy into it.
//!
//! # Responsibilities
//! - Validate the configuration before anything on disk is touched
//! - Resolve `{base_dir}/dbdata/omni_library_YYYY_MM_DD.jsonl`, create its
//!   directory and remove a previous file from the same day
//! - Dispatch on [`RunMode`]: one [`LocalWalker`] pass over the local root,
//!   or one [`RemoteWalker`] pass per configured repository
//! - Aggregate the per-walk counters into a [`RunReport`]
//!
//! # Error Handling
//! Configuration errors, an unavailable output file and cancellation end the
//! run. Failures inside a walk are counted in its [`WalkReport`] instead.
//!
//! # Navigation
//! - Main entrypoints: [`run`], [`run_on`]

use std::path::PathBuf;

use chrono::{Local, NaiveDate};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::{ExtractConfig, RunMode};
use crate::contract::{FileTypes, WalkReport, Walker};
use crate::download::{build_client, RemoteOptions, RemoteWalker};
use crate::error::ExtractError;
use crate::local::LocalWalker;
use crate::sink::{prepare_output, JsonlSink};

/// Outcome of a single walk within a run.
#[derive(Debug, Clone, Serialize)]
pub struct WalkSummary {
    /// Local root path, or `owner/repo:path` for remote walks.
    pub label: String,
    pub report: WalkReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub output_path: PathBuf,
    pub mode: RunMode,
    pub walks: Vec<WalkSummary>,
    pub total: WalkReport,
}

impl RunReport {
    pub fn log_summary(&self) {
        for walk in &self.walks {
            info!(
                source = %walk.label,
                records = walk.report.records_written,
                staged = walk.report.files_staged,
                skipped = walk.report.skipped,
                failed = walk.report.failed,
                "Walk summary"
            );
        }
        info!(
            output = %self.output_path.display(),
            mode = ?self.mode,
            records = self.total.records_written,
            staged = self.total.files_staged,
            skipped = self.total.skipped,
            failed = self.total.failed,
            "Extraction summary"
        );
    }
}

struct WalkJob {
    label: String,
    root: PathBuf,
    file_types: FileTypes,
    walker: Box<dyn Walker>,
}

/// Runs an extraction dated today (local time).
pub async fn run(
    config: &ExtractConfig,
    cancel: CancellationToken,
) -> Result<RunReport, ExtractError> {
    run_on(config, Local::now().date_naive(), cancel).await
}

/// Runs an extraction into the library file for `date`, replacing any file
/// already there.
pub async fn run_on(
    config: &ExtractConfig,
    date: NaiveDate,
    cancel: CancellationToken,
) -> Result<RunReport, ExtractError> {
    config.validate()?;

    let output_path = config.output_path(date);
    prepare_output(&output_path)?;
    info!(path = %output_path.display(), mode = ?config.mode, "Starting extraction");

    let jobs = plan(config, &cancel)?;
    let sink = JsonlSink::new(&output_path);

    let mut walks = Vec::with_capacity(jobs.len());
    let mut total = WalkReport::default();
    for job in jobs {
        info!(source = %job.label, "Starting walk");
        let report = match job.walker.walk(&job.root, &sink, &job.file_types).await {
            Ok(report) => report,
            Err(e) => {
                error!(source = %job.label, error = %e, "Walk aborted");
                return Err(e);
            }
        };
        total.merge(&report);
        walks.push(WalkSummary {
            label: job.label,
            report,
        });
    }

    let report = RunReport {
        output_path,
        mode: config.mode,
        walks,
        total,
    };
    report.log_summary();
    Ok(report)
}

fn plan(config: &ExtractConfig, cancel: &CancellationToken) -> Result<Vec<WalkJob>, ExtractError> {
    match config.mode {
        RunMode::Local => {
            let root = config
                .local
                .path
                .clone()
                .ok_or_else(|| ExtractError::Config("local source path is not set".to_string()))?;
            Ok(vec![WalkJob {
                label: root.display().to_string(),
                root,
                file_types: config.local_file_types(),
                walker: Box::new(LocalWalker::new(&config.local.pattern, cancel.clone())),
            }])
        }
        RunMode::Remote => {
            let token = config
                .github
                .token
                .clone()
                .ok_or_else(|| ExtractError::Config("GITHUB_TOKEN is not set".to_string()))?;
            let client = build_client(&config.http)?;
            let options = RemoteOptions {
                api_base: config.github.api_base_url.clone(),
                token,
                staging_root: config.output_dir(),
                output: config.github.output,
                http: config.http.clone(),
            };
            Ok(config
                .github
                .repos
                .iter()
                .map(|source| WalkJob {
                    label: format!("{}/{}:{}", source.owner, source.repo, source.path),
                    root: PathBuf::from(&source.path),
                    file_types: FileTypes::new(&source.file_types),
                    walker: Box::new(RemoteWalker::new(
                        client.clone(),
                        options.clone(),
                        &source.owner,
                        &source.repo,
                        cancel.clone(),
                    )),
                })
                .collect())
        }
    }
}
