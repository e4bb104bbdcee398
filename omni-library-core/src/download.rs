//! Remote walker over the GitHub contents API.
//!
//! [`RemoteWalker`] lists `/repos/{owner}/{repo}/contents/{path}` and descends
//! into every `dir` entry depth-first. Each `file` entry with a selected
//! suffix is downloaded through its `download_url` and, depending on
//! [`RemoteOutput`]:
//!   - staged verbatim under `{staging_root}/{module}/{name}`
//!   - normalized and emitted as a record tagged with owner, repo and module
//!
//! A failed listing skips that subtree and a failed download skips that
//! file. Only an unavailable sink or cancellation ends the walk early.

use std::fs;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use reqwest::{header, Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{HttpConfig, RemoteOutput};
use crate::contract::{emit, FileTypes, Record, RecordSink, RepoInfo, WalkReport, Walker};
use crate::error::ExtractError;
use crate::preprocess::normalize;

const ACCEPT_RAW: &str = "application/vnd.github.v3.raw";
pub const USER_AGENT: &str = "omni-library";

/// One entry of a contents API listing.
#[derive(Debug, Clone, Deserialize)]
pub struct ContentEntry {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub download_url: Option<String>,
}

impl ContentEntry {
    pub fn is_dir(&self) -> bool {
        self.kind == "dir"
    }

    pub fn is_file(&self) -> bool {
        self.kind == "file"
    }
}

/// The contents API answers with an array for directories and a single
/// object when `path` names a file.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Listing {
    Many(Vec<ContentEntry>),
    One(ContentEntry),
}

impl Listing {
    fn into_entries(self) -> Vec<ContentEntry> {
        match self {
            Listing::Many(entries) => entries,
            Listing::One(entry) => vec![entry],
        }
    }
}

/// Builds the shared HTTP client with the configured per-request timeout.
pub fn build_client(http: &HttpConfig) -> Result<Client, ExtractError> {
    Ok(Client::builder()
        .timeout(http.timeout())
        .user_agent(USER_AGENT)
        .build()?)
}

/// Settings shared by every repository walked in one run.
#[derive(Debug, Clone)]
pub struct RemoteOptions {
    pub api_base: String,
    pub token: String,
    /// Directory raw files are staged under, usually `{base_dir}/dbdata`.
    pub staging_root: PathBuf,
    pub output: RemoteOutput,
    pub http: HttpConfig,
}

pub struct RemoteWalker {
    client: Client,
    options: RemoteOptions,
    owner: String,
    repo: String,
    cancel: CancellationToken,
}

impl RemoteWalker {
    pub fn new(
        client: Client,
        options: RemoteOptions,
        owner: impl Into<String>,
        repo: impl Into<String>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            client,
            options,
            owner: owner.into(),
            repo: repo.into(),
            cancel,
        }
    }

    pub fn repo_info(&self) -> RepoInfo {
        RepoInfo::new(&self.owner, &self.repo)
    }

    fn contents_url(&self, repo: &RepoInfo, path: &str) -> String {
        format!(
            "{}/repos/{}/{}/contents/{}",
            self.options.api_base.trim_end_matches('/'),
            repo.owner,
            repo.repo,
            path
        )
    }

    /// Walks `path` inside the repository described by `repo`.
    pub async fn walk_remote(
        &self,
        path: &str,
        repo: RepoInfo,
        sink: &dyn RecordSink,
        file_types: &FileTypes,
    ) -> Result<WalkReport, ExtractError> {
        let mut report = WalkReport::default();
        let path = path.trim_matches('/').to_string();
        let repo = repo.with_module(&path);
        self.walk_dir(path, repo, sink, file_types, &mut report)
            .await?;
        info!(
            owner = %self.owner,
            repo = %self.repo,
            dirs = report.dirs_visited,
            records = report.records_written,
            staged = report.files_staged,
            skipped = report.skipped,
            failed = report.failed,
            "Finished remote repository"
        );
        Ok(report)
    }

    fn walk_dir<'a>(
        &'a self,
        path: String,
        repo: RepoInfo,
        sink: &'a dyn RecordSink,
        file_types: &'a FileTypes,
        report: &'a mut WalkReport,
    ) -> BoxFuture<'a, Result<(), ExtractError>> {
        async move {
            if self.cancel.is_cancelled() {
                warn!(path = %path, "Remote walk cancelled");
                return Err(ExtractError::Cancelled);
            }

            info!(path = %path, repo = %repo.repo, "Processing directory");
            let Some(entries) = self.list(&repo, &path).await else {
                report.skipped += 1;
                return Ok(());
            };
            report.dirs_visited += 1;

            for entry in entries {
                if entry.is_dir() {
                    let child = repo.with_module(&entry.path);
                    self.walk_dir(entry.path.clone(), child, sink, file_types, report)
                        .await?;
                } else if entry.is_file() && file_types.matches_name(&entry.name) {
                    if self.cancel.is_cancelled() {
                        warn!(file = %entry.path, "Remote walk cancelled");
                        return Err(ExtractError::Cancelled);
                    }
                    let module = Path::new(&entry.path)
                        .parent()
                        .map(Path::to_path_buf)
                        .unwrap_or_default();
                    self.process_file(&entry, &repo.with_module(module), sink, report)
                        .await?;
                } else {
                    debug!(path = %entry.path, kind = %entry.kind, "Ignoring entry");
                }
            }
            info!(path = %path, "Finished directory");
            Ok(())
        }
        .boxed()
    }

    /// Returns `None` (after logging) when the listing cannot be used.
    async fn list(&self, repo: &RepoInfo, path: &str) -> Option<Vec<ContentEntry>> {
        let url = self.contents_url(repo, path);
        let response = self
            .send_with_retry(&url, || {
                self.client
                    .get(&url)
                    .bearer_auth(&self.options.token)
                    .header(header::ACCEPT, ACCEPT_RAW)
            })
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, url = %url, "Listing request failed, skipping subtree");
                return None;
            }
        };
        let status = response.status();
        if status != StatusCode::OK {
            warn!(
                status = %status,
                url = %url,
                "Could not list directory; check the GitHub token and repository details"
            );
            return None;
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, url = %url, "Failed to read listing body, skipping subtree");
                return None;
            }
        };
        match serde_json::from_str::<Listing>(&body) {
            Ok(listing) => Some(listing.into_entries()),
            Err(e) => {
                warn!(error = %e, url = %url, "Unexpected listing shape, skipping subtree");
                None
            }
        }
    }

    async fn process_file(
        &self,
        entry: &ContentEntry,
        repo: &RepoInfo,
        sink: &dyn RecordSink,
        report: &mut WalkReport,
    ) -> Result<(), ExtractError> {
        let Some(url) = entry.download_url.as_deref() else {
            warn!(file = %entry.path, "Entry has no download_url, skipping");
            report.skipped += 1;
            return Ok(());
        };

        info!(file = %entry.name, url = %url, "Downloading document");
        let Some(text) = self.download(url).await else {
            report.failed += 1;
            return Ok(());
        };

        if self.options.output.stages_files() {
            match staging_target(&self.options.staging_root, &repo.module, &entry.name) {
                None => {
                    warn!(
                        file = %entry.path,
                        name = %entry.name,
                        "Entry path escapes the staging directory, not staging"
                    );
                    report.skipped += 1;
                }
                Some(target) => match stage(&target, &text) {
                    Ok(()) => {
                        debug!(path = %target.display(), "Staged raw file");
                        report.files_staged += 1;
                    }
                    Err(e) => {
                        warn!(error = %e, file = %entry.path, "Failed to stage raw file");
                        report.failed += 1;
                    }
                },
            }
        }

        if self.options.output.emits_records() {
            let record = Record::remote(&entry.name, repo, normalize(&text));
            emit(sink, &record, report)?;
        }
        Ok(())
    }

    async fn download(&self, url: &str) -> Option<String> {
        let response = match self.send_with_retry(url, || self.client.get(url)).await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, url = %url, "Download failed, skipping file");
                return None;
            }
        };
        let status = response.status();
        if !status.is_success() {
            warn!(status = %status, url = %url, "Download returned error status, skipping file");
            return None;
        }
        match response.text().await {
            Ok(text) => Some(text),
            Err(e) => {
                warn!(error = %e, url = %url, "Unexpected content, skipping file");
                None
            }
        }
    }

    /// Sends the request built by `build`, retrying transport errors and 5xx
    /// responses with exponential backoff.
    async fn send_with_retry<F>(&self, url: &str, build: F) -> Result<Response, reqwest::Error>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut attempt = 0;
        loop {
            let can_retry = attempt < self.options.http.max_retries;
            match build().send().await {
                Ok(resp) if resp.status().is_server_error() && can_retry => {
                    warn!(status = %resp.status(), url = %url, attempt, "Server error, retrying");
                }
                Ok(resp) => return Ok(resp),
                Err(e) if can_retry => {
                    warn!(error = %e, url = %url, attempt, "Request failed, retrying");
                }
                Err(e) => return Err(e),
            }
            tokio::time::sleep(self.options.http.backoff(attempt)).await;
            attempt += 1;
        }
    }
}

/// `{root}/{module}/{name}`, or `None` when the listing-supplied parts would
/// leave `root`: `name` must be one plain component and `module` may only hold
/// plain or `.` components.
fn staging_target(root: &Path, module: &Path, name: &str) -> Option<PathBuf> {
    let mut name_parts = Path::new(name).components();
    let plain_name = matches!(
        (name_parts.next(), name_parts.next()),
        (Some(Component::Normal(_)), None)
    );
    let plain_module = module
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    (plain_name && plain_module).then(|| root.join(module).join(name))
}

fn stage(target: &Path, text: &str) -> std::io::Result<()> {
    if let Some(folder) = target.parent() {
        if !folder.exists() {
            fs::create_dir_all(folder)?;
        }
    }
    fs::write(target, text)
}

#[async_trait]
impl Walker for RemoteWalker {
    async fn walk(
        &self,
        root: &Path,
        sink: &dyn RecordSink,
        file_types: &FileTypes,
    ) -> Result<WalkReport, ExtractError> {
        let path = root.to_string_lossy().replace('\\', "/");
        self.walk_remote(&path, self.repo_info(), sink, file_types)
            .await
    }
}
