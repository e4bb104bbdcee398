use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::contract::FileTypes;
use crate::error::ExtractError;

pub const DEFAULT_API_BASE_URL: &str = "https://api.github.com";
pub const OUTPUT_SUBDIR: &str = "dbdata";

/// Which walker a run dispatches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    #[default]
    Local,
    Remote,
}

/// What the remote walker produces for each matching file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteOutput {
    /// Stage the raw file under `dbdata/{module}` and emit a record.
    #[default]
    Both,
    /// Only emit normalized records to the JSONL library.
    Records,
    /// Only stage raw files; the JSONL library stays empty for remote runs.
    RawFiles,
}

impl RemoteOutput {
    pub fn emits_records(self) -> bool {
        matches!(self, RemoteOutput::Both | RemoteOutput::Records)
    }

    pub fn stages_files(self) -> bool {
        matches!(self, RemoteOutput::Both | RemoteOutput::RawFiles)
    }
}

/// Top-level configuration for one extraction run. Built once by the CLI and
/// passed by reference everywhere else.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    pub mode: RunMode,
    /// Directory under which `dbdata/` is created.
    pub base_dir: PathBuf,
    pub local: LocalConfig,
    pub github: GithubConfig,
    pub http: HttpConfig,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            mode: RunMode::default(),
            base_dir: PathBuf::from("."),
            local: LocalConfig::default(),
            github: GithubConfig::default(),
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalConfig {
    /// Root of the local source tree.
    pub path: Option<PathBuf>,
    /// Glob evaluated relative to `path`.
    pub pattern: String,
    pub file_types: Vec<String>,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            path: None,
            pattern: "**/*.md".to_string(),
            file_types: vec![".md".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GithubConfig {
    /// Injected from the environment only, never read from the config file.
    #[serde(skip)]
    pub token: Option<String>,
    pub api_base_url: String,
    pub output: RemoteOutput,
    pub repos: Vec<RepoSource>,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            output: RemoteOutput::default(),
            repos: Vec::new(),
        }
    }
}

/// One candidate repository: `{owner, repo, path, file_types}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoSource {
    pub owner: String,
    pub repo: String,
    /// Directory inside the repository to start from; empty means the root.
    #[serde(default)]
    pub path: String,
    #[serde(default = "default_file_types")]
    pub file_types: Vec<String>,
}

fn default_file_types() -> Vec<String> {
    vec![".md".to_string()]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub backoff_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_retries: 2,
            backoff_ms: 500,
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Delay before retry number `attempt` (0-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_ms.saturating_mul(1u64 << attempt.min(16)))
    }
}

impl ExtractConfig {
    pub fn output_dir(&self) -> PathBuf {
        self.base_dir.join(OUTPUT_SUBDIR)
    }

    pub fn output_path(&self, date: NaiveDate) -> PathBuf {
        self.output_dir().join(output_file_name(date))
    }

    pub fn local_file_types(&self) -> FileTypes {
        FileTypes::new(&self.local.file_types)
    }

    /// Checks that the selected mode has everything it needs. Called before
    /// the output file is touched so a misconfigured run leaves it intact.
    pub fn validate(&self) -> Result<(), ExtractError> {
        match self.mode {
            RunMode::Local => {
                let path = self.local.path.as_ref().ok_or_else(|| {
                    ExtractError::Config(
                        "local mode requires a source path (set MICROSERVICES_PATH or local.path)"
                            .to_string(),
                    )
                })?;
                if !path.is_dir() {
                    return Err(ExtractError::Config(format!(
                        "local source path {} is not a directory",
                        path.display()
                    )));
                }
            }
            RunMode::Remote => {
                if self.github.token.as_deref().map_or(true, str::is_empty) {
                    return Err(ExtractError::Config(
                        "GITHUB_TOKEN is not set in the environment".to_string(),
                    ));
                }
                if self.github.repos.is_empty() {
                    return Err(ExtractError::Config(
                        "remote mode requires at least one entry in github.repos".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }

    pub fn trace_loaded(&self) {
        info!(
            mode = ?self.mode,
            base_dir = %self.base_dir.display(),
            local_path = ?self.local.path,
            repos = self.github.repos.len(),
            token_set = self.github.token.is_some(),
            "Loaded ExtractConfig"
        );
        debug!(
            pattern = %self.local.pattern,
            file_types = ?self.local.file_types,
            api_base_url = %self.github.api_base_url,
            output = ?self.github.output,
            http = ?self.http,
            "ExtractConfig details"
        );
    }
}

/// `omni_library_YYYY_MM_DD.jsonl`
pub fn output_file_name(date: NaiveDate) -> String {
    format!("omni_library_{}.jsonl", date.format("%Y_%m_%d"))
}
