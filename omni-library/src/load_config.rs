/// `load_config` module: builds the [`ExtractConfig`] for a run from an optional
/// YAML file plus the process environment.
///
/// # Responsibilities
/// - Parse the user-supplied YAML file (every section optional) into the core
///   config type
/// - Inject `GITHUB_TOKEN`, `MICROSERVICES_PATH` and `OMNI_BASE_DIR` from the
///   environment; these take precedence over the file
/// - Fail with a clear diagnostic when the file cannot be read or parsed
///
/// The token is never read from the file. CLI flags are layered on top of the
/// result by [`crate::cli`].
///
/// # Errors
/// All errors use `anyhow::Error` and are surfaced at the CLI boundary.
use anyhow::Result;
use omni_library_core::config::ExtractConfig;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

pub const ENV_GITHUB_TOKEN: &str = "GITHUB_TOKEN";
pub const ENV_LOCAL_PATH: &str = "MICROSERVICES_PATH";
pub const ENV_BASE_DIR: &str = "OMNI_BASE_DIR";

/// Loads the YAML file at `path` (or defaults when `None`) and injects the
/// environment.
pub fn load_config(path: Option<&Path>) -> Result<ExtractConfig> {
    let mut config = match path {
        Some(path) => read_config_file(path)?,
        None => {
            info!("No config file given, using defaults");
            ExtractConfig::default()
        }
    };
    apply_env(&mut config);
    config.trace_loaded();
    Ok(config)
}

fn read_config_file(path_ref: &Path) -> Result<ExtractConfig> {
    info!(config_path = ?path_ref, "Loading configuration from file");
    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => {
            info!(config_path = ?path_ref, "Config file read successfully");
            content
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    // An empty document is a valid "all defaults" config.
    if config_content.trim().is_empty() {
        return Ok(ExtractConfig::default());
    }

    match serde_yaml::from_str(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            Ok(conf)
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            Err(anyhow::anyhow!("Failed to parse config YAML: {e}"))
        }
    }
}

/// Overlays the environment onto `config`. Empty values count as unset.
pub fn apply_env(config: &mut ExtractConfig) {
    if let Some(token) = non_empty_var(ENV_GITHUB_TOKEN) {
        debug!("Injected GitHub token from environment");
        config.github.token = Some(token);
    }
    if let Some(path) = non_empty_var(ENV_LOCAL_PATH) {
        debug!(path = %path, "Local source path from environment");
        config.local.path = Some(PathBuf::from(path));
    }
    if let Some(base) = non_empty_var(ENV_BASE_DIR) {
        debug!(base_dir = %base, "Output base directory from environment");
        config.base_dir = PathBuf::from(base);
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}
