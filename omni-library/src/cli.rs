///
/// This module implements the CLI interface for omni-library: command parsing,
/// flag overrides on top of the loaded config, and the async entrypoint.
///
/// All extraction logic (walkers, normalizer, sink) lives in the
/// [`omni-library-core`] crate. This module is strictly CLI glue.
///
/// ## How To Use
/// - For command-line users: run the `omni-library` binary with `--help`.
/// - For programmatic/integration use: call [`run`] with a constructed [`Cli`].
///
/// [`omni-library-core`]: ../../omni-library-core/
use crate::load_config::load_config;
use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use omni_library_core::config::{ExtractConfig, RunMode};
use omni_library_core::extract;
use omni_library_core::sink::load_records;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

/// CLI for omni-library: build a dated JSONL library from documentation.
#[derive(Parser)]
#[clap(
    name = "omni-library",
    version,
    about = "Extract GitHub or local documentation into a normalized JSONL library"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Walk the configured sources and write today's library file
    Extract {
        /// Path to the YAML config file
        #[clap(long)]
        config: Option<PathBuf>,
        /// Source to walk; overrides the config file and environment
        #[clap(long, value_enum)]
        mode: Option<ModeArg>,
        /// Directory under which dbdata/ is created
        #[clap(long)]
        base_dir: Option<PathBuf>,
        /// Root of the local source tree
        #[clap(long)]
        local_path: Option<PathBuf>,
    },
    /// Print a record count breakdown for an existing library file
    Inspect {
        /// Path to a .jsonl library file
        file: PathBuf,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    Local,
    Remote,
}

impl From<ModeArg> for RunMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Local => RunMode::Local,
            ModeArg::Remote => RunMode::Remote,
        }
    }
}

/// Applies command-line flags, which take precedence over everything else.
pub fn apply_flags(
    config: &mut ExtractConfig,
    mode: Option<ModeArg>,
    base_dir: Option<PathBuf>,
    local_path: Option<PathBuf>,
) {
    if let Some(mode) = mode {
        config.mode = mode.into();
    }
    if let Some(base_dir) = base_dir {
        config.base_dir = base_dir;
    }
    if let Some(local_path) = local_path {
        config.local.path = Some(local_path);
    }
}

/// Async CLI entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Extract {
            config,
            mode,
            base_dir,
            local_path,
        } => {
            let mut config = load_config(config.as_deref())?;
            apply_flags(&mut config, mode, base_dir, local_path);
            tracing::info!(command = "extract", mode = ?config.mode, "Starting extraction");

            let cancel = CancellationToken::new();
            let ctrl_c = tokio::spawn(cancel_on_ctrl_c(cancel.clone()));
            let result = extract::run(&config, cancel).await;
            ctrl_c.abort();

            match result {
                Ok(report) => {
                    tracing::info!(command = "extract", "Extraction complete");
                    println!("Extraction complete.\nReport: {report:#?}");
                    Ok(())
                }
                Err(e) => {
                    tracing::error!(command = "extract", error = %e, "Extraction failed");
                    Err(anyhow::Error::new(e).context("Extraction failed"))
                }
            }
        }
        Commands::Inspect { file } => {
            let records = load_records(&file)?;
            let mut by_source: BTreeMap<String, usize> = BTreeMap::new();
            for record in &records {
                let source = match (&record.repo_owner, &record.repo_name) {
                    (Some(owner), Some(repo)) => format!("{owner}/{repo}"),
                    _ => "local".to_string(),
                };
                *by_source.entry(source).or_default() += 1;
            }
            tracing::info!(command = "inspect", records = records.len(), "Loaded library file");

            println!("{}: {} records", file.display(), records.len());
            for (source, count) in by_source {
                println!("  {source}: {count}");
            }
            Ok(())
        }
    }
}

async fn cancel_on_ctrl_c(cancel: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::warn!("Interrupt received, cancelling extraction");
        cancel.cancel();
    }
}
