#![doc = "omni-library-core: extraction pipeline library for omni-library."]

//! Walks GitHub repositories (contents API) or local directory trees,
//! normalizes the text of every selected file and appends it as a JSON line
//! to a dated library file consumed by a separate ingestion stage.
//!
//! # Usage
//! Build an [`config::ExtractConfig`] and call [`extract::run`]. The walkers,
//! the normalizer and the sink are public for callers that need only one
//! piece.

pub mod config;
pub mod contract;
pub mod download;
pub mod error;
pub mod extract;
pub mod local;
pub mod preprocess;
pub mod sink;

pub use config::{ExtractConfig, RunMode};
pub use contract::{FileTypes, Record, RecordSink, RepoInfo, WalkReport, Walker};
pub use error::{ExtractError, SinkError};
pub use extract::{run, run_on, RunReport};
pub use preprocess::normalize;
