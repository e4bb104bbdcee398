//! JSONL output for extracted records.
//!
//! [`JsonlSink`] opens the library file in append mode for every record and
//! closes it again, so each line is on disk before the next file is looked
//! at. [`load_records`] reads a finished library back.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::contract::{Record, RecordSink};
use crate::error::{ExtractError, SinkError};

#[derive(Debug, Clone)]
pub struct JsonlSink {
    path: PathBuf,
}

impl JsonlSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecordSink for JsonlSink {
    fn append(&self, record: &Record) -> Result<(), SinkError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| SinkError::Unavailable {
                path: self.path.clone(),
                source,
            })?;
        let start = file
            .metadata()
            .map_err(|source| SinkError::Unavailable {
                path: self.path.clone(),
                source,
            })?
            .len();
        write_line(&mut file, start, line.as_bytes())
            .map_err(|e| SinkError::from_write(self.path.clone(), e))?;

        debug!(path = %self.path.display(), title = %record.title, "Appended record");
        Ok(())
    }
}

/// A writer that can be cut back to an earlier length.
trait Truncate {
    fn truncate_to(&mut self, len: u64) -> io::Result<()>;
}

impl Truncate for File {
    fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }
}

/// Writes `line` at the end of `out`. On failure `out` is cut back to
/// `start` so no fragment is left for the next line to land on.
fn write_line<W: Write + Truncate>(out: &mut W, start: u64, line: &[u8]) -> io::Result<()> {
    let Err(e) = out.write_all(line) else {
        return Ok(());
    };
    if let Err(rollback) = out.truncate_to(start) {
        warn!(error = %rollback, "Failed to remove partial record");
    }
    Err(e)
}

/// Creates the output directory if needed and removes a previous file at
/// `path`, so every run starts from an empty library.
pub fn prepare_output(path: &Path) -> Result<(), ExtractError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        if !dir.exists() {
            fs::create_dir_all(dir).map_err(|e| ExtractError::io(dir, e))?;
            debug!(path = %dir.display(), "Created output directory");
        }
    }
    if path.exists() {
        fs::remove_file(path).map_err(|e| ExtractError::io(path, e))?;
        info!(path = %path.display(), "Removed existing output file");
    }
    Ok(())
}

/// Reads every record from a JSONL library. Blank lines are ignored;
/// malformed lines are logged and skipped.
pub fn load_records(path: &Path) -> Result<Vec<Record>, ExtractError> {
    let file = fs::File::open(path).map_err(|e| ExtractError::io(path, e))?;
    let mut records = Vec::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| ExtractError::io(path, e))?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Record>(&line) {
            Ok(record) => records.push(record),
            Err(e) => warn!(error = %e, line = idx + 1, path = %path.display(), "Skipping malformed record"),
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::RepoInfo;
    use tempfile::tempdir;

    #[test]
    fn append_writes_one_line_per_record() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("library.jsonl");
        let sink = JsonlSink::new(&path);

        sink.append(&Record::local("a.md", "first")).unwrap();
        let repo = RepoInfo::new("acme", "docs").with_module("guides/setup");
        sink.append(&Record::remote("b.md", &repo, "second")).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], r#"{"title":"a.md","text":"first"}"#);
        assert!(lines[1].contains(r#""module":"guides.setup""#));

        let loaded = load_records(&path).unwrap();
        assert_eq!(loaded[0], Record::local("a.md", "first"));
        assert_eq!(loaded[1].repo_owner.as_deref(), Some("acme"));
    }

    /// In-memory file that accepts `budget` bytes and then fails.
    struct ShortWriter {
        data: Vec<u8>,
        budget: usize,
    }

    impl Write for ShortWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.budget == 0 {
                return Err(io::Error::other("device error"));
            }
            let n = buf.len().min(self.budget);
            self.data.extend_from_slice(&buf[..n]);
            self.budget -= n;
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Truncate for ShortWriter {
        fn truncate_to(&mut self, len: u64) -> io::Result<()> {
            self.data.truncate(len as usize);
            Ok(())
        }
    }

    #[test]
    fn failed_write_leaves_no_partial_line() {
        let mut out = ShortWriter {
            data: b"{\"title\":\"a\",\"text\":\"x\"}\n".to_vec(),
            budget: 7,
        };
        let start = out.data.len() as u64;

        let err = write_line(&mut out, start, b"{\"title\":\"b\",\"text\":\"y\"}\n").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Other);
        assert_eq!(out.data, b"{\"title\":\"a\",\"text\":\"x\"}\n");

        out.budget = usize::MAX;
        write_line(&mut out, start, b"{\"title\":\"c\",\"text\":\"z\"}\n").unwrap();
        let text = String::from_utf8(out.data).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.lines().all(|l| serde_json::from_str::<Record>(l).is_ok()));
    }

    #[test]
    fn empty_text_is_still_written() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("library.jsonl");
        JsonlSink::new(&path).append(&Record::local("blank.md", "")).unwrap();
        assert_eq!(load_records(&path).unwrap().len(), 1);
    }

    #[test]
    fn missing_directory_makes_sink_unavailable() {
        let dir = tempdir().unwrap();
        let sink = JsonlSink::new(dir.path().join("nope").join("library.jsonl"));
        let err = sink.append(&Record::local("a.md", "x")).unwrap_err();
        assert!(err.is_fatal(), "got {err:?}");
    }

    #[test]
    fn prepare_output_creates_dir_and_truncates() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dbdata").join("library.jsonl");

        prepare_output(&path).unwrap();
        assert!(path.parent().unwrap().is_dir());
        assert!(!path.exists());

        fs::write(&path, "stale\n").unwrap();
        prepare_output(&path).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn load_records_skips_blank_and_malformed_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("library.jsonl");
        fs::write(
            &path,
            "{\"title\":\"a\",\"text\":\"x\"}\n\nnot json\n{\"text\":\"only text\"}\n",
        )
        .unwrap();
        let records = load_records(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].title, "");
        assert_eq!(records[1].module, None);
    }
}
