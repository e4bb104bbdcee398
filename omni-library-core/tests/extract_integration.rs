// Integration tests for the extraction pipeline: dated output handling, mode
// dispatch and end-to-end record contents.

use std::fs;
use std::path::Path;

use chrono::NaiveDate;
use omni_library_core::config::{ExtractConfig, RemoteOutput, RepoSource, RunMode};
use omni_library_core::sink::load_records;
use omni_library_core::{run_on, ExtractError};
use serde_json::json;
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn local_config(base: &Path, src: &Path) -> ExtractConfig {
    let mut config = ExtractConfig {
        mode: RunMode::Local,
        base_dir: base.to_path_buf(),
        ..ExtractConfig::default()
    };
    config.local.path = Some(src.to_path_buf());
    config
}

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 5, 17).unwrap()
}

#[tokio::test]
async fn local_run_writes_dated_library() {
    let base = tempdir().unwrap();
    let src = tempdir().unwrap();
    write(src.path(), "a.md", "# Alpha\n\nSee https://example.com\nCopyright 2024");
    write(src.path(), "b.txt", "ignored");
    write(src.path(), "sub/c.md", "<h1>Gamma</h1> 🎉");

    let config = local_config(base.path(), src.path());
    let report = run_on(&config, day(), CancellationToken::new())
        .await
        .expect("run succeeds");

    let expected = base.path().join("dbdata").join("omni_library_2024_05_17.jsonl");
    assert_eq!(report.output_path, expected);
    assert_eq!(report.total.records_written, 2);
    assert_eq!(report.walks.len(), 1);

    let mut records = load_records(&expected).unwrap();
    records.sort_by(|a, b| a.title.cmp(&b.title));
    assert_eq!(records[0].title, "a.md");
    assert_eq!(records[0].text, "# Alpha See");
    assert_eq!(records[1].title, "c.md");
    assert_eq!(records[1].text, "Gamma");
    assert!(records.iter().all(|r| r.repo_owner.is_none() && r.module.is_none()));
}

#[tokio::test]
async fn second_run_on_same_day_overwrites() {
    let base = tempdir().unwrap();
    let src = tempdir().unwrap();
    write(src.path(), "one.md", "one");
    write(src.path(), "two.md", "two");
    write(src.path(), "three.md", "three");

    let config = local_config(base.path(), src.path());
    let first = run_on(&config, day(), CancellationToken::new()).await.unwrap();
    assert_eq!(load_records(&first.output_path).unwrap().len(), 3);

    fs::remove_file(src.path().join("three.md")).unwrap();
    let second = run_on(&config, day(), CancellationToken::new()).await.unwrap();
    assert_eq!(second.output_path, first.output_path);
    assert_eq!(load_records(&second.output_path).unwrap().len(), 2);
}

#[tokio::test]
async fn config_error_leaves_existing_library_untouched() {
    let base = tempdir().unwrap();
    let config = ExtractConfig {
        mode: RunMode::Remote,
        base_dir: base.path().to_path_buf(),
        ..ExtractConfig::default()
    };
    let existing = config.output_path(day());
    fs::create_dir_all(existing.parent().unwrap()).unwrap();
    fs::write(&existing, "{\"title\":\"kept\",\"text\":\"x\"}\n").unwrap();

    let err = run_on(&config, day(), CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ExtractError::Config(_)), "got {err:?}");
    assert_eq!(load_records(&existing).unwrap()[0].title, "kept");
}

#[tokio::test]
async fn remote_run_walks_every_repository() {
    let server = MockServer::start().await;
    for (repo, file) in [("alpha", "docs/intro.md"), ("beta", "docs/usage.md")] {
        Mock::given(method("GET"))
            .and(path(format!("/repos/acme/{repo}/contents/docs")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {
                    "type": "file",
                    "name": file.rsplit('/').next().unwrap(),
                    "path": file,
                    "download_url": format!("{}/raw/{repo}/{file}", server.uri()),
                }
            ])))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/raw/{repo}/{file}")))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!("{repo} body")))
            .expect(1)
            .mount(&server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/repos/acme/gamma/contents/docs"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let base = tempdir().unwrap();
    let mut config = ExtractConfig {
        mode: RunMode::Remote,
        base_dir: base.path().to_path_buf(),
        ..ExtractConfig::default()
    };
    config.github.token = Some("t0ken".to_string());
    config.github.api_base_url = server.uri();
    config.github.output = RemoteOutput::Both;
    config.http.backoff_ms = 1;
    for repo in ["alpha", "beta", "gamma"] {
        config.github.repos.push(RepoSource {
            owner: "acme".to_string(),
            repo: repo.to_string(),
            path: "docs".to_string(),
            file_types: vec![".md".to_string()],
        });
    }

    let report = run_on(&config, day(), CancellationToken::new())
        .await
        .expect("a failing repository does not abort the run");
    assert_eq!(report.walks.len(), 3);
    assert_eq!(report.total.records_written, 2);
    assert_eq!(report.total.files_staged, 2);
    assert_eq!(report.walks[2].report.skipped, 1);

    let records = load_records(&report.output_path).unwrap();
    assert_eq!(records[0].repo_name.as_deref(), Some("alpha"));
    assert_eq!(records[0].module.as_deref(), Some("docs"));
    assert_eq!(records[0].text, "alpha body");
    assert_eq!(records[1].repo_name.as_deref(), Some("beta"));

    let staged = base.path().join("dbdata").join("docs").join("usage.md");
    assert_eq!(fs::read_to_string(staged).unwrap(), "beta body");
}
