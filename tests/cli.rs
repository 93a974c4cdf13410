use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::tempdir;

fn write_config(dir: &Path, extra: &str) -> PathBuf {
    let path = dir.join("config.yaml");
    let contents = format!(
        "cache:\n  dir: {}\nprogress:\n  db_path: {}\n{}",
        dir.join("cache").display(),
        dir.join("progress.db").display(),
        extra
    );
    fs::write(&path, contents).expect("failed to write config");
    path
}

fn flixcore(config: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("flixcore"));
    cmd.arg("--config")
        .arg(config)
        .env_remove("FLIXCORE_CONFIG")
        .env_remove("FLIXCORE_FORMAT")
        .env_remove("FLIXCORE_REMOTE")
        .env_remove("COMPLETE");
    cmd
}

fn json_output(cmd: &mut Command) -> serde_json::Value {
    let output = cmd.arg("--format").arg("json").assert().success();
    serde_json::from_slice(&output.get_output().stdout).expect("stdout is not JSON")
}

#[test]
fn version_prints_package_version() {
    Command::new(assert_cmd::cargo::cargo_bin!("flixcore"))
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn cache_path_uses_configured_dir() -> Result<(), Box<dyn std::error::Error>> {
    let temp = tempdir()?;
    let config = write_config(temp.path(), "");

    flixcore(&config)
        .args(["cache", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            temp.path().join("cache").to_string_lossy().to_string(),
        ));

    Ok(())
}

#[test]
fn cache_classify_routes_without_network() -> Result<(), Box<dyn std::error::Error>> {
    let temp = tempdir()?;
    let config = write_config(temp.path(), "");

    let icon = json_output(flixcore(&config).args(["cache", "classify", "/icons/icon-72x72.png"]));
    assert_eq!(icon["data"]["route"]["route"], "cached");
    assert_eq!(icon["data"]["route"]["bucket"], "static");
    assert_eq!(icon["data"]["cache"], "flixcore-static-v1");

    let post = json_output(flixcore(&config).args([
        "cache", "classify", "/api/notes", "--method", "POST",
    ]));
    assert_eq!(post["data"]["route"]["route"], "bypass");
    assert!(post["data"]["cache"].is_null());

    Ok(())
}

#[test]
fn cache_classify_rejects_bad_method() -> Result<(), Box<dyn std::error::Error>> {
    let temp = tempdir()?;
    let config = write_config(temp.path(), "");

    flixcore(&config)
        .args(["cache", "classify", "/", "--method", "NOT A METHOD"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid HTTP method"));

    Ok(())
}

#[test]
fn cache_status_counts_queued_sync_requests() -> Result<(), Box<dyn std::error::Error>> {
    let temp = tempdir()?;
    let config = write_config(temp.path(), "");

    let empty = json_output(flixcore(&config).args(["cache", "status"]));
    assert_eq!(empty["data"]["total_entries"], 0);
    assert_eq!(empty["data"]["pending_sync"], 0);

    flixcore(&config)
        .args(["cache", "enqueue", "/api/notes", "--data", r#"{"text":"offline"}"#])
        .assert()
        .success();

    let queued = json_output(flixcore(&config).args(["cache", "status"]));
    assert_eq!(queued["data"]["pending_sync"], 1);
    assert_eq!(queued["data"]["version"], "v1");

    Ok(())
}

#[test]
fn progress_simulate_persists_and_resumes() -> Result<(), Box<dyn std::error::Error>> {
    let temp = tempdir()?;
    let config = write_config(temp.path(), "");

    let first = json_output(flixcore(&config).args([
        "progress", "simulate", "-u", "u1", "-c", "c1", "-v", "v1", "--duration", "600",
        "--events", "play,60,120,pause",
    ]));
    assert_eq!(first["data"]["health"]["status"], "healthy");
    assert_eq!(first["data"]["record"]["watchedSeconds"], 120.0);
    assert_eq!(first["data"]["record"]["isCompleted"], false);

    // Second session resumes at 120s and crosses the 90% threshold
    let second = json_output(flixcore(&config).args([
        "progress", "simulate", "-u", "u1", "-c", "c1", "-v", "v1", "--duration", "600",
        "--events", "play,300,560,ended",
    ]));
    assert!(
        second["data"]["steps"][0]["effects"]
            .as_str()
            .unwrap_or_default()
            .contains("seek 2m 0s")
    );
    assert_eq!(second["data"]["record"]["isCompleted"], true);

    let shown = json_output(flixcore(&config).args([
        "progress", "show", "-u", "u1", "-c", "c1", "-v", "v1",
    ]));
    assert_eq!(shown["data"]["watchedSeconds"], 600.0);

    Ok(())
}

#[test]
fn progress_summary_reports_totals() -> Result<(), Box<dyn std::error::Error>> {
    let temp = tempdir()?;
    let config = write_config(temp.path(), "");

    let empty = json_output(flixcore(&config).args(["progress", "summary", "-u", "u1"]));
    assert_eq!(empty["data"]["state"], "empty");

    for video in ["v1", "v2"] {
        flixcore(&config)
            .args([
                "progress", "simulate", "-u", "u1", "-c", "c1", "-v", video, "--duration", "300",
                "--events", "play,150,pause",
            ])
            .assert()
            .success();
    }

    let summary = json_output(flixcore(&config).args(["progress", "summary", "-u", "u1"]));
    assert_eq!(summary["data"]["state"], "ready");
    assert_eq!(summary["data"]["summary"]["totalVideosWatched"], 2);
    assert_eq!(summary["data"]["summary"]["totalCoursesStarted"], 1);
    assert_eq!(summary["data"]["summary"]["totalWatchTime"], 300.0);
    assert_eq!(summary["data"]["summary"]["currentStreak"], 1);
    assert_eq!(
        summary["data"]["summary"]["weeklyProgress"]
            .as_array()
            .map(Vec::len),
        Some(4)
    );

    Ok(())
}

#[test]
fn progress_show_missing_record_fails() -> Result<(), Box<dyn std::error::Error>> {
    let temp = tempdir()?;
    let config = write_config(temp.path(), "");

    flixcore(&config)
        .args(["progress", "show", "-u", "u1", "-c", "c1", "-v", "nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("u1/c1/nope"));

    Ok(())
}

#[test]
fn progress_simulate_rejects_unknown_event() -> Result<(), Box<dyn std::error::Error>> {
    let temp = tempdir()?;
    let config = write_config(temp.path(), "");

    flixcore(&config)
        .args([
            "progress", "simulate", "-u", "u1", "-c", "c1", "-v", "v1", "--duration", "60",
            "--events", "play,rewind",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("rewind"));

    Ok(())
}

#[test]
fn remote_without_api_url_fails() -> Result<(), Box<dyn std::error::Error>> {
    let temp = tempdir()?;
    let config = write_config(temp.path(), "");

    flixcore(&config)
        .args(["--remote", "progress", "list", "-u", "u1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("api.base_url"));

    Ok(())
}

#[cfg_attr(not(feature = "http-tests"), ignore)]
#[test]
fn remote_list_reads_progress_api() -> Result<(), Box<dyn std::error::Error>> {
    let mut server = mockito::Server::new();
    let _list = server
        .mock("GET", "/api/progress")
        .match_query(mockito::Matcher::UrlEncoded("userId".into(), "u1".into()))
        .match_header("authorization", "Bearer t0ken")
        .with_status(200)
        .with_body(
            r#"[{
                "userId": "u1", "courseId": "c1", "videoId": "v1",
                "watchedSeconds": 42.0, "lastPosition": 40.0, "totalSeconds": 600.0,
                "isCompleted": false, "updatedAt": "2026-03-02T10:00:00Z"
            }]"#,
        )
        .create();

    let temp = tempdir()?;
    let config = write_config(
        temp.path(),
        &format!("api:\n  base_url: {}\n  token: t0ken\n", server.url()),
    );

    let listed = json_output(flixcore(&config).args(["--remote", "progress", "list", "-u", "u1"]));
    assert_eq!(listed["data"][0]["videoId"], "v1");
    assert_eq!(listed["data"][0]["watchedSeconds"], 42.0);

    Ok(())
}
