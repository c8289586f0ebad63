#[path = "common/fixtures.rs"]
mod fixtures;

use std::fs;
use std::path::Path;
use std::process::Command;

use activity_attribution::apps::run_cli;
use serde_json::Value;

use fixtures::{BROWSER, Platform, login_cookie};

fn platform() -> Platform {
    let platform = Platform::new();
    platform
        .user(7, "alice", "alice@example.org")
        .user(42, "jdoe", "jdoe@example.org")
        .badge(1, "Professor/in")
        .grant(42, 1)
        .comment(42, "2014-05-03 10:00:00", false)
        .vote(7, "2014-05-03 11:00:00")
        .visit(1, "2014-05-02 09:00:00", "/welcome/jdoe")
        .request(
            2,
            "2014-05-02 09:05:00",
            Some("/instance/hhu"),
            Some(&login_cookie("alice")),
            Some("Mozilla/5.0 (Windows NT 6.1) Chrome/34.0 Safari/537.36"),
        )
        .visit(3, "2014-05-02 09:06:00", "/static/style.css");
    platform
}

fn write_config(platform: &Platform, extra: &str) -> std::path::PathBuf {
    let path = platform.path.with_file_name("settings.json");
    let dsn = serde_json::to_string(&platform.dsn()).unwrap();
    fs::write(&path, format!("{{\"dsn\": {dsn}{extra}}}")).unwrap();
    path
}

fn run(config: &Path, args: &[&str]) -> String {
    let mut out = Vec::new();
    let mut argv: Vec<String> = args.iter().map(|arg| arg.to_string()).collect();
    argv.push("--config".into());
    argv.push(config.display().to_string());
    run_cli(argv.into_iter(), &mut out).unwrap();
    String::from_utf8(out).unwrap()
}

#[test]
fn run_attribution_prints_summary() {
    let platform = platform();
    let config = write_config(&platform, "");
    let output = run(&config, &["run-attribution"]);
    let summary: Value = serde_json::from_str(&output).unwrap();
    assert_eq!(summary["scanned"], 3);
    assert_eq!(summary["recorded"], 2);
    assert_eq!(summary["unmatched"], 1);
    assert_eq!(platform.attributions("analysis_request_user"), vec![(1, 42), (2, 7)]);
}

#[test]
fn aggregate_report_is_csv_with_tiers() {
    let platform = platform();
    let config = write_config(&platform, "");
    run(&config, &["run-attribution"]);
    let output = run(&config, &["run-aggregate-report"]);
    assert_eq!(
        output,
        "name,email,comments,proposals,votes,requests,tier\n\
         alice,alice@example.org,0,0,1,1,light\n\
         jdoe,jdoe@example.org,1,0,0,1,intensive\n"
    );
}

#[test]
fn classify_users_adds_badge_and_status_columns() {
    let platform = platform();
    let config = write_config(&platform, "");
    let output = run(
        &config,
        &["classify-users", "--badge", "Professor/in", "--status-group", "Professor/in,Mittelbau"],
    );
    assert_eq!(
        output,
        "name,email,badge,tier,status\n\
         alice,alice@example.org,no,light,Sonstige\n\
         jdoe,jdoe@example.org,yes,intensive,Professor/in\n"
    );
}

#[test]
fn participation_stats_lists_every_tier() {
    let platform = platform();
    let config = write_config(&platform, "");
    let output = run(&config, &["participation-stats", "--badge", "Professor/in"]);
    let lines: Vec<&str> = output.lines().collect();
    assert_eq!(lines.len(), 9);
    assert_eq!(lines[0], "group,tier,users,percent");
    assert_eq!(lines[1], "all,intensive,1,50");
    assert_eq!(lines[2], "all,light,1,50");
    assert_eq!(lines[5], "Professor/in,intensive,1,100");
    assert_eq!(lines[8], "Professor/in,none,0,0");
}

#[test]
fn activity_phases_uses_configured_phases() {
    let platform = platform();
    let config = write_config(
        &platform,
        r#", "phases": [{"name": "Mai", "startdate": "2014-05-01", "enddate": "2014-06-01"}]"#,
    );
    let output = run(
        &config,
        &["activity-phases", "--badge-group", "Professor/in,Mittelbau"],
    );
    assert_eq!(
        output,
        "phase,name,email,tier,Professor/in|Mittelbau\n\
         Mai,alice,alice@example.org,light,\n\
         Mai,jdoe,jdoe@example.org,intensive,Professor/in\n"
    );
}

#[test]
fn list_requests_shows_extracted_names() {
    let platform = platform();
    let config = write_config(&platform, "");
    let output = run(&config, &["list-requests"]);
    assert_eq!(
        output,
        "1\t2014-05-02 09:00:00\t/welcome/jdoe\tjdoe\n\
         2\t2014-05-02 09:05:00\t/instance/hhu\talice\n\
         3\t2014-05-02 09:06:00\t/static/style.css\t-\n"
    );
    let filtered = run(&config, &["list-requests", "--path-prefix", "/static/"]);
    assert_eq!(filtered.lines().count(), 1);
}

#[test]
fn list_uas_counts_families() {
    let platform = platform();
    platform.visit(4, "2014-05-02 09:07:00", "/");
    let config = write_config(&platform, "");
    let output = run(&config, &["list-uas", "--summarize"]);
    assert_eq!(output, "3\tFirefox\n1\tChrome\n");
    let raw = run(&config, &["list-uas"]);
    assert_eq!(
        raw,
        format!("3\t{BROWSER}\n1\tMozilla/5.0 (Windows NT 6.1) Chrome/34.0 Safari/537.36\n")
    );
}

#[test]
fn failures_are_reported_as_errors() {
    let platform = platform();
    let missing = platform.path.with_file_name("absent.json");
    let mut out = Vec::new();
    let args = vec![
        "run-attribution".to_string(),
        "--config".to_string(),
        missing.display().to_string(),
    ];
    assert!(run_cli(args.into_iter(), &mut out).is_err());

    let config = write_config(&platform, "");
    let unknown = vec![
        "poll-results".to_string(),
        "--config".to_string(),
        config.display().to_string(),
    ];
    assert!(run_cli(unknown.into_iter(), &mut out).is_err());
    assert!(out.is_empty());
}

fn run_failing(config: &Path, args: &[&str]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut argv: Vec<String> = args.iter().map(|arg| arg.to_string()).collect();
    argv.push("--config".into());
    argv.push(config.display().to_string());
    assert!(run_cli(argv.into_iter(), &mut out).is_err());
    out
}

#[test]
fn aggregate_report_writes_nothing_when_a_later_row_fails() {
    let platform = platform();
    platform
        .conn
        .execute(
            "INSERT INTO user (id, user_name, email) VALUES (50, X'00ff', 'blob@example.org')",
            [],
        )
        .unwrap();
    let config = write_config(&platform, "");
    let out = run_failing(&config, &["run-aggregate-report"]);
    assert!(out.is_empty(), "partial output: {}", String::from_utf8_lossy(&out));
}

#[test]
fn list_requests_writes_nothing_when_a_later_row_fails() {
    let platform = platform();
    platform.visit(4, "2014-05-02 25:00:00", "/");
    let config = write_config(&platform, "");
    let out = run_failing(&config, &["list-requests"]);
    assert!(out.is_empty(), "partial output: {}", String::from_utf8_lossy(&out));
}

#[test]
fn lookup_misses_are_logged_without_rust_log() {
    let platform = platform();
    platform.visit(4, "2014-05-02 09:08:00", "/welcome/ghost");
    let config = write_config(&platform, "");
    let output = Command::new(env!("CARGO_BIN_EXE_activity-attribution"))
        .env_remove("RUST_LOG")
        .args(["run-attribution", "--config"])
        .arg(&config)
        .output()
        .unwrap();
    assert!(output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("WARN"), "stderr: {stderr}");
    assert!(stderr.contains("ghost"), "stderr: {stderr}");
    assert!(!stderr.contains("INFO"), "stderr: {stderr}");
}
