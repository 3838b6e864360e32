use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

struct CliTestEnv {
    _temp_dir: TempDir,
    home: PathBuf,
    xdg_data: PathBuf,
    xdg_config: PathBuf,
    xdg_state: PathBuf,
    archives: PathBuf,
    out: PathBuf,
}

impl CliTestEnv {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let base = temp_dir.path().to_path_buf();
        let home = base.join("home");
        let xdg_data = base.join("xdg-data");
        let xdg_config = base.join("xdg-config");
        let xdg_state = base.join("xdg-state");
        let archives = base.join("archives");
        let out = base.join("out");

        fs::create_dir_all(&home).expect("failed to create HOME");
        fs::create_dir_all(&xdg_data).expect("failed to create XDG_DATA_HOME");
        fs::create_dir_all(&xdg_config).expect("failed to create XDG_CONFIG_HOME");
        fs::create_dir_all(&xdg_state).expect("failed to create XDG_STATE_HOME");

        seed_archives(&archives);

        Self {
            _temp_dir: temp_dir,
            home,
            xdg_data,
            xdg_config,
            xdg_state,
            archives,
            out,
        }
    }

    fn cache_path(&self) -> PathBuf {
        self.xdg_data.join("ideflow/identifier-cache.db")
    }

    fn archive_root(&self) -> String {
        self.archives.to_string_lossy().into_owned()
    }

    fn out_dir(&self) -> String {
        self.out.to_string_lossy().into_owned()
    }
}

/// Two developers: alice spans two archives linked by a profile id, bob has one.
fn seed_archives(root: &Path) {
    let archives: [(&str, &[&str]); 3] = [
        (
            "2024-03/alice-1.jsonl",
            &[
                r#"{"kind":"ide_state","phase":"startup","session_id":"a1","triggered_at":"2024-03-01T09:00:00Z"}"#,
                r#"{"kind":"user_profile","profile_id":"alice","session_id":"a1","triggered_at":"2024-03-01T09:00:01Z"}"#,
                r#"{"kind":"command","command_id":"Edit.Copy","session_id":"a1","triggered_at":"2024-03-01T09:02:00Z","active_document":{"file_name":"src/Parser.cs"}}"#,
                r#"{"kind":"ide_state","phase":"shutdown","session_id":"a1","triggered_at":"2024-03-01T09:10:00Z"}"#,
            ],
        ),
        (
            "2024-03/alice-2.jsonl",
            &[
                r#"{"kind":"user_profile","profile_id":"alice","session_id":"a2","triggered_at":"2024-03-02T09:00:00Z"}"#,
                r#"{"kind":"test_run","session_id":"a2","triggered_at":"2024-03-02T09:05:00Z","terminated_at":"2024-03-02T09:06:00Z","tests":[{"test_method":"ParserTest.Empty","result":"success"}]}"#,
            ],
        ),
        (
            "2024-03/bob.jsonl",
            &[
                r#"{"kind":"activity","session_id":"b1","triggered_at":"2024-03-01T11:00:00Z"}"#,
                "this line is not json",
                r#"{"kind":"activity","session_id":"b1","triggered_at":"2024-03-01T11:03:00Z"}"#,
            ],
        ),
    ];

    for (relative, lines) in archives {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().expect("missing archive parent"))
            .expect("failed to create archive directories");
        fs::write(&path, lines.join("\n")).expect("failed to write archive");
    }
}

fn run_bin(env: &CliTestEnv, args: &[&str]) -> Output {
    let bin_path = PathBuf::from(assert_cmd::cargo::cargo_bin!("ideflow-process"));

    Command::new(bin_path)
        .args(args)
        .env("HOME", &env.home)
        .env("XDG_DATA_HOME", &env.xdg_data)
        .env("XDG_CONFIG_HOME", &env.xdg_config)
        .env("XDG_STATE_HOME", &env.xdg_state)
        .output()
        .unwrap_or_else(|e| panic!("failed to execute ideflow-process: {e}"))
}

fn assert_success(args: &[&str], output: &Output) {
    if output.status.success() {
        return;
    }

    let rendered_args = args
        .iter()
        .map(|arg| OsString::from(arg).to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ");
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    panic!(
        "ideflow-process {rendered_args} failed\nstatus: {}\nstdout:\n{}\nstderr:\n{}",
        output.status, stdout, stderr
    );
}

#[test]
fn process_prints_summary_and_populates_cache() {
    let env = CliTestEnv::new();
    let root = env.archive_root();
    let args = [root.as_str(), "-v"];

    let output = run_bin(&env, &args);
    assert_success(&args, &output);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Processing complete:"), "got:\n{stdout}");
    assert!(stdout.contains("Archives found:      3"), "got:\n{stdout}");
    assert!(stdout.contains("Groups formed:       2"), "got:\n{stdout}");
    assert!(stdout.contains("Corrupt records:     1"), "got:\n{stdout}");
    assert!(stdout.contains("2024-03/alice-1.jsonl"), "got:\n{stdout}");

    assert!(
        env.cache_path().exists(),
        "identifier cache should exist at {}",
        env.cache_path().display()
    );

    let logs: Vec<String> = fs::read_dir(env.xdg_state.join("ideflow"))
        .expect("log directory should exist")
        .map(|e| e.expect("log entry").file_name().to_string_lossy().into_owned())
        .collect();
    assert!(
        logs.iter().any(|name| name.starts_with("ideflow-process.log")),
        "got {logs:?}"
    );

    let second = run_bin(&env, &args);
    assert_success(&args, &second);
    let stdout = String::from_utf8_lossy(&second.stdout);
    assert!(stdout.contains("Cache hits/misses:   3/0"), "got:\n{stdout}");
}

#[test]
fn process_writes_group_files() {
    let env = CliTestEnv::new();
    let root = env.archive_root();
    let out = env.out_dir();
    let args = [root.as_str(), "--out", out.as_str(), "--write-merged", "--no-cache"];

    let output = run_bin(&env, &args);
    assert_success(&args, &output);

    let intervals = fs::read_to_string(env.out.join("group-0000.intervals.jsonl"))
        .expect("missing interval file for first group");
    let lines: Vec<serde_json::Value> = intervals
        .lines()
        .map(|l| serde_json::from_str(l).expect("interval line should be JSON"))
        .collect();
    assert!(lines.iter().any(|v| v["kind"] == "test_run"));
    assert!(lines.iter().any(|v| v["kind"] == "ide_opened"));
    assert!(lines.iter().all(|v| v["duration_ms"].is_i64() || v["duration_ms"].is_u64()));

    let events = fs::read_to_string(env.out.join("group-0001.events.jsonl"))
        .expect("missing event file for second group");
    assert_eq!(events.lines().count(), 2);

    assert!(!env.cache_path().exists(), "--no-cache must not create the cache");
}

#[test]
fn process_json_summary() {
    let env = CliTestEnv::new();
    let root = env.archive_root();
    let args = [root.as_str(), "--json", "--workers", "2"];

    let output = run_bin(&env, &args);
    assert_success(&args, &output);

    let summary: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout should be JSON");
    assert_eq!(summary["report"]["archives_found"], 3);
    assert_eq!(summary["report"]["groups_formed"], 2);
    assert_eq!(summary["groups"][0]["archives"], 2);
    assert_eq!(summary["groups"][1]["label"], "2024-03/bob.jsonl");
}

#[test]
fn missing_archive_root_fails() {
    let env = CliTestEnv::new();
    let missing = env.archives.join("does-not-exist");
    let missing = missing.to_string_lossy().into_owned();

    let output = run_bin(&env, &[missing.as_str()]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("input root unavailable"), "got:\n{stderr}");
}
