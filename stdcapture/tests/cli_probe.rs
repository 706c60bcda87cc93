//! CLI tests for `stdcapture topology` and `stdcapture probe`.
//!
//! `probe` redirects the real fd 1 / fd 2 of the child process, so these run
//! the binary rather than capturing inside the test harness. A hung session
//! exit shows up as a timeout instead of a stalled test run.

use std::fs;
use std::io::Read;
use std::process::{Command, Stdio};
use std::time::Duration;

use serde_json::Value;
use stdcapture::exit_codes;
use wait_timeout::ChildExt;

struct Run {
    code: Option<i32>,
    stdout: String,
    stderr: String,
}

fn run(args: &[&str]) -> Run {
    run_with_log(args, None)
}

/// Run the binary with `RUST_LOG` set to `filter`, or unset.
fn run_with_log(args: &[&str], filter: Option<&str>) -> Run {
    let mut command = Command::new(env!("CARGO_BIN_EXE_stdcapture"));
    match filter {
        Some(filter) => command.env("RUST_LOG", filter),
        None => command.env_remove("RUST_LOG"),
    };
    let mut child = command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn stdcapture");

    let mut stdout_pipe = child.stdout.take().expect("stdout");
    let mut stderr_pipe = child.stderr.take().expect("stderr");
    let stdout_reader = std::thread::spawn(move || {
        let mut buf = String::new();
        stdout_pipe.read_to_string(&mut buf).expect("read stdout");
        buf
    });
    let stderr_reader = std::thread::spawn(move || {
        let mut buf = String::new();
        stderr_pipe.read_to_string(&mut buf).expect("read stderr");
        buf
    });

    let status = match child
        .wait_timeout(Duration::from_secs(30))
        .expect("wait for stdcapture")
    {
        Some(status) => status,
        None => {
            child.kill().expect("kill");
            panic!("stdcapture {args:?} did not exit");
        }
    };

    Run {
        code: status.code(),
        stdout: stdout_reader.join().expect("stdout thread"),
        stderr: stderr_reader.join().expect("stderr thread"),
    }
}

fn captured(report: &Value, channel: &str) -> Option<String> {
    report["channels"]
        .as_array()
        .expect("channels array")
        .iter()
        .find(|entry| entry["channel"] == channel)
        .map(|entry| entry["captured"].as_str().expect("captured").to_string())
}

#[test]
fn topology_prints_groups() {
    let run = run(&["topology", "--no-join-out-err"]);
    assert_eq!(run.code, Some(exit_codes::OK), "{}", run.stderr);
    let groups: Value = serde_json::from_str(&run.stdout).expect("json");
    assert_eq!(
        groups,
        serde_json::json!([["native-out", "runtime-out"], ["native-err", "runtime-err"]])
    );
}

#[test]
fn probe_default_joins_all_channels() {
    let run = run(&["probe"]);
    assert_eq!(run.code, Some(exit_codes::OK), "{}", run.stderr);
    let report: Value = serde_json::from_str(&run.stdout).expect("json");

    let all = captured(&report, "native-out").expect("native-out");
    for marker in ["native-out\n", "native-err\n", "runtime-out\n", "runtime-err\n"] {
        assert!(all.contains(marker), "missing {marker:?} in {all:?}");
    }
    assert_eq!(report["out"], Value::String(all.clone()));
    assert_eq!(report["err"], Value::String(all));
    assert!(!run.stderr.contains("native-err"));
}

#[test]
fn probe_separate_groups_with_large_payload() {
    let run = run(&["probe", "--no-join", "--payload-bytes", "204800"]);
    assert_eq!(run.code, Some(exit_codes::OK), "{}", run.stderr);
    let report: Value = serde_json::from_str(&run.stdout).expect("json");

    for channel in ["native-out", "native-err", "runtime-out", "runtime-err"] {
        let text = captured(&report, channel).expect(channel);
        assert!(text.starts_with(&format!("{channel}\n")));
        assert_eq!(text.len(), channel.len() + 1 + 204_800, "{channel}");
    }
    assert!(report["out"].is_null());
    assert!(report["err"].is_null());

    let entry = report["channels"]
        .as_array()
        .expect("channels array")
        .iter()
        .find(|entry| entry["channel"] == "runtime-err")
        .expect("runtime-err entry");
    assert_eq!(entry["layer"], "runtime");
    assert_eq!(entry["side"], "err");
}

#[test]
fn trace_logging_does_not_stall_or_leak_into_capture() {
    for join in [None, Some("--no-join")] {
        let mut args = vec!["probe", "--payload-bytes", "204800"];
        args.extend(join);
        let run = run_with_log(&args, Some("trace"));
        assert_eq!(run.code, Some(exit_codes::OK), "{args:?}: {}", run.stderr);
        let report: Value = serde_json::from_str(&run.stdout).expect("json");

        let captured_len: usize = report["channels"]
            .as_array()
            .expect("channels array")
            .iter()
            .map(|entry| entry["captured"].as_str().expect("captured").len())
            .sum();
        let written: usize = ["native-out", "native-err", "runtime-out", "runtime-err"]
            .iter()
            .map(|channel| channel.len() + 1 + 204_800)
            .sum();
        let groups = report["groups"].as_array().expect("groups").len();
        // A joined group reports the same buffer once per member.
        let expected = if groups == 1 { written * 4 } else { written };
        assert_eq!(captured_len, expected, "{args:?}");

        // Library diagnostics still reach the real stderr outside the session.
        assert!(run.stderr.contains("capture session closed"), "{}", run.stderr);
    }
}

#[test]
fn probe_skip_leaves_channel_on_real_stderr() {
    let run = run(&["probe", "--no-join", "--skip", "native-err"]);
    assert_eq!(run.code, Some(exit_codes::OK), "{}", run.stderr);
    let report: Value = serde_json::from_str(&run.stdout).expect("json");

    assert!(captured(&report, "native-err").is_none());
    assert_eq!(
        captured(&report, "runtime-err").as_deref(),
        Some("runtime-err\n")
    );
    assert!(run.stderr.contains("native-err\n"));
}

#[test]
fn probe_reads_config_file() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("capture.toml");
    fs::write(
        &path,
        "[join]\nout_err = false\n\n[channels]\nruntime_out = \"none\"\n",
    )
    .expect("write config");

    let run = run(&["probe", "--config", path.to_str().expect("utf8 path")]);
    assert_eq!(run.code, Some(exit_codes::OK), "{}", run.stderr);
    let report: Value = serde_json::from_str(&run.stdout).expect("json");

    // runtime-out is untouched, but its default writer is fd 1, which is captured.
    assert!(captured(&report, "runtime-out").is_none());
    let out = captured(&report, "native-out").expect("native-out");
    assert!(out.contains("native-out\n") && out.contains("runtime-out\n"));
    assert!(report["out"].is_null());
    assert!(report["err"].is_string());
}

#[test]
fn probe_rejects_invalid_config() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("capture.toml");
    fs::write(&path, "chunk_size = 0\n").expect("write config");

    let run = run(&["probe", "--config", path.to_str().expect("utf8 path")]);
    assert_eq!(run.code, Some(exit_codes::INVALID));
    assert!(run.stderr.contains("chunk_size"));
}
