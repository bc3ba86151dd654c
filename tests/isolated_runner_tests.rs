//! End-to-end tests driving real agent processes.
//!
//! These spawn the `isorun-agent` binary built alongside the tests and use `true`/`false` as test
//! commands, so they only run on Unix.

#![cfg(unix)]

use std::fs;
use std::path::PathBuf;
use std::process::Command;
use std::time::{Duration, Instant};

use isorun::engine::events::CollectingEventHandler;
use isorun::engine::{AgentCommand, EngineError, IsolatedRunner, ProcessAgency, RunnerState, TestEvent, TestFilter};
use isorun::package::{SuiteSpec, TestPackage, TestSpec};
use isorun_core::{ResultState, settings};

const AGENT: &str = env!("CARGO_BIN_EXE_isorun-agent");
const CLI: &str = env!("CARGO_BIN_EXE_isorun");

fn agent_runner() -> IsolatedRunner {
    IsolatedRunner::new(Box::new(ProcessAgency::new(AgentCommand::new(AGENT))))
}

fn package() -> TestPackage {
    let mut suite = SuiteSpec::new("pkg");
    suite.tests.push(TestSpec::new("ok", &["true"]));
    suite.tests.push(TestSpec::new("bad", &["false"]));
    TestPackage::new("pkg", suite)
}

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("isorun-{name}-{}", std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    dir
}

// ============================================================================
// IsolatedRunner against a real agent
// ============================================================================

#[test]
fn full_lifecycle_against_process_agent() {
    let mut runner = agent_runner();
    let pkg = package();

    let explored = runner.explore(&pkg).unwrap();
    assert!(!explored.has_errors(), "{:?}", explored.errors);
    assert_eq!(explored.tree.test_count(), 2);

    let loaded = runner.load(&pkg).unwrap();
    assert!(!loaded.has_errors());
    assert_eq!(runner.state(), RunnerState::Loaded);

    let mut events = CollectingEventHandler::default();
    let result = runner.run(&mut events, &TestFilter::Empty).unwrap();
    assert_eq!(result.state, ResultState::Failed);
    assert_eq!(result.counts().passed, 1);
    assert_eq!(result.counts().failed, 1);
    assert_eq!(events.events.first(), Some(&TestEvent::RunStarted { test_count: 2 }));
    assert_eq!(events.events.last(), Some(&TestEvent::RunFinished));
    assert_eq!(events.finished(), vec!["pkg.ok", "pkg.bad"]);

    runner.unload().unwrap();
    assert_eq!(runner.state(), RunnerState::Unloaded);
    assert!(runner.has_agent(), "unload keeps the agent for reuse");

    runner.dispose();
    assert!(!runner.has_agent());
}

#[test]
fn filter_is_applied_by_the_agent() {
    let mut runner = agent_runner();
    runner.load(&package()).unwrap();

    let mut events = CollectingEventHandler::default();
    let result = runner.run(&mut events, &TestFilter::Keyword("ok".into())).unwrap();
    assert_eq!(result.state, ResultState::Passed);
    assert_eq!(result.counts().total, 1);
    assert_eq!(events.finished(), vec!["pkg.ok"]);
}

#[test]
fn load_errors_unload_and_run_is_refused() {
    let mut runner = agent_runner();
    let mut pkg = package();
    pkg.suite.tests.push(TestSpec::new("empty", &[]));

    let loaded = runner.load(&pkg).unwrap();
    assert!(loaded.has_errors());
    assert_eq!(runner.state(), RunnerState::Unloaded);

    let err = runner.run(&mut CollectingEventHandler::default(), &TestFilter::Empty).unwrap_err();
    assert!(matches!(err, EngineError::NotLoaded), "{err}");
}

#[test]
fn silent_agent_times_out_within_bounds() {
    let agency = ProcessAgency::new(AgentCommand::new("sh").arg("-c").arg("exec sleep 5"));
    let mut runner = IsolatedRunner::new(Box::new(agency));
    let pkg = package().with_setting(settings::AGENT_TIMEOUT, 300_i64);

    let started = Instant::now();
    let err = runner.load(&pkg).unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(err, EngineError::AgentUnavailable { .. }), "{err}");
    assert!(err.to_string().contains("no handshake within 300 ms"), "{err}");
    assert!(elapsed >= Duration::from_millis(300), "{elapsed:?}");
    assert!(elapsed < Duration::from_secs(4), "{elapsed:?}");
    assert!(!runner.has_agent());
}

#[test]
fn agent_for_another_runtime_is_rejected() {
    let mut runner = agent_runner();
    let pkg = package().with_setting(settings::RUNTIME_FRAMEWORK, "wasm");

    let err = runner.explore(&pkg).unwrap_err();
    assert!(matches!(err, EngineError::AgentUnavailable { .. }), "{err}");
    assert!(err.to_string().contains("agent reported native-"), "{err}");
}

// ============================================================================
// CLI
// ============================================================================

const MANIFEST: &str = r#"{
  "name": "pkg",
  "suite": {
    "name": "pkg",
    "tests": [
      { "name": "ok", "command": ["true"], "categories": ["fast"] },
      { "name": "bad", "command": ["false"] }
    ]
  }
}"#;

#[test]
fn cli_explore_prints_the_tree() {
    let dir = scratch_dir("explore");
    let manifest = dir.join("pkg.json");
    fs::write(&manifest, MANIFEST).unwrap();

    let output = Command::new(CLI)
        .env("ISORUN_AGENT_PATH", AGENT)
        .arg("explore")
        .arg(&manifest)
        .output()
        .unwrap();

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(String::from_utf8_lossy(&output.stdout), "+ pkg\n  - ok [fast]\n  - bad\n");
}

#[test]
fn cli_run_reports_failures_and_writes_results() {
    let dir = scratch_dir("run");
    let manifest = dir.join("pkg.json");
    let results = dir.join("results.json");
    fs::write(&manifest, MANIFEST).unwrap();

    let failing = Command::new(CLI)
        .env("ISORUN_AGENT_PATH", AGENT)
        .arg("run")
        .arg(&manifest)
        .arg("--result")
        .arg(&results)
        .output()
        .unwrap();
    assert_eq!(failing.status.code(), Some(1));
    let json = fs::read_to_string(&results).unwrap();
    assert!(json.contains("\"full_name\": \"pkg.bad\""), "{json}");

    let passing = Command::new(CLI)
        .env("ISORUN_AGENT_PATH", AGENT)
        .args(["run", "--category", "fast"])
        .arg(&manifest)
        .output()
        .unwrap();
    assert!(passing.status.success(), "{}", String::from_utf8_lossy(&passing.stderr));
}

#[test]
fn cli_rejects_broken_manifest() {
    let dir = scratch_dir("broken");
    let manifest = dir.join("pkg.json");
    fs::write(&manifest, "{ \"suite\": ").unwrap();

    let output = Command::new(CLI).arg("run").arg(&manifest).output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("invalid manifest"));
}

#[test]
fn cli_ctrl_c_stops_after_the_current_test() {
    use std::os::unix::process::CommandExt;
    use std::process::Stdio;

    use isorun::framework::result::TestResult;

    let dir = scratch_dir("interrupt");
    let manifest = dir.join("pkg.json");
    let results = dir.join("results.json");
    let marker = dir.join("started");
    let _ = fs::remove_file(&marker);
    let _ = fs::remove_file(&results);
    let slow = format!("touch '{}' && sleep 2", marker.display());
    let body = serde_json::json!({
        "name": "pkg",
        "suite": {
            "name": "pkg",
            "tests": [
                { "name": "slow", "command": ["sh", "-c", slow] },
                { "name": "after", "command": ["true"] }
            ]
        }
    });
    fs::write(&manifest, body.to_string()).unwrap();

    // Own process group, like a foreground job in a terminal.
    let child = Command::new(CLI)
        .env("ISORUN_AGENT_PATH", AGENT)
        .arg("run")
        .arg(&manifest)
        .arg("--result")
        .arg(&results)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0)
        .spawn()
        .unwrap();

    let deadline = Instant::now() + Duration::from_secs(20);
    while !marker.exists() {
        assert!(Instant::now() < deadline, "first test never started");
        std::thread::sleep(Duration::from_millis(20));
    }
    std::thread::sleep(Duration::from_millis(300));

    let group = format!("kill -s INT -- -{}", child.id());
    assert!(Command::new("sh").arg("-c").arg(&group).status().unwrap().success());

    let output = child.wait_with_output().unwrap();
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(output.status.code(), Some(0), "{stderr}");
    assert!(stderr.contains("Interrupted, stopping after the current test"), "{stderr}");

    let result: TestResult = serde_json::from_str(&fs::read_to_string(&results).unwrap()).unwrap();
    let states: Vec<(String, ResultState)> = result
        .children
        .iter()
        .map(|child| (child.full_name.clone(), child.state))
        .collect();
    assert_eq!(
        states,
        vec![
            ("pkg.slow".to_string(), ResultState::Passed),
            ("pkg.after".to_string(), ResultState::Skipped),
        ]
    );
}
