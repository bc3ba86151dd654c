//! CLI command implementations
//!
//! All command functions return `CliResult<ExitCode>` instead of calling
//! `process::exit`. Error handling and exits happen in the top-level `run()`.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread;

use isorun_core::settings;

use super::reporter::ConsoleReporter;
use super::{CliError, CliResult, EngineArgs, ExitCode, RunArgs};
use crate::engine::{EngineError, InProcessAgency, IsolatedRunner, ProcessAgency, RunControl, TestAgency, TestFilter};
use crate::package::{SettingValue, TestPackage};

// ============================================================================
// Package preparation (shared between explore and run)
// ============================================================================

/// Read a manifest and layer the command line over its settings.
///
/// Precedence, lowest first: manifest settings, `--set KEY=VALUE`, dedicated flags.
fn prepare_package(manifest: &Path, engine: &EngineArgs) -> CliResult<TestPackage> {
    let mut package = TestPackage::from_manifest(manifest)
        .map_err(|e| CliError::failure(format!("{:?}", miette::Report::new(e))))?;
    apply_overrides(&mut package, engine);
    Ok(package)
}

fn apply_overrides(package: &mut TestPackage, engine: &EngineArgs) {
    for (key, raw) in &engine.settings {
        package.set_setting(key, SettingValue::parse(raw));
    }
    if let Some(runtime) = &engine.runtime {
        package.set_setting(settings::RUNTIME_FRAMEWORK, runtime.as_str());
    }
    if let Some(timeout) = engine.timeout {
        package.set_setting(settings::AGENT_TIMEOUT, i64::try_from(timeout).unwrap_or(i64::MAX));
    }
    if engine.agent_debug {
        package.set_setting(settings::AGENT_DEBUG, true);
    }
}

fn create_runner(engine: &EngineArgs) -> IsolatedRunner {
    let agency: Box<dyn TestAgency> = if engine.inprocess {
        Box::new(InProcessAgency::new())
    } else {
        Box::new(ProcessAgency::default())
    };
    IsolatedRunner::new(agency)
}

fn engine_error(context: &str, error: EngineError) -> CliError {
    CliError::failure(format!("Error {context}: {error}"))
}

/// Combine `-k`, `--category` and `--exclude-category` into one filter.
pub fn build_filter(args: &RunArgs) -> TestFilter {
    let mut filter = TestFilter::Empty;
    if let Some(keyword) = &args.keyword {
        filter = filter.and(TestFilter::Keyword(keyword.clone()));
    }
    if !args.categories.is_empty() {
        let any = args.categories.iter().cloned().map(TestFilter::Category).collect();
        filter = filter.and(TestFilter::Or(any));
    }
    if !args.excluded.is_empty() {
        let any = args.excluded.iter().cloned().map(TestFilter::Category).collect();
        filter = filter.and(TestFilter::Not(Box::new(TestFilter::Or(any))));
    }
    filter
}

// ============================================================================
// Commands
// ============================================================================

/// Print the test tree of a package as an agent sees it.
pub fn explore(manifest: &Path, engine: &EngineArgs) -> CliResult<ExitCode> {
    let package = prepare_package(manifest, engine)?;
    let mut runner = create_runner(engine);

    let explored = runner.explore(&package);
    runner.dispose();
    let result = explored.map_err(|e| engine_error("exploring package", e))?;

    print!("{}", result.render_tree());
    if result.has_errors() {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

/// Load, run and unload a package, reporting progress on the console.
pub fn run_package(args: &RunArgs) -> CliResult<ExitCode> {
    let mut package = prepare_package(&args.manifest, &args.engine)?;
    if args.stop_on_error {
        package.set_setting(settings::STOP_ON_ERROR, true);
    }
    let filter = build_filter(args);
    let mut runner = create_runner(&args.engine);

    let outcome = run_loaded(&mut runner, &package, &filter, args);
    runner.dispose();
    outcome
}

fn run_loaded(
    runner: &mut IsolatedRunner,
    package: &TestPackage,
    filter: &TestFilter,
    args: &RunArgs,
) -> CliResult<ExitCode> {
    let loaded = runner.load(package).map_err(|e| engine_error("loading package", e))?;
    if loaded.has_errors() {
        let mut msg = format!("Package '{}' could not be loaded:", package.name);
        for error in &loaded.errors {
            msg.push_str(&format!("\n  {error}"));
        }
        return Err(CliError::failure(msg));
    }

    if let Some(control) = runner.run_control() {
        watch_interrupts(control);
    }

    let mut reporter = ConsoleReporter::new(args.verbose);
    let result = runner
        .run(&mut reporter, filter)
        .map_err(|e| engine_error("running tests", e))?;
    reporter.finish(&result);

    if let Some(path) = &args.result_file {
        let json = serde_json::to_string_pretty(&result)
            .map_err(|e| CliError::failure(format!("Error encoding results: {e}")))?;
        fs::write(path, json)
            .map_err(|e| CliError::failure(format!("Error writing '{}': {e}", path.display())))?;
    }

    if let Err(e) = runner.unload() {
        tracing::warn!(error = %e, "unload after run failed");
    }

    if result.has_failures() {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

/// First Ctrl-C asks the run to stop after the current test; the second aborts it.
fn watch_interrupts(control: Arc<dyn RunControl>) {
    let spawned = thread::Builder::new()
        .name("isorun-interrupt".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                Ok(runtime) => runtime,
                Err(e) => {
                    tracing::warn!(error = %e, "Ctrl-C handling unavailable");
                    return;
                }
            };
            runtime.block_on(async move {
                let mut force = false;
                while tokio::signal::ctrl_c().await.is_ok() {
                    if force {
                        eprintln!("\nInterrupted again, aborting the run");
                    } else {
                        eprintln!("\nInterrupted, stopping after the current test (Ctrl-C again to abort)");
                    }
                    if let Err(e) = control.stop_run(force) {
                        tracing::warn!(error = %e, "failed to forward stop request");
                    }
                    if force {
                        break;
                    }
                    force = true;
                }
            });
        });
    if let Err(e) = spawned {
        tracing::warn!(error = %e, "Ctrl-C handling unavailable");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::package::SuiteSpec;

    fn run_args() -> RunArgs {
        RunArgs {
            manifest: PathBuf::from("smoke.json"),
            ..RunArgs::default()
        }
    }

    #[test]
    fn test_build_filter_defaults_to_everything() {
        assert_eq!(build_filter(&run_args()), TestFilter::Empty);
    }

    #[test]
    fn test_build_filter_combines_selections() {
        let args = RunArgs {
            keyword: Some("login".into()),
            categories: vec!["fast".into()],
            excluded: vec!["flaky".into(), "slow".into()],
            ..run_args()
        };
        let filter = build_filter(&args);
        assert_eq!(
            filter,
            TestFilter::And(vec![
                TestFilter::Keyword("login".into()),
                TestFilter::Or(vec![TestFilter::Category("fast".into())]),
                TestFilter::Not(Box::new(TestFilter::Or(vec![
                    TestFilter::Category("flaky".into()),
                    TestFilter::Category("slow".into()),
                ]))),
            ])
        );
        assert!(filter.pass("app.login.ok", &["fast".to_string()]));
        assert!(!filter.pass("app.login.ok", &["fast".to_string(), "slow".to_string()]));
        assert!(!filter.pass("app.logout", &["fast".to_string()]));
    }

    #[test]
    fn test_flags_override_set_which_overrides_manifest() {
        let mut package = TestPackage::new("pkg", SuiteSpec::new("pkg"))
            .with_setting(settings::AGENT_TIMEOUT, 100_i64)
            .with_setting(settings::RUNTIME_FRAMEWORK, "native");
        let engine = EngineArgs {
            settings: vec![
                ("AgentTimeout".into(), "200".into()),
                ("RuntimeFramework".into(), "wasm".into()),
                ("StopOnError".into(), "true".into()),
            ],
            timeout: Some(300),
            ..EngineArgs::default()
        };
        apply_overrides(&mut package, &engine);

        assert_eq!(package.get_setting(settings::AGENT_TIMEOUT, 0_u64), 300);
        assert_eq!(package.get_setting(settings::RUNTIME_FRAMEWORK, String::new()), "wasm");
        assert!(package.get_setting(settings::STOP_ON_ERROR, false));
        assert!(!package.get_setting(settings::AGENT_DEBUG, false));
    }

    #[test]
    fn test_missing_manifest_is_reported() {
        let err = prepare_package(Path::new("/definitely/not/here.json"), &EngineArgs::default()).unwrap_err();
        assert_eq!(err.exit_code, ExitCode::FAILURE);
        assert!(err.message.contains("cannot read manifest"), "{}", err.message);
    }
}
