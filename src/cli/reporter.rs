//! Console progress output (pytest-style)
//!
//! Progress goes to stderr so that stdout stays free for `explore` output.

use std::io::{self, Write};
use std::time::Instant;

use isorun_core::ResultState;

use crate::engine::events::{TestEvent, TestEventHandler};
use crate::framework::result::{ResultCounts, TestResult};

/// Prints one mark per finished test, or one line per test when verbose.
pub struct ConsoleReporter {
    pub verbose: bool,
    started: Instant,
    /// Test whose name is already on the current line.
    announced: Option<String>,
    out: Box<dyn Write + Send>,
}

impl ConsoleReporter {
    pub fn new(verbose: bool) -> Self {
        Self::with_writer(verbose, Box::new(io::stderr()))
    }

    pub fn with_writer(verbose: bool, out: Box<dyn Write + Send>) -> Self {
        Self {
            verbose,
            started: Instant::now(),
            announced: None,
            out,
        }
    }

    fn status(&self, result: &TestResult) -> String {
        let millis = result.duration.as_millis();
        match result.state {
            ResultState::Passed if self.verbose => format!("\x1b[32mPASSED\x1b[0m ({millis}ms)"),
            ResultState::Passed => "\x1b[32m.\x1b[0m".to_string(),
            ResultState::Failed if self.verbose => format!("\x1b[31mFAILED\x1b[0m ({millis}ms)"),
            ResultState::Failed => "\x1b[31mF\x1b[0m".to_string(),
            ResultState::Error if self.verbose => format!("\x1b[31mERROR\x1b[0m ({millis}ms)"),
            ResultState::Error => "\x1b[31mE\x1b[0m".to_string(),
            ResultState::Cancelled if self.verbose => "\x1b[33mCANCELLED\x1b[0m".to_string(),
            ResultState::Cancelled => "\x1b[33mC\x1b[0m".to_string(),
            ResultState::Skipped if self.verbose => match &result.message {
                Some(reason) => format!("\x1b[33mSKIPPED\x1b[0m ({reason})"),
                None => "\x1b[33mSKIPPED\x1b[0m".to_string(),
            },
            ResultState::Skipped => "\x1b[33ms\x1b[0m".to_string(),
            ResultState::Inconclusive if self.verbose => "INCONCLUSIVE".to_string(),
            ResultState::Inconclusive => "?".to_string(),
        }
    }

    /// Print the failure section and the closing summary line.
    pub fn finish(&mut self, result: &TestResult) {
        if !self.verbose {
            let _ = writeln!(self.out);
        }

        let failures = result.failures();
        if !failures.is_empty() {
            let _ = writeln!(self.out, "\n\x1b[1;31m=================== FAILURES ===================\x1b[0m");
            for failure in failures {
                let _ = writeln!(self.out, "\x1b[1m___________ {} ___________\x1b[0m", failure.full_name);
                if let Some(message) = &failure.message {
                    let _ = writeln!(self.out, "{message}");
                }
                if self.verbose && !failure.output.is_empty() {
                    let _ = writeln!(self.out, "--- output ---\n{}", failure.output.trim_end());
                }
            }
        }

        let line = summary_line(&result.counts(), self.started.elapsed().as_secs_f64());
        let _ = writeln!(self.out, "\n{line}");
    }
}

/// The closing `====== 2 passed, 1 failed in 0.31s ======` line.
pub fn summary_line(counts: &ResultCounts, seconds: f64) -> String {
    let mut parts = Vec::new();
    if counts.passed > 0 {
        parts.push(format!("\x1b[32m{} passed\x1b[0m", counts.passed));
    }
    if counts.failed > 0 {
        parts.push(format!("\x1b[31m{} failed\x1b[0m", counts.failed));
    }
    if counts.errors > 0 {
        parts.push(format!("\x1b[31m{} errors\x1b[0m", counts.errors));
    }
    if counts.cancelled > 0 {
        parts.push(format!("\x1b[33m{} cancelled\x1b[0m", counts.cancelled));
    }
    if counts.skipped > 0 {
        parts.push(format!("\x1b[33m{} skipped\x1b[0m", counts.skipped));
    }
    if parts.is_empty() {
        parts.push("no tests ran".to_string());
    }
    format!("====== {} in {seconds:.2}s ======", parts.join(", "))
}

impl TestEventHandler for ConsoleReporter {
    fn on_event(&mut self, event: &TestEvent) {
        match event {
            TestEvent::RunStarted { test_count } => {
                self.started = Instant::now();
                if *test_count == 0 {
                    let _ = writeln!(self.out, "No tests selected");
                }
            }
            TestEvent::TestStarted { full_name, .. } if self.verbose => {
                let _ = write!(self.out, "{full_name} ... ");
                self.announced = Some(full_name.clone());
            }
            TestEvent::TestFinished { result } => {
                let status = self.status(result);
                if self.verbose {
                    // Tests that never ran finish without a start event.
                    if self.announced.take().as_deref() != Some(result.full_name.as_str()) {
                        let _ = write!(self.out, "{} ... ", result.full_name);
                    }
                    let _ = writeln!(self.out, "{status}");
                } else {
                    let _ = write!(self.out, "{status}");
                }
                let _ = self.out.flush();
            }
            _ => {}
        }
    }
}
