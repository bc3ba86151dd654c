//! Progress events emitted while a run is in flight.

use isorun_core::ResultState;
use serde::{Deserialize, Serialize};

use crate::framework::result::TestResult;

/// One progress notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TestEvent {
    RunStarted { test_count: usize },
    SuiteStarted { id: String, full_name: String },
    TestStarted { id: String, full_name: String },
    TestFinished { result: TestResult },
    SuiteFinished { id: String, full_name: String, state: ResultState },
    RunFinished,
}

/// Receives events as they happen.
pub trait TestEventHandler {
    fn on_event(&mut self, event: &TestEvent);
}

/// Discards every event.
#[derive(Debug, Default)]
pub struct NullEventHandler;

impl TestEventHandler for NullEventHandler {
    fn on_event(&mut self, _event: &TestEvent) {}
}

/// Keeps every event, in order.
#[derive(Debug, Default)]
pub struct CollectingEventHandler {
    pub events: Vec<TestEvent>,
}

impl CollectingEventHandler {
    /// Full names of finished tests, in completion order.
    pub fn finished(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                TestEvent::TestFinished { result } => Some(result.full_name.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl TestEventHandler for CollectingEventHandler {
    fn on_event(&mut self, event: &TestEvent) {
        self.events.push(event.clone());
    }
}

impl<F> TestEventHandler for F
where
    F: FnMut(&TestEvent),
{
    fn on_event(&mut self, event: &TestEvent) {
        self(event)
    }
}
