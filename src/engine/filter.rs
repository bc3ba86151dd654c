//! Test selection.
//!
//! The runner never interprets a filter; it is shipped to the agent and applied there.

use serde::{Deserialize, Serialize};

/// A predicate over test names and categories.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum TestFilter {
    /// Selects everything.
    #[default]
    Empty,
    /// Exact full name.
    Name(String),
    /// Substring of the full name.
    Keyword(String),
    Category(String),
    Not(Box<TestFilter>),
    And(Vec<TestFilter>),
    Or(Vec<TestFilter>),
}

impl TestFilter {
    pub fn is_empty(&self) -> bool {
        matches!(self, TestFilter::Empty)
    }

    /// Whether a test with these attributes is selected.
    pub fn pass(&self, full_name: &str, categories: &[String]) -> bool {
        match self {
            TestFilter::Empty => true,
            TestFilter::Name(name) => full_name == name,
            TestFilter::Keyword(word) => full_name.contains(word.as_str()),
            TestFilter::Category(category) => categories.iter().any(|c| c == category),
            TestFilter::Not(inner) => !inner.pass(full_name, categories),
            TestFilter::And(all) => all.iter().all(|f| f.pass(full_name, categories)),
            TestFilter::Or(any) => any.iter().any(|f| f.pass(full_name, categories)),
        }
    }

    /// Conjunction that flattens and drops `Empty` operands.
    pub fn and(self, other: TestFilter) -> TestFilter {
        match (self, other) {
            (TestFilter::Empty, f) | (f, TestFilter::Empty) => f,
            (TestFilter::And(mut left), TestFilter::And(right)) => {
                left.extend(right);
                TestFilter::And(left)
            }
            (TestFilter::And(mut left), f) => {
                left.push(f);
                TestFilter::And(left)
            }
            (f, TestFilter::And(mut right)) => {
                right.insert(0, f);
                TestFilter::And(right)
            }
            (left, right) => TestFilter::And(vec![left, right]),
        }
    }
}
