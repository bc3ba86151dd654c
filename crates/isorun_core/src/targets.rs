//! Action target vocabulary.
//!
//! An action declares which level of the test tree it wraps. The engine uses the target both to decide
//! whether a declared action applies to a test and to decide whether an action inherited from an
//! enclosing suite is forwarded to each test below it.

use crate::registry::{self, VocabInfo};

/// Scope an action applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ActionTargets {
    /// Applies to whatever the action is declared on.
    #[default]
    Default,
    /// Applies to every individual test.
    Test,
    /// Applies once around a suite.
    Suite,
}

/// Metadata entry for an action target.
pub type TargetInfo = VocabInfo<ActionTargets>;

/// Registry of action targets.
pub const TARGETS: &[TargetInfo] = &[
    TargetInfo {
        id: ActionTargets::Default,
        canonical: "default",
        aliases: &[],
        description: "Wrap the item the action is declared on.",
        since_version: "0.1.0",
    },
    TargetInfo {
        id: ActionTargets::Test,
        canonical: "test",
        aliases: &["tests"],
        description: "Wrap each individual test.",
        since_version: "0.1.0",
    },
    TargetInfo {
        id: ActionTargets::Suite,
        canonical: "suite",
        aliases: &["suites"],
        description: "Wrap a whole suite once.",
        since_version: "0.1.0",
    },
];

/// Resolve a target spelling to its id.
pub fn from_str(name: &str) -> Option<ActionTargets> {
    registry::lookup(TARGETS, name)
}

/// Return the canonical spelling for a target.
pub fn as_str(id: ActionTargets) -> &'static str {
    match id {
        ActionTargets::Default => "default",
        ActionTargets::Test => "test",
        ActionTargets::Suite => "suite",
    }
}

impl ActionTargets {
    /// Whether an action declared directly on a test runs around that test.
    pub fn applies_to_own_test(self) -> bool {
        matches!(self, ActionTargets::Test | ActionTargets::Default)
    }

    /// Whether an action inherited from an enclosing suite runs around each test.
    pub fn applies_to_upstream_test(self) -> bool {
        self == ActionTargets::Test
    }

    /// Whether an action declared on a suite runs once around that suite.
    pub fn applies_to_own_suite(self) -> bool {
        matches!(self, ActionTargets::Suite | ActionTargets::Default)
    }
}

impl std::fmt::Display for ActionTargets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(as_str(*self))
    }
}
