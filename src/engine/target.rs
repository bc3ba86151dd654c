//! Execution targets.
//!
//! A target names the runtime an agent must provide, optionally pinned to a version. It is resolved
//! once per load cycle from the package's `RuntimeFramework` setting.

use std::fmt;

use isorun_core::settings::{self, NATIVE_RUNTIME};
use serde::{Deserialize, Serialize};

use crate::package::TestPackage;

/// Version reported by agents built from this workspace.
pub const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Runtime descriptor an agent has to match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecutionTarget {
    pub runtime: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl ExecutionTarget {
    pub fn new(runtime: impl Into<String>, version: Option<&str>) -> Self {
        Self {
            runtime: runtime.into(),
            version: version.map(str::to_string),
        }
    }

    /// The environment this process runs in.
    pub fn current() -> Self {
        Self::new(NATIVE_RUNTIME, Some(AGENT_VERSION))
    }

    /// Parse `runtime` or `runtime-version`.
    ///
    /// An empty string or `current` resolves to [`ExecutionTarget::current`].
    pub fn parse(spec: &str) -> Self {
        let spec = spec.trim();
        if spec.is_empty() || spec == "current" {
            return Self::current();
        }
        match spec.split_once('-') {
            Some((runtime, version)) if !version.is_empty() => Self::new(runtime, Some(version)),
            Some((runtime, _)) => Self::new(runtime, None),
            None => Self::new(spec, None),
        }
    }

    /// Resolve the target for a package.
    pub fn from_package(package: &TestPackage) -> Self {
        let spec: String = package.get_setting(settings::RUNTIME_FRAMEWORK, String::new());
        Self::parse(&spec)
    }

    /// Whether an agent reporting `runtime`/`version` can serve this target.
    ///
    /// Runtime names must match; a version is only compared when the target pins one.
    pub fn matches(&self, runtime: &str, version: &str) -> bool {
        if self.runtime != runtime {
            return false;
        }
        match &self.version {
            Some(wanted) => wanted == version,
            None => true,
        }
    }
}

impl fmt::Display for ExecutionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{}-{}", self.runtime, version),
            None => f.write_str(&self.runtime),
        }
    }
}
