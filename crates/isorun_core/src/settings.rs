//! Package setting vocabulary.
//!
//! Settings are stored in a package as `name -> value` pairs. This registry fixes the spelling of every
//! setting the engine consumes together with its default, so the controller, the agent and the CLI agree
//! on both.

use crate::registry::{self, VocabInfo};

/// Stable identifier for settings consumed by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingId {
    /// Execution target the agent must match (e.g. `native`, `native-0.1.0`).
    RuntimeFramework,
    /// Start the agent in debug mode.
    AgentDebug,
    /// Milliseconds to wait for an agent to become available.
    AgentTimeout,
    /// Stop starting new tests after the first failure.
    StopOnError,
    /// Working directory for test and hook processes.
    WorkDirectory,
}

/// Spelling of the `RuntimeFramework` setting.
pub const RUNTIME_FRAMEWORK: &str = "RuntimeFramework";

/// Spelling of the `AgentDebug` setting.
pub const AGENT_DEBUG: &str = "AgentDebug";

/// Spelling of the `AgentTimeout` setting.
pub const AGENT_TIMEOUT: &str = "AgentTimeout";

/// Spelling of the `StopOnError` setting.
pub const STOP_ON_ERROR: &str = "StopOnError";

/// Spelling of the `WorkDirectory` setting.
pub const WORK_DIRECTORY: &str = "WorkDirectory";

/// Default agent acquisition timeout in milliseconds.
pub const DEFAULT_AGENT_TIMEOUT_MS: u64 = 30_000;

/// Runtime name reported by agents built from this workspace.
pub const NATIVE_RUNTIME: &str = "native";

/// Metadata entry for a setting.
pub type SettingInfo = VocabInfo<SettingId>;

/// Registry of settings consumed by the engine.
pub const SETTINGS: &[SettingInfo] = &[
    info(
        SettingId::RuntimeFramework,
        RUNTIME_FRAMEWORK,
        &["runtime"],
        "Execution target the agent must match. Defaults to the current environment.",
    ),
    info(
        SettingId::AgentDebug,
        AGENT_DEBUG,
        &["agent_debug"],
        "Launch the agent with debug logging. Defaults to false.",
    ),
    info(
        SettingId::AgentTimeout,
        AGENT_TIMEOUT,
        &["agent_timeout"],
        "Milliseconds to wait for an agent before failing the load. Defaults to 30000.",
    ),
    info(
        SettingId::StopOnError,
        STOP_ON_ERROR,
        &["stop_on_error"],
        "Stop starting new tests after the first failure. Defaults to false.",
    ),
    info(
        SettingId::WorkDirectory,
        WORK_DIRECTORY,
        &["work_dir"],
        "Working directory for test and hook processes. Defaults to the manifest directory.",
    ),
];

/// Resolve a setting name (canonical or alias) to its stable id.
pub fn from_str(name: &str) -> Option<SettingId> {
    registry::lookup(SETTINGS, name)
}

/// Return the canonical spelling for a setting.
pub fn as_str(id: SettingId) -> &'static str {
    match registry::find(SETTINGS, id) {
        Some(info) => info.canonical,
        None => "",
    }
}

/// Normalize a user-supplied setting name to its canonical spelling.
///
/// Unknown names are passed through unchanged; packages may carry settings the engine does not read.
pub fn canonical_name(name: &str) -> &str {
    match from_str(name) {
        Some(id) => as_str(id),
        None => name,
    }
}

const fn info(
    id: SettingId,
    canonical: &'static str,
    aliases: &'static [&'static str],
    description: &'static str,
) -> SettingInfo {
    VocabInfo {
        id,
        canonical,
        aliases,
        description,
        since_version: "0.1.0",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alias_resolves_to_canonical() {
        assert_eq!(canonical_name("runtime"), RUNTIME_FRAMEWORK);
        assert_eq!(canonical_name("agent_debug"), AGENT_DEBUG);
    }

    #[test]
    fn unknown_name_passes_through() {
        assert_eq!(canonical_name("Custom.Setting"), "Custom.Setting");
    }
}
