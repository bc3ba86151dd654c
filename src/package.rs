//! Test packages and their JSON manifest.
//!
//! A package is what the controller hands to an agent: a name, a bag of typed settings and the suite
//! tree to execute. Packages travel over the wire unchanged, so everything here is serde-friendly.
//!
//! ## Manifest shape
//!
//! ```json
//! {
//!   "name": "smoke",
//!   "settings": { "StopOnError": true },
//!   "suite": {
//!     "name": "smoke",
//!     "actions": [{ "name": "db", "targets": "test", "before": ["./db", "up"], "after": ["./db", "down"] }],
//!     "tests": [{ "name": "boots", "command": ["./app", "--check"], "categories": ["fast"] }],
//!     "suites": []
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use isorun_core::ActionTargets;
use isorun_core::settings;
use miette::{Diagnostic, NamedSource, SourceSpan};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A typed package setting value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl From<bool> for SettingValue {
    fn from(value: bool) -> Self {
        SettingValue::Bool(value)
    }
}

impl From<i64> for SettingValue {
    fn from(value: i64) -> Self {
        SettingValue::Int(value)
    }
}

impl From<&str> for SettingValue {
    fn from(value: &str) -> Self {
        SettingValue::Str(value.to_string())
    }
}

impl From<String> for SettingValue {
    fn from(value: String) -> Self {
        SettingValue::Str(value)
    }
}

impl SettingValue {
    /// Parse a command-line value: `true`/`false`, then integers, then plain strings.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "true" => SettingValue::Bool(true),
            "false" => SettingValue::Bool(false),
            _ => match raw.parse::<i64>() {
                Ok(n) => SettingValue::Int(n),
                Err(_) => SettingValue::Str(raw.to_string()),
            },
        }
    }
}

/// Conversion from a stored setting into the type a caller asks for.
///
/// A value of the wrong shape yields `None`, and the caller's default wins.
pub trait FromSetting: Sized {
    fn from_setting(value: &SettingValue) -> Option<Self>;
}

impl FromSetting for bool {
    fn from_setting(value: &SettingValue) -> Option<Self> {
        match value {
            SettingValue::Bool(b) => Some(*b),
            SettingValue::Str(s) => s.parse().ok(),
            SettingValue::Int(_) => None,
        }
    }
}

impl FromSetting for i64 {
    fn from_setting(value: &SettingValue) -> Option<Self> {
        match value {
            SettingValue::Int(n) => Some(*n),
            SettingValue::Str(s) => s.parse().ok(),
            SettingValue::Bool(_) => None,
        }
    }
}

impl FromSetting for u64 {
    fn from_setting(value: &SettingValue) -> Option<Self> {
        i64::from_setting(value).and_then(|n| u64::try_from(n).ok())
    }
}

impl FromSetting for String {
    fn from_setting(value: &SettingValue) -> Option<Self> {
        match value {
            SettingValue::Str(s) => Some(s.clone()),
            SettingValue::Bool(b) => Some(b.to_string()),
            SettingValue::Int(n) => Some(n.to_string()),
        }
    }
}

/// An action declared in a manifest: argv hooks run before and after the item it wraps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionSpec {
    pub name: String,
    #[serde(default)]
    pub targets: ActionTargets,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub before: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub after: Vec<String>,
}

/// A single test: one process invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestSpec {
    pub name: String,
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<ActionSpec>,
    /// Hard limit: the process is killed when it runs longer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Soft limit: a passing test that ran longer is marked failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_time_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat: Option<u32>,
    /// Reason the test is not run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignore: Option<String>,
}

impl TestSpec {
    /// Create a test running `command`.
    pub fn new(name: impl Into<String>, command: &[&str]) -> Self {
        Self {
            name: name.into(),
            command: command.iter().map(|s| s.to_string()).collect(),
            categories: Vec::new(),
            actions: Vec::new(),
            timeout_ms: None,
            max_time_ms: None,
            repeat: None,
            ignore: None,
        }
    }
}

/// A suite: tests, nested suites, and actions declared at this level.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SuiteSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<ActionSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tests: Vec<TestSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suites: Vec<SuiteSpec>,
}

impl SuiteSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// A package of tests plus the settings that govern how it is run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestPackage {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(default)]
    settings: BTreeMap<String, SettingValue>,
    pub suite: SuiteSpec,
}

/// Raw manifest document; `name` falls back to the file stem.
#[derive(Debug, Deserialize)]
struct ManifestDocument {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    settings: BTreeMap<String, SettingValue>,
    suite: SuiteSpec,
}

impl TestPackage {
    /// Create a package around an in-memory suite.
    pub fn new(name: impl Into<String>, suite: SuiteSpec) -> Self {
        Self {
            name: name.into(),
            path: None,
            settings: BTreeMap::new(),
            suite,
        }
    }

    /// Read a manifest file.
    ///
    /// ## Errors
    ///
    /// Returns [`ManifestError::Io`] when the file cannot be read and [`ManifestError::Syntax`] (with a
    /// labelled span) when it is not a valid manifest.
    pub fn from_manifest(path: &Path) -> Result<Self, ManifestError> {
        let source = fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let mut package = Self::from_manifest_str(&path.display().to_string(), &source)?;
        if package.name.is_empty() {
            package.name = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("package")
                .to_string();
        }
        package.path = Some(path.to_path_buf());
        Ok(package)
    }

    /// Parse manifest text; `origin` names the source in diagnostics.
    pub fn from_manifest_str(origin: &str, source: &str) -> Result<Self, ManifestError> {
        let doc: ManifestDocument = serde_json::from_str(source).map_err(|e| {
            let offset = byte_offset(source, e.line(), e.column());
            ManifestError::Syntax {
                path: origin.to_string(),
                src: NamedSource::new(origin, source.to_string()),
                span: SourceSpan::from(offset..offset.saturating_add(1).min(source.len().max(offset))),
                message: e.to_string(),
            }
        })?;

        let mut package = TestPackage::new(doc.name.unwrap_or_default(), doc.suite);
        for (key, value) in doc.settings {
            package.set_setting(&key, value);
        }
        Ok(package)
    }

    /// Look up a setting, returning `default` when it is absent or of the wrong shape.
    pub fn get_setting<T: FromSetting>(&self, key: &str, default: T) -> T {
        self.settings
            .get(settings::canonical_name(key))
            .and_then(T::from_setting)
            .unwrap_or(default)
    }

    /// Store a setting under its canonical name.
    pub fn set_setting(&mut self, key: &str, value: impl Into<SettingValue>) {
        self.settings
            .insert(settings::canonical_name(key).to_string(), value.into());
    }

    pub fn with_setting(mut self, key: &str, value: impl Into<SettingValue>) -> Self {
        self.set_setting(key, value);
        self
    }

    pub fn settings(&self) -> &BTreeMap<String, SettingValue> {
        &self.settings
    }

    /// Directory test and hook processes run in.
    ///
    /// `WorkDirectory` wins; otherwise the manifest's directory; otherwise the current directory.
    pub fn work_directory(&self) -> PathBuf {
        let configured: String = self.get_setting(settings::WORK_DIRECTORY, String::new());
        if !configured.is_empty() {
            return PathBuf::from(configured);
        }
        self.path
            .as_deref()
            .and_then(Path::parent)
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

/// Errors raised while reading a manifest.
#[derive(Debug, Error, Diagnostic)]
pub enum ManifestError {
    #[error("cannot read manifest '{path}': {source}")]
    #[diagnostic(code(isorun::manifest::io))]
    Io { path: String, source: std::io::Error },

    #[error("invalid manifest '{path}'")]
    #[diagnostic(
        code(isorun::manifest::syntax),
        help("a manifest is a JSON object with an optional `name`, optional `settings` and a `suite`")
    )]
    Syntax {
        path: String,
        #[source_code]
        src: NamedSource<String>,
        #[label("{message}")]
        span: SourceSpan,
        message: String,
    },
}

/// Convert serde_json's 1-based line/column into a byte offset.
fn byte_offset(source: &str, line: usize, column: usize) -> usize {
    if line == 0 {
        return 0;
    }
    let mut offset = 0;
    for (idx, text) in source.split_inclusive('\n').enumerate() {
        if idx + 1 == line {
            let col = column.saturating_sub(1).min(text.len());
            return offset + col;
        }
        offset += text.len();
    }
    source.len()
}
