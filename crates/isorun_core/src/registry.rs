//! Shareable metadata for `isorun_core` registries.
//!
//! Every vocabulary in this crate (settings, action targets, result states, execution status) is a
//! **registry-first** table: a stable id, a canonical spelling, optional aliases and a description.
//! This module provides the small, dependency-free metadata type reused by all of them.
//!
//! ## Notes
//! - The type is `Copy` so registries can live in `const` tables.
//! - Metadata is meant for docs, diagnostics and manifest parsing; enforcement of semantics lives in
//!   the `isorun` crate.
//!
//! ## See also
//! - [`crate::settings`]
//! - [`crate::targets`]
//! - [`crate::status`]

/// Identify the isorun version a vocabulary item is available since.
///
/// ## Examples
/// ```rust
/// use isorun_core::registry::SinceVersion;
///
/// let since: SinceVersion = "0.1.0";
/// assert!(!since.is_empty());
/// ```
pub type SinceVersion = &'static str;

/// Shared metadata shape for registry items.
///
/// ## Notes
/// - `description` is mandatory to keep docs and `--help` output consistent.
/// - Spellings are matched exactly; callers that want case-insensitive lookup should go through the
///   registry's own `from_str`.
#[derive(Debug, Clone, Copy)]
pub struct VocabInfo<Id> {
    pub id: Id,
    pub canonical: &'static str,
    pub aliases: &'static [&'static str],
    pub description: &'static str,
    pub since_version: SinceVersion,
}

impl<Id: Copy + PartialEq> VocabInfo<Id> {
    /// Return whether `spelling` names this item (canonical or alias).
    pub fn accepts(&self, spelling: &str) -> bool {
        self.canonical == spelling || self.aliases.contains(&spelling)
    }
}

/// Resolve a spelling against a registry table.
///
/// Canonical spellings win over aliases, so an alias can never shadow another item's canonical name.
pub fn lookup<Id: Copy + PartialEq>(table: &[VocabInfo<Id>], spelling: &str) -> Option<Id> {
    if let Some(info) = table.iter().find(|i| i.canonical == spelling) {
        return Some(info.id);
    }
    table.iter().find(|i| i.aliases.contains(&spelling)).map(|i| i.id)
}

/// Return the metadata entry for an id, if the table contains it.
pub fn find<Id: Copy + PartialEq>(table: &'static [VocabInfo<Id>], id: Id) -> Option<&'static VocabInfo<Id>> {
    table.iter().find(|i| i.id == id)
}
