//! Generate a Markdown reference from the `isorun_core` registries.
//!
//! Renders settings, action targets and result states into `docs/reference/vocabulary.md`.
//!
//! ## Notes
//! - The generated file is a derived artifact; update the registries instead of editing it.
//!
//! ## Examples
//! Run from the workspace root:
//! ```bash
//! cargo run -p isorun_core --bin generate_vocab_reference
//! ```
//!
//! ## Panics
//! - If the workspace root cannot be resolved.
//! - If the output file cannot be written.

use std::fs;
use std::path::{Path, PathBuf};

use isorun_core::registry::VocabInfo;
use isorun_core::{settings, status, targets};

fn main() {
    let root = workspace_root();
    let out_dir = root.join("docs/reference");
    fs::create_dir_all(&out_dir).expect("create docs/reference/");

    let path = out_dir.join("vocabulary.md");
    fs::write(&path, render()).expect("write vocabulary.md");
    println!("wrote {}", path.display());
}

fn render() -> String {
    let mut out = String::new();
    out.push_str("# isorun vocabulary reference\n\n");
    out.push_str("Generated from `isorun_core`. Do not edit by hand.\n");

    start_section(&mut out, "## Package settings");
    write_table(&mut out, settings::SETTINGS);

    start_section(&mut out, "## Action targets");
    write_table(&mut out, targets::TARGETS);

    start_section(&mut out, "## Result states");
    write_table(&mut out, status::RESULT_STATES);

    out
}

fn start_section(out: &mut String, heading: &str) {
    if !out.ends_with("\n\n") {
        out.push('\n');
    }
    out.push_str(heading);
    out.push_str("\n\n");
}

fn write_table<Id>(out: &mut String, table: &[VocabInfo<Id>]) {
    out.push_str("| Name | Aliases | Since | Description |\n");
    out.push_str("|---|---|---|---|\n");
    for info in table {
        let aliases = if info.aliases.is_empty() {
            "-".to_string()
        } else {
            info.aliases.iter().map(|a| format!("`{a}`")).collect::<Vec<_>>().join(", ")
        };
        out.push_str(&format!(
            "| `{}` | {} | {} | {} |\n",
            info.canonical, aliases, info.since_version, info.description
        ));
    }
}

fn workspace_root() -> PathBuf {
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    manifest_dir
        .ancestors()
        .nth(2)
        .map(Path::to_path_buf)
        .expect("isorun_core lives two levels below the workspace root")
}
