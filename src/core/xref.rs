//! Cross-reference checks over the week's structured data files.
//!
//! Two independent sub-checks, both run in every mode:
//!
//! - terms: every `TERMS.yml` entry needs a definition, must claim the
//!   week under test as its origin, and must be present in the shared
//!   `shared/glossary.yml`;
//! - anchors: every `ANCHORS.yml` entry needs claim/evidence/verification
//!   fields and a week-unique id, and a verification that names a pytest
//!   node must point at a test file that exists on disk.
//!
//! A missing or null file loads as an empty list; a non-list top level is
//! a single Problem and the sub-check is abandoned, so malformed data
//! never cascades into per-entry noise.

use crate::core::gate::GateCtx;
use regex::Regex;
use serde_yaml::Value;
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::LazyLock;

/// `<file>::<target>` with no embedded whitespace. Best-effort textual
/// match; free-text verification descriptions fall through unmatched.
static TEST_REF: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\S+::\S+$").unwrap());

enum Loaded {
    Entries(Vec<Value>),
    NotAList,
    Unreadable(String),
}

fn load_entry_list(path: &Path) -> Loaded {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Loaded::Entries(Vec::new()),
        Err(e) => return Loaded::Unreadable(e.to_string()),
    };
    if text.trim().is_empty() {
        return Loaded::Entries(Vec::new());
    }
    match serde_yaml::from_str::<Value>(&text) {
        Ok(Value::Null) => Loaded::Entries(Vec::new()),
        Ok(Value::Sequence(entries)) => Loaded::Entries(entries),
        Ok(_) => Loaded::NotAList,
        Err(e) => Loaded::Unreadable(e.to_string()),
    }
}

/// Non-empty trimmed string field, or `None` for anything else.
fn nonempty_str(entry: &Value, key: &str) -> Option<String> {
    entry
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Render a loosely-typed field value for a Problem message.
fn show(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => "null".to_string(),
        Some(Value::String(s)) => format!("{:?}", s),
        Some(other) => serde_yaml::to_string(other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_else(|_| "<unprintable>".to_string()),
    }
}

pub fn check_terms(ctx: &GateCtx, problems: &mut Vec<String>) {
    let terms_path = ctx.week_dir.join("TERMS.yml");
    let terms = match load_entry_list(&terms_path) {
        Loaded::Entries(entries) => entries,
        Loaded::NotAList => {
            problems.push(format!("TERMS.yml must be a list: chapters/{}/TERMS.yml", ctx.week));
            return;
        }
        Loaded::Unreadable(e) => {
            problems.push(format!("cannot load chapters/{}/TERMS.yml: {}", ctx.week, e));
            return;
        }
    };

    let glossary_path = ctx.root.join("shared").join("glossary.yml");
    let glossary = match load_entry_list(&glossary_path) {
        Loaded::Entries(entries) => entries,
        Loaded::NotAList => {
            problems.push("shared/glossary.yml must be a list".to_string());
            return;
        }
        Loaded::Unreadable(e) => {
            problems.push(format!("cannot load shared/glossary.yml: {}", e));
            return;
        }
    };
    let glossary_terms: HashSet<String> = glossary
        .iter()
        .filter_map(|entry| nonempty_str(entry, "term_zh"))
        .collect();

    for (idx, entry) in terms.iter().enumerate() {
        let pos = idx + 1;
        if entry.as_mapping().is_none() {
            problems.push(format!("TERMS.yml item #{} must be a mapping", pos));
            continue;
        }

        // The four field checks are independent: a fully broken entry
        // reports all four.
        let term_zh = nonempty_str(entry, "term_zh");
        let label = term_zh.as_deref().unwrap_or("?");

        if term_zh.is_none() {
            problems.push(format!("TERMS.yml item #{} missing non-empty 'term_zh'", pos));
        }
        if nonempty_str(entry, "definition_zh").is_none() {
            problems.push(format!(
                "TERMS.yml item #{} ({}) missing non-empty 'definition_zh'",
                pos, label
            ));
        }
        let first_seen = entry.get("first_seen");
        if first_seen.and_then(Value::as_str) != Some(ctx.week.as_str()) {
            problems.push(format!(
                "TERMS.yml item #{} ({}) first_seen must be {:?} (got {})",
                pos,
                label,
                ctx.week,
                show(first_seen)
            ));
        }
        if !glossary_terms.contains(term_zh.as_deref().unwrap_or("")) {
            problems.push(format!(
                "term missing from shared/glossary.yml: {:?}",
                term_zh.as_deref().unwrap_or("")
            ));
        }
    }
}

pub fn check_anchors(ctx: &GateCtx, problems: &mut Vec<String>) {
    let anchors_path = ctx.week_dir.join("ANCHORS.yml");
    let anchors = match load_entry_list(&anchors_path) {
        Loaded::Entries(entries) => entries,
        Loaded::NotAList => {
            problems.push(format!(
                "ANCHORS.yml must be a list: chapters/{}/ANCHORS.yml",
                ctx.week
            ));
            return;
        }
        Loaded::Unreadable(e) => {
            problems.push(format!("cannot load chapters/{}/ANCHORS.yml: {}", ctx.week, e));
            return;
        }
    };

    let mut seen_ids: HashSet<String> = HashSet::new();
    for (idx, entry) in anchors.iter().enumerate() {
        let pos = idx + 1;
        if entry.as_mapping().is_none() {
            problems.push(format!("ANCHORS.yml item #{} must be a mapping", pos));
            continue;
        }

        let anchor_id = nonempty_str(entry, "id");
        let label = anchor_id.as_deref().unwrap_or("?");

        match &anchor_id {
            None => {
                problems.push(format!("ANCHORS.yml item #{} missing non-empty 'id'", pos));
            }
            Some(id) => {
                // first occurrence is not penalized
                if !seen_ids.insert(id.clone()) {
                    problems.push(format!("duplicate anchor id: {:?}", id));
                }
            }
        }

        if nonempty_str(entry, "claim").is_none() {
            problems.push(format!(
                "ANCHORS.yml item #{} ({}) missing non-empty 'claim'",
                pos, label
            ));
        }
        if nonempty_str(entry, "evidence").is_none() {
            problems.push(format!(
                "ANCHORS.yml item #{} ({}) missing non-empty 'evidence'",
                pos, label
            ));
        }
        let Some(verification) = nonempty_str(entry, "verification") else {
            problems.push(format!(
                "ANCHORS.yml item #{} ({}) missing non-empty 'verification'",
                pos, label
            ));
            continue;
        };

        if let Some((file_part, _target)) = maybe_test_reference(&verification) {
            let file = Path::new(file_part);
            let exists = if file.is_absolute() {
                file.exists()
            } else {
                ctx.week_dir.join(file).exists() || ctx.root.join(file).exists()
            };
            if !exists {
                problems.push(format!(
                    "ANCHORS.yml item #{} ({}) verification refers to missing test file: {:?}",
                    pos, label, file_part
                ));
            }
        }
    }
}

/// Recognize a pytest node reference inside a verification string.
///
/// Accepted shapes: `pytest: <file>::<target>` or the bare
/// `<file>::<target>`. Anything else is free text and yields `None`.
pub fn maybe_test_reference(verification: &str) -> Option<(&str, &str)> {
    let v = verification.trim();
    let v = match v.strip_prefix("pytest:") {
        Some(rest) => rest.trim(),
        None => v,
    };
    if !TEST_REF.is_match(v) {
        return None;
    }
    v.split_once("::")
}
