#![allow(clippy::module_name_repetitions)]
//! Small utilities: process execution, random identifiers, ordered path-list helpers.

pub mod exec;
pub mod id;

use std::collections::HashSet;

/// Trimmed, non-empty lines of command output.
pub fn non_empty_lines(s: &str) -> impl Iterator<Item = &str> {
    s.lines().map(str::trim).filter(|l| !l.is_empty())
}

/// Append the items of `extra` that are not yet in `into`, keeping first-seen order.
pub fn merge_unique<I>(into: &mut Vec<String>, extra: I)
where
    I: IntoIterator<Item = String>,
{
    let mut seen: HashSet<String> = into.iter().cloned().collect();
    for item in extra {
        if !item.is_empty() && seen.insert(item.clone()) {
            into.push(item);
        }
    }
}

/// Items of `items` not contained in `unwanted`, order preserved.
pub fn subtract<'a>(items: &'a [String], unwanted: &HashSet<String>) -> Vec<&'a String> {
    items
        .iter()
        .filter(|s| !s.is_empty() && !unwanted.contains(*s))
        .collect()
}
