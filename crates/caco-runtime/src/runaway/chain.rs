//! Call-chain collapsing.
//!
//! A chain that delegates and then returns (`A → B → A`) is no deeper than
//! where it started. Collapsing walks the chain with a stack: a repeated id
//! truncates the stack back to its earlier occurrence, a new id is pushed.

use std::collections::HashSet;
use std::iter;

fn collapse<'a>(ids: impl IntoIterator<Item = &'a str>) -> Vec<&'a str> {
    let mut stack: Vec<&str> = Vec::new();
    for id in ids {
        if let Some(pos) = stack.iter().position(|s| *s == id) {
            stack.truncate(pos + 1);
        } else {
            stack.push(id);
        }
    }
    stack
}

/// Minimal equivalent of `chain` with delegate-and-return loops removed.
///
/// Idempotent; never longer than the input; a chain without repeats is
/// returned unchanged.
pub fn collapse_chain<S: AsRef<str>>(chain: &[S]) -> Vec<String> {
    collapse(chain.iter().map(AsRef::as_ref))
        .into_iter()
        .map(str::to_owned)
        .collect()
}

/// Length of the collapsed chain.
pub fn effective_depth<S: AsRef<str>>(chain: &[S]) -> usize {
    collapse(chain.iter().map(AsRef::as_ref)).len()
}

/// Effective depth of `chain` extended by `next`, without copying the chain.
pub(crate) fn effective_depth_with<S: AsRef<str>>(chain: &[S], next: &str) -> usize {
    collapse(chain.iter().map(AsRef::as_ref).chain(iter::once(next))).len()
}

/// Distinct ids across the whole input chain.
pub fn unique_session_count<S: AsRef<str>>(chain: &[S]) -> usize {
    chain
        .iter()
        .map(AsRef::as_ref)
        .collect::<HashSet<&str>>()
        .len()
}
