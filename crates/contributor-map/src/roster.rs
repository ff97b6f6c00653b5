//! Roster merge: top contributors plus the rest of the forge list

use crate::activity::TopContributor;
use crate::Contributor;
use std::collections::HashSet;
use tracing::info;

/// Merge measured top contributors with the full contributor list
///
/// Top contributors come first, in statistics order, with their measured
/// impact. Every remaining login follows in forge order at
/// [`DEFAULT_IMPACT`](crate::DEFAULT_IMPACT). No name appears twice.
pub fn merge_roster(top: Vec<TopContributor>, all: Vec<String>) -> Vec<Contributor> {
    let mut seen: HashSet<String> = HashSet::with_capacity(top.len() + all.len());
    let mut roster = Vec::with_capacity(top.len().max(all.len()));

    for t in top {
        if seen.insert(t.name.clone()) {
            roster.push(Contributor::measured(t.name, t.impact));
        }
    }
    let measured = roster.len();

    for name in all {
        if seen.insert(name.clone()) {
            roster.push(Contributor::unmeasured(name));
        }
    }

    info!(
        "Roster: {} contributors ({} measured, {} at default impact)",
        roster.len(),
        measured,
        roster.len() - measured
    );

    roster
}
