//! `Depends-On:` header discovery and the running dependency graph used for
//! cycle detection (spec §4.3).

use std::collections::HashMap;

use regex::Regex;

use crate::collaborators::source::SourceConnector;
use crate::model::{Change, ChangeKey};

use super::cycle;

fn depends_on_regex() -> Regex {
    Regex::new(r"(?im)^\s*Depends-On:\s*(\S+)\s*$").expect("static regex is valid")
}

fn extract_host(url: &str) -> Option<&str> {
    let without_scheme = url.split("://").nth(1).unwrap_or(url);
    without_scheme.split(['/', '?', '#']).next()
}

/// Scans `change.message` for `Depends-On: <url>` headers, in order,
/// first-seen wins per URL (spec "Open Questions").
pub fn extract_depends_on_urls(message: &str) -> Vec<String> {
    let re = depends_on_regex();
    let mut seen = Vec::new();
    for cap in re.captures_iter(message) {
        let url = cap[1].to_string();
        if !seen.contains(&url) {
            seen.push(url);
        }
    }
    seen
}

/// Accumulates the dependency graph discovered while walking
/// `Depends-On:` edges ahead of an enqueue, and runs cycle detection over
/// it (spec §4.3).
#[derive(Default)]
pub struct DependencyResolver {
    /// `change -> its declared dependencies`, built up as
    /// `enqueueChangesAhead` walks the graph.
    edges: HashMap<ChangeKey, Vec<ChangeKey>>,
}

impl DependencyResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `change.message`'s `Depends-On:` headers against `sources`,
    /// merged dependencies are dropped, and the deduplicated list is
    /// returned for the caller to write back as `commit_needs_changes`
    /// only if it differs from what's already stored (keeps cache keys
    /// stable, per spec §4.3).
    pub fn resolve_commit_dependencies(
        &self,
        change: &Change,
        sources: &[&dyn SourceConnector],
    ) -> anyhow::Result<Vec<Change>> {
        let mut resolved = Vec::new();
        for url in extract_depends_on_urls(&change.message) {
            let Some(host) = extract_host(&url) else { continue };
            let Some(source) = sources.iter().find(|s| s.hostname() == host) else { continue };
            if let Some(dep) = source.get_change_by_url(&url)? {
                if !dep.is_merged {
                    resolved.push(dep);
                }
            }
        }
        Ok(resolved)
    }

    /// Record that `change` depends on `needs` in the running graph (call
    /// this as each needed change is walked during `enqueueChangesAhead`).
    pub fn record_edge(&mut self, change: ChangeKey, needs: Vec<ChangeKey>) {
        self.edges.insert(change, needs);
    }

    pub fn forget(&mut self, change: &ChangeKey) {
        self.edges.remove(change);
    }

    pub fn cycle_containing(&self, change: &ChangeKey) -> Option<Vec<ChangeKey>> {
        cycle::cycle_containing(change, &self.edges)
    }

    pub fn edges(&self) -> &HashMap<ChangeKey, Vec<ChangeKey>> {
        &self.edges
    }

    /// Changes whose recorded needs-list names `change` — the reverse
    /// lookup `enqueueChangesBehind` walks to find already-known dependents
    /// of a change that just got admitted (spec §4.1, §9).
    pub fn dependents_of(&self, change: &ChangeKey) -> Vec<ChangeKey> {
        self.edges
            .iter()
            .filter(|(_, needs)| needs.iter().any(|n| n.is_same_change(change)))
            .map(|(dependent, _)| dependent.clone())
            .collect()
    }
}
