//! The two-phase speculative loader and its trusted/untrusted decision
//! table (spec §4.4).

use crate::collaborators::config_loader::{ConfigLoader, LoadOutcome};

use super::cache::ConfigErrorEntry;

/// Outcome of running both speculative phases and reconciling them per the
/// decision table.
pub enum LoaderDecision {
    /// Use the freshly-computed untrusted layout.
    UseUntrusted(uuid::Uuid),
    /// Config-only change: inherit the item ahead's layout unchanged.
    UseParentLayout,
    /// Set these errors on the item and resolve to no layout (the item
    /// will report `CONFIG_ERROR`, spec §4.6).
    Blocked(Vec<ConfigErrorEntry>),
}

fn errors_intersect(errors: &[ConfigErrorEntry], project: &str, branch: &str) -> bool {
    errors.iter().any(|e| e.matches(project, branch))
}

/// Run both speculative phases and apply the decision table in spec §4.4.
pub fn run_dynamic_loader(
    loader: &dyn ConfigLoader,
    item_project: &str,
    item_branch: &str,
    files: &[String],
) -> anyhow::Result<LoaderDecision> {
    let trusted = loader.create_dynamic_layout(item_project, item_branch, files, true)?;
    let untrusted = loader.create_dynamic_layout(item_project, item_branch, files, false)?;
    Ok(reconcile(item_project, item_branch, trusted, untrusted))
}

fn reconcile(item_project: &str, item_branch: &str, trusted: LoadOutcome, untrusted: LoadOutcome) -> LoaderDecision {
    let t = trusted.layout_uuid.is_some();
    let te = !trusted.loading_errors.is_empty();
    let u = untrusted.layout_uuid.is_some();
    let ue = !untrusted.loading_errors.is_empty();

    // Row 1 & 2: untrusted loaded cleanly and trusted either agrees or
    // never ran — use it.
    if u && !ue && ((t && !te) || !t) {
        return LoaderDecision::UseUntrusted(untrusted.layout_uuid.expect("u implies Some"));
    }
    // Row 3: trusted loaded cleanly, untrusted produced nothing — a
    // config-only change, inherit the parent's layout.
    if t && !te && !u {
        return LoaderDecision::UseParentLayout;
    }
    // Row 4: both loaded but untrusted also errored while trusted didn't —
    // the item depends on a change only valid in the trusted context.
    if t && !te && u && ue {
        return LoaderDecision::Blocked(vec![ConfigErrorEntry {
            project: item_project.to_string(),
            branch: item_branch.to_string(),
            message: "depends on a change that is valid only in a trusted context".to_string(),
        }]);
    }
    // Row 6: trusted itself errored — surface those errors if they touch
    // this item's project/branch, otherwise fall back to the parent.
    if t && te {
        return if errors_intersect(&trusted.loading_errors, item_project, item_branch) {
            LoaderDecision::Blocked(trusted.loading_errors)
        } else {
            LoaderDecision::UseParentLayout
        };
    }
    // Row 5: untrusted errored (trusted didn't produce a usable layout) —
    // surface if relevant, otherwise use the untrusted layout anyway.
    if u && ue {
        return if errors_intersect(&untrusted.loading_errors, item_project, item_branch) {
            LoaderDecision::Blocked(untrusted.loading_errors)
        } else {
            LoaderDecision::UseUntrusted(untrusted.layout_uuid.expect("u implies Some"))
        };
    }
    // Neither phase produced anything usable: treat as a blocking config
    // error so the item doesn't silently wedge.
    LoaderDecision::Blocked(trusted.loading_errors.into_iter().chain(untrusted.loading_errors).collect())
}
