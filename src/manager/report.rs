//! Terminal-state to action-set selection (spec §4.6). Pure decision logic
//! over a snapshot of what happened to an item; the manager calls this
//! once an item reaches `Reportable` and is clear to report.

use crate::model::{ActionName, Pipeline};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportResult {
    NoJobs,
    ConfigError,
    MergerFailure,
    Failure,
    Success,
}

pub struct ReportOutcome {
    pub actions: Vec<ActionName>,
    pub result: ReportResult,
}

/// Everything `ReportDecision` needs to know about the item and its
/// bundle; the manager assembles this from `QueueItem`/`Bundle`/`BuildSet`
/// state before calling `decide`.
pub struct ReportInput {
    pub project_in_pipeline: bool,
    pub config_errors: Vec<String>,
    pub merger_failed: bool,
    pub dequeued_needing_change: bool,
    pub has_jobs: bool,
    pub cannot_merge_bundle: bool,
    pub bundle_failing: bool,
    pub all_jobs_succeeded: bool,
}

/// `ReportDecision`, first-match priority list (spec §4.6). Mutates
/// `pipeline.state.consecutive_failures`/`disabled` as a side effect of
/// steps 7-9 and the disabled-pipeline override, exactly as the manager
/// would persist them back to the coordination store after the tick.
pub fn decide(pipeline: &mut Pipeline, input: &ReportInput) -> ReportOutcome {
    let actions = &pipeline.actions;

    let mut outcome = if !input.project_in_pipeline {
        ReportOutcome { actions: actions.no_jobs_actions.clone(), result: ReportResult::NoJobs }
    } else if !input.config_errors.is_empty() {
        ReportOutcome { actions: actions.merge_failure_actions.clone(), result: ReportResult::ConfigError }
    } else if input.merger_failed {
        ReportOutcome { actions: actions.merge_failure_actions.clone(), result: ReportResult::MergerFailure }
    } else if input.dequeued_needing_change {
        ReportOutcome { actions: actions.failure_actions.clone(), result: ReportResult::Failure }
    } else if !input.has_jobs {
        ReportOutcome { actions: actions.no_jobs_actions.clone(), result: ReportResult::NoJobs }
    } else if input.cannot_merge_bundle {
        ReportOutcome { actions: actions.failure_actions.clone(), result: ReportResult::Failure }
    } else if input.bundle_failing {
        if !input.all_jobs_succeeded {
            pipeline.record_failure();
        }
        ReportOutcome { actions: actions.failure_actions.clone(), result: ReportResult::Failure }
    } else if input.all_jobs_succeeded {
        pipeline.record_success();
        ReportOutcome { actions: actions.success_actions.clone(), result: ReportResult::Success }
    } else {
        pipeline.record_failure();
        ReportOutcome { actions: actions.failure_actions.clone(), result: ReportResult::Failure }
    };

    if pipeline.state.disabled && input.project_in_pipeline {
        outcome.actions = pipeline.actions.disabled_actions.clone();
    }

    outcome
}
