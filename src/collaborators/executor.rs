//! Job execution contract (spec §6). Like `Merger`, `execute` only
//! schedules work; results arrive as job-started / job-paused /
//! job-completed events on later ticks.

use crate::model::ItemId;

#[derive(Debug, Clone)]
pub struct JobCompletion {
    pub job_name: String,
    pub succeeded: bool,
    pub retryable: bool,
}

pub trait Executor {
    #[allow(clippy::too_many_arguments)]
    fn execute(
        &self,
        job_name: &str,
        nodes: &[String],
        item_id: ItemId,
        pipeline: &str,
        zone: Option<&str>,
        dependent_changes: &[ItemId],
        merger_items: &[ItemId],
    ) -> anyhow::Result<()>;

    fn resume_build(&self, item_id: ItemId, job_name: &str) -> anyhow::Result<()>;
}
