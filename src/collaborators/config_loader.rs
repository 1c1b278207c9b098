//! Configuration-loader contract (spec §6): parses repo config into a
//! layout. The manager never parses config itself — it only asks for a
//! trusted or untrusted load and interprets the result (spec §4.4).

use crate::layout::cache::ConfigErrorEntry;

pub struct LoadOutcome {
    pub layout_uuid: Option<uuid::Uuid>,
    pub loading_errors: Vec<ConfigErrorEntry>,
}

pub trait ConfigLoader {
    /// `include_config_projects = true` is Phase 1 (trusted); `false` is
    /// Phase 2 (untrusted) (spec §4.4).
    fn create_dynamic_layout(
        &self,
        item_project: &str,
        item_branch: &str,
        files: &[String],
        include_config_projects: bool,
    ) -> anyhow::Result<LoadOutcome>;

    /// Resolve the job graph a resolved layout assigns to this
    /// project/branch — the "freeze job graph" step of spec §4.1's
    /// transition diagram (`LAYOUT_READY -> JOBS_READY`).
    fn freeze_job_graph(
        &self,
        layout_uuid: uuid::Uuid,
        item_project: &str,
        item_branch: &str,
    ) -> anyhow::Result<Vec<String>>;
}
