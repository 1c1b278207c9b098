//! TOML configuration loading for pipelines and semaphores (spec §10.3).

use serde::Deserialize;

use crate::error::PipelineError;
use crate::model::Pipeline;
use crate::queue::change_queue::ChangeQueue;
use crate::semaphore::SemaphoreSpec;

fn default_window() -> usize {
    20
}

fn default_window_increase_factor() -> usize {
    1
}

fn default_window_decrease_factor() -> f64 {
    0.5
}

fn default_window_floor() -> usize {
    1
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueueConfig {
    pub name: String,
    #[serde(default)]
    pub dynamic: bool,
    #[serde(default)]
    pub allow_circular_dependencies: bool,
    #[serde(default = "default_window")]
    pub window: usize,
    #[serde(default = "default_window_floor")]
    pub window_floor: usize,
    #[serde(default = "default_window_increase_factor")]
    pub window_increase_factor: usize,
    #[serde(default = "default_window_decrease_factor")]
    pub window_decrease_factor: f64,
}

impl QueueConfig {
    fn into_queue(self) -> ChangeQueue {
        let mut queue = if self.dynamic {
            ChangeQueue::new_dynamic(self.name, self.window)
        } else {
            ChangeQueue::new_static(self.name, self.window)
        };
        queue.allow_circular_dependencies = self.allow_circular_dependencies;
        queue.window_floor = self.window_floor;
        queue.window_increase_factor = self.window_increase_factor;
        queue.window_decrease_factor = self.window_decrease_factor;
        queue
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    pub name: String,
    pub tenant: String,
    #[serde(default)]
    pub precedence: i64,
    #[serde(default)]
    pub queues: Vec<QueueConfig>,
    #[serde(default)]
    pub supercedes: Vec<String>,
    pub disable_at: Option<u32>,
    #[serde(default)]
    pub allow_circular_dependencies: bool,
    #[serde(default)]
    pub dequeue_on_new_patchset: bool,
}

impl PipelineConfig {
    fn into_pipeline(self) -> Pipeline {
        let mut pipeline = Pipeline::new(self.name, self.tenant);
        pipeline.precedence = self.precedence;
        pipeline.supercedes = self.supercedes;
        pipeline.disable_at = self.disable_at;
        pipeline.allow_circular_dependencies = self.allow_circular_dependencies;
        pipeline.dequeue_on_new_patchset = self.dequeue_on_new_patchset;
        pipeline.queues = self.queues.into_iter().map(QueueConfig::into_queue).collect();
        pipeline
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SemaphoreConfig {
    pub name: String,
    pub max: usize,
    #[serde(default)]
    pub resources_first: bool,
}

impl From<SemaphoreConfig> for SemaphoreSpec {
    fn from(c: SemaphoreConfig) -> Self {
        SemaphoreSpec { name: c.name, max_count: c.max, resources_first: c.resources_first }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ManagerConfig {
    #[serde(default)]
    pub pipelines: Vec<PipelineConfig>,
    #[serde(default)]
    pub semaphores: Vec<SemaphoreConfig>,
    /// Root directory for the file-backed coordination store.
    #[serde(default = "default_coordination_root")]
    pub coordination_root: String,
}

fn default_coordination_root() -> String {
    ".conveyor-state".to_string()
}

impl ManagerConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, PipelineError> {
        toml::from_str(raw).map_err(|e| PipelineError::ConfigError(e.to_string()))
    }

    pub fn load(path: &std::path::Path) -> Result<Self, PipelineError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn pipelines(self) -> Vec<Pipeline> {
        self.pipelines.into_iter().map(PipelineConfig::into_pipeline).collect()
    }
}
