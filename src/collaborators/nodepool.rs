//! Node allocation contract (spec §6). `request_nodes` returns a request
//! id synchronously; fulfillment is asynchronous and observed via
//! `get_node_request` or a `NodeRequestComplete` event.

use crate::model::ItemId;

#[derive(Debug, Clone)]
pub struct NodeRequestStatus {
    pub fulfilled: bool,
    pub nodes: Vec<String>,
}

pub trait Nodepool {
    #[allow(clippy::too_many_arguments)]
    fn request_nodes(
        &self,
        build_set_uuid: ItemId,
        job_name: &str,
        tenant: &str,
        pipeline: &str,
        provider: Option<&str>,
        priority: i32,
        relative_priority: i32,
    ) -> anyhow::Result<String>;

    fn revise_request(&self, request_id: &str, relative_priority: i32) -> anyhow::Result<()>;

    fn get_node_request(&self, request_id: &str, cached: bool) -> anyhow::Result<Option<NodeRequestStatus>>;
}
