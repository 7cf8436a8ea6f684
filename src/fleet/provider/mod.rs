//! Cloud provider seam used by the fleet commands.
pub mod ec2;
pub mod regions;
pub mod userdata;

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::FleetError;

use super::instance::InstanceRecord;

pub use ec2::Ec2Provider;
pub use regions::ImageTable;

/// Parameters for launching one agent instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub image_id: String,
    pub instance_type: String,
    /// Base64-encoded boot script.
    pub user_data: String,
    pub key_name: Option<String>,
}

/// Instance lifecycle calls against one region.
#[async_trait]
pub trait Provider: Send + Sync {
    fn region(&self) -> &str;

    /// Every instance visible in the region, regardless of state.
    async fn describe_instances(&self) -> Result<Vec<InstanceRecord>, FleetError>;

    /// Launches one instance and returns its id.
    async fn run_instance(&self, spec: &LaunchSpec) -> Result<String, FleetError>;

    async fn create_tags(
        &self,
        instance_id: &str,
        tags: &BTreeMap<String, String>,
    ) -> Result<(), FleetError>;

    async fn terminate_instances(&self, instance_ids: &[String]) -> Result<(), FleetError>;
}
