use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

pub const DEFAULT_INSTANCE_TYPE: &str = "t1.micro";
pub const DEFAULT_CONTROL_PORT: u16 = 8889;
pub const DEFAULT_POLL_FAN_OUT: usize = 256;

/// Settings read by the `start`, `stop`, `status` and `set` commands.
///
/// camelCase keys are accepted so existing `aws-config.json` style files
/// load unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CoordinatorConfig {
    #[serde(default)]
    pub regions: Vec<String>,
    #[serde(default, alias = "accessKeyId")]
    pub access_key_id: String,
    #[serde(default, alias = "accessKeySecret")]
    pub access_key_secret: String,
    #[serde(default = "default_instance_type", alias = "instanceType")]
    pub instance_type: String,
    #[serde(default, alias = "userDataFile")]
    pub user_data_file: Option<PathBuf>,
    #[serde(default, alias = "keyName")]
    pub key_name: Option<String>,
    /// Applied to new instances; every other command only touches instances
    /// carrying all of these with equal values.
    #[serde(default, alias = "instanceTags")]
    pub instance_tags: BTreeMap<String, String>,
    #[serde(default = "default_control_port", alias = "controlPort")]
    pub control_port: u16,
    /// Region -> image id, merged over the built-in table.
    #[serde(default)]
    pub images: BTreeMap<String, String>,
    #[serde(default = "default_poll_fan_out", alias = "pollFanOut")]
    pub poll_fan_out: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            regions: Vec::new(),
            access_key_id: String::new(),
            access_key_secret: String::new(),
            instance_type: default_instance_type(),
            user_data_file: None,
            key_name: None,
            instance_tags: BTreeMap::new(),
            control_port: DEFAULT_CONTROL_PORT,
            images: BTreeMap::new(),
            poll_fan_out: DEFAULT_POLL_FAN_OUT,
        }
    }
}

impl CoordinatorConfig {
    /// Regions a command operates on: the explicit one, or every configured
    /// region.
    #[must_use]
    pub fn target_regions(&self, region: Option<&str>) -> Vec<String> {
        region.map_or_else(|| self.regions.clone(), |region| vec![region.to_owned()])
    }
}

fn default_instance_type() -> String {
    DEFAULT_INSTANCE_TYPE.to_owned()
}

const fn default_control_port() -> u16 {
    DEFAULT_CONTROL_PORT
}

const fn default_poll_fan_out() -> usize {
    DEFAULT_POLL_FAN_OUT
}
