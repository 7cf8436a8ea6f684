//! `start`, `stop` and `set`: fan out over regions and instances. Failures
//! are logged per region or instance and never abort the whole command.
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use reqwest::Client;
use tracing::{error, info, warn};

use crate::args::{SetArgs, StartArgs, StopArgs, StopCount};
use crate::config::{CoordinatorConfig, validate_credentials};
use crate::error::{AppError, AppResult, ConfigError, FleetError};

use super::distribution::{group_by_region, select_round_robin, start_assignments};
use super::instance::{InstanceRecord, managed};
use super::provider::userdata::load_user_data;
use super::provider::{Ec2Provider, ImageTable, LaunchSpec, Provider};
use super::push::PushClient;

const PUSH_TIMEOUT: Duration = Duration::from_secs(10);

pub type SharedProvider = Arc<dyn Provider>;

/// Validates credentials and regions, then builds one client per region.
/// Nothing touches the network before this succeeds.
///
/// # Errors
///
/// Returns an error for malformed credentials, unknown or missing regions,
/// or when the HTTP client cannot be built.
pub fn build_providers(
    config: &CoordinatorConfig,
    images: &ImageTable,
    regions: &[String],
) -> AppResult<Vec<SharedProvider>> {
    validate_credentials(config)?;
    images.validate_regions(regions)?;
    let client = Client::builder()
        .build()
        .map_err(|err| AppError::fleet(FleetError::BuildClient { source: err }))?;
    regions
        .iter()
        .map(|region| -> AppResult<SharedProvider> {
            let provider = Ec2Provider::new(
                client.clone(),
                region,
                &config.access_key_id,
                &config.access_key_secret,
            )?;
            Ok(Arc::new(provider))
        })
        .collect()
}

/// Launch settings shared by every instance of one `start`.
#[derive(Debug, Clone)]
pub struct LaunchTemplate {
    pub instance_type: String,
    pub user_data: String,
    pub key_name: Option<String>,
    pub tags: BTreeMap<String, String>,
}

impl LaunchTemplate {
    /// # Errors
    ///
    /// Returns an error when no boot script is configured or it cannot be
    /// read.
    pub fn from_config(config: &CoordinatorConfig) -> Result<Self, ConfigError> {
        let path = config
            .user_data_file
            .as_ref()
            .ok_or(ConfigError::MissingUserDataFile)?;
        Ok(Self {
            instance_type: config.instance_type.clone(),
            user_data: load_user_data(path)?,
            key_name: config.key_name.clone(),
            tags: config.instance_tags.clone(),
        })
    }
}

/// Starts `count` instances spread round-robin over `providers`. Returns
/// the ids that were launched.
pub async fn start_instances(
    providers: &[SharedProvider],
    images: &ImageTable,
    template: &LaunchTemplate,
    count: usize,
) -> Vec<String> {
    let launches = start_assignments(count, providers)
        .into_iter()
        .map(|provider| launch_one(provider.as_ref(), images, template));
    join_all(launches).await.into_iter().flatten().collect()
}

async fn launch_one(
    provider: &dyn Provider,
    images: &ImageTable,
    template: &LaunchTemplate,
) -> Option<String> {
    let region = provider.region();
    let image_id = match images.image_for(region) {
        Ok(image_id) => image_id.to_owned(),
        Err(err) => {
            error!("RunInstances error in {}: {}", region, err);
            return None;
        }
    };
    let spec = LaunchSpec {
        image_id,
        instance_type: template.instance_type.clone(),
        user_data: template.user_data.clone(),
        key_name: template.key_name.clone(),
    };
    let instance_id = match provider.run_instance(&spec).await {
        Ok(instance_id) => instance_id,
        Err(err) => {
            error!("RunInstances error: {}", err);
            return None;
        }
    };
    if !template.tags.is_empty() {
        if let Err(err) = provider.create_tags(&instance_id, &template.tags).await {
            error!("CreateTags error for {}: {}", instance_id, err);
            return Some(instance_id);
        }
    }
    info!("Instance {} started in region {}", instance_id, region);
    Some(instance_id)
}

/// Describes every region concurrently and keeps the managed instances,
/// one result per provider in provider order.
pub async fn describe_managed(
    providers: &[SharedProvider],
    tags: &BTreeMap<String, String>,
) -> Vec<Result<Vec<InstanceRecord>, FleetError>> {
    join_all(providers.iter().map(|provider| provider.describe_instances()))
        .await
        .into_iter()
        .map(|result| result.map(|instances| managed(instances, tags)))
        .collect()
}

/// Like [`describe_managed`], but a region whose describe call fails is
/// logged and contributes an empty list.
pub async fn managed_instances(
    providers: &[SharedProvider],
    tags: &BTreeMap<String, String>,
) -> Vec<Vec<InstanceRecord>> {
    describe_managed(providers, tags)
        .await
        .into_iter()
        .zip(providers)
        .map(|(result, provider)| {
            result.unwrap_or_else(|err| {
                error!("DescribeInstances error in {}: {}", provider.region(), err);
                Vec::new()
            })
        })
        .collect()
}

/// Terminates up to `count` managed instances, round-robin across regions.
/// Returns how many were terminated.
pub async fn stop_instances(
    providers: &[SharedProvider],
    tags: &BTreeMap<String, String>,
    count: StopCount,
) -> usize {
    let per_region: Vec<Vec<String>> = managed_instances(providers, tags)
        .await
        .into_iter()
        .map(|instances| instances.into_iter().map(|instance| instance.instance_id).collect())
        .collect();
    let selected = select_round_robin(per_region, count.limit());
    let groups = group_by_region(selected, providers.len());

    let terminations = providers
        .iter()
        .zip(groups)
        .filter(|(_, ids)| !ids.is_empty())
        .map(|(provider, ids)| async move {
            match provider.terminate_instances(&ids).await {
                Ok(()) => {
                    info!(
                        "Instances {} terminated in region {}",
                        ids.join(", "),
                        provider.region()
                    );
                    ids.len()
                }
                Err(err) => {
                    error!("TerminateInstances error: {}", err);
                    0
                }
            }
        });
    join_all(terminations)
        .await
        .into_iter()
        .fold(0usize, usize::saturating_add)
}

/// Pushes `param=value` to every managed instance. Returns
/// `(succeeded, failed)`.
pub async fn push_parameter(
    providers: &[SharedProvider],
    tags: &BTreeMap<String, String>,
    push: &PushClient,
    param: &str,
    value: &str,
) -> (usize, usize) {
    let instances: Vec<InstanceRecord> = managed_instances(providers, tags)
        .await
        .into_iter()
        .flatten()
        .collect();
    let pushes = instances.iter().map(|instance| async move {
        match push.push(instance, param, value).await {
            Ok(body) => {
                info!("Instance {} OK: {}", instance.instance_id, body.trim_end());
                true
            }
            Err(err) => {
                error!("{}", err);
                false
            }
        }
    });
    let results = join_all(pushes).await;
    let succeeded = results.iter().filter(|ok| **ok).count();
    (succeeded, results.len().saturating_sub(succeeded))
}

/// # Errors
///
/// Returns configuration errors; per-instance failures are only logged.
pub async fn run_start(config: &CoordinatorConfig, args: StartArgs) -> AppResult<()> {
    let images = ImageTable::with_overrides(&config.images);
    let regions = config.target_regions(args.region.as_deref());
    let providers = build_providers(config, &images, &regions)?;
    let template = LaunchTemplate::from_config(config)?;
    let started = start_instances(&providers, &images, &template, args.count).await;
    if started.len() < args.count {
        warn!("Started {} of {} requested instances", started.len(), args.count);
    }
    Ok(())
}

/// # Errors
///
/// Returns configuration errors; per-region failures are only logged.
pub async fn run_stop(config: &CoordinatorConfig, args: StopArgs) -> AppResult<()> {
    let images = ImageTable::with_overrides(&config.images);
    let regions = config.target_regions(args.region.as_deref());
    let providers = build_providers(config, &images, &regions)?;
    let terminated = stop_instances(&providers, &config.instance_tags, args.count).await;
    if terminated == 0 {
        info!("No instances terminated");
    }
    Ok(())
}

/// # Errors
///
/// Returns configuration errors or a client build failure; per-instance
/// failures are only logged.
pub async fn run_set(config: &CoordinatorConfig, args: SetArgs) -> AppResult<()> {
    let images = ImageTable::with_overrides(&config.images);
    let providers = build_providers(config, &images, &config.regions)?;
    let client = Client::builder()
        .timeout(PUSH_TIMEOUT)
        .build()
        .map_err(|err| AppError::fleet(FleetError::BuildClient { source: err }))?;
    let push = PushClient::new(client, config.control_port);
    let (succeeded, failed) = push_parameter(
        &providers,
        &config.instance_tags,
        &push,
        &args.param,
        &args.value,
    )
    .await;
    info!("Pushed {}={} to {} instances ({} failed)", args.param, args.value, succeeded, failed);
    Ok(())
}
