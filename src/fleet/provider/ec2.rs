//! EC2 Query API client, signed with SigV4.
use std::collections::BTreeMap;

use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sigv4::http_request::{SignableBody, SignableRequest, SigningSettings, sign};
use aws_sigv4::sign::v4;
use aws_smithy_runtime_api::client::identity::Identity;
use reqwest::{Client, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::FleetError;
use crate::fleet::instance::{InstanceRecord, LifecycleState};

use super::{LaunchSpec, Provider};

const API_VERSION: &str = "2016-11-15";
const SERVICE_NAME: &str = "ec2";
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=utf-8";

pub struct Ec2Provider {
    client: Client,
    region: String,
    endpoint: Url,
    access_key_id: String,
    access_key_secret: String,
}

impl Ec2Provider {
    /// Client for the regional endpoint `https://ec2.<region>.amazonaws.com/`.
    ///
    /// # Errors
    ///
    /// Returns an error when the region does not form a valid endpoint URL.
    pub fn new(
        client: Client,
        region: &str,
        access_key_id: &str,
        access_key_secret: &str,
    ) -> Result<Self, FleetError> {
        let raw = format!("https://{}.{}.amazonaws.com/", SERVICE_NAME, region);
        let endpoint = Url::parse(&raw).map_err(|err| FleetError::InvalidEndpoint {
            url: raw,
            source: err,
        })?;
        Ok(Self {
            client,
            region: region.to_owned(),
            endpoint,
            access_key_id: access_key_id.to_owned(),
            access_key_secret: access_key_secret.to_owned(),
        })
    }

    #[must_use]
    pub fn with_endpoint(mut self, endpoint: Url) -> Self {
        self.endpoint = endpoint;
        self
    }

    async fn call<T>(&self, action: &'static str, params: Vec<(String, String)>) -> Result<T, FleetError>
    where
        T: DeserializeOwned,
    {
        let text = self.call_raw(action, params).await?;
        decode_response(action, &text)
    }

    /// Sends one signed action and returns the XML body of a 2xx reply.
    async fn call_raw(
        &self,
        action: &'static str,
        params: Vec<(String, String)>,
    ) -> Result<String, FleetError> {
        let body = encode_form(action, params);
        let signed = sign_headers(
            &self.access_key_id,
            &self.access_key_secret,
            &self.region,
            &self.endpoint,
            &body,
        )?;

        let mut builder = self
            .client
            .post(self.endpoint.clone())
            .header(http::header::CONTENT_TYPE, FORM_CONTENT_TYPE);
        for (name, value) in &signed {
            builder = builder.header(name, value);
        }

        debug!("EC2 {} in {}", action, self.region);
        let request_error = |err| FleetError::Request {
            action,
            region: self.region.clone(),
            source: err,
        };
        let response = builder.body(body).send().await.map_err(request_error)?;
        let status = response.status();
        let text = response.text().await.map_err(request_error)?;
        if !status.is_success() {
            return Err(FleetError::Api {
                action,
                region: self.region.clone(),
                status: status.as_u16(),
                body: text,
            });
        }
        Ok(text)
    }
}

#[async_trait]
impl Provider for Ec2Provider {
    fn region(&self) -> &str {
        &self.region
    }

    async fn describe_instances(&self) -> Result<Vec<InstanceRecord>, FleetError> {
        let mut records = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let params = next_token
                .take()
                .map(|token| vec![("NextToken".to_owned(), token)])
                .unwrap_or_default();
            let mut page: DescribeInstancesResponse =
                self.call("DescribeInstances", params).await?;
            let token = page_token(page.next_token.take());
            records.extend(page.into_records());
            match token {
                Some(token) => next_token = Some(token),
                None => break,
            }
        }
        Ok(records)
    }

    async fn run_instance(&self, spec: &LaunchSpec) -> Result<String, FleetError> {
        let response: RunInstancesResponse =
            self.call("RunInstances", run_instances_params(spec)).await?;
        response
            .instances_set
            .items
            .into_iter()
            .next()
            .map(|instance| instance.instance_id)
            .ok_or(FleetError::MissingInstanceId {
                action: "RunInstances",
            })
    }

    async fn create_tags(
        &self,
        instance_id: &str,
        tags: &BTreeMap<String, String>,
    ) -> Result<(), FleetError> {
        self.call_raw("CreateTags", create_tags_params(instance_id, tags))
            .await?;
        Ok(())
    }

    async fn terminate_instances(&self, instance_ids: &[String]) -> Result<(), FleetError> {
        self.call_raw("TerminateInstances", terminate_params(instance_ids))
            .await?;
        Ok(())
    }
}

fn encode_form(action: &str, params: Vec<(String, String)>) -> String {
    let mut form = url::form_urlencoded::Serializer::new(String::new());
    form.append_pair("Action", action);
    form.append_pair("Version", API_VERSION);
    form.extend_pairs(params);
    form.finish()
}

/// Returns the SigV4 headers (`authorization`, `x-amz-date`, ...) for a form
/// POST to `endpoint`.
fn sign_headers(
    access_key_id: &str,
    access_key_secret: &str,
    region: &str,
    endpoint: &Url,
    body: &str,
) -> Result<Vec<(http::HeaderName, http::HeaderValue)>, FleetError> {
    let identity: Identity =
        Credentials::new(access_key_id, access_key_secret, None, None, "loadfleet").into();
    let signing_params = v4::SigningParams::builder()
        .identity(&identity)
        .region(region)
        .name(SERVICE_NAME)
        .time(std::time::SystemTime::now())
        .settings(SigningSettings::default())
        .build()
        .map_err(|err| FleetError::Sign {
            source: Box::new(err),
        })?
        .into();

    let headers = [("content-type", FORM_CONTENT_TYPE)];
    let signable = SignableRequest::new(
        "POST",
        endpoint.as_str(),
        headers.iter().copied(),
        SignableBody::Bytes(body.as_bytes()),
    )
    .map_err(|err| FleetError::Sign {
        source: Box::new(err),
    })?;

    let (instructions, _signature) = sign(signable, &signing_params)
        .map_err(|err| FleetError::Sign {
            source: Box::new(err),
        })?
        .into_parts();

    let mut http_req = http::Request::builder()
        .method("POST")
        .uri(endpoint.as_str())
        .header(http::header::CONTENT_TYPE, FORM_CONTENT_TYPE)
        .body(())
        .map_err(|err| FleetError::Sign {
            source: Box::new(err),
        })?;
    instructions.apply_to_request_http1x(&mut http_req);

    Ok(http_req
        .headers()
        .iter()
        .filter(|(name, _)| *name != http::header::CONTENT_TYPE)
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect())
}

fn run_instances_params(spec: &LaunchSpec) -> Vec<(String, String)> {
    let mut params = vec![
        ("ImageId".to_owned(), spec.image_id.clone()),
        ("InstanceType".to_owned(), spec.instance_type.clone()),
        ("MinCount".to_owned(), "1".to_owned()),
        ("MaxCount".to_owned(), "1".to_owned()),
        ("UserData".to_owned(), spec.user_data.clone()),
    ];
    if let Some(key_name) = spec.key_name.as_ref() {
        params.push(("KeyName".to_owned(), key_name.clone()));
    }
    params
}

fn create_tags_params(instance_id: &str, tags: &BTreeMap<String, String>) -> Vec<(String, String)> {
    let mut params = vec![("ResourceId.1".to_owned(), instance_id.to_owned())];
    for (index, (key, value)) in tags.iter().enumerate() {
        let position = index.saturating_add(1);
        params.push((format!("Tag.{}.Key", position), key.clone()));
        params.push((format!("Tag.{}.Value", position), value.clone()));
    }
    params
}

fn terminate_params(instance_ids: &[String]) -> Vec<(String, String)> {
    instance_ids
        .iter()
        .enumerate()
        .map(|(index, id)| (format!("InstanceId.{}", index.saturating_add(1)), id.clone()))
        .collect()
}

fn decode_response<T: DeserializeOwned>(action: &'static str, body: &str) -> Result<T, FleetError> {
    quick_xml::de::from_str(body).map_err(|err| FleetError::Decode {
        action,
        source: err,
    })
}

fn page_token(token: Option<String>) -> Option<String> {
    token.filter(|token| !token.is_empty())
}

/// EC2 wraps every list in `<item>` elements.
#[derive(Debug, Deserialize)]
struct ItemSet<T> {
    #[serde(rename = "item", default = "Vec::new")]
    items: Vec<T>,
}

impl<T> Default for ItemSet<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DescribeInstancesResponse {
    #[serde(default)]
    reservation_set: ItemSet<Reservation>,
    #[serde(default)]
    next_token: Option<String>,
}

impl DescribeInstancesResponse {
    fn into_records(self) -> impl Iterator<Item = InstanceRecord> {
        self.reservation_set
            .items
            .into_iter()
            .flat_map(|reservation| reservation.instances_set.items)
            .map(Ec2Instance::into_record)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Reservation {
    #[serde(default)]
    instances_set: ItemSet<Ec2Instance>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Ec2Instance {
    instance_id: String,
    #[serde(default)]
    instance_state: Option<InstanceState>,
    #[serde(default)]
    dns_name: Option<String>,
    #[serde(default)]
    ip_address: Option<String>,
    #[serde(default)]
    tag_set: ItemSet<Tag>,
}

impl Ec2Instance {
    fn into_record(self) -> InstanceRecord {
        let address = self
            .dns_name
            .filter(|name| !name.is_empty())
            .or(self.ip_address)
            .unwrap_or_default();
        InstanceRecord {
            instance_id: self.instance_id,
            address,
            state: self
                .instance_state
                .map_or(LifecycleState::Unknown, |state| LifecycleState::parse(&state.name)),
            tags: self
                .tag_set
                .items
                .into_iter()
                .map(|tag| (tag.key, tag.value))
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct InstanceState {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Tag {
    key: String,
    #[serde(default)]
    value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunInstancesResponse {
    #[serde(default)]
    instances_set: ItemSet<LaunchedInstance>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LaunchedInstance {
    instance_id: String,
}
