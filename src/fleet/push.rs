//! Client side of the agent control plane: parameter pushes.
use reqwest::Client;

use crate::error::FleetError;

use super::instance::InstanceRecord;

/// Control path for one parameter write. `restart=1` is routed to the
/// restart endpoint; everything else becomes a `/set` query.
#[must_use]
pub fn push_path(param: &str, value: &str) -> String {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair(param, value)
        .finish();
    if query == "restart=1" {
        "/restart".to_owned()
    } else {
        format!("/set?{}", query)
    }
}

#[derive(Clone)]
pub struct PushClient {
    client: Client,
    control_port: u16,
}

impl PushClient {
    #[must_use]
    pub const fn new(client: Client, control_port: u16) -> Self {
        Self {
            client,
            control_port,
        }
    }

    /// Sends `param=value` to one agent and returns the response body.
    ///
    /// # Errors
    ///
    /// Returns an error when the instance has no address, the request fails,
    /// or the agent answers with a non-200 status.
    pub async fn push(
        &self,
        instance: &InstanceRecord,
        param: &str,
        value: &str,
    ) -> Result<String, FleetError> {
        if !instance.has_address() {
            return Err(FleetError::MissingAddress {
                instance_id: instance.instance_id.clone(),
            });
        }
        let url = format!(
            "http://{}:{}{}",
            instance.address,
            self.control_port,
            push_path(param, value)
        );
        let push_error = |err| FleetError::Push {
            instance_id: instance.instance_id.clone(),
            source: err,
        };
        let response = self.client.get(url).send().await.map_err(push_error)?;
        let status = response.status().as_u16();
        if status != 200 {
            return Err(FleetError::PushStatus {
                instance_id: instance.instance_id.clone(),
                status,
            });
        }
        response.text().await.map_err(push_error)
    }
}
