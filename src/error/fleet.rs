use thiserror::Error;

#[derive(Debug, Error)]
pub enum FleetError {
    #[error("{action} request in {region} failed: {source}")]
    Request {
        action: &'static str,
        region: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{action} in {region} returned status {status}: {body}")]
    Api {
        action: &'static str,
        region: String,
        status: u16,
        body: String,
    },
    #[error("Failed to decode {action} response: {source}")]
    Decode {
        action: &'static str,
        #[source]
        source: quick_xml::DeError,
    },
    #[error("{action} response did not contain an instance id.")]
    MissingInstanceId { action: &'static str },
    #[error("Invalid endpoint URL '{url}': {source}")]
    InvalidEndpoint {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("Failed to sign request: {source}")]
    Sign {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("Failed to build HTTP client: {source}")]
    BuildClient {
        #[source]
        source: reqwest::Error,
    },
    #[error("Instance {instance_id} has no address.")]
    MissingAddress { instance_id: String },
    #[error("Instance {instance_id} request failed: {source}")]
    Push {
        instance_id: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("Instance {instance_id} status code = {status}")]
    PushStatus { instance_id: String, status: u16 },
    #[cfg(test)]
    #[error("Test expectation failed: {message}")]
    TestExpectation { message: &'static str },
    #[cfg(test)]
    #[error("Test expectation failed: {message}: {value}")]
    TestExpectationValue {
        message: &'static str,
        value: String,
    },
}
