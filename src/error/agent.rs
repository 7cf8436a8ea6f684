use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Bind error on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("I/O error during {context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("Serialization error during {context}: {source}")]
    Serialize {
        context: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("Unknown config field '{field}'.")]
    UnknownField { field: String },
    #[error("Invalid value '{value}' for {kind} field '{field}'.")]
    InvalidFieldValue {
        field: &'static str,
        kind: &'static str,
        value: String,
    },
    #[error("Invalid target URL '{url}': {source}")]
    InvalidTarget {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("Failed to build HTTP client: {source}")]
    BuildClient {
        #[source]
        source: reqwest::Error,
    },
    #[error("Engine loop is not running.")]
    EngineUnavailable,
    #[error("Failed to run restart command '{command}': {source}")]
    RestartSpawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
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
