use super::{AgentError, ConfigError, FleetError, ValidationError};

impl From<&'static str> for ValidationError {
    fn from(message: &'static str) -> Self {
        ValidationError::TestExpectation { message }
    }
}

impl From<String> for ValidationError {
    fn from(value: String) -> Self {
        ValidationError::TestExpectationValue {
            message: "Test expectation failed",
            value,
        }
    }
}

impl From<&'static str> for ConfigError {
    fn from(message: &'static str) -> Self {
        ConfigError::TestExpectation { message }
    }
}

impl From<String> for ConfigError {
    fn from(value: String) -> Self {
        ConfigError::TestExpectationValue {
            message: "Test expectation failed",
            value,
        }
    }
}

impl From<&'static str> for AgentError {
    fn from(message: &'static str) -> Self {
        AgentError::TestExpectation { message }
    }
}

impl From<String> for AgentError {
    fn from(value: String) -> Self {
        AgentError::TestExpectationValue {
            message: "Test expectation failed",
            value,
        }
    }
}

impl From<&'static str> for FleetError {
    fn from(message: &'static str) -> Self {
        FleetError::TestExpectation { message }
    }
}

impl From<String> for FleetError {
    fn from(value: String) -> Self {
        FleetError::TestExpectationValue {
            message: "Test expectation failed",
            value,
        }
    }
}
