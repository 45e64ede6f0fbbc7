//! Call and response shapes exchanged with the transport layer.
//!
//! Only the shapes are defined here; how they are encoded on the wire is up
//! to the transport, which is why everything derives `serde` traits.

use serde::{Deserialize, Serialize};

use crate::types::Value;

/// Output name used for the message of a service-specific failure.
pub const SERVICE_SPECIFIC_ERROR: &str = "error";

/// Incoming service call.
///
/// `operation_id` is optional because a call can arrive malformed; the
/// dispatcher rejects such calls instead of routing them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Call {
    pub operation_id: Option<String>,
    pub payload: Value,
}

impl Call {
    /// Creates a call targeting `operation_id`.
    pub fn new(operation_id: impl Into<String>, payload: impl Into<Value>) -> Self {
        Self {
            operation_id: Some(operation_id.into()),
            payload: payload.into(),
        }
    }

    /// Returns the operation id if present and non-empty.
    #[must_use]
    pub fn routable_id(&self) -> Option<&str> {
        self.operation_id.as_deref().filter(|id| !id.is_empty())
    }
}

/// Outcome of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallStatus {
    Succeeded,
    ServiceSpecificFailure,
}

/// Named output value of a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessOutput {
    pub name: String,
    pub value: Value,
}

impl ProcessOutput {
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Response to a call. Outputs keep the order in which they were added.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub status: CallStatus,
    pub outputs: Vec<ProcessOutput>,
}

impl Response {
    #[must_use]
    pub fn new(status: CallStatus) -> Self {
        Self {
            status,
            outputs: Vec::new(),
        }
    }

    #[must_use]
    pub fn succeeded() -> Self {
        Self::new(CallStatus::Succeeded)
    }

    /// Failure carrying `message` under [`SERVICE_SPECIFIC_ERROR`].
    pub fn service_specific_failure(message: impl Into<String>) -> Self {
        Self::new(CallStatus::ServiceSpecificFailure)
            .with_output(SERVICE_SPECIFIC_ERROR, Value::String(message.into()))
    }

    /// Appends an output.
    #[must_use]
    pub fn with_output(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.outputs.push(ProcessOutput::new(name, value));
        self
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == CallStatus::Succeeded
    }

    /// First output with the given name.
    #[must_use]
    pub fn output(&self, name: &str) -> Option<&Value> {
        self.outputs
            .iter()
            .find(|output| output.name == name)
            .map(|output| &output.value)
    }

    /// Message of a service-specific failure, if this response carries one.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        match self.output(SERVICE_SPECIFIC_ERROR) {
            Some(Value::String(message)) => Some(message),
            _ => None,
        }
    }
}
