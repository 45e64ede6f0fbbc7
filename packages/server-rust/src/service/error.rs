use std::any::Any;

use callee_core::{OperationId, Response};

/// Errors returned when mutating a `ProfileRegistry`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("handler describes an empty operation id")]
    EmptyOperationId,
    #[error("operation already registered: {operation_id}")]
    DuplicateOperation { operation_id: OperationId },
}

/// Reasons the dispatcher refuses to route a call.
///
/// These never escape as errors: the dispatcher turns them into a
/// service-specific failure response whose message is the `Display` text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DispatchRejection {
    /// Call absent, or its operation id absent or empty.
    #[error("Corrupt call")]
    CorruptCall,
    /// Operation id present but nothing registered under it.
    #[error("Invalid call")]
    UnknownOperation,
}

impl DispatchRejection {
    #[must_use]
    pub fn into_response(self) -> Response {
        Response::service_specific_failure(self.to_string())
    }
}

/// Errors from the async dispatch service.
///
/// The synchronous dispatcher has no error path; these only come from running
/// a handler on the blocking pool.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("handler panicked: {0}")]
    HandlerPanicked(String),
    #[error("dispatch task was cancelled")]
    Cancelled,
}

impl From<tokio::task::JoinError> for DispatchError {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_panic() {
            Self::HandlerPanicked(panic_message(&*err.into_panic()))
        } else {
            Self::Cancelled
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
