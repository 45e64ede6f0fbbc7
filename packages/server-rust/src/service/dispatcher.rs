//! Call dispatch: routes a `Call` to the registered handler by `operation_id`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use callee_core::{Call, ProfileHandler, Response};
use tower::Service;
use tracing::{debug, field, info_span};

use super::error::{DispatchError, DispatchRejection};
use super::registry::ProfileRegistry;

type BoxedFuture = Pin<Box<dyn Future<Output = Result<Response, DispatchError>> + Send>>;

// ---------------------------------------------------------------------------
// DispatchOutcome
// ---------------------------------------------------------------------------

/// How a dispatched call was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A handler ran and reported success.
    Succeeded,
    /// A handler ran and reported a service-specific failure.
    HandlerFailure,
    /// The dispatcher answered without reaching a handler.
    Rejected(DispatchRejection),
}

impl DispatchOutcome {
    /// Stable label recorded on the dispatch span.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::HandlerFailure => "handler_failure",
            Self::Rejected(DispatchRejection::CorruptCall) => "corrupt_call",
            Self::Rejected(DispatchRejection::UnknownOperation) => "unknown_operation",
        }
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Routes calls to handlers in a shared [`ProfileRegistry`].
///
/// Stateless per call: each dispatch is an independent lookup against the
/// registry as it is at that moment. Malformed calls get a "Corrupt call"
/// failure, calls for unregistered operations get "Invalid call", and a
/// matched handler's response is returned untouched.
///
/// Cloning is cheap and every clone routes against the same registry.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<ProfileRegistry>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(registry: Arc<ProfileRegistry>) -> Self {
        Self { registry }
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<ProfileRegistry> {
        &self.registry
    }

    /// Dispatches `call`, always producing exactly one response.
    pub fn handle_call(&self, call: Option<&Call>) -> Response {
        self.dispatch(call).1
    }

    /// Dispatches `call` and reports how it was resolved.
    ///
    /// Each dispatch runs inside a `dispatch` span carrying the operation id
    /// and, once known, the outcome label.
    pub fn dispatch(&self, call: Option<&Call>) -> (DispatchOutcome, Response) {
        let span = info_span!(
            "dispatch",
            operation_id = call.and_then(|c| c.operation_id.as_deref()),
            outcome = field::Empty,
        );
        let _entered = span.enter();

        let (outcome, response) = match self.route(call) {
            Ok((handler, call)) => {
                let response = handler.handle_call(call);
                let outcome = if response.is_success() {
                    DispatchOutcome::Succeeded
                } else {
                    DispatchOutcome::HandlerFailure
                };
                (outcome, response)
            }
            Err(rejection) => {
                debug!(reason = %rejection, "call rejected");
                (DispatchOutcome::Rejected(rejection), rejection.into_response())
            }
        };

        span.record("outcome", outcome.as_str());
        (outcome, response)
    }

    /// Resolves the handler for `call` without invoking it.
    ///
    /// # Errors
    ///
    /// [`DispatchRejection::CorruptCall`] if the call or its operation id is
    /// missing, [`DispatchRejection::UnknownOperation`] if nothing is
    /// registered under the id.
    pub fn route<'c>(
        &self,
        call: Option<&'c Call>,
    ) -> Result<(Arc<dyn ProfileHandler>, &'c Call), DispatchRejection> {
        let call = call.ok_or(DispatchRejection::CorruptCall)?;
        let operation_id = call.routable_id().ok_or(DispatchRejection::CorruptCall)?;
        let handler = self
            .registry
            .lookup(operation_id)
            .ok_or(DispatchRejection::UnknownOperation)?;
        Ok((handler, call))
    }
}

impl Service<Option<Call>> for Dispatcher {
    type Response = Response;
    type Error = DispatchError;
    type Future = BoxedFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    /// Runs the dispatch on the blocking pool: handlers may block or do I/O.
    fn call(&mut self, call: Option<Call>) -> Self::Future {
        let dispatcher = self.clone();
        Box::pin(async move {
            let response =
                tokio::task::spawn_blocking(move || dispatcher.handle_call(call.as_ref())).await?;
            Ok(response)
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
