//! Panic recovery middleware.
//!
//! # Responsibilities
//! - Run every request inside a guarded scope
//! - Turn a handler panic into a structured 500
//! - Log the panic with the handler's identity and a backtrace
//!
//! # Design Decisions
//! - The backtrace is taken by a process-wide panic hook at the panic site
//! - Inside a guarded scope the hook stays silent; the logger is the only sink
//! - A response finalized through [`RequestScope::finish`] is returned as-is
//! - Response bodies are polled inside the guard too; a panic while streaming
//!   ends the body with an error, since the status line is already sent

use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::future::{poll_fn, Future};
use std::panic::{self, AssertUnwindSafe};
use std::pin::{pin, Pin};
use std::sync::{Arc, Once};
use std::task::{Context, Poll};

use axum::body::{Body, Bytes, HttpBody};
use axum::extract::Request;
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use http_body::{Frame, SizeHint};
use parking_lot::Mutex;

use crate::http::error::error_response;
use crate::observability::metrics;

thread_local! {
    static GUARD_DEPTH: Cell<usize> = const { Cell::new(0) };
    static LAST_BACKTRACE: RefCell<Option<Backtrace>> = const { RefCell::new(None) };
}

static HOOK: Once = Once::new();

/// Install the panic hook that captures backtraces for guarded scopes.
///
/// Panics outside a guarded scope still reach the previously installed hook.
pub fn install_panic_hook() {
    HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if GUARD_DEPTH.with(Cell::get) > 0 {
                LAST_BACKTRACE.with(|slot| *slot.borrow_mut() = Some(Backtrace::force_capture()));
            } else {
                previous(info);
            }
        }));
    });
}

/// A recovered panic.
#[derive(Debug)]
pub struct Fault {
    pub message: String,
    pub backtrace: Option<Backtrace>,
}

struct GuardScope;

impl GuardScope {
    fn enter() -> Self {
        GUARD_DEPTH.with(|depth| depth.set(depth.get() + 1));
        GuardScope
    }
}

impl Drop for GuardScope {
    fn drop(&mut self) {
        GUARD_DEPTH.with(|depth| depth.set(depth.get() - 1));
    }
}

/// Run `f`, converting a panic into a [`Fault`].
pub fn catch<R>(f: impl FnOnce() -> R) -> Result<R, Fault> {
    install_panic_hook();
    let _scope = GuardScope::enter();
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| Fault {
        message: panic_message(payload.as_ref()),
        backtrace: LAST_BACKTRACE.with(|slot| slot.borrow_mut().take()),
    })
}

/// Poll `fut` to completion, converting a panic in any poll into a [`Fault`].
pub async fn catch_future<F: Future>(fut: F) -> Result<F::Output, Fault> {
    let mut fut = pin!(fut);
    poll_fn(|cx| match catch(|| fut.as_mut().poll(cx)) {
        Ok(Poll::Ready(output)) => Poll::Ready(Ok(output)),
        Ok(Poll::Pending) => Poll::Pending,
        Err(fault) => Poll::Ready(Err(fault)),
    })
    .await
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Per-request state shared between the recovery middleware and the handler.
///
/// Available to handlers through the request extensions.
#[derive(Clone, Default)]
pub struct RequestScope {
    inner: Arc<ScopeState>,
}

#[derive(Default)]
struct ScopeState {
    handler: Mutex<Option<String>>,
    finished: Mutex<Option<Response>>,
}

impl RequestScope {
    pub fn from_request(request: &Request) -> Option<&RequestScope> {
        request.extensions().get::<RequestScope>()
    }

    /// Record the handler about to serve this request.
    pub(crate) fn enter(&self, handler: &str) {
        *self.inner.handler.lock() = Some(handler.to_string());
    }

    pub fn handler_name(&self) -> String {
        self.inner
            .handler
            .lock()
            .clone()
            .unwrap_or_else(|| "unknown".to_string())
    }

    /// Deliberately finalize the response.
    ///
    /// If the handler panics afterwards, this response is sent instead of a
    /// 500 and the panic is not reported. A response returned normally by the
    /// handler still takes precedence.
    pub fn finish(&self, response: impl IntoResponse) {
        *self.inner.finished.lock() = Some(response.into_response());
    }

    pub fn is_finished(&self) -> bool {
        self.inner.finished.lock().is_some()
    }

    fn take_finished(&self) -> Option<Response> {
        self.inner.finished.lock().take()
    }
}

/// Middleware guarding the rest of the stack against panics.
pub async fn recover(mut request: Request, next: Next) -> Response {
    let scope = RequestScope::default();
    request.extensions_mut().insert(scope.clone());

    let fault = match catch_future(next.run(request)).await {
        Ok(response) => {
            return response.map(|body| Body::new(GuardedBody::new(body, scope)));
        }
        Err(fault) => fault,
    };

    if let Some(response) = scope.take_finished() {
        tracing::debug!(
            handler = %scope.handler_name(),
            "panic after response was finalized"
        );
        return response;
    }

    report(&scope, &fault);
    error_response(StatusCode::INTERNAL_SERVER_ERROR, fault.message)
}

fn report(scope: &RequestScope, fault: &Fault) {
    let backtrace = fault
        .backtrace
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_else(|| "<unavailable>".to_string());
    tracing::error!(
        handler = %scope.handler_name(),
        error = %fault.message,
        "recover from handler panic, stack trace:\n{}",
        backtrace
    );
    metrics::record_handler_panic();
}

/// Response body whose frames are polled inside a guarded scope.
struct GuardedBody {
    inner: Body,
    scope: RequestScope,
    faulted: bool,
}

impl GuardedBody {
    fn new(inner: Body, scope: RequestScope) -> Self {
        Self {
            inner,
            scope,
            faulted: false,
        }
    }
}

impl HttpBody for GuardedBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, axum::Error>>> {
        let this = self.get_mut();
        if this.faulted {
            return Poll::Ready(None);
        }

        match catch(|| Pin::new(&mut this.inner).poll_frame(cx)) {
            Ok(poll) => poll,
            Err(fault) => {
                this.faulted = true;
                report(&this.scope, &fault);
                Poll::Ready(Some(Err(axum::Error::new(fault.message))))
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.faulted || self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}
