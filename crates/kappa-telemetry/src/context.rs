//! Tracing context for the process and for individual requests.
//!
//! The HTTP metrics layer scopes each request future with its `x-request-id` and matched
//! route; problem documents and denial logs read them back through [`current_request_id`]
//! and [`current_route`].

use std::future::Future;
use std::sync::Arc;

use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tracing::{Span, span::Entered};

use crate::init::build_sha;

#[derive(Debug, Clone)]
struct RequestContext {
    request_id: Arc<str>,
    route: Arc<str>,
}

tokio::task_local! {
    static REQUEST: RequestContext;
}

fn read_request<T>(read: impl FnOnce(&RequestContext) -> T) -> Option<T> {
    REQUEST.try_with(read).ok()
}

/// Keeps the `app` span entered until dropped; held by the binary for its whole run.
pub struct GlobalContextGuard {
    _entered: Entered<'static>,
}

impl GlobalContextGuard {
    /// Enter an `app` span tagged with `service` and the build SHA.
    #[must_use]
    pub fn new(service: impl Into<String>) -> Self {
        let service = service.into();
        let span = tracing::info_span!("app", service = %service, build_sha = %build_sha());
        let span: &'static Span = Box::leak(Box::new(span));
        Self {
            _entered: span.enter(),
        }
    }
}

/// Fill the `request_id` and `route` fields of a request span declared with them empty.
pub fn set_request_context(span: &Span, request_id: &str, route: &str) {
    span.record("request_id", request_id);
    span.record("route", route);
}

/// `x-request-id` of the request served by the current task.
#[must_use]
pub fn current_request_id() -> Option<String> {
    read_request(|ctx| ctx.request_id.to_string())
}

/// Matched route template of the request served by the current task.
#[must_use]
pub fn current_route() -> Option<String> {
    read_request(|ctx| ctx.route.to_string())
}

/// Drive `fut` with `request_id` and `route` readable from inside it.
pub async fn with_request_context<Fut, T>(
    request_id: impl Into<String>,
    route: impl Into<String>,
    fut: Fut,
) -> T
where
    Fut: Future<Output = T>,
{
    let request_id: String = request_id.into();
    let route: String = route.into();
    let context = RequestContext {
        request_id: Arc::from(request_id),
        route: Arc::from(route),
    };
    REQUEST.scope(context, fut).await
}

/// Assigns a UUID `x-request-id` when the client sent none.
#[must_use]
pub fn set_request_id_layer() -> SetRequestIdLayer<MakeRequestUuid> {
    SetRequestIdLayer::x_request_id(MakeRequestUuid)
}

/// Echoes the request's `x-request-id` on the response.
#[must_use]
pub fn propagate_request_id_layer() -> PropagateRequestIdLayer {
    PropagateRequestIdLayer::x_request_id()
}
