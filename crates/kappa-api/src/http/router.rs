//! Router construction and server host for the API.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderName, HeaderValue, Method, Request, header::CONTENT_TYPE},
    middleware,
    routing::{MethodRouter, get, patch, post},
};
use kappa_access::{Permissions, RateLimitPolicy, RateTier};
use kappa_data::Store;
use kappa_telemetry::{
    Metrics, build_sha, propagate_request_id_layer, set_request_context, set_request_id_layer,
};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{Span, info};

use crate::app::state::ApiState;
use crate::error::{ApiServerError, ApiServerResult};
use crate::http::account::{current_user, delete_current_user, login, register};
use crate::http::admin::{list_users, patch_user};
use crate::http::auth::{AuthGate, require_api_key, throttle_anonymous};
use crate::http::constants::{HEADER_API_KEY, HEADER_REQUEST_ID, MAX_BODY_BYTES};
use crate::http::doseguard::{caregivers, doses, history, links, patients, pills, schedules};
use crate::http::health::{health, metrics};
use crate::http::portfolio::{create_post, list_posts};
use crate::http::telemetry::{HttpMetricsLayer, route_label};

type State = Arc<ApiState>;

/// Axum router wrapper that hosts the Kappa API.
pub struct ApiServer {
    router: Router,
}

impl ApiServer {
    /// Wire the store, metrics, and rate-limit policy into a router.
    ///
    /// `cors_origins` lists allowed origins; `*` allows any.
    ///
    /// # Errors
    ///
    /// Returns [`ApiServerError::InvalidCorsOrigin`] when an origin is not a valid header value.
    pub fn new(
        store: Arc<dyn Store>,
        telemetry: Metrics,
        policy: RateLimitPolicy,
        app_name: impl Into<String>,
        cors_origins: &[String],
    ) -> ApiServerResult<Self> {
        let state = Arc::new(ApiState::new(
            store,
            telemetry.clone(),
            policy,
            app_name,
        ));
        let cors_layer = CorsLayer::new()
            .allow_origin(allowed_origins(cors_origins)?)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PATCH,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([CONTENT_TYPE, HeaderName::from_static(HEADER_API_KEY)]);
        let trace_layer = TraceLayer::new_for_http()
            .make_span_with(|request: &Request<_>| {
                let request_id = request
                    .headers()
                    .get(HEADER_REQUEST_ID)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("");
                let span = tracing::info_span!(
                    "http.request",
                    method = %request.method(),
                    route = tracing::field::Empty,
                    request_id = tracing::field::Empty,
                    build_sha = %build_sha(),
                    status_code = tracing::field::Empty,
                    latency_ms = tracing::field::Empty
                );
                set_request_context(&span, request_id, route_label(request));
                span
            })
            .on_response(
                |response: &axum::response::Response, latency: Duration, span: &Span| {
                    span.record("status_code", response.status().as_u16());
                    span.record(
                        "latency_ms",
                        u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
                    );
                },
            );
        let layered = ServiceBuilder::new()
            .layer(propagate_request_id_layer())
            .layer(set_request_id_layer())
            .layer(trace_layer)
            .layer(HttpMetricsLayer::new(telemetry));

        let router = Router::new()
            .nest("/api", Self::api_routes(&state))
            .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
            .layer(cors_layer)
            .route_layer(layered)
            .with_state(state);
        Ok(Self { router })
    }

    fn api_routes(state: &State) -> Router<State> {
        let anonymous = Gate::Anonymous(state.clone());
        let any_user = Gate::api_key(state, Permissions::ALL, None);
        let admin = Gate::api_key(state, Permissions::ADMIN, None);
        let caregiver = Gate::api_key(
            state,
            Permissions::PRIVATE | Permissions::ADMIN,
            Some(RateTier::Caregiver),
        );

        Router::new()
            .route("/health", get(health))
            .route("/metrics", get(metrics))
            .route("/auth/register", anonymous.guard(post(register)))
            .route("/auth/login", anonymous.guard(post(login)))
            .route(
                "/user",
                any_user.guard(get(current_user).delete(delete_current_user)),
            )
            .route("/admin/users", admin.guard(get(list_users)))
            .route("/admin/users/{id}", admin.guard(patch(patch_user)))
            .route(
                "/portfolio/posts",
                anonymous
                    .guard(get(list_posts))
                    .merge(admin.guard(post(create_post))),
            )
            .merge(Self::doseguard_routes(&caregiver, &anonymous))
    }

    fn doseguard_routes(caregiver: &Gate, anonymous: &Gate) -> Router<State> {
        Router::new()
            .route(
                "/doseguard/caregivers/register",
                anonymous.guard(post(caregivers::register_caregiver)),
            )
            .route(
                "/doseguard/caregivers/login",
                anonymous.guard(post(caregivers::login_caregiver)),
            )
            .route(
                "/doseguard/caregivers",
                caregiver.guard(get(caregivers::list_caregivers)),
            )
            .route(
                "/doseguard/caregivers/{id}",
                caregiver.guard(get(caregivers::get_caregiver).patch(caregivers::patch_caregiver)),
            )
            .route(
                "/doseguard/caregivers/{id}/patients",
                caregiver.guard(get(caregivers::caregiver_patients)),
            )
            .route(
                "/doseguard/caregivers/patients",
                caregiver.guard(post(links::attach_patient).delete(links::detach_patient)),
            )
            .route(
                "/doseguard/patients",
                caregiver.guard(post(patients::create_patient).get(patients::list_patients)),
            )
            .route(
                "/doseguard/patients/{id}",
                caregiver.guard(
                    get(patients::get_patient)
                        .patch(patients::patch_patient)
                        .delete(patients::delete_patient),
                ),
            )
            .route(
                "/doseguard/patients/{id}/schedules",
                caregiver.guard(get(patients::patient_schedules)),
            )
            .route(
                "/doseguard/patients/{id}/all-doses",
                caregiver.guard(get(patients::patient_doses)),
            )
            .route(
                "/doseguard/patients/{id}/dose-history",
                caregiver.guard(get(patients::patient_history)),
            )
            .route(
                "/doseguard/patients/schedules",
                caregiver.guard(post(links::attach_schedule).delete(links::detach_schedule)),
            )
            .route(
                "/doseguard/pills",
                caregiver.guard(post(pills::create_pill).get(pills::list_pills)),
            )
            .route(
                "/doseguard/pills/{id}",
                caregiver.guard(
                    get(pills::get_pill)
                        .patch(pills::patch_pill)
                        .delete(pills::delete_pill),
                ),
            )
            .route(
                "/doseguard/pills/{id}/doses",
                caregiver.guard(get(pills::pill_doses)),
            )
            .route(
                "/doseguard/pills/{id}/dose-history",
                caregiver.guard(get(pills::pill_history)),
            )
            .route(
                "/doseguard/doses",
                caregiver.guard(post(doses::create_dose).get(doses::list_doses)),
            )
            .route(
                "/doseguard/doses/{id}",
                caregiver.guard(
                    get(doses::get_dose)
                        .patch(doses::patch_dose)
                        .delete(doses::delete_dose),
                ),
            )
            .route(
                "/doseguard/schedules",
                caregiver.guard(post(schedules::create_schedule).get(schedules::list_schedules)),
            )
            .route(
                "/doseguard/schedules/{id}",
                caregiver.guard(
                    get(schedules::get_schedule)
                        .patch(schedules::patch_schedule)
                        .delete(schedules::delete_schedule),
                ),
            )
            .route(
                "/doseguard/schedules/{id}/doses",
                caregiver.guard(get(schedules::schedule_doses)),
            )
            .route(
                "/doseguard/schedules/doses",
                caregiver.guard(post(links::attach_dose).delete(links::detach_dose)),
            )
            .route(
                "/doseguard/dose-history",
                caregiver.guard(post(history::create_entry).get(history::list_entries)),
            )
            .route(
                "/doseguard/dose-history/{id}",
                caregiver.guard(
                    get(history::get_entry)
                        .patch(history::patch_entry)
                        .delete(history::delete_entry),
                ),
            )
    }

    /// Bind `addr` and serve until the listener fails.
    ///
    /// # Errors
    ///
    /// Returns [`ApiServerError::Bind`] or [`ApiServerError::Serve`] on IO failures.
    pub async fn serve(self, addr: SocketAddr) -> ApiServerResult<()> {
        info!(%addr, "starting api listener");
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ApiServerError::Bind { addr, source })?;
        axum::serve(
            listener,
            self.router
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .map_err(|source| ApiServerError::Serve { source })
    }

    /// The assembled router, for driving requests without a listener.
    #[must_use]
    pub fn into_router(self) -> Router {
        self.router
    }
}

/// Middleware applied to a method router: anonymous throttling or API-key checks.
enum Gate {
    Anonymous(State),
    ApiKey(AuthGate),
}

impl Gate {
    fn api_key(state: &State, required: Permissions, tier: Option<RateTier>) -> Self {
        let gate = AuthGate::new(state.clone(), required);
        Self::ApiKey(match tier {
            Some(tier) => gate.with_tier(tier),
            None => gate,
        })
    }

    fn guard(&self, route: MethodRouter<State>) -> MethodRouter<State> {
        match self {
            Self::Anonymous(state) => route.route_layer(middleware::from_fn_with_state(
                state.clone(),
                throttle_anonymous,
            )),
            Self::ApiKey(gate) => {
                route.route_layer(middleware::from_fn_with_state(gate.clone(), require_api_key))
            }
        }
    }
}

fn allowed_origins(origins: &[String]) -> ApiServerResult<AllowOrigin> {
    if origins.iter().any(|origin| origin == "*") {
        return Ok(AllowOrigin::from(Any));
    }
    let values = origins
        .iter()
        .map(|origin| {
            HeaderValue::from_str(origin).map_err(|_| ApiServerError::InvalidCorsOrigin {
                origin: origin.clone(),
            })
        })
        .collect::<ApiServerResult<Vec<_>>>()?;
    Ok(AllowOrigin::list(values))
}
