// 🌐 Gerrit Verification Endpoint - REST API with Axum
//
//   GET /?email=<address>   (basic auth)  → {"status": "success" | "failure" | "error", ...}
//   GET /health             (no auth)     → {"status": "ok"}
//
// Verification replies are always 200; the status field carries the outcome.

use crate::store::DocumentStore;
use crate::whitelist::{Guidance, VerificationStatus, WhitelistVerifier};
use axum::{
    extract::{rejection::QueryRejection, Query, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

// ============================================================================
// CONFIGURATION
// ============================================================================

/// The only user/password pair accepted by the endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl Credentials {
    /// Check an `Authorization` header value (`Basic base64(user:password)`).
    pub fn accepts(&self, header_value: &str) -> bool {
        let Some(encoded) = header_value.strip_prefix("Basic ") else {
            return false;
        };
        let Ok(decoded) = base64::engine::general_purpose::STANDARD.decode(encoded.trim()) else {
            return false;
        };
        let Ok(decoded) = String::from_utf8(decoded) else {
            return false;
        };
        match decoded.split_once(':') {
            Some((user, password)) => {
                // Evaluate both so timing does not reveal which half was wrong
                let user_ok = user.as_bytes().ct_eq(self.user.as_bytes());
                let password_ok = password.as_bytes().ct_eq(self.password.as_bytes());
                (user_ok & password_ok).into()
            }
            None => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub credentials: Credentials,
    pub guidance: Guidance,
}

// ============================================================================
// STATE
// ============================================================================

/// Shared application state (read-only; all mutable state lives in the store)
#[derive(Clone)]
pub struct AppState {
    verifier: WhitelistVerifier,
    credentials: Arc<Credentials>,
    guidance: Arc<Guidance>,
}

impl AppState {
    pub fn new(store: Arc<dyn DocumentStore>, config: ServiceConfig) -> Self {
        AppState {
            verifier: WhitelistVerifier::new(store),
            credentials: Arc::new(config.credentials),
            guidance: Arc::new(config.guidance),
        }
    }
}

// ============================================================================
// HANDLERS
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct VerifyParams {
    pub email: Option<String>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// GET /health - liveness, outside authentication
async fn health() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}

/// GET /?email= - is this address covered by a CLA?
async fn verify_email(
    State(state): State<AppState>,
    params: Result<Query<VerifyParams>, QueryRejection>,
) -> Json<VerificationStatus> {
    let params = match params {
        Ok(Query(params)) => params,
        Err(rejection) => {
            warn!(error = %rejection, "unreadable verification query");
            return Json(state.guidance.malformed_request());
        }
    };
    // Presence only: the address is looked up exactly as sent
    let Some(email) = params.email else {
        return Json(state.guidance.missing_email());
    };

    match state.verifier.verify_email(&email, &state.guidance).await {
        Ok(status) => {
            info!(%email, authorized = status.is_success(), "verification complete");
            Json(status)
        }
        Err(e) => {
            error!(%email, error = %e, "unable to verify CLA");
            Json(state.guidance.internal_error())
        }
    }
}

async fn require_basic_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let authorized = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(|value| state.credentials.accepts(value))
        .unwrap_or(false);

    if !authorized {
        warn!(path = %request.uri().path(), "rejected unauthenticated request");
        return (
            StatusCode::UNAUTHORIZED,
            [(header::WWW_AUTHENTICATE, "Basic realm=\"cla\"")],
        )
            .into_response();
    }

    next.run(request).await
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn build_router(state: AppState) -> Router {
    let verification = Router::new()
        .route("/", get(verify_email))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_basic_auth));

    Router::new()
        .route("/health", get(health))
        .merge(verification)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
