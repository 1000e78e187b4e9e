//! REST + SSE endpoints exposing the coordinator to the onboarding page.

use std::convert::Infallible;
use std::path::PathBuf;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::Stream;
use futures::StreamExt;
use rust_decimal::Decimal;
use serde::Deserialize;
use tokio_stream::wrappers::BroadcastStream;

use crate::error::{Error, OnboardingError};

use super::coordinator::OnboardingCoordinator;
use super::ui::{UiFlags, project};

/// Shared state for onboarding routes.
#[derive(Clone)]
pub struct OnboardingRouteState {
    pub coordinator: OnboardingCoordinator,
    pub keystore_dir: PathBuf,
}

#[derive(Debug, Deserialize)]
struct SwapBody {
    token: String,
    amount: Decimal,
}

/// Maps coordinator errors onto HTTP responses with a `{"error", "kind"}` body.
struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::Onboarding(e) => match e {
                OnboardingError::NoWallet => StatusCode::PRECONDITION_FAILED,
                OnboardingError::TaskInProgress { .. } => StatusCode::CONFLICT,
                OnboardingError::FundingFailed { .. } | OnboardingError::SwapFailed { .. } => {
                    StatusCode::BAD_GATEWAY
                }
                OnboardingError::InvalidStep { .. }
                | OnboardingError::SwapUnavailable { .. }
                | OnboardingError::AcknowledgementsPending { .. } => StatusCode::CONFLICT,
                OnboardingError::UnknownAcknowledgement(_) => StatusCode::NOT_FOUND,
                OnboardingError::SessionClosed => StatusCode::GONE,
            },
            Error::Backend(_) => StatusCode::BAD_GATEWAY,
            Error::Exchange(_) => StatusCode::UNPROCESSABLE_ENTITY,
            // Wallet failures surface as FundingFailed; config errors never
            // reach a live session.
            Error::Config(_) | Error::Wallet(_) | Error::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (
            status,
            Json(serde_json::json!({"error": self.0.to_string(), "kind": self.0.kind()})),
        )
            .into_response()
    }
}

/// GET /api/onboarding/status
async fn get_status(State(state): State<OnboardingRouteState>) -> impl IntoResponse {
    Json(state.coordinator.snapshot().await)
}

/// GET /api/onboarding/ui
async fn get_ui(State(state): State<OnboardingRouteState>) -> impl IntoResponse {
    let snapshot = state.coordinator.snapshot().await;
    Json(project(&snapshot))
}

/// GET /api/onboarding/events
///
/// Server-sent events; lagged receivers simply skip missed events, the page
/// re-fetches `/ui` on every event anyway.
async fn get_events(
    State(state): State<OnboardingRouteState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = BroadcastStream::new(state.coordinator.subscribe()).filter_map(|msg| async move {
        let event = msg.ok()?;
        Event::default().json_data(&event).ok().map(Ok)
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// POST /api/onboarding/keystore
///
/// Fetches and stores the keystore, then advances past the download step.
async fn post_keystore(State(state): State<OnboardingRouteState>) -> Result<Response, ApiError> {
    let path = state.coordinator.download_keystore(&state.keystore_dir).await?;
    let step = state.coordinator.current_step().await;
    Ok(Json(serde_json::json!({"path": path, "step": step})).into_response())
}

/// POST /api/onboarding/funding
async fn post_funding(State(state): State<OnboardingRouteState>) -> Result<Response, ApiError> {
    let task = state.coordinator.request_funding().await?;
    Ok((StatusCode::ACCEPTED, Json(task)).into_response())
}

/// GET /api/onboarding/swap/quote
async fn get_swap_quote(
    State(state): State<OnboardingRouteState>,
    axum::extract::Query(body): axum::extract::Query<SwapBody>,
) -> Result<Response, ApiError> {
    let costs = state.coordinator.quote_swap(&body.token, body.amount).await?;
    Ok(Json(costs).into_response())
}

/// POST /api/onboarding/swap
async fn post_swap(
    State(state): State<OnboardingRouteState>,
    Json(body): Json<SwapBody>,
) -> Result<Response, ApiError> {
    let task = state.coordinator.request_swap(&body.token, body.amount).await?;
    Ok((StatusCode::ACCEPTED, Json(task)).into_response())
}

/// POST /api/onboarding/swap/decline
async fn post_decline_swap(
    State(state): State<OnboardingRouteState>,
) -> Result<Response, ApiError> {
    let step = state.coordinator.decline_swap().await?;
    Ok(Json(serde_json::json!({"step": step})).into_response())
}

/// POST /api/onboarding/ack/{item}
async fn post_ack(
    State(state): State<OnboardingRouteState>,
    Path(item): Path<String>,
) -> Result<Response, ApiError> {
    state.coordinator.acknowledge(&item).await?;
    let all = state.coordinator.all_acknowledged().await;
    Ok(Json(serde_json::json!({"all_acknowledged": all})).into_response())
}

/// POST /api/onboarding/error/dismiss
async fn post_dismiss_error(State(state): State<OnboardingRouteState>) -> impl IntoResponse {
    state.coordinator.dismiss_error().await;
    StatusCode::NO_CONTENT
}

/// POST /api/onboarding/reset
async fn post_reset(State(state): State<OnboardingRouteState>) -> impl IntoResponse {
    state.coordinator.reset().await;
    StatusCode::NO_CONTENT
}

/// Build the onboarding routes.
pub fn onboarding_routes(state: OnboardingRouteState) -> Router {
    Router::new()
        .route("/api/onboarding/status", get(get_status))
        .route("/api/onboarding/ui", get(get_ui))
        .route("/api/onboarding/events", get(get_events))
        .route("/api/onboarding/keystore", post(post_keystore))
        .route("/api/onboarding/funding", post(post_funding))
        .route("/api/onboarding/swap/quote", get(get_swap_quote))
        .route("/api/onboarding/swap", post(post_swap))
        .route("/api/onboarding/swap/decline", post(post_decline_swap))
        .route("/api/onboarding/ack/{item}", post(post_ack))
        .route("/api/onboarding/error/dismiss", post(post_dismiss_error))
        .route("/api/onboarding/reset", post(post_reset))
        .with_state(state)
}

/// Routes served when the session constants were unusable: the page only
/// gets the fatal "no-web3" state, every action is unavailable.
pub fn fatal_routes(message: String) -> Router {
    let flags = UiFlags::fatal(message);
    Router::new()
        .route(
            "/api/onboarding/ui",
            get(move || {
                let flags = flags.clone();
                async move { Json(flags) }
            }),
        )
        .fallback(|| async {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({
                    "error": "onboarding session unavailable",
                    "kind": "config",
                })),
            )
        })
}
