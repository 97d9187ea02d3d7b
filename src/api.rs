use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{error, info, warn};

use crate::analytics;
use crate::auth::{self, AuthClient};
use crate::config::AppConfig;
use crate::db::Database;
use crate::livekit::{LivekitClient, TokenRequest};
use crate::models::{
    AuthUser, NewWorkout, SubscriptionState, SubscriptionStatus, VoiceAgentSummary,
};
use crate::payments::{CheckoutError, PaymentsClient};

/// JSON error response with the status code the original API used.
pub struct ApiError {
    status: StatusCode,
    body: Value,
}

impl ApiError {
    pub fn new(status: StatusCode, message: &str) -> Self {
        ApiError {
            status,
            body: json!({ "error": message }),
        }
    }

    pub fn with_body(status: StatusCode, body: Value) -> Self {
        ApiError { status, body }
    }

    pub fn bad_request(message: &str) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: &str) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn not_found(message: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn internal(message: &str) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

fn db_error(err: rusqlite::Error) -> ApiError {
    error!(error = %err, "database query failed");
    ApiError::internal("Internal server error")
}

#[derive(Clone)]
pub struct ApiState {
    pub database: Arc<Mutex<Database>>,
    pub auth: Arc<AuthClient>,
    pub livekit: Arc<LivekitClient>,
    pub payments: Arc<PaymentsClient>,
}

pub async fn run_server(config: AppConfig, database: Arc<Mutex<Database>>) -> anyhow::Result<()> {
    let state = ApiState {
        database,
        auth: Arc::new(AuthClient::new(
            config.auth_base_url.clone(),
            config.auth_service_key.clone(),
        )),
        livekit: Arc::new(LivekitClient::new(
            config.livekit_url.clone(),
            config.livekit_api_key.clone(),
            config.livekit_api_secret.clone(),
            config.livekit_agent_name.clone(),
        )),
        payments: Arc::new(PaymentsClient::new(
            config.dodo_payments_api_key.clone(),
            config.dodo_product_id.clone(),
            config.dodo_webhook_secret.clone(),
            config.dodo_test_mode,
            config.client_url.clone(),
        )),
    };

    let protected = Router::new()
        .route("/api/me", get(get_me))
        .route("/api/livekit/token", post(generate_livekit_token))
        .route("/api/checkout/create-session", post(create_checkout_session))
        .route("/api/subscription/status", get(get_subscription_status))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_auth,
        ));

    let app = Router::new()
        .route("/health", get(health))
        .route("/api/voice-agent-summary", post(create_from_voice_agent))
        .route("/api/workouts", get(get_workouts))
        .route("/api/workouts/:id", get(get_workout_by_id))
        .route("/api/analytics/summary", get(get_analytics_summary))
        .route("/api/analytics/exercises", get(get_exercise_analytics))
        .route("/api/analytics/consistency", get(get_consistency_analytics))
        .route("/api/webhooks/dodo", post(handle_payment_webhook))
        .merge(protected)
        .layer(build_cors(&config.cors_allowed_origins))
        .with_state(state);

    info!(addr = %config.api_bind_addr, "API server listening");
    let listener = tokio::net::TcpListener::bind(&config.api_bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_cors(allowed_origins: &str) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if allowed_origins.trim() == "*" {
        layer.allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> = allowed_origins
            .split(',')
            .filter_map(|origin| origin.trim().parse().ok())
            .collect();
        layer.allow_origin(AllowOrigin::list(origins))
    }
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "timestamp": Utc::now().to_rfc3339() }))
}

async fn get_me(Extension(user): Extension<AuthUser>) -> Json<Value> {
    Json(json!({ "user": user, "message": "You are authenticated!" }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LivekitTokenInput {
    room_name: Option<String>,
    participant_identity: Option<String>,
    agent_name: Option<String>,
}

async fn generate_livekit_token(
    State(state): State<ApiState>,
    Extension(user): Extension<AuthUser>,
    Json(input): Json<LivekitTokenInput>,
) -> Result<Json<Value>, ApiError> {
    let room_name = input
        .room_name
        .filter(|name| !name.is_empty())
        .ok_or_else(|| ApiError::bad_request("roomName is required"))?;

    if let Err(err) = state.livekit.validate_config() {
        return Err(ApiError::internal(&err.to_string()));
    }

    let identity = input.participant_identity.unwrap_or_else(|| user.id.clone());
    let display_name = user.first_name.clone().unwrap_or_else(|| identity.clone());

    let session = state
        .livekit
        .issue_session_token(&TokenRequest {
            room_name: &room_name,
            identity: &identity,
            display_name: &display_name,
            agent_name: input.agent_name.as_deref(),
        })
        .await
        .map_err(|err| {
            error!(error = %err, "failed to generate livekit token");
            ApiError::internal("Failed to generate token")
        })?;

    if let Some(warning) = &session.dispatch_warning {
        // The participant still gets their token; the agent just is not
        // in the room yet.
        warn!(warning = %warning, room = %room_name, "agent dispatch failed");
    }

    Ok(Json(json!({ "token": session.token })))
}

async fn create_from_voice_agent(
    State(state): State<ApiState>,
    Json(input): Json<VoiceAgentSummary>,
) -> Result<Json<Value>, ApiError> {
    let user_id = input
        .user_id
        .or(input.room_id)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::bad_request("user_id is required"))?;
    let workout_performed = input
        .workout_performed
        .filter(|name| !name.is_empty())
        .ok_or_else(|| ApiError::bad_request("workout_performed is required"))?;

    let workout_time_seconds = input
        .workout_time
        .as_deref()
        .and_then(analytics::parse_duration);

    let workout = state
        .database
        .lock()
        .await
        .insert_workout(&NewWorkout {
            user_id,
            workout_performed,
            activity: input.activity,
            sets: input.sets,
            reps: input.reps,
            muscle_target: input.muscle_target,
            workout_time: input.workout_time,
            workout_time_seconds,
        })
        .map_err(db_error)?;

    info!(
        workout_id = %workout.id,
        user_id = %workout.user_id,
        "workout log saved"
    );
    Ok(Json(json!({
        "success": true,
        "workout_id": workout.id,
        "message": "Workout log saved successfully",
    })))
}

#[derive(Deserialize)]
struct WorkoutListQuery {
    user_id: Option<String>,
    limit: Option<i64>,
    offset: Option<i64>,
}

async fn get_workouts(
    State(state): State<ApiState>,
    Query(query): Query<WorkoutListQuery>,
) -> Result<Json<Value>, ApiError> {
    let user_id = query
        .user_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::bad_request("user_id is required"))?;
    let limit = query.limit.unwrap_or(50).max(0);
    let offset = query.offset.unwrap_or(0).max(0);

    let workouts = state
        .database
        .lock()
        .await
        .list_workouts(&user_id, limit, offset)
        .map_err(db_error)?;

    Ok(Json(json!({
        "success": true,
        "count": workouts.len(),
        "workouts": workouts,
    })))
}

async fn get_workout_by_id(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let workout = state
        .database
        .lock()
        .await
        .get_workout(&id)
        .map_err(db_error)?
        .ok_or_else(|| ApiError::not_found("Workout not found"))?;

    Ok(Json(json!({ "success": true, "workout": workout })))
}

#[derive(Deserialize)]
struct UserQuery {
    user_id: Option<String>,
}

impl UserQuery {
    fn require_user_id(self) -> Result<String, ApiError> {
        self.user_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ApiError::bad_request("user_id is required"))
    }
}

async fn get_analytics_summary(
    State(state): State<ApiState>,
    Query(query): Query<UserQuery>,
) -> Result<Json<Value>, ApiError> {
    let user_id = query.require_user_id()?;
    let records = state
        .database
        .lock()
        .await
        .all_workouts(&user_id)
        .map_err(db_error)?;

    let summary = analytics::summary(&records, Utc::now().date_naive());
    Ok(Json(json!({ "success": true, "summary": summary })))
}

async fn get_exercise_analytics(
    State(state): State<ApiState>,
    Query(query): Query<UserQuery>,
) -> Result<Json<Value>, ApiError> {
    let user_id = query.require_user_id()?;
    let records = state
        .database
        .lock()
        .await
        .all_workouts(&user_id)
        .map_err(db_error)?;

    let breakdown = analytics::exercise_breakdown(&records);
    Ok(Json(json!({
        "success": true,
        "exercises": breakdown.exercises,
        "total_unique_exercises": breakdown.total_unique_exercises,
    })))
}

async fn get_consistency_analytics(
    State(state): State<ApiState>,
    Query(query): Query<UserQuery>,
) -> Result<Json<Value>, ApiError> {
    let user_id = query.require_user_id()?;
    let records = state
        .database
        .lock()
        .await
        .all_workouts(&user_id)
        .map_err(db_error)?;

    let consistency = analytics::consistency(&records, Utc::now().date_naive());
    Ok(Json(json!({ "success": true, "consistency": consistency })))
}

async fn create_checkout_session(
    State(state): State<ApiState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Value>, ApiError> {
    if let Err((message, hint)) = state.payments.validate_config() {
        error!(error = message, "payment configuration missing");
        return Err(ApiError::with_body(
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({ "error": "Payment configuration missing", "hint": hint }),
        ));
    }

    match state.payments.create_checkout_session(&user).await {
        Ok(session) => Ok(Json(json!({
            "success": true,
            "checkout_url": session.checkout_url,
            "subscription_id": session.subscription_id,
        }))),
        Err(CheckoutError::Api {
            status,
            details,
            hint,
        }) => {
            warn!(status = %status, "payment provider rejected checkout request");
            Err(ApiError::with_body(
                StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY),
                json!({ "error": "Dodo API error", "details": details, "hint": hint }),
            ))
        }
        Err(err) => {
            error!(error = %err, "checkout session failed");
            Err(ApiError::internal("Internal server error"))
        }
    }
}

async fn get_subscription_status(
    State(state): State<ApiState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<SubscriptionStatus>, ApiError> {
    let subscription = state
        .database
        .lock()
        .await
        .find_subscription(&user.id)
        .map_err(db_error)?;

    let status = match subscription {
        Some(subscription) => SubscriptionStatus {
            status: subscription.status,
            has_access: subscription.status.has_access(),
            plan: subscription.plan,
            trial_ends_at: subscription.trial_ends_at,
        },
        None => SubscriptionStatus {
            status: SubscriptionState::Pending,
            has_access: false,
            plan: None,
            trial_ends_at: None,
        },
    };

    Ok(Json(status))
}

/// Signature check runs over the raw body bytes before any JSON parsing.
async fn handle_payment_webhook(
    State(state): State<ApiState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let signature = headers
        .get("x-dodo-signature")
        .and_then(|value| value.to_str().ok());
    if !state.payments.verify_webhook_signature(&body, signature) {
        warn!("webhook rejected: invalid signature");
        return Err(ApiError::unauthorized("Invalid signature"));
    }

    let event: Value = serde_json::from_slice(&body)
        .map_err(|_| ApiError::bad_request("Invalid webhook payload"))?;
    let event_type = event["type"].as_str().unwrap_or_default().to_string();
    info!(event_type = %event_type, "webhook received");

    match event_type.as_str() {
        "subscription.active" | "subscription.trialing" => {
            let subscription_id = event["data"]["subscription_id"].as_str().unwrap_or_default();
            if let Some(user_id) = event["data"]["metadata"]["user_id"].as_str() {
                let status = if event_type == "subscription.trialing" {
                    SubscriptionState::Trial
                } else {
                    SubscriptionState::Active
                };
                state
                    .database
                    .lock()
                    .await
                    .upsert_subscription(
                        user_id,
                        subscription_id,
                        status,
                        event["data"]["trial_ends_at"].as_str(),
                    )
                    .map_err(db_error)?;
                info!(user_id, status = status.as_str(), "subscription updated");
            } else {
                warn!(event_type = %event_type, "webhook event without user metadata");
            }
        }
        "subscription.cancelled" | "subscription.expired" => {
            if let Some(subscription_id) = event["data"]["subscription_id"].as_str() {
                let changed = state
                    .database
                    .lock()
                    .await
                    .cancel_subscription_by_provider_id(subscription_id)
                    .map_err(db_error)?;
                if changed {
                    info!(subscription_id, "subscription cancelled");
                } else {
                    warn!(subscription_id, "cancellation for unknown subscription");
                }
            }
        }
        _ => info!(event_type = %event_type, "unhandled webhook event"),
    }

    Ok(Json(json!({ "received": true })))
}
