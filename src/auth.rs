//! Bearer-token verification against the hosted auth provider, plus the
//! axum middleware that guards the protected routes.

use anyhow::{anyhow, Result};
use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{error, warn};

use crate::api::{ApiError, ApiState};
use crate::models::AuthUser;

#[derive(Deserialize)]
struct ProviderUser {
    id: String,
    email: Option<String>,
    #[serde(default)]
    user_metadata: ProviderUserMetadata,
}

#[derive(Deserialize, Default)]
struct ProviderUserMetadata {
    first_name: Option<String>,
    last_name: Option<String>,
}

pub struct AuthClient {
    base_url: String,
    service_key: String,
    http: Client,
}

impl AuthClient {
    pub fn new(base_url: String, service_key: String) -> Self {
        AuthClient {
            base_url,
            service_key,
            http: Client::new(),
        }
    }

    /// Resolves a user token with the auth provider. `Ok(None)` means
    /// the token was rejected; `Err` means the provider was unreachable
    /// or answered with an unexpected status.
    pub async fn verify_token(&self, token: &str) -> Result<Option<AuthUser>> {
        let url = format!("{}/auth/v1/user", self.base_url.trim_end_matches('/'));
        let response = self
            .http
            .get(&url)
            .header("apikey", &self.service_key)
            .bearer_auth(token)
            .send()
            .await?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => return Ok(None),
            status if !status.is_success() => {
                let body = response.text().await.unwrap_or_default();
                return Err(anyhow!("auth provider returned {}: {}", status, body));
            }
            _ => {}
        }

        let user: ProviderUser = response.json().await?;
        Ok(Some(AuthUser {
            id: user.id,
            email: user.email,
            first_name: user.user_metadata.first_name,
            last_name: user.user_metadata.last_name,
        }))
    }
}

/// Requires a `Bearer` token and attaches the verified [`AuthUser`] to
/// the request extensions.
pub async fn require_auth(
    State(state): State<ApiState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    let Some(token) = header.strip_prefix("Bearer ") else {
        return Err(ApiError::unauthorized(
            "Missing or invalid authorization header",
        ));
    };

    match state.auth.verify_token(token).await {
        Ok(Some(user)) => {
            request.extensions_mut().insert(user);
            Ok(next.run(request).await)
        }
        Ok(None) => {
            warn!("rejected request with invalid or expired token");
            Err(ApiError::unauthorized("Invalid or expired token"))
        }
        Err(err) => {
            error!(error = %err, "auth provider lookup failed");
            Err(ApiError::internal("Internal server error"))
        }
    }
}
