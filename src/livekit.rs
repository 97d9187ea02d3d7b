//! LiveKit room access tokens and agent dispatch. Token minting is a
//! local HS256 signature over the provider's grant claims; dispatch is
//! a best-effort call to the server's Twirp endpoint, so a dispatch
//! failure never blocks handing the participant their token.

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

/// Room tokens outlive a long coaching session comfortably.
const TOKEN_TTL_SECS: i64 = 6 * 3600;
/// Dispatch tokens are only used for the one Twirp call.
const DISPATCH_TTL_SECS: i64 = 10 * 60;

#[derive(Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct VideoGrant {
    #[serde(skip_serializing_if = "Option::is_none")]
    room: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not", default)]
    room_join: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not", default)]
    room_admin: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not", default)]
    can_publish: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not", default)]
    can_subscribe: bool,
}

#[derive(Serialize, Deserialize)]
struct Claims {
    iss: String,
    sub: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    nbf: i64,
    exp: i64,
    video: VideoGrant,
}

pub struct TokenRequest<'a> {
    pub room_name: &'a str,
    pub identity: &'a str,
    pub display_name: &'a str,
    pub agent_name: Option<&'a str>,
}

pub struct TokenResponse {
    pub token: String,
    pub agent_dispatched: bool,
    pub dispatch_warning: Option<String>,
}

pub struct LivekitClient {
    url: String,
    api_key: String,
    api_secret: String,
    default_agent: String,
    http: Client,
}

impl LivekitClient {
    pub fn new(url: String, api_key: String, api_secret: String, default_agent: String) -> Self {
        LivekitClient {
            url,
            api_key,
            api_secret,
            default_agent,
            http: Client::new(),
        }
    }

    pub fn validate_config(&self) -> Result<()> {
        if self.api_key.is_empty() || self.api_secret.is_empty() {
            return Err(anyhow!("LiveKit credentials not configured"));
        }
        if self.url.is_empty() {
            return Err(anyhow!("LiveKit URL not configured"));
        }
        Ok(())
    }

    /// Mints the participant token and dispatches the coaching agent to
    /// the room. Dispatch problems are reported back as a warning.
    pub async fn issue_session_token(&self, request: &TokenRequest<'_>) -> Result<TokenResponse> {
        let token = self.mint_access_token(
            request.room_name,
            request.identity,
            Some(request.display_name),
        )?;

        let agent = request.agent_name.unwrap_or(&self.default_agent);
        let metadata = json!({
            "userId": request.identity,
            "username": request.display_name,
            "roomName": request.room_name,
        });

        match self.dispatch_agent(request.room_name, agent, &metadata).await {
            Ok(()) => {
                info!(agent, room = request.room_name, "agent dispatched");
                Ok(TokenResponse {
                    token,
                    agent_dispatched: true,
                    dispatch_warning: None,
                })
            }
            Err(err) => Ok(TokenResponse {
                token,
                agent_dispatched: false,
                dispatch_warning: Some(err.to_string()),
            }),
        }
    }

    /// Signs a room access token for the given participant identity.
    pub fn mint_access_token(
        &self,
        room_name: &str,
        identity: &str,
        display_name: Option<&str>,
    ) -> Result<String> {
        let grant = VideoGrant {
            room: Some(room_name.to_string()),
            room_join: true,
            can_publish: true,
            can_subscribe: true,
            ..VideoGrant::default()
        };
        self.sign(identity, display_name, grant, TOKEN_TTL_SECS)
    }

    async fn dispatch_agent(
        &self,
        room_name: &str,
        agent_name: &str,
        metadata: &serde_json::Value,
    ) -> Result<()> {
        let grant = VideoGrant {
            room: Some(room_name.to_string()),
            room_admin: true,
            ..VideoGrant::default()
        };
        let admin_token = self.sign("repcoach-server", None, grant, DISPATCH_TTL_SECS)?;

        let url = format!(
            "{}/twirp/livekit.AgentDispatchService/CreateDispatch",
            self.http_url()
        );
        let response = self
            .http
            .post(&url)
            .bearer_auth(admin_token)
            .json(&json!({
                "agent_name": agent_name,
                "room": room_name,
                "metadata": metadata.to_string(),
            }))
            .send()
            .await
            .context("dispatch request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("dispatch returned {}: {}", status, body));
        }
        Ok(())
    }

    fn sign(
        &self,
        identity: &str,
        display_name: Option<&str>,
        video: VideoGrant,
        ttl_secs: i64,
    ) -> Result<String> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            iss: self.api_key.clone(),
            sub: identity.to_string(),
            name: display_name.map(str::to_string),
            nbf: now,
            exp: now + ttl_secs,
            video,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.api_secret.as_bytes()),
        )
        .context("failed to sign access token")
    }

    /// The dispatch API lives on the HTTP side of the signalling URL.
    fn http_url(&self) -> String {
        let url = self.url.trim_end_matches('/');
        if let Some(rest) = url.strip_prefix("wss://") {
            format!("https://{rest}")
        } else if let Some(rest) = url.strip_prefix("ws://") {
            format!("http://{rest}")
        } else {
            url.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{decode, DecodingKey, Validation};

    fn client() -> LivekitClient {
        LivekitClient::new(
            "wss://example.livekit.cloud".to_string(),
            "api-key".to_string(),
            "api-secret".to_string(),
            "hype_me_up".to_string(),
        )
    }

    #[test]
    fn access_token_carries_identity_and_room_grant() {
        let token = client()
            .mint_access_token("room-42", "user-1", Some("Sam"))
            .unwrap();

        let decoded = decode::<Claims>(
            &token,
            &DecodingKey::from_secret(b"api-secret"),
            &Validation::default(),
        )
        .unwrap();

        let claims = decoded.claims;
        assert_eq!(claims.iss, "api-key");
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.name.as_deref(), Some("Sam"));
        assert_eq!(claims.video.room.as_deref(), Some("room-42"));
        assert!(claims.video.room_join);
        assert!(claims.video.can_publish);
        assert!(claims.video.can_subscribe);
        assert!(!claims.video.room_admin);
        assert!(claims.exp > claims.nbf);
    }

    #[test]
    fn grant_serializes_with_livekit_field_names() {
        let grant = VideoGrant {
            room: Some("room-42".to_string()),
            room_join: true,
            can_publish: true,
            can_subscribe: true,
            ..VideoGrant::default()
        };
        let value = serde_json::to_value(&grant).unwrap();
        assert_eq!(value["room"], "room-42");
        assert_eq!(value["roomJoin"], true);
        assert_eq!(value["canPublish"], true);
        // false grants are omitted entirely
        assert!(value.get("roomAdmin").is_none());
    }

    #[test]
    fn missing_credentials_fail_validation() {
        let client = LivekitClient::new(
            String::new(),
            String::new(),
            String::new(),
            "hype_me_up".to_string(),
        );
        assert!(client.validate_config().is_err());
        assert!(self::client().validate_config().is_ok());
    }

    #[test]
    fn dispatch_url_swaps_websocket_scheme() {
        assert_eq!(client().http_url(), "https://example.livekit.cloud");
    }
}
