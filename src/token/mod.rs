//! Meeting admission tokens.
//!
//! Builds the HS256-signed JWT that Jitsi's token authentication expects, so a
//! bot can join a room directly via `?jwt=` without filling any forms.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// How long an issued token stays valid.
pub const TOKEN_LIFETIME_SECS: i64 = 2 * 60 * 60;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("invalid server URL {url:?}: {reason}")]
    InvalidServerUrl { url: String, reason: String },
    #[error("failed to sign token: {0}")]
    Signing(String),
}

/// Claim set understood by Jitsi's token authentication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeetingClaims {
    pub iss: String,
    pub aud: String,
    pub sub: String,
    pub room: String,
    pub nbf: i64,
    pub exp: i64,
    pub context: TokenContext,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenContext {
    pub user: TokenUser,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUser {
    pub name: String,
}

/// Issue a token valid from now for [`TOKEN_LIFETIME_SECS`].
pub fn issue_token(
    app_id: &str,
    app_secret: &str,
    server_url: &str,
    room: &str,
    display_name: &str,
) -> Result<String, TokenError> {
    issue_token_at(app_id, app_secret, server_url, room, display_name, Utc::now())
}

/// Same as [`issue_token`] with an explicit issue time.
pub fn issue_token_at(
    app_id: &str,
    app_secret: &str,
    server_url: &str,
    room: &str,
    display_name: &str,
    now: DateTime<Utc>,
) -> Result<String, TokenError> {
    let claims = build_claims(app_id, server_url, room, display_name, now)?;

    if app_secret.is_empty() {
        return Err(TokenError::Signing("application secret is empty".to_string()));
    }

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(app_secret.as_bytes()),
    )
    .map_err(|e| TokenError::Signing(e.to_string()))
}

fn build_claims(
    app_id: &str,
    server_url: &str,
    room: &str,
    display_name: &str,
    now: DateTime<Utc>,
) -> Result<MeetingClaims, TokenError> {
    let parsed = Url::parse(server_url).map_err(|e| TokenError::InvalidServerUrl {
        url: server_url.to_string(),
        reason: e.to_string(),
    })?;
    let host = parsed
        .host_str()
        .ok_or_else(|| TokenError::InvalidServerUrl {
            url: server_url.to_string(),
            reason: "URL has no host".to_string(),
        })?
        .to_string();

    let not_before = now.timestamp();
    let expiry = (now + Duration::seconds(TOKEN_LIFETIME_SECS)).timestamp();

    Ok(MeetingClaims {
        iss: app_id.to_string(),
        aud: app_id.to_string(),
        sub: host,
        room: room.to_string(),
        nbf: not_before,
        exp: expiry,
        context: TokenContext {
            user: TokenUser {
                name: display_name.to_string(),
            },
        },
    })
}
