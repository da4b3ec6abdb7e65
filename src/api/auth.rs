//! Account endpoints and bearer-token authentication.
//!
//! Protected handlers take a [`BearerToken`] and call [`resolve_current_user`]
//! themselves. Every token or subject failure surfaces as the same 401.

use axum::{
    async_trait,
    extract::{FromRequestParts, Path, State},
    http::{request::Parts, HeaderMap, StatusCode},
    Json,
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::crypto::{gravatar_url, hash_password, verify_password, TokenError, TokenScope};
use crate::db::{
    LoginRequest, NewUser, RequestEmail, SignupRequest, SignupResponse, TokenPair, User,
    UserResponse,
};
use crate::notifications::confirmation_link;
use crate::AppState;

use super::error::{ApiError, ValidationErrorBuilder};
use super::validation::{validate_email, validate_password, validate_username};

/// Plain `{"message": ...}` body
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("No user matches the token subject")]
    UnknownSubject,

    #[error("Failed to look up user: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Database(e) => ApiError::from(e),
            other => {
                tracing::debug!("Rejected credentials: {}", other);
                ApiError::invalid_credentials()
            }
        }
    }
}

/// Extract the token from an `Authorization: Bearer ...` header
fn extract_token(headers: &HeaderMap) -> Option<String> {
    let header = headers.get("Authorization")?.to_str().ok()?;
    let (scheme, token) = header.split_once(' ')?;
    let token = token.trim();

    if scheme.eq_ignore_ascii_case("bearer") && !token.is_empty() {
        Some(token.to_string())
    } else {
        None
    }
}

/// Raw bearer token from the request; says nothing about its validity
#[derive(Debug, Clone)]
pub struct BearerToken(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for BearerToken
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        extract_token(&parts.headers)
            .map(BearerToken)
            .ok_or_else(|| ApiError::unauthorized("Not authenticated"))
    }
}

/// Verify an access token and load the user its subject names
pub async fn resolve_current_user(state: &AppState, token: &str) -> Result<User, AuthError> {
    let email = state
        .signer
        .subject(token, TokenScope::AccessToken, Utc::now())?;

    User::get_by_email(&state.db, &email)
        .await?
        .ok_or(AuthError::UnknownSubject)
}

fn issue_token(
    state: &AppState,
    email: &str,
    scope: TokenScope,
    ttl: Duration,
) -> Result<String, ApiError> {
    state
        .signer
        .issue(email, scope, ttl, Utc::now())
        .map_err(|e| {
            tracing::error!("Failed to sign {} for {}: {}", scope, email, e);
            ApiError::internal("Failed to issue token")
        })
}

/// Issue a fresh access/refresh pair and remember the refresh token
async fn issue_token_pair(state: &AppState, user: &User) -> Result<TokenPair, ApiError> {
    let auth = &state.config.auth;
    let access_token = issue_token(
        state,
        &user.email,
        TokenScope::AccessToken,
        Duration::minutes(auth.access_token_ttl_minutes),
    )?;
    let refresh_token = issue_token(
        state,
        &user.email,
        TokenScope::RefreshToken,
        Duration::days(auth.refresh_token_ttl_days),
    )?;

    User::update_token(&state.db, user.id, Some(&refresh_token)).await?;

    Ok(TokenPair::bearer(access_token, refresh_token))
}

/// Send the confirmation email without holding up the response
fn spawn_confirmation_email(state: &Arc<AppState>, user: &User) {
    if !state.mailer.is_enabled() {
        tracing::debug!("Email disabled, not sending confirmation to {}", user.email);
        return;
    }

    let token = match issue_token(
        state,
        &user.email,
        TokenScope::EmailToken,
        Duration::days(state.config.auth.email_token_ttl_days),
    ) {
        Ok(token) => token,
        Err(_) => return,
    };

    let link = confirmation_link(&state.config.server.public_url, &token);
    let mailer = state.mailer.clone();
    let email = user.email.clone();
    let username = user.username.clone();

    tokio::spawn(async move {
        if let Err(e) = mailer.send_confirmation(&email, &username, &link).await {
            tracing::error!("Failed to send confirmation email to {}: {}", email, e);
        }
    });
}

/// Create an account
pub async fn signup(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SignupRequest>,
) -> Result<(StatusCode, Json<SignupResponse>), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    errors
        .check("username", validate_username(&request.username))
        .check("email", validate_email(&request.email))
        .check("password", validate_password(&request.password));
    errors.finish()?;

    if User::get_by_email(&state.db, &request.email).await?.is_some() {
        return Err(ApiError::conflict("Account already exists"));
    }

    let password_hash = hash_password(&request.password).map_err(|e| {
        tracing::error!("Failed to hash password: {}", e);
        ApiError::internal("Failed to hash password")
    })?;

    let user = User::create(
        &state.db,
        &NewUser {
            username: request.username,
            email: request.email.clone(),
            password_hash,
            avatar: Some(gravatar_url(&request.email)),
        },
    )
    .await?;

    tracing::info!("Created user {} ({})", user.username, user.email);

    spawn_confirmation_email(&state, &user);

    Ok((
        StatusCode::CREATED,
        Json(SignupResponse {
            user: UserResponse::from(user),
            detail: "User successfully created".to_string(),
        }),
    ))
}

/// Exchange email and password for a token pair.
///
/// Unknown addresses and wrong passwords get the same reply; the confirmation
/// requirement is only reported once the password checks out.
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<TokenPair>, ApiError> {
    let user = User::get_by_email(&state.db, &request.email)
        .await?
        .filter(|user| verify_password(&request.password, &user.password_hash))
        .ok_or_else(|| {
            tracing::debug!("Failed login for {}", request.email);
            ApiError::unauthorized("Invalid credentials")
        })?;

    if state.config.auth.require_confirmed_email && !user.confirmed {
        return Err(ApiError::unauthorized("Email not confirmed"));
    }

    let tokens = issue_token_pair(&state, &user).await?;
    tracing::info!("User {} logged in", user.email);

    Ok(Json(tokens))
}

/// Rotate the token pair using the current refresh token
pub async fn refresh_token(
    State(state): State<Arc<AppState>>,
    BearerToken(token): BearerToken,
) -> Result<Json<TokenPair>, ApiError> {
    let email = state
        .signer
        .subject(&token, TokenScope::RefreshToken, Utc::now())
        .map_err(AuthError::from)?;

    let user = User::get_by_email(&state.db, &email)
        .await?
        .ok_or(AuthError::UnknownSubject)?;

    let stored = user.refresh_token.as_deref().unwrap_or_default();
    let matches: bool =
        stored.len() == token.len() && stored.as_bytes().ct_eq(token.as_bytes()).into();

    if !matches {
        // A stale or foreign refresh token revokes the session
        User::update_token(&state.db, user.id, None).await?;
        tracing::warn!("Refresh token mismatch for {}, session revoked", user.email);
        return Err(ApiError::unauthorized("Invalid refresh token"));
    }

    let tokens = issue_token_pair(&state, &user).await?;
    Ok(Json(tokens))
}

/// Confirm the account an email token was issued for
pub async fn confirmed_email(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let email = state
        .signer
        .subject(&token, TokenScope::EmailToken, Utc::now())
        .map_err(|e| {
            tracing::debug!("Rejected email token: {}", e);
            ApiError::bad_request("Invalid token for email verification")
        })?;

    let user = User::get_by_email(&state.db, &email)
        .await?
        .ok_or_else(|| ApiError::bad_request("Verification error"))?;

    if user.confirmed {
        return Ok(Json(MessageResponse::new("Your email is already confirmed")));
    }

    User::confirm_email(&state.db, &email).await?;
    tracing::info!("Confirmed email for {}", email);

    Ok(Json(MessageResponse::new("Email confirmed")))
}

/// Resend the confirmation email. The reply is the same whether the address
/// is unknown, unconfirmed or already confirmed.
pub async fn request_email(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RequestEmail>,
) -> Result<Json<MessageResponse>, ApiError> {
    match User::get_by_email(&state.db, &request.email).await? {
        Some(user) if !user.confirmed => spawn_confirmation_email(&state, &user),
        Some(_) => tracing::debug!("{} already confirmed, not resending", request.email),
        None => tracing::debug!("No account for {}, not sending", request.email),
    }

    Ok(Json(MessageResponse::new("Check your email for confirmation.")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::{create_user, test_state};
    use axum::http::HeaderValue;

    #[test]
    fn test_extract_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_token(&headers), None);

        headers.insert("Authorization", HeaderValue::from_static("Bearer abc.def.ghi"));
        assert_eq!(extract_token(&headers).as_deref(), Some("abc.def.ghi"));

        headers.insert("Authorization", HeaderValue::from_static("bearer abc"));
        assert_eq!(extract_token(&headers).as_deref(), Some("abc"));

        headers.insert("Authorization", HeaderValue::from_static("Basic dXNlcjpwYXNz"));
        assert_eq!(extract_token(&headers), None);

        headers.insert("Authorization", HeaderValue::from_static("Bearer "));
        assert_eq!(extract_token(&headers), None);
    }

    #[tokio::test]
    async fn test_resolve_current_user() {
        let state = test_state().await;
        let user = create_user(&state, "alice", "alice@example.com", "secret").await;

        let token = issue_token(
            &state,
            &user.email,
            TokenScope::AccessToken,
            Duration::minutes(15),
        )
        .unwrap();

        let resolved = resolve_current_user(&state, &token).await.unwrap();
        assert_eq!(resolved.id, user.id);
    }

    #[tokio::test]
    async fn test_resolve_unknown_subject() {
        let state = test_state().await;
        let token = issue_token(
            &state,
            "ghost@example.com",
            TokenScope::AccessToken,
            Duration::minutes(15),
        )
        .unwrap();

        let err = resolve_current_user(&state, &token).await.unwrap_err();
        assert!(matches!(err, AuthError::UnknownSubject));
        assert_eq!(ApiError::from(err).status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_resolve_rejects_refresh_token() {
        let state = test_state().await;
        let user = create_user(&state, "alice", "alice@example.com", "secret").await;
        let token = issue_token(
            &state,
            &user.email,
            TokenScope::RefreshToken,
            Duration::days(7),
        )
        .unwrap();

        let err = resolve_current_user(&state, &token).await.unwrap_err();
        assert!(matches!(
            err,
            AuthError::Token(TokenError::WrongScope { .. })
        ));
    }

    #[tokio::test]
    async fn test_resolve_rejects_garbage() {
        let state = test_state().await;
        let err = resolve_current_user(&state, "garbage").await.unwrap_err();
        assert!(matches!(err, AuthError::Token(TokenError::Malformed)));
        assert_eq!(ApiError::from(err).message(), "Could not validate credentials");
    }
}
