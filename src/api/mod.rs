pub mod auth;
mod contacts;
pub mod error;
pub mod rate_limit;
mod users;
pub mod validation;

use axum::{
    http::HeaderValue,
    middleware,
    routing::{get, patch, post},
    Json, Router,
};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::AppState;

use auth::MessageResponse;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Account routes (public, stricter rate limit)
    let auth_routes = Router::new()
        .route("/signup", post(auth::signup))
        .route("/login", post(auth::login))
        .route("/refresh_token", get(auth::refresh_token))
        .route("/confirmed_email/:token", get(auth::confirmed_email))
        .route("/request_email", post(auth::request_email))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_auth,
        ));

    let user_routes = Router::new()
        .route("/me", get(users::me))
        .route("/avatar", patch(users::update_avatar))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_api,
        ));

    let contact_routes = Router::new()
        .route(
            "/",
            get(contacts::list_contacts).post(contacts::create_contact),
        )
        .route("/search", get(contacts::search_contacts))
        .route("/upcoming_birthdays", get(contacts::upcoming_birthdays))
        .route(
            "/:id",
            get(contacts::get_contact)
                .put(contacts::update_contact)
                .delete(contacts::delete_contact),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_api,
        ));

    let cors = cors_layer(&state.config.server.cors_origins);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .nest("/api/auth", auth_routes)
        .nest("/api/users", user_routes)
        .nest("/api/contacts", contact_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if origins.iter().any(|origin| origin == "*") {
        return cors.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    cors.allow_origin(AllowOrigin::list(allowed))
}

async fn root() -> Json<MessageResponse> {
    Json(MessageResponse::new("Hello World"))
}

async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
pub(crate) mod test_support {
    use async_trait::async_trait;
    use bytes::Bytes;
    use chrono::{Duration, Utc};
    use std::sync::Arc;

    use crate::config::Config;
    use crate::crypto::{hash_password, TokenScope};
    use crate::db::{init_in_memory, NewUser, User};
    use crate::media::{ImageHost, MediaError};
    use crate::AppState;

    /// Image host that accepts everything and derives the URL from the label
    pub struct StubHost;

    #[async_trait]
    impl ImageHost for StubHost {
        async fn upload(&self, _image: Bytes, label: &str) -> Result<String, MediaError> {
            Ok(format!("https://img.example.com/{}.png", label))
        }

        fn name(&self) -> &'static str {
            "stub"
        }
    }

    pub fn test_config() -> Config {
        let mut config = Config::default();
        config.auth.secret_key = Some("test-secret".to_string());
        config.rate_limit.enabled = false;
        config
    }

    pub async fn state_with(config: Config) -> Arc<AppState> {
        let db = init_in_memory().await.unwrap();
        Arc::new(AppState::new(config, db).unwrap())
    }

    pub async fn test_state() -> Arc<AppState> {
        state_with(test_config()).await
    }

    pub async fn create_user(state: &AppState, username: &str, email: &str, password: &str) -> User {
        User::create(
            &state.db,
            &NewUser {
                username: username.to_string(),
                email: email.to_string(),
                password_hash: hash_password(password).unwrap(),
                avatar: None,
            },
        )
        .await
        .unwrap()
    }

    pub fn token_for(state: &AppState, email: &str, scope: TokenScope, ttl: Duration) -> String {
        state.signer.issue(email, scope, ttl, Utc::now()).unwrap()
    }

    pub fn access_token(state: &AppState, email: &str) -> String {
        token_for(state, email, TokenScope::AccessToken, Duration::minutes(15))
    }

    pub fn stub_host() -> Arc<dyn ImageHost> {
        Arc::new(StubHost)
    }
}
