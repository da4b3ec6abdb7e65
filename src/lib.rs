pub mod api;
pub mod config;
pub mod crypto;
pub mod db;
pub mod engine;
pub mod media;
pub mod notifications;

pub use db::DbPool;

use anyhow::{Context, Result};
use config::Config;
use std::sync::Arc;

use crate::api::rate_limit::RateLimiter;
use crate::crypto::TokenSigner;
use crate::media::ImageHost;
use crate::notifications::ConfirmationMailer;

pub struct AppState {
    pub config: Config,
    pub db: DbPool,
    pub signer: TokenSigner,
    pub rate_limiter: Arc<RateLimiter>,
    pub image_host: Arc<dyn ImageHost>,
    pub mailer: Arc<ConfirmationMailer>,
}

impl AppState {
    pub fn new(config: Config, db: DbPool) -> Result<Self> {
        let secret = match config.auth.secret_key.as_deref() {
            Some(secret) => secret.to_string(),
            None => {
                // Tokens stop validating after a restart
                tracing::warn!("No auth.secret_key configured, generating an ephemeral one");
                crypto::random_secret()
            }
        };
        let signer = TokenSigner::new(&secret, &config.auth.algorithm)
            .context("Invalid auth configuration")?;
        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));
        let image_host = media::from_config(&config.cloudinary);
        let mailer = Arc::new(ConfirmationMailer::new(config.email.clone()));

        Ok(Self {
            config,
            db,
            signer,
            rate_limiter,
            image_host,
            mailer,
        })
    }

    /// Replace the image host picked from the configuration
    pub fn with_image_host(mut self, host: Arc<dyn ImageHost>) -> Self {
        self.image_host = host;
        self
    }
}
