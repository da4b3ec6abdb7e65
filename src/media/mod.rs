//! Avatar storage on a third-party image host.

mod cloudinary;

pub use cloudinary::CloudinaryHost;

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use thiserror::Error;

use crate::config::CloudinaryConfig;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Image host is not configured")]
    NotConfigured,

    #[error("Image host request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Image host rejected the upload ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Unexpected response from image host: {0}")]
    InvalidResponse(String),
}

/// Uploads images and hands back a stable URL for them
#[async_trait]
pub trait ImageHost: Send + Sync {
    /// Store `image` under `label`, replacing any earlier upload with the same label
    async fn upload(&self, image: Bytes, label: &str) -> Result<String, MediaError>;

    /// Human-readable name of the host (for logging)
    fn name(&self) -> &'static str;
}

/// Used when no image host credentials are configured
pub struct DisabledHost;

#[async_trait]
impl ImageHost for DisabledHost {
    async fn upload(&self, _image: Bytes, _label: &str) -> Result<String, MediaError> {
        Err(MediaError::NotConfigured)
    }

    fn name(&self) -> &'static str {
        "disabled"
    }
}

/// Pick the image host matching the configuration
pub fn from_config(config: &CloudinaryConfig) -> Arc<dyn ImageHost> {
    match CloudinaryHost::from_config(config) {
        Some(host) => {
            tracing::info!("Avatar uploads go to Cloudinary");
            Arc::new(host)
        }
        None => {
            tracing::warn!("Cloudinary credentials missing, avatar uploads are disabled");
            Arc::new(DisabledHost)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_host_refuses_uploads() {
        let host = DisabledHost;
        let result = host.upload(Bytes::from_static(b"png"), "rolodex/alice").await;
        assert!(matches!(result, Err(MediaError::NotConfigured)));
    }

    #[test]
    fn test_from_config_without_credentials() {
        let host = from_config(&CloudinaryConfig::default());
        assert_eq!(host.name(), "disabled");
    }

    #[test]
    fn test_from_config_with_credentials() {
        let config = CloudinaryConfig {
            cloud_name: Some("demo".to_string()),
            api_key: Some("key".to_string()),
            api_secret: Some("secret".to_string()),
            ..CloudinaryConfig::default()
        };
        assert_eq!(from_config(&config).name(), "cloudinary");
    }
}
