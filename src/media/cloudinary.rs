//! Signed uploads to Cloudinary's image upload API.
//!
//! Avatars are cropped to 250x250 on ingest and stored under a fixed public id
//! per user, so a new upload overwrites the previous one. The returned
//! `secure_url` embeds the asset version, which busts caches on change.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::time::Duration;

use super::{ImageHost, MediaError};
use crate::config::CloudinaryConfig;

const AVATAR_TRANSFORMATION: &str = "c_fill,h_250,w_250";

pub struct CloudinaryHost {
    client: reqwest::Client,
    cloud_name: String,
    api_key: String,
    api_secret: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: Option<String>,
    error: Option<UploadError>,
}

#[derive(Debug, Deserialize)]
struct UploadError {
    message: String,
}

impl CloudinaryHost {
    pub fn new(cloud_name: String, api_key: String, api_secret: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self {
            client,
            cloud_name,
            api_key,
            api_secret,
        }
    }

    pub fn from_config(config: &CloudinaryConfig) -> Option<Self> {
        match (&config.cloud_name, &config.api_key, &config.api_secret) {
            (Some(name), Some(key), Some(secret)) => {
                Some(Self::new(name.clone(), key.clone(), secret.clone()))
            }
            _ => None,
        }
    }

    fn upload_url(&self) -> String {
        format!(
            "https://api.cloudinary.com/v1_1/{}/image/upload",
            self.cloud_name
        )
    }
}

/// Signature over the signed upload parameters.
///
/// Parameters are sorted by name, joined as `k=v` with `&`, suffixed with the
/// API secret and hashed with SHA-256.
fn sign_params(params: &[(&str, String)], api_secret: &str) -> String {
    let mut sorted: Vec<&(&str, String)> = params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));

    let joined = sorted
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    let digest = Sha256::digest(format!("{}{}", joined, api_secret).as_bytes());
    hex::encode(digest)
}

#[async_trait]
impl ImageHost for CloudinaryHost {
    async fn upload(&self, image: Bytes, label: &str) -> Result<String, MediaError> {
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let params = [
            ("overwrite", "true".to_string()),
            ("public_id", label.to_string()),
            ("timestamp", timestamp),
            ("transformation", AVATAR_TRANSFORMATION.to_string()),
        ];
        let signature = sign_params(&params, &self.api_secret);

        let mut form = Form::new()
            .text("api_key", self.api_key.clone())
            .text("signature", signature)
            .text("signature_algorithm", "sha256");
        for (key, value) in params {
            form = form.text(key, value);
        }
        form = form.part("file", Part::bytes(image.to_vec()).file_name("avatar"));

        tracing::debug!(public_id = %label, "Uploading avatar to Cloudinary");

        let response = self
            .client
            .post(self.upload_url())
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        let body: UploadResponse = response
            .json()
            .await
            .map_err(|e| MediaError::InvalidResponse(e.to_string()))?;

        if !status.is_success() {
            let message = body
                .error
                .map(|e| e.message)
                .unwrap_or_else(|| "unknown error".to_string());
            return Err(MediaError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        body.secure_url
            .ok_or_else(|| MediaError::InvalidResponse("missing secure_url".to_string()))
    }

    fn name(&self) -> &'static str {
        "cloudinary"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_is_order_independent() {
        let a = sign_params(
            &[
                ("timestamp", "1700000000".to_string()),
                ("public_id", "rolodex/alice".to_string()),
            ],
            "secret",
        );
        let b = sign_params(
            &[
                ("public_id", "rolodex/alice".to_string()),
                ("timestamp", "1700000000".to_string()),
            ],
            "secret",
        );
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_signature_matches_manual_digest() {
        let signature = sign_params(
            &[
                ("timestamp", "1700000000".to_string()),
                ("public_id", "rolodex/alice".to_string()),
            ],
            "secret",
        );
        let expected = hex::encode(Sha256::digest(
            b"public_id=rolodex/alice&timestamp=1700000000secret",
        ));
        assert_eq!(signature, expected);
    }

    #[test]
    fn test_signature_depends_on_secret() {
        let params = [("public_id", "rolodex/alice".to_string())];
        assert_ne!(sign_params(&params, "one"), sign_params(&params, "two"));
    }

    #[test]
    fn test_upload_url() {
        let host = CloudinaryHost::new("demo".to_string(), "k".to_string(), "s".to_string());
        assert_eq!(
            host.upload_url(),
            "https://api.cloudinary.com/v1_1/demo/image/upload"
        );
    }
}
