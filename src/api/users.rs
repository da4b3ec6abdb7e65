use axum::{
    extract::{Multipart, State},
    Json,
};
use std::sync::Arc;

use crate::db::{User, UserResponse};
use crate::AppState;

use super::auth::{resolve_current_user, BearerToken};
use super::error::ApiError;

/// Get the authenticated user
pub async fn me(
    State(state): State<Arc<AppState>>,
    BearerToken(token): BearerToken,
) -> Result<Json<UserResponse>, ApiError> {
    let user = resolve_current_user(&state, &token).await?;
    Ok(Json(UserResponse::from(user)))
}

/// Upload a new avatar image (multipart field `file`)
pub async fn update_avatar(
    State(state): State<Arc<AppState>>,
    BearerToken(token): BearerToken,
    mut multipart: Multipart,
) -> Result<Json<UserResponse>, ApiError> {
    let user = resolve_current_user(&state, &token).await?;

    let mut image = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart body: {}", e)))?
    {
        if field.name() == Some("file") {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::bad_request(format!("Failed to read file: {}", e)))?;
            image = Some(bytes);
            break;
        }
    }

    let image = match image {
        Some(bytes) if !bytes.is_empty() => bytes,
        _ => return Err(ApiError::bad_request("No file provided")),
    };

    // Usernames are not unique, ids are
    let label = format!("{}/{}", state.config.cloudinary.avatar_folder, user.id);
    let url = state.image_host.upload(image, &label).await?;

    tracing::info!(
        "Stored new avatar for {} via {}",
        user.email,
        state.image_host.name()
    );

    let updated = User::update_avatar(&state.db, &user.email, &url)
        .await?
        .ok_or_else(ApiError::invalid_credentials)?;

    Ok(Json(UserResponse::from(updated)))
}
