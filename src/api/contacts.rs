//! Contact CRUD, search and upcoming birthdays.
//!
//! Every handler authenticates the caller first; no contact data is read
//! or written for an unauthenticated request.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::db::{Contact, ContactPayload, ListContactsQuery, SearchQuery};
use crate::engine::{birthdays, search};
use crate::AppState;

use super::auth::{resolve_current_user, BearerToken};
use super::error::{ApiError, ErrorCode, ValidationErrorBuilder};
use super::validation::{
    validate_additional_info, validate_email, validate_name, validate_phone_number,
    validate_search_query,
};

fn validate_contact(payload: &ContactPayload) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    errors
        .check("first_name", validate_name(&payload.first_name, "First name"))
        .check("last_name", validate_name(&payload.last_name, "Last name"))
        .check("email", validate_email(&payload.email))
        .check("phone_number", validate_phone_number(&payload.phone_number))
        .check(
            "additional_info",
            validate_additional_info(&payload.additional_info),
        );
    errors.finish()
}

fn contact_not_found() -> ApiError {
    ApiError::not_found("Contact not found")
}

/// Map a UNIQUE violation on the email column to a readable conflict
fn storage_error(err: sqlx::Error) -> ApiError {
    let api_err = ApiError::from(err);
    if api_err.code() == ErrorCode::Conflict {
        ApiError::conflict("A contact with this email already exists")
    } else {
        api_err
    }
}

/// Create a contact
pub async fn create_contact(
    State(state): State<Arc<AppState>>,
    BearerToken(token): BearerToken,
    Json(payload): Json<ContactPayload>,
) -> Result<(StatusCode, Json<Contact>), ApiError> {
    resolve_current_user(&state, &token).await?;
    validate_contact(&payload)?;

    let contact = Contact::create(&state.db, &payload)
        .await
        .map_err(storage_error)?;

    tracing::info!(id = contact.id, "Created contact");
    Ok((StatusCode::CREATED, Json(contact)))
}

/// List contacts, one page at a time
pub async fn list_contacts(
    State(state): State<Arc<AppState>>,
    BearerToken(token): BearerToken,
    Query(query): Query<ListContactsQuery>,
) -> Result<Json<Vec<Contact>>, ApiError> {
    resolve_current_user(&state, &token).await?;

    if query.skip < 0 || query.limit < 0 {
        return Err(ApiError::validation_field(
            "skip",
            "skip and limit must not be negative",
        ));
    }

    let contacts = Contact::list(&state.db, query.skip, query.limit).await?;
    Ok(Json(contacts))
}

/// Contacts whose first name, last name or email contains the query
pub async fn search_contacts(
    State(state): State<Arc<AppState>>,
    BearerToken(token): BearerToken,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<Contact>>, ApiError> {
    resolve_current_user(&state, &token).await?;

    let needle = validate_search_query(query.query.as_deref())
        .map_err(|message| ApiError::validation_field("query", message))?;

    let contacts = Contact::list_all(&state.db).await?;
    Ok(Json(search::filter(contacts, needle)))
}

/// Contacts with a birthday within the next week, today included
pub async fn upcoming_birthdays(
    State(state): State<Arc<AppState>>,
    BearerToken(token): BearerToken,
) -> Result<Json<Vec<Contact>>, ApiError> {
    resolve_current_user(&state, &token).await?;

    let today = chrono::Local::now().date_naive();
    let contacts = Contact::list_all(&state.db).await?;

    Ok(Json(birthdays::upcoming(
        contacts,
        today,
        birthdays::DEFAULT_HORIZON_DAYS,
    )))
}

/// Get a contact by ID
pub async fn get_contact(
    State(state): State<Arc<AppState>>,
    BearerToken(token): BearerToken,
    Path(id): Path<i64>,
) -> Result<Json<Contact>, ApiError> {
    resolve_current_user(&state, &token).await?;

    Contact::get_by_id(&state.db, id)
        .await?
        .map(Json)
        .ok_or_else(contact_not_found)
}

/// Replace every field of a contact
pub async fn update_contact(
    State(state): State<Arc<AppState>>,
    BearerToken(token): BearerToken,
    Path(id): Path<i64>,
    Json(payload): Json<ContactPayload>,
) -> Result<Json<Contact>, ApiError> {
    resolve_current_user(&state, &token).await?;
    validate_contact(&payload)?;

    let contact = Contact::update(&state.db, id, &payload)
        .await
        .map_err(storage_error)?
        .ok_or_else(contact_not_found)?;

    tracing::info!(id, "Updated contact");
    Ok(Json(contact))
}

/// Delete a contact and return what was removed
pub async fn delete_contact(
    State(state): State<Arc<AppState>>,
    BearerToken(token): BearerToken,
    Path(id): Path<i64>,
) -> Result<Json<Contact>, ApiError> {
    resolve_current_user(&state, &token).await?;

    let contact = Contact::delete(&state.db, id)
        .await?
        .ok_or_else(contact_not_found)?;

    tracing::info!(id, "Deleted contact");
    Ok(Json(contact))
}
