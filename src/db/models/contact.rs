//! Contact records and their storage queries.
//!
//! Every mutating query uses `RETURNING *` so that a create, update or delete
//! is a single statement: it either yields the affected row or nothing.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Contact {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone_number: String,
    pub birthday: Option<NaiveDate>,
    pub additional_info: Option<String>,
}

/// Body of create and update requests; an update replaces every field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactPayload {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone_number: String,
    #[serde(default)]
    pub birthday: Option<NaiveDate>,
    #[serde(default)]
    pub additional_info: Option<String>,
}

/// Pagination for the contact listing
#[derive(Debug, Clone, Deserialize)]
pub struct ListContactsQuery {
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    10
}

pub const MAX_PAGE_SIZE: i64 = 100;

impl Default for ListContactsQuery {
    fn default() -> Self {
        Self {
            skip: 0,
            limit: default_limit(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchQuery {
    pub query: Option<String>,
}

impl Contact {
    pub async fn create(db: &SqlitePool, payload: &ContactPayload) -> Result<Contact, sqlx::Error> {
        sqlx::query_as(
            r#"
            INSERT INTO contacts (first_name, last_name, email, phone_number, birthday, additional_info)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(&payload.first_name)
        .bind(&payload.last_name)
        .bind(&payload.email)
        .bind(&payload.phone_number)
        .bind(payload.birthday)
        .bind(&payload.additional_info)
        .fetch_one(db)
        .await
    }

    pub async fn get_by_id(db: &SqlitePool, id: i64) -> Result<Option<Contact>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM contacts WHERE id = ?")
            .bind(id)
            .fetch_optional(db)
            .await
    }

    /// One page of contacts in id order
    pub async fn list(db: &SqlitePool, skip: i64, limit: i64) -> Result<Vec<Contact>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM contacts ORDER BY id ASC LIMIT ? OFFSET ?")
            .bind(limit.clamp(0, MAX_PAGE_SIZE))
            .bind(skip.max(0))
            .fetch_all(db)
            .await
    }

    /// The whole collection, for the search and birthday predicates
    pub async fn list_all(db: &SqlitePool) -> Result<Vec<Contact>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM contacts ORDER BY id ASC")
            .fetch_all(db)
            .await
    }

    /// Replace every field of a contact. `None` means no such contact.
    pub async fn update(
        db: &SqlitePool,
        id: i64,
        payload: &ContactPayload,
    ) -> Result<Option<Contact>, sqlx::Error> {
        sqlx::query_as(
            r#"
            UPDATE contacts SET
                first_name = ?,
                last_name = ?,
                email = ?,
                phone_number = ?,
                birthday = ?,
                additional_info = ?
            WHERE id = ?
            RETURNING *
            "#,
        )
        .bind(&payload.first_name)
        .bind(&payload.last_name)
        .bind(&payload.email)
        .bind(&payload.phone_number)
        .bind(payload.birthday)
        .bind(&payload.additional_info)
        .bind(id)
        .fetch_optional(db)
        .await
    }

    /// Delete a contact, returning the removed row. `None` means no such contact.
    pub async fn delete(db: &SqlitePool, id: i64) -> Result<Option<Contact>, sqlx::Error> {
        sqlx::query_as("DELETE FROM contacts WHERE id = ? RETURNING *")
            .bind(id)
            .fetch_optional(db)
            .await
    }
}

impl ContactPayload {
    #[cfg(test)]
    pub fn sample(first_name: &str, last_name: &str, email: &str) -> Self {
        Self {
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            email: email.to_string(),
            phone_number: "+380501234567".to_string(),
            birthday: NaiveDate::from_ymd_opt(1990, 5, 17),
            additional_info: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_in_memory;

    #[tokio::test]
    async fn test_create_then_read_round_trip() {
        let db = init_in_memory().await.unwrap();
        let mut payload = ContactPayload::sample("Ann", "Lee", "ann@x.com");
        payload.additional_info = Some("met at the conference".to_string());

        let created = Contact::create(&db, &payload).await.unwrap();
        let fetched = Contact::get_by_id(&db, created.id).await.unwrap().unwrap();

        assert_eq!(fetched, created);
        assert_eq!(fetched.first_name, payload.first_name);
        assert_eq!(fetched.last_name, payload.last_name);
        assert_eq!(fetched.email, payload.email);
        assert_eq!(fetched.phone_number, payload.phone_number);
        assert_eq!(fetched.birthday, payload.birthday);
        assert_eq!(fetched.additional_info, payload.additional_info);
    }

    #[tokio::test]
    async fn test_duplicate_email_is_rejected() {
        let db = init_in_memory().await.unwrap();
        Contact::create(&db, &ContactPayload::sample("Ann", "Lee", "ann@x.com"))
            .await
            .unwrap();

        let result = Contact::create(&db, &ContactPayload::sample("Anna", "Li", "ann@x.com")).await;
        assert!(matches!(result, Err(sqlx::Error::Database(_))));
    }

    #[tokio::test]
    async fn test_list_pagination() {
        let db = init_in_memory().await.unwrap();
        for i in 0..5 {
            Contact::create(
                &db,
                &ContactPayload::sample("First", "Last", &format!("c{}@x.com", i)),
            )
            .await
            .unwrap();
        }

        let page = Contact::list(&db, 1, 2).await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].email, "c1@x.com");
        assert_eq!(page[1].email, "c2@x.com");

        assert_eq!(Contact::list(&db, 4, 10).await.unwrap().len(), 1);
        assert!(Contact::list(&db, 10, 10).await.unwrap().is_empty());
        assert_eq!(Contact::list_all(&db).await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_update_is_idempotent() {
        let db = init_in_memory().await.unwrap();
        let created = Contact::create(&db, &ContactPayload::sample("Ann", "Lee", "ann@x.com"))
            .await
            .unwrap();

        let mut change = ContactPayload::sample("Ann", "Lee-Smith", "ann.smith@x.com");
        change.birthday = None;

        let once = Contact::update(&db, created.id, &change).await.unwrap().unwrap();
        let twice = Contact::update(&db, created.id, &change).await.unwrap().unwrap();

        assert_eq!(once, twice);
        assert_eq!(twice.last_name, "Lee-Smith");
        assert_eq!(twice.birthday, None);
        assert_eq!(Contact::get_by_id(&db, created.id).await.unwrap().unwrap(), twice);
    }

    #[tokio::test]
    async fn test_update_missing_contact() {
        let db = init_in_memory().await.unwrap();
        let result = Contact::update(&db, 42, &ContactPayload::sample("A", "B", "a@b.c"))
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_delete_then_read() {
        let db = init_in_memory().await.unwrap();
        let created = Contact::create(&db, &ContactPayload::sample("Ann", "Lee", "ann@x.com"))
            .await
            .unwrap();

        let deleted = Contact::delete(&db, created.id).await.unwrap().unwrap();
        assert_eq!(deleted, created);

        assert!(Contact::get_by_id(&db, created.id).await.unwrap().is_none());
        assert!(Contact::delete(&db, created.id).await.unwrap().is_none());
        assert!(Contact::delete(&db, 9999).await.unwrap().is_none());
    }
}
