//! User accounts and the auth request/response shapes built around them.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub avatar: Option<String>,
    pub refresh_token: Option<String>,
    pub confirmed: bool,
    pub created_at: String,
}

/// Public view of a user; never carries the password hash or refresh token
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserResponse {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub avatar: Option<String>,
    pub confirmed: bool,
    pub created_at: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            avatar: user.avatar,
            confirmed: user.confirmed,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SignupResponse {
    pub user: UserResponse,
    pub detail: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
}

impl TokenPair {
    pub fn bearer(access_token: String, refresh_token: String) -> Self {
        Self {
            access_token,
            refresh_token,
            token_type: "bearer".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RequestEmail {
    pub email: String,
}

/// Fields required to insert a new user row
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub avatar: Option<String>,
}

impl User {
    /// Insert a user and return the stored row
    pub async fn create(db: &SqlitePool, new_user: &NewUser) -> Result<User, sqlx::Error> {
        let now = chrono::Utc::now().to_rfc3339();

        let id = sqlx::query(
            r#"
            INSERT INTO users (username, email, password_hash, avatar, confirmed, created_at)
            VALUES (?, ?, ?, ?, 0, ?)
            "#,
        )
        .bind(&new_user.username)
        .bind(&new_user.email)
        .bind(&new_user.password_hash)
        .bind(&new_user.avatar)
        .bind(&now)
        .execute(db)
        .await?
        .last_insert_rowid();

        Self::get_by_id(db, id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn get_by_id(db: &SqlitePool, id: i64) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(db)
            .await
    }

    /// Look up the user a token subject refers to
    pub async fn get_by_email(db: &SqlitePool, email: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(db)
            .await
    }

    /// Store (or clear, with `None`) the user's current refresh token
    pub async fn update_token(
        db: &SqlitePool,
        id: i64,
        token: Option<&str>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET refresh_token = ? WHERE id = ?")
            .bind(token)
            .bind(id)
            .execute(db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Mark the account with this email as confirmed
    pub async fn confirm_email(db: &SqlitePool, email: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET confirmed = 1 WHERE email = ?")
            .bind(email)
            .execute(db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Replace the avatar URL and return the updated row
    pub async fn update_avatar(
        db: &SqlitePool,
        email: &str,
        url: &str,
    ) -> Result<Option<User>, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET avatar = ? WHERE email = ?")
            .bind(url)
            .bind(email)
            .execute(db)
            .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        Self::get_by_email(db, email).await
    }
}
