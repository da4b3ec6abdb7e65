//! Cryptographic helpers: bearer token signing, password hashing and the
//! email digest used for default avatars.

mod password;
mod token;

pub use password::{hash_password, verify_password};
pub use token::{Claims, TokenError, TokenScope, TokenSigner};

use sha2::{Digest, Sha256};

/// 32 random bytes, hex encoded, for use as a signing secret
pub fn random_secret() -> String {
    let bytes: [u8; 32] = rand::random();
    hex::encode(bytes)
}

/// Gravatar image URL for an email address.
///
/// Gravatar accepts a SHA-256 digest of the trimmed, lowercased address and
/// falls back to a generated identicon when no image is registered.
pub fn gravatar_url(email: &str) -> String {
    let normalized = email.trim().to_lowercase();
    let digest = Sha256::digest(normalized.as_bytes());
    format!("https://www.gravatar.com/avatar/{}?d=identicon", hex::encode(digest))
}
