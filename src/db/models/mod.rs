//! Database models split into domain-specific modules.

pub mod contact;
pub mod user;

pub use contact::*;
pub use user::*;
