//! Outgoing email for account confirmation.

mod email;

pub use email::{confirmation_link, ConfirmationMailer};
