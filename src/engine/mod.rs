//! Read-only predicates over the contact collection.
//!
//! These functions decide which contacts satisfy a query; fetching the
//! collection is the caller's job.

pub mod birthdays;
pub mod search;
