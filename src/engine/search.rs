//! Substring search over contacts.
//!
//! Matching is case-sensitive: "ann" does not match "Ann". The query is
//! tested against first name, last name and email; a contact matches when
//! any one of them contains it.

use crate::db::Contact;

/// Whether a contact contains `query` in one of its searchable fields.
/// The empty query matches nothing.
pub fn matches(contact: &Contact, query: &str) -> bool {
    if query.is_empty() {
        return false;
    }

    contact.first_name.contains(query)
        || contact.last_name.contains(query)
        || contact.email.contains(query)
}

/// Keep the contacts that match `query`, preserving their order
pub fn filter(contacts: Vec<Contact>, query: &str) -> Vec<Contact> {
    contacts
        .into_iter()
        .filter(|contact| matches(contact, query))
        .collect()
}
