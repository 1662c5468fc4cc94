//! Ownership and visibility rules for contacts.

use crate::contacts::repo_types::{ContactRow, Visibility};

/// Public contacts are visible to everyone; anything else only to its owner.
pub fn can_view(viewer: Option<i64>, contact: &ContactRow) -> bool {
    contact.visibility == Visibility::Public || viewer == Some(contact.user_id)
}

pub fn can_mutate(caller: i64, contact: &ContactRow) -> bool {
    contact.user_id == caller
}
