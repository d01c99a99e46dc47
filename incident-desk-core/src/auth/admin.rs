//! Administrator allow-list

use std::collections::HashSet;

use crate::auth::identity::Identity;

/// Immutable set of administrator ids, compared as exact strings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdminSet {
    ids: HashSet<String>,
}

impl AdminSet {
    /// Parse a comma-separated list such as `"42, 7"`
    pub fn parse_list(list: &str) -> Self {
        list.split(',').collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Whether the identity's numeric id, rendered as a string, is listed
    pub fn is_admin(&self, identity: &Identity) -> bool {
        self.contains(&identity.id.to_string())
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl<S: AsRef<str>> FromIterator<S> for AdminSet {
    /// Entries are trimmed; blank entries are dropped
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let ids = iter
            .into_iter()
            .map(|id| id.as_ref().trim().to_string())
            .filter(|id| !id.is_empty())
            .collect();
        Self { ids }
    }
}
