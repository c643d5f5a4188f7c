use std::collections::HashSet;

use crate::api::TokenGrant;

/**
    The bearer credential currently used for upstream calls.

    `generation` increases every time a credential is installed, so callers
    can tell whether the token they saw rejected is still the current one.
*/
#[derive(Debug, Clone, Default)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub scopes: HashSet<String>,
    pub generation: u64,
}

impl Credential {
    pub fn from_grant(grant: TokenGrant) -> Self {
        Self {
            access_token: grant.access_token,
            refresh_token: grant.refresh_token.filter(|t| !t.is_empty()),
            scopes: grant.scopes.into_iter().collect(),
            generation: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.access_token.is_empty()
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.contains(scope)
    }

    /// A user grant that can be renewed without the browser.
    pub fn can_refresh_user(&self, required_scope: &str) -> bool {
        self.refresh_token.is_some() && self.has_scope(required_scope)
    }
}
