use travelsbud_types::api::Claims;

use crate::error::CoreError;

/// Source of the signed-in user. Core components only ever read the id.
pub trait IdentityProvider {
    fn current_user_id(&self) -> Option<&str>;
}

/// Explicit identity, for callers that are not behind the JWT middleware.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    user_id: Option<String>,
}

impl Session {
    pub fn signed_in(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }
}

impl IdentityProvider for Session {
    fn current_user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }
}

impl IdentityProvider for Claims {
    fn current_user_id(&self) -> Option<&str> {
        Some(&self.sub)
    }
}

pub fn require_user<I: IdentityProvider + ?Sized>(identity: &I) -> Result<&str, CoreError> {
    identity
        .current_user_id()
        .filter(|id| !id.is_empty())
        .ok_or(CoreError::Unauthenticated)
}
