//! User identity boundary.
//!
//! Every uploaded frame must be attributable, so a job resolves the current
//! user exactly once at start through an [`IdentityProvider`]. Session
//! management itself lives outside this crate.

use serde::{Deserialize, Serialize};

/// The user a job's uploads are attributed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    /// Opaque subject identifier, sent as `user_uuid`.
    pub id: String,
    /// Optional email, sent as `user_email`.
    pub email: Option<String>,
}

impl UserIdentity {
    /// Identity with a subject id and no email.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: None,
        }
    }

    /// Attach an email address.
    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

/// Resolves the signed-in user, if any.
pub trait IdentityProvider: Send + Sync {
    /// Return the current user, or `None` when nobody is signed in.
    fn resolve_current_user(&self) -> Option<UserIdentity>;
}

/// An [`IdentityProvider`] that always answers with the same identity.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentity {
    identity: Option<UserIdentity>,
}

impl StaticIdentity {
    /// Always resolve to `identity`.
    pub fn new(identity: UserIdentity) -> Self {
        Self {
            identity: Some(identity),
        }
    }

    /// Never resolve a user.
    pub fn anonymous() -> Self {
        Self { identity: None }
    }
}

impl IdentityProvider for StaticIdentity {
    fn resolve_current_user(&self) -> Option<UserIdentity> {
        self.identity.clone()
    }
}

/// Resolve once; blank subject ids count as no identity.
pub(crate) fn resolve(provider: &dyn IdentityProvider) -> Option<UserIdentity> {
    provider
        .resolve_current_user()
        .filter(|identity| !identity.id.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_id_is_not_an_identity() {
        let provider = StaticIdentity::new(UserIdentity::new("   "));
        assert!(resolve(&provider).is_none());
    }

    #[test]
    fn static_identity_resolves() {
        let provider =
            StaticIdentity::new(UserIdentity::new("user-1").with_email("ops@example.com"));
        let identity = resolve(&provider).unwrap();
        assert_eq!(identity.id, "user-1");
        assert_eq!(identity.email.as_deref(), Some("ops@example.com"));

        assert!(resolve(&StaticIdentity::anonymous()).is_none());
    }
}
