//! Acting-user identity and the provider boundary.

use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::types::VoterId;

/// Authenticated user as resolved by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Stable user id.
    pub id: VoterId,
    /// Display handle, when known.
    pub username: Option<String>,
}

impl Identity {
    /// Identity without a display handle.
    pub fn new(id: VoterId) -> Self {
        Self { id, username: None }
    }
}

/// Source of the current signed-in user. Lookups have no side effects.
pub trait IdentityProvider: Send + Sync {
    /// Returns the signed-in user, if any.
    fn current_user(&self) -> Option<Identity>;
}

impl IdentityProvider for Option<Identity> {
    fn current_user(&self) -> Option<Identity> {
        self.clone()
    }
}

/// Holds whichever identity the external auth flow last resolved.
#[derive(Debug, Default)]
pub struct SessionIdentity {
    current: RwLock<Option<Identity>>,
}

impl SessionIdentity {
    /// Empty (signed-out) session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a resolved sign-in.
    pub fn sign_in(&self, identity: Identity) {
        if let Ok(mut slot) = self.current.write() {
            *slot = Some(identity);
        }
    }

    /// Clears the session.
    pub fn sign_out(&self) {
        if let Ok(mut slot) = self.current.write() {
            *slot = None;
        }
    }
}

impl IdentityProvider for SessionIdentity {
    fn current_user(&self) -> Option<Identity> {
        self.current.read().ok().and_then(|slot| slot.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn session_tracks_sign_in_and_out() {
        let session = SessionIdentity::new();
        assert!(session.current_user().is_none());

        let me = Identity::new(Uuid::new_v4());
        session.sign_in(me.clone());
        assert_eq!(session.current_user(), Some(me));

        session.sign_out();
        assert!(session.current_user().is_none());
    }
}
