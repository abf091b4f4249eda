use crate::storage::CacheScope;
use std::fmt;

/// What the identity provider currently reports.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IdentityState {
    pub is_authenticated: bool,
    pub user_id: Option<String>,
    pub is_loading: bool,
}

impl IdentityState {
    pub fn loading() -> Self {
        Self {
            is_authenticated: false,
            user_id: None,
            is_loading: true,
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn signed_in(user_id: impl Into<String>) -> Self {
        Self {
            is_authenticated: true,
            user_id: Some(user_id.into()),
            is_loading: false,
        }
    }

    /// The signed-in user, if the provider has settled on one.
    pub fn settled_user(&self) -> Option<&str> {
        if self.is_loading || !self.is_authenticated {
            return None;
        }
        self.user_id.as_deref().filter(|user_id| !user_id.trim().is_empty())
    }
}

/// Reconciler phase of one (app, user session).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionPhase {
    Anonymous,
    AuthPending { user_id: String },
    Migrating { user_id: String },
    Live { user_id: String },
}

impl SessionPhase {
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Self::Anonymous => None,
            Self::AuthPending { user_id } | Self::Migrating { user_id } | Self::Live { user_id } => {
                Some(user_id)
            }
        }
    }

    pub fn live_user(&self) -> Option<&str> {
        match self {
            Self::Live { user_id } => Some(user_id),
            _ => None,
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self, Self::Live { .. })
    }

    /// Cache scope the visible collection is read from and written to.
    ///
    /// Until migration finishes the session keeps working on the anonymous cache.
    pub fn scope(&self) -> CacheScope {
        match self {
            Self::Live { user_id } => CacheScope::user(user_id.clone()),
            _ => CacheScope::Anonymous,
        }
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous => write!(f, "anonymous"),
            Self::AuthPending { user_id } => write!(f, "auth_pending({user_id})"),
            Self::Migrating { user_id } => write!(f, "migrating({user_id})"),
            Self::Live { user_id } => write!(f, "live({user_id})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loading_identity_never_settles() {
        let mut identity = IdentityState::signed_in("u1");
        identity.is_loading = true;
        assert_eq!(identity.settled_user(), None);
        assert_eq!(IdentityState::signed_in("u1").settled_user(), Some("u1"));
    }

    #[test]
    fn only_live_phase_uses_user_scope() {
        let user = "u1".to_string();
        assert_eq!(
            SessionPhase::Migrating { user_id: user.clone() }.scope(),
            CacheScope::Anonymous
        );
        assert_eq!(
            SessionPhase::Live { user_id: user.clone() }.scope(),
            CacheScope::user(user)
        );
    }
}
