use crate::config::SyncConfig;
use std::fmt;

/// Whose cached data a key belongs to.
///
/// Anonymous data never shares a key with any signed-in user's data, so a later visitor
/// on the same device cannot see the previous user's cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheScope {
    Anonymous,
    User(String),
}

impl CacheScope {
    pub fn user(user_id: impl Into<String>) -> Self {
        Self::User(user_id.into())
    }

    pub fn user_id(&self) -> Option<&str> {
        match self {
            Self::Anonymous => None,
            Self::User(user_id) => Some(user_id),
        }
    }
}

impl fmt::Display for CacheScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous => write!(f, "anon"),
            Self::User(user_id) => write!(f, "user:{user_id}"),
        }
    }
}

/// Builds the persisted key layout of one (app, collection) pair.
#[derive(Debug, Clone)]
pub struct StoreKeys {
    app: String,
    collection: String,
}

impl StoreKeys {
    pub fn new(app: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            app: app.into(),
            collection: collection.into(),
        }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(config.app.clone(), config.collection.clone())
    }

    pub fn collection(&self, scope: &CacheScope) -> String {
        format!("{}:{}:{}", self.app, self.collection, scope)
    }

    pub fn tombstones(&self, scope: &CacheScope) -> String {
        format!("{}:{}:tombstones:{}", self.app, self.collection, scope)
    }

    pub fn migration_flag(&self, user_id: &str) -> String {
        format!("{}:migrated:{}", self.app, user_id)
    }

    pub fn pointer(&self, name: &str, scope: &CacheScope) -> String {
        format!("{}:pointer:{}:{}", self.app, name, scope)
    }
}

/// Key of an app-independent preference (e.g. focus mode).
pub fn preference_key(name: &str) -> String {
    format!("prefs:{name}")
}
