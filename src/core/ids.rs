use uuid::Uuid;

/// Fresh opaque identifier for `localId` / `clientId`.
pub fn new_client_token() -> String {
    Uuid::new_v4().to_string()
}

/// Identifier handed out by the in-memory remote store.
pub fn new_remote_id() -> String {
    format!("r_{}", Uuid::new_v4().simple())
}
