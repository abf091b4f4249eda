use crate::core::Result;

/// Local key-value backend - allows pluggable client storage
///
/// Mirrors a browser's synchronous string storage: whole values are read and replaced,
/// there are no partial writes.
pub trait LocalStore: Send + Sync {
    /// Read the raw value under `key`
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Replace the value under `key`
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove `key`; removing a missing key is not an error
    fn remove(&self, key: &str) -> Result<()>;
}
