pub mod collection;
pub mod engine;
pub mod file;
pub mod keys;
pub mod memory;

pub use collection::CollectionStore;
pub use engine::LocalStore;
pub use file::FileLocalStore;
pub use keys::{CacheScope, StoreKeys, preference_key};
pub use memory::MemoryLocalStore;
