pub mod clock;
pub mod error;
pub mod ids;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use error::{ErrorKind, Result, SyncError};
pub use ids::{new_client_token, new_remote_id};
