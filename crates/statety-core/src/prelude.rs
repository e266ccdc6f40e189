pub use crate::config::{DEFAULT_MAX_DEPTH, StoreConfig};
pub use crate::error::{Result, StoreError};
pub use crate::key::{Key, KeyId, KeyKind};
pub use crate::store::{CellInfo, Store};
pub use crate::subscription::{SubscriptionId, Unsubscribe};
pub use crate::value::{Draft, StateValue};
