pub mod error;
pub mod gateway;
pub mod models;
pub mod store;

pub use error::{MemoryError, Result};
pub use gateway::{canonicalize, CacheKey, DateRange, MemoryGateway};
pub use models::{MessageType, StoredMessage, Thread};
pub use store::InMemoryStore;
