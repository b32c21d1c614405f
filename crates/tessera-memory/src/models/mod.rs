pub mod message;
pub mod thread;

pub use message::{MessageType, StoredMessage};
pub use thread::Thread;
