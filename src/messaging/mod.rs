//! # Messaging
//!
//! Provider-agnostic bus abstraction, the in-memory provider, the three
//! pipeline topics and their payloads.

pub mod channels;
pub mod errors;
pub mod in_memory;
pub mod messages;
pub mod topics;
pub mod traits;
pub mod types;

pub use channels::BatchChannels;
pub use errors::MessagingError;
pub use in_memory::InMemoryMessagingService;
pub use messages::{UnprocessedBatchElement, UnprocessedBatchOperation};
pub use topics::TopicNaming;
pub use traits::{MessagingService, QueueMessage};
pub use types::{MessageId, QueuedMessage, ReceiptHandle, ReceivedMessage, TopicStats};
