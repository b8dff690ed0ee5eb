//! Collector pipeline: per-host polling collectors fanned into one output stream.
//!
//! ```text
//! collector (kind@host) -> ring buffer -> relay --\
//! collector (kind@host) -> ring buffer -> relay ----> merged output
//! collector (kind@host) -> ring buffer -> relay --/
//! ```
pub mod collector;
mod error;
mod manager;
mod message;
mod ring_buffer;

pub use collector::{CollectPass, Collector, CollectorConfig, CollectorKind};
pub use error::{Error, Result};
pub use manager::{CollectorManager, DEFAULT_OUTPUT_BUFFER_SIZE, DRAIN_TIMEOUT};
pub use message::{Message, MessageKind, Payload, now_unix_secs};
pub use ring_buffer::RingBuffer;
