//! Media fan-out: consumers, pre-roll buffering, and routing

pub mod buffer;
pub mod consumer;
pub mod fanout;

pub use buffer::TimedBuffer;
pub use consumer::{AudioSource, LiveConsumer, MediaKind, MediaSink, RecorderHandle};
pub use fanout::ConsumerRouter;
