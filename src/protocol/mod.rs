//! NexusTalk wire protocol
//!
//! Layered bottom-up: `wire` is the protobuf field codec, `frame` the
//! length-prefixed frame codec, `message` the typed payloads, and
//! `constants` the fixed protocol values shared by all of them.

pub mod constants;
pub mod frame;
pub mod message;
pub mod wire;

pub use constants::StreamProfile;
pub use frame::{encode_frame, Frame, FrameDecoder};
pub use message::Credential;
