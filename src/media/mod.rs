//! Media-side helpers (placeholder still frames)

pub mod placeholder;

pub use placeholder::PlaceholderFrames;
