//! Session lifecycle state

pub mod state;

pub use state::{ConnectionPhase, SessionState};
