//! chatsync-core: pure building blocks of the realtime chat layer.
//!
//! Frame classification, message reconciliation, the typing-presence
//! decay timer and the connection supervisor state machine. Nothing in
//! this crate performs IO or reads a clock.

pub mod frame;
pub mod presence;
pub mod reconcile;
pub mod reconnect;
pub mod types;

pub use types::CoreError;
