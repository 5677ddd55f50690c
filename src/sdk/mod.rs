//! High-level device client built on the session and command layers.
//!
//! `TapoDevice` is the entry point most callers want: connect, then issue
//! verified commands. The lower layers stay public for callers that need to
//! drive the session directly.
pub mod client;

pub use client::{DefaultTransport, DeviceError, TapoDevice};
