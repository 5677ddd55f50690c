//! Client for the local-network session protocol spoken by Tapo plugs and bulbs.
//!
//! A session is established with a two-step seed exchange over plain HTTP,
//! after which every application message is AES-128-CBC encrypted and signed
//! under a per-message sequence number. On top of the session sits a command
//! layer that confirms state changes and re-establishes the session when the
//! device stops answering.

pub mod config;
pub mod control;
pub mod crypto;
#[doc(hidden)]
pub mod e2e_common;
pub mod handshake;
pub mod messages;
pub mod sdk;
pub mod session;

pub use config::{ConfigError, SessionConfig};
pub use control::{CommandExecutor, RetryPolicy};
pub use crypto::{CipherError, SessionCipher};
pub use handshake::{
    HandshakeError, HttpTransport, PostRequest, PostResponse, ReqwestTransport, TimeoutTransport,
    TransportError,
};
pub use messages::{CommandError, DeviceCommand};
pub use sdk::{DeviceError, TapoDevice};
pub use session::{Credentials, SessionError, TapoSession};
