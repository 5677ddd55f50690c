//! Handshake layer: transport contract, wire paths and error taxonomy.
//!
//! The device speaks plain HTTP. Everything the session layer needs from the
//! network is one capability: POST some bytes, get back a status, a body and,
//! on request, the session cookie the device set.

use async_trait::async_trait;
use thiserror::Error;

pub mod client;
pub mod transport;

pub use client::{ClientHandshake, HandshakeOutcome};
pub use transport::{ReqwestTransport, TimeoutTransport, TransportError};

/// Sub-path of handshake step 1.
pub const HANDSHAKE1_PATH: &str = "/handshake1";
/// Sub-path of handshake step 2.
pub const HANDSHAKE2_PATH: &str = "/handshake2";
/// Sub-path carrying encrypted application messages.
pub const REQUEST_PATH: &str = "/request";
/// Name of the session cookie issued in handshake step 1.
pub const SESSION_COOKIE: &str = "TP_SESSIONID";

/// Minimum handshake step 1 response: remote seed plus a SHA-256 proof.
pub const HANDSHAKE1_MIN_LEN: usize = 48;

/// One outbound POST.
#[derive(Debug, Clone, Copy)]
pub struct PostRequest<'a> {
    pub url: &'a str,
    pub body: &'a [u8],
    /// Opaque session cookie value to attach, if any.
    pub cookie: Option<&'a str>,
    /// Whether the transport should capture the session cookie from the reply.
    pub collect_cookie: bool,
}

/// Response to a [`PostRequest`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostResponse {
    pub status: u16,
    pub body: Vec<u8>,
    pub cookie: Option<String>,
}

impl PostResponse {
    pub fn ok(body: Vec<u8>) -> Self {
        Self {
            status: 200,
            body,
            cookie: None,
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            body: Vec::new(),
            cookie: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == 200
    }
}

/// Transport used for both handshake and message exchange.
#[async_trait]
pub trait HttpTransport: Send {
    /// Issues a POST and returns whatever the device answered.
    ///
    /// Non-200 statuses are not errors at this level; only failures to get any
    /// answer at all (unreachable, timeout) are.
    async fn post(&mut self, request: PostRequest<'_>) -> Result<PostResponse, TransportError>;
}

#[async_trait]
impl<T: HttpTransport + ?Sized> HttpTransport for Box<T> {
    async fn post(&mut self, request: PostRequest<'_>) -> Result<PostResponse, TransportError> {
        (**self).post(request).await
    }
}

/// Errors produced while establishing a session.
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("{stage} returned status {status}")]
    Status { stage: &'static str, status: u16 },
    #[error("handshake1 response too short: {0} bytes")]
    ShortResponse(usize),
    #[error("authentication failed: {0}")]
    Authentication(String),
    #[error("protocol error: {0}")]
    Protocol(String),
}
