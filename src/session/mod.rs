use std::fmt;
use std::time::Instant;

use rand::rngs::OsRng;
use rand_core::{CryptoRng, RngCore};
use thiserror::Error;
use tracing::{debug, info, warn};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::config::SessionConfig;
use crate::crypto::{credential_hash, CipherError, CredentialHash, Seed, SessionCipher, SEED_LEN};
use crate::handshake::{
    ClientHandshake, HandshakeError, HttpTransport, PostRequest, TransportError, REQUEST_PATH,
};

pub mod state;
use state::{SessionState, SessionStateError};

impl From<SessionStateError> for HandshakeError {
    fn from(err: SessionStateError) -> Self {
        HandshakeError::Protocol(err.to_string())
    }
}

/// Errors from exchanging one application message.
///
/// Callers treat every variant the same way ("no result"); the variants exist
/// for logging and for tests.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session not established")]
    NotEstablished,
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("request returned status {0}")]
    Status(u16),
    #[error("empty response body")]
    EmptyResponse,
    #[error("response signature mismatch")]
    SignatureMismatch,
    #[error("decrypt failed: {0}")]
    Decrypt(#[from] CipherError),
    #[error("decrypted reply is empty")]
    EmptyPlaintext,
    #[error("decrypted reply is not UTF-8")]
    InvalidUtf8,
}

/// Account credentials for the device cloud account.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn hash(&self) -> CredentialHash {
        credential_hash(&self.username, &self.password)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Where and as whom to handshake; kept for rehandshakes.
struct Target {
    address: String,
    base_url: String,
    credential_hash: CredentialHash,
}

impl Drop for Target {
    fn drop(&mut self) {
        self.credential_hash.zeroize();
    }
}

/// Session manager for a single device.
///
/// Owns the transport, the seed source, the current cipher and the session
/// cookie. Intended for sequential use; run one per device for concurrency.
pub struct TapoSession<T, R = OsRng> {
    transport: T,
    rng: R,
    config: SessionConfig,
    target: Option<Target>,
    cipher: Option<SessionCipher>,
    cookie: Option<String>,
    state: SessionState,
    ever_established: bool,
}

impl<T: HttpTransport> TapoSession<T, OsRng> {
    pub fn new(transport: T, config: SessionConfig) -> Self {
        Self::with_rng(transport, OsRng, config)
    }
}

impl<T, R> TapoSession<T, R>
where
    T: HttpTransport,
    R: RngCore + CryptoRng,
{
    /// Builds a session drawing local seeds from `rng`.
    pub fn with_rng(transport: T, rng: R, config: SessionConfig) -> Self {
        Self {
            transport,
            rng,
            config,
            target: None,
            cipher: None,
            cookie: None,
            state: SessionState::Uninitialized,
            ever_established: false,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// True while a cipher is live.
    pub fn is_established(&self) -> bool {
        self.cipher.is_some()
    }

    /// True once any handshake has completed on this session.
    pub fn has_established(&self) -> bool {
        self.ever_established
    }

    pub fn cookie(&self) -> Option<&str> {
        self.cookie.as_deref()
    }

    pub fn address(&self) -> Option<&str> {
        self.target.as_ref().map(|t| t.address.as_str())
    }

    pub fn base_url(&self) -> Option<&str> {
        self.target.as_ref().map(|t| t.base_url.as_str())
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Records the target and credentials, then runs the two-step handshake.
    pub async fn handshake(
        &mut self,
        address: &str,
        credentials: &Credentials,
    ) -> Result<(), HandshakeError> {
        self.target = Some(Target {
            address: address.to_string(),
            base_url: self.config.base_url(address),
            credential_hash: credentials.hash(),
        });
        self.establish().await
    }

    /// Drops the current cookie and cipher, then handshakes again with the
    /// stored target.
    pub async fn rehandshake(&mut self) -> Result<(), HandshakeError> {
        self.cipher = None;
        self.cookie = None;
        if self.target.is_none() {
            return Err(HandshakeError::Protocol(
                "rehandshake requested before any handshake".into(),
            ));
        }
        self.establish().await
    }

    async fn establish(&mut self) -> Result<(), HandshakeError> {
        let state = std::mem::replace(&mut self.state, SessionState::Handshaking);
        self.state = state.transition(SessionState::Handshaking)?;
        self.cipher = None;
        self.cookie = None;

        let target = self
            .target
            .as_ref()
            .ok_or_else(|| HandshakeError::Protocol("no handshake target".into()))?;

        let mut local_seed: Seed = [0u8; SEED_LEN];
        self.rng.fill_bytes(&mut local_seed);
        debug!(address = %target.address, "starting handshake");

        let driver = ClientHandshake {
            base_url: &target.base_url,
            credential_hash: &target.credential_hash,
            local_seed,
        };

        match driver.run(&mut self.transport).await {
            Ok(outcome) => {
                self.cipher = Some(outcome.cipher);
                self.cookie = outcome.cookie;
                self.state = SessionState::Handshaking.transition(SessionState::Established {
                    since: Instant::now(),
                })?;
                self.ever_established = true;
                info!(address = %target.address, "session established");
                Ok(())
            }
            Err(err) => {
                warn!(address = %target.address, error = %err, "handshake failed");
                self.state = SessionState::Failed(err.to_string());
                Err(err)
            }
        }
    }

    /// Encrypts `message`, posts it, and returns the decrypted reply.
    ///
    /// Never retries; the caller decides whether to resend or rehandshake.
    pub async fn send_message(&mut self, message: &str) -> Result<String, SessionError> {
        let base_url = match (&self.target, &self.cipher) {
            (Some(target), Some(_)) => target.base_url.clone(),
            _ => {
                warn!("send_message without an established session");
                return Err(SessionError::NotEstablished);
            }
        };
        let (envelope, seq) = self
            .cipher
            .as_mut()
            .ok_or(SessionError::NotEstablished)?
            .encrypt(message.as_bytes());

        let url = format!("{base_url}{REQUEST_PATH}?seq={seq}");
        debug!(seq, len = envelope.len(), "sending message");
        let response = self
            .transport
            .post(PostRequest {
                url: &url,
                body: &envelope,
                cookie: self.cookie.as_deref(),
                collect_cookie: false,
            })
            .await
            .map_err(|err| {
                warn!(seq, error = %err, "request failed");
                SessionError::from(err)
            })?;

        if !response.is_success() {
            warn!(seq, status = response.status, "request rejected");
            return Err(SessionError::Status(response.status));
        }
        if response.body.is_empty() {
            warn!(seq, "empty response body");
            return Err(SessionError::EmptyResponse);
        }

        let cipher = self.cipher.as_ref().ok_or(SessionError::NotEstablished)?;
        if self.config.verify_response_signature && !cipher.verify_signature(seq, &response.body)
        {
            warn!(seq, "response signature mismatch");
            return Err(SessionError::SignatureMismatch);
        }
        let plain = cipher.decrypt(seq, &response.body).map_err(|err| {
            warn!(seq, error = %err, "decrypt failed");
            SessionError::from(err)
        })?;
        if plain.is_empty() {
            warn!(seq, "decrypt produced an empty reply");
            return Err(SessionError::EmptyPlaintext);
        }
        let reply = String::from_utf8(plain).map_err(|_| SessionError::InvalidUtf8)?;
        debug!(seq, len = reply.len(), "received reply");
        Ok(reply)
    }
}

impl<T, R> fmt::Debug for TapoSession<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TapoSession")
            .field("address", &self.target.as_ref().map(|t| &t.address))
            .field("state", &self.state)
            .field("has_cookie", &self.cookie.is_some())
            .field("cipher", &self.cipher)
            .finish()
    }
}
