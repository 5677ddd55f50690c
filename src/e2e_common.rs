//! In-process device simulator shared by the integration tests.
//!
//! `SimulatedDevice` implements [`HttpTransport`] by playing the device side of
//! the handshake and message protocol. Its state lives behind an `Arc` so a
//! test can keep a handle for inspection after moving the transport into a
//! session.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand_core::{CryptoRng, RngCore};
use serde_json::{json, Map, Value};

use crate::crypto::cipher::SIGNATURE_LEN;
use crate::crypto::{client_proof, device_proof, CredentialHash, Seed, SessionCipher, SEED_LEN};
use crate::handshake::{
    HttpTransport, PostRequest, PostResponse, TransportError, HANDSHAKE1_PATH, HANDSHAKE2_PATH,
    REQUEST_PATH,
};
use crate::messages::{GET_DEVICE_INFO, SET_DEVICE_INFO};

/// Seed source that repeats a fixed pattern.
///
/// Implements `CryptoRng` only so it can stand in for `OsRng` in tests; seeds
/// drawn from it are fully predictable.
#[doc(hidden)]
#[derive(Debug, Clone)]
pub struct InsecureTestRng {
    pattern: Vec<u8>,
    pos: usize,
}

impl InsecureTestRng {
    pub fn new(pattern: &[u8]) -> Self {
        Self {
            pattern: if pattern.is_empty() {
                vec![0]
            } else {
                pattern.to_vec()
            },
            pos: 0,
        }
    }

    /// Yields `01 02 .. 10` as the first local seed.
    pub fn counting() -> Self {
        Self::new(&(1u8..=16).collect::<Vec<_>>())
    }
}

impl RngCore for InsecureTestRng {
    fn next_u32(&mut self) -> u32 {
        let mut buf = [0u8; 4];
        self.fill_bytes(&mut buf);
        u32::from_le_bytes(buf)
    }

    fn next_u64(&mut self) -> u64 {
        let mut buf = [0u8; 8];
        self.fill_bytes(&mut buf);
        u64::from_le_bytes(buf)
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for byte in dest.iter_mut() {
            *byte = self.pattern[self.pos % self.pattern.len()];
            self.pos += 1;
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand_core::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

impl CryptoRng for InsecureTestRng {}

/// Ways the simulated device mangles an otherwise valid encrypted reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyFault {
    /// Ciphertext cut to 8 bytes, not a whole block.
    Misaligned,
    /// One block whose decrypted padding byte is 0.
    ZeroPadding,
    /// A lone padding block, decrypting to nothing.
    EmptyPlaintext,
    /// Last ciphertext byte flipped after signing.
    FlippedByte,
}

/// Knobs and counters of the simulated device.
#[derive(Debug)]
pub struct DeviceState {
    pub credential_hash: CredentialHash,
    /// Hash the device uses to build its step-1 proof; differs from
    /// `credential_hash` to simulate wrong credentials.
    pub proof_hash: CredentialHash,
    pub remote_seed: Seed,
    pub cookie: String,
    /// Apply `set_device_info` params to the reported state.
    pub reflect_state: bool,
    /// Truncate the step-1 body to this many bytes.
    pub handshake1_len: Option<usize>,
    /// Answer every encrypted request with this status instead of 200.
    pub request_status: Option<u16>,
    /// Reply to encrypted requests with an empty 200 body.
    pub empty_replies: bool,
    /// Handshakes to reject (step 1, status 503) before accepting again.
    pub reject_handshakes: u32,
    /// Posts to leave hanging without an answer.
    pub stalled_posts: u32,
    pub reply_fault: Option<ReplyFault>,
    pub info: Map<String, Value>,

    pub handshake1_calls: u32,
    pub handshake2_calls: u32,
    pub request_calls: u32,
    pub set_calls: u32,
    pub info_calls: u32,
    pub last_seq: Option<u32>,
    pub cookies_seen: Vec<Option<String>>,
    pub last_request_body: Vec<u8>,
    local_seed: Option<Seed>,
    cipher: Option<SessionCipher>,
}

impl DeviceState {
    fn new(credential_hash: CredentialHash) -> Self {
        let mut info = Map::new();
        info.insert("device_id".into(), json!("80223D1F0A"));
        info.insert("model".into(), json!("L530"));
        info.insert("device_on".into(), json!(false));
        info.insert("brightness".into(), json!(50));
        info.insert("hue".into(), json!(0));
        info.insert("saturation".into(), json!(0));
        info.insert("color_temp".into(), json!(2700));
        Self {
            credential_hash,
            proof_hash: credential_hash,
            remote_seed: [0x5a; SEED_LEN],
            cookie: "4F1D2C5B9E".to_string(),
            reflect_state: true,
            handshake1_len: None,
            request_status: None,
            empty_replies: false,
            reject_handshakes: 0,
            stalled_posts: 0,
            reply_fault: None,
            info,
            handshake1_calls: 0,
            handshake2_calls: 0,
            request_calls: 0,
            set_calls: 0,
            info_calls: 0,
            last_seq: None,
            cookies_seen: Vec::new(),
            last_request_body: Vec::new(),
            local_seed: None,
            cipher: None,
        }
    }

    pub fn has_session(&self) -> bool {
        self.cipher.is_some()
    }

    /// Drops the device-side session, as a reboot would.
    pub fn forget_session(&mut self) {
        self.cipher = None;
        self.local_seed = None;
    }

    fn handshake1(&mut self, request: &PostRequest<'_>) -> PostResponse {
        self.handshake1_calls += 1;
        self.cipher = None;
        if self.reject_handshakes > 0 {
            self.reject_handshakes -= 1;
            return PostResponse::status(503);
        }
        if request.body.len() != SEED_LEN {
            return PostResponse::status(400);
        }
        let mut local = [0u8; SEED_LEN];
        local.copy_from_slice(request.body);
        self.local_seed = Some(local);

        let mut body = self.remote_seed.to_vec();
        body.extend_from_slice(&device_proof(&local, &self.remote_seed, &self.proof_hash));
        if let Some(len) = self.handshake1_len {
            body.truncate(len);
        }
        PostResponse {
            status: 200,
            body,
            cookie: request.collect_cookie.then(|| self.cookie.clone()),
        }
    }

    fn handshake2(&mut self, request: &PostRequest<'_>) -> PostResponse {
        self.handshake2_calls += 1;
        let Some(local) = self.local_seed else {
            return PostResponse::status(400);
        };
        if request.cookie != Some(self.cookie.as_str()) {
            return PostResponse::status(403);
        }
        let expected = client_proof(&local, &self.remote_seed, &self.credential_hash);
        if request.body != expected.as_slice() {
            return PostResponse::status(403);
        }
        self.cipher = Some(SessionCipher::new(
            &local,
            &self.remote_seed,
            &self.credential_hash,
        ));
        PostResponse::ok(Vec::new())
    }

    fn request(&mut self, request: &PostRequest<'_>) -> PostResponse {
        self.request_calls += 1;
        self.cookies_seen.push(request.cookie.map(str::to_string));
        self.last_request_body = request.body.to_vec();
        if let Some(status) = self.request_status {
            return PostResponse::status(status);
        }
        if request.cookie != Some(self.cookie.as_str()) {
            return PostResponse::status(403);
        }
        let Some(seq) = parse_seq(request.url) else {
            return PostResponse::status(400);
        };
        self.last_seq = Some(seq);

        let Some(cipher) = self.cipher.as_ref() else {
            return PostResponse::status(403);
        };
        let Ok(plain) = cipher.decrypt(seq, request.body) else {
            return PostResponse::status(400);
        };
        let Ok(message) = serde_json::from_slice::<Value>(&plain) else {
            return PostResponse::status(400);
        };

        let reply = match message["method"].as_str() {
            Some(SET_DEVICE_INFO) => {
                self.set_calls += 1;
                if self.reflect_state {
                    if let Some(params) = message["params"].as_object() {
                        for (key, value) in params {
                            self.info.insert(key.clone(), value.clone());
                        }
                    }
                }
                json!({ "error_code": 0 })
            }
            Some(GET_DEVICE_INFO) => {
                self.info_calls += 1;
                json!({ "error_code": 0, "result": Value::Object(self.info.clone()) })
            }
            _ => json!({ "error_code": -1010 }),
        };

        if self.empty_replies {
            return PostResponse::ok(Vec::new());
        }
        let Some(cipher) = self.cipher.as_ref() else {
            return PostResponse::status(403);
        };
        let body = reply.to_string();
        let envelope = match self.reply_fault {
            None => cipher.seal(seq, body.as_bytes()),
            Some(ReplyFault::Misaligned) => {
                let mut envelope = cipher.seal(seq, body.as_bytes());
                envelope.truncate(SIGNATURE_LEN + 8);
                envelope
            }
            Some(ReplyFault::ZeroPadding) => cipher.seal_blocks(seq, &[0u8; 16]),
            Some(ReplyFault::EmptyPlaintext) => cipher.seal(seq, &[]),
            Some(ReplyFault::FlippedByte) => {
                let mut envelope = cipher.seal(seq, body.as_bytes());
                if let Some(last) = envelope.last_mut() {
                    *last ^= 0x01;
                }
                envelope
            }
        };
        PostResponse::ok(envelope)
    }
}

fn parse_seq(url: &str) -> Option<u32> {
    let (_, query) = url.split_once('?')?;
    query
        .split('&')
        .find_map(|pair| pair.strip_prefix("seq="))
        .and_then(|raw| raw.parse().ok())
}

/// Device side of the session protocol, reachable as a transport.
#[derive(Debug, Clone)]
pub struct SimulatedDevice {
    state: Arc<Mutex<DeviceState>>,
}

impl SimulatedDevice {
    pub fn new(credential_hash: CredentialHash) -> Self {
        Self {
            state: Arc::new(Mutex::new(DeviceState::new(credential_hash))),
        }
    }

    /// Handle to the shared device state.
    pub fn state(&self) -> Arc<Mutex<DeviceState>> {
        self.state.clone()
    }
}

#[async_trait]
impl HttpTransport for SimulatedDevice {
    async fn post(&mut self, request: PostRequest<'_>) -> Result<PostResponse, TransportError> {
        let path = request
            .url
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(request.url);
        let path = path.find('/').map(|i| &path[i..]).unwrap_or("");
        let path = path.split('?').next().unwrap_or("");

        let stall = {
            let mut state = self.state.lock();
            let stall = state.stalled_posts > 0;
            if stall {
                state.stalled_posts -= 1;
            }
            stall
        };
        if stall {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }

        let mut state = self.state.lock();
        let response = if path.ends_with(HANDSHAKE1_PATH) {
            state.handshake1(&request)
        } else if path.ends_with(HANDSHAKE2_PATH) {
            state.handshake2(&request)
        } else if path.ends_with(REQUEST_PATH) {
            state.request(&request)
        } else {
            PostResponse::status(404)
        };
        Ok(response)
    }
}

/// Transport that never reaches a device.
#[derive(Debug, Clone, Default)]
pub struct UnreachableTransport {
    pub calls: Arc<Mutex<u32>>,
}

#[async_trait]
impl HttpTransport for UnreachableTransport {
    async fn post(&mut self, request: PostRequest<'_>) -> Result<PostResponse, TransportError> {
        *self.calls.lock() += 1;
        Err(TransportError::Io(format!("{} unreachable", request.url)))
    }
}
