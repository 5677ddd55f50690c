use tracing::{debug, warn};

use super::{
    HandshakeError, HttpTransport, PostRequest, HANDSHAKE1_MIN_LEN, HANDSHAKE1_PATH,
    HANDSHAKE2_PATH,
};
use crate::crypto::{
    client_proof, ct_eq, device_proof, CredentialHash, Seed, SessionCipher, SEED_LEN,
};

/// Result of a completed two-step handshake.
#[derive(Debug)]
pub struct HandshakeOutcome {
    pub cipher: SessionCipher,
    /// Session cookie captured from step 1, if the device issued one.
    pub cookie: Option<String>,
}

/// Drives the two POSTs that establish a session cipher.
///
/// A driver is single-use: it owns the local seed generated for this attempt.
pub struct ClientHandshake<'a> {
    pub base_url: &'a str,
    pub credential_hash: &'a CredentialHash,
    pub local_seed: Seed,
}

impl<'a> ClientHandshake<'a> {
    pub async fn run<T>(self, transport: &mut T) -> Result<HandshakeOutcome, HandshakeError>
    where
        T: HttpTransport + ?Sized,
    {
        let (remote_seed, cookie) = self.handshake1(transport).await?;
        debug!("handshake1 successful");
        self.handshake2(transport, &remote_seed, cookie.as_deref())
            .await?;
        debug!("handshake2 successful");

        Ok(HandshakeOutcome {
            cipher: SessionCipher::new(&self.local_seed, &remote_seed, self.credential_hash),
            cookie,
        })
    }

    async fn handshake1<T>(
        &self,
        transport: &mut T,
    ) -> Result<(Seed, Option<String>), HandshakeError>
    where
        T: HttpTransport + ?Sized,
    {
        let url = format!("{}{}", self.base_url, HANDSHAKE1_PATH);
        let response = transport
            .post(PostRequest {
                url: &url,
                body: &self.local_seed,
                cookie: None,
                collect_cookie: true,
            })
            .await?;

        if !response.is_success() {
            warn!(status = response.status, "handshake1 rejected");
            return Err(HandshakeError::Status {
                stage: "handshake1",
                status: response.status,
            });
        }
        if response.body.len() < HANDSHAKE1_MIN_LEN {
            warn!(len = response.body.len(), "handshake1 response too short");
            return Err(HandshakeError::ShortResponse(response.body.len()));
        }

        let (seed_bytes, server_hash) = response.body.split_at(SEED_LEN);
        let mut remote_seed = [0u8; SEED_LEN];
        remote_seed.copy_from_slice(seed_bytes);

        let expected = device_proof(&self.local_seed, &remote_seed, self.credential_hash);
        if !ct_eq(server_hash, &expected) {
            warn!("handshake1 proof mismatch");
            return Err(HandshakeError::Authentication(
                "device proof does not match local credentials".into(),
            ));
        }

        Ok((remote_seed, response.cookie))
    }

    async fn handshake2<T>(
        &self,
        transport: &mut T,
        remote_seed: &Seed,
        cookie: Option<&str>,
    ) -> Result<(), HandshakeError>
    where
        T: HttpTransport + ?Sized,
    {
        let url = format!("{}{}", self.base_url, HANDSHAKE2_PATH);
        let proof = client_proof(&self.local_seed, remote_seed, self.credential_hash);
        let response = transport
            .post(PostRequest {
                url: &url,
                body: &proof,
                cookie,
                collect_cookie: false,
            })
            .await?;

        if !response.is_success() {
            warn!(status = response.status, "handshake2 rejected");
            return Err(HandshakeError::Status {
                stage: "handshake2",
                status: response.status,
            });
        }
        Ok(())
    }
}
