use std::fmt;

use aes::cipher::block_padding::{NoPadding, Pkcs7};
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::{ct_eq, sha256, CredentialHash, Seed};

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

/// Length of the signature prefix on every envelope.
pub const SIGNATURE_LEN: usize = 32;
const BLOCK_LEN: usize = 16;
const IV_PREFIX_LEN: usize = 12;
const SIGNATURE_KEY_LEN: usize = 28;

/// Errors raised while opening an envelope.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CipherError {
    #[error("envelope is {0} bytes, shorter than the 32-byte signature")]
    EnvelopeTooShort(usize),
    #[error("ciphertext length {0} is not a positive multiple of 16")]
    CiphertextLength(usize),
    #[error("padding byte {pad} is invalid for {len} decrypted bytes")]
    Padding { pad: u8, len: usize },
}

/// Per-session secrets and the outbound sequence counter.
///
/// Built from the seeds exchanged during a successful handshake. Dropping the
/// value wipes every derived secret, so replacing the cipher held by a session
/// leaves nothing of the previous session behind.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SessionCipher {
    key: [u8; 16],
    iv_prefix: [u8; IV_PREFIX_LEN],
    signature_key: [u8; SIGNATURE_KEY_LEN],
    seq: u32,
}

impl SessionCipher {
    /// Derives the session key, IV prefix, initial sequence and signature key.
    pub fn new(local_seed: &Seed, remote_seed: &Seed, credential_hash: &CredentialHash) -> Self {
        let mut local_hash = [0u8; 64];
        local_hash[..16].copy_from_slice(local_seed);
        local_hash[16..32].copy_from_slice(remote_seed);
        local_hash[32..].copy_from_slice(credential_hash);

        let mut key_hash = sha256(&[b"lsk", &local_hash]);
        let mut iv_hash = sha256(&[b"iv", &local_hash]);
        let mut sig_hash = sha256(&[b"ldk", &local_hash]);

        let mut key = [0u8; 16];
        key.copy_from_slice(&key_hash[..16]);
        let mut iv_prefix = [0u8; IV_PREFIX_LEN];
        iv_prefix.copy_from_slice(&iv_hash[..IV_PREFIX_LEN]);
        let seq = u32::from_be_bytes([iv_hash[28], iv_hash[29], iv_hash[30], iv_hash[31]]);
        let mut signature_key = [0u8; SIGNATURE_KEY_LEN];
        signature_key.copy_from_slice(&sig_hash[..SIGNATURE_KEY_LEN]);

        local_hash.zeroize();
        key_hash.zeroize();
        iv_hash.zeroize();
        sig_hash.zeroize();

        Self {
            key,
            iv_prefix,
            signature_key,
            seq,
        }
    }

    /// Current value of the outbound sequence counter.
    pub fn sequence(&self) -> u32 {
        self.seq
    }

    /// Advances the sequence counter and seals `plaintext` under the new value.
    ///
    /// Returns `signature || ciphertext` together with the sequence used; the
    /// caller must hand that same sequence to [`SessionCipher::decrypt`] for
    /// the matching reply.
    pub fn encrypt(&mut self, plaintext: &[u8]) -> (Vec<u8>, u32) {
        self.seq = self.seq.wrapping_add(1);
        (self.seal(self.seq, plaintext), self.seq)
    }

    /// Opens an envelope sealed under `seq`. Never touches the counter.
    ///
    /// The received signature is not checked here; see
    /// [`SessionCipher::verify_signature`].
    pub fn decrypt(&self, seq: u32, envelope: &[u8]) -> Result<Vec<u8>, CipherError> {
        if envelope.len() < SIGNATURE_LEN {
            return Err(CipherError::EnvelopeTooShort(envelope.len()));
        }
        let ciphertext = &envelope[SIGNATURE_LEN..];
        if ciphertext.is_empty() || ciphertext.len() % BLOCK_LEN != 0 {
            return Err(CipherError::CiphertextLength(ciphertext.len()));
        }

        let iv = self.iv_for(seq);
        let mut plain = Aes128CbcDec::new(&self.key.into(), &iv.into())
            .decrypt_padded_vec_mut::<NoPadding>(ciphertext)
            .map_err(|_| CipherError::CiphertextLength(ciphertext.len()))?;

        // Lenient PKCS#7 strip: only the final byte is consulted.
        let len = plain.len();
        let pad = plain[len - 1];
        if pad == 0 || pad as usize > BLOCK_LEN || pad as usize > len {
            return Err(CipherError::Padding { pad, len });
        }
        plain.truncate(len - pad as usize);
        Ok(plain)
    }

    /// Recomputes the envelope signature for `seq` and compares it with the
    /// received one.
    pub fn verify_signature(&self, seq: u32, envelope: &[u8]) -> bool {
        if envelope.len() < SIGNATURE_LEN {
            return false;
        }
        let (received, ciphertext) = envelope.split_at(SIGNATURE_LEN);
        ct_eq(received, &self.sign(seq, ciphertext))
    }

    /// Seals `plaintext` under an explicit sequence without advancing the
    /// counter. Replies from the device side are sealed this way.
    pub(crate) fn seal(&self, seq: u32, plaintext: &[u8]) -> Vec<u8> {
        let iv = self.iv_for(seq);
        let ciphertext = Aes128CbcEnc::new(&self.key.into(), &iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext);
        self.envelope(seq, ciphertext)
    }

    /// Seals whole blocks without adding padding; a trailing partial block is
    /// dropped. Lets the device simulator produce malformed padding.
    pub(crate) fn seal_blocks(&self, seq: u32, blocks: &[u8]) -> Vec<u8> {
        let whole = blocks.len() - blocks.len() % BLOCK_LEN;
        let iv = self.iv_for(seq);
        let ciphertext = Aes128CbcEnc::new(&self.key.into(), &iv.into())
            .encrypt_padded_vec_mut::<NoPadding>(&blocks[..whole]);
        self.envelope(seq, ciphertext)
    }

    fn envelope(&self, seq: u32, ciphertext: Vec<u8>) -> Vec<u8> {
        let mut envelope = Vec::with_capacity(SIGNATURE_LEN + ciphertext.len());
        envelope.extend_from_slice(&self.sign(seq, &ciphertext));
        envelope.extend_from_slice(&ciphertext);
        envelope
    }

    fn sign(&self, seq: u32, ciphertext: &[u8]) -> [u8; 32] {
        sha256(&[&self.signature_key, &seq.to_be_bytes(), ciphertext])
    }

    fn iv_for(&self, seq: u32) -> [u8; BLOCK_LEN] {
        let mut iv = [0u8; BLOCK_LEN];
        iv[..IV_PREFIX_LEN].copy_from_slice(&self.iv_prefix);
        iv[IV_PREFIX_LEN..].copy_from_slice(&seq.to_be_bytes());
        iv
    }
}

impl fmt::Debug for SessionCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCipher")
            .field("seq", &self.seq)
            .finish_non_exhaustive()
    }
}
