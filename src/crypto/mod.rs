//! Hash primitives shared by the handshake and the session cipher.
//!
//! The session protocol only ever composes SHA-1, SHA-256 and AES-128-CBC; the
//! helpers here fix the concatenation orders so the handshake driver, the
//! cipher and the simulated device cannot drift apart.

use sha1::Sha1;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

pub mod cipher;

pub use cipher::{CipherError, SessionCipher};

/// Length of the local and remote handshake seeds.
pub const SEED_LEN: usize = 16;
/// Length of the credential hash (a SHA-256 digest).
pub const CREDENTIAL_HASH_LEN: usize = 32;

pub type Seed = [u8; SEED_LEN];
pub type CredentialHash = [u8; CREDENTIAL_HASH_LEN];

/// SHA-1 of `data`, returning a 20-byte digest.
pub fn sha1(data: &[u8]) -> [u8; 20] {
    let mut out = [0u8; 20];
    out.copy_from_slice(&Sha1::digest(data));
    out
}

/// SHA-256 over the concatenation of `parts`.
pub fn sha256(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    out
}

/// `SHA256(SHA1(username) || SHA1(password))`.
pub fn credential_hash(username: &str, password: &str) -> CredentialHash {
    let user = sha1(username.as_bytes());
    let pass = sha1(password.as_bytes());
    sha256(&[&user, &pass])
}

/// Proof the device returns in handshake step 1.
pub fn device_proof(local_seed: &Seed, remote_seed: &Seed, auth: &CredentialHash) -> [u8; 32] {
    sha256(&[local_seed, remote_seed, auth])
}

/// Proof the client sends in handshake step 2 (seed order swapped).
pub fn client_proof(local_seed: &Seed, remote_seed: &Seed, auth: &CredentialHash) -> [u8; 32] {
    sha256(&[remote_seed, local_seed, auth])
}

/// Byte comparison that does not short-circuit on the first mismatch.
pub(crate) fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && bool::from(a.ct_eq(b))
}
