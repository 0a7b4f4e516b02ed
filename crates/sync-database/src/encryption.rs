//! ChaCha20-Poly1305 sealing for destination credential blobs.

use crate::{DatabaseError, DatabaseResult};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use rand::RngCore;

/// Nonce size for ChaCha20-Poly1305 (96 bits = 12 bytes).
pub const NONCE_SIZE: usize = 12;

/// Key size for ChaCha20-Poly1305 (256 bits = 32 bytes).
pub const KEY_SIZE: usize = 32;

/// Generate a random nonce. Never reuse one with the same key.
pub fn generate_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce);
    nonce
}

/// Generate a random credential key.
pub fn generate_key() -> [u8; KEY_SIZE] {
    let mut key = [0u8; KEY_SIZE];
    rand::thread_rng().fill_bytes(&mut key);
    key
}

fn cipher(key: &[u8], nonce: &[u8]) -> DatabaseResult<ChaCha20Poly1305> {
    if key.len() != KEY_SIZE {
        return Err(DatabaseError::Encryption(format!(
            "Invalid key size: expected {}, got {}",
            KEY_SIZE,
            key.len()
        )));
    }
    if nonce.len() != NONCE_SIZE {
        return Err(DatabaseError::Encryption(format!(
            "Invalid nonce size: expected {}, got {}",
            NONCE_SIZE,
            nonce.len()
        )));
    }
    ChaCha20Poly1305::new_from_slice(key).map_err(|e| DatabaseError::Encryption(e.to_string()))
}

/// Seal `plaintext`. The authentication tag is appended to the ciphertext.
pub fn encrypt_content(key: &[u8], nonce: &[u8], plaintext: &[u8]) -> DatabaseResult<Vec<u8>> {
    cipher(key, nonce)?
        .encrypt(Nonce::from_slice(nonce), plaintext)
        .map_err(|e| DatabaseError::Encryption(e.to_string()))
}

/// Open a blob sealed by [`encrypt_content`].
pub fn decrypt_content(key: &[u8], nonce: &[u8], ciphertext: &[u8]) -> DatabaseResult<Vec<u8>> {
    cipher(key, nonce)?
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|e| DatabaseError::Encryption(e.to_string()))
}
