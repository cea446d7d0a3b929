//! AES-256-CBC payload encryption with PBKDF2 key derivation
//!
//! Blobs are `salt_hex:iv_hex:ciphertext_hex`. A 64-hex-character key input
//! is used as raw key bytes; any other input is treated as a passphrase and
//! stretched with PBKDF2-HMAC-SHA-512.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;
use serde_json::Value;
use sha2::Sha512;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{ChunkError, Result};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

const SALT_LEN: usize = 16;
const IV_LEN: usize = 16;
const PBKDF2_ROUNDS: u32 = 100_000;

/// 256-bit key material resolved from a caller-supplied key input
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeyMaterial([u8; 32]);

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "KeyMaterial([REDACTED])")
    }
}

impl KeyMaterial {
    /// Resolves a key input against a salt.
    ///
    /// A 64-hex-character input is interpreted as 32 raw key bytes and the
    /// salt is ignored; anything else is derived with PBKDF2-HMAC-SHA-512
    /// over the passphrase and salt.
    pub fn resolve(input: &str, salt: &[u8]) -> Self {
        if input.len() == 64 {
            if let Ok(bytes) = hex::decode(input) {
                let mut key = [0u8; 32];
                key.copy_from_slice(&bytes);
                return Self(key);
            }
        }
        let mut key = [0u8; 32];
        pbkdf2::pbkdf2_hmac::<Sha512>(input.as_bytes(), salt, PBKDF2_ROUNDS, &mut key);
        Self(key)
    }
}

/// Encrypts a value into a `salt:iv:ciphertext` hex blob.
pub fn encrypt_value(value: &Value, key_input: &str) -> Result<String> {
    let plaintext = serde_json::to_string(value)?;
    let mut salt = [0u8; SALT_LEN];
    let mut iv = [0u8; IV_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    rand::thread_rng().fill_bytes(&mut iv);
    let key = KeyMaterial::resolve(key_input, &salt);
    let ciphertext =
        Aes256CbcEnc::new(&key.0.into(), &iv.into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());
    Ok(format!(
        "{}:{}:{}",
        hex::encode(salt),
        hex::encode(iv),
        hex::encode(ciphertext)
    ))
}

/// Decrypts a `salt:iv:ciphertext` blob back into a value.
///
/// Input without a colon is treated as plaintext JSON. Every failure mode —
/// malformed blob, wrong key, corrupted ciphertext, non-JSON plaintext —
/// surfaces as [`ChunkError::Decryption`]; there is no downgrade to
/// plaintext once the blob format is recognized.
pub fn decrypt_value(blob: &str, key_input: &str) -> Result<Value> {
    if !blob.contains(':') {
        return serde_json::from_str(blob)
            .map_err(|e| ChunkError::Decryption(format!("plaintext payload is not valid JSON: {e}")));
    }
    let parts: Vec<&str> = blob.split(':').collect();
    if parts.len() != 3 {
        return Err(ChunkError::Decryption(
            "expected salt:iv:ciphertext".to_string(),
        ));
    }
    let salt = hex::decode(parts[0])
        .map_err(|_| ChunkError::Decryption("salt is not valid hex".to_string()))?;
    let iv = hex::decode(parts[1])
        .map_err(|_| ChunkError::Decryption("iv is not valid hex".to_string()))?;
    let ciphertext = hex::decode(parts[2])
        .map_err(|_| ChunkError::Decryption("ciphertext is not valid hex".to_string()))?;
    if salt.len() != SALT_LEN {
        return Err(ChunkError::Decryption(format!(
            "salt must be {SALT_LEN} bytes, got {}",
            salt.len()
        )));
    }
    let iv: [u8; IV_LEN] = iv
        .try_into()
        .map_err(|_| ChunkError::Decryption(format!("iv must be {IV_LEN} bytes")))?;

    let key = KeyMaterial::resolve(key_input, &salt);
    let plaintext = Aes256CbcDec::new(&key.0.into(), &iv.into())
        .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
        .map_err(|_| ChunkError::Decryption("wrong key or corrupted ciphertext".to_string()))?;
    let text = String::from_utf8(plaintext)
        .map_err(|_| ChunkError::Decryption("decrypted payload is not UTF-8".to_string()))?;
    serde_json::from_str(&text)
        .map_err(|_| ChunkError::Decryption("decrypted payload is not valid JSON".to_string()))
}
