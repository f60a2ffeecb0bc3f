// ===================================================================================================
// Crypto Module (C1) - Envelope Encryption Primitives
// ===================================================================================================
//
// Pure byte-buffer cryptography, no I/O. A password derives a master key via
// PBKDF2-HMAC-SHA256; each file gets its own randomly generated data key,
// which is wrapped (AES-256-GCM) by the master key and stored once in the
// file's metadata. Each chunk is sealed independently under the data key, so
// chunk encryption stays stateless and parallelizable: every chunk is its own
// AEAD record with a fresh IV, and chunks share nothing but the data key.
// ===================================================================================================

pub mod secure_random;

use crate::error::{RivaultError, RivaultResult};
use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, Key, KeyInit, Nonce};
use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;

pub const KEY_LEN: usize = 32;
pub const IV_LEN: usize = 12;
pub const TAG_LEN: usize = 16;
pub const PBKDF2_ITERATIONS: u32 = 100_000;

/// Result of sealing a plaintext buffer: a fresh IV, the ciphertext, and the
/// AEAD authentication tag, kept separate to mirror the on-wire chunk layout
/// (IV || tag || ciphertext).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedBox {
    pub iv: [u8; IV_LEN],
    pub ciphertext: Vec<u8>,
    pub tag: [u8; TAG_LEN],
}

impl SealedBox {
    /// Serialize in the wire order used for chunk bodies: IV ‖ tag ‖ ciphertext.
    pub fn to_wire(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(IV_LEN + TAG_LEN + self.ciphertext.len());
        out.extend_from_slice(&self.iv);
        out.extend_from_slice(&self.tag);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    pub fn from_wire(bytes: &[u8]) -> RivaultResult<Self> {
        if bytes.len() < IV_LEN + TAG_LEN {
            return Err(RivaultError::Crypto("chunk body too short for IV+tag".to_string()));
        }
        let mut iv = [0u8; IV_LEN];
        iv.copy_from_slice(&bytes[..IV_LEN]);
        let mut tag = [0u8; TAG_LEN];
        tag.copy_from_slice(&bytes[IV_LEN..IV_LEN + TAG_LEN]);
        let ciphertext = bytes[IV_LEN + TAG_LEN..].to_vec();
        Ok(SealedBox { iv, ciphertext, tag })
    }
}

/// Derive a 32-byte master key from a password and caller-provided salt via
/// PBKDF2-HMAC-SHA256 at 100,000 iterations.
pub fn derive_master_key(password: &str, salt: &[u8]) -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, PBKDF2_ITERATIONS, &mut key);
    key
}

/// Generate a fresh, random 32-byte data key for one file.
pub fn generate_data_key() -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    secure_random::fill_secure_bytes(&mut key);
    key
}

fn cipher_for(key: &[u8]) -> RivaultResult<Aes256Gcm> {
    if key.len() != KEY_LEN {
        return Err(RivaultError::Crypto(format!(
            "invalid key length: expected {} bytes, got {}",
            KEY_LEN,
            key.len()
        )));
    }
    Ok(Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key)))
}

/// Seal a plaintext buffer under `key` with a fresh random IV.
pub fn seal(plaintext: &[u8], key: &[u8]) -> RivaultResult<SealedBox> {
    let cipher = cipher_for(key)?;
    let mut iv_bytes = [0u8; IV_LEN];
    secure_random::fill_secure_bytes(&mut iv_bytes);
    let nonce = Nonce::from_slice(&iv_bytes);

    let combined = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| RivaultError::Crypto("encryption failed".to_string()))?;

    // aes-gcm appends the 16-byte tag to the end of the ciphertext.
    let split_at = combined.len().saturating_sub(TAG_LEN);
    let (ciphertext, tag_slice) = combined.split_at(split_at);
    let mut tag = [0u8; TAG_LEN];
    tag.copy_from_slice(tag_slice);

    Ok(SealedBox {
        iv: iv_bytes,
        ciphertext: ciphertext.to_vec(),
        tag,
    })
}

/// Inverse of [`seal`]. Returns the indistinguishable `CryptoError::AuthFailed`
/// analogue for both a wrong key and a tampered ciphertext/tag -- there is no
/// oracle here that lets a caller tell the two cases apart.
pub fn open(sealed: &SealedBox, key: &[u8]) -> RivaultResult<Vec<u8>> {
    let cipher = cipher_for(key)?;
    let nonce = Nonce::from_slice(&sealed.iv);

    let mut combined = Vec::with_capacity(sealed.ciphertext.len() + TAG_LEN);
    combined.extend_from_slice(&sealed.ciphertext);
    combined.extend_from_slice(&sealed.tag);

    cipher
        .decrypt(nonce, combined.as_ref())
        .map_err(|_| RivaultError::Crypto("authentication failed".to_string()))
}

/// Wrap a file's data key under the user's master key.
pub fn wrap_data_key(data_key: &[u8; KEY_LEN], master_key: &[u8; KEY_LEN]) -> RivaultResult<SealedBox> {
    seal(data_key, master_key)
}

/// Unwrap a file's data key using the user's master key.
pub fn unwrap_data_key(sealed: &SealedBox, master_key: &[u8; KEY_LEN]) -> RivaultResult<[u8; KEY_LEN]> {
    let plaintext = open(sealed, master_key)?;
    if plaintext.len() != KEY_LEN {
        return Err(RivaultError::Crypto("unwrapped key has unexpected length".to_string()));
    }
    let mut key = [0u8; KEY_LEN];
    key.copy_from_slice(&plaintext);
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_open_round_trip() {
        let key = generate_data_key();
        let plaintext = b"hello world";
        let sealed = seal(plaintext, &key).unwrap();
        let opened = open(&sealed, &key).unwrap();
        assert_eq!(opened, plaintext);
    }

    #[test]
    fn seal_is_non_deterministic() {
        let key = generate_data_key();
        let a = seal(b"same plaintext", &key).unwrap();
        let b = seal(b"same plaintext", &key).unwrap();
        assert_ne!(a.iv, b.iv);
        assert_ne!(a.to_wire(), b.to_wire());
    }

    #[test]
    fn tampered_ciphertext_fails_indistinguishably() {
        let key = generate_data_key();
        let mut sealed = seal(b"hello world", &key).unwrap();
        sealed.ciphertext[0] ^= 0xFF;
        let err = open(&sealed, &key).unwrap_err();
        assert!(matches!(err, RivaultError::Crypto(_)));
    }

    #[test]
    fn wrong_key_fails_indistinguishably() {
        let key = generate_data_key();
        let other_key = generate_data_key();
        let sealed = seal(b"hello world", &key).unwrap();
        let err = open(&sealed, &other_key).unwrap_err();
        assert!(matches!(err, RivaultError::Crypto(_)));
    }

    #[test]
    fn wrap_unwrap_data_key_round_trip() {
        let master_key = derive_master_key("hunter2", &[0u8; 16]);
        let data_key = generate_data_key();
        let wrapped = wrap_data_key(&data_key, &master_key).unwrap();
        let unwrapped = unwrap_data_key(&wrapped, &master_key).unwrap();
        assert_eq!(data_key, unwrapped);
    }

    #[test]
    fn master_key_derivation_is_deterministic_for_same_salt() {
        let salt = [0u8; 16];
        let a = derive_master_key("hunter2", &salt);
        let b = derive_master_key("hunter2", &salt);
        assert_eq!(a, b);

        let c = derive_master_key("different", &salt);
        assert_ne!(a, c);
    }

    #[test]
    fn chunk_wire_layout_round_trips() {
        let key = generate_data_key();
        let sealed = seal(b"chunk payload", &key).unwrap();
        let wire = sealed.to_wire();
        let parsed = SealedBox::from_wire(&wire).unwrap();
        assert_eq!(parsed, sealed);
    }
}
