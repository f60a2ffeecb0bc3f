/// Cryptographically secure random byte generation, used for nonces, salts,
/// and data keys throughout the crypto module.
use rand::rngs::OsRng;
use rand::RngCore;

pub fn fill_secure_bytes(bytes: &mut [u8]) {
    OsRng.fill_bytes(bytes);
}

pub fn generate_secure_bytes(len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distinct_calls_differ() {
        let a = generate_secure_bytes(32);
        let b = generate_secure_bytes(32);
        assert_ne!(a, b);
        assert_eq!(a.len(), 32);
    }
}
