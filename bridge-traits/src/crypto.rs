//! Credential Encryption Abstraction
//!
//! Provides the injectable cipher used to protect token material before it
//! reaches the durable key-value store.

/// Credential cipher trait
///
/// Abstracts platform encryption facilities:
/// - macOS/iOS: Keychain / CryptoKit
/// - Android: Keystore-backed AES
/// - Desktop: DPAPI, libsecret, or an app-managed key
///
/// Failure is signaled by `None`, never by panicking. A `None` from
/// `decrypt` typically means the ciphertext was tampered with, the backing
/// key rotated, or the row predates a key migration; callers treat it as a
/// recoverable, account-scoped condition.
///
/// # Security
///
/// Implementations MUST use authenticated encryption (or an equivalent
/// integrity check) so that corrupted ciphertext is detected rather than
/// silently decrypted into garbage.
pub trait TokenCipher: Send + Sync {
    /// Encrypt plaintext credential material
    fn encrypt(&self, plaintext: &[u8]) -> Option<Vec<u8>>;

    /// Decrypt previously encrypted credential material
    fn decrypt(&self, ciphertext: &[u8]) -> Option<Vec<u8>>;
}

/// Identity cipher for development and tests.
///
/// Stores credential material as-is. Never use in production builds; it
/// exists so hosts can wire the auth core before their platform cipher is
/// ready.
#[derive(Debug, Clone, Default)]
pub struct PlaintextCipher;

impl TokenCipher for PlaintextCipher {
    fn encrypt(&self, plaintext: &[u8]) -> Option<Vec<u8>> {
        Some(plaintext.to_vec())
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Option<Vec<u8>> {
        Some(ciphertext.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plaintext_cipher_round_trip() {
        let cipher = PlaintextCipher;
        let secret = b"refresh-handle";

        let ciphertext = cipher.encrypt(secret).unwrap();
        let plaintext = cipher.decrypt(&ciphertext).unwrap();

        assert_eq!(plaintext, secret);
    }
}
