//! Cryptography capability consumed by the guards.
//!
//! The guards only need hashing, constant-time verification and randomness.
//! [`DefaultCrypto`] provides them with SHA-256, HMAC and the OS-seeded
//! thread RNG; swap in another [`Crypto`] to use a keyed or hardware source.

use hmac::{Hmac, Mac};
use rand::distributions::Alphanumeric;
use rand::{Rng, RngCore};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

pub trait Crypto: Send + Sync {
    /// Hex-encoded digest of `input`.
    fn hash(&self, input: &str) -> String;

    /// Whether `hash` is the digest of `input`, compared in constant time.
    fn verify(&self, input: &str, hash: &str) -> bool {
        constant_time_eq(&self.hash(input), hash)
    }

    fn random_bytes(&self, len: usize) -> Vec<u8>;

    /// Alphanumeric random string of `len` characters.
    fn random_string(&self, len: usize) -> String;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultCrypto;

impl Crypto for DefaultCrypto {
    fn hash(&self, input: &str) -> String {
        hex::encode(Sha256::digest(input.as_bytes()))
    }

    fn random_bytes(&self, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        rand::thread_rng().fill_bytes(&mut buf);
        buf
    }

    fn random_string(&self, len: usize) -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(len)
            .map(char::from)
            .collect()
    }
}

/// Constant-time string equality, including the length side channel.
///
/// Both inputs are MACed under the same key and the fixed-size tags are
/// compared with `verify_slice`.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    let mut key = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut key);

    let (Ok(mut mac_a), Ok(mut mac_b)) =
        (HmacSha256::new_from_slice(&key), HmacSha256::new_from_slice(&key))
    else {
        return false;
    };
    mac_a.update(a.as_bytes());
    mac_b.update(b.as_bytes());
    let tag_a = mac_a.finalize().into_bytes();
    mac_b.verify_slice(&tag_a).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_verifies() {
        let crypto = DefaultCrypto;
        let digest = crypto.hash("127.0.0.1|curl/8");
        assert_eq!(digest.len(), 64);
        assert!(crypto.verify("127.0.0.1|curl/8", &digest));
        assert!(!crypto.verify("127.0.0.2|curl/8", &digest));
    }

    #[test]
    fn random_string_is_alphanumeric() {
        let s = DefaultCrypto.random_string(40);
        assert_eq!(s.len(), 40);
        assert!(s.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(s, DefaultCrypto.random_string(40));
    }

    #[test]
    fn constant_time_eq_compares_content() {
        assert!(constant_time_eq("abc", "abc"));
        assert!(!constant_time_eq("abc", "abd"));
        assert!(!constant_time_eq("abc", "abcd"));
        assert!(!constant_time_eq("", "a"));
    }
}
