//! Password hashing via PBKDF2-HMAC-SHA256.
//!
//! The same codec hashes login passwords and refresh-token secrets, so a
//! leaked credential table never yields a usable token.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use rand::{RngCore, rng};
use sha2::Sha256;
use subtle::ConstantTimeEq;

/// Salt length in bytes (128 bit).
const SALT_LEN: usize = 16;

/// Derived key length in bytes (256 bit).
const HASH_LEN: usize = 32;

/// Default PBKDF2 iteration count.
pub const DEFAULT_ITERATIONS: u32 = 100_000;

/// A base64-encoded hash and the base64-encoded salt it was derived with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordHash {
    pub hash: String,
    pub salt: String,
}

/// Salted, iterated password hasher.
#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    iterations: u32,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl PasswordHasher {
    pub fn new() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
        }
    }

    /// Hasher with a custom iteration count.
    ///
    /// Stored hashes are only verifiable with the count they were made with.
    /// Production code goes through [`crate::config::AuthConfig`], which
    /// never goes below [`DEFAULT_ITERATIONS`].
    pub fn with_iterations(iterations: u32) -> Self {
        Self {
            iterations: iterations.max(1),
        }
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    /// Hash a password with a fresh random salt.
    pub fn hash(&self, password: &str) -> PasswordHash {
        let mut salt = [0u8; SALT_LEN];
        rng().fill_bytes(&mut salt);
        let key = self.derive(password, &salt);
        PasswordHash {
            hash: STANDARD.encode(key),
            salt: STANDARD.encode(salt),
        }
    }

    /// Verify a password against a stored hash and salt.
    ///
    /// Undecodable stored values verify as `false`. The key comparison runs
    /// in constant time over the full length.
    pub fn verify(&self, password: &str, stored_hash: &str, stored_salt: &str) -> bool {
        let Ok(salt) = STANDARD.decode(stored_salt) else {
            return false;
        };
        let Ok(expected) = STANDARD.decode(stored_hash) else {
            return false;
        };
        let key = self.derive(password, &salt);
        key.as_slice().ct_eq(expected.as_slice()).into()
    }

    fn derive(&self, password: &str, salt: &[u8]) -> [u8; HASH_LEN] {
        let mut out = [0u8; HASH_LEN];
        pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, self.iterations, &mut out);
        out
    }
}

/// Hash a password with the default hasher.
pub fn hash_password(password: &str) -> PasswordHash {
    PasswordHasher::new().hash(password)
}

/// Verify a password with the default hasher.
pub fn verify_password(password: &str, stored_hash: &str, stored_salt: &str) -> bool {
    PasswordHasher::new().verify(password, stored_hash, stored_salt)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn fast() -> PasswordHasher {
        PasswordHasher::with_iterations(64)
    }

    #[test]
    fn hash_and_salt_have_expected_lengths() {
        let h = fast().hash("hunter22");
        assert_eq!(STANDARD.decode(&h.hash).unwrap().len(), HASH_LEN);
        assert_eq!(STANDARD.decode(&h.salt).unwrap().len(), SALT_LEN);
    }

    #[test]
    fn same_password_gets_distinct_salts() {
        let a = fast().hash("same");
        let b = fast().hash("same");
        assert_ne!(a.salt, b.salt);
        assert_ne!(a.hash, b.hash);
    }

    #[test]
    fn default_hasher_round_trips() {
        let h = hash_password("correct horse");
        assert!(verify_password("correct horse", &h.hash, &h.salt));
        assert!(!verify_password("correct horsf", &h.hash, &h.salt));
    }

    #[test]
    fn garbage_stored_values_do_not_verify() {
        let h = fast().hash("pw");
        assert!(!fast().verify("pw", "not base64!!", &h.salt));
        assert!(!fast().verify("pw", &h.hash, "%%%"));
        assert!(!fast().verify("pw", "", &h.salt));
    }

    #[test]
    fn iteration_count_is_part_of_the_hash() {
        let h = PasswordHasher::with_iterations(10).hash("pw");
        assert!(!PasswordHasher::with_iterations(11).verify("pw", &h.hash, &h.salt));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn verify_accepts_only_the_hashed_password(pw in ".{0,32}", other in ".{0,32}") {
            let hasher = fast();
            let h = hasher.hash(&pw);
            prop_assert!(hasher.verify(&pw, &h.hash, &h.salt));
            if other != pw {
                prop_assert!(!hasher.verify(&other, &h.hash, &h.salt));
            }
        }
    }
}
