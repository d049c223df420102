//! Password hashing with Argon2id.

use argon2::{Algorithm, Argon2, Params, PasswordHasher, PasswordVerifier, Version};
use once_cell::sync::OnceCell;
use password_hash::{PasswordHash, SaltString};

use super::error::AuthError;
use crate::config::HashingSettings;

pub struct CredentialStore {
    argon2: Argon2<'static>,
    /// Hash of a throwaway password, verified against when the username is unknown.
    decoy: OnceCell<String>,
}

impl CredentialStore {
    pub fn new(settings: &HashingSettings) -> Result<Self, AuthError> {
        let params = Params::new(settings.memory_kib, settings.iterations, settings.parallelism, None)
            .map_err(|e| AuthError::Hashing(e.to_string()))?;
        Ok(Self { argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params), decoy: OnceCell::new() })
    }

    /// PHC string with a fresh 16-byte salt.
    pub fn hash(&self, password: &str) -> Result<String, AuthError> {
        let mut salt_bytes = [0u8; 16];
        getrandom::getrandom(&mut salt_bytes).map_err(|e| AuthError::Entropy(e.to_string()))?;
        let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| AuthError::Hashing(e.to_string()))?;
        let phc = self.argon2.hash_password(password.as_bytes(), &salt).map_err(|e| AuthError::Hashing(e.to_string()))?;
        Ok(phc.to_string())
    }

    /// False for a wrong password and for anything that is not a valid PHC string.
    pub fn verify(&self, plaintext: &str, hash: &str) -> bool {
        match PasswordHash::new(hash) {
            Ok(parsed) => self.argon2.verify_password(plaintext.as_bytes(), &parsed).is_ok(),
            Err(_) => false,
        }
    }

    /// Spend one verification's worth of work without a real hash.
    pub fn verify_decoy(&self, plaintext: &str) {
        match self.decoy.get_or_try_init(|| self.hash("decoy-password-never-valid")) {
            Ok(decoy) => { let _ = self.verify(plaintext, decoy); }
            Err(e) => tracing::warn!(target: "identity.auth", error = %e, "decoy hash unavailable"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> CredentialStore { CredentialStore::new(&HashingSettings::fast_insecure()).unwrap() }

    #[test]
    fn hash_is_salted_and_verifies() {
        let cs = store();
        let a = cs.hash("pw123").unwrap();
        let b = cs.hash("pw123").unwrap();
        assert_ne!(a, b);
        assert!(a.starts_with("$argon2id$"));
        assert!(cs.verify("pw123", &a));
        assert!(cs.verify("pw123", &b));
        assert!(!cs.verify("pw124", &a));
    }

    #[test]
    fn malformed_hash_is_false_not_error() {
        let cs = store();
        assert!(!cs.verify("pw", ""));
        assert!(!cs.verify("pw", "plaintext"));
        assert!(!cs.verify("pw", "$argon2id$v=19$broken"));
    }

    #[test]
    fn hashes_from_other_params_still_verify() {
        let strong = CredentialStore::new(&HashingSettings { memory_kib: 64, iterations: 2, parallelism: 1 }).unwrap();
        let h = strong.hash("pw").unwrap();
        assert!(store().verify("pw", &h));
    }

    #[test]
    fn invalid_params_are_rejected() {
        assert!(CredentialStore::new(&HashingSettings { memory_kib: 1, iterations: 0, parallelism: 1 }).is_err());
    }
}
