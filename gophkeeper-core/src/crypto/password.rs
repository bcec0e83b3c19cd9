//! Account password hashing.
//!
//! Uses Argon2id with a per-hash random salt, producing a self-describing
//! PHC string (`$argon2id$v=19$m=...`). The cost parameters travel inside
//! the hash, so they can be raised later without invalidating old hashes.

use crate::crypto::{CryptoError, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};

/// Cost parameters for Argon2id password hashing.
#[derive(Debug, Clone, Copy)]
pub struct PasswordHashParams {
    /// Memory cost in KiB
    pub mem_cost: u32,
    /// Number of iterations
    pub time_cost: u32,
    /// Number of lanes
    pub parallelism: u32,
}

impl Default for PasswordHashParams {
    fn default() -> Self {
        Self {
            mem_cost: 19_456, // 19 MiB
            time_cost: 2,
            parallelism: 1,
        }
    }
}

impl PasswordHashParams {
    /// Cheapest parameters argon2 accepts. Tests only.
    pub fn insecure_fast() -> Self {
        Self {
            mem_cost: Params::MIN_M_COST,
            time_cost: Params::MIN_T_COST,
            parallelism: Params::MIN_P_COST,
        }
    }

    fn hasher(&self) -> Result<Argon2<'static>> {
        let params = Params::new(self.mem_cost, self.time_cost, self.parallelism, None)
            .map_err(|e| CryptoError::HashFailed(format!("Invalid parameters: {}", e)))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }
}

/// Hash a plaintext password into a PHC string using default parameters.
pub fn hash_password(password: &str) -> Result<String> {
    hash_password_with(password, &PasswordHashParams::default())
}

/// Hash a plaintext password with explicit cost parameters.
pub fn hash_password_with(password: &str, params: &PasswordHashParams) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    params
        .hasher()?
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| CryptoError::HashFailed(e.to_string()))
}

/// Check a plaintext password against a stored PHC hash.
///
/// A malformed stored hash verifies as `false`.
pub fn verify_password(hash: &str, password: &str) -> bool {
    let parsed = match PasswordHash::new(hash) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::warn!("Stored password hash is malformed: {}", e);
            return false;
        }
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify() {
        let hash = hash_password_with("pw1", &PasswordHashParams::insecure_fast()).unwrap();

        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password(&hash, "pw1"));
        assert!(!verify_password(&hash, "pw2"));
    }

    #[test]
    fn hashes_are_salted() {
        let params = PasswordHashParams::insecure_fast();
        let h1 = hash_password_with("same", &params).unwrap();
        let h2 = hash_password_with("same", &params).unwrap();
        assert_ne!(h1, h2);
    }

    #[test]
    fn default_params_verify() {
        let hash = hash_password("correct").unwrap();
        assert!(verify_password(&hash, "correct"));
    }

    #[test]
    fn malformed_hash_rejects() {
        assert!(!verify_password("not-a-phc-string", "anything"));
    }

    #[test]
    fn invalid_params_error() {
        let params = PasswordHashParams {
            mem_cost: 1,
            time_cost: 1,
            parallelism: 1,
        };
        assert!(matches!(
            hash_password_with("pw", &params),
            Err(CryptoError::HashFailed(_))
        ));
    }
}
