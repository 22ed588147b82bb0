//! Argon2 password hashing.

use argon2::Argon2;
use argon2::password_hash::{
    Error as PasswordHashError, PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
    rand_core::OsRng,
};

use crate::error::{AccessError, AccessResult};

/// Hash a password into a PHC string.
///
/// # Errors
///
/// Returns [`AccessError::PasswordHashFailed`] when hashing fails.
pub fn hash_password(password: &str) -> AccessResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|detail| AccessError::PasswordHashFailed { detail })?;
    Ok(hash.to_string())
}

/// Check a candidate password against a stored PHC hash.
///
/// # Errors
///
/// Returns an error when the stored hash is malformed or verification fails for a reason other
/// than a mismatch.
pub fn verify_password(expected_hash: &str, candidate: &str) -> AccessResult<bool> {
    let parsed =
        PasswordHash::new(expected_hash).map_err(|detail| AccessError::StoredHashInvalid { detail })?;
    match Argon2::default().verify_password(candidate.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(PasswordHashError::Password) => Ok(false),
        Err(detail) => Err(AccessError::PasswordVerifyFailed { detail }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify() -> anyhow::Result<()> {
        let hash = hash_password("hunter2")?;
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password(&hash, "hunter2")?);
        assert!(!verify_password(&hash, "hunter3")?);
        Ok(())
    }

    #[test]
    fn malformed_hash_is_an_error() {
        assert!(matches!(
            verify_password("not-a-hash", "pw"),
            Err(AccessError::StoredHashInvalid { .. })
        ));
    }
}
