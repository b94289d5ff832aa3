use thiserror::Error;

use crate::core::types::Password;

use super::random::FromRandom;

#[derive(Debug)]
pub struct Salt(pub String);

/// An argon2 encoded hash, `$argon2i$v=19$...`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(transparent)]
pub struct PasswordHash(pub String);

impl AsRef<str> for PasswordHash {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Error)]
#[error("password hashing failed: {0}")]
pub struct HashError(#[from] argon2::Error);

/// Keyed argon2 hashing. Hashes made with one secret key do not verify
/// under another.
#[derive(Clone)]
pub struct HashingService {
    secret_key: String,
}

impl std::fmt::Debug for HashingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HashingService").finish()
    }
}

impl HashingService {
    pub fn with_secret_key(secret_key: String) -> Self {
        Self { secret_key }
    }

    fn get_config(&self) -> argon2::Config<'_> {
        argon2::Config {
            secret: self.secret_key.as_bytes(),
            ..argon2::Config::default()
        }
    }

    pub fn hash(&self, password: &Password) -> Result<PasswordHash, HashError> {
        let salt = Salt::from_random();
        let hash = argon2::hash_encoded(
            password.0.as_bytes(),
            salt.0.as_bytes(),
            &self.get_config(),
        )?;

        Ok(PasswordHash(hash))
    }

    pub fn verify(&self, password: &Password, hashed: &PasswordHash) -> Result<bool, HashError> {
        let matches = argon2::verify_encoded_ext(
            hashed.as_ref(),
            password.0.as_bytes(),
            self.secret_key.as_bytes(),
            &[],
        )?;

        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verifies_its_own_hashes() {
        let hasher = HashingService::with_secret_key("pepper".into());
        let hash = hasher.hash(&Password("pw".into())).unwrap();

        assert!(hash.0.starts_with("$argon2"));
        assert!(hasher.verify(&Password("pw".into()), &hash).unwrap());
        assert!(!hasher.verify(&Password("wrong".into()), &hash).unwrap());
    }

    #[test]
    fn secret_key_is_part_of_the_hash() {
        let hash = HashingService::with_secret_key("one".into())
            .hash(&Password("pw".into()))
            .unwrap();
        let other = HashingService::with_secret_key("two".into());

        assert!(!other.verify(&Password("pw".into()), &hash).unwrap());
    }
}
