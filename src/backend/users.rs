use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{event, Level};

use crate::core::types::{Password, UserId};
use crate::util::hash::{HashError, HashingService, PasswordHash};

use super::{AuthError, AuthenticatorBackend};

#[derive(Debug, Clone)]
#[derive(serde::Deserialize, serde::Serialize)]
pub struct UserRecord {
    pub id: UserId,
    pub username: String,
    pub password_hash: PasswordHash,
    #[serde(default)]
    pub profile: serde_json::Value,
}

#[derive(Debug, Error)]
pub enum UserFileError {
    #[error("failed to read user file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse user file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("duplicate username `{0}`")]
    DuplicateUsername(String),

    #[error(transparent)]
    Hash(#[from] HashError),
}

/// A user directory kept in a JSON file:
///
/// ```json
/// [{ "id": "u42", "username": "alice", "password_hash": "$argon2i$...", "profile": { "name": "Alice" } }]
/// ```
///
/// Only `profile` is ever published on `/userinfo`.
#[derive(Debug, Clone)]
pub struct UserFile {
    by_username: Arc<HashMap<String, UserRecord>>,
    hasher: HashingService,
    /// Verified against for unknown usernames, so they cost as much as a wrong password.
    decoy: PasswordHash,
}

impl UserFile {
    pub fn from_records(
        records: Vec<UserRecord>,
        hasher: HashingService,
    ) -> Result<Self, UserFileError> {
        let mut by_username = HashMap::with_capacity(records.len());
        for record in records {
            if by_username.contains_key(&record.username) {
                return Err(UserFileError::DuplicateUsername(record.username));
            }
            by_username.insert(record.username.clone(), record);
        }

        let decoy = hasher.hash(&Password(String::new()))?;

        Ok(Self {
            by_username: Arc::new(by_username),
            hasher,
            decoy,
        })
    }

    pub fn from_json(json: &str, hasher: HashingService) -> Result<Self, UserFileError> {
        let records: Vec<UserRecord> = serde_json::from_str(json)?;
        Self::from_records(records, hasher)
    }

    pub fn load(path: impl AsRef<Path>, hasher: HashingService) -> Result<Self, UserFileError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents, hasher)
    }

    pub fn len(&self) -> usize {
        self.by_username.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_username.is_empty()
    }
}

#[async_trait]
impl AuthenticatorBackend for UserFile {
    type Profile = serde_json::Value;

    #[tracing::instrument(skip(self, password))]
    async fn authenticate(&self, username: &str, password: &Password) -> Result<UserId, AuthError> {
        let record = self.by_username.get(username).cloned();
        let hash = match &record {
            Some(record) => record.password_hash.clone(),
            None => self.decoy.clone(),
        };

        let hasher = self.hasher.clone();
        let password = password.clone();

        // argon2 blocks for tens of milliseconds
        let verified = tokio::task::spawn_blocking(move || hasher.verify(&password, &hash))
            .await
            .map_err(|e| AuthError::BackendUnavailable(e.to_string()))?;

        match (record, verified) {
            (None, _) => {
                event!(Level::DEBUG, "Unknown username");
                Err(AuthError::InvalidCredentials)
            }
            (Some(record), Ok(true)) => Ok(record.id),
            (Some(_), Ok(false)) => Err(AuthError::InvalidCredentials),
            (Some(_), Err(e)) => {
                event!(Level::WARN, error = %e, "Stored password hash is unusable");
                Err(AuthError::InvalidCredentials)
            }
        }
    }

    async fn get_user_by_id(&self, id: &UserId) -> Result<Self::Profile, AuthError> {
        self.by_username
            .values()
            .find(|record| &record.id == id)
            .map(|record| record.profile.clone())
            .ok_or(AuthError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory() -> UserFile {
        let hasher = HashingService::with_secret_key("pepper".into());
        let hash = hasher.hash(&Password("pw".into())).unwrap();
        let records = vec![UserRecord {
            id: UserId("u42".into()),
            username: "alice".into(),
            password_hash: hash,
            profile: serde_json::json!({ "name": "Alice" }),
        }];
        UserFile::from_records(records, hasher).unwrap()
    }

    #[tokio::test]
    async fn authenticates_known_users() {
        let users = directory();

        let id = users
            .authenticate("alice", &Password("pw".into()))
            .await
            .unwrap();
        assert_eq!(id, UserId("u42".into()));

        assert_eq!(
            users.authenticate("alice", &Password("wrong".into())).await,
            Err(AuthError::InvalidCredentials)
        );
        assert_eq!(
            users.authenticate("bob", &Password("pw".into())).await,
            Err(AuthError::InvalidCredentials)
        );
    }

    #[tokio::test]
    async fn unknown_usernames_never_authenticate() {
        let users = directory();

        for password in ["", "pw"] {
            assert_eq!(
                users.authenticate("mallory", &Password(password.into())).await,
                Err(AuthError::InvalidCredentials)
            );
        }
        assert!(users.hasher.verify(&Password(String::new()), &users.decoy).unwrap());
    }

    #[tokio::test]
    async fn publishes_only_the_profile() {
        let users = directory();

        let profile = users.get_user_by_id(&UserId("u42".into())).await.unwrap();
        assert_eq!(profile, serde_json::json!({ "name": "Alice" }));

        assert_eq!(
            users.get_user_by_id(&UserId("nobody".into())).await,
            Err(AuthError::NotFound)
        );
    }

    #[test]
    fn rejects_duplicate_usernames() {
        let json = r#"[
            { "id": "1", "username": "alice", "password_hash": "x" },
            { "id": "2", "username": "alice", "password_hash": "y" }
        ]"#;
        let result = UserFile::from_json(json, HashingService::with_secret_key("k".into()));
        assert!(matches!(result, Err(UserFileError::DuplicateUsername(name)) if name == "alice"));
    }
}
