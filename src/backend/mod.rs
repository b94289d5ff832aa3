//! Pluggable verification of resource owner credentials.

use async_trait::async_trait;
use thiserror::Error;

use crate::core::types::{Password, UserId};

pub mod users;

pub use users::UserFile;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("user not found")]
    NotFound,

    #[error("authenticator unavailable: {0}")]
    BackendUnavailable(String),
}

/// Maps credentials to user ids and user ids to the profile published on
/// `/userinfo`.
///
/// `Profile` is whatever projection the backend is willing to expose; the
/// provider serializes it verbatim and never looks inside.
#[async_trait]
pub trait AuthenticatorBackend: Send + Sync {
    type Profile: serde::Serialize + Send;

    async fn authenticate(&self, username: &str, password: &Password) -> Result<UserId, AuthError>;

    async fn get_user_by_id(&self, id: &UserId) -> Result<Self::Profile, AuthError>;

    async fn authenticate_assertion(
        &self,
        _assertion_type: &str,
        _assertion: &str,
    ) -> Result<UserId, AuthError> {
        Err(AuthError::InvalidCredentials)
    }
}

/// Runs `authenticate` and treats an empty user id as a rejection.
pub async fn verify_credentials<A>(
    backend: &A,
    username: &str,
    password: &Password,
) -> Result<UserId, AuthError>
where
    A: AuthenticatorBackend + ?Sized,
{
    match backend.authenticate(username, password).await? {
        id if id.is_empty() => Err(AuthError::InvalidCredentials),
        id => Ok(id),
    }
}

pub async fn verify_assertion<A>(
    backend: &A,
    assertion_type: &str,
    assertion: &str,
) -> Result<UserId, AuthError>
where
    A: AuthenticatorBackend + ?Sized,
{
    match backend
        .authenticate_assertion(assertion_type, assertion)
        .await?
    {
        id if id.is_empty() => Err(AuthError::InvalidCredentials),
        id => Ok(id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Blank;

    #[async_trait]
    impl AuthenticatorBackend for Blank {
        type Profile = ();

        async fn authenticate(&self, _: &str, _: &Password) -> Result<UserId, AuthError> {
            Ok(UserId(String::new()))
        }

        async fn get_user_by_id(&self, _: &UserId) -> Result<(), AuthError> {
            Err(AuthError::NotFound)
        }
    }

    #[tokio::test]
    async fn empty_user_id_is_rejected() {
        let result = verify_credentials(&Blank, "alice", &Password("pw".into())).await;
        assert_eq!(result, Err(AuthError::InvalidCredentials));
    }

    #[tokio::test]
    async fn assertions_are_refused_by_default() {
        let result = verify_assertion(&Blank, "urn:example", "blob").await;
        assert_eq!(result, Err(AuthError::InvalidCredentials));
    }
}
