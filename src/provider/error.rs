use thiserror::Error as ThisError;

use crate::auth::{ErrorKind, ErrorResponse, MaybeRedirect, Redirect, RedirectMode, WithState};
use crate::backend::AuthError;
use crate::core::types::RedirectUri;
use crate::db::StorageError;

/// Everything that can go wrong while the provider handles a request.
///
/// The `&'static str` payloads are internal detail for the logs; only the
/// [`ErrorKind`] ever reaches the client.
#[derive(Debug, ThisError)]
pub enum Error {
    #[error("invalid request: {0}")]
    InvalidRequest(&'static str),

    #[error("client is not authorized for this request")]
    UnauthorizedClient,

    #[error("unsupported response type")]
    UnsupportedResponseType,

    #[error("unsupported grant type")]
    UnsupportedGrantType,

    #[error("invalid scope")]
    InvalidScope,

    #[error("client authentication failed")]
    InvalidClient,

    #[error("invalid grant: {0}")]
    InvalidGrant(&'static str),

    #[error("access denied")]
    AccessDenied,

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Backend(#[from] AuthError),

    #[error("server error: {0}")]
    Server(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Self::UnauthorizedClient => ErrorKind::UnauthorizedClient,
            Self::UnsupportedResponseType => ErrorKind::UnsupportedResponseType,
            Self::UnsupportedGrantType => ErrorKind::UnsupportedGrantType,
            Self::InvalidScope => ErrorKind::InvalidScope,
            Self::InvalidClient => ErrorKind::InvalidClient,
            Self::InvalidGrant(_) => ErrorKind::InvalidGrant,
            Self::AccessDenied => ErrorKind::AccessDenied,
            Self::Backend(AuthError::BackendUnavailable(_)) => ErrorKind::TemporarilyUnavailable,
            Self::Backend(AuthError::InvalidCredentials | AuthError::NotFound) => {
                ErrorKind::AccessDenied
            }
            Self::Storage(_) | Self::Server(_) => ErrorKind::ServerError,
        }
    }

    /// HTTP status for a directly returned error. `default` is the configured
    /// `error_status_code`.
    pub fn status(&self, default: u16) -> u16 {
        status_for(self.kind(), default)
    }

    /// Whether the error comes from our side rather than from the request.
    pub fn is_internal(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::ServerError | ErrorKind::TemporarilyUnavailable
        )
    }
}

pub fn status_for(kind: ErrorKind, default: u16) -> u16 {
    match kind {
        ErrorKind::InvalidClient => 401,
        ErrorKind::ServerError => 500,
        ErrorKind::TemporarilyUnavailable => 503,
        _ => default,
    }
}

impl From<&Error> for ErrorResponse {
    fn from(e: &Error) -> Self {
        e.kind().into()
    }
}

impl From<Error> for ErrorResponse {
    fn from(e: Error) -> Self {
        (&e).into()
    }
}

pub trait ResultExt<T, E> {
    fn redirect_ok(self, uri: RedirectUri, mode: RedirectMode) -> Result<Redirect<T>, E>;
    fn without_redirect<R>(self) -> Result<T, MaybeRedirect<R, E>>;
    fn add_redirect_context<D>(
        self,
        uri: RedirectUri,
        mode: RedirectMode,
    ) -> Result<T, MaybeRedirect<E, D>>;
    fn add_state_context(self, state: &Option<String>) -> Result<T, WithState<E>>;
}

impl<T, E> ResultExt<T, E> for Result<T, E> {
    fn redirect_ok(self, uri: RedirectUri, mode: RedirectMode) -> Result<Redirect<T>, E> {
        self.map(|o| Redirect::with_mode(uri, mode, o))
    }

    fn without_redirect<R>(self) -> Result<T, MaybeRedirect<R, E>> {
        self.map_err(MaybeRedirect::Direct)
    }

    fn add_redirect_context<D>(
        self,
        uri: RedirectUri,
        mode: RedirectMode,
    ) -> Result<T, MaybeRedirect<E, D>> {
        self.map_err(|e| MaybeRedirect::Redirected(Redirect::with_mode(uri, mode, e)))
    }

    fn add_state_context(self, state: &Option<String>) -> Result<T, WithState<E>> {
        self.map_err(|e| WithState {
            state: state.clone(),
            inner: e,
        })
    }
}
