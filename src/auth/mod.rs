use crate::core::types::{ClientId, ClientSecret, RedirectUri};

pub mod access_token;
pub mod authorization;
pub mod error;
pub mod info;
pub mod pkce;

pub use access_token::*;
pub use authorization::*;
pub use error::{ErrorKind, ErrorResponse};
pub use info::*;

#[derive(Debug)]
pub enum MaybeRedirect<R, D> {
    Redirected(Redirect<R>),
    Direct(D),
}

#[derive(Debug, Clone)]
#[derive(serde::Serialize)]
pub struct WithState<T> {
    #[serde(flatten)]
    pub inner: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

impl<T> From<(T, Option<String>)> for WithState<T> {
    fn from((t, state): (T, Option<String>)) -> Self {
        Self { inner: t, state }
    }
}

/// Where redirect parameters travel: the query for code responses, the
/// fragment for implicit grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectMode {
    Query,
    Fragment,
}

#[derive(Debug, Clone)]
pub struct Redirect<T> {
    pub uri: RedirectUri,
    pub mode: RedirectMode,
    pub params: T,
}

impl<T> Redirect<T> {
    pub fn new(uri: RedirectUri, params: T) -> Self {
        Redirect {
            uri,
            mode: RedirectMode::Query,
            params,
        }
    }

    pub fn with_mode(uri: RedirectUri, mode: RedirectMode, params: T) -> Self {
        Redirect { uri, mode, params }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClientCredentials {
    pub client_id: ClientId,
    pub client_secret: ClientSecret,
}
