use crate::auth::{pkce, AccessTokenResponse, ErrorResponse};
use crate::core::models::Client;
use crate::core::types::{AuthCode, RedirectUri, ResponseType, Scope, UserData};
use crate::provider::error::Error;

use super::{MaybeRedirect, WithState};

pub type AuthorizationError = MaybeRedirect<WithState<ErrorResponse>, Error>;

/// Parameters of an authorization request as they arrive on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct AuthorizationQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_challenge: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_challenge_method: Option<String>,
}

/// An authorization request admitted by the provider, awaiting the resource
/// owner's decision.
#[derive(Debug, Clone)]
pub struct AuthorizeRequest {
    pub response_type: ResponseType,
    pub client: Client,
    pub redirect_uri: RedirectUri,
    pub scope: Scope,
    pub state: Option<String>,
    pub pkce_challenge: Option<pkce::Challenge>,
    pub query: AuthorizationQuery,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authorization {
    Granted(UserData),
    Denied,
}

#[derive(Debug)]
#[derive(serde::Serialize)]
#[serde(untagged)]
pub enum AuthorizationResponse {
    AuthorizationCode(AuthorizationCodeResponse),
    Implicit(WithState<AccessTokenResponse>),
}

#[derive(Debug)]
#[derive(serde::Serialize)]
pub struct AuthorizationCodeResponse {
    pub code: AuthCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

impl AuthorizationCodeResponse {
    pub fn new(code: AuthCode, state: Option<String>) -> Self {
        Self { code, state }
    }
}
