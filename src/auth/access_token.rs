use crate::core::models::{AccessData, AuthorizeData, Client};
use crate::core::types::{AccessToken, GrantType, Password, RedirectUri, RefreshToken, Scope, UserData};

/// Body of a token request. Which fields matter depends on `grant_type`.
#[derive(Debug, Clone, Default)]
#[derive(serde::Deserialize)]
pub struct TokenForm {
    pub grant_type: Option<String>,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub refresh_token: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub scope: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub code_verifier: Option<String>,
    pub assertion_type: Option<String>,
    pub assertion: Option<String>,
}

#[derive(Debug, Clone)]
pub enum Grant {
    AuthorizationCode(AuthorizeData),
    RefreshToken(AccessData),
    Password { username: String, password: Password },
    ClientCredentials,
    Assertion { assertion_type: String, assertion: String },
}

impl Grant {
    pub fn grant_type(&self) -> GrantType {
        match self {
            Self::AuthorizationCode(_) => GrantType::AuthorizationCode,
            Self::RefreshToken(_) => GrantType::RefreshToken,
            Self::Password { .. } => GrantType::Password,
            Self::ClientCredentials => GrantType::ClientCredentials,
            Self::Assertion { .. } => GrantType::Assertion,
        }
    }
}

/// A token request whose client has been authenticated and whose grant has
/// been loaded and checked.
#[derive(Debug, Clone)]
pub struct AccessRequest {
    pub grant: Grant,
    pub client: Client,
    pub scope: Scope,
    pub redirect_uri: Option<RedirectUri>,
    pub user_data: Option<UserData>,
}

#[derive(serde::Serialize, Debug, Clone)]
pub struct AccessTokenResponse {
    pub access_token: AccessToken,
    pub token_type: String,
    pub expires_in: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<RefreshToken>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<Scope>,
}
