use std::path::PathBuf;
use std::time::Duration;

use crate::core::types::{GrantType, ResponseType};

/// How a requested redirect URI is compared with the registered ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectMatch {
    /// The URIs must be identical.
    Exact,
    /// Same scheme, host and port; the requested path must extend the
    /// registered one at a segment boundary.
    Prefix,
}

impl std::str::FromStr for RedirectMatch {
    type Err = crate::core::types::UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exact" => Ok(Self::Exact),
            "prefix" => Ok(Self::Prefix),
            other => Err(crate::core::types::UnknownVariant(other.to_string())),
        }
    }
}

/// Protocol settings shared by every request. Immutable once the server starts.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub access_token_lifetime: u64,
    pub authorize_code_lifetime: u64,
    pub allowed_authorize_types: Vec<ResponseType>,
    pub allowed_access_types: Vec<GrantType>,
    pub error_status_code: u16,
    pub allow_client_secret_in_params: bool,
    pub allow_get_access_request: bool,
    pub require_pkce: bool,
    pub token_type: String,
    pub template_path: PathBuf,
    pub schema_prefix: String,
    pub redirect_uri_separator: Option<String>,
    pub redirect_match: RedirectMatch,
    pub clean_up_interval: Duration,
    /// Seconds a refresh token stays usable after the access data it belongs
    /// to was issued. `None` keeps it until it is exchanged.
    pub refresh_token_lifetime: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            access_token_lifetime: 3600,
            authorize_code_lifetime: 600,
            allowed_authorize_types: vec![ResponseType::Code, ResponseType::Token],
            allowed_access_types: vec![
                GrantType::AuthorizationCode,
                GrantType::RefreshToken,
                GrantType::Password,
                GrantType::ClientCredentials,
            ],
            error_status_code: 400,
            allow_client_secret_in_params: false,
            allow_get_access_request: false,
            require_pkce: false,
            token_type: "Bearer".to_string(),
            template_path: PathBuf::from("templates"),
            schema_prefix: "kagi_".to_string(),
            redirect_uri_separator: None,
            redirect_match: RedirectMatch::Exact,
            clean_up_interval: Duration::from_secs(60),
            refresh_token_lifetime: Some(14 * 24 * 3600),
        }
    }
}

impl ServerConfig {
    pub fn allows_response_type(&self, response_type: ResponseType) -> bool {
        self.allowed_authorize_types.contains(&response_type)
    }

    pub fn allows_grant_type(&self, grant_type: GrantType) -> bool {
        self.allowed_access_types.contains(&grant_type)
    }
}
