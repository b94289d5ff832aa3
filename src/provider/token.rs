use tracing::{event, Level};

use crate::auth::{AccessTokenResponse, AuthorizeRequest};
use crate::config::ServerConfig;
use crate::core::models::{AccessData, AuthorizeData};
use crate::core::types::{AccessToken, AuthCode, ClientId, RedirectUri, RefreshToken, Scope, UserData};
use crate::util::random::FromRandom;

/// Mints codes and tokens with the configured lifetimes.
#[derive(Debug, Clone)]
pub struct TokenService {
    token_type: String,
    access_token_lifetime: u64,
    authorize_code_lifetime: u64,
}

/// Everything a new access grant needs besides fresh tokens.
#[derive(Debug, Clone)]
pub struct AccessGrant {
    pub client_id: ClientId,
    pub scope: Scope,
    pub redirect_uri: Option<RedirectUri>,
    pub user_data: Option<UserData>,
    pub authorize_code: Option<AuthCode>,
    pub previous_access: Option<AccessToken>,
    pub with_refresh: bool,
}

impl TokenService {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            token_type: config.token_type.clone(),
            access_token_lifetime: config.access_token_lifetime,
            authorize_code_lifetime: config.authorize_code_lifetime,
        }
    }

    pub fn token_type(&self) -> &str {
        &self.token_type
    }

    #[tracing::instrument(skip_all, fields(client_id = ?req.client.id))]
    pub fn new_code(&self, req: &AuthorizeRequest, user_data: UserData, now: i64) -> AuthorizeData {
        event!(Level::DEBUG, "Issuing authorization code");
        AuthorizeData {
            code: AuthCode::from_random(),
            client_id: req.client.id.clone(),
            scope: req.scope.clone(),
            redirect_uri: req.redirect_uri.clone(),
            state: req.state.clone(),
            expires_in: self.authorize_code_lifetime,
            created_at: now,
            user_data: Some(user_data),
            pkce_challenge: req.pkce_challenge.clone(),
        }
    }

    #[tracing::instrument(skip_all, fields(client_id = ?grant.client_id, refresh = grant.with_refresh))]
    pub fn new_access(&self, grant: AccessGrant, now: i64) -> AccessData {
        event!(Level::DEBUG, "Issuing access token");
        AccessData {
            access_token: AccessToken::from_random(),
            refresh_token: grant.with_refresh.then(RefreshToken::from_random),
            client_id: grant.client_id,
            scope: grant.scope,
            redirect_uri: grant.redirect_uri,
            expires_in: self.access_token_lifetime,
            created_at: now,
            user_data: grant.user_data,
            authorize_code: grant.authorize_code,
            previous_access: grant.previous_access,
        }
    }

    pub fn response(&self, access: &AccessData) -> AccessTokenResponse {
        AccessTokenResponse {
            access_token: access.access_token.clone(),
            token_type: self.token_type.clone(),
            expires_in: access.expires_in,
            refresh_token: access.refresh_token.clone(),
            scope: (!access.scope.is_empty()).then(|| access.scope.clone()),
        }
    }
}
