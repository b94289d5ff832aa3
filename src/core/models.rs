use crate::auth::pkce;

use super::types::*;

#[derive(Debug, Clone, PartialEq)]
pub struct Client {
    pub id: ClientId,
    pub secret: ClientSecret,
    pub redirect_uri: String,
    pub user_data: Option<UserData>,
}

impl Client {
    pub fn new(id: ClientId, secret: ClientSecret, redirect_uri: String) -> Self {
        Self {
            id,
            secret,
            redirect_uri,
            user_data: None,
        }
    }
}

/// An issued authorization code waiting to be exchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthorizeData {
    pub code: AuthCode,
    pub client_id: ClientId,
    pub scope: Scope,
    pub redirect_uri: RedirectUri,
    pub state: Option<String>,
    pub expires_in: u64,
    pub created_at: i64,
    pub user_data: Option<UserData>,
    pub pkce_challenge: Option<pkce::Challenge>,
}

impl Expire for AuthorizeData {
    fn created_at(&self) -> i64 {
        self.created_at
    }

    fn expires_in(&self) -> u64 {
        self.expires_in
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AccessData {
    pub access_token: AccessToken,
    pub refresh_token: Option<RefreshToken>,
    pub client_id: ClientId,
    pub scope: Scope,
    pub redirect_uri: Option<RedirectUri>,
    pub expires_in: u64,
    pub created_at: i64,
    pub user_data: Option<UserData>,
    pub authorize_code: Option<AuthCode>,
    pub previous_access: Option<AccessToken>,
}

impl Expire for AccessData {
    fn created_at(&self) -> i64 {
        self.created_at
    }

    fn expires_in(&self) -> u64 {
        self.expires_in
    }
}
