use crate::auth::{
    pkce, AccessRequest, AccessTokenResponse, ClientCredentials, Grant, TokenForm,
};
use crate::core::models::{AccessData, AuthorizeData, Client};
use crate::core::types::{
    unix_now, AuthCode, Expire, GrantType, Password, RedirectUri, RefreshToken, Scope,
};
use crate::db::StorageError;
use crate::provider::error::Error;
use crate::provider::token::AccessGrant;

use super::OAuth2Provider;

use tracing::{event, Level};

fn required<'a>(value: &'a Option<String>, what: &'static str) -> Result<&'a str, Error> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or(Error::InvalidRequest(what))
}

impl OAuth2Provider {
    /// Authenticates the client and loads and checks the grant of a token
    /// request. Resource owner credentials and assertions are left to the
    /// caller, which completes the request with [`OAuth2Provider::finish_access`].
    #[tracing::instrument(skip_all, fields(grant_type = ?form.grant_type))]
    pub async fn handle_access(
        &self,
        form: TokenForm,
        credentials: Option<ClientCredentials>,
        is_get: bool,
    ) -> Result<AccessRequest, Error> {
        event!(Level::TRACE, "Handling access token request");

        if is_get && !self.config.allow_get_access_request {
            return Err(Error::InvalidRequest("token requests must be POSTed"));
        }

        let grant_type = required(&form.grant_type, "grant_type is required")?
            .parse::<GrantType>()
            .map_err(|_| Error::UnsupportedGrantType)?;
        if !self.config.allows_grant_type(grant_type) {
            return Err(Error::UnsupportedGrantType);
        }

        let credentials = self.resolve_credentials(credentials, &form)?;
        let client = self.check_client_authentication(&credentials).await?;
        let requested_scope = Scope::parse(form.scope.as_deref().unwrap_or_default())
            .ok_or(Error::InvalidScope)?;

        let request = match grant_type {
            GrantType::AuthorizationCode => {
                let data = self.load_code_grant(&client, &form).await?;
                AccessRequest {
                    scope: data.scope.clone(),
                    redirect_uri: Some(data.redirect_uri.clone()),
                    user_data: data.user_data.clone(),
                    grant: Grant::AuthorizationCode(data),
                    client,
                }
            }
            GrantType::RefreshToken => {
                let token = RefreshToken(required(&form.refresh_token, "refresh_token is required")?.to_string());
                let previous = match self.store.load_refresh(&token).await {
                    Ok(previous) => previous,
                    Err(StorageError::NotFound) => return Err(Error::InvalidGrant("unknown refresh token")),
                    Err(e) => return Err(e.into()),
                };

                if previous.client_id != client.id {
                    event!(
                        Level::WARN,
                        original_client_id = ?previous.client_id,
                        refresh_client_id = ?client.id,
                        "client_ids do not match"
                    );
                    return Err(Error::InvalidGrant("refresh token belongs to another client"));
                }

                if self
                    .refresh_cutoff(unix_now())
                    .map_or(false, |cutoff| previous.created_at < cutoff)
                {
                    event!(Level::DEBUG, "Presented an expired refresh token");
                    return Err(Error::InvalidGrant("refresh token expired"));
                }

                let scope = if requested_scope.is_empty() {
                    previous.scope.clone()
                } else if previous.scope.contains_all(&requested_scope) {
                    requested_scope
                } else {
                    return Err(Error::InvalidGrant("scope exceeds the original grant"));
                };

                AccessRequest {
                    scope,
                    redirect_uri: previous.redirect_uri.clone(),
                    user_data: previous.user_data.clone(),
                    grant: Grant::RefreshToken(previous),
                    client,
                }
            }
            GrantType::Password => {
                let username = required(&form.username, "username is required")?.to_string();
                let password = Password(required(&form.password, "password is required")?.to_string());
                AccessRequest {
                    grant: Grant::Password { username, password },
                    client,
                    scope: requested_scope,
                    redirect_uri: None,
                    user_data: None,
                }
            }
            GrantType::ClientCredentials => AccessRequest {
                grant: Grant::ClientCredentials,
                client,
                scope: requested_scope,
                redirect_uri: None,
                user_data: None,
            },
            GrantType::Assertion => {
                let assertion_type = required(&form.assertion_type, "assertion_type is required")?.to_string();
                let assertion = required(&form.assertion, "assertion is required")?.to_string();
                AccessRequest {
                    grant: Grant::Assertion {
                        assertion_type,
                        assertion,
                    },
                    client,
                    scope: requested_scope,
                    redirect_uri: None,
                    user_data: None,
                }
            }
        };

        event!(Level::DEBUG, client_id = ?request.client.id, "Admitted access token request");
        Ok(request)
    }

    async fn load_code_grant(&self, client: &Client, form: &TokenForm) -> Result<AuthorizeData, Error> {
        let code = AuthCode(required(&form.code, "code is required")?.to_string());

        let data = match self.store.load_authorize(&code).await {
            Ok(data) => data,
            Err(StorageError::NotFound) => return Err(Error::InvalidGrant("unknown code")),
            Err(e) => return Err(e.into()),
        };

        if data.client_id != client.id {
            event!(Level::WARN, code_client_id = ?data.client_id, "Code presented by another client");
            return Err(Error::InvalidGrant("code belongs to another client"));
        }

        if data.is_expired_at(unix_now()) {
            self.store.remove_authorize(&code).await?;
            return Err(Error::InvalidGrant("code expired"));
        }

        let presented = match form.redirect_uri.as_deref().filter(|uri| !uri.is_empty()) {
            Some(uri) => RedirectUri(uri.to_string()),
            None => self.validate_redirect(client, None)?,
        };
        if presented != data.redirect_uri {
            return Err(Error::InvalidGrant("redirect_uri differs from the authorization request"));
        }

        // the client may have been re-registered since the code was issued
        self.validate_redirect(client, Some(data.redirect_uri.as_ref()))?;

        if let Some(challenge) = &data.pkce_challenge {
            event!(Level::DEBUG, "Verifying PKCE challenge");
            let verifier = pkce::Verifier {
                value: required(&form.code_verifier, "code_verifier is required")
                    .map_err(|_| Error::InvalidGrant("code_verifier is required"))?
                    .to_string(),
            };
            if !challenge.verify(&verifier) {
                return Err(Error::InvalidGrant("code_verifier does not match"));
            }
        }

        Ok(data)
    }

    /// Mints and persists the tokens for an admitted request.
    #[tracing::instrument(skip_all, fields(client_id = ?req.client.id, grant_type = req.grant.grant_type().as_str()))]
    pub async fn finish_access(
        &self,
        req: AccessRequest,
        authorized: bool,
    ) -> Result<AccessTokenResponse, Error> {
        if !authorized {
            event!(Level::DEBUG, "Access token request not authorized");
            return Err(Error::AccessDenied);
        }

        let refreshable = matches!(
            req.grant,
            Grant::AuthorizationCode(_) | Grant::RefreshToken(_) | Grant::Password { .. }
        );
        let with_refresh = refreshable && self.config.allows_grant_type(GrantType::RefreshToken);

        let (authorize_code, previous_access) = match &req.grant {
            Grant::AuthorizationCode(data) => (Some(data.code.clone()), None),
            Grant::RefreshToken(previous) => (None, Some(previous.access_token.clone())),
            _ => (None, None),
        };

        let access: AccessData = self.token.new_access(
            AccessGrant {
                client_id: req.client.id.clone(),
                scope: req.scope.clone(),
                redirect_uri: req.redirect_uri.clone(),
                user_data: req.user_data.clone(),
                authorize_code,
                previous_access,
                with_refresh,
            },
            unix_now(),
        );

        let persisted = match &req.grant {
            Grant::AuthorizationCode(data) => self.store.exchange_authorize(&data.code, &access).await,
            Grant::RefreshToken(previous) => match &previous.refresh_token {
                Some(token) => self.store.exchange_refresh(token, &access).await,
                None => Err(StorageError::NotFound),
            },
            _ => self.store.save_access(&access).await,
        };

        match persisted {
            Ok(()) => {}
            Err(StorageError::NotFound) => {
                event!(Level::WARN, "Grant was consumed concurrently");
                return Err(Error::InvalidGrant("grant already used"));
            }
            Err(e) => return Err(e.into()),
        }

        Ok(self.token.response(&access))
    }
}
