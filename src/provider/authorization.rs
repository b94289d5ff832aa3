use crate::auth::{
    pkce, AccessTokenResponse, Authorization, AuthorizationCodeResponse, AuthorizationError,
    AuthorizationQuery, AuthorizationResponse, AuthorizeRequest, ErrorKind, ErrorResponse,
    Redirect, RedirectMode, WithState,
};
use crate::core::types::{unix_now, ClientId, ResponseType, Scope};
use crate::db::StorageError;
use crate::provider::error::{Error, ResultExt};
use crate::provider::token::AccessGrant;

use tracing::{event, Level};

use super::OAuth2Provider;

fn redirect_mode(response_type: Option<&str>) -> RedirectMode {
    match response_type {
        Some("token") => RedirectMode::Fragment,
        _ => RedirectMode::Query,
    }
}

impl OAuth2Provider {
    /// Admits an authorization request. Until the redirect URI is known to
    /// belong to the client, failures are answered directly; afterwards they
    /// are sent back to the client through the redirect.
    #[tracing::instrument(skip_all, fields(client_id = ?query.client_id))]
    pub async fn handle_authorize(
        &self,
        query: AuthorizationQuery,
    ) -> Result<AuthorizeRequest, AuthorizationError> {
        event!(Level::TRACE, "Handling authorization request");

        let client_id = query
            .client_id
            .clone()
            .filter(|id| !id.is_empty())
            .ok_or(Error::UnauthorizedClient)
            .without_redirect::<WithState<ErrorResponse>>()?;

        let client = match self.store.get_client(&ClientId(client_id)).await {
            Ok(client) => Ok(client),
            Err(StorageError::NotFound) => Err(Error::UnauthorizedClient),
            Err(e) => Err(e.into()),
        }
        .without_redirect::<WithState<ErrorResponse>>()?;

        let redirect_uri = self
            .validate_redirect(&client, query.redirect_uri.as_deref())
            .without_redirect::<WithState<ErrorResponse>>()?;

        let state = query.state.clone();
        let mode = redirect_mode(query.response_type.as_deref());

        let (response_type, scope, pkce_challenge) = self
            .check_authorize_parameters(&query)
            .map_err(|e| {
                event!(Level::DEBUG, error = %e, "Rejecting authorization request");
                ErrorResponse::from(e)
            })
            .add_state_context(&state)
            .add_redirect_context::<Error>(redirect_uri.clone(), mode)?;

        event!(
            Level::DEBUG,
            response_type = response_type.as_str(),
            pkce = pkce_challenge.is_some(),
            "Admitted authorization request"
        );

        Ok(AuthorizeRequest {
            response_type,
            client,
            redirect_uri,
            scope,
            state,
            pkce_challenge,
            query,
        })
    }

    fn check_authorize_parameters(
        &self,
        query: &AuthorizationQuery,
    ) -> Result<(ResponseType, Scope, Option<pkce::Challenge>), Error> {
        let response_type = query
            .response_type
            .as_deref()
            .and_then(|t| t.parse::<ResponseType>().ok())
            .filter(|t| self.config.allows_response_type(*t))
            .ok_or(Error::UnsupportedResponseType)?;

        let pkce_challenge = match (response_type, query.code_challenge.as_deref()) {
            (ResponseType::Code, Some(code)) if !code.is_empty() => {
                let method = match query.code_challenge_method.as_deref() {
                    None | Some("") => pkce::Transformation::Plain,
                    Some(method) => method
                        .parse()
                        .map_err(|_| Error::InvalidRequest("unsupported code_challenge_method"))?,
                };
                Some(pkce::Challenge {
                    code: code.to_string(),
                    method,
                })
            }
            (ResponseType::Code, _) if self.config.require_pkce => {
                return Err(Error::InvalidRequest("code_challenge is required"));
            }
            _ => None,
        };

        let scope = Scope::parse(query.scope.as_deref().unwrap_or_default())
            .ok_or(Error::InvalidScope)?;

        Ok((response_type, scope, pkce_challenge))
    }

    /// Completes an admitted request with the resource owner's decision.
    #[tracing::instrument(skip_all, fields(client_id = ?req.client.id))]
    pub async fn finish_authorize(
        &self,
        req: AuthorizeRequest,
        authorization: Authorization,
    ) -> Result<Redirect<AuthorizationResponse>, Redirect<WithState<ErrorResponse>>> {
        let uri = req.redirect_uri.clone();
        let state = req.state.clone();
        let mode = match req.response_type {
            ResponseType::Code => RedirectMode::Query,
            ResponseType::Token => RedirectMode::Fragment,
        };
        let fail = |kind: ErrorKind| {
            Redirect::with_mode(
                uri.clone(),
                mode,
                WithState::from((ErrorResponse::from(kind), state.clone())),
            )
        };

        let user_data = match authorization {
            Authorization::Granted(user_data) => user_data,
            Authorization::Denied => {
                event!(Level::DEBUG, "Resource owner denied the request");
                return Err(fail(ErrorKind::AccessDenied));
            }
        };

        let now = unix_now();

        let response = match req.response_type {
            ResponseType::Code => {
                let data = self.token.new_code(&req, user_data, now);
                self.store.save_authorize(&data).await.map_err(|e| {
                    event!(Level::ERROR, error = %e, "Failed to persist authorization code");
                    fail(ErrorKind::ServerError)
                })?;

                AuthorizationResponse::AuthorizationCode(AuthorizationCodeResponse::new(
                    data.code,
                    state.clone(),
                ))
            }
            ResponseType::Token => {
                let access = self.token.new_access(
                    AccessGrant {
                        client_id: req.client.id.clone(),
                        scope: req.scope.clone(),
                        redirect_uri: Some(req.redirect_uri.clone()),
                        user_data: Some(user_data),
                        authorize_code: None,
                        previous_access: None,
                        with_refresh: false,
                    },
                    now,
                );
                self.store.save_access(&access).await.map_err(|e| {
                    event!(Level::ERROR, error = %e, "Failed to persist implicit grant");
                    fail(ErrorKind::ServerError)
                })?;

                let mut response: AccessTokenResponse = self.token.response(&access);
                response.scope = Some(access.scope);
                AuthorizationResponse::Implicit(WithState::from((response, state.clone())))
            }
        };

        Ok(response).redirect_ok(uri, mode)
    }
}
