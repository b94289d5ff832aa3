use crate::auth::{InfoQuery, InfoRequest, InfoResponse};
use crate::core::types::{unix_now, AccessToken, Expire, UserId};
use crate::db::StorageError;
use crate::provider::error::Error;

use super::OAuth2Provider;

use tracing::{event, Level};

impl OAuth2Provider {
    /// Looks up the access token presented as a bearer header or, failing
    /// that, as the `access_token` or `code` query parameter.
    #[tracing::instrument(skip_all)]
    pub async fn handle_info(
        &self,
        bearer: Option<String>,
        query: InfoQuery,
    ) -> Result<InfoRequest, Error> {
        let token = bearer
            .into_iter()
            .chain(query.access_token)
            .chain(query.code)
            .find(|t| !t.is_empty())
            .map(AccessToken)
            .ok_or(Error::InvalidRequest("no access token presented"))?;

        let access = match self.store.load_access(&token).await {
            Ok(access) => access,
            Err(StorageError::NotFound) => return Err(Error::InvalidRequest("unknown access token")),
            Err(e) => return Err(e.into()),
        };

        if access.is_expired_at(unix_now()) {
            event!(Level::DEBUG, client_id = ?access.client_id, "Presented an expired token");
            return Err(Error::InvalidGrant("access token expired"));
        }

        Ok(InfoRequest { access })
    }

    pub fn finish_info(&self, req: &InfoRequest) -> InfoResponse {
        let access = &req.access;
        InfoResponse {
            access_token: access.access_token.clone(),
            token_type: self.token.token_type().to_string(),
            client_id: access.client_id.clone(),
            expires_in: access.remaining_at(unix_now()),
            scope: access.scope.clone(),
            user_data: access
                .user_data
                .as_ref()
                .and_then(|u| u.as_str())
                .map(ToString::to_string),
        }
    }

    /// The user an access token was issued to, for `/userinfo`.
    pub fn token_user(&self, req: &InfoRequest) -> Result<UserId, Error> {
        req.access
            .user_data
            .as_ref()
            .and_then(|u| u.to_user_id())
            .filter(|id| !id.is_empty())
            .ok_or(Error::InvalidRequest("access token carries no user"))
    }
}
