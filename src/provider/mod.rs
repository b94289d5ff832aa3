use std::sync::Arc;

use tracing::{event, Level};

use crate::auth::{ClientCredentials, TokenForm};
use crate::config::{RedirectMatch, ServerConfig};
use crate::core::models::Client;
use crate::core::types::{unix_now, ClientId, ClientSecret, RedirectUri};
use crate::db::{StorageError, Store};

use self::error::Error;
use self::token::TokenService;

pub mod access_token;
pub mod authorization;
pub mod error;
pub mod info;
pub mod token;

/// The OAuth 2.0 state machine. Each endpoint is a `handle_*` step that
/// validates the request and a `finish_*` step that mints and persists.
pub struct OAuth2Provider {
    store: Arc<dyn Store>,
    config: ServerConfig,
    token: TokenService,
}

impl std::fmt::Debug for OAuth2Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuth2Provider")
            .field("config", &self.config)
            .finish()
    }
}

impl OAuth2Provider {
    pub fn new(store: Arc<dyn Store>, config: ServerConfig) -> Self {
        let token = TokenService::from_config(&config);
        Self {
            store,
            config,
            token,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    #[tracing::instrument(skip(self, secret))]
    pub async fn create_client(
        &self,
        id: &str,
        secret: &str,
        redirect_uri: &str,
    ) -> Result<Client, Error> {
        if id.is_empty() {
            return Err(Error::InvalidRequest("client id is empty"));
        }

        let client = Client::new(
            ClientId(id.to_string()),
            ClientSecret(secret.to_string()),
            redirect_uri.to_string(),
        );

        let uris = self.registered_uris(&client);
        if uris.is_empty() || uris.iter().any(|uri| parse_redirect(uri).is_err()) {
            return Err(Error::InvalidRequest("redirect uri must be an absolute url"));
        }

        self.store.create_client(&client).await?;
        event!(Level::INFO, "Created client");
        Ok(client)
    }

    #[tracing::instrument(skip(self))]
    pub async fn remove_client(&self, id: &str) -> Result<(), Error> {
        self.store.remove_client(&ClientId(id.to_string())).await?;
        event!(Level::INFO, "Removed client");
        Ok(())
    }

    fn registered_uris<'c>(&self, client: &'c Client) -> Vec<&'c str> {
        let uris: Vec<&str> = match &self.config.redirect_uri_separator {
            Some(separator) if !separator.is_empty() => {
                client.redirect_uri.split(separator.as_str()).collect()
            }
            _ => vec![client.redirect_uri.as_str()],
        };

        uris.into_iter()
            .map(str::trim)
            .filter(|uri| !uri.is_empty())
            .collect()
    }

    /// Resolves the redirect URI of a request against the client's
    /// registrations. An absent URI means the first registered one.
    pub fn validate_redirect(
        &self,
        client: &Client,
        requested: Option<&str>,
    ) -> Result<RedirectUri, Error> {
        let registered = self.registered_uris(client);

        let requested = match requested.filter(|uri| !uri.is_empty()) {
            Some(uri) => uri,
            None => registered
                .first()
                .copied()
                .ok_or(Error::InvalidRequest("client has no redirect uri"))?,
        };

        let parsed = parse_redirect(requested)?;

        let matched = registered.iter().any(|uri| match self.config.redirect_match {
            RedirectMatch::Exact => *uri == requested,
            RedirectMatch::Prefix => match parse_redirect(uri) {
                Ok(base) => extends(&base, &parsed),
                Err(_) => false,
            },
        });

        if matched {
            Ok(RedirectUri(requested.to_string()))
        } else {
            Err(Error::InvalidRequest("redirect uri is not registered"))
        }
    }

    /// Picks the client credentials of a token request. The Basic header
    /// wins; body credentials are only honoured when the configuration
    /// allows them, and must agree with the header when both are present.
    pub fn resolve_credentials(
        &self,
        header: Option<ClientCredentials>,
        form: &TokenForm,
    ) -> Result<ClientCredentials, Error> {
        let body = form
            .client_id
            .as_ref()
            .filter(|id| !id.is_empty())
            .map(|id| ClientCredentials {
                client_id: ClientId(id.clone()),
                client_secret: ClientSecret(form.client_secret.clone().unwrap_or_default()),
            });

        match (header, body) {
            (Some(header), Some(body)) => {
                let secret_conflicts = form.client_secret.is_some()
                    && !header.client_secret.matches(&body.client_secret);
                if header.client_id != body.client_id || secret_conflicts {
                    return Err(Error::InvalidRequest("conflicting client credentials"));
                }
                Ok(header)
            }
            (Some(header), None) => Ok(header),
            (None, Some(body)) if self.config.allow_client_secret_in_params => Ok(body),
            _ => Err(Error::InvalidClient),
        }
    }

    #[tracing::instrument(skip_all, fields(client_id = ?cred.client_id))]
    async fn check_client_authentication(&self, cred: &ClientCredentials) -> Result<Client, Error> {
        let client = match self.store.get_client(&cred.client_id).await {
            Ok(client) => client,
            Err(StorageError::NotFound) => {
                event!(Level::DEBUG, "Unknown client");
                return Err(Error::InvalidClient);
            }
            Err(e) => return Err(e.into()),
        };

        if client.secret.matches(&cred.client_secret) {
            Ok(client)
        } else {
            event!(Level::DEBUG, "Client secret mismatch");
            Err(Error::InvalidClient)
        }
    }

    /// Removes expired codes and tokens once.
    pub async fn clean_up(&self) -> Result<u64, Error> {
        let now = unix_now();
        let refresh_cutoff = self.refresh_cutoff(now);
        Ok(self.store.clean_up(now, refresh_cutoff).await?)
    }

    /// Access data created before this instant no longer honours its refresh token.
    pub(crate) fn refresh_cutoff(&self, now: i64) -> Option<i64> {
        self.config
            .refresh_token_lifetime
            .map(|lifetime| now.saturating_sub(i64::try_from(lifetime).unwrap_or(i64::MAX)))
    }

    /// Sweeps expired grants every `clean_up_interval` until the task is dropped.
    pub async fn clean_up_worker(&self) {
        let mut interval = tokio::time::interval(self.config.clean_up_interval);

        loop {
            interval.tick().await;
            match self.clean_up().await {
                Ok(0) => {}
                Ok(removed) => event!(Level::DEBUG, removed, "Swept expired grants"),
                Err(e) => event!(Level::WARN, error = %e, "Failed to sweep expired grants"),
            }
        }
    }
}

fn parse_redirect(uri: &str) -> Result<url::Url, Error> {
    let parsed =
        url::Url::parse(uri).map_err(|_| Error::InvalidRequest("redirect uri is not a url"))?;

    if parsed.cannot_be_a_base() || parsed.fragment().is_some() {
        return Err(Error::InvalidRequest("redirect uri must be absolute without fragment"));
    }

    Ok(parsed)
}

/// Same origin, and `requested`'s path continues `base`'s at a segment boundary.
fn extends(base: &url::Url, requested: &url::Url) -> bool {
    if base.scheme() != requested.scheme()
        || base.host_str() != requested.host_str()
        || base.port_or_known_default() != requested.port_or_known_default()
    {
        return false;
    }

    let base_path = base.path();
    let path = requested.path();

    match path.strip_prefix(base_path) {
        Some("") => true,
        Some(rest) => base_path.ends_with('/') || rest.starts_with('/'),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;

    fn provider(config: ServerConfig) -> OAuth2Provider {
        OAuth2Provider::new(Arc::new(MemoryStore::new()), config)
    }

    fn client(redirect_uri: &str) -> Client {
        Client::new(
            ClientId("c1".into()),
            ClientSecret("s1".into()),
            redirect_uri.into(),
        )
    }

    fn credentials(id: &str, secret: &str) -> ClientCredentials {
        ClientCredentials {
            client_id: ClientId(id.into()),
            client_secret: ClientSecret(secret.into()),
        }
    }

    #[test]
    fn exact_redirect_matching() {
        let provider = provider(ServerConfig::default());
        let client = client("https://app/cb");

        assert_eq!(
            provider.validate_redirect(&client, None).unwrap(),
            RedirectUri("https://app/cb".into())
        );
        assert!(provider
            .validate_redirect(&client, Some("https://app/cb"))
            .is_ok());
        assert!(matches!(
            provider.validate_redirect(&client, Some("https://evil/cb")),
            Err(Error::InvalidRequest(_))
        ));
        assert!(provider
            .validate_redirect(&client, Some("https://app/cb/more"))
            .is_err());
    }

    #[test]
    fn prefix_redirect_matching_respects_segments() {
        let provider = provider(ServerConfig {
            redirect_match: RedirectMatch::Prefix,
            ..ServerConfig::default()
        });
        let client = client("https://app/cb");

        assert!(provider
            .validate_redirect(&client, Some("https://app/cb/more?x=1"))
            .is_ok());
        assert!(provider
            .validate_redirect(&client, Some("https://app/cbx"))
            .is_err());
        assert!(provider
            .validate_redirect(&client, Some("http://app/cb"))
            .is_err());
        assert!(provider
            .validate_redirect(&client, Some("https://app/cb#frag"))
            .is_err());
    }

    #[test]
    fn several_registered_uris() {
        let provider = provider(ServerConfig {
            redirect_uri_separator: Some(" ".into()),
            ..ServerConfig::default()
        });
        let client = client("https://app/cb https://app/alt");

        assert_eq!(
            provider.validate_redirect(&client, None).unwrap(),
            RedirectUri("https://app/cb".into())
        );
        assert!(provider
            .validate_redirect(&client, Some("https://app/alt"))
            .is_ok());
    }

    #[test]
    fn header_credentials_win_but_must_agree() {
        let provider = provider(ServerConfig {
            allow_client_secret_in_params: true,
            ..ServerConfig::default()
        });

        let form = TokenForm {
            client_id: Some("c1".into()),
            ..TokenForm::default()
        };
        let resolved = provider
            .resolve_credentials(Some(credentials("c1", "s1")), &form)
            .unwrap();
        assert_eq!(resolved, credentials("c1", "s1"));

        let form = TokenForm {
            client_id: Some("c2".into()),
            client_secret: Some("s2".into()),
            ..TokenForm::default()
        };
        assert!(matches!(
            provider.resolve_credentials(Some(credentials("c1", "s1")), &form),
            Err(Error::InvalidRequest(_))
        ));
        assert_eq!(
            provider.resolve_credentials(None, &form).unwrap(),
            credentials("c2", "s2")
        );
    }

    #[test]
    fn body_credentials_need_permission() {
        let provider = provider(ServerConfig::default());
        let form = TokenForm {
            client_id: Some("c1".into()),
            client_secret: Some("s1".into()),
            ..TokenForm::default()
        };

        assert!(matches!(
            provider.resolve_credentials(None, &form),
            Err(Error::InvalidClient)
        ));
        assert!(matches!(
            provider.resolve_credentials(None, &TokenForm::default()),
            Err(Error::InvalidClient)
        ));
    }

    #[tokio::test]
    async fn operator_client_management() {
        let provider = provider(ServerConfig::default());

        provider
            .create_client("c1", "s1", "https://app/cb")
            .await
            .unwrap();
        assert!(matches!(
            provider.create_client("c1", "s1", "https://app/cb").await,
            Err(Error::Storage(StorageError::AlreadyExists(_)))
        ));
        assert!(matches!(
            provider.create_client("c2", "s2", "not a url").await,
            Err(Error::InvalidRequest(_))
        ));

        let client = provider
            .check_client_authentication(&credentials("c1", "s1"))
            .await
            .unwrap();
        assert_eq!(client.id, ClientId("c1".into()));
        assert!(matches!(
            provider
                .check_client_authentication(&credentials("c1", "nope"))
                .await,
            Err(Error::InvalidClient)
        ));

        provider.remove_client("c1").await.unwrap();
        provider.remove_client("c1").await.unwrap();
        assert!(matches!(
            provider
                .check_client_authentication(&credentials("c1", "s1"))
                .await,
            Err(Error::InvalidClient)
        ));
    }
}
