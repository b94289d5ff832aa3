pub mod error;
pub mod reply;

use std::collections::HashMap;

use http_basic_auth::Credential as BasicCredentials;
use warp::{Filter, Rejection};

use crate::auth::ClientCredentials;
use crate::core::types::{ClientId, ClientSecret};
use crate::provider::error::Error;

/// Request parameters from the query string and a form body, the body
/// taking precedence when a name appears in both.
#[derive(Debug, Clone, Default)]
pub struct Params(HashMap<String, String>);

impl Params {
    pub fn from_parts(query: &str, body: &[u8]) -> Self {
        let pairs = form_urlencoded::parse(query.as_bytes()).chain(form_urlencoded::parse(body));
        Self(
            pairs
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect(),
        )
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn has(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T, Error> {
        let encoded = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.0.iter())
            .finish();
        serde_urlencoded::from_str(&encoded)
            .map_err(|_| Error::InvalidRequest("malformed request parameters"))
    }
}

pub fn params() -> impl Filter<Extract = (Params,), Error = Rejection> + Clone {
    warp::query::raw()
        .or(warp::any().map(String::new))
        .unify()
        .and(warp::body::bytes())
        .map(|query: String, body: warp::hyper::body::Bytes| Params::from_parts(&query, &body))
}

fn credentials_from(header: &str) -> Option<ClientCredentials> {
    let (scheme, _) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }

    let credentials = header.trim().parse::<BasicCredentials>().ok()?;
    Some(ClientCredentials {
        client_id: ClientId(credentials.user_id),
        client_secret: ClientSecret(credentials.password),
    })
}

/// Client credentials from an `Authorization: Basic` header, if any.
pub fn basic_credentials(
) -> impl Filter<Extract = (Option<ClientCredentials>,), Error = Rejection> + Clone {
    warp::header::optional::<String>("authorization")
        .map(|header: Option<String>| header.as_deref().and_then(credentials_from))
}

fn bearer_from(header: &str) -> Option<String> {
    let (scheme, token) = header.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then(|| token.to_string())
}

/// The token of an `Authorization: Bearer` header, if any.
pub fn bearer() -> impl Filter<Extract = (Option<String>,), Error = Rejection> + Clone {
    warp::header::optional::<String>("authorization")
        .map(|header: Option<String>| header.as_deref().and_then(bearer_from))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenForm;

    #[test]
    fn body_overrides_query() {
        let params = Params::from_parts("client_id=c1&state=a%20b", b"state=xyz&username=alice");
        assert_eq!(params.get("client_id"), Some("c1"));
        assert_eq!(params.get("state"), Some("xyz"));
        assert!(params.has("username"));
        assert!(!params.has("deny"));
    }

    #[test]
    fn decodes_into_forms() {
        let params = Params::from_parts("", b"grant_type=authorization_code&code=abc&redirect_uri=https%3A%2F%2Fapp%2Fcb");
        let form: TokenForm = params.decode().unwrap();
        assert_eq!(form.grant_type.as_deref(), Some("authorization_code"));
        assert_eq!(form.redirect_uri.as_deref(), Some("https://app/cb"));
        assert_eq!(form.username, None);
    }

    #[test]
    fn parses_authorization_headers() {
        // c1:s1
        let credentials = credentials_from("Basic YzE6czE=").unwrap();
        assert_eq!(credentials.client_id, ClientId("c1".into()));
        assert_eq!(credentials.client_secret, ClientSecret("s1".into()));
        assert!(credentials_from("Bearer abc").is_none());

        assert_eq!(bearer_from("Bearer abc").as_deref(), Some("abc"));
        assert_eq!(bearer_from("bearer  abc ").as_deref(), Some("abc"));
        assert_eq!(bearer_from("Basic YzE6czE="), None);
        assert_eq!(bearer_from("Bearer "), None);
    }
}
