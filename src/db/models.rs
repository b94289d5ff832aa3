use diesel::sql_types::{BigInt, Binary, Nullable, Text};
use diesel::QueryableByName;

use crate::auth::pkce;
use crate::core::models::{AccessData, AuthorizeData, Client};
use crate::core::types::{
    AccessToken, AuthCode, ClientId, ClientSecret, RedirectUri, RefreshToken, Scope,
};

use super::{blob, StorageError};

#[derive(Debug)]
#[derive(QueryableByName)]
pub struct ClientRow {
    #[diesel(sql_type = Text)]
    pub id: String,
    #[diesel(sql_type = Text)]
    pub secret: String,
    #[diesel(sql_type = Text)]
    pub redirect_uri: String,
    #[diesel(sql_type = Nullable<Binary>)]
    pub extra: Option<Vec<u8>>,
}

#[derive(Debug)]
#[derive(QueryableByName)]
pub struct AuthorizeRow {
    #[diesel(sql_type = Text)]
    pub code: String,
    #[diesel(sql_type = Text)]
    pub client_id: String,
    #[diesel(sql_type = Text)]
    pub scope: String,
    #[diesel(sql_type = Text)]
    pub redirect_uri: String,
    #[diesel(sql_type = Nullable<Text>)]
    pub state: Option<String>,
    #[diesel(sql_type = BigInt)]
    pub expires_in: i64,
    #[diesel(sql_type = BigInt)]
    pub created_at: i64,
    #[diesel(sql_type = Nullable<Binary>)]
    pub extra: Option<Vec<u8>>,
    #[diesel(sql_type = Nullable<Text>)]
    pub code_challenge: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    pub code_challenge_method: Option<String>,
}

#[derive(Debug)]
#[derive(QueryableByName)]
pub struct AccessRow {
    #[diesel(sql_type = Text)]
    pub access_token: String,
    #[diesel(sql_type = Nullable<Text>)]
    pub refresh_token: Option<String>,
    #[diesel(sql_type = Text)]
    pub client_id: String,
    #[diesel(sql_type = Text)]
    pub scope: String,
    #[diesel(sql_type = Nullable<Text>)]
    pub redirect_uri: Option<String>,
    #[diesel(sql_type = BigInt)]
    pub expires_in: i64,
    #[diesel(sql_type = BigInt)]
    pub created_at: i64,
    #[diesel(sql_type = Nullable<Binary>)]
    pub extra: Option<Vec<u8>>,
    #[diesel(sql_type = Nullable<Text>)]
    pub authorize_code: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    pub previous_access: Option<String>,
}

#[derive(Debug)]
#[derive(QueryableByName)]
pub struct RefreshRow {
    #[diesel(sql_type = Text)]
    pub access_token: String,
}

/// Lifetimes are stored as signed integers.
pub fn to_sql_seconds(secs: u64) -> i64 {
    i64::try_from(secs).unwrap_or(i64::MAX)
}

fn from_sql_seconds(secs: i64) -> u64 {
    u64::try_from(secs).unwrap_or(0)
}

impl TryFrom<ClientRow> for Client {
    type Error = StorageError;

    fn try_from(row: ClientRow) -> Result<Self, Self::Error> {
        Ok(Client {
            id: ClientId(row.id),
            secret: ClientSecret(row.secret),
            redirect_uri: row.redirect_uri,
            user_data: blob::decode_opt(row.extra.as_deref())?,
        })
    }
}

impl TryFrom<AuthorizeRow> for AuthorizeData {
    type Error = StorageError;

    fn try_from(row: AuthorizeRow) -> Result<Self, Self::Error> {
        let pkce_challenge = match row.code_challenge {
            Some(code) => {
                let method = match row.code_challenge_method.as_deref() {
                    Some(method) => method
                        .parse::<pkce::Transformation>()
                        .map_err(|e| StorageError::Corrupt(e.to_string()))?,
                    None => pkce::Transformation::Plain,
                };
                Some(pkce::Challenge { code, method })
            }
            None => None,
        };

        Ok(AuthorizeData {
            code: AuthCode(row.code),
            client_id: ClientId(row.client_id),
            scope: Scope::from_delimited_parts(&row.scope),
            redirect_uri: RedirectUri(row.redirect_uri),
            state: row.state,
            expires_in: from_sql_seconds(row.expires_in),
            created_at: row.created_at,
            user_data: blob::decode_opt(row.extra.as_deref())?,
            pkce_challenge,
        })
    }
}

impl TryFrom<AccessRow> for AccessData {
    type Error = StorageError;

    fn try_from(row: AccessRow) -> Result<Self, Self::Error> {
        Ok(AccessData {
            access_token: AccessToken(row.access_token),
            refresh_token: row.refresh_token.map(RefreshToken),
            client_id: ClientId(row.client_id),
            scope: Scope::from_delimited_parts(&row.scope),
            redirect_uri: row.redirect_uri.map(RedirectUri),
            expires_in: from_sql_seconds(row.expires_in),
            created_at: row.created_at,
            user_data: blob::decode_opt(row.extra.as_deref())?,
            authorize_code: row.authorize_code.map(AuthCode),
            previous_access: row.previous_access.map(AccessToken),
        })
    }
}
