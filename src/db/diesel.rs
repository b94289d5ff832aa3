use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{self, ConnectionManager, CustomizeConnection, Pool, PooledConnection};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::sql_query;
use diesel::sql_types::{BigInt, Binary, Nullable, Text};
use diesel::sqlite::SqliteConnection;
use tracing::{event, Level};

use crate::core::models::{AccessData, AuthorizeData, Client};
use crate::core::types::{AccessToken, AuthCode, ClientId, Expire, RefreshToken};

use super::models::{self, to_sql_seconds};
use super::schema::Tables;
use super::{blob, StorageError, Store};

type SqlitePool = Pool<ConnectionManager<SqliteConnection>>;

const AUTHORIZE_COLUMNS: &str = "code, client_id, scope, redirect_uri, state, expires_in, \
     created_at, extra, code_challenge, code_challenge_method";

const ACCESS_COLUMNS: &str = "access_token, refresh_token, client_id, scope, redirect_uri, \
     expires_in, created_at, extra, authorize_code, previous_access";

#[derive(Debug)]
struct ConnectionOptions;

impl CustomizeConnection<SqliteConnection, r2d2::Error> for ConnectionOptions {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), r2d2::Error> {
        conn.batch_execute(
            "PRAGMA busy_timeout = 5000; PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;",
        )
        .map_err(r2d2::Error::QueryError)
    }
}

/// SQLite backed [`Store`]. Every call checks a connection out of the pool
/// and runs on the blocking thread pool.
#[derive(Clone)]
pub struct DbStore {
    pool: SqlitePool,
    tables: Arc<Tables>,
}

impl Debug for DbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbStore")
            .field("tables", &self.tables)
            .finish()
    }
}

impl DbStore {
    /// Opens a pool on `database_url` (a file path or `:memory:`). Call
    /// [`DbStore::create_schema`] before first use.
    pub fn acquire(database_url: &str, schema_prefix: &str) -> Result<Self, StorageError> {
        let tables = Tables::with_prefix(schema_prefix)?;

        // each in-memory connection would be its own database
        let max_size = if database_url == ":memory:" { 1 } else { 8 };

        let pool = Pool::builder()
            .max_size(max_size)
            .connection_customizer(Box::new(ConnectionOptions))
            .build(ConnectionManager::<SqliteConnection>::new(database_url))
            .map_err(|e| StorageError::Pool(e.to_string()))?;

        Ok(Self {
            pool,
            tables: Arc::new(tables),
        })
    }

    #[tracing::instrument(skip(self), fields(tables = ?self.tables))]
    pub async fn create_schema(&self) -> Result<(), StorageError> {
        self.run(|conn, tables| {
            conn.immediate_transaction::<_, StorageError, _>(|conn| {
                for statement in tables.create_statements() {
                    sql_query(statement).execute(conn)?;
                }
                Ok(())
            })
        })
        .await?;

        event!(Level::INFO, "Schema ready");
        Ok(())
    }

    async fn run<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&mut SqliteConnection, &Tables) -> Result<T, StorageError> + Send + 'static,
    {
        let pool = self.pool.clone();
        let tables = Arc::clone(&self.tables);

        tokio::task::spawn_blocking(move || {
            let mut conn: PooledConnection<ConnectionManager<SqliteConnection>> =
                pool.get().map_err(|e| StorageError::Pool(e.to_string()))?;
            f(&mut conn, &tables)
        })
        .await
        .map_err(|e| StorageError::Task(e.to_string()))?
    }
}

fn find_access(
    conn: &mut SqliteConnection,
    tables: &Tables,
    token: &str,
) -> Result<AccessData, StorageError> {
    let row = sql_query(format!(
        "SELECT {} FROM {} WHERE access_token = ?",
        ACCESS_COLUMNS, tables.access
    ))
    .bind::<Text, _>(token)
    .get_result::<models::AccessRow>(conn)
    .optional()?
    .ok_or(StorageError::NotFound)?;

    row.try_into()
}

fn insert_access(
    conn: &mut SqliteConnection,
    tables: &Tables,
    data: &AccessData,
) -> Result<(), StorageError> {
    let extra = blob::encode_opt(data.user_data.as_ref())?;

    sql_query(format!(
        "INSERT INTO {} ({}, expires_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        tables.access, ACCESS_COLUMNS
    ))
    .bind::<Text, _>(&data.access_token.0)
    .bind::<Nullable<Text>, _>(data.refresh_token.as_ref().map(|t| t.0.as_str()))
    .bind::<Text, _>(&data.client_id.0)
    .bind::<Text, _>(data.scope.as_joined())
    .bind::<Nullable<Text>, _>(data.redirect_uri.as_ref().map(|u| u.0.as_str()))
    .bind::<BigInt, _>(to_sql_seconds(data.expires_in))
    .bind::<BigInt, _>(data.created_at)
    .bind::<Nullable<Binary>, _>(extra)
    .bind::<Nullable<Text>, _>(data.authorize_code.as_ref().map(|c| c.0.as_str()))
    .bind::<Nullable<Text>, _>(data.previous_access.as_ref().map(|t| t.0.as_str()))
    .bind::<BigInt, _>(data.expires_at())
    .execute(conn)?;

    if let Some(refresh_token) = &data.refresh_token {
        sql_query(format!(
            "INSERT INTO {} (token, access_token) VALUES (?, ?)",
            tables.refresh
        ))
        .bind::<Text, _>(&refresh_token.0)
        .bind::<Text, _>(&data.access_token.0)
        .execute(conn)?;
    }

    Ok(())
}

fn delete_access(
    conn: &mut SqliteConnection,
    tables: &Tables,
    token: &str,
) -> Result<usize, StorageError> {
    sql_query(format!("DELETE FROM {} WHERE access_token = ?", tables.refresh))
        .bind::<Text, _>(token)
        .execute(conn)?;

    let removed = sql_query(format!("DELETE FROM {} WHERE access_token = ?", tables.access))
        .bind::<Text, _>(token)
        .execute(conn)?;

    Ok(removed)
}

fn is_unique_violation(e: &DieselError) -> bool {
    matches!(
        e,
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)
    )
}

#[async_trait]
impl Store for DbStore {
    async fn get_client(&self, id: &ClientId) -> Result<Client, StorageError> {
        let id = id.0.clone();

        self.run(move |conn, tables| {
            let row = sql_query(format!(
                "SELECT id, secret, redirect_uri, extra FROM {} WHERE id = ?",
                tables.client
            ))
            .bind::<Text, _>(&id)
            .get_result::<models::ClientRow>(conn)
            .optional()?
            .ok_or(StorageError::NotFound)?;

            row.try_into()
        })
        .await
    }

    #[tracing::instrument(skip_all, fields(client_id = ?client.id))]
    async fn create_client(&self, client: &Client) -> Result<(), StorageError> {
        let client = client.clone();

        self.run(move |conn, tables| {
            let extra = blob::encode_opt(client.user_data.as_ref())?;

            let inserted = sql_query(format!(
                "INSERT INTO {} (id, secret, redirect_uri, extra) VALUES (?, ?, ?, ?)",
                tables.client
            ))
            .bind::<Text, _>(&client.id.0)
            .bind::<Text, _>(&client.secret.0)
            .bind::<Text, _>(&client.redirect_uri)
            .bind::<Nullable<Binary>, _>(extra)
            .execute(conn);

            match inserted {
                Ok(_) => Ok(()),
                Err(e) if is_unique_violation(&e) => {
                    Err(StorageError::AlreadyExists(client.id.0.clone()))
                }
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    async fn remove_client(&self, id: &ClientId) -> Result<(), StorageError> {
        let id = id.0.clone();

        self.run(move |conn, tables| {
            sql_query(format!("DELETE FROM {} WHERE id = ?", tables.client))
                .bind::<Text, _>(&id)
                .execute(conn)?;
            Ok(())
        })
        .await
    }

    async fn save_authorize(&self, data: &AuthorizeData) -> Result<(), StorageError> {
        let data = data.clone();

        self.run(move |conn, tables| {
            let extra = blob::encode_opt(data.user_data.as_ref())?;
            let (challenge, method) = match &data.pkce_challenge {
                Some(c) => (Some(c.code.as_str()), Some(c.method.as_str())),
                None => (None, None),
            };

            sql_query(format!(
                "INSERT INTO {} ({}, expires_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                tables.authorize, AUTHORIZE_COLUMNS
            ))
            .bind::<Text, _>(&data.code.0)
            .bind::<Text, _>(&data.client_id.0)
            .bind::<Text, _>(data.scope.as_joined())
            .bind::<Text, _>(&data.redirect_uri.0)
            .bind::<Nullable<Text>, _>(data.state.as_deref())
            .bind::<BigInt, _>(to_sql_seconds(data.expires_in))
            .bind::<BigInt, _>(data.created_at)
            .bind::<Nullable<Binary>, _>(extra)
            .bind::<Nullable<Text>, _>(challenge)
            .bind::<Nullable<Text>, _>(method)
            .bind::<BigInt, _>(data.expires_at())
            .execute(conn)?;

            Ok(())
        })
        .await
    }

    async fn load_authorize(&self, code: &AuthCode) -> Result<AuthorizeData, StorageError> {
        let code = code.0.clone();

        self.run(move |conn, tables| {
            let row = sql_query(format!(
                "SELECT {} FROM {} WHERE code = ?",
                AUTHORIZE_COLUMNS, tables.authorize
            ))
            .bind::<Text, _>(&code)
            .get_result::<models::AuthorizeRow>(conn)
            .optional()?
            .ok_or(StorageError::NotFound)?;

            row.try_into()
        })
        .await
    }

    async fn remove_authorize(&self, code: &AuthCode) -> Result<(), StorageError> {
        let code = code.0.clone();

        self.run(move |conn, tables| {
            sql_query(format!("DELETE FROM {} WHERE code = ?", tables.authorize))
                .bind::<Text, _>(&code)
                .execute(conn)?;
            Ok(())
        })
        .await
    }

    async fn save_access(&self, data: &AccessData) -> Result<(), StorageError> {
        let data = data.clone();

        self.run(move |conn, tables| {
            conn.immediate_transaction(|conn| insert_access(conn, tables, &data))
        })
        .await
    }

    async fn load_access(&self, token: &AccessToken) -> Result<AccessData, StorageError> {
        let token = token.0.clone();

        self.run(move |conn, tables| find_access(conn, tables, &token))
            .await
    }

    async fn remove_access(&self, token: &AccessToken) -> Result<(), StorageError> {
        let token = token.0.clone();

        self.run(move |conn, tables| {
            conn.immediate_transaction(|conn| delete_access(conn, tables, &token).map(|_| ()))
        })
        .await
    }

    async fn load_refresh(&self, token: &RefreshToken) -> Result<AccessData, StorageError> {
        let token = token.0.clone();

        self.run(move |conn, tables| {
            let row = sql_query(format!(
                "SELECT access_token FROM {} WHERE token = ?",
                tables.refresh
            ))
            .bind::<Text, _>(&token)
            .get_result::<models::RefreshRow>(conn)
            .optional()?
            .ok_or(StorageError::NotFound)?;

            find_access(conn, tables, &row.access_token)
        })
        .await
    }

    async fn remove_refresh(&self, token: &RefreshToken) -> Result<(), StorageError> {
        let token = token.0.clone();

        self.run(move |conn, tables| {
            sql_query(format!("DELETE FROM {} WHERE token = ?", tables.refresh))
                .bind::<Text, _>(&token)
                .execute(conn)?;
            Ok(())
        })
        .await
    }

    #[tracing::instrument(skip_all, fields(client_id = ?access.client_id))]
    async fn exchange_authorize(
        &self,
        code: &AuthCode,
        access: &AccessData,
    ) -> Result<(), StorageError> {
        let code = code.0.clone();
        let access = access.clone();

        self.run(move |conn, tables| {
            conn.immediate_transaction(|conn| {
                let consumed = sql_query(format!("DELETE FROM {} WHERE code = ?", tables.authorize))
                    .bind::<Text, _>(&code)
                    .execute(conn)?;

                if consumed == 0 {
                    return Err(StorageError::NotFound);
                }

                insert_access(conn, tables, &access)
            })
        })
        .await
    }

    #[tracing::instrument(skip_all, fields(client_id = ?access.client_id))]
    async fn exchange_refresh(
        &self,
        token: &RefreshToken,
        access: &AccessData,
    ) -> Result<(), StorageError> {
        let token = token.0.clone();
        let access = access.clone();

        self.run(move |conn, tables| {
            conn.immediate_transaction(|conn| {
                let previous = sql_query(format!(
                    "SELECT access_token FROM {} WHERE token = ?",
                    tables.refresh
                ))
                .bind::<Text, _>(&token)
                .get_result::<models::RefreshRow>(conn)
                .optional()?
                .ok_or(StorageError::NotFound)?;

                delete_access(conn, tables, &previous.access_token)?;
                insert_access(conn, tables, &access)
            })
        })
        .await
    }

    async fn clean_up(&self, now: i64, refresh_cutoff: Option<i64>) -> Result<u64, StorageError> {
        let cutoff = refresh_cutoff.unwrap_or(i64::MIN);

        self.run(move |conn, tables| {
            conn.immediate_transaction(|conn| {
                let codes = sql_query(format!(
                    "DELETE FROM {} WHERE expires_at < ?",
                    tables.authorize
                ))
                .bind::<BigInt, _>(now)
                .execute(conn)?;

                sql_query(format!(
                    "DELETE FROM {} WHERE access_token IN \
                     (SELECT access_token FROM {} WHERE expires_at < ? AND created_at < ?)",
                    tables.refresh, tables.access
                ))
                .bind::<BigInt, _>(now)
                .bind::<BigInt, _>(cutoff)
                .execute(conn)?;

                let tokens = sql_query(format!(
                    "DELETE FROM {} WHERE expires_at < ? \
                     AND (refresh_token IS NULL OR created_at < ?)",
                    tables.access
                ))
                .bind::<BigInt, _>(now)
                .bind::<BigInt, _>(cutoff)
                .execute(conn)?;

                Ok((codes + tokens) as u64)
            })
        })
        .await
    }
}
