//! Persistence of clients and grants.
//!
//! [`Store`] is the contract the provider depends on. [`DbStore`] keeps
//! everything in SQLite through diesel; [`MemoryStore`] keeps it in process.

use async_trait::async_trait;
use thiserror::Error;

use crate::core::models::{AccessData, AuthorizeData, Client};
use crate::core::types::{AccessToken, AuthCode, ClientId, RefreshToken};

pub mod blob;
pub mod diesel;
pub mod memory;
mod models;
mod schema;

pub use self::diesel::DbStore;
pub use self::memory::MemoryStore;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("record not found")]
    NotFound,

    #[error("record already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid schema prefix `{0}`")]
    InvalidPrefix(String),

    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("database error: {0}")]
    Database(#[from] ::diesel::result::Error),

    #[error("connection pool error: {0}")]
    Pool(String),

    #[error("storage task failed: {0}")]
    Task(String),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn get_client(&self, id: &ClientId) -> Result<Client, StorageError>;
    async fn create_client(&self, client: &Client) -> Result<(), StorageError>;
    async fn remove_client(&self, id: &ClientId) -> Result<(), StorageError>;

    async fn save_authorize(&self, data: &AuthorizeData) -> Result<(), StorageError>;
    async fn load_authorize(&self, code: &AuthCode) -> Result<AuthorizeData, StorageError>;
    async fn remove_authorize(&self, code: &AuthCode) -> Result<(), StorageError>;

    /// Saves the access data together with its refresh lookup, if any.
    async fn save_access(&self, data: &AccessData) -> Result<(), StorageError>;
    async fn load_access(&self, token: &AccessToken) -> Result<AccessData, StorageError>;
    async fn remove_access(&self, token: &AccessToken) -> Result<(), StorageError>;

    async fn load_refresh(&self, token: &RefreshToken) -> Result<AccessData, StorageError>;
    async fn remove_refresh(&self, token: &RefreshToken) -> Result<(), StorageError>;

    /// Consumes `code` and saves `access` in one step. Fails with
    /// [`StorageError::NotFound`] when the code was already consumed, so at
    /// most one exchange per code can succeed.
    async fn exchange_authorize(
        &self,
        code: &AuthCode,
        access: &AccessData,
    ) -> Result<(), StorageError>;

    /// Consumes `token`, drops the access data it belonged to and saves
    /// `access` in one step. Fails with [`StorageError::NotFound`] when the
    /// refresh token was already used.
    async fn exchange_refresh(
        &self,
        token: &RefreshToken,
        access: &AccessData,
    ) -> Result<(), StorageError>;

    /// Deletes expired codes and expired access data without a refresh
    /// token. Expired access data that carries a refresh token goes too,
    /// together with its refresh row, once it was created before
    /// `refresh_cutoff`. Returns the number of removed codes and access records.
    async fn clean_up(&self, now: i64, refresh_cutoff: Option<i64>) -> Result<u64, StorageError>;
}
