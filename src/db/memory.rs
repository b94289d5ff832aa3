use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::core::models::{AccessData, AuthorizeData, Client};
use crate::core::types::{AccessToken, AuthCode, ClientId, Expire, RefreshToken};

use super::{StorageError, Store};

#[derive(Debug, Default)]
struct Tables {
    clients: HashMap<ClientId, Client>,
    authorize: HashMap<AuthCode, AuthorizeData>,
    access: HashMap<AccessToken, AccessData>,
    refresh: HashMap<RefreshToken, AccessToken>,
}

impl Tables {
    fn insert_access(&mut self, data: &AccessData) {
        if let Some(refresh_token) = &data.refresh_token {
            self.refresh
                .insert(refresh_token.clone(), data.access_token.clone());
        }
        self.access.insert(data.access_token.clone(), data.clone());
    }

    fn delete_access(&mut self, token: &AccessToken) {
        let removed = self.access.remove(token);
        if let Some(refresh_token) = removed.and_then(|data| data.refresh_token) {
            self.refresh.remove(&refresh_token);
        }
    }
}

/// Process-local [`Store`]. Everything is lost on restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_client(&self, id: &ClientId) -> Result<Client, StorageError> {
        let tables = self.tables.read().await;
        tables.clients.get(id).cloned().ok_or(StorageError::NotFound)
    }

    async fn create_client(&self, client: &Client) -> Result<(), StorageError> {
        let mut tables = self.tables.write().await;
        if tables.clients.contains_key(&client.id) {
            return Err(StorageError::AlreadyExists(client.id.0.clone()));
        }
        tables.clients.insert(client.id.clone(), client.clone());
        Ok(())
    }

    async fn remove_client(&self, id: &ClientId) -> Result<(), StorageError> {
        self.tables.write().await.clients.remove(id);
        Ok(())
    }

    async fn save_authorize(&self, data: &AuthorizeData) -> Result<(), StorageError> {
        let mut tables = self.tables.write().await;
        tables.authorize.insert(data.code.clone(), data.clone());
        Ok(())
    }

    async fn load_authorize(&self, code: &AuthCode) -> Result<AuthorizeData, StorageError> {
        let tables = self.tables.read().await;
        tables.authorize.get(code).cloned().ok_or(StorageError::NotFound)
    }

    async fn remove_authorize(&self, code: &AuthCode) -> Result<(), StorageError> {
        self.tables.write().await.authorize.remove(code);
        Ok(())
    }

    async fn save_access(&self, data: &AccessData) -> Result<(), StorageError> {
        self.tables.write().await.insert_access(data);
        Ok(())
    }

    async fn load_access(&self, token: &AccessToken) -> Result<AccessData, StorageError> {
        let tables = self.tables.read().await;
        tables.access.get(token).cloned().ok_or(StorageError::NotFound)
    }

    async fn remove_access(&self, token: &AccessToken) -> Result<(), StorageError> {
        self.tables.write().await.delete_access(token);
        Ok(())
    }

    async fn load_refresh(&self, token: &RefreshToken) -> Result<AccessData, StorageError> {
        let tables = self.tables.read().await;
        tables
            .refresh
            .get(token)
            .and_then(|access| tables.access.get(access))
            .cloned()
            .ok_or(StorageError::NotFound)
    }

    async fn remove_refresh(&self, token: &RefreshToken) -> Result<(), StorageError> {
        self.tables.write().await.refresh.remove(token);
        Ok(())
    }

    async fn exchange_authorize(
        &self,
        code: &AuthCode,
        access: &AccessData,
    ) -> Result<(), StorageError> {
        let mut tables = self.tables.write().await;
        tables.authorize.remove(code).ok_or(StorageError::NotFound)?;
        tables.insert_access(access);
        Ok(())
    }

    async fn exchange_refresh(
        &self,
        token: &RefreshToken,
        access: &AccessData,
    ) -> Result<(), StorageError> {
        let mut tables = self.tables.write().await;
        let previous = tables.refresh.remove(token).ok_or(StorageError::NotFound)?;
        tables.delete_access(&previous);
        tables.insert_access(access);
        Ok(())
    }

    async fn clean_up(&self, now: i64, refresh_cutoff: Option<i64>) -> Result<u64, StorageError> {
        let mut tables = self.tables.write().await;
        let cutoff = refresh_cutoff.unwrap_or(i64::MIN);

        let codes = tables.authorize.len();
        tables.authorize.retain(|_, data| !data.is_expired_at(now));
        let codes = codes - tables.authorize.len();

        let expired: Vec<AccessToken> = tables
            .access
            .values()
            .filter(|data| data.is_expired_at(now))
            .filter(|data| data.refresh_token.is_none() || data.created_at < cutoff)
            .map(|data| data.access_token.clone())
            .collect();
        for token in &expired {
            tables.delete_access(token);
        }

        Ok((codes + expired.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{ClientSecret, RedirectUri, Scope};
    use std::sync::Arc;

    fn code(value: &str, created_at: i64) -> AuthorizeData {
        AuthorizeData {
            code: AuthCode(value.into()),
            client_id: ClientId("c1".into()),
            scope: Scope::default(),
            redirect_uri: RedirectUri("https://app/cb".into()),
            state: None,
            expires_in: 600,
            created_at,
            user_data: None,
            pkce_challenge: None,
        }
    }

    fn access(token: &str, refresh: Option<&str>, created_at: i64) -> AccessData {
        AccessData {
            access_token: AccessToken(token.into()),
            refresh_token: refresh.map(|r| RefreshToken(r.into())),
            client_id: ClientId("c1".into()),
            scope: Scope::default(),
            redirect_uri: None,
            expires_in: 3600,
            created_at,
            user_data: None,
            authorize_code: None,
            previous_access: None,
        }
    }

    #[tokio::test]
    async fn duplicate_clients_are_refused() {
        let store = MemoryStore::new();
        let client = Client::new(
            ClientId("c1".into()),
            ClientSecret("s1".into()),
            "https://app/cb".into(),
        );

        store.create_client(&client).await.unwrap();
        assert!(matches!(
            store.create_client(&client).await,
            Err(StorageError::AlreadyExists(id)) if id == "c1"
        ));
        assert_eq!(store.get_client(&client.id).await.unwrap(), client);
    }

    #[tokio::test]
    async fn concurrent_exchanges_of_one_code_admit_a_single_winner() {
        let store = Arc::new(MemoryStore::new());
        store.save_authorize(&code("c", 0)).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .exchange_authorize(&AuthCode("c".into()), &access(&format!("at-{}", i), None, 0))
                    .await
                    .is_ok()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn clean_up_spares_refreshable_access() {
        let store = MemoryStore::new();
        store.save_authorize(&code("old", 0)).await.unwrap();
        store.save_access(&access("old", None, 0)).await.unwrap();
        store.save_access(&access("kept", Some("rt"), 0)).await.unwrap();
        store.save_access(&access("live", None, 9_000)).await.unwrap();

        assert_eq!(store.clean_up(10_000, None).await.unwrap(), 2);
        assert!(store.load_refresh(&RefreshToken("rt".into())).await.is_ok());
        assert!(store.load_access(&AccessToken("live".into())).await.is_ok());
    }

    #[tokio::test]
    async fn clean_up_drops_refreshable_access_past_the_cutoff() {
        let store = MemoryStore::new();
        store.save_access(&access("old", Some("rt-old"), 0)).await.unwrap();
        store.save_access(&access("recent", Some("rt-recent"), 5_000)).await.unwrap();

        assert_eq!(store.clean_up(10_000, Some(1_000)).await.unwrap(), 1);
        assert!(store
            .load_refresh(&RefreshToken("rt-old".into()))
            .await
            .unwrap_err()
            .is_not_found());
        assert!(store.load_refresh(&RefreshToken("rt-recent".into())).await.is_ok());
    }

    #[tokio::test]
    async fn removing_a_refresh_token_keeps_its_access() {
        let store = MemoryStore::new();
        store.save_access(&access("at", Some("rt"), 0)).await.unwrap();

        store.remove_refresh(&RefreshToken("rt".into())).await.unwrap();
        store.remove_refresh(&RefreshToken("rt".into())).await.unwrap();

        assert!(store
            .load_refresh(&RefreshToken("rt".into()))
            .await
            .unwrap_err()
            .is_not_found());
        assert!(store.load_access(&AccessToken("at".into())).await.is_ok());
    }

    #[tokio::test]
    async fn refresh_lookup_follows_the_access_row() {
        let store = MemoryStore::new();
        store.save_access(&access("at", Some("rt"), 0)).await.unwrap();

        store.remove_access(&AccessToken("at".into())).await.unwrap();
        assert!(store
            .load_refresh(&RefreshToken("rt".into()))
            .await
            .unwrap_err()
            .is_not_found());
    }
}
