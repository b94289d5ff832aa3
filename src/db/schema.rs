//! Table layout. Table names carry a deployment-chosen prefix, so the
//! statements are built at runtime instead of through `table!`.

use super::StorageError;

#[derive(Debug, Clone)]
pub struct Tables {
    pub client: String,
    pub authorize: String,
    pub access: String,
    pub refresh: String,
}

impl Tables {
    /// Only `[A-Za-z0-9_]` is accepted; the prefix is spliced into SQL text.
    pub fn with_prefix(prefix: &str) -> Result<Self, StorageError> {
        if !prefix
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(StorageError::InvalidPrefix(prefix.to_string()));
        }

        Ok(Self {
            client: format!("{}client", prefix),
            authorize: format!("{}authorize", prefix),
            access: format!("{}access", prefix),
            refresh: format!("{}refresh", prefix),
        })
    }

    pub fn create_statements(&self) -> Vec<String> {
        vec![
            format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    id TEXT PRIMARY KEY NOT NULL,
                    secret TEXT NOT NULL,
                    redirect_uri TEXT NOT NULL,
                    extra BLOB
                )",
                self.client
            ),
            format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    code TEXT PRIMARY KEY NOT NULL,
                    client_id TEXT NOT NULL,
                    scope TEXT NOT NULL,
                    redirect_uri TEXT NOT NULL,
                    state TEXT,
                    expires_in BIGINT NOT NULL,
                    created_at BIGINT NOT NULL,
                    expires_at BIGINT NOT NULL,
                    extra BLOB,
                    code_challenge TEXT,
                    code_challenge_method TEXT
                )",
                self.authorize
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS {0}_expires_at ON {0} (expires_at)",
                self.authorize
            ),
            format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    access_token TEXT PRIMARY KEY NOT NULL,
                    refresh_token TEXT,
                    client_id TEXT NOT NULL,
                    scope TEXT NOT NULL,
                    redirect_uri TEXT,
                    expires_in BIGINT NOT NULL,
                    created_at BIGINT NOT NULL,
                    expires_at BIGINT NOT NULL,
                    extra BLOB,
                    authorize_code TEXT,
                    previous_access TEXT
                )",
                self.access
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS {0}_expires_at ON {0} (expires_at)",
                self.access
            ),
            format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    token TEXT PRIMARY KEY NOT NULL,
                    access_token TEXT NOT NULL
                )",
                self.refresh
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixes_every_table() {
        let tables = Tables::with_prefix("osin_").unwrap();
        assert_eq!(tables.client, "osin_client");
        assert_eq!(tables.refresh, "osin_refresh");
        assert!(tables
            .create_statements()
            .iter()
            .all(|stmt| stmt.contains("osin_")));
    }

    #[test]
    fn refuses_prefixes_that_are_not_identifiers() {
        assert!(Tables::with_prefix("").is_ok());
        assert!(matches!(
            Tables::with_prefix("x; DROP TABLE y; --"),
            Err(StorageError::InvalidPrefix(_))
        ));
        assert!(Tables::with_prefix("a-b").is_err());
    }
}
