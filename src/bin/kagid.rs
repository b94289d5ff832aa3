use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{event, Level};
use tracing_subscriber::EnvFilter;

use kagi::backend::UserFile;
use kagi::config::{RedirectMatch, ServerConfig};
use kagi::core::types::{GrantType, ResponseType};
use kagi::db::DbStore;
use kagi::http::login::TemplateLoginHandler;
use kagi::http::server::Server;
use kagi::provider::OAuth2Provider;
use kagi::util::hash::HashingService;

#[derive(Parser, Debug)]
#[clap(
    name = "kagid",
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS")
)]
struct Options {
    #[clap(long, env = "DATABASE_URL")]
    database_url: String,
    #[clap(long, env = "SCHEMA_PREFIX", default_value = "kagi_")]
    schema_prefix: String,
    #[clap(long, env = "HASH_SECRET", default_value = "")]
    hash_secret: String,
    /// JSON file of users, see `kagi::backend::UserFile`.
    #[clap(long, env = "USERS_FILE")]
    users_file: PathBuf,
    /// Directory holding `login.hbs`.
    #[clap(long, env = "TEMPLATE_PATH", default_value = "templates")]
    template_path: PathBuf,
    #[clap(long, env = "LISTEN", default_value = "127.0.0.1:8001")]
    listen: SocketAddr,

    #[clap(long, env = "ACCESS_TOKEN_LIFETIME", default_value = "3600")]
    access_token_lifetime: u64,
    #[clap(long, env = "AUTHORIZE_CODE_LIFETIME", default_value = "600")]
    authorize_code_lifetime: u64,
    #[clap(
        long,
        env = "ALLOWED_AUTHORIZE_TYPES",
        use_value_delimiter = true,
        default_value = "code,token"
    )]
    allowed_authorize_types: Vec<ResponseType>,
    #[clap(
        long,
        env = "ALLOWED_ACCESS_TYPES",
        use_value_delimiter = true,
        default_value = "authorization_code,refresh_token,password,client_credentials"
    )]
    allowed_access_types: Vec<GrantType>,
    #[clap(long, env = "ERROR_STATUS_CODE", default_value = "400")]
    error_status_code: u16,
    #[clap(long, env = "ALLOW_CLIENT_SECRET_IN_PARAMS")]
    allow_client_secret_in_params: bool,
    #[clap(long, env = "ALLOW_GET_ACCESS_REQUEST")]
    allow_get_access_request: bool,
    #[clap(long, env = "REQUIRE_PKCE")]
    require_pkce: bool,
    #[clap(long, env = "TOKEN_TYPE", default_value = "Bearer")]
    token_type: String,
    #[clap(long, env = "REDIRECT_URI_SEPARATOR")]
    redirect_uri_separator: Option<String>,
    #[clap(long, env = "REDIRECT_MATCH", default_value = "exact")]
    redirect_match: RedirectMatch,
    /// Seconds between sweeps of expired codes and tokens.
    #[clap(long, env = "CLEAN_UP_INTERVAL", default_value = "60")]
    clean_up_interval: u64,
    /// Seconds a refresh token stays usable; 0 keeps it until exchanged.
    #[clap(long, env = "REFRESH_TOKEN_LIFETIME", default_value = "1209600")]
    refresh_token_lifetime: u64,
}

impl Options {
    fn server_config(&self) -> ServerConfig {
        ServerConfig {
            access_token_lifetime: self.access_token_lifetime,
            authorize_code_lifetime: self.authorize_code_lifetime,
            allowed_authorize_types: self.allowed_authorize_types.clone(),
            allowed_access_types: self.allowed_access_types.clone(),
            error_status_code: self.error_status_code,
            allow_client_secret_in_params: self.allow_client_secret_in_params,
            allow_get_access_request: self.allow_get_access_request,
            require_pkce: self.require_pkce,
            token_type: self.token_type.clone(),
            template_path: self.template_path.clone(),
            schema_prefix: self.schema_prefix.clone(),
            redirect_uri_separator: self.redirect_uri_separator.clone(),
            redirect_match: self.redirect_match,
            clean_up_interval: Duration::from_secs(self.clean_up_interval.max(1)),
            refresh_token_lifetime: (self.refresh_token_lifetime > 0)
                .then(|| self.refresh_token_lifetime),
        }
    }
}

async fn kagid(opts: Options) -> anyhow::Result<()> {
    let config = opts.server_config();

    let store = DbStore::acquire(&opts.database_url, &config.schema_prefix)
        .context("Failed to open database")?;
    store
        .create_schema()
        .await
        .context("Failed to create schema")?;

    let hasher = HashingService::with_secret_key(opts.hash_secret.clone());
    let users = UserFile::load(&opts.users_file, hasher)
        .with_context(|| format!("Failed to load {}", opts.users_file.display()))?;
    event!(Level::INFO, users = users.len(), "Loaded users");

    let login = TemplateLoginHandler::from_dir(&config.template_path)
        .context("Failed to load login template")?;

    let provider = Arc::new(OAuth2Provider::new(Arc::new(store), config));

    let janitor = Arc::clone(&provider);
    tokio::spawn(async move { janitor.clean_up_worker().await });

    Server::new(provider, Arc::new(users), Arc::new(login))
        .serve(opts.listen)
        .await;

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let opts = Options::parse();
    kagid(opts).await
}
