use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use crate::config::ServerConfig;
use crate::core::types::{ClientId, Password};
use crate::db::DbStore;
use crate::provider::OAuth2Provider;
use crate::util::hash::HashingService;

#[derive(Parser)]
#[clap(
    name = "kagi-util",
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS")
)]
pub struct Options {
    #[clap(long, env = "DATABASE_URL")]
    database_url: String,
    #[clap(long, env = "SCHEMA_PREFIX", default_value = "kagi_")]
    schema_prefix: String,
    /// Separates several redirect URIs registered for one client.
    #[clap(long, env = "REDIRECT_URI_SEPARATOR")]
    redirect_uri_separator: Option<String>,
    #[clap(long, env = "HASH_SECRET")]
    hash_secret: Option<String>,
    #[clap(subcommand)]
    command: SubCommand,
}

#[derive(Parser)]
enum SubCommand {
    CreateClient(CreateClient),
    DeleteClient(DeleteClient),
    ShowClient(ShowClient),
    HashPassword(HashPassword),
    PurgeExpired,
}

#[derive(Parser)]
struct CreateClient {
    #[clap(short, long)]
    id: String,
    #[clap(short, long)]
    secret: String,
    #[clap(short, long)]
    redirect_uri: String,
}

#[derive(Parser)]
struct DeleteClient {
    #[clap(short, long)]
    id: String,
}

#[derive(Parser)]
struct ShowClient {
    #[clap(short, long)]
    id: String,
}

/// Prints an argon2 hash suitable for the `password_hash` field of a users file.
#[derive(Parser)]
struct HashPassword {
    #[clap(short, long)]
    password: String,
}

async fn get_provider(opts: &Options) -> anyhow::Result<OAuth2Provider> {
    let store = DbStore::acquire(&opts.database_url, &opts.schema_prefix)
        .context("Failed to open database")?;
    store
        .create_schema()
        .await
        .context("Failed to create schema")?;

    let config = ServerConfig {
        schema_prefix: opts.schema_prefix.clone(),
        redirect_uri_separator: opts.redirect_uri_separator.clone(),
        ..ServerConfig::default()
    };

    Ok(OAuth2Provider::new(Arc::new(store), config))
}

async fn create_client(c: &CreateClient, opts: &Options) -> anyhow::Result<()> {
    let provider = get_provider(opts).await?;
    let client = provider
        .create_client(&c.id, &c.secret, &c.redirect_uri)
        .await
        .context("Failed to add client")?;

    println!("{} ({})", client.id, client.redirect_uri);
    Ok(())
}

async fn delete_client(c: &DeleteClient, opts: &Options) -> anyhow::Result<()> {
    let provider = get_provider(opts).await?;
    provider
        .remove_client(&c.id)
        .await
        .context("Failed to delete client")
}

async fn show_client(c: &ShowClient, opts: &Options) -> anyhow::Result<()> {
    let provider = get_provider(opts).await?;
    let client = provider
        .store()
        .get_client(&ClientId(c.id.clone()))
        .await
        .with_context(|| format!("Failed to find client {}", c.id))?;

    println!("{}", client.id);
    println!("  redirect_uri: {}", client.redirect_uri);
    Ok(())
}

fn hash_password(c: &HashPassword, opts: &Options) -> anyhow::Result<()> {
    let hasher = HashingService::with_secret_key(opts.hash_secret.clone().unwrap_or_default());
    let hash = hasher
        .hash(&Password(c.password.clone()))
        .context("Failed to hash password")?;

    println!("{}", hash.0);
    Ok(())
}

async fn purge_expired(opts: &Options) -> anyhow::Result<()> {
    let provider = get_provider(opts).await?;
    let removed = provider
        .clean_up()
        .await
        .context("Failed to purge expired grants")?;

    println!("Removed {} expired grants", removed);
    Ok(())
}

pub async fn run_cli_action(opts: Options) -> anyhow::Result<()> {
    match &opts.command {
        SubCommand::CreateClient(c) => create_client(c, &opts).await,
        SubCommand::DeleteClient(c) => delete_client(c, &opts).await,
        SubCommand::ShowClient(c) => show_client(c, &opts).await,
        SubCommand::HashPassword(c) => hash_password(c, &opts),
        SubCommand::PurgeExpired => purge_expired(&opts).await,
    }
}
