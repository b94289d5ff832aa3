use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use kagi::util::cli::*;

    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let opts = Options::parse();
    run_cli_action(opts).await
}
