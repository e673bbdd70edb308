use anyhow::Result;
use clap::Parser;
use ssjitsi::{
    app,
    cli::{handle_join_command, handle_token_command, Cli, CliCommand},
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_level = if cli.verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match cli.command {
        Some(CliCommand::Version) => {
            println!("ssjitsi {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        Some(CliCommand::Token(args)) => {
            handle_token_command(args)?;
            return Ok(());
        }
        Some(CliCommand::Join(args)) => {
            handle_join_command(args).await?;
            return Ok(());
        }
        Some(CliCommand::Serve) | None => {}
    }

    app::run_service(cli.config.as_deref()).await
}
