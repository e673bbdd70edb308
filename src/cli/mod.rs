use crate::bot::Bot;
use crate::browser::ChromeLauncher;
use crate::config::BotConfig;
use crate::token;
use anyhow::{bail, Context, Result};
use std::sync::Arc;
use tracing::info;

pub mod args;

pub use args::{Cli, CliCommand, JoinCliArgs, TokenCliArgs};

/// Run one bot outside the service until it ends or Ctrl-C is pressed.
pub async fn handle_join_command(args: JoinCliArgs) -> Result<()> {
    let config = BotConfig {
        room: args.room,
        bot_name: args.bot_name,
        data_dir: args.data_dir,
        server: args.server,
        username: args.username,
        password: args.password,
        jwt_app_id: args.jwt_app_id,
        jwt_app_secret: args.jwt_app_secret,
        headless: args.headless,
        ..BotConfig::new("", "")
    };
    if config.room.trim().is_empty() {
        bail!("--room must not be empty");
    }

    let launcher = Arc::new(ChromeLauncher::new(args.browser));
    let id = uuid::Uuid::new_v4().to_string();
    let bot = Arc::new(Bot::new(id, config, launcher, args.capture_script));

    let session = bot
        .spawn_start()
        .await
        .context("Failed to start bot")?;
    info!("Press Ctrl-C to leave the meeting");

    tokio::select! {
        _ = session => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, leaving the meeting");
            bot.stop().await;
        }
    }

    if let Some(error) = bot.info().await.last_error {
        bail!("Bot session failed: {}", error);
    }
    Ok(())
}

pub fn handle_token_command(args: TokenCliArgs) -> Result<()> {
    let jwt = token::issue_token(
        &args.app_id,
        &args.app_secret,
        &args.server,
        &args.room,
        &args.name,
    )
    .context("Failed to issue token")?;
    println!("{}", jwt);
    Ok(())
}
