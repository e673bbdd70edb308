use crate::api::ApiServer;
use crate::bot::{Bot, BotRegistry};
use crate::browser::{BrowserLauncher, ChromeLauncher};
use crate::config::Config;
use crate::global;
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub async fn run_service(config_path: Option<&Path>) -> Result<()> {
    info!("Starting ssjitsi service");

    let path = global::resolve_config_file(config_path)?;
    let config = Config::load(&path).context("Failed to load configuration")?;
    if config.bots.is_empty() {
        warn!("No bots configured in {:?}", path);
    }

    let launcher: Arc<dyn BrowserLauncher> = Arc::new(ChromeLauncher::new(config.browser.clone()));
    let registry = Arc::new(BotRegistry::new());
    register_bots(&config, launcher, &registry).await;

    for bot in registry.all().await {
        if let Err(e) = bot.spawn_start().await {
            error!("Failed to start bot {}: {}", bot.id(), e);
        }
    }

    let shutdown = CancellationToken::new();
    let api_server = ApiServer::new(&config, Arc::clone(&registry));
    let server_shutdown = shutdown.clone();
    // A server that fails to bind or crashes takes the service down with it.
    let server = tokio::spawn(async move {
        let result = api_server.start(server_shutdown.clone()).await;
        server_shutdown.cancel();
        result
    });

    info!("ssjitsi is ready ({} bots)", registry.len().await);

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl-C")?;
            info!("Shutdown requested");
        }
        _ = shutdown.cancelled() => {}
    }

    shutdown.cancel();
    registry.stop_all().await;
    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("API server failed: {}", e),
        Err(e) => error!("API server task panicked: {}", e),
    }

    info!("ssjitsi stopped");
    Ok(())
}

/// Give every configured bot a fresh id and add it to the registry.
async fn register_bots(config: &Config, launcher: Arc<dyn BrowserLauncher>, registry: &BotRegistry) {
    for (index, bot_config) in config.bots.iter().enumerate() {
        let id = uuid::Uuid::new_v4().to_string();
        info!(
            "Registering bot {}: room '{}', name '{}' (id {})",
            index + 1,
            bot_config.room,
            bot_config.bot_name,
            id
        );
        let bot = Bot::new(
            id,
            bot_config.clone(),
            Arc::clone(&launcher),
            config.capture_script.clone(),
        );
        registry.register(bot).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::testing::FakeLauncher;

    #[tokio::test]
    async fn test_register_bots_assigns_unique_ids() {
        let config = Config::from_yaml(
            r#"
bots:
  - Room: demo
    JitsiServer: https://meet.example.org/
    DataDir: /tmp/ssjitsi
  - Room: demo
    JitsiServer: https://meet.example.org/
    DataDir: /tmp/ssjitsi
"#,
        )
        .unwrap();

        let registry = BotRegistry::new();
        register_bots(&config, Arc::new(FakeLauncher::new()), &registry).await;

        let infos = registry.list().await;
        assert_eq!(infos.len(), 2);
        assert_ne!(infos[0].id, infos[1].id);
        assert!(infos.iter().all(|i| i.room == "demo"));
    }
}
