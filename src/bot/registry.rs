use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use super::{Bot, BotInfo};

/// All bots known to the service, keyed by id.
///
/// The map lock is only held to insert or clone handles; each bot guards its
/// own state, so bots can change status concurrently.
#[derive(Default)]
pub struct BotRegistry {
    bots: RwLock<HashMap<String, Arc<Bot>>>,
}

impl BotRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, bot: Bot) -> Arc<Bot> {
        let bot = Arc::new(bot);
        self.bots
            .write()
            .await
            .insert(bot.id().to_string(), Arc::clone(&bot));
        bot
    }

    pub async fn lookup(&self, id: &str) -> Option<Arc<Bot>> {
        self.bots.read().await.get(id).cloned()
    }

    pub async fn all(&self) -> Vec<Arc<Bot>> {
        let mut bots: Vec<_> = self.bots.read().await.values().cloned().collect();
        bots.sort_by(|a, b| {
            (a.config().room.as_str(), a.id()).cmp(&(b.config().room.as_str(), b.id()))
        });
        bots
    }

    pub async fn list(&self) -> Vec<BotInfo> {
        let mut infos = Vec::new();
        for bot in self.all().await {
            infos.push(bot.info().await);
        }
        infos
    }

    pub async fn len(&self) -> usize {
        self.bots.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.bots.read().await.is_empty()
    }

    pub async fn stop_all(&self) {
        let bots = self.all().await;
        info!("Stopping {} bots", bots.len());
        for bot in bots {
            bot.stop().await;
        }
    }
}
