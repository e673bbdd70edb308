//! Lifecycle of a single bot.
//!
//! Status, cancellation handles and the live page sit behind one mutex so a
//! reader never sees `running` without handles or handles without a status.

use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::browser::{BrowserLauncher, LaunchOptions, LaunchedBrowser, PageSession};
use crate::config::BotConfig;
use crate::recording::{RecordingSink, WRITE_SOUND_BINDING};

use super::events::dispatch_events;
use super::join::join;
use super::{BotError, BotInfo, BotStatus};

/// Fixed waits used while driving the meeting UI.
#[derive(Debug, Clone, Copy)]
pub struct BotTimings {
    pub settle_short: Duration,
    pub settle_long: Duration,
    /// Pause between stop and start on restart, so the old browser can exit.
    pub restart_grace: Duration,
}

impl Default for BotTimings {
    fn default() -> Self {
        Self {
            settle_short: Duration::from_secs(1),
            settle_long: Duration::from_secs(2),
            restart_grace: Duration::from_secs(2),
        }
    }
}

impl BotTimings {
    /// No waiting at all.
    pub fn immediate() -> Self {
        Self {
            settle_short: Duration::ZERO,
            settle_long: Duration::ZERO,
            restart_grace: Duration::ZERO,
        }
    }
}

#[derive(Default)]
struct BotRuntime {
    status: BotStatus,
    session: Option<CancellationToken>,
    allocator: Option<CancellationToken>,
    page: Option<Arc<dyn PageSession>>,
    /// Bumped on every start so a finished run never clobbers a newer one.
    generation: u64,
    started_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

struct SessionHandles {
    generation: u64,
    session: CancellationToken,
    allocator: CancellationToken,
}

pub struct Bot {
    id: String,
    config: BotConfig,
    launcher: Arc<dyn BrowserLauncher>,
    capture_script: PathBuf,
    timings: BotTimings,
    runtime: Mutex<BotRuntime>,
}

impl Bot {
    pub fn new(
        id: impl Into<String>,
        config: BotConfig,
        launcher: Arc<dyn BrowserLauncher>,
        capture_script: impl Into<PathBuf>,
    ) -> Self {
        Self {
            id: id.into(),
            config,
            launcher,
            capture_script: capture_script.into(),
            timings: BotTimings::default(),
            runtime: Mutex::new(BotRuntime::default()),
        }
    }

    pub fn with_timings(mut self, timings: BotTimings) -> Self {
        self.timings = timings;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &BotConfig {
        &self.config
    }

    pub async fn status(&self) -> BotStatus {
        self.runtime.lock().await.status
    }

    pub async fn info(&self) -> BotInfo {
        let runtime = self.runtime.lock().await;
        BotInfo {
            id: self.id.clone(),
            room: self.config.room.clone(),
            bot_name: self.config.bot_name.clone(),
            server: self.config.server.clone(),
            auth_method: self.config.auth_method(),
            status: runtime.status,
            snapshot_at: Utc::now(),
            started_at: runtime.started_at,
            last_error: runtime.last_error.clone(),
        }
    }

    /// The live page, available only while the bot is running.
    pub async fn page(&self) -> Result<Arc<dyn PageSession>, BotError> {
        let runtime = self.runtime.lock().await;
        match (&runtime.status, &runtime.page) {
            (BotStatus::Running, Some(page)) => Ok(Arc::clone(page)),
            (status, _) => Err(BotError::NotRunning(*status)),
        }
    }

    /// Join the meeting and stay in it until stopped.
    ///
    /// Returns once the session is over. Fails with
    /// [`BotError::AlreadyActive`] if the bot is not stopped.
    pub async fn start(&self) -> Result<(), BotError> {
        let handles = self.begin().await?;
        self.drive(handles).await
    }

    /// Like [`Bot::start`] but runs the session on its own task. The status
    /// check happens before this returns.
    pub async fn spawn_start(self: &Arc<Self>) -> Result<JoinHandle<()>, BotError> {
        let handles = self.begin().await?;
        let bot = Arc::clone(self);
        Ok(tokio::spawn(async move {
            let _ = bot.drive(handles).await;
        }))
    }

    /// Cancel the session and release the browser. Does nothing when the bot
    /// is already stopped.
    pub async fn stop(&self) {
        let mut runtime = self.runtime.lock().await;
        if runtime.status == BotStatus::Stopped {
            debug!("Bot {} already stopped", self.id);
            return;
        }

        info!("Stopping bot {} (status: {})", self.id, runtime.status);
        runtime.status = BotStatus::Stopping;
        if let Some(session) = runtime.session.take() {
            session.cancel();
        }
        if let Some(allocator) = runtime.allocator.take() {
            allocator.cancel();
        }
        runtime.page = None;
        runtime.started_at = None;
        runtime.status = BotStatus::Stopped;
        info!("Bot {} stopped", self.id);
    }

    /// Stop, wait for the browser to go away, then start again in the
    /// background. Progress is visible through [`Bot::status`] only.
    pub async fn restart(self: &Arc<Self>) -> Result<(), BotError> {
        info!("Restarting bot {} ({})", self.config.bot_name, self.id);
        self.stop().await;
        tokio::time::sleep(self.timings.restart_grace).await;
        self.spawn_start().await?;
        Ok(())
    }

    async fn begin(&self) -> Result<SessionHandles, BotError> {
        let mut runtime = self.runtime.lock().await;
        if runtime.status != BotStatus::Stopped {
            return Err(BotError::AlreadyActive(runtime.status));
        }

        let allocator = CancellationToken::new();
        let session = allocator.child_token();
        runtime.generation += 1;
        runtime.status = BotStatus::Starting;
        runtime.session = Some(session.clone());
        runtime.allocator = Some(allocator.clone());
        runtime.last_error = None;

        info!("Starting bot {} ({}) for room {}", self.config.bot_name, self.id, self.config.room);
        Ok(SessionHandles {
            generation: runtime.generation,
            session,
            allocator,
        })
    }

    async fn drive(&self, handles: SessionHandles) -> Result<(), BotError> {
        let result = self.run(&handles).await;
        let result = self.finish(&handles, result).await;

        match &result {
            Ok(()) => info!("Bot {} ({}) left the meeting", self.config.bot_name, self.id),
            Err(BotError::Cancelled) => info!("Start of bot {} cancelled", self.id),
            Err(e) => error!("Bot {} failed to start: {}", self.id, e),
        }
        result
    }

    async fn run(&self, handles: &SessionHandles) -> Result<(), BotError> {
        let session = &handles.session;

        let script = tokio::fs::read_to_string(&self.capture_script)
            .await
            .map_err(|source| BotError::CaptureScript {
                path: self.capture_script.clone(),
                source,
            })?;

        let options = LaunchOptions {
            headless: self.config.headless,
            extra_flags: Vec::new(),
        };
        // A cancelled session wins over a command that failed because the
        // browser went away.
        let LaunchedBrowser { page, events } = tokio::select! {
            biased;
            _ = session.cancelled() => return Err(BotError::Cancelled),
            launched = self.launcher.launch(options, handles.allocator.clone()) => {
                launched.map_err(BotError::Launch)?
            }
        };

        let sink = RecordingSink::new(&self.config.data_dir, &self.id)
            .with_extension(&self.config.recording_extension);
        tokio::spawn(dispatch_events(
            self.id.clone(),
            events,
            sink,
            session.clone(),
        ));

        tokio::select! {
            biased;
            _ = session.cancelled() => return Err(BotError::Cancelled),
            joined = self.join_and_capture(page.as_ref(), &script) => joined?,
        }

        if !self.mark_running(handles.generation, page).await {
            return Err(BotError::Cancelled);
        }
        info!("Bot {} ({}) is running in {}", self.config.bot_name, self.id, self.config.room);

        session.cancelled().await;
        Ok(())
    }

    async fn join_and_capture(&self, page: &dyn PageSession, script: &str) -> Result<(), BotError> {
        join(page, &self.config, &self.timings).await?;
        page.add_binding(WRITE_SOUND_BINDING)
            .await
            .map_err(|source| BotError::Join {
                step: "install binding",
                source,
            })?;
        page.evaluate(script)
            .await
            .map_err(|source| BotError::Join {
                step: "inject capture script",
                source,
            })?;
        Ok(())
    }

    async fn mark_running(&self, generation: u64, page: Arc<dyn PageSession>) -> bool {
        let mut runtime = self.runtime.lock().await;
        if runtime.generation != generation || runtime.status != BotStatus::Starting {
            return false;
        }
        runtime.status = BotStatus::Running;
        runtime.page = Some(page);
        runtime.started_at = Some(Utc::now());
        true
    }

    /// Tear down after a run that ended without `stop`: a failed join or a
    /// browser that went away on its own.
    ///
    /// Handles still present in the runtime mean nobody called `stop`, so a
    /// cancellation seen here came from the browser exiting.
    async fn finish(
        &self,
        handles: &SessionHandles,
        result: Result<(), BotError>,
    ) -> Result<(), BotError> {
        let mut runtime = self.runtime.lock().await;
        if runtime.generation != handles.generation || runtime.session.is_none() {
            return result;
        }

        let result = match result {
            Err(BotError::Cancelled) => Err(BotError::BrowserExited),
            other => other,
        };

        handles.session.cancel();
        handles.allocator.cancel();
        runtime.session = None;
        runtime.allocator = None;
        runtime.page = None;
        runtime.started_at = None;
        runtime.status = BotStatus::Stopped;
        runtime.last_error = match &result {
            Ok(()) => {
                warn!("Browser of bot {} exited unexpectedly", self.id);
                Some("browser exited unexpectedly".to_string())
            }
            Err(e) => Some(e.to_string()),
        };
        result
    }
}
