//! Browser automation capability used by the bots.
//!
//! [`BrowserLauncher`] starts an isolated browser and hands back a
//! [`PageSession`] plus an ordered stream of [`BrowserEvent`]s. The Chrome
//! implementation lives in [`chrome`] and speaks the DevTools protocol via
//! [`cdp`].

pub mod cdp;
pub mod chrome;
pub mod event;

#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub use chrome::ChromeLauncher;
pub use event::BrowserEvent;

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("failed to launch browser: {0}")]
    Launch(String),
    #[error("DevTools connection failed: {0}")]
    Connection(String),
    #[error("DevTools connection closed")]
    Closed,
    #[error("{method} failed ({code}): {message}")]
    Protocol {
        method: String,
        code: i64,
        message: String,
    },
    #[error("timed out waiting for {0}")]
    Timeout(String),
    #[error("no element matches selector {0:?}")]
    ElementNotFound(String),
    #[error("script error: {0}")]
    Script(String),
    #[error("unexpected DevTools response: {0}")]
    Response(String),
}

/// Launch parameters for one isolated browser instance.
#[derive(Debug, Clone, Default)]
pub struct LaunchOptions {
    pub headless: bool,
    /// Extra `--flag` / `--flag=value` arguments.
    pub extra_flags: Vec<String>,
}

/// Outcome applied to a browser permission request. The bots only ever deny.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionSetting {
    Granted,
    Denied,
}

impl PermissionSetting {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Granted => "granted",
            Self::Denied => "denied",
        }
    }
}

/// A freshly launched browser: its page and the page's event stream.
pub struct LaunchedBrowser {
    pub page: Arc<dyn PageSession>,
    pub events: mpsc::UnboundedReceiver<BrowserEvent>,
}

#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    /// Launch a browser. Cancelling `allocator` must release the browser
    /// process and everything it owns.
    async fn launch(
        &self,
        options: LaunchOptions,
        allocator: CancellationToken,
    ) -> Result<LaunchedBrowser, BrowserError>;
}

/// Commands against a single page. Implementations serialize calls so two
/// tasks never interleave commands on the same page.
#[async_trait]
pub trait PageSession: Send + Sync {
    /// Navigate and wait for the load event.
    async fn navigate(&self, url: &str) -> Result<(), BrowserError>;

    /// Wait for `selector` and click the first match.
    async fn click(&self, selector: &str) -> Result<(), BrowserError>;

    /// Wait for `selector`, focus it and type `text`.
    async fn send_keys(&self, selector: &str, text: &str) -> Result<(), BrowserError>;

    /// Count nodes matching `selector`, waiting until at least `min_count`
    /// exist. With `min_count == 0` this never waits.
    async fn query_nodes(&self, selector: &str, min_count: usize) -> Result<usize, BrowserError>;

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value, BrowserError>;

    /// Expose `window.<name>(payload)` to page scripts.
    async fn add_binding(&self, name: &str) -> Result<(), BrowserError>;

    async fn set_permission(
        &self,
        name: &str,
        setting: PermissionSetting,
    ) -> Result<(), BrowserError>;

    /// PNG bytes of the current page.
    async fn capture_screenshot(&self, full_page: bool) -> Result<Vec<u8>, BrowserError>;

    async fn outer_html(&self, selector: &str) -> Result<String, BrowserError>;
}

/// How long element lookups wait before giving up.
pub const ELEMENT_TIMEOUT: Duration = Duration::from_secs(30);

/// Quote `value` as a JavaScript string literal.
pub(crate) fn js_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}
