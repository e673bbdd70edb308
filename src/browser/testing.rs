//! In-memory automation capability for tests.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{
    BrowserError, BrowserEvent, BrowserLauncher, LaunchOptions, LaunchedBrowser, PageSession,
    PermissionSetting,
};

pub const FAKE_PNG: &[u8] = b"\x89PNG\r\n\x1a\nfake";

#[derive(Default)]
struct FakeState {
    calls: Mutex<Vec<String>>,
    fail_on: Mutex<Option<String>>,
    block_on: Mutex<Option<String>>,
    in_flight: AtomicUsize,
    login_form: Mutex<bool>,
    events: Mutex<Option<mpsc::UnboundedSender<BrowserEvent>>>,
    allocators: Mutex<Vec<CancellationToken>>,
    launches: AtomicUsize,
}

/// Records every command and lets tests inject page events.
#[derive(Clone, Default)]
pub struct FakeLauncher {
    state: Arc<FakeState>,
}

impl FakeLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the first command whose log line contains `needle` fail.
    pub fn fail_on(&self, needle: &str) {
        *self.state.fail_on.lock().unwrap() = Some(needle.to_string());
    }

    /// Make every command whose log line contains `needle` hang until the
    /// browser is released, then fail as a closed connection would.
    pub fn block_on(&self, needle: &str) {
        *self.state.block_on.lock().unwrap() = Some(needle.to_string());
    }

    /// Number of commands currently hanging on [`FakeLauncher::block_on`].
    pub fn in_flight(&self) -> usize {
        self.state.in_flight.load(Ordering::SeqCst)
    }

    pub fn with_login_form(&self) {
        *self.state.login_form.lock().unwrap() = true;
    }

    pub fn launches(&self) -> usize {
        self.state.launches.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.calls.lock().unwrap().clone()
    }

    pub fn called(&self, needle: &str) -> bool {
        self.calls().iter().any(|c| c.contains(needle))
    }

    /// Push an event into the most recently launched page.
    pub fn emit(&self, event: BrowserEvent) {
        if let Some(tx) = self.state.events.lock().unwrap().as_ref() {
            let _ = tx.send(event);
        }
    }

    pub fn last_allocator(&self) -> Option<CancellationToken> {
        self.state.allocators.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn launch(
        &self,
        options: LaunchOptions,
        allocator: CancellationToken,
    ) -> Result<LaunchedBrowser, BrowserError> {
        self.state.launches.fetch_add(1, Ordering::SeqCst);
        self.state.allocators.lock().unwrap().push(allocator.clone());
        self.state
            .calls
            .lock()
            .unwrap()
            .push(format!("launch headless={}", options.headless));

        let (tx, rx) = mpsc::unbounded_channel();
        *self.state.events.lock().unwrap() = Some(tx);

        Ok(LaunchedBrowser {
            page: Arc::new(FakePage {
                state: Arc::clone(&self.state),
                allocator,
            }),
            events: rx,
        })
    }
}

struct FakePage {
    state: Arc<FakeState>,
    allocator: CancellationToken,
}

struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl FakePage {
    async fn record(&self, call: String) -> Result<(), BrowserError> {
        self.state.calls.lock().unwrap().push(call.clone());
        {
            let mut fail_on = self.state.fail_on.lock().unwrap();
            if fail_on.as_deref().is_some_and(|needle| call.contains(needle)) {
                *fail_on = None;
                return Err(BrowserError::ElementNotFound(call));
            }
        }
        let blocks = self
            .state
            .block_on
            .lock()
            .unwrap()
            .as_deref()
            .is_some_and(|needle| call.contains(needle));

        if blocks {
            let _in_flight = InFlight::enter(&self.state.in_flight);
            self.allocator.cancelled().await;
            return Err(BrowserError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl PageSession for FakePage {
    async fn navigate(&self, url: &str) -> Result<(), BrowserError> {
        self.record(format!("navigate {url}")).await
    }

    async fn click(&self, selector: &str) -> Result<(), BrowserError> {
        self.record(format!("click {selector}")).await
    }

    async fn send_keys(&self, selector: &str, text: &str) -> Result<(), BrowserError> {
        self.record(format!("send_keys {selector} {text}")).await
    }

    async fn query_nodes(&self, selector: &str, _min_count: usize) -> Result<usize, BrowserError> {
        self.record(format!("query_nodes {selector}")).await?;
        let present = *self.state.login_form.lock().unwrap();
        Ok(usize::from(present && selector == "#login-dialog-username"))
    }

    async fn evaluate(&self, script: &str) -> Result<Value, BrowserError> {
        self.record(format!("evaluate {script}")).await?;
        Ok(Value::Null)
    }

    async fn add_binding(&self, name: &str) -> Result<(), BrowserError> {
        self.record(format!("add_binding {name}")).await
    }

    async fn set_permission(
        &self,
        name: &str,
        setting: PermissionSetting,
    ) -> Result<(), BrowserError> {
        self.record(format!("set_permission {name} {}", setting.as_str()))
            .await
    }

    async fn capture_screenshot(&self, full_page: bool) -> Result<Vec<u8>, BrowserError> {
        self.record(format!("capture_screenshot {full_page}")).await?;
        Ok(FAKE_PNG.to_vec())
    }

    async fn outer_html(&self, selector: &str) -> Result<String, BrowserError> {
        self.record(format!("outer_html {selector}")).await?;
        Ok("<body><div id=\"app\"></div></body>".to_string())
    }
}
