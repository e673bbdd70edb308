//! Chrome/Chromium launcher and page driver.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use regex::Regex;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{ChildStderr, Command};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::{sleep, timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::cdp::{CdpConnection, CdpEvent};
use super::{
    js_string, BrowserError, BrowserEvent, BrowserLauncher, LaunchOptions, LaunchedBrowser,
    PageSession, PermissionSetting, ELEMENT_TIMEOUT,
};

const CHROME_CANDIDATES: &[&str] = &[
    "google-chrome",
    "google-chrome-stable",
    "chromium",
    "chromium-browser",
    "chrome",
];

/// Flags every automated browser starts with.
const DEFAULT_FLAGS: &[&str] = &[
    "--no-first-run",
    "--no-default-browser-check",
    "--hide-scrollbars",
    "--mute-audio",
    "--disable-background-networking",
    "--disable-background-timer-throttling",
    "--disable-backgrounding-occluded-windows",
    "--disable-breakpad",
    "--disable-client-side-phishing-detection",
    "--disable-default-apps",
    "--disable-dev-shm-usage",
    "--disable-extensions",
    "--disable-features=site-per-process,Translate",
    "--disable-hang-monitor",
    "--disable-ipc-flooding-protection",
    "--disable-popup-blocking",
    "--disable-prompt-on-repost",
    "--disable-renderer-backgrounding",
    "--disable-sync",
    "--force-color-profile=srgb",
    "--metrics-recording-only",
    "--enable-automation",
    "--password-store=basic",
    "--use-mock-keychain",
    "--use-fake-ui-for-media-stream",
    "--remote-debugging-port=0",
];

const LAUNCH_TIMEOUT: Duration = Duration::from_secs(20);
const LOAD_TIMEOUT: Duration = Duration::from_secs(30);
const POLL_INTERVAL: Duration = Duration::from_millis(100);

fn devtools_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"DevTools listening on (ws://\S+)").expect("valid regex"))
}

/// Extract the browser WebSocket endpoint from a Chrome stderr line.
pub fn parse_devtools_url(line: &str) -> Option<String> {
    devtools_regex()
        .captures(line)
        .map(|caps| caps[1].to_string())
}

/// Launches a local Chrome or Chromium per bot session.
#[derive(Debug, Clone, Default)]
pub struct ChromeLauncher {
    executable: Option<PathBuf>,
}

impl ChromeLauncher {
    pub fn new(executable: Option<PathBuf>) -> Self {
        Self { executable }
    }

    fn resolve_executable(&self) -> Result<PathBuf, BrowserError> {
        if let Some(path) = &self.executable {
            return Ok(path.clone());
        }
        CHROME_CANDIDATES
            .iter()
            .find_map(|name| which::which(name).ok())
            .ok_or_else(|| {
                BrowserError::Launch("no Chrome or Chromium executable found in PATH".to_string())
            })
    }

    pub fn build_args(options: &LaunchOptions, profile_dir: &Path) -> Vec<String> {
        let mut args: Vec<String> = DEFAULT_FLAGS.iter().map(|f| f.to_string()).collect();
        if options.headless {
            args.push("--headless=new".to_string());
        }
        args.push(format!("--user-data-dir={}", profile_dir.display()));
        args.extend(options.extra_flags.iter().cloned());
        args.push("about:blank".to_string());
        args
    }
}

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    async fn launch(
        &self,
        options: LaunchOptions,
        allocator: CancellationToken,
    ) -> Result<LaunchedBrowser, BrowserError> {
        let executable = self.resolve_executable()?;
        let profile = tempfile::Builder::new()
            .prefix("ssjitsi-profile-")
            .tempdir()
            .map_err(|e| BrowserError::Launch(format!("failed to create profile dir: {e}")))?;
        let downloads = profile.path().join("downloads");
        let args = Self::build_args(&options, profile.path());

        info!(
            "Launching browser {:?} (headless: {})",
            executable, options.headless
        );

        let mut child = Command::new(&executable)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| BrowserError::Launch(format!("{}: {}", executable.display(), e)))?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| BrowserError::Launch("browser stderr not captured".to_string()))?;
        let mut lines = BufReader::new(stderr).lines();

        let ws_url = match timeout(LAUNCH_TIMEOUT, wait_for_devtools_url(&mut lines)).await {
            Ok(Ok(url)) => url,
            Ok(Err(e)) => {
                let _ = child.kill().await;
                return Err(e);
            }
            Err(_) => {
                let _ = child.kill().await;
                return Err(BrowserError::Timeout("DevTools endpoint".to_string()));
            }
        };

        tokio::spawn(async move {
            while let Ok(Some(line)) = lines.next_line().await {
                debug!("chrome: {}", line);
            }
        });

        // The reaper owns the process and its profile. A browser that exits on
        // its own cancels the allocator so the owning bot notices.
        let reaper_token = allocator.clone();
        tokio::spawn(async move {
            let _profile = profile;
            let exited = tokio::select! {
                _ = reaper_token.cancelled() => false,
                status = child.wait() => {
                    warn!("Browser process exited: {:?}", status);
                    true
                }
            };
            if exited {
                reaper_token.cancel();
            } else {
                match child.kill().await {
                    Ok(()) => debug!("Browser process killed"),
                    Err(e) => warn!("Failed to kill browser process: {}", e),
                }
            }
        });

        match ChromePage::attach(&ws_url, &downloads).await {
            Ok(launched) => Ok(launched),
            Err(e) => {
                allocator.cancel();
                Err(e)
            }
        }
    }
}

async fn wait_for_devtools_url(
    lines: &mut Lines<BufReader<ChildStderr>>,
) -> Result<String, BrowserError> {
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if let Some(url) = parse_devtools_url(&line) {
                    return Ok(url);
                }
                debug!("chrome: {}", line);
            }
            Ok(None) => {
                return Err(BrowserError::Launch(
                    "browser exited before opening DevTools".to_string(),
                ))
            }
            Err(e) => return Err(BrowserError::Launch(e.to_string())),
        }
    }
}

/// One attached page target.
pub struct ChromePage {
    conn: CdpConnection,
    session_id: String,
    loads: watch::Receiver<u64>,
    gate: Mutex<()>,
}

impl ChromePage {
    async fn attach(ws_url: &str, downloads: &Path) -> Result<LaunchedBrowser, BrowserError> {
        let (conn, raw_events) = CdpConnection::connect(ws_url).await?;

        let target = conn
            .call("Target.createTarget", json!({ "url": "about:blank" }), None)
            .await?;
        let target_id = str_result(&target, "targetId")?;
        let attached = conn
            .call(
                "Target.attachToTarget",
                json!({ "targetId": target_id, "flatten": true }),
                None,
            )
            .await?;
        let session_id = str_result(&attached, "sessionId")?;

        conn.call("Page.enable", json!({}), Some(&session_id)).await?;
        conn.call("Runtime.enable", json!({}), Some(&session_id)).await?;
        conn.call(
            "Browser.setDownloadBehavior",
            json!({
                "behavior": "allowAndName",
                "downloadPath": downloads.to_string_lossy(),
                "eventsEnabled": true,
            }),
            None,
        )
        .await?;

        let (event_tx, events) = mpsc::unbounded_channel();
        let (load_tx, loads) = watch::channel(0u64);
        tokio::spawn(pump_events(raw_events, session_id.clone(), event_tx, load_tx));

        debug!("Attached to page target {} (session {})", target_id, session_id);

        let page = ChromePage {
            conn,
            session_id,
            loads,
            gate: Mutex::new(()),
        };
        Ok(LaunchedBrowser {
            page: Arc::new(page),
            events,
        })
    }

    async fn page_call(&self, method: &str, params: Value) -> Result<Value, BrowserError> {
        self.conn.call(method, params, Some(&self.session_id)).await
    }

    async fn eval_value(&self, expression: &str) -> Result<Value, BrowserError> {
        let response = self
            .page_call(
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": true,
                }),
            )
            .await?;

        if let Some(details) = response.get("exceptionDetails") {
            let message = details
                .get("exception")
                .and_then(|e| e.get("description"))
                .or_else(|| details.get("text"))
                .and_then(Value::as_str)
                .unwrap_or("uncaught exception");
            return Err(BrowserError::Script(message.to_string()));
        }

        Ok(response
            .get("result")
            .and_then(|r| r.get("value"))
            .cloned()
            .unwrap_or(Value::Null))
    }

    async fn count_nodes(&self, selector: &str) -> Result<usize, BrowserError> {
        let expression = format!("document.querySelectorAll({}).length", js_string(selector));
        let count = self.eval_value(&expression).await?;
        Ok(count.as_u64().unwrap_or(0) as usize)
    }

    async fn wait_for(&self, selector: &str, min_count: usize) -> Result<usize, BrowserError> {
        let deadline = Instant::now() + ELEMENT_TIMEOUT;
        loop {
            match self.count_nodes(selector).await {
                Ok(count) if count >= min_count => return Ok(count),
                Ok(_) => {}
                // Navigation in progress destroys the execution context; retry.
                Err(BrowserError::Protocol { .. }) => {}
                Err(e) => return Err(e),
            }
            if Instant::now() >= deadline {
                return Err(BrowserError::ElementNotFound(selector.to_string()));
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    async fn with_element(&self, selector: &str, action: &str) -> Result<Value, BrowserError> {
        self.wait_for(selector, 1).await?;
        let expression = format!(
            "(() => {{ const el = document.querySelector({}); if (!el) return null; {} }})()",
            js_string(selector),
            action
        );
        match self.eval_value(&expression).await? {
            Value::Null => Err(BrowserError::ElementNotFound(selector.to_string())),
            value => Ok(value),
        }
    }
}

#[async_trait]
impl PageSession for ChromePage {
    async fn navigate(&self, url: &str) -> Result<(), BrowserError> {
        let _gate = self.gate.lock().await;
        let mut loads = self.loads.clone();
        let _ = loads.borrow_and_update();

        let result = self.page_call("Page.navigate", json!({ "url": url })).await?;
        if let Some(error) = result.get("errorText").and_then(Value::as_str) {
            if !error.is_empty() {
                return Err(BrowserError::Response(format!("navigation failed: {error}")));
            }
        }

        match timeout(LOAD_TIMEOUT, loads.changed()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(BrowserError::Closed),
            Err(_) => Err(BrowserError::Timeout("page load".to_string())),
        }
    }

    async fn click(&self, selector: &str) -> Result<(), BrowserError> {
        let _gate = self.gate.lock().await;
        self.with_element(selector, "el.scrollIntoView({block: 'center'}); el.click(); return true;")
            .await
            .map(|_| ())
    }

    async fn send_keys(&self, selector: &str, text: &str) -> Result<(), BrowserError> {
        let _gate = self.gate.lock().await;
        self.with_element(selector, "el.focus(); return true;").await?;
        self.page_call("Input.insertText", json!({ "text": text }))
            .await
            .map(|_| ())
    }

    async fn query_nodes(&self, selector: &str, min_count: usize) -> Result<usize, BrowserError> {
        let _gate = self.gate.lock().await;
        if min_count == 0 {
            return self.count_nodes(selector).await;
        }
        self.wait_for(selector, min_count).await
    }

    async fn evaluate(&self, script: &str) -> Result<Value, BrowserError> {
        let _gate = self.gate.lock().await;
        self.eval_value(script).await
    }

    async fn add_binding(&self, name: &str) -> Result<(), BrowserError> {
        let _gate = self.gate.lock().await;
        self.page_call("Runtime.addBinding", json!({ "name": name }))
            .await
            .map(|_| ())
    }

    async fn set_permission(
        &self,
        name: &str,
        setting: PermissionSetting,
    ) -> Result<(), BrowserError> {
        let _gate = self.gate.lock().await;
        self.conn
            .call(
                "Browser.setPermission",
                json!({
                    "permission": { "name": name },
                    "setting": setting.as_str(),
                }),
                None,
            )
            .await
            .map(|_| ())
    }

    async fn capture_screenshot(&self, full_page: bool) -> Result<Vec<u8>, BrowserError> {
        let _gate = self.gate.lock().await;
        let mut params = json!({ "format": "png" });

        if full_page {
            let metrics = self.page_call("Page.getLayoutMetrics", json!({})).await?;
            let size = metrics
                .get("cssContentSize")
                .or_else(|| metrics.get("contentSize"));
            if let Some(size) = size {
                let width = size.get("width").and_then(Value::as_f64).unwrap_or(0.0);
                let height = size.get("height").and_then(Value::as_f64).unwrap_or(0.0);
                if width > 0.0 && height > 0.0 {
                    params["clip"] = json!({
                        "x": 0, "y": 0, "width": width, "height": height, "scale": 1
                    });
                    params["captureBeyondViewport"] = Value::Bool(true);
                }
            }
        }

        let shot = self.page_call("Page.captureScreenshot", params).await?;
        let data = str_result(&shot, "data")?;
        STANDARD
            .decode(data.as_bytes())
            .map_err(|e| BrowserError::Response(format!("screenshot is not base64: {e}")))
    }

    async fn outer_html(&self, selector: &str) -> Result<String, BrowserError> {
        let _gate = self.gate.lock().await;
        let expression = format!(
            "(() => {{ const el = document.querySelector({}); return el ? el.outerHTML : null; }})()",
            js_string(selector)
        );
        match self.eval_value(&expression).await? {
            Value::String(html) => Ok(html),
            _ => Err(BrowserError::ElementNotFound(selector.to_string())),
        }
    }
}

/// Route raw events of this page into bot events and load notifications.
async fn pump_events(
    mut raw: mpsc::UnboundedReceiver<CdpEvent>,
    session_id: String,
    events: mpsc::UnboundedSender<BrowserEvent>,
    loads: watch::Sender<u64>,
) {
    while let Some(event) = raw.recv().await {
        if !belongs_to(&event, &session_id) {
            continue;
        }
        if event.method == "Page.loadEventFired" {
            loads.send_modify(|count| *count += 1);
            continue;
        }
        if let Some(translated) = BrowserEvent::from_cdp(&event.method, &event.params) {
            let _ = events.send(translated);
        }
    }
}

fn belongs_to(event: &CdpEvent, session_id: &str) -> bool {
    event
        .session_id
        .as_deref()
        .map_or(true, |sid| sid == session_id)
}

fn str_result(value: &Value, key: &str) -> Result<String, BrowserError> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| BrowserError::Response(format!("missing {key:?} in {value}")))
}
