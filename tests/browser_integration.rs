//! Integration tests against a real Chrome/Chromium.
//!
//! These tests need a browser in PATH.
//! Run with: cargo test --test browser_integration -- --ignored

use ssjitsi::browser::{BrowserEvent, BrowserLauncher, ChromeLauncher, LaunchOptions};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const PAGE: &str = "data:text/html,<body><div id='greeting'>hello</div><input id='name'></body>";

#[tokio::test]
#[ignore] // Requires Chrome or Chromium
async fn test_drive_page_and_receive_binding_calls() {
    let allocator = CancellationToken::new();
    let mut launched = ChromeLauncher::new(None)
        .launch(
            LaunchOptions {
                headless: true,
                extra_flags: Vec::new(),
            },
            allocator.clone(),
        )
        .await
        .expect("browser should launch");
    let page = launched.page;

    page.navigate(PAGE).await.unwrap();
    assert_eq!(page.query_nodes("#greeting", 1).await.unwrap(), 1);
    assert_eq!(page.query_nodes("#missing", 0).await.unwrap(), 0);

    page.send_keys("#name", "Recorder").await.unwrap();
    let value = page
        .evaluate("document.querySelector('#name').value")
        .await
        .unwrap();
    assert_eq!(value, "Recorder");

    page.add_binding("ssbot_writeSound").await.unwrap();
    page.evaluate("window.ssbot_writeSound('{\"u\":\"s1\"}')")
        .await
        .unwrap();
    let event = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match launched.events.recv().await {
                Some(BrowserEvent::BindingCalled { name, payload }) => break (name, payload),
                Some(_) => continue,
                None => panic!("event stream closed"),
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(event.0, "ssbot_writeSound");
    assert_eq!(event.1, r#"{"u":"s1"}"#);

    let html = page.outer_html("body").await.unwrap();
    assert!(html.contains("hello"));

    let png = page.capture_screenshot(true).await.unwrap();
    assert!(png.starts_with(b"\x89PNG"));

    allocator.cancel();
}

#[tokio::test]
#[ignore] // Requires Chrome or Chromium
async fn test_click_missing_element_times_out() {
    let allocator = CancellationToken::new();
    let launched = ChromeLauncher::new(None)
        .launch(
            LaunchOptions {
                headless: true,
                extra_flags: Vec::new(),
            },
            allocator.clone(),
        )
        .await
        .expect("browser should launch");

    launched.page.navigate(PAGE).await.unwrap();
    let result = tokio::time::timeout(
        Duration::from_secs(60),
        launched.page.click("#does-not-exist"),
    )
    .await
    .unwrap();
    assert!(result.is_err());

    allocator.cancel();
}
