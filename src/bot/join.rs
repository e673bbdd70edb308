//! Join protocols: how a bot gets from a blank page into the meeting.
//!
//! Selectors target the Jitsi Meet web UI.

use tracing::info;
use url::Url;

use crate::browser::{BrowserError, PageSession, PermissionSetting};
use crate::config::BotConfig;
use crate::token::{self, TokenError};

use super::session::BotTimings;
use super::{AuthMethod, BotError};

const MEETING_NAME_INPUT: &str = r#"[aria-label="Meeting name input"]"#;
const ENTER_ROOM_BUTTON: &str = "#enter_room_button";
const DISPLAY_NAME_INPUT: &str = r#"[aria-label="Enter your name"]"#;
const JOIN_BUTTON: &str = r#"[aria-label="Join meeting"]"#;
const LOGIN_USERNAME: &str = "#login-dialog-username";
const LOGIN_PASSWORD: &str = "#login-dialog-password";
const LOGIN_BUTTON: &str = r#"[aria-label="Login"]"#;
const MICROPHONE: &str = "microphone";

fn step(name: &'static str) -> impl FnOnce(BrowserError) -> BotError {
    move |source| BotError::Join { step: name, source }
}

/// Join the configured room, picking the protocol from the bot's credentials.
pub async fn join(
    page: &dyn PageSession,
    config: &BotConfig,
    timings: &BotTimings,
) -> Result<(), BotError> {
    match config.auth_method() {
        AuthMethod::Jwt => join_with_token(page, config, timings).await,
        AuthMethod::Password | AuthMethod::None => join_with_form(page, config, timings).await,
    }
}

/// Direct link into the room carrying the admission token.
pub fn meeting_url(server: &str, room: &str, jwt: &str) -> Result<Url, TokenError> {
    let base = format!("{}/{}", server.trim_end_matches('/'), room);
    let mut url = Url::parse(&base).map_err(|e| TokenError::InvalidServerUrl {
        url: server.to_string(),
        reason: e.to_string(),
    })?;
    url.query_pairs_mut().append_pair("jwt", jwt);
    Ok(url)
}

async fn join_with_token(
    page: &dyn PageSession,
    config: &BotConfig,
    timings: &BotTimings,
) -> Result<(), BotError> {
    info!("Joining {} with token authentication", config.room);

    let jwt = token::issue_token(
        &config.jwt_app_id,
        &config.jwt_app_secret,
        &config.server,
        &config.room,
        &config.bot_name,
    )?;
    let url = meeting_url(&config.server, &config.room, &jwt)?;
    info!(
        "Navigating to {}/{}?jwt=***",
        config.server.trim_end_matches('/'),
        config.room
    );

    page.navigate(url.as_str()).await.map_err(step("navigate"))?;
    page.set_permission(MICROPHONE, PermissionSetting::Denied)
        .await
        .map_err(step("deny microphone"))?;
    tokio::time::sleep(timings.settle_long).await;
    page.click(JOIN_BUTTON).await.map_err(step("join meeting"))?;
    tokio::time::sleep(timings.settle_long).await;
    Ok(())
}

async fn join_with_form(
    page: &dyn PageSession,
    config: &BotConfig,
    timings: &BotTimings,
) -> Result<(), BotError> {
    info!("Joining {} through the meeting form", config.room);

    page.navigate(&config.server).await.map_err(step("navigate"))?;
    page.click(MEETING_NAME_INPUT)
        .await
        .map_err(step("focus meeting name"))?;
    page.send_keys(MEETING_NAME_INPUT, &config.room)
        .await
        .map_err(step("enter meeting name"))?;
    page.click(ENTER_ROOM_BUTTON)
        .await
        .map_err(step("enter room"))?;
    page.set_permission(MICROPHONE, PermissionSetting::Denied)
        .await
        .map_err(step("deny microphone"))?;
    tokio::time::sleep(timings.settle_short).await;
    page.send_keys(DISPLAY_NAME_INPUT, &config.bot_name)
        .await
        .map_err(step("enter display name"))?;
    // The prejoin screen swallows the first click.
    page.click(JOIN_BUTTON).await.map_err(step("join meeting"))?;
    page.click(JOIN_BUTTON).await.map_err(step("confirm join"))?;
    tokio::time::sleep(timings.settle_long).await;

    let login_form = page
        .query_nodes(LOGIN_USERNAME, 0)
        .await
        .map_err(step("check login dialog"))?;
    if login_form > 0 {
        if config.username.is_empty() {
            return Err(BotError::LoginRequired);
        }
        info!("Room requires login, signing in as {}", config.username);
        page.send_keys(LOGIN_USERNAME, &config.username)
            .await
            .map_err(step("enter username"))?;
        page.send_keys(LOGIN_PASSWORD, &config.password)
            .await
            .map_err(step("enter password"))?;
        page.click(LOGIN_BUTTON).await.map_err(step("login"))?;
        tokio::time::sleep(timings.settle_short).await;
    }
    Ok(())
}
