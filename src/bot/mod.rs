//! Meeting bots: lifecycle, join protocols and the registry shared with the
//! control plane.

pub mod events;
pub mod info;
pub mod join;
pub mod registry;
pub mod session;
pub mod status;

use std::path::PathBuf;
use thiserror::Error;

use crate::browser::BrowserError;
use crate::token::TokenError;

pub use info::{AuthMethod, BotInfo};
pub use registry::BotRegistry;
pub use session::{Bot, BotTimings};
pub use status::BotStatus;

#[derive(Debug, Error)]
pub enum BotError {
    #[error("bot is already {0}")]
    AlreadyActive(BotStatus),
    #[error("bot is {0}, not running")]
    NotRunning(BotStatus),
    #[error("failed to read capture script {path:?}: {source}")]
    CaptureScript {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("browser startup failed: {0}")]
    Launch(#[source] BrowserError),
    #[error("join step '{step}' failed: {source}")]
    Join {
        step: &'static str,
        #[source]
        source: BrowserError,
    },
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error("room requires login but no username is configured")]
    LoginRequired,
    #[error("session was cancelled")]
    Cancelled,
    #[error("browser exited during start")]
    BrowserExited,
    #[error(transparent)]
    Browser(#[from] BrowserError),
}
