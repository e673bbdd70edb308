use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "ssjitsi")]
#[command(about = "Recording bots for Jitsi Meet", long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file (default: ./ssjitsi.yaml, then the user config dir)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<CliCommand>,
}

#[derive(Subcommand, Debug)]
pub enum CliCommand {
    /// Run every configured bot and the HTTP control plane (default)
    Serve,
    /// Run a single bot from command-line flags until Ctrl-C
    Join(JoinCliArgs),
    /// Print a meeting admission token
    Token(TokenCliArgs),
    /// Print version information
    Version,
}

#[derive(ClapArgs, Debug)]
pub struct JoinCliArgs {
    /// Room to join
    #[arg(long, default_value = "ssjitsi-test")]
    pub room: String,
    /// Display name of the bot
    #[arg(long, default_value = "SSJitsiBot")]
    pub bot_name: String,
    /// Where recordings are written
    #[arg(long, default_value = "data")]
    pub data_dir: PathBuf,
    /// Jitsi Meet server URL
    #[arg(long, default_value = "https://meet.jit.si/")]
    pub server: String,
    /// Login dialog username
    #[arg(long, default_value = "")]
    pub username: String,
    /// Login dialog password
    #[arg(long, default_value = "", env = "SSJITSI_PASSWORD", hide_env_values = true)]
    pub password: String,
    /// Application id for token authentication
    #[arg(long, default_value = "")]
    pub jwt_app_id: String,
    /// Application secret for token authentication
    #[arg(long, default_value = "", env = "SSJITSI_JWT_SECRET", hide_env_values = true)]
    pub jwt_app_secret: String,
    /// Run the browser without a window
    #[arg(long)]
    pub headless: bool,
    /// In-page capture script
    #[arg(long, default_value = "script.js")]
    pub capture_script: PathBuf,
    /// Browser executable (default: first Chrome/Chromium in PATH)
    #[arg(long)]
    pub browser: Option<PathBuf>,
}

#[derive(ClapArgs, Debug)]
pub struct TokenCliArgs {
    /// Application id (issuer and audience)
    #[arg(long)]
    pub app_id: String,
    /// Application secret used to sign the token
    #[arg(long, env = "SSJITSI_JWT_SECRET", hide_env_values = true)]
    pub app_secret: String,
    /// Jitsi Meet server URL
    #[arg(long)]
    pub server: String,
    /// Room the token admits to
    #[arg(long)]
    pub room: String,
    /// Display name carried in the token
    #[arg(long, default_value = "SSJitsiBot")]
    pub name: String,
}
