pub mod api;
pub mod app;
pub mod bot;
pub mod browser;
pub mod cli;
pub mod config;
pub mod global;
pub mod recording;
pub mod token;
