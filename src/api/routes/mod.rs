//! API route modules.

pub mod bots;
