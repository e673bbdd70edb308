//! Recording sink for audio fragments pushed out of the meeting page.
//!
//! The capture script calls the `ssbot_writeSound` binding with one JSON
//! [`Fragment`] per chunk of encoded audio. Each fragment is appended to a
//! per-user file under `<data_dir>/<room>/<session>/`.

pub mod fragment;
pub mod sanitize;
pub mod sink;

pub use fragment::Fragment;
pub use sanitize::safe_filename;
pub use sink::{IngestError, RecordingSink, DEFAULT_EXTENSION};

/// Name of the page binding the capture script invokes.
pub const WRITE_SOUND_BINDING: &str = "ssbot_writeSound";
