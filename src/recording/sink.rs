use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use super::fragment::Fragment;
use super::sanitize::safe_filename;

pub const DEFAULT_EXTENSION: &str = "bin";
const ROOM_FILE: &str = "room.json";

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("malformed fragment payload: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("fragment data is not valid base64: {0}")]
    Decode(#[from] base64::DecodeError),
    #[error("failed to persist fragment at {path:?}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Writes the fragments of one bot session to disk.
#[derive(Debug, Clone)]
pub struct RecordingSink {
    data_dir: PathBuf,
    session_id: String,
    extension: String,
}

impl RecordingSink {
    pub fn new(data_dir: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            data_dir: data_dir.into(),
            session_id: session_id.into(),
            extension: DEFAULT_EXTENSION.to_string(),
        }
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        let extension = extension.into();
        if !extension.is_empty() {
            self.extension = safe_filename(extension.trim_start_matches('.'));
        }
        self
    }

    /// Directory that holds all files of this session for `room`.
    pub fn session_dir(&self, room: &str) -> PathBuf {
        self.data_dir
            .join(safe_filename(room))
            .join(safe_filename(&self.session_id))
    }

    /// Parse a raw binding payload and ingest it.
    pub async fn ingest_payload(&self, payload: &str) -> Result<PathBuf, IngestError> {
        let fragment = Fragment::from_payload(payload)?;
        self.ingest(&fragment).await
    }

    /// Append one fragment to its stream file and write one-time metadata.
    ///
    /// Returns the path of the stream file the audio was appended to.
    pub async fn ingest(&self, fragment: &Fragment) -> Result<PathBuf, IngestError> {
        let data = STANDARD.decode(fragment.data.as_bytes())?;

        let dir = self.session_dir(&fragment.room);
        fs::create_dir_all(&dir)
            .await
            .map_err(|source| IngestError::Persistence {
                path: dir.clone(),
                source,
            })?;

        let user_id = safe_filename(&fragment.user_id);
        let stream_key = format!("{}_{}", user_id, safe_filename(&fragment.stream_tag));
        let stream_path = dir.join(format!("{}.{}", stream_key, self.extension));

        append(&stream_path, &data)
            .await
            .map_err(|source| IngestError::Persistence {
                path: stream_path.clone(),
                source,
            })?;
        debug!("Appended {} bytes to {:?}", data.len(), stream_path);

        let started_ms = chrono::Utc::now().timestamp_millis().to_string();
        write_once(&dir.join(format!("{}_start.json", stream_key)), &started_ms).await;
        write_once(&dir.join(format!("{}.json", user_id)), &fragment.display_name).await;
        write_once(&dir.join(ROOM_FILE), &fragment.room).await;

        Ok(stream_path)
    }
}

async fn append(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(data).await?;
    file.flush().await
}

/// Create `path` with `contents` unless it already exists. Failures are logged.
async fn write_once(path: &Path, contents: &str) {
    let result = async {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await?;
        file.write_all(contents.as_bytes()).await?;
        file.flush().await
    }
    .await;

    match result {
        Ok(()) => debug!("Wrote metadata {:?}", path),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
        Err(e) => warn!("Failed to write metadata {:?}: {}", path, e),
    }
}
