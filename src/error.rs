// Error type shared by every layer of the crate. Library code returns
// `DriveError`; the binary wraps it into `anyhow` at the edge.

use crate::tree::MirrorNode;
use std::path::PathBuf;
use thiserror::Error;

pub type DriveResult<T> = Result<T, DriveError>;

#[derive(Debug, Error)]
pub enum DriveError {
    #[error("local path not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("remote call failed for {id}: {source}")]
    Remote {
        id: String,
        #[source]
        source: Box<DriveError>,
    },

    #[error("drive api returned {status}: {body}")]
    Http { status: u16, body: String },

    #[error("incomplete write to {}: {written} of {expected} bytes", .path.display())]
    PartialWrite {
        path: PathBuf,
        written: u64,
        expected: u64,
    },

    #[error("mirror aborted after {} completed entries: {source}", .partial.entry_count())]
    MirrorAborted {
        partial: Box<MirrorNode>,
        #[source]
        source: Box<DriveError>,
    },

    #[error("maximum tree depth exceeded at {0}")]
    DepthExceeded(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("authorization error: {0}")]
    Auth(String),

    #[error("oauth error: {0}")]
    OAuth(#[from] yup_oauth2::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("http request error: {0}")]
    Request(#[from] reqwest::Error),
}

impl DriveError {
    /// Attach the remote identifier an API call was made for.
    pub fn remote(id: impl Into<String>, source: DriveError) -> Self {
        DriveError::Remote {
            id: id.into(),
            source: Box::new(source),
        }
    }

    /// The partial mirror carried by an aborted upload, if any.
    pub fn partial(&self) -> Option<&MirrorNode> {
        match self {
            DriveError::MirrorAborted { partial, .. } => Some(partial),
            _ => None,
        }
    }
}
