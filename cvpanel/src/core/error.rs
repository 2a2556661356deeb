//! Error types for the panel core
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PanelError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("page '{0}' is not registered")]
    UnknownPage(String),

    #[error("duplicate page registration: {0}")]
    DuplicatePage(String),

    /// A page bundle failed its one-time capability validation
    #[error("invalid page '{page}': {reason}")]
    InvalidPage { page: String, reason: String },

    #[error("mode '{0}' is not defined")]
    UnknownMode(String),

    #[error("no control at slot {slot} on {owner}/{page}")]
    UnknownControl {
        owner: String,
        page: String,
        slot: String,
    },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("dispatch error: {0}")]
    Dispatch(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("MIDI error: {0}")]
    Midi(String),

    #[error("worker error: {0}")]
    Worker(String),
}

pub type Result<T> = std::result::Result<T, PanelError>;
