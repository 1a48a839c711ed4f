use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("a connection cannot start and end at '{0}'")]
    SelfLoop(String),

    #[error("no node or group with id '{0}'")]
    UnknownElement(String),

    #[error("no connection with id '{0}'")]
    UnknownConnection(String),

    #[error("failed to read or write '{path}'")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid topology document")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum SuggestionError {
    #[error("connection {connection} references node index {index}, but only {len} nodes were suggested")]
    IndexOutOfRange {
        connection: usize,
        index: usize,
        len: usize,
    },

    #[error("suggestion contained no nodes")]
    Empty,

    #[error("topology has no services to analyze")]
    NothingToAnalyze,

    #[error("suggestion service replied with status {status}: {body}")]
    Service { status: u16, body: String },

    #[error("suggestion service returned no text")]
    MissingText,

    #[error("request to the suggestion service failed")]
    Http(#[from] reqwest::Error),

    #[error("suggestion reply was not valid layout JSON")]
    Json(#[from] serde_json::Error),
}
