//! Feed error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FeedError {
    /// Snapshot fetch or stream-level failure. Venue-scoped, recoverable
    /// through an explicit reconnect.
    #[error("transport error: {0}")]
    Transport(String),

    /// Malformed venue payload. The offending message is dropped and
    /// processing continues; never fatal to the stream.
    #[error("decode error: {0}")]
    Decode(String),

    /// Every selected venue returned an empty initial snapshot. Terminal for
    /// the current session until reconnect.
    #[error("all selected venues returned empty snapshots")]
    EmptyResult,
}

impl FeedError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }

    /// Reclassify as transport-level.
    ///
    /// A malformed snapshot body fails the whole fetch, unlike a malformed
    /// stream message which is dropped on its own.
    pub(crate) fn into_transport(self) -> Self {
        match self {
            Self::Decode(message) => Self::Transport(message),
            other => other,
        }
    }
}

impl From<reqwest::Error> for FeedError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for FeedError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for FeedError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

impl From<std::num::ParseFloatError> for FeedError {
    fn from(err: std::num::ParseFloatError) -> Self {
        Self::Decode(err.to_string())
    }
}
