use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    /// Network failure or a non-2xx status from the scorer.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The scorer answered with something other than a score response.
    #[error("malformed scorer response: {0}")]
    Parse(String),

    /// A newer request was issued before this response arrived.
    #[error("response for request #{seq} superseded by request #{latest}")]
    Stale { seq: u64, latest: u64 },

    #[error("result set is empty; nothing to re-score")]
    NothingToScore,
}

impl SyncError {
    /// Transport and parse failures are the ones a caller may want to surface.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Parse(_))
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            Self::Parse(error.to_string())
        } else {
            Self::Transport(error.to_string())
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(error: serde_json::Error) -> Self {
        Self::Parse(error.to_string())
    }
}
