use thiserror::Error;

#[derive(Error, Debug)]
pub enum SwarmError {
    #[error("Malformed bencode: {0}")]
    MalformedEncoding(String),

    #[error("Corrupt metadata: {0}")]
    CorruptMetadata(String),

    #[error("Tracker error: {0}")]
    TrackerError(String),

    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),

    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Connection closed by peer")]
    ConnectionClosed,

    #[error("Piece {0} was already saved")]
    AlreadySaved(usize),

    #[error("Pieces failed integrity re-validation: {0:?}")]
    VerificationFailure(Vec<usize>),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Download stalled: {0}")]
    NoProgress(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParseError(String),
}

impl SwarmError {
    /// Errors that only abort the session talking to one peer.
    pub fn is_peer_failure(&self) -> bool {
        matches!(
            self,
            SwarmError::HandshakeFailed(_)
                | SwarmError::ProtocolError(_)
                | SwarmError::Timeout(_)
                | SwarmError::ConnectionClosed
                | SwarmError::IoError(_)
        )
    }
}

impl From<url::ParseError> for SwarmError {
    fn from(err: url::ParseError) -> Self {
        SwarmError::UrlParseError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SwarmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_failure_classification() {
        assert!(SwarmError::ConnectionClosed.is_peer_failure());
        assert!(SwarmError::HandshakeFailed("bad hash".into()).is_peer_failure());
        assert!(SwarmError::Timeout("read".into()).is_peer_failure());
        assert!(!SwarmError::AlreadySaved(3).is_peer_failure());
        assert!(!SwarmError::CorruptMetadata("x".into()).is_peer_failure());
    }
}
