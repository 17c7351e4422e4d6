#[derive(Debug, Clone, thiserror::Error)]
pub enum MusicError {
    #[error("No results found for your query")]
    NoResults,
    #[error("Failed to join voice channel: {0}")]
    JoinError(String),
    #[error("Could not open audio for {title}: {reason}")]
    ResourceUnavailable { title: String, reason: String },
    #[error("Playback failed: {0}")]
    PlaybackError(String),
}

/// Where a reported error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorContext {
    /// The loader could not produce a resource for a queued track.
    Acquisition,
    /// The player failed while streaming.
    Playback,
}
