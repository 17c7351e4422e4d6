use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackDuration {
    pub seconds: u64,
    /// Preformatted timestamp from the source, e.g. `3:45`.
    pub timestamp: Option<String>,
}

impl TrackDuration {
    pub fn from_secs(seconds: u64) -> Self {
        Self {
            seconds,
            timestamp: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    pub title: String,
    /// What the loader streams from.
    pub source: String,
    /// Where a listener is sent when following the track link.
    pub url: String,
    pub thumbnail_url: Option<String>,
    pub duration: TrackDuration,
    pub requested_by: String,
}

impl Track {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            title: title.into(),
            source: url.clone(),
            url,
            thumbnail_url: None,
            duration: TrackDuration::default(),
            requested_by: String::new(),
        }
    }

    pub fn with_requester(mut self, requested_by: impl Into<String>) -> Self {
        self.requested_by = requested_by.into();
        self
    }

    pub fn with_thumbnail(mut self, thumbnail_url: impl Into<String>) -> Self {
        self.thumbnail_url = Some(thumbnail_url.into());
        self
    }

    pub fn with_duration(mut self, duration: TrackDuration) -> Self {
        self.duration = duration;
        self
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.requested_by.is_empty() {
            write!(f, "{}", self.title)
        } else {
            write!(f, "{} (requested by {})", self.title, self.requested_by)
        }
    }
}
