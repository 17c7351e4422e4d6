use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use songbird::input::{Compose, Input, YoutubeDl};

use crate::domain::track::{Track, TrackDuration};
use crate::services::error::MusicError;
use crate::services::ports::TrackLoader;

static VIDEO_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://(?:www\.|m\.|music\.)?(?:youtube\.com/(?:watch|shorts/)|youtu\.be/)")
        .unwrap()
});

/// A track ready to be handed to the player.
pub struct AudioResource {
    pub track: Track,
    pub input: Input,
}

/// yt-dlp tuning. Throughput only, playback is correct with any of these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamOptions {
    pub format: String,
    /// `None` downloads without chunking.
    pub chunk_size: Option<u64>,
    pub read_ahead_bytes: u64,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            format: "bestaudio".to_string(),
            chunk_size: None,
            read_ahead_bytes: 1 << 25,
        }
    }
}

impl StreamOptions {
    pub fn ytdl_args(&self) -> Vec<String> {
        let mut args = vec!["-f".to_string(), self.format.clone()];
        if let Some(size) = self.chunk_size {
            args.push("--http-chunk-size".to_string());
            args.push(size.to_string());
        }
        args.push("--buffer-size".to_string());
        args.push(self.read_ahead_bytes.to_string());
        args
    }
}

pub struct YtDlpLoader {
    http: Client,
    options: StreamOptions,
}

impl YtDlpLoader {
    pub fn new(http: Client) -> Self {
        Self::with_options(http, StreamOptions::default())
    }

    pub fn with_options(http: Client, options: StreamOptions) -> Self {
        Self { http, options }
    }

    pub fn is_video_url(query: &str) -> bool {
        VIDEO_URL_RE.is_match(query.trim())
    }

    /// Looks up a video URL, or searches for free text, and describes the
    /// first hit as a track.
    pub async fn resolve(&self, query: &str, requested_by: &str) -> Result<Track, MusicError> {
        let query = query.trim();
        let mut source = if Self::is_video_url(query) {
            YoutubeDl::new(self.http.clone(), query.to_string())
        } else {
            YoutubeDl::new_search(self.http.clone(), query.to_string())
        };

        let metadata = source.aux_metadata().await.map_err(|e| {
            tracing::warn!("yt-dlp lookup for {query:?} failed: {e}");
            MusicError::NoResults
        })?;

        let url = match metadata.source_url {
            Some(url) => url,
            None if Self::is_video_url(query) => query.to_string(),
            None => return Err(MusicError::NoResults),
        };

        let duration = metadata
            .duration
            .map(|d| TrackDuration::from_secs(d.as_secs()))
            .unwrap_or_default();

        let mut track = Track::new(metadata.title.unwrap_or_else(|| url.clone()), url)
            .with_requester(requested_by)
            .with_duration(duration);
        if let Some(thumbnail) = metadata.thumbnail {
            track = track.with_thumbnail(thumbnail);
        }
        Ok(track)
    }

    fn source(&self, url: &str) -> YoutubeDl {
        YoutubeDl::new(self.http.clone(), url.to_string()).user_args(self.options.ytdl_args())
    }
}

#[async_trait]
impl TrackLoader for YtDlpLoader {
    type Resource = AudioResource;

    async fn open(&self, track: &Track) -> Result<AudioResource, MusicError> {
        let mut source = self.source(&track.source);

        // Input is lazy; probing here surfaces dead links before dispatch.
        source
            .aux_metadata()
            .await
            .map_err(|e| MusicError::ResourceUnavailable {
                title: track.title.clone(),
                reason: e.to_string(),
            })?;

        Ok(AudioResource {
            track: track.clone(),
            input: source.into(),
        })
    }
}
