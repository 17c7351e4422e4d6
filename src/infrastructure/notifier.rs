use tokio::sync::mpsc;

use crate::domain::track::Track;
use crate::services::error::{ErrorContext, MusicError};
use crate::services::ports::Notifier;

/// A notification as handed to whatever renders it for users.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    NowPlaying { track: Track, looped: bool },
    Error { context: ErrorContext, message: String },
}

/// Logs notifications. Useful when nobody is listening in chat.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn now_playing(&self, track: &Track, looped: bool) {
        if looped {
            tracing::info!("Now playing (looping): {track}");
        } else {
            tracing::info!("Now playing: {track}");
        }
    }

    fn error(&self, context: ErrorContext, error: &MusicError) {
        tracing::warn!("{context:?} error: {error}");
    }
}

/// Forwards notifications to a channel drained by the chat front-end.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelNotifier {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, notification: Notification) {
        if self.tx.send(notification).is_err() {
            tracing::debug!("Notification receiver dropped");
        }
    }
}

impl Notifier for ChannelNotifier {
    fn now_playing(&self, track: &Track, looped: bool) {
        self.send(Notification::NowPlaying {
            track: track.clone(),
            looped,
        });
    }

    fn error(&self, context: ErrorContext, error: &MusicError) {
        self.send(Notification::Error {
            context,
            message: error.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forwards_in_order() {
        let (notifier, mut rx) = ChannelNotifier::channel();
        let track = Track::new("Song", "u");
        notifier.now_playing(&track, false);
        notifier.error(ErrorContext::Acquisition, &MusicError::NoResults);

        assert_eq!(
            rx.try_recv().unwrap(),
            Notification::NowPlaying {
                track,
                looped: false
            }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            Notification::Error {
                context: ErrorContext::Acquisition,
                message: "No results found for your query".to_string(),
            }
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn closed_receiver_is_not_fatal() {
        let (notifier, rx) = ChannelNotifier::channel();
        drop(rx);
        notifier.now_playing(&Track::new("Song", "u"), true);
    }
}
