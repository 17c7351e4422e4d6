use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::domain::state::{ConnectionStatus, PlayerError, PlayerState, StateCell};
use crate::domain::track::Track;
use crate::services::error::{ErrorContext, MusicError};

/// The real-time transport to one voice channel.
#[async_trait]
pub trait VoiceConnection: Send + Sync + 'static {
    type Player: AudioPlayer;

    /// Creates a player whose output is routed through this connection.
    fn subscribe(&self) -> Self::Player;

    fn state(&self) -> &StateCell<ConnectionStatus>;

    /// Rejoins since the connection was last ready.
    fn rejoin_attempts(&self) -> u32;

    async fn rejoin(&self) -> Result<(), MusicError>;

    /// Terminal. Calling it on a destroyed connection does nothing.
    async fn destroy(&self);
}

/// Streams one resource at a time into its connection.
#[async_trait]
pub trait AudioPlayer: Send + Sync + 'static {
    type Resource: Send + 'static;

    fn state(&self) -> &StateCell<PlayerState>;

    fn errors(&self) -> broadcast::Receiver<PlayerError>;

    /// Replaces whatever is playing. The player leaves `Idle` before this returns.
    async fn play(&self, resource: Self::Resource);

    fn pause(&self) -> bool;

    fn unpause(&self) -> bool;

    /// Drops the current resource. Returns false when nothing was loaded.
    fn stop(&self, force: bool) -> bool;

    async fn position(&self) -> Option<Duration>;
}

/// Turns a queued track into something the player can stream.
#[async_trait]
pub trait TrackLoader: Send + Sync + 'static {
    type Resource: Send + 'static;

    async fn open(&self, track: &Track) -> Result<Self::Resource, MusicError>;
}

/// Receives user-facing events. Rendering them is up to the implementor.
pub trait Notifier: Send + Sync {
    fn now_playing(&self, track: &Track, looped: bool);

    fn error(&self, context: ErrorContext, error: &MusicError);
}
