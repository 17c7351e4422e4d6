use std::time::Duration;

use tokio::sync::{broadcast, watch};

use super::track::Track;

/// Close code sent by the voice gateway when the bot was moved out of, or
/// kicked from, its channel.
pub const CLOSE_CODE_DISCONNECTED: u16 = 4014;

/// Transitions a reactor may fall behind by before it starts missing them.
pub const CHANGE_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    WebSocketClose { code: Option<u16> },
    TimedOut,
    Io,
    Other,
}

impl DisconnectReason {
    /// Ambiguous between a channel move (recovers on its own) and a kick.
    pub fn is_channel_removed(&self) -> bool {
        matches!(
            self,
            DisconnectReason::WebSocketClose {
                code: Some(CLOSE_CODE_DISCONNECTED)
            }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    Signalling,
    Connecting,
    Ready,
    Disconnected(DisconnectReason),
    Destroyed,
}

impl ConnectionStatus {
    pub fn is_destroyed(&self) -> bool {
        matches!(self, ConnectionStatus::Destroyed)
    }

    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            ConnectionStatus::Signalling | ConnectionStatus::Connecting
        )
    }

    /// Reconnecting or connected again after a drop.
    pub fn has_recovered(&self) -> bool {
        self.is_pending() || *self == ConnectionStatus::Ready
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerStatus {
    Idle,
    Buffering,
    Playing,
    Paused,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerState {
    pub status: PlayerStatus,
    pub track: Option<Track>,
}

impl PlayerState {
    pub fn idle() -> Self {
        Self {
            status: PlayerStatus::Idle,
            track: None,
        }
    }

    pub fn with_track(status: PlayerStatus, track: Track) -> Self {
        Self {
            status,
            track: Some(track),
        }
    }

    pub fn is_idle(&self) -> bool {
        self.status == PlayerStatus::Idle
    }
}

#[derive(Debug, Clone)]
pub struct PlayerError {
    pub message: String,
    pub track: Option<Track>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChange<S> {
    pub old: S,
    pub new: S,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Reached,
    TimedOut,
}

/// Current value plus an ordered feed of transitions.
///
/// Waiters watch the current value, reactors consume every `StateChange` in
/// the order it was published.
pub struct StateCell<S> {
    current: watch::Sender<S>,
    changes: broadcast::Sender<StateChange<S>>,
}

impl<S> StateCell<S>
where
    S: Clone + Send + Sync + 'static,
{
    pub fn new(initial: S) -> Self {
        let (current, _) = watch::channel(initial);
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Self { current, changes }
    }

    pub fn get(&self) -> S {
        self.current.borrow().clone()
    }

    /// Replaces the current value and publishes the transition. Returns the old value.
    pub fn set(&self, new: S) -> S {
        let old = self.current.send_replace(new.clone());
        // No reactor subscribed yet is not an error.
        let _ = self.changes.send(StateChange {
            old: old.clone(),
            new,
        });
        old
    }

    pub fn changes(&self) -> broadcast::Receiver<StateChange<S>> {
        self.changes.subscribe()
    }

    /// Resolves as soon as the value satisfies `predicate`, including when it
    /// already does, or gives up after `timeout`.
    pub async fn wait_for<F>(&self, predicate: F, timeout: Duration) -> WaitOutcome
    where
        F: FnMut(&S) -> bool,
    {
        let mut rx = self.current.subscribe();
        let reached = matches!(
            tokio::time::timeout(timeout, rx.wait_for(predicate)).await,
            Ok(Ok(_))
        );
        if reached {
            WaitOutcome::Reached
        } else {
            WaitOutcome::TimedOut
        }
    }
}
