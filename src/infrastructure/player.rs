use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex as SyncMutex;
use songbird::tracks::TrackHandle;
use songbird::{Call, Event, EventContext, EventHandler, TrackEvent};
use tokio::sync::{Mutex, broadcast};

use crate::domain::state::{PlayerError, PlayerState, PlayerStatus, StateCell};
use crate::domain::track::Track;
use crate::infrastructure::audio::AudioResource;
use crate::services::ports::AudioPlayer;

const ERROR_CAPACITY: usize = 16;

/// Plays one input at a time on a songbird call.
pub struct SongbirdPlayer {
    call: Arc<Mutex<Call>>,
    shared: Arc<PlayerShared>,
}

struct PlayerShared {
    state: StateCell<PlayerState>,
    current: SyncMutex<Option<TrackHandle>>,
    errors: broadcast::Sender<PlayerError>,
}

impl PlayerShared {
    fn set_status(&self, status: PlayerStatus) {
        let mut state = self.state.get();
        if state.status != status {
            state.status = status;
            self.state.set(state);
        }
    }

    fn is_current(&self, handle: &TrackHandle) -> bool {
        self.current
            .lock()
            .as_ref()
            .is_some_and(|current| current.uuid() == handle.uuid())
    }

    /// Forgets `handle` if it is still the current one.
    fn release(&self, handle: &TrackHandle) -> bool {
        let mut current = self.current.lock();
        if current.as_ref().is_some_and(|c| c.uuid() == handle.uuid()) {
            *current = None;
            true
        } else {
            false
        }
    }
}

impl SongbirdPlayer {
    pub fn new(call: Arc<Mutex<Call>>) -> Self {
        let (errors, _) = broadcast::channel(ERROR_CAPACITY);
        Self {
            call,
            shared: Arc::new(PlayerShared {
                state: StateCell::new(PlayerState::idle()),
                current: SyncMutex::new(None),
                errors,
            }),
        }
    }

    fn current(&self) -> Option<TrackHandle> {
        self.shared.current.lock().clone()
    }
}

#[async_trait]
impl AudioPlayer for SongbirdPlayer {
    type Resource = AudioResource;

    fn state(&self) -> &StateCell<PlayerState> {
        &self.shared.state
    }

    fn errors(&self) -> broadcast::Receiver<PlayerError> {
        self.shared.errors.subscribe()
    }

    async fn play(&self, resource: AudioResource) {
        let AudioResource { track, input } = resource;
        self.shared
            .state
            .set(PlayerState::with_track(PlayerStatus::Buffering, track.clone()));

        let handle = self.call.lock().await.play_only_input(input);
        *self.shared.current.lock() = Some(handle.clone());

        for kind in [
            TrackEvent::Play,
            TrackEvent::Pause,
            TrackEvent::End,
            TrackEvent::Error,
        ] {
            let events = TrackEvents {
                kind,
                handle: handle.clone(),
                track: track.clone(),
                shared: Arc::clone(&self.shared),
            };
            if let Err(e) = handle.add_event(Event::Track(kind), events) {
                tracing::warn!("Failed to watch {kind:?} for {track}: {e}");
            }
        }
    }

    fn pause(&self) -> bool {
        let Some(handle) = self.current() else {
            return false;
        };
        match handle.pause() {
            Ok(()) => {
                self.shared.set_status(PlayerStatus::Paused);
                true
            }
            Err(e) => {
                tracing::warn!("Failed to pause: {e}");
                false
            }
        }
    }

    fn unpause(&self) -> bool {
        let Some(handle) = self.current() else {
            return false;
        };
        if self.shared.state.get().status != PlayerStatus::Paused {
            return false;
        }
        match handle.play() {
            Ok(()) => {
                self.shared.set_status(PlayerStatus::Playing);
                true
            }
            Err(e) => {
                tracing::warn!("Failed to resume: {e}");
                false
            }
        }
    }

    fn stop(&self, force: bool) -> bool {
        let Some(handle) = self.shared.current.lock().take() else {
            return false;
        };
        if let Err(e) = handle.stop() {
            tracing::debug!("Track already gone when stopping: {e}");
        }
        tracing::debug!("Stopped current track (force: {force})");
        self.shared.state.set(PlayerState::idle());
        true
    }

    async fn position(&self) -> Option<Duration> {
        let handle = self.current()?;
        handle.get_info().await.ok().map(|info| info.position)
    }
}

struct TrackEvents {
    kind: TrackEvent,
    handle: TrackHandle,
    track: Track,
    shared: Arc<PlayerShared>,
}

#[async_trait]
impl EventHandler for TrackEvents {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        match self.kind {
            TrackEvent::Play if self.shared.is_current(&self.handle) => {
                self.shared.set_status(PlayerStatus::Playing);
            }
            TrackEvent::Pause if self.shared.is_current(&self.handle) => {
                self.shared.set_status(PlayerStatus::Paused);
            }
            TrackEvent::End => {
                if self.shared.release(&self.handle) {
                    self.shared.state.set(PlayerState::idle());
                }
            }
            TrackEvent::Error => {
                let message = match ctx {
                    EventContext::Track(tracks) => tracks
                        .first()
                        .map(|(state, _)| format!("{:?}", state.playing))
                        .unwrap_or_else(|| "unknown track error".to_string()),
                    _ => "unknown track error".to_string(),
                };
                let _ = self.shared.errors.send(PlayerError {
                    message,
                    track: Some(self.track.clone()),
                });
                if self.shared.release(&self.handle) {
                    self.shared.state.set(PlayerState::idle());
                }
            }
            _ => {}
        }
        None
    }
}
