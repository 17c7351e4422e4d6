use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::domain::queue::MusicQueue;
use crate::domain::state::{
    ConnectionStatus, PlayerError, PlayerState, PlayerStatus, StateChange, WaitOutcome,
};
use crate::domain::track::Track;
use crate::services::error::{ErrorContext, MusicError};
use crate::services::ports::{AudioPlayer, Notifier, TrackLoader, VoiceConnection};

pub type ResourceOf<C> = <<C as VoiceConnection>::Player as AudioPlayer>::Resource;

#[derive(Debug, Default)]
struct SubscriptionState {
    queue: MusicQueue,
    queue_lock: bool,
    ready_lock: bool,
    loop_enabled: bool,
    /// The last replay could not be opened; fall through to the queue.
    loop_skipped: bool,
    now_playing_announced: bool,
    last_played: Option<Track>,
    stopped: bool,
}

#[derive(Debug, Clone)]
pub struct NowPlaying {
    pub track: Track,
    pub status: PlayerStatus,
    pub position: Option<Duration>,
}

/// One guild's voice presence: a connection, the player routed through it,
/// and the queue feeding that player.
///
/// Two reactor tasks follow the connection and the player. Each reaction
/// decides synchronously in arrival order and spawns a task for anything that
/// has to wait, so a notification arriving mid-wait still gets its own
/// reaction.
pub struct MusicSubscription<C, L>
where
    C: VoiceConnection,
{
    connection: C,
    player: C::Player,
    loader: L,
    notifier: Arc<dyn Notifier>,
    config: Config,
    state: Arc<Mutex<SubscriptionState>>,
    reactors: Mutex<Vec<JoinHandle<()>>>,
}

impl<C, L> MusicSubscription<C, L>
where
    C: VoiceConnection,
    L: TrackLoader<Resource = ResourceOf<C>>,
{
    pub fn new(connection: C, loader: L, notifier: Arc<dyn Notifier>, config: Config) -> Arc<Self> {
        let player = connection.subscribe();
        let connection_changes = connection.state().changes();
        let player_changes = player.state().changes();
        let player_errors = player.errors();

        let subscription = Arc::new(Self {
            connection,
            player,
            loader,
            notifier,
            config,
            state: Arc::new(Mutex::new(SubscriptionState::default())),
            reactors: Mutex::new(Vec::new()),
        });

        let weak = Arc::downgrade(&subscription);
        let reactors = vec![
            tokio::spawn(run_connection_reactor(weak.clone(), connection_changes)),
            tokio::spawn(run_player_reactor(weak, player_changes, player_errors)),
        ];
        *subscription.reactors.lock() = reactors;

        subscription
    }

    /// Appends to the queue and kicks off a drain in the background. Returns
    /// false once the subscription has been stopped.
    pub fn enqueue(self: &Arc<Self>, track: Track) -> bool {
        {
            let mut state = self.state.lock();
            if state.stopped {
                tracing::debug!("Ignoring {track}, subscription already stopped");
                return false;
            }
            state.queue.push(track);
        }
        self.spawn_drain();
        true
    }

    /// Clears the queue and force-stops the player. Irreversible.
    pub fn stop(&self) {
        {
            let mut state = self.state.lock();
            state.queue_lock = true;
            state.stopped = true;
            state.queue.clear();
        }
        self.player.stop(true);
    }

    /// Destroys the connection; the subscription tears down with it.
    pub async fn disconnect(&self) {
        self.stop();
        self.connection.destroy().await;
    }

    pub fn pause(&self) -> bool {
        self.player.pause()
    }

    pub fn resume(&self) -> bool {
        self.player.unpause()
    }

    /// Ends the current resource; the idle transition picks the next track.
    pub fn skip(&self) -> bool {
        self.player.stop(false)
    }

    pub fn set_loop(&self, enabled: bool) {
        self.state.lock().loop_enabled = enabled;
    }

    pub fn toggle_loop(&self) -> bool {
        let mut state = self.state.lock();
        state.loop_enabled = !state.loop_enabled;
        state.loop_enabled
    }

    pub fn loop_enabled(&self) -> bool {
        self.state.lock().loop_enabled
    }

    pub fn queue(&self) -> Vec<Track> {
        self.state.lock().queue.list().iter().cloned().collect()
    }

    pub fn player_state(&self) -> PlayerState {
        self.player.state().get()
    }

    pub async fn now_playing(&self) -> Option<NowPlaying> {
        let state = self.player.state().get();
        if state.is_idle() {
            return None;
        }
        Some(NowPlaying {
            track: state.track?,
            status: state.status,
            position: self.player.position().await,
        })
    }

    pub fn is_stopped(&self) -> bool {
        self.state.lock().stopped
    }

    pub fn queue_locked(&self) -> bool {
        self.state.lock().queue_lock
    }

    pub fn connection(&self) -> &C {
        &self.connection
    }

    fn on_connection_change(self: &Arc<Self>, change: StateChange<ConnectionStatus>) {
        tracing::debug!("Voice connection {:?} -> {:?}", change.old, change.new);

        match change.new {
            ConnectionStatus::Disconnected(reason) if reason.is_channel_removed() => {
                let this = Arc::clone(self);
                tokio::spawn(async move { this.await_channel_move().await });
            }
            ConnectionStatus::Disconnected(reason) => {
                let attempts = self.connection.rejoin_attempts();
                let this = Arc::clone(self);
                if attempts < self.config.max_rejoin_attempts {
                    let delay = self.config.rejoin_delay(attempts);
                    tracing::info!(
                        "Voice connection dropped ({reason:?}), rejoin {} in {}s",
                        attempts + 1,
                        delay.as_secs()
                    );
                    tokio::spawn(async move { this.rejoin_after(delay).await });
                } else {
                    tracing::warn!(
                        "Voice connection dropped ({reason:?}) after {attempts} rejoins, giving up"
                    );
                    tokio::spawn(async move { this.connection.destroy().await });
                }
            }
            ConnectionStatus::Destroyed => {
                tracing::info!("Voice connection destroyed, stopping subscription");
                self.stop();
            }
            status if status.is_pending() => {
                if let Some(lock) = ReadyLock::acquire(&self.state) {
                    let this = Arc::clone(self);
                    tokio::spawn(async move { this.await_ready(lock).await });
                }
            }
            _ => {}
        }
    }

    async fn await_channel_move(self: Arc<Self>) {
        let outcome = self
            .connection
            .state()
            .wait_for(
                ConnectionStatus::has_recovered,
                self.config.channel_move_grace,
            )
            .await;

        match outcome {
            WaitOutcome::Reached => tracing::info!("Voice connection moved to another channel"),
            WaitOutcome::TimedOut => {
                tracing::info!("Removed from voice channel, destroying connection");
                self.connection.destroy().await;
            }
        }
    }

    async fn rejoin_after(self: Arc<Self>, delay: Duration) {
        tokio::time::sleep(delay).await;
        if self.connection.state().get().is_destroyed() {
            tracing::debug!("Connection destroyed during backoff, not rejoining");
            return;
        }
        if let Err(e) = self.connection.rejoin().await {
            tracing::warn!("Rejoin failed: {e}");
        }
    }

    async fn await_ready(self: Arc<Self>, _lock: ReadyLock) {
        let outcome = self
            .connection
            .state()
            .wait_for(
                |status| *status == ConnectionStatus::Ready,
                self.config.ready_timeout,
            )
            .await;

        if outcome == WaitOutcome::TimedOut && !self.connection.state().get().is_destroyed() {
            tracing::warn!(
                "Voice connection not ready after {}s, destroying it",
                self.config.ready_timeout.as_secs()
            );
            self.connection.destroy().await;
        }
    }

    fn on_player_change(self: &Arc<Self>, change: StateChange<PlayerState>) {
        let (old, new) = (change.old.status, change.new.status);
        tracing::debug!("Player {old:?} -> {new:?}");

        if new == PlayerStatus::Idle && old != PlayerStatus::Idle {
            self.spawn_drain();
        } else if new == PlayerStatus::Playing
            && matches!(old, PlayerStatus::Idle | PlayerStatus::Buffering)
        {
            if let Some(track) = change.new.track {
                self.announce(&track);
            }
        }
    }

    fn on_player_error(&self, error: PlayerError) {
        match &error.track {
            Some(track) => tracing::warn!("Player error on {track}: {}", error.message),
            None => tracing::warn!("Player error: {}", error.message),
        }
        self.notifier
            .error(ErrorContext::Playback, &MusicError::PlaybackError(error.message));
    }

    fn announce(&self, track: &Track) {
        let looped = {
            let mut state = self.state.lock();
            if state.loop_enabled {
                if state.now_playing_announced {
                    return;
                }
                state.now_playing_announced = true;
                true
            } else {
                false
            }
        };

        tracing::info!("Now playing: {track}");
        self.notifier.now_playing(track, looped);
    }

    fn spawn_drain(self: &Arc<Self>) {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.process_queue().await });
    }

    /// Starts the next track if nothing is playing. Safe to call redundantly.
    async fn process_queue(&self) {
        loop {
            let Some(track) = self.select_next() else {
                return;
            };

            match self.loader.open(&track).await {
                Ok(resource) => {
                    self.dispatch(track, resource).await;
                    return;
                }
                Err(e) => {
                    tracing::warn!("Skipping {track}: {e}");
                    {
                        let mut state = self.state.lock();
                        if state.loop_enabled {
                            state.loop_skipped = true;
                            state.now_playing_announced = false;
                        }
                        if !state.stopped {
                            state.queue_lock = false;
                        }
                    }
                    self.notifier.error(ErrorContext::Acquisition, &e);
                }
            }
        }
    }

    /// Picks what plays next and takes the queue lock, or returns `None`
    /// when a drain is not possible right now.
    fn select_next(&self) -> Option<Track> {
        let mut state = self.state.lock();
        if state.queue_lock || !self.player.state().get().is_idle() {
            return None;
        }

        let replay_allowed = state.loop_enabled && !state.loop_skipped;
        if state.queue.is_empty() && !replay_allowed {
            return None;
        }

        let replay = if replay_allowed {
            state.last_played.clone()
        } else {
            None
        };

        let track = match replay {
            Some(track) => {
                // Once the replay has been announced, each cycle consumes one queued entry.
                if state.now_playing_announced {
                    if let Some(consumed) = state.queue.pop() {
                        tracing::debug!("Loop cycle consumed queued {consumed}");
                    }
                }
                track
            }
            None => {
                state.loop_skipped = false;
                state.now_playing_announced = false;
                state.queue.pop()?
            }
        };

        state.queue_lock = true;
        Some(track)
    }

    async fn dispatch(&self, track: Track, resource: ResourceOf<C>) {
        {
            let mut state = self.state.lock();
            if state.stopped {
                tracing::debug!("Stopped while opening {track}, discarding it");
                return;
            }
            state.last_played = Some(track.clone());
        }

        tracing::debug!("Dispatching {track}");
        self.player.play(resource).await;

        let stopped = {
            let mut state = self.state.lock();
            if !state.stopped {
                state.queue_lock = false;
            }
            state.stopped
        };
        if stopped {
            self.player.stop(true);
        }
    }
}

impl<C, L> Drop for MusicSubscription<C, L>
where
    C: VoiceConnection,
{
    fn drop(&mut self) {
        for reactor in self.reactors.get_mut().drain(..) {
            reactor.abort();
        }
    }
}

/// Marks a ready-wait as in flight; cleared on drop.
struct ReadyLock {
    state: Arc<Mutex<SubscriptionState>>,
}

impl ReadyLock {
    fn acquire(state: &Arc<Mutex<SubscriptionState>>) -> Option<Self> {
        let mut guard = state.lock();
        if guard.ready_lock {
            return None;
        }
        guard.ready_lock = true;
        Some(Self {
            state: Arc::clone(state),
        })
    }
}

impl Drop for ReadyLock {
    fn drop(&mut self) {
        self.state.lock().ready_lock = false;
    }
}

async fn run_connection_reactor<C, L>(
    subscription: Weak<MusicSubscription<C, L>>,
    mut changes: broadcast::Receiver<StateChange<ConnectionStatus>>,
) where
    C: VoiceConnection,
    L: TrackLoader<Resource = ResourceOf<C>>,
{
    loop {
        let change = match changes.recv().await {
            Ok(change) => change,
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!("Connection reactor skipped {skipped} state changes");
                continue;
            }
            Err(RecvError::Closed) => break,
        };
        let Some(subscription) = subscription.upgrade() else {
            break;
        };
        let terminal = change.new.is_destroyed();
        subscription.on_connection_change(change);
        if terminal {
            break;
        }
    }
}

async fn run_player_reactor<C, L>(
    subscription: Weak<MusicSubscription<C, L>>,
    mut changes: broadcast::Receiver<StateChange<PlayerState>>,
    mut errors: broadcast::Receiver<PlayerError>,
) where
    C: VoiceConnection,
    L: TrackLoader<Resource = ResourceOf<C>>,
{
    loop {
        tokio::select! {
            change = changes.recv() => match change {
                Ok(change) => {
                    let Some(subscription) = subscription.upgrade() else {
                        break;
                    };
                    subscription.on_player_change(change);
                }
                Err(RecvError::Lagged(skipped)) => {
                    // The missed changes may include the idle transition.
                    tracing::warn!("Player reactor skipped {skipped} state changes, draining");
                    let Some(subscription) = subscription.upgrade() else {
                        break;
                    };
                    subscription.spawn_drain();
                }
                Err(RecvError::Closed) => break,
            },
            error = errors.recv() => match error {
                Ok(error) => {
                    let Some(subscription) = subscription.upgrade() else {
                        break;
                    };
                    subscription.on_player_error(error);
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Player reactor skipped {skipped} errors");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }
}
