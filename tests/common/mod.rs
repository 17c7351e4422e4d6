#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use music_subscription::domain::state::{PlayerError, StateCell};
use music_subscription::infrastructure::notifier::{ChannelNotifier, Notification};
use music_subscription::{
    AudioPlayer, Config, ConnectionStatus, MusicError, MusicSubscription, PlayerState,
    PlayerStatus, Track, TrackLoader, VoiceConnection,
};
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};

pub type TestSubscription = MusicSubscription<FakeConnection, FakeLoader>;

pub fn track(title: &str) -> Track {
    Track::new(title, format!("https://www.youtube.com/watch?v={title}")).with_requester("<@1>")
}

/// Lets every runnable task finish, moving the paused clock by at most 1ms.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

pub async fn advance(duration: Duration) {
    tokio::time::advance(duration).await;
    settle().await;
}

pub struct FakeResource(pub Track);

#[derive(Clone)]
pub struct FakePlayer {
    inner: Arc<PlayerInner>,
}

struct PlayerInner {
    state: StateCell<PlayerState>,
    errors: broadcast::Sender<PlayerError>,
    played: Mutex<Vec<String>>,
    stops: Mutex<Vec<bool>>,
}

impl FakePlayer {
    fn new() -> Self {
        let (errors, _) = broadcast::channel(16);
        Self {
            inner: Arc::new(PlayerInner {
                state: StateCell::new(PlayerState::idle()),
                errors,
                played: Mutex::new(Vec::new()),
                stops: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn played(&self) -> Vec<String> {
        self.inner.played.lock().clone()
    }

    /// The `force` flag of every stop call.
    pub fn stops(&self) -> Vec<bool> {
        self.inner.stops.lock().clone()
    }

    pub fn status(&self) -> PlayerStatus {
        self.inner.state.get().status
    }

    fn set_status(&self, status: PlayerStatus) {
        let mut state = self.inner.state.get();
        state.status = status;
        self.inner.state.set(state);
    }

    /// Audio starts flowing for the loaded resource.
    pub fn start(&self) {
        self.set_status(PlayerStatus::Playing);
    }

    /// The loaded resource ran out.
    pub fn finish(&self) {
        self.inner.state.set(PlayerState::idle());
    }

    pub fn fail(&self, message: &str) {
        let track = self.inner.state.get().track;
        let _ = self.inner.errors.send(PlayerError {
            message: message.to_string(),
            track,
        });
        self.inner.state.set(PlayerState::idle());
    }
}

#[async_trait]
impl AudioPlayer for FakePlayer {
    type Resource = FakeResource;

    fn state(&self) -> &StateCell<PlayerState> {
        &self.inner.state
    }

    fn errors(&self) -> broadcast::Receiver<PlayerError> {
        self.inner.errors.subscribe()
    }

    async fn play(&self, resource: FakeResource) {
        let FakeResource(track) = resource;
        self.inner.played.lock().push(track.title.clone());
        self.inner
            .state
            .set(PlayerState::with_track(PlayerStatus::Buffering, track));
    }

    fn pause(&self) -> bool {
        if self.status() != PlayerStatus::Playing {
            return false;
        }
        self.set_status(PlayerStatus::Paused);
        true
    }

    fn unpause(&self) -> bool {
        if self.status() != PlayerStatus::Paused {
            return false;
        }
        self.set_status(PlayerStatus::Playing);
        true
    }

    fn stop(&self, force: bool) -> bool {
        self.inner.stops.lock().push(force);
        if self.status() == PlayerStatus::Idle {
            return false;
        }
        self.inner.state.set(PlayerState::idle());
        true
    }

    async fn position(&self) -> Option<Duration> {
        (self.status() != PlayerStatus::Idle).then(|| Duration::from_secs(42))
    }
}

#[derive(Clone)]
pub struct FakeConnection {
    inner: Arc<ConnectionInner>,
}

struct ConnectionInner {
    state: StateCell<ConnectionStatus>,
    player: FakePlayer,
    attempts: AtomicU32,
    rejoins: AtomicU32,
    destroys: AtomicU32,
}

impl FakeConnection {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ConnectionInner {
                state: StateCell::new(ConnectionStatus::Ready),
                player: FakePlayer::new(),
                attempts: AtomicU32::new(0),
                rejoins: AtomicU32::new(0),
                destroys: AtomicU32::new(0),
            }),
        }
    }

    pub fn player(&self) -> FakePlayer {
        self.inner.player.clone()
    }

    pub fn set(&self, status: ConnectionStatus) {
        self.inner.state.set(status);
    }

    pub fn status(&self) -> ConnectionStatus {
        self.inner.state.get()
    }

    pub fn rejoins(&self) -> u32 {
        self.inner.rejoins.load(Ordering::SeqCst)
    }

    pub fn destroys(&self) -> u32 {
        self.inner.destroys.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VoiceConnection for FakeConnection {
    type Player = FakePlayer;

    fn subscribe(&self) -> FakePlayer {
        self.player()
    }

    fn state(&self) -> &StateCell<ConnectionStatus> {
        &self.inner.state
    }

    fn rejoin_attempts(&self) -> u32 {
        self.inner.attempts.load(Ordering::SeqCst)
    }

    async fn rejoin(&self) -> Result<(), MusicError> {
        self.inner.attempts.fetch_add(1, Ordering::SeqCst);
        self.inner.rejoins.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn destroy(&self) {
        self.inner.destroys.fetch_add(1, Ordering::SeqCst);
        if !self.status().is_destroyed() {
            self.set(ConnectionStatus::Destroyed);
        }
    }
}

#[derive(Clone, Default)]
pub struct FakeLoader {
    inner: Arc<LoaderInner>,
}

#[derive(Default)]
struct LoaderInner {
    failing: Mutex<HashSet<String>>,
    opened: Mutex<Vec<String>>,
}

impl FakeLoader {
    pub fn fail(&self, title: &str) {
        self.inner.failing.lock().insert(title.to_string());
    }

    pub fn opened(&self) -> Vec<String> {
        self.inner.opened.lock().clone()
    }
}

#[async_trait]
impl TrackLoader for FakeLoader {
    type Resource = FakeResource;

    async fn open(&self, track: &Track) -> Result<FakeResource, MusicError> {
        self.inner.opened.lock().push(track.title.clone());
        if self.inner.failing.lock().contains(&track.title) {
            return Err(MusicError::ResourceUnavailable {
                title: track.title.clone(),
                reason: "Video unavailable".to_string(),
            });
        }
        Ok(FakeResource(track.clone()))
    }
}

pub struct Harness {
    pub subscription: Arc<TestSubscription>,
    pub connection: FakeConnection,
    pub player: FakePlayer,
    pub loader: FakeLoader,
    notifications: mpsc::UnboundedReceiver<Notification>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();

        let connection = FakeConnection::new();
        let player = connection.player();
        let loader = FakeLoader::default();
        let (notifier, notifications) = ChannelNotifier::channel();
        let subscription = MusicSubscription::new(
            connection.clone(),
            loader.clone(),
            Arc::new(notifier),
            config,
        );

        Self {
            subscription,
            connection,
            player,
            loader,
            notifications,
        }
    }

    pub fn notifications(&mut self) -> Vec<Notification> {
        let mut seen = Vec::new();
        while let Ok(notification) = self.notifications.try_recv() {
            seen.push(notification);
        }
        seen
    }

    /// Starts the loaded resource, lets it run out, and waits for the next drain.
    pub async fn play_through(&self) {
        self.player.start();
        settle().await;
        self.player.finish();
        settle().await;
    }
}
