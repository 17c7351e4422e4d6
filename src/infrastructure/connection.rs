use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use songbird::events::context_data::DisconnectReason as DriverDisconnectReason;
use songbird::model::CloseCode;
use songbird::{Call, CoreEvent, Event, EventContext, EventHandler, Songbird};
use tokio::sync::Mutex;

use crate::domain::state::{CLOSE_CODE_DISCONNECTED, ConnectionStatus, DisconnectReason, StateCell};
use crate::infrastructure::player::SongbirdPlayer;
use crate::services::error::MusicError;
use crate::services::ports::VoiceConnection;

/// A songbird call for one guild, seen as a connection state machine.
pub struct SongbirdConnection {
    manager: Arc<Songbird>,
    call: Arc<Mutex<Call>>,
    guild_id: GuildId,
    channel_id: ChannelId,
    shared: Arc<ConnectionShared>,
}

struct ConnectionShared {
    state: StateCell<ConnectionStatus>,
    rejoin_attempts: AtomicU32,
    destroyed: AtomicBool,
}

impl ConnectionShared {
    fn new(initial: ConnectionStatus) -> Self {
        Self {
            state: StateCell::new(initial),
            rejoin_attempts: AtomicU32::new(0),
            destroyed: AtomicBool::new(false),
        }
    }

    fn mark_ready(&self) {
        if self.destroyed.load(Ordering::SeqCst) {
            return;
        }
        self.rejoin_attempts.store(0, Ordering::SeqCst);
        if self.state.get() != ConnectionStatus::Ready {
            self.state.set(ConnectionStatus::Ready);
        }
    }

    fn mark_disconnected(&self, reason: DisconnectReason) {
        if self.destroyed.load(Ordering::SeqCst) {
            return;
        }
        self.state.set(ConnectionStatus::Disconnected(reason));
    }

    /// The driver re-established the session on its own, possibly in a new channel.
    fn mark_reconnected(&self) {
        if self.destroyed.load(Ordering::SeqCst) {
            return;
        }
        if self.state.get() != ConnectionStatus::Connecting {
            self.state.set(ConnectionStatus::Connecting);
        }
        self.mark_ready();
    }
}

impl SongbirdConnection {
    pub async fn join(
        manager: Arc<Songbird>,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Self, MusicError> {
        let shared = Arc::new(ConnectionShared::new(ConnectionStatus::Signalling));

        let call = match manager.join(guild_id, channel_id).await {
            Ok(call) => call,
            Err(e) => {
                if let Err(cleanup) = manager.remove(guild_id).await {
                    tracing::debug!("Nothing to clean up after failed join: {cleanup}");
                }
                return Err(MusicError::JoinError(e.to_string()));
            }
        };

        {
            let mut handler = call.lock().await;
            for event in [
                CoreEvent::DriverConnect,
                CoreEvent::DriverReconnect,
                CoreEvent::DriverDisconnect,
            ] {
                handler.add_global_event(
                    Event::Core(event),
                    DriverEvents {
                        shared: Arc::clone(&shared),
                    },
                );
            }
        }

        shared.mark_ready();
        tracing::info!("Joined voice channel {channel_id} in guild {guild_id}");

        Ok(Self {
            manager,
            call,
            guild_id,
            channel_id,
            shared,
        })
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }
}

#[async_trait]
impl VoiceConnection for SongbirdConnection {
    type Player = SongbirdPlayer;

    fn subscribe(&self) -> SongbirdPlayer {
        SongbirdPlayer::new(Arc::clone(&self.call))
    }

    fn state(&self) -> &StateCell<ConnectionStatus> {
        &self.shared.state
    }

    fn rejoin_attempts(&self) -> u32 {
        self.shared.rejoin_attempts.load(Ordering::SeqCst)
    }

    async fn rejoin(&self) -> Result<(), MusicError> {
        if self.shared.destroyed.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.shared.rejoin_attempts.fetch_add(1, Ordering::SeqCst);
        self.shared.state.set(ConnectionStatus::Signalling);

        // Follow the call if it was moved since we joined.
        let channel = self
            .call
            .lock()
            .await
            .current_channel()
            .unwrap_or_else(|| self.channel_id.into());

        match self.manager.join(self.guild_id, channel).await {
            Ok(_) => {
                self.shared.mark_ready();
                Ok(())
            }
            Err(e) => {
                self.shared.mark_disconnected(DisconnectReason::Other);
                Err(MusicError::JoinError(e.to_string()))
            }
        }
    }

    async fn destroy(&self) {
        if self.shared.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shared.state.set(ConnectionStatus::Destroyed);
        if let Err(e) = self.manager.remove(self.guild_id).await {
            tracing::warn!("Failed to leave voice channel in guild {}: {e}", self.guild_id);
        }
    }
}

struct DriverEvents {
    shared: Arc<ConnectionShared>,
}

#[async_trait]
impl EventHandler for DriverEvents {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        match ctx {
            EventContext::DriverConnect(_) => self.shared.mark_ready(),
            EventContext::DriverReconnect(_) => self.shared.mark_reconnected(),
            EventContext::DriverDisconnect(data) => {
                let reason = disconnect_reason(data.reason.as_ref());
                tracing::info!("Voice driver disconnected ({:?}): {reason:?}", data.kind);
                self.shared.mark_disconnected(reason);
            }
            _ => {}
        }
        None
    }
}

fn disconnect_reason(reason: Option<&DriverDisconnectReason>) -> DisconnectReason {
    match reason {
        Some(DriverDisconnectReason::WsClosed(Some(CloseCode::Disconnected))) => {
            DisconnectReason::WebSocketClose {
                code: Some(CLOSE_CODE_DISCONNECTED),
            }
        }
        Some(DriverDisconnectReason::WsClosed(_)) => DisconnectReason::WebSocketClose { code: None },
        Some(DriverDisconnectReason::TimedOut) => DisconnectReason::TimedOut,
        Some(DriverDisconnectReason::Io) => DisconnectReason::Io,
        _ => DisconnectReason::Other,
    }
}
