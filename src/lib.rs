//! Per-guild voice music subscriptions: a songbird connection, the player
//! routed through it, and the queue that feeds the player, kept alive across
//! voice reconnects.

pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod services;

pub use config::Config;
pub use domain::state::{ConnectionStatus, DisconnectReason, PlayerState, PlayerStatus};
pub use domain::track::{Track, TrackDuration};
pub use services::error::{ErrorContext, MusicError};
pub use services::ports::{AudioPlayer, Notifier, TrackLoader, VoiceConnection};
pub use services::registry::SubscriptionRegistry;
pub use services::subscription::{MusicSubscription, NowPlaying};
