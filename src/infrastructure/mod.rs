pub mod audio;
pub mod connection;
pub mod notifier;
pub mod player;

use crate::services::registry::SubscriptionRegistry;
use crate::services::subscription::MusicSubscription;

use audio::YtDlpLoader;
use connection::SongbirdConnection;

pub type GuildSubscription = MusicSubscription<SongbirdConnection, YtDlpLoader>;
pub type GuildSubscriptions = SubscriptionRegistry<SongbirdConnection, YtDlpLoader>;
