use std::collections::HashMap;
use std::sync::Arc;

use serenity::model::id::GuildId;
use tokio::sync::RwLock;

use crate::services::ports::{TrackLoader, VoiceConnection};
use crate::services::subscription::{MusicSubscription, ResourceOf};

/// Live subscriptions by guild.
pub struct SubscriptionRegistry<C, L>
where
    C: VoiceConnection,
{
    subscriptions: Arc<RwLock<HashMap<GuildId, Arc<MusicSubscription<C, L>>>>>,
}

impl<C, L> Clone for SubscriptionRegistry<C, L>
where
    C: VoiceConnection,
{
    fn clone(&self) -> Self {
        Self {
            subscriptions: Arc::clone(&self.subscriptions),
        }
    }
}

impl<C, L> Default for SubscriptionRegistry<C, L>
where
    C: VoiceConnection,
{
    fn default() -> Self {
        Self {
            subscriptions: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl<C, L> SubscriptionRegistry<C, L>
where
    C: VoiceConnection,
    L: TrackLoader<Resource = ResourceOf<C>>,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the guild's subscription, dropping it first if it has stopped.
    pub async fn get(&self, guild_id: GuildId) -> Option<Arc<MusicSubscription<C, L>>> {
        {
            let map = self.subscriptions.read().await;
            match map.get(&guild_id) {
                Some(subscription) if !subscription.is_stopped() => {
                    return Some(Arc::clone(subscription));
                }
                Some(_) => {}
                None => return None,
            }
        }

        let mut map = self.subscriptions.write().await;
        if map
            .get(&guild_id)
            .is_some_and(|subscription| subscription.is_stopped())
        {
            tracing::debug!("Pruning stopped subscription for guild {guild_id}");
            map.remove(&guild_id);
        }
        map.get(&guild_id).cloned()
    }

    /// Stores a subscription, returning the one it replaced.
    pub async fn insert(
        &self,
        guild_id: GuildId,
        subscription: Arc<MusicSubscription<C, L>>,
    ) -> Option<Arc<MusicSubscription<C, L>>> {
        self.subscriptions.write().await.insert(guild_id, subscription)
    }

    pub async fn remove(&self, guild_id: GuildId) -> Option<Arc<MusicSubscription<C, L>>> {
        self.subscriptions.write().await.remove(&guild_id)
    }

    /// Removes the guild's subscription and destroys its connection.
    pub async fn teardown(&self, guild_id: GuildId) -> bool {
        let Some(subscription) = self.remove(guild_id).await else {
            return false;
        };
        subscription.disconnect().await;
        tracing::info!("Tore down subscription for guild {guild_id}");
        true
    }

    pub async fn len(&self) -> usize {
        self.subscriptions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.subscriptions.read().await.is_empty()
    }
}
