//! Background narration prefetch for a freshly ordered game.
//!
//! Runs once per session: the order announcement first, then every player in
//! play order, one player at a time so the backend never sees more than two
//! concurrent requests (result text and result speech for the same player).

use crate::cache::NarrationCache;
use crate::narrator::Narrator;
use crate::player::Player;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum PrefetchError {
    #[error("no announcement audio for {0}")]
    NoAnnouncementAudio(String),
    #[error("{0} has no assigned segment")]
    Unassigned(String),
}

/// Spawn the prefetch pass. Abort the handle to stop it early.
pub fn spawn(cache: Arc<NarrationCache>, narrator: Narrator, lineup: Vec<Player>) -> JoinHandle<()> {
    tokio::spawn(async move { run(&cache, &narrator, &lineup).await })
}

pub async fn run(cache: &NarrationCache, narrator: &Narrator, lineup: &[Player]) {
    info!("🎁 Prefetching narration for {} players (host {})", lineup.len(), narrator.host().name);

    let names: Vec<String> = lineup.iter().map(|p| p.name().to_string()).collect();
    let order_audio = narrator.order_announcement(&names).await;
    if order_audio.is_none() {
        warn!("Order announcement has no audio");
    }
    cache.set_order_announcement(order_audio);

    if lineup.is_empty() {
        cache.mark_first_ready();
        return;
    }

    for (index, player) in lineup.iter().enumerate() {
        if let Err(e) = prefetch_player(cache, narrator, player).await {
            warn!("Failed to prewarm assets for {}: {}", player.name(), e);
        }
        if index == 0 {
            cache.mark_first_ready();
            info!("First player ready");
        }
    }

    debug!("Prefetch pass complete: {:?} cached", cache.len());
}

async fn prefetch_player(cache: &NarrationCache, narrator: &Narrator, player: &Player) -> Result<(), PrefetchError> {
    let announcement = cache
        .announcement_or_generate(player.id(), || narrator.turn_announcement(player.name()))
        .await;

    let segment = player
        .assigned()
        .ok_or_else(|| PrefetchError::Unassigned(player.name().to_string()))?;
    let content = cache
        .result_or_generate(player.id(), || narrator.result(player.name(), segment))
        .await;
    if content.audio.is_none() {
        debug!("Result narration for {} has no audio", player.name());
    }

    announcement
        .map(|_| ())
        .map_err(|_| PrefetchError::NoAnnouncementAudio(player.name().to_string()))
}
