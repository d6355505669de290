//! Per-session narration cache.
//!
//! Two keyed caches (turn announcements and result content) plus the one-off
//! order announcement and the "first player ready" signal. Every keyed slot is
//! a `OnceCell`, so the prefetch pass and the just-in-time fallback share the
//! same write-if-absent path: a hit never regenerates, and concurrent misses
//! for one player wait on a single generation instead of racing.

use crate::media::AudioBuffer;
use crate::narrator::ResultContent;
use crate::player::PlayerId;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{watch, OnceCell};
use tracing::debug;

type Slot<T> = Arc<OnceCell<T>>;

/// State of the order announcement narration.
#[derive(Debug, Clone, PartialEq)]
pub enum OrderAnnouncement {
    Pending,
    /// Generation finished; `None` when no audio could be produced
    Ready(Option<AudioBuffer>),
}

impl OrderAnnouncement {
    pub fn is_ready(&self) -> bool {
        matches!(self, OrderAnnouncement::Ready(_))
    }
}

/// Announcement generation produced no playable audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("no announcement audio")]
pub struct NoAudio;

pub struct NarrationCache {
    announcements: Mutex<HashMap<PlayerId, Slot<AudioBuffer>>>,
    results: Mutex<HashMap<PlayerId, Slot<ResultContent>>>,
    order: watch::Sender<OrderAnnouncement>,
    first_ready: watch::Sender<bool>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn slot<T>(map: &Mutex<HashMap<PlayerId, Slot<T>>>, id: PlayerId) -> Slot<T> {
    lock(map).entry(id).or_default().clone()
}

fn peek<T: Clone>(map: &Mutex<HashMap<PlayerId, Slot<T>>>, id: PlayerId) -> Option<T> {
    lock(map).get(&id).and_then(|s| s.get().cloned())
}

impl NarrationCache {
    pub fn new() -> Self {
        let (order, _) = watch::channel(OrderAnnouncement::Pending);
        let (first_ready, _) = watch::channel(false);
        Self {
            announcements: Mutex::new(HashMap::new()),
            results: Mutex::new(HashMap::new()),
            order,
            first_ready,
        }
    }

    /// Cached turn announcement, without generating.
    pub fn announcement(&self, id: PlayerId) -> Option<AudioBuffer> {
        peek(&self.announcements, id)
    }

    /// Cached result content, without generating.
    pub fn result(&self, id: PlayerId) -> Option<ResultContent> {
        peek(&self.results, id)
    }

    /// Return the cached announcement or run `generate` to fill the slot.
    ///
    /// A generation that yields no audio leaves the slot empty so a later
    /// lookup may try again.
    pub async fn announcement_or_generate<F, Fut>(&self, id: PlayerId, generate: F) -> Result<AudioBuffer, NoAudio>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Option<AudioBuffer>>,
    {
        let slot = slot(&self.announcements, id);
        slot.get_or_try_init(move || async move {
            debug!("Generating announcement for player {}", id);
            generate().await.ok_or(NoAudio)
        })
        .await
        .cloned()
    }

    /// Return cached result content or run `generate` to fill the slot.
    pub async fn result_or_generate<F, Fut>(&self, id: PlayerId, generate: F) -> ResultContent
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ResultContent>,
    {
        let slot = slot(&self.results, id);
        slot.get_or_init(move || async move {
            debug!("Generating result content for player {}", id);
            generate().await
        })
        .await
        .clone()
    }

    pub fn set_order_announcement(&self, audio: Option<AudioBuffer>) {
        self.order.send_replace(OrderAnnouncement::Ready(audio));
    }

    pub fn order_announcement(&self) -> watch::Receiver<OrderAnnouncement> {
        self.order.subscribe()
    }

    pub fn mark_first_ready(&self) {
        self.first_ready.send_replace(true);
    }

    pub fn is_first_ready(&self) -> bool {
        *self.first_ready.borrow()
    }

    pub fn first_ready(&self) -> watch::Receiver<bool> {
        self.first_ready.subscribe()
    }

    /// Drop every entry and reset both signals.
    pub fn clear(&self) {
        lock(&self.announcements).clear();
        lock(&self.results).clear();
        self.order.send_replace(OrderAnnouncement::Pending);
        self.first_ready.send_replace(false);
    }

    /// Filled (announcement, result) entries.
    pub fn len(&self) -> (usize, usize) {
        (filled(&self.announcements), filled(&self.results))
    }
}

fn filled<T>(map: &Mutex<HashMap<PlayerId, Slot<T>>>) -> usize {
    lock(map).values().filter(|s| s.initialized()).count()
}

impl Default for NarrationCache {
    fn default() -> Self {
        Self::new()
    }
}
