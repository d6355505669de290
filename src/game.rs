//! Game State Machine
//!
//! LOBBY → DETERMINING_ORDER → PLAYING → FINISHED. Every game gets its own
//! [`Session`] holding the ordered players, the host and a fresh narration
//! cache; dropping the session aborts its background work and clears that
//! cache, so nothing from an earlier game can show up in a later one.
//!
//! Spinning is split in three steps so a caller can keep handling input while
//! content resolves:
//! 1. [`Game::begin_spin`] locks the wheel and hands out a [`SpinRequest`]
//! 2. [`SpinRequest::resolve`] waits for the minimum spin time and the content
//! 3. [`Game::land`] tells the wheel where to stop; [`Game::finish_spin`] is
//!    called once the wheel has stopped and shows the result.

use crate::cache::{NarrationCache, OrderAnnouncement};
use crate::catalog::{self, Persona, Segment, PERSONAS, SEGMENTS};
use crate::gemini::ContentGateway;
use crate::media::AudioBuffer;
use crate::narrator::Narrator;
use crate::playback::NarrationPlayer;
use crate::player::{Player, PlayerId};
use crate::prefetch;
use crate::turn_order::{self, OrderError};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// How many upcoming players the "up next" list shows
pub const UP_NEXT: usize = 5;

/// Commentary shown when spin content could not be prepared
pub const CONNECTION_LOST: &str = "The elves lost the connection!";

#[derive(Debug, Clone)]
pub struct GameConfig {
    /// Shortest visible spin, however fast the content arrives
    pub min_spin: Duration,
    /// Pause between "first player ready" and a deferred start
    pub grace: Duration,
    /// Longest a spin waits for its result content
    pub result_timeout: Duration,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            min_spin: Duration::from_millis(2000),
            grace: Duration::from_millis(1500),
            result_timeout: Duration::from_secs(25),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Lobby,
    DeterminingOrder,
    Playing,
    Finished,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum GameError {
    #[error("Cannot {action} during {phase:?}")]
    WrongPhase { action: &'static str, phase: Phase },
    #[error(transparent)]
    Order(#[from] OrderError),
    #[error("Player name is empty")]
    EmptyName,
    #[error("No such player")]
    UnknownPlayer,
    #[error("Unknown host {0:?}")]
    UnknownHost(String),
    #[error("The wheel is already spinning")]
    SpinInProgress,
    #[error("Close the current result first")]
    ResultShowing,
    #[error("No spin is landing")]
    NotLanding,
    #[error("No result is showing")]
    NoResult,
    #[error("Spin belongs to a previous turn")]
    StaleSpin,
}

/// What a finished spin shows.
#[derive(Debug, Clone, PartialEq)]
pub struct Reveal {
    pub segment: &'static Segment,
    pub commentary: String,
    pub audio: Option<AudioBuffer>,
}

impl Reveal {
    fn connection_lost() -> Self {
        Self {
            segment: catalog::default_segment(),
            commentary: CONNECTION_LOST.to_string(),
            audio: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SpinState {
    Idle,
    /// Waiting on the minimum spin time and the result content
    Spinning,
    /// Target known, wheel still turning
    Landing(Reveal),
    ShowingResult(Reveal),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderConfirmation {
    Started,
    /// First player not ready yet; see [`Game::deferred_start`]
    Waiting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnAdvance {
    Next(usize),
    Finished,
}

/// Announcement only when the current player actually changed.
pub fn should_announce(previous: Option<PlayerId>, current: PlayerId) -> bool {
    previous != Some(current)
}

struct Session {
    id: u64,
    players: Vec<Player>,
    narrator: Narrator,
    cache: Arc<NarrationCache>,
    current: usize,
    last_announced: Option<PlayerId>,
    spin: SpinState,
    waiting_for_first: bool,
    prefetch: JoinHandle<()>,
    order_narration: Option<JoinHandle<()>>,
    announcement: Option<JoinHandle<()>>,
}

impl Session {
    fn stop_announcement(&mut self) {
        if let Some(task) = self.announcement.take() {
            task.abort();
        }
    }

    fn stop_order_narration(&mut self) {
        if let Some(task) = self.order_narration.take() {
            task.abort();
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.prefetch.abort();
        self.stop_order_narration();
        self.stop_announcement();
        self.cache.clear();
        debug!("Session #{} torn down", self.id);
    }
}

/// Resolves to the session id once the first player is ready and the grace
/// period has passed. Feed it back to [`Game::resume_after_wait`].
pub struct DeferredStart {
    session: u64,
    ready: watch::Receiver<bool>,
    grace: Duration,
}

impl DeferredStart {
    pub async fn wait(mut self) -> u64 {
        if self.ready.wait_for(|ready| *ready).await.is_err() {
            debug!("Session #{} ended while waiting for the first player", self.session);
        }
        tokio::time::sleep(self.grace).await;
        self.session
    }
}

/// Everything needed to resolve one spin without holding the game.
pub struct SpinRequest {
    session: u64,
    turn: usize,
    player: PlayerId,
    name: String,
    segment: &'static Segment,
    cache: Arc<NarrationCache>,
    narrator: Narrator,
    min_spin: Duration,
    timeout: Duration,
}

impl SpinRequest {
    pub fn session(&self) -> u64 {
        self.session
    }

    /// Index of the turn this spin belongs to.
    pub fn turn(&self) -> usize {
        self.turn
    }

    pub fn segment(&self) -> &'static Segment {
        self.segment
    }

    /// Wait for both the minimum spin time and the result content.
    pub async fn resolve(self) -> Reveal {
        let content = async {
            if self.cache.result(self.player).is_none() {
                info!("Cache miss for {} result - generating now", self.name);
            } else {
                debug!("Result for {} served from cache", self.name);
            }
            self.cache
                .result_or_generate(self.player, || self.narrator.result(&self.name, self.segment))
                .await
        };

        let (_, content) = tokio::join!(
            tokio::time::sleep(self.min_spin),
            tokio::time::timeout(self.timeout, content),
        );

        match content {
            Ok(content) => Reveal {
                segment: self.segment,
                commentary: content.commentary,
                audio: content.audio,
            },
            Err(_) => {
                warn!("Error preparing result for {}: timed out after {:?}", self.name, self.timeout);
                Reveal::connection_lost()
            }
        }
    }
}

pub struct Game {
    config: GameConfig,
    gateway: Arc<dyn ContentGateway>,
    player: NarrationPlayer,
    phase: Phase,
    roster: Vec<Player>,
    pinned_host: Option<&'static Persona>,
    /// Host of the most recent game, kept across resets
    last_host: Option<&'static Persona>,
    session: Option<Session>,
    sessions_started: u64,
    rng: StdRng,
}

impl Game {
    pub fn new(config: GameConfig, gateway: Arc<dyn ContentGateway>, player: NarrationPlayer) -> Self {
        Self {
            config,
            gateway,
            player,
            phase: Phase::Lobby,
            roster: Vec::new(),
            pinned_host: None,
            last_host: None,
            session: None,
            sessions_started: 0,
            rng: StdRng::from_os_rng(),
        }
    }

    /// Deterministic order and outcomes.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    fn require(&self, phase: Phase, action: &'static str) -> Result<(), GameError> {
        if self.phase == phase {
            Ok(())
        } else {
            Err(GameError::WrongPhase { action, phase: self.phase })
        }
    }

    // ----- lobby -----

    pub fn add_player(&mut self, name: &str) -> Result<PlayerId, GameError> {
        self.require(Phase::Lobby, "add players")?;
        let player = Player::new(name).ok_or(GameError::EmptyName)?;
        let id = player.id();
        info!("➕ {} joined", player.name());
        self.roster.push(player);
        Ok(id)
    }

    pub fn remove_player(&mut self, id: PlayerId) -> Result<(), GameError> {
        self.require(Phase::Lobby, "remove players")?;
        let index = self
            .roster
            .iter()
            .position(|p| p.id() == id)
            .ok_or(GameError::UnknownPlayer)?;
        let removed = self.roster.remove(index);
        info!("➖ {} left", removed.name());
        Ok(())
    }

    /// Pin the next game's host, or `None` to pick one at random.
    pub fn select_host(&mut self, id: Option<&str>) -> Result<(), GameError> {
        self.require(Phase::Lobby, "choose a host")?;
        self.pinned_host = match id {
            Some(id) => Some(catalog::persona(id).ok_or_else(|| GameError::UnknownHost(id.to_string()))?),
            None => None,
        };
        Ok(())
    }

    pub fn start_game(&mut self) -> Result<(), GameError> {
        self.require(Phase::Lobby, "start a game")?;
        let plan = turn_order::determine(
            &self.roster,
            &SEGMENTS,
            &PERSONAS,
            self.last_host.map(|h| h.id),
            &mut self.rng,
        )?;
        let host = self.pinned_host.unwrap_or(plan.host);
        self.install(plan.players, host);
        Ok(())
    }

    /// Tear down the previous session (if any) and start a new one.
    fn install(&mut self, players: Vec<Player>, host: &'static Persona) {
        self.session = None;
        self.player.stop();

        self.sessions_started += 1;
        let id = self.sessions_started;
        let cache = Arc::new(NarrationCache::new());
        let narrator = Narrator::new(self.gateway.clone(), host);
        let prefetch = prefetch::spawn(cache.clone(), narrator.clone(), players.clone());
        let order_narration = tokio::spawn(narrate_order(cache.order_announcement(), self.player.clone()));

        let names: Vec<&str> = players.iter().map(Player::name).collect();
        info!("🎄 Game #{} order: {} (host {})", id, names.join(", "), host.name);

        self.last_host = Some(host);
        self.session = Some(Session {
            id,
            players,
            narrator,
            cache,
            current: 0,
            last_announced: None,
            spin: SpinState::Idle,
            waiting_for_first: false,
            prefetch,
            order_narration: Some(order_narration),
            announcement: None,
        });
        self.phase = Phase::DeterminingOrder;
    }

    // ----- order reveal -----

    /// Move to PLAYING now if the first player is ready, otherwise wait.
    pub fn confirm_order(&mut self) -> Result<OrderConfirmation, GameError> {
        self.require(Phase::DeterminingOrder, "confirm the order")?;
        self.player.stop();
        let Some(session) = self.session.as_mut() else {
            return Err(GameError::WrongPhase { action: "confirm the order", phase: self.phase });
        };
        session.stop_order_narration();

        if session.cache.is_first_ready() {
            self.begin_playing();
            Ok(OrderConfirmation::Started)
        } else {
            info!("⏳ Waiting for the elves to prepare the first turn");
            session.waiting_for_first = true;
            Ok(OrderConfirmation::Waiting)
        }
    }

    pub fn deferred_start(&self) -> Option<DeferredStart> {
        let session = self.session.as_ref().filter(|s| s.waiting_for_first)?;
        Some(DeferredStart {
            session: session.id,
            ready: session.cache.first_ready(),
            grace: self.config.grace,
        })
    }

    /// Complete a deferred confirmation. Returns `false` when the wait belongs
    /// to a session that is no longer waiting.
    pub fn resume_after_wait(&mut self, session_id: u64) -> bool {
        let resumable = self.phase == Phase::DeterminingOrder
            && self
                .session
                .as_ref()
                .is_some_and(|s| s.id == session_id && s.waiting_for_first && s.cache.is_first_ready());
        if resumable {
            self.begin_playing();
        }
        resumable
    }

    fn begin_playing(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.waiting_for_first = false;
            session.current = 0;
            session.stop_order_narration();
        }
        self.phase = Phase::Playing;
        info!("🎡 Let's play!");
        self.sync_announcement();
    }

    // ----- playing -----

    /// Announce the current player unless they were the last one announced.
    fn sync_announcement(&mut self) {
        if self.phase != Phase::Playing {
            return;
        }
        let out = self.player.clone();
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let Some(player) = session.players.get(session.current) else {
            return;
        };
        if !should_announce(session.last_announced, player.id()) {
            return;
        }
        session.last_announced = Some(player.id());

        let task = announce(session.cache.clone(), session.narrator.clone(), player.clone(), out);
        session.stop_announcement();
        session.announcement = Some(tokio::spawn(task));
    }

    pub fn begin_spin(&mut self) -> Result<SpinRequest, GameError> {
        self.require(Phase::Playing, "spin")?;
        let (min_spin, timeout) = (self.config.min_spin, self.config.result_timeout);
        let Some(session) = self.session.as_mut() else {
            return Err(GameError::WrongPhase { action: "spin", phase: self.phase });
        };
        match session.spin {
            SpinState::Idle => {}
            SpinState::Spinning | SpinState::Landing(_) => return Err(GameError::SpinInProgress),
            SpinState::ShowingResult(_) => return Err(GameError::ResultShowing),
        }
        let player = session.players.get(session.current).ok_or(GameError::UnknownPlayer)?;
        let (id, name) = (player.id(), player.name().to_string());
        let segment = player.assigned().unwrap_or_else(catalog::default_segment);

        session.stop_announcement();
        self.player.stop();
        session.spin = SpinState::Spinning;
        info!("🎰 {} spins the wheel", name);

        Ok(SpinRequest {
            session: session.id,
            turn: session.current,
            player: id,
            name,
            segment,
            cache: session.cache.clone(),
            narrator: session.narrator.clone(),
            min_spin,
            timeout,
        })
    }

    /// Record a resolved spin; returns the segment the wheel should stop on.
    pub fn land(&mut self, request_session: u64, turn: usize, reveal: Reveal) -> Result<&'static Segment, GameError> {
        let session = self.session.as_mut().ok_or(GameError::StaleSpin)?;
        if session.id != request_session || session.current != turn || session.spin != SpinState::Spinning {
            return Err(GameError::StaleSpin);
        }
        let segment = reveal.segment;
        session.spin = SpinState::Landing(reveal);
        Ok(segment)
    }

    /// Begin, resolve and land in one go.
    pub async fn spin(&mut self) -> Result<&'static Segment, GameError> {
        let request = self.begin_spin()?;
        let (session, turn) = (request.session, request.turn);
        let reveal = request.resolve().await;
        self.land(session, turn, reveal)
    }

    /// The wheel stopped: show the result and read it out.
    pub fn finish_spin(&mut self) -> Result<&Reveal, GameError> {
        let out = self.player.clone();
        let session = self.session.as_mut().ok_or(GameError::NotLanding)?;
        let reveal = match std::mem::replace(&mut session.spin, SpinState::Idle) {
            SpinState::Landing(reveal) => reveal,
            other => {
                session.spin = other;
                return Err(GameError::NotLanding);
            }
        };

        if let Some(player) = session.players.get(session.current) {
            info!("🎁 {} landed on {}: {}", player.name(), reveal.segment.label, reveal.commentary);
        }
        if let Some(audio) = reveal.audio.clone() {
            if let Err(e) = out.play(audio, "result") {
                warn!("Result narration failed: {}", e);
            }
        }

        session.spin = SpinState::ShowingResult(reveal);
        match &session.spin {
            SpinState::ShowingResult(reveal) => Ok(reveal),
            _ => Err(GameError::NoResult),
        }
    }

    /// Toggle the result narration. Returns whether it is now playing.
    pub fn replay_result(&mut self) -> Result<bool, GameError> {
        let Some(SpinState::ShowingResult(reveal)) = self.session.as_ref().map(|s| &s.spin) else {
            return Err(GameError::NoResult);
        };
        if self.player.is_narrating() {
            self.player.stop();
            return Ok(false);
        }
        let Some(audio) = reveal.audio.clone() else {
            return Ok(false);
        };
        match self.player.play(audio, "result") {
            Ok(_) => Ok(true),
            Err(e) => {
                warn!("Replay failed: {}", e);
                Ok(false)
            }
        }
    }

    pub fn close_result(&mut self) -> Result<TurnAdvance, GameError> {
        self.require(Phase::Playing, "close a result")?;
        let session = self.session.as_mut().ok_or(GameError::NoResult)?;
        if !matches!(session.spin, SpinState::ShowingResult(_)) {
            return Err(GameError::NoResult);
        }
        self.player.stop();
        session.spin = SpinState::Idle;

        let last = session.players.len().saturating_sub(1);
        if let Some(player) = session.players.get_mut(session.current) {
            player.mark_completed();
        }

        if session.current >= last {
            session.stop_announcement();
            self.phase = Phase::Finished;
            info!("🏆 Game #{} finished", session.id);
            Ok(TurnAdvance::Finished)
        } else {
            session.current += 1;
            let next = session.current;
            self.sync_announcement();
            Ok(TurnAdvance::Next(next))
        }
    }

    // ----- finished / reset -----

    /// New order, new outcomes and a different host, same players.
    pub fn play_again(&mut self) -> Result<(), GameError> {
        self.require(Phase::Finished, "play again")?;
        self.session = None;
        let plan = turn_order::determine(
            &self.roster,
            &SEGMENTS,
            &PERSONAS,
            self.last_host.map(|h| h.id),
            &mut self.rng,
        )?;
        self.install(plan.players, plan.host);
        Ok(())
    }

    /// Back to an empty lobby from any phase. The last host is remembered.
    pub fn reset(&mut self) {
        self.session = None;
        self.player.stop();
        self.roster.clear();
        self.pinned_host = None;
        self.phase = Phase::Lobby;
        info!("🔄 Back to the lobby");
    }

    // ----- views -----

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn roster(&self) -> &[Player] {
        &self.roster
    }

    /// Players in play order; empty in the lobby.
    pub fn lineup(&self) -> &[Player] {
        self.session.as_ref().map(|s| s.players.as_slice()).unwrap_or(&[])
    }

    pub fn current_index(&self) -> Option<usize> {
        match self.phase {
            Phase::Playing | Phase::Finished => self.session.as_ref().map(|s| s.current),
            _ => None,
        }
    }

    pub fn current_player(&self) -> Option<&Player> {
        let index = self.current_index()?;
        self.lineup().get(index)
    }

    pub fn up_next(&self) -> &[Player] {
        match self.current_index() {
            Some(index) if self.phase == Phase::Playing => {
                let rest = self.lineup().get(index + 1..).unwrap_or(&[]);
                &rest[..rest.len().min(UP_NEXT)]
            }
            _ => &[],
        }
    }

    pub fn host(&self) -> Option<&'static Persona> {
        self.session.as_ref().map(|s| s.narrator.host())
    }

    pub fn last_host(&self) -> Option<&'static Persona> {
        self.last_host
    }

    pub fn pinned_host(&self) -> Option<&'static Persona> {
        self.pinned_host
    }

    pub fn spin_state(&self) -> Option<&SpinState> {
        self.session.as_ref().map(|s| &s.spin)
    }

    pub fn reveal(&self) -> Option<&Reveal> {
        match self.spin_state()? {
            SpinState::Landing(reveal) | SpinState::ShowingResult(reveal) => Some(reveal),
            _ => None,
        }
    }

    pub fn is_first_player_ready(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.cache.is_first_ready())
    }

    pub fn is_waiting_for_first(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.waiting_for_first)
    }

    pub fn prefetch_finished(&self) -> bool {
        self.session.as_ref().map_or(true, |s| s.prefetch.is_finished())
    }

    pub fn order_announcement(&self) -> Option<watch::Receiver<OrderAnnouncement>> {
        self.session.as_ref().map(|s| s.cache.order_announcement())
    }

    pub fn narrating(&self) -> watch::Receiver<bool> {
        self.player.narrating()
    }

    pub fn session_id(&self) -> Option<u64> {
        self.session.as_ref().map(|s| s.id)
    }

    pub fn cache(&self) -> Option<Arc<NarrationCache>> {
        self.session.as_ref().map(|s| s.cache.clone())
    }
}

/// Play the order announcement as soon as it has been generated.
async fn narrate_order(mut order: watch::Receiver<OrderAnnouncement>, out: NarrationPlayer) {
    let audio = match order.wait_for(OrderAnnouncement::is_ready).await {
        Ok(state) => match &*state {
            OrderAnnouncement::Ready(Some(audio)) => audio.clone(),
            _ => {
                debug!("Order announcement has no audio, skipping");
                return;
            }
        },
        Err(_) => return,
    };
    match out.play(audio, "order") {
        Ok(playback) => {
            playback.finished().await;
        }
        Err(e) => warn!("Failed to play order audio: {}", e),
    }
}

/// Play a player's turn announcement, generating it if the prefetch has not.
async fn announce(cache: Arc<NarrationCache>, narrator: Narrator, player: Player, out: NarrationPlayer) {
    if cache.announcement(player.id()).is_none() {
        info!("Cache miss for {} intro - generating now", player.name());
    }
    let audio = cache
        .announcement_or_generate(player.id(), || narrator.turn_announcement(player.name()))
        .await;
    match audio {
        Ok(audio) => match out.play(audio, "turn") {
            Ok(playback) => {
                playback.finished().await;
            }
            Err(e) => warn!("Announcement failed: {}", e),
        },
        Err(_) => debug!("No announcement audio for {}", player.name()),
    }
}
