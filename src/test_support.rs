//! Fakes shared by the unit tests: a call-counting gateway and an in-memory
//! audio backend.

use crate::catalog::SEGMENTS;
use crate::gemini::ContentGateway;
use crate::media::{AudioBuffer, SPEECH_CHANNELS, SPEECH_SAMPLE_RATE};
use crate::playback::{AudioBackend, AudioError, OutputContext};
use crate::player::Player;
use crate::prompt::Prompt;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Players in the given order, each assigned a distinct catalog segment.
pub fn lineup(names: &[&str]) -> Vec<Player> {
    names
        .iter()
        .enumerate()
        .map(|(i, n)| Player::new(n).unwrap().with_assignment(&SEGMENTS[i % SEGMENTS.len()]))
        .collect()
}

pub fn speech(samples: usize) -> AudioBuffer {
    AudioBuffer::new(vec![100; samples], SPEECH_SAMPLE_RATE, SPEECH_CHANNELS)
}

pub struct CountingGateway {
    online: bool,
    delay: Option<Duration>,
    silent_for: Option<String>,
    speech_samples: usize,
    text_calls: AtomicUsize,
    speech_calls: AtomicUsize,
    scripts: Mutex<Vec<String>>,
    last_voice: Mutex<Option<String>>,
}

impl CountingGateway {
    pub fn new() -> Self {
        Self {
            online: true,
            delay: None,
            silent_for: None,
            speech_samples: 240,
            text_calls: AtomicUsize::new(0),
            speech_calls: AtomicUsize::new(0),
            scripts: Mutex::new(Vec::new()),
            last_voice: Mutex::new(None),
        }
    }

    /// Behaves like a gateway with no credentials.
    pub fn offline() -> Self {
        Self { online: false, ..Self::new() }
    }

    /// Every call sleeps this long before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Speech for any script mentioning `name` comes back empty.
    pub fn without_speech_for(mut self, name: &str) -> Self {
        self.silent_for = Some(name.to_string());
        self
    }

    /// Length of every synthesized clip.
    pub fn with_speech_samples(mut self, samples: usize) -> Self {
        self.speech_samples = samples;
        self
    }

    pub fn text_calls(&self) -> usize {
        self.text_calls.load(Ordering::SeqCst)
    }

    pub fn speech_calls(&self) -> usize {
        self.speech_calls.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.text_calls() + self.speech_calls()
    }

    pub fn speech_scripts(&self) -> Vec<String> {
        self.scripts.lock().unwrap().clone()
    }

    pub fn last_voice(&self) -> Option<String> {
        self.last_voice.lock().unwrap().clone()
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl ContentGateway for CountingGateway {
    async fn generate_text(&self, prompt: &Prompt<'_>) -> String {
        self.text_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if !self.online {
            return prompt.offline_text();
        }
        match *prompt {
            Prompt::OrderAnnouncement { names, .. } => format!("order for {}", names.join(", ")),
            Prompt::TurnAnnouncement { player, .. } => format!("turn for {player}"),
            Prompt::Commentary { player, .. } => format!("commentary for {player}"),
        }
    }

    async fn generate_speech(&self, script: &str, voice: &str) -> Option<AudioBuffer> {
        self.speech_calls.fetch_add(1, Ordering::SeqCst);
        self.scripts.lock().unwrap().push(script.to_string());
        *self.last_voice.lock().unwrap() = Some(voice.to_string());
        self.pause().await;
        if !self.online {
            return None;
        }
        if let Some(name) = &self.silent_for {
            if script.contains(name.as_str()) {
                return None;
            }
        }
        Some(speech(self.speech_samples))
    }
}

#[derive(Default)]
struct MemoryState {
    opened: AtomicUsize,
    samples: AtomicUsize,
    finished: AtomicUsize,
    aborted: AtomicUsize,
    labels: Mutex<Vec<String>>,
}

/// Output backend that keeps counters instead of making sound.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    state: Arc<MemoryState>,
    chunk_delay: Duration,
    close_after_finish: bool,
    fail_writes: bool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block the output thread this long per written chunk.
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    /// Contexts report themselves closed after every drained playback.
    pub fn closing(mut self) -> Self {
        self.close_after_finish = true;
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    pub fn opened(&self) -> usize {
        self.state.opened.load(Ordering::SeqCst)
    }

    pub fn samples(&self) -> usize {
        self.state.samples.load(Ordering::SeqCst)
    }

    pub fn finished(&self) -> usize {
        self.state.finished.load(Ordering::SeqCst)
    }

    pub fn aborted(&self) -> usize {
        self.state.aborted.load(Ordering::SeqCst)
    }

    pub fn labels(&self) -> Vec<String> {
        self.state.labels.lock().unwrap().clone()
    }
}

impl AudioBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn open(&self, _sample_rate: u32, _channels: u16) -> Result<Box<dyn OutputContext>, AudioError> {
        self.state.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryOutput { backend: self.clone(), closed: false }))
    }
}

struct MemoryOutput {
    backend: MemoryBackend,
    closed: bool,
}

impl OutputContext for MemoryOutput {
    fn start(&mut self, label: &str) -> Result<(), AudioError> {
        self.backend.state.labels.lock().unwrap().push(label.to_string());
        Ok(())
    }

    fn write(&mut self, samples: &[i16]) -> Result<(), AudioError> {
        if self.backend.fail_writes {
            return Err(AudioError::Closed);
        }
        if !self.backend.chunk_delay.is_zero() {
            std::thread::sleep(self.backend.chunk_delay);
        }
        self.backend.state.samples.fetch_add(samples.len(), Ordering::SeqCst);
        Ok(())
    }

    fn finish(&mut self) -> Result<(), AudioError> {
        self.backend.state.finished.fetch_add(1, Ordering::SeqCst);
        if self.backend.close_after_finish {
            self.closed = true;
        }
        Ok(())
    }

    fn abort(&mut self) -> Result<(), AudioError> {
        self.backend.state.aborted.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}
