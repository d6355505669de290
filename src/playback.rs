//! Audio Playback Controller
//!
//! One narration voice at a time. Buffers are written from a dedicated OS
//! thread (the PulseAudio simple API blocks), in 100ms chunks so a stop
//! request takes effect quickly. Each playback hands back a completion future,
//! and a `watch` channel tracks whether anything is currently audible.

use crate::media::AudioBuffer;
use libpulse_binding as pulse;
use libpulse_simple_binding as psimple;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

/// Playback granularity; stop requests are honoured between chunks.
pub const CHUNK: Duration = Duration::from_millis(100);

#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("PulseAudio error: {0}")]
    Pulse(String),
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Output context is closed")]
    Closed,
    #[error("Playback thread has exited")]
    ThreadGone,
}

/// Something that can open an output stream for a given PCM format.
pub trait AudioBackend: Send + Sync {
    fn name(&self) -> &'static str;
    fn open(&self, sample_rate: u32, channels: u16) -> Result<Box<dyn OutputContext>, AudioError>;
}

/// An open output stream. Lives on the playback thread only.
pub trait OutputContext {
    fn start(&mut self, _label: &str) -> Result<(), AudioError> {
        Ok(())
    }
    /// Blocking write of interleaved samples.
    fn write(&mut self, samples: &[i16]) -> Result<(), AudioError>;
    /// Wait until everything written has been played.
    fn finish(&mut self) -> Result<(), AudioError>;
    /// Discard anything queued but not yet played.
    fn abort(&mut self) -> Result<(), AudioError>;
    fn is_closed(&self) -> bool {
        false
    }
}

// ---------------------------------------------------------------------------
// Backends
// ---------------------------------------------------------------------------

/// Speakers via PulseAudio's simple API.
pub struct PulseBackend {
    app_name: String,
}

impl PulseBackend {
    pub fn new(app_name: &str) -> Self {
        Self { app_name: app_name.to_string() }
    }
}

impl AudioBackend for PulseBackend {
    fn name(&self) -> &'static str {
        "pulse"
    }

    fn open(&self, sample_rate: u32, channels: u16) -> Result<Box<dyn OutputContext>, AudioError> {
        let spec = sample_spec(sample_rate, channels)?;

        let simple = psimple::Simple::new(
            None,                               // default server
            &self.app_name,                     // application name
            pulse::stream::Direction::Playback, // output stream
            None,                               // default sink
            "narration",                        // stream description
            &spec,
            None, // default channel map
            None, // default buffering
        )
        .map_err(|e| pulse_error("connect", e))?;

        info!("🔊 PulseAudio playback connected ({} Hz, {} ch)", sample_rate, channels);
        Ok(Box::new(PulseOutput { simple }))
    }
}

fn sample_spec(sample_rate: u32, channels: u16) -> Result<pulse::sample::Spec, AudioError> {
    let spec = pulse::sample::Spec {
        format: pulse::sample::Format::S16le,
        channels: u8::try_from(channels)
            .map_err(|_| AudioError::Pulse(format!("too many channels: {channels}")))?,
        rate: sample_rate,
    };
    if !spec.is_valid() {
        return Err(AudioError::Pulse(format!("invalid sample spec {sample_rate} Hz x{channels}")));
    }
    Ok(spec)
}

fn pulse_error(action: &str, e: pulse::error::PAErr) -> AudioError {
    AudioError::Pulse(format!("{action} failed: {e:?}"))
}

struct PulseOutput {
    simple: psimple::Simple,
}

impl OutputContext for PulseOutput {
    fn write(&mut self, samples: &[i16]) -> Result<(), AudioError> {
        let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        self.simple.write(&bytes).map_err(|e| pulse_error("write", e))
    }

    fn finish(&mut self) -> Result<(), AudioError> {
        self.simple.drain().map_err(|e| pulse_error("drain", e))
    }

    fn abort(&mut self) -> Result<(), AudioError> {
        self.simple.flush().map_err(|e| pulse_error("flush", e))
    }
}

/// Writes every narration to its own numbered WAV file.
pub struct WavBackend {
    dir: PathBuf,
    counter: Arc<AtomicUsize>,
}

impl WavBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into(), counter: Arc::new(AtomicUsize::new(0)) }
    }
}

impl AudioBackend for WavBackend {
    fn name(&self) -> &'static str {
        "wav"
    }

    fn open(&self, sample_rate: u32, channels: u16) -> Result<Box<dyn OutputContext>, AudioError> {
        fs::create_dir_all(&self.dir)?;
        info!("Recording narration to {:?}", self.dir);
        Ok(Box::new(WavOutput {
            dir: self.dir.clone(),
            counter: self.counter.clone(),
            spec: hound::WavSpec {
                channels,
                sample_rate,
                bits_per_sample: 16,
                sample_format: hound::SampleFormat::Int,
            },
            current: None,
        }))
    }
}

struct WavOutput {
    dir: PathBuf,
    counter: Arc<AtomicUsize>,
    spec: hound::WavSpec,
    current: Option<(hound::WavWriter<BufWriter<File>>, PathBuf)>,
}

impl WavOutput {
    fn close_current(&mut self) -> Result<(), AudioError> {
        if let Some((writer, path)) = self.current.take() {
            writer.finalize()?;
            debug!("Saved narration to {:?}", path);
        }
        Ok(())
    }
}

impl OutputContext for WavOutput {
    fn start(&mut self, label: &str) -> Result<(), AudioError> {
        self.close_current()?;
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let path = self.dir.join(format!("narration_{n:03}_{label}.wav"));
        let writer = hound::WavWriter::create(&path, self.spec)?;
        self.current = Some((writer, path));
        Ok(())
    }

    fn write(&mut self, samples: &[i16]) -> Result<(), AudioError> {
        let (writer, _) = self.current.as_mut().ok_or(AudioError::Closed)?;
        for &sample in samples {
            writer.write_sample(sample)?;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<(), AudioError> {
        self.close_current()
    }

    /// A stopped narration keeps what was written so far.
    fn abort(&mut self) -> Result<(), AudioError> {
        self.close_current()
    }
}

/// Discards audio. `paced` keeps real-time timing so narration still takes
/// as long as it would on speakers.
pub struct NullBackend {
    paced: bool,
}

impl NullBackend {
    pub fn paced() -> Self {
        Self { paced: true }
    }

    pub fn instant() -> Self {
        Self { paced: false }
    }
}

impl AudioBackend for NullBackend {
    fn name(&self) -> &'static str {
        "null"
    }

    fn open(&self, sample_rate: u32, channels: u16) -> Result<Box<dyn OutputContext>, AudioError> {
        Ok(Box::new(NullOutput { paced: self.paced, sample_rate, channels }))
    }
}

struct NullOutput {
    paced: bool,
    sample_rate: u32,
    channels: u16,
}

impl OutputContext for NullOutput {
    fn write(&mut self, samples: &[i16]) -> Result<(), AudioError> {
        if self.paced {
            let frames = samples.len() as u64 / u64::from(self.channels.max(1));
            std::thread::sleep(Duration::from_micros(frames * 1_000_000 / u64::from(self.sample_rate.max(1))));
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<(), AudioError> {
        Ok(())
    }

    fn abort(&mut self) -> Result<(), AudioError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// How a playback ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEnd {
    Finished,
    Stopped,
    Failed,
}

/// Handle to one started narration.
#[derive(Debug)]
pub struct Playback {
    id: u64,
    done: oneshot::Receiver<PlaybackEnd>,
}

impl Playback {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Resolves once the narration ends, however it ends.
    pub async fn finished(self) -> PlaybackEnd {
        self.done.await.unwrap_or(PlaybackEnd::Failed)
    }
}

struct Command {
    id: u64,
    buffer: AudioBuffer,
    label: &'static str,
    stop: Arc<AtomicBool>,
    done: oneshot::Sender<PlaybackEnd>,
}

struct Shared {
    commands: mpsc::UnboundedSender<Command>,
    /// Stop flag of the playback most recently started
    current: Mutex<Option<Arc<AtomicBool>>>,
    /// Id of the audible (or about to be) playback, 0 when idle
    current_id: Arc<AtomicU64>,
    next_id: AtomicU64,
    narrating: Arc<watch::Sender<bool>>,
}

impl Drop for Shared {
    fn drop(&mut self) {
        if let Some(stop) = self.current.get_mut().unwrap_or_else(PoisonError::into_inner).take() {
            stop.store(true, Ordering::SeqCst);
        }
    }
}

/// Cloneable handle to the single narration output.
#[derive(Clone)]
pub struct NarrationPlayer {
    shared: Arc<Shared>,
}

impl NarrationPlayer {
    /// Spawn the output thread. The output context itself is opened lazily on
    /// the first playback.
    pub fn new(backend: Arc<dyn AudioBackend>) -> Result<Self, AudioError> {
        let (commands, rx) = mpsc::unbounded_channel();
        let (narrating, _) = watch::channel(false);
        let narrating = Arc::new(narrating);
        let current_id = Arc::new(AtomicU64::new(0));

        let (thread_narrating, thread_current) = (narrating.clone(), current_id.clone());
        // Output contexts are not Send, so the thread state is built on the thread
        std::thread::Builder::new()
            .name("narration-output".to_string())
            .spawn(move || {
                OutputThread {
                    backend,
                    narrating: thread_narrating,
                    current_id: thread_current,
                    output: None,
                }
                .run(rx)
            })?;

        Ok(Self {
            shared: Arc::new(Shared {
                commands,
                current: Mutex::new(None),
                current_id,
                next_id: AtomicU64::new(0),
                narrating,
            }),
        })
    }

    /// Stop whatever is playing and start `buffer`.
    pub fn play(&self, buffer: AudioBuffer, label: &'static str) -> Result<Playback, AudioError> {
        self.stop();

        let id = self.shared.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let stop = Arc::new(AtomicBool::new(false));
        let (done, rx) = oneshot::channel();

        *self.lock_current() = Some(stop.clone());
        self.shared.current_id.store(id, Ordering::SeqCst);

        debug!("Queueing narration #{} ({}, {:?})", id, label, buffer.duration());
        self.shared
            .commands
            .send(Command { id, buffer, label, stop, done })
            .map_err(|_| AudioError::ThreadGone)?;

        Ok(Playback { id, done: rx })
    }

    /// Stop the current narration. Does nothing when idle.
    pub fn stop(&self) {
        let Some(stop) = self.lock_current().take() else {
            return;
        };
        if !stop.swap(true, Ordering::SeqCst) {
            debug!("Stopping narration");
        }
        self.shared.current_id.store(0, Ordering::SeqCst);
        self.shared.narrating.send_replace(false);
    }

    pub fn is_narrating(&self) -> bool {
        *self.shared.narrating.borrow()
    }

    pub fn narrating(&self) -> watch::Receiver<bool> {
        self.shared.narrating.subscribe()
    }

    fn lock_current(&self) -> std::sync::MutexGuard<'_, Option<Arc<AtomicBool>>> {
        self.shared.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct OutputThread {
    backend: Arc<dyn AudioBackend>,
    narrating: Arc<watch::Sender<bool>>,
    current_id: Arc<AtomicU64>,
    /// Open context and the format it was opened with
    output: Option<(Box<dyn OutputContext>, u32, u16)>,
}

impl OutputThread {
    fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        info!("Narration output thread started ({} backend)", self.backend.name());
        while let Some(cmd) = rx.blocking_recv() {
            let end = if cmd.stop.load(Ordering::SeqCst) {
                PlaybackEnd::Stopped
            } else {
                self.play(&cmd)
            };
            debug!("Narration #{} ({}) ended: {:?}", cmd.id, cmd.label, end);

            // A newer playback owns the flag once it has been queued
            let id = cmd.id;
            self.narrating.send_if_modified(|n| {
                let current = self.current_id.load(Ordering::SeqCst);
                if (current == id || current == 0) && *n {
                    *n = false;
                    true
                } else {
                    false
                }
            });
            let _ = cmd.done.send(end);
        }
        info!("Narration output thread exiting");
    }

    fn play(&mut self, cmd: &Command) -> PlaybackEnd {
        let buffer = &cmd.buffer;
        if let Err(e) = self.ensure_context(buffer.sample_rate(), buffer.channels()) {
            warn!("Could not open audio output: {}", e);
            return PlaybackEnd::Failed;
        }

        let id = cmd.id;
        let current_id = &self.current_id;
        self.narrating.send_if_modified(|n| {
            if current_id.load(Ordering::SeqCst) == id && !*n {
                *n = true;
                true
            } else {
                false
            }
        });

        let Some((output, _, _)) = self.output.as_mut() else {
            return PlaybackEnd::Failed;
        };
        let chunk_len = chunk_samples(buffer.sample_rate(), buffer.channels());
        let result = output.start(cmd.label).and_then(|()| {
            for chunk in buffer.samples().chunks(chunk_len) {
                if cmd.stop.load(Ordering::SeqCst) {
                    output.abort()?;
                    return Ok(PlaybackEnd::Stopped);
                }
                output.write(chunk)?;
            }
            output.finish()?;
            Ok(PlaybackEnd::Finished)
        });

        match result {
            Ok(end) => end,
            Err(e) => {
                error!("Narration playback failed: {}", e);
                // Recreated on the next playback
                self.output = None;
                PlaybackEnd::Failed
            }
        }
    }

    /// Make sure an output context is open for this format, reopening it when
    /// missing, closed or opened for a different format.
    fn ensure_context(&mut self, sample_rate: u32, channels: u16) -> Result<(), AudioError> {
        let reusable = matches!(
            &self.output,
            Some((ctx, rate, ch)) if !ctx.is_closed() && *rate == sample_rate && *ch == channels
        );
        if reusable {
            return Ok(());
        }
        if self.output.take().is_some() {
            debug!("Reopening audio output");
        }
        let ctx = self.backend.open(sample_rate, channels)?;
        self.output = Some((ctx, sample_rate, channels));
        Ok(())
    }
}

fn chunk_samples(sample_rate: u32, channels: u16) -> usize {
    let per_second = sample_rate as usize * channels.max(1) as usize;
    (per_second * CHUNK.as_millis() as usize / 1000).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{speech, MemoryBackend};
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(5);

    fn player(backend: &MemoryBackend) -> NarrationPlayer {
        NarrationPlayer::new(Arc::new(backend.clone())).unwrap()
    }

    #[test]
    fn pulse_spec_rejects_bad_formats() {
        let spec = sample_spec(24_000, 1).unwrap();
        assert_eq!((spec.rate, spec.channels), (24_000, 1));

        assert!(matches!(sample_spec(24_000, 300), Err(AudioError::Pulse(m)) if m.contains("300")));
        assert!(matches!(sample_spec(24_000, 0), Err(AudioError::Pulse(_))));
        assert!(matches!(sample_spec(0, 1), Err(AudioError::Pulse(_))));
    }

    #[test]
    fn pulse_errors_keep_the_action() {
        let err = pulse_error("drain", pulse::error::PAErr(-1));
        assert!(matches!(&err, AudioError::Pulse(m) if m.starts_with("drain failed")));
        assert!(err.to_string().starts_with("PulseAudio error: drain failed"));
    }

    #[test]
    fn chunks_are_a_tenth_of_a_second() {
        assert_eq!(chunk_samples(24_000, 1), 2_400);
        assert_eq!(chunk_samples(16_000, 2), 3_200);
        assert_eq!(chunk_samples(0, 1), 1);
    }

    #[tokio::test]
    async fn plays_whole_buffer_and_reports_finished() {
        let backend = MemoryBackend::new();
        let player = player(&backend);

        let playback = player.play(speech(6_000), "turn").unwrap();
        assert_eq!(timeout(WAIT, playback.finished()).await.unwrap(), PlaybackEnd::Finished);

        assert_eq!(backend.samples(), 6_000);
        assert_eq!(backend.finished(), 1);
        assert_eq!(backend.labels(), vec!["turn"]);
        let mut narrating = player.narrating();
        timeout(WAIT, narrating.wait_for(|n| !*n)).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn new_playback_stops_the_previous_one() {
        let backend = MemoryBackend::new().with_chunk_delay(Duration::from_millis(20));
        let player = player(&backend);

        // 3 seconds of audio, 30 chunks
        let first = player.play(speech(72_000), "order").unwrap();
        let mut narrating = player.narrating();
        timeout(WAIT, narrating.wait_for(|n| *n)).await.unwrap().unwrap();

        let second = player.play(speech(2_400), "turn").unwrap();
        assert_ne!(first.id(), second.id());
        assert_eq!(timeout(WAIT, first.finished()).await.unwrap(), PlaybackEnd::Stopped);
        assert_eq!(timeout(WAIT, second.finished()).await.unwrap(), PlaybackEnd::Finished);

        assert_eq!(backend.aborted(), 1);
        assert_eq!(backend.finished(), 1);
        assert!(backend.samples() < 72_000 + 2_400);
        assert_eq!(backend.opened(), 1);
    }

    #[tokio::test]
    async fn stop_when_idle_is_a_no_op() {
        let backend = MemoryBackend::new();
        let player = player(&backend);
        player.stop();
        player.stop();
        assert!(!player.is_narrating());

        let playback = player.play(speech(240), "result").unwrap();
        timeout(WAIT, playback.finished()).await.unwrap();
        player.stop();
        player.stop();
        assert!(!player.is_narrating());
    }

    #[tokio::test]
    async fn narrating_flag_follows_start_and_natural_end() {
        let backend = MemoryBackend::new().with_chunk_delay(Duration::from_millis(10));
        let player = player(&backend);
        let mut narrating = player.narrating();
        assert!(!*narrating.borrow());

        let playback = player.play(speech(24_000), "turn").unwrap();
        timeout(WAIT, narrating.wait_for(|n| *n)).await.unwrap().unwrap();
        assert_eq!(timeout(WAIT, playback.finished()).await.unwrap(), PlaybackEnd::Finished);
        timeout(WAIT, narrating.wait_for(|n| !*n)).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn closed_output_is_reopened() {
        let backend = MemoryBackend::new().closing();
        let player = player(&backend);

        for _ in 0..2 {
            let playback = player.play(speech(240), "turn").unwrap();
            timeout(WAIT, playback.finished()).await.unwrap();
        }
        assert_eq!(backend.opened(), 2);
    }

    #[tokio::test]
    async fn write_failure_ends_playback_and_clears_flag() {
        let backend = MemoryBackend::new().failing();
        let player = player(&backend);

        let playback = player.play(speech(4_800), "result").unwrap();
        assert_eq!(timeout(WAIT, playback.finished()).await.unwrap(), PlaybackEnd::Failed);
        let mut narrating = player.narrating();
        timeout(WAIT, narrating.wait_for(|n| !*n)).await.unwrap().unwrap();

        // next playback gets a fresh context
        let playback = player.play(speech(240), "turn").unwrap();
        timeout(WAIT, playback.finished()).await.unwrap();
        assert_eq!(backend.opened(), 2);
    }

    #[tokio::test]
    async fn wav_backend_writes_one_file_per_narration() {
        let dir = tempfile::tempdir().unwrap();
        let player = NarrationPlayer::new(Arc::new(WavBackend::new(dir.path()))).unwrap();

        for label in ["order", "turn"] {
            let playback = player.play(speech(4_800), label).unwrap();
            assert_eq!(timeout(WAIT, playback.finished()).await.unwrap(), PlaybackEnd::Finished);
        }

        let mut names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["narration_001_order.wav", "narration_002_turn.wav"]);

        let reader = hound::WavReader::open(dir.path().join(&names[0])).unwrap();
        assert_eq!(reader.spec().sample_rate, 24_000);
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.len(), 4_800);
    }

    #[tokio::test]
    async fn null_backend_finishes() {
        let player = NarrationPlayer::new(Arc::new(NullBackend::instant())).unwrap();
        let playback = player.play(speech(48_000), "result").unwrap();
        assert_eq!(timeout(WAIT, playback.finished()).await.unwrap(), PlaybackEnd::Finished);
    }
}
