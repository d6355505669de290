//! Narration output check
//!
//! Plays a short chime through the configured backend and, when an API key is
//! set, has every host elf say hello.

use anyhow::{Context, Result};
use elfwheel::catalog::PERSONAS;
use elfwheel::config::AppConfig;
use elfwheel::gemini::{ContentGateway, GeminiGateway};
use elfwheel::media::{AudioBuffer, SPEECH_CHANNELS, SPEECH_SAMPLE_RATE};
use elfwheel::playback::{NarrationPlayer, PlaybackEnd};
use std::f32::consts::TAU;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

/// Two short sine notes, the way a sleigh bell would if it were a sine wave.
fn chime() -> AudioBuffer {
    let rate = SPEECH_SAMPLE_RATE as f32;
    let note = |freq: f32, secs: f32| {
        let len = (rate * secs) as usize;
        (0..len).map(move |i| {
            let t = i as f32 / rate;
            let fade = 1.0 - i as f32 / len as f32;
            ((TAU * freq * t).sin() * fade * 0.4 * i16::MAX as f32) as i16
        })
    };
    let samples: Vec<i16> = note(880.0, 0.25).chain(note(1320.0, 0.45)).collect();
    AudioBuffer::new(samples, SPEECH_SAMPLE_RATE, SPEECH_CHANNELS)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("elfwheel=debug")))
        .init();

    let config = AppConfig::from_env().context("Invalid configuration")?;
    println!("Audio output: {:?}", config.audio);

    let player = NarrationPlayer::new(config.audio.backend("elfwheel-check"))
        .context("Failed to start narration output")?;

    println!("\n🔔 Playing test chime...");
    let started = Instant::now();
    let playback = player.play(chime(), "chime")?;
    match playback.finished().await {
        PlaybackEnd::Finished => println!("  ✅ Finished after {:.2}s", started.elapsed().as_secs_f32()),
        other => println!("  ❌ Playback ended: {other:?}"),
    }

    let gateway = GeminiGateway::new(config.gemini.clone()).context("Failed to build the Gemini client")?;
    if !gateway.is_online() {
        println!("\nGEMINI_API_KEY not set, skipping voice check");
        return Ok(());
    }

    println!("\nAsking each elf to say hello ({})...", config.gemini.tts_model);
    for persona in PERSONAS.iter() {
        let script = format!("Hello everyone! I'm {}, your {}!", persona.name, persona.description);
        let started = Instant::now();
        match gateway.generate_speech(&script, persona.voice).await {
            Some(buffer) => {
                println!(
                    "  {} ({}): {:.1}s of speech in {:.2}s",
                    persona.name,
                    persona.voice,
                    buffer.duration().as_secs_f32(),
                    started.elapsed().as_secs_f32()
                );
                let end = player.play(buffer, persona.id)?.finished().await;
                if end != PlaybackEnd::Finished {
                    println!("  ❌ Playback ended: {end:?}");
                }
            }
            None => println!("  ❌ {} ({}): no audio", persona.name, persona.voice),
        }
    }

    Ok(())
}
