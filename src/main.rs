//! elfwheel console host
//!
//! Reads commands from stdin and drives the game, standing in for the wheel
//! and the result card. Type `help` for the command list.

use anyhow::{Context, Result};
use elfwheel::catalog::PERSONAS;
use elfwheel::config::AppConfig;
use elfwheel::game::{Game, OrderConfirmation, Phase, Reveal, SpinState, TurnAdvance};
use elfwheel::gemini::GeminiGateway;
use elfwheel::playback::NarrationPlayer;
use elfwheel::player::PlayerId;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// How long the pretend wheel keeps turning after its target is known
const WHEEL_SETTLE: Duration = Duration::from_millis(800);

/// Things that happen in the background and come back to the game loop
enum Event {
    /// Deferred order confirmation is due
    Resume(u64),
    /// Spin content is ready; the wheel can head for its target
    Landed { session: u64, turn: usize, reveal: Reveal },
    /// The wheel has stopped
    WheelStopped(u64),
}

const HELP: &str = "\
Commands:
  add <name>       add a player (lobby)
  remove <name>    remove a player (lobby)
  hosts            list the elf hosts
  host <id>|random pick the next host (lobby)
  start            shuffle the order and start
  confirm          confirm the order
  spin             spin the wheel
  replay           replay / stop the result narration
  close            close the result and move on
  again            play again with the same players
  new              back to an empty lobby
  status           show the game state
  quit";

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("elfwheel=info")))
        .init();

    let config = AppConfig::from_env().context("Invalid configuration")?;
    let gateway = GeminiGateway::new(config.gemini.clone()).context("Failed to build the Gemini client")?;
    if gateway.is_online() {
        info!("🎅 Connected elves to {}", config.gemini.text_model);
    } else {
        warn!("GEMINI_API_KEY not set, the elves will use canned lines and stay silent");
    }

    let backend = config.audio.backend("elfwheel");
    let player = NarrationPlayer::new(backend).context("Failed to start narration output")?;
    let mut game = Game::new(config.game.clone(), Arc::new(gateway), player);

    let (events_tx, mut events) = mpsc::unbounded_channel::<Event>();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("🎄 Wheel of Holiday Mischief 🎄");
    println!("{HELP}");

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else { break };
                if !handle_command(&mut game, line.trim(), &events_tx) {
                    break;
                }
            }
            Some(event) = events.recv() => handle_event(&mut game, event, &events_tx),
        }
    }

    game.reset();
    info!("Goodbye!");
    Ok(())
}

/// Returns `false` when the user asked to quit.
fn handle_command(game: &mut Game, line: &str, events: &mpsc::UnboundedSender<Event>) -> bool {
    let (command, arg) = line.split_once(' ').map_or((line, ""), |(c, a)| (c, a.trim()));

    let result = match command {
        "" => Ok(()),
        "quit" | "exit" => return false,
        "help" => {
            println!("{HELP}");
            Ok(())
        }
        "add" => game.add_player(arg).map(|_| print_roster(game)),
        "remove" => match find_player(game, arg) {
            Some(id) => game.remove_player(id).map(|_| print_roster(game)),
            None => {
                println!("No player named {arg:?}");
                Ok(())
            }
        },
        "hosts" => {
            for p in PERSONAS.iter() {
                println!("  {:<9} {} - {} ({})", p.id, p.name, p.description, p.personality);
            }
            Ok(())
        }
        "host" => game
            .select_host(Some(arg).filter(|a| *a != "random"))
            .map(|_| match game.pinned_host() {
                Some(host) => println!("Next host: {}", host.name),
                None => println!("Next host: random"),
            }),
        "start" => game.start_game().map(|_| print_order(game)),
        "confirm" => game.confirm_order().map(|confirmation| match confirmation {
            OrderConfirmation::Started => print_turn(game),
            OrderConfirmation::Waiting => {
                println!("⏳ The elves are still preparing the first turn...");
                if let Some(wait) = game.deferred_start() {
                    let events = events.clone();
                    tokio::spawn(async move {
                        let _ = events.send(Event::Resume(wait.wait().await));
                    });
                }
            }
        }),
        "spin" => game.begin_spin().map(|request| {
            println!("🎡 The wheel is spinning...");
            let events = events.clone();
            tokio::spawn(async move {
                let (session, turn) = (request.session(), request.turn());
                let reveal = request.resolve().await;
                let _ = events.send(Event::Landed { session, turn, reveal });
            });
        }),
        "replay" => game.replay_result().map(|playing| {
            println!("{}", if playing { "🔊 Replaying" } else { "🔇 Stopped" });
        }),
        "close" => game.close_result().map(|advance| match advance {
            TurnAdvance::Next(_) => print_turn(game),
            TurnAdvance::Finished => print_finished(game),
        }),
        "again" => game.play_again().map(|_| print_order(game)),
        "new" => {
            game.reset();
            Ok(())
        }
        "status" => {
            print_status(game);
            Ok(())
        }
        other => {
            println!("Unknown command {other:?}, try `help`");
            Ok(())
        }
    };

    if let Err(e) = result {
        println!("❌ {e}");
    }
    true
}

fn handle_event(game: &mut Game, event: Event, events: &mpsc::UnboundedSender<Event>) {
    match event {
        Event::Resume(session) => {
            if game.resume_after_wait(session) {
                print_turn(game);
            }
        }
        Event::Landed { session, turn, reveal } => match game.land(session, turn, reveal) {
            Ok(segment) => {
                println!("...slowing down towards {} {}", segment.icon, segment.label);
                let events = events.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(WHEEL_SETTLE).await;
                    let _ = events.send(Event::WheelStopped(session));
                });
            }
            Err(e) => info!("Dropping spin result: {}", e),
        },
        Event::WheelStopped(session) => {
            if game.session_id() != Some(session) {
                return;
            }
            let name = game.current_player().map(|p| p.name().to_string()).unwrap_or_default();
            match game.finish_spin() {
                Ok(reveal) => {
                    println!("\n🎁 {name} landed on {} {}!", reveal.segment.icon, reveal.segment.label);
                    println!("   {}", reveal.segment.rule);
                    println!("   🧝 \"{}\"", reveal.commentary);
                    println!("   (close to continue, replay to hear it again)");
                }
                Err(e) => info!("Wheel stopped without a landing: {}", e),
            }
        }
    }
}

fn find_player(game: &Game, name: &str) -> Option<PlayerId> {
    game.roster().iter().find(|p| p.name() == name).map(|p| p.id())
}

fn print_roster(game: &Game) {
    let names: Vec<&str> = game.roster().iter().map(|p| p.name()).collect();
    println!("Players ({}): {}", names.len(), names.join(", "));
}

fn print_order(game: &Game) {
    if let Some(host) = game.host() {
        println!("\nYour host tonight: {} ({})", host.name, host.description);
    }
    println!("The order of play:");
    for (i, p) in game.lineup().iter().enumerate() {
        println!("  {}. {}", i + 1, p.name());
    }
    println!("(confirm when ready)");
}

fn print_turn(game: &Game) {
    if let Some(player) = game.current_player() {
        println!("\n⭐ {}'s turn! (spin)", player.name());
    }
    let next: Vec<&str> = game.up_next().iter().map(|p| p.name()).collect();
    if !next.is_empty() {
        println!("   Up next: {}", next.join(", "));
    }
}

fn print_finished(game: &Game) {
    println!("\n🏆 Everyone has spun! Merry Christmas!");
    if let Some(host) = game.host() {
        println!("   Thanks for playing with {}.", host.name);
    }
    println!("   (again for another round, new for a fresh lobby)");
}

fn print_status(game: &Game) {
    println!("Phase: {:?}", game.phase());
    match game.phase() {
        Phase::Lobby => {
            print_roster(game);
            if let Some(host) = game.pinned_host() {
                println!("Next host: {}", host.name);
            }
        }
        Phase::DeterminingOrder => {
            print_order(game);
            println!(
                "First player ready: {}{}",
                game.is_first_player_ready(),
                if game.is_waiting_for_first() { " (waiting)" } else { "" }
            );
        }
        Phase::Playing | Phase::Finished => {
            for (i, p) in game.lineup().iter().enumerate() {
                let marker = if Some(i) == game.current_index() { "▶" } else { " " };
                let done = if p.has_completed_turn() { "✔" } else { " " };
                println!("  {marker} {done} {}", p.name());
            }
            match game.spin_state() {
                Some(SpinState::Spinning) | Some(SpinState::Landing(_)) => println!("The wheel is spinning"),
                Some(SpinState::ShowingResult(r)) => println!("Showing: {} {}", r.segment.icon, r.segment.label),
                _ => {}
            }
        }
    }
    if let Some(cache) = game.cache() {
        let (announcements, results) = cache.len();
        println!("Prepared: {announcements} announcements, {results} results");
    }
    if *game.narrating().borrow() {
        println!("🔊 The elf is talking");
    }
}
