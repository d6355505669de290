//! elfwheel - a narrated holiday party wheel
//!
//! Players take turns spinning a wheel whose outcomes are drawn up front, so a
//! host elf's lines (turn announcements, result commentary and narration) can
//! be generated in the background while the players are still looking at the
//! order. Presentation is left to the caller: the [`game::Game`] state machine
//! is driven by plain method calls and reports where the wheel should land.

#![forbid(unsafe_code)]

pub mod cache;
pub mod catalog;
pub mod config;
pub mod game;
pub mod gemini;
pub mod media;
pub mod narrator;
pub mod playback;
pub mod player;
pub mod prefetch;
pub mod prompt;
pub mod turn_order;

#[cfg(test)]
mod test_support;
