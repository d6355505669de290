//! Turn Order Engine: random play order, pre-drawn outcomes and host choice.
//!
//! Every outcome is decided before the first spin so narration for all turns
//! can be generated while the players are still looking at the order.

use crate::catalog::{Persona, Segment};
use crate::player::Player;
use rand::Rng;

/// Minimum number of registered players before a game can start
pub const MIN_PLAYERS: usize = 2;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum OrderError {
    #[error("At least {MIN_PLAYERS} players are needed, have {0}")]
    NotEnoughPlayers(usize),
    #[error("Segment catalog is empty")]
    EmptyCatalog,
    #[error("No host personas configured")]
    NoPersonas,
}

/// Result of one order determination, installed into a new session.
#[derive(Debug, Clone)]
pub struct TurnPlan {
    /// Players in play order, each with an assigned segment
    pub players: Vec<Player>,
    pub host: &'static Persona,
}

/// Fisher–Yates: walk from the last index down to 1 and swap with a uniform
/// index in `[0, i]`.
pub fn shuffle<T, R: Rng + ?Sized>(items: &mut [T], rng: &mut R) {
    for i in (1..items.len()).rev() {
        let j = rng.random_range(0..=i);
        items.swap(i, j);
    }
}

/// Uniform draw with replacement.
pub fn draw_segment<R: Rng + ?Sized>(
    catalog: &'static [Segment],
    rng: &mut R,
) -> Result<&'static Segment, OrderError> {
    if catalog.is_empty() {
        return Err(OrderError::EmptyCatalog);
    }
    Ok(&catalog[rng.random_range(0..catalog.len())])
}

/// Pick a host uniformly, never repeating `previous` when there is a choice.
pub fn choose_host<R: Rng + ?Sized>(
    personas: &'static [Persona],
    previous: Option<&str>,
    rng: &mut R,
) -> Result<&'static Persona, OrderError> {
    match personas {
        [] => Err(OrderError::NoPersonas),
        [only] => Ok(only),
        _ => loop {
            let candidate = &personas[rng.random_range(0..personas.len())];
            if Some(candidate.id) != previous {
                break Ok(candidate);
            }
        },
    }
}

/// Shuffle the roster, assign every player an outcome and choose the host.
///
/// Completion flags and earlier assignments are discarded; identities are kept.
pub fn determine<R: Rng + ?Sized>(
    roster: &[Player],
    catalog: &'static [Segment],
    personas: &'static [Persona],
    previous_host: Option<&str>,
    rng: &mut R,
) -> Result<TurnPlan, OrderError> {
    if roster.len() < MIN_PLAYERS {
        return Err(OrderError::NotEnoughPlayers(roster.len()));
    }

    let mut players: Vec<Player> = roster.iter().map(Player::fresh).collect();
    shuffle(&mut players, rng);

    let players = players
        .into_iter()
        .map(|p| draw_segment(catalog, rng).map(|s| p.with_assignment(s)))
        .collect::<Result<Vec<_>, _>>()?;

    let host = choose_host(personas, previous_host, rng)?;

    Ok(TurnPlan { players, host })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{PERSONAS, SEGMENTS};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::{HashMap, HashSet};

    fn roster(names: &[&str]) -> Vec<Player> {
        names.iter().filter_map(|n| Player::new(n)).collect()
    }

    #[test]
    fn produces_a_permutation() {
        let mut rng = StdRng::seed_from_u64(7);
        let roster = roster(&["Amy", "Ben", "Cat", "Dan", "Eve"]);
        let expected: HashSet<_> = roster.iter().map(|p| p.id()).collect();

        let mut saw_non_identity = false;
        for _ in 0..50 {
            let plan = determine(&roster, &SEGMENTS, &PERSONAS, None, &mut rng).unwrap();
            assert_eq!(plan.players.len(), roster.len());
            let got: HashSet<_> = plan.players.iter().map(|p| p.id()).collect();
            assert_eq!(got, expected);
            if plan.players.iter().zip(&roster).any(|(a, b)| a.id() != b.id()) {
                saw_non_identity = true;
            }
        }
        assert!(saw_non_identity);
    }

    #[test]
    fn two_players_yield_both_orders() {
        let mut rng = StdRng::seed_from_u64(11);
        let roster = roster(&["Amy", "Ben"]);
        let mut firsts = HashSet::new();
        for _ in 0..40 {
            let plan = determine(&roster, &SEGMENTS, &PERSONAS, None, &mut rng).unwrap();
            firsts.insert(plan.players[0].name().to_string());
            for p in &plan.players {
                let seg = p.assigned().unwrap();
                assert!((1..=12).contains(&seg.id));
            }
        }
        assert_eq!(firsts.len(), 2);
    }

    #[test]
    fn outcomes_are_roughly_uniform() {
        let mut rng = StdRng::seed_from_u64(42);
        let trials = 24_000;
        let mut counts: HashMap<u8, usize> = HashMap::new();
        for _ in 0..trials {
            *counts.entry(draw_segment(&SEGMENTS, &mut rng).unwrap().id).or_default() += 1;
        }
        assert_eq!(counts.len(), SEGMENTS.len());
        let expected = trials / SEGMENTS.len();
        for (id, n) in counts {
            let deviation = (n as f64 - expected as f64).abs() / expected as f64;
            assert!(deviation < 0.1, "segment {id} drawn {n} times");
        }
    }

    #[test]
    fn host_differs_from_previous() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..200 {
            let host = choose_host(&PERSONAS, Some("jingle"), &mut rng).unwrap();
            assert_ne!(host.id, "jingle");
        }
    }

    #[test]
    fn single_persona_is_reused() {
        let mut rng = StdRng::seed_from_u64(3);
        let only = &PERSONAS[1..2];
        let host = choose_host(only, Some("grumbles"), &mut rng).unwrap();
        assert_eq!(host.id, "grumbles");
        assert_eq!(choose_host(&PERSONAS[..0], None, &mut rng), Err(OrderError::NoPersonas));
    }

    #[test]
    fn rejects_short_roster_and_resets_progress() {
        let mut rng = StdRng::seed_from_u64(1);
        let solo = roster(&["Amy"]);
        assert_eq!(
            determine(&solo, &SEGMENTS, &PERSONAS, None, &mut rng).unwrap_err(),
            OrderError::NotEnoughPlayers(1)
        );

        let mut done = roster(&["Amy", "Ben"]);
        done.iter_mut().for_each(Player::mark_completed);
        let plan = determine(&done, &SEGMENTS, &PERSONAS, None, &mut rng).unwrap();
        assert!(plan.players.iter().all(|p| !p.has_completed_turn()));
    }
}
