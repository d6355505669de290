//! Players registered in the lobby and carried through a game.

use crate::catalog::Segment;
use std::fmt;
use uuid::Uuid;

/// Stable identity of a player; cache entries are keyed by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlayerId(Uuid);

impl PlayerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PlayerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct Player {
    id: PlayerId,
    name: String,
    completed: bool,
    /// Outcome drawn at game start; `None` while in the lobby
    assigned: Option<&'static Segment>,
}

impl Player {
    /// Create a lobby player. The name is trimmed; blank names yield `None`.
    pub fn new(name: &str) -> Option<Self> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        Some(Self {
            id: PlayerId::new(),
            name: name.to_string(),
            completed: false,
            assigned: None,
        })
    }

    pub fn id(&self) -> PlayerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn has_completed_turn(&self) -> bool {
        self.completed
    }

    pub fn assigned(&self) -> Option<&'static Segment> {
        self.assigned
    }

    pub(crate) fn mark_completed(&mut self) {
        self.completed = true;
    }

    /// Same identity and name, ready for a fresh game.
    pub(crate) fn fresh(&self) -> Self {
        Self {
            id: self.id,
            name: self.name.clone(),
            completed: false,
            assigned: None,
        }
    }

    pub(crate) fn with_assignment(mut self, segment: &'static Segment) -> Self {
        self.assigned = Some(segment);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog;

    #[test]
    fn names_are_trimmed_and_blank_rejected() {
        let p = Player::new("  Amy ").unwrap();
        assert_eq!(p.name(), "Amy");
        assert!(Player::new("   ").is_none());
        assert!(Player::new("").is_none());
    }

    #[test]
    fn fresh_keeps_identity_and_drops_progress() {
        let mut p = Player::new("Ben").unwrap().with_assignment(&catalog::SEGMENTS[3]);
        p.mark_completed();
        let f = p.fresh();
        assert_eq!(f.id(), p.id());
        assert!(!f.has_completed_turn());
        assert!(f.assigned().is_none());
    }
}
