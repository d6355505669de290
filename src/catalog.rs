//! Static game content: the wheel segments and the elf hosts.
//!
//! Everything here is immutable and lives for the whole program. Players hold
//! `&'static` references into these tables instead of copies.

/// Wheel segment identifier (1-based, matches the order on the wheel).
pub type SegmentId = u8;

/// One wedge of the wheel: what a player lands on and the rule it carries.
#[derive(Debug, PartialEq, Eq)]
pub struct Segment {
    pub id: SegmentId,
    pub label: &'static str,
    /// Rule text read out to the player
    pub rule: &'static str,
    /// Fill colour or wrapping-paper pattern reference
    pub color: &'static str,
    pub text_color: &'static str,
    pub icon: &'static str,
}

/// Narrator character for one game.
#[derive(Debug, PartialEq, Eq)]
pub struct Persona {
    pub id: &'static str,
    pub name: &'static str,
    /// Short personality descriptor fed into every prompt
    pub personality: &'static str,
    /// How the host introduces themself ("your ... !")
    pub description: &'static str,
    /// Prebuilt voice name used for speech synthesis
    pub voice: &'static str,
    pub job: &'static str,
    pub pastime: &'static str,
}

const SANTAS_CHOICE_RULE: &str =
    "You are on the Nice List. You may Unwrap a New Gift OR Steal an available gift.";

pub static SEGMENTS: [Segment; 12] = [
    Segment {
        id: 1,
        label: "Santa's Choice",
        rule: SANTAS_CHOICE_RULE,
        color: "url(#pattern-candy-cane)",
        text_color: "#FFFFFF",
        icon: "santa",
    },
    Segment {
        id: 2,
        label: "Fresh From Sleigh",
        rule: "No stealing allowed! You must pick a wrapped gift from the center pile.",
        color: "url(#pattern-snowflake-blue)",
        text_color: "#FFFFFF",
        icon: "snowflake",
    },
    Segment {
        id: 3,
        label: "Santa's Choice",
        rule: SANTAS_CHOICE_RULE,
        color: "url(#pattern-red-dots)",
        text_color: "#FFFFFF",
        icon: "santa",
    },
    Segment {
        id: 4,
        label: "The Sticky Bandit",
        rule: "You must steal an open gift from someone else. You cannot open a new gift.",
        color: "url(#pattern-plaid)",
        text_color: "#FFFFFF",
        icon: "hand",
    },
    Segment {
        id: 5,
        label: "The Ice Breaker",
        rule: "You may steal a Frozen (locked) gift that has already been stolen 3 times.",
        color: "url(#pattern-gold-foil)",
        text_color: "#713f12",
        icon: "hammer",
    },
    Segment {
        id: 6,
        label: "Santa's Choice",
        rule: SANTAS_CHOICE_RULE,
        color: "url(#pattern-stripes-rg)",
        text_color: "#FFFFFF",
        icon: "santa",
    },
    Segment {
        id: 7,
        label: "Shake The Box",
        rule: "Pick a wrapped gift and unwrap it privately. You may Keep it or Re-wrap and steal.",
        color: "url(#pattern-kraft)",
        text_color: "#422006",
        icon: "box",
    },
    Segment {
        id: 8,
        label: "Santa's Choice",
        rule: SANTAS_CHOICE_RULE,
        color: "url(#pattern-zigzag-red)",
        text_color: "#FFFFFF",
        icon: "santa",
    },
    Segment {
        id: 9,
        label: "Fruitcake Shuffle",
        rule: "Unwrap a new gift. You must immediately swap it with the person holding the lowest number.",
        color: "url(#pattern-holly)",
        text_color: "#14532d",
        icon: "shuffle",
    },
    Segment {
        id: 10,
        label: "Silent Night",
        rule: "Take a normal turn. Afterward, you receive the Immunity Token.",
        color: "url(#pattern-midnight)",
        text_color: "#fbbf24",
        icon: "moon",
    },
    Segment {
        id: 11,
        label: "Santa's Choice",
        rule: SANTAS_CHOICE_RULE,
        color: "url(#pattern-snowflake-red)",
        text_color: "#FFFFFF",
        icon: "santa",
    },
    Segment {
        id: 12,
        label: "Rudolph's Radar",
        rule: "You must steal from a person matching a criteria announced by the host.",
        color: "url(#pattern-gingerbread)",
        text_color: "#FFFFFF",
        icon: "radar",
    },
];

pub static PERSONAS: [Persona; 4] = [
    Persona {
        id: "jingle",
        name: "Jingle",
        personality: "hyper-enthusiastic and sugar-fuelled",
        description: "over-caffeinated master of ceremonies",
        voice: "Puck",
        job: "Head of Bell Tuning",
        pastime: "Speed-wrapping presents blindfolded",
    },
    Persona {
        id: "grumbles",
        name: "Grumbles",
        personality: "grumpy and sarcastic but secretly soft-hearted",
        description: "reluctant and deeply unimpressed host",
        voice: "Charon",
        job: "Coal Quality Inspector",
        pastime: "Complaining about the snow",
    },
    Persona {
        id: "tinsel",
        name: "Tinsel",
        personality: "sweet, warm and endlessly encouraging",
        description: "kind-hearted holiday cheerleader",
        voice: "Kore",
        job: "Nice List Archivist",
        pastime: "Baking gingerbread for the reindeer",
    },
    Persona {
        id: "sprocket",
        name: "Sprocket",
        personality: "dramatic and theatrical like a game show announcer",
        description: "spectacular star of the North Pole stage",
        voice: "Fenrir",
        job: "Toy Workshop Foreman",
        pastime: "Rehearsing acceptance speeches",
    },
];

/// Outcome shown when result content could not be prepared.
pub fn default_segment() -> &'static Segment {
    &SEGMENTS[0]
}

pub fn segment(id: SegmentId) -> Option<&'static Segment> {
    SEGMENTS.iter().find(|s| s.id == id)
}

pub fn persona(id: &str) -> Option<&'static Persona> {
    PERSONAS.iter().find(|p| p.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn segment_ids_run_one_to_twelve() {
        let ids: Vec<SegmentId> = SEGMENTS.iter().map(|s| s.id).collect();
        assert_eq!(ids, (1..=12).collect::<Vec<_>>());
        assert_eq!(segment(12).map(|s| s.label), Some("Rudolph's Radar"));
        assert!(segment(13).is_none());
    }

    #[test]
    fn personas_are_unique_and_voiced() {
        let ids: HashSet<_> = PERSONAS.iter().map(|p| p.id).collect();
        assert_eq!(ids.len(), PERSONAS.len());
        assert!(PERSONAS.iter().all(|p| !p.voice.is_empty()));
        assert_eq!(persona("grumbles").map(|p| p.name), Some("Grumbles"));
    }
}
