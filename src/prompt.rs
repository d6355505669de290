//! Prompts sent to the text model and the canned lines used when it is unavailable.

use crate::catalog::{Persona, Segment};

/// Structured request for host narration text.
#[derive(Debug, Clone, Copy)]
pub enum Prompt<'a> {
    /// Reveal of the full play order (played once per game)
    OrderAnnouncement {
        host: &'a Persona,
        names: &'a [String],
    },
    /// "It's your turn" line for one player
    TurnAnnouncement { host: &'a Persona, player: &'a str },
    /// Reaction to the segment a player landed on
    Commentary {
        host: &'a Persona,
        player: &'a str,
        segment: &'a Segment,
    },
}

impl<'a> Prompt<'a> {
    pub fn host(&self) -> &'a Persona {
        match *self {
            Prompt::OrderAnnouncement { host, .. }
            | Prompt::TurnAnnouncement { host, .. }
            | Prompt::Commentary { host, .. } => host,
        }
    }

    /// Short label for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Prompt::OrderAnnouncement { .. } => "order_announcement",
            Prompt::TurnAnnouncement { .. } => "turn_announcement",
            Prompt::Commentary { .. } => "commentary",
        }
    }

    pub fn render(&self) -> String {
        let host = self.host();
        let preamble = format!(
            "You are {}, a {} Christmas Elf game show host.",
            host.name, host.personality
        );
        match *self {
            Prompt::OrderAnnouncement { names, .. } => {
                let first = names.first().map(String::as_str).unwrap_or("someone");
                let last = names.last().map(String::as_str).unwrap_or("someone else");
                format!(
                    "{preamble}\n\
                     The random order of play has been decided.\n\
                     The players are (in order): {}.\n\n\
                     Write a script announcing this.\n\
                     - Start by introducing yourself: \"Hello everyone! I'm {}, your {}!\"\n\
                     - Announce that {first} is the lucky one starting us off.\n\
                     - List the others quickly.\n\
                     - Make a comment about the last player ({last}) based on your personality.\n\
                     - End exactly with: \"Let's get started!\"\n\n\
                     Keep it under 4 sentences total.",
                    names.join(", "),
                    host.name,
                    host.description,
                )
            }
            Prompt::TurnAnnouncement { player, .. } => format!(
                "{preamble}\n\
                 It is now \"{player}\"'s turn to spin the wheel.\n\n\
                 Write a very short (1 sentence) announcement telling them to spin, using your specific personality style.\n\n\
                 Persona Guidelines:\n\
                 - Name: {}\n\
                 - Personality: {}\n\n\
                 Keep it exciting and varied.",
                host.name, host.personality,
            ),
            Prompt::Commentary { player, segment, .. } => format!(
                "{preamble}\n\
                 A player named \"{player}\" just spun the Wheel of Christmas and landed on \"{}\".\n\
                 The rule for this spot is: \"{}\".\n\n\
                 Give a very short (max 1 sentence) reaction to this result based on your personality.\n\n\
                 Persona Guidelines:\n\
                 - Name: {}\n\
                 - Personality: {}\n\n\
                 Keep it family friendly but entertaining.",
                segment.label, segment.rule, host.name, host.personality,
            ),
        }
    }

    /// Line used when no credentials are configured.
    pub fn offline_text(&self) -> String {
        match *self {
            Prompt::OrderAnnouncement { host, names } => {
                let first = names.first().map(String::as_str).unwrap_or("someone");
                let last = names.last().map(String::as_str).unwrap_or("someone else");
                format!(
                    "Hello! I'm {}! Ooh, looks like {first} is the lucky player who gets to go first! \
                     And looks like {last} might be getting a lump of coal. Let's get started!",
                    host.name
                )
            }
            Prompt::TurnAnnouncement { player, .. } => {
                format!("It's {player}'s turn! Give the wheel a spin!")
            }
            Prompt::Commentary { .. } => "Ho ho ho! The spirits of Christmas have spoken!".to_string(),
        }
    }

    /// Line used when the model answers with no text.
    pub fn empty_text(&self) -> String {
        match *self {
            Prompt::OrderAnnouncement { host, names } => format!(
                "I'm {}! The order is set! {} is first. Let's get started!",
                host.name,
                names.first().map(String::as_str).unwrap_or("someone")
            ),
            Prompt::TurnAnnouncement { player, .. } => format!("You're up {player}! Spin the wheel!"),
            Prompt::Commentary { .. } => "The elves are speechless!".to_string(),
        }
    }

    /// Line used when the call fails.
    pub fn failure_text(&self) -> String {
        match *self {
            Prompt::OrderAnnouncement { .. } => "The order is set! Let's get started!".to_string(),
            Prompt::TurnAnnouncement { player, .. } => format!("It's {player}'s turn!"),
            Prompt::Commentary { .. } => {
                "The North Pole connection is snowy today! Just follow the rules on the card.".to_string()
            }
        }
    }
}

/// Narration read out when a result is revealed.
pub fn result_script(player: &str, segment: &Segment) -> String {
    format!(
        "Ho ho ho! {player} landed on {}! Here is the rule. {}",
        segment.label, segment.rule
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{PERSONAS, SEGMENTS};

    #[test]
    fn order_prompt_names_first_and_last() {
        let names = vec!["Amy".to_string(), "Ben".to_string(), "Cat".to_string()];
        let prompt = Prompt::OrderAnnouncement { host: &PERSONAS[0], names: &names };
        let text = prompt.render();
        assert!(text.contains("Amy, Ben, Cat"));
        assert!(text.contains("Announce that Amy is the lucky one"));
        assert!(text.contains("about the last player (Cat)"));
        assert!(prompt.offline_text().contains("Cat might be getting a lump of coal"));
    }

    #[test]
    fn commentary_prompt_carries_rule_and_persona() {
        let host = &PERSONAS[1];
        let prompt = Prompt::Commentary { host, player: "Ben", segment: &SEGMENTS[3] };
        let text = prompt.render();
        assert!(text.contains("The Sticky Bandit"));
        assert!(text.contains(SEGMENTS[3].rule));
        assert!(text.contains(host.personality));
        assert_eq!(prompt.host().id, host.id);
        assert_eq!(prompt.kind(), "commentary");
    }

    #[test]
    fn result_script_reads_the_rule() {
        assert_eq!(
            result_script("Amy", &SEGMENTS[9]),
            "Ho ho ho! Amy landed on Silent Night! Here is the rule. \
             Take a normal turn. Afterward, you receive the Immunity Token."
        );
    }

    #[test]
    fn empty_order_falls_back_to_placeholders() {
        let prompt = Prompt::OrderAnnouncement { host: &PERSONAS[2], names: &[] };
        assert!(prompt.offline_text().contains("someone is the lucky player"));
        assert!(prompt.empty_text().contains("someone is first"));
    }
}
