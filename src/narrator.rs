//! Host-bound narration: text plus speech for each kind of line the host says.

use crate::catalog::{Persona, Segment};
use crate::gemini::ContentGateway;
use crate::media::AudioBuffer;
use crate::prompt::{self, Prompt};
use futures_util::future;
use std::sync::Arc;

/// Commentary shown with a result and the narration read out for it.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultContent {
    pub commentary: String,
    pub audio: Option<AudioBuffer>,
}

/// The gateway plus the persona of the current game.
#[derive(Clone)]
pub struct Narrator {
    gateway: Arc<dyn ContentGateway>,
    host: &'static Persona,
}

impl Narrator {
    pub fn new(gateway: Arc<dyn ContentGateway>, host: &'static Persona) -> Self {
        Self { gateway, host }
    }

    pub fn host(&self) -> &'static Persona {
        self.host
    }

    pub async fn order_announcement(&self, names: &[String]) -> Option<AudioBuffer> {
        let prompt = Prompt::OrderAnnouncement { host: self.host, names };
        let script = self.gateway.generate_text(&prompt).await;
        self.gateway.generate_speech(&script, self.host.voice).await
    }

    pub async fn turn_announcement(&self, player: &str) -> Option<AudioBuffer> {
        let prompt = Prompt::TurnAnnouncement { host: self.host, player };
        let script = self.gateway.generate_text(&prompt).await;
        self.gateway.generate_speech(&script, self.host.voice).await
    }

    /// Commentary text and the rule narration are independent, so both calls run together.
    pub async fn result(&self, player: &str, segment: &Segment) -> ResultContent {
        let prompt = Prompt::Commentary { host: self.host, player, segment };
        let script = prompt::result_script(player, segment);
        let (commentary, audio) = future::join(
            self.gateway.generate_text(&prompt),
            self.gateway.generate_speech(&script, self.host.voice),
        )
        .await;
        ResultContent { commentary, audio }
    }
}
