use crate::Intent;
use crate::error::RiddleError;
use crate::riddler::{Riddle, Riddler};
use crate::session_state::{FetchTicket, RiddleSession, Snapshot, VerifyTicket};
use crate::speech::{Narrator, SpeechEvent};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;

/// Result of a service call, tagged with the generation it was issued for.
#[derive(Debug)]
enum Completion {
    Riddle {
        generation: u64,
        result: Result<Riddle, RiddleError>,
    },
    Verdict {
        generation: u64,
        result: Result<bool, RiddleError>,
    },
}

#[derive(Debug, Clone, Default)]
pub struct ControllerSettings {
    /// Read the feedback aloud once a guess has been judged.
    pub auto_speak_feedback: bool,
}

/// Drives a `RiddleSession` from one event loop.
///
/// Intents, finished service calls and speech events are handled one at a
/// time, so the session is never touched from two places at once. Service
/// calls run as tasks in a `JoinSet` and report back as completions.
pub struct RiddleController {
    session: RiddleSession,
    riddler: Arc<dyn Riddler>,
    narrator: Narrator,
    settings: ControllerSettings,
    in_flight: JoinSet<Completion>,
    snapshot_tx: watch::Sender<Snapshot>,
}

impl RiddleController {
    pub fn new(
        session: RiddleSession,
        riddler: Arc<dyn Riddler>,
        narrator: Narrator,
        settings: ControllerSettings,
    ) -> (Self, watch::Receiver<Snapshot>) {
        let initial = session.snapshot(narrator.is_speaking(), narrator.is_available());
        let (snapshot_tx, snapshot_rx) = watch::channel(initial);
        (
            Self {
                session,
                riddler,
                narrator,
                settings,
                in_flight: JoinSet::new(),
                snapshot_tx,
            },
            snapshot_rx,
        )
    }

    /// Runs until `Intent::Shutdown` arrives or the intent channel closes.
    /// The first riddle is requested immediately.
    pub async fn run(
        mut self,
        mut intents: mpsc::Receiver<Intent>,
        mut speech_events: mpsc::Receiver<SpeechEvent>,
    ) {
        if let Some(ticket) = self.session.request_new_riddle() {
            self.dispatch_fetch(ticket);
        }
        self.publish();

        loop {
            tokio::select! {
                intent = intents.recv() => match intent {
                    Some(Intent::Shutdown) | None => break,
                    Some(intent) => self.handle_intent(intent),
                },
                Some(joined) = self.in_flight.join_next(), if !self.in_flight.is_empty() => {
                    match joined {
                        Ok(completion) => self.handle_completion(completion),
                        Err(e) => tracing::error!("Service call task failed: {:?}", e),
                    }
                }
                Some(event) = speech_events.recv() => self.handle_speech_event(event),
            }
            self.publish();
        }

        tracing::info!("Riddle session shutting down.");
        self.narrator.stop();
        self.in_flight.abort_all();
        self.publish();
    }

    fn handle_intent(&mut self, intent: Intent) {
        tracing::debug!("Intent: {:?}", intent);
        match intent {
            Intent::RequestNewRiddle => {
                if let Some(ticket) = self.session.request_new_riddle() {
                    self.dispatch_fetch(ticket);
                }
            }
            Intent::SelectCategory(category) => {
                if let Some(ticket) = self.session.select_category(category) {
                    self.dispatch_fetch(ticket);
                }
            }
            Intent::SelectLanguage(language) => {
                if let Some(ticket) = self.session.select_language(language) {
                    self.dispatch_fetch(ticket);
                }
            }
            Intent::SubmitGuess(guess) => {
                if let Some(ticket) = self.session.submit_guess(&guess) {
                    self.dispatch_verify(ticket);
                }
            }
            Intent::ToggleSpeech => self.toggle_speech(),
            Intent::Shutdown => {}
        }
    }

    fn dispatch_fetch(&mut self, ticket: FetchTicket) {
        // Any playback belongs to the riddle being replaced.
        self.narrator.stop();
        let riddler = Arc::clone(&self.riddler);
        tracing::info!("Requesting riddle (generation {})", ticket.generation);
        self.in_flight.spawn(async move {
            let result = riddler.generate_riddle(&ticket.prompt).await;
            Completion::Riddle {
                generation: ticket.generation,
                result,
            }
        });
    }

    fn dispatch_verify(&mut self, ticket: VerifyTicket) {
        let riddler = Arc::clone(&self.riddler);
        tracing::info!("Verifying guess (generation {})", ticket.generation);
        self.in_flight.spawn(async move {
            let result = riddler.verify_guess(&ticket.prompt).await;
            Completion::Verdict {
                generation: ticket.generation,
                result,
            }
        });
    }

    fn handle_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Riddle { generation, result } => {
                self.session.complete_fetch(generation, result);
            }
            Completion::Verdict { generation, result } => {
                let applied = self.session.complete_verify(generation, result);
                if applied && self.settings.auto_speak_feedback && self.narrator.is_available() {
                    self.speak_current();
                }
            }
        }
    }

    fn handle_speech_event(&mut self, event: SpeechEvent) {
        self.narrator.on_event(&event);
    }

    fn toggle_speech(&mut self) {
        if self.narrator.is_speaking() {
            self.narrator.stop();
        } else if self.narrator.is_available() {
            self.speak_current();
        } else {
            tracing::debug!("Speech toggled without a speech service.");
        }
    }

    fn speak_current(&mut self) {
        let Some(text) = self.session.speakable_text() else {
            return;
        };
        let locale = self.session.language().locale();
        if let Err(e) = self.narrator.speak(text, locale) {
            tracing::warn!("Could not start speech: {}", e);
        }
    }

    fn publish(&self) {
        let snapshot = self
            .session
            .snapshot(self.narrator.is_speaking(), self.narrator.is_available());
        self.snapshot_tx.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }
}
