use crate::catalog::{Category, Language};
use crate::error::RiddleError;
use crate::history::RiddleHistory;
use crate::prompt::PromptTemplates;
use crate::riddler::Riddle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Loading,
    Presented,
    Verifying,
    Resolved,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Correct,
    Incorrect,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feedback {
    pub message: String,
    pub outcome: Outcome,
}

/// A fetch the session wants issued. The generation tags the result so a
/// late reply can be told apart from the current one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    pub generation: u64,
    pub prompt: String,
}

/// A verification the session wants issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyTicket {
    pub generation: u64,
    pub prompt: String,
}

/// Read-only view of the session handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub state: SessionState,
    pub category: Category,
    pub language: Language,
    pub riddle: Option<String>,
    pub guess: String,
    pub feedback: Option<Feedback>,
    pub error: Option<String>,
    pub history_len: usize,
    pub is_speaking: bool,
    pub can_submit_guess: bool,
    pub can_request_new: bool,
    pub can_change_selection: bool,
    pub can_toggle_speech: bool,
}

/// The riddle game state machine.
///
/// All transitions are synchronous. Operations that need the text service
/// return a ticket; the caller runs the request and hands the result back
/// through `complete_fetch` / `complete_verify`, which drop it when the
/// session has moved on in the meantime.
pub struct RiddleSession {
    state: SessionState,
    riddle: Option<Riddle>,
    guess: String,
    feedback: Option<Feedback>,
    error: Option<String>,
    category: Category,
    language: Language,
    history: RiddleHistory,
    generation: u64,
    templates: PromptTemplates,
}

impl RiddleSession {
    pub fn new(category: Category, language: Language, templates: PromptTemplates) -> Self {
        Self {
            state: SessionState::Idle,
            riddle: None,
            guess: String::new(),
            feedback: None,
            error: None,
            category,
            language,
            history: RiddleHistory::new(),
            generation: 0,
            templates,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn riddle(&self) -> Option<&Riddle> {
        self.riddle.as_ref()
    }

    pub fn guess(&self) -> &str {
        &self.guess
    }

    pub fn feedback(&self) -> Option<&Feedback> {
        self.feedback.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn history(&self) -> &RiddleHistory {
        &self.history
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Starts a new fetch. Suppressed while one is already outstanding.
    pub fn request_new_riddle(&mut self) -> Option<FetchTicket> {
        if self.state == SessionState::Loading {
            tracing::debug!("Fetch already in progress, dropping new riddle request.");
            return None;
        }
        Some(self.begin_fetch())
    }

    /// Switches category, clears history and fetches a fresh riddle.
    ///
    /// Inert while loading, after a failed fetch, or when the category is unchanged.
    pub fn select_category(&mut self, category: Category) -> Option<FetchTicket> {
        if !self.selection_enabled() || category == self.category {
            return None;
        }
        tracing::info!("Category changed: {} -> {}", self.category, category);
        self.category = category;
        self.history.clear();
        Some(self.begin_fetch())
    }

    /// Switches language, clears history and fetches a fresh riddle.
    pub fn select_language(&mut self, language: Language) -> Option<FetchTicket> {
        if !self.selection_enabled() || language == self.language {
            return None;
        }
        tracing::info!("Language changed: {} -> {}", self.language, language);
        self.language = language;
        self.history.clear();
        Some(self.begin_fetch())
    }

    fn begin_fetch(&mut self) -> FetchTicket {
        self.generation += 1;
        self.state = SessionState::Loading;
        self.riddle = None;
        self.guess.clear();
        self.feedback = None;
        self.error = None;
        FetchTicket {
            generation: self.generation,
            prompt: self
                .templates
                .riddle_prompt(self.category, self.language, &self.history),
        }
    }

    /// Applies a fetch result. Returns `false` when the result was stale and dropped.
    pub fn complete_fetch(&mut self, generation: u64, result: Result<Riddle, RiddleError>) -> bool {
        if self.state != SessionState::Loading || generation != self.generation {
            tracing::debug!(
                "Discarding stale riddle (generation {}, current {}, state {:?})",
                generation,
                self.generation,
                self.state
            );
            return false;
        }
        match result {
            Ok(riddle) => {
                tracing::info!("Riddle received: {:?}", riddle.text);
                self.history.record(&riddle.text);
                self.riddle = Some(riddle);
                self.state = SessionState::Presented;
            }
            Err(e) => {
                tracing::warn!("Failed to fetch riddle: {}", e);
                self.error = Some(self.language.strings().fetch_failed.to_string());
                self.state = SessionState::Failed;
            }
        }
        true
    }

    /// Submits a guess for judging.
    ///
    /// Rejected locally when no riddle is presented or the guess is blank;
    /// a second submission while verifying is dropped.
    pub fn submit_guess(&mut self, guess: &str) -> Option<VerifyTicket> {
        if self.state != SessionState::Presented {
            tracing::debug!("Guess ignored in state {:?}", self.state);
            return None;
        }
        if guess.trim().is_empty() {
            tracing::debug!("Empty guess rejected.");
            return None;
        }
        let riddle = self.riddle.as_ref()?;
        let prompt = self
            .templates
            .verify_prompt(self.language, &riddle.text, &riddle.answer, guess);

        self.generation += 1;
        self.guess = guess.to_string();
        self.state = SessionState::Verifying;
        Some(VerifyTicket {
            generation: self.generation,
            prompt,
        })
    }

    /// Applies a verification result. A failed verification still resolves
    /// the round, as incorrect with the "could not verify" message.
    pub fn complete_verify(&mut self, generation: u64, result: Result<bool, RiddleError>) -> bool {
        if self.state != SessionState::Verifying || generation != self.generation {
            tracing::debug!(
                "Discarding stale verdict (generation {}, current {}, state {:?})",
                generation,
                self.generation,
                self.state
            );
            return false;
        }
        let strings = self.language.strings();
        let feedback = match (result, &self.riddle) {
            (Ok(true), _) => Feedback {
                message: strings.correct.to_string(),
                outcome: Outcome::Correct,
            },
            (Ok(false), Some(riddle)) => Feedback {
                message: self.language.incorrect_message(&riddle.answer),
                outcome: Outcome::Incorrect,
            },
            (Ok(false), None) => Feedback {
                message: strings.could_not_verify.to_string(),
                outcome: Outcome::Incorrect,
            },
            (Err(e), _) => {
                tracing::warn!("Could not verify guess: {}", e);
                Feedback {
                    message: strings.could_not_verify.to_string(),
                    outcome: Outcome::Incorrect,
                }
            }
        };
        tracing::info!("Guess {:?} judged {:?}", self.guess, feedback.outcome);
        self.feedback = Some(feedback);
        self.state = SessionState::Resolved;
        true
    }

    /// The text the speak button would read out in the current state.
    pub fn speakable_text(&self) -> Option<&str> {
        match self.state {
            SessionState::Presented | SessionState::Verifying => {
                self.riddle.as_ref().map(|r| r.text.as_str())
            }
            SessionState::Resolved => self.feedback.as_ref().map(|f| f.message.as_str()),
            SessionState::Idle | SessionState::Loading | SessionState::Failed => None,
        }
    }

    fn selection_enabled(&self) -> bool {
        !matches!(self.state, SessionState::Loading | SessionState::Failed)
    }

    pub fn snapshot(&self, is_speaking: bool, speech_available: bool) -> Snapshot {
        Snapshot {
            state: self.state,
            category: self.category,
            language: self.language,
            riddle: self.riddle.as_ref().map(|r| r.text.clone()),
            guess: self.guess.clone(),
            feedback: self.feedback.clone(),
            error: self.error.clone(),
            history_len: self.history.len(),
            is_speaking,
            can_submit_guess: self.state == SessionState::Presented,
            can_request_new: self.state != SessionState::Loading,
            can_change_selection: self.selection_enabled(),
            can_toggle_speech: speech_available
                && (is_speaking || self.speakable_text().is_some()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::HISTORY_LIMIT;

    const TABLE_RIDDLE: &str = "Was hat vier Beine und kann nicht laufen?";

    fn session() -> RiddleSession {
        RiddleSession::new(Category::Funny, Language::German, PromptTemplates::default())
    }

    fn presented() -> RiddleSession {
        let mut session = session();
        let ticket = session.request_new_riddle().unwrap();
        assert!(session.complete_fetch(ticket.generation, Ok(Riddle::new(TABLE_RIDDLE, "Ein Tisch"))));
        session
    }

    #[test]
    fn test_fetch_success_presents_riddle_and_records_history() {
        let mut session = session();
        assert_eq!(session.state(), SessionState::Idle);

        let ticket = session.request_new_riddle().unwrap();
        assert_eq!(session.state(), SessionState::Loading);

        session.complete_fetch(ticket.generation, Ok(Riddle::new(TABLE_RIDDLE, "Ein Tisch")));

        assert_eq!(session.state(), SessionState::Presented);
        assert_eq!(session.riddle().unwrap().text, TABLE_RIDDLE);
        assert_eq!(session.riddle().unwrap().answer, "Ein Tisch");
        assert_eq!(session.history().to_vec(), vec![TABLE_RIDDLE.to_string()]);
    }

    #[test]
    fn test_correct_guess_resolves_without_leaking_answer() {
        let mut session = presented();
        let ticket = session.submit_guess("Tisch").unwrap();
        assert_eq!(session.state(), SessionState::Verifying);
        assert!(ticket.prompt.contains(r#"Player's guess: "Tisch""#));

        session.complete_verify(ticket.generation, Ok(true));

        let feedback = session.feedback().unwrap();
        assert_eq!(session.state(), SessionState::Resolved);
        assert_eq!(feedback.outcome, Outcome::Correct);
        assert_eq!(feedback.message, Language::German.strings().correct);
        assert!(!feedback.message.contains("Ein Tisch"));
    }

    #[test]
    fn test_wrong_guess_feedback_embeds_expected_answer() {
        let mut session = presented();
        let ticket = session.submit_guess("Stuhl").unwrap();

        session.complete_verify(ticket.generation, Ok(false));

        let feedback = session.feedback().unwrap();
        assert_eq!(session.state(), SessionState::Resolved);
        assert_eq!(feedback.outcome, Outcome::Incorrect);
        assert!(feedback.message.contains("Ein Tisch"));
    }

    #[test]
    fn test_fetch_transport_error_fails_with_retry_only() {
        let mut session = session();
        let ticket = session.request_new_riddle().unwrap();

        session.complete_fetch(
            ticket.generation,
            Err(RiddleError::Transport("connection refused".to_string())),
        );

        assert_eq!(session.state(), SessionState::Failed);
        assert!(session.riddle().is_none());
        assert_eq!(session.error(), Some(Language::German.strings().fetch_failed));

        let snapshot = session.snapshot(false, true);
        assert!(snapshot.can_request_new);
        assert!(!snapshot.can_submit_guess);
        assert!(!snapshot.can_change_selection);
        assert!(!snapshot.can_toggle_speech);
        assert!(session.submit_guess("Tisch").is_none());
        assert!(session.select_category(Category::Detective).is_none());

        assert!(session.request_new_riddle().is_some());
        assert_eq!(session.state(), SessionState::Loading);
    }

    #[test]
    fn test_verify_transport_error_degrades_to_incorrect() {
        let mut session = presented();
        let ticket = session.submit_guess("Tisch").unwrap();

        session.complete_verify(
            ticket.generation,
            Err(RiddleError::Transport("timeout".to_string())),
        );

        let feedback = session.feedback().unwrap();
        assert_eq!(session.state(), SessionState::Resolved);
        assert_eq!(feedback.outcome, Outcome::Incorrect);
        assert_eq!(feedback.message, Language::German.strings().could_not_verify);
        assert!(session.request_new_riddle().is_some());
    }

    #[test]
    fn test_malformed_verdict_is_handled_like_transport_error() {
        let mut session = presented();
        let ticket = session.submit_guess("Tisch").unwrap();

        session.complete_verify(
            ticket.generation,
            Err(RiddleError::MalformedResponse("no isCorrect".to_string())),
        );

        assert_eq!(session.state(), SessionState::Resolved);
        assert_eq!(
            session.feedback().unwrap().message,
            Language::German.strings().could_not_verify
        );
    }

    #[test]
    fn test_blank_guess_is_rejected_locally() {
        let mut session = presented();

        assert!(session.submit_guess("").is_none());
        assert!(session.submit_guess("  \t ").is_none());
        assert_eq!(session.state(), SessionState::Presented);
    }

    #[test]
    fn test_second_guess_while_verifying_is_dropped() {
        let mut session = presented();

        assert!(session.submit_guess("Tisch").is_some());
        assert!(session.submit_guess("Tisch").is_none());
        assert_eq!(session.state(), SessionState::Verifying);
    }

    #[test]
    fn test_guess_after_feedback_is_disabled() {
        let mut session = presented();
        let ticket = session.submit_guess("Stuhl").unwrap();
        session.complete_verify(ticket.generation, Ok(false));

        assert!(!session.snapshot(false, true).can_submit_guess);
        assert!(session.submit_guess("Tisch").is_none());
    }

    #[test]
    fn test_duplicate_fetch_is_suppressed() {
        let mut session = session();

        assert!(session.request_new_riddle().is_some());
        assert!(session.request_new_riddle().is_none());
        assert_eq!(session.generation(), 1);
    }

    #[test]
    fn test_selection_is_inert_while_loading() {
        let mut session = session();
        session.request_new_riddle();

        assert!(session.select_category(Category::Mathematical).is_none());
        assert!(session.select_language(Language::Russian).is_none());
        assert_eq!(session.category(), Category::Funny);
        assert_eq!(session.language(), Language::German);
    }

    #[test]
    fn test_category_change_clears_history_and_reloads() {
        let mut session = presented();
        assert_eq!(session.history().len(), 1);

        let ticket = session.select_category(Category::Detective).unwrap();

        assert_eq!(session.state(), SessionState::Loading);
        assert!(session.history().is_empty());
        assert!(session.riddle().is_none());
        assert!(ticket.prompt.contains(Category::Detective.instruction()));
        assert!(!ticket.prompt.contains(TABLE_RIDDLE));
    }

    #[test]
    fn test_same_category_is_not_a_change() {
        let mut session = presented();

        assert!(session.select_category(Category::Funny).is_none());
        assert_eq!(session.state(), SessionState::Presented);
    }

    #[test]
    fn test_language_change_uses_new_strings() {
        let mut session = presented();
        assert_eq!(session.history().len(), 1);
        let ticket = session.select_language(Language::Russian).unwrap();
        assert!(ticket.prompt.contains("in Russian"));
        assert!(session.history().is_empty());
        assert!(!ticket.prompt.contains(TABLE_RIDDLE));
        assert!(!ticket.prompt.contains("Do NOT repeat"));

        session.complete_fetch(ticket.generation, Err(RiddleError::Transport("down".into())));

        assert_eq!(session.error(), Some(Language::Russian.strings().fetch_failed));
    }

    #[test]
    fn test_next_prompt_excludes_seen_riddles() {
        let mut session = presented();
        let ticket = session.request_new_riddle().unwrap();

        assert!(ticket.prompt.contains(TABLE_RIDDLE));
    }

    #[test]
    fn test_stale_verdict_after_new_riddle_is_discarded() {
        let mut session = presented();
        let verify = session.submit_guess("Tisch").unwrap();
        let fetch = session.request_new_riddle().unwrap();

        assert!(!session.complete_verify(verify.generation, Ok(true)));
        assert_eq!(session.state(), SessionState::Loading);
        assert!(session.feedback().is_none());

        assert!(session.complete_fetch(fetch.generation, Ok(Riddle::new("Neu?", "Ja"))));
        assert_eq!(session.state(), SessionState::Presented);
    }

    #[test]
    fn test_stale_fetch_after_retry_is_discarded() {
        let mut session = presented();
        let first = session.request_new_riddle().unwrap();
        session.complete_fetch(first.generation, Err(RiddleError::Transport("x".into())));
        let retry = session.request_new_riddle().unwrap();

        assert!(!session.complete_fetch(first.generation, Ok(Riddle::new("alt", "alt"))));
        assert!(session.riddle().is_none());
        assert!(session.complete_fetch(retry.generation, Ok(Riddle::new("neu", "neu"))));
        assert_eq!(session.riddle().unwrap().text, "neu");
    }

    #[test]
    fn test_history_stays_bounded_over_many_fetches() {
        let mut session = session();
        for i in 0..(HISTORY_LIMIT * 3) {
            let ticket = session.request_new_riddle().unwrap();
            session.complete_fetch(ticket.generation, Ok(Riddle::new(format!("r{i}"), "a")));
            assert!(session.history().len() <= HISTORY_LIMIT);
        }
        let expected: Vec<String> = (HISTORY_LIMIT * 2..HISTORY_LIMIT * 3)
            .map(|i| format!("r{i}"))
            .collect();
        assert_eq!(session.history().to_vec(), expected);
    }

    #[test]
    fn test_speakable_text_follows_state() {
        let mut session = presented();
        assert_eq!(session.speakable_text(), Some(TABLE_RIDDLE));

        let ticket = session.submit_guess("Tisch").unwrap();
        session.complete_verify(ticket.generation, Ok(true));
        assert_eq!(
            session.speakable_text(),
            Some(Language::German.strings().correct)
        );

        session.request_new_riddle();
        assert_eq!(session.speakable_text(), None);
    }

    #[test]
    fn test_snapshot_flags_while_loading() {
        let mut session = session();
        session.request_new_riddle();

        let snapshot = session.snapshot(false, true);
        assert_eq!(snapshot.state, SessionState::Loading);
        assert!(!snapshot.can_submit_guess);
        assert!(!snapshot.can_request_new);
        assert!(!snapshot.can_change_selection);
        assert!(!snapshot.can_toggle_speech);
    }
}
