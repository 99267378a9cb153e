use crate::error::RiddleError;
#[cfg(test)]
use mockall::automock;
use std::sync::Arc;

/// Identifies one playback started by a `SpeechService`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpeechHandle(u64);

impl SpeechHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

/// Lifecycle events a speech service reports back for a playback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechEvent {
    Finished(SpeechHandle),
    Failed(SpeechHandle, String),
}

impl SpeechEvent {
    pub fn handle(&self) -> SpeechHandle {
        match self {
            SpeechEvent::Finished(handle) | SpeechEvent::Failed(handle, _) => *handle,
        }
    }
}

/// A text-to-speech backend.
///
/// `speak` starts playback and returns immediately; completion is reported
/// as a `SpeechEvent` on the channel the implementation was built with.
#[cfg_attr(test, automock)]
pub trait SpeechService: Send + Sync {
    fn speak(&self, text: &str, locale: &str) -> Result<SpeechHandle, RiddleError>;

    /// Stops the given playback. Stopping a finished or unknown handle does nothing.
    fn stop(&self, handle: SpeechHandle);
}

/// Tracks the single active playback and enforces the speech ordering rules:
/// speaking while already speaking is ignored, and `stop` is idempotent.
pub struct Narrator {
    service: Option<Arc<dyn SpeechService>>,
    active: Option<SpeechHandle>,
}

impl Narrator {
    pub fn new(service: Arc<dyn SpeechService>) -> Self {
        Self {
            service: Some(service),
            active: None,
        }
    }

    /// A narrator for environments without speech output.
    pub fn disabled() -> Self {
        Self {
            service: None,
            active: None,
        }
    }

    pub fn is_available(&self) -> bool {
        self.service.is_some()
    }

    pub fn is_speaking(&self) -> bool {
        self.active.is_some()
    }

    /// Starts speaking `text`. Returns `Ok(None)` without touching the
    /// service when something is already playing.
    pub fn speak(&mut self, text: &str, locale: &str) -> Result<Option<SpeechHandle>, RiddleError> {
        let Some(service) = &self.service else {
            return Err(RiddleError::UnsupportedEnvironment(
                "speech output is not available".to_string(),
            ));
        };
        if self.active.is_some() {
            tracing::debug!("Speech already active, ignoring speak request.");
            return Ok(None);
        }
        let handle = service.speak(text, locale)?;
        tracing::debug!("Speech started: {:?}", handle);
        self.active = Some(handle);
        Ok(Some(handle))
    }

    pub fn stop(&mut self) {
        if let (Some(handle), Some(service)) = (self.active.take(), &self.service) {
            tracing::debug!("Stopping speech: {:?}", handle);
            service.stop(handle);
        }
    }

    /// Applies a playback event. Returns `true` when it ended the active playback.
    pub fn on_event(&mut self, event: &SpeechEvent) -> bool {
        if self.active != Some(event.handle()) {
            tracing::debug!("Ignoring event for inactive playback: {:?}", event);
            return false;
        }
        if let SpeechEvent::Failed(_, reason) = event {
            tracing::warn!("Speech playback failed: {}", reason);
        }
        self.active = None;
        true
    }
}
