pub mod catalog;
pub mod controller;
pub mod error;
pub mod gemini_riddler;
pub mod history;
pub mod prompt;
pub mod riddler;
pub mod session_state;
pub mod speech;

pub use catalog::{Category, Language};
pub use error::RiddleError;

/// Requests the presentation layer forwards to the controller.
///
/// The controller owns the session; the presentation side only ever sends
/// these and reads back `Snapshot`s.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    SelectCategory(Category),
    SelectLanguage(Language),
    SubmitGuess(String),
    RequestNewRiddle,
    ToggleSpeech,
    /// Ends the controller loop.
    Shutdown,
}
