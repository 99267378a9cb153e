pub mod config;
pub mod prompt_loader;
pub mod speech_adapter;
pub mod terminal;
