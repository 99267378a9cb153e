//! Line-oriented terminal front end.
//!
//! Input lines become `Intent`s for the controller; every published
//! `Snapshot` is rendered as the lines that changed since the previous one.

use riddle_core::Intent;
use riddle_core::catalog::{Category, Language};
use riddle_core::session_state::{SessionState, Snapshot};
use std::io::BufRead;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, watch};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Intent(Intent),
    Help,
    Quit,
    Invalid(String),
}

/// Parses one input line. Blank lines yield `None`; anything not starting
/// with `/` is a guess.
pub fn parse_line(line: &str) -> Option<Command> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Some(Command::Intent(Intent::SubmitGuess(line.to_string())));
    };
    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };
    let command = match name.to_lowercase().as_str() {
        "new" => Command::Intent(Intent::RequestNewRiddle),
        "speak" => Command::Intent(Intent::ToggleSpeech),
        "category" if arg.is_empty() => Command::Invalid("usage: /category <id>".to_string()),
        "category" => match arg.parse::<Category>() {
            Ok(category) => Command::Intent(Intent::SelectCategory(category)),
            Err(e) => Command::Invalid(e.to_string()),
        },
        "language" if arg.is_empty() => Command::Invalid("usage: /language <id>".to_string()),
        "language" => match arg.parse::<Language>() {
            Ok(language) => Command::Intent(Intent::SelectLanguage(language)),
            Err(e) => Command::Invalid(e.to_string()),
        },
        "help" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => Command::Invalid(format!("unknown command '/{other}', try /help")),
    };
    Some(command)
}

pub fn help_text(language: Language) -> String {
    let strings = language.strings();
    let categories: Vec<String> = Category::ALL
        .iter()
        .map(|c| format!("{} ({})", c.id(), c.label(language)))
        .collect();
    let languages: Vec<&str> = Language::ALL.iter().map(|l| l.id()).collect();
    format!(
        "<text>            submit a guess\n\
         /new              new riddle\n\
         /category <id>    {}: {}\n\
         /language <id>    {}: {}\n\
         /speak            read aloud / stop reading\n\
         /help             this help\n\
         /quit             exit",
        strings.category_heading,
        categories.join(", "),
        strings.language_heading,
        languages.join(", "),
    )
}

/// Lines describing what changed between `previous` and `current`.
pub fn render(current: &Snapshot, previous: Option<&Snapshot>) -> Vec<String> {
    let strings = current.language.strings();
    let mut lines = Vec::new();

    if previous.is_none_or(|p| p.category != current.category || p.language != current.language) {
        lines.push(format!(
            "== {} | {}: {} | {}: {} ==",
            strings.title,
            strings.category_heading,
            current.category.label(current.language),
            strings.language_heading,
            current.language.id(),
        ));
    }

    if previous.is_none_or(|p| p.state != current.state || p.riddle != current.riddle) {
        match current.state {
            SessionState::Idle => {}
            SessionState::Loading => lines.push(strings.loading.to_string()),
            SessionState::Presented => {
                if let Some(riddle) = &current.riddle {
                    lines.push(format!("{} {}", strings.riddle_heading, riddle));
                    lines.push(strings.guess_prompt.to_string());
                }
            }
            SessionState::Verifying => lines.push(strings.verifying.to_string()),
            SessionState::Resolved => {
                if let Some(feedback) = &current.feedback {
                    lines.push(feedback.message.clone());
                }
                lines.push(strings.next_hint.to_string());
            }
            SessionState::Failed => {
                if let Some(error) = &current.error {
                    lines.push(error.clone());
                }
                lines.push(strings.retry_hint.to_string());
            }
        }
    }

    if current.is_speaking && previous.is_none_or(|p| !p.is_speaking) {
        lines.push(strings.speaking.to_string());
    }
    lines
}

/// Renders snapshots until the controller drops its sender.
pub async fn run_output<W>(mut snapshots: watch::Receiver<Snapshot>, mut writer: W) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut previous: Option<Snapshot> = None;
    loop {
        let current = snapshots.borrow_and_update().clone();
        for line in render(&current, previous.as_ref()) {
            writer.write_all(line.as_bytes()).await?;
            writer.write_all(b"\n").await?;
        }
        writer.flush().await?;
        previous = Some(current);
        if snapshots.changed().await.is_err() {
            break;
        }
    }
    Ok(())
}

/// Reads stdin line by line on a plain thread. A read blocked there does
/// not keep the runtime from shutting down.
pub fn spawn_stdin_reader(lines: mpsc::Sender<String>) {
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if lines.blocking_send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!("Failed to read stdin: {}", e);
                    break;
                }
            }
        }
    });
}

/// Turns input lines into intents. End of input and `/quit` both send
/// `Intent::Shutdown`.
pub async fn run_input<W>(
    mut lines: mpsc::Receiver<String>,
    mut writer: W,
    intents: mpsc::Sender<Intent>,
    snapshots: watch::Receiver<Snapshot>,
) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = lines.recv().await {
        match parse_line(&line) {
            None => {}
            Some(Command::Intent(intent)) => {
                if intents.send(intent).await.is_err() {
                    tracing::debug!("Controller gone, stopping input.");
                    return Ok(());
                }
            }
            Some(Command::Help) => {
                let language = snapshots.borrow().language;
                writer.write_all(help_text(language).as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
            }
            Some(Command::Quit) => break,
            Some(Command::Invalid(message)) => {
                writer.write_all(message.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
            }
        }
    }
    // The controller may already be gone.
    let _ = intents.send(Intent::Shutdown).await;
    Ok(())
}
