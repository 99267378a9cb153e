use anyhow::{Context, Result};
use clap::Parser;
use riddle_core::catalog::{Category, Language};
use riddle_core::controller::{ControllerSettings, RiddleController};
use riddle_core::gemini_riddler::GeminiRiddler;
use riddle_core::riddler::{Riddler, RiddlerClient};
use riddle_core::session_state::RiddleSession;
use riddle_core::speech::{Narrator, SpeechEvent};
use riddle_service::config::{Config, TextProvider};
use riddle_service::speech_adapter::{self, OpenAiSpeech};
use riddle_service::{prompt_loader, terminal};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::fmt::time::ChronoLocal;

#[derive(Parser)]
#[command(version, about = "A riddle guessing game in the terminal")]
struct Cli {
    /// Riddle category: funny, mathematical, detective, mysterious or themed
    #[arg(long, default_value_t = Category::default())]
    category: Category,
    /// Language for riddles, judging and speech: de, ru or en
    #[arg(long, default_value_t = Language::default())]
    language: Language,
    /// Disable reading riddles aloud
    #[arg(long)]
    no_speech: bool,
    /// Name of the audio output device to use instead of the default
    #[arg(long)]
    output_device: Option<String>,
    /// List audio output devices and exit
    #[arg(long)]
    list_devices: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // --- 1. Parse Command-Line Arguments ---
    let args = Cli::parse();
    if args.list_devices {
        println!("{}", riddle_native_utils::device::available_outputs()?);
        return Ok(());
    }

    // --- 2. Load Configuration ---
    let config = Config::from_env().context("Failed to load application configuration")?;

    // --- 3. Initialize Logging ---
    // Logs go to stderr so they do not interleave with the game on stdout.
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(ChronoLocal::rfc_3339())
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Configuration loaded successfully. Starting riddle service...");

    // --- 4. Load Prompts ---
    let templates = prompt_loader::load_templates(&config.prompts_dir)
        .context("Failed to load prompt templates")?;

    // --- 5. Initialize API Clients ---
    let http = reqwest::Client::builder()
        .timeout(config.http_timeout)
        .build()
        .context("Failed to build HTTP client")?;

    let riddler: Arc<dyn Riddler> = match config.provider {
        TextProvider::OpenAI => {
            let api_key = config
                .openai_api_key
                .clone()
                .context("OPENAI_API_KEY must be set for openai provider")?;
            Arc::new(RiddlerClient::new(
                http.clone(),
                api_key,
                config.chat_model.clone(),
            ))
        }
        TextProvider::Gemini => {
            let api_key = config
                .gemini_api_key
                .clone()
                .context("GEMINI_API_KEY must be set for gemini provider")?;
            Arc::new(GeminiRiddler::new(
                http.clone(),
                api_key,
                config.chat_model.clone(),
            ))
        }
    };
    tracing::info!(
        "Using {:?} for riddles with model {}",
        config.provider,
        config.chat_model
    );

    // --- 6. Speech Output ---
    // The stream plays for as long as it is held here.
    let (speech_tx, speech_rx) = mpsc::channel::<SpeechEvent>(16);
    let (narrator, _output_stream): (Narrator, Option<cpal::Stream>) =
        if args.no_speech || !config.speech_enabled {
            tracing::info!("Speech disabled.");
            (Narrator::disabled(), None)
        } else if let Some(api_key) = config.openai_api_key.clone() {
            match speech_adapter::open_output(args.output_device.as_deref()) {
                Ok((stream, sink)) => {
                    let speech = OpenAiSpeech::new(
                        http.clone(),
                        api_key,
                        config.tts_model.clone(),
                        config.tts_voice.clone(),
                        sink,
                        speech_tx.clone(),
                    );
                    (Narrator::new(Arc::new(speech)), Some(stream))
                }
                Err(e) => {
                    tracing::warn!("Speech disabled: {}", e);
                    (Narrator::disabled(), None)
                }
            }
        } else {
            tracing::warn!("Speech disabled: OPENAI_API_KEY is not set.");
            (Narrator::disabled(), None)
        };
    drop(speech_tx);

    // --- 7. Session and Controller ---
    let session = RiddleSession::new(args.category, args.language, templates);
    let settings = ControllerSettings {
        auto_speak_feedback: config.auto_speak_feedback,
    };
    let (controller, snapshots) = RiddleController::new(session, riddler, narrator, settings);
    let (intent_tx, intent_rx) = mpsc::channel(32);
    let controller_handle = tokio::spawn(controller.run(intent_rx, speech_rx));

    // --- 8. Terminal ---
    let output_handle = tokio::spawn(terminal::run_output(
        snapshots.clone(),
        tokio::io::stdout(),
    ));
    let (line_tx, line_rx) = mpsc::channel(32);
    terminal::spawn_stdin_reader(line_tx);
    let input_handle = tokio::spawn(terminal::run_input(
        line_rx,
        tokio::io::stdout(),
        intent_tx.clone(),
        snapshots,
    ));

    tokio::select! {
        result = controller_handle => {
            if let Err(e) = result {
                tracing::error!("Controller task failed: {:?}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received Ctrl-C, shutting down...");
            if intent_tx.send(riddle_core::Intent::Shutdown).await.is_err() {
                tracing::debug!("Controller already stopped.");
            }
        }
    }
    input_handle.abort();
    match output_handle.await {
        Ok(Err(e)) => tracing::error!("Terminal output failed: {:?}", e),
        Err(e) => tracing::error!("Terminal output task failed: {:?}", e),
        Ok(Ok(())) => {}
    }
    tracing::info!("Shutting down...");
    Ok(())
}
