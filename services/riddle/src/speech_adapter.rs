use crate::config::{OUTPUT_BUFFER_SECS, OUTPUT_CHUNK_SIZE};
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{FrameCount, StreamConfig};
use reqwest::Client;
use riddle_core::error::RiddleError;
use riddle_core::riddler::OPENAI_BASE_URL;
use riddle_core::speech::{SpeechEvent, SpeechHandle, SpeechService};
use riddle_native_utils::audio::{self, SPEECH_PCM16_SAMPLE_RATE};
use ringbuf::HeapProd;
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const RESAMPLE_CHUNK_SIZE: usize = 1024;
const POLL_INTERVAL: Duration = Duration::from_millis(20);
/// How many polls a new playback waits for the output callback to flush.
const FLUSH_WAIT_POLLS: usize = 25;

/// Producer side of the playback ring; the consumer lives in the output stream callback.
pub struct PlaybackSink {
    producer: HeapProd<f32>,
    flush: Arc<AtomicBool>,
    sample_rate: f64,
}

impl PlaybackSink {
    pub fn new(producer: HeapProd<f32>, flush: Arc<AtomicBool>, sample_rate: f64) -> Self {
        Self {
            producer,
            flush,
            sample_rate,
        }
    }
}

fn unsupported(e: impl std::fmt::Display) -> RiddleError {
    RiddleError::UnsupportedEnvironment(e.to_string())
}

/// Opens the output device and starts a stream that plays whatever is
/// pushed into the returned sink. The stream must be kept alive by the caller.
pub fn open_output(device_name: Option<&str>) -> Result<(cpal::Stream, PlaybackSink), RiddleError> {
    let output = riddle_native_utils::device::get_or_default_output(device_name)
        .map_err(|e| unsupported(format!("{e:#}")))?;
    tracing::info!("Using output device: {:?}", output.name().map_err(unsupported)?);

    let default_config = output.default_output_config().map_err(unsupported)?;
    let output_config = StreamConfig {
        channels: default_config.channels(),
        sample_rate: default_config.sample_rate(),
        buffer_size: cpal::BufferSize::Fixed(FrameCount::from(OUTPUT_CHUNK_SIZE as u32)),
    };
    let channel_count = (output_config.channels as usize).max(1);
    let sample_rate = output_config.sample_rate.0 as f64;
    tracing::info!("Output stream config: {:?}", &output_config);

    let buffer = audio::shared_buffer(output_config.sample_rate.0 as usize * OUTPUT_BUFFER_SECS);
    let (producer, mut consumer) = buffer.split();
    let flush = Arc::new(AtomicBool::new(false));
    let flush_cb = Arc::clone(&flush);

    // Mono samples are copied to every channel of the frame.
    let output_data_fn = move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
        if flush_cb.swap(false, Ordering::AcqRel) {
            consumer.clear();
        }
        for frame in data.chunks_mut(channel_count) {
            let sample = consumer.try_pop().unwrap_or(0.0);
            frame.fill(sample);
        }
    };
    let stream = output
        .build_output_stream(
            &output_config,
            output_data_fn,
            move |err| tracing::error!("An error occurred on output stream: {}", err),
            None,
        )
        .map_err(unsupported)?;
    stream.play().map_err(unsupported)?;

    Ok((stream, PlaybackSink::new(producer, flush, sample_rate)))
}

/// `SpeechService` backed by OpenAI's `/audio/speech` endpoint.
///
/// Each `speak` spawns a playback task that synthesizes the text as raw
/// PCM16, resamples it to the device rate and feeds the output ring. The
/// task reports `Finished` once the ring has drained.
pub struct OpenAiSpeech {
    client: Client,
    api_key: SecretString,
    model: String,
    voice: String,
    base_url: String,
    producer: Arc<tokio::sync::Mutex<HeapProd<f32>>>,
    flush: Arc<AtomicBool>,
    sample_rate: f64,
    next_id: AtomicU64,
    active: Mutex<Option<(SpeechHandle, JoinHandle<()>)>>,
    events: mpsc::Sender<SpeechEvent>,
}

impl OpenAiSpeech {
    pub fn new(
        client: Client,
        api_key: SecretString,
        model: String,
        voice: String,
        sink: PlaybackSink,
        events: mpsc::Sender<SpeechEvent>,
    ) -> Self {
        Self {
            client,
            api_key,
            model,
            voice,
            base_url: OPENAI_BASE_URL.to_string(),
            producer: Arc::new(tokio::sync::Mutex::new(sink.producer)),
            flush: sink.flush,
            sample_rate: sink.sample_rate,
            next_id: AtomicU64::new(0),
            active: Mutex::new(None),
            events,
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn request_body(&self, text: &str, locale: &str) -> Value {
        json!({
            "model": self.model,
            "voice": self.voice,
            "input": text,
            "response_format": "pcm",
            "instructions": format!("Read this aloud naturally, with the pronunciation of locale {locale}."),
        })
    }
}

impl SpeechService for OpenAiSpeech {
    fn speak(&self, text: &str, locale: &str) -> Result<SpeechHandle, RiddleError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(unsupported)?;
        let handle = SpeechHandle::new(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let playback = Playback {
            client: self.client.clone(),
            api_key: self.api_key.clone(),
            url: format!("{}/audio/speech", self.base_url),
            body: self.request_body(text, locale),
            producer: Arc::clone(&self.producer),
            flush: Arc::clone(&self.flush),
            sample_rate: self.sample_rate,
        };
        let events = self.events.clone();
        let task = runtime.spawn(async move {
            let event = match playback.run().await {
                Ok(()) => SpeechEvent::Finished(handle),
                Err(e) => SpeechEvent::Failed(handle, e.to_string()),
            };
            if events.send(event).await.is_err() {
                tracing::debug!("Speech event receiver dropped.");
            }
        });

        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if let Some((previous, task)) = active.replace((handle, task)) {
            tracing::debug!("Replacing playback {:?}", previous);
            task.abort();
        }
        Ok(handle)
    }

    fn stop(&self, handle: SpeechHandle) {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if active.as_ref().map(|(h, _)| *h) != Some(handle) {
            return;
        }
        if let Some((_, task)) = active.take() {
            task.abort();
            self.flush.store(true, Ordering::Release);
        }
    }
}

struct Playback {
    client: Client,
    api_key: SecretString,
    url: String,
    body: Value,
    producer: Arc<tokio::sync::Mutex<HeapProd<f32>>>,
    flush: Arc<AtomicBool>,
    sample_rate: f64,
}

impl Playback {
    async fn run(self) -> Result<(), RiddleError> {
        let bytes = self
            .client
            .post(&self.url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&self.body)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        let pcm = audio::decode_pcm16(&bytes);
        if pcm.is_empty() {
            return Err(RiddleError::MalformedResponse(
                "speech endpoint returned no audio".to_string(),
            ));
        }
        let samples = if self.sample_rate == SPEECH_PCM16_SAMPLE_RATE {
            pcm
        } else {
            let mut resampler = audio::create_resampler(
                SPEECH_PCM16_SAMPLE_RATE,
                self.sample_rate,
                RESAMPLE_CHUNK_SIZE,
            )
            .map_err(|e| unsupported(format!("{e:#}")))?;
            audio::resample_all(&mut resampler, &pcm)
        };
        tracing::debug!("Playing {} samples at {}hz", samples.len(), self.sample_rate);

        let mut producer = self.producer.lock().await;
        // A preceding stop may still have a flush pending in the output callback.
        for _ in 0..FLUSH_WAIT_POLLS {
            if !self.flush.load(Ordering::Acquire) {
                break;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }

        let mut rest = samples.as_slice();
        while !rest.is_empty() {
            let pushed = producer.push_slice(rest);
            rest = &rest[pushed..];
            if !rest.is_empty() {
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        }
        while producer.occupied_len() > 0 {
            tokio::time::sleep(POLL_INTERVAL).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn speech(events: mpsc::Sender<SpeechEvent>) -> (OpenAiSpeech, Arc<AtomicBool>) {
        let (producer, _consumer) = audio::shared_buffer(1024).split();
        let flush = Arc::new(AtomicBool::new(false));
        let sink = PlaybackSink::new(producer, Arc::clone(&flush), 48000.0);
        let speech = OpenAiSpeech::new(
            Client::new(),
            SecretString::from("sk-test"),
            "gpt-4o-mini-tts".to_string(),
            "alloy".to_string(),
            sink,
            events,
        );
        (speech, flush)
    }

    #[test]
    fn test_request_body_asks_for_raw_pcm() {
        let (tx, _rx) = mpsc::channel(1);
        let (speech, _) = speech(tx);

        let body = speech.request_body("Ein Tisch", "de-DE");

        assert_eq!(body["model"], "gpt-4o-mini-tts");
        assert_eq!(body["voice"], "alloy");
        assert_eq!(body["input"], "Ein Tisch");
        assert_eq!(body["response_format"], "pcm");
        assert!(body["instructions"].as_str().unwrap().contains("de-DE"));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_reports_failed_event() {
        let (tx, mut rx) = mpsc::channel(4);
        let (speech, _) = speech(tx);
        let speech = speech.with_base_url("http://127.0.0.1:9/v1/");

        let handle = speech.speak("Hallo", "de-DE").unwrap();
        let event = tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .expect("no speech event")
            .expect("channel closed");

        assert!(matches!(event, SpeechEvent::Failed(h, _) if h == handle));
    }

    #[tokio::test]
    async fn test_stop_only_acts_on_active_handle() {
        let (tx, _rx) = mpsc::channel(4);
        let (speech, flush) = speech(tx);
        let speech = speech.with_base_url("http://127.0.0.1:9/v1");

        let first = speech.speak("eins", "de-DE").unwrap();
        let second = speech.speak("zwei", "de-DE").unwrap();
        assert_ne!(first, second);

        speech.stop(first);
        assert!(!flush.load(Ordering::Acquire));

        speech.stop(second);
        assert!(flush.load(Ordering::Acquire));

        flush.store(false, Ordering::Release);
        speech.stop(second);
        assert!(!flush.load(Ordering::Acquire));
    }

    #[test]
    fn test_speak_outside_runtime_is_unsupported() {
        let (tx, _rx) = mpsc::channel(1);
        let (speech, _) = speech(tx);

        assert!(matches!(
            speech.speak("text", "en-US"),
            Err(RiddleError::UnsupportedEnvironment(_))
        ));
    }
}
