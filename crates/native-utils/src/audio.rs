use ringbuf::HeapRb;
use rubato::{FastFixedIn, PolynomialDegree, Resampler};

/// Sample rate of the raw PCM16 stream returned by the speech endpoint.
pub const SPEECH_PCM16_SAMPLE_RATE: f64 = 24000.0;

/// Creates a resampler to convert between audio sample rates.
pub fn create_resampler(
    in_sampling_rate: f64,
    out_sampling_rate: f64,
    chunk_size: usize,
) -> anyhow::Result<FastFixedIn<f32>> {
    let resampler = FastFixedIn::<f32>::new(
        out_sampling_rate / in_sampling_rate,
        1.0,
        PolynomialDegree::Cubic,
        chunk_size,
        1,
    )?;
    Ok(resampler)
}

/// Splits a slice of audio samples into fixed-size chunks.
/// The last chunk is padded with zeros.
pub fn split_for_chunks(samples: &[f32], chunk_size: usize) -> Vec<Vec<f32>> {
    samples
        .chunks(chunk_size)
        .map(|chunk| {
            let mut chunk = chunk.to_vec();
            chunk.resize(chunk_size, 0.0);
            chunk
        })
        .collect()
}

/// Creates a new ring buffer on the heap for shared audio data.
pub fn shared_buffer(size: usize) -> HeapRb<f32> {
    HeapRb::new(size)
}

/// Interprets little-endian PCM16 bytes as f32 samples in -1.0..=1.0.
/// A trailing odd byte is ignored.
pub fn decode_pcm16(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|chunk| {
            let v = i16::from_le_bytes([chunk[0], chunk[1]]);
            (v as f32 / 32768.0).clamp(-1.0, 1.0)
        })
        .collect()
}

/// Runs a whole mono clip through `resampler`, chunk by chunk.
pub fn resample_all(resampler: &mut FastFixedIn<f32>, samples: &[f32]) -> Vec<f32> {
    let chunk_size = resampler.input_frames_next();
    let mut out = Vec::new();
    for chunk in split_for_chunks(samples, chunk_size) {
        match resampler.process(&[chunk.as_slice()], None) {
            Ok(resampled) => {
                if let Some(channel) = resampled.first() {
                    out.extend_from_slice(channel);
                }
            }
            Err(e) => tracing::warn!("Failed to resample chunk: {:?}", e),
        }
    }
    out
}
