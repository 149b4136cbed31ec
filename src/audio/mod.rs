pub mod player;
pub mod recorder;

pub use player::{CpalOutput, PlaybackEngine, PlaybackSignal};
pub use recorder::{AudioRecorder, CpalInput, Utterance};

/// Wire format shared by microphone transport and synthesized speech:
/// raw PCM, 16-bit signed little-endian, mono, 24 kHz.
pub const SAMPLE_RATE: u32 = 24_000;
pub const CHANNELS: u16 = 1;

/// Captured blobs below this size are treated as silence.
pub const MIN_UTTERANCE_BYTES: usize = 1000;

/// MIME type announced to the gateway for PCM audio.
pub fn pcm_mime_type() -> String {
    format!("audio/pcm;rate={}", SAMPLE_RATE)
}
