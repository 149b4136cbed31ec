use base64::prelude::*;
use cpal::traits::*;
use cpal::{Device, SampleRate, StreamConfig};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::{CHANNELS, SAMPLE_RATE};

#[derive(Debug, thiserror::Error)]
pub enum PlaybackError {
    #[error("invalid base64 audio payload: {0}")]
    Decode(#[from] base64::DecodeError),
    #[error("PCM payload has an odd length ({0} bytes)")]
    OddLength(usize),
    #[error("audio output unavailable: {0}")]
    Device(String),
}

/// Signals carry the token the payload was played under, so a listener can
/// tell a late `Ended` of a replaced payload from the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackSignal {
    /// Emitted synchronously by `play` once the device accepted the stream.
    Started(u64),
    /// Emitted once, from the device callback, when the buffer runs out.
    /// Never emitted by `pause` or `stop`.
    Ended(u64),
}

pub type PlaybackCallback = Arc<dyn Fn(PlaybackSignal) + Send + Sync>;

/// Decode a base64 speech payload (s16le mono 24 kHz) into normalized samples.
pub fn decode_pcm(payload: &str) -> Result<Vec<f32>, PlaybackError> {
    let bytes = BASE64_STANDARD.decode(payload.trim())?;
    pcm_to_samples(&bytes)
}

/// Interpret bytes as little-endian i16 and scale each sample by 1/32768.
pub fn pcm_to_samples(bytes: &[u8]) -> Result<Vec<f32>, PlaybackError> {
    if bytes.len() % 2 != 0 {
        return Err(PlaybackError::OddLength(bytes.len()));
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect())
}

/// One decoded payload plus the read cursor shared with the device callback.
pub struct Track {
    token: u64,
    samples: Arc<[f32]>,
    cursor: AtomicUsize,
    finished: AtomicBool,
    on_signal: PlaybackCallback,
}

impl Track {
    fn new(token: u64, samples: Vec<f32>, on_signal: PlaybackCallback) -> Self {
        Self {
            token,
            samples: samples.into(),
            cursor: AtomicUsize::new(0),
            finished: AtomicBool::new(false),
            on_signal,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Source frames already handed to the device.
    pub fn position(&self) -> usize {
        self.cursor.load(Ordering::Acquire)
    }

    fn seek(&self, frame: usize) {
        self.cursor.store(frame.min(self.len()), Ordering::Release);
    }

    /// Fill an interleaved device buffer. `step` is source frames per device
    /// frame (1.0 when the device runs at 24 kHz); `phase` carries the
    /// fractional remainder between calls.
    pub fn fill(&self, out: &mut [f32], channels: usize, step: f64, phase: &mut f64) {
        let len = self.len();
        let mut pos = self.position();

        for frame in out.chunks_mut(channels.max(1)) {
            let sample = self.samples.get(pos).copied().unwrap_or(0.0);
            frame.fill(sample);
            if pos < len {
                *phase += step;
                while *phase >= 1.0 {
                    *phase -= 1.0;
                    pos += 1;
                }
            }
        }

        let pos = pos.min(len);
        self.cursor.store(pos, Ordering::Release);

        if pos >= len && !self.finished.swap(true, Ordering::AcqRel) {
            (self.on_signal)(PlaybackSignal::Ended(self.token));
        }
    }
}

/// An audio sink that can pull from a [`Track`]. The returned stream keeps
/// the device busy until it is dropped.
pub trait OutputDevice {
    type Stream;

    /// Build a stream for `track` without starting it.
    fn open(&mut self, track: Arc<Track>) -> Result<Self::Stream, PlaybackError>;

    fn start(&mut self, stream: &Self::Stream) -> Result<(), PlaybackError>;
}

/// Default output device through cpal.
pub struct CpalOutput {
    device: Device,
    config: StreamConfig,
}

impl CpalOutput {
    pub fn new() -> Result<Self, PlaybackError> {
        log::info!("[Player] Initializing audio output");

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| PlaybackError::Device("No output device available".into()))?;
        log::info!("[Player] Output device: {}", device.name().unwrap_or_default());

        let config = Self::pick_output_config(&device)?;
        log::info!(
            "[Player] Output config: {} Hz, {} channel(s)",
            config.sample_rate.0,
            config.channels
        );

        Ok(Self { device, config })
    }

    /// Prefer 24kHz mono; otherwise use the device default and resample.
    fn pick_output_config(device: &Device) -> Result<StreamConfig, PlaybackError> {
        let supports_native = device
            .supported_output_configs()
            .map(|mut it| {
                it.any(|c| {
                    c.min_sample_rate() <= SampleRate(SAMPLE_RATE)
                        && c.max_sample_rate() >= SampleRate(SAMPLE_RATE)
                })
            })
            .unwrap_or(false);

        if supports_native {
            return Ok(StreamConfig {
                channels: CHANNELS,
                sample_rate: SampleRate(SAMPLE_RATE),
                buffer_size: cpal::BufferSize::Default,
            });
        }

        let def = device
            .default_output_config()
            .map_err(|e| PlaybackError::Device(e.to_string()))?;
        log::warn!(
            "[Player] 24kHz not supported, resampling to {} Hz, {} ch",
            def.sample_rate().0,
            def.channels()
        );
        Ok(def.into())
    }
}

impl OutputDevice for CpalOutput {
    type Stream = cpal::Stream;

    fn open(&mut self, track: Arc<Track>) -> Result<cpal::Stream, PlaybackError> {
        let channels = self.config.channels as usize;
        let step = SAMPLE_RATE as f64 / self.config.sample_rate.0 as f64;
        let mut phase = 0.0;

        self.device
            .build_output_stream(
                &self.config,
                move |data: &mut [f32], _| track.fill(data, channels, step, &mut phase),
                |err| log::error!("[Player] Output stream error: {err}"),
                None,
            )
            .map_err(|e| PlaybackError::Device(e.to_string()))
    }

    fn start(&mut self, stream: &cpal::Stream) -> Result<(), PlaybackError> {
        stream.play().map_err(|e| PlaybackError::Device(e.to_string()))
    }
}

struct Active<S> {
    track: Arc<Track>,
    /// `None` while paused.
    stream: Option<S>,
    paused_at: Option<usize>,
}

/// Plays one speech payload at a time with pause/resume-at-offset.
///
/// The engine owns the output stream: replacing the payload, `stop` and
/// dropping the engine all release it.
pub struct PlaybackEngine<D: OutputDevice> {
    device: D,
    on_signal: PlaybackCallback,
    current: Option<Active<D::Stream>>,
}

impl<D: OutputDevice> PlaybackEngine<D> {
    pub fn new(device: D, on_signal: PlaybackCallback) -> Self {
        Self {
            device,
            on_signal,
            current: None,
        }
    }

    /// Tear down any previous playback, decode `payload` and play it from 0.
    /// `token` is echoed back in the signals of this payload.
    pub fn play(&mut self, token: u64, payload: &str) -> Result<(), PlaybackError> {
        self.stop();

        let samples = decode_pcm(payload)?;
        log::info!(
            "[Player] Playing {:.1}s of speech",
            samples.len() as f32 / SAMPLE_RATE as f32
        );

        let track = Arc::new(Track::new(token, samples, self.on_signal.clone()));
        let stream = self.device.open(track.clone())?;
        self.device.start(&stream)?;
        (self.on_signal)(PlaybackSignal::Started(token));

        self.current = Some(Active {
            track,
            stream: Some(stream),
            paused_at: None,
        });
        Ok(())
    }

    /// Stop the device stream and remember where we were. Does not emit `Ended`.
    pub fn pause(&mut self) {
        let Some(active) = self.current.as_mut() else {
            return;
        };
        if active.stream.take().is_some() {
            let offset = active.track.position();
            active.paused_at = Some(offset);
            log::debug!("[Player] Paused at frame {}", offset);
        }
    }

    /// Restart from the captured offset with the already decoded buffer.
    pub fn resume(&mut self) -> Result<(), PlaybackError> {
        let Some(active) = self.current.as_mut() else {
            return Ok(());
        };
        let Some(offset) = active.paused_at.take() else {
            return Ok(());
        };

        active.track.seek(offset);
        let stream = self.device.open(active.track.clone())?;
        self.device.start(&stream)?;
        active.stream = Some(stream);
        log::debug!("[Player] Resumed at frame {}", offset);
        Ok(())
    }

    /// Release the current stream, if any.
    pub fn stop(&mut self) {
        if self.current.take().is_some() {
            log::debug!("[Player] Playback released");
        }
    }

    /// Elapsed playback time of the current payload.
    pub fn position(&self) -> Duration {
        self.current
            .as_ref()
            .map(|a| Duration::from_secs_f64(a.track.position() as f64 / SAMPLE_RATE as f64))
            .unwrap_or_default()
    }
}

impl<D: OutputDevice> Drop for PlaybackEngine<D> {
    fn drop(&mut self) {
        self.stop();
    }
}
