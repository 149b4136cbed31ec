use base64::prelude::*;
use cpal::traits::*;
use cpal::{Device, SampleFormat, SampleRate, SizedSample, Stream, StreamConfig};
use crossbeam_channel::{unbounded, Receiver, Sender};

use super::{CHANNELS, MIN_UTTERANCE_BYTES, SAMPLE_RATE};

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("microphone access denied: {0}")]
    Permission(String),
    #[error("utterance too small ({bytes} bytes)")]
    InputTooSmall { bytes: usize },
    #[error("not recording")]
    NotRecording,
    #[error("audio input error: {0}")]
    Device(String),
}

/// A finished recording: s16le mono 24 kHz PCM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance {
    pcm: Vec<u8>,
}

impl Utterance {
    pub fn len(&self) -> usize {
        self.pcm.len()
    }

    /// Transport form handed to the gateway.
    pub fn to_base64(&self) -> String {
        BASE64_STANDARD.encode(&self.pcm)
    }
}

impl From<Vec<u8>> for Utterance {
    fn from(pcm: Vec<u8>) -> Self {
        Self { pcm }
    }
}

/// A microphone. Fragments of s16le 24 kHz mono PCM are pushed to the
/// sender in arrival order; dropping the returned stream releases the device.
pub trait InputDevice {
    type Stream;

    fn open(&mut self, fragments: Sender<Vec<u8>>) -> Result<Self::Stream, CaptureError>;
}

struct RecordingSession<S> {
    stream: S,
    fragments: Receiver<Vec<u8>>,
}

/// Push-to-talk recorder: start, then either stop (hand off) or cancel (discard).
pub struct AudioRecorder<D: InputDevice> {
    device: D,
    session: Option<RecordingSession<D::Stream>>,
}

impl<D: InputDevice> AudioRecorder<D> {
    pub fn new(device: D) -> Self {
        Self {
            device,
            session: None,
        }
    }

    pub fn start_recording(&mut self) -> Result<(), CaptureError> {
        if self.session.is_some() {
            log::warn!("[Recorder] Already recording, releasing previous stream first");
            self.cancel_recording();
        }

        log::info!("[Recorder] Starting recording");
        let (tx, rx) = unbounded();
        let stream = self.device.open(tx)?;
        self.session = Some(RecordingSession {
            stream,
            fragments: rx,
        });
        Ok(())
    }

    /// Release the microphone and join everything captured into one utterance.
    pub fn stop_recording(&mut self) -> Result<Utterance, CaptureError> {
        let RecordingSession { stream, fragments } =
            self.session.take().ok_or(CaptureError::NotRecording)?;
        drop(stream);

        let chunks: Vec<Vec<u8>> = fragments.try_iter().collect();
        let pcm = chunks.concat();
        log::info!(
            "[Recorder] Captured {:.1} KB in {} fragments",
            pcm.len() as f32 / 1024.0,
            chunks.len()
        );

        if pcm.len() < MIN_UTTERANCE_BYTES {
            return Err(CaptureError::InputTooSmall { bytes: pcm.len() });
        }
        Ok(Utterance { pcm })
    }

    /// Release the microphone and throw away whatever was captured.
    pub fn cancel_recording(&mut self) {
        if let Some(RecordingSession { stream, fragments }) = self.session.take() {
            drop(stream);
            let discarded = fragments.try_iter().count();
            log::info!("[Recorder] Recording canceled, {} fragments discarded", discarded);
        }
    }

}

/// Folds interleaved device frames down to mono and resamples to 24 kHz.
struct Downmixer {
    channels: usize,
    /// Output samples per input frame.
    ratio: f64,
    phase: f64,
}

impl Downmixer {
    fn new(channels: u16, device_rate: u32) -> Self {
        Self {
            channels: channels.max(1) as usize,
            ratio: SAMPLE_RATE as f64 / device_rate.max(1) as f64,
            phase: 0.0,
        }
    }

    fn process(&mut self, interleaved: &[f32]) -> Vec<u8> {
        let mut out = Vec::with_capacity(
            (interleaved.len() as f64 / self.channels as f64 * self.ratio) as usize * 2 + 2,
        );
        for frame in interleaved.chunks(self.channels) {
            let mono = frame.iter().sum::<f32>() / frame.len() as f32;
            let s16 = (mono * 32768.0).clamp(i16::MIN as f32, i16::MAX as f32) as i16;
            self.phase += self.ratio;
            while self.phase >= 1.0 {
                self.phase -= 1.0;
                out.extend_from_slice(&s16.to_le_bytes());
            }
        }
        out
    }
}

/// Default input device through cpal.
pub struct CpalInput {
    device: Device,
    config: StreamConfig,
    sample_format: SampleFormat,
}

impl CpalInput {
    pub fn new() -> Result<Self, CaptureError> {
        log::info!("[Recorder] Initializing audio input");

        let host = cpal::default_host();
        log::info!("[Recorder] Audio host: {}", host.id().name());

        let device = host
            .default_input_device()
            .ok_or_else(|| CaptureError::Permission("No input device available".into()))?;
        log::info!("[Recorder] Using device: {}", device.name().unwrap_or_default());

        let default = device
            .default_input_config()
            .map_err(|e| CaptureError::Permission(e.to_string()))?;
        let sample_format = default.sample_format();

        // Prefer 24 kHz mono; fallback to device default and convert
        let supports_native = device
            .supported_input_configs()
            .map(|mut it| {
                it.any(|c| {
                    c.channels() == CHANNELS
                        && c.min_sample_rate() <= SampleRate(SAMPLE_RATE)
                        && c.max_sample_rate() >= SampleRate(SAMPLE_RATE)
                })
            })
            .unwrap_or(false);

        let config = if supports_native {
            StreamConfig {
                channels: CHANNELS,
                sample_rate: SampleRate(SAMPLE_RATE),
                buffer_size: cpal::BufferSize::Default,
            }
        } else {
            log::warn!("[Recorder] 24 kHz mono not supported - converting from device default");
            default.into()
        };

        log::info!(
            "[Recorder] Input config: {} Hz, {} channel(s), {:?}",
            config.sample_rate.0,
            config.channels,
            sample_format
        );

        Ok(Self {
            device,
            config,
            sample_format,
        })
    }

    fn build_stream<T, F>(
        &self,
        fragments: Sender<Vec<u8>>,
        convert: F,
    ) -> Result<Stream, CaptureError>
    where
        T: SizedSample,
        F: Fn(T) -> f32 + Send + 'static,
    {
        let mut mixer = Downmixer::new(self.config.channels, self.config.sample_rate.0);
        self.device
            .build_input_stream(
                &self.config,
                move |data: &[T], _: &cpal::InputCallbackInfo| {
                    let samples: Vec<f32> = data.iter().map(|&s| convert(s)).collect();
                    let bytes = mixer.process(&samples);
                    if !bytes.is_empty() {
                        let _ = fragments.send(bytes);
                    }
                },
                |err| log::error!("[Recorder] Stream error: {err}"),
                None,
            )
            .map_err(|e| CaptureError::Permission(e.to_string()))
    }
}

impl InputDevice for CpalInput {
    type Stream = Stream;

    fn open(&mut self, fragments: Sender<Vec<u8>>) -> Result<Stream, CaptureError> {
        let stream = match self.sample_format {
            SampleFormat::F32 => self.build_stream::<f32, _>(fragments, |s| s)?,
            SampleFormat::I16 => {
                self.build_stream::<i16, _>(fragments, |s| s as f32 / 32768.0)?
            }
            SampleFormat::U16 => self.build_stream::<u16, _>(fragments, |s| {
                (s as f32 / u16::MAX as f32) * 2.0 - 1.0
            })?,
            other => {
                return Err(CaptureError::Device(format!(
                    "Unsupported sample format {other:?}"
                )))
            }
        };

        stream
            .play()
            .map_err(|e| CaptureError::Permission(e.to_string()))?;
        log::info!("[Recorder] Microphone open");
        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Microphone that "hears" a fixed list of fragments as soon as it opens.
    #[derive(Default)]
    struct FakeMic {
        script: Vec<Vec<u8>>,
        deny: bool,
        released: Arc<AtomicUsize>,
    }

    struct FakeStream {
        released: Arc<AtomicUsize>,
    }

    impl Drop for FakeStream {
        fn drop(&mut self) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl InputDevice for FakeMic {
        type Stream = FakeStream;

        fn open(&mut self, fragments: Sender<Vec<u8>>) -> Result<FakeStream, CaptureError> {
            if self.deny {
                return Err(CaptureError::Permission("denied by user".into()));
            }
            for chunk in &self.script {
                fragments.send(chunk.clone()).unwrap();
            }
            Ok(FakeStream {
                released: self.released.clone(),
            })
        }
    }

    fn mic(script: Vec<Vec<u8>>) -> (FakeMic, Arc<AtomicUsize>) {
        let released = Arc::new(AtomicUsize::new(0));
        (
            FakeMic {
                script,
                deny: false,
                released: released.clone(),
            },
            released,
        )
    }

    #[test]
    fn test_stop_joins_fragments_in_arrival_order() {
        let (device, released) = mic(vec![vec![1u8; 600], vec![2u8; 600]]);
        let mut recorder = AudioRecorder::new(device);

        recorder.start_recording().unwrap();
        let utterance = recorder.stop_recording().unwrap();

        assert_eq!(utterance.len(), 1200);
        let pcm = BASE64_STANDARD.decode(utterance.to_base64()).unwrap();
        assert_eq!(pcm.len(), 1200);
        assert_eq!(pcm[599], 1);
        assert_eq!(pcm[600], 2);
        assert_eq!(released.load(Ordering::SeqCst), 1);
        assert!(matches!(
            recorder.stop_recording(),
            Err(CaptureError::NotRecording)
        ));
    }

    #[test]
    fn test_short_blob_is_rejected_and_mic_released() {
        let (device, released) = mic(vec![vec![0u8; 999]]);
        let mut recorder = AudioRecorder::new(device);

        recorder.start_recording().unwrap();
        let err = recorder.stop_recording().unwrap_err();
        assert!(matches!(err, CaptureError::InputTooSmall { bytes: 999 }));
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_exactly_threshold_is_accepted() {
        let (device, _released) = mic(vec![vec![0u8; MIN_UTTERANCE_BYTES]]);
        let mut recorder = AudioRecorder::new(device);
        recorder.start_recording().unwrap();
        assert!(recorder.stop_recording().is_ok());
    }

    #[test]
    fn test_cancel_discards_and_releases() {
        let (device, released) = mic(vec![vec![7u8; 4000]]);
        let mut recorder = AudioRecorder::new(device);

        recorder.start_recording().unwrap();
        recorder.cancel_recording();
        assert_eq!(released.load(Ordering::SeqCst), 1);
        assert!(matches!(
            recorder.stop_recording(),
            Err(CaptureError::NotRecording)
        ));
    }

    #[test]
    fn test_restart_releases_previous_microphone() {
        let (device, released) = mic(vec![vec![3u8; 2000]]);
        let mut recorder = AudioRecorder::new(device);

        recorder.start_recording().unwrap();
        recorder.start_recording().unwrap();
        assert_eq!(released.load(Ordering::SeqCst), 1);

        // Only the second session's fragments survive
        assert_eq!(recorder.stop_recording().unwrap().len(), 2000);
        assert_eq!(released.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_denied_microphone_leaves_recorder_idle() {
        let mut recorder = AudioRecorder::new(FakeMic {
            deny: true,
            ..FakeMic::default()
        });
        assert!(matches!(
            recorder.start_recording(),
            Err(CaptureError::Permission(_))
        ));
        assert!(matches!(
            recorder.stop_recording(),
            Err(CaptureError::NotRecording)
        ));
    }

    #[test]
    fn test_downmixer_folds_stereo_48k_to_mono_24k() {
        let mut mixer = Downmixer::new(2, 48_000);
        // Four stereo frames -> two mono output samples
        let out = mixer.process(&[0.5, 0.5, 0.0, 0.0, -0.5, -0.5, 0.0, 0.0]);
        let samples: Vec<i16> = out
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        assert_eq!(samples, vec![0, 0]);

        let mut mixer = Downmixer::new(1, 24_000);
        let out = mixer.process(&[0.5, -1.0]);
        assert_eq!(out, [16384i16.to_le_bytes(), (-32768i16).to_le_bytes()].concat());
    }
}
