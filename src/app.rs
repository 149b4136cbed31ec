use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, EventLoopProxy};
use winit::window::WindowId;

use crate::api::{self, AiGateway, GatewayError, GatewayReply, GeminiClient};
use crate::audio::recorder::CaptureError;
use crate::audio::{AudioRecorder, CpalInput, CpalOutput, PlaybackEngine, PlaybackSignal};
use crate::canvas::{CanvasAction, CanvasWindow};
use crate::config::Config;
use crate::console::{self, Command, Outcome, Printer};
use crate::state_machine::{Effect, Event, Session};

/// Events sent from the stdin thread, tokio tasks and the audio callback
/// back to the event loop.
#[derive(Debug)]
pub enum AppEvent {
    Command(Command),
    Gateway {
        generation: u64,
        result: Result<GatewayReply, GatewayError>,
    },
    Playback(PlaybackSignal),
    InputClosed,
}

pub struct App {
    session: Session,
    printer: Printer,
    gateway: Arc<dyn AiGateway>,
    request_timeout: Duration,
    /// Opened on first use so a missing microphone surfaces as a denial.
    recorder: Option<AudioRecorder<CpalInput>>,
    player: Option<PlaybackEngine<CpalOutput>>,
    canvas: Option<CanvasWindow>,
    tokio_rt: Arc<tokio::runtime::Runtime>,
    event_proxy: EventLoopProxy<AppEvent>,
}

impl App {
    pub fn new(tokio_rt: Arc<tokio::runtime::Runtime>, event_proxy: EventLoopProxy<AppEvent>) -> Self {
        let config = Config::load();

        let client = GeminiClient::new(&config);
        if !client.has_api_key() {
            log::warn!(
                "No API key set! Edit {} or set GEMINI_API_KEY env var",
                Config::config_path().display()
            );
        }

        Self {
            session: Session::new(config.initial_language()),
            printer: Printer::new(),
            gateway: Arc::new(client),
            request_timeout: config.request_timeout(),
            recorder: None,
            player: None,
            canvas: None,
            tokio_rt,
            event_proxy,
        }
    }

    /// Print the welcome screen.
    pub fn greet(&mut self) {
        println!("{}", console::HELP);
        self.print_changes();
    }

    fn handle_command(&mut self, event_loop: &ActiveEventLoop, command: Command) {
        match console::translate(command, &self.session) {
            Outcome::Dispatch(event) => self.dispatch(event_loop, event),
            Outcome::Print(text) => println!("{}", text),
            Outcome::Refuse(reason) => println!("({})", reason),
            Outcome::Quit => event_loop.exit(),
        }
    }

    /// Feed one event to the session and run the resulting effects; device
    /// outcomes produced by an effect are fed back in order.
    fn dispatch(&mut self, event_loop: &ActiveEventLoop, event: Event) {
        let mut queue = VecDeque::from([event]);
        while let Some(event) = queue.pop_front() {
            for effect in self.session.apply(event) {
                if let Some(outcome) = self.run_effect(event_loop, effect) {
                    queue.push_back(outcome);
                }
            }
        }
        self.print_changes();
    }

    fn run_effect(&mut self, event_loop: &ActiveEventLoop, effect: Effect) -> Option<Event> {
        match effect {
            Effect::Call {
                generation,
                request,
            } => {
                let gateway = self.gateway.clone();
                let proxy = self.event_proxy.clone();
                let timeout = self.request_timeout;
                self.tokio_rt.spawn(async move {
                    let result = api::execute(gateway.as_ref(), request, timeout).await;
                    let _ = proxy.send_event(AppEvent::Gateway { generation, result });
                });
                None
            }

            Effect::OpenMicrophone => Some(self.open_microphone()),

            Effect::FinishCapture => {
                let recorder = self.recorder.as_mut()?;
                match recorder.stop_recording() {
                    Ok(utterance) => Some(Event::UtteranceCaptured(utterance)),
                    Err(CaptureError::InputTooSmall { bytes }) => {
                        log::info!("[Recorder] Ignoring {} byte utterance", bytes);
                        Some(Event::CaptureAbandoned)
                    }
                    Err(e) => {
                        log::warn!("[Recorder] Capture failed: {}", e);
                        Some(Event::CaptureAbandoned)
                    }
                }
            }

            Effect::DiscardCapture => {
                if let Some(recorder) = self.recorder.as_mut() {
                    recorder.cancel_recording();
                }
                None
            }

            Effect::Alert(text) => {
                log::warn!("[Session] Alert: {}", text);
                println!("!! {}", text);
                None
            }

            Effect::Play { token, payload } => {
                let player = self.player()?;
                if let Err(e) = player.play(token, &payload) {
                    log::error!("[Player] Playback failed: {}", e);
                }
                None
            }

            Effect::PausePlayback => {
                if let Some(player) = self.player.as_mut() {
                    player.pause();
                    log::info!("[Player] Paused at {:.1}s", player.position().as_secs_f32());
                }
                None
            }

            Effect::ResumePlayback => {
                if let Some(player) = self.player.as_mut() {
                    if let Err(e) = player.resume() {
                        log::error!("[Player] Resume failed: {}", e);
                    }
                }
                None
            }

            Effect::StopPlayback => {
                if let Some(player) = self.player.as_mut() {
                    player.stop();
                }
                None
            }

            Effect::OpenCanvas(image) => match CanvasWindow::open(event_loop, &image) {
                Ok(window) => {
                    self.canvas = Some(window);
                    None
                }
                Err(e) => {
                    log::error!("[Canvas] Cannot open coloring page: {}", e);
                    Some(Event::CloseCanvas)
                }
            },

            Effect::CloseCanvas => {
                if self.canvas.take().is_some() {
                    log::info!("[Canvas] Window closed");
                }
                None
            }
        }
    }

    fn open_microphone(&mut self) -> Event {
        if self.recorder.is_none() {
            match CpalInput::new() {
                Ok(input) => self.recorder = Some(AudioRecorder::new(input)),
                Err(e) => {
                    log::error!("[Recorder] No microphone: {}", e);
                    return Event::MicrophoneDenied;
                }
            }
        }
        let Some(recorder) = self.recorder.as_mut() else {
            return Event::MicrophoneDenied;
        };
        match recorder.start_recording() {
            Ok(()) => Event::MicrophoneOpened,
            Err(e) => {
                log::error!("[Recorder] Failed to start recording: {}", e);
                Event::MicrophoneDenied
            }
        }
    }

    /// The output device, opened on first playback.
    fn player(&mut self) -> Option<&mut PlaybackEngine<CpalOutput>> {
        if self.player.is_none() {
            match CpalOutput::new() {
                Ok(output) => {
                    // Called from the audio thread
                    let proxy = Mutex::new(self.event_proxy.clone());
                    let on_signal = Arc::new(move |signal: PlaybackSignal| {
                        if let Ok(proxy) = proxy.lock() {
                            let _ = proxy.send_event(AppEvent::Playback(signal));
                        }
                    });
                    self.player = Some(PlaybackEngine::new(output, on_signal));
                }
                Err(e) => {
                    log::error!("[Player] Failed to init audio output: {}", e);
                    return None;
                }
            }
        }
        self.player.as_mut()
    }

    fn print_changes(&mut self) {
        for line in self.printer.render(&self.session) {
            println!("{}", line);
        }
    }
}

impl ApplicationHandler<AppEvent> for App {
    fn resumed(&mut self, _event_loop: &ActiveEventLoop) {
        // Windows are created on demand for coloring pages
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        let Some(canvas) = self.canvas.as_mut() else {
            return;
        };
        if canvas.id() != window_id {
            return;
        }
        match canvas.handle_event(event) {
            Some(CanvasAction::Finished(png)) => {
                self.dispatch(event_loop, Event::FinishColoring(png))
            }
            Some(CanvasAction::Closed) => self.dispatch(event_loop, Event::CloseCanvas),
            None => {}
        }
    }

    fn user_event(&mut self, event_loop: &ActiveEventLoop, event: AppEvent) {
        match event {
            AppEvent::Command(command) => self.handle_command(event_loop, command),
            AppEvent::Gateway { generation, result } => {
                self.dispatch(event_loop, Event::Completed { generation, result })
            }
            AppEvent::Playback(PlaybackSignal::Started(token)) => {
                self.dispatch(event_loop, Event::PlaybackStarted(token))
            }
            AppEvent::Playback(PlaybackSignal::Ended(token)) => {
                self.dispatch(event_loop, Event::PlaybackEnded(token))
            }
            AppEvent::InputClosed => {
                log::info!("stdin closed, exiting");
                event_loop.exit();
            }
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(recorder) = self.recorder.as_mut() {
            recorder.cancel_recording();
        }
        if let Some(player) = self.player.as_mut() {
            player.stop();
        }
        self.canvas = None;
    }
}
