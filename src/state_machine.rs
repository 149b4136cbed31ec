use crate::api::{GatewayError, GatewayReply, GatewayRequest, LessonPrompt};
use crate::audio::Utterance;
use crate::curriculum::{Language, Lesson, Level};

/// Top-level screen of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Welcome,
    Curriculum,
    Lesson,
}

/// Which kind of response the lesson is showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Explanation,
    Story,
    Song,
    Ask,
    Quiz,
}

/// Exactly one of these holds inside a lesson.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Loading,
    Canvas,
    Response,
    Idle,
}

/// Transient result of the current lesson action.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Response {
    pub ai_text: Option<String>,
    pub child_transcript: Option<String>,
    /// Base64 PCM speech for `ai_text`.
    pub audio: Option<String>,
    pub image: Option<Vec<u8>>,
}

impl Response {
    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        *self == Response::default()
    }
}

/// Interaction that owns the in-flight call; the `*Speech` links are the
/// second call of a two-step interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Chain {
    Explain,
    Story,
    Song,
    QuizQuestion,
    QuizSpeech,
    Speak,
    Answer,
    AnswerSpeech,
    VoiceQuestion,
    VoiceSpeech,
    Draw,
    Coloring,
    ColoringSpeech,
}

#[derive(Debug)]
pub enum Event {
    // Navigation
    ToggleLanguage,
    SelectLevel(Level),
    BackToWelcome,
    SelectLesson(&'static Lesson),
    ExitLesson,
    // Lesson actions
    RequestStory,
    RequestSong,
    RequestQuiz,
    RequestSpeech,
    RequestDraw,
    FinishColoring(Vec<u8>),
    CloseCanvas,
    StartRecording,
    StopRecording,
    CancelRecording,
    TogglePause,
    CancelPending,
    // Device outcomes
    MicrophoneOpened,
    MicrophoneDenied,
    UtteranceCaptured(Utterance),
    /// Too short, or the device failed while finishing.
    CaptureAbandoned,
    /// Playback signals carry the token of the `Play` effect they answer.
    PlaybackStarted(u64),
    PlaybackEnded(u64),
    // Gateway
    Completed {
        generation: u64,
        result: Result<GatewayReply, GatewayError>,
    },
}

/// Side effects requested by the session; the application loop runs them.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Call {
        generation: u64,
        request: GatewayRequest,
    },
    OpenMicrophone,
    FinishCapture,
    DiscardCapture,
    Alert(String),
    Play {
        token: u64,
        payload: String,
    },
    PausePlayback,
    ResumePlayback,
    StopPlayback,
    OpenCanvas(Vec<u8>),
    CloseCanvas,
}

pub fn microphone_alert(language: Language) -> &'static str {
    match language {
        Language::Ar => "من فضلك اسمح بالميكروفون",
        Language::En => "Please allow microphone",
    }
}

pub fn voice_fallback(language: Language) -> &'static str {
    match language {
        Language::Ar => "لم أسمعك جيداً يا بطل!",
        Language::En => "I didn't hear you well!",
    }
}

/// Drop blank lines and surrounding whitespace.
fn normalize_explanation(text: &str) -> Option<String> {
    let joined = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    non_empty(joined.trim())
}

fn non_empty(text: &str) -> Option<String> {
    if text.trim().is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

/// The session orchestrator. All state changes go through [`Session::apply`],
/// which returns the effects to run; gateway completions come back in as
/// [`Event::Completed`] tagged with the generation they were issued under.
pub struct Session {
    language: Language,
    level: Option<Level>,
    lesson: Option<&'static Lesson>,
    step: Step,
    view: View,
    response: Response,
    pending_question: Option<String>,
    loading: bool,
    show_canvas: bool,
    listening: bool,
    speaking: bool,
    paused: bool,
    generation: u64,
    chain: Option<Chain>,
    /// Token of the payload handed to the player last.
    playback: u64,
}

impl Session {
    pub fn new(language: Language) -> Self {
        Self {
            language,
            level: None,
            lesson: None,
            step: Step::Welcome,
            view: View::Explanation,
            response: Response::default(),
            pending_question: None,
            loading: false,
            show_canvas: false,
            listening: false,
            speaking: false,
            paused: false,
            generation: 0,
            chain: None,
            playback: 0,
        }
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn level(&self) -> Option<Level> {
        self.level
    }

    pub fn lesson(&self) -> Option<&'static Lesson> {
        self.lesson
    }

    pub fn step(&self) -> Step {
        self.step
    }

    pub fn view(&self) -> View {
        self.view
    }

    pub fn response(&self) -> &Response {
        &self.response
    }

    pub fn pending_question(&self) -> Option<&str> {
        self.pending_question.as_deref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn is_listening(&self) -> bool {
        self.listening
    }

    pub fn is_speaking(&self) -> bool {
        self.speaking
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn showing_canvas(&self) -> bool {
        self.show_canvas
    }

    #[cfg(test)]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn phase(&self) -> Phase {
        if self.loading {
            Phase::Loading
        } else if self.show_canvas {
            Phase::Canvas
        } else if self.response.ai_text.is_some() || self.response.child_transcript.is_some() {
            Phase::Response
        } else {
            Phase::Idle
        }
    }

    /// Read-aloud is offered for text that has no speech yet.
    pub fn can_request_speech(&self) -> bool {
        self.response.ai_text.is_some() && self.response.audio.is_none()
    }

    pub fn apply(&mut self, event: Event) -> Vec<Effect> {
        let mut fx = Vec::new();
        match event {
            Event::ToggleLanguage => {
                self.language = self.language.toggled();
                log::info!("[Session] Language -> {}", self.language.code());
            }

            Event::SelectLevel(level) => {
                if self.step == Step::Lesson {
                    log::warn!("[Session] Level change ignored inside a lesson");
                } else {
                    self.level = Some(level);
                    self.step = Step::Curriculum;
                }
            }

            Event::BackToWelcome => {
                self.leave_lesson(&mut fx);
                self.step = Step::Welcome;
            }

            Event::ExitLesson => {
                if self.step == Step::Lesson {
                    self.leave_lesson(&mut fx);
                    self.step = Step::Curriculum;
                }
            }

            Event::SelectLesson(lesson) => self.select_lesson(lesson, &mut fx),

            Event::RequestStory => {
                if let Some(prompt) = self.lesson_prompt() {
                    self.reset_lesson_states(&mut fx);
                    self.view = View::Story;
                    self.begin(Chain::Story, GatewayRequest::Story(prompt), &mut fx);
                }
            }

            Event::RequestSong => {
                if let Some(prompt) = self.lesson_prompt() {
                    self.reset_lesson_states(&mut fx);
                    self.view = View::Song;
                    self.begin(Chain::Song, GatewayRequest::Song(prompt), &mut fx);
                }
            }

            Event::RequestQuiz => {
                if let Some(prompt) = self.lesson_prompt() {
                    self.reset_lesson_states(&mut fx);
                    self.view = View::Quiz;
                    self.begin(Chain::QuizQuestion, GatewayRequest::QuizQuestion(prompt), &mut fx);
                }
            }

            Event::RequestSpeech => {
                if self.lesson_prompt().is_some() && self.can_request_speech() {
                    let text = self.response.ai_text.clone().unwrap_or_default();
                    self.begin(Chain::Speak, GatewayRequest::Speech { text }, &mut fx);
                }
            }

            Event::RequestDraw => {
                if let Some(prompt) = self.lesson_prompt() {
                    let request = GatewayRequest::ColoringPage {
                        concept: prompt.title,
                    };
                    self.begin(Chain::Draw, request, &mut fx);
                }
            }

            Event::FinishColoring(image) => {
                if !self.show_canvas {
                    return fx;
                }
                if let Some(prompt) = self.lesson_prompt() {
                    let request = GatewayRequest::EvaluateColoring {
                        image,
                        title: prompt.title,
                        language: prompt.language,
                    };
                    self.begin(Chain::Coloring, request, &mut fx);
                }
            }

            Event::CloseCanvas => {
                if self.show_canvas {
                    self.show_canvas = false;
                    fx.push(Effect::CloseCanvas);
                }
            }

            Event::StartRecording => {
                if self.lesson_prompt().is_some() && !self.listening {
                    fx.push(Effect::OpenMicrophone);
                }
            }

            Event::MicrophoneOpened => {
                if self.lesson_prompt().is_some() {
                    self.listening = true;
                    log::info!("[Session] Listening");
                } else {
                    // Lesson left while the device was opening
                    fx.push(Effect::DiscardCapture);
                }
            }

            Event::MicrophoneDenied => {
                fx.push(Effect::Alert(microphone_alert(self.language).to_string()));
            }

            Event::StopRecording => {
                if self.listening {
                    self.listening = false;
                    fx.push(Effect::FinishCapture);
                }
            }

            Event::CancelRecording => self.release_microphone(&mut fx),

            Event::UtteranceCaptured(audio) => {
                self.listening = false;
                self.route_utterance(audio, &mut fx);
            }

            Event::CaptureAbandoned => {
                self.listening = false;
                log::debug!("[Session] Utterance abandoned, no call");
            }

            Event::TogglePause => {
                if self.paused {
                    self.paused = false;
                    self.speaking = true;
                    fx.push(Effect::ResumePlayback);
                } else if self.speaking {
                    self.speaking = false;
                    self.paused = true;
                    fx.push(Effect::PausePlayback);
                }
            }

            // Ended can overtake Started on its way from the audio thread
            Event::PlaybackStarted(token) => {
                if token == self.playback && self.response.audio.is_some() {
                    self.speaking = true;
                    self.paused = false;
                } else {
                    log::debug!("[Session] Dropping stale playback start ({})", token);
                }
            }

            Event::PlaybackEnded(token) => {
                if token == self.playback {
                    self.speaking = false;
                    self.paused = false;
                    self.response.audio = None;
                    fx.push(Effect::StopPlayback);
                } else {
                    log::debug!("[Session] Dropping stale playback end ({})", token);
                }
            }

            Event::CancelPending => {
                if self.loading {
                    log::info!("[Session] Pending request cancelled");
                    self.cancel_in_flight();
                    self.release_microphone(&mut fx);
                    self.stop_audio(&mut fx);
                }
            }

            Event::Completed { generation, result } => {
                match self.chain {
                    Some(chain) if generation == self.generation => {
                        self.complete(chain, result, &mut fx)
                    }
                    _ => log::debug!(
                        "[Session] Dropping stale completion (generation {}, current {})",
                        generation,
                        self.generation
                    ),
                }
            }
        }
        fx
    }

    fn select_lesson(&mut self, lesson: &'static Lesson, fx: &mut Vec<Effect>) {
        if self.step == Step::Welcome || self.level.is_none() {
            log::warn!("[Session] Pick a level before a lesson");
            return;
        }
        self.release_microphone(fx);
        self.step = Step::Lesson;
        self.lesson = Some(lesson);
        self.view = View::Explanation;
        self.reset_lesson_states(fx);
        if let Some(prompt) = self.lesson_prompt() {
            self.begin(Chain::Explain, GatewayRequest::Explain(prompt), fx);
        }
    }

    fn route_utterance(&mut self, audio: Utterance, fx: &mut Vec<Effect>) {
        let Some(prompt) = self.lesson_prompt() else {
            return;
        };
        self.stop_audio(fx);

        match self.pending_question.clone() {
            Some(question) if self.view == View::Quiz => {
                log::info!("[Session] Routing {} bytes to answer evaluation", audio.len());
                let request = GatewayRequest::EvaluateAnswer {
                    audio,
                    question,
                    lesson: prompt,
                };
                self.begin(Chain::Answer, request, fx);
            }
            _ => {
                log::info!("[Session] Routing {} bytes to open question", audio.len());
                self.response = Response::default();
                self.view = View::Ask;
                let request = GatewayRequest::VoiceQuestion {
                    audio,
                    language: prompt.language,
                    age: prompt.age,
                };
                self.begin(Chain::VoiceQuestion, request, fx);
            }
        }
    }

    fn complete(
        &mut self,
        chain: Chain,
        result: Result<GatewayReply, GatewayError>,
        fx: &mut Vec<Effect>,
    ) {
        let reply = match result {
            Ok(reply) => Some(reply),
            Err(e) => {
                log::error!("[Session] {:?} failed: {}", chain, e);
                None
            }
        };

        match (chain, reply) {
            (Chain::Explain, Some(GatewayReply::Text(text))) => {
                self.response.ai_text = normalize_explanation(&text);
                self.end_cycle();
            }

            (Chain::Story | Chain::Song, Some(GatewayReply::Text(text))) => {
                self.response.ai_text = non_empty(&text);
                self.end_cycle();
            }

            (Chain::QuizQuestion, Some(GatewayReply::Text(question))) => {
                self.response.ai_text = Some(question.clone());
                self.pending_question = Some(question.clone());
                self.continue_with(Chain::QuizSpeech, GatewayRequest::Speech { text: question }, fx);
            }

            (Chain::Answer, Some(GatewayReply::Evaluation(evaluation))) => {
                self.response.child_transcript = Some(evaluation.transcript);
                self.response.ai_text = Some(evaluation.feedback.clone());
                self.pending_question = None;
                let request = GatewayRequest::Speech {
                    text: evaluation.feedback,
                };
                self.continue_with(Chain::AnswerSpeech, request, fx);
            }

            (Chain::VoiceQuestion, Some(GatewayReply::Voice(answer))) => {
                self.response.child_transcript = Some(answer.child_question);
                self.response.ai_text = Some(answer.teacher_answer.clone());
                let request = GatewayRequest::Speech {
                    text: answer.teacher_answer,
                };
                self.continue_with(Chain::VoiceSpeech, request, fx);
            }

            (Chain::Draw, Some(GatewayReply::Image(Some(image)))) => {
                log::info!("[Session] Coloring page received ({} bytes)", image.len());
                self.response.image = Some(image.clone());
                self.show_canvas = true;
                fx.push(Effect::OpenCanvas(image));
                self.end_cycle();
            }

            (Chain::Coloring, Some(GatewayReply::Text(feedback))) => {
                self.response.ai_text = Some(feedback.clone());
                let request = GatewayRequest::Speech { text: feedback };
                self.continue_with(Chain::ColoringSpeech, request, fx);
            }

            (
                Chain::Speak | Chain::QuizSpeech | Chain::AnswerSpeech | Chain::VoiceSpeech,
                Some(GatewayReply::Audio(audio)),
            ) => {
                self.store_audio(audio, fx);
                self.end_cycle();
            }

            (Chain::ColoringSpeech, reply) => {
                if let Some(GatewayReply::Audio(audio)) = reply {
                    self.store_audio(audio, fx);
                }
                if self.show_canvas {
                    self.show_canvas = false;
                    fx.push(Effect::CloseCanvas);
                }
                self.view = View::Explanation;
                self.end_cycle();
            }

            (Chain::VoiceQuestion | Chain::VoiceSpeech, _) => {
                self.response.ai_text = Some(voice_fallback(self.language).to_string());
                self.end_cycle();
            }

            (Chain::Draw, Some(GatewayReply::Image(None))) => {
                log::warn!("[Session] No image in coloring page response");
                self.end_cycle();
            }

            (chain, reply) => {
                if let Some(reply) = reply {
                    log::warn!("[Session] Unexpected reply for {:?}: {:?}", chain, reply);
                }
                self.end_cycle();
            }
        }
    }

    fn lesson_prompt(&self) -> Option<LessonPrompt> {
        if self.step != Step::Lesson {
            return None;
        }
        let lesson = self.lesson?;
        Some(LessonPrompt {
            title: lesson.title.get(self.language).to_string(),
            language: self.language,
            age: self.level?.age(),
        })
    }

    fn begin(&mut self, chain: Chain, request: GatewayRequest, fx: &mut Vec<Effect>) {
        self.generation += 1;
        self.loading = true;
        self.chain = Some(chain);
        log::info!(
            "[Session] {:?}: {} (generation {})",
            chain,
            request.name(),
            self.generation
        );
        fx.push(Effect::Call {
            generation: self.generation,
            request,
        });
    }

    /// Second call of the same interaction; keeps generation and loading.
    fn continue_with(&mut self, chain: Chain, request: GatewayRequest, fx: &mut Vec<Effect>) {
        self.chain = Some(chain);
        fx.push(Effect::Call {
            generation: self.generation,
            request,
        });
    }

    fn end_cycle(&mut self) {
        self.loading = false;
        self.chain = None;
    }

    fn cancel_in_flight(&mut self) {
        if self.loading || self.chain.is_some() {
            self.generation += 1;
        }
        self.end_cycle();
    }

    fn store_audio(&mut self, audio: Option<String>, fx: &mut Vec<Effect>) {
        if let Some(ref payload) = audio {
            self.playback += 1;
            fx.push(Effect::Play {
                token: self.playback,
                payload: payload.clone(),
            });
        }
        self.response.audio = audio;
    }

    /// Stopped speech is dropped, so the text can be read aloud again.
    fn stop_audio(&mut self, fx: &mut Vec<Effect>) {
        if self.response.audio.is_some() || self.speaking || self.paused {
            self.playback += 1;
            fx.push(Effect::StopPlayback);
        }
        self.response.audio = None;
        self.speaking = false;
        self.paused = false;
    }

    fn release_microphone(&mut self, fx: &mut Vec<Effect>) {
        if self.listening {
            self.listening = false;
            fx.push(Effect::DiscardCapture);
        }
    }

    fn reset_lesson_states(&mut self, fx: &mut Vec<Effect>) {
        self.stop_audio(fx);
        if self.show_canvas {
            self.show_canvas = false;
            fx.push(Effect::CloseCanvas);
        }
        self.response = Response::default();
        self.pending_question = None;
    }

    fn leave_lesson(&mut self, fx: &mut Vec<Effect>) {
        self.cancel_in_flight();
        self.release_microphone(fx);
        self.reset_lesson_states(fx);
        self.lesson = None;
    }
}
