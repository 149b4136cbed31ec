pub mod gemini;

pub use gemini::GeminiClient;

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::audio::Utterance;
use crate::curriculum::Language;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("provider error: {0}")]
    Provider(String),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("no Gemini API key configured")]
    MissingApiKey,
}

/// Lesson context shared by the text calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LessonPrompt {
    /// Lesson title in the session language.
    pub title: String,
    pub language: Language,
    pub age: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AnswerEvaluation {
    #[serde(rename = "childTranscript")]
    pub transcript: String,
    #[serde(rename = "teacherFeedback")]
    pub feedback: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceAnswer {
    pub child_question: String,
    pub teacher_answer: String,
}

/// The generative provider behind every lesson interaction. Calls are
/// stateless request/response; none of them stream.
#[async_trait]
pub trait AiGateway: Send + Sync {
    async fn explain(&self, lesson: &LessonPrompt) -> Result<String, GatewayError>;

    async fn story(&self, lesson: &LessonPrompt) -> Result<String, GatewayError>;

    async fn song(&self, lesson: &LessonPrompt) -> Result<String, GatewayError>;

    async fn quiz_question(&self, lesson: &LessonPrompt) -> Result<String, GatewayError>;

    async fn evaluate_answer(
        &self,
        audio: &Utterance,
        question: &str,
        lesson: &LessonPrompt,
    ) -> Result<AnswerEvaluation, GatewayError>;

    async fn voice_question(
        &self,
        audio: &Utterance,
        language: Language,
        age: u8,
    ) -> Result<VoiceAnswer, GatewayError>;

    /// `png` is the composited coloring page.
    async fn evaluate_coloring(
        &self,
        png: &[u8],
        title: &str,
        language: Language,
    ) -> Result<String, GatewayError>;

    /// `Ok(None)` when the provider answered without an image.
    async fn coloring_page(&self, concept: &str) -> Result<Option<Vec<u8>>, GatewayError>;

    /// Base64 s16le 24 kHz mono PCM, `Ok(None)` when the response had no audio.
    async fn speech(&self, text: &str) -> Result<Option<String>, GatewayError>;
}

/// One gateway call, owned so it can move into a task.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayRequest {
    Explain(LessonPrompt),
    Story(LessonPrompt),
    Song(LessonPrompt),
    QuizQuestion(LessonPrompt),
    EvaluateAnswer {
        audio: Utterance,
        question: String,
        lesson: LessonPrompt,
    },
    VoiceQuestion {
        audio: Utterance,
        language: Language,
        age: u8,
    },
    EvaluateColoring {
        image: Vec<u8>,
        title: String,
        language: Language,
    },
    ColoringPage {
        concept: String,
    },
    Speech {
        text: String,
    },
}

impl GatewayRequest {
    pub fn name(&self) -> &'static str {
        match self {
            GatewayRequest::Explain(_) => "explain",
            GatewayRequest::Story(_) => "story",
            GatewayRequest::Song(_) => "song",
            GatewayRequest::QuizQuestion(_) => "quiz question",
            GatewayRequest::EvaluateAnswer { .. } => "evaluate answer",
            GatewayRequest::VoiceQuestion { .. } => "voice question",
            GatewayRequest::EvaluateColoring { .. } => "evaluate coloring",
            GatewayRequest::ColoringPage { .. } => "coloring page",
            GatewayRequest::Speech { .. } => "speech",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GatewayReply {
    Text(String),
    Evaluation(AnswerEvaluation),
    Voice(VoiceAnswer),
    Image(Option<Vec<u8>>),
    Audio(Option<String>),
}

/// Run `request` against `gateway`, failing with `Timeout` once `timeout`
/// elapses.
pub async fn execute(
    gateway: &dyn AiGateway,
    request: GatewayRequest,
    timeout: Duration,
) -> Result<GatewayReply, GatewayError> {
    let name = request.name();
    log::debug!("[Gateway] -> {}", name);

    let call = async {
        Ok::<_, GatewayError>(match request {
            GatewayRequest::Explain(lesson) => GatewayReply::Text(gateway.explain(&lesson).await?),
            GatewayRequest::Story(lesson) => GatewayReply::Text(gateway.story(&lesson).await?),
            GatewayRequest::Song(lesson) => GatewayReply::Text(gateway.song(&lesson).await?),
            GatewayRequest::QuizQuestion(lesson) => {
                GatewayReply::Text(gateway.quiz_question(&lesson).await?)
            }
            GatewayRequest::EvaluateAnswer {
                audio,
                question,
                lesson,
            } => GatewayReply::Evaluation(
                gateway.evaluate_answer(&audio, &question, &lesson).await?,
            ),
            GatewayRequest::VoiceQuestion {
                audio,
                language,
                age,
            } => GatewayReply::Voice(gateway.voice_question(&audio, language, age).await?),
            GatewayRequest::EvaluateColoring {
                image,
                title,
                language,
            } => GatewayReply::Text(gateway.evaluate_coloring(&image, &title, language).await?),
            GatewayRequest::ColoringPage { concept } => {
                GatewayReply::Image(gateway.coloring_page(&concept).await?)
            }
            GatewayRequest::Speech { text } => GatewayReply::Audio(gateway.speech(&text).await?),
        })
    };

    let result = match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(GatewayError::Timeout(timeout)),
    };
    match &result {
        Ok(_) => log::debug!("[Gateway] <- {} ok", name),
        Err(e) => log::error!("[Gateway] {} failed: {}", name, e),
    }
    result
}

/// Remove pictographs the speech model would read out literally.
pub fn strip_emoji(text: &str) -> String {
    text.chars()
        .filter(|c| {
            !matches!(
                *c as u32,
                0x1F600..=0x1F64F | 0x1F300..=0x1F5FF | 0x1F680..=0x1F6FF | 0x1F1E6..=0x1F1FF
            )
        })
        .collect()
}

#[cfg(test)]
pub mod testing {
    //! Scripted gateway for state machine and dispatch tests.

    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;

    /// Replies are consumed in order; every call is recorded by name.
    #[derive(Default)]
    pub struct ScriptedGateway {
        replies: Mutex<VecDeque<Result<GatewayReply, GatewayError>>>,
        pub calls: Mutex<Vec<&'static str>>,
        delay: Option<Duration>,
    }

    impl ScriptedGateway {
        pub fn with(replies: Vec<Result<GatewayReply, GatewayError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                ..Default::default()
            }
        }

        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        async fn next(&self, name: &'static str) -> Result<GatewayReply, GatewayError> {
            self.calls.lock().unwrap().push(name);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(GatewayError::Provider(format!("unscripted {}", name))))
        }

        async fn text(&self, name: &'static str) -> Result<String, GatewayError> {
            match self.next(name).await? {
                GatewayReply::Text(t) => Ok(t),
                other => Err(GatewayError::Malformed(format!("{:?}", other))),
            }
        }
    }

    #[async_trait]
    impl AiGateway for ScriptedGateway {
        async fn explain(&self, _: &LessonPrompt) -> Result<String, GatewayError> {
            self.text("explain").await
        }

        async fn story(&self, _: &LessonPrompt) -> Result<String, GatewayError> {
            self.text("story").await
        }

        async fn song(&self, _: &LessonPrompt) -> Result<String, GatewayError> {
            self.text("song").await
        }

        async fn quiz_question(&self, _: &LessonPrompt) -> Result<String, GatewayError> {
            self.text("quiz question").await
        }

        async fn evaluate_answer(
            &self,
            _: &Utterance,
            _: &str,
            _: &LessonPrompt,
        ) -> Result<AnswerEvaluation, GatewayError> {
            match self.next("evaluate answer").await? {
                GatewayReply::Evaluation(e) => Ok(e),
                other => Err(GatewayError::Malformed(format!("{:?}", other))),
            }
        }

        async fn voice_question(
            &self,
            _: &Utterance,
            _: Language,
            _: u8,
        ) -> Result<VoiceAnswer, GatewayError> {
            match self.next("voice question").await? {
                GatewayReply::Voice(v) => Ok(v),
                other => Err(GatewayError::Malformed(format!("{:?}", other))),
            }
        }

        async fn evaluate_coloring(
            &self,
            _: &[u8],
            _: &str,
            _: Language,
        ) -> Result<String, GatewayError> {
            self.text("evaluate coloring").await
        }

        async fn coloring_page(&self, _: &str) -> Result<Option<Vec<u8>>, GatewayError> {
            match self.next("coloring page").await? {
                GatewayReply::Image(i) => Ok(i),
                other => Err(GatewayError::Malformed(format!("{:?}", other))),
            }
        }

        async fn speech(&self, _: &str) -> Result<Option<String>, GatewayError> {
            match self.next("speech").await? {
                GatewayReply::Audio(a) => Ok(a),
                other => Err(GatewayError::Malformed(format!("{:?}", other))),
            }
        }
    }
}
